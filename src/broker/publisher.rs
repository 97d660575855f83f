//! Publisher: mandatory-flag publish with Basic.Return-based unroutable
//! detection and exponential backoff retry (spec 4.4).

use std::sync::Arc;
use std::time::Duration;

use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ExchangeKind};
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::broker::types::{EXCHANGE, PUBLISH_MAX_ATTEMPTS, PUBLISH_RETRY_BASE_DELAY_MS, PUBLISH_RETURN_WAIT};
use crate::error::BrokerError;

/// Publishes to [`EXCHANGE`], retrying unroutable or broker-rejected
/// publishes with doubling backoff starting at
/// [`PUBLISH_RETRY_BASE_DELAY_MS`], up to [`PUBLISH_MAX_ATTEMPTS`].
pub struct Publisher {
    channel: Channel,
    // Basic.Return notifications for this channel, fed by the callback
    // registered in `new`. A message lands here when the broker could not
    // route a mandatory-flagged publish to any queue.
    returns: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl Publisher {
    pub async fn new(connection: &Connection) -> Result<Self, BrokerError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel {
                uri: connection_uri_hint(connection),
                cause: e.to_string(),
            })?;

        channel
            .exchange_declare(
                EXCHANGE,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: false,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Exchange {
                exchange: EXCHANGE.to_string(),
                cause: e.to_string(),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        channel.on_return(move |returned| {
            let _ = tx.send(returned.reply_text.to_string());
        });

        Ok(Self {
            channel,
            returns: Arc::new(Mutex::new(rx)),
        })
    }

    /// Publish `body` to `routing_key`, retrying on an unroutable-return or
    /// a broker-level publish error.
    pub async fn publish(&self, routing_key: &str, body: &[u8]) -> Result<(), BrokerError> {
        let mut delay = Duration::from_millis(PUBLISH_RETRY_BASE_DELAY_MS);
        let mut last_cause = String::new();

        for attempt in 0..PUBLISH_MAX_ATTEMPTS {
            let publish_result = self
                .channel
                .basic_publish(
                    EXCHANGE,
                    routing_key,
                    BasicPublishOptions {
                        mandatory: true,
                        immediate: false,
                    },
                    body,
                    BasicProperties::default().with_delivery_mode(2),
                )
                .await;

            match publish_result {
                Ok(confirm) => {
                    if let Err(e) = confirm.await {
                        last_cause = e.to_string();
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }

                    tokio::time::sleep(PUBLISH_RETURN_WAIT).await;
                    let mut returns = self.returns.lock().await;
                    match returns.try_recv() {
                        Ok(reason) => {
                            last_cause = reason;
                            tokio::time::sleep(delay).await;
                            delay *= 2;
                            continue;
                        }
                        Err(_) => return Ok(()),
                    }
                }
                Err(e) => {
                    last_cause = e.to_string();
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }

            tracing::warn!(attempt, routing_key, "publish retry");
        }

        Err(BrokerError::UnroutablePublish {
            routing_key: routing_key.to_string(),
            cause: last_cause,
        })
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        self.channel
            .close(0, "closing")
            .await
            .map_err(|e| BrokerError::Channel {
                uri: String::new(),
                cause: e.to_string(),
            })
    }
}

fn connection_uri_hint(_connection: &Connection) -> String {
    // lapin's Connection does not expose the URI it was opened with; the
    // caller logs the URI separately at dial time.
    "<broker>".to_string()
}

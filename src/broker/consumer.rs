//! Consumer: queue declaration/binding, manual-ack command consumption,
//! and the drain mode used during Task Executor teardown (spec 4.4).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::broker::publisher::Publisher;
use crate::broker::types::{EXCHANGE, ERROR_QUEUE, OUTPUT_QUEUE, queue_routing_keys};
use crate::error::BrokerError;

/// Executes a command body and returns combined stdout+stderr on success,
/// or an error string on failure. `None` return means the execution
/// session itself could not be opened (the delivery should be nacked with
/// requeue rather than acked).
pub type CommandHandler = Arc<
    dyn Fn(String) -> Pin<Box<dyn Future<Output = Option<Result<String, String>>> + Send>>
        + Send
        + Sync,
>;

pub struct Consumer {
    channel: Channel,
}

/// One outcome of [`Consumer::consume_commands_streaming`].
#[derive(Debug, Clone)]
pub enum ConsumeEvent {
    Output(String),
    Error(String),
    Finished,
}

impl Consumer {
    /// Declare the three non-durable queues and bind each to [`EXCHANGE`]
    /// with its fixed routing key.
    pub async fn new(connection: &Connection) -> Result<Self, BrokerError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel {
                uri: String::new(),
                cause: e.to_string(),
            })?;

        for (queue, routing_key) in queue_routing_keys() {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: false,
                        auto_delete: false,
                        ..QueueDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| BrokerError::Queue {
                    queue: queue.to_string(),
                    cause: e.to_string(),
                })?;

            channel
                .queue_bind(
                    queue,
                    EXCHANGE,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| BrokerError::Binding {
                    queue: queue.to_string(),
                    routing_key: routing_key.to_string(),
                    cause: e.to_string(),
                })?;
        }

        Ok(Self { channel })
    }

    /// Consume `cmd-queue` with manual ack under `consumer_tag`, running
    /// each delivery's body through `handler` and publishing the result to
    /// `output-queue` or `error-queue` via `publisher`. Exits when `cancel`
    /// fires or the delivery stream closes.
    pub async fn consume_commands(
        &self,
        consumer_tag: &str,
        handler: CommandHandler,
        publisher: Arc<Publisher>,
        cancel: CancellationToken,
    ) -> Result<(), BrokerError> {
        let mut deliveries = self
            .channel
            .basic_consume(
                crate::broker::types::CMD_QUEUE,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Queue {
                queue: crate::broker::types::CMD_QUEUE.to_string(),
                cause: e.to_string(),
            })?;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = deliveries.next() => {
                    let Some(delivery) = next else { return Ok(()) };
                    let delivery = match delivery {
                        Ok(d) => d,
                        Err(e) => {
                            tracing::warn!(cause = %e, "delivery stream error");
                            continue;
                        }
                    };

                    let body = String::from_utf8_lossy(&delivery.data).into_owned();
                    match handler(body).await {
                        None => {
                            let _ = delivery
                                .nack(BasicNackOptions {
                                    requeue: true,
                                    ..BasicNackOptions::default()
                                })
                                .await;
                        }
                        Some(Ok(output)) => {
                            publisher
                                .publish(crate::broker::types::ROUTE_OUTPUT_QUEUE, output.as_bytes())
                                .await?;
                            let _ = delivery.ack(BasicAckOptions::default()).await;
                        }
                        Some(Err(error)) => {
                            publisher
                                .publish(crate::broker::types::ROUTE_ERROR_QUEUE, error.as_bytes())
                                .await?;
                            let _ = delivery.ack(BasicAckOptions::default()).await;
                        }
                    }
                }
            }
        }
    }

    /// Like [`Consumer::consume_commands`], but instead of looping forever
    /// it spawns the loop and reports each delivery's outcome over the
    /// returned channel, one [`ConsumeEvent`] per handled command followed
    /// by a final `Finished` when the stream ends. The worker's
    /// `BrokerConsumer::StartConsumer` RPC maps this straight onto
    /// `ConsumerCommandResponse` (spec 4.2).
    pub async fn consume_commands_streaming(
        self: Arc<Self>,
        consumer_tag: String,
        handler: CommandHandler,
        publisher: Arc<Publisher>,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<ConsumeEvent>, BrokerError> {
        let mut deliveries = self
            .channel
            .basic_consume(
                crate::broker::types::CMD_QUEUE,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Queue {
                queue: crate::broker::types::CMD_QUEUE.to_string(),
                cause: e.to_string(),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = deliveries.next() => {
                        let Some(delivery) = next else { break };
                        let delivery = match delivery {
                            Ok(d) => d,
                            Err(e) => {
                                tracing::warn!(cause = %e, "delivery stream error");
                                continue;
                            }
                        };

                        let body = String::from_utf8_lossy(&delivery.data).into_owned();
                        match handler(body).await {
                            None => {
                                let _ = delivery
                                    .nack(BasicNackOptions { requeue: true, ..BasicNackOptions::default() })
                                    .await;
                            }
                            Some(Ok(output)) => {
                                if publisher
                                    .publish(crate::broker::types::ROUTE_OUTPUT_QUEUE, output.as_bytes())
                                    .await
                                    .is_ok()
                                {
                                    let _ = delivery.ack(BasicAckOptions::default()).await;
                                    let _ = tx.send(ConsumeEvent::Output(output));
                                }
                            }
                            Some(Err(error)) => {
                                if publisher
                                    .publish(crate::broker::types::ROUTE_ERROR_QUEUE, error.as_bytes())
                                    .await
                                    .is_ok()
                                {
                                    let _ = delivery.ack(BasicAckOptions::default()).await;
                                    let _ = tx.send(ConsumeEvent::Error(error));
                                }
                            }
                        }
                    }
                }
            }
            let _ = tx.send(ConsumeEvent::Finished);
        });

        Ok(rx)
    }

    /// Drain mode used during Task Executor teardown (spec 4.4
    /// `ConsumeQueueContents`): consume `queue` under `consumer_tag`,
    /// appending every delivery's body to the returned vec, until `cancel`
    /// fires.
    pub async fn drain_queue(
        &self,
        queue: &str,
        consumer_tag: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<String>, BrokerError> {
        let mut deliveries = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Queue {
                queue: queue.to_string(),
                cause: e.to_string(),
            })?;

        let mut out = Vec::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(out),
                next = deliveries.next() => {
                    let Some(delivery) = next else { return Ok(out) };
                    let Ok(delivery) = delivery else { continue };
                    out.push(String::from_utf8_lossy(&delivery.data).into_owned());
                    let _ = delivery.ack(BasicAckOptions::default()).await;
                }
            }
        }
    }
}

impl Consumer {
    /// Like [`Consumer::drain_queue`] but surfaces each delivery as soon as
    /// it arrives rather than buffering to a `Vec`, so a caller that knows
    /// the expected delivery count up front (the Task Executor's result
    /// collection phase) can cancel as soon as it has counted enough
    /// instead of waiting on a fixed `cancel` signal decided in advance.
    pub async fn drain_stream(
        &self,
        queue: &str,
        consumer_tag: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::UnboundedReceiver<String>, BrokerError> {
        let mut deliveries = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Queue {
                queue: queue.to_string(),
                cause: e.to_string(),
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = deliveries.next() => {
                        let Some(delivery) = next else { return };
                        let Ok(delivery) = delivery else { continue };
                        let body = String::from_utf8_lossy(&delivery.data).into_owned();
                        let _ = delivery.ack(BasicAckOptions::default()).await;
                        if tx.send(body).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Convenience constants re-exported for callers that only drain one
/// queue and don't need the full `Consumer`.
pub const DRAIN_QUEUES: [&str; 2] = [OUTPUT_QUEUE, ERROR_QUEUE];

//! Process-wide broker handle.
//!
//! Spec 9's DESIGN NOTES call out the original implementation's
//! once-guarded global Broker Client and recommend representing it
//! instead as a service object constructed at RPC-server start and
//! injected into the service handler. `BrokerHandle` is that object: the
//! worker binary builds exactly one, then clones the `Arc` into every
//! `BrokerConsumer`/`RepositoryProvider` service instance — no ambient
//! statics.

use std::sync::Arc;

use lapin::{Connection, ConnectionProperties};

use crate::broker::consumer::Consumer;
use crate::broker::publisher::Publisher;
use crate::error::BrokerError;

pub struct BrokerHandle {
    pub connection: Connection,
    pub publisher: Arc<Publisher>,
    pub consumer: Arc<Consumer>,
}

impl BrokerHandle {
    pub async fn connect(uri: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection {
                uri: uri.to_string(),
                cause: e.to_string(),
            })?;

        let publisher = Arc::new(Publisher::new(&connection).await?);
        let consumer = Arc::new(Consumer::new(&connection).await?);

        Ok(Self {
            connection,
            publisher,
            consumer,
        })
    }
}

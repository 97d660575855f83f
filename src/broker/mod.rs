//! AMQP broker client: topology, Publisher, Consumer, and the
//! process-wide handle the worker binary builds once at startup.

mod consumer;
mod handle;
mod publisher;
mod types;

pub use consumer::{CommandHandler, Consumer, ConsumeEvent};
pub use handle::BrokerHandle;
pub use publisher::Publisher;
pub use types::{
    CMD_QUEUE, CONSUMER_SETTLE_DELAY, ERROR_CONSUMER_TAG, ERROR_QUEUE, EXCHANGE, MQ_URI_ENV_VAR,
    OUTPUT_CONSUMER_TAG, OUTPUT_QUEUE, PUBLISH_MAX_ATTEMPTS, PUBLISH_RETRY_BASE_DELAY_MS,
    ROUTE_CMD_QUEUE, ROUTE_ERROR_QUEUE, ROUTE_OUTPUT_QUEUE, queue_routing_keys,
};

//! Broker topology constants (spec 3's table) and the wire messages
//! carried over it.

/// The single direct, non-durable exchange all queues bind to.
pub const EXCHANGE: &str = "x-conflow";

pub const CMD_QUEUE: &str = "cmd-queue";
pub const OUTPUT_QUEUE: &str = "output-queue";
pub const ERROR_QUEUE: &str = "error-queue";

pub const ROUTE_CMD_QUEUE: &str = "route-cmd-queue";
pub const ROUTE_OUTPUT_QUEUE: &str = "route-output-queue";
pub const ROUTE_ERROR_QUEUE: &str = "route-error-queue";

pub const OUTPUT_CONSUMER_TAG: &str = "output-consumer";
pub const ERROR_CONSUMER_TAG: &str = "error-consumer";

/// Environment variable carrying the broker connection URI, consumed by
/// the Task Executor (spec 6).
pub const MQ_URI_ENV_VAR: &str = "CONFLOW_MQ_URI";

/// First retry delay for unroutable-publish backoff (spec 4.4).
pub const PUBLISH_RETRY_BASE_DELAY_MS: u64 = 500;
/// Maximum publish attempts before surfacing an exhausted-retry error.
pub const PUBLISH_MAX_ATTEMPTS: u32 = 10;
/// How long to wait for a Basic.Return after each publish before deciding
/// the message was routed.
pub const PUBLISH_RETURN_WAIT: std::time::Duration = std::time::Duration::from_millis(1);
/// Settling interval after all consumer streams report ready, before the
/// Task Executor starts publishing (spec 4.5 step 4, flagged as a known
/// soft spot in spec 9's DESIGN NOTES).
pub const CONSUMER_SETTLE_DELAY: std::time::Duration = std::time::Duration::from_secs(3);

/// The three queues a broker client declares, bound to [`EXCHANGE`] with
/// their fixed routing keys.
pub fn queue_routing_keys() -> std::collections::BTreeMap<&'static str, &'static str> {
    [
        (CMD_QUEUE, ROUTE_CMD_QUEUE),
        (OUTPUT_QUEUE, ROUTE_OUTPUT_QUEUE),
        (ERROR_QUEUE, ROUTE_ERROR_QUEUE),
    ]
    .into_iter()
    .collect()
}

//! gRPC transport glue: TLS credential loading and a typed per-worker
//! client. The generated proto types/service traits live in
//! [`crate::proto`]; the service *implementations* live in
//! [`crate::worker_service`].

mod client;
mod tls;

pub use client::WorkerClient;
pub use tls::{TlsFlags, load_client_tls, load_server_tls};

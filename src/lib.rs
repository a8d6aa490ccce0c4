//! usrv is a lightweight request/reply micro-service runtime.
//!
//! ## Overview
//!
//! A [`Client`] sends a [`Message`] to the `service/endpoint` bound by a
//! [`Server`] and awaits its single reply. Routing is done by a
//! [`Transport`](transport::Transport):
//!
//! * [`InMemoryTransport`](transport::memory::InMemoryTransport) hands messages
//!   over within one process,
//! * [`HttpTransport`](transport::http::HttpTransport) posts them over HTTP/1.1
//!   (optionally TLS), envelope in headers and payload in the body.
//!
//! Features:
//!
//! * [x] Correlated request/reply with per-request timeouts,
//! * [x] One task per request, so slow handlers do not block their endpoint,
//! * [x] Graceful server shutdown: queued requests are answered, in-flight ones awaited,
//! * [x] Middleware:
//!   * [x] JSON and Protobuf codec adapters (`json` and `protobuf` features),
//!   * [x] Request logging,
//!   * [x] Throttling.
//!
//! ## Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use usrv::transport::memory::InMemoryTransport;
//! use usrv::{Client, Message, Server, UsrvResult};
//!
//! #[tokio::main]
//! async fn main() -> UsrvResult<()> {
//!     let transport = Arc::new(InMemoryTransport::new());
//!
//!     // Server
//!     let mut server = Server::new("service", transport.clone());
//!     server
//!         .handle("endpoint", |req: &Message, res: &mut Message| {
//!             res.set_payload(format!("pong from {}", req.to()));
//!         })
//!         .await?;
//!     server.listen()?;
//!
//!     // Client
//!     let client = Client::new("service".to_string(), transport);
//!     let request = client.new_message("client", "endpoint");
//!     let reply = client.send(request, Duration::from_secs(1)).await;
//!
//!     // Server shutdown
//!     server.close().await;
//!
//!     let payload = reply.payload().map_err(Clone::clone)?;
//!     assert_eq!("pong from service.endpoint".as_bytes(), payload.as_ref());
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate getset;
#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate derive_new;
#[macro_use]
extern crate log;

pub(crate) mod reply;

/// Client issuing requests to one service.
pub mod client;
/// Usrv errors.
pub mod errors;
/// Endpoint handlers registered in [`Server`].
pub mod handler;
/// Pluggable structured logger.
pub mod logger;
/// Message envelope.
pub mod message;
/// Handler wrappers: codecs, request logging and throttling.
pub mod middleware;
/// Server dispatching requests to endpoint handlers.
pub mod server;
/// Test doubles.
pub mod testing;
/// In-process and HTTP transports.
pub mod transport;

pub use self::client::Client;
pub use self::errors::{CodecError, ConfigError, UsrvError, UsrvResult};
pub use self::handler::Handler;
pub use self::message::{Message, Properties};
pub use self::reply::ReplyFuture;
pub use self::server::Server;

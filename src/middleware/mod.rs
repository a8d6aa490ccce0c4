//! Handler-to-handler wrappers composed around endpoint handlers.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use usrv::logger::LogFacade;
//! use usrv::middleware::{log_request, Throttle};
//! use usrv::Message;
//!
//! let handler = |_: &Message, res: &mut Message| res.set_payload("OK");
//! let handler = log_request(
//!     Arc::new(LogFacade),
//!     Throttle::new(10, Duration::from_millis(100), handler).unwrap(),
//! );
//! ```

pub mod codec;
#[cfg(feature = "json")]
pub mod json;
pub mod log;
#[cfg(feature = "protobuf")]
pub mod protobuf;
pub mod throttle;

pub use self::codec::{Codec, CodecHandler};
#[cfg(feature = "json")]
pub use self::json::{json_handler, Json};
pub use self::log::{log_request, RequestLogger};
#[cfg(feature = "protobuf")]
pub use self::protobuf::{protobuf_handler, Protobuf};
pub use self::throttle::Throttle;

//! Network transport: one HTTP POST per request, envelope fields in headers.
//!
//! | Envelope        | Wire                                          |
//! |-----------------|-----------------------------------------------|
//! | `to`            | `Host` header and path (`service/endpoint`)   |
//! | `from`          | `Referer` header                              |
//! | correlation id  | `X-Usrv-CorrelationId` header                 |
//! | properties      | `X-Usrv-Properties` header, JSON object       |
//! | payload         | body                                          |
//! | error (reply)   | `error` property, empty body                  |

use crate::errors::{UsrvError, UsrvResult};
use crate::message::Message;
use crate::reply::{reply_channel, ReplyFuture};
use crate::transport::{deliver_reply, new_correlation_id, Inbox, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

mod client;
pub mod config;
pub mod headers;
mod server;
mod tls;

pub use config::{HttpConfig, HttpConfigBuilder};
pub use headers::UsrvHeaderKey;

use client::HttpClient;
use server::{Listener, Routes};
use tls::TlsSettings;

/// Transport posting requests over HTTP/1.1, optionally over TLS.
///
/// The listener is started by the first [`bind`](Transport::bind) on
/// `0.0.0.0:<port>`; a service name is the `host:port` authority clients use
/// to reach it.
#[derive(Clone)]
pub struct HttpTransport {
    inner: Arc<Inner>,
}

struct Inner {
    config: HttpConfig,
    routes: Arc<Routes>,
    listener: Mutex<Option<Listener>>,
    closed: AtomicBool,
    tls: Option<TlsSettings>,
    client: HttpClient,
}

impl HttpTransport {
    /// Validates `config` and loads the TLS certificate if one is configured.
    pub fn new(config: HttpConfig) -> UsrvResult<HttpTransport> {
        config.validate()?;
        let tls = match (&config.cert_file, &config.cert_key_file) {
            (Some(cert_file), Some(cert_key_file)) => {
                Some(TlsSettings::load(cert_file, cert_key_file)?)
            }
            _ => None,
        };
        let client = HttpClient::new(&config, tls.as_ref().map(|tls| tls.connector.clone()));
        Ok(HttpTransport {
            inner: Arc::new(Inner {
                routes: Arc::new(Routes::new(config.logger.clone())),
                listener: Mutex::new(None),
                closed: AtomicBool::new(false),
                tls,
                client,
                config,
            }),
        })
    }

    /// Builds the transport from `port`, `certFile` and `certKeyFile` parameters.
    pub fn from_params(params: &HashMap<String, String>) -> UsrvResult<HttpTransport> {
        HttpTransport::new(HttpConfig::from_params(params)?)
    }

    pub fn config(&self) -> &HttpConfig {
        &self.inner.config
    }

    /// Address of the running listener, `None` before the first bind or after close.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .listener
            .lock()
            .await
            .as_ref()
            .map(Listener::local_addr)
    }
}

impl Debug for HttpTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("port", &self.inner.config.effective_port())
            .field("tls", &self.inner.tls.is_some())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn endpoint_key(service: &str, endpoint: &str) -> String {
    format!("{}/{}", service, endpoint.trim_start_matches('/'))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn bind(&self, service: &str, endpoint: &str) -> UsrvResult<Inbox> {
        let key = endpoint_key(service, endpoint);
        if self.inner.routes.contains(&key).await {
            return Err(UsrvError::EndpointAlreadyBound);
        }

        {
            let mut listener = self.inner.listener.lock().await;
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(UsrvError::TransportClosed);
            }
            if listener.is_none() {
                let port = self.inner.config.effective_port();
                let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
                let acceptor = self.inner.tls.as_ref().map(|tls| tls.acceptor.clone());
                let routes = self.inner.routes.clone();
                *listener = Some(Listener::start(addr, acceptor, routes).await?);
            }
        }

        debug!("Binding endpoint {}", key);
        let (sender, receiver) = mpsc::channel(self.inner.config.inbox_size.max(1));
        self.inner.routes.insert(key, sender).await?;
        Ok(receiver)
    }

    async fn unbind(&self, service: &str, endpoint: &str) {
        let key = endpoint_key(service, endpoint);
        if self.inner.routes.remove(&key).await {
            debug!("Unbound endpoint {}", key);
        }
    }

    fn send(&self, message: Message, timeout: Duration, expect_reply: bool) -> Option<ReplyFuture> {
        if !expect_reply {
            deliver_reply(message);
            return None;
        }

        let (sender, future) = reply_channel(&message);
        let client = self.inner.client.clone();
        tokio::spawn(async move {
            let reply = client.exchange(message, timeout).await;
            if sender.send(reply).is_err() {
                debug!("Caller abandoned the request before the reply arrived");
            }
        });
        Some(future)
    }

    fn new_message_to(&self, from: &str, service: &str, endpoint: &str) -> Message {
        Message::new(from, endpoint_key(service, endpoint), new_correlation_id())
    }

    fn new_reply_to(&self, request: &mut Message) -> Message {
        Message::reply(request)
    }

    async fn close(&self) -> UsrvResult<()> {
        let listener = {
            let mut listener = self.inner.listener.lock().await;
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            listener.take()
        };
        debug!("Closing http transport");
        if let Some(listener) = listener {
            listener.stop().await;
        }
        self.inner.routes.clear().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ConfigError;

    #[test]
    fn endpoint_key_joins_with_slash() {
        assert_eq!("localhost:8080/ep1", endpoint_key("localhost:8080", "ep1"));
        assert_eq!("localhost:8080/ep1", endpoint_key("localhost:8080", "/ep1"));
    }

    #[test]
    fn half_tls_config_is_rejected() {
        let config = HttpConfigBuilder::default()
            .cert_file("cert.pem")
            .build()
            .unwrap();
        let err = HttpTransport::new(config).unwrap_err();
        assert_eq!(UsrvError::Config(ConfigError::IncompleteTls), err);
    }

    #[tokio::test]
    async fn messages_are_addressed_with_slash_separator() {
        let transport = HttpTransport::new(HttpConfig::with_port(0)).unwrap();
        let msg = transport.new_message_to("client", "localhost:8080", "ep1");
        assert_eq!("localhost:8080/ep1", msg.to());
        assert_eq!(None, transport.local_addr().await);
    }

    #[tokio::test]
    async fn bind_starts_listener_once() {
        let transport = HttpTransport::new(HttpConfig::with_port(0)).unwrap();
        let _ep1 = transport.bind("localhost", "ep1").await.unwrap();
        let addr = transport.local_addr().await.expect("listening");
        let _ep2 = transport.bind("localhost", "ep2").await.unwrap();

        assert_eq!(Some(addr), transport.local_addr().await);
        assert_eq!(
            UsrvError::EndpointAlreadyBound,
            transport.bind("localhost", "ep1").await.unwrap_err()
        );

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert_eq!(None, transport.local_addr().await);
        assert_eq!(
            UsrvError::TransportClosed,
            transport.bind("localhost", "ep3").await.unwrap_err()
        );
    }
}

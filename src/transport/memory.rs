use crate::errors::{UsrvError, UsrvResult};
use crate::logger::{LogFacade, Logger};
use crate::message::Message;
use crate::reply::{reply_channel, ReplyFuture};
use crate::transport::{deliver_reply, new_correlation_id, Inbox, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Sender};
use tokio::sync::RwLock;

/// Transport handing messages directly from a client send to a bound
/// endpoint's inbox within one process.
#[derive(Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

struct Inner {
    logger: Arc<dyn Logger>,
    inbox_size: usize,
    endpoints: RwLock<HashMap<String, Sender<Message>>>,
    closed: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> InMemoryTransport {
        InMemoryTransport::with_logger(Arc::new(LogFacade))
    }

    pub fn with_logger(logger: Arc<dyn Logger>) -> InMemoryTransport {
        InMemoryTransport::with_config(logger, 1)
    }

    /// `inbox_size` is clamped to at least one queued message.
    pub fn with_config(logger: Arc<dyn Logger>, inbox_size: usize) -> InMemoryTransport {
        InMemoryTransport {
            inner: Arc::new(Inner {
                logger,
                inbox_size: inbox_size.max(1),
                endpoints: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        InMemoryTransport::new()
    }
}

impl Debug for InMemoryTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("inbox_size", &self.inner.inbox_size)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

fn endpoint_key(service: &str, endpoint: &str) -> String {
    format!("{}.{}", service, endpoint)
}

impl Inner {
    async fn route(&self, request: Message, timeout: Duration) -> Message {
        let inbox = self.endpoints.read().await.get(request.to()).cloned();
        let inbox = match inbox {
            Some(inbox) => inbox,
            None => {
                self.logger.error(
                    "Unknown destination",
                    &[("from", request.from()), ("to", request.to())],
                );
                return Message::failed_reply(&request, UsrvError::ServiceUnavailable);
            }
        };

        let mut shadow = request.shadow();
        let (reply_sender, reply_future) = reply_channel(&shadow);
        shadow.set_reply_sender(reply_sender);
        let exchange = async move {
            if let Err(err) = inbox.send(shadow).await {
                debug!("Endpoint {} stopped accepting requests", err.0.to());
                return Message::failed_reply(&err.0, UsrvError::ServiceUnavailable);
            }
            reply_future.await
        };

        if timeout.is_zero() {
            return exchange.await;
        }
        match tokio::time::timeout(timeout, exchange).await {
            Ok(reply) => reply,
            Err(_) => {
                debug!(
                    "Request {} to {} timed out after {:?}",
                    request.correlation_id(),
                    request.to(),
                    timeout
                );
                Message::failed_reply(&request, UsrvError::Timeout)
            }
        }
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn bind(&self, service: &str, endpoint: &str) -> UsrvResult<Inbox> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(UsrvError::TransportClosed);
        }
        let key = endpoint_key(service, endpoint);
        let mut endpoints = self.inner.endpoints.write().await;
        if endpoints.contains_key(&key) {
            return Err(UsrvError::EndpointAlreadyBound);
        }
        debug!("Binding endpoint {}", key);
        let (sender, receiver) = mpsc::channel(self.inner.inbox_size);
        endpoints.insert(key, sender);
        Ok(receiver)
    }

    async fn unbind(&self, service: &str, endpoint: &str) {
        let key = endpoint_key(service, endpoint);
        if self.inner.endpoints.write().await.remove(&key).is_some() {
            debug!("Unbound endpoint {}", key);
        }
    }

    fn send(&self, message: Message, timeout: Duration, expect_reply: bool) -> Option<ReplyFuture> {
        if !expect_reply {
            deliver_reply(message);
            return None;
        }

        let (sender, future) = reply_channel(&message);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let reply = inner.route(message, timeout).await;
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
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("Closing in-memory transport");
        self.inner.endpoints.write().await.clear();
        Ok(())
    }
}

use crate::errors::UsrvResult;
use crate::message::Message;
use crate::reply::ReplyFuture;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod http;
pub mod memory;

/// Consumer side of a bound endpoint's queue of inbound requests.
pub type Inbox = mpsc::Receiver<Message>;

/// Routes messages between clients and bound endpoints.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Registers `service`/`endpoint` and returns the queue of its inbound requests.
    async fn bind(&self, service: &str, endpoint: &str) -> UsrvResult<Inbox>;

    /// Removes the `service`/`endpoint` binding so it can be bound again.
    /// Unbinding an unknown endpoint is a no-op.
    async fn unbind(&self, service: &str, endpoint: &str);

    /// Sends `message`.
    ///
    /// With `expect_reply` set, returns the future of the single reply; a zero
    /// `timeout` waits indefinitely. Otherwise `message` is a reply and it is
    /// posted into the reply slot of the request it answers.
    ///
    /// Must be called from within a tokio runtime.
    fn send(&self, message: Message, timeout: Duration, expect_reply: bool) -> Option<ReplyFuture>;

    /// Allocates a request to `service`/`endpoint` with a fresh correlation token.
    fn new_message_to(&self, from: &str, service: &str, endpoint: &str) -> Message;

    /// Allocates the reply to `request`, taking over its reply linkage.
    fn new_reply_to(&self, request: &mut Message) -> Message;

    /// Releases resources and refuses further binds. Idempotent.
    async fn close(&self) -> UsrvResult<()>;
}

pub(crate) fn new_correlation_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Posts a reply into its paired slot, logging replies nobody waits for.
pub(crate) fn deliver_reply(reply: Message) {
    let correlation_id = reply.correlation_id().clone();
    if !reply.deliver() {
        debug!(
            "Dropping reply for correlation id {}: no request waiting",
            correlation_id
        );
    }
}

use crate::errors::UsrvError;
use crate::message::Message;
use futures::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

pub(crate) type ReplySender = oneshot::Sender<Message>;

/// Creates the single-shot reply channel for `request`.
///
/// The returned future remembers the request's envelope so it can still
/// resolve with a well-formed `ServiceUnavailable` reply if the sender is
/// dropped before delivering.
pub(crate) fn reply_channel(request: &Message) -> (ReplySender, ReplyFuture) {
    let (sender, receiver) = oneshot::channel();
    let future = ReplyFuture {
        receiver,
        from: request.to().clone(),
        to: request.from().clone(),
        correlation_id: request.correlation_id().clone(),
    };
    (sender, future)
}

/// Reply future of a request that never reached a transport; it resolves
/// with `ServiceUnavailable` at once.
pub(crate) fn unanswered(from: String, to: String, correlation_id: String) -> ReplyFuture {
    let (_, receiver) = oneshot::channel();
    ReplyFuture {
        receiver,
        from: to,
        to: from,
        correlation_id,
    }
}

/// Resolves to the one reply of an outbound request.
#[derive(Debug)]
#[must_use = "the reply is only observed by awaiting the future"]
pub struct ReplyFuture {
    receiver: oneshot::Receiver<Message>,
    from: String,
    to: String,
    correlation_id: String,
}

impl ReplyFuture {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    fn lost_reply(&self) -> Message {
        debug!(
            "Reply for correlation id {} was dropped before delivery",
            self.correlation_id
        );
        let mut reply = Message::new(&self.from, &self.to, &self.correlation_id);
        reply.set_error(UsrvError::ServiceUnavailable);
        reply
    }
}

impl Future for ReplyFuture {
    type Output = Message;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(reply)) => Poll::Ready(reply),
            Poll::Ready(Err(_)) => Poll::Ready(self.lost_reply()),
            Poll::Pending => Poll::Pending,
        }
    }
}

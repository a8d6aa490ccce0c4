use crate::message::Message;
use crate::reply::{unanswered, ReplyFuture};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;

/// Issues requests to the endpoints of one service.
///
/// Stateless; clone it or share it across tasks freely.
#[derive(Debug, Clone, new)]
pub struct Client {
    service: String,
    transport: Arc<dyn Transport>,
}

impl Client {
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Allocates a request from `from` to `endpoint` of this client's service.
    pub fn new_message<STR: AsRef<str>>(&self, from: STR, endpoint: STR) -> Message {
        self.transport
            .new_message_to(from.as_ref(), &self.service, endpoint.as_ref())
    }

    /// Sends `message` and returns the future of its reply. A zero `timeout` waits
    /// for as long as the transport allows.
    pub fn send(&self, message: Message, timeout: Duration) -> ReplyFuture {
        let from = message.from().clone();
        let to = message.to().clone();
        let correlation_id = message.correlation_id().clone();
        match self.transport.send(message, timeout, true) {
            Some(future) => future,
            None => {
                error!("Transport {:?} returned no reply future", self.transport);
                unanswered(from, to, correlation_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UsrvError;
    use crate::logger::NullLogger;
    use crate::transport::memory::InMemoryTransport;
    use bytes::Bytes;

    fn client() -> (Client, Arc<InMemoryTransport>) {
        let transport = Arc::new(InMemoryTransport::with_logger(Arc::new(NullLogger)));
        (Client::new("srv".to_string(), transport.clone()), transport)
    }

    #[tokio::test]
    async fn new_message_targets_client_service() {
        let (client, _) = client();
        let msg = client.new_message("caller", "ep1");
        assert_eq!("caller", msg.from());
        assert_eq!("srv.ep1", msg.to());
    }

    #[tokio::test]
    async fn send_resolves_with_handler_reply() {
        let (client, transport) = client();
        let mut inbox = transport.bind("srv", "ep1").await.unwrap();
        let request = client.new_message("caller", "ep1");
        let correlation_id = request.correlation_id().clone();

        let reply = client.send(request, Duration::from_secs(1));
        let mut received = inbox.recv().await.unwrap();
        let mut response = transport.new_reply_to(&mut received);
        response.set_payload("OK");
        transport.send(response, Duration::ZERO, false);

        let reply = reply.await;
        assert_eq!(Ok(&Bytes::from("OK")), reply.payload());
        assert_eq!(&correlation_id, reply.correlation_id());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (client, transport) = client();
        let _inbox = transport.bind("srv", "ep1").await.unwrap();
        let request = client.new_message("caller", "ep1");

        let reply = client.send(request, Duration::from_millis(100)).await;

        assert_eq!(Err(&UsrvError::Timeout), reply.payload());
    }
}

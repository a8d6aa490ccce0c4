use crate::message::Message;
use async_trait::async_trait;

/// Endpoint handler: populates `response` for `request`.
///
/// Handlers are registered with [`Server::handle`](crate::Server::handle)
/// and are usually wrapped by [`middleware`](crate::middleware).
/// Any `Fn(&Message, &mut Message)` closure is a handler.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, request: &Message, response: &mut Message);
}

#[async_trait]
impl<F> Handler for F
where
    F: Fn(&Message, &mut Message) + Send + Sync + 'static,
{
    async fn handle(&self, request: &Message, response: &mut Message) {
        self(request, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn closure_is_a_handler() {
        let handler = |req: &Message, res: &mut Message| {
            res.set_payload(format!("echo {}", req.from()));
        };
        let request = Message::new("client", "srv/ep", "1");
        let mut response = Message::new("srv/ep", "client", "1");

        handler.handle(&request, &mut response).await;

        assert_eq!(Ok(&Bytes::from("echo client")), response.payload());
    }
}

use crate::handler::Handler;
use crate::logger::Logger;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Logs every request passing through the wrapped handler, with its
/// addresses, payload sizes (or error) and the handling time in nanoseconds.
#[derive(Debug)]
pub struct RequestLogger<H> {
    logger: Arc<dyn Logger>,
    handler: H,
}

pub fn log_request<H: Handler>(logger: Arc<dyn Logger>, handler: H) -> RequestLogger<H> {
    RequestLogger { logger, handler }
}

#[async_trait]
impl<H: Handler> Handler for RequestLogger<H> {
    async fn handle(&self, request: &Message, response: &mut Message) {
        let start = Instant::now();
        self.handler.handle(request, response).await;
        let nanos = start.elapsed().as_nanos();

        let req_len = request.payload().map(|payload| payload.len()).unwrap_or(0);
        match response.payload() {
            Ok(payload) => self.logger.info(
                "Processed request",
                &[
                    ("from", request.from()),
                    ("to", request.to()),
                    ("correlation_id", request.correlation_id()),
                    ("req_len", &req_len),
                    ("res_len", &payload.len()),
                    ("time", &nanos),
                ],
            ),
            Err(err) => self.logger.error(
                "Request failed",
                &[
                    ("from", request.from()),
                    ("to", request.to()),
                    ("correlation_id", request.correlation_id()),
                    ("req_len", &req_len),
                    ("error", err),
                    ("time", &nanos),
                ],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UsrvError;
    use crate::logger::Level;
    use crate::testing::RecordingLogger;

    async fn call<H: Handler>(handler: &H) -> Message {
        let mut request = Message::new("test", "srv/ep", "1");
        request.set_payload("ping");
        let mut response = Message::new("srv/ep", "test", "1");
        handler.handle(&request, &mut response).await;
        response
    }

    #[tokio::test]
    async fn logs_processed_request() {
        let logger = Arc::new(RecordingLogger::default());
        let handler = log_request(logger.clone(), |_: &Message, res: &mut Message| {
            res.set_payload("OK");
        });

        call(&handler).await;

        let entries = logger.entries();
        assert_eq!(1, entries.len());
        assert_eq!(Level::Info, entries[0].level);
        assert_eq!("Processed request", entries[0].message);
        assert_eq!(Some("test"), entries[0].field("from"));
        assert_eq!(Some("srv/ep"), entries[0].field("to"));
        assert_eq!(Some("4"), entries[0].field("req_len"));
        assert_eq!(Some("2"), entries[0].field("res_len"));
        assert!(entries[0].field("time").is_some());
    }

    #[tokio::test]
    async fn logs_failed_request() {
        let logger = Arc::new(RecordingLogger::default());
        let handler = log_request(logger.clone(), |_: &Message, res: &mut Message| {
            res.set_error(UsrvError::handler("An error"));
        });

        let response = call(&handler).await;

        assert_eq!(Err(&UsrvError::handler("An error")), response.payload());
        let entries = logger.entries();
        assert_eq!(1, entries.len());
        assert_eq!(Level::Error, entries[0].level);
        assert_eq!("Request failed", entries[0].message);
        assert_eq!(Some("An error"), entries[0].field("error"));
        assert_eq!(None, entries[0].field("res_len"));
    }
}

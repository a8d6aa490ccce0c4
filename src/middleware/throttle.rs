use crate::errors::{ConfigError, UsrvError};
use crate::handler::Handler;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Limits the wrapped handler to `max_concurrent` parallel invocations.
///
/// A request waiting longer than the admission `timeout` for a free slot is
/// answered with [`Timeout`](UsrvError::Timeout) without reaching the wrapped
/// handler. A zero timeout waits indefinitely.
#[derive(Debug)]
pub struct Throttle<H> {
    permits: Arc<Semaphore>,
    timeout: Duration,
    handler: H,
}

impl<H: Handler> Throttle<H> {
    pub fn new(max_concurrent: usize, timeout: Duration, handler: H) -> Result<Self, ConfigError> {
        if max_concurrent == 0 {
            return Err(ConfigError::InvalidMaxConcurrent);
        }
        Ok(Throttle {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            timeout,
            handler,
        })
    }

    /// Number of free admission slots.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl<H: Handler> Handler for Throttle<H> {
    async fn handle(&self, request: &Message, response: &mut Message) {
        let acquire = self.permits.acquire();
        let permit = if self.timeout.is_zero() {
            acquire.await
        } else {
            match tokio::time::timeout(self.timeout, acquire).await {
                Ok(permit) => permit,
                Err(_) => {
                    debug!(
                        "Request {} to {} not admitted within {:?}",
                        request.correlation_id(),
                        request.to(),
                        self.timeout
                    );
                    response.set_error(UsrvError::Timeout);
                    return;
                }
            }
        };
        match permit {
            Ok(_permit) => self.handler.handle(request, response).await,
            Err(_) => response.set_error(UsrvError::ServiceUnavailable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct Blocking {
        release: Arc<Notify>,
    }

    #[async_trait]
    impl Handler for Blocking {
        async fn handle(&self, _request: &Message, response: &mut Message) {
            self.release.notified().await;
            response.set_payload("OK");
        }
    }

    fn message() -> Message {
        Message::new("test", "srv/ep", "1")
    }

    #[test]
    fn zero_max_concurrent_is_rejected() {
        let throttle = Throttle::new(0, Duration::ZERO, |_: &Message, _: &mut Message| {});
        assert!(matches!(throttle, Err(ConfigError::InvalidMaxConcurrent)));
    }

    #[tokio::test(start_paused = true)]
    async fn request_times_out_while_slot_is_busy() {
        let release = Arc::new(Notify::new());
        let throttle = Arc::new(
            Throttle::new(
                1,
                Duration::from_millis(1),
                Blocking {
                    release: release.clone(),
                },
            )
            .unwrap(),
        );

        let first = {
            let throttle = throttle.clone();
            tokio::spawn(async move {
                let mut response = message();
                throttle.handle(&message(), &mut response).await;
                response
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(0, throttle.available());

        let mut second = message();
        throttle.handle(&message(), &mut second).await;
        assert_eq!(Err(&UsrvError::Timeout), second.payload());

        release.notify_one();
        let first = first.await.unwrap();
        assert_eq!(Ok(&bytes::Bytes::from("OK")), first.payload());
        assert_eq!(1, throttle.available());
    }

    #[tokio::test]
    async fn permit_is_released_after_handler() {
        let throttle = Throttle::new(2, Duration::ZERO, |_: &Message, res: &mut Message| {
            res.set_payload("OK");
        })
        .unwrap();

        let mut response = message();
        throttle.handle(&message(), &mut response).await;

        assert_eq!(2, throttle.available());
        assert_eq!(Ok(&bytes::Bytes::from("OK")), response.payload());
    }

    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        max: AtomicUsize,
    }

    struct CountInFlight(Arc<InFlight>);

    #[async_trait]
    impl Handler for CountInFlight {
        async fn handle(&self, _request: &Message, response: &mut Message) {
            let current = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.max.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.0.current.fetch_sub(1, Ordering::SeqCst);
            response.set_payload("OK");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_concurrent() {
        // GIVEN
        let in_flight = Arc::new(InFlight::default());
        let throttle = Throttle::new(3, Duration::ZERO, CountInFlight(in_flight.clone())).unwrap();

        // WHEN
        let responses = join_all((0..10).map(|_| async {
            let mut response = message();
            throttle.handle(&message(), &mut response).await;
            response
        }))
        .await;

        // THEN
        assert_eq!(3, in_flight.max.load(Ordering::SeqCst));
        assert_eq!(0, in_flight.current.load(Ordering::SeqCst));
        assert_eq!(3, throttle.available());
        for response in responses {
            assert_eq!(Ok(&bytes::Bytes::from("OK")), response.payload());
        }
    }
}

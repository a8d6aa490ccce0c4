use crate::errors::{ConfigError, UsrvError, UsrvResult};
use crate::handler::Handler;
use crate::message::Message;
use crate::transport::{Inbox, Transport};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use strum_macros::IntoStaticStr;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Serves the endpoints of one service.
///
/// Endpoints are registered with [`handle`](Server::handle), then
/// [`listen`](Server::listen) starts one dispatcher per endpoint. Every
/// inbound request is handled on its own task, so a slow handler does not
/// hold up other requests to the same endpoint.
pub struct Server {
    service: String,
    transport: Arc<dyn Transport>,
    endpoints: Mutex<Vec<Endpoint>>,
    listening: bool,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

struct Endpoint {
    name: String,
    inbox: Inbox,
    handler: Arc<dyn Handler>,
}

impl Debug for Server {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("service", &self.service)
            .field("transport", &self.transport)
            .field("unlistened", &self.endpoints.try_lock().map(|eps| eps.len()).ok())
            .field("listening", &self.listening)
            .field("tasks", &self.tracker.len())
            .finish()
    }
}

impl Server {
    pub fn new<STR: Into<String>>(service: STR, transport: Arc<dyn Transport>) -> Server {
        Server {
            service: service.into(),
            transport,
            endpoints: Mutex::new(Vec::new()),
            listening: false,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Binds `endpoint` with the transport and registers its handler.
    ///
    /// Must be called before [`listen`](Server::listen).
    pub async fn handle<STR: AsRef<str>, HANDLER: Handler>(
        &mut self,
        endpoint: STR,
        handler: HANDLER,
    ) -> UsrvResult<()> {
        let name = endpoint.as_ref();
        if self.listening {
            return Err(
                ConfigError::Error(format!("Cannot register '{}' after listen", name)).into(),
            );
        }
        if self.endpoints.get_mut().iter().any(|ep| ep.name == name) {
            return Err(UsrvError::EndpointAlreadyBound);
        }
        let inbox = self.transport.bind(&self.service, name).await?;
        debug!("Registered handler for {}/{}", self.service, name);
        self.endpoints.get_mut().push(Endpoint {
            name: name.to_string(),
            inbox,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    /// Spawns one dispatcher per registered endpoint and returns.
    pub fn listen(&mut self) -> UsrvResult<()> {
        if self.endpoints.get_mut().is_empty() {
            return Err(UsrvError::NoEndpointsBound);
        }
        self.listening = true;
        let endpoints = self.endpoints.get_mut().drain(..).collect::<Vec<_>>();
        for endpoint in endpoints {
            self.tracker.spawn(self.dispatcher(endpoint).run());
        }
        Ok(())
    }

    /// Stops the dispatchers, unbinds the endpoints and waits for every
    /// in-flight handler.
    ///
    /// Requests still queued in an inbox are answered with
    /// [`ServiceUnavailable`](UsrvError::ServiceUnavailable).
    pub async fn close(&self) {
        debug!("Closing server {}", self.service);
        self.shutdown.cancel();
        let idle = self.endpoints.lock().await.drain(..).collect::<Vec<_>>();
        for endpoint in idle {
            self.dispatcher(endpoint).stop().await;
        }
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn dispatcher(&self, endpoint: Endpoint) -> Dispatcher {
        Dispatcher {
            service: self.service.clone(),
            name: endpoint.name,
            inbox: endpoint.inbox,
            handler: endpoint.handler,
            transport: self.transport.clone(),
            shutdown: self.shutdown.clone(),
            tracker: self.tracker.clone(),
            state: DispatcherState::Idle,
        }
    }
}

#[derive(IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq)]
enum DispatcherState {
    Idle,
    Receiving,
    SpawnedChild,
    Stopped,
}

struct Dispatcher {
    service: String,
    name: String,
    inbox: Inbox,
    handler: Arc<dyn Handler>,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    state: DispatcherState,
}

impl Dispatcher {
    fn transition(&mut self, state: DispatcherState) {
        trace!(
            "Dispatcher {}/{}: {} -> {}",
            self.service,
            self.name,
            <&'static str>::from(self.state),
            <&'static str>::from(state)
        );
        self.state = state;
    }

    async fn run(mut self) {
        loop {
            self.transition(DispatcherState::Receiving);
            let request = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                request = self.inbox.recv() => request,
            };
            match request {
                Some(request) => {
                    self.spawn_child(request);
                    self.transition(DispatcherState::SpawnedChild);
                    self.transition(DispatcherState::Idle);
                }
                None => {
                    debug!("Inbox of {}/{} closed by transport", self.service, self.name);
                    break;
                }
            }
        }
        self.stop().await;
    }

    fn spawn_child(&self, mut request: Message) {
        let transport = self.transport.clone();
        let handler = self.handler.clone();
        self.tracker.spawn(async move {
            let mut reply = transport.new_reply_to(&mut request);
            handler.handle(&request, &mut reply).await;
            transport.send(reply, Duration::ZERO, false);
        });
    }

    /// Unbinds the endpoint, refuses new requests and answers the ones already queued.
    async fn stop(mut self) {
        self.transition(DispatcherState::Stopped);
        self.transport.unbind(&self.service, &self.name).await;
        self.inbox.close();
        while let Some(mut request) = self.inbox.recv().await {
            debug!(
                "Rejecting request {} queued on stopped endpoint {}/{}",
                request.correlation_id(),
                self.service,
                self.name
            );
            let mut reply = self.transport.new_reply_to(&mut request);
            reply.set_error(UsrvError::ServiceUnavailable);
            self.transport.send(reply, Duration::ZERO, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::logger::NullLogger;
    use crate::transport::memory::InMemoryTransport;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn transport() -> Arc<dyn Transport> {
        Arc::new(InMemoryTransport::with_logger(Arc::new(NullLogger)))
    }

    fn ok_handler(_req: &Message, res: &mut Message) {
        res.set_payload("OK");
    }

    #[tokio::test]
    async fn listen_without_endpoints_fails() {
        let mut server = Server::new("srv", transport());
        assert_eq!(Err(UsrvError::NoEndpointsBound), server.listen());
    }

    #[tokio::test]
    async fn duplicate_endpoint_fails() {
        let mut server = Server::new("srv", transport());
        server.handle("ep1", ok_handler).await.unwrap();

        let err = server.handle("ep1", ok_handler).await.unwrap_err();

        assert_eq!(UsrvError::EndpointAlreadyBound, err);
    }

    #[tokio::test]
    async fn handle_after_listen_fails() {
        let mut server = Server::new("srv", transport());
        server.handle("ep1", ok_handler).await.unwrap();
        server.listen().unwrap();

        let err = server.handle("ep2", ok_handler).await.unwrap_err();

        assert!(matches!(err, UsrvError::Config(_)));
        server.close().await;
    }

    #[tokio::test]
    async fn slow_handler_does_not_block_its_endpoint() {
        let transport = transport();
        let release = Arc::new(Notify::new());
        let mut server = Server::new("srv", transport.clone());
        server
            .handle(
                "ep1",
                WaitOnSlow {
                    release: release.clone(),
                },
            )
            .await
            .unwrap();
        server.listen().unwrap();
        let client = Client::new("srv".to_string(), transport);

        let mut slow = client.new_message("test", "ep1");
        slow.set_payload("slow");
        let slow = client.send(slow, Duration::ZERO);
        let mut fast = client.new_message("test", "ep1");
        fast.set_payload("fast");
        let fast = client.send(fast, Duration::ZERO).await;
        assert_eq!(Ok(&Bytes::from("fast")), fast.payload());

        release.notify_one();
        assert_eq!(Ok(&Bytes::from("slow")), slow.await.payload());
        server.close().await;
    }

    /// Echoes the payload, holding `slow` requests until released.
    struct WaitOnSlow {
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl Handler for WaitOnSlow {
        async fn handle(&self, request: &Message, response: &mut Message) {
            let payload = request.payload().cloned().unwrap_or_default();
            if payload == "slow" {
                self.release.notified().await;
            }
            response.set_payload(payload);
        }
    }

    #[tokio::test]
    async fn close_waits_for_in_flight_handlers() {
        let transport = transport();
        let done = Arc::new(AtomicUsize::new(0));
        let mut server = Server::new("srv", transport.clone());
        {
            let done = done.clone();
            server
                .handle("ep1", SleepThenCount { done })
                .await
                .unwrap();
        }
        server.listen().unwrap();
        let client = Client::new("srv".to_string(), transport);

        let reply = client.send(client.new_message("test", "ep1"), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;
        server.close().await;

        assert_eq!(1, done.load(Ordering::SeqCst));
        assert_eq!(Ok(&Bytes::new()), reply.await.payload());
    }

    struct SleepThenCount {
        done: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Handler for SleepThenCount {
        async fn handle(&self, _request: &Message, _response: &mut Message) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn requests_after_close_are_unavailable() {
        let transport = transport();
        let mut server = Server::new("srv", transport.clone());
        server.handle("ep1", ok_handler).await.unwrap();
        server.listen().unwrap();
        server.close().await;
        let client = Client::new("srv".to_string(), transport);

        let reply = client
            .send(client.new_message("test", "ep1"), Duration::ZERO)
            .await;

        assert_eq!(Err(&UsrvError::ServiceUnavailable), reply.payload());
    }

    #[tokio::test]
    async fn close_without_listen_answers_queued_requests() {
        let transport = transport();
        let mut server = Server::new("srv", transport.clone());
        server.handle("ep1", ok_handler).await.unwrap();
        let client = Client::new("srv".to_string(), transport.clone());
        let queued = client.send(client.new_message("test", "ep1"), Duration::ZERO);
        let blocked = client.send(client.new_message("test", "ep1"), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;

        server.close().await;

        assert_eq!(Err(&UsrvError::ServiceUnavailable), queued.await.payload());
        assert_eq!(Err(&UsrvError::ServiceUnavailable), blocked.await.payload());
        assert!(transport.bind("srv", "ep1").await.is_ok());
    }
}

use crate::errors::{UsrvError, UsrvResult};
use crate::logger::Logger;
use crate::message::{Message, PROPERTY_ERROR};
use crate::reply::reply_channel;
use crate::transport::http::headers::{
    decode_properties, encode_properties, header_string, UsrvHeaderKey,
};
use bytes::Bytes;
use http::header::HOST;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::Sender;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

/// Bound endpoints keyed by `service/endpoint`, shared by the transport and its listener.
#[derive(Debug)]
pub(crate) struct Routes {
    endpoints: RwLock<HashMap<String, Sender<Message>>>,
    logger: Arc<dyn Logger>,
}

impl Routes {
    pub(crate) fn new(logger: Arc<dyn Logger>) -> Routes {
        Routes {
            endpoints: RwLock::new(HashMap::new()),
            logger,
        }
    }

    pub(crate) async fn insert(&self, key: String, inbox: Sender<Message>) -> UsrvResult<()> {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.contains_key(&key) {
            return Err(UsrvError::EndpointAlreadyBound);
        }
        endpoints.insert(key, inbox);
        Ok(())
    }

    pub(crate) async fn remove(&self, key: &str) -> bool {
        self.endpoints.write().await.remove(key).is_some()
    }

    pub(crate) async fn contains(&self, key: &str) -> bool {
        self.endpoints.read().await.contains_key(key)
    }

    pub(crate) async fn clear(&self) {
        self.endpoints.write().await.clear();
    }

    async fn get(&self, key: &str) -> Option<Sender<Message>> {
        self.endpoints.read().await.get(key).cloned()
    }

    async fn handle_request(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        let key = route_key(&request);
        let inbox = match self.get(&key).await {
            Some(inbox) => inbox,
            None => {
                debug!("No endpoint bound for {}", key);
                return status_response(StatusCode::NOT_FOUND);
            }
        };

        let mut message = match read_request(key, request).await {
            Ok(message) => message,
            Err(err) => {
                debug!("Malformed request: {}", err);
                return status_response(StatusCode::BAD_REQUEST);
            }
        };
        let (reply_sender, reply_future) = reply_channel(&message);
        message.set_reply_sender(reply_sender);
        let to = message.to().clone();

        if let Err(err) = inbox.send(message).await {
            debug!("Endpoint {} stopped accepting requests", err.0.to());
            return status_response(StatusCode::SERVICE_UNAVAILABLE);
        }
        let reply = reply_future.await;

        match self.write_reply(&to, reply) {
            Ok(response) => response,
            Err(err) => {
                error!("Failed to write reply: {}", err);
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Flattens the reply envelope to headers; an error travels as the `error` property.
    fn write_reply(&self, to: &str, reply: Message) -> UsrvResult<Response<Full<Bytes>>> {
        let mut properties = reply.properties().clone();
        let body = match reply.payload() {
            Ok(payload) => {
                if properties.del(PROPERTY_ERROR).is_some() {
                    self.logger.warn(
                        "Dropping reserved property from successful reply",
                        &[("property", &PROPERTY_ERROR), ("to", reply.to())],
                    );
                }
                payload.clone()
            }
            Err(err) => {
                properties.set(PROPERTY_ERROR, err.to_string());
                Bytes::new()
            }
        };

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(UsrvHeaderKey::Referer.header_name(), to)
            .header(
                UsrvHeaderKey::CorrelationId.header_name(),
                reply.correlation_id().as_str(),
            );
        if let Some(value) = encode_properties(&properties)? {
            builder = builder.header(UsrvHeaderKey::Properties.header_name(), value);
        }
        Ok(builder.body(Full::new(body))?)
    }
}

/// `Host` header (or URI authority) followed by the request path.
fn route_key<B>(request: &Request<B>) -> String {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
        .unwrap_or_default();
    format!("{}{}", host, request.uri().path())
}

async fn read_request(to: String, request: Request<Incoming>) -> UsrvResult<Message> {
    let (parts, body) = request.into_parts();
    let from = header_string(&parts.headers, UsrvHeaderKey::Referer)?.unwrap_or_default();
    let correlation_id =
        header_string(&parts.headers, UsrvHeaderKey::CorrelationId)?.unwrap_or_default();
    let properties = decode_properties(&parts.headers)?;
    let payload = body.collect().await?.to_bytes();

    let mut message = Message::new(from, to, correlation_id).with_properties(properties);
    message.set_payload(payload);
    Ok(message)
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Running accept loop; stopped by [`Listener::stop`].
#[derive(Debug)]
pub(crate) struct Listener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Listener {
    pub(crate) async fn start(
        addr: SocketAddr,
        tls: Option<TlsAcceptor>,
        routes: Arc<Routes>,
    ) -> UsrvResult<Listener> {
        debug!("Starting listener on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, tls, routes, shutdown.clone()));
        Ok(Listener {
            local_addr,
            shutdown,
            task,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and waits until the listening socket is released.
    pub(crate) async fn stop(self) {
        self.shutdown.cancel();
        if let Err(err) = self.task.await {
            error!("Listener task failed: {}", err);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    routes: Arc<Routes>,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("Failed to accept connection: {}", err);
                    continue;
                }
            },
        };
        debug!("Handling incoming connection from {}", addr);
        let routes = routes.clone();
        let tls = tls.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, tls, routes).await {
                debug!("Connection error: {}", err);
            }
        });
    }
    debug!("Listener stopped");
}

async fn handle_connection(
    stream: TcpStream,
    tls: Option<TlsAcceptor>,
    routes: Arc<Routes>,
) -> UsrvResult<()> {
    match tls {
        Some(acceptor) => serve(acceptor.accept(stream).await?, routes).await,
        None => serve(stream, routes).await,
    }
}

async fn serve<IO>(io: IO, routes: Arc<Routes>) -> UsrvResult<()>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request| {
        let routes = routes.clone();
        async move { Ok::<_, Infallible>(routes.handle_request(request).await) }
    });
    http1::Builder::new()
        .serve_connection(TokioIo::new(io), service)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::NullLogger;
    use crate::testing::RecordingLogger;
    use http::header::HeaderValue;

    #[test]
    fn route_key_joins_host_and_path() {
        let request = Request::builder()
            .uri("/ep1?ignored=1")
            .header(HOST, "localhost:8080")
            .body(())
            .unwrap();
        assert_eq!("localhost:8080/ep1", route_key(&request));
    }

    #[test]
    fn error_reply_is_flattened_to_error_property() {
        let routes = Routes::new(Arc::new(NullLogger));
        let mut reply = Message::new("localhost:8080/ep1", "test", "42");
        reply.set_error(UsrvError::handler("An error"));

        let response = routes.write_reply("localhost:8080/ep1", reply).unwrap();

        assert_eq!(StatusCode::OK, response.status());
        assert_eq!(
            Some(&HeaderValue::from_static("42")),
            response.headers().get(UsrvHeaderKey::CorrelationId.header_name())
        );
        let properties = decode_properties(response.headers()).unwrap();
        assert_eq!(Some("An error"), properties.get(PROPERTY_ERROR));
    }

    #[test]
    fn reserved_property_is_removed_from_successful_reply() {
        let logger = Arc::new(RecordingLogger::default());
        let routes = Routes::new(logger.clone());
        let mut reply = Message::new("localhost:8080/ep1", "test", "42");
        reply.properties_mut().set(PROPERTY_ERROR, "not really");
        reply.set_payload("OK");

        let response = routes.write_reply("localhost:8080/ep1", reply).unwrap();

        assert!(response
            .headers()
            .get(UsrvHeaderKey::Properties.header_name())
            .is_none());
        assert_eq!(1, logger.entries().len());
    }

    #[tokio::test]
    async fn duplicate_route_is_rejected() {
        let routes = Routes::new(Arc::new(NullLogger));
        let (sender, _receiver) = tokio::sync::mpsc::channel(1);
        routes.insert("h/ep".to_string(), sender.clone()).await.unwrap();

        let err = routes.insert("h/ep".to_string(), sender).await.unwrap_err();

        assert_eq!(UsrvError::EndpointAlreadyBound, err);
        assert!(routes.contains("h/ep").await);
    }
}

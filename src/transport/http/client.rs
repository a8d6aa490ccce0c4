use crate::errors::{UsrvError, UsrvResult};
use crate::logger::Logger;
use crate::message::{Message, PROPERTY_ERROR};
use crate::transport::http::config::HttpConfig;
use crate::transport::http::headers::{
    decode_properties, encode_properties, header_string, UsrvHeaderKey,
};
use bytes::Bytes;
use http::header::HOST;
use http::uri::Authority;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

/// Posts requests to remote endpoints, one HTTP/1.1 connection per request.
#[derive(Clone)]
pub(crate) struct HttpClient {
    logger: Arc<dyn Logger>,
    connect_timeout: Duration,
    default_port: u16,
    connector: Option<TlsConnector>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("connect_timeout", &self.connect_timeout)
            .field("default_port", &self.default_port)
            .field("tls", &self.connector.is_some())
            .finish()
    }
}

/// Drives the client side of a connection; aborted when the request is dropped.
struct ConnectionTask(JoinHandle<()>);

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl HttpClient {
    pub(crate) fn new(config: &HttpConfig, connector: Option<TlsConnector>) -> HttpClient {
        HttpClient {
            logger: config.logger.clone(),
            connect_timeout: config.connect_timeout,
            default_port: config.default_remote_port(),
            connector,
        }
    }

    /// Resolves `request` to its reply. Every failure, including the deadline
    /// of a non-zero `timeout`, becomes a `ServiceUnavailable` reply.
    pub(crate) async fn exchange(&self, request: Message, timeout: Duration) -> Message {
        let result = if timeout.is_zero() {
            self.post(&request).await
        } else {
            match tokio::time::timeout(timeout, self.post(&request)).await {
                Ok(result) => result,
                Err(_) => Err(UsrvError::Timeout),
            }
        };
        match result {
            Ok(reply) => reply,
            Err(err) => {
                self.logger.error(
                    "Http request failed",
                    &[("from", request.from()), ("to", request.to()), ("err", &err)],
                );
                Message::failed_reply(&request, UsrvError::ServiceUnavailable)
            }
        }
    }

    async fn post(&self, request: &Message) -> UsrvResult<Message> {
        let (authority, path) = split_target(request.to())?;
        let host = authority.host();
        let port = authority.port_u16().unwrap_or(self.default_port);

        trace!("Connecting to {}:{}", host, port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| UsrvError::Transport(format!("connect to {} timed out", authority)))??;

        let http_request = build_request(request, &authority, &path)?;
        let (response, _connection) = match &self.connector {
            Some(connector) => {
                let server_name = ServerName::try_from(host.to_owned())
                    .map_err(|err| UsrvError::Transport(err.to_string()))?;
                let stream = connector.connect(server_name, stream).await?;
                send_request(stream, http_request).await?
            }
            None => send_request(stream, http_request).await?,
        };

        read_reply(request, response).await
    }
}

/// Splits `service/endpoint` into the service authority and the `/endpoint` path.
fn split_target(to: &str) -> UsrvResult<(Authority, String)> {
    let (service, path) = match to.find('/') {
        Some(idx) => (&to[..idx], to[idx..].to_string()),
        None => (to, "/".to_string()),
    };
    let authority = service
        .parse::<Authority>()
        .map_err(|err| UsrvError::Transport(format!("invalid service '{}': {}", service, err)))?;
    Ok((authority, path))
}

fn build_request(
    request: &Message,
    authority: &Authority,
    path: &str,
) -> UsrvResult<Request<Full<Bytes>>> {
    let payload = request.payload().cloned().unwrap_or_default();
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(HOST, authority.as_str())
        .header(UsrvHeaderKey::Referer.header_name(), request.from().as_str())
        .header(
            UsrvHeaderKey::CorrelationId.header_name(),
            request.correlation_id().as_str(),
        );
    if let Some(value) = encode_properties(request.properties())? {
        builder = builder.header(UsrvHeaderKey::Properties.header_name(), value);
    }
    Ok(builder.body(Full::new(payload))?)
}

/// The returned task must outlive reading the response body.
async fn send_request<IO>(
    io: IO,
    request: Request<Full<Bytes>>,
) -> UsrvResult<(Response<Incoming>, ConnectionTask)>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, connection) = http1::handshake(TokioIo::new(io)).await?;
    let connection = ConnectionTask(tokio::spawn(async move {
        if let Err(err) = connection.await {
            debug!("Connection error: {}", err);
        }
    }));
    let response = sender.send_request(request).await?;
    Ok((response, connection))
}

async fn read_reply(request: &Message, response: Response<Incoming>) -> UsrvResult<Message> {
    let status = response.status();
    if !status.is_success() {
        return Err(UsrvError::Transport(format!("unexpected status {}", status)));
    }
    let (parts, body) = response.into_parts();
    let mut properties = decode_properties(&parts.headers)?;
    let correlation_id = header_string(&parts.headers, UsrvHeaderKey::CorrelationId)?
        .unwrap_or_else(|| request.correlation_id().clone());
    let payload = body.collect().await?.to_bytes();

    let error = properties.del(PROPERTY_ERROR);
    let mut reply = Message::new(request.to(), request.from(), correlation_id)
        .with_properties(properties);
    match error {
        Some(err) => reply.set_error(UsrvError::from_wire(&err)),
        None => reply.set_payload(payload),
    }
    Ok(reply)
}

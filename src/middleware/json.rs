use crate::errors::{CodecError, UsrvError};
use crate::middleware::codec::{Codec, CodecHandler};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// JSON payloads through `serde_json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Json;

impl<T: Serialize + DeserializeOwned> Codec<T> for Json {
    fn decode(&self, payload: &Bytes) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }

    fn encode(&self, value: &T) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|err| CodecError::Encode(err.to_string()))
    }
}

/// Wraps a typed function into a handler with JSON request and response payloads.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use usrv::middleware::json::json_handler;
/// use usrv::UsrvError;
///
/// #[derive(Serialize, Deserialize, Default)]
/// struct Add { a: i64, b: i64 }
///
/// #[derive(Serialize, Deserialize, Default)]
/// struct Sum { sum: i64 }
///
/// let handler = json_handler(
///     |req: &Add, res: &mut Sum| -> Result<(), UsrvError> {
///         res.sum = req.a + req.b;
///         Ok(())
///     },
///     true,
/// );
/// ```
///
/// The function must take the request by reference, fill in the response and
/// return a `Result`:
///
/// ```compile_fail
/// use usrv::middleware::json::json_handler;
///
/// let handler = json_handler(|req: String| req.len(), false);
/// ```
pub fn json_handler<F, Req, Res, E>(function: F, recover: bool) -> CodecHandler<Json, F, Req, Res>
where
    F: Fn(&Req, &mut Res) -> Result<(), E> + Send + Sync + 'static,
    E: Into<UsrvError> + 'static,
    Req: Serialize + DeserializeOwned + 'static,
    Res: Serialize + DeserializeOwned + Default + 'static,
{
    CodecHandler::new(Json, function, recover)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::message::Message;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Default, Clone)]
    #[serde(rename_all = "PascalCase")]
    struct Request {
        a: String,
    }

    #[derive(Serialize, Deserialize, Default)]
    #[serde(rename_all = "PascalCase")]
    struct Response {
        b: i32,
    }

    async fn call<H: Handler>(handler: &H, payload: &'static str) -> Message {
        let mut request = Message::new("test", "srv/ep", "1");
        request.set_payload(payload);
        let mut response = Message::new("srv/ep", "test", "1");
        handler.handle(&request, &mut response).await;
        response
    }

    #[tokio::test]
    async fn decodes_request_and_encodes_response() {
        let handler = json_handler(
            |req: &Request, res: &mut Response| -> Result<(), UsrvError> {
                assert_eq!("42", req.a);
                res.b = 42;
                Ok(())
            },
            false,
        );

        let response = call(&handler, r#"{"A":"42"}"#).await;

        assert_eq!(Ok(&Bytes::from(r#"{"B":42}"#)), response.payload());
    }

    #[tokio::test]
    async fn user_error_is_wrapped() {
        let handler = json_handler(
            |_: &Request, _: &mut Response| -> Result<(), UsrvError> {
                Err(UsrvError::handler("An error"))
            },
            false,
        );

        let response = call(&handler, r#"{"A":"42"}"#).await;

        assert_eq!(Err(&UsrvError::handler("An error")), response.payload());
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let handler = json_handler(
            |_: &Request, _: &mut Response| -> Result<(), UsrvError> { Ok(()) },
            false,
        );

        let response = call(&handler, "{bad json").await;

        assert!(matches!(
            response.payload(),
            Err(UsrvError::Codec(CodecError::Decode(_)))
        ));
    }

    #[tokio::test]
    async fn panic_is_recovered_as_error() {
        let handler = json_handler(
            |_: &Request, _: &mut Response| -> Result<(), UsrvError> { panic!("An error") },
            true,
        );

        let response = call(&handler, r#"{"A":"42"}"#).await;

        assert_eq!(Err(&UsrvError::handler("An error")), response.payload());
    }

    #[tokio::test]
    async fn identity_handler_returns_request_unchanged() {
        let handler = json_handler(
            |req: &Request, res: &mut Request| -> Result<(), UsrvError> {
                *res = req.clone();
                Ok(())
            },
            false,
        );

        let response = call(&handler, r#"{"A":"42"}"#).await;

        assert_eq!(Ok(&Bytes::from(r#"{"A":"42"}"#)), response.payload());
    }
}

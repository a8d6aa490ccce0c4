use crate::errors::{CodecError, UsrvError};
use crate::middleware::codec::{Codec, CodecHandler};
use bytes::Bytes;

/// Protocol Buffers payloads through `prost`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Protobuf;

impl<T: prost::Message + Default> Codec<T> for Protobuf {
    fn decode(&self, payload: &Bytes) -> Result<T, CodecError> {
        Ok(T::decode(payload.clone())?)
    }

    fn encode(&self, value: &T) -> Result<Bytes, CodecError> {
        Ok(value.encode_to_vec().into())
    }
}

/// Wraps a typed function into a handler with protobuf request and response payloads.
pub fn protobuf_handler<F, Req, Res, E>(
    function: F,
    recover: bool,
) -> CodecHandler<Protobuf, F, Req, Res>
where
    F: Fn(&Req, &mut Res) -> Result<(), E> + Send + Sync + 'static,
    E: Into<UsrvError> + 'static,
    Req: prost::Message + Default + 'static,
    Res: prost::Message + Default + 'static,
{
    CodecHandler::new(Protobuf, function, recover)
}

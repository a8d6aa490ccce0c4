use crate::errors::{CodecError, UsrvError};
use crate::handler::Handler;
use crate::message::Message;
use async_trait::async_trait;
use bytes::Bytes;
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Payload format of a [`CodecHandler`].
pub trait Codec<T>: Send + Sync + 'static {
    fn decode(&self, payload: &Bytes) -> Result<T, CodecError>;

    fn encode(&self, value: &T) -> Result<Bytes, CodecError>;
}

/// Handler decoding the request payload into `Req`, calling a typed user
/// function and encoding the `Res` it fills in as the reply payload.
///
/// Decode, encode and user errors complete the reply with an error. With
/// `recover` set, a panic in the user function does too.
pub struct CodecHandler<C, F, Req, Res> {
    codec: C,
    function: F,
    recover: bool,
    types: PhantomData<fn(Req) -> Res>,
}

impl<C, F, Req, Res> Debug for CodecHandler<C, F, Req, Res> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecHandler")
            .field("request", &std::any::type_name::<Req>())
            .field("response", &std::any::type_name::<Res>())
            .field("recover", &self.recover)
            .finish()
    }
}

impl<C, F, Req, Res, E> CodecHandler<C, F, Req, Res>
where
    C: Codec<Req> + Codec<Res>,
    F: Fn(&Req, &mut Res) -> Result<(), E>,
    E: Into<UsrvError>,
    Res: Default,
{
    pub fn new(codec: C, function: F, recover: bool) -> Self {
        CodecHandler {
            codec,
            function,
            recover,
            types: PhantomData,
        }
    }

    fn invoke(&self, request: &Message) -> Result<Bytes, UsrvError> {
        let payload = request.payload().map_err(Clone::clone)?;
        let req = Codec::<Req>::decode(&self.codec, payload)?;
        let mut res = Res::default();
        self.call(&req, &mut res)?;
        Ok(Codec::<Res>::encode(&self.codec, &res)?)
    }

    fn call(&self, req: &Req, res: &mut Res) -> Result<(), UsrvError> {
        if !self.recover {
            return (self.function)(req, res).map_err(Into::into);
        }
        match catch_unwind(AssertUnwindSafe(|| (self.function)(req, res))) {
            Ok(result) => result.map_err(Into::into),
            Err(panic) => Err(UsrvError::Handler(panic_message(panic))),
        }
    }
}

#[async_trait]
impl<C, F, Req, Res, E> Handler for CodecHandler<C, F, Req, Res>
where
    C: Codec<Req> + Codec<Res>,
    F: Fn(&Req, &mut Res) -> Result<(), E> + Send + Sync + 'static,
    E: Into<UsrvError> + 'static,
    Req: 'static,
    Res: Default + 'static,
{
    async fn handle(&self, request: &Message, response: &mut Message) {
        response.set_content(self.invoke(request));
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => msg.to_string(),
            Err(_) => "handler panicked".to_string(),
        },
    }
}

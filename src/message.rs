use crate::errors::UsrvError;
use crate::reply::ReplySender;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Iter;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Property key carrying a flattened reply error across the wire.
pub const PROPERTY_ERROR: &str = "error";

/// Prefix reserved for fabric-internal property keys.
pub const RESERVED_PREFIX: &str = "X-Usrv-";

/// Unordered string to string mapping attached to every [`Message`].
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(HashMap<String, String>);

impl Properties {
    pub fn get<STR: AsRef<str>>(&self, key: STR) -> Option<&str> {
        self.0.get(key.as_ref()).map(String::as_str)
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.insert(key.into(), value.into());
    }

    pub fn del<STR: AsRef<str>>(&mut self, key: STR) -> Option<String> {
        self.0.remove(key.as_ref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> Iter<'_, String, String> {
        self.0.iter()
    }

    /// Keys owned by the fabric: the `error` carrier and anything under `X-Usrv-`.
    pub fn is_reserved<STR: AsRef<str>>(key: STR) -> bool {
        let key = key.as_ref();
        key == PROPERTY_ERROR || key.starts_with(RESERVED_PREFIX)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Properties(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The unit of traffic: an envelope (addresses, correlation token, properties)
/// around an opaque payload or an error.
///
/// Messages are allocated by a [`Transport`](crate::transport::Transport)
/// through `new_message_to` and `new_reply_to` so that the transport can link
/// a reply to the request it answers.
#[derive(Debug, Getters, MutGetters)]
pub struct Message {
    #[get = "pub"]
    from: String,
    #[get = "pub"]
    to: String,
    #[get = "pub"]
    correlation_id: String,
    #[getset(get = "pub", get_mut = "pub")]
    properties: Properties,
    payload: Bytes,
    error: Option<UsrvError>,
    reply_sender: Option<ReplySender>,
}

impl Message {
    pub fn new<F: Into<String>, T: Into<String>, C: Into<String>>(
        from: F,
        to: T,
        correlation_id: C,
    ) -> Message {
        Message {
            from: from.into(),
            to: to.into(),
            correlation_id: correlation_id.into(),
            properties: Properties::default(),
            payload: Bytes::new(),
            error: None,
            reply_sender: None,
        }
    }

    /// Returns the payload, or the error if one is set.
    pub fn payload(&self) -> Result<&Bytes, &UsrvError> {
        match &self.error {
            Some(err) => Err(err),
            None => Ok(&self.payload),
        }
    }

    pub fn error(&self) -> Option<&UsrvError> {
        self.error.as_ref()
    }

    pub fn set_payload<B: Into<Bytes>>(&mut self, payload: B) {
        self.payload = payload.into();
        self.error = None;
    }

    pub fn set_error(&mut self, error: UsrvError) {
        self.payload = Bytes::new();
        self.error = Some(error);
    }

    pub fn set_content(&mut self, content: Result<Bytes, UsrvError>) {
        match content {
            Ok(payload) => self.set_payload(payload),
            Err(err) => self.set_error(err),
        }
    }

    pub fn with_properties(mut self, properties: Properties) -> Message {
        self.properties = properties;
        self
    }

    /// Copies addresses, correlation token, properties and content. Reply linkage is not copied.
    pub(crate) fn shadow(&self) -> Message {
        Message {
            from: self.from.clone(),
            to: self.to.clone(),
            correlation_id: self.correlation_id.clone(),
            properties: self.properties.clone(),
            payload: self.payload.clone(),
            error: self.error.clone(),
            reply_sender: None,
        }
    }

    /// Allocates the reply envelope: swapped addresses, same correlation token,
    /// and the request's reply linkage moved over.
    pub(crate) fn reply(request: &mut Message) -> Message {
        let mut reply = Message::new(
            request.to.clone(),
            request.from.clone(),
            request.correlation_id.clone(),
        );
        reply.reply_sender = request.reply_sender.take();
        reply
    }

    /// Reply to `request` that carries `error` and no linkage.
    pub(crate) fn failed_reply(request: &Message, error: UsrvError) -> Message {
        let mut reply = Message::new(
            request.to.clone(),
            request.from.clone(),
            request.correlation_id.clone(),
        );
        reply.set_error(error);
        reply
    }

    pub(crate) fn set_reply_sender(&mut self, sender: ReplySender) {
        self.reply_sender = Some(sender);
    }

    pub(crate) fn has_reply_sender(&self) -> bool {
        self.reply_sender.is_some()
    }

    /// Posts this message into its paired reply slot. Returns `false` if the
    /// message has no linkage or the waiting side is gone.
    pub(crate) fn deliver(mut self) -> bool {
        match self.reply_sender.take() {
            Some(sender) => {
                if self.error.is_some() {
                    self.payload = Bytes::new();
                }
                sender.send(self).is_ok()
            }
            None => false,
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "From: '{}', To: '{}', CorrelationId: '{}', Properties: '{:?}', Payload len: {}",
            self.from,
            self.to,
            self.correlation_id,
            self.properties,
            self.payload.len()
        )
    }
}

use crate::errors::CodecError;
use crate::message::Properties;
use http::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use strum_macros::IntoStaticStr;

#[derive(IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsrvHeaderKey {
    #[strum(serialize = "X-Usrv-CorrelationId")]
    CorrelationId,
    #[strum(serialize = "X-Usrv-Properties")]
    Properties,
    /// Caller on requests, callee on replies.
    #[strum(serialize = "Referer")]
    Referer,
}

impl UsrvHeaderKey {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn header_name(self) -> HeaderName {
        match self {
            UsrvHeaderKey::CorrelationId => HeaderName::from_static("x-usrv-correlationid"),
            UsrvHeaderKey::Properties => HeaderName::from_static("x-usrv-properties"),
            UsrvHeaderKey::Referer => REFERER,
        }
    }
}

pub(crate) fn header_string(
    headers: &HeaderMap,
    key: UsrvHeaderKey,
) -> Result<Option<String>, CodecError> {
    match headers.get(key.name()) {
        Some(value) => Ok(Some(String::from_utf8(value.as_bytes().to_vec())?)),
        None => Ok(None),
    }
}

/// Encodes non-empty properties as the JSON properties header value.
pub(crate) fn encode_properties(
    properties: &Properties,
) -> Result<Option<HeaderValue>, CodecError> {
    if properties.is_empty() {
        return Ok(None);
    }
    let json = serde_json::to_vec(properties)?;
    HeaderValue::from_bytes(&json)
        .map(Some)
        .map_err(|err| CodecError::Encode(err.to_string()))
}

/// Absent header means empty properties.
pub(crate) fn decode_properties(headers: &HeaderMap) -> Result<Properties, CodecError> {
    match headers.get(UsrvHeaderKey::Properties.name()) {
        Some(value) => Ok(serde_json::from_slice(value.as_bytes())?),
        None => Ok(Properties::default()),
    }
}

//! Codecs turn messages into bytes and back.
//!
//! The server never calls `serde_json` directly; it goes through a
//! [`Codec`], so a binary format can be dropped in later without touching
//! the handler.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes to values.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a value that owns all of its data.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` on malformed or mismatched input.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`. Enabled by the default `json`
/// feature.
///
/// ```rust
/// use warden_protocol::{ClientMessage, Codec, Envelope, JsonCodec};
///
/// let codec = JsonCodec;
/// let bytes = br#"{"seq":0,"timestamp":0,"payload":{"type":"Command","line":"vote yes"}}"#;
/// let env: Envelope<ClientMessage> = codec.decode(bytes).unwrap();
/// assert_eq!(env.payload, ClientMessage::Command { line: "vote yes".into() });
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientMessage, Envelope};

    #[test]
    fn test_decode_malformed_bytes_returns_decode_error() {
        let result: Result<Envelope<ClientMessage>, _> =
            JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_message_type_returns_decode_error() {
        let bytes = br#"{"seq":0,"timestamp":0,"payload":{"type":"Teleport"}}"#;
        let result: Result<Envelope<ClientMessage>, _> =
            JsonCodec.decode(bytes);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}

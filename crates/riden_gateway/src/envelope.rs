use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Connection name that addresses every connected client at once.
pub const ALL_CLIENTS: &str = "allClients";

/// The unit exchanged between the gateway and the adapter.
///
/// The envelope pairs a client connection name with an opaque payload. The
/// payload is a self-describing JSON record; the envelope never carries type
/// information of its own.
///
/// On the wire this is `{"ClientConnName": "...", "MessageBytes": "<base64>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "ClientConnName")]
    pub client_conn_name: String,

    #[serde(rename = "MessageBytes", with = "payload_bytes")]
    pub message_bytes: Bytes,
}

impl Envelope {
    pub fn new(client_conn_name: impl Into<String>, message_bytes: impl Into<Bytes>) -> Self {
        Self {
            client_conn_name: client_conn_name.into(),
            message_bytes: message_bytes.into(),
        }
    }

    /// An envelope addressed to every connected client.
    pub fn broadcast(message_bytes: impl Into<Bytes>) -> Self {
        Self::new(ALL_CLIENTS, message_bytes)
    }

    pub fn is_broadcast(&self) -> bool {
        self.client_conn_name == ALL_CLIENTS
    }

    /// Encode as a JSON text frame body.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from a JSON text frame body.
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// `MessageBytes` is written as standard base64. Reading also accepts a raw
/// byte array and `null` (an empty payload).
mod payload_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Encoded(String),
        Raw(Vec<u8>),
    }

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Repr>::deserialize(deserializer)? {
            Some(Repr::Encoded(text)) => STANDARD
                .decode(text.as_bytes())
                .map(Bytes::from)
                .map_err(D::Error::custom),
            Some(Repr::Raw(raw)) => Ok(Bytes::from(raw)),
            None => Ok(Bytes::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_base64_on_the_wire() {
        let env = Envelope::new("client-1", &b"{\"MessageType\":\"ack\"}"[..]);
        let json = env.to_json().unwrap();

        assert_eq!(
            json,
            r#"{"ClientConnName":"client-1","MessageBytes":"eyJNZXNzYWdlVHlwZSI6ImFjayJ9"}"#
        );
        assert_eq!(Envelope::from_json(&json).unwrap(), env);
    }

    #[test]
    fn test_raw_byte_array_accepted() {
        let env = Envelope::from_json(r#"{"ClientConnName":"c","MessageBytes":[123,125]}"#).unwrap();
        assert_eq!(env.message_bytes, Bytes::from_static(b"{}"));
    }

    #[test]
    fn test_null_payload_is_empty() {
        let env = Envelope::from_json(r#"{"ClientConnName":"c","MessageBytes":null}"#).unwrap();
        assert!(env.message_bytes.is_empty());
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result = Envelope::from_json(r#"{"ClientConnName":"c","MessageBytes":"%%%"}"#);
        assert!(matches!(result, Err(EnvelopeError::Json(_))));
    }

    #[test]
    fn test_broadcast_constant() {
        let env = Envelope::broadcast(Bytes::from_static(b"{}"));
        assert!(env.is_broadcast());
        assert_eq!(env.client_conn_name, "allClients");
    }
}

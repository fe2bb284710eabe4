//! Payload codecs
//!
//! A codec converts between the local message body (a `serde_json::Value`) and
//! the MQTT wire payload. Bridges only see the [`Codec`] trait.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{codec} encode failed: {message}")]
    Encode { codec: &'static str, message: String },
    #[error("{codec} decode failed: {message}")]
    Decode { codec: &'static str, message: String },
}

/// Paired serializer/deserializer capability
pub trait Codec: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, payload: &[u8]) -> Result<Value, CodecError>;
}

/// MessagePack with named map keys, the default wire format
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(value).map_err(|e| CodecError::Encode {
            codec: self.name(),
            message: e.to_string(),
        })
    }

    fn decode(&self, payload: &[u8]) -> Result<Value, CodecError> {
        rmp_serde::from_slice(payload).map_err(|e| CodecError::Decode {
            codec: self.name(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            codec: self.name(),
            message: e.to_string(),
        })
    }

    fn decode(&self, payload: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Decode {
            codec: self.name(),
            message: e.to_string(),
        })
    }
}

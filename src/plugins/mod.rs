//! Pluggable payload codecs and the registry that resolves them from configuration

pub mod codec;
pub mod registry;

pub use codec::{Codec, CodecError, JsonCodec, MsgPackCodec};
pub use registry::{normalize_reference, PluginRegistry, UnresolvedReference};

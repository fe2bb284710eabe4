//! Resolution of textual plugin references
//!
//! Configuration names codecs and the client factory with `module:attribute`
//! references. References are resolved once at startup into trait objects;
//! nothing is looked up by name afterwards.

use super::codec::{Codec, JsonCodec, MsgPackCodec};
use crate::transport::mqtt::RumqttcClientFactory;
use crate::transport::ClientFactory;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A configured reference that names nothing in the registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unresolved plugin reference '{reference}': {reason}")]
pub struct UnresolvedReference {
    pub reference: String,
    pub reason: String,
}

impl UnresolvedReference {
    pub fn new<R: Into<String>, S: Into<String>>(reference: R, reason: S) -> Self {
        Self {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

/// Normalise `module:attribute`, dropping a leading package-relative `.`
pub fn normalize_reference(reference: &str) -> Result<String, UnresolvedReference> {
    let trimmed = reference.trim();
    let relative = trimmed.strip_prefix('.').unwrap_or(trimmed);
    match relative.split_once(':') {
        Some((module, attribute))
            if !module.is_empty() && !attribute.is_empty() && !attribute.contains(':') =>
        {
            Ok(format!("{module}:{attribute}"))
        }
        _ => Err(UnresolvedReference::new(
            reference,
            "expected 'module:attribute'",
        )),
    }
}

/// Registry of the codecs and client factories configuration may refer to
#[derive(Clone, Default)]
pub struct PluginRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
    client_factories: HashMap<String, Arc<dyn ClientFactory>>,
}

impl PluginRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in codecs and the rumqttc client factory
    pub fn with_defaults() -> Self {
        let msgpack: Arc<dyn Codec> = Arc::new(MsgPackCodec);
        let json: Arc<dyn Codec> = Arc::new(JsonCodec);

        let mut registry = Self::new();
        registry.register_codec("msgpack:dumps", msgpack.clone());
        registry.register_codec("msgpack:loads", msgpack);
        registry.register_codec("json:dumps", json.clone());
        registry.register_codec("json:loads", json);
        registry.register_client_factory(
            "mqtt_client:default_mqtt_client_factory",
            Arc::new(RumqttcClientFactory),
        );
        registry
    }

    /// Register (or replace) a codec under `reference`
    pub fn register_codec(&mut self, reference: &str, codec: Arc<dyn Codec>) {
        self.codecs.insert(reference.to_string(), codec);
    }

    pub fn register_client_factory(&mut self, reference: &str, factory: Arc<dyn ClientFactory>) {
        self.client_factories.insert(reference.to_string(), factory);
    }

    pub fn resolve_codec(&self, reference: &str) -> Result<Arc<dyn Codec>, UnresolvedReference> {
        let key = normalize_reference(reference)?;
        let codec = self
            .codecs
            .get(&key)
            .cloned()
            .ok_or_else(|| UnresolvedReference::new(reference, "no such codec"))?;
        debug!(reference = %reference, codec = codec.name(), "Resolved codec");
        Ok(codec)
    }

    pub fn resolve_client_factory(
        &self,
        reference: &str,
    ) -> Result<Arc<dyn ClientFactory>, UnresolvedReference> {
        let key = normalize_reference(reference)?;
        self.client_factories
            .get(&key)
            .cloned()
            .ok_or_else(|| UnresolvedReference::new(reference, "no such client factory"))
    }

    /// Registered codec references, sorted
    pub fn codec_references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut factories: Vec<&String> = self.client_factories.keys().collect();
        factories.sort_unstable();
        f.debug_struct("PluginRegistry")
            .field("codecs", &self.codec_references())
            .field("client_factories", &factories)
            .finish()
    }
}

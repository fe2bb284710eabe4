//! Testing utilities and mock implementations
//!
//! Lets the bridge run end to end without an MQTT broker or a real network.

pub mod mocks;

pub use mocks::*;

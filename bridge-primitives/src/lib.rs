//! Core shared types for the tool-invocation bridge.

#![warn(missing_docs, clippy::pedantic)]

mod capability;
mod error;
mod ids;
mod manifest;
mod schema;

/// Capability descriptors and supporting builders.
pub use capability::{Capability, CapabilityBuilder, CapabilityName};
/// Error type and result alias shared by the primitives.
pub use error::{Error, Result};
/// Unique identifier for a provider session.
pub use ids::SessionId;
/// Provider identity advertised during the handshake.
pub use manifest::{ProviderManifest, ProviderManifestBuilder};
/// Advisory input shapes and structural validation.
pub use schema::{ArgumentKind, InputShape, ShapeViolation};

//! Capability discovery across providers.
//!
//! [`CapabilityRegistry`] merges the listings of several providers into one
//! name-ordered namespace and refuses to let two providers claim the same
//! name. Discovery can close its sessions straight away or hand them back in
//! a [`SessionPool`] for later dispatch.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod pool;
mod registry;

pub use error::{RegistryError, RegistryResult};
pub use pool::SessionPool;
pub use registry::{CapabilityRegistry, RegisteredCapability};

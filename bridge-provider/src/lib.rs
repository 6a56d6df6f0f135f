//! Generic capability provider.
//!
//! A provider is a [`CapabilityTable`] of descriptors and async handlers plus
//! a [`CapabilityProvider`] that answers the JSON-RPC methods clients use to
//! discover and invoke them. The same provider can be served over stdio, over
//! HTTP, or reached in-process for tests.

#![warn(missing_docs, clippy::pedantic)]

mod catalog;
mod error;
mod http;
mod in_process;
mod provider;
mod stdio;
mod table;

pub use catalog::{Catalog, calculate_bmi};
pub use error::{HandlerError, ProviderError, ProviderResult};
pub use http::{HttpProviderHandle, HttpServerOptions, serve_http, spawn_http};
pub use in_process::{InProcessConnector, InProcessTransport, TransportStats};
pub use provider::CapabilityProvider;
pub use stdio::{serve_lines, serve_stdio};
pub use table::{CapabilityEntry, CapabilityHandler, CapabilityTable, HandlerResult};

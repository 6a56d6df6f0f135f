//! Turns provider endpoints into live transports.

use async_trait::async_trait;
use tracing::debug;

use crate::endpoint::ProviderEndpoint;
use crate::error::SessionResult;
use crate::transport::{HttpTransport, StdioTransport, Transport};

/// Opens transports for endpoints.
///
/// The registry and the demo binaries go through this seam so tests can
/// substitute in-process providers for spawned ones.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a transport to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SessionError::TransportUnavailable`] when the endpoint
    /// cannot be reached.
    async fn connect(&self, endpoint: &ProviderEndpoint) -> SessionResult<Box<dyn Transport>>;
}

/// Connector that spawns stdio providers and prepares HTTP clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, endpoint: &ProviderEndpoint) -> SessionResult<Box<dyn Transport>> {
        let identifier = endpoint.identifier();
        debug!(endpoint = %identifier, "opening transport");

        match endpoint {
            ProviderEndpoint::Stdio(config) => {
                Ok(Box::new(StdioTransport::spawn(config, identifier)?))
            }
            ProviderEndpoint::Http(config) => {
                Ok(Box::new(HttpTransport::connect(config, identifier)?))
            }
        }
    }
}

//! Transport that reaches a provider living in the same process.
//!
//! Messages still go through full JSON encoding so the session layer sees the
//! exact bytes a spawned provider would produce.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bridge_session::protocol::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use bridge_session::{
    Connector, ProviderEndpoint, SessionError, SessionResult, Transport, TransportKind,
};
use tracing::debug;

use crate::provider::CapabilityProvider;

/// Counters shared between an in-process transport and its creator.
#[derive(Debug, Default)]
pub struct TransportStats {
    requests: AtomicUsize,
    notifications: AtomicUsize,
    closes: AtomicUsize,
}

impl TransportStats {
    /// Requests sent so far.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Notifications sent so far.
    #[must_use]
    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }

    /// Times the transport was closed.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Total messages written by the client.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.requests() + self.notifications()
    }
}

/// Client side of an in-process provider.
#[derive(Debug)]
pub struct InProcessTransport {
    endpoint: String,
    provider: Arc<CapabilityProvider>,
    stats: Arc<TransportStats>,
    closed: bool,
}

impl InProcessTransport {
    /// Creates a transport to `provider`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, provider: Arc<CapabilityProvider>) -> Self {
        Self {
            endpoint: endpoint.into(),
            provider,
            stats: Arc::new(TransportStats::default()),
            closed: false,
        }
    }

    /// Shared counters for this transport.
    #[must_use]
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            return Err(SessionError::transport("in-process transport already closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::InProcess
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn round_trip(&mut self, request: JsonRpcRequest) -> SessionResult<JsonRpcResponse> {
        self.ensure_open()?;
        self.stats.requests.fetch_add(1, Ordering::SeqCst);

        let answer = self
            .provider
            .handle(serde_json::to_value(&request)?)
            .await
            .ok_or_else(|| SessionError::protocol("provider produced no response"))?;

        serde_json::from_value(answer)
            .map_err(|err| SessionError::protocol(format!("malformed response: {err}")))
    }

    async fn notify(&mut self, notification: JsonRpcNotification) -> SessionResult<()> {
        self.ensure_open()?;
        self.stats.notifications.fetch_add(1, Ordering::SeqCst);
        let _ = self.provider.handle(serde_json::to_value(&notification)?).await;
        Ok(())
    }

    async fn close(&mut self) -> SessionResult<()> {
        if !self.closed {
            self.closed = true;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
            debug!(endpoint = %self.endpoint, "in-process transport closed");
        }
        Ok(())
    }
}

/// Connector that maps endpoint identifiers to in-process providers.
///
/// Endpoints without a registered provider fail with
/// [`SessionError::TransportUnavailable`], like a missing binary would.
#[derive(Debug, Default)]
pub struct InProcessConnector {
    providers: HashMap<String, Arc<CapabilityProvider>>,
    stats: std::sync::Mutex<Vec<(String, Arc<TransportStats>)>>,
}

impl InProcessConnector {
    /// Creates a connector with no providers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `provider` for `endpoint`.
    #[must_use]
    pub fn with_provider(mut self, endpoint: &ProviderEndpoint, provider: CapabilityProvider) -> Self {
        self.providers
            .insert(endpoint.identifier(), Arc::new(provider));
        self
    }

    /// Counters of every transport opened so far, with their endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn opened(&self) -> Vec<(String, Arc<TransportStats>)> {
        self.stats.lock().expect("connector stats poisoned").clone()
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self, endpoint: &ProviderEndpoint) -> SessionResult<Box<dyn Transport>> {
        let identifier = endpoint.identifier();
        let provider = self.providers.get(&identifier).ok_or_else(|| {
            SessionError::unavailable(&identifier, "no in-process provider registered")
        })?;

        let transport = InProcessTransport::new(identifier.clone(), Arc::clone(provider));
        if let Ok(mut opened) = self.stats.lock() {
            opened.push((identifier, transport.stats()));
        }
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use bridge_session::{Session, SessionConfig, SessionState};
    use serde_json::json;

    use super::*;
    use crate::catalog::Catalog;

    #[tokio::test]
    async fn session_round_trip_over_in_process_provider() {
        let provider = Arc::new(Catalog::Math.provider().unwrap());
        let transport = InProcessTransport::new("in-process:math", Arc::clone(&provider));
        let stats = transport.stats();

        let mut session = Session::new(Box::new(transport), SessionConfig::default());
        session.initialize().await.unwrap();
        assert_eq!(session.provider().unwrap().name(), "Math");

        let capabilities = session.list_capabilities().await.unwrap();
        assert_eq!(capabilities.len(), 2);

        let arguments = json!({"a": 10, "b": 8}).as_object().cloned().unwrap();
        let result = session.invoke("add", arguments).await.unwrap();
        assert_eq!(result.text(), "18");
        assert_eq!(session.state(), SessionState::Active);

        session.close().await.unwrap();
        assert_eq!(stats.closes(), 1);
        assert_eq!(stats.notifications(), 1);
        assert_eq!(provider.calls_served(), 1);
    }

    #[tokio::test]
    async fn listing_follows_every_page() {
        let provider = Catalog::Math.provider().unwrap().with_page_size(1);
        let transport = InProcessTransport::new("in-process:math", Arc::new(provider));
        let stats = transport.stats();

        let mut session = Session::new(Box::new(transport), SessionConfig::default());
        session.initialize().await.unwrap();
        let names: Vec<_> = session
            .list_capabilities()
            .await
            .unwrap()
            .iter()
            .map(|capability| capability.name().as_str().to_owned())
            .collect();
        assert_eq!(names, ["add", "multiply"]);
        assert_eq!(stats.requests(), 3);

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn connector_rejects_unknown_endpoints() {
        let known = ProviderEndpoint::stdio("provider", ["--catalog", "math"]);
        let connector =
            InProcessConnector::new().with_provider(&known, Catalog::Math.provider().unwrap());

        assert!(connector.connect(&known).await.is_ok());
        let missing = ProviderEndpoint::stdio("provider", ["--catalog", "nope"]);
        let err = connector.connect(&missing).await.err().unwrap();
        assert!(matches!(err, SessionError::TransportUnavailable { .. }));
        assert_eq!(connector.opened().len(), 1);
    }
}

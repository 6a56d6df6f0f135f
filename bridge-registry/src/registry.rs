//! Merged namespace of capabilities discovered from several providers.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use bridge_primitives::Capability;
use bridge_session::{
    Connector, DefaultConnector, ProviderEndpoint, Session, SessionConfig, SessionResult,
};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::pool::SessionPool;

/// A capability together with the provider that serves it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredCapability {
    capability: Capability,
    provider: String,
}

impl RegisteredCapability {
    /// Capability descriptor.
    #[must_use]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Name of the owning provider.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

/// Client-side view of every discovered capability, ordered by name.
///
/// Names are unique across providers; discovery fails rather than letting
/// one provider shadow another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityRegistry {
    entries: BTreeMap<String, RegisteredCapability>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one capability served by `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCapability`] when the name is taken.
    pub fn insert(&mut self, provider: &str, capability: Capability) -> RegistryResult<()> {
        match self.entries.entry(capability.name().to_string()) {
            Entry::Occupied(existing) => Err(RegistryError::DuplicateCapability {
                name: existing.key().clone(),
                first: existing.get().provider.clone(),
                second: provider.to_owned(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(RegisteredCapability {
                    capability,
                    provider: provider.to_owned(),
                });
                Ok(())
            }
        }
    }

    /// Builds a registry from per-provider listings.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateCapability`] on the first collision.
    pub fn from_listings<I, K>(listings: I) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = (K, Vec<Capability>)>,
        K: AsRef<str>,
    {
        let mut registry = Self::new();
        for (provider, capabilities) in listings {
            for capability in capabilities {
                registry.insert(provider.as_ref(), capability)?;
            }
        }
        Ok(registry)
    }

    /// Discovers capabilities and closes every session afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Discovery`] when any provider fails and
    /// [`RegistryError::DuplicateCapability`] on a name collision. No partial
    /// registry is ever returned.
    pub async fn discover<'a, I, K>(providers: I, config: &SessionConfig) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = (K, &'a ProviderEndpoint)>,
        K: AsRef<str>,
    {
        Self::discover_with(&DefaultConnector, providers, config).await
    }

    /// [`CapabilityRegistry::discover`] through a caller supplied connector.
    ///
    /// # Errors
    ///
    /// See [`CapabilityRegistry::discover`].
    pub async fn discover_with<'a, I, K>(
        connector: &dyn Connector,
        providers: I,
        config: &SessionConfig,
    ) -> RegistryResult<Self>
    where
        I: IntoIterator<Item = (K, &'a ProviderEndpoint)>,
        K: AsRef<str>,
    {
        let (registry, pool) = Self::discover_warm_with(connector, providers, config).await?;
        if let Err(err) = pool.shutdown().await {
            warn!(%err, "closing discovery sessions failed");
        }
        Ok(registry)
    }

    /// Discovers capabilities and keeps the sessions open for dispatch.
    ///
    /// # Errors
    ///
    /// See [`CapabilityRegistry::discover`]. Sessions opened before the
    /// failure are closed.
    pub async fn discover_warm<'a, I, K>(
        providers: I,
        config: &SessionConfig,
    ) -> RegistryResult<(Self, SessionPool)>
    where
        I: IntoIterator<Item = (K, &'a ProviderEndpoint)>,
        K: AsRef<str>,
    {
        Self::discover_warm_with(&DefaultConnector, providers, config).await
    }

    /// [`CapabilityRegistry::discover_warm`] through a caller supplied
    /// connector.
    ///
    /// # Errors
    ///
    /// See [`CapabilityRegistry::discover_warm`].
    pub async fn discover_warm_with<'a, I, K>(
        connector: &dyn Connector,
        providers: I,
        config: &SessionConfig,
    ) -> RegistryResult<(Self, SessionPool)>
    where
        I: IntoIterator<Item = (K, &'a ProviderEndpoint)>,
        K: AsRef<str>,
    {
        let mut registry = Self::new();
        let mut pool = SessionPool::new();

        for (provider, endpoint) in providers {
            let provider = provider.as_ref();
            let listed = match open_and_list(connector, endpoint, config).await {
                Ok(listed) => listed,
                Err(source) => {
                    abandon(pool).await;
                    return Err(RegistryError::discovery(provider, source));
                }
            };

            let (session, capabilities) = listed;
            debug!(
                provider,
                endpoint = %endpoint,
                count = capabilities.len(),
                "provider listed capabilities"
            );
            pool.insert(provider, session);

            for capability in capabilities {
                if let Err(err) = registry.insert(provider, capability) {
                    abandon(pool).await;
                    return Err(err);
                }
            }
        }

        info!(
            providers = pool.len(),
            capabilities = registry.len(),
            "capability discovery complete"
        );
        Ok((registry, pool))
    }

    /// Looks up a capability by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] for unknown names.
    pub fn resolve(&self, name: &str) -> RegistryResult<&Capability> {
        self.get(name)
            .map(RegisteredCapability::capability)
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_owned(),
            })
    }

    /// Capability and provider for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredCapability> {
        self.entries.get(name)
    }

    /// Provider serving `name`.
    #[must_use]
    pub fn provider_of(&self, name: &str) -> Option<&str> {
        self.get(name).map(RegisteredCapability::provider)
    }

    /// Capabilities in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.values().map(RegisteredCapability::capability)
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn open_and_list(
    connector: &dyn Connector,
    endpoint: &ProviderEndpoint,
    config: &SessionConfig,
) -> SessionResult<(Session, Vec<Capability>)> {
    let mut session = Session::open_with(connector, endpoint, config.clone()).await?;

    let listed = match session.initialize().await {
        Ok(()) => session.list_capabilities().await,
        Err(err) => Err(err),
    };

    match listed {
        Ok(capabilities) => Ok((session, capabilities)),
        Err(err) => {
            let _ = session.close().await;
            Err(err)
        }
    }
}

async fn abandon(pool: SessionPool) {
    if let Err(err) = pool.shutdown().await {
        warn!(%err, "closing sessions after failed discovery also failed");
    }
}

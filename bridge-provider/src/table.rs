//! Capability records and the handlers that execute them.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bridge_primitives::Capability;
use serde_json::{Map, Value};

use crate::error::{HandlerError, ProviderError, ProviderResult};

/// Result returned by capability handlers.
pub type HandlerResult = Result<Value, HandlerError>;

/// Executes one capability.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Runs the capability against already decoded arguments.
    async fn call(&self, arguments: Map<String, Value>) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> CapabilityHandler for F
where
    F: Send + Sync + Fn(Map<String, Value>) -> Fut,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn call(&self, arguments: Map<String, Value>) -> HandlerResult {
        (self)(arguments).await
    }
}

/// Capability descriptor paired with its handler.
#[derive(Clone)]
pub struct CapabilityEntry {
    capability: Capability,
    handler: Arc<dyn CapabilityHandler>,
}

impl CapabilityEntry {
    /// Descriptor advertised to clients.
    #[must_use]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Runs the handler.
    ///
    /// # Errors
    ///
    /// Propagates the handler's domain error.
    pub async fn call(&self, arguments: Map<String, Value>) -> HandlerResult {
        self.handler.call(arguments).await
    }
}

/// Capabilities served by one provider, keyed and ordered by name.
#[derive(Default)]
pub struct CapabilityTable {
    inner: RwLock<BTreeMap<String, CapabilityEntry>>,
}

impl std::fmt::Debug for CapabilityTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .inner
            .read()
            .map(|inner| inner.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("CapabilityTable")
            .field("registered", &names)
            .finish()
    }
}

impl CapabilityTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a capability and its handler.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::DuplicateCapability`] if the name is taken.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn register<H>(&self, capability: Capability, handler: H) -> ProviderResult<()>
    where
        H: CapabilityHandler + 'static,
    {
        let mut inner = self.inner.write().expect("capability table poisoned");
        let name = capability.name().to_string();
        if inner.contains_key(&name) {
            return Err(ProviderError::DuplicateCapability { name });
        }

        inner.insert(
            name,
            CapabilityEntry {
                capability,
                handler: Arc::new(handler),
            },
        );
        Ok(())
    }

    /// Returns the entry registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<CapabilityEntry> {
        let inner = self.inner.read().ok()?;
        inner.get(name).cloned()
    }

    /// Lists every descriptor in name order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<Capability> {
        let inner = self.inner.read().expect("capability table poisoned");
        inner
            .values()
            .map(|entry| entry.capability.clone())
            .collect()
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.len()).unwrap_or(0)
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use bridge_primitives::{ArgumentKind, CapabilityName, InputShape};
    use serde_json::json;

    use super::*;

    fn echo() -> Capability {
        Capability::builder(CapabilityName::new("echo").unwrap())
            .description("Echo the payload back")
            .unwrap()
            .input_shape(InputShape::object().required("message", ArgumentKind::String))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn register_and_call() {
        let table = CapabilityTable::new();
        table
            .register(echo(), |arguments: Map<String, Value>| async move {
                Ok(Value::Object(arguments))
            })
            .unwrap();

        let arguments = json!({"message": "hello"}).as_object().cloned().unwrap();
        let entry = table.get("echo").unwrap();
        let output = entry.call(arguments.clone()).await.unwrap();
        assert_eq!(output, Value::Object(arguments));
    }

    #[tokio::test]
    async fn handler_errors_pass_through() {
        let table = CapabilityTable::new();
        table
            .register(echo(), |_: Map<String, Value>| async move {
                Err(HandlerError::new("nope"))
            })
            .unwrap();

        let err = table.get("echo").unwrap().call(Map::new()).await.unwrap_err();
        assert_eq!(err.message(), "nope");
    }

    #[test]
    fn duplicate_registration_errors() {
        let table = CapabilityTable::new();
        table
            .register(echo(), |v: Map<String, Value>| async move { Ok(Value::Object(v)) })
            .unwrap();
        let err = table
            .register(echo(), |v: Map<String, Value>| async move { Ok(Value::Object(v)) })
            .expect_err("duplicate registration should fail");

        assert!(matches!(err, ProviderError::DuplicateCapability { name } if name == "echo"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn list_is_name_ordered() {
        let table = CapabilityTable::new();
        for name in ["zeta", "alpha", "mid"] {
            let capability = Capability::builder(CapabilityName::new(name).unwrap())
                .description("test")
                .unwrap()
                .build()
                .unwrap();
            table
                .register(capability, |_: Map<String, Value>| async move { Ok(Value::Null) })
                .unwrap();
        }

        let names: Vec<_> = table.list().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }
}

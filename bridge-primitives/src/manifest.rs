//! Provider identity advertised during the session handshake.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name and version a capability provider reports about itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderManifest {
    name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
}

impl ProviderManifest {
    /// Starts building a [`ProviderManifest`].
    #[must_use]
    pub fn builder() -> ProviderManifestBuilder {
        ProviderManifestBuilder::default()
    }

    /// Returns the provider display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the provider version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Optional usage notes the provider attaches to the handshake.
    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }
}

/// Builder for [`ProviderManifest`].
#[derive(Debug, Default)]
pub struct ProviderManifestBuilder {
    name: Option<String>,
    version: Option<String>,
    instructions: Option<String>,
}

impl ProviderManifestBuilder {
    /// Sets the provider name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] when the name is blank.
    pub fn name(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidManifest {
                reason: "provider name cannot be empty".into(),
            });
        }
        self.name = Some(name);
        Ok(self)
    }

    /// Sets the provider version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] when the version is blank.
    pub fn version(mut self, version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(Error::InvalidManifest {
                reason: "provider version cannot be empty".into(),
            });
        }
        self.version = Some(version);
        Ok(self)
    }

    /// Sets optional usage instructions.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Consumes the builder and returns the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] if the name was never set.
    pub fn build(self) -> Result<ProviderManifest> {
        let name = self.name.ok_or_else(|| Error::InvalidManifest {
            reason: "provider name must be provided".into(),
        })?;

        Ok(ProviderManifest {
            name,
            version: self.version.unwrap_or_else(|| "0.1.0".to_owned()),
            instructions: self.instructions,
        })
    }
}

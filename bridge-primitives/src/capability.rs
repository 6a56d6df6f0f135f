//! Capability descriptors shared across the mediation runtime.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::InputShape;

const MAX_NAME_LEN: usize = 128;
const MAX_DESCRIPTION_LEN: usize = 4096;

/// Name under which a capability is addressed by the model and the dispatcher.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CapabilityName(String);

impl CapabilityName {
    /// Creates a capability name after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapabilityName`] if the supplied name is empty,
    /// too long, or contains unsupported characters.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    /// Returns the capability name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CapabilityName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CapabilityName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CapabilityName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<CapabilityName> for String {
    fn from(value: CapabilityName) -> Self {
        value.0
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidCapabilityName {
            name: String::new(),
            reason: "name cannot be empty".into(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidCapabilityName {
            name: name.into(),
            reason: format!("name length must be <= {MAX_NAME_LEN}"),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::InvalidCapabilityName {
            name: name.into(),
            reason: "name must contain ASCII alphanumerics, dash, underscore, or dot".into(),
        });
    }

    Ok(())
}

/// A remotely executed function advertised by a capability provider.
///
/// Capabilities are immutable once discovered. The wire representation matches
/// the `tools/list` entries exchanged with providers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    name: CapabilityName,
    #[serde(default)]
    description: String,
    #[serde(rename = "inputSchema", default)]
    input_shape: InputShape,
}

impl Capability {
    /// Starts building a capability descriptor.
    #[must_use]
    pub fn builder(name: CapabilityName) -> CapabilityBuilder {
        CapabilityBuilder {
            name,
            description: None,
            input_shape: InputShape::default(),
        }
    }

    /// Returns the capability name.
    #[must_use]
    pub fn name(&self) -> &CapabilityName {
        &self.name
    }

    /// Natural-language description consumed by the prompt compiler.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared (advisory) input shape.
    #[must_use]
    pub fn input_shape(&self) -> &InputShape {
        &self.input_shape
    }
}

/// Builder for [`Capability`].
#[derive(Debug)]
pub struct CapabilityBuilder {
    name: CapabilityName,
    description: Option<String>,
    input_shape: InputShape,
}

impl CapabilityBuilder {
    /// Sets the natural-language description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapability`] if the description is blank or
    /// exceeds the maximum supported length.
    pub fn description(mut self, description: impl Into<String>) -> Result<Self> {
        let description = description.into();
        if description.trim().is_empty() {
            return Err(Error::InvalidCapability {
                reason: "description cannot be empty".into(),
            });
        }
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(Error::InvalidCapability {
                reason: format!("description length must be <= {MAX_DESCRIPTION_LEN}"),
            });
        }
        self.description = Some(description);
        Ok(self)
    }

    /// Replaces the input shape.
    #[must_use]
    pub fn input_shape(mut self, shape: InputShape) -> Self {
        self.input_shape = shape;
        self
    }

    /// Finalises the capability descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapability`] if no description was provided.
    pub fn build(self) -> Result<Capability> {
        let description = self.description.ok_or_else(|| Error::InvalidCapability {
            reason: "description must be provided".into(),
        })?;

        Ok(Capability {
            name: self.name,
            description,
            input_shape: self.input_shape,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ArgumentKind;

    #[test]
    fn build_capability_success() {
        let name = CapabilityName::new("calculate_bmi").expect("name");
        let capability = Capability::builder(name)
            .description("Calculate Body Mass Index")
            .map(|b| {
                b.input_shape(
                    InputShape::object()
                        .required("weight_kg", ArgumentKind::Number)
                        .required("height_m", ArgumentKind::Number),
                )
            })
            .and_then(CapabilityBuilder::build)
            .expect("build");

        assert_eq!(capability.name().as_str(), "calculate_bmi");
        assert_eq!(capability.input_shape().required_names().count(), 2);
    }

    #[test]
    fn capability_requires_description() {
        let name = CapabilityName::new("add").expect("name");
        let err = Capability::builder(name)
            .build()
            .expect_err("should fail");

        assert!(matches!(err, Error::InvalidCapability { .. }));
    }

    #[test]
    fn rejects_bad_names() {
        assert!(CapabilityName::new("").is_err());
        assert!(CapabilityName::new("has space").is_err());
        assert!(CapabilityName::new("x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(CapabilityName::new("Multiply").is_ok());
        assert!(CapabilityName::new("weather.get-v2").is_ok());
    }

    #[test]
    fn decodes_wire_listing_entry() {
        let json = serde_json::json!({
            "name": "add",
            "description": "Add two numbers together",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "a": {"type": "integer"},
                    "b": {"type": "integer"}
                },
                "required": ["a", "b"]
            }
        });

        let capability: Capability = serde_json::from_value(json).expect("decode");
        assert_eq!(capability.name().as_str(), "add");
        assert_eq!(
            capability.input_shape().kind_of("a"),
            Some(ArgumentKind::Integer)
        );
    }

    #[test]
    fn invalid_wire_name_is_rejected() {
        let json = serde_json::json!({ "name": "bad name", "description": "x" });
        assert!(serde_json::from_value::<Capability>(json).is_err());
    }
}

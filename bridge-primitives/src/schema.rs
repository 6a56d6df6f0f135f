//! Advisory input shapes attached to capabilities.
//!
//! An [`InputShape`] keeps the provider's JSON schema verbatim (so it can be
//! rendered back to the model unchanged) and offers a shallow structural view:
//! property names, primitive kinds, and the required set. Validation never
//! coerces values; it only reports mismatches.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Primitive argument kinds understood by the structural checks.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentKind {
    /// JSON string.
    String,
    /// Any JSON number.
    Number,
    /// JSON number without a fractional part.
    Integer,
    /// JSON boolean.
    Boolean,
}

impl ArgumentKind {
    /// Schema keyword for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    /// Returns `true` when `value` has this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|v| v.is_finite() && v.fract() == 0.0)
            }
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl Display for ArgumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single mismatch between supplied arguments and an input shape.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ShapeViolation {
    /// A required argument was absent.
    Missing {
        /// Argument name.
        name: String,
    },
    /// An argument had the wrong primitive kind.
    WrongKind {
        /// Argument name.
        name: String,
        /// Kind declared by the shape.
        expected: ArgumentKind,
        /// JSON type that was supplied.
        found: &'static str,
    },
    /// An argument is not declared and the shape forbids extras.
    Unexpected {
        /// Argument name.
        name: String,
    },
}

impl Display for ShapeViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { name } => write!(f, "missing required argument `{name}`"),
            Self::WrongKind {
                name,
                expected,
                found,
            } => write!(f, "argument `{name}` must be {expected}, got {found}"),
            Self::Unexpected { name } => write!(f, "unexpected argument `{name}`"),
        }
    }
}

/// Advisory schema describing the arguments a capability expects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputShape(Value);

impl Default for InputShape {
    fn default() -> Self {
        Self::object()
    }
}

impl InputShape {
    /// Creates an empty object shape.
    #[must_use]
    pub fn object() -> Self {
        Self(json!({ "type": "object", "properties": {} }))
    }

    /// Wraps a raw JSON schema as advertised by a provider.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Returns the raw schema.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Declares a required argument.
    #[must_use]
    pub fn required(self, name: &str, kind: ArgumentKind) -> Self {
        self.with_property(name, kind, true)
    }

    /// Declares an optional argument.
    #[must_use]
    pub fn optional(self, name: &str, kind: ArgumentKind) -> Self {
        self.with_property(name, kind, false)
    }

    /// Attaches a description to a previously declared argument.
    #[must_use]
    pub fn describe(mut self, name: &str, description: &str) -> Self {
        if let Some(Value::Object(property)) = self
            .0
            .get_mut("properties")
            .and_then(|props| props.get_mut(name))
        {
            property.insert("description".into(), Value::from(description));
        }
        self
    }

    /// Forbids arguments that are not declared.
    #[must_use]
    pub fn deny_unknown(mut self) -> Self {
        if let Value::Object(root) = &mut self.0 {
            root.insert("additionalProperties".into(), Value::Bool(false));
        }
        self
    }

    fn with_property(mut self, name: &str, kind: ArgumentKind, required: bool) -> Self {
        if let Value::Object(root) = &mut self.0 {
            if let Value::Object(properties) = root
                .entry("properties")
                .or_insert_with(|| Value::Object(Map::new()))
            {
                properties.insert(
                    name.to_owned(),
                    json!({ "title": title_case(name), "type": kind.as_str() }),
                );
            }

            if required {
                if let Value::Array(list) = root
                    .entry("required")
                    .or_insert_with(|| Value::Array(Vec::new()))
                {
                    if !list.iter().any(|v| v.as_str() == Some(name)) {
                        list.push(Value::from(name));
                    }
                }
            }
        }

        self
    }

    /// Iterates over declared property names with their primitive kind, if any.
    pub fn properties(&self) -> impl Iterator<Item = (&str, Option<ArgumentKind>)> {
        self.0
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|props| props.iter())
            .map(|(name, schema)| (name.as_str(), kind_from_schema(schema)))
    }

    /// Iterates over the names listed as required.
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.0
            .get("required")
            .and_then(Value::as_array)
            .into_iter()
            .flat_map(|list| list.iter())
            .filter_map(Value::as_str)
    }

    /// Returns the declared kind of `name`, if the shape names a primitive one.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<ArgumentKind> {
        self.0
            .get("properties")
            .and_then(|props| props.get(name))
            .and_then(kind_from_schema)
    }

    fn allows_unknown(&self) -> bool {
        !matches!(self.0.get("additionalProperties"), Some(Value::Bool(false)))
    }

    fn declares(&self, name: &str) -> bool {
        self.0
            .get("properties")
            .and_then(|props| props.get(name))
            .is_some()
    }

    /// Checks `arguments` against the shape.
    ///
    /// # Errors
    ///
    /// Returns every [`ShapeViolation`] found, in a stable order: missing
    /// arguments first, then per-argument problems in name order.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), Vec<ShapeViolation>> {
        let mut violations: Vec<ShapeViolation> = self
            .required_names()
            .filter(|name| !arguments.contains_key(*name))
            .map(|name| ShapeViolation::Missing {
                name: name.to_owned(),
            })
            .collect();

        for (name, value) in arguments {
            if let Some(expected) = self.kind_of(name) {
                if !expected.accepts(value) {
                    violations.push(ShapeViolation::WrongKind {
                        name: name.clone(),
                        expected,
                        found: json_type(value),
                    });
                }
            } else if !self.allows_unknown() && !self.declares(name) {
                violations.push(ShapeViolation::Unexpected { name: name.clone() });
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

fn kind_from_schema(schema: &Value) -> Option<ArgumentKind> {
    schema
        .get("type")
        .and_then(Value::as_str)
        .and_then(ArgumentKind::from_keyword)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn title_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

//! Built-in capability catalogs.

use std::fmt::{self, Display};
use std::str::FromStr;

use bridge_primitives::{ArgumentKind, Capability, CapabilityName, InputShape, ProviderManifest};
use serde_json::{Map, Value, json};

use crate::error::{HandlerError, ProviderError, ProviderResult};
use crate::provider::CapabilityProvider;
use crate::table::{CapabilityTable, HandlerResult};

/// Named set of capabilities a provider process can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Catalog {
    /// `add` and `multiply`.
    Math,
    /// `calculate_bmi`.
    Bmi,
    /// `get_weather`.
    Weather,
}

impl Catalog {
    /// Every catalog, in display order.
    pub const ALL: [Self; 3] = [Self::Math, Self::Bmi, Self::Weather];

    /// Catalog name as used on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Math => "math",
            Self::Bmi => "bmi",
            Self::Weather => "weather",
        }
    }

    /// Builds the provider for this catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Descriptor`] if a built-in descriptor fails
    /// validation.
    pub fn provider(self) -> ProviderResult<CapabilityProvider> {
        let (manifest, table) = match self {
            Self::Math => (manifest("Math")?, math()?),
            Self::Bmi => (manifest("BMI Server")?, bmi()?),
            Self::Weather => (manifest("Weather")?, weather()?),
        };
        Ok(CapabilityProvider::new(manifest, table))
    }
}

impl Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Catalog {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|catalog| catalog.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProviderError::UnknownCatalog { name: s.to_owned() })
    }
}

fn manifest(name: &str) -> ProviderResult<ProviderManifest> {
    Ok(ProviderManifest::builder()
        .name(name)?
        .version(env!("CARGO_PKG_VERSION"))?
        .build()?)
}

fn descriptor(name: &str, description: &str, shape: InputShape) -> ProviderResult<Capability> {
    Ok(Capability::builder(CapabilityName::new(name)?)
        .description(description)?
        .input_shape(shape)
        .build()?)
}

fn math() -> ProviderResult<CapabilityTable> {
    let operands = || {
        InputShape::object()
            .required("a", ArgumentKind::Number)
            .required("b", ArgumentKind::Number)
    };

    let table = CapabilityTable::new();
    table.register(descriptor("add", "Add two numbers together", operands())?, add)?;
    table.register(descriptor("multiply", "Multiply two numbers", operands())?, multiply)?;
    Ok(table)
}

async fn add(arguments: Map<String, Value>) -> HandlerResult {
    arithmetic(&arguments, i64::checked_add, |a, b| a + b)
}

async fn multiply(arguments: Map<String, Value>) -> HandlerResult {
    arithmetic(&arguments, i64::checked_mul, |a, b| a * b)
}

fn bmi() -> ProviderResult<CapabilityTable> {
    let shape = InputShape::object()
        .required("weight_kg", ArgumentKind::Number)
        .describe("weight_kg", "Weight in kilograms (must be > 0)")
        .required("height_m", ArgumentKind::Number)
        .describe("height_m", "Height in meters (must be > 0)");

    let table = CapabilityTable::new();
    table.register(
        descriptor(
            "calculate_bmi",
            "Calculate Body Mass Index (BMI) given weight in kilograms and height in meters. \
             Returns the BMI rounded to 2 decimal places.",
            shape,
        )?,
        bmi_handler,
    )?;
    Ok(table)
}

async fn bmi_handler(arguments: Map<String, Value>) -> HandlerResult {
    let weight = float(&arguments, "weight_kg")?;
    let height = float(&arguments, "height_m")?;
    calculate_bmi(weight, height).map(|bmi| json!(bmi))
}

fn weather() -> ProviderResult<CapabilityTable> {
    let table = CapabilityTable::new();
    table.register(
        descriptor(
            "get_weather",
            "Get the weather for a given location",
            InputShape::object().required("location", ArgumentKind::String),
        )?,
        get_weather,
    )?;
    Ok(table)
}

async fn get_weather(arguments: Map<String, Value>) -> HandlerResult {
    let location = arguments
        .get("location")
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::new("`location` must be a string"))?;
    tracing::debug!(location, "weather requested");
    Ok(json!("The weather is sunny"))
}

/// Body mass index rounded to two decimals.
///
/// # Errors
///
/// Rejects non-positive or non-finite inputs.
pub fn calculate_bmi(weight_kg: f64, height_m: f64) -> Result<f64, HandlerError> {
    if !(weight_kg.is_finite() && height_m.is_finite()) || weight_kg <= 0.0 || height_m <= 0.0 {
        return Err(HandlerError::new(
            "Weight and height must both be greater than zero.",
        ));
    }
    Ok((weight_kg / (height_m * height_m) * 100.0).round() / 100.0)
}

fn float(arguments: &Map<String, Value>, name: &str) -> Result<f64, HandlerError> {
    arguments
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| HandlerError::new(format!("`{name}` must be a number")))
}

fn arithmetic(
    arguments: &Map<String, Value>,
    integral: fn(i64, i64) -> Option<i64>,
    real: fn(f64, f64) -> f64,
) -> HandlerResult {
    let (a, b) = (operand(arguments, "a")?, operand(arguments, "b")?);

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = integral(x, y) {
            return Ok(json!(result));
        }
    }

    let (x, y) = (float(arguments, "a")?, float(arguments, "b")?);
    let result = real(x, y);
    if !result.is_finite() {
        return Err(HandlerError::new("result is not a finite number"));
    }
    Ok(json!(result))
}

fn operand<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<&'a Value, HandlerError> {
    arguments
        .get(name)
        .filter(|value| value.is_number())
        .ok_or_else(|| HandlerError::new(format!("`{name}` must be a number")))
}

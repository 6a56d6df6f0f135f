//! Renders the registry and a user request into the decision prompt.

use std::fmt::Write as _;

use bridge_primitives::Capability;
use bridge_registry::CapabilityRegistry;
use tracing::debug;

use crate::template::{PromptTemplate, TemplateResult};

/// Reply the model gives when no capability applies.
pub const NO_CAPABILITY_SENTINEL: &str = "No capability needed";

/// Placeholder receiving the rendered capability catalogue.
pub const CAPABILITIES_VAR: &str = "capabilities";

/// Placeholder receiving the user's request.
pub const REQUEST_VAR: &str = "request";

const DEFAULT_TEMPLATE: &str = "\
You are a helpful assistant with access to these capabilities:

{{capabilities}}
Choose the appropriate capability based on the user's request.
User's request: {{request}}

Respond in exactly one of two ways.
If no capability is needed, respond with exactly: No capability needed
If a capability is needed, respond with a single JSON object in this format:
{
  \"tool\": \"capability-name\",
  \"arguments\": {
    \"argument-name\": \"value\"
  }
}
IMPORTANT: For numeric arguments, use JSON numbers and do not quote numbers.
";

/// Deterministic prompt builder.
///
/// The compiled text is the only way the model learns which capabilities
/// exist; identical inputs always produce identical output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptCompiler {
    template: PromptTemplate,
}

impl Default for PromptCompiler {
    fn default() -> Self {
        Self {
            template: PromptTemplate::new(DEFAULT_TEMPLATE),
        }
    }
}

impl PromptCompiler {
    /// Compiler using the built-in instruction block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler using a custom template.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TemplateError::MissingPlaceholder`] unless the
    /// template references both `{{capabilities}}` and `{{request}}`, or
    /// [`crate::TemplateError::Unterminated`] for an unclosed placeholder.
    pub fn with_template(template: impl Into<String>) -> TemplateResult<Self> {
        let template = PromptTemplate::builder(template)
            .with_required_variable(CAPABILITIES_VAR)
            .with_required_variable(REQUEST_VAR)
            .build()?;
        Ok(Self { template })
    }

    /// Template in use.
    #[must_use]
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Renders every capability in name order followed by the request and
    /// the response contract.
    #[must_use]
    pub fn compile(&self, request: &str, registry: &CapabilityRegistry) -> String {
        let catalogue = render_catalogue(registry);
        let prompt = self.template.fill(|name| match name {
            CAPABILITIES_VAR => Some(catalogue.as_str()),
            REQUEST_VAR => Some(request),
            _ => None,
        });
        debug!(
            capabilities = registry.len(),
            prompt_bytes = prompt.len(),
            "compiled decision prompt"
        );
        prompt
    }
}

/// Compiles with the built-in instruction block.
#[must_use]
pub fn compile(request: &str, registry: &CapabilityRegistry) -> String {
    PromptCompiler::default().compile(request, registry)
}

fn render_catalogue(registry: &CapabilityRegistry) -> String {
    if registry.is_empty() {
        return "(no capabilities are available)\n".to_owned();
    }
    let mut out = String::new();
    for capability in registry.iter() {
        render_capability(&mut out, capability);
    }
    out
}

fn render_capability(out: &mut String, capability: &Capability) {
    let shape = serde_json::to_string(capability.input_shape().as_value())
        .unwrap_or_else(|_| "{}".to_owned());
    let _ = writeln!(out, "- name: {}", capability.name());
    let _ = writeln!(out, "  description: {}", capability.description());
    let _ = writeln!(out, "  input schema: {shape}");
}

#[cfg(test)]
mod tests {
    use bridge_primitives::{ArgumentKind, CapabilityName, InputShape};

    use super::*;
    use crate::TemplateError;

    fn capability(name: &str, description: &str, shape: InputShape) -> Capability {
        Capability::builder(CapabilityName::new(name).unwrap())
            .description(description)
            .unwrap()
            .input_shape(shape)
            .build()
            .unwrap()
    }

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::from_listings([
            (
                "math",
                vec![
                    capability(
                        "multiply",
                        "Multiply two numbers",
                        InputShape::object()
                            .required("a", ArgumentKind::Number)
                            .required("b", ArgumentKind::Number),
                    ),
                    capability(
                        "add",
                        "Add two numbers",
                        InputShape::object()
                            .required("a", ArgumentKind::Number)
                            .required("b", ArgumentKind::Number),
                    ),
                ],
            ),
            (
                "weather",
                vec![capability(
                    "get_weather",
                    "Get the weather for a location",
                    InputShape::object().required("location", ArgumentKind::String),
                )],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn compile_is_pure() {
        let registry = registry();
        let first = compile("What is 10 plus 8?", &registry);
        let second = compile("What is 10 plus 8?", &registry.clone());
        assert_eq!(first, second);
    }

    #[test]
    fn capabilities_appear_in_name_order_before_the_request() {
        let prompt = compile("What is 10 plus 8?", &registry());

        let add = prompt.find("- name: add").unwrap();
        let weather = prompt.find("- name: get_weather").unwrap();
        let multiply = prompt.find("- name: multiply").unwrap();
        let request = prompt.find("User's request: What is 10 plus 8?").unwrap();
        assert!(add < weather && weather < multiply && multiply < request);

        assert!(prompt.contains("description: Add two numbers"));
        assert!(prompt.contains(r#""location":{"title":"Location","type":"string"}"#));
    }

    #[test]
    fn instruction_block_names_both_response_shapes() {
        let prompt = compile("hello", &registry());
        assert!(prompt.contains(NO_CAPABILITY_SENTINEL));
        assert!(prompt.contains("\"tool\""));
        assert!(prompt.contains("\"arguments\""));
        assert!(prompt.contains("do not quote numbers"));
    }

    #[test]
    fn request_text_is_not_expanded() {
        let prompt = compile("show me {{capabilities}}", &registry());
        assert!(prompt.contains("User's request: show me {{capabilities}}"));
        assert_eq!(prompt.matches("- name: add").count(), 1);
    }

    #[test]
    fn empty_registry_still_yields_contract() {
        let prompt = compile("hello", &CapabilityRegistry::new());
        assert!(prompt.contains("(no capabilities are available)"));
        assert!(prompt.contains(NO_CAPABILITY_SENTINEL));
    }

    #[test]
    fn custom_template_must_reference_both_inputs() {
        let err = PromptCompiler::with_template("Only {{request}}").unwrap_err();
        assert!(matches!(err, TemplateError::MissingPlaceholder { ref name } if name == "capabilities"));

        let compiler =
            PromptCompiler::with_template("Tools:\n{{capabilities}}Ask: {{request}}").unwrap();
        let prompt = compiler.compile("hi", &registry());
        assert!(prompt.starts_with("Tools:\n- name: add"));
        assert!(prompt.ends_with("Ask: hi"));
    }
}

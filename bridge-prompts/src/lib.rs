//! Prompt compilation.
//!
//! [`compile`] turns a [`bridge_registry::CapabilityRegistry`] and a user
//! request into the text sent to the model. The text carries the whole
//! capability catalogue and the two reply shapes the decision parser accepts.

#![warn(missing_docs, clippy::pedantic)]

mod compiler;
mod template;

pub use compiler::{
    CAPABILITIES_VAR, NO_CAPABILITY_SENTINEL, PromptCompiler, REQUEST_VAR, compile,
};
pub use template::{PromptTemplate, TemplateBuilder, TemplateError, TemplateResult};

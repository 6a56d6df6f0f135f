//! `{{variable}}` templates rendered in a single pass.

use std::fmt;

/// Result alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors raised while building a template.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// The template never references a variable it must contain.
    #[error("template does not reference `{{{{{name}}}}}`")]
    MissingPlaceholder {
        /// Name of the absent placeholder.
        name: String,
    },

    /// A `{{` was never closed.
    #[error("unterminated placeholder at byte {offset}")]
    Unterminated {
        /// Byte offset of the opening braces.
        offset: usize,
    },
}

/// A prompt template with `{{variable}}` placeholders.
///
/// Rendering walks the template once. Substituted values are copied into the
/// output verbatim and never scanned for further placeholders, so a request
/// text containing `{{capabilities}}` stays literal.
///
/// # Examples
///
/// ```
/// use bridge_prompts::PromptTemplate;
///
/// let template = PromptTemplate::builder("Tools: {{tools}}\nAsk: {{request}}")
///     .with_required_variable("tools")
///     .with_required_variable("request")
///     .build()
///     .unwrap();
///
/// let rendered = template.fill(|name| match name {
///     "tools" => Some("add"),
///     "request" => Some("{{tools}} please"),
///     _ => None,
/// });
/// assert_eq!(rendered, "Tools: add\nAsk: {{tools}} please");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Wraps template text without validating it.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Returns a builder that validates the text.
    #[must_use]
    pub fn builder(template: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder::new(template)
    }

    /// Substitutes every placeholder through `lookup`; unknown names render
    /// as empty text.
    pub fn fill<'v>(&self, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
        let mut output = String::with_capacity(self.template.len());
        for segment in segments(&self.template) {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Placeholder(name) => output.push_str(lookup(name).unwrap_or_default()),
            }
        }
        output
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        segments(&self.template).filter_map(|segment| match segment {
            Segment::Placeholder(name) => Some(name),
            Segment::Text(_) => None,
        })
    }

    /// Returns the raw template string.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Builder for [`PromptTemplate`].
#[derive(Debug)]
pub struct TemplateBuilder {
    template: String,
    required_variables: Vec<String>,
}

impl TemplateBuilder {
    /// Creates a new builder with the supplied template text.
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            required_variables: Vec::new(),
        }
    }

    /// Declares a variable the template must reference.
    #[must_use]
    pub fn with_required_variable(mut self, name: impl Into<String>) -> Self {
        self.required_variables.push(name.into());
        self
    }

    /// Builds the template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Unterminated`] for an unclosed `{{`, and
    /// [`TemplateError::MissingPlaceholder`] when a required variable never
    /// appears in the text.
    pub fn build(self) -> TemplateResult<PromptTemplate> {
        if let Some(offset) = unterminated(&self.template) {
            return Err(TemplateError::Unterminated { offset });
        }

        let template = PromptTemplate::new(self.template);
        if let Some(name) = self
            .required_variables
            .into_iter()
            .find(|name| !template.placeholders().any(|found| found == name.as_str()))
        {
            return Err(TemplateError::MissingPlaceholder { name });
        }
        Ok(template)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn segments(template: &str) -> impl Iterator<Item = Segment<'_>> {
    let mut rest = template;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(open) = rest.find("{{") else {
            let text = rest;
            rest = "";
            return Some(Segment::Text(text));
        };
        if open > 0 {
            let text = &rest[..open];
            rest = &rest[open..];
            return Some(Segment::Text(text));
        }
        let Some(close) = rest[2..].find("}}") else {
            let text = rest;
            rest = "";
            return Some(Segment::Text(text));
        };
        let name = rest[2..2 + close].trim();
        rest = &rest[4 + close..];
        Some(Segment::Placeholder(name))
    })
}

fn unterminated(template: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(open) = template[offset..].find("{{") {
        let start = offset + open;
        let Some(close) = template[start + 2..].find("}}") else {
            return Some(start);
        };
        offset = start + 2 + close + 2;
    }
    None
}

//! Turns free-form model replies into typed decisions.
//!
//! Model output is untrusted text. The parser looks for the first complete
//! JSON object anywhere in the reply, so prose before it and markdown fences
//! around it are tolerated, and anything after it is ignored. Objects nested
//! inside a brace group that is not valid JSON are never picked. Without an
//! object, the reply must contain the no-capability sentinel.

use serde_json::{Deserializer, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Keys accepted for the capability name, in priority order.
pub const NAME_KEYS: [&str; 3] = ["tool", "capability", "name"];

/// Phrases meaning "answer without a capability", compared lowercase.
pub const NO_ACTION_SENTINELS: [&str; 2] = ["no capability needed", "no tool needed"];

const EXCERPT_CHARS: usize = 120;

/// Result alias for decision parsing.
pub type DecisionResult<T> = Result<T, DecisionError>;

/// What the model asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The request can be answered without a capability.
    NoActionNeeded,
    /// Invoke `capability` with `arguments`.
    Invoke {
        /// Capability name as written by the model.
        capability: String,
        /// Arguments exactly as written by the model.
        arguments: Map<String, Value>,
    },
}

impl Decision {
    /// Capability the decision targets, if any.
    #[must_use]
    pub fn capability(&self) -> Option<&str> {
        match self {
            Self::NoActionNeeded => None,
            Self::Invoke { capability, .. } => Some(capability),
        }
    }
}

/// Reasons a reply could not become a [`Decision`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    /// The reply holds neither a JSON object nor the sentinel.
    #[error("model reply is neither a decision object nor the sentinel: {excerpt:?}")]
    Unparseable {
        /// Leading part of the reply.
        excerpt: String,
    },

    /// A JSON object was found but does not have the decision shape.
    #[error("malformed decision object: {reason}")]
    Malformed {
        /// What is wrong with the object.
        reason: String,
        /// The object as found.
        object: Value,
    },
}

/// Parses a model reply.
///
/// # Errors
///
/// Returns [`DecisionError::Malformed`] when the first JSON object in the
/// reply lacks a non-empty capability name or an `arguments` object, and
/// [`DecisionError::Unparseable`] when the reply has no object and no
/// sentinel. A capability is never guessed.
pub fn parse(reply: &str) -> DecisionResult<Decision> {
    if let Some(object) = first_object(reply) {
        let decision = from_object(object)?;
        debug!(capability = ?decision.capability(), "parsed decision object");
        return Ok(decision);
    }

    let lowered = reply.to_lowercase();
    if NO_ACTION_SENTINELS
        .iter()
        .any(|sentinel| lowered.contains(sentinel))
    {
        debug!("model declined to use a capability");
        return Ok(Decision::NoActionNeeded);
    }

    let excerpt: String = reply.trim().chars().take(EXCERPT_CHARS).collect();
    warn!(%excerpt, "unparseable model reply");
    Err(DecisionError::Unparseable { excerpt })
}

fn first_object(reply: &str) -> Option<Map<String, Value>> {
    let mut resume = 0;
    for (start, _) in reply.match_indices('{') {
        if start < resume {
            continue;
        }
        let mut values = Deserializer::from_str(&reply[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(object))) => return Some(object),
            // Braces inside a broken object belong to it.
            _ => resume = start + group_len(&reply[start..])?,
        }
    }
    None
}

/// Byte length of the brace group that opens `text`, or `None` if it never
/// closes. Braces inside JSON strings are not counted.
fn group_len(text: &str) -> Option<usize> {
    let (mut depth, mut in_string, mut escaped) = (0_usize, false, false);
    for (index, byte) in text.bytes().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn from_object(mut object: Map<String, Value>) -> DecisionResult<Decision> {
    let malformed = |reason: String, object: Map<String, Value>| DecisionError::Malformed {
        reason,
        object: Value::Object(object),
    };

    let Some(key) = NAME_KEYS.iter().find(|key| object.contains_key(**key)) else {
        return Err(malformed(
            format!("expected one of {NAME_KEYS:?} naming the capability"),
            object,
        ));
    };

    let capability = object
        .get(*key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned);
    let Some(capability) = capability else {
        return Err(malformed(
            format!("`{key}` must be a non-empty string"),
            object,
        ));
    };

    match object.remove("arguments") {
        Some(Value::Object(arguments)) => Ok(Decision::Invoke {
            capability,
            arguments,
        }),
        Some(other) => {
            object.insert("arguments".to_owned(), other);
            Err(malformed("`arguments` must be an object".to_owned(), object))
        }
        None => Err(malformed("`arguments` is missing".to_owned(), object)),
    }
}

//! Defines the error types for encoding and decoding.
use super::protocol::Arity;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerialiseError {
    /// Saving a model whose spatial operators have not been discretised.
    #[error("Only a discretised, ready-to-solve model can be serialised (model '{model}')")]
    NotDiscretised { model: String },

    /// A node that cannot produce a snapshot in its current state.
    #[error("Symbol '{name}' is a continuous {operator} operator and must be discretised before serialising")]
    UndiscretisedNode { name: String, operator: &'static str },

    #[error("Unresolvable type tag '{tag}'")]
    UnresolvableType { tag: String },

    #[error("Variant '{variant}' expects {expected} children, got {actual}")]
    ArityMismatch { variant: &'static str, expected: Arity, actual: usize },

    #[error("No target model variant: none was supplied and the snapshot carries no type tag")]
    MissingTarget,

    #[error("Malformed record{}: {reason}", .tag.as_ref().map(|t| format!(" '{}'", t)).unwrap_or_default())]
    MalformedRecord { tag: Option<String>, reason: String },

    #[error("Invalid attributes for '{tag}': {source}")]
    InvalidAttribute {
        tag: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerialiseError {
    pub fn malformed(tag: Option<&str>, reason: impl Into<String>) -> Self {
        SerialiseError::MalformedRecord { tag: tag.map(str::to_string), reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = SerialiseError::UnresolvableType { tag: "expression_tree.Bogus".into() };
        assert!(err.to_string().contains("expression_tree.Bogus"));

        let err = SerialiseError::ArityMismatch { variant: "Subtraction", expected: Arity::Exact(2), actual: 1 };
        assert_eq!(err.to_string(), "Variant 'Subtraction' expects exactly 2 children, got 1");

        let err = SerialiseError::malformed(Some("expression_tree.events.Event"), "missing 'expression'");
        assert_eq!(err.to_string(), "Malformed record 'expression_tree.events.Event': missing 'expression'");

        let err = SerialiseError::malformed(None, "record is not an object");
        assert_eq!(err.to_string(), "Malformed record: record is not an object");
    }
}

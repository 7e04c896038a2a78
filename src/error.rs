//! Error types.
//!
//! Only compile-time failures are errors. Conditions that arise while a
//! generated program runs (a placeholder past the end of a message, a write to
//! an unbound array) degrade to a logged no-op inside the node and never reach
//! the caller, with the exception of [`EvalError`], which the template engine
//! hands to the node so it can decide what to skip.

use thiserror::Error;

/// Failures that abort compilation of a patch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Declaration arguments have the wrong arity or type for the node type.
    #[error("invalid declaration for [{node_type}]: {message}")]
    InvalidDeclaration { node_type: String, message: String },

    /// A `$n` reference whose index is not a positive integer.
    #[error("invalid placeholder in `{token}`: {reason}")]
    InvalidPlaceholder { token: String, reason: String },

    /// No node type is registered under this identifier.
    #[error("unknown node type `{0}`")]
    UnknownNodeType(String),

    /// Two nodes were declared with the same id.
    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),

    /// Global code units depend on each other in a cycle.
    #[error("global code dependency cycle through `{0}`")]
    DependencyCycle(&'static str),

    /// A connection references a missing port or mixes signal and message ports.
    #[error("invalid connection: {0}")]
    InvalidConnection(String),

    /// Settings could not be read or hold an unsupported value.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CompileError {
    pub fn invalid_declaration(node_type: &str, message: impl Into<String>) -> Self {
        CompileError::InvalidDeclaration {
            node_type: node_type.to_owned(),
            message: message.into(),
        }
    }
}

/// Conditions hit while evaluating a template against a live message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalError {
    /// `$index` points past the end of the incoming message.
    #[error("placeholder ${index} out of range for a message of length {length}")]
    PlaceholderOutOfRange { index: usize, length: usize },
}

/// Result type alias for compile-time operations
pub type Result<T> = std::result::Result<T, CompileError>;

//! Policy error types.

use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The tokenizer found input that matches no token pattern.
    #[error("lex error at offset {position}: {message}")]
    Lex { position: usize, message: String },

    /// The parser found a token it did not expect.
    ///
    /// `found` is `None` when the input ended early.
    #[error("unexpected {}: expected {expected}", found.as_deref().unwrap_or("end of input"))]
    Syntax {
        found: Option<String>,
        expected: String,
    },

    /// No object with this name is registered.
    #[error("unknown object '{0}'")]
    UnknownObject(String),

    /// The object has no relation with this name.
    #[error("no relation '{relation}' defined for object '{object}'")]
    UnknownRelation { object: String, relation: String },

    /// The object has no filter with this name.
    #[error("no filter '{filter}' defined for object '{object}'")]
    UnknownFilter { object: String, filter: String },

    /// No permission with this name is registered.
    #[error("unknown permission '{0}'")]
    UnknownPermission(String),

    /// A permission instance has the wrong number of arguments.
    #[error("permission '{permission}' expects {expected} parameters, but {found} given")]
    ArityMismatch {
        permission: String,
        expected: usize,
        found: usize,
    },

    /// A grant expression is not a permission instance.
    #[error("expression needs to be a permission instance, got '{0}'")]
    InvalidGrantShape(String),

    /// The primary key of an expression cannot be inferred without a query.
    #[error("primary key could not be inferred for '{0}'")]
    AmbiguousPrimaryKey(String),

    /// A `$parameter` has no binding in scope.
    #[error("no parameter named '{0}' in scope")]
    UnboundParameter(String),

    /// A `$parameter` binding refers back to itself.
    #[error("parameter '{0}' is bound in terms of itself")]
    CyclicBinding(String),

    /// An object set was required but a literal or instance was found.
    #[error("'{0}' does not describe a set of objects")]
    NotAnObjectSet(String),

    /// The model definition is inconsistent.
    #[error("invalid model: {0}")]
    Registration(String),
}

pub type Result<T> = std::result::Result<T, Error>;

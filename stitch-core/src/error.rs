//! Error taxonomy for the planner and composer.
//!
//! Mirrors the split used throughout the merged-schema tooling this crate is modeled on: a
//! `thiserror` enum of well-known, matchable cases (`StitchError`) plus a macro for the "this
//! should never happen" paths, so a bug surfaces as a labeled internal error instead of a panic
//! wherever that's avoidable.

use apollo_compiler::Name;

/// Create an internal error.
///
/// # Example
/// ```
/// use stitch_core::error::StitchError;
/// use stitch_core::internal_error;
///
/// fn example(maybe: Option<()>) -> Result<(), StitchError> {
///     maybe.ok_or_else(|| internal_error!("expected {} to be Some", "maybe"))
/// }
/// ```
#[macro_export]
macro_rules! internal_error {
    ( $( $arg:tt )+ ) => {
        $crate::error::StitchError::Internal { message: format!( $( $arg )+ ) }
    }
}

/// One subschema's reported error, or a wrapped executor rejection (taxonomy case 2 and 3).
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("{message}")]
pub struct GraphQLError {
    pub message: String,
    pub path: Option<Vec<PathElement>>,
    /// `true` when this wraps a subschema executor rejection rather than a reported error in
    /// `result.errors` (taxonomy case 3 vs case 2).
    pub from_executor_rejection: bool,
}

impl GraphQLError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            from_executor_rejection: false,
        }
    }

    pub fn from_rejection(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            from_executor_rejection: true,
        }
    }
}

/// One step of a response path: either a response key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    Key(String),
    Index(usize),
}

/// Errors raised while building context, planning, or composing (taxonomy cases 1 and 4).
///
/// Context-build errors (invalid schema, missing/ambiguous operation, failed variable coercion)
/// and invariant violations (malformed stitched responses) share this type because both are
/// reported the same way by the entry point: as a `{ errors: [...] }` response with no `data`,
/// rather than merged into a partial result.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum StitchError {
    /// Something that should be impossible given this crate's own invariants happened anyway.
    /// Never expected in normal operation; always a bug in this crate or a subschema that
    /// violates its contract.
    #[error("internal stitching error: {message}")]
    Internal { message: String },

    #[error("Must provide an operation.")]
    MissingOperation,

    #[error("Unknown operation named \"{name}\".")]
    UnknownOperation { name: String },

    #[error("Must provide operation name if query contains multiple operations.")]
    AmbiguousOperation,

    #[error("Schema is not configured to execute {operation} operation.")]
    RootTypeMissing { operation: &'static str },

    #[error("Subschema is not configured to execute subscription operation.")]
    SubscriptionNotSupported,

    #[error("Variable \"${name}\" of required type was not provided.")]
    MissingRequiredVariable { name: Name },

    #[error("Unknown variable type for \"${name}\": {type_name}")]
    UnknownVariableType { name: Name, type_name: String },

    #[error("Too many variable coercion errors (limit {max_errors}); aborting.")]
    TooManyVariableErrors { max_errors: usize },

    #[error("Fragment \"{name}\" forms a cycle through its own spreads.")]
    FragmentCycle { name: Name },

    #[error("Unknown fragment \"{name}\".")]
    UnknownFragment { name: Name },

    #[error(
        "Stitched response at \"{path}\" is missing the \"__stitching__typename\" marker field."
    )]
    MissingStitchingTypename { path: String },

    #[error(
        "Stitched response at \"{path}\" reported concrete type \"{type_name}\" which is not a known object type in the super-schema."
    )]
    UnknownConcreteType { path: String, type_name: String },

    #[error(
        "No stitch plan arm found for concrete type \"{type_name}\" at \"{path}\" (expected one of: {expected:?})."
    )]
    NoStitchPlanArm {
        path: String,
        type_name: String,
        expected: Vec<String>,
    },
}

impl StitchError {
    /// Render as a single `GraphQLError` the way the entry point surfaces context-build and
    /// invariant-violation errors (taxonomy cases 1 and 4).
    pub fn into_graphql_error(self) -> GraphQLError {
        GraphQLError::new(self.to_string())
    }
}

//! Planner/composer configuration, in the style of `apollo-federation`'s `QueryPlannerConfig`: a
//! small, `Default`-able struct rather than a grab bag of loose function arguments.

use crate::schema::variables::DEFAULT_MAX_ERRORS;

/// Tunables for [`crate::plan::planner`].
#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    /// Reuse cached `FieldPlan`s for identical `(parent type, field-node identity)` pairs. Disabling
    /// this is mostly useful for tests that want to assert on plan identity/count without memoised
    /// sharing getting in the way.
    pub memoization_enabled: bool,
    /// Whether `__schema`/`__type` are resolvable on the query root at all. When `false`, the query
    /// root's introspection fields behave as if no subschema could resolve them.
    pub introspection_enabled: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            memoization_enabled: true,
            introspection_enabled: true,
        }
    }
}

/// Tunables for [`crate::execute`] and variable coercion.
#[derive(Debug, Clone, Copy)]
pub struct ComposerConfig {
    pub max_variable_errors: usize,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_variable_errors: DEFAULT_MAX_ERRORS,
        }
    }
}

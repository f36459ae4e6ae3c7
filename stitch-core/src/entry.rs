//! Entry-point wrapper: the thin external interface that builds execution context, asks the
//! Planner for a root [`FieldPlan`], constructs a [`Composer`], and drives it to a response.
//!
//! Grounded in `apollo-federation`'s own top-level `Supergraph`/`QueryPlanner` entry points: a
//! small, mostly-branching function that turns "a document plus maybe an operation name plus raw
//! variables" into either an early-exit error or a real plan, with no algorithmic content of its
//! own.

use std::pin::Pin;
use std::sync::Arc;

use apollo_compiler::Name;
use futures::{Stream, StreamExt};
use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;
use tracing::instrument;

use crate::config::{ComposerConfig, PlannerConfig};
use crate::error::{GraphQLError, StitchError};
use crate::execute::{ComposeOutcome, ComposedResult, Composer, DocumentContext};
use crate::operation::{OperationKind, RawOperation};
use crate::plan::planner::{self, PlannerMemo};
use crate::preprocess;
use crate::schema::variables::{get_variable_values, VariableCoercionOptions};
use crate::schema::{IncrementalStream, SuperSchema};

/// A parsed document containing one or more operations that share a fragment pool, exactly the
/// "parsed-and-typed representation" an integrator's GraphQL front-end hands to this crate. This
/// crate does not implement the underlying query language grammar itself.
#[derive(Debug, Clone, Default)]
pub struct RawDocument {
    pub operations: Vec<RawOperation>,
}

/// The entry point's intermediate value: the chosen operation plus coerced and raw variables.
/// Exists only within this module.
struct ExecutionContext<'a> {
    operation: &'a RawOperation,
    coerced_variables: IndexMap<Name, JsonValue>,
}

/// Top-level response shape.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub data: Option<JsonValue>,
    pub errors: Vec<GraphQLError>,
    /// `true` on the initial payload of an incremental response; `false` for an ordinary complete
    /// response.
    pub has_next: bool,
}

impl Response {
    fn errors_only(errors: Vec<GraphQLError>) -> Self {
        Self {
            data: None,
            errors,
            has_next: false,
        }
    }

    fn from_composed(result: ComposedResult) -> Self {
        Self {
            data: result.data,
            errors: result.errors,
            has_next: result.has_next,
        }
    }
}

/// What [`execute`] returns: a complete response, a response plus a consolidated incremental
/// stream, or (for subscriptions) a lazy sequence of complete responses, one per event.
pub enum ExecuteOutcome {
    Complete(Response),
    Incremental {
        initial: Response,
        subsequent: IncrementalStream,
    },
    Subscription(Pin<Box<dyn Stream<Item = Response> + Send>>),
}

/// Select the operation to run out of a (possibly multi-operation) document.
fn select_operation<'a>(
    document: &'a RawDocument,
    operation_name: Option<&str>,
) -> Result<&'a RawOperation, StitchError> {
    match document.operations.as_slice() {
        [] => Err(StitchError::MissingOperation),
        [only] => {
            if let Some(name) = operation_name {
                if only.name.as_deref() != Some(name) {
                    return Err(StitchError::UnknownOperation {
                        name: name.to_owned(),
                    });
                }
            }
            Ok(only)
        }
        many => match operation_name {
            None => Err(StitchError::AmbiguousOperation),
            Some(name) => many
                .iter()
                .find(|op| op.name.as_deref() == Some(name))
                .ok_or_else(|| StitchError::UnknownOperation {
                    name: name.to_owned(),
                }),
        },
    }
}

fn build_context<'a>(
    document: &'a RawDocument,
    operation_name: Option<&str>,
    raw_variables: &IndexMap<Name, JsonValue>,
    composer_config: &ComposerConfig,
) -> Result<ExecutionContext<'a>, Vec<GraphQLError>> {
    let operation = select_operation(document, operation_name)
        .map_err(|err| vec![err.into_graphql_error()])?;

    let outcome = get_variable_values(
        &operation.variable_definitions,
        raw_variables,
        VariableCoercionOptions {
            max_errors: composer_config.max_variable_errors,
        },
    );
    if !outcome.errors.is_empty() {
        return Err(outcome
            .errors
            .into_iter()
            .map(StitchError::into_graphql_error)
            .collect());
    }

    Ok(ExecutionContext {
        operation,
        coerced_variables: outcome.coerced,
    })
}

fn document_context(operation: &RawOperation) -> DocumentContext {
    DocumentContext {
        kind: operation.kind,
        name: operation.name.clone(),
        variable_definitions: Arc::new(operation.variable_definitions.clone()),
        fragments: Arc::new(operation.fragments.clone()),
    }
}

/// Build context, plan, and compose: the whole of the entry point's job.
#[instrument(level = "debug", skip_all, fields(operation_name))]
pub async fn execute(
    schema: &SuperSchema,
    document: &RawDocument,
    operation_name: Option<&str>,
    raw_variables: IndexMap<Name, JsonValue>,
    planner_config: &PlannerConfig,
    composer_config: &ComposerConfig,
    memo: &PlannerMemo,
) -> ExecuteOutcome {
    let context = match build_context(document, operation_name, &raw_variables, composer_config) {
        Ok(context) => context,
        Err(errors) => return ExecuteOutcome::Complete(Response::errors_only(errors)),
    };

    let preprocessed = match preprocess::preprocess(context.operation, &context.coerced_variables) {
        Ok(operation) => operation,
        Err(err) => return ExecuteOutcome::Complete(Response::errors_only(vec![err.into_graphql_error()])),
    };

    let plan = match planner::plan_operation(schema, &preprocessed, planner_config, memo) {
        Ok(plan) => plan,
        Err(err) => return ExecuteOutcome::Complete(Response::errors_only(vec![err.into_graphql_error()])),
    };

    let composer = Composer::new(
        schema,
        context.coerced_variables,
        document_context(context.operation),
    );

    if context.operation.kind == OperationKind::Subscription {
        return match composer.subscribe(&plan).await {
            Ok(stream) => ExecuteOutcome::Subscription(Box::pin(stream.map(|result| Response {
                data: result.data,
                errors: result.errors,
                has_next: false,
            }))),
            Err(err) => ExecuteOutcome::Complete(Response::errors_only(vec![err.into_graphql_error()])),
        };
    }

    match composer.compose(&plan).await {
        ComposeOutcome::Complete(result) => ExecuteOutcome::Complete(Response::from_composed(result)),
        ComposeOutcome::Incremental { initial, subsequent } => ExecuteOutcome::Incremental {
            initial: Response::from_composed(initial),
            subsequent,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::RawOperation;
    use apollo_compiler::name;
    use indexmap::IndexMap;

    fn op(kind: OperationKind, name: Option<&str>) -> RawOperation {
        RawOperation {
            kind,
            name: name.map(|n| Name::new(n).unwrap()),
            variable_definitions: Vec::new(),
            selection_set: Vec::new(),
            fragments: IndexMap::new(),
        }
    }

    #[test]
    fn empty_document_is_missing_operation() {
        let document = RawDocument { operations: vec![] };
        let err = select_operation(&document, None).unwrap_err();
        assert!(matches!(err, StitchError::MissingOperation));
    }

    #[test]
    fn multiple_operations_without_name_is_ambiguous() {
        let document = RawDocument {
            operations: vec![
                op(OperationKind::Query, Some("A")),
                op(OperationKind::Query, Some("B")),
            ],
        };
        let err = select_operation(&document, None).unwrap_err();
        assert!(matches!(err, StitchError::AmbiguousOperation));
    }

    #[test]
    fn unknown_operation_name_is_reported() {
        let document = RawDocument {
            operations: vec![op(OperationKind::Query, Some("A"))],
        };
        let err = select_operation(&document, Some("B")).unwrap_err();
        assert!(matches!(err, StitchError::UnknownOperation { name } if name == "B"));
    }

    #[test]
    fn named_operation_is_selected_among_many() {
        let document = RawDocument {
            operations: vec![
                op(OperationKind::Query, Some("A")),
                op(OperationKind::Query, Some("B")),
            ],
        };
        let selected = select_operation(&document, Some("B")).unwrap();
        assert_eq!(selected.name, Some(name!("B")));
    }
}

//! The Composer/Executor: drives a [`FieldPlan`] to completion against real subschemas.
//!
//! Grounded in `apollo-federation`/`apollo-router`'s own execution loop in spirit: a join-set of
//! concurrently dispatched fetches feeding a single owning task that is the only place mutable
//! response state is touched. The tree-walking merge algorithm itself is this crate's own, since
//! stitching merges disjoint subtrees of a shared object rather than joining on `@key` references
//! the way federation's `execution.rs` does.

pub mod stream;

use std::sync::Arc;

use apollo_compiler::Name;
use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;
use tracing::{debug, instrument, warn};

use crate::error::{GraphQLError, PathElement, StitchError};
use crate::execute::stream::StreamConsolidator;
use crate::operation::{FragmentDefinitionNode, OperationKind, SelectionNode, VariableDefinitionNode};
use crate::plan::{FieldPlan, StitchPlan, SubschemaPlan};
use crate::schema::{
    ExecutionResult, IncrementalPayload, IncrementalStream, OutgoingDocument, SingleResult, Subschema,
    SubschemaRequest, SuperSchema,
};

/// The non-incremental portion of a composed response: merged `data` plus accumulated errors.
#[derive(Debug, Clone, Default)]
pub struct ComposedResult {
    pub data: Option<JsonValue>,
    pub errors: Vec<GraphQLError>,
    /// Set when at least one dispatched subschema contributed an incremental stream still being
    /// consolidated: this is the merged initial response, with more to follow.
    pub has_next: bool,
}

/// What [`Composer::compose`] and [`Composer::subscribe`] return.
pub enum ComposeOutcome {
    Complete(ComposedResult),
    Incremental {
        initial: ComposedResult,
        subsequent: IncrementalStream,
    },
}

/// Everything the composer needs to reconstruct an outgoing document for any subschema plan: the
/// original operation header and fragment definitions, carried verbatim.
#[derive(Clone)]
pub struct DocumentContext {
    pub kind: OperationKind,
    pub name: Option<Name>,
    pub variable_definitions: Arc<Vec<VariableDefinitionNode>>,
    pub fragments: Arc<IndexMap<Name, FragmentDefinitionNode>>,
}

struct FetchJob {
    subschema: Arc<Subschema>,
    selections: Vec<SelectionNode>,
    path: Vec<PathElement>,
    stitch_plans: IndexMap<Name, StitchPlan>,
}

enum JobOutcome {
    Single(SingleResult),
    /// A subschema answered with an initial payload plus a lazy sequence of deltas. The initial
    /// payload merges in exactly like [`JobOutcome::Single`]; the stream is fanned into this
    /// composer's own [`StreamConsolidator`].
    Incremental(SingleResult, IncrementalStream),
    Rejected(String),
}

/// Single-use driver of one [`FieldPlan`] against one [`SuperSchema`]. Composer instances are
/// consumed by `compose`/`subscribe` and cannot be reused afterward.
pub struct Composer<'a> {
    schema: &'a SuperSchema,
    variables: IndexMap<Name, JsonValue>,
    document: DocumentContext,
    data: JsonValue,
    errors: Vec<GraphQLError>,
    nulled: bool,
}

impl<'a> Composer<'a> {
    pub fn new(schema: &'a SuperSchema, variables: IndexMap<Name, JsonValue>, document: DocumentContext) -> Self {
        Self {
            schema,
            variables,
            document,
            data: JsonValue::Object(serde_json_bytes::Map::new()),
            errors: Vec::new(),
            nulled: false,
        }
    }

    /// Dispatch every root subschema plan, fold results as they arrive, and follow up on stitched
    /// fields until nothing is left pending.
    #[instrument(level = "debug", skip_all)]
    pub async fn compose(mut self, plan: &FieldPlan) -> ComposeOutcome {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(Vec<PathElement>, IndexMap<Name, StitchPlan>, JobOutcome)>();
        let mut pending = 0usize;
        let mut consolidator: Option<StreamConsolidator<IncrementalPayload, IncrementalPayload>> = None;

        for subschema_plan in &plan.subschema_plans {
            self.spawn_job(
                &tx,
                FetchJob {
                    subschema: subschema_plan.target.0.clone(),
                    selections: subschema_plan.selections.clone(),
                    path: Vec::new(),
                    stitch_plans: subschema_plan.stitch_plans.clone(),
                },
            );
            pending += 1;
        }

        while pending > 0 {
            let Some((path, stitch_plans, outcome)) = rx.recv().await else {
                break;
            };
            pending -= 1;
            let (result, incremental_source) = match outcome {
                JobOutcome::Single(result) => (result, None),
                JobOutcome::Incremental(initial, subsequent) => (initial, Some(subsequent)),
                JobOutcome::Rejected(message) => {
                    warn!(path = ?path, %message, "subschema executor rejected");
                    (
                        SingleResult {
                            data: None,
                            errors: vec![GraphQLError::from_rejection(message)],
                        },
                        None,
                    )
                }
            };
            if let Some(source) = incremental_source {
                debug!(path = ?path, "folding subschema incremental stream into consolidator");
                consolidator
                    .get_or_insert_with(StreamConsolidator::new)
                    .add_source(source);
            }
            let followups = self.handle_result(path, stitch_plans, result);
            for job in followups {
                self.spawn_job(&tx, job);
                pending += 1;
            }
        }

        let data = if self.nulled {
            None
        } else {
            let mut data = std::mem::replace(&mut self.data, JsonValue::Null);
            strip_stitching_markers(&mut data);
            Some(data)
        };

        match consolidator {
            None => ComposeOutcome::Complete(ComposedResult {
                data,
                errors: self.errors,
                has_next: false,
            }),
            Some(consolidator) => ComposeOutcome::Incremental {
                initial: ComposedResult {
                    data,
                    errors: self.errors,
                    has_next: true,
                },
                subsequent: consolidator.into_stream(),
            },
        }
    }

    /// For a subscription, the single chosen subschema's `subscriber` replaces the usual fan-out.
    pub async fn subscribe(
        self,
        plan: &FieldPlan,
    ) -> Result<std::pin::Pin<Box<dyn futures::Stream<Item = SingleResult> + Send>>, StitchError> {
        let Some(subschema_plan) = plan.subschema_plans.first() else {
            return Err(StitchError::SubscriptionNotSupported);
        };
        let Some(subscriber) = subschema_plan.target.0.subscriber.clone() else {
            return Err(StitchError::SubscriptionNotSupported);
        };
        let request = self.build_request(&subschema_plan.selections);
        subscriber
            .subscribe(request)
            .await
            .map_err(|err| StitchError::Internal {
                message: format!("subscription rejected: {err}"),
            })
    }

    fn build_request(&self, selections: &[SelectionNode]) -> SubschemaRequest {
        SubschemaRequest {
            document: OutgoingDocument {
                kind: self.document.kind,
                name: self.document.name.clone(),
                variable_definitions: self.document.variable_definitions.clone(),
                selection_set: selections.to_vec(),
                fragments: self.document.fragments.clone(),
            },
            variables: self.variables.clone(),
        }
    }

    fn spawn_job(&self, tx: &tokio::sync::mpsc::UnboundedSender<(Vec<PathElement>, IndexMap<Name, StitchPlan>, JobOutcome)>, job: FetchJob) {
        debug!(subschema = %job.subschema.name, path = ?job.path, "dispatching subschema fetch");
        let request = self.build_request(&job.selections);
        let executor = job.subschema.executor.clone();
        let tx = tx.clone();
        let path = job.path;
        let stitch_plans = job.stitch_plans;
        tokio::spawn(async move {
            let outcome = match executor.execute(request).await {
                Ok(ExecutionResult::Single(result)) => JobOutcome::Single(result),
                Ok(ExecutionResult::Incremental { initial, subsequent }) => {
                    JobOutcome::Incremental(initial, subsequent)
                }
                Err(err) => JobOutcome::Rejected(err.to_string()),
            };
            let _ = tx.send((path, stitch_plans, outcome));
        });
    }

    /// Merge one job's result into the composed response, returning the follow-up fetches
    /// discovered by walking this job's stitch plans.
    fn handle_result(&mut self, path: Vec<PathElement>, stitch_plans: IndexMap<Name, StitchPlan>, result: SingleResult) -> Vec<FetchJob> {
        self.errors.extend(result.errors);

        if self.is_nulled_out(&path) {
            return Vec::new();
        }

        match result.data {
            None => {
                self.null_out(&path);
                Vec::new()
            }
            Some(JsonValue::Object(incoming)) => {
                self.merge_at(&path, JsonValue::Object(incoming));
                self.walk_stitch_plans(&path, &stitch_plans)
            }
            Some(other) => {
                // A non-object `data` at a non-root path would violate the subschema contract;
                // still merge (overwrite) rather than panic, and let downstream invariant checks
                // surface anything actually broken.
                self.merge_at(&path, other);
                Vec::new()
            }
        }
    }

    fn is_nulled_out(&self, path: &[PathElement]) -> bool {
        if path.is_empty() {
            return self.nulled;
        }
        match get_ref(&self.data, path) {
            Some(JsonValue::Null) => true,
            Some(_) => false,
            None => true,
        }
    }

    fn null_out(&mut self, path: &[PathElement]) {
        if path.is_empty() {
            self.nulled = true;
            return;
        }
        if let Some(slot) = get_mut(&mut self.data, path) {
            *slot = JsonValue::Null;
        }
    }

    fn merge_at(&mut self, path: &[PathElement], incoming: JsonValue) {
        if path.is_empty() {
            deep_merge(&mut self.data, incoming);
            return;
        }
        if let Some(slot) = get_mut(&mut self.data, path) {
            deep_merge(slot, incoming);
        }
    }

    /// Walk a job's stitch plans against the just-merged data, discovering follow-up fetches.
    #[instrument(level = "debug", skip_all)]
    fn walk_stitch_plans(&mut self, base_path: &[PathElement], stitch_plans: &IndexMap<Name, StitchPlan>) -> Vec<FetchJob> {
        let schema = self.schema;
        let mut followups = Vec::new();
        let mut new_errors = Vec::new();

        for (response_key, stitch_plan) in stitch_plans {
            let mut child_path = base_path.to_vec();
            child_path.push(PathElement::Key(response_key.to_string()));
            let resolved: Vec<(Vec<PathElement>, Result<Option<Arc<FieldPlan>>, StitchError>)> = {
                let Some(value) = get_ref(&self.data, &child_path) else {
                    continue;
                };
                elementwise(value, &child_path)
                    .into_iter()
                    .map(|(object_path, object)| {
                        let outcome = resolve_stitch_arm(schema, stitch_plan, &object_path, object);
                        (object_path, outcome)
                    })
                    .collect()
            };
            for (object_path, outcome) in resolved {
                match outcome {
                    Ok(Some(arm)) => {
                        for subschema_plan in &arm.subschema_plans {
                            followups.push(build_followup_job(subschema_plan, &object_path));
                        }
                    }
                    Ok(None) => {}
                    Err(err) => new_errors.push(err),
                }
            }
        }

        self.errors.extend(new_errors.into_iter().map(StitchError::into_graphql_error));
        followups
    }
}

fn build_followup_job(subschema_plan: &SubschemaPlan, path: &[PathElement]) -> FetchJob {
    debug!(subschema = %subschema_plan.target.0.name, path = ?path, "enqueuing stitch follow-up");
    FetchJob {
        subschema: subschema_plan.target.0.clone(),
        selections: subschema_plan.selections.clone(),
        path: path.to_vec(),
        stitch_plans: subschema_plan.stitch_plans.clone(),
    }
}

fn resolve_stitch_arm(schema: &SuperSchema, stitch_plan: &StitchPlan, path: &[PathElement], object: &JsonValue) -> Result<Option<Arc<FieldPlan>>, StitchError> {
    let JsonValue::Object(map) = object else {
        return Ok(None);
    };
    let Some(JsonValue::String(type_name)) = map.get("__stitching__typename") else {
        return Err(StitchError::MissingStitchingTypename {
            path: format_path(path),
        });
    };
    let type_name_str = type_name.as_str();
    let Ok(type_name) = Name::new(type_name_str) else {
        return Err(StitchError::UnknownConcreteType {
            path: format_path(path),
            type_name: type_name_str.to_owned(),
        });
    };
    if !schema.is_object_type(&type_name) {
        return Err(StitchError::UnknownConcreteType {
            path: format_path(path),
            type_name: type_name_str.to_owned(),
        });
    }
    match stitch_plan.plans_by_type.get(&type_name) {
        Some(arm) => Ok(Some(arm.clone())),
        None => Err(StitchError::NoStitchPlanArm {
            path: format_path(path),
            type_name: type_name_str.to_owned(),
            expected: stitch_plan.plans_by_type.keys().map(|n| n.to_string()).collect(),
        }),
    }
}

fn format_path(path: &[PathElement]) -> String {
    path.iter()
        .map(|element| match element {
            PathElement::Key(key) => key.clone(),
            PathElement::Index(index) => index.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Treats an array elementwise, numbering each element's path component.
fn elementwise<'v>(value: &'v JsonValue, base_path: &[PathElement]) -> Vec<(Vec<PathElement>, &'v JsonValue)> {
    match value {
        JsonValue::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_null())
            .map(|(index, item)| {
                let mut path = base_path.to_vec();
                path.push(PathElement::Index(index));
                (path, item)
            })
            .collect(),
        JsonValue::Null => Vec::new(),
        other => vec![(base_path.to_vec(), other)],
    }
}

fn get_ref<'v>(root: &'v JsonValue, path: &[PathElement]) -> Option<&'v JsonValue> {
    let mut current = root;
    for element in path {
        current = match (current, element) {
            (JsonValue::Object(map), PathElement::Key(key)) => map.get(key.as_str())?,
            (JsonValue::Array(items), PathElement::Index(index)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

fn get_mut<'v>(root: &'v mut JsonValue, path: &[PathElement]) -> Option<&'v mut JsonValue> {
    let mut current = root;
    for element in path {
        current = match (current, element) {
            (JsonValue::Object(map), PathElement::Key(key)) => map.get_mut(key.as_str())?,
            (JsonValue::Array(items), PathElement::Index(index)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Remove every `__stitching__typename` marker the planner injected, so the client-visible
/// response carries no trace of it.
fn strip_stitching_markers(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            map.remove("__stitching__typename");
            for (_, child) in map.iter_mut() {
                strip_stitching_markers(child);
            }
        }
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                strip_stitching_markers(item);
            }
        }
        _ => {}
    }
}

/// Deep-merge `incoming` into `*target`: overwrite unless both sides are objects, in which case
/// merge per sub-key recursively.
fn deep_merge(target: &mut JsonValue, incoming: JsonValue) {
    match (target, incoming) {
        (JsonValue::Object(existing), JsonValue::Object(new_fields)) => {
            for (key, value) in new_fields.into_iter() {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, incoming) => {
            *slot = incoming;
        }
    }
}

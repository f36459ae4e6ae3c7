//! The Planner: a pure function `(SuperSchema, Operation, CoercedVariables) -> FieldPlan`.
//!
//! Grounded in `apollo-federation`'s `query_plan::query_planner::QueryPlanner` in spirit (a
//! memoising, side-effect-free compiler from an operation to a plan tree) though the tree shape
//! itself (`FieldPlan`/`SubschemaPlan`/`StitchPlan`) is this crate's own, since stitching's
//! "which-subschema-serves-this-field" problem is a different one from federation's
//! entity-reference planning.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use apollo_compiler::Name;
use indexmap::{IndexMap, IndexSet};

use crate::config::PlannerConfig;
use crate::error::StitchError;
use crate::operation::{FieldNode, InlineFragmentNode, Operation, SelectionNode};
use crate::schema::{SubschemaRef, SuperSchema};

use super::{FieldPlan, StitchPlan};

const STITCHING_TYPENAME_ALIAS: &str = "__stitching__typename";

/// Append-only memoisation cache for [`create_field_plan`], keyed by pointer identity of the
/// field-node list plus the parent type and preferred subschema.
#[derive(Default)]
pub struct PlannerMemo {
    cache: Mutex<HashMap<MemoKey, Arc<FieldPlan>>>,
}

impl PlannerMemo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    parent_type: Name,
    field_nodes_ptr: usize,
    from_subschema: Option<usize>,
}

fn memo_key(parent_type: &Name, field_nodes: &Arc<[SelectionNode]>, from_subschema: Option<&SubschemaRef>) -> MemoKey {
    MemoKey {
        parent_type: parent_type.clone(),
        field_nodes_ptr: Arc::as_ptr(field_nodes) as *const () as usize,
        from_subschema: from_subschema.map(|s| Arc::as_ptr(&s.0) as *const () as usize),
    }
}

/// Plan a whole operation: resolve its root type and delegate to [`create_field_plan`].
pub fn plan_operation(
    schema: &SuperSchema,
    operation: &Operation,
    config: &PlannerConfig,
    memo: &PlannerMemo,
) -> Result<Arc<FieldPlan>, StitchError> {
    let root_type = schema
        .root_type(operation.kind)
        .cloned()
        .ok_or(StitchError::RootTypeMissing {
            operation: operation.kind.as_str(),
        })?;
    let field_nodes: Arc<[SelectionNode]> = operation.selection_set.clone().into();
    Ok(create_field_plan(schema, &root_type, &field_nodes, None, config, memo))
}

/// Builds a [`FieldPlan`] for one parent type and one ordered list of field nodes. `from_subschema`
/// is `None` for every call site in this implementation (the root plan and every stitch-plan arm
/// are each a fresh, undecided fetch); it stays a parameter because the field-node-level planning
/// algorithm this crate implements is defined in those terms, not selection-set terms.
pub fn create_field_plan(
    schema: &SuperSchema,
    parent_type: &Name,
    field_nodes: &Arc<[SelectionNode]>,
    from_subschema: Option<&SubschemaRef>,
    config: &PlannerConfig,
    memo: &PlannerMemo,
) -> Arc<FieldPlan> {
    if config.memoization_enabled {
        let key = memo_key(parent_type, field_nodes, from_subschema);
        if let Some(hit) = memo.cache.lock().expect("planner memo poisoned").get(&key).cloned() {
            return hit;
        }
    }

    let mut plan = FieldPlan::default();
    for selection in field_nodes.iter() {
        match selection {
            SelectionNode::Field(field) => {
                add_field_to_field_plan(&mut plan, from_subschema, parent_type, field, schema, config, memo);
            }
            SelectionNode::InlineFragment(fragment) => {
                add_inline_fragment(&mut plan, from_subschema, parent_type, fragment, schema, config, memo);
            }
        }
    }

    let plan = Arc::new(plan);
    if config.memoization_enabled {
        let key = memo_key(parent_type, field_nodes, from_subschema);
        memo.cache.lock().expect("planner memo poisoned").insert(key, plan.clone());
    }
    plan
}

/// Inline fragments at the top of a field-node sequence are flattened directly into the enclosing
/// plan build, provided their type condition is satisfied by the parent type. This crate's merged
/// registry has no general subtype oracle beyond possible-types membership, so that's what
/// satisfaction is checked against.
fn add_inline_fragment(
    plan: &mut FieldPlan,
    from_subschema: Option<&SubschemaRef>,
    parent_type: &Name,
    fragment: &Arc<InlineFragmentNode>,
    schema: &SuperSchema,
    config: &PlannerConfig,
    memo: &PlannerMemo,
) {
    let condition_satisfied = match &fragment.type_condition {
        None => true,
        Some(condition) => condition == parent_type || schema.possible_types(condition).contains(parent_type),
    };
    if !condition_satisfied {
        return;
    }
    for selection in &fragment.selection_set {
        match selection {
            SelectionNode::Field(field) => {
                add_field_to_field_plan(plan, from_subschema, parent_type, field, schema, config, memo);
            }
            SelectionNode::InlineFragment(nested) => {
                add_inline_fragment(plan, from_subschema, parent_type, nested, schema, config, memo);
            }
        }
    }
}

/// Adds one field node to a plan under construction, choosing (or reusing) a target subschema and
/// splitting its nested selections when they straddle more than one subschema.
fn add_field_to_field_plan(
    plan: &mut FieldPlan,
    from_subschema: Option<&SubschemaRef>,
    parent_type: &Name,
    field: &Arc<FieldNode>,
    schema: &SuperSchema,
    config: &PlannerConfig,
    memo: &PlannerMemo,
) {
    if is_disabled_introspection_field(field, schema, parent_type, config) {
        return;
    }
    let Some(candidates) = schema.field_subschemas(parent_type, &field.name) else {
        // "If absent, ignore the field."
        return;
    };
    if candidates.is_empty() {
        return;
    }

    match &field.selection_set {
        None => {
            let target = choose_subschema(candidates, from_subschema, plan);
            plan.subschema_plan_mut(&target, from_subschema)
                .selections
                .push(SelectionNode::Field(field.clone()));
        }
        Some(nested) => {
            let Some(return_type) = schema.field_def(parent_type, &field.name).map(|f| f.return_type_name) else {
                return;
            };
            let target = choose_subschema(candidates, from_subschema, plan);
            let (mut own_selections, other_selections) = split_selection_set(schema, &return_type, &target, nested);

            let stitch_plan = build_stitch_plan(schema, &return_type, &other_selections, config, memo);

            if from_subschema.is_none() && !other_selections.is_empty() {
                own_selections.insert(0, stitching_typename_marker());
            }

            if !own_selections.is_empty() {
                let field_with_own = Arc::new(field.with_selection_set(own_selections));
                let response_key = field_with_own.response_key().clone();
                let target_plan = plan.subschema_plan_mut(&target, from_subschema);
                target_plan.selections.push(SelectionNode::Field(field_with_own));
                attach_stitch_plan(plan, &target, from_subschema, response_key, stitch_plan);
            } else if !stitch_plan.is_empty() {
                // Still record the fetch so `__stitching__typename` (if any) gets sent, even
                // though this field contributes no other own-selections.
                let response_key = field.response_key().clone();
                plan.subschema_plan_mut(&target, from_subschema);
                attach_stitch_plan(plan, &target, from_subschema, response_key, stitch_plan);
            }
        }
    }
}

fn attach_stitch_plan(
    plan: &mut FieldPlan,
    target: &SubschemaRef,
    from_subschema: Option<&SubschemaRef>,
    response_key: Name,
    stitch_plan: StitchPlan,
) {
    if stitch_plan.is_empty() {
        return;
    }
    if from_subschema == Some(target) {
        plan.stitch_plans.insert(response_key, stitch_plan);
    } else {
        plan.subschema_plan_mut(target, from_subschema)
            .stitch_plans
            .insert(response_key, stitch_plan);
    }
}

fn stitching_typename_marker() -> SelectionNode {
    SelectionNode::field(FieldNode {
        alias: Some(Name::new(STITCHING_TYPENAME_ALIAS).expect("valid name")),
        name: Name::new("__typename").expect("valid name"),
        arguments: IndexMap::new(),
        directives: Vec::new(),
        selection_set: None,
    })
}

/// Build a [`StitchPlan`] from a field's other-selections: one supplemental [`FieldPlan`] per
/// possible runtime type of the field's return type, omitting types whose supplemental plan turns
/// out empty.
fn build_stitch_plan(
    schema: &SuperSchema,
    return_type: &Name,
    other_selections: &[SelectionNode],
    config: &PlannerConfig,
    memo: &PlannerMemo,
) -> StitchPlan {
    let mut stitch_plan = StitchPlan::default();
    if other_selections.is_empty() {
        return stitch_plan;
    }
    let field_nodes: Arc<[SelectionNode]> = other_selections.to_vec().into();
    for concrete_type in schema.possible_types(return_type) {
        let supplemental = create_field_plan(schema, &concrete_type, &field_nodes, None, config, memo);
        if !supplemental.is_empty() {
            stitch_plan.plans_by_type.insert(concrete_type, supplemental);
        }
    }
    stitch_plan
}

/// Preference rule shared by leaf and composite field handling: prefer the originating subschema
/// if it is a candidate, else prefer a subschema the plan already has an entry for, else take the
/// first candidate.
fn choose_subschema(candidates: &IndexSet<SubschemaRef>, from_subschema: Option<&SubschemaRef>, plan: &FieldPlan) -> SubschemaRef {
    if let Some(preferred) = from_subschema {
        if candidates.contains(preferred) {
            return preferred.clone();
        }
    }
    for candidate in candidates {
        if plan.subschema_plans.iter().any(|sp| &sp.target == candidate) {
            return candidate.clone();
        }
    }
    candidates
        .iter()
        .next()
        .cloned()
        .expect("candidates checked non-empty by caller")
}

/// Walk a selection set, classifying each selection relative to a single subschema. Recurses
/// through composite own-fields so that a field's return type may itself straddle more than one
/// subschema below the point where the parent became resolvable.
fn split_selection_set(
    schema: &SuperSchema,
    parent_type: &Name,
    subschema: &SubschemaRef,
    selections: &[SelectionNode],
) -> (Vec<SelectionNode>, Vec<SelectionNode>) {
    let mut own = Vec::new();
    let mut other = Vec::new();
    for selection in selections {
        match selection {
            SelectionNode::Field(field) => split_field(schema, parent_type, subschema, field, &mut own, &mut other),
            SelectionNode::InlineFragment(fragment) => {
                split_inline_fragment(schema, parent_type, subschema, fragment, &mut own, &mut other)
            }
        }
    }
    (own, other)
}

fn split_field(
    schema: &SuperSchema,
    parent_type: &Name,
    subschema: &SubschemaRef,
    field: &Arc<FieldNode>,
    own: &mut Vec<SelectionNode>,
    other: &mut Vec<SelectionNode>,
) {
    let resolvable = field.name.as_str() == "__typename"
        || schema
            .field_subschemas(parent_type, &field.name)
            .is_some_and(|set| set.contains(subschema));

    match &field.selection_set {
        None => {
            let bucket = if resolvable { &mut *own } else { &mut *other };
            bucket.push(SelectionNode::Field(field.clone()));
        }
        Some(nested) if resolvable => {
            let Some(return_type) = schema.field_def(parent_type, &field.name).map(|f| f.return_type_name) else {
                other.push(SelectionNode::Field(field.clone()));
                return;
            };
            let (child_own, child_other) = split_selection_set(schema, &return_type, subschema, nested);
            if !child_own.is_empty() {
                own.push(SelectionNode::Field(Arc::new(field.with_selection_set(child_own))));
            }
            if !child_other.is_empty() {
                other.push(SelectionNode::Field(Arc::new(field.with_selection_set(child_other))));
            }
        }
        Some(_) => {
            // Not resolvable by `subschema` at all: the whole subtree goes to the other side
            // untouched, since this subschema cannot fetch even the field itself.
            other.push(SelectionNode::Field(field.clone()));
        }
    }
}

fn split_inline_fragment(
    schema: &SuperSchema,
    parent_type: &Name,
    subschema: &SubschemaRef,
    fragment: &Arc<InlineFragmentNode>,
    own: &mut Vec<SelectionNode>,
    other: &mut Vec<SelectionNode>,
) {
    let narrowed_type = fragment.type_condition.clone().unwrap_or_else(|| parent_type.clone());
    let (child_own, child_other) = split_selection_set(schema, &narrowed_type, subschema, &fragment.selection_set);
    if !child_own.is_empty() {
        own.push(SelectionNode::inline_fragment(InlineFragmentNode {
            type_condition: fragment.type_condition.clone(),
            directives: fragment.directives.clone(),
            selection_set: child_own,
        }));
    }
    if !child_other.is_empty() {
        other.push(SelectionNode::inline_fragment(InlineFragmentNode {
            type_condition: fragment.type_condition.clone(),
            directives: fragment.directives.clone(),
            selection_set: child_other,
        }));
    }
}

fn is_disabled_introspection_field(field: &FieldNode, schema: &SuperSchema, parent_type: &Name, config: &PlannerConfig) -> bool {
    if config.introspection_enabled {
        return false;
    }
    let is_query_root = schema.root_type(crate::operation::OperationKind::Query) == Some(parent_type);
    is_query_root && matches!(field.name.as_str(), "__schema" | "__type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ExecutionResult, RejectionError, SingleResult, Subschema, SubschemaExecutor, SubschemaRequest};
    use apollo_compiler::name;
    use async_trait::async_trait;

    struct NullExecutor;

    #[async_trait]
    impl SubschemaExecutor for NullExecutor {
        async fn execute(&self, _request: SubschemaRequest) -> Result<ExecutionResult, RejectionError> {
            Ok(ExecutionResult::Single(SingleResult::default()))
        }
    }

    fn build_schema(sdl_subschemas: Vec<&str>) -> SuperSchema {
        let subschemas = sdl_subschemas
            .into_iter()
            .enumerate()
            .map(|(i, sdl)| {
                let schema = apollo_compiler::Schema::parse_and_validate(sdl, format!("s{i}.graphql")).unwrap();
                Subschema::new(format!("s{i}"), schema, Arc::new(NullExecutor))
            })
            .collect();
        SuperSchema::build(subschemas).unwrap()
    }

    fn leaf_field(name_str: &str) -> Arc<FieldNode> {
        Arc::new(FieldNode {
            alias: None,
            name: Name::new(name_str).unwrap(),
            arguments: IndexMap::new(),
            directives: Vec::new(),
            selection_set: None,
        })
    }

    #[test]
    fn single_subschema_passthrough_has_one_subschema_plan() {
        let schema = build_schema(vec!["type Query { hello: String }"]);
        let field_nodes: Arc<[SelectionNode]> = vec![SelectionNode::Field(leaf_field("hello"))].into();
        let plan = create_field_plan(
            &schema,
            schema.root_type(crate::operation::OperationKind::Query).unwrap(),
            &field_nodes,
            None,
            &PlannerConfig::default(),
            &PlannerMemo::new(),
        );
        assert_eq!(plan.subschema_plans.len(), 1);
        assert_eq!(plan.subschema_plans[0].selections.len(), 1);
    }

    #[test]
    fn field_absent_from_every_subschema_is_ignored() {
        let schema = build_schema(vec!["type Query { hello: String }"]);
        let field_nodes: Arc<[SelectionNode]> = vec![SelectionNode::Field(leaf_field("nonexistent"))].into();
        let plan = create_field_plan(
            &schema,
            schema.root_type(crate::operation::OperationKind::Query).unwrap(),
            &field_nodes,
            None,
            &PlannerConfig::default(),
            &PlannerMemo::new(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn cross_subschema_field_produces_two_subschema_plans() {
        let schema = build_schema(vec![
            "type Query { a: String }",
            "type Query { b: String }",
        ]);
        let field_nodes: Arc<[SelectionNode]> = vec![
            SelectionNode::Field(leaf_field("a")),
            SelectionNode::Field(leaf_field("b")),
        ]
        .into();
        let plan = create_field_plan(
            &schema,
            schema.root_type(crate::operation::OperationKind::Query).unwrap(),
            &field_nodes,
            None,
            &PlannerConfig::default(),
            &PlannerMemo::new(),
        );
        assert_eq!(plan.subschema_plans.len(), 2);
    }

    #[test]
    fn memoization_returns_identical_arc_for_identical_inputs() {
        let schema = build_schema(vec!["type Query { hello: String }"]);
        let field_nodes: Arc<[SelectionNode]> = vec![SelectionNode::Field(leaf_field("hello"))].into();
        let memo = PlannerMemo::new();
        let root = schema.root_type(crate::operation::OperationKind::Query).unwrap();
        let first = create_field_plan(&schema, root, &field_nodes, None, &PlannerConfig::default(), &memo);
        let second = create_field_plan(&schema, root, &field_nodes, None, &PlannerConfig::default(), &memo);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn stitched_object_field_gets_marker_and_stitch_plan() {
        let schema = build_schema(vec![
            "type Query { user: User } type User { id: String }",
            "type Query { _unused: String } type User { profile: String }",
        ]);
        let nested = Arc::new(FieldNode {
            alias: None,
            name: name!("user"),
            arguments: IndexMap::new(),
            directives: Vec::new(),
            selection_set: Some(vec![
                SelectionNode::Field(leaf_field("id")),
                SelectionNode::Field(leaf_field("profile")),
            ]),
        });
        let field_nodes: Arc<[SelectionNode]> = vec![SelectionNode::Field(nested)].into();
        let plan = create_field_plan(
            &schema,
            schema.root_type(crate::operation::OperationKind::Query).unwrap(),
            &field_nodes,
            None,
            &PlannerConfig::default(),
            &PlannerMemo::new(),
        );
        assert_eq!(plan.subschema_plans.len(), 1);
        let user_plan = &plan.subschema_plans[0];
        assert_eq!(user_plan.stitch_plans.len(), 1, "expected a stitch plan for the straddling `profile` field");
        let stitch_plan = user_plan.stitch_plans.values().next().unwrap();
        assert!(stitch_plan.plans_by_type.contains_key(&name!("User")));
    }
}

//! The plan data model: `FieldPlan` → `SubschemaPlan` → `StitchPlan` → `FieldPlan`.
//!
//! Modeled on the merged-schema tooling's own query-plan tree (`query_plan::QueryPlan` and its
//! `PlanNode` variants): an immutable, `Arc`-wrapped tree built bottom-up once by the planner and
//! then only ever read by the composer.

pub mod planner;

use std::sync::Arc;

use apollo_compiler::Name;
use indexmap::IndexMap;

use crate::operation::SelectionNode;
use crate::schema::SubschemaRef;

/// One fetch to one subschema, plus whatever stitch plans it directly carries.
#[derive(Debug, Clone)]
pub struct SubschemaPlan {
    pub target: SubschemaRef,
    /// The subschema whose result this plan follows up on, if any. `None` at the root.
    pub originating_subschema: Option<SubschemaRef>,
    pub selections: Vec<SelectionNode>,
    /// Stitch plans keyed by response key, anchored at *this* subschema plan's own fetch (as
    /// opposed to [`FieldPlan::stitch_plans`], anchored at the parent plan; see
    /// `planner::attach_stitch_plan` for when each anchor is chosen).
    pub stitch_plans: IndexMap<Name, StitchPlan>,
}

impl SubschemaPlan {
    fn new(target: SubschemaRef, originating_subschema: Option<SubschemaRef>) -> Self {
        Self {
            target,
            originating_subschema,
            selections: Vec::new(),
            stitch_plans: IndexMap::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.selections.is_empty() && self.stitch_plans.is_empty()
    }
}

/// Per-concrete-type dispatch table of follow-up [`FieldPlan`]s, consulted once the runtime type
/// of a stitched value is known.
#[derive(Debug, Clone, Default)]
pub struct StitchPlan {
    pub plans_by_type: IndexMap<Name, Arc<FieldPlan>>,
}

impl StitchPlan {
    pub fn is_empty(&self) -> bool {
        self.plans_by_type.is_empty()
    }
}

/// An immutable plan for resolving a set of field nodes at a particular parent type.
#[derive(Debug, Clone, Default)]
pub struct FieldPlan {
    pub subschema_plans: Vec<SubschemaPlan>,
    /// Stitch plans anchored directly on this plan, used when the chosen subschema for a stitched
    /// field is the same as the originating subschema the planner was called with, rather than on
    /// that subschema's own [`SubschemaPlan`].
    pub stitch_plans: IndexMap<Name, StitchPlan>,
}

impl FieldPlan {
    pub fn is_empty(&self) -> bool {
        self.subschema_plans.is_empty() && self.stitch_plans.is_empty()
    }

    fn subschema_plan_mut(&mut self, target: &SubschemaRef, originating_subschema: Option<&SubschemaRef>) -> &mut SubschemaPlan {
        if let Some(index) = self
            .subschema_plans
            .iter()
            .position(|existing| &existing.target == target)
        {
            return &mut self.subschema_plans[index];
        }
        self.subschema_plans
            .push(SubschemaPlan::new(target.clone(), originating_subschema.cloned()));
        self.subschema_plans.last_mut().expect("just pushed")
    }
}

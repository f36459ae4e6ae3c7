//! The super-schema: the merged view of every subschema a client query is written against.

mod introspection;
mod merge;
mod subschema;
pub mod variables;

pub use merge::{MergedCompositeType, MergedFieldDef};
pub use subschema::{
    ExecutionResult, IncrementalItem, IncrementalPayload, IncrementalStream, OutgoingDocument,
    RejectionError, SingleResult, Subschema, SubschemaExecutor, SubschemaRef, SubschemaRequest,
    SubschemaSubscriber,
};

use std::sync::Arc;

use apollo_compiler::Name;
use indexmap::IndexSet;

use crate::error::StitchError;
use crate::operation::OperationKind;

use merge::MergedRegistry;

/// A field definition lookup result, including protocol-defined meta-fields that aren't recorded
/// in the merged registry itself.
#[derive(Debug, Clone)]
pub struct FieldLookup {
    pub return_type_name: Name,
    pub is_abstract: bool,
    pub is_meta: bool,
}

struct SuperSchemaInner {
    subschemas: Vec<Arc<Subschema>>,
    registry: MergedRegistry,
    introspection: Arc<Subschema>,
}

/// Aggregates a sequence of [`Subschema`]s into the merged schema a client query is planned
/// against. Immutable after construction; cheap to clone and share across any number of
/// concurrent composers.
#[derive(Clone)]
pub struct SuperSchema(Arc<SuperSchemaInner>);

impl SuperSchema {
    /// Build once per set of subschemas. Binds the internal introspection subschema's executor
    /// against the freshly built registry and adds it as the resolver for `__schema`/`__type` on
    /// the query root.
    pub fn build(subschemas: Vec<Arc<Subschema>>) -> Result<Self, StitchError> {
        if subschemas.is_empty() {
            return Err(StitchError::Internal {
                message: "a super-schema requires at least one subschema".to_owned(),
            });
        }
        let mut registry = merge::build_registry(&subschemas)?;

        let (introspection, introspection_executor) = introspection::build(subschemas[0].schema.clone());
        if let Some(query_type) = registry.root_types.get(&OperationKind::Query).cloned() {
            let entry = registry.composite_types.entry(query_type).or_default();
            let introspection_ref: SubschemaRef = introspection.clone().into();
            for field in ["__schema", "__type"] {
                entry
                    .field_subschemas
                    .entry(Name::new(field).expect("valid name"))
                    .or_default()
                    .insert(introspection_ref.clone());
            }
        }

        let super_schema = SuperSchema(Arc::new(SuperSchemaInner {
            subschemas,
            registry,
            introspection,
        }));
        introspection_executor.bind(super_schema.clone());
        Ok(super_schema)
    }

    pub fn subschemas(&self) -> &[Arc<Subschema>] {
        &self.0.subschemas
    }

    /// The root type declared for the given operation kind, if any subschema defines one.
    pub fn root_type(&self, kind: OperationKind) -> Option<&Name> {
        self.0.registry.root_types.get(&kind)
    }

    /// Whether `type_name` is a known object type in the merged schema (used for the composer's
    /// runtime-type invariant check).
    pub fn is_object_type(&self, type_name: &Name) -> bool {
        self.0.registry.object_type_names.contains(type_name)
    }

    /// The concrete object types an abstract type may resolve to. Returns just `type_name` itself
    /// for a concrete type.
    pub fn possible_types(&self, type_name: &Name) -> IndexSet<Name> {
        match self.0.registry.composite_types.get(type_name) {
            Some(entry) if entry.is_abstract => entry.possible_types.clone(),
            _ => IndexSet::from([type_name.clone()]),
        }
    }

    pub fn is_abstract_type(&self, type_name: &Name) -> bool {
        self.0
            .registry
            .composite_types
            .get(type_name)
            .map(|entry| entry.is_abstract)
            .unwrap_or(false)
    }

    /// Look up a field definition on `parent_type`, falling through to `__typename` on every
    /// composite type and `__schema`/`__type` on the query root.
    pub fn field_def(&self, parent_type: &Name, field_name: &Name) -> Option<FieldLookup> {
        if field_name.as_str() == "__typename" {
            return Some(FieldLookup {
                return_type_name: Name::new("String").expect("valid name"),
                is_abstract: false,
                is_meta: true,
            });
        }
        let is_query_root = self.root_type(OperationKind::Query) == Some(parent_type);
        if is_query_root && field_name.as_str() == "__schema" {
            return Some(FieldLookup {
                return_type_name: Name::new("__Schema").expect("valid name"),
                is_abstract: false,
                is_meta: true,
            });
        }
        if is_query_root && field_name.as_str() == "__type" {
            return Some(FieldLookup {
                return_type_name: Name::new("__Type").expect("valid name"),
                is_abstract: false,
                is_meta: true,
            });
        }
        let entry = self.0.registry.composite_types.get(parent_type)?;
        let field = entry.fields.get(field_name)?;
        let return_type_name = field.return_type.inner_named().clone();
        Some(FieldLookup {
            is_abstract: self.is_abstract_type(&return_type_name),
            return_type_name,
            is_meta: false,
        })
    }

    /// The set of subschemas able to resolve `field_name` on `parent_type`.
    pub fn field_subschemas(&self, parent_type: &Name, field_name: &Name) -> Option<&IndexSet<SubschemaRef>> {
        self.0
            .registry
            .composite_types
            .get(parent_type)?
            .field_subschemas
            .get(field_name)
    }

    pub fn introspection_subschema(&self) -> &Arc<Subschema> {
        &self.0.introspection
    }
}

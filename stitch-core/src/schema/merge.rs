//! Merge policy for building a super-schema's type/field registry out of N subschemas.
//!
//! Grounded in `apollo-federation`'s own `merge_subgraphs` (`merge.rs`): a single pass that visits
//! every subschema's composite types in order and applies "first wins on conflicting definitions,
//! union on sets" the same way `apollo-federation`'s own `Merger` does for
//! fields/members/values/locations. The difference is this crate composes a lookup registry
//! instead of a new `apollo_compiler::Schema`, since stitching (unlike federation) never needs to
//! hand the merged schema back out as SDL.

use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Name;
use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;

use crate::error::StitchError;
use crate::operation::{OperationKind, TypeRef};

use super::subschema::{Subschema, SubschemaRef};

pub(super) const TYPENAME_FIELD: &str = "__typename";
pub(super) const SCHEMA_META_FIELD: &str = "__schema";
pub(super) const TYPE_META_FIELD: &str = "__type";

/// A merged field definition: only what the planner needs (return type, whether that return type
/// is abstract) plus which subschema's field definition won on a name conflict (first wins).
#[derive(Debug, Clone)]
pub struct MergedFieldDef {
    pub return_type: TypeRef,
}

/// A merged composite type: the union of field names across every subschema that defines the
/// type, each mapped to the set of subschemas that can resolve it.
#[derive(Debug, Clone, Default)]
pub struct MergedCompositeType {
    pub fields: IndexMap<Name, MergedFieldDef>,
    pub field_subschemas: IndexMap<Name, IndexSet<SubschemaRef>>,
    pub is_abstract: bool,
    /// Populated for interfaces and unions: the concrete object type names that satisfy it.
    pub possible_types: IndexSet<Name>,
}

#[derive(Debug, Default)]
pub struct MergedRegistry {
    pub root_types: IndexMap<OperationKind, Name>,
    pub composite_types: IndexMap<Name, MergedCompositeType>,
    pub object_type_names: IndexSet<Name>,
}

/// Build the merged registry: record root types and composite-type field sets across all
/// subschemas, first-definition-wins on conflicts, union on every "set of X" column.
pub fn build_registry(subschemas: &[Arc<Subschema>]) -> Result<MergedRegistry, StitchError> {
    let mut registry = MergedRegistry::default();

    // Pass 1: root types and the set of object type names (needed below to resolve interfaces'
    // possible types, since `implements_interfaces` is only recorded on object types).
    for subschema in subschemas {
        for (kind, op_type) in [
            (OperationKind::Query, apollo_compiler::ast::OperationType::Query),
            (OperationKind::Mutation, apollo_compiler::ast::OperationType::Mutation),
            (OperationKind::Subscription, apollo_compiler::ast::OperationType::Subscription),
        ] {
            if let Some(name) = subschema.schema.root_operation(op_type) {
                registry.root_types.entry(kind).or_insert_with(|| name.clone());
            }
        }
        for (type_name, extended_type) in &subschema.schema.types {
            if is_introspection_type(type_name) {
                continue;
            }
            if let ExtendedType::Object(_) = extended_type {
                registry.object_type_names.insert(type_name.clone());
            }
        }
    }

    // Pass 2: composite type field sets + subschema attribution.
    for subschema in subschemas {
        let subschema_ref: SubschemaRef = subschema.clone().into();
        for (type_name, extended_type) in &subschema.schema.types {
            if is_introspection_type(type_name) {
                continue;
            }
            match extended_type {
                ExtendedType::Object(obj) => {
                    let entry = registry
                        .composite_types
                        .entry(type_name.clone())
                        .or_default();
                    mark_typename_resolvable(entry, &subschema_ref);
                    for (field_name, field_def) in &obj.fields {
                        merge_field(entry, field_name, &field_def.ty, &subschema_ref);
                    }
                }
                ExtendedType::Interface(iface) => {
                    let entry = registry
                        .composite_types
                        .entry(type_name.clone())
                        .or_default();
                    entry.is_abstract = true;
                    mark_typename_resolvable(entry, &subschema_ref);
                    for (field_name, field_def) in &iface.fields {
                        merge_field(entry, field_name, &field_def.ty, &subschema_ref);
                    }
                }
                ExtendedType::Union(union_type) => {
                    let entry = registry
                        .composite_types
                        .entry(type_name.clone())
                        .or_default();
                    entry.is_abstract = true;
                    mark_typename_resolvable(entry, &subschema_ref);
                    for member in &union_type.members {
                        entry.possible_types.insert(member.name.clone());
                    }
                }
                _ => {}
            }
        }
    }

    // Pass 3: possible types for interfaces, unioning every object that `implements` it in any
    // subschema.
    for subschema in subschemas {
        for (type_name, extended_type) in &subschema.schema.types {
            let ExtendedType::Object(obj) = extended_type else {
                continue;
            };
            for interface_name in &obj.implements_interfaces {
                let interface_name: &Name = std::ops::Deref::deref(interface_name);
                if let Some(entry) = registry.composite_types.get_mut(interface_name) {
                    entry.possible_types.insert(type_name.clone());
                }
            }
        }
    }
    Ok(registry)
}

fn mark_typename_resolvable(entry: &mut MergedCompositeType, subschema: &SubschemaRef) {
    entry
        .field_subschemas
        .entry(Name::new(TYPENAME_FIELD).expect("valid name"))
        .or_default()
        .insert(subschema.clone());
}

fn merge_field(
    entry: &mut MergedCompositeType,
    field_name: &Name,
    ty: &apollo_compiler::ast::Type,
    subschema: &SubschemaRef,
) {
    entry
        .fields
        .entry(field_name.clone())
        .or_insert_with(|| MergedFieldDef {
            return_type: type_ref_from_ast(ty),
        });
    entry
        .field_subschemas
        .entry(field_name.clone())
        .or_default()
        .insert(subschema.clone());
}

fn type_ref_from_ast(ty: &apollo_compiler::ast::Type) -> TypeRef {
    use apollo_compiler::ast::Type as AstType;
    match ty {
        AstType::Named(name) => TypeRef::Named(name.clone()),
        AstType::NonNullNamed(name) => TypeRef::NonNull(Box::new(TypeRef::Named(name.clone()))),
        AstType::List(inner) => TypeRef::List(Box::new(type_ref_from_ast(inner))),
        AstType::NonNullList(inner) => {
            TypeRef::NonNull(Box::new(TypeRef::List(Box::new(type_ref_from_ast(inner)))))
        }
    }
}

fn is_introspection_type(name: &Name) -> bool {
    name.as_str().starts_with("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ExecutionResult, RejectionError, SingleResult, SubschemaExecutor, SubschemaRequest};
    use apollo_compiler::name;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct NullExecutor;

    #[async_trait]
    impl SubschemaExecutor for NullExecutor {
        async fn execute(&self, _request: SubschemaRequest) -> Result<ExecutionResult, RejectionError> {
            Ok(ExecutionResult::Single(SingleResult::default()))
        }
    }

    fn subschema(sdl: &str, name_str: &str) -> Arc<Subschema> {
        let schema = apollo_compiler::Schema::parse_and_validate(sdl, format!("{name_str}.graphql")).unwrap();
        Subschema::new(name_str, schema, Arc::new(NullExecutor))
    }

    /// Object/interface field sets union across subschemas; the first subschema to define a field
    /// name wins on a type conflict.
    #[test]
    fn object_fields_union_first_definition_wins_on_conflict() {
        let subschemas = vec![
            subschema("type Query { t: T } type T { a: String }", "s0"),
            subschema("type Query { _unused: Int } type T { a: Int b: Int }", "s1"),
        ];
        let registry = build_registry(&subschemas).unwrap();
        let t = registry.composite_types.get(&name!("T")).unwrap();
        assert_eq!(t.fields.keys().map(Name::as_str).collect::<Vec<_>>(), vec!["a", "b"]);
        // s0's `a: String` wins over s1's conflicting `a: Int`.
        assert_eq!(t.fields[&name!("a")].return_type, TypeRef::Named(name!("String")));
    }

    /// The candidate set for a field is the union of every subschema that defines it, not just the
    /// one whose definition won the type merge.
    #[test]
    fn field_subschema_sets_are_a_union_even_when_type_merge_first_wins() {
        let subschemas = vec![
            subschema("type Query { t: T } type T { a: String }", "s0"),
            subschema("type Query { _unused: Int } type T { a: Int }", "s1"),
        ];
        let registry = build_registry(&subschemas).unwrap();
        let t = registry.composite_types.get(&name!("T")).unwrap();
        let resolvers: Vec<_> = t.field_subschemas[&name!("a")].iter().map(|s| s.0.name.clone()).collect();
        assert_eq!(resolvers, vec!["s0".to_owned(), "s1".to_owned()]);
    }

    /// A union's members are the union of its members across every subschema that declares it.
    #[test]
    fn union_members_are_unioned_across_subschemas() {
        let subschemas = vec![
            subschema("type Query { q: Int } type A { x: Int } union U = A", "s0"),
            subschema("type Query { _u: Int } type B { y: Int } union U = B", "s1"),
        ];
        let registry = build_registry(&subschemas).unwrap();
        let u = registry.composite_types.get(&name!("U")).unwrap();
        assert!(u.is_abstract);
        let mut members: Vec<_> = u.possible_types.iter().map(Name::as_str).collect();
        members.sort_unstable();
        assert_eq!(members, vec!["A", "B"]);
    }

    /// Interface possible-types are the union of every object that `implements` it in *any*
    /// subschema, even if the interface itself is only declared in one.
    #[test]
    fn interface_possible_types_union_implementors_across_subschemas() {
        let subschemas = vec![
            subschema(
                "type Query { q: Int } interface Node { id: ID } type A implements Node { id: ID }",
                "s0",
            ),
            subschema(
                "type Query { _u: Int } interface Node { id: ID } type B implements Node { id: ID }",
                "s1",
            ),
        ];
        let registry = build_registry(&subschemas).unwrap();
        let node = registry.composite_types.get(&name!("Node")).unwrap();
        assert!(node.is_abstract);
        let mut implementors: Vec<_> = node.possible_types.iter().map(Name::as_str).collect();
        implementors.sort_unstable();
        assert_eq!(implementors, vec!["A", "B"]);
    }

    /// Every composite type always resolves `__typename`, from every subschema that defines it.
    #[test]
    fn typename_is_always_resolvable_on_composite_types() {
        let subschemas = vec![subschema("type Query { t: T } type T { a: String }", "s0")];
        let registry = build_registry(&subschemas).unwrap();
        let t = registry.composite_types.get(&name!("T")).unwrap();
        assert!(t.field_subschemas.contains_key(&name!("__typename")));
    }

    /// Regression test: the union merge arm used to skip `mark_typename_resolvable`, leaving
    /// union types without a `__typename` entry even though every other composite kind got one.
    #[test]
    fn typename_is_resolvable_on_union_types_too() {
        let subschemas = vec![subschema(
            "type Query { q: Int } type A { x: Int } union U = A",
            "s0",
        )];
        let registry = build_registry(&subschemas).unwrap();
        let u = registry.composite_types.get(&name!("U")).unwrap();
        assert!(u.field_subschemas.contains_key(&name!("__typename")));
    }
}

//! Owned, plan-friendly analogues of a parsed GraphQL operation.
//!
//! This crate treats "a parsed-and-typed representation" of the client operation as an external
//! input and is explicitly not responsible for grammar or validation. These types are that
//! representation: an integrator parses with whatever GraphQL front-end it likes and converts to
//! these shapes once. They are owned and cheaply clonable (selection sets are `Arc`-wrapped) so
//! that planning and memoisation can freely clone sub-trees instead of fighting a borrow checker
//! across recursive, cached calls, the same trade-off the merged-schema tooling this crate is
//! modeled on makes for its own `operation::SelectionSet` / `operation::Selection` wrappers.

use std::sync::Arc;

use apollo_compiler::Name;
use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;

/// A GraphQL input value as it appears in a query document: either a variable reference or a
/// literal (possibly nested in a list/object), never yet coerced against a schema type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Variable(Name),
    Literal(JsonValue),
    List(Vec<ArgumentValue>),
    Object(IndexMap<Name, ArgumentValue>),
}

impl ArgumentValue {
    /// Resolve variable references against a set of coerced variable values, producing a plain
    /// JSON value suitable for forwarding to a subschema executor.
    pub fn resolve(&self, variables: &IndexMap<Name, JsonValue>) -> JsonValue {
        match self {
            ArgumentValue::Variable(name) => {
                variables.get(name).cloned().unwrap_or(JsonValue::Null)
            }
            ArgumentValue::Literal(value) => value.clone(),
            ArgumentValue::List(items) => {
                JsonValue::Array(items.iter().map(|v| v.resolve(variables)).collect())
            }
            ArgumentValue::Object(fields) => {
                let map: serde_json_bytes::Map<serde_json_bytes::ByteString, JsonValue> = fields
                    .iter()
                    .map(|(k, v)| (k.as_str().into(), v.resolve(variables)))
                    .collect();
                JsonValue::Object(map)
            }
        }
    }
}

/// A directive application (e.g. `@skip(if: $x)`), already stripped of `@skip`/`@include` by
/// document preprocessing: those never survive into a planner-visible operation.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveNode {
    pub name: Name,
    pub arguments: IndexMap<Name, ArgumentValue>,
}

/// One field selection. `Arc`-wrapped so cloning a selection set while splitting it across
/// subschemas is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub alias: Option<Name>,
    pub name: Name,
    pub arguments: IndexMap<Name, ArgumentValue>,
    pub directives: Vec<DirectiveNode>,
    /// `None` for leaf fields (scalars/enums), `Some` (possibly empty before pruning) for fields
    /// with a composite return type.
    pub selection_set: Option<Vec<SelectionNode>>,
}

impl FieldNode {
    /// The response key: alias if present, else the field name.
    pub fn response_key(&self) -> &Name {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    pub fn with_selection_set(&self, selection_set: Vec<SelectionNode>) -> Self {
        Self {
            alias: self.alias.clone(),
            name: self.name.clone(),
            arguments: self.arguments.clone(),
            directives: self.directives.clone(),
            selection_set: Some(selection_set),
        }
    }
}

/// An inline fragment (`... on Type { ... }` or a bare `... { ... }`).
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragmentNode {
    pub type_condition: Option<Name>,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: Vec<SelectionNode>,
}

/// A single entry of a selection set. Fragment spreads never appear here: document preprocessing
/// inlines every spread before the planner runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionNode {
    Field(Arc<FieldNode>),
    InlineFragment(Arc<InlineFragmentNode>),
}

impl SelectionNode {
    pub fn field(node: FieldNode) -> Self {
        SelectionNode::Field(Arc::new(node))
    }

    pub fn inline_fragment(node: InlineFragmentNode) -> Self {
        SelectionNode::InlineFragment(Arc::new(node))
    }
}

/// A named fragment definition, as it appears in the document prior to inlining.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinitionNode {
    pub name: Name,
    pub type_condition: Name,
    pub directives: Vec<DirectiveNode>,
    pub selection_set: Vec<RawSelectionNode>,
}

/// A selection as parsed, before fragment spreads are inlined. Distinct from [`SelectionNode`]
/// because the planner must never see a spread, but document preprocessing needs a type that can
/// still contain one.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSelectionNode {
    Field {
        alias: Option<Name>,
        name: Name,
        arguments: IndexMap<Name, ArgumentValue>,
        directives: Vec<DirectiveNode>,
        selection_set: Option<Vec<RawSelectionNode>>,
    },
    InlineFragment {
        type_condition: Option<Name>,
        directives: Vec<DirectiveNode>,
        selection_set: Vec<RawSelectionNode>,
    },
    FragmentSpread {
        name: Name,
        directives: Vec<DirectiveNode>,
    },
}

/// The three operation kinds a super-schema can have root types for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

/// A raw (pre-preprocessing) client operation plus the fragment definitions it might reference.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOperation {
    pub kind: OperationKind,
    pub name: Option<Name>,
    pub variable_definitions: Vec<VariableDefinitionNode>,
    pub selection_set: Vec<RawSelectionNode>,
    pub fragments: IndexMap<Name, FragmentDefinitionNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinitionNode {
    pub name: Name,
    pub type_name: TypeRef,
    pub default_value: Option<ArgumentValue>,
}

/// A GraphQL type reference (`Foo`, `Foo!`, `[Foo!]!`, ...), needed only to tell whether a
/// variable is required and what named type it coerces against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(Name),
    NonNull(Box<TypeRef>),
    List(Box<TypeRef>),
}

impl TypeRef {
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    pub fn inner_named(&self) -> &Name {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::NonNull(inner) | TypeRef::List(inner) => inner.inner_named(),
        }
    }
}

/// A fully preprocessed operation: skip/include applied, fragments inlined. This is what the
/// Planner actually consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<Name>,
    pub selection_set: Vec<SelectionNode>,
}

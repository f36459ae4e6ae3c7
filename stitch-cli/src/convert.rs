//! Converts a real, parsed `apollo_compiler::ExecutableDocument` into the owned,
//! plan-friendly [`RawDocument`] representation `stitch_core` consumes.
//!
//! This bridge lives in the CLI, not the library: `stitch-core`'s stated non-goals are "the
//! underlying query language grammar" and "query validation beyond what the underlying parsed
//! document provides" (the core "consumes a parsed-and-typed representation"). This module is
//! where that representation actually gets produced for the demo binary, the same way an
//! integrator's own GraphQL front-end would before calling into the library.

use anyhow::{anyhow, Result};
use apollo_compiler::ast::{OperationType, Type as AstType, Value as AstValue};
use apollo_compiler::executable::{Fragment, Operation, Selection, SelectionSet};
use apollo_compiler::{ExecutableDocument, Name, Node};
use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;

use stitch_core::operation::{
    ArgumentValue, DirectiveNode, FragmentDefinitionNode, OperationKind, RawDocument,
    RawOperation, RawSelectionNode, TypeRef, VariableDefinitionNode,
};

pub fn convert_document(document: &ExecutableDocument) -> Result<RawDocument> {
    let fragments = convert_fragments(&document.fragments)?;
    let mut operations = Vec::new();

    if let Some(op) = &document.anonymous_operation {
        operations.push(convert_operation(None, op, &fragments)?);
    }
    for (name, op) in &document.named_operations {
        operations.push(convert_operation(Some(name.clone()), op, &fragments)?);
    }

    Ok(RawDocument { operations })
}

fn convert_fragments(
    fragments: &IndexMap<Name, Node<Fragment>>,
) -> Result<IndexMap<Name, FragmentDefinitionNode>> {
    let mut out = IndexMap::new();
    for (name, fragment) in fragments {
        out.insert(
            name.clone(),
            FragmentDefinitionNode {
                name: name.clone(),
                type_condition: fragment.selection_set.ty.clone(),
                directives: convert_directives(&fragment.directives)?,
                selection_set: convert_selection_set(&fragment.selection_set)?,
            },
        );
    }
    Ok(out)
}

fn convert_operation(
    name: Option<Name>,
    operation: &Node<Operation>,
    fragments: &IndexMap<Name, FragmentDefinitionNode>,
) -> Result<RawOperation> {
    let kind = match operation.operation_type {
        OperationType::Query => OperationKind::Query,
        OperationType::Mutation => OperationKind::Mutation,
        OperationType::Subscription => OperationKind::Subscription,
    };
    let variable_definitions = operation
        .variables
        .iter()
        .map(|def| {
            Ok(VariableDefinitionNode {
                name: def.name.clone(),
                type_name: convert_type(&def.ty),
                default_value: def
                    .default_value
                    .as_ref()
                    .map(|value| convert_value(value))
                    .transpose()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RawOperation {
        kind,
        name,
        variable_definitions,
        selection_set: convert_selection_set(&operation.selection_set)?,
        fragments: fragments.clone(),
    })
}

fn convert_selection_set(selection_set: &SelectionSet) -> Result<Vec<RawSelectionNode>> {
    selection_set
        .selections
        .iter()
        .map(convert_selection)
        .collect()
}

fn convert_selection(selection: &Selection) -> Result<RawSelectionNode> {
    match selection {
        Selection::Field(field) => Ok(RawSelectionNode::Field {
            alias: field.alias.clone(),
            name: field.name.clone(),
            arguments: convert_arguments(&field.arguments)?,
            directives: convert_directives(&field.directives)?,
            selection_set: if field.selection_set.selections.is_empty() {
                None
            } else {
                Some(convert_selection_set(&field.selection_set)?)
            },
        }),
        Selection::InlineFragment(fragment) => Ok(RawSelectionNode::InlineFragment {
            type_condition: fragment.type_condition.clone(),
            directives: convert_directives(&fragment.directives)?,
            selection_set: convert_selection_set(&fragment.selection_set)?,
        }),
        Selection::FragmentSpread(spread) => Ok(RawSelectionNode::FragmentSpread {
            name: spread.fragment_name.clone(),
            directives: convert_directives(&spread.directives)?,
        }),
    }
}

fn convert_directives(
    directives: &apollo_compiler::ast::DirectiveList,
) -> Result<Vec<DirectiveNode>> {
    directives
        .iter()
        .map(|directive| {
            Ok(DirectiveNode {
                name: directive.name.clone(),
                arguments: convert_arguments(&directive.arguments)?,
            })
        })
        .collect()
}

fn convert_arguments(
    arguments: &[Node<apollo_compiler::ast::Argument>],
) -> Result<IndexMap<Name, ArgumentValue>> {
    arguments
        .iter()
        .map(|arg| Ok((arg.name.clone(), convert_value(&arg.value)?)))
        .collect()
}

fn convert_value(value: &AstValue) -> Result<ArgumentValue> {
    Ok(match value {
        AstValue::Null => ArgumentValue::Literal(JsonValue::Null),
        AstValue::Variable(name) => ArgumentValue::Variable(name.clone()),
        AstValue::Enum(name) => ArgumentValue::Literal(JsonValue::String(name.as_str().into())),
        AstValue::String(s) => ArgumentValue::Literal(JsonValue::String(s.as_str().into())),
        AstValue::Boolean(b) => ArgumentValue::Literal(JsonValue::Bool(*b)),
        AstValue::Int(i) => {
            let parsed: i64 = i
                .as_str()
                .parse()
                .map_err(|_| anyhow!("integer literal \"{}\" out of range", i.as_str()))?;
            ArgumentValue::Literal(JsonValue::from(parsed))
        }
        AstValue::Float(f) => {
            let parsed: f64 = f
                .as_str()
                .parse()
                .map_err(|_| anyhow!("float literal \"{}\" is not valid", f.as_str()))?;
            ArgumentValue::Literal(JsonValue::from(parsed))
        }
        AstValue::List(items) => {
            let values = items
                .iter()
                .map(|item| convert_value(item))
                .collect::<Result<Vec<_>>>()?;
            ArgumentValue::List(values)
        }
        AstValue::Object(fields) => {
            let mut map = IndexMap::new();
            for (name, value) in fields {
                map.insert(name.clone(), convert_value(value)?);
            }
            ArgumentValue::Object(map)
        }
    })
}

fn convert_type(ty: &AstType) -> TypeRef {
    match ty {
        AstType::Named(name) => TypeRef::Named(name.clone()),
        AstType::NonNullNamed(name) => TypeRef::NonNull(Box::new(TypeRef::Named(name.clone()))),
        AstType::List(inner) => TypeRef::List(Box::new(convert_type(inner))),
        AstType::NonNullList(inner) => {
            TypeRef::NonNull(Box::new(TypeRef::List(Box::new(convert_type(inner)))))
        }
    }
}

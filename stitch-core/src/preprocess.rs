//! Document preprocessing: `@skip`/`@include` application and fragment-spread inlining.
//!
//! The Planner treats this as an external collaborator and assumes it has already run: by the
//! time an operation reaches the planner, its conditional selections have already been pruned and
//! every fragment spread inlined. This module is a reference implementation of that collaborator
//! so the crate is runnable end to end without an integrator supplying their own.

use indexmap::IndexMap;

use apollo_compiler::Name;
use serde_json_bytes::Value as JsonValue;

use crate::error::StitchError;
use crate::operation::{
    ArgumentValue, DirectiveNode, FieldNode, FragmentDefinitionNode, InlineFragmentNode, Operation,
    RawOperation, RawSelectionNode, SelectionNode,
};

/// Apply `@skip`/`@include` and inline all fragment spreads, producing the representation the
/// Planner requires.
pub fn preprocess(
    raw: &RawOperation,
    variables: &IndexMap<Name, JsonValue>,
) -> Result<Operation, StitchError> {
    let mut stack = Vec::new();
    let selection_set = inline_selection_set(&raw.selection_set, &raw.fragments, variables, &mut stack)?;
    Ok(Operation {
        kind: raw.kind,
        name: raw.name.clone(),
        selection_set,
    })
}

fn inline_selection_set(
    selections: &[RawSelectionNode],
    fragments: &IndexMap<Name, FragmentDefinitionNode>,
    variables: &IndexMap<Name, JsonValue>,
    stack: &mut Vec<Name>,
) -> Result<Vec<SelectionNode>, StitchError> {
    let mut out = Vec::with_capacity(selections.len());
    for selection in selections {
        match selection {
            RawSelectionNode::Field {
                alias,
                name,
                arguments,
                directives,
                selection_set,
            } => {
                if is_skipped(directives, variables)? {
                    continue;
                }
                let nested = match selection_set {
                    Some(nested) => Some(inline_selection_set(nested, fragments, variables, stack)?),
                    None => None,
                };
                out.push(SelectionNode::field(FieldNode {
                    alias: alias.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                    directives: strip_skip_include(directives),
                    selection_set: nested,
                }));
            }
            RawSelectionNode::InlineFragment {
                type_condition,
                directives,
                selection_set,
            } => {
                if is_skipped(directives, variables)? {
                    continue;
                }
                let nested = inline_selection_set(selection_set, fragments, variables, stack)?;
                out.push(SelectionNode::inline_fragment(InlineFragmentNode {
                    type_condition: type_condition.clone(),
                    directives: strip_skip_include(directives),
                    selection_set: nested,
                }));
            }
            RawSelectionNode::FragmentSpread { name, directives } => {
                if is_skipped(directives, variables)? {
                    continue;
                }
                let fragment = fragments
                    .get(name)
                    .ok_or_else(|| StitchError::UnknownFragment { name: name.clone() })?;
                if stack.contains(name) {
                    return Err(StitchError::FragmentCycle { name: name.clone() });
                }
                stack.push(name.clone());
                let nested =
                    inline_selection_set(&fragment.selection_set, fragments, variables, stack)?;
                stack.pop();
                out.push(SelectionNode::inline_fragment(InlineFragmentNode {
                    type_condition: Some(fragment.type_condition.clone()),
                    directives: strip_skip_include(&fragment.directives),
                    selection_set: nested,
                }));
            }
        }
    }
    Ok(out)
}

const SKIP: &str = "skip";
const INCLUDE: &str = "include";

/// Evaluate `@skip(if:)`/`@include(if:)` against coerced variables. Both may be present; `@skip`
/// wins on conflict, matching the reference GraphQL execution algorithm.
fn is_skipped(
    directives: &[DirectiveNode],
    variables: &IndexMap<Name, JsonValue>,
) -> Result<bool, StitchError> {
    let mut skip = false;
    let mut include = true;
    for directive in directives {
        if directive.name.as_str() == SKIP {
            skip = eval_if_argument(directive, variables)?;
        } else if directive.name.as_str() == INCLUDE {
            include = eval_if_argument(directive, variables)?;
        }
    }
    Ok(skip || !include)
}

fn eval_if_argument(
    directive: &DirectiveNode,
    variables: &IndexMap<Name, JsonValue>,
) -> Result<bool, StitchError> {
    let Some(if_arg) = directive.arguments.get("if") else {
        return Ok(false);
    };
    let resolved = if_arg.resolve(variables);
    Ok(resolved.as_bool().unwrap_or(false))
}

fn strip_skip_include(directives: &[DirectiveNode]) -> Vec<DirectiveNode> {
    directives
        .iter()
        .filter(|d| d.name.as_str() != SKIP && d.name.as_str() != INCLUDE)
        .cloned()
        .collect()
}

/// Convenience constructor for literal boolean arguments, used by tests exercising
/// `@skip`/`@include`.
pub fn literal_bool(value: bool) -> ArgumentValue {
    ArgumentValue::Literal(JsonValue::Bool(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use apollo_compiler::name;

    fn field(name_str: &str) -> RawSelectionNode {
        RawSelectionNode::Field {
            alias: None,
            name: Name::new(name_str).unwrap(),
            arguments: IndexMap::new(),
            directives: Vec::new(),
            selection_set: None,
        }
    }

    fn field_with_directive(name_str: &str, directive: &str, if_value: ArgumentValue) -> RawSelectionNode {
        let mut arguments = IndexMap::new();
        arguments.insert(Name::new("if").unwrap(), if_value);
        RawSelectionNode::Field {
            alias: None,
            name: Name::new(name_str).unwrap(),
            arguments: IndexMap::new(),
            directives: vec![DirectiveNode {
                name: Name::new(directive).unwrap(),
                arguments,
            }],
            selection_set: None,
        }
    }

    #[test]
    fn skip_true_removes_field() {
        let raw = RawOperation {
            kind: crate::operation::OperationKind::Query,
            name: None,
            variable_definitions: Vec::new(),
            selection_set: vec![
                field("a"),
                field_with_directive("b", "skip", literal_bool(true)),
            ],
            fragments: IndexMap::new(),
        };
        let op = preprocess(&raw, &IndexMap::new()).unwrap();
        assert_eq!(op.selection_set.len(), 1);
        let SelectionNode::Field(f) = &op.selection_set[0] else {
            panic!()
        };
        assert_eq!(f.name.as_str(), "a");
    }

    #[test]
    fn include_false_removes_field() {
        let raw = RawOperation {
            kind: crate::operation::OperationKind::Query,
            name: None,
            variable_definitions: Vec::new(),
            selection_set: vec![field_with_directive("b", "include", literal_bool(false))],
            fragments: IndexMap::new(),
        };
        let op = preprocess(&raw, &IndexMap::new()).unwrap();
        assert!(op.selection_set.is_empty());
    }

    #[test]
    fn skip_false_and_include_true_retain() {
        let raw = RawOperation {
            kind: crate::operation::OperationKind::Query,
            name: None,
            variable_definitions: Vec::new(),
            selection_set: vec![
                field_with_directive("a", "skip", literal_bool(false)),
                field_with_directive("b", "include", literal_bool(true)),
            ],
            fragments: IndexMap::new(),
        };
        let op = preprocess(&raw, &IndexMap::new()).unwrap();
        assert_eq!(op.selection_set.len(), 2);
    }

    #[test]
    fn fragment_spread_is_inlined() {
        let mut fragments = IndexMap::new();
        fragments.insert(
            name!("Frag"),
            FragmentDefinitionNode {
                name: name!("Frag"),
                type_condition: name!("User"),
                directives: Vec::new(),
                selection_set: vec![field("name")],
            },
        );
        let raw = RawOperation {
            kind: crate::operation::OperationKind::Query,
            name: None,
            variable_definitions: Vec::new(),
            selection_set: vec![RawSelectionNode::FragmentSpread {
                name: name!("Frag"),
                directives: Vec::new(),
            }],
            fragments,
        };
        let op = preprocess(&raw, &IndexMap::new()).unwrap();
        assert_eq!(op.selection_set.len(), 1);
        let SelectionNode::InlineFragment(frag) = &op.selection_set[0] else {
            panic!("expected inlined fragment")
        };
        assert_eq!(frag.type_condition.as_deref(), Some("User"));
        assert_eq!(frag.selection_set.len(), 1);
    }

    #[test]
    fn self_referential_fragment_is_a_cycle_error() {
        let mut fragments = IndexMap::new();
        fragments.insert(
            name!("Frag"),
            FragmentDefinitionNode {
                name: name!("Frag"),
                type_condition: name!("User"),
                directives: Vec::new(),
                selection_set: vec![RawSelectionNode::FragmentSpread {
                    name: name!("Frag"),
                    directives: Vec::new(),
                }],
            },
        );
        let raw = RawOperation {
            kind: crate::operation::OperationKind::Query,
            name: None,
            variable_definitions: Vec::new(),
            selection_set: vec![RawSelectionNode::FragmentSpread {
                name: name!("Frag"),
                directives: Vec::new(),
            }],
            fragments,
        };
        let err = preprocess(&raw, &IndexMap::new()).unwrap_err();
        assert!(matches!(err, StitchError::FragmentCycle { .. }));
    }
}

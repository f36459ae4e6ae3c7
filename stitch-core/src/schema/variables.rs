//! Variable coercion.
//!
//! A deliberately small implementation: it checks required-ness, applies defaults, and otherwise
//! passes the raw JSON value through. Full input-type coercion (matching scalars, recursing into
//! input object fields) is out of scope for the core stitching algorithm; this is the reference
//! collaborator the Planner and entry point depend on, in the same spirit as
//! [`crate::preprocess`].

use apollo_compiler::Name;
use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;

use crate::error::StitchError;
use crate::operation::{ArgumentValue, VariableDefinitionNode};

pub const DEFAULT_MAX_ERRORS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct VariableCoercionOptions {
    pub max_errors: usize,
}

impl Default for VariableCoercionOptions {
    fn default() -> Self {
        Self {
            max_errors: DEFAULT_MAX_ERRORS,
        }
    }
}

pub struct CoercionOutcome {
    pub coerced: IndexMap<Name, JsonValue>,
    pub errors: Vec<StitchError>,
}

/// Coerce raw JSON input values against a list of variable definitions.
///
/// Required (non-null) variables missing or explicitly `null` fail. Defaults apply when the name
/// is absent from `inputs`. Stops once `errors.len() >= max_errors`. Unknown/illegal variable
/// *types* are reported but do not abort the loop.
pub fn get_variable_values(
    definitions: &[VariableDefinitionNode],
    inputs: &IndexMap<Name, JsonValue>,
    options: VariableCoercionOptions,
) -> CoercionOutcome {
    let mut coerced = IndexMap::new();
    let mut errors = Vec::new();

    for definition in definitions {
        if errors.len() >= options.max_errors {
            errors.push(StitchError::TooManyVariableErrors {
                max_errors: options.max_errors,
            });
            break;
        }

        match inputs.get(&definition.name) {
            Some(JsonValue::Null) | None if definition.type_name.is_non_null() => {
                let has_default = definition.default_value.is_some();
                if !has_default || matches!(inputs.get(&definition.name), Some(JsonValue::Null)) {
                    errors.push(StitchError::MissingRequiredVariable {
                        name: definition.name.clone(),
                    });
                    continue;
                }
                apply_default(&mut coerced, definition, &mut errors);
            }
            Some(value) => {
                coerced.insert(definition.name.clone(), value.clone());
            }
            None => {
                apply_default(&mut coerced, definition, &mut errors);
            }
        }
    }

    CoercionOutcome { coerced, errors }
}

fn apply_default(
    coerced: &mut IndexMap<Name, JsonValue>,
    definition: &VariableDefinitionNode,
    errors: &mut Vec<StitchError>,
) {
    match &definition.default_value {
        Some(default) => {
            let empty = IndexMap::new();
            coerced.insert(definition.name.clone(), default.resolve(&empty));
        }
        None => {
            if definition.type_name.is_non_null() {
                errors.push(StitchError::MissingRequiredVariable {
                    name: definition.name.clone(),
                });
            } else {
                coerced.insert(definition.name.clone(), JsonValue::Null);
            }
        }
    }
}

/// Marks a variable definition as referencing an unrecognised input type. Reported but does not
/// abort the coercion loop. Exposed for integrators whose schema layer can detect this (this
/// crate's own minimal `TypeRef` has no notion of input object validity, so it never raises this
/// itself).
pub fn unknown_type_error(name: &Name, type_name: impl Into<String>) -> StitchError {
    StitchError::UnknownVariableType {
        name: name.clone(),
        type_name: type_name.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::TypeRef;
    use apollo_compiler::name;

    fn required(name_str: &str) -> VariableDefinitionNode {
        VariableDefinitionNode {
            name: Name::new(name_str).unwrap(),
            type_name: TypeRef::NonNull(Box::new(TypeRef::Named(name!("String")))),
            default_value: None,
        }
    }

    fn optional_with_default(name_str: &str, default: JsonValue) -> VariableDefinitionNode {
        VariableDefinitionNode {
            name: Name::new(name_str).unwrap(),
            type_name: TypeRef::Named(name!("String")),
            default_value: Some(ArgumentValue::Literal(default)),
        }
    }

    #[test]
    fn missing_required_variable_fails() {
        let defs = vec![required("id")];
        let outcome = get_variable_values(&defs, &IndexMap::new(), VariableCoercionOptions::default());
        assert_eq!(outcome.errors.len(), 1);
        assert!(matches!(
            outcome.errors[0],
            StitchError::MissingRequiredVariable { .. }
        ));
    }

    #[test]
    fn default_applies_when_absent() {
        let defs = vec![optional_with_default("limit", JsonValue::from(10))];
        let outcome = get_variable_values(&defs, &IndexMap::new(), VariableCoercionOptions::default());
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.coerced.get("limit").unwrap(), &JsonValue::from(10));
    }

    #[test]
    fn provided_value_overrides_default() {
        let defs = vec![optional_with_default("limit", JsonValue::from(10))];
        let mut inputs = IndexMap::new();
        inputs.insert(name!("limit"), JsonValue::from(5));
        let outcome = get_variable_values(&defs, &inputs, VariableCoercionOptions::default());
        assert_eq!(outcome.coerced.get("limit").unwrap(), &JsonValue::from(5));
    }

    #[test]
    fn max_errors_aborts_loop() {
        let defs: Vec<_> = (0..5).map(|i| required(&format!("v{i}"))).collect();
        let outcome = get_variable_values(
            &defs,
            &IndexMap::new(),
            VariableCoercionOptions { max_errors: 2 },
        );
        assert_eq!(outcome.errors.len(), 3);
        assert!(matches!(
            outcome.errors.last().unwrap(),
            StitchError::TooManyVariableErrors { max_errors: 2 }
        ));
    }

    /// Table test over the required/default/provided matrix: every combination of nullability, a
    /// default, and whether the input map supplies a value or an explicit null.
    #[rstest::rstest]
    #[case::required_missing(true, false, None, false)]
    #[case::required_explicit_null(true, false, Some(JsonValue::Null), false)]
    #[case::required_provided(true, false, Some(JsonValue::from(1)), true)]
    #[case::required_with_default_missing(true, true, None, true)]
    #[case::required_with_default_explicit_null(true, true, Some(JsonValue::Null), false)]
    #[case::optional_missing(false, false, None, true)]
    #[case::optional_explicit_null(false, false, Some(JsonValue::Null), true)]
    #[case::optional_with_default_missing(false, true, None, true)]
    #[case::optional_with_default_provided(false, true, Some(JsonValue::from(2)), true)]
    fn coercion_matrix(
        #[case] non_null: bool,
        #[case] has_default: bool,
        #[case] input: Option<JsonValue>,
        #[case] expect_ok: bool,
    ) {
        let base = TypeRef::Named(name!("Int"));
        let definition = VariableDefinitionNode {
            name: name!("v"),
            type_name: if non_null { TypeRef::NonNull(Box::new(base)) } else { base },
            default_value: has_default.then(|| ArgumentValue::Literal(JsonValue::from(99))),
        };
        let mut inputs = IndexMap::new();
        if let Some(value) = &input {
            inputs.insert(name!("v"), value.clone());
        }
        let outcome = get_variable_values(&[definition], &inputs, VariableCoercionOptions::default());
        assert_eq!(outcome.errors.is_empty(), expect_ok, "errors: {:?}", outcome.errors);
        if expect_ok {
            assert!(outcome.coerced.contains_key("v"));
        }
    }
}

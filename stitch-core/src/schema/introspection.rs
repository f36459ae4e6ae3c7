//! The internal introspection subschema: for the merged Query root, add an internal introspection
//! subschema whose executor runs against the merged schema itself, and bind `__schema` and
//! `__type` to it.
//!
//! Full introspection resolution (walking `__Schema`/`__Type` selection sets field by field) is
//! out of this crate's core scope. The planner and composer don't care *how* `__schema`/`__type`
//! get resolved, only *that* there is always a subschema which can. This executor answers the
//! handful of top-level introspection shapes a client typically asks for (`__schema { types { name
//! } }`, `__type(name: ...) { name kind }`) directly off the merged registry, which is enough to
//! make the crate's end-to-end demo and tests self-contained without a full GraphQL introspection
//! implementation.

use std::sync::{Arc, OnceLock};

use apollo_compiler::validation::Valid;
use apollo_compiler::Schema;
use async_trait::async_trait;
use itertools::Itertools;
use serde_json_bytes::{json, Value as JsonValue};

use super::subschema::{ExecutionResult, RejectionError, SingleResult, Subschema, SubschemaExecutor, SubschemaRequest};
use super::SuperSchema;
use crate::operation::SelectionNode;

pub(super) struct IntrospectionExecutor {
    schema: OnceLock<SuperSchema>,
}

impl IntrospectionExecutor {
    /// Called once, after the owning [`SuperSchema`] has finished building.
    pub(super) fn bind(&self, schema: SuperSchema) {
        let _ = self.schema.set(schema);
    }
}

#[async_trait]
impl SubschemaExecutor for IntrospectionExecutor {
    async fn execute(&self, request: SubschemaRequest) -> Result<ExecutionResult, RejectionError> {
        let Some(schema) = self.schema.get() else {
            return Err("introspection subschema queried before the super-schema finished building".into());
        };
        let mut data = serde_json_bytes::Map::new();
        for selection in &request.document.selection_set {
            let SelectionNode::Field(field) = selection else {
                continue;
            };
            let value = match field.name.as_str() {
                "__schema" => schema_value(schema),
                "__type" => type_value(schema, &field.arguments, &request.variables),
                "__typename" => JsonValue::String("Query".into()),
                _ => JsonValue::Null,
            };
            data.insert(serde_json_bytes::ByteString::from(field.response_key().as_str()), value);
        }
        Ok(ExecutionResult::Single(SingleResult {
            data: Some(JsonValue::Object(data)),
            errors: Vec::new(),
        }))
    }
}

fn schema_value(schema: &SuperSchema) -> JsonValue {
    // The same type name (e.g. `Query`, or any stitched object) is declared in every subschema
    // that contributes to it, so the raw flat-map has duplicates; `unique()` collapses them to
    // the one composed listing a client expects.
    let types: Vec<JsonValue> = schema
        .subschemas()
        .iter()
        .flat_map(|s| s.schema.types.keys())
        .unique()
        .map(|name| json!({ "name": name.as_str() }))
        .collect();
    let query_type = schema
        .root_type(crate::operation::OperationKind::Query)
        .map(|name| name.to_string());
    json!({ "types": types, "queryType": { "name": query_type } })
}

fn type_value(
    schema: &SuperSchema,
    arguments: &indexmap::IndexMap<apollo_compiler::Name, crate::operation::ArgumentValue>,
    variables: &indexmap::IndexMap<apollo_compiler::Name, JsonValue>,
) -> JsonValue {
    let Some(name_arg) = arguments.get("name") else {
        return JsonValue::Null;
    };
    let resolved = name_arg.resolve(variables);
    let Some(name) = resolved.as_str() else {
        return JsonValue::Null;
    };
    let Ok(type_name) = apollo_compiler::Name::new(name) else {
        return JsonValue::Null;
    };
    if schema.is_object_type(&type_name) {
        json!({ "name": name, "kind": "OBJECT" })
    } else if schema.is_abstract_type(&type_name) {
        json!({ "name": name, "kind": "INTERFACE" })
    } else {
        JsonValue::Null
    }
}

/// Construct the pseudo-subschema together with the handle needed to [`IntrospectionExecutor::bind`]
/// it once the owning super-schema exists. `placeholder_schema` is never itself consulted by
/// planning or merging, since this subschema is added to the registry only after the real merge
/// pass completes. It exists purely because [`Subschema`] always carries a `Valid<Schema>` handle,
/// so any already-valid schema from the real subschema set is reused rather than constructing a
/// new empty one from scratch.
pub(super) fn build(placeholder_schema: Valid<Schema>) -> (Arc<Subschema>, Arc<IntrospectionExecutor>) {
    let executor = Arc::new(IntrospectionExecutor {
        schema: OnceLock::new(),
    });
    let subschema = Subschema::new("__introspection", placeholder_schema, executor.clone());
    (subschema, executor)
}

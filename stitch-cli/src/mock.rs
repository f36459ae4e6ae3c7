//! A static-fixture mock executor, so the demo CLI can exercise the whole planner/composer
//! pipeline without a real network of subgraphs. Grounded in `apollo_router`'s own `MockSubgraph`
//! test doubles (`apollo_router::plugin::test::MockSubgraph`): a fixed JSON payload stands in for
//! a subschema's response, and the "resolution" step is simply projecting the requested selection
//! shape out of that fixture.

use async_trait::async_trait;
use serde_json_bytes::Value as JsonValue;
use stitch_core::error::GraphQLError;
use stitch_core::execute::ComposedResult;
use stitch_core::operation::SelectionNode;
use stitch_core::schema::{ExecutionResult, RejectionError, SingleResult, SubschemaExecutor, SubschemaRequest};

/// Executes every request against one fixed JSON document: each requested field is looked up by
/// name directly in the fixture, recursing into nested selections and arrays. Arguments are
/// ignored; this is a shape-echoing double, not a real resolver.
pub struct FixtureExecutor {
    pub fixture: JsonValue,
}

#[async_trait]
impl SubschemaExecutor for FixtureExecutor {
    async fn execute(&self, request: SubschemaRequest) -> Result<ExecutionResult, RejectionError> {
        let data = project_selection_set(&request.document.selection_set, &self.fixture);
        Ok(ExecutionResult::Single(SingleResult {
            data: Some(data),
            errors: Vec::new(),
        }))
    }
}

fn project_selection_set(selections: &[SelectionNode], data: &JsonValue) -> JsonValue {
    let mut out = serde_json_bytes::Map::new();
    project_into(selections, data, &mut out);
    JsonValue::Object(out)
}

fn project_into(
    selections: &[SelectionNode],
    data: &JsonValue,
    out: &mut serde_json_bytes::Map<serde_json_bytes::ByteString, JsonValue>,
) {
    for selection in selections {
        match selection {
            SelectionNode::Field(field) => {
                let raw = data
                    .as_object()
                    .and_then(|object| object.get(field.name.as_str()))
                    .cloned()
                    .unwrap_or(JsonValue::Null);
                let projected = match &field.selection_set {
                    Some(nested) => project_nested(nested, &raw),
                    None => raw,
                };
                out.insert(field.response_key().as_str().into(), projected);
            }
            SelectionNode::InlineFragment(fragment) => {
                project_into(&fragment.selection_set, data, out);
            }
        }
    }
}

fn project_nested(selections: &[SelectionNode], value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| project_selection_set(selections, item)).collect())
        }
        JsonValue::Null => JsonValue::Null,
        object => project_selection_set(selections, object),
    }
}

/// Render a composed result as the top-level `{ data, errors }` shape for printing.
pub fn composed_to_json(result: &ComposedResult) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert(
        "data".to_owned(),
        result
            .data
            .as_ref()
            .map(json_bytes_to_serde_json)
            .unwrap_or(serde_json::Value::Null),
    );
    if !result.errors.is_empty() {
        map.insert(
            "errors".to_owned(),
            serde_json::Value::Array(result.errors.iter().map(error_to_json).collect()),
        );
    }
    if result.has_next {
        map.insert("hasNext".to_owned(), serde_json::Value::Bool(true));
    }
    serde_json::Value::Object(map)
}

fn error_to_json(error: &GraphQLError) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("message".to_owned(), serde_json::Value::String(error.message.clone()));
    serde_json::Value::Object(map)
}

fn json_bytes_to_serde_json(value: &JsonValue) -> serde_json::Value {
    match value {
        JsonValue::Null => serde_json::Value::Null,
        JsonValue::Bool(b) => serde_json::Value::Bool(*b),
        JsonValue::Number(n) => serde_json::Value::Number(n.clone()),
        JsonValue::String(s) => serde_json::Value::String(s.as_str().to_owned()),
        JsonValue::Array(items) => serde_json::Value::Array(items.iter().map(json_bytes_to_serde_json).collect()),
        JsonValue::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.as_str().to_owned(), json_bytes_to_serde_json(v)))
                .collect(),
        ),
    }
}

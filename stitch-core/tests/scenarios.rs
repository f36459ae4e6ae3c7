//! End-to-end scenarios against the public entry point (`stitch_core::entry::execute`): a plain
//! passthrough, a cross-subschema merge, abstract-type stitching, a subschema that nulls out, an
//! incremental-delivery stream, a subscription with no configured subscriber, and an ambiguous
//! multi-operation document.

use std::sync::Arc;

use apollo_compiler::{name, Name};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json_bytes::{json, Value as JsonValue};

use stitch_core::config::{ComposerConfig, PlannerConfig};
use stitch_core::entry::{execute, ExecuteOutcome, RawDocument, Response};
use stitch_core::operation::{ArgumentValue, OperationKind, RawOperation, RawSelectionNode};
use stitch_core::plan::planner::PlannerMemo;
use stitch_core::schema::{
    ExecutionResult, RejectionError, SingleResult, Subschema, SubschemaExecutor, SubschemaRequest,
};
use stitch_core::SuperSchema;

/// Always answers with a fixed JSON object, regardless of what was requested. Good enough for
/// scenarios where each subschema only ever sees requests for fields it's known to own.
struct FixedExecutor {
    data: JsonValue,
}

#[async_trait]
impl SubschemaExecutor for FixedExecutor {
    async fn execute(&self, _request: SubschemaRequest) -> Result<ExecutionResult, RejectionError> {
        Ok(ExecutionResult::Single(SingleResult {
            data: Some(self.data.clone()),
            errors: Vec::new(),
        }))
    }
}

/// Always reports a null-out at the given response key.
struct NullingExecutor {
    key: &'static str,
}

#[async_trait]
impl SubschemaExecutor for NullingExecutor {
    async fn execute(&self, _request: SubschemaRequest) -> Result<ExecutionResult, RejectionError> {
        let mut map = serde_json_bytes::Map::new();
        map.insert(self.key.into(), JsonValue::Null);
        Ok(ExecutionResult::Single(SingleResult {
            data: Some(JsonValue::Object(map)),
            errors: Vec::new(),
        }))
    }
}

/// Answers with an initial payload plus one deferred payload delivered through its own stream,
/// exercising the composer's incremental-results path end to end.
struct IncrementalExecutor;

#[async_trait]
impl SubschemaExecutor for IncrementalExecutor {
    async fn execute(&self, _request: SubschemaRequest) -> Result<ExecutionResult, RejectionError> {
        let mut initial_data = serde_json_bytes::Map::new();
        initial_data.insert("a".into(), JsonValue::String("A".into()));
        let payload = stitch_core::schema::IncrementalPayload {
            incremental: vec![stitch_core::schema::IncrementalItem {
                path: vec![stitch_core::error::PathElement::Key("b".to_owned())],
                data: Some(JsonValue::String("B".into())),
                errors: Vec::new(),
            }],
            has_next: false,
        };
        Ok(ExecutionResult::Incremental {
            initial: SingleResult {
                data: Some(JsonValue::Object(initial_data)),
                errors: Vec::new(),
            },
            subsequent: Box::pin(futures::stream::once(async move { payload })),
        })
    }
}

struct NoSubscriptionExecutor;

#[async_trait]
impl SubschemaExecutor for NoSubscriptionExecutor {
    async fn execute(&self, _request: SubschemaRequest) -> Result<ExecutionResult, RejectionError> {
        Ok(ExecutionResult::Single(SingleResult::default()))
    }
}

fn build_subschema(name: &str, sdl: &str, executor: impl SubschemaExecutor + 'static) -> Arc<Subschema> {
    let schema = apollo_compiler::Schema::parse_and_validate(sdl, format!("{name}.graphql")).unwrap();
    Subschema::new(name, schema, Arc::new(executor))
}

fn leaf_selection(field: &str) -> RawSelectionNode {
    RawSelectionNode::Field {
        alias: None,
        name: Name::new(field).unwrap(),
        arguments: IndexMap::new(),
        directives: Vec::new(),
        selection_set: None,
    }
}

fn nested_selection(field: &str, children: Vec<RawSelectionNode>) -> RawSelectionNode {
    RawSelectionNode::Field {
        alias: None,
        name: Name::new(field).unwrap(),
        arguments: IndexMap::new(),
        directives: Vec::new(),
        selection_set: Some(children),
    }
}

fn query(selection_set: Vec<RawSelectionNode>) -> RawDocument {
    RawDocument {
        operations: vec![RawOperation {
            kind: OperationKind::Query,
            name: None,
            variable_definitions: Vec::new(),
            selection_set,
            fragments: IndexMap::new(),
        }],
    }
}

async fn run(schema: &SuperSchema, document: &RawDocument) -> Response {
    match execute(
        schema,
        document,
        None,
        IndexMap::new(),
        &PlannerConfig::default(),
        &ComposerConfig::default(),
        &PlannerMemo::new(),
    )
    .await
    {
        ExecuteOutcome::Complete(response) => response,
        ExecuteOutcome::Incremental { initial, .. } => initial,
        ExecuteOutcome::Subscription(_) => panic!("expected a non-subscription outcome"),
    }
}

#[tokio::test]
async fn single_subschema_passthrough() {
    let schema = SuperSchema::build(vec![build_subschema(
        "s0",
        "type Query { hello: String }",
        FixedExecutor {
            data: json!({ "hello": "world" }),
        },
    )])
    .unwrap();

    let document = query(vec![leaf_selection("hello")]);
    let response = run(&schema, &document).await;

    assert!(response.errors.is_empty());
    assert_eq!(response.data, Some(json!({ "hello": "world" })));
}

#[tokio::test]
async fn cross_subschema_merge() {
    let schema = SuperSchema::build(vec![
        build_subschema(
            "s0",
            "type Query { a: String }",
            FixedExecutor {
                data: json!({ "a": "A" }),
            },
        ),
        build_subschema(
            "s1",
            "type Query { b: String }",
            FixedExecutor {
                data: json!({ "b": "B" }),
            },
        ),
    ])
    .unwrap();

    let document = query(vec![leaf_selection("a"), leaf_selection("b")]);
    let response = run(&schema, &document).await;

    assert!(response.errors.is_empty());
    assert_eq!(response.data, Some(json!({ "a": "A", "b": "B" })));
}

#[tokio::test]
async fn abstract_stitching_resolves_concrete_type_and_strips_marker() {
    // s0 owns `Query.user` and `User.id`; s1 contributes `User.profile`. Querying both forces a
    // selection split, a `__stitching__typename` marker, and a follow-up fetch to s1 keyed on the
    // concrete type reported by s0.
    let schema = SuperSchema::build(vec![
        build_subschema(
            "s0",
            "type Query { user: User } type User { id: String }",
            FixedExecutor {
                data: json!({
                    "user": { "id": "1", "__stitching__typename": "User" },
                }),
            },
        ),
        build_subschema(
            "s1",
            "type Query { _unused: String } type User { profile: String }",
            FixedExecutor {
                data: json!({ "profile": "bio" }),
            },
        ),
    ])
    .unwrap();

    let document = query(vec![nested_selection(
        "user",
        vec![leaf_selection("id"), leaf_selection("profile")],
    )]);
    let response = run(&schema, &document).await;

    assert!(response.errors.is_empty());
    assert_eq!(
        response.data,
        Some(json!({ "user": { "id": "1", "profile": "bio" } }))
    );
}

#[tokio::test]
async fn subschema_returning_null_nulls_out_the_field() {
    let schema = SuperSchema::build(vec![build_subschema(
        "s0",
        "type Query { maybe: String }",
        NullingExecutor { key: "maybe" },
    )])
    .unwrap();

    let document = query(vec![leaf_selection("maybe")]);
    let response = run(&schema, &document).await;

    assert!(response.errors.is_empty());
    assert_eq!(response.data, Some(json!({ "maybe": null })));
}

#[tokio::test]
async fn incremental_subschema_result_is_consolidated_into_one_subsequent_stream() {
    use futures::StreamExt;

    let schema = SuperSchema::build(vec![build_subschema(
        "s0",
        "type Query { a: String, b: String }",
        IncrementalExecutor,
    )])
    .unwrap();

    let document = query(vec![leaf_selection("a"), leaf_selection("b")]);
    let outcome = execute(
        &schema,
        &document,
        None,
        IndexMap::new(),
        &PlannerConfig::default(),
        &ComposerConfig::default(),
        &PlannerMemo::new(),
    )
    .await;

    match outcome {
        ExecuteOutcome::Incremental { initial, mut subsequent } => {
            assert!(initial.has_next);
            assert_eq!(initial.data, Some(json!({ "a": "A" })));

            let delta = subsequent.next().await.expect("one deferred payload");
            assert_eq!(delta.incremental.len(), 1);
            assert_eq!(delta.incremental[0].data, Some(JsonValue::String("B".into())));
            assert!(subsequent.next().await.is_none(), "stream exhausted after its one source drains");
        }
        _ => panic!("expected an incremental outcome"),
    }
}

#[tokio::test]
async fn subscription_without_a_subscriber_is_rejected() {
    let schema = SuperSchema::build(vec![build_subschema(
        "s0",
        "type Query { hello: String } type Subscription { hello: String }",
        NoSubscriptionExecutor,
    )])
    .unwrap();

    let document = RawDocument {
        operations: vec![RawOperation {
            kind: OperationKind::Subscription,
            name: None,
            variable_definitions: Vec::new(),
            selection_set: vec![leaf_selection("hello")],
            fragments: IndexMap::new(),
        }],
    };

    let outcome = execute(
        &schema,
        &document,
        None,
        IndexMap::new(),
        &PlannerConfig::default(),
        &ComposerConfig::default(),
        &PlannerMemo::new(),
    )
    .await;

    match outcome {
        ExecuteOutcome::Complete(response) => {
            assert_eq!(response.data, None);
            assert_eq!(response.errors.len(), 1);
            assert!(response.errors[0].message.contains("subscription"));
        }
        _ => panic!("expected a rejected subscription to surface as a Complete error response"),
    }
}

#[tokio::test]
async fn multi_operation_document_without_a_name_is_ambiguous() {
    let schema = SuperSchema::build(vec![build_subschema(
        "s0",
        "type Query { hello: String }",
        FixedExecutor {
            data: json!({ "hello": "world" }),
        },
    )])
    .unwrap();

    let document = RawDocument {
        operations: vec![
            RawOperation {
                kind: OperationKind::Query,
                name: Some(name!("First")),
                variable_definitions: Vec::new(),
                selection_set: vec![leaf_selection("hello")],
                fragments: IndexMap::new(),
            },
            RawOperation {
                kind: OperationKind::Query,
                name: Some(name!("Second")),
                variable_definitions: Vec::new(),
                selection_set: vec![leaf_selection("hello")],
                fragments: IndexMap::new(),
            },
        ],
    };

    let response = run(&schema, &document).await;

    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("multiple operations"));
}

#[tokio::test]
async fn required_variable_missing_fails_before_planning() {
    let schema = SuperSchema::build(vec![build_subschema(
        "s0",
        "type Query { greet(name: String!): String }",
        FixedExecutor {
            data: json!({ "greet": "hi" }),
        },
    )])
    .unwrap();

    let document = RawDocument {
        operations: vec![RawOperation {
            kind: OperationKind::Query,
            name: None,
            variable_definitions: vec![stitch_core::operation::VariableDefinitionNode {
                name: name!("name"),
                type_name: stitch_core::operation::TypeRef::NonNull(Box::new(
                    stitch_core::operation::TypeRef::Named(name!("String")),
                )),
                default_value: None,
            }],
            selection_set: vec![RawSelectionNode::Field {
                alias: None,
                name: name!("greet"),
                arguments: IndexMap::from([(name!("name"), ArgumentValue::Variable(name!("name")))]),
                directives: Vec::new(),
                selection_set: None,
            }],
            fragments: IndexMap::new(),
        }],
    };

    let response = run(&schema, &document).await;

    assert_eq!(response.data, None);
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("name"));
}

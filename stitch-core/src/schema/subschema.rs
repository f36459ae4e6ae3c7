//! The `Subschema` contract: a single backend, its schema, and the executor that runs operations
//! against it.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use apollo_compiler::validation::Valid;
use apollo_compiler::Name;
use async_trait::async_trait;
use futures::Stream;
use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;

use crate::error::GraphQLError;
use crate::operation::{FragmentDefinitionNode, OperationKind, SelectionNode, VariableDefinitionNode};

/// The outgoing, single-operation document the composer sends to a subschema: the original
/// operation header verbatim, a selection set equal to the relevant plan's field nodes, and every
/// fragment definition from the original document appended, even though, post-preprocessing, none
/// of them are referenced by spreads any more. A subschema's own executor is free to ignore them.
#[derive(Debug, Clone)]
pub struct OutgoingDocument {
    pub kind: OperationKind,
    pub name: Option<Name>,
    pub variable_definitions: Arc<Vec<VariableDefinitionNode>>,
    pub selection_set: Vec<SelectionNode>,
    pub fragments: Arc<IndexMap<Name, FragmentDefinitionNode>>,
}

#[derive(Debug, Clone)]
pub struct SubschemaRequest {
    pub document: OutgoingDocument,
    pub variables: IndexMap<Name, JsonValue>,
}

/// A non-incremental result: `{ data, errors? }`.
#[derive(Debug, Clone, Default)]
pub struct SingleResult {
    pub data: Option<JsonValue>,
    pub errors: Vec<GraphQLError>,
}

/// One delta in an incremental-delivery stream.
#[derive(Debug, Clone)]
pub struct IncrementalPayload {
    pub incremental: Vec<IncrementalItem>,
    pub has_next: bool,
}

#[derive(Debug, Clone)]
pub struct IncrementalItem {
    pub path: Vec<crate::error::PathElement>,
    pub data: Option<JsonValue>,
    pub errors: Vec<GraphQLError>,
}

pub type IncrementalStream = Pin<Box<dyn Stream<Item = IncrementalPayload> + Send>>;

/// What `executor`/`subscriber` actually hand back: either a plain result, or an initial result
/// plus a lazy sequence of deltas.
pub enum ExecutionResult {
    Single(SingleResult),
    Incremental {
        initial: SingleResult,
        subsequent: IncrementalStream,
    },
}

impl fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Single(r) => f.debug_tuple("Single").field(r).finish(),
            ExecutionResult::Incremental { initial, .. } => f
                .debug_struct("Incremental")
                .field("initial", initial)
                .field("subsequent", &"<stream>")
                .finish(),
        }
    }
}

pub type RejectionError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Required: executes a single operation document against one subschema.
#[async_trait]
pub trait SubschemaExecutor: Send + Sync {
    async fn execute(&self, request: SubschemaRequest) -> Result<ExecutionResult, RejectionError>;
}

/// Optional: the same shape, but for subscription operations, returning a lazy sequence of
/// complete results (one per subscription event) rather than a single result.
#[async_trait]
pub trait SubschemaSubscriber: Send + Sync {
    async fn subscribe(
        &self,
        request: SubschemaRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = SingleResult> + Send>>, RejectionError>;
}

static NEXT_SUBSCHEMA_ID: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubschemaId(usize);

impl SubschemaId {
    fn next() -> Self {
        Self(NEXT_SUBSCHEMA_ID.fetch_add(1, Ordering::AcqRel))
    }
}

/// A single backend with its own schema and executor.
pub struct Subschema {
    id: SubschemaId,
    pub name: String,
    pub schema: Valid<apollo_compiler::Schema>,
    pub executor: Arc<dyn SubschemaExecutor>,
    pub subscriber: Option<Arc<dyn SubschemaSubscriber>>,
}

impl fmt::Debug for Subschema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subschema")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("has_subscriber", &self.subscriber.is_some())
            .finish()
    }
}

impl Subschema {
    pub fn new(
        name: impl Into<String>,
        schema: Valid<apollo_compiler::Schema>,
        executor: Arc<dyn SubschemaExecutor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: SubschemaId::next(),
            name: name.into(),
            schema,
            executor,
            subscriber: None,
        })
    }

    pub fn with_subscriber(mut self: Arc<Self>, subscriber: Arc<dyn SubschemaSubscriber>) -> Arc<Self> {
        Arc::get_mut(&mut self)
            .expect("with_subscriber must be called before the Arc is shared")
            .subscriber = Some(subscriber);
        self
    }
}

/// A pointer-identity handle to a [`Subschema`], used as the element type of the per-field
/// subschema sets. Two handles are equal iff they point at the same subschema instance, mirroring
/// the merged-schema tooling's use of `Arc::ptr_eq`/`Arc::as_ptr` for identity-keyed comparisons
/// (see `ValidFederationSchema`'s `Eq`/`Hash` impls).
#[derive(Debug, Clone)]
pub struct SubschemaRef(pub Arc<Subschema>);

impl PartialEq for SubschemaRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for SubschemaRef {}

impl Hash for SubschemaRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl From<Arc<Subschema>> for SubschemaRef {
    fn from(value: Arc<Subschema>) -> Self {
        SubschemaRef(value)
    }
}

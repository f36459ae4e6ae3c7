//! A federated query planner and result stitcher for schema-stitched GraphQL subschemas.
//!
//! Given a set of [`Subschema`]s, each backed by an independent executor, and a client operation
//! written against their merged [`SuperSchema`], this crate decides which portion of the operation
//! each subschema should answer ([`plan`]), dispatches those requests concurrently, and merges the
//! partial responses into a single response that looks as if it were produced by one unified
//! schema ([`execute`]).
//!
//! The two hard algorithms are the [`plan::planner`] (a pure function from an operation to a
//! [`plan::FieldPlan`]) and the [`execute::Composer`] (the stateful driver that dispatches,
//! merges, and recursively expands that plan as subschema results arrive). Everything else,
//! including schema merging, variable coercion, `@skip`/`@include` and fragment handling, the
//! entry point, and incremental-result stream consolidation, is ambient machinery this crate also
//! implements so it can be exercised end to end, but is not itself the subject of the design.

pub mod config;
pub mod entry;
pub mod error;
pub mod execute;
pub mod operation;
pub mod plan;
pub mod preprocess;
pub mod schema;

pub use config::{ComposerConfig, PlannerConfig};
pub use entry::{execute as execute_request, ExecuteOutcome, RawDocument, Response};
pub use error::{GraphQLError, PathElement, StitchError};
pub use execute::{ComposeOutcome, ComposedResult, Composer, DocumentContext};
pub use plan::planner::PlannerMemo;
pub use plan::{FieldPlan, StitchPlan, SubschemaPlan};
pub use schema::{Subschema, SubschemaExecutor, SubschemaSubscriber, SuperSchema};

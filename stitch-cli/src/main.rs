//! `stitchctl`: a thin demo binary for `stitch-core`, grounded in
//! `apollo-federation/cli/src/main.rs`. Loads schema/fixture files from disk, builds an in-memory
//! mock executor per subschema, plans and composes a query, and prints the result. Not part of
//! the library's public contract.

mod convert;
mod mock;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use apollo_compiler::{ExecutableDocument, Schema};
use clap::Parser;
use indexmap::IndexMap;
use mock::FixtureExecutor;
use stitch_core::config::{ComposerConfig, PlannerConfig};
use stitch_core::entry::{execute, ExecuteOutcome};
use stitch_core::plan::planner::PlannerMemo;
use stitch_core::schema::Subschema;
use stitch_core::SuperSchema;

/// One subschema for the demo: its SDL file, a JSON fixture file the mock executor serves
/// unconditionally, and a display name.
#[derive(Clone)]
struct SubschemaSpec {
    name: String,
    schema_path: PathBuf,
    fixture_path: PathBuf,
}

impl std::str::FromStr for SubschemaSpec {
    type Err = anyhow::Error;

    /// `name=schema.graphql:fixture.json`
    fn from_str(s: &str) -> Result<Self> {
        let (name, rest) = s
            .split_once('=')
            .context("subschema spec must be NAME=SCHEMA.graphql:FIXTURE.json")?;
        let (schema_path, fixture_path) = rest
            .split_once(':')
            .context("subschema spec must be NAME=SCHEMA.graphql:FIXTURE.json")?;
        Ok(Self {
            name: name.to_owned(),
            schema_path: PathBuf::from(schema_path),
            fixture_path: PathBuf::from(fixture_path),
        })
    }
}

/// Plan and/or run a query against a set of mocked subschemas.
#[derive(Parser)]
struct Args {
    /// A subschema to register, as `NAME=SCHEMA.graphql:FIXTURE.json`. Repeat for each subschema.
    #[arg(long = "subschema", required = true)]
    subschemas: Vec<SubschemaSpec>,

    /// A merged schema (superset SDL) used only to parse and validate the incoming query. See
    /// DESIGN.md "Demo CLI query parsing" for why this is separate from the per-subschema SDLs
    /// used for planning.
    #[arg(long)]
    supergraph: PathBuf,

    /// The query document to plan/execute.
    query: PathBuf,

    /// Raw variable values as a JSON object.
    #[arg(long)]
    variables: Option<PathBuf>,

    /// Select an operation by name when the document has more than one.
    #[arg(long)]
    operation_name: Option<String>,

    /// Print the computed FieldPlan instead of executing it.
    #[arg(long)]
    plan_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut subschemas = Vec::new();
    for spec in &args.subschemas {
        let sdl = fs::read_to_string(&spec.schema_path)
            .with_context(|| format!("reading {}", spec.schema_path.display()))?;
        let schema = Schema::parse_and_validate(sdl, spec.schema_path.display().to_string())
            .map_err(|err| anyhow::anyhow!("{} is not a valid schema: {err}", spec.schema_path.display()))?;
        let fixture_text = fs::read_to_string(&spec.fixture_path)
            .with_context(|| format!("reading {}", spec.fixture_path.display()))?;
        let fixture: serde_json::Value = serde_json::from_str(&fixture_text)
            .with_context(|| format!("{} is not valid JSON", spec.fixture_path.display()))?;
        let executor = Arc::new(FixtureExecutor {
            fixture: serde_json_to_bytes(&fixture),
        });
        subschemas.push(Subschema::new(spec.name.clone(), schema, executor));
    }

    let super_schema = SuperSchema::build(subschemas).context("building super-schema")?;

    let supergraph_sdl = fs::read_to_string(&args.supergraph)
        .with_context(|| format!("reading {}", args.supergraph.display()))?;
    let supergraph_schema = Schema::parse_and_validate(supergraph_sdl, args.supergraph.display().to_string())
        .map_err(|err| anyhow::anyhow!("{} is not a valid schema: {err}", args.supergraph.display()))?;

    let query_text = fs::read_to_string(&args.query).with_context(|| format!("reading {}", args.query.display()))?;
    let document = ExecutableDocument::parse_and_validate(&supergraph_schema, query_text, args.query.display().to_string())
        .map_err(|err| anyhow::anyhow!("query failed validation against {}: {err}", args.supergraph.display()))?;

    let raw_document = convert::convert_document(&document)?;

    let raw_variables = match &args.variables {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let value: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))?;
            let object = value.as_object().context("--variables must be a JSON object")?;
            object
                .iter()
                .map(|(k, v)| Ok((apollo_compiler::Name::new(k)?, serde_json_to_bytes(v))))
                .collect::<Result<IndexMap<_, _>>>()?
        }
        None => IndexMap::new(),
    };

    if args.plan_only {
        let planner_config = PlannerConfig::default();
        let memo = PlannerMemo::new();
        let operation = raw_document
            .operations
            .first()
            .context("document has no operations")?;
        let coercion = stitch_core::schema::variables::get_variable_values(
            &operation.variable_definitions,
            &raw_variables,
            Default::default(),
        );
        let preprocessed = stitch_core::preprocess::preprocess(operation, &coercion.coerced)?;
        let plan = stitch_core::plan::planner::plan_operation(&super_schema, &preprocessed, &planner_config, &memo)
            .map_err(|err| anyhow::anyhow!("{err}"))?;
        println!("{plan:#?}");
        return Ok(());
    }

    let outcome = execute(
        &super_schema,
        &raw_document,
        args.operation_name.as_deref(),
        raw_variables,
        &PlannerConfig::default(),
        &ComposerConfig::default(),
        &PlannerMemo::new(),
    )
    .await;

    match outcome {
        ExecuteOutcome::Complete(response) => {
            let json = mock::composed_to_json(&stitch_core::execute::ComposedResult {
                data: response.data,
                errors: response.errors,
                has_next: response.has_next,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        ExecuteOutcome::Incremental { initial, .. } => {
            let json = mock::composed_to_json(&stitch_core::execute::ComposedResult {
                data: initial.data,
                errors: initial.errors,
                has_next: initial.has_next,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
            println!("(subsequent incremental payloads not printed by this demo binary)");
        }
        ExecuteOutcome::Subscription(_) => {
            println!("(subscription streams are not drained by this demo binary)");
        }
    }

    Ok(())
}

fn serde_json_to_bytes(value: &serde_json::Value) -> serde_json_bytes::Value {
    match value {
        serde_json::Value::Null => serde_json_bytes::Value::Null,
        serde_json::Value::Bool(b) => serde_json_bytes::Value::Bool(*b),
        serde_json::Value::Number(n) => serde_json_bytes::Value::Number(n.clone()),
        serde_json::Value::String(s) => serde_json_bytes::Value::String(s.as_str().into()),
        serde_json::Value::Array(items) => {
            serde_json_bytes::Value::Array(items.iter().map(serde_json_to_bytes).collect())
        }
        serde_json::Value::Object(map) => serde_json_bytes::Value::Object(
            map.iter()
                .map(|(k, v)| (k.as_str().into(), serde_json_to_bytes(v)))
                .collect(),
        ),
    }
}

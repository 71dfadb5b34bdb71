use chrono::{DateTime, Utc};
use mongodb::bson::Document;
use serde::Serialize;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::metrics::time_db_operation;
use crate::provision::DATABASE;
use crate::session::{AdminClient, AdminSession, ErrorOrigin, SessionError};
use crate::steps::{all_steps, StepKind};
use crate::telemetry::create_run_span;

/// Where a run is. Failure is terminal and leaves earlier effects in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BootstrapState {
    SelectDatabase,
    CreateUser,
    CreateCollection,
    CreateIndexes,
    Done,
    Failed { at: StepKind },
}

impl From<StepKind> for BootstrapState {
    fn from(kind: StepKind) -> Self {
        match kind {
            StepKind::CreateUser => BootstrapState::CreateUser,
            StepKind::CreateCollection => BootstrapState::CreateCollection,
            StepKind::CreateIndexes => BootstrapState::CreateIndexes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: StepKind,
    pub created: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootstrapReport {
    pub run_id: String,
    pub database: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    /// Every state the run went through, `Done` last.
    pub states: Vec<BootstrapState>,
}

impl BootstrapReport {
    pub fn created_indexes(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|report| report.step == StepKind::CreateIndexes)
            .flat_map(|report| report.created.iter().cloned())
            .collect()
    }
}

#[derive(thiserror::Error, Debug)]
#[error("bootstrap failed at step {step} ({origin} error)")]
pub struct BootstrapError {
    pub run_id: String,
    pub step: StepKind,
    pub origin: ErrorOrigin,
    /// Steps that finished before the failure. They are not rolled back.
    pub completed: Vec<StepKind>,
    #[source]
    pub source: SessionError,
}

impl BootstrapError {
    pub fn state(&self) -> BootstrapState {
        BootstrapState::Failed { at: self.step }
    }
}

/// Selects [`DATABASE`] on `client` and runs every step in order, stopping
/// at the first failure. Nothing is retried or compensated.
pub async fn run_bootstrap<C>(client: &C) -> Result<BootstrapReport, BootstrapError>
where
    C: AdminClient,
{
    let run_id = Uuid::new_v4().to_string();
    let span = create_run_span(&run_id, "run", DATABASE);
    run_steps(client, run_id).instrument(span).await
}

async fn run_steps<C>(client: &C, run_id: String) -> Result<BootstrapReport, BootstrapError>
where
    C: AdminClient,
{
    let started_at = Utc::now();
    let mut states = vec![BootstrapState::SelectDatabase];
    let session = client.select_database(DATABASE);
    info!(database = session.database(), "selected database");

    let mut steps = Vec::new();
    let mut completed = Vec::new();
    for step in all_steps() {
        let kind = step.kind();
        states.push(kind.into());
        let (result, elapsed) = time_db_operation(
            &kind.to_string(),
            session.database(),
            step.collection(),
            step.apply(&session),
        )
        .await;
        match result {
            Ok(created) => {
                completed.push(kind);
                steps.push(StepReport {
                    step: kind,
                    created,
                    duration_ms: elapsed.as_millis() as u64,
                });
            }
            Err(source) => {
                let origin = source.origin();
                error!(step = %kind, origin = %origin, error = ?source, "bootstrap step failed");
                return Err(BootstrapError {
                    run_id,
                    step: kind,
                    origin,
                    completed,
                    source,
                });
            }
        }
    }

    states.push(BootstrapState::Done);
    info!(steps = steps.len(), "bootstrap finished");
    Ok(BootstrapReport {
        run_id,
        database: session.database().to_string(),
        started_at,
        finished_at: Utc::now(),
        steps,
        states,
    })
}

/// A command the bootstrap would send, for printing without a server.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedCommand {
    pub step: StepKind,
    pub database: &'static str,
    pub command: Document,
}

pub fn plan() -> Vec<PlannedCommand> {
    all_steps()
        .iter()
        .flat_map(|step| {
            let kind = step.kind();
            step.commands().into_iter().map(move |command| PlannedCommand {
                step: kind,
                database: DATABASE,
                command,
            })
        })
        .collect()
}

//! The ordered administrative steps of the bootstrap and their runner.

use async_trait::async_trait;
use mongodb::bson::Document;
use serde::Serialize;

use crate::session::{AdminSession, SessionError};

pub mod runner;
pub mod scripts;

pub use runner::{
    plan, run_bootstrap, BootstrapError, BootstrapReport, BootstrapState, PlannedCommand,
    StepReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    CreateUser,
    CreateCollection,
    CreateIndexes,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepKind::CreateUser => "create_user",
            StepKind::CreateCollection => "create_collection",
            StepKind::CreateIndexes => "create_indexes",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait Step: Send + Sync {
    fn kind(&self) -> StepKind;
    /// Collection the step touches, if any.
    fn collection(&self) -> Option<&'static str>;
    /// Server commands this step issues, with secrets masked.
    fn commands(&self) -> Vec<Document>;
    /// Runs the step. Returns the names of the objects it created.
    async fn apply(&self, session: &dyn AdminSession) -> Result<Vec<String>, SessionError>;
}

/// Every step, in the order it runs.
pub fn all_steps() -> Vec<Box<dyn Step>> {
    vec![
        Box::new(scripts::s001_create_user::CreateUser),
        Box::new(scripts::s002_create_collection::CreateCollection),
        Box::new(scripts::s003_create_indexes::CreateIndexes),
    ]
}

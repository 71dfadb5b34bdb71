use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::info;

use crate::provision::{indexes, COLLECTION};
use crate::session::{AdminSession, SessionError};
use crate::steps::{Step, StepKind};

/// One ascending single-field index per indexed field, created one at a
/// time. The first failure stops the step.
pub struct CreateIndexes;

#[async_trait]
impl Step for CreateIndexes {
    fn kind(&self) -> StepKind {
        StepKind::CreateIndexes
    }

    fn collection(&self) -> Option<&'static str> {
        Some(COLLECTION)
    }

    fn commands(&self) -> Vec<Document> {
        indexes().iter().map(|index| index.command(COLLECTION)).collect()
    }

    async fn apply(&self, session: &dyn AdminSession) -> Result<Vec<String>, SessionError> {
        let mut created = Vec::new();
        for index in indexes() {
            let name = session.create_index(COLLECTION, &index).await?;
            info!(collection = COLLECTION, index = %name, "created index");
            created.push(name);
        }
        Ok(created)
    }
}

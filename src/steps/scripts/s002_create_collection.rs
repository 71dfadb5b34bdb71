use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::info;

use crate::provision::{create_collection_command, COLLECTION};
use crate::session::{AdminSession, SessionError};
use crate::steps::{Step, StepKind};

pub struct CreateCollection;

#[async_trait]
impl Step for CreateCollection {
    fn kind(&self) -> StepKind {
        StepKind::CreateCollection
    }

    fn collection(&self) -> Option<&'static str> {
        Some(COLLECTION)
    }

    fn commands(&self) -> Vec<Document> {
        vec![create_collection_command(COLLECTION)]
    }

    async fn apply(&self, session: &dyn AdminSession) -> Result<Vec<String>, SessionError> {
        session.create_collection(COLLECTION).await?;
        info!(collection = COLLECTION, "created collection");
        Ok(vec![COLLECTION.to_string()])
    }
}

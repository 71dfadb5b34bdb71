use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::info;

use crate::provision::UserSpec;
use crate::session::{AdminSession, SessionError};
use crate::steps::{Step, StepKind};

/// Creates `downtime_user` with `readWrite` on the selected database.
pub struct CreateUser;

#[async_trait]
impl Step for CreateUser {
    fn kind(&self) -> StepKind {
        StepKind::CreateUser
    }

    fn collection(&self) -> Option<&'static str> {
        None
    }

    fn commands(&self) -> Vec<Document> {
        vec![UserSpec::downtime_user().masked_command()]
    }

    async fn apply(&self, session: &dyn AdminSession) -> Result<Vec<String>, SessionError> {
        let user = UserSpec::downtime_user();
        session.create_user(&user).await?;
        let roles: Vec<String> = user.roles.iter().map(ToString::to_string).collect();
        info!(user = %user.username, roles = ?roles, "created user");
        Ok(vec![user.username])
    }
}

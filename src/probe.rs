//! Exercises the application principal the way the downtime service would.

use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, DateTime as MongoDateTime};
use mongodb::Collection;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::config::MongoSettings;
use crate::model::{DowntimeEvent, DowntimeStatus};
use crate::provision::{COLLECTION, DATABASE, PASSWORD, USERNAME};
use crate::session::{MongoAdmin, SessionError};
use crate::verify::VerifyError;

const PROBE_EQUIPMENT: &str = "bootstrap-probe";
const PROBE_OPERATOR: &str = "bootstrap";

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub user: String,
    pub inserted: bool,
    pub found: bool,
    pub updated: bool,
    pub deleted: bool,
}

/// The event operations the downtime service relies on.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert(&self, event: &DowntimeEvent) -> Result<ObjectId, VerifyError>;
    async fn find(&self, id: ObjectId) -> Result<Option<DowntimeEvent>, VerifyError>;
    /// Marks the event resolved at `at`; returns the number of modified documents.
    async fn resolve(&self, id: ObjectId, at: MongoDateTime) -> Result<u64, VerifyError>;
    /// Returns the number of deleted documents.
    async fn delete(&self, id: ObjectId) -> Result<u64, VerifyError>;
}

#[async_trait]
impl EventStore for Collection<DowntimeEvent> {
    async fn insert(&self, event: &DowntimeEvent) -> Result<ObjectId, VerifyError> {
        let inserted = self
            .insert_one(event, None)
            .await
            .map_err(SessionError::from)?;
        inserted
            .inserted_id
            .as_object_id()
            .ok_or_else(|| VerifyError::Probe("insert returned a non-ObjectId _id".to_string()))
    }

    async fn find(&self, id: ObjectId) -> Result<Option<DowntimeEvent>, VerifyError> {
        let found = self
            .find_one(doc! { "_id": id, "equipmentId": PROBE_EQUIPMENT }, None)
            .await
            .map_err(SessionError::from)?;
        Ok(found)
    }

    async fn resolve(&self, id: ObjectId, at: MongoDateTime) -> Result<u64, VerifyError> {
        let resolved = mongodb::bson::to_bson(&DowntimeStatus::Resolved)
            .map_err(|e| VerifyError::Probe(e.to_string()))?;
        let update = self
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "status": resolved, "endTime": at, "updatedAt": at } },
                None,
            )
            .await
            .map_err(SessionError::from)?;
        Ok(update.modified_count)
    }

    async fn delete(&self, id: ObjectId) -> Result<u64, VerifyError> {
        let deleted = self
            .delete_one(doc! { "_id": id }, None)
            .await
            .map_err(SessionError::from)?;
        Ok(deleted.deleted_count)
    }
}

/// Logs in as the application user and runs [`exercise`] against
/// `downtime_events`.
#[instrument(skip_all, fields(user = USERNAME), err)]
pub async fn probe_as_app(settings: &MongoSettings) -> Result<ProbeReport, VerifyError> {
    let client = MongoAdmin::connect_as(settings, USERNAME, PASSWORD, DATABASE).await?;
    let events: Collection<DowntimeEvent> = client.database(DATABASE).collection(COLLECTION);
    exercise(&events).await
}

/// Inserts, reads back, resolves and deletes one event. Once the insert
/// succeeds the event is deleted whatever happens in between; a failed
/// check is reported ahead of a failed delete.
pub async fn exercise<S>(store: &S) -> Result<ProbeReport, VerifyError>
where
    S: EventStore + ?Sized,
{
    let mut event = DowntimeEvent::start(PROBE_EQUIPMENT, PROBE_OPERATOR);
    event.reason = Some("bootstrap verification".to_string());
    let id = store.insert(&event).await?;
    info!(id = %id, "inserted probe event");

    let checked = async {
        match store.find(id).await? {
            Some(stored) if stored.is_active() => {}
            Some(_) => {
                return Err(VerifyError::Probe(
                    "probe event was not stored as active".to_string(),
                ))
            }
            None => {
                return Err(VerifyError::Probe(
                    "probe event not found after insert".to_string(),
                ))
            }
        }
        store.resolve(id, MongoDateTime::now()).await
    }
    .await;

    let cleanup = store.delete(id).await;
    let modified = match checked {
        Ok(modified) => modified,
        Err(e) => {
            if let Err(cleanup) = &cleanup {
                warn!(id = %id, error = %cleanup, "probe event left behind");
            }
            return Err(e);
        }
    };
    let removed = cleanup?;

    let updated = modified == 1;
    let deleted = removed == 1;
    if !(updated && deleted) {
        return Err(VerifyError::Probe(format!(
            "update modified {} document(s), delete removed {}",
            modified, removed
        )));
    }

    info!("application user can read and write {}", COLLECTION);
    Ok(ProbeReport {
        user: USERNAME.to_string(),
        inserted: true,
        found: true,
        updated,
        deleted,
    })
}

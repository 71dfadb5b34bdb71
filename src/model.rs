use mongodb::bson::{oid::ObjectId, DateTime as MongoDateTime};
use serde::{Deserialize, Serialize};

/// Lifecycle of a downtime event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DowntimeStatus {
    #[default]
    Active,
    Resolved,
}

/// A document in `downtime_events`, as the downtime service writes it.
///
/// Nothing enforces this shape on the collection; the indexed fields
/// (`equipmentId`, `status`, `startTime`, `operatorId`) are the ones the
/// service filters and sorts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DowntimeEvent {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub equipment_id: String,
    #[serde(default)]
    pub equipment_name: Option<String>,
    pub operator_id: String,
    #[serde(default)]
    pub operator_name: Option<String>,
    pub start_time: MongoDateTime,
    #[serde(default)]
    pub end_time: Option<MongoDateTime>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    #[serde(default)]
    pub status: DowntimeStatus,
    pub created_at: MongoDateTime,
    pub updated_at: MongoDateTime,
}

impl DowntimeEvent {
    /// A new active event starting now.
    pub fn start(equipment_id: impl Into<String>, operator_id: impl Into<String>) -> Self {
        let now = MongoDateTime::now();
        Self {
            id: None,
            equipment_id: equipment_id.into(),
            equipment_name: None,
            operator_id: operator_id.into(),
            operator_name: None,
            start_time: now,
            end_time: None,
            reason: None,
            comment: None,
            photo_urls: Vec::new(),
            status: DowntimeStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == DowntimeStatus::Active
    }
}

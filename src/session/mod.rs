//! Administrative session seam between the bootstrap steps and the server.
//!
//! [`AdminClient`] selects a database and hands back an explicit
//! [`AdminSession`] handle; every step runs against that handle.

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use serde::{Deserialize, Serialize};

use crate::provision::{IndexSpec, RoleBinding, UserSpec};

pub mod mongo;

#[cfg(test)]
pub(crate) mod memory;

pub use mongo::{MongoAdmin, MongoSession};

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("database driver error")]
    Driver(#[from] mongodb::error::Error),
    #[error("server rejected `{command}` (code {code}): {message}")]
    Rejected {
        command: &'static str,
        code: i32,
        message: String,
    },
    #[error("unexpected reply to `{command}`")]
    Reply {
        command: &'static str,
        #[source]
        source: mongodb::bson::de::Error,
    },
}

impl SessionError {
    pub fn origin(&self) -> ErrorOrigin {
        match self {
            SessionError::Driver(e) => ErrorOrigin::of_driver(e),
            SessionError::Rejected { code, .. } => ErrorOrigin::from_code(*code),
            SessionError::Reply { .. } => ErrorOrigin::Other,
        }
    }
}

/// Where a failure came from. Only used for logging and exit codes;
/// errors are never suppressed or retried based on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    Connection,
    Duplicate,
    Permission,
    Other,
}

impl ErrorOrigin {
    pub fn from_code(code: i32) -> Self {
        match code {
            // DuplicateKey, NamespaceExists, IndexAlreadyExists,
            // IndexOptionsConflict, IndexKeySpecsConflict, user already exists
            11000 | 48 | 68 | 85 | 86 | 51003 => ErrorOrigin::Duplicate,
            // Unauthorized, AuthenticationFailed
            13 | 18 => ErrorOrigin::Permission,
            _ => ErrorOrigin::Other,
        }
    }

    pub fn of_driver(error: &mongodb::error::Error) -> Self {
        match error.kind.as_ref() {
            ErrorKind::Command(command) => Self::from_code(command.code),
            ErrorKind::Write(WriteFailure::WriteError(write)) => Self::from_code(write.code),
            // handshake failures leave no usable session
            ErrorKind::Authentication { .. }
            | ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => ErrorOrigin::Connection,
            _ => ErrorOrigin::Other,
        }
    }
}

impl std::fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorOrigin::Connection => "connection",
            ErrorOrigin::Duplicate => "duplicate",
            ErrorOrigin::Permission => "permission",
            ErrorOrigin::Other => "other",
        };
        f.write_str(name)
    }
}

/// An index as reported back by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Document,
    pub unique: bool,
    pub sparse: bool,
    pub partial: bool,
    /// TTL of the index, in seconds.
    pub expire_after_secs: Option<u64>,
    pub hidden: bool,
    /// Collation locale, when the index has one.
    pub collation: Option<String>,
}

impl IndexInfo {
    /// An index on `keys` with every option left at the server default.
    pub fn plain(name: impl Into<String>, keys: Document) -> Self {
        Self {
            name: name.into(),
            keys,
            unique: false,
            sparse: false,
            partial: false,
            expire_after_secs: None,
            hidden: false,
            collation: None,
        }
    }

    /// The field of a single-field ascending index, if this is one.
    pub fn ascending_field(&self) -> Option<&str> {
        if self.keys.len() != 1 {
            return None;
        }
        let (field, direction) = self.keys.iter().next()?;
        let ascending = match direction {
            Bson::Int32(v) => *v == 1,
            Bson::Int64(v) => *v == 1,
            Bson::Double(v) => *v == 1.0,
            _ => false,
        };
        ascending.then_some(field.as_str())
    }

    /// Whether anything besides the keys deviates from a default index.
    pub fn has_options(&self) -> bool {
        self.unique
            || self.sparse
            || self.partial
            || self.hidden
            || self.expire_after_secs.is_some()
            || self.collation.is_some()
    }
}

/// A principal as reported by `usersInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user: String,
    pub db: String,
    #[serde(default)]
    pub roles: Vec<RoleBinding>,
}

/// Administrative operations against one selected database.
#[async_trait]
pub trait AdminSession: Send + Sync {
    fn database(&self) -> &str;
    async fn create_user(&self, user: &UserSpec) -> Result<(), SessionError>;
    async fn create_collection(&self, name: &str) -> Result<(), SessionError>;
    /// Returns the name of the created index.
    async fn create_index(&self, collection: &str, index: &IndexSpec)
        -> Result<String, SessionError>;
    async fn list_collections(&self) -> Result<Vec<String>, SessionError>;
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, SessionError>;
    async fn user_info(&self, username: &str) -> Result<Option<UserInfo>, SessionError>;
}

/// A connection that can select databases.
pub trait AdminClient: Send + Sync {
    type Session: AdminSession;

    /// Selects a database by name. Never touches the server.
    fn select_database(&self, name: &str) -> Self::Session;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn index(keys: Document) -> IndexInfo {
        IndexInfo::plain("idx", keys)
    }

    fn io_error() -> mongodb::error::Error {
        mongodb::error::Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))
    }

    #[test]
    fn test_origin_from_code() {
        assert_eq!(ErrorOrigin::from_code(51003), ErrorOrigin::Duplicate);
        assert_eq!(ErrorOrigin::from_code(48), ErrorOrigin::Duplicate);
        assert_eq!(ErrorOrigin::from_code(68), ErrorOrigin::Duplicate);
        assert_eq!(ErrorOrigin::from_code(85), ErrorOrigin::Duplicate);
        assert_eq!(ErrorOrigin::from_code(86), ErrorOrigin::Duplicate);
        assert_eq!(ErrorOrigin::from_code(11000), ErrorOrigin::Duplicate);
        assert_eq!(ErrorOrigin::from_code(13), ErrorOrigin::Permission);
        assert_eq!(ErrorOrigin::from_code(18), ErrorOrigin::Permission);
        assert_eq!(ErrorOrigin::from_code(2), ErrorOrigin::Other);
    }

    #[test]
    fn test_rejected_origin() {
        let err = SessionError::Rejected {
            command: "create",
            code: 48,
            message: "Collection already exists".to_string(),
        };
        assert_eq!(err.origin(), ErrorOrigin::Duplicate);
        assert!(err.to_string().contains("code 48"));
    }

    #[test]
    fn test_unreachable_server_is_a_connection_failure() {
        let error = io_error();
        assert_eq!(ErrorOrigin::of_driver(&error), ErrorOrigin::Connection);
        assert_eq!(SessionError::from(io_error()).origin(), ErrorOrigin::Connection);
    }

    #[test]
    fn test_index_options() {
        assert!(!index(doc! { "status": 1 }).has_options());

        let mut ttl = index(doc! { "startTime": 1 });
        ttl.expire_after_secs = Some(3600);
        assert!(ttl.has_options());

        let mut hidden = index(doc! { "status": 1 });
        hidden.hidden = true;
        assert!(hidden.has_options());

        let mut collated = index(doc! { "operatorId": 1 });
        collated.collation = Some("fr".to_string());
        assert!(collated.has_options());
    }

    #[test]
    fn test_ascending_field() {
        assert_eq!(index(doc! { "status": 1 }).ascending_field(), Some("status"));
        assert_eq!(index(doc! { "status": 1_i64 }).ascending_field(), Some("status"));
        assert_eq!(index(doc! { "status": 1.0 }).ascending_field(), Some("status"));
        assert_eq!(index(doc! { "status": -1 }).ascending_field(), None);
        assert_eq!(index(doc! { "status": "hashed" }).ascending_field(), None);
        assert_eq!(index(doc! { "a": 1, "b": 1 }).ascending_field(), None);
    }

    #[test]
    fn test_user_info_from_reply() {
        let raw = doc! {
            "_id": "downtime_db.downtime_user",
            "user": "downtime_user",
            "db": "downtime_db",
            "roles": [{ "role": "readWrite", "db": "downtime_db" }],
            "mechanisms": ["SCRAM-SHA-1", "SCRAM-SHA-256"],
        };
        let info: UserInfo = mongodb::bson::from_document(raw).unwrap();
        assert_eq!(info.roles, vec![RoleBinding::new("readWrite", "downtime_db")]);
    }
}

//! Fixed description of what the bootstrap provisions.
//!
//! Every name and credential here is a literal: only the administrative
//! connection is configurable, never the objects it creates.

use mongodb::bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};

pub const DATABASE: &str = "downtime_db";
pub const USERNAME: &str = "downtime_user";
pub const PASSWORD: &str = "downtime_pass";
pub const ROLE: &str = "readWrite";
pub const COLLECTION: &str = "downtime_events";

/// Fields that get a single-field ascending index, in creation order.
pub const INDEXED_FIELDS: [&str; 4] = ["equipmentId", "status", "startTime", "operatorId"];

/// Name of the index every collection gets from the server.
pub const DEFAULT_INDEX: &str = "_id_";

const MASKED_PASSWORD: &str = "********";

/// An authorization grant of one role on one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub role: String,
    pub db: String,
}

impl RoleBinding {
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

impl std::fmt::Display for RoleBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.role, self.db)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub username: String,
    pub password: String,
    pub roles: Vec<RoleBinding>,
}

impl UserSpec {
    /// The application principal: one `readWrite` binding on [`DATABASE`].
    pub fn downtime_user() -> Self {
        Self {
            username: USERNAME.to_string(),
            password: PASSWORD.to_string(),
            roles: vec![RoleBinding::new(ROLE, DATABASE)],
        }
    }

    /// The `createUser` command, run against the user's authentication database.
    pub fn command(&self) -> Document {
        self.command_with_password(&self.password)
    }

    /// Same command with the secret replaced, for printing.
    pub fn masked_command(&self) -> Document {
        self.command_with_password(MASKED_PASSWORD)
    }

    fn command_with_password(&self, password: &str) -> Document {
        let roles: Vec<Bson> = self
            .roles
            .iter()
            .map(|binding| Bson::Document(doc! { "role": binding.role.as_str(), "db": binding.db.as_str() }))
            .collect();
        doc! {
            "createUser": self.username.as_str(),
            "pwd": password,
            "roles": roles,
        }
    }
}

/// A single-field ascending index with no options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
}

impl IndexSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    pub fn keys(&self) -> Document {
        let field = self.field.as_str();
        doc! { field: 1 }
    }

    /// The name the server assigns when none is given.
    pub fn default_name(&self) -> String {
        format!("{}_1", self.field)
    }

    pub fn command(&self, collection: &str) -> Document {
        doc! {
            "createIndexes": collection,
            "indexes": [{ "key": self.keys(), "name": self.default_name() }],
        }
    }
}

/// The four indexes on [`COLLECTION`], in creation order.
pub fn indexes() -> Vec<IndexSpec> {
    INDEXED_FIELDS.iter().map(|field| IndexSpec::ascending(*field)).collect()
}

/// Index names expected on a fully provisioned collection, `_id_` included.
pub fn expected_index_names() -> Vec<String> {
    std::iter::once(DEFAULT_INDEX.to_string())
        .chain(indexes().into_iter().map(|index| index.default_name()))
        .collect()
}

pub fn create_collection_command(name: &str) -> Document {
    doc! { "create": name }
}

//! In-memory stand-in for a server, recording every request it receives.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AdminClient, AdminSession, IndexInfo, SessionError, UserInfo};
use crate::provision::{IndexSpec, UserSpec, DEFAULT_INDEX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateUser { db: String, username: String },
    CreateCollection { db: String, name: String },
    CreateIndex { db: String, collection: String, field: String },
}

#[derive(Debug, Default)]
struct Database {
    users: BTreeMap<String, UserInfo>,
    collections: BTreeMap<String, Vec<IndexInfo>>,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, Database>,
    calls: Vec<Call>,
    fail_user: Option<i32>,
    fail_collection: Option<i32>,
    fail_index: Option<(String, i32)>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<State>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn fail_create_user(&self, code: i32) {
        self.state.lock().unwrap().fail_user = Some(code);
    }

    pub fn fail_create_collection(&self, code: i32) {
        self.state.lock().unwrap().fail_collection = Some(code);
    }

    pub fn fail_create_index(&self, field: &str, code: i32) {
        self.state.lock().unwrap().fail_index = Some((field.to_string(), code));
    }

    /// Puts an index in place directly, bypassing the request log.
    pub fn insert_index(&self, db: &str, collection: &str, index: IndexInfo) {
        let mut state = self.state.lock().unwrap();
        state
            .databases
            .entry(db.to_string())
            .or_default()
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| vec![id_index()])
            .push(index);
    }

    pub fn insert_user(&self, db: &str, user: UserInfo) {
        let mut state = self.state.lock().unwrap();
        state
            .databases
            .entry(db.to_string())
            .or_default()
            .users
            .insert(user.user.clone(), user);
    }

    pub fn database_names(&self) -> Vec<String> {
        self.state.lock().unwrap().databases.keys().cloned().collect()
    }
}

fn id_index() -> IndexInfo {
    IndexInfo::plain(DEFAULT_INDEX, mongodb::bson::doc! { "_id": 1 })
}

fn rejected(command: &'static str, code: i32, message: impl Into<String>) -> SessionError {
    SessionError::Rejected {
        command,
        code,
        message: message.into(),
    }
}

impl AdminClient for MemoryServer {
    type Session = MemorySession;

    fn select_database(&self, name: &str) -> MemorySession {
        MemorySession {
            server: self.clone(),
            db: name.to_string(),
        }
    }
}

pub struct MemorySession {
    server: MemoryServer,
    db: String,
}

#[async_trait]
impl AdminSession for MemorySession {
    fn database(&self) -> &str {
        &self.db
    }

    async fn create_user(&self, user: &UserSpec) -> Result<(), SessionError> {
        let mut state = self.server.state.lock().unwrap();
        state.calls.push(Call::CreateUser {
            db: self.db.clone(),
            username: user.username.clone(),
        });
        if let Some(code) = state.fail_user {
            return Err(rejected("createUser", code, "injected failure"));
        }
        let db = state.databases.entry(self.db.clone()).or_default();
        if db.users.contains_key(&user.username) {
            return Err(rejected(
                "createUser",
                51003,
                format!("User \"{}@{}\" already exists", user.username, self.db),
            ));
        }
        db.users.insert(
            user.username.clone(),
            UserInfo {
                user: user.username.clone(),
                db: self.db.clone(),
                roles: user.roles.clone(),
            },
        );
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<(), SessionError> {
        let mut state = self.server.state.lock().unwrap();
        state.calls.push(Call::CreateCollection {
            db: self.db.clone(),
            name: name.to_string(),
        });
        if let Some(code) = state.fail_collection {
            return Err(rejected("create", code, "injected failure"));
        }
        let db = state.databases.entry(self.db.clone()).or_default();
        if db.collections.contains_key(name) {
            return Err(rejected(
                "create",
                48,
                format!("Collection {}.{} already exists.", self.db, name),
            ));
        }
        db.collections.insert(name.to_string(), vec![id_index()]);
        Ok(())
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<String, SessionError> {
        let mut state = self.server.state.lock().unwrap();
        state.calls.push(Call::CreateIndex {
            db: self.db.clone(),
            collection: collection.to_string(),
            field: index.field.clone(),
        });
        if let Some((field, code)) = &state.fail_index {
            if *field == index.field {
                return Err(rejected("createIndexes", *code, "injected failure"));
            }
        }
        let name = index.default_name();
        let indexes = state
            .databases
            .entry(self.db.clone())
            .or_default()
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| vec![id_index()]);
        if let Some(existing) = indexes.iter().find(|i| i.name == name) {
            if existing.keys == index.keys() && !existing.has_options() {
                return Ok(name);
            }
            return Err(rejected(
                "createIndexes",
                85,
                format!("An existing index has the same name as the requested index: {}", name),
            ));
        }
        indexes.push(IndexInfo::plain(name.clone(), index.keys()));
        Ok(name)
    }

    async fn list_collections(&self) -> Result<Vec<String>, SessionError> {
        let state = self.server.state.lock().unwrap();
        Ok(state
            .databases
            .get(&self.db)
            .map(|db| db.collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, SessionError> {
        let state = self.server.state.lock().unwrap();
        state
            .databases
            .get(&self.db)
            .and_then(|db| db.collections.get(collection))
            .cloned()
            .ok_or_else(|| {
                rejected(
                    "listIndexes",
                    26,
                    format!("ns does not exist: {}.{}", self.db, collection),
                )
            })
    }

    async fn user_info(&self, username: &str) -> Result<Option<UserInfo>, SessionError> {
        let state = self.server.state.lock().unwrap();
        Ok(state
            .databases
            .get(&self.db)
            .and_then(|db| db.users.get(username))
            .cloned())
    }
}

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, Credential, ServerApi, ServerApiVersion};
use mongodb::{Client, Database, IndexModel};
use serde::Deserialize;
use tracing::{info, instrument};

use super::{AdminClient, AdminSession, IndexInfo, SessionError, UserInfo};
use crate::config::MongoSettings;
use crate::provision::{IndexSpec, UserSpec};
use crate::uri::redact_uri;

/// The administrative connection handed to the bootstrap.
#[derive(Clone, Debug)]
pub struct MongoAdmin {
    client: Client,
}

impl MongoAdmin {
    /// Builds a client from `settings` and pings the server, so an
    /// unreachable or unauthenticated server fails here, before any step.
    #[instrument(skip_all, fields(uri = %redact_uri(&settings.uri)), err)]
    pub async fn connect(settings: &MongoSettings) -> Result<Self, SessionError> {
        let options = client_options(settings).await?;
        let client = Client::with_options(options)?;
        let admin = Self { client };
        admin.ping().await?;
        info!("connected to MongoDB");
        Ok(admin)
    }

    /// Connects with the same target as `settings` but as another principal,
    /// authenticating against `source`.
    #[instrument(skip(settings, password), fields(uri = %redact_uri(&settings.uri)), err)]
    pub async fn connect_as(
        settings: &MongoSettings,
        username: &str,
        password: &str,
        source: &str,
    ) -> Result<Client, SessionError> {
        let mut options = client_options(settings).await?;
        options.credential = Some(
            Credential::builder()
                .username(username.to_string())
                .password(password.to_string())
                .source(source.to_string())
                .build(),
        );
        let client = Client::with_options(options)?;
        client
            .database(source)
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(client)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn ping(&self) -> Result<(), SessionError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }
}

async fn client_options(settings: &MongoSettings) -> Result<ClientOptions, SessionError> {
    let mut options = ClientOptions::parse(&settings.uri).await?;
    options.app_name = Some(settings.app_name.clone());
    options.connect_timeout = Some(Duration::from_millis(settings.connect_timeout_ms));
    options.server_selection_timeout =
        Some(Duration::from_millis(settings.server_selection_timeout_ms));
    // a bootstrap never needs more than one connection
    options.max_pool_size = Some(1);
    if settings.stable_api {
        options.server_api = Some(ServerApi::builder().version(ServerApiVersion::V1).build());
    }
    Ok(options)
}

impl AdminClient for MongoAdmin {
    type Session = MongoSession;

    fn select_database(&self, name: &str) -> MongoSession {
        MongoSession {
            db: self.client.database(name),
        }
    }
}

/// A selected database on a live server.
#[derive(Clone, Debug)]
pub struct MongoSession {
    db: Database,
}

#[derive(Deserialize)]
struct UsersInfoReply {
    users: Vec<UserInfo>,
}

#[async_trait]
impl AdminSession for MongoSession {
    fn database(&self) -> &str {
        self.db.name()
    }

    async fn create_user(&self, user: &UserSpec) -> Result<(), SessionError> {
        self.db.run_command(user.command(), None).await?;
        Ok(())
    }

    async fn create_collection(&self, name: &str) -> Result<(), SessionError> {
        self.db.create_collection(name, None).await?;
        Ok(())
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<String, SessionError> {
        let model = IndexModel::builder().keys(index.keys()).build();
        let result = self
            .db
            .collection::<Document>(collection)
            .create_index(model, None)
            .await?;
        Ok(result.index_name)
    }

    async fn list_collections(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.db.list_collection_names(None).await?)
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexInfo>, SessionError> {
        let models: Vec<IndexModel> = self
            .db
            .collection::<Document>(collection)
            .list_indexes(None)
            .await?
            .try_collect()
            .await?;
        Ok(models.into_iter().map(index_info).collect())
    }

    async fn user_info(&self, username: &str) -> Result<Option<UserInfo>, SessionError> {
        let reply = self
            .db
            .run_command(
                doc! { "usersInfo": { "user": username, "db": self.db.name() } },
                None,
            )
            .await?;
        let reply: UsersInfoReply = mongodb::bson::from_document(reply).map_err(|source| {
            SessionError::Reply {
                command: "usersInfo",
                source,
            }
        })?;
        Ok(reply.users.into_iter().next())
    }
}

fn index_info(model: IndexModel) -> IndexInfo {
    let mut info = IndexInfo::plain(String::new(), model.keys);
    if let Some(options) = model.options {
        info.name = options.name.unwrap_or_default();
        info.unique = options.unique.unwrap_or(false);
        info.sparse = options.sparse.unwrap_or(false);
        info.partial = options.partial_filter_expression.is_some();
        info.expire_after_secs = options.expire_after.map(|ttl| ttl.as_secs());
        info.hidden = options.hidden.unwrap_or(false);
        info.collation = options.collation.map(|collation| collation.locale);
    }
    info
}

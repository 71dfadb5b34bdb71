//! Reads the provisioned state back and compares it with what the
//! bootstrap is supposed to leave behind.

use serde::Serialize;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::provision::{
    indexes, RoleBinding, UserSpec, COLLECTION, DATABASE, DEFAULT_INDEX, USERNAME,
};
use crate::session::{AdminClient, AdminSession, IndexInfo, SessionError, UserInfo};
use crate::telemetry::create_run_span;

#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    #[error("could not read provisioned state")]
    Session(#[from] SessionError),
    #[error("provisioned state differs from expected ({0} problem(s))")]
    Mismatch(usize),
    #[error("application probe failed: {0}")]
    Probe(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum Problem {
    MissingCollection { name: String },
    UnexpectedCollection { name: String },
    MissingIndex { field: String },
    UnexpectedIndex { name: String },
    IndexWithOptions { name: String },
    MissingUser { user: String },
    WrongRoles { user: String, roles: Vec<RoleBinding> },
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Problem::MissingCollection { name } => write!(f, "collection {} is missing", name),
            Problem::UnexpectedCollection { name } => {
                write!(f, "unexpected collection {}", name)
            }
            Problem::MissingIndex { field } => {
                write!(f, "no ascending single-field index on {}", field)
            }
            Problem::UnexpectedIndex { name } => write!(f, "unexpected index {}", name),
            Problem::IndexWithOptions { name } => {
                write!(f, "index {} has non-default options", name)
            }
            Problem::MissingUser { user } => write!(f, "user {} does not exist", user),
            Problem::WrongRoles { user, roles } => {
                let roles: Vec<String> = roles.iter().map(ToString::to_string).collect();
                write!(f, "user {} has roles [{}]", user, roles.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub run_id: String,
    pub database: String,
    pub collections: Vec<String>,
    pub indexes: Vec<IndexInfo>,
    pub user: Option<UserInfo>,
    pub problems: Vec<Problem>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn into_result(self) -> Result<Self, VerifyError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(VerifyError::Mismatch(self.problems.len()))
        }
    }
}

/// Collects every difference instead of stopping at the first one.
pub async fn verify<C>(client: &C) -> Result<VerifyReport, VerifyError>
where
    C: AdminClient,
{
    let run_id = Uuid::new_v4().to_string();
    let span = create_run_span(&run_id, "verify", DATABASE);
    async {
        let session = client.select_database(DATABASE);
        let report = inspect(&session, run_id).await?;
        for problem in &report.problems {
            warn!(problem = %problem, "verification problem");
        }
        info!(problems = report.problems.len(), "verification finished");
        Ok::<_, VerifyError>(report)
    }
    .instrument(span)
    .await
}

async fn inspect(session: &dyn AdminSession, run_id: String) -> Result<VerifyReport, VerifyError> {
    let mut problems = Vec::new();

    let mut collections: Vec<String> = session
        .list_collections()
        .await?
        .into_iter()
        .filter(|name| !name.starts_with("system."))
        .collect();
    collections.sort();
    for name in &collections {
        if name != COLLECTION {
            problems.push(Problem::UnexpectedCollection { name: name.clone() });
        }
    }

    let found = if collections.iter().any(|name| name == COLLECTION) {
        let found = session.list_indexes(COLLECTION).await?;
        problems.extend(index_problems(&found));
        found
    } else {
        problems.push(Problem::MissingCollection {
            name: COLLECTION.to_string(),
        });
        Vec::new()
    };

    let user = session.user_info(USERNAME).await?;
    match &user {
        Some(info) => {
            let expected = UserSpec::downtime_user().roles;
            if info.roles != expected {
                problems.push(Problem::WrongRoles {
                    user: info.user.clone(),
                    roles: info.roles.clone(),
                });
            }
        }
        None => problems.push(Problem::MissingUser {
            user: USERNAME.to_string(),
        }),
    }

    Ok(VerifyReport {
        run_id,
        database: session.database().to_string(),
        collections,
        indexes: found,
        user,
        problems,
    })
}

/// Exactly `_id_` plus one plain ascending index per indexed field.
fn index_problems(found: &[IndexInfo]) -> Vec<Problem> {
    let mut problems = Vec::new();
    let expected = indexes();

    for spec in &expected {
        let matching = found
            .iter()
            .find(|index| index.ascending_field() == Some(spec.field.as_str()));
        match matching {
            Some(index) if index.has_options() => problems.push(Problem::IndexWithOptions {
                name: index.name.clone(),
            }),
            Some(_) => {}
            None => problems.push(Problem::MissingIndex {
                field: spec.field.clone(),
            }),
        }
    }

    for index in found {
        if index.name == DEFAULT_INDEX {
            continue;
        }
        let expected_field = index
            .ascending_field()
            .map(|field| expected.iter().any(|spec| spec.field == field))
            .unwrap_or(false);
        if !expected_field {
            problems.push(Problem::UnexpectedIndex {
                name: index.name.clone(),
            });
        }
    }
    problems
}

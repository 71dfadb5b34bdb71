//! Provisions the `downtime_db` MongoDB database for the downtime events
//! service: one application user, one collection, four indexes.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod probe;
pub mod provision;
pub mod session;
pub mod steps;
pub mod telemetry;
pub mod uri;
pub mod verify;

pub use config::Settings;
pub use session::{AdminClient, AdminSession, MongoAdmin, SessionError};
pub use steps::{run_bootstrap, BootstrapError, BootstrapReport};
pub use verify::{verify, VerifyError, VerifyReport};

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use downtime_bootstrap::config::{ConfigError, LogSettings, Settings};
use downtime_bootstrap::session::{ErrorOrigin, MongoAdmin, SessionError};
use downtime_bootstrap::steps::{plan, run_bootstrap, BootstrapError};
use downtime_bootstrap::uri::{validate_uri, UriError};
use downtime_bootstrap::verify::{verify, VerifyError};
use downtime_bootstrap::{logging, probe};
use tracing::{error, info};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_CONNECTION: u8 = 3;

/// Failure to reach or authenticate against the server, before any step ran.
#[derive(thiserror::Error, Debug)]
#[error("could not reach the MongoDB server")]
struct ConnectError(#[source] SessionError);

#[derive(Parser)]
#[command(
    name = "downtime-bootstrap",
    version,
    about = "Provision downtime_db: application user, downtime_events collection and its indexes"
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Path to a TOML settings file (default: bootstrap.toml if present)"
    )]
    config: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Create the user, the collection and the indexes (default)
    Run,
    /// Check that the database looks the way the bootstrap leaves it
    Verify {
        #[arg(long, help = "Also read and write a probe document as the application user")]
        as_app: bool,
    },
    /// Print the commands the bootstrap sends, without connecting
    Plan,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::set_panic_hook();
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);

    let settings = match settings_for(&command, cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init_logging_with_fallback(&LogSettings::default());
            error!(error = %format!("{:#}", anyhow::Error::from(e)), "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let log = settings
        .as_ref()
        .map(|settings| settings.log.clone())
        .unwrap_or_default();
    logging::init_logging_with_fallback(&log);

    let result = match settings {
        Some(settings) => execute(command, &settings).await,
        None => print_plan(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "downtime-bootstrap failed");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// `plan` never connects, so it runs without loading any settings.
fn settings_for(command: &Command, path: Option<&str>) -> Result<Option<Settings>, ConfigError> {
    match command {
        Command::Plan => Ok(None),
        Command::Run | Command::Verify { .. } => Settings::load(path).map(Some),
    }
}

fn print_plan() -> anyhow::Result<()> {
    let planned = plan();
    println!("{}", serde_json::to_string_pretty(&planned)?);
    Ok(())
}

async fn execute(command: Command, settings: &Settings) -> anyhow::Result<()> {
    match command {
        Command::Plan => print_plan(),
        Command::Run => {
            let admin = connect(settings).await?;
            let report = run_bootstrap(&admin).await?;
            info!(
                run_id = %report.run_id,
                indexes = ?report.created_indexes(),
                "database provisioned"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Verify { as_app } => {
            let admin = connect(settings).await?;
            let report = verify(&admin).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.into_result()?;
            if as_app {
                let probe = probe::probe_as_app(&settings.mongodb).await?;
                println!("{}", serde_json::to_string_pretty(&probe)?);
            }
            Ok(())
        }
    }
}

async fn connect(settings: &Settings) -> anyhow::Result<MongoAdmin> {
    validate_uri(&settings.mongodb.uri)?;
    let admin = MongoAdmin::connect(&settings.mongodb)
        .await
        .map_err(ConnectError)?;
    Ok(admin)
}

fn exit_code(error: &anyhow::Error) -> u8 {
    if error.downcast_ref::<ConfigError>().is_some() || error.downcast_ref::<UriError>().is_some() {
        return EXIT_CONFIG;
    }
    if error.downcast_ref::<ConnectError>().is_some() {
        return EXIT_CONNECTION;
    }
    let origin = if let Some(e) = error.downcast_ref::<SessionError>() {
        Some(e.origin())
    } else if let Some(e) = error.downcast_ref::<BootstrapError>() {
        Some(e.origin)
    } else if let Some(VerifyError::Session(e)) = error.downcast_ref::<VerifyError>() {
        Some(e.origin())
    } else {
        None
    };
    match origin {
        Some(ErrorOrigin::Connection) => EXIT_CONNECTION,
        _ => EXIT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use downtime_bootstrap::steps::StepKind;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::try_parse_from(["downtime-bootstrap"]).unwrap();
        assert_eq!(cli.command.unwrap_or(Command::Run), Command::Run);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verify_as_app_with_config() {
        let cli = Cli::try_parse_from([
            "downtime-bootstrap",
            "verify",
            "--as-app",
            "--config",
            "/etc/bootstrap.toml",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Command::Verify { as_app: true }));
        assert_eq!(cli.config.as_deref(), Some("/etc/bootstrap.toml"));
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["downtime-bootstrap", "migrate"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let config = anyhow::Error::from(UriError::Scheme);
        assert_eq!(exit_code(&config), EXIT_CONFIG);

        let missing = anyhow::Error::from(ConfigError::FileNotFound("x.toml".to_string()));
        assert_eq!(exit_code(&missing), EXIT_CONFIG);

        let duplicate = anyhow::Error::from(SessionError::Rejected {
            command: "createUser",
            code: 51003,
            message: "already exists".to_string(),
        });
        assert_eq!(exit_code(&duplicate), EXIT_FAILURE);

        let mismatch = anyhow::Error::from(VerifyError::Mismatch(3));
        assert_eq!(exit_code(&mismatch), EXIT_FAILURE);
    }

    fn refused() -> SessionError {
        SessionError::from(mongodb::error::Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        )))
    }

    #[test]
    fn test_lost_connection_exits_with_connection_code() {
        let session = anyhow::Error::from(refused());
        assert_eq!(exit_code(&session), EXIT_CONNECTION);

        let step = anyhow::Error::from(BootstrapError {
            run_id: "run".to_string(),
            step: StepKind::CreateCollection,
            origin: ErrorOrigin::Connection,
            completed: vec![StepKind::CreateUser],
            source: refused(),
        });
        assert_eq!(exit_code(&step), EXIT_CONNECTION);

        let reading = anyhow::Error::from(VerifyError::Session(refused()));
        assert_eq!(exit_code(&reading), EXIT_CONNECTION);

        let unreachable = anyhow::Error::from(ConnectError(refused()));
        assert_eq!(exit_code(&unreachable), EXIT_CONNECTION);
    }

    #[test]
    fn test_plan_needs_no_settings() {
        let missing = Some("/nonexistent/bootstrap.toml");
        assert!(settings_for(&Command::Plan, missing).unwrap().is_none());
        assert!(matches!(
            settings_for(&Command::Run, missing),
            Err(ConfigError::FileNotFound(_))
        ));
        assert!(matches!(
            settings_for(&Command::Verify { as_app: false }, missing),
            Err(ConfigError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_failed_login_is_a_connection_failure() {
        let err = anyhow::Error::from(ConnectError(SessionError::Rejected {
            command: "ping",
            code: 18,
            message: "Authentication failed.".to_string(),
        }));
        assert_eq!(exit_code(&err), EXIT_CONNECTION);
        assert!(format!("{:#}", err).contains("Authentication failed."));
    }
}

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogEnv, LogSettings};

const DEFAULT_FILTER: &str = "downtime_bootstrap=info,mongodb=warn";

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("failed to parse log filter")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("a global subscriber is already installed")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

fn env_filter() -> Result<EnvFilter, LoggingError> {
    filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
}

/// A set but unparsable `RUST_LOG` is an error rather than silently ignored.
fn filter_from(directives: Option<&str>) -> Result<EnvFilter, LoggingError> {
    Ok(EnvFilter::try_new(directives.unwrap_or(DEFAULT_FILTER))?)
}

/// Pretty output in development, JSON lines in production (to `settings.file`
/// when it can be opened, stdout otherwise).
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(env_filter()?);

    match settings.env {
        LogEnv::Development => {
            let fmt_layer = fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_line_number(true)
                .with_ansi(true)
                .pretty();
            registry.with(fmt_layer).try_init()?;
        }
        LogEnv::Production => {
            let file = settings.file.as_deref().and_then(|path| {
                OpenOptions::new().create(true).append(true).open(path).ok()
            });
            if let Some(file) = file {
                let json_layer = fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_target(true)
                    .with_level(true)
                    .with_line_number(true)
                    .json();
                registry.with(json_layer).try_init()?;
            } else {
                let json_layer = fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .json();
                registry.with(json_layer).try_init()?;
            }
        }
    }
    tracing::info!(
        "logging initialized in {} mode",
        match settings.env {
            LogEnv::Development => "development",
            LogEnv::Production => "production",
        }
    );
    Ok(())
}

/// Panics inside a run are logged as events of the current span, so they
/// carry its `run_id`. Before any subscriber exists they go to stderr.
pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|location| format!("{}:{}", location.file(), location.line()))
            .unwrap_or_else(|| "unknown".to_string());
        if tracing::dispatcher::has_been_set() {
            tracing::error!(location = %location, panic = %panic_info, "bootstrap panicked");
        } else {
            eprintln!("downtime-bootstrap panicked at {}: {}", location, panic_info);
        }
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            eprintln!("{}", backtrace);
        }
    }));
}

/// Like [`init_logging`], but never fails: a bad `RUST_LOG` or an unusable
/// log setup degrades to plain stderr output under the default filter.
pub fn init_logging_with_fallback(settings: &LogSettings) {
    match init_logging(settings) {
        // someone else already installed a subscriber; keep using it
        Ok(()) | Err(LoggingError::Init(_)) => {}
        Err(cause) => {
            let fallback = tracing_subscriber::registry()
                .with(EnvFilter::new(DEFAULT_FILTER))
                .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
                .try_init();
            if fallback.is_ok() {
                tracing::warn!(
                    error = %cause,
                    filter = DEFAULT_FILTER,
                    "falling back to plain stderr logging"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_when_unset() {
        assert!(filter_from(None).is_ok());
        assert!(filter_from(Some("downtime_bootstrap=debug")).is_ok());
    }

    #[test]
    fn test_invalid_directives_are_rejected() {
        assert!(matches!(
            filter_from(Some("downtime_bootstrap=loud")),
            Err(LoggingError::Filter(_))
        ));
    }
}

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{info, warn, Instrument};

/// Logs how long an operation took when finished (or dropped), at warn
/// level once it crosses a threshold.
pub struct Timer {
    start: Instant,
    operation: String,
    threshold_warn: Duration,
    threshold_error: Duration,
    logged: bool,
}

impl Timer {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.into(),
            threshold_warn: Duration::from_millis(500),
            threshold_error: Duration::from_secs(5),
            logged: false,
        }
    }

    pub fn with_thresholds(mut self, warn_ms: u64, error_ms: u64) -> Self {
        self.threshold_warn = Duration::from_millis(warn_ms);
        self.threshold_error = Duration::from_millis(error_ms);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Which bucket `elapsed` falls in.
    pub fn classify(&self, elapsed: Duration) -> Pace {
        if elapsed > self.threshold_error {
            Pace::Slower
        } else if elapsed > self.threshold_warn {
            Pace::Slow
        } else {
            Pace::Normal
        }
    }

    pub fn log_elapsed(&mut self, additional_context: Option<&str>) -> Duration {
        self.logged = true;
        let elapsed = self.elapsed();
        let elapsed_ms = elapsed.as_millis();
        let context = match additional_context {
            Some(ctx) => format!("{} ({})", self.operation, ctx),
            None => self.operation.clone(),
        };
        match self.classify(elapsed) {
            Pace::Slower => {
                warn!(operation = %context, duration_ms = %elapsed_ms, "operation exceeded error threshold")
            }
            Pace::Slow => {
                warn!(operation = %context, duration_ms = %elapsed_ms, "operation exceeded warning threshold")
            }
            Pace::Normal => {
                info!(operation = %context, duration_ms = %elapsed_ms, "operation completed")
            }
        }
        elapsed
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if !self.logged {
            self.log_elapsed(None);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Normal,
    Slow,
    Slower,
}

/// Runs `f` inside a database span and logs its duration.
/// Returns the result together with the elapsed time.
pub async fn time_db_operation<F, T, E>(
    operation: &str,
    database: &str,
    collection: Option<&str>,
    f: F,
) -> (Result<T, E>, Duration)
where
    F: Future<Output = Result<T, E>>,
{
    let mut timer = Timer::new(format!("db::{}", operation));
    let span = crate::telemetry::create_db_span(operation, database, collection);
    let result = f.instrument(span).await;
    let elapsed = timer.log_elapsed(Some(collection.unwrap_or(database)));
    (result, elapsed)
}

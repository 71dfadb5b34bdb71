//! Span constructors shared by the runner and the verifier.

pub fn create_run_span(run_id: &str, command: &str, database: &str) -> tracing::Span {
    tracing::span!(
        tracing::Level::INFO,
        "bootstrap",
        run_id = run_id,
        command = command,
        database = database
    )
}

pub fn create_db_span(operation: &str, database: &str, collection: Option<&str>) -> tracing::Span {
    tracing::span!(
        tracing::Level::DEBUG,
        "database",
        operation = operation,
        database = database,
        collection = collection.unwrap_or(""),
        db_type = "mongodb"
    )
}

use axum::http::StatusCode;

use super::problem::Problem;
use crate::domain::error::DomainError;

/// Map domain errors to HTTP problem responses
pub fn domain_error_to_problem(err: DomainError, instance: &str) -> Problem {
    let trace_id = tracing::Span::current()
        .id()
        .map(|id| id.into_u64().to_string());

    let mut problem = match err {
        DomainError::NodeNotFound(id) => Problem::new(
            StatusCode::NOT_FOUND,
            "Node not found",
            format!("No node found for id or MAC '{id}'"),
        )
        .with_type("https://errors.fleet.local/NODES_NOT_FOUND")
        .with_code("NODES_NOT_FOUND"),
        DomainError::FileNotFound(name) => Problem::new(
            StatusCode::NOT_FOUND,
            "File not found",
            format!("No firmware file named '{name}'"),
        )
        .with_type("https://errors.fleet.local/FILES_NOT_FOUND")
        .with_code("FILES_NOT_FOUND"),
        DomainError::InvalidInput(msg) => {
            Problem::new(StatusCode::BAD_REQUEST, "Validation error", msg)
                .with_type("https://errors.fleet.local/VALIDATION_ERROR")
                .with_code("VALIDATION_ERROR")
        }
        DomainError::Transport(e) => Problem::new(
            StatusCode::BAD_GATEWAY,
            "Bus unavailable",
            e.to_string(),
        )
        .with_type("https://errors.fleet.local/BUS_UNAVAILABLE")
        .with_code("BUS_UNAVAILABLE"),
        DomainError::Io(e) => {
            tracing::error!(error = %e, "file storage failure");
            Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                "file storage operation failed",
            )
            .with_type("https://errors.fleet.local/INTERNAL_ERROR")
            .with_code("INTERNAL_ERROR")
        }
    }
    .with_instance(instance);

    if let Some(tid) = trace_id {
        problem = problem.with_trace_id(tid);
    }

    problem
}

/// Implement Into<Problem> for `DomainError` so `?` works in handlers
impl From<DomainError> for Problem {
    fn from(e: DomainError) -> Self {
        domain_error_to_problem(e, "/")
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
///
/// Only `NoEntitiesResolved` and `InvalidLocationParameters` terminate an aggregation.
/// Insights engine failures degrade into `SourceOutcome::Degraded` and cache write
/// failures are counted in the cache stats; neither is ever returned through this type.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{}", no_entities_message(.0))]
    NoEntitiesResolved(Vec<String>),

    #[error("Invalid location parameters: {0}")]
    InvalidLocationParameters(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NoEntitiesResolved(_) => (
                StatusCode::BAD_REQUEST,
                format!(
                    "{}. Try naming specific places, artists or dishes you enjoy.",
                    self
                ),
            ),
            AppError::InvalidLocationParameters(_) | AppError::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::HttpClient(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

fn no_entities_message(names: &[String]) -> String {
    if names.is_empty() {
        "No entity names were provided".to_string()
    } else {
        format!("No entities could be resolved for: {}", names.join(", "))
    }
}

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  ValidationError(crate::validation::ValidationError),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::ValidationError(err) => {
        tracing::warn!(validation_error = %err, "Validation failed");
        let error_response = match &err {
          crate::validation::ValidationError::TooManyAddresses { max, .. } => {
            ErrorResponse::with_details(err.to_string(), format!("split the request into batches of at most {max}"))
          }
          _ => ErrorResponse::new(err.to_string()),
        };
        (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
      }
    }
  }
}

impl From<crate::validation::ValidationError> for AppError {
  fn from(err: crate::validation::ValidationError) -> Self {
    AppError::ValidationError(err)
  }
}

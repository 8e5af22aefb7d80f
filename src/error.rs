//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Field name -> list of messages, as reported by a schema load.
pub type FieldErrors = std::collections::BTreeMap<String, Vec<String>>;

/// Errors raised while building resource options or loading registry config.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate resource name: {0}")]
    DuplicateName(String),
    #[error("invalid option for resource '{resource}': {message}")]
    InvalidOption { resource: String, message: String },
    #[error("config load: {0}")]
    Load(String),
}

/// Tagged application error: the only error the dispatcher turns into a non-5xx response.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub payload: Option<Map<String, Value>>,
}

impl ApiError {
    /// New error with the default status (400).
    pub fn new(message: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn not_found() -> Self {
        ApiError::new("Resource not found").with_status(StatusCode::NOT_FOUND)
    }

    /// Schema load failure carrying field-level errors under `errors`.
    pub fn invalid_data(errors: FieldErrors) -> Self {
        let mut payload = Map::new();
        payload.insert(
            "errors".into(),
            serde_json::to_value(errors).unwrap_or(Value::Null),
        );
        ApiError::new("Bad request").with_payload(payload)
    }

    /// JSON body: payload keys first, then `error` and `code`.
    pub fn to_body(&self) -> Value {
        let mut body = self.payload.clone().unwrap_or_default();
        body.insert("error".into(), Value::String(self.message.clone()));
        body.insert("code".into(), Value::Number(self.status.as_u16().into()));
        Value::Object(body)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status.as_u16())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.to_body())).into_response()
    }
}

/// Error type threaded through every dispatch stage and resource hook.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            AppError::Api(e) => Some(e),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Api(e) => e.into_response(),
            other => {
                tracing::error!(error = %other, "unhandled fault");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

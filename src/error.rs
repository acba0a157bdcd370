use crate::data::Object;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Machine-readable error kinds surfaced to API clients.
///
/// Each code carries a default HTTP status; field-scoped codes are paired with
/// a `fieldName` in the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidDateFormat,
    InvalidFormat,
    InvalidReference,
    NotNullable,
    NotUnique,
    MinLimitExceeded,
    MaxLimitExceeded,
    MinLengthExceeded,
    MaxLengthExceeded,
    InvalidOption,
    InvalidCharacters,
    MissingRequired,
    InvalidCsrfToken,
    InvalidAction,
    InvalidBodyContent,
    InvalidType,
    InvalidState,
    ActionNotAvailable,
    Unauthorized,
    PermissionDenied,
    NotFound,
    MethodNotAllowed,
    Conflict,
    ServerError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidDateFormat => "InvalidDateFormat",
            ErrorCode::InvalidFormat => "InvalidFormat",
            ErrorCode::InvalidReference => "InvalidReference",
            ErrorCode::NotNullable => "NotNullable",
            ErrorCode::NotUnique => "NotUnique",
            ErrorCode::MinLimitExceeded => "MinLimitExceeded",
            ErrorCode::MaxLimitExceeded => "MaxLimitExceeded",
            ErrorCode::MinLengthExceeded => "MinLengthExceeded",
            ErrorCode::MaxLengthExceeded => "MaxLengthExceeded",
            ErrorCode::InvalidOption => "InvalidOption",
            ErrorCode::InvalidCharacters => "InvalidCharacters",
            ErrorCode::MissingRequired => "MissingRequired",
            ErrorCode::InvalidCsrfToken => "InvalidCSRFToken",
            ErrorCode::InvalidAction => "InvalidAction",
            ErrorCode::InvalidBodyContent => "InvalidBodyContent",
            ErrorCode::InvalidType => "InvalidType",
            ErrorCode::InvalidState => "InvalidState",
            ErrorCode::ActionNotAvailable => "ActionNotAvailable",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::PermissionDenied => "PermissionDenied",
            ErrorCode::NotFound => "NotFound",
            ErrorCode::MethodNotAllowed => "MethodNotAllowed",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::ServerError => "ServerError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorCode::NotFound | ErrorCode::ActionNotAvailable => StatusCode::NOT_FOUND,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Cause = Arc<dyn std::error::Error + Send + Sync>;

/// The single error type flowing through the request pipeline.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub field_name: Option<String>,
    #[source]
    cause: Option<Cause>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field_name: None,
            cause: None,
        }
    }

    pub fn field(code: ErrorCode, field_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field_name: Some(field_name.into()),
            cause: None,
        }
    }

    /// Wraps a foreign error so a later stage can inspect or translate it.
    pub fn wrap<E>(code: ErrorCode, message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            code,
            message: message.into(),
            field_name: None,
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }

    pub fn with_field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = Some(field_name.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Renders the wire envelope. Server errors never expose their message.
    pub fn to_object(&self) -> Object {
        let mut data = Object::new();
        data.insert("type".into(), Value::from("error"));
        data.insert("status".into(), Value::from(self.status().as_u16()));
        data.insert("code".into(), Value::from(self.code.as_str()));
        let message = if self.code == ErrorCode::ServerError {
            "Internal server error".to_string()
        } else {
            self.message.clone()
        };
        data.insert("message".into(), Value::from(message));
        if let Some(field_name) = self.field_name.as_deref().filter(|f| !f.is_empty()) {
            data.insert("fieldName".into(), Value::from(field_name));
        }
        data
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.code == ErrorCode::ServerError {
            log::error!("request failed: {}", self.message);
        }
        (self.status(), Json(Value::Object(self.to_object()))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

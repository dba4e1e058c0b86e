use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use tower_governor::GovernorError;

/// Application-specific error types.
///
/// Every variant maps to one stable error code that is returned to the
/// caller inside the `{success: false, error: {code, message}}` envelope.
#[derive(Debug)]
pub enum AppError {
    /// No bearer credential was presented.
    MissingApiKey,
    /// The identity provider rejected the bearer credential.
    InvalidApiKey(String),
    /// The caller is authenticated but lacks the required role.
    Forbidden(String),
    /// Request payload or parameters failed validation.
    Validation(String),
    /// Resource not found, or not owned by the caller.
    NotFound(String),
    /// Custom table does not exist for the caller.
    TableNotFound(String),
    /// A record id is required for this operation.
    MissingId(String),
    /// A custom table name is required.
    MissingTableName,
    /// The route exists but not for this HTTP method.
    MethodNotAllowed,
    /// Unique constraint violated.
    Conflict(String),
    /// Request body exceeds the configured limit.
    PayloadTooLarge,
    /// The client exhausted its request quota.
    RateLimited,
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Internal server error.
    InternalError(String),
    /// No route matches the request path.
    EndpointNotFound,
    /// The workflow engine failed or answered with a non-success status.
    WorkflowError(String),
    /// The requested workflow has no webhook URL configured.
    WorkflowNotConfigured(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingApiKey => "MISSING_API_KEY",
            AppError::InvalidApiKey(_) => "INVALID_API_KEY",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::TableNotFound(_) => "TABLE_NOT_FOUND",
            AppError::MissingId(_) => "MISSING_ID",
            AppError::MissingTableName => "MISSING_TABLE_NAME",
            AppError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            AppError::Conflict(_) => "CONFLICT",
            AppError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            AppError::RateLimited => "RATE_LIMITED",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
            AppError::EndpointNotFound => "ENDPOINT_NOT_FOUND",
            AppError::WorkflowError(_) => "WORKFLOW_ERROR",
            AppError::WorkflowNotConfigured(_) => "WORKFLOW_NOT_CONFIGURED",
            AppError::WithContext { source, .. } => source.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingApiKey | AppError::InvalidApiKey(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::MissingId(_) | AppError::MissingTableName => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) | AppError::TableNotFound(_) | AppError::EndpointNotFound => {
                StatusCode::NOT_FOUND
            }
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::DatabaseError(_) | AppError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::WorkflowError(_) => StatusCode::BAD_GATEWAY,
            AppError::WorkflowNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::WithContext { source, .. } => source.status(),
        }
    }

    /// Message safe to show to the caller. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::MissingApiKey => "API key required".to_string(),
            AppError::InvalidApiKey(_) => "Invalid API key".to_string(),
            AppError::Forbidden(msg)
            | AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::TableNotFound(msg)
            | AppError::MissingId(msg)
            | AppError::Conflict(msg)
            | AppError::WorkflowNotConfigured(msg) => msg.clone(),
            AppError::MissingTableName => "Table name required".to_string(),
            AppError::MethodNotAllowed => "Method not allowed".to_string(),
            AppError::PayloadTooLarge => "Request body too large".to_string(),
            AppError::RateLimited => "Too many requests".to_string(),
            AppError::DatabaseError(_) => "Database error".to_string(),
            AppError::InternalError(_) => "Internal server error".to_string(),
            AppError::EndpointNotFound => "Endpoint not found".to_string(),
            AppError::WorkflowError(_) => "Workflow engine error".to_string(),
            AppError::WithContext { source, .. } => source.public_message(),
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::MissingApiKey => write!(f, "Missing API key"),
            AppError::InvalidApiKey(msg) => write!(f, "Invalid API key: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::TableNotFound(msg) => write!(f, "Table not found: {}", msg),
            AppError::MissingId(msg) => write!(f, "Missing id: {}", msg),
            AppError::MissingTableName => write!(f, "Missing table name"),
            AppError::MethodNotAllowed => write!(f, "Method not allowed"),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::PayloadTooLarge => write!(f, "Request body too large"),
            AppError::RateLimited => write!(f, "Too many requests"),
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::EndpointNotFound => write!(f, "Endpoint not found"),
            AppError::WorkflowError(msg) => write!(f, "Workflow error: {}", msg),
            AppError::WorkflowNotConfigured(msg) => write!(f, "Workflow not configured: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and the
    /// JSON error envelope. Logs errors according to their severity.
    fn into_response(self) -> Response {
        match &self {
            AppError::DatabaseError(e) => tracing::error!("Database error: {:?}", e),
            AppError::InternalError(msg) => tracing::error!("Internal error: {}", msg),
            AppError::WorkflowError(msg) => tracing::error!("Workflow engine error: {}", msg),
            AppError::InvalidApiKey(msg) => tracing::warn!("Unauthorized access: {}", msg),
            AppError::Forbidden(msg) => tracing::warn!("Forbidden access: {}", msg),
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
            }
            _ => {}
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.public_message(),
            }
        }));

        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    ///
    /// Row-not-found becomes a 404 and unique violations a 409; everything
    /// else is a database error.
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                AppError::Conflict("Resource already exists".to_string())
            }
            _ => AppError::DatabaseError(err),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge;
        }
        AppError::Validation(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(format!("Invalid path parameters: {}", rejection.body_text()))
    }
}

impl From<GovernorError> for AppError {
    fn from(error: GovernorError) -> Self {
        match error {
            GovernorError::TooManyRequests { .. } => AppError::RateLimited,
            GovernorError::UnableToExtractKey => {
                AppError::InternalError("Rate limiter could not identify the client".to_string())
            }
            GovernorError::Other { code, msg, .. } => AppError::InternalError(format!(
                "Rate limiter error {}: {}",
                code,
                msg.unwrap_or_default()
            )),
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::from(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::from(e)),
            context: f(),
        })
    }
}

use std::sync::OnceLock;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::response::Meta;

static EXPOSE_INTERNAL: OnceLock<bool> = OnceLock::new();

/// Whether 5xx responses carry the underlying error text. Set once at startup;
/// defaults to hiding it.
pub fn set_expose_internal_errors(expose: bool) {
    let _ = EXPOSE_INTERNAL.set(expose);
}

fn expose_internal() -> bool {
    EXPOSE_INTERNAL.get().copied().unwrap_or(false)
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("No route for {0}")]
    RouteNotFound(String),

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Conflict {0}")]
    Conflict(String),

    #[error("Upstream error {0}")]
    Upstream(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Body of every error response: `{message, error: {message, code, ...}, meta}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
    pub error: ErrorDetail,
    pub meta: Meta,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::RouteNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::DbError(err) if is_unique_violation_sqlx(err) => StatusCode::CONFLICT,
            AppError::OrmError(err) if is_unique_violation_orm(err) => StatusCode::CONFLICT,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self.status() {
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::UNAUTHORIZED => "unauthorized",
            StatusCode::FORBIDDEN => "forbidden",
            StatusCode::CONFLICT => "conflict",
            StatusCode::BAD_GATEWAY => "upstream_error",
            StatusCode::BAD_REQUEST => match self {
                AppError::Validation(_) => "validation_error",
                _ => "bad_request",
            },
            _ => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Conflict(msg)
            | AppError::Upstream(msg) => msg.clone(),
            AppError::DbError(_) | AppError::OrmError(_)
                if self.status() == StatusCode::CONFLICT =>
            {
                "Resource already exists".to_string()
            }
            AppError::DbError(err) if expose_internal() => format!("Database error: {err}"),
            AppError::OrmError(err) if expose_internal() => format!("ORM error: {err}"),
            AppError::Internal(err) if expose_internal() => format!("Internal Server Error: {err}"),
            _ => self.to_string(),
        }
    }
}

fn is_unique_violation_sqlx(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_unique_violation_orm(err: &sea_orm::DbErr) -> bool {
    matches!(
        err.sql_err(),
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                AppError::DbError(err) => tracing::error!(error = %err, "database error"),
                AppError::OrmError(err) => tracing::error!(error = %err, "orm error"),
                AppError::Internal(err) => tracing::error!(error = ?err, "internal error"),
                _ => {}
            }
        } else if status == StatusCode::BAD_GATEWAY {
            tracing::warn!(error = %self, "upstream call failed");
        }

        let message = self.client_message();
        let (fields, path) = match self {
            AppError::Validation(ref fields) => (fields.clone(), None),
            AppError::RouteNotFound(ref path) => (Vec::new(), Some(path.clone())),
            _ => (Vec::new(), None),
        };

        let body = ErrorBody {
            message: message.clone(),
            error: ErrorDetail {
                message,
                code: self.code().to_string(),
                fields,
                path,
            },
            meta: Meta::empty(),
        };

        (status, axum::Json(body)).into_response()
    }
}

const JSON_DATA_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";
const QUERY_PREFIX: &str = "Failed to deserialize query string: ";

/// Field named in a serde error message, e.g. "missing field `password`"
/// or "email: invalid type: ...".
fn field_from_serde_message(detail: &str) -> Option<String> {
    for marker in ["missing field `", "unknown field `", "duplicate field `"] {
        if let Some(start) = detail.find(marker) {
            let rest = &detail[start + marker.len()..];
            if let Some(end) = rest.find('`') {
                return Some(rest[..end].to_string());
            }
        }
    }
    let (head, _) = detail.split_once(": ")?;
    let is_path = !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
    (is_path && head != ".").then(|| head.to_string())
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => {
                let text = err.body_text();
                let detail = text.strip_prefix(JSON_DATA_PREFIX).unwrap_or(&text);
                let field = field_from_serde_message(detail).unwrap_or_else(|| "body".to_string());
                AppError::Validation(vec![FieldError::new(field, detail)])
            }
            JsonRejection::JsonSyntaxError(_) => {
                AppError::BadRequest("Request body is not valid JSON".to_string())
            }
            JsonRejection::MissingJsonContentType(_) => {
                AppError::BadRequest("Expected `Content-Type: application/json`".to_string())
            }
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        let text = rejection.body_text();
        let detail = text.strip_prefix(QUERY_PREFIX).unwrap_or(&text);
        let field = field_from_serde_message(detail).unwrap_or_else(|| "query".to_string());
        AppError::Validation(vec![FieldError::new(field, detail)])
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status_and_code() {
        assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::NotFound.code(), "not_found");
        assert_eq!(
            AppError::Validation(vec![]).code(),
            "validation_error"
        );
        assert_eq!(AppError::BadRequest("x".into()).code(), "bad_request");
        assert_eq!(
            AppError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(AppError::Upstream("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_hidden_by_default() {
        let err = AppError::Internal(anyhow::anyhow!("connection refused"));
        assert_eq!(err.client_message(), "Internal Server Error");
    }

    #[test]
    fn serde_messages_name_the_field() {
        assert_eq!(
            field_from_serde_message("missing field `password` at line 1 column 17").as_deref(),
            Some("password")
        );
        assert_eq!(
            field_from_serde_message("quantity: invalid type: string \"2\", expected i32").as_deref(),
            Some("quantity")
        );
        assert_eq!(field_from_serde_message("expected value at line 1 column 1"), None);
    }

    #[test]
    fn unknown_route_is_a_not_found() {
        let err = AppError::RouteNotFound("/api/nope".into());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn user_facing_messages_pass_through() {
        let err = AppError::BadRequest("Cart is empty".into());
        assert_eq!(err.client_message(), "Cart is empty");
    }
}

use std::borrow::Cow;

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::SqlErr;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

use crate::response::ErrorResponse;

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Access denied. Admin only.")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn not_found(what: &str) -> Self {
        AppError::NotFound(format!("{what} not found"))
    }

    /// A single-field validation failure, reported like a DTO rule violation.
    pub fn invalid(field: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, ValidationError::new("invalid").with_message(message.into()));
        AppError::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DbError(_) | AppError::OrmError(_)
                if self.is_unique_violation() || self.is_foreign_key_violation() =>
            {
                StatusCode::CONFLICT
            }
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn is_unique_violation(&self) -> bool {
        match self {
            AppError::DbError(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some(PG_UNIQUE_VIOLATION)
            }
            AppError::OrmError(err) => {
                matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
            }
            _ => false,
        }
    }

    fn is_foreign_key_violation(&self) -> bool {
        match self {
            AppError::DbError(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some(PG_FOREIGN_KEY_VIOLATION)
            }
            AppError::OrmError(err) => {
                matches!(err.sql_err(), Some(SqlErr::ForeignKeyConstraintViolation(_)))
            }
            _ => false,
        }
    }
}

/// Well-formed JSON of the wrong shape is a 422; broken syntax is a 400.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(err) => AppError::invalid("body", err.body_text()),
            other => AppError::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, details) = match &self {
            AppError::Validation(errors) => (
                first_message(errors).unwrap_or_else(|| self.to_string()),
                serde_json::to_value(errors).ok(),
            ),
            _ if status == StatusCode::CONFLICT && self.is_foreign_key_violation() => {
                ("Resource is still referenced".to_string(), None)
            }
            _ if status == StatusCode::CONFLICT && !matches!(self, AppError::Conflict(_)) => {
                ("Resource already exists".to_string(), None)
            }
            AppError::DbError(err) => {
                tracing::error!(error = %err, "database error");
                (self.to_string(), None)
            }
            AppError::OrmError(err) => {
                tracing::error!(error = %err, "orm error");
                (self.to_string(), None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
                (self.to_string(), None)
            }
            _ => (self.to_string(), None),
        };

        (status, axum::Json(ErrorResponse::new(message, details))).into_response()
    }
}

fn first_message(errors: &ValidationErrors) -> Option<String> {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|err| err.message.as_ref().map(|m| m.to_string()))
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(AppError::not_found("Order").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::not_found("Order").to_string(), "Order not found");
        assert_eq!(
            AppError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Validation(ValidationErrors::new()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::invalid("quantity", "Quantity must be at least 1").status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::OrmError(sea_orm::DbErr::RecordNotFound("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

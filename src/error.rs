use actix_web::{HttpResponse, ResponseError};
use once_cell::sync::OnceCell;
use serde::Serialize;
use utoipa::ToSchema;

use crate::lifecycle::LifecycleError;
use crate::repo::RepoError;
use crate::storage::ImageStoreError;
use crate::validate::{FieldError, ValidationErrors};

static DEV_MODE: OnceCell<bool> = OnceCell::new();

/// Allow internal error detail in response bodies. Set once at start-up.
pub fn set_dev_mode(enabled: bool) {
    let _ = DEV_MODE.set(enabled);
}

fn dev_mode() -> bool {
    DEV_MODE.get().copied().unwrap_or(false)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    /// Stable machine-readable kind.
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("validation failed")] Validation(ValidationErrors),
    #[error("authentication required")] Unauthenticated,
    #[error("{0}")] Forbidden(String),
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Conflict(String),
    #[error("too many requests")] TooManyRequests,
    #[error("storage error")] Storage(String),
    #[error("image storage error")] Blob(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::TooManyRequests => "too_many_requests",
            ApiError::Storage(_) => "storage_error",
            ApiError::Blob(_) => "blob_error",
        }
    }

    pub fn item_not_found() -> Self {
        ApiError::NotFound("item not found".into())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(e: ValidationErrors) -> Self {
        ApiError::Validation(e)
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::item_not_found(),
            RepoError::Conflict => ApiError::Conflict("item was modified concurrently; retry".into()),
            RepoError::Internal(msg) => ApiError::Storage(msg),
        }
    }
}

impl From<ImageStoreError> for ApiError {
    fn from(e: ImageStoreError) -> Self {
        match e {
            ImageStoreError::NotFound => ApiError::NotFound("image not found".into()),
            other => ApiError::Blob(other.to_string()),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        let msg = e.to_string();
        match e {
            LifecycleError::SelfClaim | LifecycleError::NotOwner => ApiError::Forbidden(msg),
            LifecycleError::AlreadyResolved | LifecycleError::DuplicateClaim | LifecycleError::ClaimRequired => {
                ApiError::Conflict(msg)
            }
            LifecycleError::ClaimNotFound(_) => ApiError::NotFound(msg),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Storage(_) | ApiError::Blob(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (fields, detail) = match self {
            ApiError::Validation(errs) => (Some(errs.0.clone()), None),
            ApiError::Storage(d) | ApiError::Blob(d) => (None, dev_mode().then(|| d.clone())),
            _ => (None, None),
        };
        let message = match self {
            ApiError::Validation(errs) => errs.to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.kind(), message, fields, detail })
    }
}

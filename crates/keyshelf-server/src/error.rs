//! HTTP error types for `KeyShelf` server.
//!
//! Maps domain errors from `keyshelf-core` into appropriate HTTP responses.
//! Every error variant produces a JSON body with a machine-readable `error`
//! field and a human-readable `message`.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use keyshelf_core::{CodecError, VaultError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The operation is disabled by server configuration.
    #[error("{0}")]
    Forbidden(String),
    /// Requested project or key not found.
    #[error("{0}")]
    NotFound(String),
    /// Client sent invalid input.
    #[error("{0}")]
    BadRequest(String),
    /// The write collides with an existing name.
    #[error("{0}")]
    Conflict(String),
    /// Wrong password or corrupted ciphertext.
    #[error("{0}")]
    DecryptionFailed(String),
    /// Upload exceeds the configured limit.
    #[error("{0}")]
    PayloadTooLarge(String),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::DecryptionFailed(msg) => (StatusCode::BAD_REQUEST, "decryption_failed", msg),
            Self::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotFound { .. } => Self::NotFound(err.to_string()),
            VaultError::Validation { .. } | VaultError::Codec(_) => {
                Self::BadRequest(err.to_string())
            }
            VaultError::Conflict { .. } => Self::Conflict(err.to_string()),
            VaultError::Decryption(_) => Self::DecryptionFailed(err.to_string()),
            VaultError::Storage(_) | VaultError::Internal { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<CodecError> for AppError {
    fn from(err: CodecError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

/// Map a framework rejection onto our body, keeping its 413.
fn rejected(status: StatusCode, text: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(text)
    } else {
        AppError::BadRequest(text)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        rejected(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        rejected(err.status(), err.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("upload staging failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyshelf_core::CryptoError;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn vault_errors_map_to_statuses() {
        let cases = [
            (
                VaultError::NotFound {
                    entity: "key",
                    id: 1,
                },
                StatusCode::NOT_FOUND,
            ),
            (
                VaultError::Validation {
                    reason: "bad".to_owned(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                VaultError::Conflict {
                    reason: "taken".to_owned(),
                },
                StatusCode::CONFLICT,
            ),
            (
                VaultError::Decryption(CryptoError::Decryption {
                    reason: "tag mismatch".to_owned(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                VaultError::Internal {
                    reason: "disk".to_owned(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_of(err.into()), status);
        }
    }

    #[test]
    fn decryption_failures_have_their_own_kind() {
        let err: AppError = VaultError::Decryption(CryptoError::InvalidPayload {
            reason: "short".to_owned(),
        })
        .into();
        assert!(matches!(err, AppError::DecryptionFailed(_)));
    }

    #[test]
    fn oversized_rejections_stay_413() {
        let err = rejected(StatusCode::PAYLOAD_TOO_LARGE, "too big".to_owned());
        assert_eq!(status_of(err), StatusCode::PAYLOAD_TOO_LARGE);
        let err = rejected(StatusCode::UNPROCESSABLE_ENTITY, "missing field".to_owned());
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }
}

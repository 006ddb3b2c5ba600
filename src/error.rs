// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::codec::CryptoError;
use crate::storage::StoreError;

/// Failures of registrar, vault and broker operations.
///
/// Everything except [`EscrowError::Crypto`] and [`EscrowError::Storage`] is an
/// expected business outcome; the message names the rule that was violated.
#[derive(Debug, thiserror::Error)]
pub enum EscrowError {
    #[error("username already pending or active: {0}")]
    UsernameConflict(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("credential {0} is not an active credential")]
    CredentialNotFound(u64),

    #[error("identity {0} is not an active identity")]
    IdentityNotFound(String),

    #[error("{actor} is not the uploader of credential {credential_id}")]
    NotAuthorized { actor: String, credential_id: u64 },

    #[error("access request {0} is no longer pending")]
    AlreadyResolved(u64),

    #[error("access request {0} has expired")]
    Expired(u64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("session is unknown or has expired")]
    SessionExpired,

    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

pub type EscrowResult<T> = Result<T, EscrowError>;

// Lets `?` lift raw redb/serde failures straight out of transaction closures.
macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for EscrowError {
                fn from(err: $ty) -> Self {
                    EscrowError::Storage(StoreError::from(err))
                }
            }
        )*
    };
}

storage_error_from!(
    redb::TableError,
    redb::StorageError,
    redb::TransactionError,
    redb::CommitError,
    serde_json::Error,
);

impl EscrowError {
    /// Whether this is a recoverable, caller-facing outcome.
    pub fn is_business(&self) -> bool {
        !matches!(self, EscrowError::Crypto(_) | EscrowError::Storage(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EscrowError::UsernameConflict(_) => "username_conflict",
            EscrowError::NotFound(_) => "not_found",
            EscrowError::CredentialNotFound(_) => "credential_not_found",
            EscrowError::IdentityNotFound(_) => "identity_not_found",
            EscrowError::NotAuthorized { .. } => "not_authorized",
            EscrowError::AlreadyResolved(_) => "already_resolved",
            EscrowError::Expired(_) => "expired",
            EscrowError::InvalidInput(_) => "invalid_input",
            EscrowError::InvalidCredentials => "invalid_credentials",
            EscrowError::SessionExpired => "session_expired",
            EscrowError::Crypto(_) => "crypto_error",
            EscrowError::Storage(_) => "storage_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            EscrowError::UsernameConflict(_) | EscrowError::AlreadyResolved(_) => {
                StatusCode::CONFLICT
            }
            EscrowError::NotFound(_)
            | EscrowError::CredentialNotFound(_)
            | EscrowError::IdentityNotFound(_) => StatusCode::NOT_FOUND,
            EscrowError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
            EscrowError::Expired(_) => StatusCode::GONE,
            EscrowError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EscrowError::InvalidCredentials | EscrowError::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            EscrowError::Crypto(_) | EscrowError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<EscrowError> for ApiError {
    fn from(err: EscrowError) -> Self {
        if err.is_business() {
            return Self::new(err.status(), err.code(), err.to_string());
        }
        // Internal detail stays in the log.
        tracing::error!(error = %err, code = err.code(), "escrow operation failed");
        Self::new(err.status(), err.code(), "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.code,
        });
        (self.status, body).into_response()
    }
}

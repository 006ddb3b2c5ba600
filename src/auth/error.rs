// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug)]
pub enum AuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Session token unknown, logged out or past its lifetime
    SessionExpired,
    /// `x-moderator` or `x-moderator-key` missing
    MissingModeratorHeaders,
    /// Console key did not verify
    InvalidModeratorKey,
    /// No `MODERATOR_KEY_HASH` configured
    ConsoleDisabled,
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::SessionExpired => "session_expired",
            AuthError::MissingModeratorHeaders => "missing_moderator_headers",
            AuthError::InvalidModeratorKey => "invalid_moderator_key",
            AuthError::ConsoleDisabled => "console_disabled",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::SessionExpired
            | AuthError::MissingModeratorHeaders
            | AuthError::InvalidModeratorKey => StatusCode::UNAUTHORIZED,
            AuthError::ConsoleDisabled => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::SessionExpired => write!(f, "Session is unknown or has expired"),
            AuthError::MissingModeratorHeaders => {
                write!(f, "x-moderator and x-moderator-key headers are required")
            }
            AuthError::InvalidModeratorKey => write!(f, "Moderator key is invalid"),
            AuthError::ConsoleDisabled => write!(f, "Moderator console is not configured"),
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_errors_map_to_statuses() {
        assert_eq!(
            AuthError::InvalidModeratorKey.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::ConsoleDisabled.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(AuthError::SessionExpired.error_code(), "session_expired");
    }
}

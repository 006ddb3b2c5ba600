// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for members and moderators.
//!
//! ```rust,ignore
//! async fn upload(Member(session): Member) -> impl IntoResponse {
//!     // session.username is the logged-in member
//! }
//!
//! async fn approve(Moderator(name): Moderator) -> impl IntoResponse {
//!     // name comes from x-moderator, after x-moderator-key verified
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::{error, warn};

use super::AuthError;
use crate::error::EscrowError;
use crate::state::AppState;
use crate::storage::Session;
use crate::validation::normalize_label;

/// Names the moderator acting through the console.
pub const MODERATOR_HEADER: &str = "x-moderator";
/// Console key, verified against `MODERATOR_KEY_HASH`.
pub const MODERATOR_KEY_HEADER: &str = "x-moderator-key";

/// A logged-in member, resolved from `Authorization: Bearer <session token>`.
pub struct Member(pub Session);

impl FromRequestParts<AppState> for Member {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;

        match state.registrar.resolve_session(token) {
            Ok(session) => Ok(Member(session)),
            Err(EscrowError::SessionExpired) => Err(AuthError::SessionExpired),
            Err(e) => {
                error!(error = %e, "Session lookup failed");
                Err(AuthError::InternalError("session lookup failed".into()))
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidAuthHeader)
}

/// A moderator authenticated with the console key.
///
/// The core trusts this name as the actor of approve/reject decisions.
pub struct Moderator(pub String);

impl FromRequestParts<AppState> for Moderator {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let digest = state
            .moderator_key_hash
            .clone()
            .ok_or(AuthError::ConsoleDisabled)?;

        let name = header_str(&parts.headers, MODERATOR_HEADER)?;
        let key = header_str(&parts.headers, MODERATOR_KEY_HEADER)?.to_string();
        let name = normalize_label(MODERATOR_HEADER, name)
            .map_err(|_| AuthError::MissingModeratorHeaders)?;

        // PBKDF2 runs on the blocking pool.
        let codec = state.codec.clone();
        let verified = tokio::task::spawn_blocking(move || codec.verify(&key, &digest))
            .await
            .map_err(|e| AuthError::InternalError(e.to_string()))?;

        match verified {
            Ok(true) => Ok(Moderator(name)),
            Ok(false) => {
                warn!(moderator = %name, "Console key rejected");
                if let Err(e) = state
                    .registrar
                    .record_auth_failure(&name, "bad moderator key")
                {
                    warn!(error = %e, "Failed to audit console login");
                }
                Err(AuthError::InvalidModeratorKey)
            }
            Err(e) => {
                error!(error = %e, "MODERATOR_KEY_HASH is not a valid digest");
                Err(AuthError::InternalError("console key check failed".into()))
            }
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AuthError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingModeratorHeaders)
}

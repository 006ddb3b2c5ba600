// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rows persisted in the escrow database.
//!
//! Field names follow the persisted layout (`users`, `pending_users`,
//! `pending_game_accounts`, `game_accounts`, `access_requests`,
//! `access_grants`). Secret columns are crate-private and omitted from
//! `Debug` output; callers outside the crate only ever see ids, names and
//! timestamps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A membership identity awaiting moderator approval.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingIdentity {
    pub id: u64,
    pub username: String,
    pub(crate) passhash: String,
    /// Chat handle of whoever submitted the registration.
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

/// An approved member.
#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub username: String,
    pub(crate) passhash: String,
    pub created_at: DateTime<Utc>,
}

/// An uploaded shared-account credential awaiting moderator approval.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingCredential {
    pub id: u64,
    pub uploader_username: String,
    pub game: String,
    pub(crate) game_username_hash: String,
    pub(crate) game_username_seal: String,
    pub(crate) game_password_seal: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

/// A vaulted shared-account credential.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: u64,
    pub uploader_username: String,
    pub game: String,
    pub(crate) game_username_hash: String,
    pub(crate) game_username_seal: String,
    pub(crate) game_password_seal: String,
    pub created_at: DateTime<Utc>,
}

impl PendingCredential {
    /// The active row this pending upload becomes once approved.
    pub(crate) fn into_credential(self, id: u64, created_at: DateTime<Utc>) -> Credential {
        Credential {
            id,
            uploader_username: self.uploader_username,
            game: self.game,
            game_username_hash: self.game_username_hash,
            game_username_seal: self.game_username_seal,
            game_password_seal: self.game_password_seal,
            created_at,
        }
    }
}

impl PendingIdentity {
    pub(crate) fn into_identity(self, id: u64, created_at: DateTime<Utc>) -> Identity {
        Identity {
            id,
            username: self.username,
            passhash: self.passhash,
            created_at,
        }
    }
}

macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* }) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    .finish_non_exhaustive()
            }
        }
    };
}

redacted_debug!(PendingIdentity { id, username, requested_by, created_at });
redacted_debug!(Identity { id, username, created_at });
redacted_debug!(PendingCredential { id, uploader_username, game, requested_by, created_at });
redacted_debug!(Credential { id, uploader_username, game, created_at });

/// Lifecycle of an access request. Only `Pending` is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    Pending,
    Confirmed,
    Denied,
    Expired,
}

impl AccessStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AccessStatus::Pending)
    }
}

/// A member's ask to receive a vaulted credential.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AccessRequest {
    pub id: u64,
    /// Credential being requested.
    #[serde(rename = "account_id")]
    pub credential_id: u64,
    /// Identity that will receive the credential.
    #[serde(rename = "username")]
    pub requester_username: String,
    /// Identity that filed the request.
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    /// After this instant the request can no longer be confirmed.
    pub expires_at: DateTime<Utc>,
    pub status: AccessStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

impl AccessRequest {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Move to a terminal state. Callers must have checked `status` first.
    pub(crate) fn resolve(&mut self, status: AccessStatus, by: Option<&str>, at: DateTime<Utc>) {
        debug_assert!(!self.status.is_terminal());
        self.status = status;
        self.resolved_at = Some(at);
        self.resolved_by = by.map(str::to_string);
    }
}

/// Immutable record that an access request was confirmed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AccessGrant {
    pub id: u64,
    #[serde(rename = "account_id")]
    pub credential_id: u64,
    /// Grantee.
    pub username: String,
    /// Uploader who confirmed.
    pub granted_by: String,
    /// Confirmed request this grant materialized from.
    pub request_id: u64,
    pub created_at: DateTime<Utc>,
}

/// A member login session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Registrar
//!
//! Moves membership identities from `pending_users` to `users`.
//!
//! Username uniqueness holds across the union of pending and active rows:
//! both name indexes are checked in the same write transaction that inserts,
//! and `approve` re-checks the active index before moving the row.
//!
//! Approved members can open short-lived sessions with their password;
//! sessions are how the HTTP surface knows who is uploading, requesting or
//! confirming.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::codec::SecretCodec;
use crate::error::{EscrowError, EscrowResult};
use crate::moderation::{apply_decisions, DecisionOutcome};
use crate::storage::audit::{self, AuditEvent, AuditEventType};
use crate::storage::database::{
    all_rows, get_row, next_id, put_row, take_row, EscrowDb, PENDING_USERS, PENDING_USER_NAMES,
    SESSIONS, USERS, USER_NAMES,
};
use crate::storage::{Identity, PendingIdentity, Session};
use crate::throttle::{FailureThrottle, DEFAULT_THROTTLE_CAPACITY};
use crate::validation::{check_secret, normalize_label, normalize_username};

/// Default lifetime of a member session.
pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(2);

#[derive(Clone)]
pub struct IdentityRegistrar {
    db: Arc<EscrowDb>,
    codec: Arc<SecretCodec>,
    session_ttl: Duration,
    auth_failures: Arc<FailureThrottle>,
}

impl IdentityRegistrar {
    pub fn new(db: Arc<EscrowDb>, codec: Arc<SecretCodec>) -> Self {
        Self {
            db,
            codec,
            session_ttl: DEFAULT_SESSION_TTL,
            auth_failures: Arc::new(FailureThrottle::default()),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Minimum spacing between audited auth failures for one name.
    pub fn with_failure_window(mut self, window: StdDuration) -> Self {
        self.auth_failures = Arc::new(FailureThrottle::new(DEFAULT_THROTTLE_CAPACITY, window));
        self
    }

    // =========================================================================
    // Promotion pipeline
    // =========================================================================

    /// Stage a registration. Only the password digest is stored.
    pub fn submit(
        &self,
        username: &str,
        secret: &str,
        requested_by: &str,
    ) -> EscrowResult<PendingIdentity> {
        let username = normalize_username(username)?;
        check_secret("password", secret)?;
        let requested_by = normalize_label("requested_by", requested_by)?;
        // Hash before taking the write lock.
        let passhash = self.codec.hash(secret)?;

        let pending = self.db.write(|txn| -> EscrowResult<PendingIdentity> {
            ensure_username_free(txn, &username)?;

            let id = next_id(txn, "pending_users")?;
            let pending = PendingIdentity {
                id,
                username,
                passhash,
                requested_by,
                created_at: Utc::now(),
            };
            {
                let mut rows = txn.open_table(PENDING_USERS)?;
                put_row(&mut rows, id, &pending)?;
                let mut names = txn.open_table(PENDING_USER_NAMES)?;
                names.insert(pending.username.as_str(), id)?;
            }

            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::IdentitySubmitted)
                    .with_actor(pending.requested_by.as_str())
                    .with_resource("pending_identity", id)
                    .with_details(json!({ "username": pending.username })),
            )?;
            Ok(pending)
        })?;

        info!(
            pending_id = pending.id,
            username = %pending.username,
            "Identity registration submitted"
        );
        Ok(pending)
    }

    /// Atomically move a pending identity into `users`.
    ///
    /// A second approval of the same id fails with `NotFound`.
    pub fn approve(&self, pending_id: u64, moderator: &str) -> EscrowResult<Identity> {
        let identity = self.db.write(|txn| -> EscrowResult<Identity> {
            let pending: PendingIdentity = {
                let mut rows = txn.open_table(PENDING_USERS)?;
                take_row(&mut rows, pending_id)?.ok_or_else(|| {
                    EscrowError::NotFound(format!("pending identity {pending_id}"))
                })?
            };
            {
                let mut names = txn.open_table(PENDING_USER_NAMES)?;
                names.remove(pending.username.as_str())?;
            }
            {
                let names = txn.open_table(USER_NAMES)?;
                if names.get(pending.username.as_str())?.is_some() {
                    return Err(EscrowError::UsernameConflict(pending.username));
                }
            }

            let id = next_id(txn, "users")?;
            let identity = pending.into_identity(id, Utc::now());
            {
                let mut rows = txn.open_table(USERS)?;
                put_row(&mut rows, id, &identity)?;
                let mut names = txn.open_table(USER_NAMES)?;
                names.insert(identity.username.as_str(), id)?;
            }

            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::IdentityApproved)
                    .with_actor(moderator)
                    .with_resource("identity", id)
                    .with_details(json!({
                        "pending_id": pending_id,
                        "username": identity.username,
                    })),
            )?;
            Ok(identity)
        })?;

        info!(
            pending_id,
            identity_id = identity.id,
            username = %identity.username,
            moderator,
            "Identity approved"
        );
        Ok(identity)
    }

    /// Delete a pending identity.
    pub fn reject(&self, pending_id: u64, moderator: &str) -> EscrowResult<()> {
        let username = self.db.write(|txn| -> EscrowResult<String> {
            let pending: PendingIdentity = {
                let mut rows = txn.open_table(PENDING_USERS)?;
                take_row(&mut rows, pending_id)?.ok_or_else(|| {
                    EscrowError::NotFound(format!("pending identity {pending_id}"))
                })?
            };
            {
                let mut names = txn.open_table(PENDING_USER_NAMES)?;
                names.remove(pending.username.as_str())?;
            }

            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::IdentityRejected)
                    .with_actor(moderator)
                    .with_resource("pending_identity", pending_id)
                    .with_details(json!({ "username": pending.username })),
            )?;
            Ok(pending.username)
        })?;

        info!(pending_id, username = %username, moderator, "Identity rejected");
        Ok(())
    }

    /// Approve and reject a batch of pending identities.
    pub fn decide(
        &self,
        approve_ids: &[u64],
        reject_ids: &[u64],
        moderator: &str,
    ) -> EscrowResult<Vec<DecisionOutcome>> {
        apply_decisions(
            approve_ids,
            reject_ids,
            |id| self.approve(id, moderator).map(|_| ()),
            |id| self.reject(id, moderator),
        )
    }

    /// Pending identities, oldest first.
    pub fn list_pending(&self) -> EscrowResult<Vec<PendingIdentity>> {
        let mut rows: Vec<PendingIdentity> = self
            .db
            .read(|txn| -> EscrowResult<_> { Ok(all_rows(&txn.open_table(PENDING_USERS)?)?) })?;
        rows.sort_by_key(|row| (row.created_at, row.id));
        Ok(rows)
    }

    /// Look up an active identity by username.
    pub fn get_identity(&self, username: &str) -> EscrowResult<Identity> {
        let username = normalize_username(username)?;
        self.db.read(|txn| -> EscrowResult<Identity> {
            let names = txn.open_table(USER_NAMES)?;
            let id = names
                .get(username.as_str())?
                .map(|v| v.value())
                .ok_or_else(|| EscrowError::IdentityNotFound(username.clone()))?;
            get_row(&txn.open_table(USERS)?, id)?
                .ok_or_else(|| EscrowError::IdentityNotFound(username.clone()))
        })
    }

    // =========================================================================
    // Authentication & sessions
    // =========================================================================

    /// Check a member's password. Unknown names and wrong passwords are
    /// indistinguishable to the caller.
    pub fn authenticate(&self, username: &str, secret: &str) -> EscrowResult<Identity> {
        let identity = match self.get_identity(username) {
            Ok(identity) => identity,
            Err(EscrowError::IdentityNotFound(_)) | Err(EscrowError::InvalidInput(_)) => {
                self.codec.verify_absent(secret);
                return Err(EscrowError::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };
        if self.codec.verify(secret, &identity.passhash)? {
            Ok(identity)
        } else {
            Err(EscrowError::InvalidCredentials)
        }
    }

    /// Log a member in.
    pub fn open_session(&self, username: &str, secret: &str) -> EscrowResult<Session> {
        let identity = match self.authenticate(username, secret) {
            Ok(identity) => identity,
            Err(EscrowError::InvalidCredentials) => {
                warn!(username, "Login rejected");
                self.record_auth_failure(username, "invalid username or password")?;
                return Err(EscrowError::InvalidCredentials);
            }
            Err(err) => return Err(err),
        };

        let now = Utc::now();
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            username: identity.username,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        self.db.write(|txn| -> EscrowResult<()> {
            {
                let mut sessions = txn.open_table(SESSIONS)?;
                let json = serde_json::to_vec(&session)?;
                sessions.insert(session.token.as_str(), json.as_slice())?;
            }
            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::SessionOpened)
                    .with_actor(session.username.as_str()),
            )?;
            Ok(())
        })?;

        info!(username = %session.username, "Session opened");
        Ok(session)
    }

    /// Audit a failed login or console key check.
    ///
    /// At most one row per name and throttle window is written; the row
    /// carries how many failures were skipped before it.
    pub fn record_auth_failure(&self, actor: &str, reason: &str) -> EscrowResult<()> {
        let Some(suppressed) = self.auth_failures.admit(actor) else {
            debug!(actor, "Auth failure not audited (throttled)");
            return Ok(());
        };
        self.db.write(|txn| -> EscrowResult<()> {
            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::AuthFailure)
                    .with_actor(actor)
                    .with_details(json!({ "suppressed": suppressed }))
                    .failed(reason),
            )?;
            Ok(())
        })
    }

    /// Resolve a bearer token to a live session.
    pub fn resolve_session(&self, token: &str) -> EscrowResult<Session> {
        let session = self.db.read(|txn| -> EscrowResult<Option<Session>> {
            let sessions = txn.open_table(SESSIONS)?;
            match sessions.get(token)? {
                Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
                None => Ok(None),
            }
        })?;

        match session {
            Some(session) if session.expires_at > Utc::now() => Ok(session),
            Some(_) => {
                self.close_session(token)?;
                Err(EscrowError::SessionExpired)
            }
            None => Err(EscrowError::SessionExpired),
        }
    }

    /// Log out. Unknown tokens are ignored.
    pub fn close_session(&self, token: &str) -> EscrowResult<()> {
        self.db.write(|txn| -> EscrowResult<()> {
            let mut sessions = txn.open_table(SESSIONS)?;
            sessions.remove(token)?;
            Ok(())
        })
    }

    /// Drop every session that expired before `now`.
    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> EscrowResult<usize> {
        self.db.write(|txn| -> EscrowResult<usize> {
            let mut sessions = txn.open_table(SESSIONS)?;
            let mut expired = Vec::new();
            for entry in sessions.iter()? {
                let (token, value) = entry?;
                let session: Session = serde_json::from_slice(value.value())?;
                if session.expires_at <= now {
                    expired.push(token.value().to_string());
                }
            }
            for token in &expired {
                sessions.remove(token.as_str())?;
            }
            Ok(expired.len())
        })
    }
}

/// Fail with `UsernameConflict` if the name is pending or active.
fn ensure_username_free(txn: &WriteTransaction, username: &str) -> EscrowResult<()> {
    let active = txn.open_table(USER_NAMES)?;
    let pending = txn.open_table(PENDING_USER_NAMES)?;
    if active.get(username)?.is_some() || pending.get(username)?.is_some() {
        return Err(EscrowError::UsernameConflict(username.to_string()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_registrar() -> IdentityRegistrar {
    IdentityRegistrar::new(
        Arc::new(EscrowDb::in_memory().expect("in-memory db")),
        Arc::new(crate::codec::test_codec()),
    )
}

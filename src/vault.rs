// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Credential Vault
//!
//! Moves uploaded shared-account credentials from `pending_game_accounts`
//! to `game_accounts`. The game username is stored as a digest (for
//! matching) and a seal (for disclosure); the game password only as a seal.
//!
//! Nothing returned across the crate boundary carries those columns: the
//! record types keep them crate-private and [`CredentialView`] omits them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::ToSchema;

use crate::codec::SecretCodec;
use crate::error::{EscrowError, EscrowResult};
use crate::moderation::{apply_decisions, DecisionOutcome};
use crate::storage::audit::{self, AuditEvent, AuditEventType};
use crate::storage::database::{
    all_rows, get_row, next_id, put_row, take_row, EscrowDb, GAME_ACCOUNTS,
    PENDING_GAME_ACCOUNTS, USER_NAMES,
};
use crate::storage::{Credential, PendingCredential};
use crate::validation::{check_secret, normalize_label, normalize_username};

/// Secret-free view of a vaulted or pending credential.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CredentialView {
    pub id: u64,
    pub uploader_username: String,
    pub game: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Credential> for CredentialView {
    fn from(row: &Credential) -> Self {
        Self {
            id: row.id,
            uploader_username: row.uploader_username.clone(),
            game: row.game.clone(),
            created_at: row.created_at,
        }
    }
}

impl From<&PendingCredential> for CredentialView {
    fn from(row: &PendingCredential) -> Self {
        Self {
            id: row.id,
            uploader_username: row.uploader_username.clone(),
            game: row.game.clone(),
            created_at: row.created_at,
        }
    }
}

#[derive(Clone)]
pub struct CredentialVault {
    db: Arc<EscrowDb>,
    codec: Arc<SecretCodec>,
}

impl CredentialVault {
    pub fn new(db: Arc<EscrowDb>, codec: Arc<SecretCodec>) -> Self {
        Self { db, codec }
    }

    /// Stage an upload. The uploader must be an active identity.
    pub fn submit(
        &self,
        uploader: &str,
        game: &str,
        game_username: &str,
        game_password: &str,
        requested_by: &str,
    ) -> EscrowResult<PendingCredential> {
        let uploader = normalize_username(uploader)?;
        let game = normalize_label("game", game)?;
        let requested_by = normalize_label("requested_by", requested_by)?;
        check_secret("game_username", game_username)?;
        check_secret("game_password", game_password)?;

        let game_username_hash = self.codec.hash(game_username)?;
        let game_username_seal = self.codec.seal(game_username)?;
        let game_password_seal = self.codec.seal(game_password)?;

        let pending = self.db.write(|txn| -> EscrowResult<PendingCredential> {
            {
                let names = txn.open_table(USER_NAMES)?;
                if names.get(uploader.as_str())?.is_none() {
                    return Err(EscrowError::IdentityNotFound(uploader));
                }
            }

            let id = next_id(txn, "pending_game_accounts")?;
            let pending = PendingCredential {
                id,
                uploader_username: uploader,
                game,
                game_username_hash,
                game_username_seal,
                game_password_seal,
                requested_by,
                created_at: Utc::now(),
            };
            {
                let mut rows = txn.open_table(PENDING_GAME_ACCOUNTS)?;
                put_row(&mut rows, id, &pending)?;
            }

            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::CredentialSubmitted)
                    .with_actor(pending.uploader_username.as_str())
                    .with_resource("pending_credential", id)
                    .with_details(json!({ "game": pending.game })),
            )?;
            Ok(pending)
        })?;

        info!(
            pending_id = pending.id,
            uploader = %pending.uploader_username,
            game = %pending.game,
            "Credential upload submitted"
        );
        Ok(pending)
    }

    /// Atomically move a pending upload into `game_accounts`.
    pub fn approve(&self, pending_id: u64, moderator: &str) -> EscrowResult<Credential> {
        let credential = self.db.write(|txn| -> EscrowResult<Credential> {
            let pending: PendingCredential = {
                let mut rows = txn.open_table(PENDING_GAME_ACCOUNTS)?;
                take_row(&mut rows, pending_id)?.ok_or_else(|| {
                    EscrowError::NotFound(format!("pending credential {pending_id}"))
                })?
            };

            let id = next_id(txn, "game_accounts")?;
            let credential = pending.into_credential(id, Utc::now());
            {
                let mut rows = txn.open_table(GAME_ACCOUNTS)?;
                put_row(&mut rows, id, &credential)?;
            }

            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::CredentialApproved)
                    .with_actor(moderator)
                    .with_resource("credential", id)
                    .with_details(json!({
                        "pending_id": pending_id,
                        "uploader": credential.uploader_username,
                        "game": credential.game,
                    })),
            )?;
            Ok(credential)
        })?;

        info!(
            pending_id,
            credential_id = credential.id,
            uploader = %credential.uploader_username,
            moderator,
            "Credential approved"
        );
        Ok(credential)
    }

    pub fn reject(&self, pending_id: u64, moderator: &str) -> EscrowResult<()> {
        self.db.write(|txn| -> EscrowResult<()> {
            let pending: PendingCredential = {
                let mut rows = txn.open_table(PENDING_GAME_ACCOUNTS)?;
                take_row(&mut rows, pending_id)?.ok_or_else(|| {
                    EscrowError::NotFound(format!("pending credential {pending_id}"))
                })?
            };

            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::CredentialRejected)
                    .with_actor(moderator)
                    .with_resource("pending_credential", pending_id)
                    .with_details(json!({
                        "uploader": pending.uploader_username,
                        "game": pending.game,
                    })),
            )?;
            Ok(())
        })?;

        info!(pending_id, moderator, "Credential rejected");
        Ok(())
    }

    /// Approve and reject a batch of pending uploads.
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

    /// Pending uploads, oldest first.
    pub fn list_pending(&self) -> EscrowResult<Vec<PendingCredential>> {
        let mut rows: Vec<PendingCredential> = self.db.read(|txn| -> EscrowResult<_> {
            Ok(all_rows(&txn.open_table(PENDING_GAME_ACCOUNTS)?)?)
        })?;
        rows.sort_by_key(|row| (row.created_at, row.id));
        Ok(rows)
    }

    pub fn get(&self, credential_id: u64) -> EscrowResult<CredentialView> {
        self.db.read(|txn| -> EscrowResult<CredentialView> {
            let row: Option<Credential> = get_row(&txn.open_table(GAME_ACCOUNTS)?, credential_id)?;
            row.as_ref()
                .map(CredentialView::from)
                .ok_or(EscrowError::CredentialNotFound(credential_id))
        })
    }

    /// Active credentials vaulted by `username`.
    pub fn list_by_uploader(&self, username: &str) -> EscrowResult<Vec<CredentialView>> {
        let username = normalize_username(username)?;
        let rows: Vec<Credential> = self
            .db
            .read(|txn| -> EscrowResult<_> { Ok(all_rows(&txn.open_table(GAME_ACCOUNTS)?)?) })?;
        Ok(rows
            .iter()
            .filter(|row| row.uploader_username == username)
            .map(CredentialView::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn submit_seals_password_and_hashes_username() {
        let fx = Fixture::new();
        fx.member("alice");

        let pending = fx
            .vault
            .submit("alice", "Lumen", "lu1", "p@ss", "discord:alice")
            .unwrap();

        assert_eq!(pending.uploader_username, "alice");
        assert!(fx.codec.verify("lu1", &pending.game_username_hash).unwrap());
        assert_eq!(fx.codec.unseal(&pending.game_password_seal).unwrap(), "p@ss");
        assert_eq!(fx.codec.unseal(&pending.game_username_seal).unwrap(), "lu1");
        assert!(!pending.game_password_seal.contains("p@ss"));
    }

    #[test]
    fn uploader_must_be_active() {
        let fx = Fixture::new();
        let err = fx
            .vault
            .submit("ghost", "Lumen", "lu1", "p@ss", "discord:ghost")
            .unwrap_err();
        assert!(matches!(err, EscrowError::IdentityNotFound(ref name) if name == "ghost"));
    }

    #[test]
    fn approve_moves_row_once() {
        let fx = Fixture::new();
        fx.member("alice");
        let pending = fx
            .vault
            .submit("alice", "Lumen", "lu1", "p@ss", "discord:alice")
            .unwrap();

        let credential = fx.vault.approve(pending.id, "mod").unwrap();
        assert_eq!(credential.uploader_username, "alice");
        assert_eq!(credential.game_password_seal, pending.game_password_seal);
        assert!(fx.vault.list_pending().unwrap().is_empty());

        let view = fx.vault.get(credential.id).unwrap();
        assert_eq!(view.game, "Lumen");

        assert!(matches!(
            fx.vault.approve(pending.id, "mod"),
            Err(EscrowError::NotFound(_))
        ));
    }

    #[test]
    fn reject_deletes_pending_row() {
        let fx = Fixture::new();
        fx.member("alice");
        let pending = fx
            .vault
            .submit("alice", "Lumen", "lu1", "p@ss", "discord:alice")
            .unwrap();

        fx.vault.reject(pending.id, "mod").unwrap();
        assert!(fx.vault.list_pending().unwrap().is_empty());
        assert!(matches!(
            fx.vault.reject(pending.id, "mod"),
            Err(EscrowError::NotFound(_))
        ));
    }

    #[test]
    fn unknown_credential_is_not_found() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.vault.get(42),
            Err(EscrowError::CredentialNotFound(42))
        ));
    }

    #[test]
    fn list_by_uploader_filters_and_hides_secrets() {
        let fx = Fixture::new();
        fx.member("alice");
        fx.member("bob");
        fx.credential("alice", "Lumen", "lu1", "p@ss");
        fx.credential("alice", "Orbit", "or1", "hunter2");
        fx.credential("bob", "Lumen", "lu2", "pw");

        let mine = fx.vault.list_by_uploader("alice").unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|c| c.uploader_username == "alice"));

        let json = serde_json::to_string(&mine).unwrap();
        assert!(!json.contains("seal"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn decide_applies_each_id() {
        let fx = Fixture::new();
        fx.member("alice");
        let a = fx
            .vault
            .submit("alice", "Lumen", "lu1", "p@ss", "discord:alice")
            .unwrap();
        let b = fx
            .vault
            .submit("alice", "Orbit", "or1", "pw", "discord:alice")
            .unwrap();

        let outcomes = fx.vault.decide(&[a.id], &[b.id, b.id], "mod").unwrap();
        assert!(outcomes[0].applied);
        assert!(outcomes[1].applied);
        assert!(!outcomes[2].applied);
        assert_eq!(fx.vault.list_by_uploader("alice").unwrap().len(), 1);
    }
}

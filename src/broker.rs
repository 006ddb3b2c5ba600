// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Access Broker
//!
//! The request → confirm → grant state machine deciding who may currently
//! retrieve a vaulted credential.
//!
//! ```text
//!                request_access               confirm
//! [no row] ───────────────────▶ Pending ───────────────▶ Confirmed ──▶ grant
//!                                  │  deny
//!                                  ├────────────▶ Denied
//!                                  │  deadline passes
//!                                  └────────────▶ Expired
//! ```
//!
//! Every transition is one write transaction that re-reads the request and
//! checks its status before writing, so transitions on one request are
//! totally ordered and a request yields at most one grant. Gateway calls
//! happen only after commit; their outcome travels back in [`Notified`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::codec::SecretCodec;
use crate::error::{EscrowError, EscrowResult};
use crate::notify::{ConfirmationPrompt, DeliveryStatus, Disclosure, NotificationGateway};
use crate::storage::audit::{self, AuditEvent, AuditEventType};
use crate::storage::database::{
    all_rows, get_row, next_id, put_row, EscrowDb, ACCESS_GRANTS, ACCESS_REQUESTS, GAME_ACCOUNTS,
    GRANTS_BY_REQUEST, PENDING_ACCESS, USER_NAMES,
};
use crate::storage::{AccessGrant, AccessRequest, AccessStatus, Credential};
use crate::validation::{normalize_label, normalize_username};

/// Default time an uploader has to answer a request.
pub const DEFAULT_REQUEST_TTL: Duration = Duration::hours(24);

/// A committed result plus the outcome of the notification that followed it.
#[derive(Debug, Clone)]
pub struct Notified<T> {
    pub value: T,
    pub delivery: DeliveryStatus,
}

/// A grant joined with the credential it unlocks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct GrantView {
    pub grant_id: u64,
    pub request_id: u64,
    pub credential_id: u64,
    pub game: String,
    pub uploader_username: String,
    pub granted_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AccessBroker {
    db: Arc<EscrowDb>,
    codec: Arc<SecretCodec>,
    gateway: Arc<dyn NotificationGateway>,
    request_ttl: Duration,
}

// What a confirm transaction committed.
enum ConfirmStep {
    Granted(AccessGrant, Disclosure),
    Lapsed,
}

impl AccessBroker {
    pub fn new(
        db: Arc<EscrowDb>,
        codec: Arc<SecretCodec>,
        gateway: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            db,
            codec,
            gateway,
            request_ttl: DEFAULT_REQUEST_TTL,
        }
    }

    pub fn with_request_ttl(mut self, ttl: Duration) -> Self {
        self.request_ttl = ttl;
        self
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Open a Pending request and prompt the credential's uploader.
    ///
    /// Both the credential and the requester must be active.
    pub async fn request_access(
        &self,
        credential_id: u64,
        requester: &str,
        requested_by: &str,
    ) -> EscrowResult<Notified<AccessRequest>> {
        let requester = normalize_username(requester)?;
        let requested_by = normalize_label("requested_by", requested_by)?;

        let (request, prompt) = self.db.write(
            |txn| -> EscrowResult<(AccessRequest, ConfirmationPrompt)> {
                let credential = load_credential(txn, credential_id)?;
                {
                    let names = txn.open_table(USER_NAMES)?;
                    if names.get(requester.as_str())?.is_none() {
                        return Err(EscrowError::IdentityNotFound(requester));
                    }
                }

                let id = next_id(txn, "access_requests")?;
                let now = Utc::now();
                let request = AccessRequest {
                    id,
                    credential_id,
                    requester_username: requester,
                    requested_by,
                    created_at: now,
                    expires_at: now + self.request_ttl,
                    status: AccessStatus::Pending,
                    resolved_at: None,
                    resolved_by: None,
                };
                {
                    let mut rows = txn.open_table(ACCESS_REQUESTS)?;
                    put_row(&mut rows, id, &request)?;
                    let mut pending = txn.open_table(PENDING_ACCESS)?;
                    pending.insert(id, request.expires_at.timestamp())?;
                }

                audit::append(
                    txn,
                    &AuditEvent::new(AuditEventType::AccessRequested)
                        .with_actor(request.requested_by.as_str())
                        .with_resource("access_request", id)
                        .with_details(json!({
                            "credential_id": credential_id,
                            "requester": request.requester_username,
                        })),
                )?;

                let prompt = ConfirmationPrompt {
                    correlation_id: id,
                    recipient: credential.uploader_username,
                    requester: request.requester_username.clone(),
                    credential_id,
                    game: credential.game,
                    expires_at: request.expires_at,
                };
                Ok((request, prompt))
            },
        )?;

        info!(
            request_id = request.id,
            credential_id,
            requester = %request.requester_username,
            uploader = %prompt.recipient,
            "Access requested"
        );

        let delivery =
            DeliveryStatus::from_result(self.gateway.request_confirmation(&prompt).await);
        Ok(Notified {
            value: request,
            delivery,
        })
    }

    /// The uploader approves a request: grant it and disclose the credential
    /// to the requester.
    ///
    /// A Pending request found past its deadline is committed as Expired and
    /// the call fails with `Expired`. An unseal failure aborts the whole
    /// transition.
    pub async fn confirm(
        &self,
        request_id: u64,
        confirming: &str,
    ) -> EscrowResult<Notified<AccessGrant>> {
        let confirming = normalize_username(confirming)?;

        let step = self.db.write(|txn| -> EscrowResult<ConfirmStep> {
            let mut request = load_request(txn, request_id)?;
            let credential = load_credential(txn, request.credential_id)?;
            ensure_uploader(&credential, &confirming)?;
            ensure_pending(&request)?;

            let now = Utc::now();
            if request.is_due(now) {
                mark_expired(txn, &mut request, now)?;
                return Ok(ConfirmStep::Lapsed);
            }

            {
                let grants = txn.open_table(GRANTS_BY_REQUEST)?;
                if grants.get(request_id)?.is_some() {
                    return Err(EscrowError::AlreadyResolved(request_id));
                }
            }

            let disclosure = Disclosure {
                correlation_id: request_id,
                recipient: request.requester_username.clone(),
                game: credential.game.clone(),
                game_username: self.codec.unseal(&credential.game_username_seal)?,
                game_password: self.codec.unseal(&credential.game_password_seal)?,
            };

            request.resolve(AccessStatus::Confirmed, Some(&confirming), now);
            {
                let mut rows = txn.open_table(ACCESS_REQUESTS)?;
                put_row(&mut rows, request_id, &request)?;
                let mut pending = txn.open_table(PENDING_ACCESS)?;
                pending.remove(request_id)?;
            }

            let grant_id = next_id(txn, "access_grants")?;
            let grant = AccessGrant {
                id: grant_id,
                credential_id: credential.id,
                username: request.requester_username.clone(),
                granted_by: confirming.clone(),
                request_id,
                created_at: now,
            };
            {
                let mut grants = txn.open_table(ACCESS_GRANTS)?;
                put_row(&mut grants, grant_id, &grant)?;
                let mut by_request = txn.open_table(GRANTS_BY_REQUEST)?;
                by_request.insert(request_id, grant_id)?;
            }

            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::AccessConfirmed)
                    .with_actor(confirming.as_str())
                    .with_resource("access_request", request_id)
                    .with_details(json!({
                        "grant_id": grant_id,
                        "credential_id": credential.id,
                        "grantee": grant.username,
                    })),
            )?;
            Ok(ConfirmStep::Granted(grant, disclosure))
        })?;

        let (grant, disclosure) = match step {
            ConfirmStep::Granted(grant, disclosure) => (grant, disclosure),
            ConfirmStep::Lapsed => {
                info!(request_id, "Confirmation arrived after the deadline");
                return Err(EscrowError::Expired(request_id));
            }
        };

        info!(
            request_id,
            grant_id = grant.id,
            credential_id = grant.credential_id,
            grantee = %grant.username,
            "Access confirmed"
        );

        let delivery = DeliveryStatus::from_result(self.gateway.deliver_secret(&disclosure).await);
        Ok(Notified {
            value: grant,
            delivery,
        })
    }

    /// The uploader re-sends the credential of an existing grant to its
    /// grantee, typically after the first disclosure failed to deliver.
    ///
    /// No new grant is created. The request must have been confirmed.
    pub async fn redeliver(
        &self,
        request_id: u64,
        uploader: &str,
    ) -> EscrowResult<Notified<AccessGrant>> {
        let uploader = normalize_username(uploader)?;

        let (grant, disclosure) =
            self.db.write(|txn| -> EscrowResult<(AccessGrant, Disclosure)> {
                let request = load_request(txn, request_id)?;
                let credential = load_credential(txn, request.credential_id)?;
                ensure_uploader(&credential, &uploader)?;
                let grant = {
                    let by_request = txn.open_table(GRANTS_BY_REQUEST)?;
                    let grants = txn.open_table(ACCESS_GRANTS)?;
                    find_grant(&by_request, &grants, request_id)?
                }
                .ok_or_else(|| {
                    EscrowError::NotFound(format!("grant for access request {request_id}"))
                })?;

                let disclosure = Disclosure {
                    correlation_id: request_id,
                    recipient: grant.username.clone(),
                    game: credential.game.clone(),
                    game_username: self.codec.unseal(&credential.game_username_seal)?,
                    game_password: self.codec.unseal(&credential.game_password_seal)?,
                };

                audit::append(
                    txn,
                    &AuditEvent::new(AuditEventType::AccessRedelivered)
                        .with_actor(uploader.as_str())
                        .with_resource("access_request", request_id)
                        .with_details(json!({
                            "grant_id": grant.id,
                            "credential_id": credential.id,
                            "grantee": grant.username,
                        })),
                )?;
                Ok((grant, disclosure))
            })?;

        info!(
            request_id,
            grant_id = grant.id,
            grantee = %grant.username,
            "Disclosure re-sent"
        );

        let delivery = DeliveryStatus::from_result(self.gateway.deliver_secret(&disclosure).await);
        Ok(Notified {
            value: grant,
            delivery,
        })
    }

    /// The uploader turns a request down. No grant is created.
    pub fn deny(&self, request_id: u64, confirming: &str) -> EscrowResult<AccessRequest> {
        let confirming = normalize_username(confirming)?;

        let request = self.db.write(|txn| -> EscrowResult<AccessRequest> {
            let mut request = load_request(txn, request_id)?;
            let credential = load_credential(txn, request.credential_id)?;
            ensure_uploader(&credential, &confirming)?;
            if request.status.is_terminal() {
                return Err(EscrowError::AlreadyResolved(request_id));
            }

            request.resolve(AccessStatus::Denied, Some(&confirming), Utc::now());
            {
                let mut rows = txn.open_table(ACCESS_REQUESTS)?;
                put_row(&mut rows, request_id, &request)?;
                let mut pending = txn.open_table(PENDING_ACCESS)?;
                pending.remove(request_id)?;
            }

            audit::append(
                txn,
                &AuditEvent::new(AuditEventType::AccessDenied)
                    .with_actor(confirming.as_str())
                    .with_resource("access_request", request_id),
            )?;
            Ok(request)
        })?;

        info!(request_id, uploader = %confirming, "Access denied");
        Ok(request)
    }

    /// Expire a Pending request whose deadline has passed.
    ///
    /// Returns whether this call made the transition. Resolved requests and
    /// requests still inside their window are left alone, so replicas may
    /// call this redundantly.
    pub fn expire(&self, request_id: u64) -> EscrowResult<bool> {
        self.expire_at(request_id, Utc::now())
    }

    fn expire_at(&self, request_id: u64, now: DateTime<Utc>) -> EscrowResult<bool> {
        self.db.write(|txn| -> EscrowResult<bool> {
            let mut request = load_request(txn, request_id)?;
            if request.status.is_terminal() || !request.is_due(now) {
                return Ok(false);
            }
            mark_expired(txn, &mut request, now)?;
            Ok(true)
        })
    }

    /// Expire every Pending request due at `now`. Returns the expired ids.
    pub fn expire_due(&self, now: DateTime<Utc>) -> EscrowResult<Vec<u64>> {
        let due: Vec<u64> = self.db.read(|txn| -> EscrowResult<Vec<u64>> {
            let pending = txn.open_table(PENDING_ACCESS)?;
            let mut due = Vec::new();
            for entry in pending.iter()? {
                let (id, deadline) = entry?;
                if deadline.value() <= now.timestamp() {
                    due.push(id.value());
                }
            }
            Ok(due)
        })?;

        let mut expired = Vec::with_capacity(due.len());
        for request_id in due {
            match self.expire_at(request_id, now) {
                Ok(true) => expired.push(request_id),
                Ok(false) => {}
                // Gone between the scan and the transition.
                Err(EscrowError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Expired overdue access requests");
        }
        Ok(expired)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn get_request(&self, request_id: u64) -> EscrowResult<AccessRequest> {
        self.db.read(|txn| -> EscrowResult<AccessRequest> {
            get_row(&txn.open_table(ACCESS_REQUESTS)?, request_id)?
                .ok_or_else(|| EscrowError::NotFound(format!("access request {request_id}")))
        })
    }

    /// Pending requests awaiting `uploader`'s answer, oldest first.
    pub fn list_pending_for_uploader(&self, uploader: &str) -> EscrowResult<Vec<AccessRequest>> {
        let uploader = normalize_username(uploader)?;
        let mut requests = self.db.read(|txn| -> EscrowResult<Vec<AccessRequest>> {
            let credentials: Vec<Credential> = all_rows(&txn.open_table(GAME_ACCOUNTS)?)?;
            let mine: HashSet<u64> = credentials
                .iter()
                .filter(|c| c.uploader_username == uploader)
                .map(|c| c.id)
                .collect();
            if mine.is_empty() {
                return Ok(Vec::new());
            }

            let pending = txn.open_table(PENDING_ACCESS)?;
            let rows = txn.open_table(ACCESS_REQUESTS)?;
            let mut requests = Vec::new();
            for entry in pending.iter()? {
                let (id, _) = entry?;
                let request: Option<AccessRequest> = get_row(&rows, id.value())?;
                match request {
                    Some(request) if mine.contains(&request.credential_id) => {
                        requests.push(request)
                    }
                    Some(_) => {}
                    None => warn!(request_id = id.value(), "Pending index points at no request"),
                }
            }
            Ok(requests)
        })?;
        requests.sort_by_key(|r| (r.created_at, r.id));
        Ok(requests)
    }

    /// Every request filed for `requester`, oldest first.
    pub fn list_requests_for_requester(
        &self,
        requester: &str,
    ) -> EscrowResult<Vec<AccessRequest>> {
        let requester = normalize_username(requester)?;
        let mut requests: Vec<AccessRequest> = self
            .db
            .read(|txn| -> EscrowResult<_> { Ok(all_rows(&txn.open_table(ACCESS_REQUESTS)?)?) })?;
        requests.retain(|r| r.requester_username == requester);
        requests.sort_by_key(|r| (r.created_at, r.id));
        Ok(requests)
    }

    /// Credentials shared with `username`.
    pub fn list_grants_for(&self, username: &str) -> EscrowResult<Vec<GrantView>> {
        let username = normalize_username(username)?;
        self.db.read(|txn| -> EscrowResult<Vec<GrantView>> {
            let grants: Vec<AccessGrant> = all_rows(&txn.open_table(ACCESS_GRANTS)?)?;
            let credentials = txn.open_table(GAME_ACCOUNTS)?;

            let mut views = Vec::new();
            for grant in grants.into_iter().filter(|g| g.username == username) {
                let credential: Option<Credential> = get_row(&credentials, grant.credential_id)?;
                let Some(credential) = credential else {
                    debug!(grant_id = grant.id, "Grant for a credential no longer vaulted");
                    continue;
                };
                views.push(GrantView {
                    grant_id: grant.id,
                    request_id: grant.request_id,
                    credential_id: grant.credential_id,
                    game: credential.game,
                    uploader_username: credential.uploader_username,
                    granted_by: grant.granted_by,
                    created_at: grant.created_at,
                });
            }
            Ok(views)
        })
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

fn load_request(txn: &WriteTransaction, request_id: u64) -> EscrowResult<AccessRequest> {
    get_row(&txn.open_table(ACCESS_REQUESTS)?, request_id)?
        .ok_or_else(|| EscrowError::NotFound(format!("access request {request_id}")))
}

fn load_credential(txn: &WriteTransaction, credential_id: u64) -> EscrowResult<Credential> {
    get_row(&txn.open_table(GAME_ACCOUNTS)?, credential_id)?
        .ok_or(EscrowError::CredentialNotFound(credential_id))
}

fn find_grant(
    by_request: &impl ReadableTable<u64, u64>,
    grants: &impl ReadableTable<u64, &'static [u8]>,
    request_id: u64,
) -> EscrowResult<Option<AccessGrant>> {
    let Some(grant_id) = by_request.get(request_id)?.map(|v| v.value()) else {
        return Ok(None);
    };
    Ok(get_row(grants, grant_id)?)
}

fn ensure_uploader(credential: &Credential, actor: &str) -> EscrowResult<()> {
    if credential.uploader_username != actor {
        return Err(EscrowError::NotAuthorized {
            actor: actor.to_string(),
            credential_id: credential.id,
        });
    }
    Ok(())
}

fn ensure_pending(request: &AccessRequest) -> EscrowResult<()> {
    match request.status {
        AccessStatus::Pending => Ok(()),
        AccessStatus::Expired => Err(EscrowError::Expired(request.id)),
        AccessStatus::Confirmed | AccessStatus::Denied => {
            Err(EscrowError::AlreadyResolved(request.id))
        }
    }
}

fn mark_expired(
    txn: &WriteTransaction,
    request: &mut AccessRequest,
    now: DateTime<Utc>,
) -> EscrowResult<()> {
    request.resolve(AccessStatus::Expired, None, now);
    {
        let mut rows = txn.open_table(ACCESS_REQUESTS)?;
        put_row(&mut rows, request.id, &*request)?;
        let mut pending = txn.open_table(PENDING_ACCESS)?;
        pending.remove(request.id)?;
    }
    audit::append(
        txn,
        &AuditEvent::new(AuditEventType::AccessExpired)
            .with_resource("access_request", request.id)
            .with_details(json!({ "expires_at": request.expires_at })),
    )?;
    info!(request_id = request.id, "Access request expired");
    Ok(())
}

#[cfg(test)]
impl AccessBroker {
    /// The grant materialized from a request, if any.
    fn grant_for_request(&self, request_id: u64) -> EscrowResult<Option<AccessGrant>> {
        self.db.read(|txn| -> EscrowResult<Option<AccessGrant>> {
            find_grant(
                &txn.open_table(GRANTS_BY_REQUEST)?,
                &txn.open_table(ACCESS_GRANTS)?,
                request_id,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Delivery;
    use crate::storage::AuditLog;
    use crate::testing::Fixture;

    /// alice vaults Lumen (lu1 / p@ss); bob and carol are members.
    fn lumen() -> (Fixture, Credential) {
        let fx = Fixture::new();
        fx.member("alice");
        fx.member("bob");
        fx.member("carol");
        let credential = fx.credential("alice", "Lumen", "lu1", "p@ss");
        (fx, credential)
    }

    #[tokio::test]
    async fn request_confirm_and_disclose() {
        let (fx, credential) = lumen();
        assert_eq!(credential.uploader_username, "alice");

        let requested = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap();
        let request = requested.value;
        assert_eq!(request.status, AccessStatus::Pending);
        assert!(requested.delivery.is_sent());

        let prompts = fx.gateway.confirmations();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].correlation_id, request.id);
        assert_eq!(prompts[0].recipient, "alice");
        assert_eq!(prompts[0].requester, "bob");

        let confirmed = fx.broker.confirm(request.id, "alice").await.unwrap();
        let grant = confirmed.value;
        assert_eq!(grant.credential_id, credential.id);
        assert_eq!(grant.username, "bob");
        assert_eq!(grant.granted_by, "alice");
        assert_eq!(grant.request_id, request.id);

        let stored = fx.broker.get_request(request.id).unwrap();
        assert_eq!(stored.status, AccessStatus::Confirmed);
        assert_eq!(stored.resolved_by.as_deref(), Some("alice"));

        let disclosures = fx.gateway.disclosures();
        assert_eq!(disclosures.len(), 1);
        assert_eq!(disclosures[0].recipient, "bob");
        assert_eq!(disclosures[0].game_username, "lu1");
        assert_eq!(disclosures[0].game_password, "p@ss");
        assert!(matches!(fx.gateway.sent().last(), Some(Delivery::Disclosure(_))));
    }

    #[tokio::test]
    async fn non_uploader_cannot_confirm() {
        let (fx, credential) = lumen();
        let request = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;

        let err = fx.broker.confirm(request.id, "carol").await.unwrap_err();
        assert!(matches!(
            err,
            EscrowError::NotAuthorized { ref actor, credential_id }
                if actor == "carol" && credential_id == credential.id
        ));
        assert_eq!(
            fx.broker.get_request(request.id).unwrap().status,
            AccessStatus::Pending
        );
        assert!(fx.broker.grant_for_request(request.id).unwrap().is_none());
        assert!(fx.gateway.disclosures().is_empty());

        assert!(matches!(
            fx.broker.deny(request.id, "carol"),
            Err(EscrowError::NotAuthorized { .. })
        ));
    }

    #[tokio::test]
    async fn request_requires_active_credential_and_identity() {
        let (fx, credential) = lumen();
        assert!(matches!(
            fx.broker.request_access(999, "bob", "discord:bob").await,
            Err(EscrowError::CredentialNotFound(999))
        ));
        assert!(matches!(
            fx.broker
                .request_access(credential.id, "mallory", "discord:mallory")
                .await,
            Err(EscrowError::IdentityNotFound(_))
        ));

        let pending = fx
            .vault
            .submit("alice", "Orbit", "or1", "pw", "discord:alice")
            .unwrap();
        assert!(matches!(
            fx.broker.request_access(pending.id, "bob", "discord:bob").await,
            Err(EscrowError::CredentialNotFound(_))
        ));
        assert!(fx.gateway.confirmations().is_empty());
    }

    #[tokio::test]
    async fn resolved_requests_reject_further_transitions() {
        let (fx, credential) = lumen();
        let first = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;
        let second = fx
            .broker
            .request_access(credential.id, "carol", "discord:carol")
            .await
            .unwrap()
            .value;

        fx.broker.confirm(first.id, "alice").await.unwrap();
        assert!(matches!(
            fx.broker.confirm(first.id, "alice").await,
            Err(EscrowError::AlreadyResolved(id)) if id == first.id
        ));
        assert!(matches!(
            fx.broker.deny(first.id, "alice"),
            Err(EscrowError::AlreadyResolved(_))
        ));

        let denied = fx.broker.deny(second.id, "alice").unwrap();
        assert_eq!(denied.status, AccessStatus::Denied);
        assert!(matches!(
            fx.broker.confirm(second.id, "alice").await,
            Err(EscrowError::AlreadyResolved(_))
        ));
        assert!(fx.broker.grant_for_request(second.id).unwrap().is_none());
        assert!(!fx.broker.expire(second.id).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_confirms_create_one_grant() {
        let (fx, credential) = lumen();
        let request = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;

        let request_id = request.id;
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let broker = fx.broker.clone();
                tokio::spawn(async move { broker.confirm(request_id, "alice").await })
            })
            .collect();

        let mut granted = 0;
        let mut resolved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => granted += 1,
                Err(EscrowError::AlreadyResolved(_)) => resolved += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(granted, 1);
        assert_eq!(resolved, 7);
        assert_eq!(fx.gateway.disclosures().len(), 1);
        assert_eq!(fx.broker.list_grants_for("bob").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn several_requests_may_queue_for_one_credential() {
        let (fx, credential) = lumen();
        let bob = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;
        let carol = fx
            .broker
            .request_access(credential.id, "carol", "discord:carol")
            .await
            .unwrap()
            .value;

        let incoming = fx.broker.list_pending_for_uploader("alice").unwrap();
        assert_eq!(
            incoming.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![bob.id, carol.id]
        );
        assert!(fx.broker.list_pending_for_uploader("bob").unwrap().is_empty());

        fx.broker.confirm(bob.id, "alice").await.unwrap();
        fx.broker.confirm(carol.id, "alice").await.unwrap();
        assert_eq!(fx.broker.list_grants_for("carol").unwrap()[0].game, "Lumen");
        assert!(fx.broker.list_pending_for_uploader("alice").unwrap().is_empty());
        assert_eq!(fx.broker.list_requests_for_requester("bob").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_expires_overdue_requests_once() {
        let (fx, credential) = lumen();
        let request = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;

        // Still inside its window.
        assert!(!fx.broker.expire(request.id).unwrap());
        assert!(fx.broker.expire_due(Utc::now()).unwrap().is_empty());

        let later = Utc::now() + DEFAULT_REQUEST_TTL + Duration::minutes(1);
        assert_eq!(fx.broker.expire_due(later).unwrap(), vec![request.id]);
        assert!(fx.broker.expire_due(later).unwrap().is_empty());

        let stored = fx.broker.get_request(request.id).unwrap();
        assert_eq!(stored.status, AccessStatus::Expired);
        assert!(stored.resolved_by.is_none());

        assert!(matches!(
            fx.broker.confirm(request.id, "alice").await,
            Err(EscrowError::Expired(_))
        ));
        assert!(matches!(
            fx.broker.deny(request.id, "alice"),
            Err(EscrowError::AlreadyResolved(_))
        ));
        assert!(matches!(fx.broker.expire(404), Err(EscrowError::NotFound(_))));
    }

    #[tokio::test]
    async fn late_confirmation_commits_expiry() {
        let fx = Fixture::new();
        fx.member("alice");
        fx.member("bob");
        let credential = fx.credential("alice", "Lumen", "lu1", "p@ss");
        let broker = fx.broker.clone().with_request_ttl(Duration::zero());

        let request = broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;
        assert!(matches!(
            broker.confirm(request.id, "alice").await,
            Err(EscrowError::Expired(id)) if id == request.id
        ));

        assert_eq!(
            broker.get_request(request.id).unwrap().status,
            AccessStatus::Expired
        );
        assert!(broker.grant_for_request(request.id).unwrap().is_none());
        assert!(fx.gateway.disclosures().is_empty());
    }

    #[tokio::test]
    async fn gateway_failure_does_not_roll_back() {
        let fx = Fixture::failing();
        fx.member("alice");
        fx.member("bob");
        let credential = fx.credential("alice", "Lumen", "lu1", "p@ss");

        let requested = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap();
        assert!(matches!(requested.delivery, DeliveryStatus::Failed { .. }));
        assert_eq!(
            fx.broker.get_request(requested.value.id).unwrap().status,
            AccessStatus::Pending
        );

        let confirmed = fx.broker.confirm(requested.value.id, "alice").await.unwrap();
        assert!(!confirmed.delivery.is_sent());
        assert_eq!(
            fx.broker.grant_for_request(requested.value.id).unwrap(),
            Some(confirmed.value)
        );
    }

    #[tokio::test]
    async fn undelivered_disclosure_can_be_resent() {
        let fx = Fixture::failing();
        fx.member("alice");
        fx.member("bob");
        fx.member("carol");
        let credential = fx.credential("alice", "Lumen", "lu1", "p@ss");

        let request_id = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value
            .id;
        let confirmed = fx.broker.confirm(request_id, "alice").await.unwrap();
        assert!(!confirmed.delivery.is_sent());
        assert!(matches!(
            fx.broker.confirm(request_id, "alice").await,
            Err(EscrowError::AlreadyResolved(id)) if id == request_id
        ));

        // Gateway is back.
        let broker = AccessBroker::new(fx.db.clone(), fx.codec.clone(), fx.gateway.clone());
        let err = broker.redeliver(request_id, "carol").await.unwrap_err();
        assert!(matches!(err, EscrowError::NotAuthorized { .. }));
        assert!(fx.gateway.disclosures().is_empty());

        let resent = broker.redeliver(request_id, "alice").await.unwrap();
        assert!(resent.delivery.is_sent());
        assert_eq!(resent.value, confirmed.value);

        let disclosures = fx.gateway.disclosures();
        assert_eq!(disclosures.len(), 1);
        assert_eq!(disclosures[0].recipient, "bob");
        assert_eq!(disclosures[0].game_username, "lu1");
        assert_eq!(disclosures[0].game_password, "p@ss");

        assert_eq!(broker.list_grants_for("bob").unwrap().len(), 1);
        let events = AuditLog::new(&fx.db)
            .search_by_resource("access_request", &request_id.to_string())
            .unwrap();
        assert_eq!(
            events.last().map(|e| e.event_type),
            Some(AuditEventType::AccessRedelivered)
        );
    }

    #[tokio::test]
    async fn redeliver_needs_a_grant() {
        let (fx, credential) = lumen();
        let request = fx
            .broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;

        let err = fx.broker.redeliver(request.id, "alice").await.unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));

        fx.broker.deny(request.id, "alice").unwrap();
        let err = fx.broker.redeliver(request.id, "alice").await.unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(_)));
        assert!(fx.gateway.disclosures().is_empty());
    }

    #[tokio::test]
    async fn unseal_failure_aborts_confirmation() {
        let (fx, credential) = lumen();
        let foreign = Arc::new(SecretCodec::new(&[9u8; 32], 10).unwrap());
        let broker = AccessBroker::new(fx.db.clone(), foreign, fx.gateway.clone());

        let request = broker
            .request_access(credential.id, "bob", "discord:bob")
            .await
            .unwrap()
            .value;
        let err = broker.confirm(request.id, "alice").await.unwrap_err();
        assert!(matches!(err, EscrowError::Crypto(_)));
        assert!(!err.is_business());

        assert_eq!(
            broker.get_request(request.id).unwrap().status,
            AccessStatus::Pending
        );
        assert!(broker.grant_for_request(request.id).unwrap().is_none());
        assert!(fx.gateway.disclosures().is_empty());
    }
}

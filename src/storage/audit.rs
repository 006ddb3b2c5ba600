// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Audit logging for moderation decisions and access transitions.
//!
//! Events are appended inside the same write transaction as the transition
//! they describe, so the log never disagrees with the tables. The log is
//! append-only; nothing here updates or deletes an event.
//!
//! Rows are keyed by `(day, sequence)`, so reading one day touches only that
//! day's rows. Actor and resource searches scan the whole log.

use std::ops::RangeBounds;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::database::{next_id, EscrowDb, StoreResult, AUDIT_LOG};

/// Types of auditable events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Registrar
    IdentitySubmitted,
    IdentityApproved,
    IdentityRejected,

    // Vault
    CredentialSubmitted,
    CredentialApproved,
    CredentialRejected,

    // Broker
    AccessRequested,
    AccessConfirmed,
    AccessDenied,
    AccessExpired,
    AccessRedelivered,

    // Sessions
    SessionOpened,
    AuthFailure,
}

/// An audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: String,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of event.
    pub event_type: AuditEventType,
    /// Identity or moderator that triggered the event.
    pub actor: Option<String>,
    /// Resource type (identity, credential, access_request).
    pub resource_type: Option<String>,
    /// Resource affected.
    pub resource_id: Option<String>,
    /// Additional details as JSON. Never contains secrets.
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message if operation failed.
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: None,
            resource_type: None,
            resource_id: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Append an event within an open write transaction.
///
/// Must not be called while the audit or sequence tables are open in `txn`.
pub(crate) fn append(txn: &WriteTransaction, event: &AuditEvent) -> StoreResult<()> {
    let seq = next_id(txn, "audit_log")?;
    let json = serde_json::to_vec(event)?;
    let mut table = txn.open_table(AUDIT_LOG)?;
    table.insert((day_key(event.timestamp.date_naive()), seq), json.as_slice())?;
    Ok(())
}

fn day_key(date: NaiveDate) -> i32 {
    date.num_days_from_ce()
}

fn events_in<R>(
    table: &impl ReadableTable<(i32, u64), &'static [u8]>,
    keys: R,
) -> StoreResult<Vec<AuditEvent>>
where
    R: RangeBounds<(i32, u64)> + 'static,
{
    let mut events = Vec::new();
    for entry in table.range(keys)? {
        let (_, value) = entry?;
        events.push(serde_json::from_slice(value.value())?);
    }
    Ok(events)
}

/// Read access to the audit log.
pub struct AuditLog<'a> {
    db: &'a EscrowDb,
}

impl<'a> AuditLog<'a> {
    pub fn new(db: &'a EscrowDb) -> Self {
        Self { db }
    }

    /// Record a standalone event in its own transaction.
    pub fn log(&self, event: &AuditEvent) -> StoreResult<()> {
        self.db.write(|txn| append(txn, event))
    }

    /// All events, oldest day first and in append order within a day.
    pub fn all(&self) -> StoreResult<Vec<AuditEvent>> {
        self.db.read(|txn| -> StoreResult<_> {
            let table = txn.open_table(AUDIT_LOG)?;
            events_in(&table, ..)
        })
    }

    /// Events recorded on a given UTC day.
    pub fn read_events(&self, date: NaiveDate) -> StoreResult<Vec<AuditEvent>> {
        let day = day_key(date);
        self.db.read(|txn| -> StoreResult<_> {
            let table = txn.open_table(AUDIT_LOG)?;
            events_in(&table, (day, 0)..=(day, u64::MAX))
        })
    }

    /// Events triggered by one actor.
    pub fn search_by_actor(&self, actor: &str) -> StoreResult<Vec<AuditEvent>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| e.actor.as_deref() == Some(actor))
            .collect())
    }

    /// Events touching one resource.
    pub fn search_by_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StoreResult<Vec<AuditEvent>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|e| {
                e.resource_type.as_deref() == Some(resource_type)
                    && e.resource_id.as_deref() == Some(resource_id)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_audit_event() {
        let event = AuditEvent::new(AuditEventType::IdentityApproved)
            .with_actor("mod_1")
            .with_resource("identity", 42);

        assert_eq!(event.event_type, AuditEventType::IdentityApproved);
        assert_eq!(event.actor.as_deref(), Some("mod_1"));
        assert_eq!(event.resource_type.as_deref(), Some("identity"));
        assert_eq!(event.resource_id.as_deref(), Some("42"));
        assert!(event.success);
    }

    #[test]
    fn failed_event() {
        let event = AuditEvent::new(AuditEventType::AuthFailure)
            .with_actor("mallory")
            .failed("bad moderator key");

        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("bad moderator key"));
    }

    #[test]
    fn log_and_read_events() {
        let db = EscrowDb::in_memory().unwrap();
        let log = AuditLog::new(&db);

        log.log(
            &AuditEvent::new(AuditEventType::CredentialApproved)
                .with_actor("mod_1")
                .with_resource("credential", 1),
        )
        .unwrap();
        log.log(
            &AuditEvent::new(AuditEventType::AccessRequested)
                .with_actor("bob")
                .with_resource("access_request", 1),
        )
        .unwrap();

        let today = Utc::now().date_naive();
        let events = log.read_events(today).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventType::CredentialApproved);
        assert_eq!(events[1].event_type, AuditEventType::AccessRequested);

        assert_eq!(log.search_by_actor("bob").unwrap().len(), 1);
        assert_eq!(
            log.search_by_resource("credential", "1").unwrap().len(),
            1
        );
    }

    #[test]
    fn days_are_read_separately() {
        let db = EscrowDb::in_memory().unwrap();
        let log = AuditLog::new(&db);

        let mut earlier = AuditEvent::new(AuditEventType::AccessExpired);
        earlier.timestamp = Utc::now() - chrono::Duration::days(1);
        log.log(&AuditEvent::new(AuditEventType::AccessRequested))
            .unwrap();
        log.log(&earlier).unwrap();

        let today = Utc::now().date_naive();
        let yesterday = earlier.timestamp.date_naive();
        let todays = log.read_events(today).unwrap();
        assert_eq!(todays.len(), 1);
        assert_eq!(todays[0].event_type, AuditEventType::AccessRequested);

        let before = log.read_events(yesterday).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].event_id, earlier.event_id);

        let all = log.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, AuditEventType::AccessExpired);
    }
}

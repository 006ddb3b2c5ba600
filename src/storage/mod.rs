// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Durable Escrow Store
//!
//! All escrow state lives in a single redb database file under `DATA_DIR`.
//! The pending rows themselves are the work queue: any number of stateless
//! service instances can act on them because every transition runs in one
//! write transaction.
//!
//! ## Storage Layout
//!
//! ```text
//! $DATA_DIR/
//!   escrow.redb    # all tables, see `database`
//! ```
//!
//! ## Important Notes
//!
//! - Secret columns hold codec output only (digests and seals), never
//!   cleartext.
//! - `access_grants` and `audit_log` are append-only.

pub mod audit;
pub mod database;
pub mod records;

pub use audit::{AuditEvent, AuditEventType, AuditLog};
pub use database::{EscrowDb, StoreError, StoreResult};
pub use records::{
    AccessGrant, AccessRequest, AccessStatus, Credential, Identity, PendingCredential,
    PendingIdentity, Session,
};

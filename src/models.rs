// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Every response type here is
//! a view: secret columns of the stored rows never appear in them.
//!
//! ## Model Categories
//!
//! - **Identities & sessions**: registration, login
//! - **Credentials**: uploads and vaulted credentials
//! - **Access**: requests, confirmations, grants
//! - **Console**: batch decisions, audit queries

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::moderation::DecisionOutcome;
use crate::notify::DeliveryStatus;
use crate::storage::{AccessGrant, AccessRequest, Identity, PendingCredential, PendingIdentity};

// =============================================================================
// Identities & Sessions
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    /// Chat handle of whoever is registering.
    pub requested_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PendingIdentityView {
    pub id: u64,
    pub username: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PendingIdentity> for PendingIdentityView {
    fn from(row: &PendingIdentity) -> Self {
        Self {
            id: row.id,
            username: row.username.clone(),
            requested_by: row.requested_by.clone(),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct IdentityView {
    pub id: u64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for IdentityView {
    fn from(row: &Identity) -> Self {
        Self {
            id: row.id,
            username: row.username.clone(),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    /// Bearer token for later calls.
    pub token: String,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Credentials
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadCredentialRequest {
    pub game: String,
    pub game_username: String,
    pub game_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PendingCredentialView {
    pub id: u64,
    pub uploader_username: String,
    pub game: String,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<&PendingCredential> for PendingCredentialView {
    fn from(row: &PendingCredential) -> Self {
        Self {
            id: row.id,
            uploader_username: row.uploader_username.clone(),
            game: row.game.clone(),
            requested_by: row.requested_by.clone(),
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Access
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccessRequest {
    /// Credential being requested.
    pub account_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccessRequestResponse {
    pub request: AccessRequest,
    /// Whether the uploader was prompted.
    pub delivery: DeliveryStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GrantResponse {
    pub grant: AccessGrant,
    /// Whether the credential reached the grantee.
    pub delivery: DeliveryStatus,
}

// =============================================================================
// Console
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DecisionsRequest {
    #[serde(default)]
    pub approve: Vec<u64>,
    #[serde(default)]
    pub reject: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DecisionsResponse {
    pub outcomes: Vec<DecisionOutcome>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct AuditQuery {
    /// UTC day to read (YYYY-MM-DD). Defaults to today.
    pub date: Option<NaiveDate>,
    /// Only events triggered by this actor, across all days.
    pub actor: Option<String>,
    /// Only events touching this resource type, across all days. Requires
    /// `resource_id`.
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
}

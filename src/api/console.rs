// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Approval console endpoints.
//!
//! Every handler takes the [`Moderator`] extractor; the moderator name it
//! yields is recorded as the actor of each decision.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;

use crate::{
    auth::Moderator,
    error::{ApiError, EscrowError},
    models::{
        AuditQuery, DecisionsRequest, DecisionsResponse, IdentityView, PendingCredentialView,
        PendingIdentityView,
    },
    state::AppState,
    storage::{AuditEvent, AuditLog},
    vault::CredentialView,
};

// =============================================================================
// Identities
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/console/identities",
    tag = "Console",
    responses((status = 200, body = [PendingIdentityView]))
)]
pub async fn list_pending_identities(
    Moderator(_moderator): Moderator,
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingIdentityView>>, ApiError> {
    let pending = state.registrar.list_pending()?;
    Ok(Json(pending.iter().map(PendingIdentityView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/v1/console/identities/{pending_id}/approve",
    params(("pending_id" = u64, Path, description = "Pending identity id")),
    tag = "Console",
    responses(
        (status = 200, body = IdentityView),
        (status = 404, description = "Not pending (already decided or unknown)"),
        (status = 409, description = "Username taken meanwhile")
    )
)]
pub async fn approve_identity(
    Moderator(moderator): Moderator,
    Path(pending_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<IdentityView>, ApiError> {
    let identity = state.registrar.approve(pending_id, &moderator)?;
    Ok(Json(IdentityView::from(&identity)))
}

#[utoipa::path(
    post,
    path = "/v1/console/identities/{pending_id}/reject",
    params(("pending_id" = u64, Path, description = "Pending identity id")),
    tag = "Console",
    responses((status = 204), (status = 404, description = "Not pending"))
)]
pub async fn reject_identity(
    Moderator(moderator): Moderator,
    Path(pending_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.registrar.reject(pending_id, &moderator)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/console/identities/decisions",
    request_body = DecisionsRequest,
    tag = "Console",
    responses((status = 200, body = DecisionsResponse))
)]
pub async fn decide_identities(
    Moderator(moderator): Moderator,
    State(state): State<AppState>,
    Json(request): Json<DecisionsRequest>,
) -> Result<Json<DecisionsResponse>, ApiError> {
    let outcomes = state
        .registrar
        .decide(&request.approve, &request.reject, &moderator)?;
    Ok(Json(DecisionsResponse { outcomes }))
}

// =============================================================================
// Credentials
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/console/credentials",
    tag = "Console",
    responses((status = 200, body = [PendingCredentialView]))
)]
pub async fn list_pending_credentials(
    Moderator(_moderator): Moderator,
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingCredentialView>>, ApiError> {
    let pending = state.vault.list_pending()?;
    Ok(Json(pending.iter().map(PendingCredentialView::from).collect()))
}

#[utoipa::path(
    post,
    path = "/v1/console/credentials/{pending_id}/approve",
    params(("pending_id" = u64, Path, description = "Pending credential id")),
    tag = "Console",
    responses(
        (status = 200, body = CredentialView),
        (status = 404, description = "Not pending (already decided or unknown)")
    )
)]
pub async fn approve_credential(
    Moderator(moderator): Moderator,
    Path(pending_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<CredentialView>, ApiError> {
    let credential = state.vault.approve(pending_id, &moderator)?;
    Ok(Json(CredentialView::from(&credential)))
}

#[utoipa::path(
    post,
    path = "/v1/console/credentials/{pending_id}/reject",
    params(("pending_id" = u64, Path, description = "Pending credential id")),
    tag = "Console",
    responses((status = 204), (status = 404, description = "Not pending"))
)]
pub async fn reject_credential(
    Moderator(moderator): Moderator,
    Path(pending_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.vault.reject(pending_id, &moderator)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/console/credentials/decisions",
    request_body = DecisionsRequest,
    tag = "Console",
    responses((status = 200, body = DecisionsResponse))
)]
pub async fn decide_credentials(
    Moderator(moderator): Moderator,
    State(state): State<AppState>,
    Json(request): Json<DecisionsRequest>,
) -> Result<Json<DecisionsResponse>, ApiError> {
    let outcomes = state
        .vault
        .decide(&request.approve, &request.reject, &moderator)?;
    Ok(Json(DecisionsResponse { outcomes }))
}

// =============================================================================
// Audit
// =============================================================================

#[utoipa::path(
    get,
    path = "/v1/console/audit",
    params(AuditQuery),
    tag = "Console",
    responses((status = 200, body = [AuditEvent]))
)]
pub async fn read_audit(
    Moderator(_moderator): Moderator,
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEvent>>, ApiError> {
    let log = AuditLog::new(&state.db);
    let events = match (&query.actor, &query.resource_type, &query.resource_id) {
        (Some(actor), _, _) => log.search_by_actor(actor),
        (None, Some(resource_type), Some(resource_id)) => {
            log.search_by_resource(resource_type, resource_id)
        }
        (None, None, None) => {
            log.read_events(query.date.unwrap_or_else(|| Utc::now().date_naive()))
        }
        (None, _, _) => {
            return Err(ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_input",
                "resource_type and resource_id must be given together",
            ))
        }
    }
    .map_err(EscrowError::from)?;
    Ok(Json(events))
}

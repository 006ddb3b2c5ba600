// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access requests and grants.
//!
//! Confirm and deny are also the inbound half of the chat bot round-trip:
//! the bot forwards the uploader's answer here, quoting the request id it
//! received as `correlation_id`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::Member,
    broker::GrantView,
    error::ApiError,
    models::{AccessRequestResponse, CreateAccessRequest, GrantResponse},
    state::AppState,
    storage::AccessRequest,
};

/// Ask for a vaulted credential. The uploader is prompted to confirm.
#[utoipa::path(
    post,
    path = "/v1/access-requests",
    request_body = CreateAccessRequest,
    tag = "Access",
    security(("bearer" = [])),
    responses(
        (status = 201, body = AccessRequestResponse),
        (status = 404, description = "Credential or identity not active")
    )
)]
pub async fn request_access(
    Member(session): Member,
    State(state): State<AppState>,
    Json(request): Json<CreateAccessRequest>,
) -> Result<(StatusCode, Json<AccessRequestResponse>), ApiError> {
    let notified = state
        .broker
        .request_access(request.account_id, &session.username, &session.username)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AccessRequestResponse {
            request: notified.value,
            delivery: notified.delivery,
        }),
    ))
}

/// Pending requests for credentials the caller uploaded.
#[utoipa::path(
    get,
    path = "/v1/access-requests/incoming",
    tag = "Access",
    security(("bearer" = [])),
    responses((status = 200, body = [AccessRequest]))
)]
pub async fn list_incoming(
    Member(session): Member,
    State(state): State<AppState>,
) -> Result<Json<Vec<AccessRequest>>, ApiError> {
    Ok(Json(state.broker.list_pending_for_uploader(&session.username)?))
}

/// Requests the caller filed, in any state.
#[utoipa::path(
    get,
    path = "/v1/access-requests/outgoing",
    tag = "Access",
    security(("bearer" = [])),
    responses((status = 200, body = [AccessRequest]))
)]
pub async fn list_outgoing(
    Member(session): Member,
    State(state): State<AppState>,
) -> Result<Json<Vec<AccessRequest>>, ApiError> {
    Ok(Json(
        state.broker.list_requests_for_requester(&session.username)?,
    ))
}

/// Confirm a request on a credential the caller uploaded.
#[utoipa::path(
    post,
    path = "/v1/access-requests/{request_id}/confirm",
    params(
        ("request_id" = u64, Path, description = "Access request (correlation) id")
    ),
    tag = "Access",
    security(("bearer" = [])),
    responses(
        (status = 200, body = GrantResponse),
        (status = 403, description = "Caller is not the uploader"),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Request already resolved"),
        (status = 410, description = "Request expired")
    )
)]
pub async fn confirm(
    Member(session): Member,
    Path(request_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<GrantResponse>, ApiError> {
    let notified = state.broker.confirm(request_id, &session.username).await?;
    Ok(Json(GrantResponse {
        grant: notified.value,
        delivery: notified.delivery,
    }))
}

/// Re-send the credential of a confirmed request to its grantee.
#[utoipa::path(
    post,
    path = "/v1/access-requests/{request_id}/redeliver",
    params(
        ("request_id" = u64, Path, description = "Access request (correlation) id")
    ),
    tag = "Access",
    security(("bearer" = [])),
    responses(
        (status = 200, body = GrantResponse),
        (status = 403, description = "Caller is not the uploader"),
        (status = 404, description = "Unknown request or no grant for it")
    )
)]
pub async fn redeliver(
    Member(session): Member,
    Path(request_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<GrantResponse>, ApiError> {
    let notified = state
        .broker
        .redeliver(request_id, &session.username)
        .await?;
    Ok(Json(GrantResponse {
        grant: notified.value,
        delivery: notified.delivery,
    }))
}

/// Deny a request on a credential the caller uploaded.
#[utoipa::path(
    post,
    path = "/v1/access-requests/{request_id}/deny",
    params(
        ("request_id" = u64, Path, description = "Access request (correlation) id")
    ),
    tag = "Access",
    security(("bearer" = [])),
    responses(
        (status = 200, body = AccessRequest),
        (status = 403, description = "Caller is not the uploader"),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Request already resolved")
    )
)]
pub async fn deny(
    Member(session): Member,
    Path(request_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<AccessRequest>, ApiError> {
    Ok(Json(state.broker.deny(request_id, &session.username)?))
}

/// Credentials shared with the caller.
#[utoipa::path(
    get,
    path = "/v1/grants",
    tag = "Access",
    security(("bearer" = [])),
    responses((status = 200, body = [GrantView]))
)]
pub async fn list_grants(
    Member(session): Member,
    State(state): State<AppState>,
) -> Result<Json<Vec<GrantView>>, ApiError> {
    Ok(Json(state.broker.list_grants_for(&session.username)?))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::blocking;
use crate::{
    auth::Member,
    error::ApiError,
    models::{PendingCredentialView, UploadCredentialRequest},
    state::AppState,
    vault::CredentialView,
};

/// Upload a shared-account credential. The caller becomes its uploader.
#[utoipa::path(
    post,
    path = "/v1/credentials",
    request_body = UploadCredentialRequest,
    tag = "Credentials",
    security(("bearer" = [])),
    responses(
        (status = 201, body = PendingCredentialView),
        (status = 422, description = "Game, username or password rejected")
    )
)]
pub async fn upload(
    Member(session): Member,
    State(state): State<AppState>,
    Json(request): Json<UploadCredentialRequest>,
) -> Result<(StatusCode, Json<PendingCredentialView>), ApiError> {
    let vault = state.vault.clone();
    let pending = blocking(move || {
        vault.submit(
            &session.username,
            &request.game,
            &request.game_username,
            &request.game_password,
            &session.username,
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(PendingCredentialView::from(&pending))))
}

/// Active credentials the caller has vaulted.
#[utoipa::path(
    get,
    path = "/v1/credentials/mine",
    tag = "Credentials",
    security(("bearer" = [])),
    responses((status = 200, body = [CredentialView]))
)]
pub async fn list_mine(
    Member(session): Member,
    State(state): State<AppState>,
) -> Result<Json<Vec<CredentialView>>, ApiError> {
    Ok(Json(state.vault.list_by_uploader(&session.username)?))
}

/// Public view of one vaulted credential.
#[utoipa::path(
    get,
    path = "/v1/credentials/{credential_id}",
    params(("credential_id" = u64, Path, description = "Vaulted credential id")),
    tag = "Credentials",
    security(("bearer" = [])),
    responses(
        (status = 200, body = CredentialView),
        (status = 404, description = "Not an active credential")
    )
)]
pub async fn get_credential(
    Member(_session): Member,
    Path(credential_id): Path<u64>,
    State(state): State<AppState>,
) -> Result<Json<CredentialView>, ApiError> {
    Ok(Json(state.vault.get(credential_id)?))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use super::blocking;
use crate::{
    error::ApiError,
    models::{PendingIdentityView, RegisterRequest},
    state::AppState,
};

/// Submit a membership registration for moderator approval.
#[utoipa::path(
    post,
    path = "/v1/identities",
    request_body = RegisterRequest,
    tag = "Identities",
    responses(
        (status = 201, body = PendingIdentityView),
        (status = 409, description = "Username already pending or active"),
        (status = 422, description = "Username or password rejected")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PendingIdentityView>), ApiError> {
    let registrar = state.registrar.clone();
    let pending = blocking(move || {
        registrar.submit(&request.username, &request.password, &request.requested_by)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(PendingIdentityView::from(&pending))))
}

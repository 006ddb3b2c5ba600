// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};

use super::blocking;
use crate::{
    auth::Member,
    error::ApiError,
    models::{LoginRequest, SessionResponse},
    state::AppState,
};

/// Log in an approved member.
#[utoipa::path(
    post,
    path = "/v1/sessions",
    request_body = LoginRequest,
    tag = "Sessions",
    responses(
        (status = 201, body = SessionResponse),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let registrar = state.registrar.clone();
    let session =
        blocking(move || registrar.open_session(&request.username, &request.password)).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token: session.token,
            username: session.username,
            expires_at: session.expires_at,
        }),
    ))
}

/// End the caller's session.
#[utoipa::path(
    delete,
    path = "/v1/sessions",
    tag = "Sessions",
    security(("bearer" = [])),
    responses((status = 204))
)]
pub async fn logout(
    Member(session): Member,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.registrar.close_session(&session.token)?;
    Ok(StatusCode::NO_CONTENT)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{HeaderName, Request},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    broker::GrantView,
    error::{ApiError, EscrowResult},
    models::{
        AccessRequestResponse, CreateAccessRequest, DecisionsRequest, DecisionsResponse,
        GrantResponse, IdentityView, LoginRequest, PendingCredentialView, PendingIdentityView,
        RegisterRequest, SessionResponse, UploadCredentialRequest,
    },
    moderation::{Decision, DecisionOutcome},
    notify::DeliveryStatus,
    state::AppState,
    storage::{AccessGrant, AccessRequest, AccessStatus, AuditEvent, AuditEventType},
    vault::CredentialView,
};

pub mod access;
pub mod console;
pub mod credentials;
pub mod health;
pub mod identities;
pub mod sessions;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/identities", post(identities::register))
        .route(
            "/sessions",
            post(sessions::login).delete(sessions::logout),
        )
        .route("/credentials", post(credentials::upload))
        .route("/credentials/mine", get(credentials::list_mine))
        .route(
            "/credentials/{credential_id}",
            get(credentials::get_credential),
        )
        .route("/access-requests", post(access::request_access))
        .route("/access-requests/incoming", get(access::list_incoming))
        .route("/access-requests/outgoing", get(access::list_outgoing))
        .route(
            "/access-requests/{request_id}/confirm",
            post(access::confirm),
        )
        .route("/access-requests/{request_id}/deny", post(access::deny))
        .route(
            "/access-requests/{request_id}/redeliver",
            post(access::redeliver),
        )
        .route("/grants", get(access::list_grants))
        .route(
            "/console/identities",
            get(console::list_pending_identities),
        )
        .route(
            "/console/identities/decisions",
            post(console::decide_identities),
        )
        .route(
            "/console/identities/{pending_id}/approve",
            post(console::approve_identity),
        )
        .route(
            "/console/identities/{pending_id}/reject",
            post(console::reject_identity),
        )
        .route(
            "/console/credentials",
            get(console::list_pending_credentials),
        )
        .route(
            "/console/credentials/decisions",
            post(console::decide_credentials),
        )
        .route(
            "/console/credentials/{pending_id}/approve",
            post(console::approve_credential),
        )
        .route(
            "/console/credentials/{pending_id}/reject",
            post(console::reject_credential),
        )
        .route("/console/audit", get(console::read_audit));

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .nest("/v1", v1_routes)
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

/// Run a synchronous domain call (PBKDF2 hashing, sealing) on the blocking
/// pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> EscrowResult<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => {
            tracing::error!(error = %e, "Blocking task failed");
            Err(ApiError::internal("internal error"))
        }
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        identities::register,
        sessions::login,
        sessions::logout,
        credentials::upload,
        credentials::list_mine,
        credentials::get_credential,
        access::request_access,
        access::list_incoming,
        access::list_outgoing,
        access::confirm,
        access::deny,
        access::redeliver,
        access::list_grants,
        console::list_pending_identities,
        console::approve_identity,
        console::reject_identity,
        console::decide_identities,
        console::list_pending_credentials,
        console::approve_credential,
        console::reject_credential,
        console::decide_credentials,
        console::read_audit,
        health::health,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            RegisterRequest,
            PendingIdentityView,
            IdentityView,
            LoginRequest,
            SessionResponse,
            UploadCredentialRequest,
            PendingCredentialView,
            CredentialView,
            CreateAccessRequest,
            AccessRequestResponse,
            GrantResponse,
            AccessRequest,
            AccessStatus,
            AccessGrant,
            GrantView,
            DeliveryStatus,
            DecisionsRequest,
            DecisionsResponse,
            Decision,
            DecisionOutcome,
            AuditEvent,
            AuditEventType,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Identities", description = "Membership registration"),
        (name = "Sessions", description = "Member login and logout"),
        (name = "Credentials", description = "Shared-account uploads"),
        (name = "Access", description = "Access requests, confirmations and grants"),
        (name = "Console", description = "Moderator approval console"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
pub struct ApiDoc;

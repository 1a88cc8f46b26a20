use crate::layers::auth::api_key_checker;
use crate::models::const_val::REQUEST_ID_HEADER;
use crate::routers::invite::{
    admin_issue_invite, check_invite, get_invite, invite_stats, issue_invite, list_invites,
    next_invite,
};
use crate::services::states::InviteeState;
use axum::Router;
use axum::http::{HeaderName, Request};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::info_span;

mod invite;

pub fn router(state: Arc<InviteeState>) -> Router {
    let invite_router = {
        Router::new()
            .merge(
                Router::new()
                    .route("/", put(issue_invite))
                    .route("/next", post(next_invite))
                    .route("/check", post(check_invite))
                    .route("/stats", get(invite_stats)),
            )
            .merge(
                Router::new()
                    .route("/admin", get(list_invites).put(admin_issue_invite))
                    .route("/admin/{id}", get(get_invite))
                    .layer(from_fn_with_state(state.clone(), api_key_checker)),
            )
    };
    let trace_header = HeaderName::from_static(REQUEST_ID_HEADER);
    Router::new()
        .nest("/api/v1", Router::new().nest("/invite", invite_router))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    trace_header.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                        let rid = req
                            .extensions()
                            .get::<RequestId>()
                            .and_then(|r| r.header_value().to_str().ok())
                            .unwrap_or("-");
                        info_span!(
                            "http.request",
                            request_id = %rid,
                            method = %req.method(),
                            uri = %req.uri(),
                            version = ?req.version(),
                        )
                    }),
                )
                .layer(PropagateRequestIdLayer::new(trace_header))
                .concurrency_limit(state.config.common.concurrency_limit),
        )
        .with_state(state)
}

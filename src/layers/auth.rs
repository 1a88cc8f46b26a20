use crate::models::api::prelude::*;
use crate::models::const_val::API_KEY_HEADER;
use crate::services::states::InviteeState;
use axum::extract::{Request as AxumExtractRequest, State};
use axum::middleware::Next;
use axum::response::IntoResponse;
use sha3::{Digest, Sha3_256};
use std::sync::Arc;

/// Digest comparison, so timing never reveals a matching key prefix.
fn key_matches(expected: &str, provided: &str) -> bool {
    Sha3_256::digest(expected.as_bytes()) == Sha3_256::digest(provided.as_bytes())
}

pub async fn api_key_checker(
    State(state): State<Arc<InviteeState>>,
    request: AxumExtractRequest,
    next: Next,
) -> ApiResult<impl IntoResponse> {
    let Some(expected) = state.config.auth.api_key.as_deref() else {
        return Err(unauthorized!("Admin access is disabled"));
    };
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized!("Missing api key"))?;
    if !key_matches(expected, provided) {
        return Err(unauthorized!("Invalid api key"));
    }
    Ok(next.run(request).await)
}

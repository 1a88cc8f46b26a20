use crate::models::api::prelude::*;
use crate::models::invite::{InviteCheck, InviteRaw, InviteStats};
use crate::services::lifecycle::InviteRequest;
use crate::services::states::InviteeState;
use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type InviteRouterState = State<Arc<InviteeState>>;

#[derive(Debug, Deserialize)]
pub struct IssueInviteReq {
    pub secret: String,
    pub address: String,
}

pub async fn issue_invite(
    State(state): InviteRouterState,
    ApiJson(req): ApiJson<IssueInviteReq>,
) -> ApiResult<Json<GeneralResponse<InviteRaw>>> {
    let req = InviteRequest::parse(&req.secret, &req.address)?;
    let invite = state.invites.issue_verified(&req).await?;
    Ok(general_json_res!("Invite issued", invite))
}

pub async fn admin_issue_invite(
    State(state): InviteRouterState,
    ApiJson(req): ApiJson<IssueInviteReq>,
) -> ApiResult<Json<GeneralResponse<InviteRaw>>> {
    let req = InviteRequest::parse(&req.secret, &req.address)?;
    let invite = state.invites.issue(&req).await?;
    Ok(general_json_res!("Invite issued", invite))
}

#[derive(Debug, Serialize)]
pub struct NextInviteRes {
    pub id: i64,
    pub secret: String,
    pub signer: String,
}

pub async fn next_invite(
    State(state): InviteRouterState,
) -> ApiResult<Json<GeneralResponse<NextInviteRes>>> {
    let invite = state.invites.next_invite().await?;
    Ok(general_json_res!(
        "Invite dispensed",
        NextInviteRes {
            id: invite.id,
            secret: invite.secret,
            signer: invite.signer,
        }
    ))
}

#[derive(Debug, Deserialize)]
pub struct CheckInviteReq {
    pub secret: String,
    pub address: String,
}

pub async fn check_invite(
    State(state): InviteRouterState,
    ApiJson(req): ApiJson<CheckInviteReq>,
) -> ApiResult<Json<GeneralResponse<InviteCheck>>> {
    let InviteRequest { secret, address } = InviteRequest::parse(&req.secret, &req.address)?;
    let checked = state.invites.check_invite(&secret, &address).await?;
    Ok(general_json_res!("Invite checked", checked))
}

pub async fn invite_stats(
    State(state): InviteRouterState,
) -> ApiResult<Json<GeneralResponse<InviteStats>>> {
    let stats = state.invites.stats().await?;
    Ok(general_json_res!("Invite stats fetched", stats))
}

pub async fn get_invite(
    State(state): InviteRouterState,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<GeneralResponse<InviteRaw>>> {
    let invite = state.invites.get_by_id(id).await?;
    Ok(general_json_res!("Invite fetched", invite))
}

pub async fn list_invites(
    State(state): InviteRouterState,
) -> ApiResult<Json<GeneralResponse<Vec<InviteRaw>>>> {
    let invites = state.invites.list_all().await?;
    Ok(general_json_res!("Invites fetched", invites))
}

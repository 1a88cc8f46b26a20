pub mod config;
pub mod db;

use crate::services::lifecycle::InviteLifecycle;
use config::AppConfig;
use db::DataBaseState;
use std::sync::Arc;

pub struct InviteeState {
    pub db: DataBaseState,
    pub invites: InviteLifecycle,
    pub config: Arc<AppConfig>,
}

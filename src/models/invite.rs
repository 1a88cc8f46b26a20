use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    /// Issued, never handed out.
    #[sqlx(rename = "none")]
    #[serde(rename = "none")]
    Unclaimed,
    /// Handed out to a consumer, not confirmed yet.
    Pending,
    /// Redeemed. Terminal.
    Used,
}

impl InviteStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InviteStatus::Used)
    }
}

#[derive(Debug, Clone, Eq, PartialEq, FromRow, Serialize, Deserialize)]
pub struct InviteRaw {
    pub id: i64,
    pub secret: String,
    pub signer: String,
    pub status: InviteStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub update_date: OffsetDateTime,
}

impl InviteRaw {
    pub fn is_used(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct InviteStats {
    pub total: i64,
    pub used: i64,
    pub pending: i64,
    pub available: i64,
}

impl InviteStats {
    pub fn from_counts(total: i64, used: i64, pending: i64) -> Self {
        Self {
            total,
            used,
            pending,
            available: total - used - pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteCheck {
    #[serde(flatten)]
    pub invite: InviteRaw,
    pub is_used: bool,
}

//! Invite state machine: `none -> pending -> used`, reconciled against the chain.
//!
//! Dispensing is fail-open towards the oracle, confirmation is fail-closed.

use crate::models::chain::{Address, AddressParseError};
use crate::models::invite::{InviteCheck, InviteRaw, InviteStats, InviteStatus};
use crate::services::oracle::{ChainOracle, OracleError};
use crate::services::signer::{SignerError, verify_secret_owner};
use crate::services::states::db::{DataBaseError, DataBaseState, InviteeDatabaseExecutor};
use crate::utils::hex_ext::normalize_hex_secret;
use invitee_macros::InviteeBusinessError;
use std::sync::Arc;

#[derive(Debug, thiserror::Error, InviteeBusinessError)]
pub enum LifecycleError {
    #[code(4001)]
    #[error("Invite secret already exists")]
    DuplicateSecret,
    #[code(4002)]
    #[error("Invite not found")]
    NotFound,
    #[code(4003)]
    #[error("No invite available")]
    NoInviteAvailable,
    #[code(4004)]
    #[error("Chain oracle unavailable: {0}")]
    OracleUnavailable(#[source] OracleError),
    #[code(4005)]
    #[error("Invalid input: {0}")]
    Validation(String),
    #[code(4006)]
    #[error("Address {0} already claimed on chain")]
    AlreadyClaimed(Address),
    #[code(4007)]
    #[error("Address {0} has no on-chain account")]
    NotRegistered(Address),
    #[error("{0}")]
    DataBase(DataBaseError),
}

impl From<DataBaseError> for LifecycleError {
    fn from(e: DataBaseError) -> Self {
        match e {
            DataBaseError::UniqueViolation { .. } => LifecycleError::DuplicateSecret,
            DataBaseError::RowNotFound | DataBaseError::NoAffectedRows => LifecycleError::NotFound,
            other => LifecycleError::DataBase(other),
        }
    }
}

impl From<AddressParseError> for LifecycleError {
    fn from(e: AddressParseError) -> Self {
        LifecycleError::Validation(e.to_string())
    }
}

impl From<SignerError> for LifecycleError {
    fn from(e: SignerError) -> Self {
        LifecycleError::Validation(e.to_string())
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// A validated `(secret, address)` pair, ready to hit the store.
#[derive(Debug, Clone)]
pub struct InviteRequest {
    pub secret: String,
    pub address: Address,
}

impl InviteRequest {
    pub fn parse(secret: &str, address: &str) -> LifecycleResult<Self> {
        let secret = normalize_hex_secret(secret)
            .map_err(|e| LifecycleError::Validation(format!("secret: {e}")))?;
        let address = address.parse::<Address>()?;
        Ok(Self { secret, address })
    }
}

pub struct InviteLifecycle {
    db: DataBaseState,
    oracle: Arc<dyn ChainOracle>,
}

impl InviteLifecycle {
    pub fn new(db: DataBaseState, oracle: Arc<dyn ChainOracle>) -> Self {
        Self { db, oracle }
    }

    /// Persists an invite. Callers on the public path run [`Self::issue_verified`] instead.
    pub async fn issue(&self, req: &InviteRequest) -> LifecycleResult<InviteRaw> {
        let signer = req.address.to_string();
        let invite = self
            .db
            .single(async |mut exec: InviteeDatabaseExecutor<'_>| {
                exec.invites().create(&req.secret, &signer).await
            })
            .await?;
        tracing::info!("Issued invite {} for {}", invite.id, invite.signer);
        Ok(invite)
    }

    /// Public issuance: the secret must control the address, and the address must be
    /// bound and unclaimed on chain. An unreachable oracle does not block issuance.
    pub async fn issue_verified(&self, req: &InviteRequest) -> LifecycleResult<InviteRaw> {
        verify_secret_owner(&req.secret, &req.address)?;
        match self.oracle.query_account(&req.address).await {
            Ok(acc) if acc.claimed => return Err(LifecycleError::AlreadyClaimed(req.address)),
            Ok(acc) if !acc.is_registered() => {
                return Err(LifecycleError::NotRegistered(req.address));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(
                "Oracle unavailable while issuing for {}, proceeding unverified: {e}",
                req.address
            ),
        }
        self.issue(req).await
    }

    pub async fn get_by_id(&self, id: i64) -> LifecycleResult<InviteRaw> {
        self.db
            .single(async |mut exec: InviteeDatabaseExecutor<'_>| {
                exec.invites().get_by_id(id).await
            })
            .await
            .map_err(Into::into)
    }

    pub async fn list_all(&self) -> LifecycleResult<Vec<InviteRaw>> {
        self.db
            .single(async |mut exec: InviteeDatabaseExecutor<'_>| {
                exec.invites().list_all().await
            })
            .await
            .map_err(Into::into)
    }

    pub async fn stats(&self) -> LifecycleResult<InviteStats> {
        self.db
            .transaction(async |mut exec: InviteeDatabaseExecutor<'_>| {
                let total = exec.invites().count_all().await?;
                let used = exec.invites().count_by_status(InviteStatus::Used).await?;
                let pending = exec.invites().count_by_status(InviteStatus::Pending).await?;
                Ok::<_, DataBaseError>(InviteStats::from_counts(total, used, pending))
            })
            .await
            .map_err(Into::into)
    }

    async fn mark_used(&self, id: i64) -> LifecycleResult<InviteRaw> {
        self.db
            .single(async |mut exec: InviteeDatabaseExecutor<'_>| {
                exec.invites().set_status(id, InviteStatus::Used).await?;
                exec.invites().get_by_id(id).await
            })
            .await
            .map_err(Into::into)
    }

    /// Hands out the next invite.
    ///
    /// Unclaimed invites go first, oldest id first, and are moved to `pending`. Otherwise the
    /// longest-waiting pending invite is re-offered unless the chain says it was already
    /// claimed, in which case it is retired and the search continues. Each invite pending at
    /// the start is reconciled at most once.
    pub async fn next_invite(&self) -> LifecycleResult<InviteRaw> {
        let pending_budget = self
            .db
            .single(async |mut exec: InviteeDatabaseExecutor<'_>| {
                exec.invites().count_by_status(InviteStatus::Pending).await
            })
            .await?;
        for _ in 0..=pending_budget {
            let (fresh, pending) = self
                .db
                .single(async |mut exec: InviteeDatabaseExecutor<'_>| {
                    if let Some(invite) = exec.invites().select_next_available().await? {
                        return Ok::<_, DataBaseError>((Some(invite), None));
                    }
                    Ok((None, exec.invites().oldest_pending().await?))
                })
                .await?;
            if let Some(invite) = fresh {
                tracing::debug!("Dispensed invite {} (none -> pending)", invite.id);
                return Ok(invite);
            }
            let Some(invite) = pending else {
                return Err(LifecycleError::NoInviteAvailable);
            };
            let signer = match invite.signer.parse::<Address>() {
                Ok(signer) => signer,
                Err(e) => {
                    tracing::warn!("Invite {} has unparsable signer: {e}", invite.id);
                    return Ok(invite);
                }
            };
            if !self.oracle.check_on_chain(&signer).await.claimed {
                tracing::debug!("Re-dispensed pending invite {}", invite.id);
                return Ok(invite);
            }
            self.mark_used(invite.id).await?;
            tracing::info!(
                "Pending invite {} already claimed on chain, marked used",
                invite.id
            );
        }
        Err(LifecycleError::NoInviteAvailable)
    }

    /// Confirms an invite against the chain. `used` short-circuits; oracle failures are
    /// reported, never guessed around.
    pub async fn check_invite(
        &self,
        secret: &str,
        address: &Address,
    ) -> LifecycleResult<InviteCheck> {
        let invite = self
            .db
            .single(async |mut exec: InviteeDatabaseExecutor<'_>| {
                exec.invites().get_by_secret(secret).await
            })
            .await?
            .ok_or(LifecycleError::NotFound)?;
        if invite.is_used() {
            return Ok(InviteCheck {
                invite,
                is_used: true,
            });
        }
        if invite.signer != address.to_string() {
            tracing::debug!(
                "Checking invite {} against {address}, stored signer is {}",
                invite.id,
                invite.signer
            );
        }
        let acc = self
            .oracle
            .query_account(address)
            .await
            .map_err(LifecycleError::OracleUnavailable)?;
        if !acc.claimed {
            return Ok(InviteCheck {
                invite,
                is_used: false,
            });
        }
        let invite = self.mark_used(invite.id).await?;
        tracing::info!("Invite {} confirmed used", invite.id);
        Ok(InviteCheck {
            invite,
            is_used: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::oracle::mock::MockOracle;
    use crate::services::states::db::test_util::{file_db, memory_db};
    use std::collections::HashSet;

    fn addr(b: u8) -> Address {
        Address([b; 20])
    }

    async fn setup() -> (InviteLifecycle, Arc<MockOracle>) {
        let oracle = Arc::new(MockOracle::default());
        (
            InviteLifecycle::new(memory_db().await, oracle.clone()),
            oracle,
        )
    }

    async fn issue(lc: &InviteLifecycle, secret: &str, signer: Address) -> InviteRaw {
        lc.issue(&InviteRequest::parse(secret, &signer.to_string()).unwrap())
            .await
            .unwrap()
    }

    async fn assert_stats_consistent(lc: &InviteLifecycle) -> InviteStats {
        let s = lc.stats().await.unwrap();
        assert_eq!(s.total, s.used + s.pending + s.available);
        s
    }

    #[tokio::test]
    async fn duplicate_secret_leaves_store_unchanged() {
        let (lc, _) = setup().await;
        issue(&lc, "aa01", addr(1)).await;
        let before = lc.list_all().await.unwrap();
        let dup = lc
            .issue(&InviteRequest::parse("0xAA01", &addr(2).to_string()).unwrap())
            .await;
        assert!(matches!(dup, Err(LifecycleError::DuplicateSecret)));
        assert_eq!(lc.list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn request_validation() {
        assert!(matches!(
            InviteRequest::parse("nothex", &addr(1).to_string()),
            Err(LifecycleError::Validation(_))
        ));
        assert!(matches!(
            InviteRequest::parse("aa", "0x1234"),
            Err(LifecycleError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn dispense_prefers_unclaimed_then_oldest_pending() {
        let (lc, oracle) = setup().await;
        let a = issue(&lc, "aa", addr(1)).await;
        let b = issue(&lc, "bb", addr(2)).await;

        let first = lc.next_invite().await.unwrap();
        assert_eq!((first.id, first.status), (a.id, InviteStatus::Pending));
        let second = lc.next_invite().await.unwrap();
        assert_eq!((second.id, second.status), (b.id, InviteStatus::Pending));
        assert_eq!(oracle.calls(), 0);

        oracle.set_claimed(addr(1), false);
        let third = lc.next_invite().await.unwrap();
        assert_eq!(third.id, a.id);
        assert_eq!(third.status, InviteStatus::Pending);
        assert_eq!(third.update_date, first.update_date);
        assert_eq!(oracle.calls(), 1);

        let s = assert_stats_consistent(&lc).await;
        assert_eq!((s.total, s.pending, s.used, s.available), (2, 2, 0, 0));
    }

    #[tokio::test]
    async fn new_invite_jumps_ahead_of_pending() {
        let (lc, oracle) = setup().await;
        issue(&lc, "aa", addr(1)).await;
        lc.next_invite().await.unwrap();
        let c = issue(&lc, "cc", addr(3)).await;
        assert_eq!(lc.next_invite().await.unwrap().id, c.id);
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn claimed_pending_is_retired() {
        let (lc, oracle) = setup().await;
        let c = issue(&lc, "cc", addr(3)).await;
        assert_eq!(lc.next_invite().await.unwrap().id, c.id);
        oracle.set_claimed(addr(3), true);
        assert!(matches!(
            lc.next_invite().await,
            Err(LifecycleError::NoInviteAvailable)
        ));
        assert_eq!(lc.get_by_id(c.id).await.unwrap().status, InviteStatus::Used);
        let s = assert_stats_consistent(&lc).await;
        assert_eq!((s.used, s.available), (1, 0));
    }

    #[tokio::test]
    async fn claimed_pending_is_replaced_by_next_pending() {
        let (lc, oracle) = setup().await;
        let a = issue(&lc, "aa", addr(1)).await;
        let b = issue(&lc, "bb", addr(2)).await;
        lc.next_invite().await.unwrap();
        lc.next_invite().await.unwrap();
        oracle.set_claimed(addr(1), true);
        let got = lc.next_invite().await.unwrap();
        assert_eq!(got.id, b.id);
        assert_eq!(lc.get_by_id(a.id).await.unwrap().status, InviteStatus::Used);
    }

    #[tokio::test]
    async fn every_pending_claimed_ends_empty() {
        let (lc, oracle) = setup().await;
        for (i, secret) in ["01", "02", "03"].into_iter().enumerate() {
            issue(&lc, secret, addr(i as u8 + 1)).await;
            lc.next_invite().await.unwrap();
            oracle.set_claimed(addr(i as u8 + 1), true);
        }
        assert!(matches!(
            lc.next_invite().await,
            Err(LifecycleError::NoInviteAvailable)
        ));
        assert_eq!(oracle.calls(), 3);
        assert_eq!(lc.stats().await.unwrap().used, 3);
    }

    #[tokio::test]
    async fn dispense_fails_open() {
        let (lc, oracle) = setup().await;
        let a = issue(&lc, "aa", addr(1)).await;
        let pending = lc.next_invite().await.unwrap();
        oracle.set_failing(addr(1));
        let again = lc.next_invite().await.unwrap();
        assert_eq!(again, pending);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(lc.get_by_id(a.id).await.unwrap().status, InviteStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_dispense_claims_distinct_invites() {
        const N: u8 = 40;
        let dir = tempfile::tempdir().unwrap();
        let oracle = Arc::new(MockOracle::default());
        let lc = Arc::new(InviteLifecycle::new(
            file_db(&dir.path().join("invitee.db"), 8).await,
            oracle.clone(),
        ));
        for i in 1..=N {
            issue(&lc, &format!("{i:02x}"), addr(i)).await;
        }
        let handles: Vec<_> = (0..N)
            .map(|_| {
                let lc = lc.clone();
                tokio::spawn(async move { lc.next_invite().await })
            })
            .collect();
        let mut ids = HashSet::new();
        for handle in handles {
            let invite = handle.await.unwrap().unwrap();
            assert_eq!(invite.status, InviteStatus::Pending);
            assert!(ids.insert(invite.id), "invite {} dispensed twice", invite.id);
        }
        assert_eq!(ids.len(), N as usize);
        assert_eq!(oracle.calls(), 0);
        let s = assert_stats_consistent(&lc).await;
        assert_eq!((s.pending, s.available), (N as i64, 0));
    }

    #[tokio::test]
    async fn empty_store_has_nothing_to_dispense() {
        let (lc, _) = setup().await;
        assert!(matches!(
            lc.next_invite().await,
            Err(LifecycleError::NoInviteAvailable)
        ));
        assert_eq!(assert_stats_consistent(&lc).await, InviteStats::default());
    }

    #[tokio::test]
    async fn check_marks_used_when_claimed() {
        let (lc, oracle) = setup().await;
        let signer: Address = "0xabc0000000000000000000000000000000000001".parse().unwrap();
        let inv = issue(&lc, "deadbeef", signer).await;
        lc.next_invite().await.unwrap();
        oracle.set_claimed(signer, true);
        let res = lc.check_invite("deadbeef", &signer).await.unwrap();
        assert!(res.is_used);
        assert_eq!(res.invite.id, inv.id);
        assert_eq!(res.invite.status, InviteStatus::Used);
    }

    #[tokio::test]
    async fn check_unclaimed_keeps_status() {
        let (lc, _) = setup().await;
        issue(&lc, "deadbeef", addr(4)).await;
        let res = lc.check_invite("deadbeef", &addr(4)).await.unwrap();
        assert!(!res.is_used);
        assert_eq!(res.invite.status, InviteStatus::Unclaimed);
    }

    #[tokio::test]
    async fn check_used_short_circuits() {
        let (lc, oracle) = setup().await;
        issue(&lc, "deadbeef", addr(4)).await;
        oracle.set_claimed(addr(4), true);
        lc.check_invite("deadbeef", &addr(4)).await.unwrap();
        assert_eq!(oracle.calls(), 1);
        oracle.set_failing(addr(4));
        let res = lc.check_invite("deadbeef", &addr(4)).await.unwrap();
        assert!(res.is_used);
        assert_eq!(oracle.calls(), 1);
        // used invites are never dispensed again
        assert!(matches!(
            lc.next_invite().await,
            Err(LifecycleError::NoInviteAvailable)
        ));
    }

    #[tokio::test]
    async fn check_fails_closed() {
        let (lc, oracle) = setup().await;
        let inv = issue(&lc, "deadbeef", addr(5)).await;
        lc.next_invite().await.unwrap();
        oracle.set_failing(addr(5));
        assert!(matches!(
            lc.check_invite("deadbeef", &addr(5)).await,
            Err(LifecycleError::OracleUnavailable(_))
        ));
        assert_eq!(lc.get_by_id(inv.id).await.unwrap().status, InviteStatus::Pending);
    }

    #[tokio::test]
    async fn check_unknown_secret() {
        let (lc, oracle) = setup().await;
        assert!(matches!(
            lc.check_invite("feed", &addr(1)).await,
            Err(LifecycleError::NotFound)
        ));
        assert!(matches!(lc.get_by_id(42).await, Err(LifecycleError::NotFound)));
        assert_eq!(oracle.calls(), 0);
    }

    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDR: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[tokio::test]
    async fn verified_issue_checks_key_and_chain() {
        let (lc, oracle) = setup().await;
        let dev: Address = DEV_ADDR.parse().unwrap();

        let wrong = InviteRequest::parse(DEV_KEY, &addr(1).to_string()).unwrap();
        assert!(matches!(
            lc.issue_verified(&wrong).await,
            Err(LifecycleError::Validation(_))
        ));

        let req = InviteRequest::parse(DEV_KEY, DEV_ADDR).unwrap();
        oracle.set_claimed(dev, true);
        assert!(matches!(
            lc.issue_verified(&req).await,
            Err(LifecycleError::AlreadyClaimed(_))
        ));

        oracle.set(
            dev,
            crate::services::oracle::mock::Scripted::Answer(
                crate::models::chain::OnChainAccount::UNCLAIMED,
            ),
        );
        assert!(matches!(
            lc.issue_verified(&req).await,
            Err(LifecycleError::NotRegistered(_))
        ));

        oracle.set_failing(dev);
        let inv = lc.issue_verified(&req).await.unwrap();
        assert_eq!(inv.signer, DEV_ADDR);
        assert_eq!(inv.status, InviteStatus::Unclaimed);
        assert_eq!(lc.stats().await.unwrap().total, 1);
    }
}

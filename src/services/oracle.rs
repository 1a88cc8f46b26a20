//! Read-only view of the referral contract.
//!
//! The contract exposes `accounts(address signer) -> (address account, bool claimed)`; the
//! adapter reaches it with a plain JSON-RPC `eth_call`.

use crate::models::chain::{ADDRESS_LEN, Address, OnChainAccount};
use crate::utils::hex_ext::{HexString, strip_0x};
use async_trait::async_trait;
use invitee_macros::InviteeBusinessError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha3::{Digest, Keccak256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const ACCOUNTS_SIGNATURE: &str = "accounts(address)";
const WORD: usize = 32;

#[derive(Debug, thiserror::Error, InviteeBusinessError)]
pub enum OracleError {
    #[code(3001)]
    #[error("Chain transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[code(3002)]
    #[error("Chain node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[code(3003)]
    #[error("Contract call returned no data")]
    EmptyResponse,
    #[code(3004)]
    #[error("Malformed contract response: {0}")]
    Malformed(String),
    #[code(3005)]
    #[error("Contract response is not hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

pub type OracleResult<T> = Result<T, OracleError>;

#[async_trait]
pub trait ChainOracle: Send + Sync {
    /// Authoritative lookup; every failure is reported.
    async fn query_account(&self, signer: &Address) -> OracleResult<OnChainAccount>;

    /// Best-effort lookup: any failure reads as "not claimed, no account".
    async fn check_on_chain(&self, signer: &Address) -> OnChainAccount {
        match self.query_account(signer).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!("Oracle lookup for {signer} failed, assuming unclaimed: {e}");
                OnChainAccount::UNCLAIMED
            }
        }
    }
}

pub fn accounts_selector() -> [u8; 4] {
    let hash = Keccak256::digest(ACCOUNTS_SIGNATURE.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Calldata for `accounts(signer)`: selector followed by the left-padded address word.
pub fn encode_accounts_call(signer: &Address) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + WORD);
    data.extend_from_slice(&accounts_selector());
    data.extend_from_slice(&[0u8; WORD - ADDRESS_LEN]);
    data.extend_from_slice(&signer.0);
    data
}

pub fn decode_accounts_result(data: &[u8]) -> OracleResult<OnChainAccount> {
    if data.is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    if data.len() < 2 * WORD {
        return Err(OracleError::Malformed(format!(
            "expected at least {} bytes, got {}",
            2 * WORD,
            data.len()
        )));
    }
    let (account_word, rest) = data.split_at(WORD);
    let claimed_word = &rest[..WORD];
    let (pad, account) = account_word.split_at(WORD - ADDRESS_LEN);
    if pad.iter().any(|b| *b != 0) {
        return Err(OracleError::Malformed("dirty address padding".into()));
    }
    if claimed_word[..WORD - 1].iter().any(|b| *b != 0) || claimed_word[WORD - 1] > 1 {
        return Err(OracleError::Malformed("bool word out of range".into()));
    }
    let account =
        Address::from_slice(account).map_err(|e| OracleError::Malformed(e.to_string()))?;
    Ok(OnChainAccount {
        account,
        claimed: claimed_word[WORD - 1] == 1,
    })
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<JsonRpcErrorBody>,
}

/// `eth_call` over HTTP.
pub struct RpcChainOracle {
    client: reqwest::Client,
    rpc_url: String,
    contract: Address,
    next_id: AtomicU64,
}

impl RpcChainOracle {
    pub fn new(
        rpc_url: impl Into<String>,
        contract: Address,
        timeout: Duration,
    ) -> OracleResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            contract,
            next_id: AtomicU64::new(1),
        })
    }

    async fn eth_call(&self, data: &[u8]) -> OracleResult<Vec<u8>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: "eth_call",
            params: json!([
                { "to": self.contract.to_string(), "data": data.hex_0x() },
                "latest"
            ]),
        };
        let res: JsonRpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(err) = res.error {
            return Err(OracleError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = res.result.ok_or(OracleError::EmptyResponse)?;
        Ok(strip_0x(&result).unhex()?)
    }
}

#[async_trait]
impl ChainOracle for RpcChainOracle {
    #[tracing::instrument(skip(self), fields(contract = %self.contract))]
    async fn query_account(&self, signer: &Address) -> OracleResult<OnChainAccount> {
        let raw = self.eth_call(&encode_accounts_call(signer)).await?;
        let account = decode_accounts_result(&raw)?;
        tracing::debug!(
            "accounts({signer}) -> account={}, claimed={}",
            account.account,
            account.claimed
        );
        Ok(account)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::routing::post;
    use serde_json::Value;

    fn addr(b: u8) -> Address {
        Address([b; ADDRESS_LEN])
    }

    fn encode_result(account: &Address, claimed: bool) -> Vec<u8> {
        let mut out = vec![0u8; WORD - ADDRESS_LEN];
        out.extend_from_slice(&account.0);
        out.extend_from_slice(&[0u8; WORD - 1]);
        out.push(claimed as u8);
        out
    }

    #[test]
    fn calldata_layout() {
        let data = encode_accounts_call(&addr(0xab));
        assert_eq!(data.len(), 36);
        assert_eq!(&data[..4], &accounts_selector());
        assert!(data[4..16].iter().all(|b| *b == 0));
        assert!(data[16..].iter().all(|b| *b == 0xab));
    }

    #[test]
    fn decode_result_words() {
        let ok = decode_accounts_result(&encode_result(&addr(7), true)).unwrap();
        assert_eq!(ok, OnChainAccount { account: addr(7), claimed: true });
        assert!(matches!(decode_accounts_result(&[]), Err(OracleError::EmptyResponse)));
        assert!(matches!(
            decode_accounts_result(&[0u8; 40]),
            Err(OracleError::Malformed(_))
        ));
        let mut dirty = encode_result(&addr(7), false);
        dirty[0] = 1;
        assert!(matches!(decode_accounts_result(&dirty), Err(OracleError::Malformed(_))));
        let mut bad_bool = encode_result(&addr(7), false);
        bad_bool[63] = 2;
        assert!(matches!(decode_accounts_result(&bad_bool), Err(OracleError::Malformed(_))));
    }

    async fn spawn_node(reply: Value) -> String {
        let app = Router::new().route(
            "/",
            post(move |Json(req): Json<Value>| {
                let reply = reply.clone();
                async move {
                    assert_eq!(req["method"], "eth_call");
                    let mut body = reply;
                    body["id"] = req["id"].clone();
                    Json(body)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{local}/")
    }

    fn oracle(url: String) -> RpcChainOracle {
        RpcChainOracle::new(url, addr(0xcc), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn rpc_round_trip() {
        let result = encode_result(&addr(9), true).hex_0x();
        let url = spawn_node(json!({ "jsonrpc": "2.0", "result": result })).await;
        let got = oracle(url).query_account(&addr(1)).await.unwrap();
        assert_eq!(got, OnChainAccount { account: addr(9), claimed: true });
    }

    #[tokio::test]
    async fn rpc_error_and_empty_fail_open() {
        let url = spawn_node(json!({
            "jsonrpc": "2.0",
            "error": { "code": 3, "message": "execution reverted" }
        }))
        .await;
        let o = oracle(url);
        assert!(matches!(
            o.query_account(&addr(1)).await,
            Err(OracleError::Rpc { code: 3, .. })
        ));
        assert_eq!(o.check_on_chain(&addr(1)).await, OnChainAccount::UNCLAIMED);

        let url = spawn_node(json!({ "jsonrpc": "2.0", "result": "0x" })).await;
        let o = oracle(url);
        assert!(matches!(o.query_account(&addr(1)).await, Err(OracleError::EmptyResponse)));
        assert_eq!(o.check_on_chain(&addr(1)).await, OnChainAccount::UNCLAIMED);
    }

    #[tokio::test]
    async fn unreachable_node_fails_open() {
        let o = oracle("http://127.0.0.1:1/".into());
        assert!(matches!(o.query_account(&addr(1)).await, Err(OracleError::Transport(_))));
        assert_eq!(o.check_on_chain(&addr(1)).await, OnChainAccount::UNCLAIMED);
    }
}

//! Signing-bridge ledger gateway.
//!
//! State-changing ledger calls require explicit interactive
//! authorization by the acting user; that happens in a wallet-style
//! signing bridge this gateway talks to over HTTP. Submission returns a
//! handle at once; confirmation is polled until the bridge reports a
//! terminal status. Declines therefore surface on the confirmation leg,
//! where the interactive prompt lives.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{contract_name, LedgerGateway};
use crate::types::{
    EntityKind, Fingerprint, LedgerEntry, LedgerRef, PendingOp, Receipt, SubmissionHandle,
};

/// Signing-bridge configuration.
#[derive(Debug, Clone)]
pub struct SignerConfig {
    /// Bridge base URL.
    pub bridge_url: String,
    /// Bearer token identifying this client to the bridge.
    pub token: Option<String>,
    /// Delay between confirmation polls.
    pub poll_interval: Duration,
}

impl Default for SignerConfig {
    fn default() -> Self {
        let poll_ms = std::env::var("SCRUMSYNC_SIGNER_POLL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1500);
        SignerConfig {
            bridge_url: std::env::var("SCRUMSYNC_SIGNER_URL")
                .unwrap_or_else(|_| "http://localhost:7545".to_string()),
            token: std::env::var("SCRUMSYNC_SIGNER_TOKEN").ok(),
            poll_interval: Duration::from_millis(poll_ms),
        }
    }
}

impl SignerConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(bridge_url: &str) -> Self {
        SignerConfig {
            bridge_url: bridge_url.trim_end_matches('/').to_string(),
            token: None,
            poll_interval: Duration::from_millis(1500),
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    contract: &'a str,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct SubmitReply {
    handle: String,
}

#[derive(Debug, Deserialize)]
struct OpStatusReply {
    status: String,
    entity_ref: Option<String>,
    block: Option<u64>,
    cost: Option<u64>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MemberReply {
    entity_ref: String,
    fingerprint: Option<String>,
}

/// Map a bridge status reply onto a terminal outcome, or `None` while
/// the operation is still pending.
fn terminal_outcome(reply: &OpStatusReply) -> Option<LedgerResult<Receipt>> {
    match reply.status.as_str() {
        "pending" | "submitted" | "signing" => None,
        "confirmed" => {
            let outcome = match (&reply.entity_ref, reply.block) {
                (Some(entity_ref), Some(block)) => Ok(Receipt {
                    confirmed_ref: LedgerRef::from(entity_ref.clone()),
                    block,
                    cost: reply.cost.unwrap_or(0),
                }),
                _ => Err(LedgerError::Unavailable(
                    "bridge confirmed without ref/block".to_string(),
                )),
            };
            Some(outcome)
        }
        "declined" => Some(Err(LedgerError::Declined)),
        "reverted" => Some(Err(LedgerError::Reverted {
            reason: reply
                .reason
                .clone()
                .unwrap_or_else(|| "execution reverted".to_string()),
        })),
        other => Some(Err(LedgerError::Unavailable(format!(
            "unknown operation status: {other}"
        )))),
    }
}

async fn poll_confirmation(
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    interval: Duration,
) -> LedgerResult<Receipt> {
    loop {
        let mut rb = http.get(&url);
        if let Some(token) = &token {
            rb = rb.bearer_auth(token);
        }
        let resp = rb
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "bridge returned HTTP {}",
                resp.status()
            )));
        }
        let reply: OpStatusReply = resp
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("malformed bridge reply: {e}")))?;

        if let Some(outcome) = terminal_outcome(&reply) {
            return outcome;
        }
        tokio::time::sleep(interval).await;
    }
}

/// [`LedgerGateway`] implementation backed by the signing bridge.
pub struct SignerBridgeGateway {
    config: SignerConfig,
    http: reqwest::Client,
}

impl SignerBridgeGateway {
    pub fn new(config: SignerConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scrumsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        SignerBridgeGateway { config, http }
    }

    pub fn from_env() -> Self {
        Self::new(SignerConfig::from_env())
    }

    /// Submit one operation; the returned [`PendingOp`] polls the bridge
    /// for its terminal status.
    async fn submit(&self, contract: &str, method: &str, params: Value) -> LedgerResult<PendingOp> {
        debug!(contract, method, "submitting ledger operation");
        let mut rb = self
            .http
            .post(format!("{}/operations", self.config.bridge_url))
            .json(&SubmitBody {
                contract,
                method,
                params,
            });
        if let Some(token) = &self.config.token {
            rb = rb.bearer_auth(token);
        }
        let resp = rb
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "bridge refused submission: HTTP {}",
                resp.status()
            )));
        }
        let reply: SubmitReply = resp
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("malformed bridge reply: {e}")))?;

        let handle = SubmissionHandle::new(reply.handle);
        let url = format!("{}/operations/{}", self.config.bridge_url, handle);
        let confirmation = Box::pin(poll_confirmation(
            self.http.clone(),
            url,
            self.config.token.clone(),
            self.config.poll_interval,
        ));
        Ok(PendingOp::new(handle, confirmation))
    }
}

#[async_trait]
impl LedgerGateway for SignerBridgeGateway {
    async fn register(
        &self,
        kind: EntityKind,
        parent_team: Option<&LedgerRef>,
        payload: Value,
        fingerprint: &Fingerprint,
    ) -> LedgerResult<PendingOp> {
        let params = json!({
            "parent_team": parent_team.map(|r| r.as_str()),
            "payload": payload,
            "fingerprint": fingerprint.to_hex(),
        });
        self.submit(contract_name(kind), "register", params).await
    }

    async fn update_fingerprint(
        &self,
        kind: EntityKind,
        entity: &LedgerRef,
        fingerprint: &Fingerprint,
    ) -> LedgerResult<PendingOp> {
        let params = json!({
            "entity": entity.as_str(),
            "fingerprint": fingerprint.to_hex(),
        });
        self.submit(contract_name(kind), "update_fingerprint", params)
            .await
    }

    async fn change_status(
        &self,
        kind: EntityKind,
        entity: &LedgerRef,
        status_code: u8,
    ) -> LedgerResult<PendingOp> {
        let params = json!({
            "entity": entity.as_str(),
            "status_code": status_code,
        });
        self.submit(contract_name(kind), "change_status", params)
            .await
    }

    async fn remove(&self, kind: EntityKind, entity: &LedgerRef) -> LedgerResult<PendingOp> {
        let params = json!({ "entity": entity.as_str() });
        self.submit(contract_name(kind), "remove", params).await
    }

    async fn team_members(
        &self,
        kind: EntityKind,
        team: &LedgerRef,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        let url = format!(
            "{}/registries/{}/members/{}",
            self.config.bridge_url,
            contract_name(kind),
            team.as_str()
        );
        let mut rb = self.http.get(&url);
        if let Some(token) = &self.config.token {
            rb = rb.bearer_auth(token);
        }
        let resp = rb
            .send()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "bridge returned HTTP {}",
                resp.status()
            )));
        }
        let members: Vec<MemberReply> = resp
            .json()
            .await
            .map_err(|e| LedgerError::Unavailable(format!("malformed bridge reply: {e}")))?;

        Ok(members
            .into_iter()
            .map(|m| LedgerEntry {
                ledger_ref: LedgerRef::from(m.entity_ref),
                // An unparseable fingerprint is indistinguishable from a
                // pre-tracking entity; the resolver degrades the same way.
                fingerprint: m.fingerprint.and_then(|f| f.parse().ok()),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_config_default() {
        let config = SignerConfig::default();
        assert!(!config.bridge_url.is_empty());
        assert!(config.poll_interval > Duration::ZERO);
    }

    #[test]
    fn test_signer_config_with_token() {
        let config = SignerConfig::new("http://bridge.local").with_token("secret");
        assert_eq!(config.token, Some("secret".to_string()));
    }

    fn reply(status: &str) -> OpStatusReply {
        OpStatusReply {
            status: status.to_string(),
            entity_ref: Some("11".to_string()),
            block: Some(90210),
            cost: Some(21),
            reason: None,
        }
    }

    #[test]
    fn pending_statuses_are_not_terminal() {
        assert!(terminal_outcome(&reply("pending")).is_none());
        assert!(terminal_outcome(&reply("submitted")).is_none());
        assert!(terminal_outcome(&reply("signing")).is_none());
    }

    #[test]
    fn confirmed_status_yields_receipt() {
        let receipt = terminal_outcome(&reply("confirmed")).unwrap().unwrap();
        assert_eq!(receipt.confirmed_ref, LedgerRef::from("11"));
        assert_eq!(receipt.block, 90210);
        assert_eq!(receipt.cost, 21);
    }

    #[test]
    fn declined_status_maps_to_declined() {
        let err = terminal_outcome(&reply("declined")).unwrap().unwrap_err();
        assert_eq!(err, LedgerError::Declined);
    }

    #[test]
    fn reverted_status_carries_reason() {
        let mut r = reply("reverted");
        r.reason = Some("caller lacks permission".to_string());
        let err = terminal_outcome(&r).unwrap().unwrap_err();
        assert_eq!(
            err,
            LedgerError::Reverted {
                reason: "caller lacks permission".to_string()
            }
        );
    }

    #[test]
    fn unknown_status_is_unavailable() {
        let err = terminal_outcome(&reply("warped")).unwrap().unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_bridge_reports_unavailable() {
        let gateway = SignerBridgeGateway::new(SignerConfig::new("http://127.0.0.1:9"));
        let err = gateway
            .team_members(EntityKind::Sprint, &LedgerRef::from("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable(_)));
    }
}

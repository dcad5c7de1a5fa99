//! HTTP-backed relational store and audit sink.
//!
//! The system of record is an external service speaking JSON envelopes
//! `{ success, data | message }` over authenticated HTTPS. The audit
//! sink lives on the same service.

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::audit::{AuditFilter, AuditLog, AuditPage, AuditRecord};
use crate::error::{StoreError, StoreResult};
use crate::relational::RelationalStore;
use crate::types::{EntityKind, Fingerprint, LedgerRef, LocalId, StoredEntity};

/// Relational API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.example.com/api`.
    pub base_url: String,
    /// Bearer token for authenticated calls.
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: std::env::var("SCRUMSYNC_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api".to_string()),
            token: std::env::var("SCRUMSYNC_API_TOKEN").ok(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn new(base_url: &str) -> Self {
        ApiConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }
}

/// URL path segment for an entity kind.
fn entity_route(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Team => "teams",
        EntityKind::BacklogItem => "backlog-items",
        EntityKind::Sprint => "sprints",
        EntityKind::Task => "tasks",
    }
}

/// The store's JSON envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct InsertBody<'a> {
    team_id: Option<LocalId>,
    fields: &'a Value,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a> {
    fields: &'a Value,
}

#[derive(Debug, Serialize)]
struct LinkBody<'a> {
    ledger_ref: &'a LedgerRef,
    fingerprint: &'a Fingerprint,
}

#[derive(Debug, Deserialize)]
struct PurgeReply {
    removed: u64,
}

/// Shared envelope-speaking client.
struct ApiClient {
    config: ApiConfig,
    http: reqwest::Client,
}

impl ApiClient {
    fn new(config: ApiConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("scrumsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");
        ApiClient { config, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Send a request and unwrap the envelope. A successful envelope may
    /// legitimately carry no data (deletes, link updates). `context`
    /// maps non-envelope HTTP statuses (404, 409) onto typed errors.
    async fn send_envelope<T: DeserializeOwned>(
        &self,
        rb: RequestBuilder,
        context: Option<(EntityKind, LocalId)>,
    ) -> StoreResult<Option<T>> {
        let resp = self
            .authed(rb)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(StoreError::Auth(format!("HTTP {status}")));
        }
        if let Some((kind, id)) = context {
            if status == StatusCode::NOT_FOUND {
                return Err(StoreError::NotFound { kind, id });
            }
            if status == StatusCode::CONFLICT {
                return Err(StoreError::LedgerRefConflict { kind, id });
            }
        }

        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        if envelope.success {
            Ok(envelope.data)
        } else {
            Err(StoreError::Rejected {
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("HTTP {status}")),
            })
        }
    }

    /// Like [`Self::send_envelope`], but the data is required.
    async fn send<T: DeserializeOwned>(
        &self,
        rb: RequestBuilder,
        context: Option<(EntityKind, LocalId)>,
    ) -> StoreResult<T> {
        self.send_envelope(rb, context)
            .await?
            .ok_or_else(|| StoreError::Decode("successful envelope without data".to_string()))
    }

    /// Like [`Self::send_envelope`], discarding any data.
    async fn send_ok(
        &self,
        rb: RequestBuilder,
        context: Option<(EntityKind, LocalId)>,
    ) -> StoreResult<()> {
        self.send_envelope::<Value>(rb, context).await.map(|_| ())
    }
}

/// HTTP implementation of [`RelationalStore`].
pub struct HttpRelationalStore {
    client: ApiClient,
}

impl HttpRelationalStore {
    pub fn new(config: ApiConfig) -> Self {
        HttpRelationalStore {
            client: ApiClient::new(config),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ApiConfig::from_env())
    }
}

#[async_trait]
impl RelationalStore for HttpRelationalStore {
    async fn insert(
        &self,
        kind: EntityKind,
        team_id: Option<LocalId>,
        fields: Value,
    ) -> StoreResult<StoredEntity> {
        debug!(kind = %kind, "relational insert");
        let rb = self
            .client
            .http
            .post(self.client.url(entity_route(kind)))
            .json(&InsertBody {
                team_id,
                fields: &fields,
            });
        self.client.send(rb, None).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: LocalId,
        fields: Value,
    ) -> StoreResult<StoredEntity> {
        debug!(kind = %kind, id = %id, "relational update");
        let rb = self
            .client
            .http
            .put(self.client.url(&format!("{}/{}", entity_route(kind), id)))
            .json(&UpdateBody { fields: &fields });
        self.client.send(rb, Some((kind, id))).await
    }

    async fn delete(&self, kind: EntityKind, id: LocalId) -> StoreResult<()> {
        debug!(kind = %kind, id = %id, "relational delete");
        let rb = self
            .client
            .http
            .delete(self.client.url(&format!("{}/{}", entity_route(kind), id)));
        self.client.send_ok(rb, Some((kind, id))).await
    }

    async fn fetch(&self, kind: EntityKind, id: LocalId) -> StoreResult<StoredEntity> {
        let rb = self
            .client
            .http
            .get(self.client.url(&format!("{}/{}", entity_route(kind), id)));
        self.client.send(rb, Some((kind, id))).await
    }

    async fn list(
        &self,
        kind: EntityKind,
        team_id: Option<LocalId>,
    ) -> StoreResult<Vec<StoredEntity>> {
        let mut rb = self.client.http.get(self.client.url(entity_route(kind)));
        if let Some(team) = team_id {
            rb = rb.query(&[("team_id", team.0)]);
        }
        self.client.send(rb, None).await
    }

    async fn record_ledger_link(
        &self,
        kind: EntityKind,
        id: LocalId,
        ledger_ref: &LedgerRef,
        fingerprint: &Fingerprint,
    ) -> StoreResult<()> {
        debug!(kind = %kind, id = %id, ledger_ref = %ledger_ref, "record ledger link");
        let rb = self
            .client
            .http
            .put(
                self.client
                    .url(&format!("{}/{}/ledger-link", entity_route(kind), id)),
            )
            .json(&LinkBody {
                ledger_ref,
                fingerprint,
            });
        self.client.send_ok(rb, Some((kind, id))).await
    }
}

/// HTTP implementation of [`AuditLog`], sharing the relational API.
pub struct HttpAuditLog {
    client: ApiClient,
}

impl HttpAuditLog {
    pub fn new(config: ApiConfig) -> Self {
        HttpAuditLog {
            client: ApiClient::new(config),
        }
    }

    pub fn from_env() -> Self {
        Self::new(ApiConfig::from_env())
    }
}

#[async_trait]
impl AuditLog for HttpAuditLog {
    async fn append(&self, record: AuditRecord) -> StoreResult<()> {
        let rb = self.client.http.post(self.client.url("audit")).json(&record);
        self.client.send_ok(rb, None).await
    }

    async fn query(
        &self,
        filter: AuditFilter,
        offset: usize,
        limit: usize,
    ) -> StoreResult<AuditPage> {
        let mut params: Vec<(&str, String)> = vec![
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(kind) = filter.kind {
            params.push(("kind", kind.as_str().to_string()));
        }
        if let Some(method) = &filter.method {
            params.push(("method", method.clone()));
        }
        if let Some(outcome) = filter.outcome {
            params.push(("outcome", outcome.as_str().to_string()));
        }
        let rb = self.client.http.get(self.client.url("audit")).query(&params);
        self.client.send(rb, None).await
    }

    async fn purge(&self) -> StoreResult<u64> {
        let rb = self.client.http.delete(self.client.url("audit"));
        let reply: PurgeReply = self.client.send(rb, None).await?;
        Ok(reply.removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_config_default() {
        let config = ApiConfig::default();
        assert!(!config.base_url.is_empty());
    }

    #[test]
    fn test_api_config_new_trims_trailing_slash() {
        let config = ApiConfig::new("https://api.example.com/api/");
        assert_eq!(config.base_url, "https://api.example.com/api");
    }

    #[test]
    fn test_api_config_with_token() {
        let config = ApiConfig::new("https://api.example.com").with_token("secret");
        assert_eq!(config.token, Some("secret".to_string()));
    }

    #[test]
    fn entity_routes_are_plural_kebab() {
        assert_eq!(entity_route(EntityKind::Team), "teams");
        assert_eq!(entity_route(EntityKind::BacklogItem), "backlog-items");
        assert_eq!(entity_route(EntityKind::Sprint), "sprints");
        assert_eq!(entity_route(EntityKind::Task), "tasks");
    }

    #[test]
    fn envelope_failure_carries_message() {
        let raw = r#"{"success": false, "message": "team 3 not found"}"#;
        let envelope: Envelope<StoredEntity> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.message.as_deref(), Some("team 3 not found"));
    }

    #[test]
    fn envelope_success_decodes_row() {
        let raw = r#"{
            "success": true,
            "data": {
                "kind": "backlog_item",
                "local_id": 42,
                "team_id": 3,
                "fields": {"title": "Login flow"},
                "ledger_ref": "7",
                "ledger_fingerprint": null,
                "created_at": "2026-02-11T08:30:00Z"
            },
            "message": null
        }"#;
        let envelope: Envelope<StoredEntity> = serde_json::from_str(raw).unwrap();
        let row = envelope.data.unwrap();
        assert_eq!(row.kind, EntityKind::BacklogItem);
        assert_eq!(row.local_id, LocalId(42));
        assert_eq!(row.ledger_ref, Some(LedgerRef::from("7")));
    }

    #[tokio::test]
    async fn unreachable_store_reports_network_error() {
        let store = HttpRelationalStore::new(ApiConfig::new("http://127.0.0.1:9/api"));
        let err = store.fetch(EntityKind::Team, LocalId(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Network(_)));
    }
}

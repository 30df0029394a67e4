//! Tenant source backed by a PostgREST-style HTTP API.
//!
//! Resolution takes two requests: the SIP number is mapped to its owning
//! client through `client_sip_numbers`, then that client's row is read from
//! `client_configurations`. Unknown numbers, inactive clients and clients
//! without a configuration row all resolve to "not found".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use zeroize::Zeroize;

use super::tenant::TenantConfig;
use super::{DirectoryError, DirectoryResult, TenantSource};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize)]
struct SipNumberRow {
    client_id: String,
    #[serde(default)]
    clients: Option<ClientRow>,
}

#[derive(Debug, Deserialize)]
struct ClientRow {
    #[serde(default)]
    client_name: Option<String>,
    #[serde(default)]
    active: bool,
}

pub struct RestTenantSource {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for RestTenantSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTenantSource")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Drop for RestTenantSource {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl RestTenantSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> DirectoryResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| DirectoryError::Source(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn select(&self, table: &str, query: &[(&str, &str)]) -> DirectoryResult<Vec<Value>> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let response = self
            .http_client
            .get(&url)
            .query(query)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Source(format!(
                "{table} query failed with {status}: {body}"
            )));
        }

        let rows: Vec<Value> = response.json().await?;
        Ok(rows)
    }
}

#[async_trait]
impl TenantSource for RestTenantSource {
    async fn fetch(&self, id: &str) -> DirectoryResult<Option<TenantConfig>> {
        let sip_filter = format!("eq.{id}");
        let rows = self
            .select(
                "client_sip_numbers",
                &[
                    ("select", "client_id,clients(client_id,client_name,active)"),
                    ("sip_number", &sip_filter),
                    ("active", "eq.true"),
                ],
            )
            .await?;

        let Some(row) = rows.into_iter().next() else {
            debug!(sip_number = %id, "SIP number not registered");
            return Ok(None);
        };
        let row: SipNumberRow =
            serde_json::from_value(row).map_err(|e| DirectoryError::Parse(e.to_string()))?;

        let client_name = match row.clients {
            Some(client) if client.active => client.client_name,
            _ => {
                warn!(sip_number = %id, "Client inactive for SIP number");
                return Ok(None);
            }
        };

        let client_filter = format!("eq.{}", row.client_id);
        let configs = self
            .select(
                "client_configurations",
                &[("select", "*"), ("client_id", &client_filter)],
            )
            .await?;

        let Some(config_row) = configs.into_iter().next() else {
            warn!(
                sip_number = %id,
                client = client_name.as_deref().unwrap_or("-"),
                "No configuration row for client"
            );
            return Ok(None);
        };

        let mut config = tenant_from_row(config_row)?;
        config.client_name = client_name;
        Ok(Some(config))
    }

    fn name(&self) -> &'static str {
        "rest"
    }
}

/// Map a configuration row onto [`TenantConfig`]. Null columns take defaults.
fn tenant_from_row(row: Value) -> DirectoryResult<TenantConfig> {
    let Value::Object(mut columns) = row else {
        return Err(DirectoryError::Parse(
            "configuration row is not an object".to_string(),
        ));
    };
    columns.retain(|_, value| !value.is_null());
    serde_json::from_value(Value::Object(columns)).map_err(|e| DirectoryError::Parse(e.to_string()))
}

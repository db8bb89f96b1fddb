use crate::analysis::CostConfig;
use crate::http::build_client;
use crate::models::{Analysis, AnalysisDraft, AnalysisPatch};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use thiserror::Error;

const ANALYSES_TABLE: &str = "product_analyses";
const SETTINGS_TABLE: &str = "analysis_settings";
const SETTINGS_ROW_ID: &str = "default";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

/// Settings collaborator. A fetch failure is absorbed by the service,
/// which proceeds on the documented default configuration.
pub trait SettingsSource: Send + Sync {
    fn cost_config(&self) -> impl Future<Output = Result<CostConfig, StoreError>> + Send;

    fn save_cost_config(
        &self,
        config: &CostConfig,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Persistence collaborator for analysis records. List and search return
/// snapshots, never live references.
pub trait AnalysisStore: Send + Sync {
    fn save(&self, draft: &AnalysisDraft)
    -> impl Future<Output = Result<String, StoreError>> + Send;

    fn list(&self, limit: u32) -> impl Future<Output = Result<Vec<Analysis>, StoreError>> + Send;

    fn search(&self, term: &str)
    -> impl Future<Output = Result<Vec<Analysis>, StoreError>> + Send;

    fn update(
        &self,
        id: &str,
        patch: &AnalysisPatch,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Supabase-backed document store holding analyses and the single
/// settings row.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    base_url: String,
    service_key: String,
    http: Client,
}

impl SupabaseStore {
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("SUPABASE_URL").ok()?;
        let service_key = std::env::var("SUPABASE_SERVICE_ROLE_KEY")
            .or_else(|_| std::env::var("SUPABASE_SERVICE_KEY"))
            .or_else(|_| std::env::var("SUPABASE_KEY"))
            .ok()?;
        Some(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            http: build_client(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }
}

fn require_success(response: &reqwest::Response) -> Result<(), StoreError> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(StoreError::Request(format!("HTTP {}", response.status())))
    }
}

impl AnalysisStore for SupabaseStore {
    async fn save(&self, draft: &AnalysisDraft) -> Result<String, StoreError> {
        #[derive(Deserialize)]
        struct SavedRow {
            id: String,
        }

        let response = self
            .authed(self.http.post(self.table_url(ANALYSES_TABLE)))
            .header("Prefer", "return=representation")
            .json(draft)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        require_success(&response)?;

        let mut rows: Vec<SavedRow> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        rows.pop()
            .map(|row| row.id)
            .ok_or_else(|| StoreError::Deserialize("insert returned no row".to_string()))
    }

    async fn list(&self, limit: u32) -> Result<Vec<Analysis>, StoreError> {
        let response = self
            .authed(self.http.get(self.table_url(ANALYSES_TABLE)))
            .query(&[
                ("select", "*".to_string()),
                ("order", "lastUpdated.desc".to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        require_success(&response)?;
        response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    async fn search(&self, term: &str) -> Result<Vec<Analysis>, StoreError> {
        let response = self
            .authed(self.http.get(self.table_url(ANALYSES_TABLE)))
            .query(&[
                ("select", "*".to_string()),
                ("title", format!("ilike.*{}*", term.trim())),
                ("order", "lastUpdated.desc".to_string()),
            ])
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        require_success(&response)?;
        response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))
    }

    async fn update(&self, id: &str, patch: &AnalysisPatch) -> Result<(), StoreError> {
        let mut body = serde_json::to_value(patch)
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        body.as_object_mut()
            .expect("patch serializes to an object")
            .insert("lastUpdated".to_string(), json!(Utc::now()));

        let response = self
            .authed(self.http.patch(self.table_url(ANALYSES_TABLE)))
            .query(&[("id", format!("eq.{id}"))])
            .json(&body)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        require_success(&response)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .authed(self.http.delete(self.table_url(ANALYSES_TABLE)))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        require_success(&response)
    }
}

impl SettingsSource for SupabaseStore {
    async fn cost_config(&self) -> Result<CostConfig, StoreError> {
        #[derive(Deserialize)]
        struct SettingsRow {
            #[serde(flatten)]
            config: CostConfig,
        }

        let response = self
            .authed(self.http.get(self.table_url(SETTINGS_TABLE)))
            .query(&[
                ("select", "*".to_string()),
                ("id", format!("eq.{SETTINGS_ROW_ID}")),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        require_success(&response)?;

        let mut rows: Vec<SettingsRow> = response
            .json()
            .await
            .map_err(|err| StoreError::Deserialize(err.to_string()))?;
        // No row yet means the operator never saved settings; that is the
        // documented default, not a failure.
        Ok(rows
            .pop()
            .map(|row| row.config)
            .unwrap_or_default())
    }

    async fn save_cost_config(&self, config: &CostConfig) -> Result<(), StoreError> {
        let mut body =
            serde_json::to_value(config).map_err(|err| StoreError::Deserialize(err.to_string()))?;
        body.as_object_mut()
            .expect("config serializes to an object")
            .insert("id".to_string(), json!(SETTINGS_ROW_ID));

        let response = self
            .authed(self.http.post(self.table_url(SETTINGS_TABLE)))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&body)
            .send()
            .await
            .map_err(|err| StoreError::Request(err.to_string()))?;
        require_success(&response)
    }
}

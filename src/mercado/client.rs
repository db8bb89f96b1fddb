use crate::http::build_client;
use crate::mercado::config::{ACCESS_TOKEN, ROOT, SITE_ID};
use crate::mercado::types::{RawCompetition, RawItem, SearchResponse};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::future::Future;
use thiserror::Error;
use tracing::debug;
use urlencoding::encode;

#[derive(Debug, Error)]
pub enum MercadoError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("listing {0} not found")]
    NotFound(String),
    #[error("invalid response: {0}")]
    Deserialize(String),
}

/// The marketplace collaborator as the core consumes it. The service and
/// the catalog fetcher take any implementation; tests inject fakes.
pub trait ListingSource: Send + Sync {
    fn get_item(&self, id: &str) -> impl Future<Output = Result<RawItem, MercadoError>> + Send;

    fn search(
        &self,
        query: Option<&str>,
        category_id: Option<&str>,
        limit: u32,
        sort: Option<&str>,
    ) -> impl Future<Output = Result<Vec<RawItem>, MercadoError>> + Send;

    /// `Ok(None)` means the marketplace has no competition data for this
    /// listing; transport failures are `Err`. Callers treat both the same
    /// way and fall back to estimation.
    fn competition(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<RawCompetition>, MercadoError>> + Send;
}

/// Mercado Livre open-API client. Every call is bounded by the shared
/// client timeouts and reports failure instead of retrying.
#[derive(Debug, Clone)]
pub struct MercadoClient {
    http: Client,
}

impl MercadoClient {
    pub fn from_env() -> Self {
        Self {
            http: build_client(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if ACCESS_TOKEN.is_empty() {
            request
        } else {
            request.bearer_auth(ACCESS_TOKEN.as_str())
        }
    }
}

impl ListingSource for MercadoClient {
    async fn get_item(&self, id: &str) -> Result<RawItem, MercadoError> {
        let url = format!("{}/items/{}", *ROOT, encode(id));
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|err| MercadoError::Request(err.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(MercadoError::NotFound(id.to_string()));
        }
        if !response.status().is_success() {
            return Err(MercadoError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|err| MercadoError::Deserialize(err.to_string()))
    }

    async fn search(
        &self,
        query: Option<&str>,
        category_id: Option<&str>,
        limit: u32,
        sort: Option<&str>,
    ) -> Result<Vec<RawItem>, MercadoError> {
        let url = format!("{}/sites/{}/search", *ROOT, *SITE_ID);
        let mut params: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(query) = query.filter(|value| !value.trim().is_empty()) {
            params.push(("q", query.to_string()));
        }
        if let Some(category) = category_id.filter(|value| !value.trim().is_empty()) {
            params.push(("category", category.to_string()));
        }
        if let Some(sort) = sort {
            params.push(("sort", sort.to_string()));
        }

        let response = self
            .http
            .get(url)
            .query(&params)
            .send()
            .await
            .map_err(|err| MercadoError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(MercadoError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }
        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|err| MercadoError::Deserialize(err.to_string()))?;
        debug!(
            target = "margem.ml",
            results = payload.results.len(),
            "search_completed"
        );
        Ok(payload.results)
    }

    async fn competition(&self, id: &str) -> Result<Option<RawCompetition>, MercadoError> {
        let url = format!("{}/items/{}/price_to_win", *ROOT, encode(id));
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|err| MercadoError::Request(err.to_string()))?;
        if !response.status().is_success() {
            debug!(
                target = "margem.ml",
                listing_id = id,
                status = %response.status(),
                "competition_unavailable"
            );
            return Ok(None);
        }
        let payload: RawCompetition = response
            .json()
            .await
            .map_err(|err| MercadoError::Deserialize(err.to_string()))?;
        Ok(Some(payload))
    }
}

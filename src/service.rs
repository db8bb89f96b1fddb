use crate::analysis::{
    self, CompetitionEstimator, CompetitionSummary, CostConfig, Listing, demo,
};
use crate::mercado::ListingSource;
use crate::models::{Analysis, AnalysisDraft, AnalysisPatch};
use crate::store::{AnalysisStore, SettingsSource};
use chrono::Utc;
use std::future::Future;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

const PERSIST_WARNING: &str = "analysis was generated but could not be saved to the database";

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct ServiceError {
    stage: &'static str,
    message: String,
    kind: ServiceErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    InvalidInput,
    NotFound,
    Internal,
}

impl ServiceError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: ServiceErrorKind::InvalidInput,
        }
    }

    pub fn not_found(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: ServiceErrorKind::NotFound,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: ServiceErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> ServiceErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

/// Orchestrates one analysis request end to end.
///
/// Collaborators are injected at construction; absent ones (`None`)
/// behave like permanently failing ones and trigger the same fallbacks.
/// Only a listing that resolves nowhere is a fatal error; competition,
/// settings and persistence failures degrade to documented defaults.
pub struct AnalysisService<M, S, P> {
    marketplace: M,
    settings: Option<S>,
    store: Option<P>,
    estimator: Box<dyn CompetitionEstimator>,
}

impl<M, S, P> AnalysisService<M, S, P>
where
    M: ListingSource,
    S: SettingsSource,
    P: AnalysisStore,
{
    pub fn new(
        marketplace: M,
        settings: Option<S>,
        store: Option<P>,
        estimator: Box<dyn CompetitionEstimator>,
    ) -> Self {
        Self {
            marketplace,
            settings,
            store,
            estimator,
        }
    }

    pub async fn analyze(&self, listing_id: &str) -> Result<Analysis, ServiceError> {
        let listing_id = listing_id.trim();
        if listing_id.is_empty() {
            return Err(ServiceError::invalid_input(
                "fetch_listing",
                "listing id must not be empty",
            ));
        }

        let listing = timed("fetch_listing", self.fetch_listing(listing_id)).await?;
        let competition = timed("fetch_competition", self.fetch_competition(&listing)).await;
        let config = timed("fetch_config", self.effective_cost_config()).await;

        let breakdown = analysis::cost::compute(listing.price, &config)
            .map_err(|err| ServiceError::invalid_input("compute", err.to_string()))?;

        let draft = AnalysisDraft {
            listing_id: listing.id.clone(),
            title: listing.title.clone(),
            current_price: listing.price,
            sold_quantity: listing.sold_quantity,
            breakdown,
            competition,
            last_updated: Utc::now(),
        };

        Ok(timed("persist", self.persist(draft)).await)
    }

    async fn fetch_listing(&self, id: &str) -> Result<Listing, ServiceError> {
        match self.marketplace.get_item(id).await {
            Ok(raw) => {
                if let Some(listing) = analysis::normalize(&raw) {
                    return Ok(listing);
                }
                warn!(
                    target = "margem.analysis",
                    listing_id = id,
                    "item_failed_normalization"
                );
            }
            Err(err) => {
                warn!(
                    target = "margem.ml",
                    listing_id = id,
                    error = %err,
                    "item_lookup_failed"
                );
            }
        }

        demo::find(id).ok_or_else(|| {
            ServiceError::not_found("fetch_listing", format!("listing {id} not found"))
        })
    }

    async fn fetch_competition(&self, listing: &Listing) -> CompetitionSummary {
        match self.marketplace.competition(&listing.id).await {
            Ok(Some(raw)) => analysis::competition::from_price_to_win(listing, &raw),
            Ok(None) => {
                info!(
                    target = "margem.analysis",
                    listing_id = %listing.id,
                    "competition_data_absent_estimating"
                );
                self.estimator.estimate(listing)
            }
            Err(err) => {
                warn!(
                    target = "margem.ml",
                    listing_id = %listing.id,
                    error = %err,
                    "competition_fetch_failed_estimating"
                );
                self.estimator.estimate(listing)
            }
        }
    }

    /// The configuration an analysis will run with right now: the stored
    /// one when reachable and sane, the documented default otherwise.
    pub async fn effective_cost_config(&self) -> CostConfig {
        let Some(settings) = &self.settings else {
            return CostConfig::default();
        };
        match settings.cost_config().await {
            Ok(config) if config.is_valid() => config,
            Ok(config) => {
                warn!(
                    target = "margem.store",
                    ?config,
                    "stored_config_out_of_range_using_default"
                );
                CostConfig::default()
            }
            Err(err) => {
                warn!(
                    target = "margem.store",
                    error = %err,
                    "settings_fetch_failed_using_default"
                );
                CostConfig::default()
            }
        }
    }

    async fn persist(&self, draft: AnalysisDraft) -> Analysis {
        if let Some(store) = &self.store {
            match store.save(&draft).await {
                Ok(id) => {
                    info!(
                        target = "margem.store",
                        analysis_id = %id,
                        listing_id = %draft.listing_id,
                        "analysis_saved"
                    );
                    return Analysis {
                        id,
                        record: draft,
                        warning: None,
                    };
                }
                Err(err) => {
                    warn!(
                        target = "margem.store",
                        listing_id = %draft.listing_id,
                        error = %err,
                        "analysis_save_failed_returning_transient"
                    );
                }
            }
        }
        Analysis {
            id: temp_analysis_id(),
            record: draft,
            warning: Some(PERSIST_WARNING.to_string()),
        }
    }

    pub async fn save_cost_config(&self, config: &CostConfig) -> Result<(), ServiceError> {
        if !config.is_valid() {
            return Err(ServiceError::invalid_input(
                "save_settings",
                "target margin must be within [0, 100] and costs non-negative",
            ));
        }
        let Some(settings) = &self.settings else {
            return Err(ServiceError::internal(
                "save_settings",
                "settings store not configured",
            ));
        };
        settings
            .save_cost_config(config)
            .await
            .map_err(|err| ServiceError::internal("save_settings", err.to_string()))
    }

    pub async fn list_analyses(
        &self,
        limit: u32,
        search: Option<&str>,
    ) -> Result<Vec<Analysis>, ServiceError> {
        let store = self.require_store("list_analyses")?;
        let result = match search.map(str::trim).filter(|term| !term.is_empty()) {
            Some(term) => store.search(term).await,
            None => store.list(limit).await,
        };
        result.map_err(|err| ServiceError::internal("list_analyses", err.to_string()))
    }

    pub async fn update_analysis(
        &self,
        id: &str,
        patch: &AnalysisPatch,
    ) -> Result<(), ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::invalid_input(
                "update_analysis",
                "patch must set at least one field",
            ));
        }
        if let Some(price) = patch.current_price
            && (!price.is_finite() || price <= 0.0)
        {
            return Err(ServiceError::invalid_input(
                "update_analysis",
                "currentPrice must be positive",
            ));
        }
        let store = self.require_store("update_analysis")?;
        store
            .update(id, patch)
            .await
            .map_err(|err| ServiceError::internal("update_analysis", err.to_string()))
    }

    pub async fn delete_analysis(&self, id: &str) -> Result<(), ServiceError> {
        let store = self.require_store("delete_analysis")?;
        store
            .delete(id)
            .await
            .map_err(|err| ServiceError::internal("delete_analysis", err.to_string()))
    }

    fn require_store(&self, stage: &'static str) -> Result<&P, ServiceError> {
        self.store
            .as_ref()
            .ok_or_else(|| ServiceError::internal(stage, "persistence store not configured"))
    }
}

fn temp_analysis_id() -> String {
    format!("temp-{}", Uuid::new_v4().simple())
}

async fn timed<T, Fut>(stage: &'static str, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let started = Instant::now();
    let value = fut.await;
    crate::metrics::stage_elapsed(stage, started.elapsed().as_millis());
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::normalize::ListingOrigin;
    use crate::mercado::MercadoError;
    use crate::mercado::types::{RawCompetition, RawItem, RawShipping};
    use crate::store::StoreError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeMarketplace {
        item: Option<RawItem>,
        item_error: bool,
        competition: Option<RawCompetition>,
        competition_error: bool,
    }

    impl Default for FakeMarketplace {
        fn default() -> Self {
            Self {
                item: Some(sample_raw()),
                item_error: false,
                competition: None,
                competition_error: false,
            }
        }
    }

    impl ListingSource for FakeMarketplace {
        async fn get_item(&self, id: &str) -> Result<RawItem, MercadoError> {
            if self.item_error {
                return Err(MercadoError::Request("connection refused".to_string()));
            }
            self.item
                .clone()
                .ok_or_else(|| MercadoError::NotFound(id.to_string()))
        }

        async fn search(
            &self,
            _query: Option<&str>,
            _category_id: Option<&str>,
            _limit: u32,
            _sort: Option<&str>,
        ) -> Result<Vec<RawItem>, MercadoError> {
            Ok(vec![])
        }

        async fn competition(&self, _id: &str) -> Result<Option<RawCompetition>, MercadoError> {
            if self.competition_error {
                return Err(MercadoError::Request("timeout".to_string()));
            }
            Ok(self.competition.clone())
        }
    }

    struct FakeSettings {
        config: CostConfig,
        fail: bool,
    }

    impl SettingsSource for FakeSettings {
        async fn cost_config(&self) -> Result<CostConfig, StoreError> {
            if self.fail {
                Err(StoreError::Request("store down".to_string()))
            } else {
                Ok(self.config)
            }
        }

        async fn save_cost_config(&self, _config: &CostConfig) -> Result<(), StoreError> {
            if self.fail {
                Err(StoreError::Request("store down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<Analysis>>,
        sequence: AtomicUsize,
    }

    impl AnalysisStore for MemoryStore {
        async fn save(&self, draft: &AnalysisDraft) -> Result<String, StoreError> {
            let id = format!("an-{:04}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
            self.rows.lock().unwrap().push(Analysis {
                id: id.clone(),
                record: draft.clone(),
                warning: None,
            });
            Ok(id)
        }

        async fn list(&self, limit: u32) -> Result<Vec<Analysis>, StoreError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().take(limit as usize).cloned().collect())
        }

        async fn search(&self, term: &str) -> Result<Vec<Analysis>, StoreError> {
            let needle = term.to_lowercase();
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .filter(|row| row.record.title.to_lowercase().contains(&needle))
                .cloned()
                .collect())
        }

        async fn update(&self, id: &str, patch: &AnalysisPatch) -> Result<(), StoreError> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|row| row.id == id) {
                if let Some(price) = patch.current_price {
                    row.record.current_price = price;
                }
                if let Some(sold) = patch.sold_quantity {
                    row.record.sold_quantity = sold;
                }
                row.record.last_updated = Utc::now();
            }
            Ok(())
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.rows.lock().unwrap().retain(|row| row.id != id);
            Ok(())
        }
    }

    struct FailingStore;

    impl AnalysisStore for FailingStore {
        async fn save(&self, _draft: &AnalysisDraft) -> Result<String, StoreError> {
            Err(StoreError::Request("write denied".to_string()))
        }

        async fn list(&self, _limit: u32) -> Result<Vec<Analysis>, StoreError> {
            Err(StoreError::Request("read denied".to_string()))
        }

        async fn search(&self, _term: &str) -> Result<Vec<Analysis>, StoreError> {
            Err(StoreError::Request("read denied".to_string()))
        }

        async fn update(&self, _id: &str, _patch: &AnalysisPatch) -> Result<(), StoreError> {
            Err(StoreError::Request("write denied".to_string()))
        }

        async fn delete(&self, _id: &str) -> Result<(), StoreError> {
            Err(StoreError::Request("write denied".to_string()))
        }
    }

    struct FixedEstimator;

    impl CompetitionEstimator for FixedEstimator {
        fn estimate(&self, listing: &Listing) -> CompetitionSummary {
            CompetitionSummary {
                total_listings: 25,
                average_price: listing.price,
                lowest_price: listing.price * 0.85,
                is_winning: true,
                is_estimated: true,
            }
        }
    }

    fn sample_raw() -> RawItem {
        RawItem {
            id: Some("MLB777".to_string()),
            title: Some("Teclado mecânico 60%".to_string()),
            price: Some(350.0),
            sold_quantity: Some(98),
            available_quantity: Some(12),
            condition: Some("new".to_string()),
            listing_type_id: Some("gold_special".to_string()),
            category_id: Some("MLB1700".to_string()),
            permalink: Some("https://produto.mercadolivre.com.br/MLB-777".to_string()),
            shipping: Some(RawShipping {
                free_shipping: true,
            }),
        }
    }

    fn service<P: AnalysisStore>(
        marketplace: FakeMarketplace,
        settings: Option<FakeSettings>,
        store: Option<P>,
    ) -> AnalysisService<FakeMarketplace, FakeSettings, P> {
        AnalysisService::new(marketplace, settings, store, Box::new(FixedEstimator))
    }

    #[tokio::test]
    async fn analyze_happy_path_persists_and_returns_durable_record() {
        let svc = service(
            FakeMarketplace::default(),
            Some(FakeSettings {
                config: CostConfig::default(),
                fail: false,
            }),
            Some(MemoryStore::default()),
        );
        let analysis = svc.analyze("MLB777").await.expect("analyze");
        assert!(analysis.is_durable());
        assert!(analysis.warning.is_none());
        assert_eq!(analysis.record.listing_id, "MLB777");
        assert_eq!(analysis.record.current_price, 350.0);
        assert!(analysis.record.competition.is_estimated);
    }

    #[tokio::test]
    async fn analyze_rejects_blank_listing_id() {
        let svc = service::<MemoryStore>(FakeMarketplace::default(), None, None);
        let err = svc.analyze("   ").await.expect_err("should reject");
        assert_eq!(err.kind(), ServiceErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn listing_missing_everywhere_is_not_found() {
        let marketplace = FakeMarketplace {
            item: None,
            ..FakeMarketplace::default()
        };
        let svc = service::<MemoryStore>(marketplace, None, None);
        let err = svc.analyze("MLB000").await.expect_err("should fail");
        assert_eq!(err.kind(), ServiceErrorKind::NotFound);
        assert_eq!(err.stage(), "fetch_listing");
    }

    #[tokio::test]
    async fn marketplace_outage_falls_back_to_demo_dataset() {
        let marketplace = FakeMarketplace {
            item_error: true,
            ..FakeMarketplace::default()
        };
        let svc = service(marketplace, None, Some(MemoryStore::default()));
        let analysis = svc.analyze("MLB123456789").await.expect("analyze");
        assert_eq!(analysis.record.listing_id, "MLB123456789");
        assert!(
            analysis.record.title.contains("Galaxy A54"),
            "demo listing should back the analysis"
        );
    }

    #[tokio::test]
    async fn real_competition_data_is_mapped_not_estimated() {
        let marketplace = FakeMarketplace {
            competition: Some(RawCompetition {
                total_listings: Some(7),
                average_price: Some(360.0),
                lowest_price: Some(290.0),
                price_to_win: Some(340.0),
                status: None,
            }),
            ..FakeMarketplace::default()
        };
        let svc = service(marketplace, None, Some(MemoryStore::default()));
        let analysis = svc.analyze("MLB777").await.expect("analyze");
        let competition = analysis.record.competition;
        assert!(!competition.is_estimated);
        assert_eq!(competition.total_listings, 7);
        assert!(!competition.is_winning, "price 350 is above price_to_win 340");
    }

    #[tokio::test]
    async fn competition_failure_degrades_to_estimator() {
        let marketplace = FakeMarketplace {
            competition_error: true,
            ..FakeMarketplace::default()
        };
        let svc = service(marketplace, None, Some(MemoryStore::default()));
        let analysis = svc.analyze("MLB777").await.expect("analyze");
        assert!(analysis.record.competition.is_estimated);
        assert_eq!(analysis.record.competition.total_listings, 25);
    }

    #[tokio::test]
    async fn settings_failure_falls_back_to_default_config() {
        let svc = service(
            FakeMarketplace::default(),
            Some(FakeSettings {
                config: CostConfig::default(),
                fail: true,
            }),
            Some(MemoryStore::default()),
        );
        let analysis = svc.analyze("MLB777").await.expect("analyze");
        let expected =
            analysis::cost::compute(350.0, &CostConfig::default()).expect("compute");
        assert_eq!(analysis.record.breakdown, expected);
    }

    #[tokio::test]
    async fn out_of_range_stored_config_is_ignored() {
        let svc = service::<MemoryStore>(
            FakeMarketplace::default(),
            Some(FakeSettings {
                config: CostConfig {
                    target_profit_margin_percent: 250.0,
                    ..CostConfig::default()
                },
                fail: false,
            }),
            None,
        );
        assert_eq!(svc.effective_cost_config().await, CostConfig::default());
    }

    #[tokio::test]
    async fn persistence_failure_returns_transient_record_with_warning() {
        let svc = service(
            FakeMarketplace::default(),
            None,
            Some(FailingStore),
        );
        let analysis = svc.analyze("MLB777").await.expect("analyze survives");
        assert!(analysis.id.starts_with("temp-"));
        assert!(!analysis.is_durable());
        assert!(analysis.warning.is_some());
    }

    #[tokio::test]
    async fn saved_analysis_round_trips_through_list() {
        let svc = service(
            FakeMarketplace::default(),
            None,
            Some(MemoryStore::default()),
        );
        let analysis = svc.analyze("MLB777").await.expect("analyze");
        let listed = svc.list_analyses(10, None).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, analysis.id);
        assert_eq!(listed[0].record.breakdown, analysis.record.breakdown);
    }

    #[tokio::test]
    async fn search_filters_by_title() {
        let svc = service(
            FakeMarketplace::default(),
            None,
            Some(MemoryStore::default()),
        );
        svc.analyze("MLB777").await.expect("analyze");
        let hits = svc.list_analyses(10, Some("teclado")).await.expect("search");
        assert_eq!(hits.len(), 1);
        let misses = svc.list_analyses(10, Some("geladeira")).await.expect("search");
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn update_patch_validation() {
        let svc = service(
            FakeMarketplace::default(),
            None,
            Some(MemoryStore::default()),
        );
        let err = svc
            .update_analysis("an-0001", &AnalysisPatch::default())
            .await
            .expect_err("empty patch");
        assert_eq!(err.kind(), ServiceErrorKind::InvalidInput);

        let err = svc
            .update_analysis(
                "an-0001",
                &AnalysisPatch {
                    current_price: Some(-4.0),
                    sold_quantity: None,
                },
            )
            .await
            .expect_err("negative price");
        assert_eq!(err.kind(), ServiceErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn delete_removes_saved_record() {
        let svc = service(
            FakeMarketplace::default(),
            None,
            Some(MemoryStore::default()),
        );
        let analysis = svc.analyze("MLB777").await.expect("analyze");
        svc.delete_analysis(&analysis.id).await.expect("delete");
        assert!(svc.list_analyses(10, None).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn save_cost_config_rejects_invalid_values() {
        let svc = service::<MemoryStore>(
            FakeMarketplace::default(),
            Some(FakeSettings {
                config: CostConfig::default(),
                fail: false,
            }),
            None,
        );
        let err = svc
            .save_cost_config(&CostConfig {
                shipping_cost_percent: -3.0,
                ..CostConfig::default()
            })
            .await
            .expect_err("invalid config");
        assert_eq!(err.kind(), ServiceErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn demo_fallback_listing_keeps_demo_origin() {
        let listing = demo::find("MLB444555666").expect("demo listing");
        assert_eq!(listing.origin, ListingOrigin::Demo);
        assert!(listing.permalink.is_none());
    }
}

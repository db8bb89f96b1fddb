use crate::analysis::{self, Listing, demo};
use crate::mercado::ListingSource;
use serde::Serialize;
use std::collections::HashSet;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

const SEARCH_LIMIT: u32 = 50;
const SOLD_QUANTITY_DESC: &str = "sold_quantity_desc";

/// One probe against the marketplace search endpoint. The pool below is
/// what "popular" means for this catalog.
struct CatalogProbe {
    label: &'static str,
    query: Option<&'static str>,
    category_id: Option<&'static str>,
}

const POPULAR_PROBES: [CatalogProbe; 4] = [
    CatalogProbe {
        label: "best_sellers",
        query: None,
        category_id: None,
    },
    CatalogProbe {
        label: "phones",
        query: None,
        category_id: Some("MLB1055"),
    },
    CatalogProbe {
        label: "computing",
        query: None,
        category_id: Some("MLB1648"),
    },
    CatalogProbe {
        label: "audio",
        query: Some("fone de ouvido bluetooth"),
        category_id: None,
    },
];

/// A catalog page plus its provenance, so callers can label demo data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    pub listings: Vec<Listing>,
    pub is_demo: bool,
}

/// Aggregates the probe pool into one deduplicated, popularity-sorted
/// listing collection. Never returns an empty page: when every probe
/// comes back dry the fixed demo dataset is served instead.
pub struct CatalogFetcher<M> {
    marketplace: M,
}

impl<M: ListingSource> CatalogFetcher<M> {
    pub fn new(marketplace: M) -> Self {
        Self { marketplace }
    }

    pub async fn fetch_popular(&self) -> CatalogPage {
        let mut collected = Vec::new();
        for (idx, probe) in POPULAR_PROBES.iter().enumerate() {
            if idx > 0 {
                // Pacing between upstream calls, not retry backoff.
                sleep(Duration::from_millis(pacing_ms_from_env())).await;
            }
            match self
                .marketplace
                .search(
                    probe.query,
                    probe.category_id,
                    SEARCH_LIMIT,
                    Some(SOLD_QUANTITY_DESC),
                )
                .await
            {
                Ok(results) => {
                    info!(
                        target = "margem.ml",
                        probe = probe.label,
                        results = results.len(),
                        "catalog_probe_completed"
                    );
                    collected.extend(results);
                }
                Err(err) => {
                    warn!(
                        target = "margem.ml",
                        probe = probe.label,
                        error = %err,
                        "catalog_probe_failed"
                    );
                }
            }
        }

        let mut listings: Vec<Listing> = collected
            .iter()
            .filter_map(analysis::normalize)
            .collect();
        listings = dedupe_by_id(listings);
        listings.sort_by(|a, b| b.sold_quantity.cmp(&a.sold_quantity));

        if listings.is_empty() {
            warn!(
                target = "margem.ml",
                "all_catalog_probes_empty_serving_demo_dataset"
            );
            return CatalogPage {
                listings: demo::catalog(),
                is_demo: true,
            };
        }

        CatalogPage {
            listings,
            is_demo: false,
        }
    }
}

/// Keeps the first occurrence of each id. Idempotent: re-running on an
/// already-deduplicated collection changes nothing.
fn dedupe_by_id(listings: Vec<Listing>) -> Vec<Listing> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for listing in listings {
        if seen.insert(listing.id.clone()) {
            result.push(listing);
        }
    }
    result
}

fn pacing_ms_from_env() -> u64 {
    std::env::var("CATALOG_PACING_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(300)
}

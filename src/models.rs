use crate::analysis::{CompetitionSummary, CostBreakdown};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Everything an analysis record holds except its store-assigned id.
/// This is the exact payload handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisDraft {
    pub listing_id: String,
    pub title: String,
    pub current_price: f64,
    pub sold_quantity: u32,
    #[serde(flatten)]
    pub breakdown: CostBreakdown,
    pub competition: CompetitionSummary,
    pub last_updated: DateTime<Utc>,
}

/// The persisted analysis record as returned to callers.
///
/// `id` comes from the store; when persistence failed it is a locally
/// generated `temp-` id and `warning` explains that the record is not
/// durable.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: String,
    #[serde(flatten)]
    pub record: AnalysisDraft,
    pub warning: Option<String>,
}

impl Analysis {
    pub fn is_durable(&self) -> bool {
        !self.id.starts_with("temp-")
    }
}

/// Whitelisted fields of the update path. Anything else on a record is
/// immutable after construction; the store stamps a fresh `lastUpdated`
/// alongside whatever is set here.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPatch {
    pub current_price: Option<f64>,
    pub sold_quantity: Option<u32>,
}

impl AnalysisPatch {
    pub fn is_empty(&self) -> bool {
        self.current_price.is_none() && self.sold_quantity.is_none()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

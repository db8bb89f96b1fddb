use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// One raw listing as returned by the marketplace, in any of its shapes.
///
/// Search hits, item-detail lookups and demo fixtures overlap but do not
/// agree on which fields are present, so everything beyond the identity
/// fields is optional and resolved during normalization.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawItem {
    pub id: Option<String>,
    pub title: Option<String>,
    pub price: Option<f64>,
    #[serde(default)]
    pub sold_quantity: Option<u32>,
    #[serde(default)]
    pub available_quantity: Option<u32>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub listing_type_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub shipping: Option<RawShipping>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawShipping {
    #[serde(default)]
    pub free_shipping: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<RawItem>,
}

/// Payload of the `price_to_win` competition endpoint. All fields are
/// optional on the wire; absent values degrade to optimistic defaults.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCompetition {
    #[serde(default)]
    pub total_listings: Option<u32>,
    #[serde(default)]
    pub average_price: Option<f64>,
    #[serde(default)]
    pub lowest_price: Option<f64>,
    #[serde(default)]
    pub price_to_win: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
}

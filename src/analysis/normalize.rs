use crate::mercado::types::RawItem;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    New,
    Used,
}

/// Listing tier drives the marketplace commission bracket: `gold_*`
/// listing types are the premium bracket, everything else is classic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingTier {
    Premium,
    Classic,
}

/// Where a listing came from. Set once at construction (by the
/// normalizer for live marketplace data, by the fixture module for demo
/// entries) and never inferred later from the shape of the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingOrigin {
    Live,
    Demo,
}

/// One normalized marketplace item, the only listing shape the rest of
/// the crate works with. Constructed transiently per request and never
/// mutated; only the analysis derived from it is persisted.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub sold_quantity: u32,
    pub available_quantity: u32,
    pub condition: Condition,
    pub free_shipping: bool,
    pub listing_tier: ListingTier,
    pub category_id: Option<String>,
    pub permalink: Option<String>,
    pub origin: ListingOrigin,
}

/// Maps a raw marketplace record to the canonical [`Listing`].
///
/// Records missing an id or title, or without a positive price, are not
/// listings we can analyze; they are dropped (`None`), not errors.
/// Deduplication is the caller's job.
pub fn normalize(raw: &RawItem) -> Option<Listing> {
    let id = non_empty(raw.id.as_deref())?;
    let title = non_empty(raw.title.as_deref())?;
    let price = raw.price.filter(|value| value.is_finite() && *value > 0.0)?;

    Some(Listing {
        id,
        title,
        price,
        sold_quantity: raw.sold_quantity.unwrap_or(0),
        available_quantity: raw.available_quantity.unwrap_or(0),
        condition: condition_from_raw(raw.condition.as_deref()),
        free_shipping: raw
            .shipping
            .as_ref()
            .map(|shipping| shipping.free_shipping)
            .unwrap_or(false),
        listing_tier: tier_from_raw(raw.listing_type_id.as_deref()),
        category_id: raw
            .category_id
            .clone()
            .filter(|value| !value.trim().is_empty()),
        permalink: raw
            .permalink
            .clone()
            .filter(|value| !value.trim().is_empty()),
        origin: ListingOrigin::Live,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn condition_from_raw(condition: Option<&str>) -> Condition {
    match condition {
        Some(value) if value.trim().eq_ignore_ascii_case("used") => Condition::Used,
        _ => Condition::New,
    }
}

fn tier_from_raw(listing_type_id: Option<&str>) -> ListingTier {
    let Some(raw) = listing_type_id else {
        return ListingTier::Classic;
    };
    let lowered = raw.trim().to_lowercase();
    if lowered.contains("gold") || lowered.contains("premium") {
        ListingTier::Premium
    } else {
        ListingTier::Classic
    }
}

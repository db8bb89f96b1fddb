use crate::analysis::normalize::Listing;
use crate::mercado::types::RawCompetition;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Uniform competition picture for one listing. `is_estimated` marks
/// synthetic fallback data so consumers can label it honestly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitionSummary {
    pub total_listings: u32,
    pub average_price: f64,
    pub lowest_price: f64,
    pub is_winning: bool,
    pub is_estimated: bool,
}

/// Fallback competition strategy, invoked only when the marketplace's
/// competition endpoint yielded nothing. Implementations must not block
/// or retry; tests swap in a deterministic one.
pub trait CompetitionEstimator: Send + Sync {
    fn estimate(&self, listing: &Listing) -> CompetitionSummary;
}

/// Bounded synthetic estimate around the listing's own price. Optimistic
/// on the winning flag: a known approximation, not a guarantee.
pub struct RandomizedEstimator;

impl CompetitionEstimator for RandomizedEstimator {
    fn estimate(&self, listing: &Listing) -> CompetitionSummary {
        let mut rng = SmallRng::from_os_rng();
        CompetitionSummary {
            total_listings: rng.random_range(10..60),
            average_price: listing.price * rng.random_range(0.9..1.1),
            lowest_price: listing.price * rng.random_range(0.8..0.9),
            is_winning: true,
            is_estimated: true,
        }
    }
}

/// Maps real `price_to_win` data onto the uniform summary.
///
/// An explicit price-to-win threshold beats the textual status; with
/// neither present the flag stays optimistically true.
pub fn from_price_to_win(listing: &Listing, raw: &RawCompetition) -> CompetitionSummary {
    let is_winning = match raw.price_to_win {
        Some(threshold) => listing.price <= threshold,
        None => match raw.status.as_deref() {
            Some(status) => status.trim().eq_ignore_ascii_case("winning"),
            None => true,
        },
    };

    CompetitionSummary {
        total_listings: raw.total_listings.unwrap_or(0),
        average_price: raw.average_price.unwrap_or(listing.price),
        lowest_price: raw.lowest_price.unwrap_or(listing.price),
        is_winning,
        is_estimated: false,
    }
}

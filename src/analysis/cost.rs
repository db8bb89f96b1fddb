use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CostError {
    #[error("sale price must be positive, got {0}")]
    NonPositivePrice(f64),
}

/// Named percentage and fixed-cost parameters driving the cost model.
///
/// Read from the settings store at analysis time; [`CostConfig::default`]
/// is the documented fallback when the store is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostConfig {
    pub target_profit_margin_percent: f64,
    pub shipping_cost_percent: f64,
    pub marketplace_fee_percent: f64,
    pub advertising_cost_percent: f64,
    pub additional_fixed_cost: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            target_profit_margin_percent: 30.0,
            shipping_cost_percent: 10.0,
            marketplace_fee_percent: 12.0,
            advertising_cost_percent: 5.0,
            additional_fixed_cost: 0.0,
        }
    }
}

impl CostConfig {
    pub fn is_valid(&self) -> bool {
        (0.0..=100.0).contains(&self.target_profit_margin_percent)
            && self.shipping_cost_percent >= 0.0
            && self.marketplace_fee_percent >= 0.0
            && self.advertising_cost_percent >= 0.0
            && self.additional_fixed_cost >= 0.0
    }
}

/// Cost decomposition for one sale price under one [`CostConfig`].
///
/// `net_received` and `recommended_cost_price` may be negative; a negative
/// recommendation marks the listing as unprofitable at the configured
/// margin, it is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub shipping_cost: f64,
    pub marketplace_fee: f64,
    pub advertising_cost: f64,
    pub total_costs: f64,
    pub net_received: f64,
    pub recommended_cost_price: f64,
    pub current_profit_margin_percent: f64,
}

/// Derives the full cost breakdown for `price`.
///
/// The recommendation divides net proceeds by `1 + margin/100`: the
/// maximum acquisition cost that still leaves the target margin on top.
/// It deliberately uses net proceeds, not the sale price, as its base.
pub fn compute(price: f64, config: &CostConfig) -> Result<CostBreakdown, CostError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(CostError::NonPositivePrice(price));
    }

    let shipping_cost = price * config.shipping_cost_percent / 100.0;
    let marketplace_fee = price * config.marketplace_fee_percent / 100.0;
    let advertising_cost = price * config.advertising_cost_percent / 100.0;
    let total_costs =
        shipping_cost + marketplace_fee + advertising_cost + config.additional_fixed_cost;
    let net_received = price - total_costs;
    let recommended_cost_price =
        net_received / (1.0 + config.target_profit_margin_percent / 100.0);
    let current_profit_margin_percent = net_received / price * 100.0;

    Ok(CostBreakdown {
        shipping_cost,
        marketplace_fee,
        advertising_cost,
        total_costs,
        net_received,
        recommended_cost_price,
        current_profit_margin_percent,
    })
}

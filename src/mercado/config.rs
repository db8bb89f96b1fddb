use once_cell::sync::Lazy;
use std::env;

pub static SITE_ID: Lazy<String> =
    Lazy::new(|| env::var("ML_SITE_ID").unwrap_or_else(|_| "MLB".to_string()));

pub static ROOT: Lazy<String> =
    Lazy::new(|| env::var("ML_API_ROOT").unwrap_or_else(|_| "https://api.mercadolibre.com".to_string()));

/// Optional bearer token. Search and item lookups work unauthenticated;
/// the price_to_win endpoint needs it.
pub static ACCESS_TOKEN: Lazy<String> =
    Lazy::new(|| env::var("ML_ACCESS_TOKEN").unwrap_or_default());

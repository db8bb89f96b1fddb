pub mod client;
pub mod config;
pub mod types;

pub use client::{ListingSource, MercadoClient, MercadoError};

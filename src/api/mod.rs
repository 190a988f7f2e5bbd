//! Clients for external services (Discogs marketplace)

pub mod discogs;

// Re-exports for public API convenience
#[allow(unused_imports)]
pub use discogs::{fetch_listing, parse_detail, ListingDetail};

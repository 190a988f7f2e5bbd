//! Wantlist analysis server
//!
//! Serves the browser extension: seller analysis, budget optimization and
//! listing enrichment behind a small JSON API.

use clap::Parser;
use std::sync::{Arc, Mutex};

use wantlist_analyzer::api::discogs::DISCOGS_API;
use wantlist_analyzer::cache::ListingCache;
use wantlist_analyzer::currency::{CurrencyConverter, DEFAULT_RATES_URL};
use wantlist_analyzer::fetcher::ListingFetcher;
use wantlist_analyzer::web::{self, AppState};

/// Marketplace wantlist analysis server
#[derive(Parser, Debug)]
#[command(name = "analysis_server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 4002, env = "PORT")]
    port: u16,

    /// Path to the persistent listing cache file
    #[arg(long, default_value_t = default_cache_path())]
    cache_file: String,

    /// Base URL of the marketplace listing API
    #[arg(long, default_value = DISCOGS_API, env = "LISTING_API_URL")]
    listing_api: String,

    /// Exchange rate source (quotes per USD)
    #[arg(long, default_value = DEFAULT_RATES_URL, env = "RATES_URL")]
    rates_url: String,
}

/// Default cache path under the user cache directory
fn default_cache_path() -> String {
    ListingCache::default_path().to_string_lossy().to_string()
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    log::info!("Starting analysis server...");
    log::info!("Listing cache: {}", args.cache_file);
    log::info!("Listing API: {}", args.listing_api);

    let cache = Arc::new(Mutex::new(ListingCache::load(&args.cache_file)));
    let converter = Arc::new(CurrencyConverter::new(args.rates_url.as_str()));
    let fetcher = Arc::new(ListingFetcher::new(args.listing_api.as_str(), Arc::clone(&cache)));

    let state = AppState { converter, fetcher };

    if let Err(e) = web::serve(state, args.port).await {
        log::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

//! Batched, rate-limit-aware retrieval of listing details.
//!
//! The marketplace API throttles aggressively, so listings are fetched two
//! at a time with a pause between batches, each id retried with backoff,
//! and every successful payload written through to the persistent cache.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::discogs;
use crate::cache::ListingCache;
use crate::error::{AnalyzerError, Result};
use crate::models::{ListingRecord, RawListing};

/// At most this many listing requests in flight at once.
const MAX_CONCURRENT: usize = 2;
/// Pause between request batches.
const BATCH_DELAY: Duration = Duration::from_millis(1000);
/// Attempts per listing id, including the first.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff base/cap when the service rate-limits without a retry-after header.
const RATE_LIMIT_BASE_MS: u64 = 5000;
const RATE_LIMIT_CAP_MS: u64 = 30_000;
/// Backoff base/cap for other transient errors.
const RETRY_BASE_MS: u64 = 1000;
const RETRY_CAP_MS: u64 = 10_000;

pub struct ListingFetcher {
    client: reqwest::Client,
    base_url: String,
    cache: Arc<Mutex<ListingCache>>,
}

impl ListingFetcher {
    pub fn new(base_url: impl Into<String>, cache: Arc<Mutex<ListingCache>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache,
        }
    }

    /// Fetch detail for every listing, returning exactly one record per
    /// input. A listing whose detail cannot be retrieved comes back with
    /// its scraped fields only; one bad id never aborts the batch.
    pub async fn fetch_all(&self, listings: &[RawListing], token: &str) -> Vec<ListingRecord> {
        let mut records: Vec<ListingRecord> = listings
            .iter()
            .map(|l| ListingRecord::degraded(l.clone()))
            .collect();
        let mut misses: Vec<usize> = Vec::new();

        for (idx, listing) in listings.iter().enumerate() {
            let cached = {
                let cache = self.cache.lock().unwrap();
                cache.get(&listing.listing_id).cloned()
            };
            match cached {
                Some(payload) => {
                    log::debug!("Cache hit for listing {}", listing.listing_id);
                    records[idx] = record_from_payload(listing, &payload);
                }
                None => misses.push(idx),
            }
        }

        if misses.is_empty() {
            return records;
        }

        log::info!(
            "Fetching {} of {} listings ({} cached)",
            misses.len(),
            listings.len(),
            listings.len() - misses.len()
        );

        let mut fetched = 0usize;
        for chunk in misses.chunks(MAX_CONCURRENT) {
            if fetched > 0 {
                tokio::time::sleep(BATCH_DELAY).await;
            }

            let mut handles = Vec::with_capacity(chunk.len());
            for &idx in chunk {
                let listing = listings[idx].clone();
                let client = self.client.clone();
                let base_url = self.base_url.clone();
                let token = token.to_string();
                let cache = Arc::clone(&self.cache);
                handles.push((
                    idx,
                    tokio::spawn(async move {
                        fetch_one(&client, &base_url, &listing, &token, &cache).await
                    }),
                ));
            }

            for (idx, handle) in handles {
                match handle.await {
                    Ok(record) => records[idx] = record,
                    Err(e) => {
                        log::warn!(
                            "Fetch task for listing {} failed: {}",
                            listings[idx].listing_id,
                            e
                        );
                    }
                }
            }
            fetched += chunk.len();
        }

        {
            let cache = self.cache.lock().unwrap();
            if let Err(e) = cache.persist() {
                log::warn!("Failed to persist listing cache: {}", e);
            }
        }

        records
    }
}

/// Fetch one listing with retries, writing a successful payload into the
/// cache immediately so duplicate ids later in the run reuse it.
async fn fetch_one(
    client: &reqwest::Client,
    base_url: &str,
    listing: &RawListing,
    token: &str,
    cache: &Arc<Mutex<ListingCache>>,
) -> ListingRecord {
    let cached = {
        let cache = cache.lock().unwrap();
        cache.get(&listing.listing_id).cloned()
    };
    if let Some(payload) = cached {
        return record_from_payload(listing, &payload);
    }

    match fetch_with_retry(client, base_url, &listing.listing_id, token).await {
        Ok(payload) => {
            {
                let mut cache = cache.lock().unwrap();
                cache.put(listing.listing_id.clone(), payload.clone());
            }
            record_from_payload(listing, &payload)
        }
        Err(e) => {
            log::warn!(
                "Giving up on listing {}, keeping scraped fields: {}",
                listing.listing_id,
                e
            );
            ListingRecord::degraded(listing.clone())
        }
    }
}

async fn fetch_with_retry(
    client: &reqwest::Client,
    base_url: &str,
    listing_id: &str,
    token: &str,
) -> Result<Value> {
    let mut attempt = 1u32;
    loop {
        match discogs::fetch_listing(client, base_url, listing_id, token).await {
            Ok(payload) => return Ok(payload),
            Err(e) if attempt >= MAX_ATTEMPTS => return Err(e),
            Err(AnalyzerError::RateLimited(retry_after)) => {
                let wait = match retry_after {
                    Some(secs) => Duration::from_secs(secs),
                    None => Duration::from_millis(
                        (RATE_LIMIT_BASE_MS << (attempt - 1)).min(RATE_LIMIT_CAP_MS),
                    ),
                };
                log::warn!(
                    "Rate limited on listing {} (attempt {}), waiting {:?}",
                    listing_id,
                    attempt,
                    wait
                );
                tokio::time::sleep(wait).await;
            }
            Err(e) => {
                let wait =
                    Duration::from_millis((RETRY_BASE_MS << (attempt - 1)).min(RETRY_CAP_MS));
                log::warn!(
                    "Fetch failed for listing {} (attempt {}): {}, retrying in {:?}",
                    listing_id,
                    attempt,
                    e,
                    wait
                );
                tokio::time::sleep(wait).await;
            }
        }
        attempt += 1;
    }
}

fn record_from_payload(listing: &RawListing, payload: &Value) -> ListingRecord {
    let detail = discogs::parse_detail(payload);
    ListingRecord {
        detail_price: detail.price_money(),
        detail_shipping: detail.shipping_money(),
        raw: listing.clone(),
    }
}

#[cfg(test)]
#[path = "fetcher_tests.rs"]
mod tests;

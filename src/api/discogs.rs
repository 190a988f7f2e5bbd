//! Discogs marketplace listing API client.
//!
//! Uses async reqwest for non-blocking HTTP requests. The raw payload is
//! cached verbatim by the fetcher; only the fields the analyzer reads are
//! modeled here.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{AnalyzerError, Result};
use crate::models::Money;

/// Production API base URL
pub const DISCOGS_API: &str = "https://api.discogs.com";

const USER_AGENT: &str = "WantlistAnalyzer/0.1";

/// Listing detail as returned by the marketplace API
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ListingDetail {
    #[serde(default)]
    pub price: Option<PriceField>,
    #[serde(default)]
    pub original_price: Option<OriginalPriceField>,
    #[serde(default)]
    pub shipping_price: Option<PriceField>,
    #[serde(default)]
    pub original_shipping_price: Option<OriginalPriceField>,
}

/// Flat price variant, quoted in the buyer's display currency
#[derive(Debug, Deserialize, Clone)]
pub struct PriceField {
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// "Original" price variant, quoted in the seller's own currency
#[derive(Debug, Deserialize, Clone)]
pub struct OriginalPriceField {
    #[serde(default)]
    pub curr_abbr: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl ListingDetail {
    /// Item price, preferring the seller-currency original variant
    pub fn price_money(&self) -> Option<Money> {
        money_from(&self.price, &self.original_price)
    }

    /// Shipping price, preferring the seller-currency original variant
    pub fn shipping_money(&self) -> Option<Money> {
        money_from(&self.shipping_price, &self.original_shipping_price)
    }
}

fn money_from(flat: &Option<PriceField>, original: &Option<OriginalPriceField>) -> Option<Money> {
    if let Some(orig) = original {
        if let (Some(currency), Some(value)) = (&orig.curr_abbr, orig.value) {
            return Some(Money {
                value,
                currency: currency.clone(),
            });
        }
    }
    if let Some(flat) = flat {
        if let (Some(currency), Some(value)) = (&flat.currency, flat.value) {
            return Some(Money {
                value,
                currency: currency.clone(),
            });
        }
    }
    None
}

/// Fetch the raw detail payload for one listing id.
///
/// A 429 answer maps to [`AnalyzerError::RateLimited`] carrying the
/// `retry-after` seconds when the service sent the header; any other
/// non-success status maps to [`AnalyzerError::HttpStatus`].
pub async fn fetch_listing(
    client: &reqwest::Client,
    base_url: &str,
    listing_id: &str,
    token: &str,
) -> Result<Value> {
    let url = format!("{}/marketplace/listings/{}", base_url, listing_id);

    log::debug!("Fetching listing detail: {}", url);

    let response = client
        .get(&url)
        .header("User-Agent", USER_AGENT)
        .header("Authorization", format!("Discogs token={}", token))
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        return Err(AnalyzerError::RateLimited(retry_after));
    }
    if !status.is_success() {
        return Err(AnalyzerError::HttpStatus(status));
    }

    Ok(response.json::<Value>().await?)
}

/// Parse the typed fields out of a raw payload. Payloads with an
/// unexpected shape degrade to an empty detail rather than erroring, so
/// the scraped text fields take over.
pub fn parse_detail(payload: &Value) -> ListingDetail {
    match serde_json::from_value(payload.clone()) {
        Ok(detail) => detail,
        Err(e) => {
            log::debug!("Listing payload lacks price fields: {}", e);
            ListingDetail::default()
        }
    }
}

#[cfg(test)]
#[path = "discogs_tests.rs"]
mod tests;

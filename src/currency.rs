//! Currency normalization with a refreshable exchange-rate table.
//!
//! Scraped price strings arrive in whatever currency the seller lists in;
//! everything downstream compares costs in USD. The rate table is seeded
//! with static fallback rates and refreshed from an external source at most
//! once per 24 hours.

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{AnalyzerError, Result};
use crate::models::{ListingRecord, ParsedAmount, PricedListing, RawListing};

/// Default exchange-rate source (quotes per USD, base USD).
pub const DEFAULT_RATES_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Refresh the rate table at most once per this window.
const REFRESH_WINDOW_HOURS: i64 = 24;

const USER_AGENT: &str = "WantlistAnalyzer/0.1";

/// Currency symbol table: glyph/prefix -> ISO code. Multi-character symbols
/// come first so "CA$" is not shadowed by "$".
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("AU$", "AUD"),
    ("CA$", "CAD"),
    ("MX$", "MXN"),
    ("Mx$", "MXN"),
    ("NZ$", "NZD"),
    ("CHF", "CHF"),
    ("SEK", "SEK"),
    ("DKK", "DKK"),
    ("ZAR", "ZAR"),
    ("A$", "AUD"),
    ("C$", "CAD"),
    ("R$", "BRL"),
    ("zł", "PLN"),
    ("kr", "SEK"),
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
];

/// Static fallback rates (multiplier to USD), used until the first
/// successful refresh and whenever a refresh fails.
const FALLBACK_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 1.08),
    ("GBP", 1.27),
    ("JPY", 0.0067),
    ("AUD", 0.66),
    ("CAD", 0.73),
    ("NZD", 0.61),
    ("MXN", 0.054),
    ("BRL", 0.18),
    ("CHF", 1.13),
    ("SEK", 0.095),
    ("DKK", 0.14),
    ("ZAR", 0.054),
    ("PLN", 0.25),
];

lazy_static! {
    /// First contiguous run of digits, comma, dot, minus in a price string.
    static ref NUMERIC_RUN: Regex = Regex::new(r"[0-9.,\-]+").unwrap();
}

/// Exchange-rate source response: quotes per one USD.
#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, f64>,
}

#[derive(Debug)]
struct RateTable {
    to_usd: HashMap<String, f64>,
    refreshed_at: DateTime<Utc>,
}

/// Normalizes free-form price strings into USD amounts.
///
/// Safe to share across request handlers: the rate table sits behind a
/// mutex and the refresh itself is single-flighted, so concurrent callers
/// trigger at most one refresh request.
pub struct CurrencyConverter {
    rates: Mutex<RateTable>,
    refresh_lock: tokio::sync::Mutex<()>,
    client: reqwest::Client,
    rates_url: Option<String>,
}

impl CurrencyConverter {
    /// Converter that refreshes from the given rate source when stale.
    pub fn new(rates_url: impl Into<String>) -> Self {
        Self {
            rates: Mutex::new(RateTable {
                to_usd: fallback_rates(),
                // Stale from the start, so the first conversion refreshes.
                refreshed_at: DateTime::UNIX_EPOCH,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
            client: reqwest::Client::new(),
            rates_url: Some(rates_url.into()),
        }
    }

    /// Converter with fixed rates and refresh disabled. Tests use this to
    /// get deterministic conversions.
    pub fn with_fixed_rates(rates: HashMap<String, f64>) -> Self {
        let mut to_usd = fallback_rates();
        to_usd.extend(rates);
        Self {
            rates: Mutex::new(RateTable {
                to_usd,
                refreshed_at: Utc::now(),
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
            client: reqwest::Client::new(),
            rates_url: None,
        }
    }

    /// Parse a free-form price string into an amount, a currency code and
    /// the USD equivalent. Empty or unparsable input degrades to zero
    /// rather than erroring.
    pub async fn normalize(&self, text: &str) -> ParsedAmount {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ParsedAmount::zero();
        }

        let currency = detect_currency(trimmed);
        let amount = extract_amount(trimmed);
        let amount_usd = round2(amount * self.rate(currency).await);

        ParsedAmount {
            amount,
            currency: currency.to_string(),
            amount_usd,
        }
    }

    /// Convert a structured amount in a known ISO currency to USD.
    pub async fn to_usd(&self, amount: f64, currency: &str) -> f64 {
        round2(amount * self.rate(currency).await)
    }

    /// Price a scraped listing from its text fields alone.
    pub async fn price_raw(&self, listing: &RawListing) -> PricedListing {
        let price_parsed = self.normalize(&listing.price).await.non_negative();
        let shipping_parsed = self.normalize(&listing.shipping).await.non_negative();
        PricedListing {
            listing: listing.clone(),
            price_parsed,
            shipping_parsed,
        }
    }

    /// Price an enriched listing, preferring the structured detail amounts
    /// over the scraped text when the detail carries them.
    pub async fn price_record(&self, record: &ListingRecord) -> PricedListing {
        let price_parsed = match &record.detail_price {
            Some(money) => ParsedAmount {
                amount: money.value,
                currency: money.currency.clone(),
                amount_usd: self.to_usd(money.value, &money.currency).await,
            }
            .non_negative(),
            None => self.normalize(&record.raw.price).await.non_negative(),
        };
        let shipping_parsed = match &record.detail_shipping {
            Some(money) => ParsedAmount {
                amount: money.value,
                currency: money.currency.clone(),
                amount_usd: self.to_usd(money.value, &money.currency).await,
            }
            .non_negative(),
            None => self.normalize(&record.raw.shipping).await.non_negative(),
        };
        PricedListing {
            listing: record.raw.clone(),
            price_parsed,
            shipping_parsed,
        }
    }

    /// Multiplier to USD for a currency code. Unknown codes convert 1:1.
    async fn rate(&self, currency: &str) -> f64 {
        self.refresh_if_stale().await;
        let table = self.rates.lock().unwrap();
        table.to_usd.get(currency).copied().unwrap_or(1.0)
    }

    fn is_stale(&self) -> bool {
        let table = self.rates.lock().unwrap();
        Utc::now().signed_duration_since(table.refreshed_at)
            > Duration::hours(REFRESH_WINDOW_HOURS)
    }

    /// Refresh the rate table when the 24-hour window has elapsed.
    /// Failure keeps the previous table; the caller converts with stale
    /// rates rather than erroring.
    async fn refresh_if_stale(&self) {
        let Some(url) = &self.rates_url else {
            return;
        };
        if !self.is_stale() {
            return;
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited on the lock.
        if !self.is_stale() {
            return;
        }

        match fetch_rates(&self.client, url).await {
            Ok(fresh) => {
                let mut table = self.rates.lock().unwrap();
                table.to_usd.extend(fresh);
                table.refreshed_at = Utc::now();
                log::info!("Refreshed exchange rates ({} currencies)", table.to_usd.len());
            }
            Err(e) => {
                log::warn!("Exchange rate refresh failed, keeping previous table: {}", e);
            }
        }
    }
}

fn fallback_rates() -> HashMap<String, f64> {
    FALLBACK_RATES
        .iter()
        .map(|(code, rate)| (code.to_string(), *rate))
        .collect()
}

/// Fetch quotes-per-USD from the rate source and invert them into
/// multipliers-to-USD. Non-positive quotes are skipped.
async fn fetch_rates(client: &reqwest::Client, url: &str) -> Result<HashMap<String, f64>> {
    log::info!("Fetching exchange rates from {}", url);

    let response = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(AnalyzerError::HttpStatus(response.status()));
    }

    let body: RatesResponse = response.json().await?;
    let mut to_usd = HashMap::new();
    for (code, per_usd) in body.rates {
        if per_usd > 0.0 {
            to_usd.insert(code, 1.0 / per_usd);
        }
    }

    Ok(to_usd)
}

fn detect_currency(text: &str) -> &'static str {
    for (symbol, code) in CURRENCY_SYMBOLS {
        if text.contains(symbol) {
            return code;
        }
    }
    "USD"
}

/// Extract the numeric value from a price string. If the run contains both
/// comma and dot, commas are thousands separators; a lone comma is the
/// decimal separator.
fn extract_amount(text: &str) -> f64 {
    let Some(run) = NUMERIC_RUN.find(text) else {
        return 0.0;
    };
    let run = run.as_str();

    let normalized = if run.contains(',') && run.contains('.') {
        run.replace(',', "")
    } else if run.contains(',') {
        run.replace(',', ".")
    } else {
        run.to_string()
    };

    normalized.parse::<f64>().unwrap_or(0.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
#[path = "currency_tests.rs"]
mod tests;

use serde::{Deserialize, Serialize};

/// A single scraped marketplace listing, as the browser extension hands it
/// over. Price and shipping are free-form currency-tagged strings
/// (e.g. "$12.50", "€8").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawListing {
    #[serde(default)]
    pub listing_id: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub seller: String,
    #[serde(default)]
    pub seller_ratings: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub shipping: String,
}

/// An amount in a known ISO currency, as reported by the listing service.
#[derive(Debug, Clone, PartialEq)]
pub struct Money {
    pub value: f64,
    pub currency: String,
}

/// Result of normalizing one free-form price string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAmount {
    pub amount: f64,
    pub currency: String,
    #[serde(rename = "amountUSD")]
    pub amount_usd: f64,
}

impl ParsedAmount {
    /// The value empty or unparsable input degrades to.
    pub fn zero() -> Self {
        Self {
            amount: 0.0,
            currency: "USD".to_string(),
            amount_usd: 0.0,
        }
    }

    /// Clamp the USD amount at zero. Listing prices are never negative;
    /// a negative parse must not produce a negative cost downstream.
    pub(crate) fn non_negative(mut self) -> Self {
        self.amount_usd = self.amount_usd.max(0.0);
        self
    }
}

/// A scraped listing enriched with the structured prices from the
/// listing-detail service, when enrichment produced any.
#[derive(Debug, Clone)]
pub struct ListingRecord {
    pub raw: RawListing,
    pub detail_price: Option<Money>,
    pub detail_shipping: Option<Money>,
}

impl ListingRecord {
    /// Wrap a listing with no detail data (enrichment failed or was skipped).
    pub fn degraded(raw: RawListing) -> Self {
        Self {
            raw,
            detail_price: None,
            detail_shipping: None,
        }
    }
}

/// A listing with normalized price data attached.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedListing {
    #[serde(flatten)]
    pub listing: RawListing,
    pub price_parsed: ParsedAmount,
    pub shipping_parsed: ParsedAmount,
}

impl PricedListing {
    pub fn price_usd(&self) -> f64 {
        self.price_parsed.amount_usd
    }

    pub fn shipping_usd(&self) -> f64 {
        self.shipping_parsed.amount_usd
    }

    /// Item price plus its own shipping, used to order a seller's items.
    pub fn unit_total_usd(&self) -> f64 {
        self.price_usd() + self.shipping_usd()
    }
}

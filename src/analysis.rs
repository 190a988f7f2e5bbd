//! Seller desirability ranking over priced listings.
//!
//! Unlike the optimizer this is not budget-constrained: every seller is
//! scored on inventory breadth and average cost, so a buyer can shortlist
//! sellers before deciding what to spend.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::PricedListing;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub sellers: Vec<SellerReport>,
    pub totals: AnalysisTotals,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerReport {
    pub seller: String,
    pub seller_ratings: String,
    pub items: Vec<SellerItem>,
    pub count: usize,
    pub total_price: f64,
    pub unique_count: usize,
    pub avg_total: f64,
    pub score: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerItem {
    pub listing_id: String,
    pub release: String,
    pub price: String,
    pub shipping: String,
    pub total: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTotals {
    pub num_sellers: usize,
    pub num_listings: usize,
}

#[derive(Default)]
struct SellerAccum {
    seller_ratings: String,
    items: Vec<SellerItem>,
    total_price: f64,
    unique_listings: HashSet<String>,
}

/// Group listings by seller and rank sellers by desirability.
///
/// Listings with a blank seller are dropped from the aggregate entirely
/// (they still count toward `num_listings`). Sellers with equal scores
/// keep their first-seen order.
pub fn aggregate(items: &[PricedListing]) -> AnalysisResult {
    let mut seller_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, SellerAccum> = HashMap::new();

    for it in items {
        let seller = it.listing.seller.trim();
        if seller.is_empty() {
            continue;
        }

        let accum = groups.entry(seller.to_string()).or_insert_with(|| {
            seller_order.push(seller.to_string());
            SellerAccum::default()
        });

        if accum.seller_ratings.is_empty() {
            accum.seller_ratings = it.listing.seller_ratings.clone();
        }
        let total = it.unit_total_usd();
        accum.items.push(SellerItem {
            listing_id: it.listing.listing_id.clone(),
            release: it.listing.release.clone(),
            price: it.listing.price.clone(),
            shipping: it.listing.shipping.clone(),
            total,
        });
        accum.total_price += total;
        if !it.listing.listing_id.is_empty() {
            accum.unique_listings.insert(it.listing.listing_id.clone());
        }
    }

    let mut sellers: Vec<SellerReport> = Vec::with_capacity(seller_order.len());
    for seller in seller_order {
        let accum = match groups.remove(&seller) {
            Some(accum) => accum,
            None => continue,
        };
        let count = accum.items.len();
        let unique_count = accum.unique_listings.len();
        let avg_total = accum.total_price / count.max(1) as f64;
        sellers.push(SellerReport {
            seller,
            seller_ratings: accum.seller_ratings,
            items: accum.items,
            count,
            total_price: accum.total_price,
            unique_count,
            avg_total,
            score: score_seller(unique_count, avg_total, count),
        });
    }

    // Stable sort: equal scores keep first-seen seller order.
    sellers.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    AnalysisResult {
        totals: AnalysisTotals {
            num_sellers: sellers.len(),
            num_listings: items.len(),
        },
        sellers,
    }
}

/// More unique inventory and a lower average total score higher.
fn score_seller(unique_count: usize, avg_total: f64, count: usize) -> f64 {
    let release_score = unique_count as f64 * 10.0;
    let price_score = (100.0 - avg_total).max(0.0);
    let item_score = count as f64 * 2.0;
    release_score + price_score + item_score
}

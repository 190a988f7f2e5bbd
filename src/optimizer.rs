//! Budget optimization over priced listings.
//!
//! Groups listings by seller, enumerates per-seller bundles that share one
//! shipping charge, and greedily picks the most item-dense bundles that fit
//! the budget. Greedy selection over a knapsack-with-grouping problem is a
//! known approximation: it keeps the hot path linear-ish instead of
//! exponential, at the cost of occasionally missing the exact optimum.
//!
//! Shipping is approximated as the cheapest bundled item's shipping,
//! charged once per seller. That assumes sellers quote one flat rate for
//! the whole parcel.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::PricedListing;

/// Listings with no scraped seller name are grouped under this sentinel.
const UNKNOWN_SELLER: &str = "Unknown";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub selected: Vec<PricedListing>,
    pub summary: OptimizationSummary,
    pub by_seller: BTreeMap<String, SellerSelection>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSummary {
    pub total_items: usize,
    pub total_cost: f64,
    pub item_cost: f64,
    pub shipping_cost: f64,
    pub remaining_budget: f64,
    pub efficiency: f64,
    pub sellers_used: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerSelection {
    pub items: Vec<PricedListing>,
    pub item_cost: f64,
    pub shipping_cost: f64,
    pub total_cost: f64,
    pub item_count: usize,
}

/// One candidate purchase: the `items.len()` cheapest listings of a single
/// seller, paying that seller's shipping once.
struct SellerBundle {
    seller: String,
    items: Vec<PricedListing>,
    item_cost: f64,
    shipping_cost: f64,
    total_cost: f64,
    efficiency: f64,
}

/// Select a near-optimal set of listings under `budget`.
///
/// Callers filter out non-positive-price items first; zero-price entries
/// are not meaningful deals and corrupt efficiency scoring. Listings whose
/// release is in `ignored_releases` are dropped before grouping.
///
/// Deterministic for identical input: grouping keeps first-seen seller
/// order and both sorts are stable.
pub fn optimize(
    items: &[PricedListing],
    budget: f64,
    ignored_releases: &[String],
) -> OptimizationResult {
    let ignored: HashSet<&str> = ignored_releases.iter().map(String::as_str).collect();
    let kept: Vec<&PricedListing> = items
        .iter()
        .filter(|it| !ignored.contains(it.listing.release.as_str()))
        .collect();

    let pool = build_bundles(&kept, budget);

    let mut used_sellers: HashSet<String> = HashSet::new();
    let mut used_releases: HashSet<String> = HashSet::new();
    let mut remaining = budget;

    let mut selected: Vec<PricedListing> = Vec::new();
    let mut by_seller: BTreeMap<String, SellerSelection> = BTreeMap::new();
    let mut total_items = 0usize;
    let mut item_cost = 0.0;
    let mut shipping_cost = 0.0;

    for bundle in pool {
        if used_sellers.contains(&bundle.seller) {
            continue;
        }
        if bundle.total_cost > remaining {
            continue;
        }
        let duplicate_release = bundle.items.iter().any(|it| {
            !it.listing.release.is_empty() && used_releases.contains(&it.listing.release)
        });
        if duplicate_release {
            continue;
        }

        used_sellers.insert(bundle.seller.clone());
        for it in &bundle.items {
            if !it.listing.release.is_empty() {
                used_releases.insert(it.listing.release.clone());
            }
        }

        remaining -= bundle.total_cost;
        total_items += bundle.items.len();
        item_cost += bundle.item_cost;
        shipping_cost += bundle.shipping_cost;

        selected.extend(bundle.items.iter().cloned());
        by_seller.insert(
            bundle.seller,
            SellerSelection {
                item_count: bundle.items.len(),
                items: bundle.items,
                item_cost: round2(bundle.item_cost),
                shipping_cost: round2(bundle.shipping_cost),
                total_cost: round2(bundle.total_cost),
            },
        );
    }

    let total_cost = item_cost + shipping_cost;
    let efficiency = if total_cost > 0.0 {
        total_items as f64 / total_cost
    } else {
        0.0
    };

    OptimizationResult {
        selected,
        summary: OptimizationSummary {
            total_items,
            total_cost: round2(total_cost),
            item_cost: round2(item_cost),
            shipping_cost: round2(shipping_cost),
            remaining_budget: round2(remaining),
            efficiency,
            sellers_used: by_seller.len(),
        },
        by_seller,
    }
}

/// All affordable per-seller bundles, most item-dense first.
fn build_bundles(items: &[&PricedListing], budget: f64) -> Vec<SellerBundle> {
    // First-seen seller order keeps efficiency ties deterministic.
    let mut seller_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&PricedListing>> = HashMap::new();
    for &it in items {
        let seller = it.listing.seller.trim();
        let seller = if seller.is_empty() {
            UNKNOWN_SELLER.to_string()
        } else {
            seller.to_string()
        };
        groups
            .entry(seller.clone())
            .or_insert_with(|| {
                seller_order.push(seller.clone());
                Vec::new()
            })
            .push(it);
    }

    let mut pool: Vec<SellerBundle> = Vec::new();
    for seller in seller_order {
        let mut group = groups.remove(&seller).unwrap_or_default();
        group.sort_by(|a, b| {
            a.unit_total_usd()
                .partial_cmp(&b.unit_total_usd())
                .unwrap_or(Ordering::Equal)
        });

        for count in 1..=group.len() {
            let prefix = &group[..count];
            let item_cost: f64 = prefix.iter().map(|it| it.price_usd()).sum();
            // Shipping is charged once per seller: the cheapest item's rate.
            let shipping_cost = prefix[0].shipping_usd();
            let total_cost = item_cost + shipping_cost;
            if total_cost > budget || total_cost <= 0.0 {
                continue;
            }

            pool.push(SellerBundle {
                seller: seller.clone(),
                items: prefix.iter().map(|&it| it.clone()).collect(),
                item_cost,
                shipping_cost,
                total_cost,
                efficiency: count as f64 / total_cost,
            });
        }
    }

    // Stable sort: equal efficiency keeps insertion order.
    pool.sort_by(|a, b| {
        b.efficiency
            .partial_cmp(&a.efficiency)
            .unwrap_or(Ordering::Equal)
    });
    pool
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ParsedAmount, RawListing};

    // Helper to build a priced listing directly in USD
    fn priced(
        id: &str,
        seller: &str,
        release: &str,
        price_usd: f64,
        shipping_usd: f64,
    ) -> PricedListing {
        PricedListing {
            listing: RawListing {
                listing_id: id.to_string(),
                release: release.to_string(),
                seller: seller.to_string(),
                seller_ratings: String::new(),
                price: format!("${price_usd}"),
                shipping: format!("${shipping_usd}"),
            },
            price_parsed: ParsedAmount {
                amount: price_usd,
                currency: "USD".to_string(),
                amount_usd: price_usd,
            },
            shipping_parsed: ParsedAmount {
                amount: shipping_usd,
                currency: "USD".to_string(),
                amount_usd: shipping_usd,
            },
        }
    }

    // ==================== Selection Tests ====================

    #[test]
    fn selects_the_bundle_that_fits_the_budget() {
        let items = vec![
            priced("1", "s1", "A", 8.0, 6.0),
            priced("2", "s1", "B", 6.0, 5.0),
            priced("3", "s2", "C", 20.0, 10.0),
        ];

        let result = optimize(&items, 20.0, &[]);

        // s1 takes both items for 14 + one 5.00 shipping charge = 19;
        // s2 would cost 30 and is excluded.
        assert_eq!(result.summary.total_items, 2);
        assert_eq!(result.summary.item_cost, 14.0);
        assert_eq!(result.summary.shipping_cost, 5.0);
        assert_eq!(result.summary.total_cost, 19.0);
        assert_eq!(result.summary.remaining_budget, 1.0);
        assert_eq!(result.summary.sellers_used, 1);
        assert!(result.by_seller.contains_key("s1"));
        assert!(!result.by_seller.contains_key("s2"));
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let result = optimize(&[], 100.0, &[]);

        assert_eq!(result.summary.total_items, 0);
        assert_eq!(result.summary.total_cost, 0.0);
        assert_eq!(result.summary.remaining_budget, 100.0);
        assert_eq!(result.summary.efficiency, 0.0);
        assert!(result.selected.is_empty());
        assert!(result.by_seller.is_empty());
    }

    #[test]
    fn no_seller_is_used_twice() {
        // Shipping amortization makes the full three-item bundle the most
        // efficient candidate.
        let items = vec![
            priced("1", "s1", "A", 1.0, 3.0),
            priced("2", "s1", "B", 1.0, 3.0),
            priced("3", "s1", "C", 1.0, 3.0),
        ];

        let result = optimize(&items, 100.0, &[]);

        assert_eq!(result.summary.sellers_used, 1);
        assert_eq!(result.by_seller["s1"].item_count, 3);
    }

    #[test]
    fn duplicate_release_taken_from_one_seller_only() {
        // Same release from two sellers; the cheaper seller wins and the
        // other bundle is skipped entirely.
        let items = vec![
            priced("1", "s1", "A", 2.0, 1.0),
            priced("2", "s2", "A", 10.0, 1.0),
        ];

        let result = optimize(&items, 100.0, &[]);

        assert_eq!(result.summary.total_items, 1);
        assert_eq!(result.selected[0].listing.listing_id, "1");
        let releases: Vec<_> = result
            .selected
            .iter()
            .map(|it| it.listing.release.as_str())
            .collect();
        assert_eq!(releases, vec!["A"]);
    }

    #[test]
    fn ignored_releases_are_filtered_before_grouping() {
        let items = vec![
            priced("1", "s1", "A", 2.0, 1.0),
            priced("2", "s2", "A", 3.0, 1.0),
            priced("3", "s2", "B", 4.0, 1.0),
        ];

        let result = optimize(&items, 100.0, &["A".to_string()]);

        // Every copy of release A is gone, regardless of seller.
        assert_eq!(result.summary.total_items, 1);
        assert_eq!(result.selected[0].listing.release, "B");
    }

    #[test]
    fn shipping_charged_once_at_the_cheapest_items_rate() {
        // The cheapest item (by price + shipping) ships free, so the
        // two-item bundle pays no shipping at all even though the other
        // item quotes 10.00.
        let items = vec![
            priced("1", "s1", "A", 6.0, 10.0),
            priced("2", "s1", "B", 9.0, 0.0),
        ];

        let result = optimize(&items, 100.0, &[]);

        assert_eq!(result.by_seller["s1"].item_count, 2);
        assert_eq!(result.by_seller["s1"].item_cost, 15.0);
        assert_eq!(result.by_seller["s1"].shipping_cost, 0.0);
        assert_eq!(result.by_seller["s1"].total_cost, 15.0);
    }

    #[test]
    fn total_cost_never_exceeds_budget() {
        let items = vec![
            priced("1", "s1", "A", 6.0, 1.0),
            priced("2", "s1", "B", 6.0, 1.0),
            priced("3", "s2", "C", 3.0, 2.0),
            priced("4", "s3", "D", 9.0, 0.5),
        ];

        for budget in [5.0, 10.0, 15.0, 100.0] {
            let result = optimize(&items, budget, &[]);
            assert!(
                result.summary.total_cost <= budget,
                "total {} exceeds budget {}",
                result.summary.total_cost,
                budget
            );
        }
    }

    #[test]
    fn blank_sellers_group_under_the_unknown_sentinel() {
        let items = vec![
            priced("1", "", "A", 2.0, 2.0),
            priced("2", "  ", "B", 3.0, 2.0),
        ];

        let result = optimize(&items, 100.0, &[]);

        assert_eq!(result.summary.sellers_used, 1);
        assert_eq!(result.by_seller["Unknown"].item_count, 2);
    }

    #[test]
    fn prefers_the_more_efficient_seller() {
        // s2 yields 2 items for 5.00 (0.4 items/$), s1 yields 1 for 4.00
        // (0.25 items/$). With budget for one bundle only, s2 wins.
        let items = vec![
            priced("1", "s1", "A", 3.0, 1.0),
            priced("2", "s2", "B", 2.0, 1.0),
            priced("3", "s2", "C", 2.0, 1.0),
        ];

        let result = optimize(&items, 5.0, &[]);

        assert_eq!(result.summary.sellers_used, 1);
        assert_eq!(result.by_seller["s2"].item_count, 2);
    }

    #[test]
    fn deterministic_for_identical_input() {
        let items = vec![
            priced("1", "s1", "A", 5.0, 1.0),
            priced("2", "s2", "B", 5.0, 1.0),
            priced("3", "s3", "C", 5.0, 1.0),
        ];

        let first = serde_json::to_string(&optimize(&items, 12.0, &[])).unwrap();
        let second = serde_json::to_string(&optimize(&items, 12.0, &[])).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn efficiency_is_items_per_dollar() {
        let items = vec![
            priced("1", "s1", "A", 4.0, 2.0),
            priced("2", "s1", "B", 5.0, 3.0),
        ];

        let result = optimize(&items, 100.0, &[]);

        // 2 items for 9.00 plus the cheapest item's 2.00 shipping
        assert_eq!(result.summary.total_items, 2);
        assert_eq!(result.summary.total_cost, 11.0);
        assert!((result.summary.efficiency - 2.0 / 11.0).abs() < 1e-9);
    }
}

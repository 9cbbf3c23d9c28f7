#![deny(warnings)]

//! Per-bill, per-dimension scoring.
//!
//! Maps `(bill, order, config, stats)` to a normalized score for each of the
//! four dimensions (maturity, acceptor, amount, organization) and a weighted
//! total, all in `[0, 1]`. Pure except for consuming the caller-supplied
//! PRNG, which is engine-scoped and seeded once at construction so that a
//! fixed seed reproduces identical scores.

use alloc_core::{
    AcceptorStrategy, AmountLabelConfig, AmountStrategy, AmountSubStrategy, Bill,
    MaturityStrategy, OrganizationStrategy, PaymentOrder, PoolStats, ScoreBreakdown, SizeLabel,
    WeightConfig,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Construct the engine-local PRNG from an optional seed. `None` falls back
/// to a fixed seed so callers who never set one still get deterministic,
/// reproducible runs.
pub fn new_rng(seed: Option<u64>) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.unwrap_or(0))
}

/// Everything the scorer needs about the pool and label configuration,
/// built once per `allocate()` call from the post-filter pool.
pub struct ScoringContext<'a> {
    pub stats: &'a PoolStats,
    pub label_config: &'a AmountLabelConfig,
}

/// Score one bill against one order under the given weights/context.
pub fn score_bill<R: Rng + ?Sized>(
    bill: &Bill,
    order: &PaymentOrder,
    weight: &WeightConfig,
    ctx: &ScoringContext,
    rng: &mut R,
) -> ScoreBreakdown {
    let maturity = score_maturity(bill, weight, ctx.stats);
    let acceptor = score_acceptor(bill, weight);
    let amount = score_amount(bill, order, weight, ctx, rng);
    let organization = score_organization(bill, order, weight);
    let total = weight.w_maturity * maturity
        + weight.w_acceptor * acceptor
        + weight.w_amount * amount
        + weight.w_organization * organization;
    ScoreBreakdown {
        maturity,
        acceptor,
        amount,
        organization,
        total,
    }
}

// -------------- maturity --------------

fn score_maturity(bill: &Bill, weight: &WeightConfig, stats: &PoolStats) -> f64 {
    let (d_min, d_max) = stats.maturity_range;
    if d_max == d_min {
        return 1.0;
    }
    let days = bill.maturity_days;
    let t = weight.maturity_threshold;
    match weight.maturity_strategy {
        MaturityStrategy::FarFirst => {
            if days >= t {
                if d_max == t {
                    1.0
                } else {
                    0.7 + 0.3 * (days as f64 - t as f64) / (d_max as f64 - t as f64)
                }
            } else if t == d_min {
                0.0
            } else {
                0.7 * (days as f64 - d_min as f64) / (t as f64 - d_min as f64)
            }
        }
        MaturityStrategy::NearFirst => {
            if days <= t {
                if t == d_min {
                    1.0
                } else {
                    0.7 + 0.3 * (t as f64 - days as f64) / (t as f64 - d_min as f64)
                }
            } else if d_max == t {
                0.0
            } else {
                0.7 * (d_max as f64 - days as f64) / (d_max as f64 - t as f64)
            }
        }
    }
}

// -------------- acceptor --------------

fn score_acceptor(bill: &Bill, weight: &WeightConfig) -> f64 {
    let k = weight.acceptor_class_count.max(1);
    let class = bill.acceptor_class.clamp(1, k);
    match weight.acceptor_strategy {
        AcceptorStrategy::GoodFirst => (k as f64 + 1.0 - class as f64) / k as f64,
        AcceptorStrategy::BadFirst => class as f64 / k as f64,
    }
}

// -------------- amount --------------

fn score_amount<R: Rng + ?Sized>(
    bill: &Bill,
    order: &PaymentOrder,
    weight: &WeightConfig,
    ctx: &ScoringContext,
    rng: &mut R,
) -> f64 {
    match weight.amount_strategy {
        AmountStrategy::LargeFirst => score_large_first(bill, weight, ctx.stats, rng),
        AmountStrategy::SmallFirst => score_small_first(bill, weight, ctx.stats, rng),
        AmountStrategy::Random => rng.gen_range(0.0..1.0),
        AmountStrategy::LeOrder => {
            if bill.amount <= order.amount {
                1.0
            } else {
                0.5
            }
        }
        AmountStrategy::GeOrder => {
            if bill.amount >= order.amount {
                1.0
            } else {
                0.2
            }
        }
        AmountStrategy::OptimizeInventory => {
            score_optimize_inventory(bill, ctx.label_config, ctx.stats)
        }
    }
}

fn normalized_span(amount: Decimal, lo: Decimal, hi: Decimal) -> f64 {
    let span = (hi - lo).max(Decimal::ONE);
    ((amount - lo) / span).to_f64().unwrap_or(0.0).clamp(0.0, 1.0)
}

fn score_large_first<R: Rng + ?Sized>(
    bill: &Bill,
    weight: &WeightConfig,
    stats: &PoolStats,
    rng: &mut R,
) -> f64 {
    match bill.label {
        SizeLabel::Large => {
            if weight.amount_sub_strategy == Some(AmountSubStrategy::Sorted) {
                match stats.amount_range_by_label.get(&SizeLabel::Large) {
                    Some(&(lo, hi)) => 0.7 + 0.3 * normalized_span(bill.amount, lo, hi),
                    None => 0.7,
                }
            } else {
                0.7 + rng.gen_range(0.0..1.0) * 0.3
            }
        }
        SizeLabel::Medium => 0.5,
        SizeLabel::Small => 0.2,
    }
}

fn score_small_first<R: Rng + ?Sized>(
    bill: &Bill,
    weight: &WeightConfig,
    stats: &PoolStats,
    rng: &mut R,
) -> f64 {
    match bill.label {
        SizeLabel::Small => {
            if weight.amount_sub_strategy == Some(AmountSubStrategy::Sorted) {
                match stats.amount_range_by_label.get(&SizeLabel::Small) {
                    // Mirror of the large-first span: closeness to the low
                    // end of the SMALL range scores highest.
                    Some(&(lo, hi)) => 0.7 + 0.3 * (1.0 - normalized_span(bill.amount, lo, hi)),
                    None => 0.7,
                }
            } else {
                0.7 + rng.gen_range(0.0..1.0) * 0.3
            }
        }
        SizeLabel::Medium => 0.5,
        SizeLabel::Large => 0.2,
    }
}

fn score_optimize_inventory(bill: &Bill, label_cfg: &AmountLabelConfig, stats: &PoolStats) -> f64 {
    let mut raw: BTreeMap<SizeLabel, f64> = BTreeMap::new();
    for label in SizeLabel::all() {
        let current = stats
            .inventory_distribution
            .get(&label)
            .copied()
            .unwrap_or(Decimal::ZERO)
            .to_f64()
            .unwrap_or(0.0);
        let expected = label_cfg.expected(label).to_f64().unwrap_or(0.0);
        let value = if current > expected {
            (2.0 * current - expected).max(0.0)
        } else {
            0.0
        };
        raw.insert(label, value);
    }
    let total: f64 = raw.values().sum();
    if total <= 0.0 {
        1.0 / SizeLabel::all().len() as f64
    } else {
        raw[&bill.label] / total
    }
}

// -------------- organization --------------

fn score_organization(bill: &Bill, order: &PaymentOrder, weight: &WeightConfig) -> f64 {
    let same = bill.organization == order.organization;
    match weight.organization_strategy {
        OrganizationStrategy::SameOrg => {
            if same {
                1.0
            } else {
                0.0
            }
        }
        OrganizationStrategy::DiffOrg => {
            if same {
                0.0
            } else {
                1.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc_core::{AmountLabelConfig, PoolStats};
    use proptest::prelude::*;

    fn label_cfg() -> AmountLabelConfig {
        AmountLabelConfig::default()
    }

    fn bill(id: &str, amount: i64, days: u32, class: u32, org: &str) -> Bill {
        Bill::new(id, Decimal::new(amount, 0), days, class, org, &label_cfg()).unwrap()
    }

    fn order(amount: i64, org: &str) -> PaymentOrder {
        PaymentOrder::new("o1", Decimal::new(amount, 0), org, 0).unwrap()
    }

    #[test]
    fn far_first_prefers_longer_maturity_above_threshold() {
        let mut w = WeightConfig::default();
        w.w_maturity = 1.0;
        w.w_acceptor = 0.0;
        w.w_amount = 0.0;
        w.w_organization = 0.0;
        w.maturity_strategy = MaturityStrategy::FarFirst;
        w.maturity_threshold = 90;

        let bills = vec![bill("b1", 200_000, 200, 1, "orgA"), bill("b2", 200_000, 120, 1, "orgA")];
        let stats = PoolStats::compute(&bills);
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &label_cfg(),
        };
        let o = order(100_000, "orgA");
        let mut rng = new_rng(Some(1));
        let s1 = score_bill(&bills[0], &o, &w, &ctx, &mut rng);
        let s2 = score_bill(&bills[1], &o, &w, &ctx, &mut rng);
        assert!(s1.total >= s2.total);
    }

    #[test]
    fn same_org_outscores_cross_org_under_same_org_strategy() {
        let mut w = WeightConfig::default();
        w.w_maturity = 0.0;
        w.w_acceptor = 0.0;
        w.w_amount = 0.0;
        w.w_organization = 1.0;
        w.organization_strategy = OrganizationStrategy::SameOrg;

        let bills = vec![bill("b1", 200_000, 100, 1, "orgA"), bill("b2", 200_000, 100, 1, "orgB")];
        let stats = PoolStats::compute(&bills);
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &label_cfg(),
        };
        let o = order(100_000, "orgA");
        let mut rng = new_rng(Some(1));
        let same = score_bill(&bills[0], &o, &w, &ctx, &mut rng);
        let cross = score_bill(&bills[1], &o, &w, &ctx, &mut rng);
        assert!(same.total > cross.total);
    }

    #[test]
    fn large_first_without_sub_strategy_favors_large_label() {
        let mut w = WeightConfig::default();
        w.w_maturity = 0.0;
        w.w_acceptor = 0.0;
        w.w_amount = 1.0;
        w.w_organization = 0.0;
        w.amount_strategy = AmountStrategy::LargeFirst;
        w.amount_sub_strategy = None;

        let bills = vec![
            bill("large", 2_000_000, 100, 1, "orgA"),
            bill("medium", 500_000, 100, 1, "orgA"),
            bill("small", 50_000, 100, 1, "orgA"),
        ];
        let stats = PoolStats::compute(&bills);
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &label_cfg(),
        };
        let o = order(100_000, "orgA");
        let mut rng = new_rng(Some(7));
        let scores: Vec<f64> = bills
            .iter()
            .map(|b| score_bill(b, &o, &w, &ctx, &mut rng).total)
            .collect();
        let max_idx = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(bills[max_idx].id.0, "large");
    }

    #[test]
    fn equal_maturity_span_returns_one() {
        let w = WeightConfig::default();
        let bills = vec![bill("b1", 200_000, 90, 1, "orgA")];
        let stats = PoolStats::compute(&bills);
        assert_eq!(stats.maturity_range, (90, 90));
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &label_cfg(),
        };
        let o = order(100_000, "orgA");
        let mut rng = new_rng(Some(1));
        let s = score_bill(&bills[0], &o, &w, &ctx, &mut rng);
        assert!((s.maturity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn optimize_inventory_returns_equal_thirds_when_at_target() {
        let label_cfg = AmountLabelConfig::default();
        let stats = PoolStats {
            maturity_range: (0, 365),
            amount_range_by_label: Default::default(),
            inventory_distribution: [
                (SizeLabel::Large, label_cfg.large_ratio),
                (SizeLabel::Medium, label_cfg.medium_ratio),
                (SizeLabel::Small, label_cfg.small_ratio),
            ]
            .into_iter()
            .collect(),
        };
        let bill = bill("b1", 200_000, 10, 1, "orgA");
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &label_cfg,
        };
        assert!((score_amount(
            &bill,
            &order(100_000, "orgA"),
            &WeightConfig {
                amount_strategy: AmountStrategy::OptimizeInventory,
                ..WeightConfig::default()
            },
            &ctx,
            &mut new_rng(Some(1)),
        ) - 1.0 / 3.0)
            .abs()
            < 1e-9);
    }

    #[test]
    fn determinism_same_seed_same_scores() {
        let w = WeightConfig {
            amount_strategy: AmountStrategy::Random,
            ..WeightConfig::default()
        };
        let bills = vec![bill("b1", 200_000, 90, 1, "orgA")];
        let stats = PoolStats::compute(&bills);
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &label_cfg(),
        };
        let o = order(100_000, "orgA");
        let mut rng_a = new_rng(Some(42));
        let mut rng_b = new_rng(Some(42));
        let s_a = score_bill(&bills[0], &o, &w, &ctx, &mut rng_a);
        let s_b = score_bill(&bills[0], &o, &w, &ctx, &mut rng_b);
        assert_eq!(s_a.total, s_b.total);
    }

    proptest! {
        #[test]
        fn all_dimension_scores_in_unit_interval(
            amount in 1i64..5_000_000,
            days in 0u32..2000,
            class in 1u32..10,
        ) {
            let w = WeightConfig::default();
            let b = bill("b1", amount, days, class, "orgA");
            let stats = PoolStats::compute(std::slice::from_ref(&b));
            let ctx = ScoringContext { stats: &stats, label_config: &label_cfg() };
            let mut rng = new_rng(Some(3));
            let s = score_bill(&b, &order(100_000, "orgB"), &w, &ctx, &mut rng);
            prop_assert!((0.0..=1.0).contains(&s.maturity));
            prop_assert!((0.0..=1.0).contains(&s.acceptor));
            prop_assert!((0.0..=1.0).contains(&s.amount));
            prop_assert!((0.0..=1.0).contains(&s.organization));
        }
    }
}

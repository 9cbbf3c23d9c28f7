//! Bounded repair: after greedy-combine leaves a residual gap, augment the
//! selection with partial bills (or trim an overshoot) for a few rounds.

use crate::constraints::{is_close_enough, split_admissible};
use alloc_core::{
    AcceptorStrategy, Bill, BillUsage, MaturityStrategy, PaymentOrder, SplitConfig, SplitStrategy,
    WeightConfig,
};
use alloc_score::ScoringContext;
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Repair rounds are capped; an allocation that still misses the target
/// after this many rounds settles for its best effort rather than looping.
pub const MAX_SPLIT_ITERATIONS: usize = 5;

pub struct SplitOutcome {
    pub usages: Vec<BillUsage>,
    pub iterations: usize,
}

/// Run up to [`MAX_SPLIT_ITERATIONS`] augment/reduce rounds against
/// `selected`. `candidates` holds pool indices not yet selected and is
/// drained as bills are consumed.
#[allow(clippy::too_many_arguments)]
pub fn refine_selection<R: Rng + ?Sized>(
    order: &PaymentOrder,
    pool: &mut [Bill],
    mut selected: Vec<BillUsage>,
    candidates: &mut Vec<usize>,
    weight: &WeightConfig,
    split_cfg: &SplitConfig,
    ctx: &ScoringContext,
    rng: &mut R,
) -> SplitOutcome {
    let mut iterations = 0;
    for _ in 0..MAX_SPLIT_ITERATIONS {
        iterations += 1;
        let total_used: Decimal = selected.iter().map(|u| u.used_amount).sum();
        let gap = order.amount - total_used;
        if is_close_enough(gap, order.amount, split_cfg) {
            break;
        }
        let progressed = if gap > Decimal::ZERO {
            augment(order, pool, &mut selected, candidates, weight, split_cfg, ctx, rng, gap)
        } else {
            reduce(pool, &mut selected, split_cfg, weight, -gap)
        };
        if !progressed {
            break;
        }
    }
    SplitOutcome {
        usages: selected,
        iterations,
    }
}

#[allow(clippy::too_many_arguments)]
fn augment<R: Rng + ?Sized>(
    order: &PaymentOrder,
    pool: &mut [Bill],
    selected: &mut Vec<BillUsage>,
    candidates: &mut Vec<usize>,
    weight: &WeightConfig,
    split_cfg: &SplitConfig,
    ctx: &ScoringContext,
    rng: &mut R,
    gap: Decimal,
) -> bool {
    while let Some(pos) = choose_candidate(pool, candidates, split_cfg.split_strategy, weight, gap) {
        let bill_idx = candidates.remove(pos);
        let available = pool[bill_idx].available_amount;
        // If the candidate isn't admissible at the full gap, retry it at the
        // minimum admissible ratio before giving up and trying the next one.
        let used = split_admissible(available, gap, split_cfg)
            .or_else(|| split_admissible(available, split_cfg.min_ratio * available, split_cfg));
        let Some(used) = used else {
            continue; // candidate unusable even at the floor ratio; try the next
        };
        let scores = alloc_score::score_bill(&pool[bill_idx], order, weight, ctx, rng);
        pool[bill_idx]
            .apply_use(used)
            .expect("admissible split must not overdraw");
        let bill = &pool[bill_idx];
        selected.push(BillUsage {
            bill_id: bill.id.clone(),
            organization: bill.organization.clone(),
            label: bill.label,
            face_amount: bill.amount,
            used_amount: used,
            split_ratio: used / bill.amount,
            scores,
            selection_index: selected.len(),
        });
        return true;
    }
    false
}

/// Shrink the selected usage that best matches the split strategy's
/// preference, favoring a whole (`split_ratio == 1.0`) bill whose
/// `used_amount` alone covers `excess`, so the overshoot is absorbed by
/// giving back a single unsplit bill rather than trimming a partial one.
fn reduce(
    pool: &mut [Bill],
    selected: &mut Vec<BillUsage>,
    split_cfg: &SplitConfig,
    weight: &WeightConfig,
    excess: Decimal,
) -> bool {
    let Some(idx) = choose_reduce_candidate(pool, selected, split_cfg.split_strategy, weight, excess)
    else {
        return false;
    };
    let usage = &mut selected[idx];
    let give_back = excess.min(usage.used_amount);
    if give_back <= Decimal::ZERO {
        return false;
    }
    usage.used_amount -= give_back;
    usage.split_ratio = if usage.face_amount > Decimal::ZERO {
        usage.used_amount / usage.face_amount
    } else {
        Decimal::ZERO
    };
    if let Some(bill) = pool.iter_mut().find(|b| b.id == usage.bill_id) {
        bill.available_amount += give_back;
    }
    if usage.used_amount <= Decimal::ZERO {
        selected.remove(idx);
    }
    true
}

/// Among `selected`, prefer a whole bill (`split_ratio == 1.0`) whose
/// `used_amount` alone covers `excess`; fall back to the full selection if
/// none qualifies. The final pick within that set goes by the same
/// per-strategy preference `choose_candidate` uses for augmenting.
fn choose_reduce_candidate(
    pool: &[Bill],
    selected: &[BillUsage],
    strategy: SplitStrategy,
    weight: &WeightConfig,
    excess: Decimal,
) -> Option<usize> {
    if selected.is_empty() {
        return None;
    }
    let preferred: Vec<usize> = selected
        .iter()
        .enumerate()
        .filter(|(_, u)| u.used_amount >= excess && u.split_ratio == Decimal::ONE)
        .map(|(i, _)| i)
        .collect();
    let pool_of_indices = if preferred.is_empty() {
        (0..selected.len()).collect::<Vec<_>>()
    } else {
        preferred
    };
    pool_of_indices.into_iter().max_by(|&a, &b| {
        reduce_candidate_key(pool, selected, a, strategy, weight, excess)
            .partial_cmp(&reduce_candidate_key(pool, selected, b, strategy, weight, excess))
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

fn reduce_candidate_key(
    pool: &[Bill],
    selected: &[BillUsage],
    idx: usize,
    strategy: SplitStrategy,
    weight: &WeightConfig,
    excess: Decimal,
) -> f64 {
    let usage = &selected[idx];
    let bill = pool.iter().find(|b| b.id == usage.bill_id);
    match strategy {
        SplitStrategy::ByMaturity => {
            let days = bill.map(|b| b.maturity_days).unwrap_or(0) as f64;
            match weight.maturity_strategy {
                MaturityStrategy::FarFirst => days,
                MaturityStrategy::NearFirst => -days,
            }
        }
        SplitStrategy::ByAcceptorClass => {
            let class = bill.map(|b| b.acceptor_class).unwrap_or(0) as f64;
            match weight.acceptor_strategy {
                AcceptorStrategy::BadFirst => class,
                AcceptorStrategy::GoodFirst => -class,
            }
        }
        SplitStrategy::ByAmountLarge => usage.used_amount.to_f64().unwrap_or(0.0),
        SplitStrategy::ByAmountClose => {
            -(usage.used_amount - excess).abs().to_f64().unwrap_or(f64::MAX)
        }
    }
}

fn choose_candidate(
    pool: &[Bill],
    candidates: &[usize],
    strategy: SplitStrategy,
    weight: &WeightConfig,
    gap: Decimal,
) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .max_by(|(_, &a), (_, &b)| {
            candidate_key(&pool[a], strategy, weight, gap)
                .partial_cmp(&candidate_key(&pool[b], strategy, weight, gap))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(pos, _)| pos)
}

fn candidate_key(bill: &Bill, strategy: SplitStrategy, weight: &WeightConfig, gap: Decimal) -> f64 {
    match strategy {
        SplitStrategy::ByMaturity => match weight.maturity_strategy {
            MaturityStrategy::FarFirst => bill.maturity_days as f64,
            MaturityStrategy::NearFirst => -(bill.maturity_days as f64),
        },
        SplitStrategy::ByAcceptorClass => match weight.acceptor_strategy {
            AcceptorStrategy::BadFirst => bill.acceptor_class as f64,
            AcceptorStrategy::GoodFirst => -(bill.acceptor_class as f64),
        },
        SplitStrategy::ByAmountLarge => bill.available_amount.to_f64().unwrap_or(0.0),
        SplitStrategy::ByAmountClose => {
            -(bill.available_amount - gap).abs().to_f64().unwrap_or(f64::MAX)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc_core::{AmountLabelConfig, PoolStats};

    fn label_cfg() -> AmountLabelConfig {
        AmountLabelConfig::default()
    }

    fn bill(id: &str, amount: i64) -> Bill {
        Bill::new(id, Decimal::new(amount, 0), 60, 2, "orgA", &label_cfg()).unwrap()
    }

    #[test]
    fn augment_covers_gap_with_a_partial_bill() {
        let order = PaymentOrder::new("o1", Decimal::new(150_000, 0), "orgA", 0).unwrap();
        let mut pool = vec![bill("b1", 100_000), bill("b2", 200_000)];
        let selected_bill = pool[0].clone();
        pool[0].apply_use(Decimal::new(100_000, 0)).unwrap();
        let selected = vec![BillUsage {
            bill_id: selected_bill.id.clone(),
            organization: selected_bill.organization.clone(),
            label: selected_bill.label,
            face_amount: selected_bill.amount,
            used_amount: Decimal::new(100_000, 0),
            split_ratio: Decimal::ONE,
            scores: alloc_core::ScoreBreakdown {
                maturity: 0.5,
                acceptor: 0.5,
                amount: 0.5,
                organization: 0.5,
                total: 0.5,
            },
            selection_index: 0,
        }];
        let mut candidates = vec![1usize];
        let stats = PoolStats::compute(&pool);
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &label_cfg(),
        };
        let mut rng = alloc_score::new_rng(Some(1));
        let weight = WeightConfig::default();
        let split_cfg = SplitConfig::default();

        let outcome = refine_selection(
            &order,
            &mut pool,
            selected,
            &mut candidates,
            &weight,
            &split_cfg,
            &ctx,
            &mut rng,
        );
        let total: Decimal = outcome.usages.iter().map(|u| u.used_amount).sum();
        assert!(is_close_enough(order.amount - total, order.amount, &split_cfg));
        assert_eq!(outcome.usages.len(), 2);
    }

    fn whole_usage(bill: &Bill, used: i64) -> BillUsage {
        BillUsage {
            bill_id: bill.id.clone(),
            organization: bill.organization.clone(),
            label: bill.label,
            face_amount: bill.amount,
            used_amount: Decimal::new(used, 0),
            split_ratio: Decimal::new(used, 0) / bill.amount,
            scores: alloc_core::ScoreBreakdown {
                maturity: 0.5,
                acceptor: 0.5,
                amount: 0.5,
                organization: 0.5,
                total: 0.5,
            },
            selection_index: 0,
        }
    }

    #[test]
    fn reduce_trims_the_only_selected_bill() {
        let mut pool = vec![bill("b1", 200_000)];
        pool[0].apply_use(Decimal::new(200_000, 0)).unwrap();
        let mut selected = vec![whole_usage(&pool[0].clone(), 200_000)];
        let split_cfg = SplitConfig::default();
        let weight = WeightConfig::default();
        assert!(reduce(&mut pool, &mut selected, &split_cfg, &weight, Decimal::new(50_000, 0)));
        assert_eq!(selected[0].used_amount, Decimal::new(150_000, 0));
        assert_eq!(pool[0].available_amount, Decimal::new(50_000, 0));
    }

    #[test]
    fn reduce_picks_the_closest_amount_among_whole_bills_by_default_strategy() {
        // Both bills are whole (split_ratio == 1.0) and both qualify under
        // the used_amount >= excess preference, so the tie is broken by the
        // default ByAmountClose strategy: the bill whose used_amount is
        // closest to the excess gets trimmed.
        let mut pool = vec![bill("b1", 50_000), bill("b2", 200_000)];
        pool[0].apply_use(Decimal::new(50_000, 0)).unwrap();
        pool[1].apply_use(Decimal::new(200_000, 0)).unwrap();
        let mut selected = vec![
            whole_usage(&pool[0].clone(), 50_000),
            whole_usage(&pool[1].clone(), 200_000),
        ];
        let split_cfg = SplitConfig::default();
        let weight = WeightConfig::default();
        assert!(reduce(&mut pool, &mut selected, &split_cfg, &weight, Decimal::new(40_000, 0)));
        assert_eq!(selected[0].used_amount, Decimal::new(10_000, 0));
        assert_eq!(selected[1].used_amount, Decimal::new(200_000, 0));
    }

    #[test]
    fn reduce_falls_back_to_a_partial_bill_when_no_whole_bill_covers_the_excess() {
        // Neither selected bill is whole, so the used_amount >= excess &&
        // split_ratio == 1.0 preference yields nothing and every selected
        // bill is a fallback candidate.
        let mut pool = vec![bill("b1", 100_000), bill("b2", 100_000)];
        pool[0].apply_use(Decimal::new(30_000, 0)).unwrap();
        pool[1].apply_use(Decimal::new(90_000, 0)).unwrap();
        let mut selected = vec![
            whole_usage(&pool[0].clone(), 30_000),
            whole_usage(&pool[1].clone(), 90_000),
        ];
        selected[0].split_ratio = Decimal::new(3, 1);
        selected[1].split_ratio = Decimal::new(9, 1);
        let split_cfg = SplitConfig::default();
        let weight = WeightConfig::default();
        assert!(reduce(&mut pool, &mut selected, &split_cfg, &weight, Decimal::new(10_000, 0)));
        // closest used_amount to the 10,000 excess is the 30,000 usage
        assert_eq!(selected[0].used_amount, Decimal::new(20_000, 0));
        assert_eq!(selected[1].used_amount, Decimal::new(90_000, 0));
    }
}

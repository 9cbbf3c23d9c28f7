//! The allocation engine: equal-amount shortcut, greedy combine, bounded
//! repair, and batch ordering.

use crate::constraints::{self, is_close_enough};
use crate::splitter;
use alloc_core::{
    AllocationResult, Bill, BillUsage, EngineConfig, PaymentOrder, PoolStats, ScoreBreakdown,
};
use alloc_score::ScoringContext;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use std::time::Instant;
use thiserror::Error;

/// Internal invariant violations. The engine never returns this across its
/// public boundary (`allocate`/`allocate_batch` are infallible); it exists
/// to document the assumptions `debug_assert!` checks guard in debug
/// builds.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("internal invariant violated: {0}")]
    InvariantViolated(String),
}

/// Owns one immutable configuration snapshot and the engine-local PRNG.
/// Not `Sync`: callers serialize access to a shared pool themselves.
pub struct Engine {
    config: EngineConfig,
    rng: ChaCha8Rng,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let rng = alloc_score::new_rng(config.seed);
        Self { config, rng }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Select and reserve bills against `order`, mutating `pool` in place.
    pub fn allocate(&mut self, order: &PaymentOrder, pool: &mut [Bill]) -> AllocationResult {
        let start = Instant::now();
        let span = tracing::debug_span!("allocate", order_id = %order.id.0, target = %order.amount);
        let _enter = span.enter();

        if let Some(usage) = self.try_equal_amount_shortcut(order, pool) {
            return self.finish(order, pool, vec![usage], true, start);
        }

        let candidate_indices = constraints::prefilter_indices(pool, &self.config.constraint);
        let stats_pool: Vec<Bill> = candidate_indices.iter().map(|&i| pool[i].clone()).collect();
        let stats = PoolStats::compute(&stats_pool);
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &self.config.amount_label,
        };

        let (mut selected, mut leftover) = greedy_combine(
            order,
            pool,
            &candidate_indices,
            &self.config,
            &ctx,
            &mut self.rng,
        );

        let total_used: Decimal = selected.iter().map(|u| u.used_amount).sum();
        let gap = order.amount - total_used;

        if self.config.split.allow_split
            && !is_close_enough(gap, order.amount, &self.config.split)
            && !leftover.is_empty()
        {
            let outcome = splitter::refine_selection(
                order,
                pool,
                selected,
                &mut leftover,
                &self.config.weight,
                &self.config.split,
                &ctx,
                &mut self.rng,
            );
            tracing::debug!(iterations = outcome.iterations, "splitter ran bounded repair");
            selected = outcome.usages;
        }

        let constraints_met =
            constraints::constraints_satisfied(&selected, order.amount, &self.config.constraint);
        self.finish(order, pool, selected, constraints_met, start)
    }

    /// Allocate each order in priority-descending order, sharing one mutable
    /// pool across the whole batch. Equal-priority orders keep their input
    /// order (`sort_by` is stable).
    pub fn allocate_batch(
        &mut self,
        orders: &[PaymentOrder],
        pool: &mut [Bill],
    ) -> Vec<AllocationResult> {
        let span = tracing::info_span!("allocate_batch", orders = orders.len());
        let _enter = span.enter();

        let mut ordered: Vec<&PaymentOrder> = orders.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        ordered.into_iter().map(|o| self.allocate(o, pool)).collect()
    }

    fn try_equal_amount_shortcut(&mut self, order: &PaymentOrder, pool: &mut [Bill]) -> Option<BillUsage> {
        if !self.config.equal_amount_first {
            return None;
        }
        let threshold = self.config.equal_amount_threshold;
        let idx = pool
            .iter()
            .enumerate()
            .filter(|(_, b)| b.available_amount > Decimal::ZERO)
            .filter(|(_, b)| (b.available_amount - order.amount).abs() <= threshold)
            .min_by_key(|(_, b)| (b.available_amount - order.amount).abs())
            .map(|(i, _)| i)?;

        let stats = PoolStats::compute(pool);
        let ctx = ScoringContext {
            stats: &stats,
            label_config: &self.config.amount_label,
        };
        let scores = alloc_score::score_bill(&pool[idx], order, &self.config.weight, &ctx, &mut self.rng);
        let used = pool[idx].available_amount;
        pool[idx]
            .apply_use(used)
            .expect("equal-amount shortcut must not overdraw");
        let bill = &pool[idx];
        Some(BillUsage {
            bill_id: bill.id.clone(),
            organization: bill.organization.clone(),
            label: bill.label,
            face_amount: bill.amount,
            used_amount: used,
            split_ratio: used / bill.amount,
            scores,
            selection_index: 0,
        })
    }

    fn finish(
        &self,
        order: &PaymentOrder,
        pool: &[Bill],
        selected: Vec<BillUsage>,
        constraints_met: bool,
        start: Instant,
    ) -> AllocationResult {
        if !constraints_met {
            tracing::warn!(order_id = %order.id.0, "selection does not satisfy configured constraints");
        }
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let result = alloc_format::assemble(alloc_format::AssembleArgs {
            order,
            selected,
            pool_after: pool,
            label_config: &self.config.amount_label,
            equal_amount_threshold: self.config.equal_amount_threshold,
            constraints_met,
            elapsed_ms,
        });
        tracing::debug!(
            order_id = %result.order_id.0,
            total_used = %result.total_used,
            bias = %result.bias,
            split_count = result.split_count,
            "allocation complete"
        );
        for warning in &result.warnings {
            tracing::warn!(order_id = %result.order_id.0, %warning, "allocation warning");
        }
        result
    }
}

/// Rank prefiltered candidates by total score (highest first) and take
/// whole bills while they fit the remaining gap. When the next-best
/// candidate overshoots, a partial use is taken only if it would consume
/// at least `split_cfg.min_ratio` of that bill; otherwise it is left for
/// the splitter and the next candidate is tried.
fn greedy_combine(
    order: &PaymentOrder,
    pool: &mut [Bill],
    candidate_indices: &[usize],
    config: &EngineConfig,
    ctx: &ScoringContext,
    rng: &mut ChaCha8Rng,
) -> (Vec<BillUsage>, Vec<usize>) {
    let mut scored: Vec<(usize, ScoreBreakdown)> = candidate_indices
        .iter()
        .map(|&idx| (idx, alloc_score::score_bill(&pool[idx], order, &config.weight, ctx, rng)))
        .collect();
    scored.sort_by(|a, b| b.1.total.partial_cmp(&a.1.total).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<BillUsage> = Vec::new();
    let mut leftover: Vec<usize> = Vec::new();
    let mut gap = order.amount;

    for (idx, scores) in scored {
        if gap <= Decimal::ZERO || selected.len() >= config.constraint.max_ticket_count {
            leftover.push(idx);
            continue;
        }
        let available = pool[idx].available_amount;
        if available <= Decimal::ZERO {
            continue;
        }

        let used = if available <= gap {
            available
        } else {
            let desired_ratio = gap / available;
            if desired_ratio >= config.split.min_ratio {
                gap
            } else {
                leftover.push(idx);
                continue;
            }
        };

        pool[idx].apply_use(used).expect("greedy combine must not overdraw");
        let bill = &pool[idx];
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
        gap -= used;
    }

    (selected, leftover)
}

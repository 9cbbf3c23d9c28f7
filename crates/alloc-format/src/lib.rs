#![deny(warnings)]

//! Assembles an [`AllocationResult`](alloc_core::AllocationResult) from a
//! completed selection: distributions, the usage-weighted score breakdown,
//! the wire-transfer residual, and human-readable warnings. Pure formatting;
//! it never mutates a bill or re-derives a selection.

use alloc_core::{
    AllocationResult, AmountLabelConfig, Bill, BillUsage, PaymentOrder, ScoreBreakdown, SizeLabel,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// `target_amount - total_used`: positive when the selection falls short,
/// negative when it overshoots.
pub fn bias(total_used: Decimal, target_amount: Decimal) -> Decimal {
    target_amount - total_used
}

/// Amount still owed by wire transfer after the selected bills are applied.
/// Zero once the selection covers the target.
pub fn wire_transfer_residual(total_used: Decimal, target_amount: Decimal) -> Decimal {
    (target_amount - total_used).max(Decimal::ZERO)
}

fn share_by_label(items: impl Iterator<Item = (SizeLabel, Decimal)>) -> BTreeMap<SizeLabel, Decimal> {
    let mut totals: BTreeMap<SizeLabel, Decimal> = BTreeMap::new();
    let mut grand_total = Decimal::ZERO;
    for (label, amount) in items {
        *totals.entry(label).or_insert(Decimal::ZERO) += amount;
        grand_total += amount;
    }
    if grand_total <= Decimal::ZERO {
        return SizeLabel::all()
            .into_iter()
            .map(|l| (l, Decimal::ZERO))
            .collect();
    }
    SizeLabel::all()
        .into_iter()
        .map(|l| {
            let share = totals.get(&l).copied().unwrap_or(Decimal::ZERO) / grand_total;
            (l, share)
        })
        .collect()
}

/// Share of `total_used` contributed by each label among the selected bills.
pub fn selected_distribution(selected: &[BillUsage]) -> BTreeMap<SizeLabel, Decimal> {
    share_by_label(selected.iter().map(|u| (u.label, u.used_amount)))
}

/// Share of remaining face value contributed by each label across bills
/// with a positive `available_amount` after this order was applied.
pub fn remaining_distribution(pool_after: &[Bill]) -> BTreeMap<SizeLabel, Decimal> {
    share_by_label(
        pool_after
            .iter()
            .filter(|b| b.available_amount > Decimal::ZERO)
            .map(|b| (b.label, b.available_amount)),
    )
}

/// The configured target inventory mix, for comparison against the other
/// two distributions.
pub fn expected_distribution(label_config: &AmountLabelConfig) -> BTreeMap<SizeLabel, Decimal> {
    SizeLabel::all()
        .into_iter()
        .map(|l| (l, label_config.expected(l)))
        .collect()
}

/// Per-dimension scores are the plain arithmetic mean across `selected`; the
/// total is `selected.sum(total_score * split_ratio)`, so a bill counts
/// toward the total in proportion to how much of *that bill* was used, not
/// its share of the order.
pub fn aggregate_score_breakdown(selected: &[BillUsage]) -> ScoreBreakdown {
    if selected.is_empty() {
        return ScoreBreakdown {
            maturity: 0.0,
            acceptor: 0.0,
            amount: 0.0,
            organization: 0.0,
            total: 0.0,
        };
    }
    let n = selected.len() as f64;
    let mut maturity = 0.0;
    let mut acceptor = 0.0;
    let mut amount = 0.0;
    let mut organization = 0.0;
    let mut total = 0.0;
    for usage in selected {
        maturity += usage.scores.maturity;
        acceptor += usage.scores.acceptor;
        amount += usage.scores.amount;
        organization += usage.scores.organization;
        let split_ratio = usage.split_ratio.to_f64().unwrap_or(0.0);
        total += usage.scores.total * split_ratio;
    }
    ScoreBreakdown {
        maturity: maturity / n,
        acceptor: acceptor / n,
        amount: amount / n,
        organization: organization / n,
        total,
    }
}

/// Human-readable, value-bearing warnings (never opaque codes).
pub fn assemble_warnings(
    constraints_met: bool,
    bias: Decimal,
    equal_amount_threshold: Decimal,
    split_count: usize,
    selection_is_empty: bool,
) -> Vec<String> {
    let mut warnings = Vec::new();
    if selection_is_empty {
        warnings.push("no bills were selected for this order".to_string());
    }
    if !constraints_met {
        warnings.push("selection does not satisfy all configured constraints".to_string());
    }
    if bias.abs() > equal_amount_threshold {
        warnings.push(format!(
            "bias {bias} exceeds the equal-amount threshold {equal_amount_threshold}"
        ));
    }
    if split_count > 0 {
        warnings.push(format!(
            "{split_count} bill(s) were split to approximate the target amount"
        ));
    }
    warnings
}

/// Inputs needed to assemble a finished [`AllocationResult`].
pub struct AssembleArgs<'a> {
    pub order: &'a PaymentOrder,
    pub selected: Vec<BillUsage>,
    pub pool_after: &'a [Bill],
    pub label_config: &'a AmountLabelConfig,
    pub equal_amount_threshold: Decimal,
    pub constraints_met: bool,
    pub elapsed_ms: u64,
}

/// Build the final result from a completed selection. Does not touch the
/// pool; `pool_after` is expected to already reflect the engine's mutation.
pub fn assemble(args: AssembleArgs) -> AllocationResult {
    let total_used: Decimal = args.selected.iter().map(|u| u.used_amount).sum();
    let bias_value = bias(total_used, args.order.amount);
    let residual = wire_transfer_residual(total_used, args.order.amount);
    let split_count = args
        .selected
        .iter()
        .filter(|u| u.used_amount < u.face_amount)
        .count();
    let score_breakdown = aggregate_score_breakdown(&args.selected);
    let selected_distribution = selected_distribution(&args.selected);
    let remaining_distribution = remaining_distribution(args.pool_after);
    let expected_distribution = expected_distribution(args.label_config);
    let warnings = assemble_warnings(
        args.constraints_met,
        bias_value,
        args.equal_amount_threshold,
        split_count,
        args.selected.is_empty(),
    );

    AllocationResult {
        order_id: args.order.id.clone(),
        target_amount: args.order.amount,
        total_used,
        bias: bias_value,
        wire_transfer_residual: residual,
        split_count,
        weighted_total_score: score_breakdown.total,
        score_breakdown,
        selected_distribution,
        remaining_distribution,
        expected_distribution,
        elapsed_ms: args.elapsed_ms,
        constraints_met: args.constraints_met,
        warnings,
        selected: args.selected,
    }
}

//! Pre-filtering, count cap, small-bill coverage, and split admissibility.

use alloc_core::{BillUsage, ConstraintConfig, SizeLabel, SplitConfig};
use alloc_core::Bill;
use rust_decimal::Decimal;

/// Indices into `pool` of bills eligible for this order: positive
/// availability and within every configured maturity/amount/acceptor range.
pub fn prefilter_indices(pool: &[Bill], cfg: &ConstraintConfig) -> Vec<usize> {
    pool.iter()
        .enumerate()
        .filter(|(_, b)| b.available_amount > Decimal::ZERO)
        .filter(|(_, b)| match cfg.allowed_maturity_days {
            Some((lo, hi)) => b.maturity_days >= lo && b.maturity_days <= hi,
            None => true,
        })
        .filter(|(_, b)| match cfg.allowed_amount_range {
            Some((lo, hi)) => b.amount >= lo && b.amount <= hi,
            None => true,
        })
        .filter(|(_, b)| match &cfg.allowed_acceptor_classes {
            Some(classes) => classes.contains(&b.acceptor_class),
            None => true,
        })
        .map(|(i, _)| i)
        .collect()
}

pub fn count_cap_ok(selected: &[BillUsage], cfg: &ConstraintConfig) -> bool {
    selected.len() <= cfg.max_ticket_count
}

/// When `small_ticket_limited`, sort the selected SMALL bills by face
/// amount ascending and take the smallest `m = ceil(0.8 * n)` of them: their
/// used amounts together must cover at least
/// `small_ticket_80pct_amount_coverage` of `order_amount`, or the selection
/// is leaning on a handful of larger SMALL bills instead of a broad base.
pub fn small_ticket_coverage_ok(selected: &[BillUsage], order_amount: Decimal, cfg: &ConstraintConfig) -> bool {
    if !cfg.small_ticket_limited {
        return true;
    }
    let mut small: Vec<&BillUsage> = selected.iter().filter(|u| u.label == SizeLabel::Small).collect();
    if small.is_empty() {
        return true;
    }
    small.sort_by(|a, b| a.face_amount.cmp(&b.face_amount));
    let n = small.len();
    let m = (((n as f64) * 0.8).ceil() as usize).clamp(1, n);
    let covered: Decimal = small.iter().take(m).map(|u| u.used_amount).sum();
    covered >= cfg.small_ticket_80pct_amount_coverage * order_amount
}

pub fn constraints_satisfied(selected: &[BillUsage], order_amount: Decimal, cfg: &ConstraintConfig) -> bool {
    count_cap_ok(selected, cfg) && small_ticket_coverage_ok(selected, order_amount, cfg)
}

/// Whether splitting a bill with `available` left to use against a
/// `remaining` gap is admissible, and if so, how much of it to use.
pub fn split_admissible(available: Decimal, remaining: Decimal, cfg: &SplitConfig) -> Option<Decimal> {
    if !cfg.allow_split || remaining <= Decimal::ZERO || available <= Decimal::ZERO {
        return None;
    }
    let used = remaining.min(available);
    if cfg.split_condition_unlimited {
        return Some(used);
    }
    let leftover = available - used;
    if leftover > Decimal::ZERO && leftover < cfg.min_remain {
        return None;
    }
    if used < cfg.min_use {
        return None;
    }
    if used / available < cfg.min_ratio {
        return None;
    }
    Some(used)
}

/// Whether `gap` is within tolerance of zero, per the configured absolute
/// and relative (to `target`) tail-difference thresholds.
pub fn is_close_enough(gap: Decimal, target: Decimal, cfg: &SplitConfig) -> bool {
    let abs_gap = gap.abs();
    abs_gap <= cfg.tail_diff_abs || (target > Decimal::ZERO && abs_gap <= cfg.tail_diff_ratio * target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc_core::{AmountLabelConfig, BillId};

    fn cfg() -> AmountLabelConfig {
        AmountLabelConfig::default()
    }

    fn bill(amount: i64, maturity: u32, class: u32) -> Bill {
        Bill::new("b1", Decimal::new(amount, 0), maturity, class, "orgA", &cfg()).unwrap()
    }

    #[test]
    fn prefilter_excludes_exhausted_bills() {
        let mut b = bill(500_000, 30, 1);
        b.apply_use(Decimal::new(500_000, 0)).unwrap();
        let pool = vec![b];
        let idx = prefilter_indices(&pool, &ConstraintConfig::default());
        assert!(idx.is_empty());
    }

    #[test]
    fn prefilter_respects_allowed_ranges() {
        let pool = vec![bill(500_000, 30, 1), bill(500_000, 400, 1)];
        let mut c = ConstraintConfig::default();
        c.allowed_maturity_days = Some((0, 100));
        let idx = prefilter_indices(&pool, &c);
        assert_eq!(idx, vec![0]);
    }

    #[test]
    fn split_admissible_rejects_tiny_leftover() {
        let cfg = SplitConfig {
            min_remain: Decimal::new(10_000, 0),
            ..SplitConfig::default()
        };
        // Using 490,000 of 500,000 leaves 10,000 remainder, exactly at the
        // floor so it's accepted; 495,000 leaves 5,000 which is rejected.
        assert!(split_admissible(Decimal::new(500_000, 0), Decimal::new(495_000, 0), &cfg).is_none());
    }

    #[test]
    fn split_admissible_rejects_below_min_ratio() {
        let cfg = SplitConfig {
            min_ratio: Decimal::new(5, 1),
            min_remain: Decimal::ZERO,
            min_use: Decimal::ZERO,
            ..SplitConfig::default()
        };
        assert!(split_admissible(Decimal::new(1_000_000, 0), Decimal::new(100_000, 0), &cfg).is_none());
    }

    fn small_usage(id: &str, face: i64, used: i64) -> BillUsage {
        BillUsage {
            bill_id: BillId(id.into()),
            organization: "orgA".into(),
            label: SizeLabel::Small,
            face_amount: Decimal::new(face, 0),
            used_amount: Decimal::new(used, 0),
            split_ratio: Decimal::new(used, 0) / Decimal::new(face, 0),
            scores: alloc_core::ScoreBreakdown {
                maturity: 0.0,
                acceptor: 0.0,
                amount: 0.0,
                organization: 0.0,
                total: 0.0,
            },
            selection_index: 0,
        }
    }

    #[test]
    fn small_ticket_coverage_fails_when_smallest_80pct_is_a_shortfall() {
        // n = 2 SMALL bills, m = ceil(0.8*2) = 2: both count. Their combined
        // used amount is 0.1 of the order, well under the 0.5 threshold.
        let order_amount = Decimal::new(100_000, 0);
        let selected = vec![
            small_usage("s1", 20_000, 4_000),
            small_usage("s2", 60_000, 6_000),
        ];
        let mut c = ConstraintConfig::default();
        c.small_ticket_limited = true;
        c.small_ticket_80pct_amount_coverage = Decimal::new(5, 1);
        assert!(!small_ticket_coverage_ok(&selected, order_amount, &c));
    }

    #[test]
    fn small_ticket_coverage_passes_when_smallest_80pct_covers_enough() {
        let order_amount = Decimal::new(100_000, 0);
        let selected = vec![
            small_usage("s1", 20_000, 20_000),
            small_usage("s2", 60_000, 40_000),
        ];
        let mut c = ConstraintConfig::default();
        c.small_ticket_limited = true;
        c.small_ticket_80pct_amount_coverage = Decimal::new(5, 1);
        assert!(small_ticket_coverage_ok(&selected, order_amount, &c));
    }
}

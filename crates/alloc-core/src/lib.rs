#![deny(warnings)]

//! Domain model for the bill-allocation engine.
//!
//! Defines bills, payment orders, the configuration records that steer
//! scoring/splitting/constraints, and the two pure helpers that feed the
//! scorer: the size classifier and pool-statistics aggregation. Everything
//! here is serializable and carries no I/O.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

// -------------- identifiers --------------

/// Unique identifier for a bill.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BillId(pub String);

/// Unique identifier for a payment order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

// -------------- size label --------------

/// LARGE / MEDIUM / SMALL classification of a bill by face amount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeLabel {
    Large,
    Medium,
    Small,
}

impl SizeLabel {
    /// All labels, in the tiebreak order used by the classifier.
    pub fn all() -> [SizeLabel; 3] {
        [SizeLabel::Large, SizeLabel::Medium, SizeLabel::Small]
    }
}

// -------------- domain errors --------------

/// Validation failures raised by domain constructors.
///
/// These guard the invariants in the data model, not HTTP/JSON request
/// shape (that boundary concern belongs to an external collaborator).
#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("amount must be > 0")]
    NonPositiveAmount,
    #[error("acceptor class must be within [1, {max}], got {got}")]
    AcceptorClassOutOfRange { got: u32, max: u32 },
    #[error("organization must not be empty")]
    EmptyOrganization,
    #[error("usage amount {used} is invalid against available {available}")]
    InvalidUsage { used: Decimal, available: Decimal },
    #[error("ratio {0} outside [0,1]")]
    RatioOutOfRange(Decimal),
    #[error("range is malformed: lo ({lo}) must be < hi ({hi})")]
    MalformedRange { lo: Decimal, hi: Decimal },
}

// -------------- bills & orders --------------

/// A commercial note: face amount, maturity, acceptor quality, issuing org.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bill {
    pub id: BillId,
    pub amount: Decimal,
    pub maturity_days: u32,
    pub acceptor_class: u32,
    pub organization: String,
    pub label: SizeLabel,
    pub available_amount: Decimal,
}

impl Bill {
    /// Construct a bill, classifying it from `label_config` and seeding
    /// `available_amount = amount`.
    pub fn new(
        id: impl Into<String>,
        amount: Decimal,
        maturity_days: u32,
        acceptor_class: u32,
        organization: impl Into<String>,
        label_config: &AmountLabelConfig,
    ) -> Result<Self, DomainError> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::NonPositiveAmount);
        }
        let organization = organization.into();
        if organization.trim().is_empty() {
            return Err(DomainError::EmptyOrganization);
        }
        let label = classify(amount, label_config);
        Ok(Self {
            id: BillId(id.into()),
            amount,
            maturity_days,
            acceptor_class,
            organization,
            label,
            available_amount: amount,
        })
    }

    /// Decrement `available_amount` by `used`, the engine's sole mutation.
    pub fn apply_use(&mut self, used: Decimal) -> Result<(), DomainError> {
        if used <= Decimal::ZERO || used > self.available_amount {
            return Err(DomainError::InvalidUsage {
                used,
                available: self.available_amount,
            });
        }
        self.available_amount -= used;
        Ok(())
    }
}

/// A request to discharge a monetary obligation using one or more bills.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub id: OrderId,
    pub amount: Decimal,
    pub organization: String,
    pub priority: u32,
}

impl PaymentOrder {
    pub fn new(
        id: impl Into<String>,
        amount: Decimal,
        organization: impl Into<String>,
        priority: u32,
    ) -> Result<Self, DomainError> {
        if amount <= Decimal::ZERO {
            return Err(DomainError::NonPositiveAmount);
        }
        let organization = organization.into();
        if organization.trim().is_empty() {
            return Err(DomainError::EmptyOrganization);
        }
        Ok(Self {
            id: OrderId(id.into()),
            amount,
            organization,
            priority,
        })
    }
}

// -------------- strategy axes --------------

/// Maturity-dimension scoring strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaturityStrategy {
    FarFirst,
    NearFirst,
}

/// Acceptor-dimension scoring strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptorStrategy {
    GoodFirst,
    BadFirst,
}

/// Amount-dimension scoring strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountStrategy {
    LargeFirst,
    SmallFirst,
    Random,
    LeOrder,
    GeOrder,
    OptimizeInventory,
}

/// Sub-strategy refining `LargeFirst`/`SmallFirst` within a label.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountSubStrategy {
    Sorted,
    RandomWithin,
}

/// Organization-dimension scoring strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrganizationStrategy {
    SameOrg,
    DiffOrg,
}

/// Which dimension the splitter prefers when choosing a candidate bill.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    ByMaturity,
    ByAcceptorClass,
    ByAmountLarge,
    ByAmountClose,
}

// -------------- configuration records --------------

/// Half-open `[lo, hi)` amount ranges plus target inventory-mix ratios.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AmountLabelConfig {
    pub large_range: (Decimal, Decimal),
    pub medium_range: (Decimal, Decimal),
    pub small_range: (Decimal, Decimal),
    pub large_ratio: Decimal,
    pub medium_ratio: Decimal,
    pub small_ratio: Decimal,
}

impl Default for AmountLabelConfig {
    fn default() -> Self {
        Self {
            large_range: (Decimal::new(1_000_000, 0), Decimal::MAX),
            medium_range: (Decimal::new(100_000, 0), Decimal::new(1_000_000, 0)),
            small_range: (Decimal::ZERO, Decimal::new(100_000, 0)),
            large_ratio: Decimal::new(5, 1),
            medium_ratio: Decimal::new(3, 1),
            small_ratio: Decimal::new(2, 1),
        }
    }
}

impl AmountLabelConfig {
    pub fn expected(&self, label: SizeLabel) -> Decimal {
        match label {
            SizeLabel::Large => self.large_ratio,
            SizeLabel::Medium => self.medium_ratio,
            SizeLabel::Small => self.small_ratio,
        }
    }
}

/// Weights and per-dimension strategies for the scorer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WeightConfig {
    pub w_maturity: f64,
    pub w_acceptor: f64,
    pub w_amount: f64,
    pub w_organization: f64,

    pub maturity_strategy: MaturityStrategy,
    pub maturity_threshold: u32,

    pub acceptor_strategy: AcceptorStrategy,
    pub acceptor_class_count: u32,

    pub amount_strategy: AmountStrategy,
    pub amount_sub_strategy: Option<AmountSubStrategy>,

    pub organization_strategy: OrganizationStrategy,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            w_maturity: 0.25,
            w_acceptor: 0.25,
            w_amount: 0.25,
            w_organization: 0.25,
            maturity_strategy: MaturityStrategy::FarFirst,
            maturity_threshold: 90,
            acceptor_strategy: AcceptorStrategy::BadFirst,
            acceptor_class_count: 5,
            amount_strategy: AmountStrategy::OptimizeInventory,
            amount_sub_strategy: None,
            organization_strategy: OrganizationStrategy::SameOrg,
        }
    }
}

/// Splitter tuning: tolerances, admissibility floors, candidate strategy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitConfig {
    pub allow_split: bool,
    pub tail_diff_abs: Decimal,
    pub tail_diff_ratio: Decimal,
    pub min_remain: Decimal,
    pub min_use: Decimal,
    pub min_ratio: Decimal,
    pub split_strategy: SplitStrategy,
    pub split_condition_unlimited: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            allow_split: true,
            tail_diff_abs: Decimal::new(10_000, 0),
            tail_diff_ratio: Decimal::new(3, 1),
            min_remain: Decimal::new(50_000, 0),
            min_use: Decimal::new(50_000, 0),
            min_ratio: Decimal::new(3, 1),
            split_strategy: SplitStrategy::ByAmountClose,
            split_condition_unlimited: false,
        }
    }
}

/// Pre-filter and post-selection constraints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConstraintConfig {
    pub max_ticket_count: usize,
    pub small_ticket_limited: bool,
    pub small_ticket_80pct_amount_coverage: Decimal,
    pub allowed_maturity_days: Option<(u32, u32)>,
    pub allowed_amount_range: Option<(Decimal, Decimal)>,
    pub allowed_acceptor_classes: Option<BTreeSet<u32>>,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            max_ticket_count: 10,
            small_ticket_limited: false,
            small_ticket_80pct_amount_coverage: Decimal::new(5, 1),
            allowed_maturity_days: None,
            allowed_amount_range: None,
            allowed_acceptor_classes: None,
        }
    }
}

/// Top-level immutable config snapshot for one engine (or one call).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub amount_label: AmountLabelConfig,
    pub weight: WeightConfig,
    pub split: SplitConfig,
    pub constraint: ConstraintConfig,
    pub equal_amount_first: bool,
    pub equal_amount_threshold: Decimal,
    /// Seed for the engine-local PRNG; `None` falls back to a fixed default.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            amount_label: AmountLabelConfig::default(),
            weight: WeightConfig::default(),
            split: SplitConfig::default(),
            constraint: ConstraintConfig::default(),
            equal_amount_first: false,
            equal_amount_threshold: Decimal::new(1_000, 0),
            seed: None,
        }
    }
}

// -------------- classifier --------------

/// Assign a size label from the configured half-open amount ranges.
///
/// Checked in LARGE, MEDIUM, SMALL order so overlapping ranges tiebreak
/// toward LARGE. An amount outside all three ranges clamps to LARGE when it
/// is at or above `large_range.0`, otherwise SMALL.
pub fn classify(amount: Decimal, cfg: &AmountLabelConfig) -> SizeLabel {
    let (l_lo, l_hi) = cfg.large_range;
    let (m_lo, m_hi) = cfg.medium_range;
    let (s_lo, s_hi) = cfg.small_range;
    if amount >= l_lo && amount < l_hi {
        return SizeLabel::Large;
    }
    if amount >= m_lo && amount < m_hi {
        return SizeLabel::Medium;
    }
    if amount >= s_lo && amount < s_hi {
        return SizeLabel::Small;
    }
    if amount >= l_lo {
        SizeLabel::Large
    } else {
        SizeLabel::Small
    }
}

// -------------- pool statistics --------------

/// Per-pool aggregates the scorer needs: maturity span, per-label amount
/// span, and per-label share of inventory by face amount.
#[derive(Clone, Debug)]
pub struct PoolStats {
    pub maturity_range: (u32, u32),
    pub amount_range_by_label: BTreeMap<SizeLabel, (Decimal, Decimal)>,
    pub inventory_distribution: BTreeMap<SizeLabel, Decimal>,
}

impl PoolStats {
    /// Compute stats from face amounts of the post-filter pool. Captured at
    /// the start of each `allocate()` call; never reflects mutations made
    /// during that call.
    pub fn compute(bills: &[Bill]) -> Self {
        if bills.is_empty() {
            return Self {
                maturity_range: (0, 365),
                amount_range_by_label: BTreeMap::new(),
                inventory_distribution: equal_thirds(),
            };
        }

        let min_days = bills.iter().map(|b| b.maturity_days).min().unwrap();
        let max_days = bills.iter().map(|b| b.maturity_days).max().unwrap();

        let mut amount_range_by_label = BTreeMap::new();
        for label in SizeLabel::all() {
            let amounts: Vec<Decimal> = bills
                .iter()
                .filter(|b| b.label == label)
                .map(|b| b.amount)
                .collect();
            if let (Some(&lo), Some(&hi)) = (amounts.iter().min(), amounts.iter().max()) {
                amount_range_by_label.insert(label, (lo, hi));
            }
        }

        let total: Decimal = bills.iter().map(|b| b.amount).sum();
        let inventory_distribution = if total > Decimal::ZERO {
            let mut dist = BTreeMap::new();
            for label in SizeLabel::all() {
                let label_sum: Decimal = bills
                    .iter()
                    .filter(|b| b.label == label)
                    .map(|b| b.amount)
                    .sum();
                dist.insert(label, label_sum / total);
            }
            dist
        } else {
            equal_thirds()
        };

        Self {
            maturity_range: (min_days, max_days),
            amount_range_by_label,
            inventory_distribution,
        }
    }
}

fn equal_thirds() -> BTreeMap<SizeLabel, Decimal> {
    let third = Decimal::ONE / Decimal::from(3u8);
    SizeLabel::all().into_iter().map(|l| (l, third)).collect()
}

// -------------- result types --------------

/// Per-dimension scores and the weighted total, all in `[0, 1]`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub maturity: f64,
    pub acceptor: f64,
    pub amount: f64,
    pub organization: f64,
    pub total: f64,
}

/// One bill's contribution to a selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BillUsage {
    pub bill_id: BillId,
    pub organization: String,
    pub label: SizeLabel,
    pub face_amount: Decimal,
    pub used_amount: Decimal,
    pub split_ratio: Decimal,
    pub scores: ScoreBreakdown,
    pub selection_index: usize,
}

/// The fully detailed outcome of one `allocate()` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocationResult {
    pub order_id: OrderId,
    pub target_amount: Decimal,
    pub selected: Vec<BillUsage>,
    pub total_used: Decimal,
    pub bias: Decimal,
    pub wire_transfer_residual: Decimal,
    pub split_count: usize,
    pub weighted_total_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub selected_distribution: BTreeMap<SizeLabel, Decimal>,
    pub remaining_distribution: BTreeMap<SizeLabel, Decimal>,
    pub expected_distribution: BTreeMap<SizeLabel, Decimal>,
    pub elapsed_ms: u64,
    pub constraints_met: bool,
    pub warnings: Vec<String>,
}

#![deny(warnings)]

//! Headless CLI for running the bill-allocation engine against a demo pool
//! and printing a human-readable summary plus a JSON dump of the results.

use alloc_core::{AmountLabelConfig, Bill, EngineConfig, PaymentOrder};
use alloc_engine::Engine;
use anyhow::Result;
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

fn parse_args() -> (Option<u64>, bool) {
    let mut seed: Option<u64> = None;
    let mut json = false;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--seed" => seed = it.next().and_then(|s| s.parse().ok()),
            "--json" => json = true,
            _ => {}
        }
    }
    (seed, json)
}

fn demo_pool(label_cfg: &AmountLabelConfig) -> Vec<Bill> {
    let specs: &[(&str, i64, u32, u32, &str)] = &[
        ("bill-001", 1_500_000, 210, 1, "acme-corp"),
        ("bill-002", 2_200_000, 45, 2, "acme-corp"),
        ("bill-003", 600_000, 130, 1, "globex"),
        ("bill-004", 420_000, 300, 3, "acme-corp"),
        ("bill-005", 80_000, 20, 4, "initech"),
        ("bill-006", 95_000, 60, 2, "globex"),
        ("bill-007", 310_000, 150, 2, "acme-corp"),
        ("bill-008", 1_050_000, 10, 5, "initech"),
    ];
    specs
        .iter()
        .map(|&(id, amount, days, class, org)| {
            Bill::new(id, Decimal::new(amount, 0), days, class, org, label_cfg).unwrap()
        })
        .collect()
}

fn demo_orders() -> Vec<PaymentOrder> {
    vec![
        PaymentOrder::new("order-1", Decimal::new(1_800_000, 0), "acme-corp", 5).unwrap(),
        PaymentOrder::new("order-2", Decimal::new(500_000, 0), "globex", 1).unwrap(),
        PaymentOrder::new("order-3", Decimal::new(900_000, 0), "initech", 3).unwrap(),
    ]
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::DEBUG)
        .init();

    let (seed, json) = parse_args();
    info!(?seed, ?json, "starting bill-allocation demo");

    let config = EngineConfig {
        seed,
        ..EngineConfig::default()
    };
    let mut pool = demo_pool(&config.amount_label);
    let orders = demo_orders();
    let pool_before = pool.len();

    let mut engine = Engine::new(config);
    let results = engine.allocate_batch(&orders, &mut pool);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("Pool | bills: {pool_before}");
    for result in &results {
        println!(
            "Order {} | target: ${} | used: ${} | bias: ${} | bills: {} | splits: {} | score: {:.3} | constraints_met: {}",
            result.order_id.0,
            result.target_amount,
            result.total_used,
            result.bias,
            result.selected.len(),
            result.split_count,
            result.weighted_total_score,
            result.constraints_met,
        );
        for usage in &result.selected {
            println!(
                "  - {} ({:?}) used ${} of ${} [score {:.3}]",
                usage.bill_id.0, usage.label, usage.used_amount, usage.face_amount, usage.scores.total
            );
        }
        for warning in &result.warnings {
            println!("  ! {warning}");
        }
    }

    let remaining: Decimal = pool.iter().map(|b| b.available_amount).sum();
    println!("Remaining pool face value: ${remaining}");

    Ok(())
}

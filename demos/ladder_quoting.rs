//! Ladder quoting walkthrough.
//!
//! Drives the reconciliation engine against the scripted in-memory venue:
//! quotes a three-level ladder, lets fills land, and shows how the engine
//! keeps its local book consistent with venue truth, first stepped manually
//! and then free-running with a shutdown flag.
//!
//! Run with: `cargo run --example ladder_quoting`

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use maker_engine_rs::dec;
use maker_engine_rs::engine::{EngineConfig, IntervalPolicy, MakerEngine};
use maker_engine_rs::strategy::{LadderConfig, LadderStrategy, SharedPrice};
use maker_engine_rs::venue::MockVenue;
use maker_engine_rs::{EngineError, Side};

const SYMBOL: &str = "BTC-USD";

#[tokio::main]
async fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt::init();

    println!("=== Ladder Quoting Example ===\n");

    // Reference price feed the strategy quotes around.
    let price = SharedPrice::new();
    price.set(dec!(30000.0));

    let ladder = LadderConfig::new(3, dec!(0.001), dec!(0.5), dec!(10.0))?;
    println!("Ladder Configuration:");
    println!("  Levels per side: {}", ladder.levels_per_side);
    println!("  Level spacing:   {} (proportional)", ladder.level_spacing);
    println!("  Base size:       {} units", ladder.base_size);
    println!("  Max position:    {} units\n", ladder.max_position);

    let venue = Arc::new(MockVenue::new());
    let config = EngineConfig::new(SYMBOL)?.with_poll_interval_ms(100);
    let mut engine = MakerEngine::new(
        Arc::clone(&venue),
        LadderStrategy::new(ladder, price.clone()),
        IntervalPolicy::new(60_000),
        config,
    );

    // === Initial submission ===
    println!("=== Initial Submission ===\n");
    engine.initialize().await?;
    print_book(&engine);

    // === A partial fill on the best bid ===
    println!("=== Partial Fill ===\n");
    let bid0 = engine.book().active_side(Side::Buy)[&0]
        .client_order_id
        .clone();
    venue.fill_order(&bid0, dec!(0.2)).await?;
    engine.run_once().await?;
    println!(
        "Bought 0.2 @ 29970: position {} units, avg entry {}",
        engine.position().quantity,
        engine.position().avg_entry_price
    );
    println!(
        "Best bid handle now rests {} units\n",
        engine.book().active_side(Side::Buy)[&0].quantity
    );

    // === A complete fill forces a ladder rebuild ===
    println!("=== Complete Fill and Rebuild ===\n");
    let ask0 = engine.book().active_side(Side::Sell)[&0]
        .client_order_id
        .clone();
    venue.fill_order(&ask0, dec!(0.5)).await?;
    engine.run_once().await?; // picks up the fill, schedules the rebuild
    engine.run_once().await?; // cancels survivors and re-quotes everything
    println!(
        "Sold 0.5 @ 30030: position {} units, realized PnL {}",
        engine.position().quantity,
        engine.position().realized_pnl
    );
    print_book(&engine);

    // === Free-running loop with shutdown ===
    println!("=== Free-Running Loop ===\n");
    engine.halt().await?;
    let shutdown = engine.shutdown_handle();
    let runner = tokio::spawn(engine.run());

    // Let a fill land while the loop is running.
    tokio::time::sleep(Duration::from_millis(250)).await;
    if let Some(id) = venue.live_order_ids(SYMBOL).await.first() {
        venue.fill_order(id, dec!(0.5)).await?;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    shutdown.store(true, Ordering::Relaxed);
    let stats = runner.await.expect("engine task panicked")?;

    println!("Final statistics:");
    println!("  Iterations:            {}", stats.iterations);
    println!("  Fills processed:       {}", stats.fills_processed);
    println!("  Bulk refreshes:        {}", stats.bulk_refreshes);
    println!("  Incremental refreshes: {}", stats.incremental_refreshes);
    println!("  Orders submitted:      {}", stats.orders_submitted);
    println!("  Orders cancelled:      {}", stats.orders_cancelled);
    println!("  Anomalies:             {}", stats.anomalies);
    println!(
        "\nOrders still live on the venue: {}",
        venue.live_order_ids(SYMBOL).await.len()
    );

    Ok(())
}

fn print_book<S, P>(engine: &MakerEngine<MockVenue, S, P>)
where
    S: maker_engine_rs::StrategyProvider,
    P: maker_engine_rs::engine::RefreshPolicy,
{
    println!("Resting orders:");
    for (index, order) in engine.book().active_side(Side::Sell).iter().rev() {
        println!(
            "  ask[{index}] {} x {}  ({})",
            order.price, order.quantity, order.client_order_id
        );
    }
    for (index, order) in engine.book().active_side(Side::Buy) {
        println!(
            "  bid[{index}] {} x {}  ({})",
            order.price, order.quantity, order.client_order_id
        );
    }
    println!();
}

//! Example: Arm and disarm a partition on an emulated panel.

use std::sync::Arc;

use dsc_keybus_bridge::{
    AlarmCommand, BridgeConfig, CommandOutcome, KeybusPanel, LoopbackDriver, StatusBoard,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = BridgeConfig::builder()
        .partition_count(2)
        .access_code("1234")
        .build();

    let board = Arc::new(StatusBoard::new());
    let driver = Arc::new(LoopbackDriver::new(board.clone()).emulating(2, "1234"));
    let panel = KeybusPanel::new(config, driver, board)?;
    panel.connect()?;
    panel.poll().await;

    // Show current partition states
    let status = panel.status();
    for partition in 1..=2 {
        if let Some(part) = status.partition(partition) {
            println!(
                "Partition {}: {} ({:02X}: {})",
                partition,
                part.status(),
                part.status_code,
                part.status_text()
            );
        }
    }

    // Arm partition 1 in stay mode
    println!("\nArming partition 1 in stay mode...");
    match panel.issue(1, AlarmCommand::ArmStay, None).await {
        Ok(CommandOutcome::Sent) => println!("Partition 1 arm (stay) sent"),
        Ok(CommandOutcome::NoOp) => println!("Partition 1 already armed"),
        Err(e) => println!("Error arming partition 1: {}", e),
    }
    for event in panel.poll().await {
        println!("  {:?}", event);
    }

    // Arming again does nothing
    match panel.issue(1, AlarmCommand::ArmAway, None).await {
        Ok(outcome) => println!("Second arm: {:?}", outcome),
        Err(e) => println!("Error arming partition 1: {}", e),
    }

    println!("\nDisarming partition 1...");
    match panel.issue(1, AlarmCommand::Disarm, None).await {
        Ok(CommandOutcome::Sent) => println!("Partition 1 disarm sent"),
        Ok(CommandOutcome::NoOp) => println!("Partition 1 already disarmed"),
        Err(e) => println!("Error disarming partition 1: {}", e),
    }
    for event in panel.poll().await {
        println!("  {:?}", event);
    }

    // Out-of-range partitions are rejected before reaching the driver
    if let Err(e) = panel.issue(3, AlarmCommand::ArmAway, None).await {
        println!("\nPartition 3: {}", e);
    }

    panel.disconnect();
    Ok(())
}

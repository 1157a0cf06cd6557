//! Example: Print zone and partition events while a simulated sensor trips.

use std::sync::Arc;

use dsc_keybus_bridge::{BridgeConfig, KeybusPanel, LoopbackDriver, PanelEvent, StatusBoard};
use tokio::time::{interval, Duration};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = BridgeConfig::builder()
        .partition_count(1)
        .zone_group_count(2)
        .access_code("1234")
        .build();

    let board = Arc::new(StatusBoard::new());
    let driver = Arc::new(LoopbackDriver::new(board.clone()).emulating(1, "1234"));
    let panel = Arc::new(KeybusPanel::new(config, driver, board.clone())?);
    let mut events = panel.subscribe();
    panel.connect()?;

    let runner = Arc::clone(&panel);
    tokio::spawn(async move { runner.run().await });

    // Open and close zone 5 every few seconds, as a door contact would
    let sensor_board = board.clone();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(3));
        let mut open = false;
        loop {
            ticker.tick().await;
            open = !open;
            sensor_board.publish(|w| {
                w.set_zone_open(5, open);
            });
        }
    });

    println!("Listening for zone events (Ctrl+C to stop)...\n");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(PanelEvent::ZoneOpenChanged { zone, open }) => {
                        println!("Zone {:2} {}", zone, if open { "open" } else { "closed" });
                    }
                    Ok(PanelEvent::ZoneAlarmChanged { zone, alarm }) => {
                        println!("Zone {:2} alarm {}", zone, if alarm { "tripped" } else { "restored" });
                    }
                    Ok(PanelEvent::ConnectionChanged { connected: false }) => {
                        println!("Keybus disconnected!");
                        break;
                    }
                    Ok(event) => {
                        println!("Event: {:?}", event);
                    }
                    Err(e) => {
                        println!("Event channel error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nDisconnecting...");
                break;
            }
        }
    }

    panel.disconnect();
    Ok(())
}

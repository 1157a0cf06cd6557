// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// DSC Keybus change dispatcher and command gateway
//
//! # dsc-keybus-bridge
//!
//! Turns the status flags a DSC Keybus driver maintains into de-duplicated
//! panel events (partition status, zone open/alarm, keypad trouble, panel
//! time), and validates arm/disarm/panic/fire/keypad/time-set commands
//! against current partition state before writing them back to the driver.
//!
//! Hardware drivers implement [`KeybusDriver`] and publish decoded frames to
//! a shared [`StatusBoard`]. [`LoopbackDriver`] stands in for hardware.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dsc_keybus_bridge::{AlarmCommand, BridgeConfig, KeybusPanel, LoopbackDriver, StatusBoard};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::builder().partition_count(1).build();
//!     let board = Arc::new(StatusBoard::new());
//!     let driver = Arc::new(LoopbackDriver::new(board.clone()));
//!     let panel = Arc::new(KeybusPanel::new(config, driver, board)?);
//!     panel.connect()?;
//!
//!     let mut events = panel.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let runner = Arc::clone(&panel);
//!     tokio::spawn(async move { runner.run().await });
//!
//!     panel.issue(1, AlarmCommand::ArmStay, None).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     panel.disconnect();
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod gateway;
pub mod panel;
pub mod protocol;
pub mod snapshot;
pub mod transport;

// Re-exports for convenience
pub use config::{BridgeConfig, BridgeConfigBuilder, LightsFormat};
pub use constants::status_text;
pub use devices::partition::{classify, Lights, PartitionChanges, PartitionState, PartitionStatus};
pub use devices::system::{KeypadAlarm, KeypadStatus, PanelTime, SystemChanges, SystemState};
pub use devices::zone::{diff_zone_bitmap, ZoneTransition};
pub use dispatch::{ChangeDispatcher, PartitionHandle};
pub use error::{DscError, Result};
pub use event::{EventReceiver, PanelEvent};
pub use gateway::{CommandGateway, CommandOutcome};
pub use panel::KeybusPanel;
pub use protocol::{AlarmCommand, InboundCommand, MaintenanceAction};
pub use snapshot::{StatusBoard, StatusDelta, StatusSnapshot, StatusWriter};
pub use transport::{KeybusDriver, LoopbackDriver};

// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Panel facade: owns the board, driver, dispatcher and gateway

use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::dispatch::ChangeDispatcher;
use crate::error::Result;
use crate::event::{event_channel, EventReceiver, EventSender, PanelEvent};
use crate::gateway::{CommandGateway, CommandOutcome};
use crate::protocol::{AlarmCommand, InboundCommand, MaintenanceAction};
use crate::snapshot::{StatusBoard, StatusSnapshot};
use crate::transport::KeybusDriver;

/// Partition used for the time-set sequence.
const TIME_PARTITION: u8 = 1;

/// The main public API for a DSC panel behind a Keybus driver.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use dsc_keybus_bridge::{AlarmCommand, BridgeConfig, KeybusPanel, LoopbackDriver, StatusBoard};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = BridgeConfig::builder()
///         .partition_count(2)
///         .access_code("1234")
///         .build();
///
///     let board = Arc::new(StatusBoard::new());
///     let driver = Arc::new(LoopbackDriver::new(board.clone()).emulating(2, "1234"));
///     let panel = Arc::new(KeybusPanel::new(config, driver, board)?);
///     panel.connect()?;
///
///     let mut events = panel.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     let runner = Arc::clone(&panel);
///     tokio::spawn(async move { runner.run().await });
///
///     panel.issue(1, AlarmCommand::ArmAway, None).await?;
///
///     tokio::signal::ctrl_c().await?;
///     panel.disconnect();
///     Ok(())
/// }
/// ```
pub struct KeybusPanel<D: KeybusDriver> {
    config: BridgeConfig,
    board: Arc<StatusBoard>,
    driver: Arc<D>,
    gateway: Arc<CommandGateway<D>>,
    dispatcher: Mutex<ChangeDispatcher<D>>,
    event_tx: EventSender,
    /// When a maintenance stop should end on its own
    restart_at: std::sync::Mutex<Option<Instant>>,
}

impl<D: KeybusDriver> KeybusPanel<D> {
    /// Build the panel around a driver that publishes to `board`.
    pub fn new(config: BridgeConfig, driver: Arc<D>, board: Arc<StatusBoard>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _event_rx) = event_channel(256);
        let gateway = Arc::new(CommandGateway::new(driver.clone(), board.clone(), &config));
        let dispatcher =
            ChangeDispatcher::new(board.clone(), gateway.clone(), event_tx.clone(), &config);
        Ok(Self {
            config,
            board,
            driver,
            gateway,
            dispatcher: Mutex::new(dispatcher),
            event_tx,
            restart_at: std::sync::Mutex::new(None),
        })
    }

    /// Subscribe to panel events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn gateway(&self) -> &Arc<CommandGateway<D>> {
        &self.gateway
    }

    /// Current panel state without consuming pending changes.
    pub fn status(&self) -> StatusSnapshot {
        self.board.peek()
    }

    /// Reset the board and start the driver. The next poll re-emits the full
    /// panel state.
    pub fn connect(&self) -> Result<()> {
        info!("Connecting to keybus");
        self.board.reset();
        self.driver.begin()
    }

    /// Stop the driver and report the keybus as disconnected.
    pub fn disconnect(&self) {
        info!("Disconnecting from keybus");
        self.driver.stop();
        self.board.publish(|w| {
            w.set_connected(false);
        });
    }

    /// Ask for every current value to be published again.
    pub fn refresh_status(&self) {
        info!("Refreshing status");
        self.board.reset();
    }

    /// Stop the driver for maintenance. It restarts by itself after
    /// `auto_restart_secs` unless [`start_driver`](Self::start_driver) is
    /// called first.
    pub fn stop_driver(&self) {
        let secs = self.config.auto_restart_secs;
        let deadline = (secs > 0).then(|| Instant::now() + Duration::from_secs(secs));
        *self.lock_restart() = deadline;
        self.disconnect();
        match deadline {
            Some(_) => info!("Driver stopped, restarting in {}s", secs),
            None => info!("Driver stopped"),
        }
        let _ = self.event_tx.send(PanelEvent::DriverStopped {
            auto_restart_secs: deadline.map(|_| secs),
        });
    }

    /// Restart a stopped driver.
    pub fn start_driver(&self) -> Result<()> {
        *self.lock_restart() = None;
        self.connect()?;
        let _ = self.event_tx.send(PanelEvent::DriverStarted);
        Ok(())
    }

    /// Stop and immediately restart the driver.
    pub fn restart_driver(&self) -> Result<()> {
        info!("Restarting driver");
        *self.lock_restart() = None;
        self.disconnect();
        self.connect()?;
        let _ = self.event_tx.send(PanelEvent::DriverRestarted);
        Ok(())
    }

    fn lock_restart(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.restart_at.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_auto_restart(&self) {
        let due = {
            let mut restart_at = self.lock_restart();
            match *restart_at {
                Some(at) if Instant::now() >= at => restart_at.take().is_some(),
                _ => false,
            }
        };
        if !due {
            return;
        }
        info!("Maintenance window over, restarting driver");
        match self.connect() {
            Ok(()) => {
                let _ = self.event_tx.send(PanelEvent::DriverRestarted);
            }
            Err(e) => warn!("Driver restart failed: {}", e),
        }
    }

    /// Run one dispatch cycle and return the events it emitted.
    pub async fn poll(&self) -> Vec<PanelEvent> {
        self.check_auto_restart();
        self.dispatcher.lock().await.poll().await
    }

    /// Poll forever at `poll_interval_ms`.
    pub async fn run(&self) {
        let mut ticker = interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll().await;
        }
    }

    // --- Commands ---

    pub async fn issue(
        &self,
        partition: u8,
        command: AlarmCommand,
        code: Option<&str>,
    ) -> Result<CommandOutcome> {
        self.gateway.issue(partition, command, code).await
    }

    pub async fn write_keys(&self, partition: u8, keys: &str) -> Result<()> {
        self.gateway.write_keys(partition, keys).await
    }

    pub async fn set_time(&self, time: &NaiveDateTime) -> Result<()> {
        self.gateway.set_time(TIME_PARTITION, time).await
    }

    /// Carry out a command received from the messaging side.
    pub async fn execute(&self, command: InboundCommand) -> Result<CommandOutcome> {
        debug!("Executing {:?}", command);
        match command {
            InboundCommand::Alarm { partition, command, code } => {
                self.issue(partition, command, code.as_deref()).await
            }
            InboundCommand::Keypad { partition, keys } => {
                self.write_keys(partition, &keys).await?;
                Ok(CommandOutcome::Sent)
            }
            InboundCommand::SetTime(time) => {
                self.set_time(&time).await?;
                Ok(CommandOutcome::Sent)
            }
            InboundCommand::RefreshStatus => {
                self.refresh_status();
                Ok(CommandOutcome::Sent)
            }
            InboundCommand::Maintenance(MaintenanceAction::StopDriver) => {
                self.stop_driver();
                Ok(CommandOutcome::Sent)
            }
            InboundCommand::Maintenance(MaintenanceAction::StartDriver) => {
                self.start_driver()?;
                Ok(CommandOutcome::Sent)
            }
            InboundCommand::Maintenance(MaintenanceAction::Reboot) => {
                self.restart_driver()?;
                Ok(CommandOutcome::Sent)
            }
        }
    }
}

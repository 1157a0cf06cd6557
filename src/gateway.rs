// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Guarded command writes to the Keybus driver

use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::constants::MAX_WRITE_KEYS;
use crate::devices::partition::PartitionState;
use crate::error::{DscError, Result};
use crate::protocol::{time_set_keys, AlarmCommand};
use crate::snapshot::StatusBoard;
use crate::transport::KeybusDriver;

/// Result of a command that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Keys were written to the driver
    Sent,
    /// The partition was already in the requested state; nothing written
    NoOp,
}

/// Validates outbound commands against current partition state and writes
/// them to the driver one at a time.
pub struct CommandGateway<D: KeybusDriver> {
    driver: Arc<D>,
    board: Arc<StatusBoard>,
    partition_count: u8,
    access_code: String,
    write_timeout: Duration,
    write_poll_interval: Duration,
    writer: Mutex<()>,
}

impl<D: KeybusDriver> CommandGateway<D> {
    pub fn new(driver: Arc<D>, board: Arc<StatusBoard>, config: &BridgeConfig) -> Self {
        Self {
            driver,
            board,
            partition_count: config.partition_count,
            access_code: config.access_code.clone(),
            write_timeout: Duration::from_millis(config.write_timeout_ms),
            write_poll_interval: Duration::from_millis(config.write_poll_interval_ms),
            writer: Mutex::new(()),
        }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn partition_count(&self) -> u8 {
        self.partition_count
    }

    fn check_range(&self, partition: u8) -> Result<()> {
        if partition == 0 || partition > self.partition_count {
            return Err(DscError::InvalidPartition {
                id: partition,
                max: self.partition_count,
            });
        }
        Ok(())
    }

    /// Current state of an in-range, enabled partition.
    fn active_partition(&self, partition: u8) -> Result<PartitionState> {
        self.check_range(partition)?;
        let snapshot = self.board.peek();
        match snapshot.partition(partition) {
            Some(state) if !state.is_disabled() => Ok(*state),
            _ => Err(DscError::PartitionDisabled { id: partition }),
        }
    }

    /// Issue an alarm command to a partition.
    ///
    /// Disarm only writes when the partition is armed or in exit delay; arm
    /// only writes when it is neither. Panic and fire always write. The state
    /// check is repeated once the driver is write-ready, so a partition that
    /// changed during the wait is left alone.
    pub async fn issue(
        &self,
        partition: u8,
        command: AlarmCommand,
        code: Option<&str>,
    ) -> Result<CommandOutcome> {
        let keys = match self.command_keys(partition, command, code) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Rejected {} for partition {}: {}", command.as_str(), partition, e);
                return Err(e);
            }
        };

        if !wants_write(command, &self.active_partition(partition)?) {
            debug!("Partition {} already in state for {}", partition, command.as_str());
            return Ok(CommandOutcome::NoOp);
        }

        let label = if command == AlarmCommand::Disarm { "<access code>" } else { keys.as_str() };
        let _guard = self.wait_write_ready(partition, label).await?;

        if !wants_write(command, &self.active_partition(partition)?) {
            info!(
                "Partition {} changed while waiting, dropping {}",
                partition,
                command.as_str()
            );
            return Ok(CommandOutcome::NoOp);
        }

        info!("Partition {}: {}", partition, command.as_str());
        debug!("Writing keys to partition {}: {}", partition, label);
        self.driver.write(partition, &keys)?;
        Ok(CommandOutcome::Sent)
    }

    /// Keys for an alarm command, with the disarm code checked like any
    /// other keypad payload.
    fn command_keys(
        &self,
        partition: u8,
        command: AlarmCommand,
        code: Option<&str>,
    ) -> Result<String> {
        self.check_range(partition)?;
        match command {
            AlarmCommand::Disarm => {
                let code = code.unwrap_or(self.access_code.as_str());
                check_keys(code)?;
                if !code.chars().all(|c| c.is_ascii_digit()) {
                    return Err(DscError::InvalidCommand {
                        details: "access code must be digits".to_string(),
                    });
                }
                Ok(code.to_string())
            }
            _ => Ok(command.key().map(String::from).unwrap_or_default()),
        }
    }

    /// Write raw keys to a partition once the driver is ready.
    pub async fn write_keys(&self, partition: u8, keys: &str) -> Result<()> {
        self.check_range(partition)?;
        check_keys(keys)?;
        self.write_guarded(partition, keys, keys).await
    }

    /// Set the panel clock through the keypad on `partition`.
    pub async fn set_time(&self, partition: u8, time: &NaiveDateTime) -> Result<()> {
        self.check_range(partition)?;
        if !self.board.peek().system.connected {
            return Err(DscError::Disconnected);
        }
        let keys = time_set_keys(&self.access_code, time)?;
        info!("Setting panel time to {}", time.format("%Y-%m-%d %H:%M"));
        self.write_guarded(partition, &keys, "*6<access code>1...#").await
    }

    /// Write only if nothing else is writing and the driver is ready now.
    /// Returns whether the keys were written.
    pub(crate) fn write_if_ready(&self, partition: u8, keys: &str) -> Result<bool> {
        let Ok(_guard) = self.writer.try_lock() else {
            return Ok(false);
        };
        if !self.driver.write_ready() {
            return Ok(false);
        }
        self.driver.write(partition, keys)?;
        Ok(true)
    }

    async fn write_guarded(&self, partition: u8, keys: &str, label: &str) -> Result<()> {
        let _guard = self.wait_write_ready(partition, label).await?;
        debug!("Writing keys to partition {}: {}", partition, label);
        self.driver.write(partition, keys)
    }

    /// Take the writer lock and wait (bounded) for the driver to become
    /// ready. `label` is what appears in logs and errors in place of the keys.
    async fn wait_write_ready(&self, partition: u8, label: &str) -> Result<MutexGuard<'_, ()>> {
        let guard = self.writer.lock().await;

        let ready = timeout(self.write_timeout, async {
            while !self.driver.write_ready() {
                sleep(self.write_poll_interval).await;
            }
        })
        .await;
        if ready.is_err() {
            warn!("Timed out waiting to write {} to partition {}", label, partition);
            return Err(DscError::WriteTimeout {
                keys: label.to_string(),
                waited_ms: self.write_timeout.as_millis() as u64,
            });
        }
        Ok(guard)
    }
}

/// Whether `command` would change the partition's state.
fn wants_write(command: AlarmCommand, state: &PartitionState) -> bool {
    match command {
        AlarmCommand::Disarm => state.is_arming_or_armed(),
        AlarmCommand::ArmStay | AlarmCommand::ArmAway => !state.is_arming_or_armed(),
        AlarmCommand::Panic | AlarmCommand::Fire => true,
    }
}

/// Keypad payloads must be non-empty and fit the driver's write buffer.
fn check_keys(keys: &str) -> Result<()> {
    if keys.is_empty() {
        return Err(DscError::EmptyPayload);
    }
    let len = keys.chars().count();
    if len > MAX_WRITE_KEYS {
        return Err(DscError::PayloadTooLong {
            len,
            max: MAX_WRITE_KEYS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackDriver;
    use chrono::NaiveDate;

    fn setup(partition_count: u8) -> (Arc<LoopbackDriver>, CommandGateway<LoopbackDriver>) {
        let board = Arc::new(StatusBoard::new());
        let driver = Arc::new(LoopbackDriver::new(board.clone()));
        driver.begin().unwrap();
        board.publish(|w| {
            for p in 1..=partition_count {
                w.update_partition(p, |s| s.status_code = 0x01);
            }
        });
        let config = BridgeConfig::builder()
            .partition_count(partition_count)
            .access_code("4321")
            .write_timeout_ms(500)
            .build();
        let gateway = CommandGateway::new(driver.clone(), board, &config);
        (driver, gateway)
    }

    fn set_armed(driver: &LoopbackDriver, partition: u8, armed: bool, exit_delay: bool) {
        driver.board().publish(|w| {
            w.update_partition(partition, |s| {
                s.armed = armed;
                s.armed_away = armed;
                s.exit_delay = exit_delay;
            });
        });
    }

    #[tokio::test]
    async fn test_disarm_when_disarmed_is_noop() {
        let (driver, gateway) = setup(8);
        let outcome = gateway.issue(1, AlarmCommand::Disarm, None).await.unwrap();
        assert_eq!(outcome, CommandOutcome::NoOp);
        assert!(driver.writes().is_empty());
    }

    #[tokio::test]
    async fn test_disarm_writes_default_or_given_code() {
        let (driver, gateway) = setup(2);
        set_armed(&driver, 2, true, false);
        let outcome = gateway.issue(2, AlarmCommand::Disarm, None).await.unwrap();
        assert_eq!(outcome, CommandOutcome::Sent);
        assert_eq!(driver.last_write(), Some((2, "4321".to_string())));

        set_armed(&driver, 1, false, true);
        gateway.issue(1, AlarmCommand::Disarm, Some("9999")).await.unwrap();
        assert_eq!(driver.last_write(), Some((1, "9999".to_string())));
    }

    #[tokio::test]
    async fn test_arm_guards() {
        let (driver, gateway) = setup(2);
        assert_eq!(
            gateway.issue(1, AlarmCommand::ArmStay, None).await.unwrap(),
            CommandOutcome::Sent
        );
        assert_eq!(driver.last_write(), Some((1, "s".to_string())));

        set_armed(&driver, 1, false, true);
        assert_eq!(
            gateway.issue(1, AlarmCommand::ArmAway, None).await.unwrap(),
            CommandOutcome::NoOp
        );
        assert_eq!(driver.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_panic_and_fire_always_forwarded() {
        let (driver, gateway) = setup(1);
        set_armed(&driver, 1, true, false);
        gateway.issue(1, AlarmCommand::Panic, None).await.unwrap();
        gateway.issue(1, AlarmCommand::Fire, None).await.unwrap();
        assert_eq!(
            driver.writes(),
            vec![(1, "p".to_string()), (1, "f".to_string())]
        );
    }

    #[tokio::test]
    async fn test_out_of_range_partition_rejected() {
        let (driver, gateway) = setup(8);
        let err = gateway.issue(9, AlarmCommand::ArmAway, None).await.unwrap_err();
        assert!(matches!(err, DscError::InvalidPartition { id: 9, max: 8 }));
        let err = gateway.issue(0, AlarmCommand::Panic, None).await.unwrap_err();
        assert!(matches!(err, DscError::InvalidPartition { id: 0, .. }));
        assert!(driver.writes().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_partition_rejected() {
        let (driver, gateway) = setup(2);
        driver.board().publish(|w| {
            w.update_partition(2, |s| s.status_code = 0xC7);
        });
        let err = gateway.issue(2, AlarmCommand::Fire, None).await.unwrap_err();
        assert!(matches!(err, DscError::PartitionDisabled { id: 2 }));
        assert!(driver.writes().is_empty());
    }

    #[tokio::test]
    async fn test_write_keys_validation() {
        let (driver, gateway) = setup(1);
        assert!(matches!(
            gateway.write_keys(1, "").await,
            Err(DscError::EmptyPayload)
        ));
        let long = "1".repeat(50);
        assert!(matches!(
            gateway.write_keys(1, &long).await,
            Err(DscError::PayloadTooLong { len: 50, max: 49 })
        ));
        gateway.write_keys(1, &"1".repeat(49)).await.unwrap();
        assert_eq!(driver.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_times_out_when_never_ready() {
        let (driver, gateway) = setup(1);
        driver.set_write_ready(false);
        let err = gateway.write_keys(1, "*1").await.unwrap_err();
        assert!(matches!(
            err,
            DscError::WriteTimeout { ref keys, waited_ms: 500 } if keys == "*1"
        ));
        assert!(err.is_retryable());
        assert!(driver.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_waits_for_ready() {
        let (driver, gateway) = setup(1);
        driver.set_write_ready(false);
        let flip = driver.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            flip.set_write_ready(true);
        });
        gateway.write_keys(1, "*1").await.unwrap();
        assert_eq!(driver.last_write(), Some((1, "*1".to_string())));
    }

    #[tokio::test]
    async fn test_set_time_requires_connection() {
        let (driver, gateway) = setup(1);
        let time = NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(9, 30, 0))
            .unwrap();

        gateway.set_time(1, &time).await.unwrap();
        assert_eq!(driver.last_write(), Some((1, "*6432110930031524#".to_string())));

        driver.stop();
        assert!(matches!(
            gateway.set_time(1, &time).await,
            Err(DscError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_write_if_ready() {
        let (driver, gateway) = setup(1);
        driver.set_write_ready(false);
        assert!(!gateway.write_if_ready(1, "4321").unwrap());
        driver.set_write_ready(true);
        assert!(gateway.write_if_ready(1, "4321").unwrap());
        assert_eq!(driver.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_dropped_when_disarmed_during_wait() {
        let (driver, gateway) = setup(1);
        set_armed(&driver, 1, true, false);
        driver.set_write_ready(false);

        let gateway = Arc::new(gateway);
        let pending = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.issue(1, AlarmCommand::Disarm, None).await })
        };
        sleep(Duration::from_millis(100)).await;
        set_armed(&driver, 1, false, false);
        driver.set_write_ready(true);

        assert_eq!(pending.await.unwrap().unwrap(), CommandOutcome::NoOp);
        assert!(driver.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_dropped_when_armed_during_wait() {
        let (driver, gateway) = setup(1);
        driver.set_write_ready(false);

        let gateway = Arc::new(gateway);
        let pending = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.issue(1, AlarmCommand::ArmAway, None).await })
        };
        sleep(Duration::from_millis(100)).await;
        set_armed(&driver, 1, false, true);
        driver.set_write_ready(true);

        assert_eq!(pending.await.unwrap().unwrap(), CommandOutcome::NoOp);
        assert!(driver.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_sent_when_still_armed_after_wait() {
        let (driver, gateway) = setup(1);
        set_armed(&driver, 1, true, false);
        driver.set_write_ready(false);

        let gateway = Arc::new(gateway);
        let pending = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.issue(1, AlarmCommand::Disarm, None).await })
        };
        sleep(Duration::from_millis(100)).await;
        driver.set_write_ready(true);

        assert_eq!(pending.await.unwrap().unwrap(), CommandOutcome::Sent);
        assert_eq!(driver.writes(), vec![(1, "4321".to_string())]);
    }

    #[tokio::test]
    async fn test_disarm_code_validation() {
        let (driver, gateway) = setup(1);
        set_armed(&driver, 1, true, false);

        assert!(matches!(
            gateway.issue(1, AlarmCommand::Disarm, Some("")).await,
            Err(DscError::EmptyPayload)
        ));
        let long = "1".repeat(60);
        assert!(matches!(
            gateway.issue(1, AlarmCommand::Disarm, Some(&long)).await,
            Err(DscError::PayloadTooLong { len: 60, max: 49 })
        ));
        assert!(matches!(
            gateway.issue(1, AlarmCommand::Disarm, Some("12*4")).await,
            Err(DscError::InvalidCommand { .. })
        ));
        assert!(driver.writes().is_empty());
        assert!(driver.board().peek().partitions[0].armed);
    }
}

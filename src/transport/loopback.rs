// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// In-process driver that records writes and can emulate a panel

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::constants::{KEY_ARM_AWAY, KEY_ARM_STAY, KEY_FIRE_ALARM, KEY_PANIC_ALARM};
use crate::devices::partition::{Lights, PartitionChanges};
use crate::devices::system::{KeypadAlarm, PanelTime};
use crate::error::{DscError, Result};
use crate::snapshot::StatusBoard;
use crate::transport::KeybusDriver;

/// User slot reported when the emulated panel is disarmed with the master code.
const MASTER_CODE_SLOT: u8 = 40;

#[derive(Debug, Clone)]
struct Emulation {
    partition_count: u8,
    access_code: String,
}

/// A driver with no hardware behind it.
///
/// Every write is recorded. With emulation enabled the driver also reacts to
/// arm, disarm, panic, fire and time-set sequences by publishing the state a
/// real panel would report.
#[derive(Debug)]
pub struct LoopbackDriver {
    board: Arc<StatusBoard>,
    running: AtomicBool,
    write_ready: AtomicBool,
    writes: Mutex<Vec<(u8, String)>>,
    emulation: Option<Emulation>,
}

impl LoopbackDriver {
    pub fn new(board: Arc<StatusBoard>) -> Self {
        Self {
            board,
            running: AtomicBool::new(false),
            write_ready: AtomicBool::new(true),
            writes: Mutex::new(Vec::new()),
            emulation: None,
        }
    }

    /// Emulate a panel with `partition_count` ready partitions that disarm
    /// on `access_code`.
    pub fn emulating(mut self, partition_count: u8, access_code: impl Into<String>) -> Self {
        self.emulation = Some(Emulation {
            partition_count,
            access_code: access_code.into(),
        });
        self
    }

    pub fn board(&self) -> &Arc<StatusBoard> {
        &self.board
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_write_ready(&self, ready: bool) {
        self.write_ready.store(ready, Ordering::SeqCst);
    }

    /// All writes so far as `(partition, keys)`.
    pub fn writes(&self) -> Vec<(u8, String)> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn last_write(&self) -> Option<(u8, String)> {
        self.writes.lock().ok().and_then(|w| w.last().cloned())
    }

    pub fn clear_writes(&self) {
        if let Ok(mut w) = self.writes.lock() {
            w.clear();
        }
    }

    fn emulate_begin(&self, emu: &Emulation) {
        self.board.publish(|w| {
            for partition in 1..=emu.partition_count {
                w.update_partition(partition, |p| {
                    if p.is_disabled() {
                        p.status_code = 0x01;
                        p.lights = (Lights::READY | Lights::BACKLIGHT).bits();
                    }
                });
            }
        });
    }

    fn emulate_write(&self, emu: &Emulation, partition: u8, keys: &str) {
        if let Some(time) = parse_time_set(keys, &emu.access_code) {
            debug!("Emulated panel clock set to {:?}", time);
            self.board.publish(|w| {
                w.set_timestamp(time);
            });
            return;
        }

        let armed_or_arming = self
            .board
            .peek()
            .partition(partition)
            .is_some_and(|p| p.is_arming_or_armed());

        let mut chars = keys.chars();
        let single = match (chars.next(), chars.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        };

        self.board.publish(|w| match single {
            Some(KEY_ARM_STAY) | Some(KEY_ARM_AWAY) => {
                let away = single == Some(KEY_ARM_AWAY);
                w.update_partition(partition, |p| {
                    p.armed = true;
                    p.armed_stay = !away;
                    p.armed_away = away;
                    p.exit_delay = false;
                    p.status_code = if away { 0x05 } else { 0x04 };
                    p.lights = (Lights::ARMED | Lights::BACKLIGHT).bits();
                });
            }
            Some(KEY_PANIC_ALARM) => {
                w.keypad_alarm(KeypadAlarm::Panic);
            }
            Some(KEY_FIRE_ALARM) => {
                w.keypad_alarm(KeypadAlarm::Fire);
            }
            _ if keys == emu.access_code && armed_or_arming => {
                w.update_partition(partition, |p| {
                    p.armed = false;
                    p.armed_stay = false;
                    p.armed_away = false;
                    p.exit_delay = false;
                    p.alarm = false;
                    p.status_code = 0x01;
                    p.lights = (Lights::READY | Lights::BACKLIGHT).bits();
                    p.access_code = MASTER_CODE_SLOT;
                });
                // Disarm is reported through the exit-delay channel, as on the bus.
                w.mark_partition(partition, PartitionChanges::EXIT_DELAY);
            }
            _ => debug!("Emulated panel ignoring keys on partition {}", partition),
        });
    }
}

impl KeybusDriver for LoopbackDriver {
    fn begin(&self) -> Result<()> {
        info!("Loopback driver started");
        self.running.store(true, Ordering::SeqCst);
        self.board.publish(|w| {
            w.set_connected(true);
        });
        if let Some(emu) = &self.emulation {
            self.emulate_begin(emu);
        }
        Ok(())
    }

    fn stop(&self) {
        info!("Loopback driver stopped");
        self.running.store(false, Ordering::SeqCst);
        self.board.publish(|w| {
            w.set_connected(false);
        });
    }

    fn write_ready(&self) -> bool {
        self.is_running() && self.write_ready.load(Ordering::SeqCst)
    }

    fn write(&self, partition: u8, keys: &str) -> Result<()> {
        if !self.is_running() {
            return Err(DscError::Disconnected);
        }
        self.writes
            .lock()
            .map_err(|_| DscError::Driver { reason: "write log poisoned".to_string() })?
            .push((partition, keys.to_string()));
        if let Some(emu) = &self.emulation {
            self.emulate_write(emu, partition, keys);
        }
        Ok(())
    }
}

/// Decode `*6{code}1{HH}{mm}{MM}{DD}{YY}#`.
fn parse_time_set(keys: &str, access_code: &str) -> Option<PanelTime> {
    let digits = keys
        .strip_prefix("*6")?
        .strip_prefix(access_code)?
        .strip_prefix('1')?
        .strip_suffix('#')?;
    if digits.len() != 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let field = |i: usize| digits[i..i + 2].parse::<u8>().ok();
    Some(PanelTime::new(
        2000 + field(8)? as u16,
        field(4)?,
        field(6)?,
        field(0)?,
        field(2)?,
    ))
}

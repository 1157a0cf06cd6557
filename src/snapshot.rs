// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Double-buffered status board shared between driver and dispatcher

use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::constants::{MAX_PARTITIONS, MAX_ZONE_GROUPS};
use crate::devices::partition::{PartitionChanges, PartitionState};
use crate::devices::system::{KeypadAlarm, PanelTime, SystemChanges, SystemState};
use crate::devices::zone::zone_position;

/// Immutable view of the panel taken at one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub system: SystemState,
    pub partitions: [PartitionState; MAX_PARTITIONS],
    /// Open zone bitmap, bit 0 of group 0 is zone 1
    pub open_zones: [u8; MAX_ZONE_GROUPS],
    pub alarm_zones: [u8; MAX_ZONE_GROUPS],
}

impl StatusSnapshot {
    /// Partition state by 1-based number.
    pub fn partition(&self, partition: u8) -> Option<&PartitionState> {
        (partition as usize)
            .checked_sub(1)
            .and_then(|i| self.partitions.get(i))
    }

    pub fn zone_open(&self, zone: u8) -> bool {
        zone_position(zone).is_some_and(|(g, b)| self.open_zones[g] & (1 << b) != 0)
    }

    pub fn zone_alarm(&self, zone: u8) -> bool {
        zone_position(zone).is_some_and(|(g, b)| self.alarm_zones[g] & (1 << b) != 0)
    }
}

/// Changes accumulated since the last [`StatusBoard::take`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusDelta {
    /// Something changed; nothing else is looked at when this is false
    pub status_changed: bool,
    /// A full re-announce was requested
    pub reset: bool,
    pub system: SystemChanges,
    pub partitions: [PartitionChanges; MAX_PARTITIONS],
    pub open_zones: [u8; MAX_ZONE_GROUPS],
    pub alarm_zones: [u8; MAX_ZONE_GROUPS],
}

impl StatusDelta {
    pub fn is_empty(&self) -> bool {
        !self.status_changed
    }
}

#[derive(Debug, Default)]
struct BoardInner {
    snapshot: StatusSnapshot,
    pending: StatusDelta,
}

/// Shared status board.
///
/// The driver applies updates with [`publish`](Self::publish); the dispatcher
/// drains them with [`take`](Self::take). The lock is only held for one of
/// those calls, never across an await.
#[derive(Debug, Default)]
pub struct StatusBoard {
    inner: Mutex<BoardInner>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        // A panic inside a writer closure leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply one frame of driver updates.
    pub fn publish<R>(&self, f: impl FnOnce(&mut StatusWriter<'_>) -> R) -> R {
        let mut inner = self.lock();
        let BoardInner { snapshot, pending } = &mut *inner;
        let mut writer = StatusWriter { snapshot, delta: pending };
        f(&mut writer)
    }

    /// Return the current state plus every change since the last call, and
    /// clear the pending changes.
    pub fn take(&self) -> (StatusSnapshot, StatusDelta) {
        let mut inner = self.lock();
        let delta = std::mem::take(&mut inner.pending);
        (inner.snapshot, delta)
    }

    /// Current state without consuming changes.
    pub fn peek(&self) -> StatusSnapshot {
        self.lock().snapshot
    }

    /// Mark every level field as changed so the next poll re-emits the full
    /// current state.
    pub fn reset(&self) {
        debug!("Resetting status board");
        let mut inner = self.lock();
        let pending = &mut inner.pending;
        pending.status_changed = true;
        pending.reset = true;
        pending.system |= SystemChanges::levels();
        for changes in pending.partitions.iter_mut() {
            *changes |= PartitionChanges::all() - PartitionChanges::ACCESS_CODE;
        }
        pending.open_zones = [0xFF; MAX_ZONE_GROUPS];
        pending.alarm_zones = [0xFF; MAX_ZONE_GROUPS];
    }
}

/// Write access for one frame. Setters record the change only when the
/// value actually differs; pulses always record.
pub struct StatusWriter<'a> {
    snapshot: &'a mut StatusSnapshot,
    delta: &'a mut StatusDelta,
}

impl StatusWriter<'_> {
    pub fn snapshot(&self) -> &StatusSnapshot {
        self.snapshot
    }

    fn system_level(&mut self, flag: SystemChanges, changed: bool) {
        if changed {
            self.delta.system |= flag;
            self.delta.status_changed = true;
        }
    }

    pub fn set_connected(&mut self, connected: bool) -> &mut Self {
        let changed = self.snapshot.system.connected != connected;
        self.snapshot.system.connected = connected;
        self.system_level(SystemChanges::CONNECTION, changed);
        self
    }

    pub fn set_trouble(&mut self, on: bool) -> &mut Self {
        let changed = self.snapshot.system.trouble != on;
        self.snapshot.system.trouble = on;
        self.system_level(SystemChanges::TROUBLE, changed);
        self
    }

    pub fn set_power_trouble(&mut self, on: bool) -> &mut Self {
        let changed = self.snapshot.system.power_trouble != on;
        self.snapshot.system.power_trouble = on;
        self.system_level(SystemChanges::POWER_TROUBLE, changed);
        self
    }

    pub fn set_battery_trouble(&mut self, on: bool) -> &mut Self {
        let changed = self.snapshot.system.battery_trouble != on;
        self.snapshot.system.battery_trouble = on;
        self.system_level(SystemChanges::BATTERY_TROUBLE, changed);
        self
    }

    pub fn set_timestamp(&mut self, time: PanelTime) -> &mut Self {
        let changed = self.snapshot.system.timestamp != time;
        self.snapshot.system.timestamp = time;
        self.system_level(SystemChanges::TIMESTAMP, changed);
        self
    }

    pub fn buffer_overflow(&mut self) -> &mut Self {
        self.system_level(SystemChanges::BUFFER_OVERFLOW, true);
        self
    }

    pub fn access_code_prompt(&mut self) -> &mut Self {
        self.system_level(SystemChanges::ACCESS_CODE_PROMPT, true);
        self
    }

    pub fn keypad_alarm(&mut self, alarm: KeypadAlarm) -> &mut Self {
        let flag = match alarm {
            KeypadAlarm::Fire => SystemChanges::KEYPAD_FIRE,
            KeypadAlarm::Aux => SystemChanges::KEYPAD_AUX,
            KeypadAlarm::Panic => SystemChanges::KEYPAD_PANIC,
        };
        self.system_level(flag, true);
        self
    }

    /// Latch change bits without touching values.
    pub fn mark_system(&mut self, changes: SystemChanges) -> &mut Self {
        self.system_level(changes, !changes.is_empty());
        self
    }

    /// Update one partition (1-based) and record which fields changed.
    /// Out-of-range partitions are ignored.
    pub fn update_partition(
        &mut self,
        partition: u8,
        f: impl FnOnce(&mut PartitionState),
    ) -> &mut Self {
        let Some(index) = (partition as usize).checked_sub(1).filter(|i| *i < MAX_PARTITIONS)
        else {
            debug!("Ignoring update for partition {}", partition);
            return self;
        };
        let old = self.snapshot.partitions[index];
        f(&mut self.snapshot.partitions[index]);
        let new = self.snapshot.partitions[index];

        let mut changes = PartitionChanges::empty();
        changes.set(PartitionChanges::ALARM, old.alarm != new.alarm);
        changes.set(
            PartitionChanges::ARMED,
            old.armed != new.armed
                || old.armed_stay != new.armed_stay
                || old.armed_away != new.armed_away,
        );
        changes.set(PartitionChanges::EXIT_DELAY, old.exit_delay != new.exit_delay);
        changes.set(PartitionChanges::ENTRY_DELAY, old.entry_delay != new.entry_delay);
        changes.set(PartitionChanges::FIRE, old.fire != new.fire);
        changes.set(PartitionChanges::ACCESS_CODE, old.access_code != new.access_code);

        self.delta.partitions[index] |= changes;
        if old != new {
            self.delta.status_changed = true;
        }
        self
    }

    /// Latch partition change bits without touching values.
    pub fn mark_partition(&mut self, partition: u8, changes: PartitionChanges) -> &mut Self {
        if let Some(slot) = (partition as usize)
            .checked_sub(1)
            .and_then(|i| self.delta.partitions.get_mut(i))
            && !changes.is_empty()
        {
            *slot |= changes;
            self.delta.status_changed = true;
        }
        self
    }

    pub fn set_zone_open(&mut self, zone: u8, open: bool) -> &mut Self {
        if let Some((group, bit)) = zone_position(zone).filter(|(g, _)| *g < MAX_ZONE_GROUPS) {
            let value = set_bit(self.snapshot.open_zones[group], bit, open);
            self.set_open_zone_group(group, value);
        }
        self
    }

    pub fn set_zone_alarm(&mut self, zone: u8, alarm: bool) -> &mut Self {
        if let Some((group, bit)) = zone_position(zone).filter(|(g, _)| *g < MAX_ZONE_GROUPS) {
            let value = set_bit(self.snapshot.alarm_zones[group], bit, alarm);
            self.set_alarm_zone_group(group, value);
        }
        self
    }

    /// Replace a whole open-zone group (0-based) as decoded from the bus.
    pub fn set_open_zone_group(&mut self, group: usize, value: u8) -> &mut Self {
        if let Some(current) = self.snapshot.open_zones.get_mut(group) {
            let diff = *current ^ value;
            *current = value;
            if diff != 0 {
                self.delta.open_zones[group] |= diff;
                self.delta.status_changed = true;
            }
        }
        self
    }

    /// Replace a whole alarm-zone group (0-based) as decoded from the bus.
    pub fn set_alarm_zone_group(&mut self, group: usize, value: u8) -> &mut Self {
        if let Some(current) = self.snapshot.alarm_zones.get_mut(group) {
            let diff = *current ^ value;
            *current = value;
            if diff != 0 {
                self.delta.alarm_zones[group] |= diff;
                self.delta.status_changed = true;
            }
        }
        self
    }
}

fn set_bit(byte: u8, bit: usize, on: bool) -> u8 {
    if on { byte | (1 << bit) } else { byte & !(1 << bit) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_clears_pending() {
        let board = StatusBoard::new();
        board.publish(|w| {
            w.set_connected(true);
        });

        let (snap, delta) = board.take();
        assert!(snap.system.connected);
        assert!(delta.status_changed);
        assert!(delta.system.contains(SystemChanges::CONNECTION));

        let (_, delta) = board.take();
        assert!(delta.is_empty());
        assert!(delta.system.is_empty());
    }

    #[test]
    fn test_unchanged_value_not_latched() {
        let board = StatusBoard::new();
        board.publish(|w| {
            w.set_trouble(false);
            w.update_partition(1, |_| {});
        });
        assert!(board.take().1.is_empty());
    }

    #[test]
    fn test_frames_collapse_to_latest_value() {
        let board = StatusBoard::new();
        board.publish(|w| {
            w.update_partition(2, |p| p.alarm = true);
        });
        board.publish(|w| {
            w.update_partition(2, |p| p.alarm = false);
        });
        board.publish(|w| {
            w.update_partition(2, |p| p.alarm = true);
        });

        let (snap, delta) = board.take();
        assert!(snap.partitions[1].alarm);
        assert_eq!(delta.partitions[1], PartitionChanges::ALARM);
    }

    #[test]
    fn test_partition_field_changes() {
        let board = StatusBoard::new();
        board.publish(|w| {
            w.update_partition(1, |p| {
                p.armed = true;
                p.armed_away = true;
                p.exit_delay = true;
                p.lights = 0x02;
            });
        });
        let (_, delta) = board.take();
        assert_eq!(
            delta.partitions[0],
            PartitionChanges::ARMED | PartitionChanges::EXIT_DELAY
        );
    }

    #[test]
    fn test_lights_only_sets_status_changed() {
        let board = StatusBoard::new();
        board.publish(|w| {
            w.update_partition(1, |p| p.lights = 0x81);
        });
        let (_, delta) = board.take();
        assert!(delta.status_changed);
        assert!(delta.partitions[0].is_empty());
    }

    #[test]
    fn test_out_of_range_partition_ignored() {
        let board = StatusBoard::new();
        board.publish(|w| {
            w.update_partition(0, |p| p.alarm = true);
            w.update_partition(9, |p| p.alarm = true);
            w.mark_partition(9, PartitionChanges::ALARM);
        });
        assert!(board.take().1.is_empty());
    }

    #[test]
    fn test_zone_bits() {
        let board = StatusBoard::new();
        board.publish(|w| {
            w.set_zone_open(10, true);
            w.set_zone_alarm(64, true);
            w.set_zone_open(65, true);
        });
        let (snap, delta) = board.take();
        assert!(snap.zone_open(10));
        assert!(!snap.zone_open(9));
        assert!(snap.zone_alarm(64));
        assert_eq!(delta.open_zones[1], 0b0000_0010);
        assert_eq!(delta.alarm_zones[7], 0b1000_0000);
    }

    #[test]
    fn test_pulses_always_latch() {
        let board = StatusBoard::new();
        board.publish(|w| {
            w.keypad_alarm(KeypadAlarm::Panic).buffer_overflow();
        });
        let (_, delta) = board.take();
        assert!(delta.system.contains(SystemChanges::KEYPAD_PANIC | SystemChanges::BUFFER_OVERFLOW));
    }

    #[test]
    fn test_reset_marks_levels() {
        let board = StatusBoard::new();
        board.reset();
        let (_, delta) = board.take();
        assert!(delta.status_changed);
        assert!(delta.reset);
        assert_eq!(delta.system, SystemChanges::levels());
        assert!(delta.partitions.iter().all(|c| c.contains(PartitionChanges::ARMED)));
        assert!(!delta.partitions[0].contains(PartitionChanges::ACCESS_CODE));
        assert_eq!(delta.open_zones, [0xFF; MAX_ZONE_GROUPS]);
    }
}

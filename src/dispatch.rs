// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Turns status board changes into panel events

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::constants::{LIGHTS_SENTINEL, STATUS_SENTINEL};
use crate::devices::partition::{Lights, PartitionChanges, PartitionState, PartitionStatus};
use crate::devices::system::{KeypadAlarm, KeypadStatus, SystemChanges};
use crate::devices::zone::{any_changed, diff_zone_bitmap};
use crate::event::{EventSender, PanelEvent};
use crate::gateway::CommandGateway;
use crate::snapshot::{StatusBoard, StatusDelta, StatusSnapshot};
use crate::transport::KeybusDriver;

/// Partition the access-code auto-response is typed on.
const PROMPT_PARTITION: u8 = 1;

/// Dispatch cache for one active partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionHandle {
    pub partition: u8,
    /// Last status code reported in a status-message event
    pub previous_status: u8,
    /// Last lights mask reported in a lights event
    pub previous_lights: u8,
}

impl PartitionHandle {
    fn new(partition: u8) -> Self {
        Self {
            partition,
            previous_status: STATUS_SENTINEL,
            previous_lights: LIGHTS_SENTINEL,
        }
    }
}

/// The polling loop body: drains the status board once per tick and emits
/// one event per change.
pub struct ChangeDispatcher<D: KeybusDriver> {
    board: Arc<StatusBoard>,
    gateway: Arc<CommandGateway<D>>,
    events: EventSender,
    access_code: String,
    zone_group_count: usize,
    partitions: Box<[Option<PartitionHandle>]>,
}

impl<D: KeybusDriver> ChangeDispatcher<D> {
    pub fn new(
        board: Arc<StatusBoard>,
        gateway: Arc<CommandGateway<D>>,
        events: EventSender,
        config: &BridgeConfig,
    ) -> Self {
        let mut dispatcher = Self {
            board,
            gateway,
            events,
            access_code: config.access_code.clone(),
            zone_group_count: config.zone_group_count as usize,
            partitions: vec![None; config.partition_count as usize].into_boxed_slice(),
        };
        let snapshot = dispatcher.board.peek();
        dispatcher.detect_partitions(&snapshot);
        dispatcher
    }

    /// Handles for the configured partitions; `None` for those disabled at
    /// the last reset.
    pub fn partitions(&self) -> &[Option<PartitionHandle>] {
        &self.partitions
    }

    /// Give a fresh handle to every partition whose status code is not a
    /// disabled code. Runs at construction and on each board reset.
    fn detect_partitions(&mut self, snapshot: &StatusSnapshot) {
        for (index, slot) in self.partitions.iter_mut().enumerate() {
            let partition = index as u8 + 1;
            *slot = if snapshot.partitions[index].is_disabled() {
                None
            } else {
                info!("Partition {} detected", partition);
                Some(PartitionHandle::new(partition))
            };
        }
    }

    /// Run one dispatch cycle. Returns the events emitted, in order.
    pub async fn poll(&mut self) -> Vec<PanelEvent> {
        let (snapshot, mut delta) = self.board.take();
        if delta.is_empty() {
            return Vec::new();
        }

        if delta.reset {
            self.detect_partitions(&snapshot);
        }

        let mut out = Vec::new();
        self.dispatch_system(&snapshot, &delta, &mut out);
        for index in 0..self.partitions.len() {
            self.dispatch_partition(index, &snapshot, delta.partitions[index], &mut out);
        }
        self.dispatch_zones(&snapshot, &mut delta, &mut out);
        dispatch_timestamp(&snapshot, &delta, &mut out);

        for event in &out {
            debug!("Event: {:?}", event);
            let _ = self.events.send(event.clone());
        }
        out
    }

    fn dispatch_system(&self, snapshot: &StatusSnapshot, delta: &StatusDelta, out: &mut Vec<PanelEvent>) {
        let changes = delta.system;
        let system = &snapshot.system;

        if changes.contains(SystemChanges::CONNECTION) {
            info!("Keybus {}", if system.connected { "connected" } else { "disconnected" });
            out.push(PanelEvent::ConnectionChanged { connected: system.connected });
        }

        if changes.contains(SystemChanges::BUFFER_OVERFLOW) {
            warn!("Keybus buffer overflow");
            out.push(PanelEvent::BufferOverflow);
        }

        if changes.contains(SystemChanges::ACCESS_CODE_PROMPT) {
            self.answer_access_code_prompt();
        }

        for (flag, status) in [
            (SystemChanges::TROUBLE, KeypadStatus::Trouble),
            (SystemChanges::POWER_TROUBLE, KeypadStatus::PowerTrouble),
            (SystemChanges::BATTERY_TROUBLE, KeypadStatus::BatteryTrouble),
        ] {
            if changes.contains(flag) {
                out.push(PanelEvent::KeypadStatusChanged {
                    status,
                    active: system.keypad_status(status),
                });
            }
        }

        for (flag, alarm) in [
            (SystemChanges::KEYPAD_FIRE, KeypadAlarm::Fire),
            (SystemChanges::KEYPAD_AUX, KeypadAlarm::Aux),
            (SystemChanges::KEYPAD_PANIC, KeypadAlarm::Panic),
        ] {
            if changes.contains(flag) {
                out.push(PanelEvent::KeypadAlarm { alarm });
            }
        }
    }

    /// Type the access code in response to a panel prompt. If the driver
    /// cannot take a write right now the prompt is latched again.
    fn answer_access_code_prompt(&self) {
        match self.gateway.write_if_ready(PROMPT_PARTITION, &self.access_code) {
            Ok(true) => debug!("Answered access code prompt"),
            Ok(false) => {
                debug!("Access code prompt pending until the driver is write-ready");
                self.board.publish(|w| {
                    w.access_code_prompt();
                });
            }
            Err(e) => error!("Failed to answer access code prompt: {}", e),
        }
    }

    fn dispatch_partition(
        &mut self,
        index: usize,
        snapshot: &StatusSnapshot,
        changes: PartitionChanges,
        out: &mut Vec<PanelEvent>,
    ) {
        let Some(handle) = self.partitions[index].as_mut() else {
            return;
        };
        let part: &PartitionState = &snapshot.partitions[index];
        if part.is_disabled() {
            return;
        }
        let partition = handle.partition;
        let status = |status| PanelEvent::PartitionStatusChanged { partition, status };

        if handle.previous_status != part.status_code {
            handle.previous_status = part.status_code;
            out.push(PanelEvent::PartitionStatusMessage {
                partition,
                code: part.status_code,
                text: part.status_text(),
            });
        }

        let mut alarm_tripped = false;
        if changes.contains(PartitionChanges::ALARM) {
            out.push(PanelEvent::PartitionAlarmChanged { partition, active: part.alarm });
            if part.alarm {
                alarm_tripped = true;
                out.push(status(PartitionStatus::Triggered));
            }
        }

        let mut exit_delay_changed = changes.contains(PartitionChanges::EXIT_DELAY);
        if changes.contains(PartitionChanges::ARMED) {
            out.push(PanelEvent::PartitionArmedChanged {
                partition,
                armed: part.armed,
                stay: part.armed_stay,
                away: part.armed_away,
            });
            if part.armed {
                out.push(status(part.status()));
                exit_delay_changed = false;
            }
        }

        let mut disarmed_pending = false;
        if exit_delay_changed {
            if part.exit_delay {
                out.push(status(PartitionStatus::ExitDelay));
            } else if !part.armed {
                disarmed_pending = true;
            }
        }

        if disarmed_pending && !part.armed && !part.exit_delay && !alarm_tripped {
            out.push(status(PartitionStatus::Disarmed));
        }

        if changes.contains(PartitionChanges::FIRE) {
            out.push(PanelEvent::PartitionFireChanged { partition, active: part.fire });
        }

        if handle.previous_lights != part.lights {
            handle.previous_lights = part.lights;
            out.push(PanelEvent::PartitionLightsChanged {
                partition,
                lights: Lights::from_bits_retain(part.lights),
            });
        }

        if changes.contains(PartitionChanges::ENTRY_DELAY) {
            out.push(PanelEvent::PartitionEntryDelayChanged {
                partition,
                active: part.entry_delay,
            });
        }

        if changes.contains(PartitionChanges::ACCESS_CODE) {
            out.push(PanelEvent::PartitionAccessCodeChanged {
                partition,
                code: part.access_code,
            });
        }
    }

    fn dispatch_zones(&self, snapshot: &StatusSnapshot, delta: &mut StatusDelta, out: &mut Vec<PanelEvent>) {
        let groups = self.zone_group_count;

        if any_changed(&delta.open_zones[..groups]) {
            for t in diff_zone_bitmap(&mut delta.open_zones[..groups], &snapshot.open_zones[..groups]) {
                out.push(PanelEvent::ZoneOpenChanged { zone: t.zone, open: t.active });
            }
        }

        if any_changed(&delta.alarm_zones[..groups]) {
            for t in diff_zone_bitmap(&mut delta.alarm_zones[..groups], &snapshot.alarm_zones[..groups]) {
                out.push(PanelEvent::ZoneAlarmChanged { zone: t.zone, alarm: t.active });
            }
        }
    }
}

fn dispatch_timestamp(snapshot: &StatusSnapshot, delta: &StatusDelta, out: &mut Vec<PanelEvent>) {
    if !delta.system.contains(SystemChanges::TIMESTAMP) {
        return;
    }
    let time = snapshot.system.timestamp;
    match time.formatted() {
        Some(time) => out.push(PanelEvent::PanelTimeChanged { time }),
        None => debug!("Dropping out-of-range panel time {:?}", time),
    }
}

// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Events emitted by the change dispatcher

use crate::devices::partition::{Lights, PartitionStatus};
use crate::devices::system::{KeypadAlarm, KeypadStatus};

/// All events that can be emitted by the panel.
///
/// Users subscribe via `panel.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<PanelEvent>`. Partition and zone numbers
/// are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    /// Keybus connection came up or went down
    ConnectionChanged { connected: bool },
    /// Driver dropped bus data; informational only
    BufferOverflow,
    /// Trouble, power trouble or battery trouble turned on or off
    KeypadStatusChanged { status: KeypadStatus, active: bool },
    /// Momentary keypad alarm. There is no matching "cleared" event.
    KeypadAlarm { alarm: KeypadAlarm },
    /// Raw status code changed
    PartitionStatusMessage {
        partition: u8,
        code: u8,
        text: &'static str,
    },
    PartitionStatusChanged {
        partition: u8,
        status: PartitionStatus,
    },
    PartitionArmedChanged {
        partition: u8,
        armed: bool,
        stay: bool,
        away: bool,
    },
    PartitionAlarmChanged { partition: u8, active: bool },
    PartitionFireChanged { partition: u8, active: bool },
    PartitionLightsChanged { partition: u8, lights: Lights },
    PartitionEntryDelayChanged { partition: u8, active: bool },
    /// User slot of the access code last used on the partition
    PartitionAccessCodeChanged { partition: u8, code: u8 },
    ZoneOpenChanged { zone: u8, open: bool },
    ZoneAlarmChanged { zone: u8, alarm: bool },
    /// Panel clock, `YYYY-MM-DD HH:mm`
    PanelTimeChanged { time: String },
    /// Driver stopped for maintenance
    DriverStopped { auto_restart_secs: Option<u64> },
    DriverStarted,
    /// Driver came back on its own after a maintenance stop
    DriverRestarted,
}

impl PanelEvent {
    /// The status message text as shown on a keypad, e.g. `05: Armed away`.
    pub fn status_message(code: u8, text: &str) -> String {
        format!("{:02X}: {}", code, text)
    }
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<PanelEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<PanelEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_format() {
        assert_eq!(PanelEvent::status_message(0x05, "Armed away"), "05: Armed away");
        assert_eq!(PanelEvent::status_message(0xC8, "Service required"), "C8: Service required");
    }

    #[tokio::test]
    async fn test_event_channel_fanout() {
        let (tx, mut rx1) = event_channel(4);
        let mut rx2 = tx.subscribe();
        let _ = tx.send(PanelEvent::BufferOverflow);
        assert_eq!(rx1.recv().await.ok(), Some(PanelEvent::BufferOverflow));
        assert_eq!(rx2.recv().await.ok(), Some(PanelEvent::BufferOverflow));
    }
}

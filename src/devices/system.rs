// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Panel-wide status: connectivity, keypad conditions, panel clock

use bitflags::bitflags;

bitflags! {
    /// Panel-wide fields that changed since the last dispatch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SystemChanges: u16 {
        const CONNECTION         = 1 << 0;
        const TROUBLE            = 1 << 1;
        const POWER_TROUBLE      = 1 << 2;
        const BATTERY_TROUBLE    = 1 << 3;
        /// Driver receive buffer overflowed
        const BUFFER_OVERFLOW    = 1 << 4;
        /// Panel is asking for an access code
        const ACCESS_CODE_PROMPT = 1 << 5;
        /// Keypad alarm pulses
        const KEYPAD_FIRE        = 1 << 6;
        const KEYPAD_AUX         = 1 << 7;
        const KEYPAD_PANIC       = 1 << 8;
        const TIMESTAMP          = 1 << 9;
    }
}

impl SystemChanges {
    /// Flags that are pulses: the change itself is the event.
    pub fn pulses() -> Self {
        Self::BUFFER_OVERFLOW
            | Self::ACCESS_CODE_PROMPT
            | Self::KEYPAD_FIRE
            | Self::KEYPAD_AUX
            | Self::KEYPAD_PANIC
    }

    /// Flags with a persistent value that a reset should re-announce.
    pub fn levels() -> Self {
        Self::CONNECTION
            | Self::TROUBLE
            | Self::POWER_TROUBLE
            | Self::BATTERY_TROUBLE
            | Self::TIMESTAMP
    }
}

/// Keypad trouble conditions reported as on/off levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeypadStatus {
    Trouble,
    PowerTrouble,
    BatteryTrouble,
}

impl KeypadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trouble => "trouble",
            Self::PowerTrouble => "power-trouble",
            Self::BatteryTrouble => "battery-trouble",
        }
    }
}

/// Momentary alarms raised from a keypad's function keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeypadAlarm {
    Fire,
    Aux,
    Panic,
}

impl KeypadAlarm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fire => "fire",
            Self::Aux => "aux",
            Self::Panic => "panic",
        }
    }
}

/// Panel clock as decoded by the driver. Fields are raw and may be garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl PanelTime {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8) -> Self {
        Self { year, month, day, hour, minute }
    }

    /// Range check only; day is not checked against the month.
    pub fn is_valid(&self) -> bool {
        self.year <= 9999
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.hour <= 23
            && self.minute <= 59
    }

    /// `YYYY-MM-DD HH:mm`, or `None` if any field is out of range.
    pub fn formatted(&self) -> Option<String> {
        self.is_valid().then(|| {
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}",
                self.year, self.month, self.day, self.hour, self.minute
            )
        })
    }
}

/// Panel-wide state as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemState {
    pub connected: bool,
    pub trouble: bool,
    pub power_trouble: bool,
    pub battery_trouble: bool,
    pub timestamp: PanelTime,
}

impl SystemState {
    pub fn keypad_status(&self, kind: KeypadStatus) -> bool {
        match kind {
            KeypadStatus::Trouble => self.trouble,
            KeypadStatus::PowerTrouble => self.power_trouble,
            KeypadStatus::BatteryTrouble => self.battery_trouble,
        }
    }
}

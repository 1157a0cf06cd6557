// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Partition state and classification

use bitflags::bitflags;

use crate::constants::{is_disabled_code, status_text};

bitflags! {
    /// Keypad lights byte for one partition.
    ///
    /// Bit order: `ready armed memory bypass trouble program fire backlight`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Lights: u8 {
        const READY     = 1 << 0;
        const ARMED     = 1 << 1;
        const MEMORY    = 1 << 2;
        const BYPASS    = 1 << 3;
        const TROUBLE   = 1 << 4;
        const PROGRAM   = 1 << 5;
        const FIRE      = 1 << 6;
        const BACKLIGHT = 1 << 7;
    }
}

const LIGHT_NAMES: [(&str, Lights); 8] = [
    ("ready", Lights::READY),
    ("armed", Lights::ARMED),
    ("memory", Lights::MEMORY),
    ("bypass", Lights::BYPASS),
    ("trouble", Lights::TROUBLE),
    ("program", Lights::PROGRAM),
    ("fire", Lights::FIRE),
    ("backlight", Lights::BACKLIGHT),
];

impl Lights {
    /// Per-light breakdown in bit order.
    pub fn named(self) -> [(&'static str, bool); 8] {
        LIGHT_NAMES.map(|(name, flag)| (name, self.contains(flag)))
    }
}

bitflags! {
    /// Per-partition fields that changed since the last dispatch.
    ///
    /// Status code and lights are not latched here; the dispatcher compares
    /// them against its own cache.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PartitionChanges: u8 {
        const ALARM       = 1 << 0;
        /// armed, armed_stay or armed_away
        const ARMED       = 1 << 1;
        const EXIT_DELAY  = 1 << 2;
        const ENTRY_DELAY = 1 << 3;
        const FIRE        = 1 << 4;
        const ACCESS_CODE = 1 << 5;
    }
}

/// Semantic partition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionStatus {
    Disarmed,
    ArmedStay,
    ArmedAway,
    ExitDelay,
    Triggered,
}

impl PartitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disarmed => "disarmed",
            Self::ArmedStay => "armed_stay",
            Self::ArmedAway => "armed_away",
            Self::ExitDelay => "exit_delay",
            Self::Triggered => "triggered",
        }
    }
}

impl std::fmt::Display for PartitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a partition's arming fields into one status.
///
/// An armed partition is `ArmedStay` whenever `armed_stay` is set, so stay
/// wins when the driver reports both. The status code and `armed_away` do
/// not affect the result. `Triggered` is never produced here; it comes from
/// alarm transitions.
pub fn classify(
    _status_code: u8,
    armed: bool,
    armed_stay: bool,
    _armed_away: bool,
    exit_delay: bool,
) -> PartitionStatus {
    if armed {
        if armed_stay {
            PartitionStatus::ArmedStay
        } else {
            PartitionStatus::ArmedAway
        }
    } else if exit_delay {
        PartitionStatus::ExitDelay
    } else {
        PartitionStatus::Disarmed
    }
}

/// Current state of one partition as reported by the driver.
///
/// The default (status code `0x00`) is a disabled partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionState {
    pub status_code: u8,
    pub armed: bool,
    pub armed_stay: bool,
    pub armed_away: bool,
    pub exit_delay: bool,
    pub entry_delay: bool,
    pub alarm: bool,
    pub fire: bool,
    pub lights: u8,
    /// User slot of the code that last armed or disarmed the partition
    pub access_code: u8,
}

impl PartitionState {
    pub fn is_disabled(&self) -> bool {
        is_disabled_code(self.status_code)
    }

    pub fn status(&self) -> PartitionStatus {
        classify(
            self.status_code,
            self.armed,
            self.armed_stay,
            self.armed_away,
            self.exit_delay,
        )
    }

    pub fn status_text(&self) -> &'static str {
        status_text(self.status_code)
    }

    /// Whether the partition is armed or on its way to being armed.
    pub fn is_arming_or_armed(&self) -> bool {
        self.armed || self.exit_delay
    }

    pub fn lights(&self) -> Lights {
        Lights::from_bits_retain(self.lights)
    }
}

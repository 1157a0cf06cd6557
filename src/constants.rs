// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Keybus constants and status code table

/// Maximum number of partitions a panel can report.
pub const MAX_PARTITIONS: usize = 8;

/// Number of 8-zone groups in the zone bitmaps (64 zones).
pub const MAX_ZONE_GROUPS: usize = 8;

/// Zones packed into one bitmap byte.
pub const ZONES_PER_GROUP: usize = 8;

/// Status codes reported for partitions that are not in use.
pub const DISABLED_STATUS_CODES: [u8; 2] = [0x00, 0xC7];

/// Lights cache value that never matches a real keypad lights byte in
/// practice, forcing the first observed value to be dispatched.
pub const LIGHTS_SENTINEL: u8 = 0xFF;

/// Status code cache value before the first status message is dispatched.
pub const STATUS_SENTINEL: u8 = 0xFF;

/// Maximum keys in one write; the driver's buffer holds 50 bytes including
/// the terminator.
pub const MAX_WRITE_KEYS: usize = 49;

/// Default bound on how long a write waits for the driver to become ready.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;

/// Default interval between write-ready checks while waiting.
pub const DEFAULT_WRITE_POLL_INTERVAL_MS: u64 = 50;

/// Default dispatcher tick.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 20;

/// Default delay before a stopped driver is restarted automatically.
pub const DEFAULT_AUTO_RESTART_SECS: u64 = 5 * 60;

/// Single-key partition commands.
pub const KEY_ARM_STAY: char = 's';
pub const KEY_ARM_AWAY: char = 'w';
pub const KEY_PANIC_ALARM: char = 'p';
pub const KEY_FIRE_ALARM: char = 'f';

/// Whether a raw partition status code marks the partition as disabled.
pub fn is_disabled_code(code: u8) -> bool {
    DISABLED_STATUS_CODES.contains(&code)
}

/// Short human-readable label for a raw partition status code.
///
/// Total over all byte values; anything not in the table is `"Unknown"`.
pub fn status_text(code: u8) -> &'static str {
    match code {
        0x01 => "Ready",
        0x02 => "Stay zones open",
        0x03 => "Zones open",
        0x04 => "Armed stay",
        0x05 => "Armed away",
        0x06 => "No entry delay",
        0x07 => "Failed to arm",
        0x08 => "Exit delay",
        0x09 => "No entry delay",
        0x0B => "Quick exit",
        0x0C => "Entry delay",
        0x0D => "Alarm memory",
        0x10 => "Keypad lockout",
        0x11 => "Alarm",
        0x14 => "Auto-arm",
        0x15 => "Arm with bypass",
        0x16 => "No entry delay",
        0x17 => "Power failure",
        0x22 => "Alarm memory",
        0x33 => "Busy",
        0x3D => "Disarmed",
        0x3E => "Disarmed",
        0x40 => "Keypad blanked",
        0x8A => "Activate zones",
        0x8B => "Quick exit",
        0x8E => "Invalid option",
        0x8F => "Invalid code",
        0x9E => "Enter * code",
        0x9F => "Access code",
        0xA0 => "Zone bypass",
        0xA1 => "Trouble menu",
        0xA2 => "Alarm memory",
        0xA3 => "Door chime on",
        0xA4 => "Door chime off",
        0xA5 => "Master code",
        0xA6 => "Access codes",
        0xA7 => "Enter new code",
        0xA9 => "User function",
        0xAA => "Time and Date",
        0xAB => "Auto-arm time",
        0xAC => "Auto-arm on",
        0xAD => "Auto-arm off",
        0xAF => "System test",
        0xB0 => "Enable DLS",
        0xB2 => "Command output",
        0xB7 => "Installer code",
        0xB8 => "Enter * code",
        0xB9 => "Zone tamper",
        0xBA => "Zones low batt.",
        0xC6 => "Zone fault menu",
        0xC8 => "Service required",
        0xD0 => "Keypads low batt",
        0xD1 => "Wireless low bat",
        0xE4 => "Installer menu",
        0xE5 => "Keypad slot",
        0xE6 => "Input: 2 digits",
        0xE7 => "Input: 3 digits",
        0xE8 => "Input: 4 digits",
        0xEA => "Code: 2 digits",
        0xEB => "Code: 4 digits",
        0xEC => "Input: 6 digits",
        0xED => "Input: 32 digits",
        0xEE => "Input: option",
        0xF0 => "Function key 1",
        0xF1 => "Function key 2",
        0xF2 => "Function key 3",
        0xF3 => "Function key 4",
        0xF4 => "Function key 5",
        0xF8 => "Keypad program",
        0xFF => "Disabled",
        _ => "Unknown",
    }
}

// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Keybus driver abstraction

pub mod loopback;

pub use loopback::LoopbackDriver;

use crate::error::Result;

/// The low-level Keybus driver.
///
/// Implementations own wire decoding and timing. They report panel state by
/// publishing frames to a shared [`StatusBoard`](crate::snapshot::StatusBoard)
/// and accept keypad writes through [`write`](Self::write).
pub trait KeybusDriver: Send + Sync + 'static {
    /// Start listening on the bus.
    fn begin(&self) -> Result<()>;

    /// Stop listening and release the bus.
    fn stop(&self);

    /// Whether the driver can accept a write right now.
    fn write_ready(&self) -> bool;

    /// Write keys as if typed on a keypad assigned to `partition` (1-based).
    /// Callers check [`write_ready`](Self::write_ready) first.
    fn write(&self, partition: u8, keys: &str) -> Result<()>;
}

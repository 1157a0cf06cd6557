// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Keybus bridge errors

/// All errors that can occur in the dsc-keybus-bridge library.
///
/// Illegal-but-harmless state transitions (disarming a disarmed partition,
/// arming an armed one) are not errors; see [`CommandOutcome`](crate::gateway::CommandOutcome).
#[derive(Debug, thiserror::Error)]
pub enum DscError {
    #[error("Invalid partition: {id} (valid: 1-{max})")]
    InvalidPartition { id: u8, max: u8 },

    #[error("Partition {id} is disabled")]
    PartitionDisabled { id: u8 },

    #[error("Invalid timestamp: {details}")]
    InvalidTimestamp { details: String },

    #[error("Keystroke payload too long: {len} keys (max: {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Empty keystroke payload")]
    EmptyPayload,

    #[error("Invalid command: {details}")]
    InvalidCommand { details: String },

    #[error("Timed out after {waited_ms}ms waiting to write: {keys}")]
    WriteTimeout { keys: String, waited_ms: u64 },

    #[error("Keybus disconnected")]
    Disconnected,

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Keybus driver error: {reason}")]
    Driver { reason: String },
}

impl DscError {
    /// Whether the failed operation may succeed if simply tried again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DscError::WriteTimeout { .. } | DscError::Disconnected | DscError::Driver { .. }
        )
    }

    /// Whether this error was caused by caller input rather than panel state.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            DscError::InvalidPartition { .. }
                | DscError::PartitionDisabled { .. }
                | DscError::InvalidTimestamp { .. }
                | DscError::PayloadTooLong { .. }
                | DscError::EmptyPayload
                | DscError::InvalidCommand { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DscError>;

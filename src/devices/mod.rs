// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Panel state models

pub mod partition;
pub mod system;
pub mod zone;

pub use partition::{classify, Lights, PartitionChanges, PartitionState, PartitionStatus};
pub use system::{KeypadAlarm, KeypadStatus, PanelTime, SystemChanges, SystemState};
pub use zone::{diff_zone_bitmap, ZoneTransition};

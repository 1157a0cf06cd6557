// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Keypad key sequences and inbound command parsing

use chrono::{Datelike, Local, NaiveDateTime, Timelike};

use crate::constants::{KEY_ARM_AWAY, KEY_ARM_STAY, KEY_FIRE_ALARM, KEY_PANIC_ALARM};
use crate::error::{DscError, Result};

/// Partition-scoped alarm commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmCommand {
    /// Written as the access code
    Disarm,
    ArmStay,
    ArmAway,
    Panic,
    Fire,
}

impl AlarmCommand {
    /// Single keypad key for the command. `Disarm` has none.
    pub fn key(&self) -> Option<char> {
        match self {
            AlarmCommand::Disarm => None,
            AlarmCommand::ArmStay => Some(KEY_ARM_STAY),
            AlarmCommand::ArmAway => Some(KEY_ARM_AWAY),
            AlarmCommand::Panic => Some(KEY_PANIC_ALARM),
            AlarmCommand::Fire => Some(KEY_FIRE_ALARM),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmCommand::Disarm => "disarm",
            AlarmCommand::ArmStay => "arm_stay",
            AlarmCommand::ArmAway => "arm_away",
            AlarmCommand::Panic => "panic",
            AlarmCommand::Fire => "fire",
        }
    }
}

/// Build the keypad sequence that sets the panel clock:
/// `*6{code}1{HH}{mm}{MM}{DD}{YY}#`.
///
/// The panel stores a two-digit year, so only 2000-2099 is accepted.
pub fn time_set_keys(access_code: &str, time: &NaiveDateTime) -> Result<String> {
    let year = time.year();
    if !(2000..=2099).contains(&year) {
        return Err(DscError::InvalidTimestamp {
            details: format!("year {} outside 2000-2099", year),
        });
    }
    Ok(format!(
        "*6{}1{:02}{:02}{:02}{:02}{:02}#",
        access_code,
        time.hour(),
        time.minute(),
        time.month(),
        time.day(),
        year % 100
    ))
}

/// Parse a `set-time` payload: `now` or `YYYY-MM-DD HH:MM`.
pub fn parse_set_time(payload: &str) -> Result<NaiveDateTime> {
    let payload = payload.trim();
    if payload.eq_ignore_ascii_case("now") {
        return Ok(Local::now().naive_local());
    }
    NaiveDateTime::parse_from_str(payload, "%Y-%m-%d %H:%M").map_err(|e| {
        DscError::InvalidTimestamp {
            details: format!("{:?}: {}", payload, e),
        }
    })
}

/// Parse an on/off payload.
pub fn parse_switch(payload: &str) -> Option<bool> {
    match payload.trim().to_lowercase().as_str() {
        "1" | "on" | "true" => Some(true),
        "0" | "off" | "false" => Some(false),
        _ => None,
    }
}

/// Split `partition-N-<field>` into `(N, field)`.
/// e.g., "partition-2-away" → Some((2, "away"))
pub fn parse_partition_property(property: &str) -> Option<(u8, &str)> {
    let rest = property.strip_prefix("partition-")?;
    let (num, field) = rest.split_once('-')?;
    num.parse::<u8>().ok().map(|n| (n, field))
}

/// Split an optional `N:` partition prefix off a keypad payload.
/// e.g., "2:*1" → (Some(2), "*1"), "*1" → (None, "*1")
pub fn split_keypad_partition(payload: &str) -> (Option<u8>, &str) {
    if let Some((prefix, keys)) = payload.split_once(':')
        && !prefix.is_empty()
        && prefix.chars().all(|c| c.is_ascii_digit())
        && let Ok(partition) = prefix.parse::<u8>()
    {
        return (Some(partition), keys);
    }
    (None, payload)
}

/// Driver maintenance requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceAction {
    StopDriver,
    StartDriver,
    /// Restart the whole bridge
    Reboot,
}

impl MaintenanceAction {
    pub fn from_payload(payload: &str) -> Option<Self> {
        match payload.trim() {
            "dsc-stop" => Some(Self::StopDriver),
            "dsc-start" => Some(Self::StartDriver),
            "reboot" => Some(Self::Reboot),
            _ => None,
        }
    }
}

/// A command received from the messaging side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundCommand {
    Alarm {
        partition: u8,
        command: AlarmCommand,
        code: Option<String>,
    },
    Keypad { partition: u8, keys: String },
    SetTime(NaiveDateTime),
    RefreshStatus,
    Maintenance(MaintenanceAction),
}

/// Parse a command from its property name (the topic segment before `/set`)
/// and payload.
pub fn parse_command(property: &str, payload: &str) -> Result<InboundCommand> {
    let invalid = |details: String| DscError::InvalidCommand { details };

    if let Some((partition, field)) = parse_partition_property(property) {
        let command = match field {
            "away" | "stay" => match parse_switch(payload) {
                Some(true) if field == "away" => AlarmCommand::ArmAway,
                Some(true) => AlarmCommand::ArmStay,
                Some(false) => AlarmCommand::Disarm,
                None => return Err(invalid(format!("{}: expected on/off, got {:?}", property, payload))),
            },
            "disarm" => {
                let code = Some(payload.trim()).filter(|c| !c.is_empty()).map(str::to_string);
                return Ok(InboundCommand::Alarm { partition, command: AlarmCommand::Disarm, code });
            }
            "panic" => AlarmCommand::Panic,
            "fire" => AlarmCommand::Fire,
            _ => return Err(invalid(format!("unknown property {}", property))),
        };
        return Ok(InboundCommand::Alarm { partition, command, code: None });
    }

    match property {
        "keypad" => {
            let (partition, keys) = split_keypad_partition(payload);
            Ok(InboundCommand::Keypad {
                partition: partition.unwrap_or(1),
                keys: keys.to_string(),
            })
        }
        "set-time" => parse_set_time(payload).map(InboundCommand::SetTime),
        "refresh-status" => Ok(InboundCommand::RefreshStatus),
        "maintenance" => MaintenanceAction::from_payload(payload)
            .map(InboundCommand::Maintenance)
            .ok_or_else(|| invalid(format!("unknown maintenance action {:?}", payload))),
        _ => Err(invalid(format!("unknown property {}", property))),
    }
}

/// Extract the property name from `{prefix}/{property}/set`.
pub fn command_property<'a>(topic: &'a str, prefix: &str) -> Option<&'a str> {
    topic
        .strip_prefix(prefix)?
        .strip_prefix('/')?
        .strip_suffix("/set")
        .filter(|p| !p.is_empty() && !p.contains('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_opt(h, mi, 0))
            .unwrap()
    }

    #[test]
    fn test_command_keys() {
        assert_eq!(AlarmCommand::ArmStay.key(), Some('s'));
        assert_eq!(AlarmCommand::ArmAway.key(), Some('w'));
        assert_eq!(AlarmCommand::Panic.key(), Some('p'));
        assert_eq!(AlarmCommand::Fire.key(), Some('f'));
        assert_eq!(AlarmCommand::Disarm.key(), None);
    }

    #[test]
    fn test_time_set_keys() {
        let keys = time_set_keys("1234", &at(2024, 3, 15, 9, 30)).unwrap();
        assert_eq!(keys, "*6123410930031524#");
    }

    #[test]
    fn test_time_set_rejects_year() {
        assert!(matches!(
            time_set_keys("1234", &at(1999, 12, 31, 23, 59)),
            Err(DscError::InvalidTimestamp { .. })
        ));
        assert!(time_set_keys("1234", &at(2100, 1, 1, 0, 0)).is_err());
        assert!(time_set_keys("1234", &at(2099, 12, 31, 0, 0)).is_ok());
    }

    #[test]
    fn test_parse_set_time() {
        assert_eq!(parse_set_time("2024-03-15 09:30").unwrap(), at(2024, 3, 15, 9, 30));
        assert!(parse_set_time("now").is_ok());
        assert!(parse_set_time("15/03/2024").is_err());
    }

    #[test]
    fn test_parse_partition_property() {
        assert_eq!(parse_partition_property("partition-2-away"), Some((2, "away")));
        assert_eq!(parse_partition_property("partition-1-exit-delay"), Some((1, "exit-delay")));
        assert_eq!(parse_partition_property("partition-x-away"), None);
        assert_eq!(parse_partition_property("keypad"), None);
    }

    #[test]
    fn test_split_keypad_partition() {
        assert_eq!(split_keypad_partition("2:*1"), (Some(2), "*1"));
        assert_eq!(split_keypad_partition("*1"), (None, "*1"));
        assert_eq!(split_keypad_partition(":12"), (None, ":12"));
        assert_eq!(split_keypad_partition("a:12"), (None, "a:12"));
    }

    #[test]
    fn test_parse_alarm_commands() {
        assert_eq!(
            parse_command("partition-1-away", "on").unwrap(),
            InboundCommand::Alarm { partition: 1, command: AlarmCommand::ArmAway, code: None }
        );
        assert_eq!(
            parse_command("partition-3-stay", "1").unwrap(),
            InboundCommand::Alarm { partition: 3, command: AlarmCommand::ArmStay, code: None }
        );
        assert_eq!(
            parse_command("partition-1-stay", "OFF").unwrap(),
            InboundCommand::Alarm { partition: 1, command: AlarmCommand::Disarm, code: None }
        );
        assert_eq!(
            parse_command("partition-2-disarm", "5678").unwrap(),
            InboundCommand::Alarm {
                partition: 2,
                command: AlarmCommand::Disarm,
                code: Some("5678".to_string())
            }
        );
        assert_eq!(
            parse_command("partition-2-disarm", "").unwrap(),
            InboundCommand::Alarm { partition: 2, command: AlarmCommand::Disarm, code: None }
        );
        assert!(parse_command("partition-1-away", "maybe").is_err());
        assert!(parse_command("partition-1-lights", "1").is_err());
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(
            parse_command("keypad", "2:*1").unwrap(),
            InboundCommand::Keypad { partition: 2, keys: "*1".to_string() }
        );
        assert_eq!(
            parse_command("keypad", "1234").unwrap(),
            InboundCommand::Keypad { partition: 1, keys: "1234".to_string() }
        );
        assert_eq!(parse_command("refresh-status", "").unwrap(), InboundCommand::RefreshStatus);
        assert_eq!(
            parse_command("maintenance", "dsc-stop").unwrap(),
            InboundCommand::Maintenance(MaintenanceAction::StopDriver)
        );
        assert_eq!(
            parse_command("maintenance", "reboot").unwrap(),
            InboundCommand::Maintenance(MaintenanceAction::Reboot)
        );
        assert!(parse_command("maintenance", "format").is_err());
        assert!(matches!(
            parse_command("bogus", ""),
            Err(DscError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn test_command_property() {
        assert_eq!(command_property("dsc/alarm/keypad/set", "dsc/alarm"), Some("keypad"));
        assert_eq!(
            command_property("dsc/alarm/partition-1-away/set", "dsc/alarm"),
            Some("partition-1-away")
        );
        assert_eq!(command_property("dsc/alarm/keypad", "dsc/alarm"), None);
        assert_eq!(command_property("other/keypad/set", "dsc/alarm"), None);
    }
}

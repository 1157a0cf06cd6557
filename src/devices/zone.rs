// MIT License - Copyright (c) 2026 dsc-keybus-bridge contributors
// Zone bitmap change extraction

use crate::constants::ZONES_PER_GROUP;

/// One zone whose open or alarm bit changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneTransition {
    /// 1-based zone number
    pub zone: u8,
    /// New value of the zone's bit
    pub active: bool,
}

/// Zone number for a bitmap position. `group` and `bit` are 0-based.
pub fn zone_number(group: usize, bit: usize) -> u8 {
    (group * ZONES_PER_GROUP + bit + 1) as u8
}

/// Bitmap position (group, bit) for a 1-based zone number.
pub fn zone_position(zone: u8) -> Option<(usize, usize)> {
    let index = (zone as usize).checked_sub(1)?;
    Some((index / ZONES_PER_GROUP, index % ZONES_PER_GROUP))
}

/// Extract per-zone transitions from changed/value bitmaps.
///
/// Visits groups and bits in ascending order and clears each group's changed
/// mask once it has been processed. Groups beyond `values.len()` are ignored.
pub fn diff_zone_bitmap(changed: &mut [u8], values: &[u8]) -> Vec<ZoneTransition> {
    let mut transitions = Vec::new();
    for (group, (mask, value)) in changed.iter_mut().zip(values).enumerate() {
        if *mask == 0 {
            continue;
        }
        for bit in 0..ZONES_PER_GROUP {
            if *mask & (1 << bit) != 0 {
                transitions.push(ZoneTransition {
                    zone: zone_number(group, bit),
                    active: *value & (1 << bit) != 0,
                });
            }
        }
        *mask = 0;
    }
    transitions
}

/// Whether any group has a pending change.
pub fn any_changed(changed: &[u8]) -> bool {
    changed.iter().any(|m| *m != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bit_round_trip() {
        for group in 0..8 {
            for bit in 0..8 {
                let mut changed = [0u8; 8];
                let mut values = [0u8; 8];
                changed[group] = 1 << bit;
                values[group] = 1 << bit;

                let out = diff_zone_bitmap(&mut changed, &values);
                assert_eq!(
                    out,
                    vec![ZoneTransition { zone: (group * 8 + bit + 1) as u8, active: true }]
                );
                assert_eq!(changed, [0u8; 8]);
            }
        }
    }

    #[test]
    fn test_ascending_order_and_values() {
        let mut changed = [0b1000_0001, 0, 0b0000_0100, 0, 0, 0, 0, 0];
        let values = [0b0000_0001, 0xFF, 0, 0, 0, 0, 0, 0];

        let out = diff_zone_bitmap(&mut changed, &values);
        assert_eq!(
            out,
            vec![
                ZoneTransition { zone: 1, active: true },
                ZoneTransition { zone: 8, active: false },
                ZoneTransition { zone: 19, active: false },
            ]
        );
    }

    #[test]
    fn test_empty_mask_emits_nothing() {
        let mut changed = [0u8; 8];
        let values = [0xFFu8; 8];
        assert!(diff_zone_bitmap(&mut changed, &values).is_empty());
        assert!(!any_changed(&changed));
    }

    #[test]
    fn test_zone_64() {
        let mut changed = [0, 0, 0, 0, 0, 0, 0, 0x80];
        let values = [0, 0, 0, 0, 0, 0, 0, 0x80];
        let out = diff_zone_bitmap(&mut changed, &values);
        assert_eq!(out, vec![ZoneTransition { zone: 64, active: true }]);
    }

    #[test]
    fn test_zone_position() {
        assert_eq!(zone_position(1), Some((0, 0)));
        assert_eq!(zone_position(9), Some((1, 0)));
        assert_eq!(zone_position(64), Some((7, 7)));
        assert_eq!(zone_position(0), None);
        assert_eq!(zone_number(7, 7), 64);
    }
}

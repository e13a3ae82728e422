//! Nearest-recorded-semitone lookup over the playable key range
//!
//! The device plays keys 24–84. Instruments rarely record every semitone, so
//! both the fill stage (choosing a synthesis donor) and the image builder
//! (populating per-instrument key tables) need a deterministic answer to
//! "which recorded semitone serves key K". Equidistant candidates resolve to
//! the lower semitone.

use std::collections::BTreeMap;

/// First playable key of the device
pub const FIRST_KEY: u8 = 24;
/// Last playable key of the device (inclusive)
pub const LAST_KEY: u8 = 84;
/// Number of playable keys
pub const KEY_COUNT: usize = (LAST_KEY - FIRST_KEY) as usize + 1;

/// One resolved key: the donor semitone and its recorded velocities, ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRow {
    /// Playable key this row answers for
    pub key: u8,
    /// Nearest recorded semitone
    pub semitone: u8,
    /// Velocities recorded at that semitone, sorted ascending
    pub velocities: Vec<u8>,
}

/// Nearest recorded semitone to `key`, preferring the lower on ties.
///
/// Returns `None` when nothing is recorded.
pub fn nearest_recorded(recorded: &BTreeMap<u8, Vec<u8>>, key: u8) -> Option<u8> {
    let mut best: Option<(u8, u8)> = None;
    // Ascending iteration + strict comparison keeps the lower semitone on ties
    for &semitone in recorded.keys() {
        let distance = key.abs_diff(semitone);
        match best {
            Some((d, _)) if distance >= d => {}
            _ => best = Some((distance, semitone)),
        }
    }
    best.map(|(_, semitone)| semitone)
}

/// Resolve every key in the playable range to its nearest recorded semitone.
///
/// Every returned row is non-empty as long as `recorded` has at least one
/// semitone with at least one velocity.
pub fn resolve(recorded: &BTreeMap<u8, Vec<u8>>) -> Vec<KeyRow> {
    (FIRST_KEY..=LAST_KEY)
        .filter_map(|key| {
            let semitone = nearest_recorded(recorded, key)?;
            let mut velocities = recorded[&semitone].clone();
            velocities.sort_unstable();
            Some(KeyRow {
                key,
                semitone,
                velocities,
            })
        })
        .collect()
}

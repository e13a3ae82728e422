//! Hold-behavior resolution
//!
//! The hold configuration maps instrument-name patterns to ordered rule
//! lists. A pattern whose text equals an instrument's string id is an
//! explicit per-instrument exception: its entries win over generic pattern
//! entries targeting the same instrument. Resolution is a pure fold per
//! instrument over the configured patterns; nothing is mutated while
//! matching.

use super::layout::HoldBehavior;
use crate::bank::HoldRule;
use crate::{Result, SynthFsError};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};

struct CompiledRule {
    pattern: String,
    regex: Regex,
    behaviors: Vec<HoldBehavior>,
}

fn compile_rules(
    config: &[(String, Vec<HoldRule>)],
    id_by_name: &BTreeMap<String, u16>,
) -> Result<Vec<CompiledRule>> {
    config
        .iter()
        .map(|(pattern, rules)| {
            // Whole-name matching, as the device resolves complete string ids
            let regex = Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| SynthFsError::Config(format!("hold pattern '{pattern}': {e}")))?;

            let behaviors = rules
                .iter()
                .map(|rule| {
                    let instrument_id = *id_by_name.get(&rule.instrument).ok_or_else(|| {
                        SynthFsError::Config(format!(
                            "hold pattern '{}' targets unknown instrument '{}'",
                            pattern, rule.instrument
                        ))
                    })?;
                    Ok(HoldBehavior {
                        trigger_time: rule.trigger_time,
                        max_trigger_time: rule.max_trigger_time,
                        transition_time: rule.transition_time,
                        instrument_id,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(CompiledRule {
                pattern: pattern.clone(),
                regex,
                behaviors,
            })
        })
        .collect()
}

/// Resolve one instrument's behavior list: gather every matching pattern's
/// entries in configuration order, then drop generic entries shadowed by an
/// explicit entry with the same target.
fn resolve_one(rules: &[CompiledRule], string_id: &str) -> Vec<HoldBehavior> {
    let mut gathered: Vec<(bool, HoldBehavior)> = Vec::new();
    for rule in rules {
        if !rule.regex.is_match(string_id) {
            continue;
        }
        let explicit = rule.pattern == string_id;
        gathered.extend(rule.behaviors.iter().map(|b| (explicit, *b)));
    }

    let explicit_targets: HashSet<u16> = gathered
        .iter()
        .filter(|(explicit, _)| *explicit)
        .map(|(_, b)| b.instrument_id)
        .collect();

    gathered
        .into_iter()
        .filter(|(explicit, b)| *explicit || !explicit_targets.contains(&b.instrument_id))
        .map(|(_, b)| b)
        .collect()
}

/// Resolve hold rows for every packed instrument.
///
/// Returns one row per single instrument (in id order) plus the uniform row
/// stride: every row starts with one invalid entry and is right-padded with
/// invalid entries to `max resolved list length + 1`.
pub fn resolve_hold_rows(
    config: Option<&[(String, Vec<HoldRule>)]>,
    id_by_name: &BTreeMap<String, u16>,
    singles: &[String],
) -> Result<(Vec<Vec<HoldBehavior>>, usize)> {
    let resolved: Vec<Vec<HoldBehavior>> = match config {
        None => vec![Vec::new(); singles.len()],
        Some(config) => {
            let rules = compile_rules(config, id_by_name)?;
            singles
                .iter()
                .map(|string_id| resolve_one(&rules, string_id))
                .collect()
        }
    };

    let stride = resolved.iter().map(Vec::len).max().unwrap_or(0) + 1;

    let rows = resolved
        .into_iter()
        .map(|list| {
            let mut row = Vec::with_capacity(stride);
            row.push(HoldBehavior::invalid());
            row.extend(list);
            row.resize(stride, HoldBehavior::invalid());
            row
        })
        .collect();

    Ok((rows, stride))
}

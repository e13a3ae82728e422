//! On-disk directory convention shared by the pipeline stages
//!
//! Each instrument is a directory of per-note recordings:
//!
//! - `{semitone}_{velocity}.audio` — mono 16-bit PCM at the device rate,
//!   WAV-framed
//! - `{semitone}_{velocity}.meta` — loop region JSON
//! - `instrument.meta` — instrument-level metadata JSON
//!
//! The image builder additionally reads an optional `hold.meta` in the
//! instruments root: an ordered object mapping instrument-name regex patterns
//! to hold-behavior rule lists.
//!
//! Stages never share memory; this convention is the only coupling between
//! extract, fill and build.

use crate::{Result, SynthFsError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of per-note audio files
pub const AUDIO_EXT: &str = "audio";
/// Extension of per-note and instrument metadata files
pub const META_EXT: &str = "meta";
/// File name of the instrument-level metadata
pub const INSTRUMENT_META: &str = "instrument.meta";
/// File name of the hold-behavior configuration in the instruments root
pub const HOLD_CONFIG: &str = "hold.meta";

/// Velocity value that must never appear in a sample file name
pub const INVALID_VELOCITY: u8 = 0;

/// Rescale a source velocity (0–127 domain) to the device domain (0–255)
pub fn rescale_velocity(velocity: u8) -> u8 {
    (velocity as f64 * 255.0 / 127.0).round() as u8
}

/// One `{semitone}_{velocity}` recording name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SampleName {
    /// Root semitone of the recording
    pub semitone: u8,
    /// Velocity layer of the recording (device domain)
    pub velocity: u8,
}

impl SampleName {
    /// Parse a file stem of the form `{semitone}_{velocity}`
    pub fn parse(stem: &str) -> Option<Self> {
        let (semitone, velocity) = stem.split_once('_')?;
        Some(Self {
            semitone: semitone.parse().ok()?,
            velocity: velocity.parse().ok()?,
        })
    }

    /// File stem of this recording
    pub fn stem(&self) -> String {
        format!("{}_{}", self.semitone, self.velocity)
    }

    /// Path of the audio file inside `dir`
    pub fn audio_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.stem(), AUDIO_EXT))
    }

    /// Path of the metadata file inside `dir`
    pub fn meta_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.stem(), META_EXT))
    }
}

/// Loop region of one recording, in output-rate sample units
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMeta {
    /// First sample of the loop region
    pub loop_start: u32,
    /// Loop region length in samples (0 = no loop)
    pub loop_duration: u32,
}

/// Instrument-level metadata emitted by extraction and read by the builder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentMeta {
    /// Display name of the instrument
    pub name: String,
    /// Whether any zone declared a loop region
    pub looping: bool,
    /// Release time in device samples
    pub release: u32,
    /// Single-sample instrument (multi-sample instruments are counted, never packed)
    #[serde(default = "default_true")]
    pub single: bool,
    /// Reverb send enabled
    #[serde(default)]
    pub reverb: bool,
    /// Reverb pre-delay
    #[serde(default)]
    pub reverb_pre_delay: f32,
    /// Reverb room size
    #[serde(default)]
    pub reverb_room_size: f32,
    /// Reverb color
    #[serde(default)]
    pub reverb_color: f32,
    /// Reverb filter
    #[serde(default)]
    pub reverb_filter: f32,
    /// Source container this instrument was extracted from
    #[serde(default)]
    pub src: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One hold-behavior rule entry from the configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldRule {
    /// Minimum key-hold time before the transition triggers
    pub trigger_time: f32,
    /// Upper bound of the trigger window
    pub max_trigger_time: f32,
    /// Crossfade time into the target instrument
    pub transition_time: f32,
    /// String id (directory name) of the target instrument
    pub instrument: String,
}

/// Read a JSON metadata file, mapping malformed content to a config error
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| SynthFsError::Config(format!("{}: {}", path.display(), e)))
}

/// Write a JSON metadata file, pretty-printed
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| SynthFsError::Config(format!("{}: {}", path.display(), e)))?;
    fs::write(path, text)?;
    Ok(())
}

/// Load the hold configuration, preserving pattern order.
///
/// A missing file means no rules; a present but malformed file is a config
/// error.
pub fn load_hold_config(path: &Path) -> Result<Option<Vec<(String, Vec<HoldRule>)>>> {
    if !path.exists() {
        return Ok(None);
    }

    let value: serde_json::Value = read_json(path)?;
    let object = value.as_object().ok_or_else(|| {
        SynthFsError::Config(format!("{}: hold config must be an object", path.display()))
    })?;

    let mut rules = Vec::with_capacity(object.len());
    for (pattern, list) in object {
        let parsed: Vec<HoldRule> = serde_json::from_value(list.clone())
            .map_err(|e| SynthFsError::Config(format!("{}: pattern '{}': {}", path.display(), pattern, e)))?;
        rules.push((pattern.clone(), parsed));
    }

    Ok(Some(rules))
}

/// Write a mono 16-bit recording at the device rate, WAV-framed
pub fn write_audio(path: &Path, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: crate::pcm::DEVICE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| format!("failed to create '{}': {}", path.display(), e))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| format!("failed to write '{}': {}", path.display(), e))?;
    }
    writer
        .finalize()
        .map_err(|e| format!("failed to finalize '{}': {}", path.display(), e))?;

    Ok(())
}

/// Read a mono 16-bit recording back into memory
pub fn read_audio(path: &Path) -> Result<Vec<i16>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| SynthFsError::Format(format!("failed to open '{}': {}", path.display(), e)))?;

    reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, _>>()
        .map_err(|e| SynthFsError::Format(format!("failed to decode '{}': {}", path.display(), e)))
}

/// Scan one instrument directory into a semitone → velocities map.
///
/// Only `.audio` files with a parsable `{semitone}_{velocity}` stem
/// participate. A zero velocity is a validation error. Velocities within one
/// semitone bucket come out sorted ascending; file names make them unique.
pub fn scan_samples(dir: &Path) -> Result<BTreeMap<u8, Vec<u8>>> {
    let mut recorded: BTreeMap<u8, Vec<u8>> = BTreeMap::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(AUDIO_EXT) {
            continue;
        }

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(name) = SampleName::parse(stem) else {
            continue;
        };

        if name.velocity == INVALID_VELOCITY {
            return Err(SynthFsError::Validation(format!(
                "invalid velocity {} in '{}'",
                name.velocity,
                path.display()
            )));
        }

        recorded.entry(name.semitone).or_default().push(name.velocity);
    }

    for velocities in recorded.values_mut() {
        velocities.sort_unstable();
    }

    Ok(recorded)
}

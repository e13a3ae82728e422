//! Missing-note synthesis
//!
//! Instruments rarely record all 61 playable semitones. For every semitone in
//! the key range with no recording, the nearest recorded semitone donates its
//! velocity layers: each donor recording is pitch-shifted by `2^(delta/12)`
//! and written under the target name, loop markers rescaled by the actual
//! output/donor length ratio so rounding never compounds.
//!
//! Re-running over a directory that already contains synthesized output is
//! unsupported; synthesis donors must be original recordings.

use crate::bank::{self, SampleMeta, SampleName};
use crate::{pcm, proximity, Result, SynthFsError};
use std::path::Path;
use tracing::info;

/// What one fill run produced
#[derive(Debug, Clone, Copy)]
pub struct FillSummary {
    /// Semitones that already had recordings
    pub recorded: usize,
    /// Semitones synthesized by this run
    pub synthesized: usize,
}

/// Scale a loop marker by the actual output/donor length ratio
fn scale_marker(marker: u32, out_len: usize, donor_len: usize) -> u32 {
    (marker as f64 * out_len as f64 / donor_len as f64).round() as u32
}

/// Fill every missing semitone of one instrument directory.
pub fn fill_gaps(dir: &Path) -> Result<FillSummary> {
    let recorded = bank::scan_samples(dir)?;
    if recorded.is_empty() {
        return Err(SynthFsError::Validation(format!(
            "'{}' has no recorded samples to synthesize from",
            dir.display()
        )));
    }

    let mut synthesized = 0usize;
    for key in proximity::FIRST_KEY..=proximity::LAST_KEY {
        let Some(donor) = proximity::nearest_recorded(&recorded, key) else {
            continue;
        };
        if donor == key {
            continue;
        }

        // Pitch shift: reading the donor slower/faster by the semitone ratio
        let factor = 2.0f64.powf((donor as f64 - key as f64) / 12.0);

        for &velocity in &recorded[&donor] {
            let donor_name = SampleName {
                semitone: donor,
                velocity,
            };
            let target_name = SampleName {
                semitone: key,
                velocity,
            };

            let donor_samples = bank::read_audio(&donor_name.audio_path(dir))?;
            let out_len = (donor_samples.len() as f64 * factor).round() as usize;
            let shifted = pcm::stretch(&donor_samples, out_len);
            bank::write_audio(&target_name.audio_path(dir), &shifted)?;

            // The actual length ratio, not the theoretical factor
            let donor_meta: SampleMeta = bank::read_json(&donor_name.meta_path(dir))?;
            let target_meta = SampleMeta {
                loop_start: scale_marker(donor_meta.loop_start, out_len, donor_samples.len()),
                loop_duration: scale_marker(donor_meta.loop_duration, out_len, donor_samples.len()),
            };
            bank::write_json(&target_name.meta_path(dir), &target_meta)?;

            synthesized += 1;
        }
    }

    info!(
        dir = %dir.display(),
        recorded = recorded.len(),
        synthesized,
        "filled semitone coverage"
    );

    Ok(FillSummary {
        recorded: recorded.len(),
        synthesized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_recording(dir: &Path, semitone: u8, velocity: u8, len: usize, meta: SampleMeta) {
        let name = SampleName { semitone, velocity };
        let samples: Vec<i16> = (0..len).map(|i| (i % 128) as i16 * 16).collect();
        bank::write_audio(&name.audio_path(dir), &samples).unwrap();
        bank::write_json(&name.meta_path(dir), &meta).unwrap();
    }

    #[test]
    fn test_fills_every_missing_semitone() {
        let dir = tempdir().unwrap();
        let meta = SampleMeta::default();
        write_recording(dir.path(), 40, 129, 2000, meta);
        write_recording(dir.path(), 40, 255, 2000, meta);

        let summary = fill_gaps(dir.path()).unwrap();
        assert_eq!(summary.recorded, 1);
        // 60 missing semitones (24-39, 41-84), two velocity layers each
        assert_eq!(summary.synthesized, 120);

        for key in proximity::FIRST_KEY..=proximity::LAST_KEY {
            for velocity in [129u8, 255] {
                let name = SampleName {
                    semitone: key,
                    velocity,
                };
                assert!(name.audio_path(dir.path()).exists(), "missing {}", name.stem());
                assert!(name.meta_path(dir.path()).exists(), "missing {} meta", name.stem());
            }
        }
    }

    #[test]
    fn test_pitch_shift_length() {
        let dir = tempdir().unwrap();
        write_recording(dir.path(), 60, 255, 4800, SampleMeta::default());

        fill_gaps(dir.path()).unwrap();

        // One semitone below the donor stretches longer: round(4800 * 2^(1/12))
        let up = bank::read_audio(
            &SampleName {
                semitone: 59,
                velocity: 255,
            }
            .audio_path(dir.path()),
        )
        .unwrap();
        assert_eq!(up.len(), (4800.0 * 2.0f64.powf(1.0 / 12.0)).round() as usize);

        // One semitone above shrinks
        let down = bank::read_audio(
            &SampleName {
                semitone: 61,
                velocity: 255,
            }
            .audio_path(dir.path()),
        )
        .unwrap();
        assert_eq!(down.len(), (4800.0 * 2.0f64.powf(-1.0 / 12.0)).round() as usize);
    }

    #[test]
    fn test_loop_markers_scale_by_actual_ratio() {
        // Donor of 48000 samples shrunk to 45000: markers follow the ratio
        assert_eq!(scale_marker(1000, 45000, 48000), 938);
        assert_eq!(scale_marker(2000, 45000, 48000), 1875);
    }

    #[test]
    fn test_empty_directory_is_validation_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            fill_gaps(dir.path()),
            Err(SynthFsError::Validation(_))
        ));
    }
}

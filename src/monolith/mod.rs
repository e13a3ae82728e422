//! Monolithic container extraction
//!
//! A monolith bundles every recording of an instrument plus a compressed
//! program description in one opaque file. There is no master index: embedded
//! audio chunks are enumerated by scanning forward for the canonical RIFF
//! signature, each next search starting one byte past the previous match. The
//! program description is a bare zlib stream located by its own signature
//! after the last audio chunk.
//!
//! Extraction is all-or-nothing per monolith: every failure path fires before
//! the first zone file is written.

pub mod program;

use crate::bank::{self, InstrumentMeta, SampleMeta, SampleName};
use crate::reader::BinaryReader;
use crate::{pcm, Result, SynthFsError};
use flate2::read::ZlibDecoder;
use self::program::{ProgramDescription, XmlNode};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Leading magic value of a monolithic container
pub const MONOLITH_MAGIC: u32 = 0x7FA8_9012;

/// Audio-container start signature
const RIFF_SIG: &[u8] = b"RIFF";
/// Format-chunk signature inside an audio container
const FMT_SIG: &[u8] = b"fmt ";
/// Payload-chunk signature inside an audio container
const DATA_SIG: &[u8] = b"data";
/// Compressed-stream signature; the zlib header starts 3 bytes in
const DEFLATE_SIG: &[u8] = &[0x0E, 0x00, 0x00, 0x78, 0x01];

/// What one extraction produced
#[derive(Debug, Clone)]
pub struct ExtractSummary {
    /// Decoded program name
    pub name: String,
    /// Number of zone file pairs written
    pub zones: usize,
    /// Number of audio chunks discovered in the container
    pub tracks: usize,
}

/// Extract one monolithic container into an instrument directory.
///
/// Emits `{semitone}_{velocity}.audio` / `.meta` per zone plus
/// `instrument.meta`, all at the device sample rate.
pub fn extract_monolith(input: &Path, out_dir: &Path) -> Result<ExtractSummary> {
    let reader = BinaryReader::from_file(input)?;

    if reader.u32_at(0)? != MONOLITH_MAGIC {
        return Err(SynthFsError::Format(format!(
            "'{}' is not a monolith; extract the samples to a separate folder instead",
            input.display()
        )));
    }

    let (tracks, search_from) = decode_audio_chunks(&reader)?;
    info!(tracks = tracks.len(), "decoded audio chunks");

    let program = decode_program(&reader, search_from)?;
    info!(name = %program.name, zones = program.zones.len(), "decoded program description");

    fs::create_dir_all(out_dir)?;

    for zone in &program.zones {
        let pcm_data = tracks.get(zone.sample_index).ok_or_else(|| {
            SynthFsError::Validation(format!(
                "zone references sample {} but only {} chunks were found",
                zone.sample_index,
                tracks.len()
            ))
        })?;

        let name = SampleName {
            semitone: zone.root_key,
            velocity: bank::rescale_velocity(zone.high_velocity),
        };

        // Loop markers were authored at the native rate
        let ratio = pcm::DEVICE_SAMPLE_RATE as f64 / zone.sample_rate as f64;
        let meta = match zone.loop_region {
            Some((start, length)) => SampleMeta {
                loop_start: (start as f64 * ratio).round() as u32,
                loop_duration: (length as f64 * ratio).round() as u32,
            },
            None => SampleMeta::default(),
        };

        bank::write_audio(&name.audio_path(out_dir), pcm_data)?;
        bank::write_json(&name.meta_path(out_dir), &meta)?;
    }

    let meta = InstrumentMeta {
        name: program.name.clone(),
        looping: program.looping,
        release: program.release,
        single: true,
        reverb: program.reverb.enabled,
        reverb_pre_delay: program.reverb.pre_delay,
        reverb_room_size: program.reverb.room_size,
        reverb_color: program.reverb.color,
        reverb_filter: program.reverb.filter,
        src: Some(input.display().to_string()),
    };
    bank::write_json(&out_dir.join(bank::INSTRUMENT_META), &meta)?;

    Ok(ExtractSummary {
        name: program.name,
        zones: program.zones.len(),
        tracks: tracks.len(),
    })
}

/// Enumerate and decode every embedded audio chunk, in discovery order.
///
/// Returns the decoded tracks (normalized mono at the device rate) and the
/// offset at which the program-description search starts: the last chunk's
/// declared end.
fn decode_audio_chunks(reader: &BinaryReader) -> Result<(Vec<Vec<i16>>, usize)> {
    let mut tracks = Vec::new();
    let mut offset = 0usize;
    let mut chunk_size = 0usize;

    while let Some(riff) = reader.find(RIFF_SIG, offset + 1) {
        chunk_size = reader.u32_at(riff + 4)? as usize;
        offset = riff;

        let fmt = reader.find(FMT_SIG, riff).ok_or_else(|| {
            SynthFsError::Format(format!("audio chunk at {riff} has no format chunk"))
        })?;
        let channels = reader.u16_at(fmt + 10)? as usize;
        let sample_rate = reader.u32_at(fmt + 12)?;
        let bits = reader.u16_at(fmt + 22)?;
        if channels == 0 || !matches!(bits, 8 | 16 | 24 | 32) {
            return Err(SynthFsError::Format(format!(
                "audio chunk at {riff} declares a degenerate frame layout \
                 ({channels} channels, {bits}-bit)"
            )));
        }
        let bytes_per_sample = (bits / 8) as usize;

        let data = reader.find(DATA_SIG, riff).ok_or_else(|| {
            SynthFsError::Format(format!("audio chunk at {riff} has no payload chunk"))
        })?;
        let data_size = reader.u32_at(data + 4)? as usize;
        let payload = reader.slice(data + 8, data_size)?;

        let mono = decode_interleaved(payload, channels, bytes_per_sample);
        tracks.push(pcm::resample(&mono, sample_rate, pcm::DEVICE_SAMPLE_RATE));
    }

    Ok((tracks, offset + chunk_size))
}

/// Decode interleaved native-depth samples to normalized channel-averaged mono
fn decode_interleaved(payload: &[u8], channels: usize, bytes_per_sample: usize) -> Vec<i16> {
    let bits = bytes_per_sample * 8;
    let frame_size = bytes_per_sample * channels;
    let frames = payload.len() / frame_size;

    let mut mono = Vec::with_capacity(frames);
    for frame in payload.chunks_exact(frame_size).take(frames) {
        let mut sum = 0.0f64;
        for channel in frame.chunks_exact(bytes_per_sample) {
            let mut x = 0i64;
            for (k, &byte) in channel.iter().enumerate() {
                x |= (byte as i64) << (k * 8);
            }
            // Sign-extend from the native bit depth
            x -= (x & (1i64 << (bits - 1))) << 1;
            sum += x as f64;
        }

        sum /= (1i64 << bits) as f64;
        sum /= channels as f64;
        mono.push((sum * 32768.0) as i16);
    }

    mono
}

/// Locate, inflate and decode the program description
fn decode_program(reader: &BinaryReader, search_from: usize) -> Result<ProgramDescription> {
    let sig = reader.find(DEFLATE_SIG, search_from).ok_or_else(|| {
        SynthFsError::Format("no compressed program description found in monolith".into())
    })?;

    let compressed = reader.tail(sig + 3)?;
    let mut xml = Vec::new();
    ZlibDecoder::new(compressed)
        .read_to_end(&mut xml)
        .map_err(|e| SynthFsError::Format(format!("program description inflate failed: {e}")))?;

    ProgramDescription::from_xml(&XmlNode::parse(&xml)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    /// Assemble a minimal monolith: magic, one stereo 24-bit chunk at 48kHz,
    /// filler, then the compressed program description.
    fn synthetic_monolith(xml: &str) -> Vec<u8> {
        let mut out = MONOLITH_MAGIC.to_le_bytes().to_vec();
        out.extend_from_slice(&[0u8; 16]); // preamble filler

        // One embedded audio container: 4 stereo frames, 24-bit, 48kHz
        let mut chunk = Vec::new();
        chunk.extend_from_slice(b"RIFF");
        let body_start = chunk.len();
        chunk.extend_from_slice(&0u32.to_le_bytes()); // size patched below
        chunk.extend_from_slice(b"WAVE");
        chunk.extend_from_slice(b"fmt ");
        chunk.extend_from_slice(&16u32.to_le_bytes());
        chunk.extend_from_slice(&1u16.to_le_bytes()); // PCM
        chunk.extend_from_slice(&2u16.to_le_bytes()); // channels
        chunk.extend_from_slice(&48_000u32.to_le_bytes());
        chunk.extend_from_slice(&(48_000u32 * 6).to_le_bytes()); // byte rate
        chunk.extend_from_slice(&6u16.to_le_bytes()); // frame size
        chunk.extend_from_slice(&24u16.to_le_bytes()); // bits per sample
        chunk.extend_from_slice(b"data");
        let frames: &[[i32; 2]] = &[[0, 0], [1 << 22, 1 << 22], [-(1 << 22), -(1 << 22)], [0, 0]];
        chunk.extend_from_slice(&((frames.len() * 6) as u32).to_le_bytes());
        for frame in frames {
            for sample in frame {
                chunk.extend_from_slice(&sample.to_le_bytes()[..3]);
            }
        }
        let size = (chunk.len() - body_start - 4) as u32;
        chunk[body_start..body_start + 4].copy_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&chunk);

        out.extend_from_slice(&[0xAA; 8]); // inter-chunk filler

        // Level 1 emits the 0x78 0x01 zlib header the signature scan expects
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(xml.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(&compressed[..2], &[0x78, 0x01], "fixture relies on the level-1 zlib header");
        out.extend_from_slice(&DEFLATE_SIG[..3]);
        out.extend_from_slice(&compressed);

        out
    }

    const XML: &str = r#"
        <Lib>
          <Programs>
            <Program name="TestLib-Celesta">
              <Zones>
                <Zone>
                  <Parameters>
                    <V name="rootKey" value="60"/>
                    <V name="highVelocity" value="100"/>
                  </Parameters>
                  <Sample>
                    <V name="uniqueID" value="0"/>
                    <V name="sampleRate" value="48000"/>
                  </Sample>
                </Zone>
              </Zones>
            </Program>
          </Programs>
        </Lib>
    "#;

    #[test]
    fn test_extract_synthetic_monolith() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("test.nki");
        fs::write(&input, synthetic_monolith(XML)).unwrap();

        let out = dir.path().join("celesta");
        let summary = extract_monolith(&input, &out).unwrap();

        assert_eq!(summary.name, "Celesta");
        assert_eq!(summary.tracks, 1);
        assert_eq!(summary.zones, 1);

        // Velocity 100 rescales to 201
        assert!(out.join("60_201.audio").exists());
        assert!(out.join("60_201.meta").exists());

        let meta: InstrumentMeta = bank::read_json(&out.join(bank::INSTRUMENT_META)).unwrap();
        assert_eq!(meta.name, "Celesta");
        assert!(!meta.looping);
        assert!(meta.single);

        let samples = bank::read_audio(&out.join("60_201.audio")).unwrap();
        assert_eq!(samples.len(), 4);
    }

    #[test]
    fn test_bad_magic_is_format_error() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("plain.wav");
        fs::write(&input, [0u8; 64]).unwrap();

        let result = extract_monolith(&input, &dir.path().join("out"));
        assert!(matches!(result, Err(SynthFsError::Format(_))));
    }

    #[test]
    fn test_missing_program_block_fails_before_zone_files() {
        let dir = tempdir().unwrap();
        let mut data = synthetic_monolith(XML);
        // Corrupt the compressed-stream signature
        let sig_at = data
            .windows(3)
            .rposition(|w| w == &DEFLATE_SIG[..3])
            .unwrap();
        data[sig_at] ^= 0xFF;

        let input = dir.path().join("test.nki");
        fs::write(&input, data).unwrap();

        let out = dir.path().join("out");
        let result = extract_monolith(&input, &out);
        assert!(matches!(result, Err(SynthFsError::Format(_))));
        assert!(!out.join("60_201.audio").exists());
    }

    #[test]
    fn test_oversized_bit_depth_is_format_error() {
        let dir = tempdir().unwrap();
        let mut data = synthetic_monolith(XML);
        // Rewrite the format chunk to declare 128-bit samples
        let fmt = data.windows(4).position(|w| w == FMT_SIG).unwrap();
        data[fmt + 22..fmt + 24].copy_from_slice(&128u16.to_le_bytes());

        let input = dir.path().join("test.nki");
        fs::write(&input, data).unwrap();

        let result = extract_monolith(&input, &dir.path().join("out"));
        assert!(matches!(result, Err(SynthFsError::Format(_))));
    }

    #[test]
    fn test_decode_interleaved_averages_channels() {
        // Two 16-bit channels: +8192 and -8192 average to silence
        let mut payload = Vec::new();
        payload.extend_from_slice(&8192i16.to_le_bytes());
        payload.extend_from_slice(&(-8192i16).to_le_bytes());

        let mono = decode_interleaved(&payload, 2, 2);
        assert_eq!(mono, vec![0]);
    }

    #[test]
    fn test_decode_interleaved_sign_extends() {
        // Single 8-bit channel: 0x80 is -128, normalized to -32768/2 = -16384
        let mono = decode_interleaved(&[0x80], 1, 1);
        assert_eq!(mono, vec![-16384]);
    }
}

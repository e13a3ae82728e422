//! Flat image builder
//!
//! Packs a root directory of per-instrument folders into the single
//! block-addressed binary image the sampler firmware mounts directly. Seven
//! sections are emitted in a fixed order, each zero-padded to the next block
//! boundary; the fixed-size header lands in block 0 once every section start
//! is known:
//!
//! 1. hold-behavior table
//! 2. PCM data pool (each recording padded individually)
//! 3. string offset table
//! 4. string data
//! 5. instrument descriptor table
//! 6. sample descriptor table
//! 7. proximity tables
//!
//! Any failure aborts the whole build; already-written bytes are not rolled
//! back, the output is simply regenerated on the next run.

pub mod hold;
pub mod layout;

use crate::bank::{self, InstrumentMeta, SampleMeta, SampleName};
use crate::reader::BinaryReader;
use crate::{pcm, proximity, Result, SynthFsError};
use self::layout::{
    HoldBehavior, ImageHeader, InstrumentDescriptor, ProximityEntry, ProximityTable,
    SampleDescriptor, SoundType, BLOCK_SIZE, INVALID_INSTRUMENT_ID,
};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Window of the start/end average-amplitude hints, in samples
const AMPLITUDE_WINDOW: usize = 10_000;

/// Format-chunk signature inside an `.audio` file
const FMT_SIG: &[u8] = b"fmt ";
/// Payload-start signature inside an `.audio` file
const DATA_SIG: &[u8] = b"data";

/// What one image build produced
#[derive(Debug, Clone)]
pub struct ImageSummary {
    /// The header as written into block 0
    pub header: ImageHeader,
    /// Total pooled recordings
    pub samples: usize,
    /// Final image size in bytes
    pub bytes_written: u64,
}

struct Discovered {
    path: PathBuf,
    string_id: String,
    meta: InstrumentMeta,
    /// Semitone → velocities, present for single-sample instruments only
    recorded: Option<BTreeMap<u8, Vec<u8>>>,
}

struct PackedSample {
    descriptor: SampleDescriptor,
    payload: Vec<u8>,
}

/// Build the image for every instrument under `instruments_dir`.
pub fn write_image(instruments_dir: &Path, output: &Path) -> Result<ImageSummary> {
    let discovered = discover(instruments_dir)?;

    let id_by_name: BTreeMap<String, u16> = discovered
        .iter()
        .enumerate()
        .map(|(id, d)| (d.string_id.clone(), id as u16))
        .collect();

    let singles: Vec<&Discovered> = discovered.iter().filter(|d| d.recorded.is_some()).collect();
    let single_ids: Vec<String> = singles.iter().map(|d| d.string_id.clone()).collect();

    // One enumeration pass assigns every (instrument, semitone, velocity)
    // triple its stable global pool index
    let mut names = Vec::new();
    let mut instruments = Vec::new();
    let mut samples: Vec<PackedSample> = Vec::new();
    let mut tables = Vec::new();

    for instrument in &singles {
        if let Some(recorded) = &instrument.recorded {
            pack_instrument(
                instrument,
                recorded,
                samples.len() as u32,
                &mut names,
                &mut instruments,
                &mut samples,
                &mut tables,
            )?;
        }
    }

    let hold_config = bank::load_hold_config(&instruments_dir.join(bank::HOLD_CONFIG))?;
    let (hold_rows, hold_stride) =
        hold::resolve_hold_rows(hold_config.as_deref(), &id_by_name, &single_ids)?;
    info!(stride = hold_stride, "resolved hold behaviors");

    let header = serialize(
        output,
        &discovered,
        names,
        instruments,
        &mut samples,
        tables,
        hold_rows,
    )?;

    let bytes_written = fs::metadata(output)?.len();
    info!(
        image = %output.display(),
        size = %human_bytes(bytes_written),
        instruments = header.instrument_count,
        "image written"
    );

    Ok(ImageSummary {
        header,
        samples: samples.len(),
        bytes_written,
    })
}

/// Enumerate instrument directories in name order, assigning stable ids
fn discover(instruments_dir: &Path) -> Result<Vec<Discovered>> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(instruments_dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    if dirs.len() >= INVALID_INSTRUMENT_ID as usize {
        return Err(SynthFsError::Validation(format!(
            "{} instruments exceed the addressable limit",
            dirs.len()
        )));
    }

    let mut discovered = Vec::with_capacity(dirs.len());
    for path in dirs {
        let string_id = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let meta_path = path.join(bank::INSTRUMENT_META);
        if !meta_path.exists() {
            return Err(SynthFsError::Config(format!(
                "'{}' has no {}",
                path.display(),
                bank::INSTRUMENT_META
            )));
        }
        let meta: InstrumentMeta = bank::read_json(&meta_path)?;

        let recorded = if meta.single {
            Some(bank::scan_samples(&path)?)
        } else {
            None
        };

        info!(instrument = %string_id, single = meta.single, "discovered instrument");
        discovered.push(Discovered {
            path,
            string_id,
            meta,
            recorded,
        });
    }

    Ok(discovered)
}

#[allow(clippy::too_many_arguments)]
fn pack_instrument(
    instrument: &Discovered,
    recorded: &BTreeMap<u8, Vec<u8>>,
    sample_idx_origin: u32,
    names: &mut Vec<String>,
    instruments: &mut Vec<InstrumentDescriptor>,
    samples: &mut Vec<PackedSample>,
    tables: &mut Vec<ProximityTable>,
) -> Result<()> {
    if recorded.is_empty() {
        return Err(SynthFsError::Validation(format!(
            "'{}' has no samples to pack",
            instrument.path.display()
        )));
    }

    let mut sound_type = SoundType::ATTACK;
    if instrument.meta.looping {
        sound_type |= SoundType::LOOP;
    }

    // Velocities are already unique and ascending per bucket; the BTreeMap
    // fixes the semitone order, so enumeration order is reproducible
    let order: Vec<SampleName> = recorded
        .iter()
        .flat_map(|(&semitone, velocities)| {
            velocities
                .iter()
                .map(move |&velocity| SampleName { semitone, velocity })
        })
        .collect();
    let local_index: BTreeMap<SampleName, usize> = order
        .iter()
        .enumerate()
        .map(|(idx, name)| (*name, idx))
        .collect();

    let rows = proximity::resolve(recorded)
        .into_iter()
        .map(|row| {
            row.velocities
                .iter()
                .map(|&velocity| {
                    let name = SampleName {
                        semitone: row.semitone,
                        velocity,
                    };
                    let local = local_index[&name];
                    Ok(ProximityEntry {
                        velocity,
                        sample_idx: u16::try_from(local).map_err(|_| {
                            SynthFsError::Validation(format!(
                                "'{}' has too many samples for local addressing",
                                instrument.path.display()
                            ))
                        })?,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    tables.push(ProximityTable {
        sample_idx_origin,
        rows,
    });

    let mut block_cursor = samples
        .iter()
        .map(|s| layout::blocks(s.payload.len()))
        .sum::<u32>();

    for name in &order {
        let packed = pack_sample(instrument, *name, sound_type, block_cursor)?;
        block_cursor += layout::blocks(packed.payload.len());
        samples.push(packed);
    }

    let note_range_start = *recorded.keys().next().unwrap_or(&0);
    let note_range_end = *recorded.keys().next_back().unwrap_or(&0);

    instruments.push(InstrumentDescriptor {
        name_index: names.len() as u16,
        sound_type,
        note_range_start,
        note_range_end,
        release: instrument.meta.release,
    });
    names.push(instrument.meta.name.clone());

    info!(
        instrument = %instrument.string_id,
        samples = order.len(),
        "packed instrument"
    );

    Ok(())
}

/// Read one recording, validate its rate and lift out the raw payload
fn pack_sample(
    instrument: &Discovered,
    name: SampleName,
    sound_type: SoundType,
    block_offset: u32,
) -> Result<PackedSample> {
    let audio_path = name.audio_path(&instrument.path);
    let reader = BinaryReader::from_file(&audio_path)?;

    let fmt = reader.find(FMT_SIG, 0).ok_or_else(|| {
        SynthFsError::Format(format!("'{}' has no format chunk", audio_path.display()))
    })?;
    let sample_rate = reader.u32_at(fmt + 12)?;
    if sample_rate != pcm::DEVICE_SAMPLE_RATE {
        return Err(SynthFsError::Validation(format!(
            "'{}' is {} Hz, device expects {} Hz",
            audio_path.display(),
            sample_rate,
            pcm::DEVICE_SAMPLE_RATE
        )));
    }

    let data = reader.find(DATA_SIG, 0).ok_or_else(|| {
        SynthFsError::Format(format!("'{}' has no payload chunk", audio_path.display()))
    })?;
    let data_size = reader.u32_at(data + 4)? as usize;
    let payload = reader.slice(data + 8, data_size)?.to_vec();
    let pcm_length_samples = (data_size / 2) as u32;

    // Loop markers only matter for sustained instruments
    let (loop_start, loop_duration) = if sound_type.contains(SoundType::LOOP) {
        let meta: SampleMeta = bank::read_json(&name.meta_path(&instrument.path))?;
        (meta.loop_start, meta.loop_duration)
    } else {
        (0, 0)
    };

    let (start_avg_amplitude, end_avg_amplitude) = amplitude_hints(&payload);

    Ok(PackedSample {
        descriptor: SampleDescriptor {
            pcm_length_samples,
            pcm_block_offset: block_offset,
            loop_start,
            loop_duration,
            velocity: name.velocity,
            semitone: name.semitone,
            start_avg_amplitude,
            end_avg_amplitude,
        },
        payload,
    })
}

/// Mean of the first and last `min(10000, length/2 - 1)` 16-bit words.
///
/// The playback engine uses these as fade anchors. Words are read unsigned,
/// matching the device's fade comparator.
fn amplitude_hints(payload: &[u8]) -> (u16, u16) {
    let words: Vec<u16> = payload
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    let window = AMPLITUDE_WINDOW.min((words.len() / 2).saturating_sub(1));
    if window == 0 {
        return (0, 0);
    }

    let start: u32 = words[..window].iter().map(|&w| w as u32).sum();
    let end: u32 = words[words.len() - window..].iter().map(|&w| w as u32).sum();

    ((start / window as u32) as u16, (end / window as u32) as u16)
}

fn human_bytes(bytes: u64) -> String {
    const SUFFIX: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SUFFIX.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, SUFFIX[unit])
}

/// Pad the stream with zeros to the next block boundary
fn pad_to_block<W: Write + Seek>(writer: &mut W) -> Result<()> {
    let pos = writer.stream_position()? as usize;
    let padding = layout::block_padding(pos);
    if padding > 0 {
        writer.write_all(&vec![0u8; padding])?;
    }
    Ok(())
}

/// Current block number; only meaningful at a block boundary
fn block_position<W: Write + Seek>(writer: &mut W) -> Result<u32> {
    Ok((writer.stream_position()? as usize / BLOCK_SIZE) as u32)
}

#[allow(clippy::too_many_arguments)]
fn serialize(
    output: &Path,
    discovered: &[Discovered],
    names: Vec<String>,
    instruments: Vec<InstrumentDescriptor>,
    samples: &mut [PackedSample],
    tables: Vec<ProximityTable>,
    hold_rows: Vec<Vec<HoldBehavior>>,
) -> Result<ImageHeader> {
    let single_count = instruments.len() as u32;
    let total_count = discovered.len() as u32;

    let mut header = ImageHeader {
        instrument_count: total_count,
        single_instrument_count: single_count,
        multi_instrument_count: total_count - single_count,
        ..ImageHeader::default()
    };

    let mut writer = BufWriter::new(fs::File::create(output)?);

    // Block 0 is the header, written last
    writer.seek(SeekFrom::Start(BLOCK_SIZE as u64))?;

    header.hold_block_start = block_position(&mut writer)?;
    let mut section_bytes = 0usize;
    for row in &hold_rows {
        for behavior in row {
            writer.write_all(&behavior.encode())?;
            section_bytes += layout::HOLD_BEHAVIOR_SIZE;
        }
    }
    pad_to_block(&mut writer)?;
    info!(bytes = %human_bytes(section_bytes as u64), "wrote hold behavior data");

    header.pcm_block_start = block_position(&mut writer)?;
    // Pool offsets were assigned relative to the pool start; relocate them
    // now that the section's block number is known
    for sample in samples.iter_mut() {
        sample.descriptor.pcm_block_offset += header.pcm_block_start;
    }
    section_bytes = 0;
    for sample in samples.iter() {
        writer.write_all(&sample.payload)?;
        pad_to_block(&mut writer)?;
        section_bytes += sample.payload.len();
    }
    info!(bytes = %human_bytes(section_bytes as u64), "wrote PCM data");

    header.string_lut_block_start = block_position(&mut writer)?;
    let mut offset = 0u32;
    for name in &names {
        writer.write_all(&offset.to_le_bytes())?;
        offset += name.len() as u32 + 1;
    }
    pad_to_block(&mut writer)?;
    info!(bytes = %human_bytes((names.len() * 4) as u64), "wrote string LUT data");

    header.string_data_block_start = block_position(&mut writer)?;
    for name in &names {
        writer.write_all(name.as_bytes())?;
        writer.write_all(&[0u8])?;
    }
    pad_to_block(&mut writer)?;
    info!(bytes = %human_bytes(offset as u64), "wrote string data");

    header.instrument_block_start = block_position(&mut writer)?;
    for instrument in &instruments {
        writer.write_all(&instrument.encode())?;
    }
    pad_to_block(&mut writer)?;
    info!(
        bytes = %human_bytes((instruments.len() * layout::INSTRUMENT_DESC_SIZE) as u64),
        "wrote instrument info data"
    );

    header.sample_block_start = block_position(&mut writer)?;
    for sample in samples.iter() {
        writer.write_all(&sample.descriptor.encode())?;
    }
    pad_to_block(&mut writer)?;
    info!(
        bytes = %human_bytes((samples.len() * layout::SAMPLE_DESC_SIZE) as u64),
        "wrote sample info data"
    );

    header.proximity_block_start = block_position(&mut writer)?;
    for table in &tables {
        writer.write_all(&table.encode()?)?;
    }
    pad_to_block(&mut writer)?;
    info!(
        bytes = %human_bytes((tables.len() * layout::PROXIMITY_TABLE_SIZE) as u64),
        "wrote proximity tables"
    );

    writer.seek(SeekFrom::Start(0))?;
    writer.write_all(&header.encode())?;
    writer.flush()?;

    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_instrument(
        root: &Path,
        dir_name: &str,
        display_name: &str,
        looping: bool,
        samples: &[(u8, u8, usize)],
    ) {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).unwrap();
        for &(semitone, velocity, len) in samples {
            let name = SampleName { semitone, velocity };
            let data: Vec<i16> = (0..len).map(|i| (i % 97) as i16 * 128).collect();
            bank::write_audio(&name.audio_path(&dir), &data).unwrap();
            bank::write_json(
                &name.meta_path(&dir),
                &SampleMeta {
                    loop_start: 10,
                    loop_duration: 100,
                },
            )
            .unwrap();
        }
        bank::write_json(
            &dir.join(bank::INSTRUMENT_META),
            &InstrumentMeta {
                name: display_name.to_string(),
                looping,
                release: 36000,
                single: true,
                reverb: false,
                reverb_pre_delay: 0.0,
                reverb_room_size: 0.0,
                reverb_color: 0.0,
                reverb_filter: 0.0,
                src: None,
            },
        )
        .unwrap();
    }

    fn write_multi_instrument(root: &Path, dir_name: &str) {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(bank::INSTRUMENT_META),
            r#"{"name": "Kit", "looping": false, "release": 36000, "single": false}"#,
        )
        .unwrap();
    }

    fn build_test_bank(root: &Path) {
        write_instrument(
            root,
            "piano-grand",
            "Grand",
            true,
            &[(40, 129, 600), (40, 255, 600), (52, 255, 700)],
        );
        write_instrument(root, "piano-soft", "Soft", false, &[(60, 255, 500)]);
        write_multi_instrument(root, "multi-kit");
        fs::write(
            root.join(bank::HOLD_CONFIG),
            r#"{
                "piano.*": [{"triggerTime": 1.0, "maxTriggerTime": 2.0, "transitionTime": 0.5, "instrument": "piano-soft"}],
                "piano-soft": [{"triggerTime": 9.0, "maxTriggerTime": 9.5, "transitionTime": 0.1, "instrument": "piano-soft"}]
            }"#,
        )
        .unwrap();
    }

    #[test]
    fn test_image_layout_and_counts() {
        let dir = tempdir().unwrap();
        build_test_bank(dir.path());
        let image_path = dir.path().join("synth.bin");

        let summary = write_image(dir.path(), &image_path).unwrap();
        assert_eq!(summary.header.instrument_count, 3);
        assert_eq!(summary.header.single_instrument_count, 2);
        assert_eq!(summary.header.multi_instrument_count, 1);
        assert_eq!(summary.samples, 4);

        let data = fs::read(&image_path).unwrap();
        let header = ImageHeader::decode(&data).unwrap();
        assert_eq!(header, summary.header);

        // Section starts are strictly increasing and the image starts at block 1
        let starts = header.section_starts();
        assert_eq!(starts[0], 1);
        for pair in starts.windows(2) {
            assert!(pair[0] < pair[1], "section starts must increase: {starts:?}");
        }

        // Final size is the last section's end rounded up to the block size
        assert_eq!(data.len() % BLOCK_SIZE, 0);
        let proximity_bytes = 2 * layout::PROXIMITY_TABLE_SIZE;
        let expected_end =
            (header.proximity_block_start as usize) * BLOCK_SIZE + proximity_bytes;
        assert_eq!(data.len(), expected_end + layout::block_padding(expected_end));
        assert_eq!(summary.bytes_written as usize, data.len());
    }

    #[test]
    fn test_proximity_tables_cover_key_range_and_resolve() {
        let dir = tempdir().unwrap();
        build_test_bank(dir.path());
        let image_path = dir.path().join("synth.bin");
        let summary = write_image(dir.path(), &image_path).unwrap();

        let data = fs::read(&image_path).unwrap();
        let header = summary.header;
        let table_base = header.proximity_block_start as usize * BLOCK_SIZE;

        for table_idx in 0..header.single_instrument_count as usize {
            let at = table_base + table_idx * layout::PROXIMITY_TABLE_SIZE;
            let table = ProximityTable::decode(&data[at..]).unwrap();
            assert_eq!(table.rows.len(), proximity::KEY_COUNT);
            for row in &table.rows {
                assert!(!row.is_empty(), "every key row must be non-empty");
                for entry in row {
                    let global = table.sample_idx_origin as usize + entry.sample_idx as usize;
                    assert!(global < summary.samples);
                }
            }
        }

        // Second instrument's origin sits after the first's three samples
        let second = ProximityTable::decode(
            &data[table_base + layout::PROXIMITY_TABLE_SIZE..],
        )
        .unwrap();
        assert_eq!(second.sample_idx_origin, 3);
    }

    #[test]
    fn test_sample_descriptors_point_at_payloads() {
        let dir = tempdir().unwrap();
        build_test_bank(dir.path());
        let image_path = dir.path().join("synth.bin");
        let summary = write_image(dir.path(), &image_path).unwrap();

        let data = fs::read(&image_path).unwrap();
        let desc_base = summary.header.sample_block_start as usize * BLOCK_SIZE;

        // First pooled sample: piano-grand 40_129, 600 samples, looping
        let desc = SampleDescriptor::decode(&data[desc_base..]).unwrap();
        assert_eq!(desc.semitone, 40);
        assert_eq!(desc.velocity, 129);
        assert_eq!(desc.pcm_length_samples, 600);
        assert_eq!(desc.loop_start, 10);
        assert_eq!(desc.loop_duration, 100);
        assert_eq!(desc.pcm_block_offset, summary.header.pcm_block_start);

        let payload_at = desc.pcm_block_offset as usize * BLOCK_SIZE;
        let expected: Vec<i16> = (0..600).map(|i| (i % 97) as i16 * 128).collect();
        let actual: Vec<i16> = data[payload_at..payload_at + 1200]
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(actual, expected);

        // Last pooled sample belongs to piano-soft and is attack-only
        let last_at = desc_base + 3 * layout::SAMPLE_DESC_SIZE;
        let last = SampleDescriptor::decode(&data[last_at..]).unwrap();
        assert_eq!(last.semitone, 60);
        assert_eq!(last.loop_start, 0);
        assert_eq!(last.loop_duration, 0);
    }

    #[test]
    fn test_instrument_descriptors_and_strings() {
        let dir = tempdir().unwrap();
        build_test_bank(dir.path());
        let image_path = dir.path().join("synth.bin");
        let summary = write_image(dir.path(), &image_path).unwrap();

        let data = fs::read(&image_path).unwrap();
        let header = summary.header;

        let desc_base = header.instrument_block_start as usize * BLOCK_SIZE;
        let grand = InstrumentDescriptor::decode(&data[desc_base..]).unwrap();
        assert_eq!(grand.sound_type, SoundType::ATTACK | SoundType::LOOP);
        assert_eq!(grand.note_range_start, 40);
        assert_eq!(grand.note_range_end, 52);
        assert_eq!(grand.release, 36000);

        let soft =
            InstrumentDescriptor::decode(&data[desc_base + layout::INSTRUMENT_DESC_SIZE..])
                .unwrap();
        assert_eq!(soft.sound_type, SoundType::ATTACK);

        // Resolve both names through the string LUT
        let lut_base = header.string_lut_block_start as usize * BLOCK_SIZE;
        let str_base = header.string_data_block_start as usize * BLOCK_SIZE;
        let read_name = |index: u16| {
            let at = lut_base + index as usize * 4;
            let offset =
                u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]) as usize;
            let bytes: Vec<u8> = data[str_base + offset..]
                .iter()
                .take_while(|&&b| b != 0)
                .copied()
                .collect();
            String::from_utf8(bytes).unwrap()
        };
        assert_eq!(read_name(grand.name_index), "Grand");
        assert_eq!(read_name(soft.name_index), "Soft");
    }

    #[test]
    fn test_hold_rows_apply_explicit_override() {
        let dir = tempdir().unwrap();
        build_test_bank(dir.path());
        let image_path = dir.path().join("synth.bin");
        let summary = write_image(dir.path(), &image_path).unwrap();

        let data = fs::read(&image_path).unwrap();
        let base = summary.header.hold_block_start as usize * BLOCK_SIZE;
        let stride = 2; // one resolved rule at most, plus the invalid prefix

        // Instrument ids in sorted order: multi-kit=0, piano-grand=1, piano-soft=2.
        // Hold rows cover singles only: row 0 = piano-grand, row 1 = piano-soft.
        let grand_rule = HoldBehavior::decode(
            &data[base + layout::HOLD_BEHAVIOR_SIZE..],
        )
        .unwrap();
        assert_eq!(grand_rule.trigger_time, 1.0);
        assert_eq!(grand_rule.instrument_id, 2);

        let soft_row = base + stride * layout::HOLD_BEHAVIOR_SIZE;
        let soft_prefix = HoldBehavior::decode(&data[soft_row..]).unwrap();
        assert_eq!(soft_prefix.instrument_id, INVALID_INSTRUMENT_ID);
        let soft_rule =
            HoldBehavior::decode(&data[soft_row + layout::HOLD_BEHAVIOR_SIZE..]).unwrap();
        assert_eq!(soft_rule.trigger_time, 9.0);
    }

    #[test]
    fn test_sample_rate_mismatch_aborts_build() {
        let dir = tempdir().unwrap();
        let inst = dir.path().join("violin");
        fs::create_dir_all(&inst).unwrap();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(inst.join("40_129.audio"), spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        bank::write_json(
            &inst.join("40_129.meta"),
            &SampleMeta::default(),
        )
        .unwrap();
        fs::write(
            inst.join(bank::INSTRUMENT_META),
            r#"{"name": "Violin", "looping": false, "release": 36000}"#,
        )
        .unwrap();

        let result = write_image(dir.path(), &dir.path().join("synth.bin"));
        assert!(matches!(result, Err(SynthFsError::Validation(_))));
    }

    #[test]
    fn test_missing_instrument_meta_is_config_error() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nameless")).unwrap();

        let result = write_image(dir.path(), &dir.path().join("synth.bin"));
        assert!(matches!(result, Err(SynthFsError::Config(_))));
    }

    #[test]
    fn test_amplitude_hints_windows() {
        // 8 words: window = min(10000, 4 - 1) = 3
        let words: Vec<u16> = vec![100, 200, 300, 0, 0, 30, 20, 10];
        let payload: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let (start, end) = amplitude_hints(&payload);
        assert_eq!(start, 200);
        assert_eq!(end, 20);

        // Degenerate payloads produce zero hints instead of dividing by zero
        assert_eq!(amplitude_hints(&[]), (0, 0));
        assert_eq!(amplitude_hints(&[1, 0, 2, 0]), (0, 0));
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512.00 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}

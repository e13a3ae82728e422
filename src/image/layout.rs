//! Fixed-width record codecs for the image binary layout
//!
//! Every on-image record is encoded and decoded through explicit byte-buffer
//! routines with documented field widths; nothing is ever reinterpreted
//! through raw memory. All multi-byte fields are little-endian. Section
//! offsets in the header are block units.

use crate::proximity::KEY_COUNT;
use crate::{Result, SynthFsError};

/// Alignment unit addressing every section of the image
pub const BLOCK_SIZE: usize = 512;
/// Leading magic value of the image (`"!SFS"` on disk)
pub const SFS_MAGIC: u32 = 0x5346_5321;
/// Velocity layers one key row can address
pub const MAX_VELOCITY_SLOTS: usize = 8;
/// Instrument id marking an invalid / no-op hold entry
pub const INVALID_INSTRUMENT_ID: u16 = 0xFFFF;

/// Encoded header size in bytes
pub const HEADER_SIZE: usize = 44;
/// Encoded hold-behavior entry size in bytes
pub const HOLD_BEHAVIOR_SIZE: usize = 14;
/// Encoded sample descriptor size in bytes
pub const SAMPLE_DESC_SIZE: usize = 22;
/// Encoded instrument descriptor size in bytes
pub const INSTRUMENT_DESC_SIZE: usize = 9;
/// Encoded proximity table size in bytes
pub const PROXIMITY_TABLE_SIZE: usize = 4 + KEY_COUNT * MAX_VELOCITY_SLOTS * 3;

/// Bytes needed to pad `len` to the next block boundary (0 when aligned)
pub fn block_padding(len: usize) -> usize {
    match len % BLOCK_SIZE {
        0 => 0,
        rem => BLOCK_SIZE - rem,
    }
}

/// Number of blocks covering `len` bytes
pub fn blocks(len: usize) -> u32 {
    ((len + BLOCK_SIZE - 1) / BLOCK_SIZE) as u32
}

bitflags::bitflags! {
    /// Instrument sound-type flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SoundType: u8 {
        /// Attack-only playback
        const ATTACK = 0b01;
        /// Sustained loop playback
        const LOOP = 0b10;
    }
}

fn checked<'a>(buf: &'a [u8], len: usize, what: &str) -> Result<&'a [u8]> {
    if buf.len() < len {
        return Err(SynthFsError::Format(format!(
            "{what} record truncated: {} of {} bytes",
            buf.len(),
            len
        )));
    }
    Ok(&buf[..len])
}

fn u16_at(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn u32_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn f32_at(buf: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Image header, written last into block 0.
///
/// Layout: `magic u32`, seven section-start block numbers `u32` in section
/// order, then three `u32` instrument counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageHeader {
    /// Start block of the hold-behavior table
    pub hold_block_start: u32,
    /// Start block of the PCM data pool
    pub pcm_block_start: u32,
    /// Start block of the string offset table
    pub string_lut_block_start: u32,
    /// Start block of the string data
    pub string_data_block_start: u32,
    /// Start block of the instrument descriptor table
    pub instrument_block_start: u32,
    /// Start block of the sample descriptor table
    pub sample_block_start: u32,
    /// Start block of the proximity tables
    pub proximity_block_start: u32,
    /// Total number of instruments discovered
    pub instrument_count: u32,
    /// Instruments packed into the image
    pub single_instrument_count: u32,
    /// Instruments counted but never serialized
    pub multi_instrument_count: u32,
}

impl ImageHeader {
    /// Encode to the on-image representation
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let fields = [
            SFS_MAGIC,
            self.hold_block_start,
            self.pcm_block_start,
            self.string_lut_block_start,
            self.string_data_block_start,
            self.instrument_block_start,
            self.sample_block_start,
            self.proximity_block_start,
            self.instrument_count,
            self.single_instrument_count,
            self.multi_instrument_count,
        ];
        for (i, field) in fields.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&field.to_le_bytes());
        }
        out
    }

    /// Decode from the first image block, validating the magic
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf = checked(buf, HEADER_SIZE, "header")?;
        if u32_at(buf, 0) != SFS_MAGIC {
            return Err(SynthFsError::Format("bad image magic".into()));
        }
        Ok(Self {
            hold_block_start: u32_at(buf, 4),
            pcm_block_start: u32_at(buf, 8),
            string_lut_block_start: u32_at(buf, 12),
            string_data_block_start: u32_at(buf, 16),
            instrument_block_start: u32_at(buf, 20),
            sample_block_start: u32_at(buf, 24),
            proximity_block_start: u32_at(buf, 28),
            instrument_count: u32_at(buf, 32),
            single_instrument_count: u32_at(buf, 36),
            multi_instrument_count: u32_at(buf, 40),
        })
    }

    /// Section starts in serialization order
    pub fn section_starts(&self) -> [u32; 7] {
        [
            self.hold_block_start,
            self.pcm_block_start,
            self.string_lut_block_start,
            self.string_data_block_start,
            self.instrument_block_start,
            self.sample_block_start,
            self.proximity_block_start,
        ]
    }
}

/// One timed transition into another instrument's sound.
///
/// Layout: `trigger_time f32` @0, `max_trigger_time f32` @4,
/// `transition_time f32` @8, `instrument_id u16` @12.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldBehavior {
    /// Minimum key-hold time before the transition triggers
    pub trigger_time: f32,
    /// Upper bound of the trigger window
    pub max_trigger_time: f32,
    /// Crossfade time into the target instrument
    pub transition_time: f32,
    /// Numeric id of the target instrument
    pub instrument_id: u16,
}

impl HoldBehavior {
    /// The invalid / no-op entry used for row prefixes and padding
    pub fn invalid() -> Self {
        Self {
            trigger_time: 0.0,
            max_trigger_time: 0.0,
            transition_time: 0.0,
            instrument_id: INVALID_INSTRUMENT_ID,
        }
    }

    /// Encode to the on-image representation
    pub fn encode(&self) -> [u8; HOLD_BEHAVIOR_SIZE] {
        let mut out = [0u8; HOLD_BEHAVIOR_SIZE];
        out[0..4].copy_from_slice(&self.trigger_time.to_le_bytes());
        out[4..8].copy_from_slice(&self.max_trigger_time.to_le_bytes());
        out[8..12].copy_from_slice(&self.transition_time.to_le_bytes());
        out[12..14].copy_from_slice(&self.instrument_id.to_le_bytes());
        out
    }

    /// Decode from the on-image representation
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf = checked(buf, HOLD_BEHAVIOR_SIZE, "hold behavior")?;
        Ok(Self {
            trigger_time: f32_at(buf, 0),
            max_trigger_time: f32_at(buf, 4),
            transition_time: f32_at(buf, 8),
            instrument_id: u16_at(buf, 12),
        })
    }
}

/// Flat descriptor of one pooled recording.
///
/// Layout: `pcm_length_samples u32` @0, `pcm_block_offset u32` @4 (absolute
/// block number), `loop_start u32` @8, `loop_duration u32` @12, `velocity u8`
/// @16, `semitone u8` @17, `start_avg_amplitude u16` @18,
/// `end_avg_amplitude u16` @20.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleDescriptor {
    /// Recording length in 16-bit samples
    pub pcm_length_samples: u32,
    /// Block number where the PCM payload starts
    pub pcm_block_offset: u32,
    /// First sample of the loop region
    pub loop_start: u32,
    /// Loop region length (0 = no loop)
    pub loop_duration: u32,
    /// Velocity layer of the recording
    pub velocity: u8,
    /// Root semitone of the recording
    pub semitone: u8,
    /// Mean amplitude of the leading fade window
    pub start_avg_amplitude: u16,
    /// Mean amplitude of the trailing fade window
    pub end_avg_amplitude: u16,
}

impl SampleDescriptor {
    /// Encode to the on-image representation
    pub fn encode(&self) -> [u8; SAMPLE_DESC_SIZE] {
        let mut out = [0u8; SAMPLE_DESC_SIZE];
        out[0..4].copy_from_slice(&self.pcm_length_samples.to_le_bytes());
        out[4..8].copy_from_slice(&self.pcm_block_offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.loop_start.to_le_bytes());
        out[12..16].copy_from_slice(&self.loop_duration.to_le_bytes());
        out[16] = self.velocity;
        out[17] = self.semitone;
        out[18..20].copy_from_slice(&self.start_avg_amplitude.to_le_bytes());
        out[20..22].copy_from_slice(&self.end_avg_amplitude.to_le_bytes());
        out
    }

    /// Decode from the on-image representation
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf = checked(buf, SAMPLE_DESC_SIZE, "sample descriptor")?;
        Ok(Self {
            pcm_length_samples: u32_at(buf, 0),
            pcm_block_offset: u32_at(buf, 4),
            loop_start: u32_at(buf, 8),
            loop_duration: u32_at(buf, 12),
            velocity: buf[16],
            semitone: buf[17],
            start_avg_amplitude: u16_at(buf, 18),
            end_avg_amplitude: u16_at(buf, 20),
        })
    }
}

/// Descriptor of one packed instrument.
///
/// Layout: `name_index u16` @0, `sound_type u8` @2, `note_range_start u8` @3,
/// `note_range_end u8` @4, `release u32` @5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentDescriptor {
    /// Index into the string offset table
    pub name_index: u16,
    /// Sound-type flags
    pub sound_type: SoundType,
    /// Lowest recorded semitone
    pub note_range_start: u8,
    /// Highest recorded semitone
    pub note_range_end: u8,
    /// Release time in device samples
    pub release: u32,
}

impl InstrumentDescriptor {
    /// Encode to the on-image representation
    pub fn encode(&self) -> [u8; INSTRUMENT_DESC_SIZE] {
        let mut out = [0u8; INSTRUMENT_DESC_SIZE];
        out[0..2].copy_from_slice(&self.name_index.to_le_bytes());
        out[2] = self.sound_type.bits();
        out[3] = self.note_range_start;
        out[4] = self.note_range_end;
        out[5..9].copy_from_slice(&self.release.to_le_bytes());
        out
    }

    /// Decode from the on-image representation
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf = checked(buf, INSTRUMENT_DESC_SIZE, "instrument descriptor")?;
        Ok(Self {
            name_index: u16_at(buf, 0),
            sound_type: SoundType::from_bits_truncate(buf[2]),
            note_range_start: buf[3],
            note_range_end: buf[4],
            release: u32_at(buf, 5),
        })
    }
}

/// One velocity slot of a proximity key row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityEntry {
    /// Velocity layer this slot answers for
    pub velocity: u8,
    /// Sample index relative to the owning table's origin
    pub sample_idx: u16,
}

/// Per-instrument key table resolving any playable key to its sample set.
///
/// Layout: `sample_idx_origin u32` @0, then 61 key rows of 8 slots, each slot
/// `velocity u8` + `sample_idx u16`. Unused slots are zeroed; a zero velocity
/// terminates the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProximityTable {
    /// Global index of the owning instrument's first pooled sample
    pub sample_idx_origin: u32,
    /// Velocity slots per playable key, ascending key order
    pub rows: Vec<Vec<ProximityEntry>>,
}

impl ProximityTable {
    /// Encode to the on-image representation.
    ///
    /// Fails when a row carries more velocity layers than the device's fixed
    /// slot count.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(PROXIMITY_TABLE_SIZE);
        out.extend_from_slice(&self.sample_idx_origin.to_le_bytes());

        for row in &self.rows {
            if row.len() > MAX_VELOCITY_SLOTS {
                return Err(SynthFsError::Validation(format!(
                    "key row has {} velocity layers, device limit is {}",
                    row.len(),
                    MAX_VELOCITY_SLOTS
                )));
            }
            for slot in 0..MAX_VELOCITY_SLOTS {
                match row.get(slot) {
                    Some(entry) => {
                        out.push(entry.velocity);
                        out.extend_from_slice(&entry.sample_idx.to_le_bytes());
                    }
                    None => out.extend_from_slice(&[0u8; 3]),
                }
            }
        }

        Ok(out)
    }

    /// Decode from the on-image representation, trimming zeroed slots
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf = checked(buf, PROXIMITY_TABLE_SIZE, "proximity table")?;
        let sample_idx_origin = u32_at(buf, 0);

        let mut rows = Vec::with_capacity(KEY_COUNT);
        for key in 0..KEY_COUNT {
            let mut row = Vec::new();
            for slot in 0..MAX_VELOCITY_SLOTS {
                let at = 4 + (key * MAX_VELOCITY_SLOTS + slot) * 3;
                let velocity = buf[at];
                if velocity == crate::bank::INVALID_VELOCITY {
                    break;
                }
                row.push(ProximityEntry {
                    velocity,
                    sample_idx: u16_at(buf, at + 1),
                });
            }
            rows.push(row);
        }

        Ok(Self {
            sample_idx_origin,
            rows,
        })
    }
}

//! Sampled-instrument bank compiler for the SFS embedded sampler
//!
//! Converts monolithic sampler containers into a compact, block-addressed
//! binary image consumed directly by the sampler firmware. The pipeline is
//! three offline stages connected through an on-disk directory convention:
//!
//! 1. **Extract** ([`monolith`]) — scan a monolithic container for embedded
//!    audio chunks, decode and resample them to the device rate, inflate the
//!    compressed program description and emit one `.audio`/`.meta` pair per
//!    zone plus an `instrument.meta`.
//! 2. **Fill** ([`fill`]) — synthesize missing semitone coverage inside the
//!    playable key range by pitch-shifting the nearest recorded neighbor.
//! 3. **Build** ([`image`]) — pack a directory of instrument folders into a
//!    single flat image with block-aligned sections, per-instrument key
//!    proximity tables and hold-behavior rows.
//!
//! # Quick start
//! ```no_run
//! use std::path::Path;
//!
//! let summary = synthfs::extract_monolith(
//!     Path::new("grand.nki"),
//!     Path::new("instruments/grand-piano"),
//! ).unwrap();
//! println!("{} zones extracted", summary.zones);
//!
//! synthfs::fill_gaps(Path::new("instruments/grand-piano")).unwrap();
//! synthfs::write_image(Path::new("instruments"), Path::new("synth.bin")).unwrap();
//! ```

#![warn(missing_docs)]

// Domain modules, leaves first
pub mod pcm; // Linear-interpolation resampler
pub mod proximity; // Nearest-recorded-semitone lookup
pub mod reader; // Bounds-checked binary scanning

pub mod bank; // On-disk directory convention
pub mod fill; // Missing-note synthesis
pub mod image; // Flat image builder
pub mod monolith; // Monolithic container extraction

/// Error types for bank compilation operations
#[derive(thiserror::Error, Debug)]
pub enum SynthFsError {
    /// Bad or missing magic value / container signature
    #[error("Format error: {0}")]
    Format(String),

    /// Data that parses but violates an invariant (sample rate, velocity, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed or missing metadata / configuration fields
    #[error("Config error: {0}")]
    Config(String),

    /// IO error from the filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SynthFsError {
    fn from(msg: String) -> Self {
        SynthFsError::Other(msg)
    }
}

impl From<&str> for SynthFsError {
    fn from(msg: &str) -> Self {
        SynthFsError::Other(msg.to_string())
    }
}

/// Result type for bank compilation operations
pub type Result<T> = std::result::Result<T, SynthFsError>;

// Public API exports
pub use fill::{fill_gaps, FillSummary};
pub use image::{write_image, ImageSummary};
pub use monolith::{extract_monolith, ExtractSummary};
pub use pcm::{resample, stretch};
pub use proximity::{nearest_recorded, resolve, KeyRow, FIRST_KEY, LAST_KEY};

//! Bounds-checked binary scanning over an in-memory buffer
//!
//! Monolithic containers carry no master index; embedded chunks are found by
//! repeated forward signature searches. [`BinaryReader`] owns the whole file
//! and offers little-endian field reads at absolute offsets plus substring
//! search, each failing with a format error instead of reading past the end.

use crate::{Result, SynthFsError};
use std::fs;
use std::path::Path;

/// In-memory byte buffer with positioned little-endian reads and signature search
pub struct BinaryReader {
    data: Vec<u8>,
}

impl BinaryReader {
    /// Read an entire file into memory
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(Self { data })
    }

    /// Wrap an existing buffer
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Total buffer length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow a byte range, failing when it runs past the end
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data
            .get(offset..offset.checked_add(len).unwrap_or(usize::MAX))
            .ok_or_else(|| {
                SynthFsError::Format(format!(
                    "read of {} bytes at offset {} past end of buffer ({} bytes)",
                    len,
                    offset,
                    self.data.len()
                ))
            })
    }

    /// Little-endian u16 at an absolute offset
    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        let b = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Little-endian u32 at an absolute offset
    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        let b = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Single byte at an absolute offset
    pub fn u8_at(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    /// First occurrence of `needle` at or after `from`, if any
    pub fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        if needle.is_empty() || from >= self.data.len() {
            return None;
        }
        self.data[from..]
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|p| p + from)
    }

    /// Everything from `offset` to the end of the buffer
    pub fn tail(&self, offset: usize) -> Result<&[u8]> {
        self.slice(offset, self.data.len().saturating_sub(offset))
    }
}

//! Coded unit extraction from access unit buffers.
//!
//! Two framings are supported: ISO/AVC length-prefixed units (the width of the
//! length field comes from the decoder configuration record) and Annex B
//! start-code delimited units.

use byteorder::{BigEndian, ByteOrder};

use crate::bitstream::find_start_code;
use crate::error::{Result, SvcError};

/// How coded units are delimited inside one access unit buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Each unit is preceded by a big-endian length field of this many bytes.
    LengthPrefixed(u8),
    /// Units are separated by `00 00 01` / `00 00 00 01` start codes.
    StartCode,
}

impl Framing {
    /// Build a length-prefixed framing, validating the field width.
    pub fn length_prefixed(size: u8) -> Result<Self> {
        if (1..=4).contains(&size) {
            Ok(Self::LengthPrefixed(size))
        } else {
            Err(SvcError::InvalidLengthSize(size))
        }
    }

    /// Width of the length field, 0 for start-code framing.
    pub fn length_size(&self) -> u8 {
        match self {
            Self::LengthPrefixed(size) => *size,
            Self::StartCode => 0,
        }
    }
}

/// Split `data` into coded units.
///
/// With start-code framing a buffer that contains no start code at all is
/// rejected with [`SvcError::MissingStartCode`]; the caller is expected to
/// drop it as non-decodable.
pub fn units(data: &[u8], framing: Framing) -> Result<Units<'_>> {
    let pos = match framing {
        Framing::LengthPrefixed(size) => {
            Framing::length_prefixed(size)?;
            0
        }
        Framing::StartCode => {
            let (offset, len) =
                find_start_code(data).ok_or(SvcError::MissingStartCode { len: data.len() })?;
            offset + len
        }
    };
    Ok(Units { data, pos, framing })
}

/// Lazy iterator over the coded units of one buffer.
#[derive(Debug, Clone)]
pub struct Units<'a> {
    data: &'a [u8],
    pos: usize,
    framing: Framing,
}

impl<'a> Units<'a> {
    fn next_length_prefixed(&mut self, size: usize) -> Option<&'a [u8]> {
        loop {
            let rest = &self.data[self.pos..];
            if rest.len() < size {
                return None;
            }
            let len = BigEndian::read_uint(rest, size) as usize;
            if rest.len() - size < len {
                tracing::trace!(declared = len, available = rest.len() - size, "Truncated unit");
                self.pos = self.data.len();
                return None;
            }
            let start = self.pos + size;
            self.pos = start + len;
            if len > 0 {
                return Some(&self.data[start..start + len]);
            }
        }
    }

    fn next_start_code(&mut self) -> Option<&'a [u8]> {
        loop {
            if self.pos >= self.data.len() {
                return None;
            }
            let start = self.pos;
            let rest = &self.data[start..];
            let end = match find_start_code(rest) {
                Some((offset, len)) => {
                    self.pos = start + offset + len;
                    start + offset
                }
                None => {
                    self.pos = self.data.len();
                    self.data.len()
                }
            };
            if end > start {
                return Some(&self.data[start..end]);
            }
        }
    }
}

impl<'a> Iterator for Units<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        match self.framing {
            Framing::LengthPrefixed(size) => self.next_length_prefixed(usize::from(size)),
            Framing::StartCode => self.next_start_code(),
        }
    }
}

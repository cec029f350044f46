//! Bit-level access to parameter set payloads.
//!
//! Only the reads needed to inspect SPS/PPS headers are provided: fixed-width
//! fields, Exp-Golomb codes and skips.

use crate::error::BitstreamError;

type Result<T> = std::result::Result<T, BitstreamError>;

/// MSB-first reader over an RBSP byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Absolute bit offset from the start of `data`.
    offset: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Bits left to read.
    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.offset)
    }

    /// Read one bit.
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self
            .data
            .get(self.offset / 8)
            .ok_or(BitstreamError::UnexpectedEnd)?;
        let bit = (byte >> (7 - (self.offset % 8))) & 1;
        self.offset += 1;
        Ok(bit == 1)
    }

    /// Read `n` bits (at most 32) as an unsigned value.
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        if n > 32 {
            return Err(BitstreamError::InvalidSyntax {
                element: "bit_count",
                value: i64::from(n),
            });
        }
        if self.remaining_bits() < usize::from(n) {
            return Err(BitstreamError::UnexpectedEnd);
        }
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | u32::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Read an unsigned Exp-Golomb code, ue(v).
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut zeros = 0u8;
        while !self.read_bit()? {
            zeros += 1;
            if zeros > 31 {
                return Err(BitstreamError::ExpGolombOverflow);
            }
        }
        if zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits(zeros)?;
        Ok(((1u64 << zeros) - 1 + u64::from(suffix)) as u32)
    }

    /// Read a signed Exp-Golomb code, se(v).
    pub fn read_se(&mut self) -> Result<i32> {
        let code = i64::from(self.read_ue()?);
        let magnitude = (code + 1) / 2;
        Ok(if code % 2 == 0 { -magnitude } else { magnitude } as i32)
    }

    /// Skip `n` bits.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.remaining_bits() < n {
            return Err(BitstreamError::UnexpectedEnd);
        }
        self.offset += n;
        Ok(())
    }
}

/// Strip emulation prevention bytes (`00 00 03` → `00 00`).
pub fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

/// Locate the next Annex B start code.
///
/// Returns `(offset, length)` where `length` is 3 or 4. A `00 00 00 01`
/// sequence is reported as one 4-byte code starting at its first zero.
pub fn find_start_code(data: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            match data[i + 2] {
                1 => return Some((i, 3)),
                0 if data.get(i + 3) == Some(&1) => return Some((i, 4)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

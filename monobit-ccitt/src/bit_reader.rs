//! Bit-level reader for MMR-coded data.

use crate::{DecodeError, Result};

#[derive(Debug, Clone)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    bit_offset: usize,
}

impl<'a> BitReader<'a> {
    #[inline(always)]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_offset: 0,
        }
    }

    /// Return the next `count` bits (at most 32) without consuming them.
    ///
    /// Positions past the end of the data read as 0 so that short codes at the
    /// very end of a stream can still be looked up with a full-width peek.
    #[inline(always)]
    pub(crate) fn peek_bits(&self, count: u8) -> u32 {
        debug_assert!(count <= 32);

        let mut value = 0_u64;
        let first = self.byte_pos();

        for i in 0..5 {
            let byte = self.data.get(first + i).copied().unwrap_or(0);
            value = (value << 8) | u64::from(byte);
        }

        // 40 bits loaded, the first `bit_pos` of which are already consumed.
        let shift = 40 - self.bit_pos() - count as usize;
        ((value >> shift) & ((1_u64 << count) - 1)) as u32
    }

    /// Consume `count` bits that were previously peeked.
    #[inline(always)]
    pub(crate) fn consume(&mut self, count: u8) -> Result<()> {
        self.bit_offset += count as usize;

        if self.bit_offset > self.data.len() * 8 {
            return Err(DecodeError::UnexpectedEof);
        }

        Ok(())
    }

    #[inline(always)]
    pub(crate) fn align(&mut self) {
        let bit_pos = self.bit_pos();

        if bit_pos != 0 {
            self.bit_offset += 8 - bit_pos;
        }
    }

    #[inline(always)]
    pub(crate) fn at_end(&self) -> bool {
        self.bit_offset >= self.data.len() * 8
    }

    /// The number of whole bytes touched so far.
    #[inline(always)]
    pub(crate) fn bytes_consumed(&self) -> usize {
        self.bit_offset.div_ceil(8).min(self.data.len())
    }

    #[inline(always)]
    fn byte_pos(&self) -> usize {
        self.bit_offset >> 3
    }

    #[inline(always)]
    fn bit_pos(&self) -> usize {
        self.bit_offset & 7
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_across_bytes() {
        let mut reader = BitReader::new(&[0b1010_1100, 0b0101_0011]);
        assert_eq!(reader.peek_bits(4), 0b1010);
        reader.consume(6).unwrap();
        assert_eq!(reader.peek_bits(6), 0b00_0101);
        reader.consume(10).unwrap();
        assert!(reader.at_end());
        assert_eq!(reader.peek_bits(13), 0);
        assert_eq!(reader.consume(1), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn align_and_consumed_bytes() {
        let mut reader = BitReader::new(&[0xFF, 0xFF, 0xFF]);
        reader.consume(3).unwrap();
        assert_eq!(reader.bytes_consumed(), 1);
        reader.align();
        assert_eq!(reader.bytes_consumed(), 1);
        reader.consume(1).unwrap();
        assert_eq!(reader.bytes_consumed(), 2);
    }
}

//! Big-endian byte and MSB-first bit reader over segment data.

use crate::error::{ParseError, Result};

/// A reader for reading bits and bytes from a byte stream.
///
/// All byte-level reads assume that the reader is byte-aligned, which holds
/// everywhere outside of Huffman-coded data.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    /// The position in bits.
    cur_pos: usize,
}

impl<'a> Reader<'a> {
    #[inline(always)]
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, cur_pos: 0 }
    }

    #[inline(always)]
    pub(crate) fn align(&mut self) {
        self.cur_pos = self.cur_pos.next_multiple_of(8);
    }

    #[inline(always)]
    pub(crate) fn at_end(&self) -> bool {
        self.byte_pos() >= self.data.len()
    }

    /// The unread rest of the data, starting at the current byte.
    #[inline(always)]
    pub(crate) fn tail(&self) -> &'a [u8] {
        self.data.get(self.byte_pos()..).unwrap_or_default()
    }

    #[inline(always)]
    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        debug_assert_eq!(self.bit_pos(), 0);

        let start = self.byte_pos();
        let end = start.checked_add(len).ok_or(ParseError::UnexpectedEof)?;
        let bytes = self.data.get(start..end).ok_or(ParseError::UnexpectedEof)?;
        self.cur_pos = end * 8;

        Ok(bytes)
    }

    #[inline(always)]
    pub(crate) fn skip_bytes(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    #[inline(always)]
    pub(crate) fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline(always)]
    pub(crate) fn read_i8(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.read_array()?))
    }

    #[inline(always)]
    pub(crate) fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    #[inline(always)]
    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    #[inline(always)]
    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    #[inline(always)]
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        bytes.try_into().map_err(|_| ParseError::UnexpectedEof.into())
    }

    #[inline(always)]
    pub(crate) fn read_bit(&mut self) -> Result<u32> {
        let byte = self.cur_byte()?;
        let shift = 7 - self.bit_pos();
        self.cur_pos += 1;

        Ok(u32::from((byte >> shift) & 1))
    }

    /// Read `count` bits (at most 32), most significant bit first.
    #[inline(always)]
    pub(crate) fn read_bits(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= 32);

        let mut value = 0_u64;
        let mut remaining = count as usize;

        while remaining > 0 {
            let byte = u64::from(self.cur_byte()?);
            let available = 8 - self.bit_pos();
            let take = remaining.min(available);
            let bits = (byte >> (available - take)) & ((1 << take) - 1);

            value = (value << take) | bits;
            self.cur_pos += take;
            remaining -= take;
        }

        Ok(value as u32)
    }

    #[inline(always)]
    pub(crate) fn byte_pos(&self) -> usize {
        self.cur_pos >> 3
    }

    #[inline(always)]
    fn bit_pos(&self) -> usize {
        self.cur_pos & 7
    }

    #[inline(always)]
    fn cur_byte(&self) -> Result<u8> {
        Ok(*self
            .data
            .get(self.byte_pos())
            .ok_or(ParseError::UnexpectedEof)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_reads() {
        let data = [0x00, 0x00, 0x01, 0x02, 0xFF, 0xFE, 0b1011_0110, 0x80];
        let mut reader = Reader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x0102);
        assert_eq!(reader.read_i8().unwrap(), -1);
        assert_eq!(reader.read_byte().unwrap(), 0xFE);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bit().unwrap(), 1);
        reader.align();
        assert_eq!(reader.read_bits(1).unwrap(), 1);
        reader.align();
        assert!(reader.at_end());
        assert!(reader.read_byte().is_err());
    }

    #[test]
    fn bits_across_byte_boundary() {
        let mut reader = Reader::new(&[0xFF, 0x00, 0xFF, 0x00, 0xFF]);
        reader.read_bits(4).unwrap();
        assert_eq!(reader.read_bits(32).unwrap(), 0xF00F_F00F);
        assert_eq!(reader.read_bits(5), Err(ParseError::UnexpectedEof.into()));
    }
}

/*!
A memory-safe, pure-Rust decoder for CCITT Group 4 (MMR) fax data.

This crate implements the two-dimensional coding scheme of ITU-T T.6, which is
used by JBIG2 for MMR-coded generic regions and by PDF for `CCITTFaxDecode`
streams with `K < 0`. Decoded pixels are pushed to a caller-provided
[`Decoder`] sink one run at a time.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

mod bit_reader;
mod decode;
mod tables;

use core::fmt;

use bit_reader::BitReader;
use log::warn;

/// Settings that control how a stream is decoded.
#[derive(Copy, Clone, Debug)]
pub struct DecodeSettings {
    /// The width of each line in pixels.
    pub columns: u32,
    /// The number of lines to decode at most. `0` means that the number is
    /// unknown and decoding runs until an EOFB or the end of the data.
    pub rows: u32,
    /// Whether the data may be terminated early by an EOFB marker.
    pub end_of_block: bool,
    /// Whether black pixels are reported as `true`. Otherwise white pixels
    /// are `true`.
    pub black_is_1: bool,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            columns: 1728,
            rows: 0,
            end_of_block: true,
            black_is_1: false,
        }
    }
}

/// A sink for decoded pixels.
pub trait Decoder {
    /// Push `count` pixels of the same value.
    fn push_pixels(&mut self, value: bool, count: u32);
    /// Called after each completed line.
    fn next_line(&mut self);
}

/// Errors that can occur while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The data ended in the middle of a line.
    UnexpectedEof,
    /// A bit sequence that is not a valid code.
    InvalidCode,
    /// A code placed a changing element outside of the line.
    InvalidLine,
    /// A run length overflowed.
    Overflow,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of input"),
            Self::InvalidCode => write!(f, "invalid code"),
            Self::InvalidLine => write!(f, "changing element outside of the line"),
            Self::Overflow => write!(f, "run length overflow"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Result type for decoding operations.
pub type Result<T> = core::result::Result<T, DecodeError>;

/// Decode Group 4 data, returning the number of bytes that were consumed.
///
/// Decoding stops after `settings.rows` lines, at an EOFB marker (if
/// `settings.end_of_block` is set) or when the data runs out at a line
/// boundary. The returned length always ends on a byte boundary.
pub fn decode(data: &[u8], decoder: &mut impl Decoder, settings: &DecodeSettings) -> Result<usize> {
    if settings.columns == 0 {
        return Ok(0);
    }

    let max_rows = if settings.rows == 0 {
        u32::MAX
    } else {
        settings.rows
    };

    let mut reader = BitReader::new(data);
    // "The reference line for the first coding line in a page is an imaginary
    // white line." (T.6, 2.2.1)
    let mut reference = Vec::new();
    let mut coding = Vec::new();
    let mut decoded_rows = 0;
    let mut saw_end_of_block = false;

    while decoded_rows < max_rows {
        if settings.end_of_block && reader.peek_bits(24) == tables::EOFB {
            reader.consume(24)?;
            saw_end_of_block = true;
            break;
        }

        if reader.at_end() {
            if settings.rows != 0 {
                warn!("data ended after {decoded_rows} of {} rows", settings.rows);
            }

            break;
        }

        decode::decode_line(&mut reader, &reference, &mut coding, settings.columns)?;
        emit_line(decoder, &coding, settings);

        core::mem::swap(&mut reference, &mut coding);
        decoded_rows += 1;
    }

    // The marker may also follow the last expected row.
    if settings.end_of_block && !saw_end_of_block && reader.peek_bits(24) == tables::EOFB {
        reader.consume(24)?;
    }

    reader.align();

    Ok(reader.bytes_consumed())
}

fn emit_line(decoder: &mut impl Decoder, changes: &[u32], settings: &DecodeSettings) {
    let mut position = 0;
    let mut black = false;

    for &change in changes.iter().chain(core::iter::once(&settings.columns)) {
        if change > position {
            decoder.push_pixels(black == settings.black_is_1, change - position);
        }

        position = change;
        black = !black;
    }

    decoder.next_line();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Lines(Vec<Vec<bool>>, Vec<bool>);

    impl Decoder for Lines {
        fn push_pixels(&mut self, value: bool, count: u32) {
            self.1.extend(core::iter::repeat_n(value, count as usize));
        }

        fn next_line(&mut self) {
            self.0.push(core::mem::take(&mut self.1));
        }
    }

    fn settings(columns: u32, rows: u32, end_of_block: bool) -> DecodeSettings {
        DecodeSettings {
            columns,
            rows,
            end_of_block,
            black_is_1: true,
        }
    }

    fn row(pattern: &str) -> Vec<bool> {
        pattern.bytes().map(|b| b == b'1').collect()
    }

    #[test]
    fn white_lines_followed_by_eofb() {
        // V0 V0 EOFB
        let data = [0xC0, 0x04, 0x00, 0x40];
        let mut lines = Lines::default();
        let consumed = decode(&data, &mut lines, &settings(8, 2, true)).unwrap();

        assert_eq!(consumed, 4);
        assert_eq!(lines.0, vec![row("00000000"), row("00000000")]);
    }

    #[test]
    fn horizontal_then_vertical() {
        // H W2 B3 V0 | V0 V0 V0
        let data = [0x2F, 0x78];
        let mut lines = Lines::default();
        let consumed = decode(&data, &mut lines, &settings(8, 2, false)).unwrap();

        assert_eq!(consumed, 2);
        assert_eq!(lines.0, vec![row("00111000"), row("00111000")]);
    }

    #[test]
    fn white_is_1_polarity() {
        let data = [0x2F, 0x40];
        let mut lines = Lines::default();
        let settings = DecodeSettings {
            black_is_1: false,
            ..settings(8, 1, false)
        };
        decode(&data, &mut lines, &settings).unwrap();

        assert_eq!(lines.0, vec![row("11000111")]);
    }

    #[test]
    fn unknown_row_count() {
        let data = [0xC0, 0x04, 0x00, 0x40];
        let mut lines = Lines::default();
        decode(&data, &mut lines, &settings(8, 0, true)).unwrap();

        assert_eq!(lines.0.len(), 2);
    }

    #[test]
    fn eofb_stops_early() {
        let data = [0x00, 0x10, 0x01];
        let mut lines = Lines::default();
        let consumed = decode(&data, &mut lines, &settings(8, 5, true)).unwrap();

        assert_eq!(consumed, 3);
        assert!(lines.0.is_empty());
    }

    #[test]
    fn invalid_code() {
        let mut lines = Lines::default();
        assert_eq!(
            decode(&[0x00, 0x00], &mut lines, &settings(8, 1, false)),
            Err(DecodeError::InvalidCode)
        );
    }
}

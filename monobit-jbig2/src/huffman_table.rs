//! Huffman code tables (Annex B).
//!
//! A table is a list of lines, each covering a range of values. Prefix codes
//! are assigned canonically from the prefix lengths (B.3), and decoding walks
//! the lines in order of increasing prefix length, reading one more bit each
//! time a longer prefix is needed.

use std::sync::LazyLock;

use crate::error::{HuffmanError, Result, bail, err};
use crate::reader::Reader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Normal,
    /// "-∞...RANGELOW", decoded as RANGELOW - HTOFFSET.
    Lower,
    /// "RANGELOW...∞"
    Upper,
    OutOfBand,
}

#[derive(Debug, Clone, Copy)]
struct TableLine {
    range_low: i32,
    prefix_len: u8,
    range_len: u8,
    kind: LineKind,
}

const fn line(prefix_len: u8, range_len: u8, range_low: i32) -> TableLine {
    TableLine {
        range_low,
        prefix_len,
        range_len,
        kind: LineKind::Normal,
    }
}

const fn lower(prefix_len: u8, range_high: i32) -> TableLine {
    TableLine {
        range_low: range_high,
        prefix_len,
        range_len: 32,
        kind: LineKind::Lower,
    }
}

const fn upper(prefix_len: u8, range_low: i32) -> TableLine {
    TableLine {
        range_low,
        prefix_len,
        range_len: 32,
        kind: LineKind::Upper,
    }
}

const fn oob(prefix_len: u8) -> TableLine {
    TableLine {
        range_low: 0,
        prefix_len,
        range_len: 0,
        kind: LineKind::OutOfBand,
    }
}

#[derive(Debug, Clone)]
struct CodedLine {
    code: u32,
    line: TableLine,
}

/// A Huffman table with assigned prefix codes.
#[derive(Debug, Clone)]
pub(crate) struct HuffmanTable {
    /// Lines with a non-zero prefix length, sorted by prefix length.
    lines: Vec<CodedLine>,
    has_oob: bool,
}

impl HuffmanTable {
    /// Assign prefix codes to the lines (B.3).
    ///
    /// Prefix lengths must not exceed 32.
    fn build(lines: &[TableLine]) -> Self {
        let max_len = lines.iter().map(|l| l.prefix_len).max().unwrap_or(0) as usize;

        // "1) Build a histogram in the array LENCOUNT counting the number of
        // times each prefix length value occurs in PREFLEN: LENCOUNT[I] is the
        // number of times that the value I occurs in the array PREFLEN."
        let mut len_count = vec![0_u64; max_len + 1];
        for l in lines {
            len_count[l.prefix_len as usize] += 1;
        }
        // "2) LENCOUNT[0] = 0"
        len_count[0] = 0;

        let mut coded = Vec::with_capacity(lines.len());
        let mut first_code = 0_u64;

        // "3) Set: CURLEN = 1; FIRSTCODE[0] = 0"
        for cur_len in 1..=max_len {
            // "a) Set: FIRSTCODE[CURLEN] = (FIRSTCODE[CURLEN – 1] +
            // LENCOUNT[CURLEN – 1]) × 2"
            first_code = (first_code + len_count[cur_len - 1]) << 1;
            let mut cur_code = first_code;

            // "b) For each line with PREFLEN[CURTEMP] = CURLEN, assign
            // CODES[CURTEMP] = CURCODE and increment CURCODE, in table order."
            for l in lines.iter().filter(|l| l.prefix_len as usize == cur_len) {
                coded.push(CodedLine {
                    code: cur_code as u32,
                    line: *l,
                });
                cur_code += 1;
            }
        }

        Self {
            has_oob: lines
                .iter()
                .any(|l| l.kind == LineKind::OutOfBand && l.prefix_len > 0),
            lines: coded,
        }
    }

    /// Whether this table can produce an out-of-band value.
    pub(crate) fn has_oob(&self) -> bool {
        self.has_oob
    }

    /// Decode a value, returning `None` for the out-of-band symbol (B.4).
    pub(crate) fn decode(&self, reader: &mut Reader<'_>) -> Result<Option<i32>> {
        let mut code = 0_u32;
        let mut len = 0_u8;

        for coded in &self.lines {
            while len < coded.line.prefix_len {
                code = (code << 1) | reader.read_bit()?;
                len += 1;
            }

            if coded.code != code {
                continue;
            }

            let line = coded.line;
            if line.kind == LineKind::OutOfBand {
                return Ok(None);
            }

            // "2) Read RANGELEN bits as HTOFFSET"
            let offset = i64::from(reader.read_bits(u32::from(line.range_len))?);
            let low = i64::from(line.range_low);

            let value = if line.kind == LineKind::Lower {
                low - offset
            } else {
                low + offset
            };

            return match i32::try_from(value) {
                Ok(v) => Ok(Some(v)),
                Err(_) => err!(HuffmanError::InvalidCode),
            };
        }

        err!(HuffmanError::InvalidCode)
    }

    /// Decode a value where out-of-band is not permitted.
    pub(crate) fn decode_value(&self, reader: &mut Reader<'_>) -> Result<i32> {
        self.decode(reader)?
            .ok_or_else(|| HuffmanError::UnexpectedOob.into())
    }

    /// Build a table whose `i`-th line decodes to `i` without range bits.
    ///
    /// Lines with a prefix length of 0 are not assigned a code.
    pub(crate) fn from_code_lengths(lengths: &[u8]) -> Self {
        let lines: Vec<_> = lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| line(len, 0, i as i32))
            .collect();

        Self::build(&lines)
    }

    /// Read a table from the data of a tables segment (B.2).
    pub(crate) fn read_custom(reader: &mut Reader<'_>) -> Result<Self> {
        let flags = reader.read_byte()?;

        // "Bit 0: HTOOB"
        let has_oob = flags & 1 != 0;
        // "Bits 1-3: Number of bits used in code table line prefix size
        // fields (HTPS) minus one"
        let prefix_size = u32::from((flags >> 1) & 7) + 1;
        // "Bits 4-6: Number of bits used in code table line range size fields
        // (HTRS) minus one"
        let range_size = u32::from((flags >> 4) & 7) + 1;

        if flags & 0x80 != 0 {
            bail!(HuffmanError::InvalidTable);
        }

        let low = reader.read_i32()?;
        let high = reader.read_i32()?;

        if low > high {
            bail!(HuffmanError::InvalidTable);
        }

        let read_prefix_len = |reader: &mut Reader<'_>| -> Result<u8> {
            let len = reader.read_bits(prefix_size)?;
            if len > 32 {
                bail!(HuffmanError::InvalidTable);
            }
            Ok(len as u8)
        };

        let mut lines = Vec::new();
        let mut cur_range_low = i64::from(low);

        // "4) Decode each table line as follows [...] 5) Repeat step 4) until
        // CURRANGELOW ≥ HTHIGH."
        while cur_range_low < i64::from(high) {
            let prefix_len = read_prefix_len(reader)?;
            let range_len = reader.read_bits(range_size)?;

            if range_len > 31 {
                bail!(HuffmanError::InvalidTable);
            }

            lines.push(line(prefix_len, range_len as u8, cur_range_low as i32));
            cur_range_low += 1 << range_len;

            if cur_range_low > i64::from(i32::MAX) {
                bail!(HuffmanError::InvalidTable);
            }
        }

        // "6) Decode the lower range table line. [...] RANGELEN = 32;
        // RANGELOW = HTLOW – 1"
        let lower_low = low.checked_sub(1).ok_or(HuffmanError::InvalidTable)?;
        lines.push(lower(read_prefix_len(reader)?, lower_low));

        // "7) Decode the upper range table line. [...] RANGELEN = 32;
        // RANGELOW = CURRANGELOW"
        lines.push(upper(read_prefix_len(reader)?, cur_range_low as i32));

        // "8) If HTOOB is 1, then decode the out-of-band table line."
        if has_oob {
            lines.push(oob(read_prefix_len(reader)?));
        }

        Ok(Self::build(&lines))
    }
}

/// The standard tables of B.5, named by their letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StandardTable {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
}

impl StandardTable {
    pub(crate) fn get(self) -> &'static HuffmanTable {
        &STANDARD_TABLES[self as usize]
    }
}

/// Lines of Tables B.1 to B.15, as (PREFLEN, RANGELEN, RANGELOW).
#[rustfmt::skip]
const STANDARD_LINES: [&[TableLine]; 15] = [
    // B.1
    &[line(1, 4, 0), line(2, 8, 16), line(3, 16, 272), upper(3, 65808)],
    // B.2
    &[line(1, 0, 0), line(2, 0, 1), line(3, 0, 2), line(4, 3, 3), line(5, 6, 11), upper(6, 75),
      oob(6)],
    // B.3
    &[line(8, 8, -256), line(1, 0, 0), line(2, 0, 1), line(3, 0, 2), line(4, 3, 3),
      line(5, 6, 11), lower(8, -257), upper(7, 75), oob(6)],
    // B.4
    &[line(1, 0, 1), line(2, 0, 2), line(3, 0, 3), line(4, 3, 4), line(5, 6, 12), upper(5, 76)],
    // B.5
    &[line(7, 8, -255), line(1, 0, 1), line(2, 0, 2), line(3, 0, 3), line(4, 3, 4),
      line(5, 6, 12), lower(7, -256), upper(6, 76)],
    // B.6
    &[line(5, 10, -2048), line(4, 9, -1024), line(4, 8, -512), line(4, 7, -256),
      line(5, 6, -128), line(5, 5, -64), line(4, 5, -32), line(2, 7, 0), line(3, 7, 128),
      line(3, 8, 256), line(4, 9, 512), line(4, 10, 1024), lower(6, -2049), upper(6, 2048)],
    // B.7
    &[line(4, 9, -1024), line(3, 8, -512), line(4, 7, -256), line(5, 6, -128),
      line(5, 5, -64), line(4, 5, -32), line(4, 5, 0), line(5, 5, 32), line(5, 6, 64),
      line(4, 7, 128), line(3, 8, 256), line(3, 9, 512), line(3, 10, 1024), lower(5, -1025),
      upper(5, 2048)],
    // B.8
    &[line(8, 3, -15), line(9, 1, -7), line(8, 1, -5), line(9, 0, -3), line(7, 0, -2),
      line(4, 0, -1), line(2, 1, 0), line(5, 0, 2), line(6, 0, 3), line(3, 4, 4),
      line(6, 1, 20), line(4, 4, 22), line(4, 5, 38), line(5, 6, 70), line(5, 7, 134),
      line(6, 7, 262), line(7, 8, 390), line(6, 10, 646), lower(9, -16), upper(9, 1670),
      oob(2)],
    // B.9
    &[line(8, 4, -31), line(9, 2, -15), line(8, 2, -11), line(9, 1, -7), line(7, 1, -5),
      line(4, 1, -3), line(3, 1, -1), line(3, 1, 1), line(5, 1, 3), line(6, 1, 5),
      line(3, 5, 7), line(6, 2, 39), line(4, 5, 43), line(4, 6, 75), line(5, 7, 139),
      line(5, 8, 267), line(6, 8, 523), line(7, 9, 779), line(6, 11, 1291), lower(9, -32),
      upper(9, 3339), oob(2)],
    // B.10
    &[line(7, 4, -21), line(8, 0, -5), line(7, 0, -4), line(5, 0, -3), line(2, 2, -2),
      line(5, 0, 2), line(6, 0, 3), line(7, 0, 4), line(8, 0, 5), line(2, 6, 6),
      line(5, 5, 70), line(6, 5, 102), line(6, 6, 134), line(6, 7, 198), line(6, 8, 326),
      line(6, 9, 582), line(6, 10, 1094), line(7, 11, 2118), lower(8, -22), upper(8, 4166),
      oob(2)],
    // B.11
    &[line(1, 0, 1), line(2, 1, 2), line(4, 0, 4), line(4, 1, 5), line(5, 1, 7),
      line(5, 2, 9), line(6, 2, 13), line(7, 2, 17), line(7, 3, 21), line(7, 4, 29),
      line(7, 5, 45), line(7, 6, 77), upper(7, 141)],
    // B.12
    &[line(1, 0, 1), line(2, 0, 2), line(3, 1, 3), line(5, 0, 5), line(5, 1, 6),
      line(6, 1, 8), line(7, 0, 10), line(7, 1, 11), line(7, 2, 13), line(7, 3, 17),
      line(7, 4, 25), line(8, 5, 41), upper(8, 73)],
    // B.13
    &[line(1, 0, 1), line(3, 0, 2), line(4, 0, 3), line(5, 0, 4), line(4, 1, 5),
      line(3, 3, 7), line(6, 1, 15), line(6, 2, 17), line(6, 3, 21), line(6, 4, 29),
      line(6, 5, 45), line(7, 6, 77), upper(7, 141)],
    // B.14
    &[line(3, 0, -2), line(3, 0, -1), line(1, 0, 0), line(3, 0, 1), line(3, 0, 2)],
    // B.15
    &[line(7, 4, -24), line(6, 2, -8), line(5, 1, -4), line(4, 0, -2), line(3, 0, -1),
      line(1, 0, 0), line(3, 0, 1), line(4, 0, 2), line(5, 1, 3), line(6, 2, 5),
      line(7, 4, 9), lower(7, -25), upper(7, 25)],
];

static STANDARD_TABLES: LazyLock<[HuffmanTable; 15]> =
    LazyLock::new(|| STANDARD_LINES.map(HuffmanTable::build));

/// Custom tables from the tables segments a segment refers to.
///
/// "User-supplied" table selections take the next unused table, in the order
/// in which the tables segments are referred to.
pub(crate) struct CustomTables<'a> {
    tables: &'a [&'a HuffmanTable],
    next: usize,
}

impl<'a> CustomTables<'a> {
    pub(crate) fn new(tables: &'a [&'a HuffmanTable]) -> Self {
        Self { tables, next: 0 }
    }

    /// Resolve one table selection: either the given standard table or, if
    /// `user_supplied` is set, the next custom table.
    pub(crate) fn select(
        &mut self,
        user_supplied: bool,
        standard: StandardTable,
    ) -> Result<&'a HuffmanTable> {
        if !user_supplied {
            return Ok(standard.get());
        }

        let table = self
            .tables
            .get(self.next)
            .ok_or(HuffmanError::MissingTables)?;
        self.next += 1;

        Ok(table)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Pack a string of '0'/'1' characters MSB-first, ignoring anything else.
    pub(crate) fn bits(pattern: &str) -> Vec<u8> {
        let bits: Vec<u8> = pattern
            .bytes()
            .filter(|b| *b == b'0' || *b == b'1')
            .map(|b| b - b'0')
            .collect();

        bits.chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0_u8, |acc, (i, &b)| acc | (b << (7 - i)))
            })
            .collect()
    }

    fn decode_n(table: &HuffmanTable, pattern: &str, count: usize) -> Vec<Option<i32>> {
        let data = bits(pattern);
        let mut reader = Reader::new(&data);
        (0..count)
            .map(|_| table.decode(&mut reader).unwrap())
            .collect()
    }

    #[test]
    fn custom_table_from_annex_b_example() {
        // Equivalent to Table B.1.
        let data = [
            0x42, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x10, 0x49, 0x23, 0x81, 0x80,
        ];
        let table = HuffmanTable::read_custom(&mut Reader::new(&data)).unwrap();
        assert!(!table.has_oob());

        let pattern = "0 0111  10 11111111  110 0000000000000000  111 00000000000000000000000000000001";
        assert_eq!(
            decode_n(&table, pattern, 4),
            vec![Some(7), Some(271), Some(272), Some(65809)]
        );
        assert_eq!(
            decode_n(StandardTable::A.get(), pattern, 4),
            decode_n(&table, pattern, 4)
        );
    }

    #[test]
    fn custom_table_with_lower_range_and_oob() {
        // HTOOB = 1, HTPS = 2, HTRS = 1, HTLOW = 0, HTHIGH = 2.
        // Lines: 0...1 (PREFLEN 1, RANGELEN 1), lower PREFLEN 2, upper
        // PREFLEN 3, OOB PREFLEN 3.
        let mut data = vec![0x03, 0, 0, 0, 0, 0, 0, 0, 2];
        data.extend(bits("01 1  10  11  11"));
        let table = HuffmanTable::read_custom(&mut Reader::new(&data)).unwrap();
        assert!(table.has_oob());

        let values = decode_n(
            &table,
            "0 1  111  10 00000000000000000000000000000100  110 00000000000000000000000000000011",
            4,
        );
        assert_eq!(values, vec![Some(1), None, Some(-5), Some(5)]);
    }

    #[test]
    fn standard_values_stay_within_their_range() {
        // B.2, line 3...10 (PREFLEN 4, RANGELEN 3).
        for offset in 0..8 {
            let pattern = format!("1110 {offset:03b}");
            let value = decode_n(StandardTable::B.get(), &pattern, 1)[0].unwrap();
            assert!((3..=10).contains(&value));
            assert_eq!(value, 3 + offset);
        }
    }

    #[test]
    fn out_of_band_is_never_a_number() {
        assert_eq!(decode_n(StandardTable::B.get(), "111111", 1), vec![None]);
        assert_eq!(decode_n(StandardTable::H.get(), "01", 1), vec![None]);
        assert!(
            StandardTable::B
                .get()
                .decode_value(&mut Reader::new(&bits("111111")))
                .is_err()
        );
    }

    #[test]
    fn lower_range_of_standard_table() {
        // B.3: lower range line -∞...-257 has PREFLEN 8 and code 11111111.
        assert_eq!(
            decode_n(StandardTable::C.get(), "11111111 00000000000000000000000000000011", 1),
            vec![Some(-260)]
        );
        assert_eq!(
            decode_n(StandardTable::C.get(), "11111110 00000101", 1),
            vec![Some(-251)]
        );
    }

    #[test]
    fn user_supplied_tables_are_consumed_in_order() {
        let first = StandardTable::D.get().clone();
        let second = StandardTable::E.get().clone();
        let refs = [&first, &second];
        let mut tables = CustomTables::new(&refs);

        assert!(tables.select(false, StandardTable::A).is_ok());
        assert!(core::ptr::eq(tables.select(true, StandardTable::A).unwrap(), &first));
        assert!(core::ptr::eq(tables.select(true, StandardTable::A).unwrap(), &second));
        assert!(tables.select(true, StandardTable::A).is_err());
    }
}

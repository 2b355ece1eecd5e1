use crate::bit_reader::BitReader;
use crate::tables::{BLACK_TABLE, Entry, LOOKUP_BITS, MODE_TABLE, MODES, Mode, WHITE_TABLE};
use crate::{DecodeError, Result};
use log::warn;

impl BitReader<'_> {
    #[inline(always)]
    fn lookup(&mut self, table: &[Entry]) -> Result<Entry> {
        let entry = table[self.peek_bits(LOOKUP_BITS) as usize];

        if entry.len == 0 {
            return Err(DecodeError::InvalidCode);
        }

        self.consume(entry.len)?;

        Ok(entry)
    }

    /// Decode a complete run: any number of make-up codes followed by one
    /// terminating code.
    pub(crate) fn decode_run(&mut self, white: bool) -> Result<u32> {
        let table: &[Entry] = if white { &WHITE_TABLE } else { &BLACK_TABLE };
        let mut total = 0_u32;

        loop {
            let entry = self.lookup(table)?;
            total = total
                .checked_add(u32::from(entry.value))
                .ok_or(DecodeError::Overflow)?;

            // Terminating codes cover 0-63, make-up codes start at 64.
            if entry.value < 64 {
                return Ok(total);
            }
        }
    }

    pub(crate) fn decode_mode(&mut self) -> Result<Mode> {
        let entry = self.lookup(&MODE_TABLE)?;
        Ok(MODES[entry.value as usize])
    }
}

/// Decode one coding line into its list of changing elements.
///
/// Both `reference` and `coding` hold the positions at which the colour
/// changes, strictly increasing and starting with a change from white to
/// black. Positions at or beyond `columns` are never stored.
pub(crate) fn decode_line(
    reader: &mut BitReader<'_>,
    reference: &[u32],
    coding: &mut Vec<u32>,
    columns: u32,
) -> Result<()> {
    coding.clear();

    let columns = i64::from(columns);
    // "a0: The reference or starting changing element on the coding line. At
    // the start of the coding line a0 is set on an imaginary white changing
    // element situated just before the first element on the line." (2.2.2)
    let mut a0 = -1_i64;
    let mut white = true;

    while a0 < columns {
        let (b1, b2) = find_b1_b2(reference, a0, white, columns);

        match reader.decode_mode()? {
            // "2.2.3.1 Pass mode"
            Mode::Pass => {
                a0 = b2;
            }
            // "2.2.3.3 Horizontal mode"
            Mode::Horizontal => {
                let start = a0.max(0);
                let a1 = start + i64::from(reader.decode_run(white)?);
                let a2 = a1 + i64::from(reader.decode_run(!white)?);

                if a2 > columns {
                    warn!("horizontal mode runs past the end of the line");
                    return Err(DecodeError::InvalidLine);
                }

                push_change(coding, a1, columns);
                push_change(coding, a2, columns);
                a0 = a2;
            }
            // "2.2.3.2 Vertical mode"
            Mode::Vertical(delta) => {
                let a1 = b1 + i64::from(delta);

                if a1 < a0.max(0) || a1 > columns {
                    warn!("vertical mode points outside of the line ({a1})");
                    return Err(DecodeError::InvalidLine);
                }

                push_change(coding, a1, columns);
                white = !white;
                a0 = a1;
            }
        }
    }

    Ok(())
}

/// Locate b1 and b2 on the reference line.
///
/// "b1: The first changing element on the reference line to the right of a0
/// and of opposite colour to the colour of a0.
/// b2: The next changing element to the right of b1 on the reference line."
/// (2.2.2)
fn find_b1_b2(reference: &[u32], a0: i64, white: bool, columns: i64) -> (i64, i64) {
    let at = |i: usize| reference.get(i).map_or(columns, |&v| i64::from(v));

    // Even entries change to black, odd entries back to white.
    let mut i = if white { 0 } else { 1 };
    while i < reference.len() && at(i) <= a0 {
        i += 2;
    }

    (at(i), at(i + 1))
}

fn push_change(coding: &mut Vec<u32>, position: i64, columns: i64) {
    if position >= columns {
        return;
    }

    // Two changes at the same spot describe an empty run and cancel out.
    if coding.last().is_some_and(|&last| i64::from(last) == position) {
        coding.pop();
    } else {
        coding.push(position as u32);
    }
}

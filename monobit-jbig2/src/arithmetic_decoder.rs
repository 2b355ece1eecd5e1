//! The MQ arithmetic decoder (Annex E) and its adaptive contexts.
//!
//! "The arithmetic decoding procedure receives an arithmetically coded bit
//! sequence and an associated sequence of context labels, and reconstructs
//! the original string of binary symbols." (E.1.1)

/// The arithmetic decoder state.
///
/// "State variables used by the arithmetic decoder procedures are described in
/// Table E.1." (E.3.1)
pub(crate) struct ArithmeticDecoder<'a> {
    data: &'a [u8],
    /// "Chigh and Clow can be thought of as one 32-bit C-register"
    c: u32,
    /// "A-register"
    a: u32,
    /// "BP - A pointer to the compressed data"
    bp: usize,
    /// "CT - The bit counter"
    ct: u32,
}

impl<'a> ArithmeticDecoder<'a> {
    /// Start decoding `data` (INITDEC, Figure G.1).
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut decoder = Self {
            data,
            c: 0,
            a: 0,
            bp: 0,
            ct: 0,
        };

        // "C = (B XOR 0xFF) << 16; BYTEIN; C = C << 7; CT = CT - 7; A = 0x8000"
        decoder.c = (u32::from(decoder.byte_at(0)) ^ 0xFF) << 16;
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct -= 7;
        decoder.a = 0x8000;

        decoder
    }

    /// Decode one binary decision with the given context (DECODE, Figure G.2).
    #[inline(always)]
    pub(crate) fn decode(&mut self, cx: &mut Context) -> u32 {
        let entry = &QE_TABLE[cx.index as usize];
        let qe = u32::from(entry.qe);

        self.a -= qe;

        let d = if (self.c >> 16) < self.a {
            if self.a & 0x8000 != 0 {
                return u32::from(cx.mps);
            }

            // MPS_EXCHANGE (Figure E.16).
            let d = if self.a < qe {
                cx.lps_transition(entry)
            } else {
                cx.mps_transition(entry)
            };
            self.renormalize();
            d
        } else {
            self.c -= self.a << 16;

            // LPS_EXCHANGE (Figure E.17).
            let d = if self.a < qe {
                self.a = qe;
                cx.mps_transition(entry)
            } else {
                self.a = qe;
                cx.lps_transition(entry)
            };
            self.renormalize();
            d
        };

        u32::from(d)
    }

    /// RENORMD (Figure E.18).
    #[inline(always)]
    fn renormalize(&mut self) {
        loop {
            if self.ct == 0 {
                self.byte_in();
            }

            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// BYTEIN (Figure G.3).
    ///
    /// "If B1 exceeds 0x8F, then B1 must be one of the marker codes." In that
    /// case the decoder stops advancing and feeds 1-bits from then on.
    #[inline(always)]
    fn byte_in(&mut self) {
        let b = self.byte_at(self.bp);

        if b == 0xFF {
            if self.byte_at(self.bp + 1) > 0x8F {
                self.ct = 8;
            } else {
                self.bp += 1;
                self.c = self
                    .c
                    .wrapping_add(0xFE00)
                    .wrapping_sub(u32::from(self.byte_at(self.bp)) << 9);
                self.ct = 7;
            }
        } else {
            self.bp += 1;
            self.c = self
                .c
                .wrapping_add(0xFF00)
                .wrapping_sub(u32::from(self.byte_at(self.bp)) << 8);
            self.ct = 8;
        }
    }

    /// Bytes past the end of the data read as 0xFF.
    #[inline(always)]
    fn byte_at(&self, pos: usize) -> u8 {
        self.data.get(pos).copied().unwrap_or(0xFF)
    }
}

/// An adaptive context (E.2.4).
///
/// "Each context has associated with it an index, I(CX), which identifies a
/// particular probability estimate and its associated MPS value."
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Context {
    /// "I(CX) - Index for context CX"
    index: u8,
    /// "MPS(CX) - The sense of MPS for context CX"
    mps: u8,
}

impl Context {
    #[inline(always)]
    fn mps_transition(&mut self, entry: &QeEntry) -> u8 {
        self.index = entry.nmps;
        self.mps
    }

    #[inline(always)]
    fn lps_transition(&mut self, entry: &QeEntry) -> u8 {
        let d = 1 - self.mps;

        if entry.switch {
            self.mps = 1 - self.mps;
        }

        self.index = entry.nlps;
        d
    }
}

/// The context memory of one adaptive decoding procedure.
///
/// Tables are sized explicitly before use. Indexing past the end is a bug in
/// the caller and panics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ContextTable {
    contexts: Vec<Context>,
}

impl ContextTable {
    /// Create a table with `len` fresh contexts.
    pub(crate) fn new(len: usize) -> Self {
        Self {
            contexts: vec![Context::default(); len],
        }
    }

    /// Grow the table to at least `len` fresh contexts.
    pub(crate) fn ensure_size(&mut self, len: usize) {
        if self.contexts.len() < len {
            self.contexts.resize(len, Context::default());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.contexts.len()
    }

    #[inline(always)]
    pub(crate) fn get(&mut self, cx: u32) -> &mut Context {
        &mut self.contexts[cx as usize]
    }
}

/// One row of Table E.1.
#[derive(Debug, Clone, Copy)]
struct QeEntry {
    qe: u16,
    nmps: u8,
    nlps: u8,
    switch: bool,
}

const fn qe(qe: u16, nmps: u8, nlps: u8, switch: u8) -> QeEntry {
    QeEntry {
        qe,
        nmps,
        nlps,
        switch: switch == 1,
    }
}

/// "Table E.1 - Qe values and probability estimation process"
#[rustfmt::skip]
static QE_TABLE: [QeEntry; 47] = [
    qe(0x5601, 1, 1, 1), qe(0x3401, 2, 6, 0), qe(0x1801, 3, 9, 0), qe(0x0AC1, 4, 12, 0),
    qe(0x0521, 5, 29, 0), qe(0x0221, 38, 33, 0), qe(0x5601, 7, 6, 1), qe(0x5401, 8, 14, 0),
    qe(0x4801, 9, 14, 0), qe(0x3801, 10, 14, 0), qe(0x3001, 11, 17, 0), qe(0x2401, 12, 18, 0),
    qe(0x1C01, 13, 20, 0), qe(0x1601, 29, 21, 0), qe(0x5601, 15, 14, 1), qe(0x5401, 16, 14, 0),
    qe(0x5101, 17, 15, 0), qe(0x4801, 18, 16, 0), qe(0x3801, 19, 17, 0), qe(0x3401, 20, 18, 0),
    qe(0x3001, 21, 19, 0), qe(0x2801, 22, 19, 0), qe(0x2401, 23, 20, 0), qe(0x2201, 24, 21, 0),
    qe(0x1C01, 25, 22, 0), qe(0x1801, 26, 23, 0), qe(0x1601, 27, 24, 0), qe(0x1401, 28, 25, 0),
    qe(0x1201, 29, 26, 0), qe(0x1101, 30, 27, 0), qe(0x0AC1, 31, 28, 0), qe(0x09C1, 32, 29, 0),
    qe(0x08A1, 33, 30, 0), qe(0x0521, 34, 31, 0), qe(0x0441, 35, 32, 0), qe(0x02A1, 36, 33, 0),
    qe(0x0221, 37, 34, 0), qe(0x0141, 38, 35, 0), qe(0x0111, 39, 36, 0), qe(0x0085, 40, 37, 0),
    qe(0x0049, 41, 38, 0), qe(0x0025, 42, 39, 0), qe(0x0015, 43, 40, 0), qe(0x0009, 44, 41, 0),
    qe(0x0005, 45, 42, 0), qe(0x0001, 45, 43, 0), qe(0x5601, 46, 46, 0),
];

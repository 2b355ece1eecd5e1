//! Fixture builders shared by the integration tests: an MQ arithmetic
//! encoder and helpers that assemble segments and files.

#![allow(dead_code)]

use monobit_jbig2::Bitmap;

/// Qe, NMPS, NLPS and SWITCH of Table E.1.
#[rustfmt::skip]
const QE_TABLE: [(u32, usize, usize, bool); 47] = [
    (0x5601, 1, 1, true), (0x3401, 2, 6, false), (0x1801, 3, 9, false),
    (0x0AC1, 4, 12, false), (0x0521, 5, 29, false), (0x0221, 38, 33, false),
    (0x5601, 7, 6, true), (0x5401, 8, 14, false), (0x4801, 9, 14, false),
    (0x3801, 10, 14, false), (0x3001, 11, 17, false), (0x2401, 12, 18, false),
    (0x1C01, 13, 20, false), (0x1601, 29, 21, false), (0x5601, 15, 14, true),
    (0x5401, 16, 14, false), (0x5101, 17, 15, false), (0x4801, 18, 16, false),
    (0x3801, 19, 17, false), (0x3401, 20, 18, false), (0x3001, 21, 19, false),
    (0x2801, 22, 19, false), (0x2401, 23, 20, false), (0x2201, 24, 21, false),
    (0x1C01, 25, 22, false), (0x1801, 26, 23, false), (0x1601, 27, 24, false),
    (0x1401, 28, 25, false), (0x1201, 29, 26, false), (0x1101, 30, 27, false),
    (0x0AC1, 31, 28, false), (0x09C1, 32, 29, false), (0x08A1, 33, 30, false),
    (0x0521, 34, 31, false), (0x0441, 35, 32, false), (0x02A1, 36, 33, false),
    (0x0221, 37, 34, false), (0x0141, 38, 35, false), (0x0111, 39, 36, false),
    (0x0085, 40, 37, false), (0x0049, 41, 38, false), (0x0025, 42, 39, false),
    (0x0015, 43, 40, false), (0x0009, 44, 41, false), (0x0005, 45, 42, false),
    (0x0001, 45, 43, false), (0x5601, 46, 46, false),
];

/// The adaptive state of one context.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    index: usize,
    mps: u32,
}

/// A set of contexts, indexed like the decoder's context tables.
pub struct Contexts(Vec<Context>);

impl Contexts {
    pub fn new(size: usize) -> Self {
        Self(vec![Context::default(); size])
    }
}

/// The MQ encoder of Annex E (E.3).
pub struct Encoder {
    a: u32,
    c: u32,
    ct: u32,
    /// The output. The first byte stands in for the byte before the start of
    /// the data ("BPST - 1") and is dropped by `finish`.
    out: Vec<u8>,
}

impl Encoder {
    /// INITENC (Figure E.20).
    pub fn new() -> Self {
        Self {
            a: 0x8000,
            c: 0,
            ct: 12,
            out: vec![0],
        }
    }

    /// ENCODE (Figure E.3).
    pub fn encode(&mut self, contexts: &mut Contexts, cx: usize, d: u32) {
        let context = &mut contexts.0[cx];
        let (qe, nmps, nlps, switch) = QE_TABLE[context.index];

        self.a -= qe;

        if d == context.mps {
            // CODEMPS (Figure E.6)
            if self.a & 0x8000 == 0 {
                if self.a < qe {
                    self.a = qe;
                } else {
                    self.c += qe;
                }
                context.index = nmps;
                self.renormalize();
            } else {
                self.c += qe;
            }
        } else {
            // CODELPS (Figure E.5)
            if self.a < qe {
                self.c += qe;
            } else {
                self.a = qe;
            }
            if switch {
                context.mps = 1 - context.mps;
            }
            context.index = nlps;
            self.renormalize();
        }
    }

    /// RENORME (Figure E.8).
    fn renormalize(&mut self) {
        loop {
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;

            if self.ct == 0 {
                self.byte_out();
            }

            if self.a & 0x8000 != 0 {
                break;
            }
        }
    }

    /// BYTEOUT (Figure E.10).
    fn byte_out(&mut self) {
        let b = self.out.last_mut().unwrap();

        if *b == 0xFF {
            self.emit_7_bits();
        } else if self.c < 0x800_0000 {
            self.emit_8_bits();
        } else {
            *b += 1;
            if *b == 0xFF {
                self.c &= 0x7FF_FFFF;
                self.emit_7_bits();
            } else {
                self.emit_8_bits();
            }
        }
    }

    fn emit_7_bits(&mut self) {
        self.out.push((self.c >> 20) as u8);
        self.c &= 0xF_FFFF;
        self.ct = 7;
    }

    fn emit_8_bits(&mut self) {
        self.out.push((self.c >> 19) as u8);
        self.c &= 0x7_FFFF;
        self.ct = 8;
    }

    /// FLUSH (Figure E.11), followed by the 0xFF 0xAC marker.
    pub fn finish(mut self) -> Vec<u8> {
        // SETBITS (Figure E.12)
        let temp = self.c + self.a;
        self.c |= 0xFFFF;
        if self.c >= temp {
            self.c -= 0x8000;
        }

        self.c <<= self.ct;
        self.byte_out();
        self.c <<= self.ct;
        self.byte_out();

        if self.out.last() != Some(&0xFF) {
            self.out.push(0xFF);
        }
        self.out.push(0xAC);

        self.out.remove(0);
        self.out
    }
}

/// Encode a value with an IAx procedure (A.2). `None` encodes OOB.
pub fn encode_integer(encoder: &mut Encoder, contexts: &mut Contexts, value: Option<i32>) {
    let mut prev = 1_u32;
    let mut bit = |encoder: &mut Encoder, d: u32| {
        encoder.encode(contexts, (prev & 0x1FF) as usize, d);
        prev = if prev < 256 {
            (prev << 1) | d
        } else {
            (((prev << 1) | d) & 511) | 256
        };
    };

    let (sign, magnitude) = match value {
        None => (1, 0),
        Some(v) => (u32::from(v < 0), v.unsigned_abs()),
    };

    // (prefix bits, value bits, offset) per row of Table A.1.
    const RANGES: [(&[u32], u32, u32); 6] = [
        (&[0], 2, 0),
        (&[1, 0], 4, 4),
        (&[1, 1, 0], 6, 20),
        (&[1, 1, 1, 0], 8, 84),
        (&[1, 1, 1, 1, 0], 12, 340),
        (&[1, 1, 1, 1, 1], 32, 4436),
    ];

    let (prefix, bits, offset) = RANGES
        .into_iter()
        .find(|(_, bits, offset)| {
            u64::from(magnitude) < u64::from(*offset) + (1_u64 << *bits)
        })
        .unwrap();

    bit(encoder, sign);
    for &d in prefix {
        bit(encoder, d);
    }
    let v = magnitude - offset;
    for i in (0..bits).rev() {
        bit(encoder, (v >> i) & 1);
    }
}

/// Encode a symbol ID with the IAID procedure (A.3).
pub fn encode_symbol_id(encoder: &mut Encoder, contexts: &mut Contexts, id: u32, code_len: u32) {
    let mut prev = 1_u32;
    for i in (0..code_len).rev() {
        let d = (id >> i) & 1;
        encoder.encode(contexts, prev as usize, d);
        prev = (prev << 1) | d;
    }
}

/// The template 0 pixels with the nominal AT pixels, most significant
/// context bit first.
pub const TEMPLATE_0: [(i32, i32); 16] = [
    (-2, -2), (-1, -2), (0, -2), (1, -2), (2, -2),
    (-3, -1), (-2, -1), (-1, -1), (0, -1), (1, -1), (2, -1), (3, -1),
    (-4, 0), (-3, 0), (-2, 0), (-1, 0),
];

/// The nominal AT pixels of template 0, as stored in a segment.
pub const TEMPLATE_0_AT: [u8; 8] = [0x03, 0xFF, 0xFD, 0xFF, 0x02, 0xFE, 0xFE, 0xFE];

fn pixel(bitmap: &Bitmap, x: i32, y: i32) -> u32 {
    if x < 0 || y < 0 || x >= bitmap.width as i32 || y >= bitmap.height as i32 {
        0
    } else {
        u32::from(bitmap.get_pixel(x as u32, y as u32))
    }
}

/// Encode `bitmap` with the generic region procedure, using the context
/// formed by `pixels`. With `tpgdon`, rows equal to the one above are
/// skipped using the given SLTP context.
pub fn encode_bitmap(
    encoder: &mut Encoder,
    contexts: &mut Contexts,
    bitmap: &Bitmap,
    pixels: &[(i32, i32)],
    tpgdon: Option<usize>,
) {
    let mut ltp = false;

    for y in 0..bitmap.height as i32 {
        if let Some(sltp_context) = tpgdon {
            let same = (0..bitmap.width as i32).all(|x| pixel(bitmap, x, y) == pixel(bitmap, x, y - 1));
            encoder.encode(contexts, sltp_context, u32::from(same != ltp));
            ltp = same;

            if ltp {
                continue;
            }
        }

        for x in 0..bitmap.width as i32 {
            let context = pixels
                .iter()
                .fold(0, |context, (dx, dy)| (context << 1) | pixel(bitmap, x + dx, y + dy));
            encoder.encode(contexts, context as usize, pixel(bitmap, x, y));
        }
    }
}

/// Build a bitmap from rows of '0' and '1'.
pub fn bitmap(rows: &[&str]) -> Bitmap {
    let mut bitmap = Bitmap::new(rows[0].len() as u32, rows.len() as u32);
    for (y, row) in rows.iter().enumerate() {
        for (x, c) in row.bytes().enumerate() {
            bitmap.set_pixel(x as u32, y as u32, c == b'1');
        }
    }
    bitmap
}

/// A segment with a short header. All numbers involved must be below 256.
pub fn segment(number: u32, segment_type: u8, referred: &[u32], page: u8, data: &[u8]) -> Vec<u8> {
    assert!(referred.len() <= 4 && number <= 256);

    let mut out = number.to_be_bytes().to_vec();
    out.push(segment_type);
    out.push((referred.len() as u8) << 5);
    out.extend(referred.iter().map(|n| *n as u8));
    out.push(page);
    out.extend((data.len() as u32).to_be_bytes());
    out.extend(data);
    out
}

/// The data of a page information segment without striping.
pub fn page_information(width: u32, height: u32, flags: u8) -> Vec<u8> {
    let mut out = Vec::new();
    for value in [width, height, 0, 0] {
        out.extend(value.to_be_bytes());
    }
    out.push(flags);
    out.extend([0, 0]);
    out
}

/// A region segment information field.
pub fn region_info(width: u32, height: u32, x: u32, y: u32, operator: u8) -> Vec<u8> {
    let mut out = Vec::new();
    for value in [width, height, x, y] {
        out.extend(value.to_be_bytes());
    }
    out.push(operator);
    out
}

/// The data of a generic region segment, arithmetic coded with template 0
/// and the nominal AT pixels.
pub fn generic_region(bitmap: &Bitmap, x: u32, y: u32, tpgdon: bool) -> Vec<u8> {
    let mut out = region_info(bitmap.width, bitmap.height, x, y, 0);
    out.push(if tpgdon { 0x08 } else { 0x00 });
    out.extend(TEMPLATE_0_AT);

    let mut encoder = Encoder::new();
    let mut contexts = Contexts::new(1 << 16);
    encode_bitmap(
        &mut encoder,
        &mut contexts,
        bitmap,
        &TEMPLATE_0,
        tpgdon.then_some(0b1001_1011_0010_0101),
    );
    out.extend(encoder.finish());
    out
}

/// A sequential standalone file with a single page.
pub fn file(segments: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];
    out.push(0x01);
    out.extend(1_u32.to_be_bytes());
    for segment in segments {
        out.extend(segment);
    }
    out
}

/// An 8x8 checkerboard of `width` x `height` pixels whose top-left square is
/// black.
pub fn checkerboard(width: u32, height: u32) -> Bitmap {
    let mut bitmap = Bitmap::new(width, height);
    for y in 0..height {
        for x in 0..width {
            bitmap.set_pixel(x, y, (x / 8 + y / 8) % 2 == 0);
        }
    }
    bitmap
}

/// Pack a string of '0' and '1' into bytes, most significant bit first.
/// Spaces are ignored and the last byte is padded with zeros.
pub fn bits(s: &str) -> Vec<u8> {
    let bits: Vec<u8> = s.bytes().filter(|b| *b != b' ').map(|b| b - b'0').collect();
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0, |byte, (i, bit)| byte | (bit << (7 - i)))
        })
        .collect()
}

/// Render a bitmap as rows of '0' and '1'.
pub fn rows(bitmap: &Bitmap) -> Vec<String> {
    (0..bitmap.height)
        .map(|y| {
            bitmap
                .row(y)
                .iter()
                .map(|black| if *black { '1' } else { '0' })
                .collect()
        })
        .collect()
}

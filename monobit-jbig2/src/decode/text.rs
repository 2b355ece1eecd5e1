//! The text region decoding procedure (6.4) and text region segments (7.4.3).
//!
//! The same procedure also decodes aggregated symbols of refinement/aggregate
//! symbol dictionaries. In that case it shares the dictionary's coder, see
//! [`TextCoder`].

use core::iter;

use super::refinement::{self, RefinementParams};
use super::{
    AdaptiveTemplatePixel, RefinementTemplate, Region, RegionSegmentInfo,
    read_refinement_at_pixels,
};
use crate::arithmetic_decoder::{ArithmeticDecoder, ContextTable};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{DecodeError, HuffmanError, RegionError, Result, SymbolError, bail};
use crate::huffman_table::{CustomTables, HuffmanTable, StandardTable};
use crate::integer_decoder::IntegerDecoders;
use crate::reader::Reader;
use crate::symbol_id_decoder::SymbolIdDecoder;

/// "REFCORNER" (7.4.3.1.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReferenceCorner {
    BottomLeft,
    TopLeft,
    BottomRight,
    TopRight,
}

impl ReferenceCorner {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x03 {
            0 => Self::BottomLeft,
            1 => Self::TopLeft,
            2 => Self::BottomRight,
            _ => Self::TopRight,
        }
    }

    fn is_right(self) -> bool {
        matches!(self, Self::BottomRight | Self::TopRight)
    }

    fn is_bottom(self) -> bool {
        matches!(self, Self::BottomLeft | Self::BottomRight)
    }
}

/// Parameters of one invocation of the text region decoding procedure
/// (Table 9), minus the ones that select the coder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextRegionParams<'a> {
    /// "SBW"
    pub(crate) width: u32,
    /// "SBH"
    pub(crate) height: u32,
    /// "SBNUMINSTANCES"
    pub(crate) num_instances: u32,
    /// "LOGSBSTRIPS"
    pub(crate) log_strips: u32,
    /// "SBSYMS"
    pub(crate) symbols: &'a [&'a Bitmap],
    /// "SBDEFPIXEL"
    pub(crate) default_pixel: bool,
    /// "SBCOMBOP"
    pub(crate) operator: CombinationOperator,
    /// "TRANSPOSED"
    pub(crate) transposed: bool,
    /// "REFCORNER"
    pub(crate) corner: ReferenceCorner,
    /// "SBDSOFFSET"
    pub(crate) ds_offset: i32,
    /// "SBREFINE"
    pub(crate) refine: bool,
    /// "SBRTEMPLATE"
    pub(crate) refinement_template: RefinementTemplate,
    /// "SBRAT"
    pub(crate) refinement_at: &'a [AdaptiveTemplatePixel],
}

/// The Huffman tables of a Huffman-coded text region.
#[derive(Clone, Copy)]
pub(crate) struct TextHuffmanTables<'t> {
    pub(crate) fs: &'t HuffmanTable,
    pub(crate) ds: &'t HuffmanTable,
    pub(crate) dt: &'t HuffmanTable,
    pub(crate) rdw: &'t HuffmanTable,
    pub(crate) rdh: &'t HuffmanTable,
    pub(crate) rdx: &'t HuffmanTable,
    pub(crate) rdy: &'t HuffmanTable,
    pub(crate) rsize: &'t HuffmanTable,
}

impl TextHuffmanTables<'static> {
    /// The tables a refinement/aggregate symbol dictionary uses for its
    /// aggregates (Table 17).
    pub(crate) fn aggregate() -> Self {
        Self {
            fs: StandardTable::F.get(),
            ds: StandardTable::H.get(),
            dt: StandardTable::K.get(),
            rdw: StandardTable::O.get(),
            rdh: StandardTable::O.get(),
            rdx: StandardTable::O.get(),
            rdy: StandardTable::O.get(),
            rsize: StandardTable::A.get(),
        }
    }
}

/// How symbol IDs are coded in Huffman mode.
#[derive(Clone, Copy)]
pub(crate) enum SymbolIdCodes<'t> {
    /// Codes from the symbol ID Huffman table (7.4.3.1.7).
    Table(&'t HuffmanTable),
    /// Fixed-length codes of the given number of bits.
    Fixed(u32),
}

/// The entropy coder a text region is decoded with.
pub(crate) enum TextCoder<'c, 'd> {
    Huffman {
        reader: &'c mut Reader<'d>,
        tables: TextHuffmanTables<'c>,
        ids: SymbolIdCodes<'c>,
    },
    Arithmetic {
        decoder: &'c mut ArithmeticDecoder<'d>,
        integers: &'c mut IntegerDecoders,
        ids: &'c mut SymbolIdDecoder,
        /// The refinement contexts, shared by all refined instances.
        refinement: &'c mut ContextTable,
    },
}

impl TextCoder<'_, '_> {
    /// "STRIPT" delta, in units of strips (6.4.6).
    fn strip_delta_t(&mut self) -> Result<i32> {
        match self {
            Self::Huffman { reader, tables, .. } => tables.dt.decode_value(reader),
            Self::Arithmetic {
                decoder, integers, ..
            } => integers.dt.decode_value(decoder),
        }
    }

    /// "DFS" (6.4.7)
    fn first_s(&mut self) -> Result<i32> {
        match self {
            Self::Huffman { reader, tables, .. } => tables.fs.decode_value(reader),
            Self::Arithmetic {
                decoder, integers, ..
            } => integers.fs.decode_value(decoder),
        }
    }

    /// "IDS", or `None` at the end of the strip (6.4.8).
    fn delta_s(&mut self) -> Result<Option<i32>> {
        match self {
            Self::Huffman { reader, tables, .. } => tables.ds.decode(reader),
            Self::Arithmetic {
                decoder, integers, ..
            } => integers.ds.decode(decoder),
        }
    }

    /// "CURT" (6.4.9)
    fn current_t(&mut self, log_strips: u32) -> Result<i32> {
        // "If SBSTRIPS = 1, then CURT = 0."
        if log_strips == 0 {
            return Ok(0);
        }

        match self {
            Self::Huffman { reader, .. } => Ok(reader.read_bits(log_strips)? as i32),
            Self::Arithmetic {
                decoder, integers, ..
            } => integers.it.decode_value(decoder),
        }
    }

    /// "ID_I" (6.4.10)
    fn symbol_id(&mut self) -> Result<u32> {
        match self {
            Self::Huffman {
                reader,
                ids: SymbolIdCodes::Table(table),
                ..
            } => Ok(table.decode_value(reader)? as u32),
            Self::Huffman {
                reader,
                ids: SymbolIdCodes::Fixed(len),
                ..
            } => reader.read_bits(*len),
            Self::Arithmetic { decoder, ids, .. } => Ok(ids.decode(decoder)),
        }
    }

    /// "R_I" (6.4.11)
    fn refinement_flag(&mut self) -> Result<bool> {
        match self {
            Self::Huffman { reader, .. } => Ok(reader.read_bit()? != 0),
            Self::Arithmetic {
                decoder, integers, ..
            } => Ok(integers.ri.decode_value(decoder)? != 0),
        }
    }

    /// Decode a refined symbol instance bitmap (6.4.11).
    fn refine(
        &mut self,
        symbol: &Bitmap,
        params: &TextRegionParams<'_>,
        max_pixels: u64,
    ) -> Result<Bitmap> {
        match self {
            Self::Huffman { reader, tables, .. } => {
                let deltas = RefinementDeltas {
                    width: tables.rdw.decode_value(reader)?,
                    height: tables.rdh.decode_value(reader)?,
                    x: tables.rdx.decode_value(reader)?,
                    y: tables.rdy.decode_value(reader)?,
                };

                // "BMSIZE [...] skip to the next byte boundary" and decode
                // the refinement from exactly that many bytes.
                let size = tables.rsize.decode_value(reader)?;
                reader.align();
                let size = usize::try_from(size).map_err(|_| HuffmanError::InvalidCode)?;
                let data = reader.read_bytes(size)?;

                let mut decoder = ArithmeticDecoder::new(data);
                let mut contexts =
                    ContextTable::new(1 << params.refinement_template.context_bits());

                deltas.decode(&mut decoder, &mut contexts, symbol, params, max_pixels)
            }
            Self::Arithmetic {
                decoder,
                integers,
                refinement,
                ..
            } => {
                let deltas = RefinementDeltas {
                    width: integers.rdw.decode_value(decoder)?,
                    height: integers.rdh.decode_value(decoder)?,
                    x: integers.rdx.decode_value(decoder)?,
                    y: integers.rdy.decode_value(decoder)?,
                };

                deltas.decode(decoder, refinement, symbol, params, max_pixels)
            }
        }
    }
}

/// "RDW_I", "RDH_I", "RDX_I" and "RDY_I".
struct RefinementDeltas {
    width: i32,
    height: i32,
    x: i32,
    y: i32,
}

impl RefinementDeltas {
    fn decode(
        &self,
        decoder: &mut ArithmeticDecoder<'_>,
        contexts: &mut ContextTable,
        symbol: &Bitmap,
        params: &TextRegionParams<'_>,
        max_pixels: u64,
    ) -> Result<Bitmap> {
        let dimension = |base: u32, delta: i32| {
            u32::try_from(i64::from(base) + i64::from(delta))
                .map_err(|_| DecodeError::from(RegionError::InvalidDimension))
        };

        // "GRREFERENCEDX = floor(RDW_I / 2) + RDX_I
        // GRREFERENCEDY = floor(RDH_I / 2) + RDY_I" (Table 12)
        let reference_dx = self
            .width
            .div_euclid(2)
            .checked_add(self.x)
            .ok_or(DecodeError::Overflow)?;
        let reference_dy = self
            .height
            .div_euclid(2)
            .checked_add(self.y)
            .ok_or(DecodeError::Overflow)?;

        refinement::decode_bitmap(
            decoder,
            contexts,
            &RefinementParams {
                width: dimension(symbol.width, self.width)?,
                height: dimension(symbol.height, self.height)?,
                template: params.refinement_template,
                reference: symbol,
                reference_dx,
                reference_dy,
                tpgron: false,
                at_pixels: params.refinement_at,
            },
            max_pixels,
        )
    }
}

/// Decode a text region segment (7.4.3).
///
/// `symbols` are the exported symbols of the referred symbol dictionaries,
/// `tables` the referred custom Huffman tables, both in reference order.
pub(crate) fn decode_region(
    data: &[u8],
    symbols: &[&Bitmap],
    tables: &[&HuffmanTable],
    max_pixels: u64,
) -> Result<Region> {
    let mut reader = Reader::new(data);
    let info = RegionSegmentInfo::parse(&mut reader)?;

    // 7.4.3.1.1
    let flags = reader.read_u16()?;
    let huffman = flags & 0x0001 != 0;
    let refine = flags & 0x0002 != 0;
    let log_strips = u32::from((flags >> 2) & 0x03);
    let corner = ReferenceCorner::from_bits(flags >> 4);
    let transposed = flags & 0x0040 != 0;
    let operator = CombinationOperator::from_value(((flags >> 7) & 0x03) as u8)?;
    let default_pixel = flags & 0x0200 != 0;
    // "Bits 10-14: SBDSOFFSET. [...] a signed five-bit quantity"
    let ds_offset = (i32::from((flags >> 10) & 0x1F) << 27) >> 27;
    let refinement_template = RefinementTemplate::from_bit((flags >> 15) as u8);

    let huffman_tables = if huffman {
        let mut custom = CustomTables::new(tables);
        Some(read_huffman_flags(reader.read_u16()?, &mut custom)?)
    } else {
        None
    };

    let refinement_at = if refine {
        read_refinement_at_pixels(&mut reader, refinement_template)?
    } else {
        Vec::new()
    };

    let num_instances = reader.read_u32()?;

    if symbols.is_empty() && num_instances > 0 {
        bail!(SymbolError::NoSymbols);
    }

    let params = TextRegionParams {
        width: info.width,
        height: info.height,
        num_instances,
        log_strips,
        symbols,
        default_pixel,
        operator,
        transposed,
        corner,
        ds_offset,
        refine,
        refinement_template,
        refinement_at: &refinement_at,
    };

    let bitmap = if let Some(tables) = huffman_tables {
        let id_table = read_symbol_id_table(&mut reader, symbols.len())?;

        decode_text_region(
            &mut TextCoder::Huffman {
                reader: &mut reader,
                tables,
                ids: SymbolIdCodes::Table(&id_table),
            },
            &params,
            max_pixels,
        )?
    } else {
        let mut decoder = ArithmeticDecoder::new(reader.tail());
        let mut integers = IntegerDecoders::new();
        // "SBSYMCODELEN = ⌈log2(SBNUMSYMS)⌉" (7.4.3.1.7)
        let mut ids = SymbolIdDecoder::new(symbol_code_len(symbols.len()));
        let mut contexts = ContextTable::new(1 << refinement_template.context_bits());

        decode_text_region(
            &mut TextCoder::Arithmetic {
                decoder: &mut decoder,
                integers: &mut integers,
                ids: &mut ids,
                refinement: &mut contexts,
            },
            &params,
            max_pixels,
        )?
    };

    Ok(Region { info, bitmap })
}

/// "⌈log2(n)⌉", the number of bits needed to tell `n` symbols apart.
pub(crate) fn symbol_code_len(n: usize) -> u32 {
    usize::BITS - n.saturating_sub(1).leading_zeros()
}

/// Select the tables of a Huffman-coded text region (7.4.3.1.2).
///
/// "User-supplied" tables are taken in the order FS, DS, DT, RDW, RDH, RDX,
/// RDY, RSIZE.
fn read_huffman_flags<'t>(
    flags: u16,
    custom: &mut CustomTables<'t>,
) -> Result<TextHuffmanTables<'t>> {
    use StandardTable::*;

    let mut pick = |shift: u16, options: &[StandardTable]| -> Result<&'t HuffmanTable> {
        let bits = usize::from((flags >> shift) & 0x03);
        if bits == 3 {
            return custom.select(true, A);
        }

        let table = options.get(bits).ok_or(HuffmanError::InvalidSelection)?;
        custom.select(false, *table)
    };

    let fs = pick(0, &[F, G])?;
    let ds = pick(2, &[H, I, J])?;
    let dt = pick(4, &[K, L, M])?;
    let rdw = pick(6, &[N, O])?;
    let rdh = pick(8, &[N, O])?;
    let rdx = pick(10, &[N, O])?;
    let rdy = pick(12, &[N, O])?;
    let rsize = custom.select(flags & 0x4000 != 0, A)?;

    Ok(TextHuffmanTables {
        fs,
        ds,
        dt,
        rdw,
        rdh,
        rdx,
        rdy,
        rsize,
    })
}

/// Read the symbol ID Huffman table (7.4.3.1.7).
fn read_symbol_id_table(reader: &mut Reader<'_>, num_symbols: usize) -> Result<HuffmanTable> {
    // "1) Read the code lengths for RUNCODE0 through RUNCODE34; each is
    // stored as a four-bit value."
    let mut run_code_lengths = [0_u8; 35];
    for len in &mut run_code_lengths {
        *len = reader.read_bits(4)? as u8;
    }
    let run_codes = HuffmanTable::from_code_lengths(&run_code_lengths);

    // "3) Read the code lengths for the symbols [...] using the run codes"
    let mut lengths = Vec::with_capacity(num_symbols);
    while lengths.len() < num_symbols {
        let (len, repeat) = match run_codes.decode_value(reader)? {
            code @ 0..=31 => (code as u8, 1),
            // "Repeat the previous symbol ID code length 3-6 times"
            32 => {
                let previous = *lengths.last().ok_or(HuffmanError::InvalidCode)?;
                (previous, reader.read_bits(2)? + 3)
            }
            // "Repeat symbol ID code length 0 for 3-10 times"
            33 => (0, reader.read_bits(3)? + 3),
            // "Repeat symbol ID code length 0 for 11-138 times"
            34 => (0, reader.read_bits(7)? + 11),
            _ => bail!(HuffmanError::InvalidCode),
        };

        if lengths.len() + repeat as usize > num_symbols {
            bail!(HuffmanError::InvalidTable);
        }

        lengths.extend(iter::repeat_n(len, repeat as usize));
    }

    // "4) Skip over the remaining bits in the last byte read"
    reader.align();

    Ok(HuffmanTable::from_code_lengths(&lengths))
}

/// Decode the symbol instances of a text region (6.4.5).
pub(crate) fn decode_text_region(
    coder: &mut TextCoder<'_, '_>,
    params: &TextRegionParams<'_>,
    max_pixels: u64,
) -> Result<Bitmap> {
    // "1) Fill a bitmap SBREG, of the size given by SBW and SBH, with the
    // SBDEFPIXEL value."
    let mut region = Bitmap::new_checked(params.width, params.height, max_pixels)?;
    if params.default_pixel {
        region.fill(true);
    }

    let strips = 1_i32 << params.log_strips;
    let strip_delta = |coder: &mut TextCoder<'_, '_>| -> Result<i32> {
        coder
            .strip_delta_t()?
            .checked_mul(strips)
            .ok_or(DecodeError::Overflow)
    };

    // "2) Decode the initial STRIPT value [...] Negate the decoded value and
    // assign this negated value to the variable STRIPT."
    let mut strip_t = strip_delta(coder)?
        .checked_neg()
        .ok_or(DecodeError::Overflow)?;
    let mut first_s = 0_i32;
    let mut instances = 0_u32;

    // "3) Decode each strip as follows: a) If NINSTANCES is equal to
    // SBNUMINSTANCES then there are no more strips to decode"
    while instances < params.num_instances {
        // "b) Decode the strip's delta T value [...] STRIPT = STRIPT + DT"
        strip_t = strip_t
            .checked_add(strip_delta(coder)?)
            .ok_or(DecodeError::Overflow)?;

        let mut current_s: Option<i32> = None;

        loop {
            let s = match current_s {
                // "i) If the current symbol instance is the first symbol
                // instance in the strip, then decode the first symbol
                // instance's S coordinate [...] FIRSTS = FIRSTS + DFS;
                // CURS = FIRSTS"
                None => {
                    first_s = first_s
                        .checked_add(coder.first_s()?)
                        .ok_or(DecodeError::Overflow)?;
                    first_s
                }
                // "ii) Otherwise, decode the symbol instance's S coordinate
                // [...] If the result of this decoding is OOB then the last
                // symbol instance of the strip has been decoded"
                Some(s) => match coder.delta_s()? {
                    None => break,
                    Some(ds) => s
                        .checked_add(ds)
                        .and_then(|s| s.checked_add(params.ds_offset))
                        .ok_or(DecodeError::Overflow)?,
                },
            };

            if instances == params.num_instances {
                bail!(SymbolError::TooManySymbols);
            }

            // "iii) Decode the symbol instance's T coordinate [...]
            // T_I = STRIPT + CURT"
            let t = strip_t
                .checked_add(coder.current_t(params.log_strips)?)
                .ok_or(DecodeError::Overflow)?;

            let id = coder.symbol_id()? as usize;
            let symbol = *params.symbols.get(id).ok_or(SymbolError::OutOfRange)?;

            let refined = if params.refine && coder.refinement_flag()? {
                Some(coder.refine(symbol, params, max_pixels)?)
            } else {
                None
            };
            let bitmap = refined.as_ref().unwrap_or(symbol);

            let s = place_instance(&mut region, bitmap, s, t, params);
            current_s = Some(i32::try_from(s).map_err(|_| DecodeError::Overflow)?);
            instances += 1;
        }
    }

    Ok(region)
}

/// Draw one symbol instance and return the updated "CURS" (6.4.5, steps
/// 3 c vi) to xi)).
fn place_instance(
    region: &mut Bitmap,
    bitmap: &Bitmap,
    s: i32,
    t: i32,
    params: &TextRegionParams<'_>,
) -> i64 {
    let width = i64::from(bitmap.width);
    let height = i64::from(bitmap.height);
    let corner = params.corner;
    let mut s = i64::from(s);
    let t = i64::from(t);

    // The extent of the instance along the S axis.
    let extent = if params.transposed { height } else { width };
    // Whether "CURS" points at the far edge of the instance along S.
    let s_at_far_edge = if params.transposed {
        corner.is_bottom()
    } else {
        corner.is_right()
    };

    if s_at_far_edge {
        s += extent - 1;
    }

    // "vii) Set: S_I = CURS"
    let (x, y) = if params.transposed { (t, s) } else { (s, t) };
    let x = if corner.is_right() { x - width + 1 } else { x };
    let y = if corner.is_bottom() { y - height + 1 } else { y };

    region.compose(bitmap, x, y, params.operator);

    if !s_at_far_edge {
        s += extent - 1;
    }

    s
}

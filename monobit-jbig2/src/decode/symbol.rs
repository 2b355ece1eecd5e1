//! The symbol dictionary decoding procedure (6.5) and symbol dictionary
//! segments (7.4.2).

use super::generic::{self, GenericParams};
use super::refinement::{self, RefinementParams};
use super::text::{
    self, ReferenceCorner, SymbolIdCodes, TextCoder, TextHuffmanTables, TextRegionParams,
};
use super::{
    AdaptiveTemplatePixel, RefinementTemplate, Template, read_at_pixels,
    read_refinement_at_pixels,
};
use crate::arithmetic_decoder::{ArithmeticDecoder, ContextTable};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{
    DecodeError, HuffmanError, RegionError, Result, SymbolError, TemplateError, bail,
};
use crate::huffman_table::{CustomTables, HuffmanTable, StandardTable};
use crate::integer_decoder::IntegerDecoders;
use crate::reader::Reader;
use crate::symbol_id_decoder::SymbolIdDecoder;

/// Symbol IDs of aggregates are decoded with `2^len` contexts, so the number
/// of symbols a refinement/aggregate dictionary may declare is capped.
const MAX_SYMBOL_CODE_LEN: u32 = 24;

/// A decoded symbol dictionary segment.
#[derive(Debug, Clone)]
pub(crate) struct SymbolDictionary {
    /// "SDEXSYMS"
    pub(crate) exported: Vec<Bitmap>,
    /// The bitmap coding contexts, if "bitmap coding context retained" is 1.
    pub(crate) retained: Option<RetainedContexts>,
}

/// The generic and refinement region contexts of a symbol dictionary, kept
/// for a later dictionary that sets "bitmap coding context used". (7.4.2.2)
#[derive(Debug, Clone)]
pub(crate) struct RetainedContexts {
    template: Template,
    refinement_template: RefinementTemplate,
    generic: ContextTable,
    refinement: ContextTable,
}

impl RetainedContexts {
    fn new(template: Template, refinement_template: RefinementTemplate) -> Self {
        Self {
            template,
            refinement_template,
            generic: ContextTable::new(1 << template.context_bits()),
            refinement: ContextTable::new(1 << refinement_template.context_bits()),
        }
    }
}

/// Symbol dictionary flags and the fields that follow them (7.4.2.1).
#[derive(Debug)]
struct DictionaryHeader {
    flags: u16,
    /// "SDHUFF"
    huffman: bool,
    /// "SDREFAGG"
    refine_aggregate: bool,
    context_used: bool,
    context_retained: bool,
    /// "SDTEMPLATE"
    template: Template,
    /// "SDRTEMPLATE"
    refinement_template: RefinementTemplate,
    /// "SDAT"
    at_pixels: Vec<AdaptiveTemplatePixel>,
    /// "SDRAT"
    refinement_at: Vec<AdaptiveTemplatePixel>,
    /// "SDNUMEXSYMS"
    num_exported: u32,
    /// "SDNUMNEWSYMS"
    num_new: u32,
}

fn parse_header(reader: &mut Reader<'_>) -> Result<DictionaryHeader> {
    let flags = reader.read_u16()?;
    let huffman = flags & 0x0001 != 0;
    let refine_aggregate = flags & 0x0002 != 0;
    let template = Template::from_bits((flags >> 10) as u8);
    let refinement_template = RefinementTemplate::from_bit((flags >> 12) as u8);

    // "This field is only present if SDHUFF is 0." (7.4.2.1.2)
    let at_pixels = if huffman {
        Vec::new()
    } else {
        read_at_pixels(reader, template)?
    };

    // "This field is only present if SDREFAGG is 1 and SDRTEMPLATE is 0."
    // (7.4.2.1.3)
    let refinement_at = if refine_aggregate {
        read_refinement_at_pixels(reader, refinement_template)?
    } else {
        Vec::new()
    };

    Ok(DictionaryHeader {
        flags,
        huffman,
        refine_aggregate,
        context_used: flags & 0x0100 != 0,
        context_retained: flags & 0x0200 != 0,
        template,
        refinement_template,
        at_pixels,
        refinement_at,
        num_exported: reader.read_u32()?,
        num_new: reader.read_u32()?,
    })
}

/// The Huffman tables of a Huffman-coded symbol dictionary.
struct DictionaryTables<'t> {
    /// "SDHUFFDH"
    dh: &'t HuffmanTable,
    /// "SDHUFFDW"
    dw: &'t HuffmanTable,
    /// "SDHUFFBMSIZE"
    bmsize: &'t HuffmanTable,
    /// "SDHUFFAGGINST"
    agginst: &'t HuffmanTable,
}

/// Select the tables from the symbol dictionary flags (7.4.2.1.1).
///
/// User-supplied tables are taken in the order DH, DW, BMSIZE, AGGINST.
fn select_tables<'t>(flags: u16, custom: &mut CustomTables<'t>) -> Result<DictionaryTables<'t>> {
    let dh = match (flags >> 2) & 0x03 {
        0 => custom.select(false, StandardTable::D)?,
        1 => custom.select(false, StandardTable::E)?,
        3 => custom.select(true, StandardTable::D)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    let dw = match (flags >> 4) & 0x03 {
        0 => custom.select(false, StandardTable::B)?,
        1 => custom.select(false, StandardTable::C)?,
        3 => custom.select(true, StandardTable::B)?,
        _ => bail!(HuffmanError::InvalidSelection),
    };

    Ok(DictionaryTables {
        dh,
        dw,
        bmsize: custom.select(flags & 0x0040 != 0, StandardTable::A)?,
        agginst: custom.select(flags & 0x0080 != 0, StandardTable::A)?,
    })
}

/// The entropy coder of a symbol dictionary. Aggregates of a
/// refinement/aggregate dictionary are decoded with the same coder.
enum DictionaryCoder<'t, 'd> {
    Huffman {
        reader: Reader<'d>,
        tables: DictionaryTables<'t>,
        /// "SBSYMCODELEN" of the aggregates.
        id_len: u32,
    },
    Arithmetic {
        decoder: ArithmeticDecoder<'d>,
        integers: IntegerDecoders,
        ids: SymbolIdDecoder,
    },
}

impl DictionaryCoder<'_, '_> {
    /// "HCDH" (6.5.6)
    fn height_delta(&mut self) -> Result<i32> {
        match self {
            Self::Huffman { reader, tables, .. } => tables.dh.decode_value(reader),
            Self::Arithmetic {
                decoder, integers, ..
            } => integers.dh.decode_value(decoder),
        }
    }

    /// "DW", or `None` at the end of the height class (6.5.7).
    fn width_delta(&mut self) -> Result<Option<i32>> {
        match self {
            Self::Huffman { reader, tables, .. } => tables.dw.decode(reader),
            Self::Arithmetic {
                decoder, integers, ..
            } => integers.dw.decode(decoder),
        }
    }

    /// "REFAGGNINST" (6.5.8.2.1)
    fn aggregate_count(&mut self) -> Result<i32> {
        match self {
            Self::Huffman { reader, tables, .. } => tables.agginst.decode_value(reader),
            Self::Arithmetic {
                decoder, integers, ..
            } => integers.ai.decode_value(decoder),
        }
    }

    /// "EXRUNLENGTH" (6.5.10)
    fn export_run(&mut self) -> Result<i32> {
        match self {
            Self::Huffman { reader, .. } => StandardTable::A.get().decode_value(reader),
            Self::Arithmetic {
                decoder, integers, ..
            } => integers.ex.decode_value(decoder),
        }
    }
}

/// Decode a symbol dictionary segment (7.4.2.2).
///
/// `inputs` are the exported symbols of the referred symbol dictionaries and
/// `tables` the referred custom Huffman tables. `retained` holds the contexts
/// of the last referred symbol dictionary, if it kept them.
pub(crate) fn decode_dictionary(
    data: &[u8],
    inputs: &[&Bitmap],
    tables: &[&HuffmanTable],
    retained: Option<&RetainedContexts>,
    max_pixels: u64,
) -> Result<SymbolDictionary> {
    let mut reader = Reader::new(data);
    let header = parse_header(&mut reader)?;

    let mut contexts = match retained {
        Some(retained) if header.context_used => {
            if retained.template != header.template
                || retained.refinement_template != header.refinement_template
            {
                bail!(TemplateError::ContextMismatch);
            }

            retained.clone()
        }
        None if header.context_used => {
            lwarn!("symbol dictionary uses contexts that were never retained");
            RetainedContexts::new(header.template, header.refinement_template)
        }
        _ => RetainedContexts::new(header.template, header.refinement_template),
    };

    // "SBSYMCODELEN = ⌈log2(SDNUMINSYMS + SDNUMNEWSYMS)⌉" (6.5.8.2.3)
    let id_len = if header.refine_aggregate {
        let len = text::symbol_code_len(inputs.len().saturating_add(header.num_new as usize));
        if len > MAX_SYMBOL_CODE_LEN {
            bail!(SymbolError::TooManySymbols);
        }
        len
    } else {
        0
    };

    let mut coder = if header.huffman {
        let mut custom = CustomTables::new(tables);

        DictionaryCoder::Huffman {
            tables: select_tables(header.flags, &mut custom)?,
            reader,
            id_len: id_len.max(1),
        }
    } else {
        DictionaryCoder::Arithmetic {
            decoder: ArithmeticDecoder::new(reader.tail()),
            integers: IntegerDecoders::new(),
            ids: SymbolIdDecoder::new(id_len),
        }
    };

    let new_symbols = decode_new_symbols(&mut coder, &mut contexts, &header, inputs, max_pixels)?;
    let exported = export_symbols(&mut coder, &header, inputs, new_symbols)?;

    Ok(SymbolDictionary {
        exported,
        retained: header.context_retained.then_some(contexts),
    })
}

/// Decode the height classes (6.5.5, steps 1 to 4).
fn decode_new_symbols(
    coder: &mut DictionaryCoder<'_, '_>,
    contexts: &mut RetainedContexts,
    header: &DictionaryHeader,
    inputs: &[&Bitmap],
    max_pixels: u64,
) -> Result<Vec<Bitmap>> {
    let num_new = header.num_new as usize;
    let mut new_symbols: Vec<Bitmap> = Vec::new();
    // "HCHEIGHT"
    let mut height = 0_u32;

    // "4) Decode each height class as follows: a) If NSYMSDECODED ==
    // SDNUMNEWSYMS then all the symbols in the dictionary have been decoded"
    while new_symbols.len() < num_new {
        height = height
            .checked_add_signed(coder.height_delta()?)
            .ok_or(RegionError::InvalidDimension)?;

        // "SYMWIDTH" and "TOTWIDTH"
        let mut width = 0_u32;
        let mut total_width = 0_u32;
        // Widths of the symbols in a collective bitmap.
        let mut class_widths = Vec::new();

        // "c) Decode each symbol within the height class as follows: i)
        // Decode the delta width for the symbol [...] If the result of this
        // decoding is OOB then all the symbols in this height class have
        // been decoded"
        while let Some(delta) = coder.width_delta()? {
            if new_symbols.len() + class_widths.len() >= num_new {
                bail!(SymbolError::TooManySymbols);
            }

            width = width
                .checked_add_signed(delta)
                .ok_or(RegionError::InvalidDimension)?;
            total_width = total_width
                .checked_add(width)
                .ok_or(DecodeError::Overflow)?;

            let symbol = match coder {
                // "If SDHUFF is 1 and SDREFAGG is 0, then [...] the bitmap
                // is decoded later, as part of the collective bitmap"
                DictionaryCoder::Huffman { .. } if !header.refine_aggregate => {
                    class_widths.push(width);
                    continue;
                }
                DictionaryCoder::Arithmetic { decoder, .. } if !header.refine_aggregate => {
                    generic::decode_bitmap(
                        decoder,
                        &mut contexts.generic,
                        &GenericParams {
                            width,
                            height,
                            template: header.template,
                            tpgdon: false,
                            at_pixels: &header.at_pixels,
                            skip: None,
                        },
                        max_pixels,
                    )?
                }
                _ => {
                    let available: Vec<&Bitmap> =
                        inputs.iter().copied().chain(new_symbols.iter()).collect();

                    decode_aggregate(
                        coder,
                        &mut contexts.refinement,
                        header,
                        &available,
                        width,
                        height,
                        max_pixels,
                    )?
                }
            };

            new_symbols.push(symbol);
        }

        if let DictionaryCoder::Huffman { reader, tables, .. } = coder
            && !header.refine_aggregate
        {
            new_symbols.extend(decode_collective_bitmap(
                reader,
                tables.bmsize,
                &class_widths,
                total_width,
                height,
                max_pixels,
            )?);
        }
    }

    Ok(new_symbols)
}

/// Decode one symbol of a refinement/aggregate dictionary (6.5.8.2).
fn decode_aggregate(
    coder: &mut DictionaryCoder<'_, '_>,
    refinement_contexts: &mut ContextTable,
    header: &DictionaryHeader,
    symbols: &[&Bitmap],
    width: u32,
    height: u32,
    max_pixels: u64,
) -> Result<Bitmap> {
    let count = coder.aggregate_count()?;

    if count <= 0 {
        bail!(SymbolError::Invalid);
    }

    // "2) If REFAGGNINST is greater than one, then decode the bitmap itself
    // using a text region decoding procedure as described in 6.4. Set the
    // parameters to this decoding procedure as shown in Table 17."
    if count > 1 {
        let params = TextRegionParams {
            width,
            height,
            num_instances: count as u32,
            log_strips: 0,
            symbols,
            default_pixel: false,
            operator: CombinationOperator::Or,
            transposed: false,
            corner: ReferenceCorner::TopLeft,
            ds_offset: 0,
            refine: true,
            refinement_template: header.refinement_template,
            refinement_at: &header.refinement_at,
        };

        let mut text_coder = match coder {
            DictionaryCoder::Huffman { reader, id_len, .. } => TextCoder::Huffman {
                reader,
                tables: TextHuffmanTables::aggregate(),
                ids: SymbolIdCodes::Fixed(*id_len),
            },
            DictionaryCoder::Arithmetic {
                decoder,
                integers,
                ids,
            } => TextCoder::Arithmetic {
                decoder,
                integers,
                ids,
                refinement: refinement_contexts,
            },
        };

        return text::decode_text_region(&mut text_coder, &params, max_pixels);
    }

    // "3) If REFAGGNINST is equal to one, then decode the bitmap as described
    // in 6.5.8.2.2."
    let refine = |decoder: &mut ArithmeticDecoder<'_>,
                  contexts: &mut ContextTable,
                  id: u32,
                  dx: i32,
                  dy: i32|
     -> Result<Bitmap> {
        let reference = *symbols.get(id as usize).ok_or(SymbolError::OutOfRange)?;

        refinement::decode_bitmap(
            decoder,
            contexts,
            &RefinementParams {
                width,
                height,
                template: header.refinement_template,
                reference,
                reference_dx: dx,
                reference_dy: dy,
                tpgron: false,
                at_pixels: &header.refinement_at,
            },
            max_pixels,
        )
    };

    match coder {
        DictionaryCoder::Huffman { reader, id_len, .. } => {
            let id = reader.read_bits(*id_len)?;
            let dx = StandardTable::O.get().decode_value(reader)?;
            let dy = StandardTable::O.get().decode_value(reader)?;
            let size = StandardTable::A.get().decode_value(reader)?;
            let size = usize::try_from(size).map_err(|_| HuffmanError::InvalidCode)?;

            reader.align();
            let data = reader.read_bytes(size)?;

            let mut decoder = ArithmeticDecoder::new(data);
            let mut contexts = ContextTable::new(1 << header.refinement_template.context_bits());

            refine(&mut decoder, &mut contexts, id, dx, dy)
        }
        DictionaryCoder::Arithmetic {
            decoder,
            integers,
            ids,
        } => {
            let id = ids.decode(decoder);
            let dx = integers.rdx.decode_value(decoder)?;
            let dy = integers.rdy.decode_value(decoder)?;

            refine(decoder, refinement_contexts, id, dx, dy)
        }
    }
}

/// Decode a height class collective bitmap and split it into symbols (6.5.9).
fn decode_collective_bitmap(
    reader: &mut Reader<'_>,
    bmsize_table: &HuffmanTable,
    widths: &[u32],
    total_width: u32,
    height: u32,
    max_pixels: u64,
) -> Result<Vec<Bitmap>> {
    // "1) Read the size in bytes using the SDHUFFBMSIZE Huffman table. Let
    // BMSIZE be the value decoded."
    let size = bmsize_table.decode_value(reader)?;
    let size = usize::try_from(size).map_err(|_| HuffmanError::InvalidCode)?;

    // "2) Skip over any bits remaining in the last byte read."
    reader.align();

    let collective = if size == 0 {
        // "3) If BMSIZE is zero, then the bitmap is stored uncompressed, and
        // the actual size in bytes is: HCHEIGHT × ⌈TOTWIDTH / 8⌉"
        let mut bitmap = Bitmap::new_checked(total_width, height, max_pixels)?;
        let stride = total_width.div_ceil(8) as usize;

        for y in 0..height {
            let row = reader.read_bytes(stride)?;

            for x in 0..total_width {
                let byte = row[x as usize / 8];
                if (byte >> (7 - x % 8)) & 1 != 0 {
                    bitmap.set_pixel(x, y, true);
                }
            }
        }

        bitmap
    } else {
        // "4) Otherwise, decode the bitmap using a generic bitmap decoding
        // procedure [...] Table 19"
        let data = reader.read_bytes(size)?;
        generic::decode_bitmap_mmr(data, total_width, height, max_pixels)?.0
    };

    // "B_HC contains the NSYMSDECODED − HCFIRSTSYM symbols concatenated
    // left-to-right, with no intervening gaps."
    let mut x = 0;
    Ok(widths
        .iter()
        .map(|&width| {
            let symbol = collective.crop(x, 0, width, height);
            x += width;
            symbol
        })
        .collect())
}

/// Decode the export flags and collect the exported symbols (6.5.10).
fn export_symbols(
    coder: &mut DictionaryCoder<'_, '_>,
    header: &DictionaryHeader,
    inputs: &[&Bitmap],
    new_symbols: Vec<Bitmap>,
) -> Result<Vec<Bitmap>> {
    let total = inputs.len() + new_symbols.len();
    let mut flags = Vec::with_capacity(total);

    // "1) Set: EXINDEX = 0; CUREXFLAG = 0"
    let mut current = false;
    let mut previous_empty = false;

    // "5) Repeat steps 2) through 4) until EXINDEX == SDNUMINSYMS +
    // SDNUMNEWSYMS."
    while flags.len() < total {
        let run = usize::try_from(coder.export_run()?)
            .map_err(|_| DecodeError::from(SymbolError::InvalidExportRun))?;

        if (run == 0 && previous_empty) || flags.len() + run > total {
            bail!(SymbolError::InvalidExportRun);
        }

        // "3) Set EXFLAGS[EXINDEX] through EXFLAGS[EXINDEX + EXRUNLENGTH – 1]
        // to CUREXFLAG."
        flags.resize(flags.len() + run, current);

        // "4) Set: EXINDEX = EXINDEX + EXRUNLENGTH; CUREXFLAG = NOT(CUREXFLAG)"
        current = !current;
        previous_empty = run == 0;
    }

    let (input_flags, new_flags) = flags.split_at(inputs.len());
    let mut exported: Vec<Bitmap> = inputs
        .iter()
        .zip(input_flags)
        .filter(|(_, exported)| **exported)
        .map(|(symbol, _)| (*symbol).clone())
        .collect();
    exported.extend(
        new_symbols
            .into_iter()
            .zip(new_flags)
            .filter_map(|(symbol, &exported)| exported.then_some(symbol)),
    );

    if exported.len() != header.num_exported as usize {
        bail!(SymbolError::ExportCountMismatch);
    }

    Ok(exported)
}

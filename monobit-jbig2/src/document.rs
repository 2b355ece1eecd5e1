//! Segment bookkeeping and page composition.
//!
//! Segments are kept in an arena in stream order. References between
//! segments are resolved to arena indices once, when the stream is loaded.
//! Since a segment may only refer to segments with lower numbers, every
//! resolved index points at an earlier entry, which is what allows decoding a
//! segment with mutable access to everything before it.

use std::collections::BTreeMap;

use crate::DecodeSettings;
use crate::bitmap::Bitmap;
use crate::decode::pattern::PatternDictionary;
use crate::decode::symbol::SymbolDictionary;
use crate::decode::{
    Region, RegionSegmentInfo, generic, halftone, pattern, refinement, symbol, text,
};
use crate::error::{FormatError, Result, SegmentError, bail};
use crate::file::{FileHeader, parse_embedded, parse_file};
use crate::huffman_table::HuffmanTable;
use crate::page::{PageInformation, parse_end_of_stripe, parse_page_information};
use crate::reader::Reader;
use crate::segment::{Segment, SegmentType};

/// A loaded JBIG2 stream whose pages can be decoded on demand.
///
/// Every segment is decoded at most once. Dictionaries, tables and
/// intermediate regions stay available to later pages, and decoded pages are
/// cached.
#[derive(Debug)]
pub struct Document<'a> {
    header: Option<FileHeader>,
    entries: Vec<Entry<'a>>,
    pages: Vec<u32>,
    decoded_pages: BTreeMap<u32, Bitmap>,
    max_pixels: u64,
}

#[derive(Debug)]
struct Entry<'a> {
    segment: Segment<'a>,
    /// Arena indices of the referred-to segments, all lower than the index of
    /// this entry.
    referred: Vec<usize>,
    state: State,
}

#[derive(Debug)]
enum State {
    Pending,
    Decoded(Payload),
    Failed,
}

/// What a decoded segment leaves behind for the segments referring to it.
#[derive(Debug)]
enum Payload {
    SymbolDictionary(SymbolDictionary),
    PatternDictionary(PatternDictionary),
    Table(HuffmanTable),
    /// An intermediate region that has not been used as a refinement
    /// reference yet.
    IntermediateRegion(Region),
    /// Nothing, because the segment was drawn onto its page or only carried
    /// information that was used up right away.
    Consumed,
}

#[derive(Debug)]
struct Page {
    /// The number of the page information segment that set up this page.
    segment_number: u32,
    info: PageInformation,
    bitmap: Bitmap,
}

impl<'a> Document<'a> {
    /// Load a JBIG2 stream.
    ///
    /// Only the segment headers are parsed here; errors in them are fatal.
    /// Segment data is decoded lazily by [`Document::decode_page`].
    pub fn new(data: &'a [u8], settings: &DecodeSettings) -> Result<Self> {
        let (header, segments) = parse_stream(data, settings)?;

        Ok(Self::from_segments(header, segments, settings))
    }

    /// Load a JBIG2 stream whose global segments are stored separately, as
    /// in a PDF `JBIG2Globals` stream.
    ///
    /// `globals` is always a bare sequence of segments. Its segments come
    /// before those of `data`.
    pub fn with_globals(
        globals: &'a [u8],
        data: &'a [u8],
        settings: &DecodeSettings,
    ) -> Result<Self> {
        let mut segments = parse_embedded(globals)?;
        let (header, page_segments) = parse_stream(data, settings)?;
        segments.extend(page_segments);

        Ok(Self::from_segments(header, segments, settings))
    }

    fn from_segments(
        header: Option<FileHeader>,
        segments: Vec<Segment<'a>>,
        settings: &DecodeSettings,
    ) -> Self {
        let mut numbers = BTreeMap::new();
        let mut entries = Vec::with_capacity(segments.len());
        let mut pages = Vec::new();

        for segment in segments {
            let number = segment.header.number;

            ltrace!(
                "segment {} ({:?}) on page {}: refers to {:?}, retain bits {} {:?}, deferred non-retain {}",
                number,
                segment.header.segment_type,
                segment.header.page_association,
                segment.header.referred_to,
                segment.header.retained,
                segment.header.referred_retained,
                segment.header.deferred_non_retain
            );

            let referred = segment
                .header
                .referred_to
                .iter()
                .filter_map(|referred| {
                    let index = numbers.get(referred).copied();
                    if index.is_none() {
                        lwarn!(
                            "segment {} refers to unknown segment {}, ignoring the reference",
                            number,
                            referred
                        );
                    }

                    index
                })
                .collect();

            let page = segment.header.page_association;
            if segment.header.segment_type == SegmentType::PageInformation && !pages.contains(&page)
            {
                pages.push(page);
            }

            numbers.insert(number, entries.len());
            entries.push(Entry {
                segment,
                referred,
                state: State::Pending,
            });
        }

        Self {
            header,
            entries,
            pages,
            decoded_pages: BTreeMap::new(),
            max_pixels: settings.max_bitmap_pixels,
        }
    }

    /// The header of a standalone file, or `None` for embedded streams.
    pub fn file_header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// The numbers of all pages that have a page information segment, in
    /// stream order.
    pub fn page_numbers(&self) -> &[u32] {
        &self.pages
    }

    /// Decode the page with the given number.
    ///
    /// Segments that fail to decode are skipped, so the returned bitmap holds
    /// whatever could be composed. An error is only returned if the page
    /// itself cannot be set up.
    pub fn decode_page(&mut self, page_number: u32) -> Result<Bitmap> {
        if let Some(bitmap) = self.decoded_pages.get(&page_number) {
            return Ok(bitmap.clone());
        }

        let mut page = self.set_up_page(page_number)?;

        for index in 0..self.entries.len() {
            let (earlier, rest) = self.entries.split_at_mut(index);
            let entry = &mut rest[0];
            let header = &entry.segment.header;

            // Segments without a page association are shared by all pages.
            // Only dictionaries and tables make sense there.
            let relevant = header.page_association == page_number
                || (header.page_association == 0 && !is_region(header.segment_type));

            if !relevant || !matches!(entry.state, State::Pending) {
                continue;
            }

            ltrace!(
                "decoding segment {} ({:?})",
                header.number,
                header.segment_type
            );

            entry.state = match decode_segment(
                &entry.segment,
                &entry.referred,
                earlier,
                &mut page,
                self.max_pixels,
            ) {
                Ok(payload) => State::Decoded(payload),
                Err(e) => {
                    lwarn!(
                        "failed to decode segment {} ({:?}): {}",
                        header.number,
                        header.segment_type,
                        e
                    );

                    State::Failed
                }
            };
        }

        self.decoded_pages.insert(page_number, page.bitmap.clone());

        Ok(page.bitmap)
    }

    /// Create the page bitmap from the page's page information segment.
    fn set_up_page(&self, page_number: u32) -> Result<Page> {
        let segment = self
            .segments_of(page_number)
            .find(|segment| segment.header.segment_type == SegmentType::PageInformation)
            .ok_or(FormatError::UnknownPage)?;

        let info = parse_page_information(&mut Reader::new(segment.data))?;

        // "A page's bitmap height may be declared in its page information
        // segment to be unknown (by specifying a height of 0xFFFFFFFF). In this
        // case, the page must be striped." (7.4.8.2)
        let height = match info.height {
            Some(height) => height,
            None => {
                if !info.is_striped {
                    lwarn!("page {} has an unknown height but is not striped", page_number);
                }

                self.stripe_height(page_number)
                    .ok_or(FormatError::UnknownPageHeight)?
            }
        };

        let mut bitmap = Bitmap::new_checked(info.width, height, self.max_pixels)?;
        bitmap.fill(info.flags.default_pixel);

        ldebug!(
            "page {} is {}x{} at {:?}x{:?} ppm, stripes of at most {} rows",
            page_number,
            info.width,
            height,
            info.x_resolution,
            info.y_resolution,
            info.max_stripe_size
        );
        ltrace!(
            "page {} flags: lossless {}, refinements {}, auxiliary buffers {}",
            page_number,
            info.flags.is_lossless,
            info.flags.might_contain_refinements,
            info.flags.requires_auxiliary_buffers
        );

        Ok(Page {
            segment_number: segment.header.number,
            info,
            bitmap,
        })
    }

    /// The page height implied by the page's end of stripe segments: the
    /// largest end row plus one.
    fn stripe_height(&self, page_number: u32) -> Option<u32> {
        self.segments_of(page_number)
            .filter(|segment| segment.header.segment_type == SegmentType::EndOfStripe)
            .filter_map(|segment| parse_end_of_stripe(&mut Reader::new(segment.data)).ok())
            .max()?
            .checked_add(1)
    }

    fn segments_of(&self, page_number: u32) -> impl Iterator<Item = &Segment<'a>> {
        self.entries
            .iter()
            .map(|entry| &entry.segment)
            .filter(move |segment| segment.header.page_association == page_number)
    }
}

fn parse_stream<'a>(
    data: &'a [u8],
    settings: &DecodeSettings,
) -> Result<(Option<FileHeader>, Vec<Segment<'a>>)> {
    if settings.embedded {
        Ok((None, parse_embedded(data)?))
    } else {
        let (header, segments) = parse_file(data)?;
        Ok((Some(header), segments))
    }
}

fn is_region(segment_type: SegmentType) -> bool {
    matches!(
        segment_type,
        SegmentType::IntermediateTextRegion
            | SegmentType::IntermediateHalftoneRegion
            | SegmentType::IntermediateGenericRegion
            | SegmentType::IntermediateRefinementRegion
    ) || segment_type.is_immediate_region()
}

/// Decode one segment of `page`.
///
/// `earlier` holds every entry before the segment, so that all of its
/// referred-to segments are in there.
fn decode_segment(
    segment: &Segment<'_>,
    referred: &[usize],
    earlier: &mut [Entry<'_>],
    page: &mut Page,
    max_pixels: u64,
) -> Result<Payload> {
    let header = &segment.header;
    let data = segment.data;

    let payload = match header.segment_type {
        SegmentType::SymbolDictionary => {
            // "1) Concatenate all the input symbol dictionaries to form
            // SDINSYMS." (6.5.5)
            let inputs = referred_symbols(earlier, referred);
            let tables = referred_tables(earlier, referred);

            // "If this bit is 1, then the context used for bitmap coding is
            // the context that was retained by the last symbol dictionary
            // segment referred to." (7.4.2.1.1)
            let retained = referred_payloads(earlier, referred)
                .filter_map(|payload| match payload {
                    Payload::SymbolDictionary(dictionary) => Some(dictionary),
                    _ => None,
                })
                .last()
                .and_then(|dictionary| dictionary.retained.as_ref());

            let dictionary =
                symbol::decode_dictionary(data, &inputs, &tables, retained, max_pixels)?;
            Payload::SymbolDictionary(dictionary)
        }
        SegmentType::IntermediateTextRegion
        | SegmentType::ImmediateTextRegion
        | SegmentType::ImmediateLosslessTextRegion => {
            let symbols = referred_symbols(earlier, referred);
            let tables = referred_tables(earlier, referred);

            let region = text::decode_region(data, &symbols, &tables, max_pixels)?;
            finish_region(header.segment_type, region, page)
        }
        SegmentType::PatternDictionary => {
            Payload::PatternDictionary(pattern::decode_dictionary(data, max_pixels)?)
        }
        SegmentType::IntermediateHalftoneRegion
        | SegmentType::ImmediateHalftoneRegion
        | SegmentType::ImmediateLosslessHalftoneRegion => {
            let patterns = referred_payloads(earlier, referred)
                .find_map(|payload| match payload {
                    Payload::PatternDictionary(patterns) => Some(patterns),
                    _ => None,
                })
                .ok_or(SegmentError::MissingPatternDictionary)?;

            let region = halftone::decode_region(data, patterns, max_pixels)?;
            finish_region(header.segment_type, region, page)
        }
        SegmentType::IntermediateGenericRegion
        | SegmentType::ImmediateGenericRegion
        | SegmentType::ImmediateLosslessGenericRegion => {
            let region = generic::decode_region(data, segment.had_unknown_length(), max_pixels)?;
            finish_region(header.segment_type, region, page)
        }
        SegmentType::IntermediateRefinementRegion
        | SegmentType::ImmediateRefinementRegion
        | SegmentType::ImmediateLosslessRefinementRegion => {
            // "2) If there are no referred-to segments, then use the page
            // bitmap as the reference buffer. 3) Otherwise, determine the
            // buffer associated with the region segment that this segment
            // refers to." (7.4.7.5)
            let reference = if referred.is_empty() {
                let info = RegionSegmentInfo::parse(&mut Reader::new(data))?;
                page.bitmap.crop(info.x, info.y, info.width, info.height)
            } else {
                take_intermediate_region(earlier, referred)
                    .ok_or(SegmentError::MissingReference)?
                    .bitmap
            };

            let region = refinement::decode_region(data, &reference, max_pixels)?;
            finish_region(header.segment_type, region, page)
        }
        SegmentType::PageInformation => {
            if header.number != page.segment_number {
                bail!(SegmentError::DuplicatePageInfo);
            }

            Payload::Consumed
        }
        SegmentType::Tables => Payload::Table(HuffmanTable::read_custom(&mut Reader::new(data))?),
        SegmentType::EndOfPage | SegmentType::EndOfStripe | SegmentType::EndOfFile => {
            Payload::Consumed
        }
        SegmentType::Profiles | SegmentType::ColourPalette => {
            ldebug!(
                "ignoring {:?} segment {}",
                header.segment_type,
                header.number
            );

            Payload::Consumed
        }
        SegmentType::Extension => {
            // "Bit 31: Necessary. If this bit is 1, then this extension must
            // be understood by the decoder." (7.4.14.1)
            let extension_type = Reader::new(data).read_u32()?;
            if extension_type & 0x8000_0000 != 0 {
                bail!(SegmentError::UnsupportedExtension);
            }

            ldebug!(
                "ignoring extension segment {} of type {:#x}",
                header.number,
                extension_type
            );

            Payload::Consumed
        }
    };

    Ok(payload)
}

/// Draw an immediate region onto the page, or keep an intermediate one.
fn finish_region(segment_type: SegmentType, region: Region, page: &mut Page) -> Payload {
    if region.info.colour_extension {
        ldebug!("ignoring the colour extension of a region segment");
    }

    if !segment_type.is_immediate_region() {
        return Payload::IntermediateRegion(region);
    }

    let operator = page.info.region_operator(region.info.operator);
    page.bitmap.compose(
        &region.bitmap,
        i64::from(region.info.x),
        i64::from(region.info.y),
        operator,
    );

    Payload::Consumed
}

/// The payloads of the referred-to segments that decoded successfully, in
/// reference order.
fn referred_payloads<'e>(
    earlier: &'e [Entry<'_>],
    referred: &'e [usize],
) -> impl Iterator<Item = &'e Payload> {
    referred
        .iter()
        .filter_map(|&index| match &earlier[index].state {
            State::Decoded(payload) => Some(payload),
            State::Pending | State::Failed => None,
        })
}

/// The exported symbols of all referred-to symbol dictionaries.
fn referred_symbols<'e>(earlier: &'e [Entry<'_>], referred: &'e [usize]) -> Vec<&'e Bitmap> {
    referred_payloads(earlier, referred)
        .filter_map(|payload| match payload {
            Payload::SymbolDictionary(dictionary) => Some(&dictionary.exported),
            _ => None,
        })
        .flatten()
        .collect()
}

/// The referred-to custom Huffman tables, in the order in which
/// "user-supplied" selections pick them up.
fn referred_tables<'e>(
    earlier: &'e [Entry<'_>],
    referred: &'e [usize],
) -> Vec<&'e HuffmanTable> {
    referred_payloads(earlier, referred)
        .filter_map(|payload| match payload {
            Payload::Table(table) => Some(table),
            _ => None,
        })
        .collect()
}

/// Take the first referred-to intermediate region out of the arena.
///
/// A region can only be refined once; its entry is left consumed.
fn take_intermediate_region(earlier: &mut [Entry<'_>], referred: &[usize]) -> Option<Region> {
    let index = referred.iter().copied().find(|&index| {
        matches!(
            earlier[index].state,
            State::Decoded(Payload::IntermediateRegion(_))
        )
    })?;

    match std::mem::replace(&mut earlier[index].state, State::Decoded(Payload::Consumed)) {
        State::Decoded(Payload::IntermediateRegion(region)) => Some(region),
        _ => None,
    }
}

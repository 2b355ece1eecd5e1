//! Segment headers (7.2) and segment types (7.3).

use crate::error::{ParseError, Result, SegmentError, bail};
use crate::reader::Reader;

/// "The segment type is a number between 0 and 63, inclusive. Not all values
/// are allowed." (7.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentType {
    /// Symbol dictionary – see 7.4.2. (type 0)
    SymbolDictionary,
    /// Intermediate text region – see 7.4.3. (type 4)
    IntermediateTextRegion,
    /// Immediate text region – see 7.4.3. (type 6)
    ImmediateTextRegion,
    /// Immediate lossless text region – see 7.4.3. (type 7)
    ImmediateLosslessTextRegion,
    /// Pattern dictionary – see 7.4.4. (type 16)
    PatternDictionary,
    /// Intermediate halftone region – see 7.4.5. (type 20)
    IntermediateHalftoneRegion,
    /// Immediate halftone region – see 7.4.5. (type 22)
    ImmediateHalftoneRegion,
    /// Immediate lossless halftone region – see 7.4.5. (type 23)
    ImmediateLosslessHalftoneRegion,
    /// Intermediate generic region – see 7.4.6. (type 36)
    IntermediateGenericRegion,
    /// Immediate generic region – see 7.4.6. (type 38)
    ImmediateGenericRegion,
    /// Immediate lossless generic region – see 7.4.6. (type 39)
    ImmediateLosslessGenericRegion,
    /// Intermediate generic refinement region – see 7.4.7. (type 40)
    IntermediateRefinementRegion,
    /// Immediate generic refinement region – see 7.4.7. (type 42)
    ImmediateRefinementRegion,
    /// Immediate lossless generic refinement region – see 7.4.7. (type 43)
    ImmediateLosslessRefinementRegion,
    /// Page information – see 7.4.8. (type 48)
    PageInformation,
    /// End of page – see 7.4.9. (type 49)
    EndOfPage,
    /// End of stripe – see 7.4.10. (type 50)
    EndOfStripe,
    /// End of file – see 7.4.11. (type 51)
    EndOfFile,
    /// Profiles – see 7.4.12. (type 52)
    Profiles,
    /// Tables – see 7.4.13. (type 53)
    Tables,
    /// Colour palette – see 7.4.16. (type 54)
    ColourPalette,
    /// Extension – see 7.4.14. (type 62)
    Extension,
}

impl SegmentType {
    /// "All other segment types are reserved and must not be used." (7.3)
    fn from_value(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::SymbolDictionary,
            4 => Self::IntermediateTextRegion,
            6 => Self::ImmediateTextRegion,
            7 => Self::ImmediateLosslessTextRegion,
            16 => Self::PatternDictionary,
            20 => Self::IntermediateHalftoneRegion,
            22 => Self::ImmediateHalftoneRegion,
            23 => Self::ImmediateLosslessHalftoneRegion,
            36 => Self::IntermediateGenericRegion,
            38 => Self::ImmediateGenericRegion,
            39 => Self::ImmediateLosslessGenericRegion,
            40 => Self::IntermediateRefinementRegion,
            42 => Self::ImmediateRefinementRegion,
            43 => Self::ImmediateLosslessRefinementRegion,
            48 => Self::PageInformation,
            49 => Self::EndOfPage,
            50 => Self::EndOfStripe,
            51 => Self::EndOfFile,
            52 => Self::Profiles,
            53 => Self::Tables,
            54 => Self::ColourPalette,
            62 => Self::Extension,
            _ => bail!(SegmentError::UnknownType),
        })
    }

    /// Whether a segment of this type is drawn onto the page right away.
    pub(crate) fn is_immediate_region(self) -> bool {
        matches!(
            self,
            Self::ImmediateTextRegion
                | Self::ImmediateLosslessTextRegion
                | Self::ImmediateHalftoneRegion
                | Self::ImmediateLosslessHalftoneRegion
                | Self::ImmediateGenericRegion
                | Self::ImmediateLosslessGenericRegion
                | Self::ImmediateRefinementRegion
                | Self::ImmediateLosslessRefinementRegion
        )
    }
}

/// A parsed segment header (7.2.1).
#[derive(Debug, Clone)]
pub(crate) struct SegmentHeader {
    /// "The valid range of segment numbers is 0 through 4294967295
    /// (0xFFFFFFFF) inclusive." (7.2.2)
    pub(crate) number: u32,
    pub(crate) segment_type: SegmentType,
    /// "Bit 7: Deferred non-retain." (7.2.3)
    pub(crate) deferred_non_retain: bool,
    /// "Retain bit for this segment." (7.2.4)
    pub(crate) retained: bool,
    /// One retain bit per entry of `referred_to`.
    pub(crate) referred_retained: Vec<bool>,
    /// "This field contains the segment numbers of the segments that this
    /// segment refers to, if any." (7.2.5)
    pub(crate) referred_to: Vec<u32>,
    /// "This field may contain a value of zero; this value indicates that this
    /// segment is not associated with any page." (7.2.6)
    pub(crate) page_association: u32,
    /// `None` if the length was given as 0xFFFFFFFF. (7.2.7)
    pub(crate) data_length: Option<u32>,
}

/// A segment header together with its data.
#[derive(Debug, Clone)]
pub(crate) struct Segment<'a> {
    pub(crate) header: SegmentHeader,
    pub(crate) data: &'a [u8],
}

impl Segment<'_> {
    /// Whether the data length had to be determined by scanning.
    pub(crate) fn had_unknown_length(&self) -> bool {
        self.header.data_length.is_none()
    }
}

/// Parse a segment header (7.2).
pub(crate) fn parse_header(reader: &mut Reader<'_>) -> Result<SegmentHeader> {
    // 7.2.2
    let number = reader.read_u32()?;

    // 7.2.3
    let flags = reader.read_byte()?;
    let segment_type = SegmentType::from_value(flags & 0x3F)?;
    let long_page_association = flags & 0x40 != 0;
    let deferred_non_retain = flags & 0x80 != 0;

    // 7.2.4
    // "The three most significant bits of the first byte in this field
    // determine the length of the field. [...] This three-bit subfield must
    // not contain values of 5 and 6."
    let first = reader.read_byte()?;
    let short_count = first >> 5;

    let (count, retain_bits) = match short_count {
        0..=4 => {
            // "Bits 0-4: Retain bits for this segment and for each of the
            // referred-to segments."
            let count = u32::from(short_count);
            let bits = (0..=count).map(|i| (first >> i) & 1 != 0).collect::<Vec<_>>();
            (count, bits)
        }
        7 => {
            let rest = reader.read_bytes(3)?;
            // "Bits 0-28: Count of referred-to segments."
            let count = u32::from_be_bytes([first & 0x1F, rest[0], rest[1], rest[2]]);
            let num_bytes = (count as usize + 1).div_ceil(8);
            let bytes = reader.read_bytes(num_bytes)?;
            let bits = (0..=count as usize)
                .map(|i| (bytes[i / 8] >> (i % 8)) & 1 != 0)
                .collect::<Vec<_>>();
            (count, bits)
        }
        _ => bail!(SegmentError::InvalidReferredCount),
    };

    // 7.2.5
    // "When the current segment's number is 256 or less, then each referred-to
    // segment number is one byte long. Otherwise, when the current segment's
    // number is 65536 or less, each referred-to segment number is two bytes
    // long. Otherwise, each referred-to segment number is four bytes long."
    let mut referred_to = Vec::new();
    let mut referred_retained = Vec::new();

    for i in 0..count as usize {
        let referred = if number <= 256 {
            u32::from(reader.read_byte()?)
        } else if number <= 65536 {
            u32::from(reader.read_u16()?)
        } else {
            reader.read_u32()?
        };

        // "If a segment refers to other segments, it must refer to only
        // segments with lower segment numbers."
        if referred >= number {
            lwarn!(
                "segment {} refers to later segment {}, ignoring the reference",
                number,
                referred
            );
            continue;
        }

        referred_to.push(referred);
        referred_retained.push(retain_bits[i + 1]);
    }

    // 7.2.6
    let page_association = if long_page_association {
        reader.read_u32()?
    } else {
        u32::from(reader.read_byte()?)
    };

    // 7.2.7
    let data_length = match reader.read_u32()? {
        0xFFFF_FFFF => {
            // "If the segment's type is "Immediate generic region", then the
            // length field may contain the value 0xFFFFFFFF."
            if !matches!(
                segment_type,
                SegmentType::ImmediateGenericRegion | SegmentType::ImmediateLosslessGenericRegion
            ) {
                bail!(SegmentError::UnknownLength);
            }

            None
        }
        len => Some(len),
    };

    Ok(SegmentHeader {
        number,
        segment_type,
        deferred_non_retain,
        retained: retain_bits[0],
        referred_retained,
        referred_to,
        page_association,
        data_length,
    })
}

/// Read the data part belonging to `header`.
pub(crate) fn read_data<'a>(reader: &mut Reader<'a>, header: SegmentHeader) -> Result<Segment<'a>> {
    let len = match header.data_length {
        Some(len) => len as usize,
        None => scan_unknown_length(reader.tail())?,
    };

    let data = reader.read_bytes(len)?;

    Ok(Segment { header, data })
}

/// Parse a complete segment, header followed by data.
pub(crate) fn parse_segment<'a>(reader: &mut Reader<'a>) -> Result<Segment<'a>> {
    let header = parse_header(reader)?;
    read_data(reader, header)
}

/// Determine the length of an immediate generic region with unknown length.
///
/// "if MMR is 1, they are preceded by the two-byte sequence 0x00 0x00; if
/// MMR is 0, they are preceded by the two-byte sequence 0xFF 0xAC." (7.4.6.4)
///
/// The returned length includes the marker and the row count.
fn scan_unknown_length(data: &[u8]) -> Result<usize> {
    // The region segment information field is 17 bytes, followed by the
    // generic region segment flags.
    let flags = *data.get(17).ok_or(ParseError::UnexpectedEof)?;
    let marker: [u8; 2] = if flags & 1 != 0 {
        [0x00, 0x00]
    } else {
        [0xFF, 0xAC]
    };

    let start = 18;
    data.get(start..)
        .unwrap_or_default()
        .windows(6)
        .position(|window| window[..2] == marker)
        .map(|pos| start + pos + 6)
        .ok_or_else(|| SegmentError::MissingEndMarker.into())
}

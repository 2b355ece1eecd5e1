//! Standalone file organizations (Annex D) and embedded segment streams.

use crate::error::{FormatError, Result, bail};
use crate::reader::Reader;
use crate::segment::{Segment, SegmentType, parse_header, parse_segment, read_data};

/// "This is an 8-byte sequence containing 0x97 0x4A 0x42 0x32 0x0D 0x0A 0x1A
/// 0x0A." (D.4.1)
const ID_STRING: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

/// The way segment headers and segment data are arranged in a standalone file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOrganization {
    /// Every segment header is directly followed by its data. (D.1)
    Sequential,
    /// All segment headers come first, followed by the data of every segment
    /// in the same order. (D.2)
    RandomAccess,
}

/// The header of a standalone JBIG2 file (D.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// "Bit 0: File organization type." (D.4.2)
    pub organization: FileOrganization,
    /// The number of pages, or `None` if it was unknown when the file was
    /// written.
    pub page_count: Option<u32>,
    /// "Bit 2: If this bit is 0, no generic region segments uses the templates
    /// with 12 AT pixels." (D.4.2)
    pub uses_extended_templates: bool,
    /// "Bit 3: If this bit is 0, no region segment is extended to be
    /// coloured." (D.4.2)
    pub contains_coloured_regions: bool,
}

/// Parse a standalone file into its header and its segments.
pub(crate) fn parse_file(data: &[u8]) -> Result<(FileHeader, Vec<Segment<'_>>)> {
    let mut reader = Reader::new(data);
    let header = parse_file_header(&mut reader)?;

    let segments = match header.organization {
        FileOrganization::Sequential => parse_sequential(&mut reader)?,
        FileOrganization::RandomAccess => parse_random_access(&mut reader)?,
    };

    Ok((header, segments))
}

/// Parse a bare sequence of segments, as embedded in a PDF image stream.
///
/// "The file header, end-of-file segment and end-of-page segments are not
/// used." (PDF 1.4, 3.3.6)
pub(crate) fn parse_embedded(data: &[u8]) -> Result<Vec<Segment<'_>>> {
    parse_sequential(&mut Reader::new(data))
}

fn parse_file_header(reader: &mut Reader<'_>) -> Result<FileHeader> {
    if reader.read_bytes(8).ok() != Some(ID_STRING.as_slice()) {
        bail!(FormatError::InvalidHeader);
    }

    let flags = reader.read_byte()?;

    // "Bits 4-7: Reserved; must be 0."
    if flags & 0xF0 != 0 {
        bail!(FormatError::ReservedBits);
    }

    // "If this bit is 0, the file uses the random-access organization. If this
    // bit is 1, the file uses the sequential organization."
    let organization = if flags & 0x01 != 0 {
        FileOrganization::Sequential
    } else {
        FileOrganization::RandomAccess
    };

    // "This is a 4-byte field, and is not present if the "unknown number of
    // pages" bit was 1." (D.4.3)
    let page_count = if flags & 0x02 != 0 {
        None
    } else {
        Some(reader.read_u32()?)
    };

    Ok(FileHeader {
        organization,
        page_count,
        uses_extended_templates: flags & 0x04 != 0,
        contains_coloured_regions: flags & 0x08 != 0,
    })
}

fn parse_sequential<'a>(reader: &mut Reader<'a>) -> Result<Vec<Segment<'a>>> {
    let mut segments = Vec::new();

    while !reader.at_end() {
        let segment = parse_segment(reader)?;
        // "If a file contains an end of file segment, it must be the last
        // segment." (7.4.11)
        let is_end = segment.header.segment_type == SegmentType::EndOfFile;
        segments.push(segment);

        if is_end {
            break;
        }
    }

    Ok(segments)
}

fn parse_random_access<'a>(reader: &mut Reader<'a>) -> Result<Vec<Segment<'a>>> {
    let mut headers = Vec::new();

    while !reader.at_end() {
        let header = parse_header(reader)?;
        let is_end = header.segment_type == SegmentType::EndOfFile;
        headers.push(header);

        if is_end {
            break;
        }
    }

    headers
        .into_iter()
        .map(|header| read_data(reader, header))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    // Segment 0: end of page for page 1, no data.
    const END_OF_PAGE: [u8; 11] = [0, 0, 0, 0, 0x31, 0x00, 0x01, 0, 0, 0, 0];
    // Segment 1: end of file, no data.
    const END_OF_FILE: [u8; 11] = [0, 0, 0, 1, 0x33, 0x00, 0x00, 0, 0, 0, 0];

    fn file(flags: u8, page_count: Option<u32>) -> Vec<u8> {
        let mut data = ID_STRING.to_vec();
        data.push(flags);
        if let Some(count) = page_count {
            data.extend(count.to_be_bytes());
        }
        data
    }

    #[test]
    fn sequential_file() {
        let mut data = file(0x01, Some(1));
        data.extend(END_OF_PAGE);
        data.extend(END_OF_FILE);
        // Anything after the end of file segment is ignored.
        data.extend([0xAB; 3]);

        let (header, segments) = parse_file(&data).unwrap();
        assert_eq!(header.organization, FileOrganization::Sequential);
        assert_eq!(header.page_count, Some(1));
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].header.segment_type, SegmentType::EndOfFile);
    }

    #[test]
    fn random_access_file() {
        // Two segments with data "AB" and "C", headers first.
        let mut data = file(0x02 | 0x04, None);
        data.extend([0, 0, 0, 0, 0x3E, 0x00, 0x01, 0, 0, 0, 2]);
        data.extend([0, 0, 0, 1, 0x3E, 0x00, 0x01, 0, 0, 0, 1]);
        data.extend(END_OF_FILE.map(|b| if b == 1 { 2 } else { b }));
        data.extend(b"ABC");

        let (header, segments) = parse_file(&data).unwrap();
        assert_eq!(header.organization, FileOrganization::RandomAccess);
        assert_eq!(header.page_count, None);
        assert!(header.uses_extended_templates);
        assert!(!header.contains_coloured_regions);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].data, b"AB");
        assert_eq!(segments[1].data, b"C");
    }

    #[test]
    fn invalid_headers() {
        assert_eq!(
            parse_file(&[0x97, 0x4A, 0x42]).unwrap_err(),
            DecodeError::Format(FormatError::InvalidHeader)
        );
        assert_eq!(
            parse_file(&file(0x11, Some(1))).unwrap_err(),
            DecodeError::Format(FormatError::ReservedBits)
        );
    }

    #[test]
    fn embedded_stream() {
        let segments = parse_embedded(&END_OF_PAGE).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].header.page_association, 1);
    }
}

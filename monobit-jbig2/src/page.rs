//! Page information (7.4.8) and end of stripe (7.4.10) segments.

use crate::bitmap::CombinationOperator;
use crate::error::Result;
use crate::reader::Reader;

/// "0xFFFFFFFF: The page's height is unknown." (7.4.8.2)
pub(crate) const UNKNOWN_HEIGHT: u32 = 0xFFFF_FFFF;

/// A parsed page information segment.
#[derive(Debug, Clone)]
pub(crate) struct PageInformation {
    pub(crate) width: u32,
    /// `None` if the height is only known once all stripes are decoded.
    pub(crate) height: Option<u32>,
    /// Pixels per metre, or `None` if unknown.
    pub(crate) x_resolution: Option<u32>,
    pub(crate) y_resolution: Option<u32>,
    pub(crate) flags: PageFlags,
    /// "Bit 15: Page is striped." (7.4.8.6)
    pub(crate) is_striped: bool,
    /// "Bits 0-14: Maximum stripe size." (7.4.8.6)
    pub(crate) max_stripe_size: u16,
}

/// Page segment flags (7.4.8.5).
#[derive(Debug, Clone)]
pub(crate) struct PageFlags {
    pub(crate) is_lossless: bool,
    pub(crate) might_contain_refinements: bool,
    /// "This bit contains the initial value for every pixel in the page,
    /// before any region segments are decoded or drawn."
    pub(crate) default_pixel: bool,
    pub(crate) default_operator: CombinationOperator,
    pub(crate) requires_auxiliary_buffers: bool,
    /// "If this bit is 0, then every direct region segment associated with
    /// this page must use the page's default combination operator."
    pub(crate) operator_overridden: bool,
}

impl PageInformation {
    /// The operator used to draw an immediate region onto the page.
    pub(crate) fn region_operator(
        &self,
        region_operator: CombinationOperator,
    ) -> CombinationOperator {
        if self.flags.operator_overridden {
            region_operator
        } else {
            self.flags.default_operator
        }
    }
}

pub(crate) fn parse_page_information(reader: &mut Reader<'_>) -> Result<PageInformation> {
    let width = reader.read_u32()?;
    let height = reader.read_u32()?;
    let x_resolution = Some(reader.read_u32()?).filter(|r| *r != 0);
    let y_resolution = Some(reader.read_u32()?).filter(|r| *r != 0);

    let flags = reader.read_byte()?;
    // "Bits 3-4: Page default combination operator." Only OR, AND, XOR and XNOR
    // can be expressed with two bits.
    let default_operator = CombinationOperator::from_value((flags >> 3) & 0x03)?;

    let striping = reader.read_u16()?;

    Ok(PageInformation {
        width,
        height: Some(height).filter(|h| *h != UNKNOWN_HEIGHT),
        x_resolution,
        y_resolution,
        flags: PageFlags {
            is_lossless: flags & 0x01 != 0,
            might_contain_refinements: flags & 0x02 != 0,
            default_pixel: flags & 0x04 != 0,
            default_operator,
            requires_auxiliary_buffers: flags & 0x20 != 0,
            operator_overridden: flags & 0x40 != 0,
        },
        is_striped: striping & 0x8000 != 0,
        max_stripe_size: striping & 0x7FFF,
    })
}

/// Parse an end of stripe segment, returning the row of the page that the
/// stripe ends at.
///
/// "The segment data of an end of stripe segment consists of one four-byte
/// value, specifying the Y coordinate of the end row." (7.4.10)
pub(crate) fn parse_end_of_stripe(reader: &mut Reader<'_>) -> Result<u32> {
    reader.read_u32()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_information() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x40, // width 64
            0xFF, 0xFF, 0xFF, 0xFF, // unknown height
            0x00, 0x00, 0x0B, 0xB8, // 3000 ppm
            0x00, 0x00, 0x00, 0x00, // unknown
            0b0100_0110,            // refinements, default pixel 1, OR, overridden
            0x80, 0x20,             // striped, 32 rows per stripe
        ];
        let info = parse_page_information(&mut Reader::new(&data)).unwrap();

        assert_eq!(info.width, 64);
        assert_eq!(info.height, None);
        assert_eq!(info.x_resolution, Some(3000));
        assert_eq!(info.y_resolution, None);
        assert!(!info.flags.is_lossless);
        assert!(info.flags.might_contain_refinements);
        assert!(info.flags.default_pixel);
        assert_eq!(info.flags.default_operator, CombinationOperator::Or);
        assert!(info.flags.operator_overridden);
        assert!(info.is_striped);
        assert_eq!(info.max_stripe_size, 32);
        assert_eq!(
            info.region_operator(CombinationOperator::Replace),
            CombinationOperator::Replace
        );
    }

    #[test]
    fn default_operator_applies_without_override() {
        let mut data = [0_u8; 19];
        data[3] = 1;
        data[7] = 1;
        data[16] = 2 << 3;
        let info = parse_page_information(&mut Reader::new(&data)).unwrap();

        assert_eq!(info.height, Some(1));
        assert_eq!(
            info.region_operator(CombinationOperator::Or),
            CombinationOperator::Xor
        );
    }
}

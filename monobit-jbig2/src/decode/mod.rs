//! Region segment information (7.4.1) and the parameters shared by the
//! region decoding procedures.

pub(crate) mod generic;
pub(crate) mod halftone;
pub(crate) mod pattern;
pub(crate) mod refinement;
pub(crate) mod symbol;
pub(crate) mod text;

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{RegionError, Result, TemplateError, bail};
use crate::reader::Reader;

/// Parsed region segment information field (7.4.1).
#[derive(Debug, Clone)]
pub(crate) struct RegionSegmentInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) x: u32,
    pub(crate) y: u32,
    /// "Bits 0-2: External combination operator." (7.4.1.5)
    pub(crate) operator: CombinationOperator,
    /// "Bit 3: Colour extension flag (COLEXTFLAG)." (7.4.1.5)
    pub(crate) colour_extension: bool,
}

impl RegionSegmentInfo {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;
        let x = reader.read_u32()?;
        let y = reader.read_u32()?;
        let flags = reader.read_byte()?;

        // "Bits 4-7: Reserved; must be 0."
        if flags & 0xF0 != 0 {
            bail!(RegionError::ReservedBits);
        }

        Ok(Self {
            width,
            height,
            x,
            y,
            operator: CombinationOperator::from_value(flags & 0x07)?,
            colour_extension: flags & 0x08 != 0,
        })
    }
}

/// A decoded region together with its placement on the page.
#[derive(Debug, Clone)]
pub(crate) struct Region {
    pub(crate) info: RegionSegmentInfo,
    pub(crate) bitmap: Bitmap,
}

/// The context template of the generic region decoding procedure (6.2.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Template {
    /// 16 pixels, 4 of which are AT pixels (Figure 3).
    Template0,
    /// 13 pixels, 1 AT pixel (Figure 4).
    Template1,
    /// 10 pixels, 1 AT pixel (Figure 5).
    Template2,
    /// 10 pixels, 1 AT pixel (Figure 6).
    Template3,
    /// Template 0 with 12 AT pixels ("EXTTEMPLATE").
    Extended,
}

impl Template {
    /// Interpret the two template bits of a segment's flags.
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::Template0,
            1 => Self::Template1,
            2 => Self::Template2,
            _ => Self::Template3,
        }
    }

    pub(crate) fn at_pixel_count(self) -> usize {
        match self {
            Self::Template0 => 4,
            Self::Template1 | Self::Template2 | Self::Template3 => 1,
            Self::Extended => 12,
        }
    }

    pub(crate) fn context_bits(self) -> u32 {
        match self {
            Self::Template0 | Self::Extended => 16,
            Self::Template1 => 13,
            Self::Template2 | Self::Template3 => 10,
        }
    }
}

/// The context template of the refinement decoding procedure (6.3.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefinementTemplate {
    /// 13 pixels, 2 of which are AT pixels (Figure 12).
    Template0,
    /// 10 pixels (Figure 13).
    Template1,
}

impl RefinementTemplate {
    pub(crate) fn from_bit(bit: u8) -> Self {
        if bit & 1 == 0 {
            Self::Template0
        } else {
            Self::Template1
        }
    }

    pub(crate) fn context_bits(self) -> u32 {
        match self {
            Self::Template0 => 13,
            Self::Template1 => 10,
        }
    }
}

/// An adaptive template pixel, relative to the pixel being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AdaptiveTemplatePixel {
    pub(crate) x: i32,
    pub(crate) y: i32,
}

impl AdaptiveTemplatePixel {
    pub(crate) const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Read one signed byte pair.
    ///
    /// With `causal` set, the pixel must lie in an already decoded position:
    /// above the current row, or left of the current pixel within it.
    fn read(reader: &mut Reader<'_>, causal: bool) -> Result<Self> {
        let x = i32::from(reader.read_i8()?);
        let y = i32::from(reader.read_i8()?);

        if causal && (y > 0 || (y == 0 && x >= 0)) {
            bail!(TemplateError::InvalidAtPixel);
        }

        Ok(Self { x, y })
    }
}

/// Read the AT pixels of a generic region, symbol dictionary or pattern
/// dictionary (7.4.6.3, 7.4.2.1.2).
pub(crate) fn read_at_pixels(
    reader: &mut Reader<'_>,
    template: Template,
) -> Result<Vec<AdaptiveTemplatePixel>> {
    (0..template.at_pixel_count())
        .map(|_| AdaptiveTemplatePixel::read(reader, true))
        .collect()
}

/// Read the AT pixels of a refinement template (7.4.7.3, 7.4.2.1.3).
///
/// "This field is only present if GRTEMPLATE is 0." The second pixel refers to
/// the reference bitmap and may point anywhere.
pub(crate) fn read_refinement_at_pixels(
    reader: &mut Reader<'_>,
    template: RefinementTemplate,
) -> Result<Vec<AdaptiveTemplatePixel>> {
    if template == RefinementTemplate::Template1 {
        return Ok(Vec::new());
    }

    Ok(vec![
        AdaptiveTemplatePixel::read(reader, true)?,
        AdaptiveTemplatePixel::read(reader, false)?,
    ])
}

//! The pattern dictionary decoding procedure (6.7) and pattern dictionary
//! segments (7.4.4).

use super::generic::{self, GenericParams};
use super::{AdaptiveTemplatePixel, Template};
use crate::arithmetic_decoder::{ArithmeticDecoder, ContextTable};
use crate::bitmap::Bitmap;
use crate::error::{DecodeError, RegionError, Result, bail};
use crate::reader::Reader;

/// A decoded pattern dictionary.
#[derive(Debug, Clone)]
pub(crate) struct PatternDictionary {
    /// "HDPATS", indexed by gray value.
    pub(crate) patterns: Vec<Bitmap>,
    /// "HDPW"
    pub(crate) width: u32,
    /// "HDPH"
    pub(crate) height: u32,
}

/// Decode a pattern dictionary segment (7.4.4).
pub(crate) fn decode_dictionary(data: &[u8], max_pixels: u64) -> Result<PatternDictionary> {
    let mut reader = Reader::new(data);

    // 7.4.4.1.1
    let flags = reader.read_byte()?;
    let mmr = flags & 0x01 != 0;
    let template = Template::from_bits(flags >> 1);

    let width = u32::from(reader.read_byte()?);
    let height = u32::from(reader.read_byte()?);
    let gray_max = reader.read_u32()?;

    if width == 0 || height == 0 {
        bail!(RegionError::InvalidDimension);
    }

    let count = gray_max.checked_add(1).ok_or(DecodeError::Overflow)?;

    // "1) Create a bitmap B_HDC. The height of this bitmap is HDPH. The width
    // of the bitmap is (GRAYMAX + 1) × HDPW." (6.7.5)
    let total_width = count.checked_mul(width).ok_or(DecodeError::Overflow)?;

    // "2) Decode the collective bitmap using a generic region decoding
    // procedure as described in 6.2. Set the parameters to this decoding
    // procedure as shown in Table 27."
    let collective = if mmr {
        generic::decode_bitmap_mmr(reader.tail(), total_width, height, max_pixels)?.0
    } else {
        let p = AdaptiveTemplatePixel::new;
        let a1 = p(-(width as i32), 0);
        let at_pixels = match template {
            Template::Template0 => vec![a1, p(-3, -1), p(2, -2), p(-2, -2)],
            _ => vec![a1],
        };

        let mut decoder = ArithmeticDecoder::new(reader.tail());
        let mut contexts = ContextTable::new(1 << template.context_bits());

        generic::decode_bitmap(
            &mut decoder,
            &mut contexts,
            &GenericParams {
                width: total_width,
                height,
                template,
                tpgdon: false,
                at_pixels: &at_pixels,
                skip: None,
            },
            max_pixels,
        )?
    };

    // "a) Let the subimage of B_HDC consisting of HDPH rows and columns
    // HDPW × GRAY through HDPW × (GRAY + 1) – 1 be denoted B_P. Set:
    // HDPATS[GRAY] = B_P"
    let patterns = (0..count)
        .map(|gray| collective.crop(gray * width, 0, width, height))
        .collect();

    Ok(PatternDictionary {
        patterns,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LimitError;

    #[test]
    fn mmr_patterns_are_cut_from_the_collective_bitmap() {
        // HDMMR = 1, HDPW = 4, HDPH = 2, GRAYMAX = 1. The collective bitmap
        // is "00111000" in both rows (H W2 B3 V0 | V0 V0 V0).
        let data = [0x01, 4, 2, 0, 0, 0, 1, 0x2F, 0x78];
        let dictionary = decode_dictionary(&data, 1 << 20).unwrap();

        assert_eq!(dictionary.patterns.len(), 2);
        assert_eq!((dictionary.width, dictionary.height), (4, 2));

        let row = |bitmap: &Bitmap| (0..4).map(|x| bitmap.get_pixel(x, 1)).collect::<Vec<_>>();
        assert_eq!(row(&dictionary.patterns[0]), [false, false, true, true]);
        assert_eq!(row(&dictionary.patterns[1]), [true, false, false, false]);
    }

    #[test]
    fn zero_pattern_width() {
        let data = [0x00, 0, 2, 0, 0, 0, 1];
        assert_eq!(
            decode_dictionary(&data, 1 << 20).map(|_| ()),
            Err(RegionError::InvalidDimension.into())
        );
    }

    #[test]
    fn collective_bitmap_respects_the_pixel_limit() {
        // 2^24 patterns of 255 x 255 pixels.
        let data = [0x00, 255, 255, 0, 0xFF, 0xFF, 0xFF];
        assert_eq!(
            decode_dictionary(&data, 1 << 28).map(|_| ()),
            Err(LimitError::BitmapTooLarge.into())
        );
    }
}

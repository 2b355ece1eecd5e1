//! The generic refinement region decoding procedure (6.3) and refinement
//! region segments (7.4.7).

use super::{
    AdaptiveTemplatePixel, RefinementTemplate, Region, RegionSegmentInfo,
    read_refinement_at_pixels,
};
use crate::arithmetic_decoder::{ArithmeticDecoder, ContextTable};
use crate::bitmap::Bitmap;
use crate::error::{RegionError, Result, TemplateError, bail};
use crate::reader::Reader;

/// Parameters of one invocation of the generic refinement region decoding
/// procedure (Table 6).
#[derive(Debug, Clone, Copy)]
pub(crate) struct RefinementParams<'a> {
    /// "GRW"
    pub(crate) width: u32,
    /// "GRH"
    pub(crate) height: u32,
    /// "GRTEMPLATE"
    pub(crate) template: RefinementTemplate,
    /// "GRREFERENCE"
    pub(crate) reference: &'a Bitmap,
    /// "GRREFERENCEDX"
    pub(crate) reference_dx: i32,
    /// "GRREFERENCEDY"
    pub(crate) reference_dy: i32,
    /// "TPGRON"
    pub(crate) tpgron: bool,
    /// "GRAT"
    pub(crate) at_pixels: &'a [AdaptiveTemplatePixel],
}

/// Decode a refinement region segment (7.4.7) against `reference`.
///
/// `reference` is either the bitmap of the region segment this segment refers
/// to or the part of the page that lies under this region. "GRREFERENCEDX"
/// and "GRREFERENCEDY" are 0 in both cases. (7.4.7.5)
pub(crate) fn decode_region(data: &[u8], reference: &Bitmap, max_pixels: u64) -> Result<Region> {
    let mut reader = Reader::new(data);
    let info = RegionSegmentInfo::parse(&mut reader)?;

    // 7.4.7.2
    let flags = reader.read_byte()?;
    let template = RefinementTemplate::from_bit(flags);
    let tpgron = flags & 0x02 != 0;
    let at_pixels = read_refinement_at_pixels(&mut reader, template)?;

    // "If there is a referred-to segment, then the dimensions of this segment
    // must be the same as the dimensions of the referred-to segment."
    if info.width != reference.width || info.height != reference.height {
        bail!(RegionError::InvalidDimension);
    }

    let mut decoder = ArithmeticDecoder::new(reader.tail());
    let mut contexts = ContextTable::new(1 << template.context_bits());

    let bitmap = decode_bitmap(
        &mut decoder,
        &mut contexts,
        &RefinementParams {
            width: info.width,
            height: info.height,
            template,
            reference,
            reference_dx: 0,
            reference_dy: 0,
            tpgron,
            at_pixels: &at_pixels,
        },
        max_pixels,
    )?;

    Ok(Region { info, bitmap })
}

/// Decode a refinement bitmap (6.3.5.6).
pub(crate) fn decode_bitmap(
    decoder: &mut ArithmeticDecoder<'_>,
    contexts: &mut ContextTable,
    params: &RefinementParams<'_>,
    max_pixels: u64,
) -> Result<Bitmap> {
    let mut bitmap = Bitmap::new_checked(params.width, params.height, max_pixels)?;
    let template = ContextTemplate::new(params.template, params.at_pixels)?;
    let reference = params.reference;

    // See Figures 14 and 15.
    let sltp_context = match params.template {
        RefinementTemplate::Template0 => 0b0_0000_0001_0000,
        RefinementTemplate::Template1 => 0b00_0000_1000,
    };

    // "1) Set: LTP = 0"
    let mut ltp = false;

    for y in 0..bitmap.height {
        // "b) If TPGRON is 1, then decode a bit using the arithmetic entropy
        // coder [...] Set: LTP = LTP XOR SLTP"
        if params.tpgron {
            ltp ^= decoder.decode(contexts.get(sltp_context)) != 0;
        }

        let ry = y as i32 - params.reference_dy;

        for x in 0..bitmap.width {
            let rx = x as i32 - params.reference_dx;

            // "d) If LTP = 1 then, from left to right, implicitly decode
            // certain pixels of the current row of GRREG, and explicitly
            // decode the rest."
            if ltp && let Some(value) = predict(reference, rx, ry) {
                bitmap.set_pixel(x, y, value);
                continue;
            }

            let context = template.context(&bitmap, reference, x as i32, y as i32, rx, ry);
            if decoder.decode(contexts.get(context)) != 0 {
                bitmap.set_pixel(x, y, true);
            }
        }
    }

    Ok(bitmap)
}

/// "TPGRPIX": the common value of the 3 × 3 reference pixels centred on
/// (rx, ry), if they all agree (Figure 16).
fn predict(reference: &Bitmap, rx: i32, ry: i32) -> Option<bool> {
    let center = reference.pixel(rx, ry);

    for dy in -1..=1 {
        for dx in -1..=1 {
            if reference.pixel(rx + dx, ry + dy) != center {
                return None;
            }
        }
    }

    Some(center != 0)
}

/// The template pixels of Figures 12 and 13, split into the pixels of the
/// bitmap being decoded and those of the reference bitmap. The pixels of the
/// decoded bitmap form the most significant bits of the context.
struct ContextTemplate {
    current: Vec<AdaptiveTemplatePixel>,
    reference: Vec<AdaptiveTemplatePixel>,
}

impl ContextTemplate {
    fn new(template: RefinementTemplate, at: &[AdaptiveTemplatePixel]) -> Result<Self> {
        let p = AdaptiveTemplatePixel::new;

        match template {
            RefinementTemplate::Template0 => {
                let [a1, a2] = at else {
                    bail!(TemplateError::Invalid);
                };

                Ok(Self {
                    current: vec![*a1, p(0, -1), p(1, -1), p(-1, 0)],
                    reference: vec![
                        *a2,
                        p(0, -1),
                        p(1, -1),
                        p(-1, 0),
                        p(0, 0),
                        p(1, 0),
                        p(-1, 1),
                        p(0, 1),
                        p(1, 1),
                    ],
                })
            }
            RefinementTemplate::Template1 => Ok(Self {
                current: vec![p(-1, -1), p(0, -1), p(1, -1), p(-1, 0)],
                reference: vec![p(0, -1), p(-1, 0), p(0, 0), p(1, 0), p(0, 1), p(1, 1)],
            }),
        }
    }

    #[inline]
    fn context(
        &self,
        bitmap: &Bitmap,
        reference: &Bitmap,
        x: i32,
        y: i32,
        rx: i32,
        ry: i32,
    ) -> u32 {
        let context = self
            .current
            .iter()
            .fold(0, |cx, p| (cx << 1) | bitmap.pixel(x + p.x, y + p.y));

        self.reference
            .iter()
            .fold(context, |cx, p| (cx << 1) | reference.pixel(rx + p.x, ry + p.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    fn bitmap(rows: &[&str]) -> Bitmap {
        let mut bitmap = Bitmap::new(rows[0].len() as u32, rows.len() as u32);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                bitmap.set_pixel(x as u32, y as u32, c == '1');
            }
        }
        bitmap
    }

    #[test]
    fn template_1_context() {
        let current = bitmap(&["110", "100", "000"]);
        let reference = bitmap(&["010", "111", "011"]);
        let template = ContextTemplate::new(RefinementTemplate::Template1, &[]).unwrap();

        // Pixel (1, 1) with the reference shifted by one column to the right,
        // so that (rx, ry) = (0, 1).
        let context = template.context(&current, &reference, 1, 1, 0, 1);
        assert_eq!(context, 0b1101_0_0_1_1_0_1);
    }

    #[test]
    fn prediction_needs_uniform_neighbourhood() {
        let reference = bitmap(&["1111", "1111", "1110"]);
        assert_eq!(predict(&reference, 1, 1), Some(true));
        assert_eq!(predict(&reference, 2, 1), None);
        // Pixels outside of the reference are 0.
        assert_eq!(predict(&reference, 10, 10), Some(false));
        assert_eq!(predict(&reference, 0, 0), None);
    }

    #[test]
    fn reference_must_match_region_size() {
        let reference = Bitmap::new(4, 4);
        #[rustfmt::skip]
        let data = [
            0, 0, 0, 4, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0x01, 0x00, 0x00,
        ];
        assert_eq!(
            decode_region(&data, &reference, u64::MAX).unwrap_err(),
            DecodeError::Region(RegionError::InvalidDimension)
        );
    }

    #[test]
    fn refinement_is_deterministic() {
        let reference = bitmap(&["0110", "1001", "1001", "0110"]);
        #[rustfmt::skip]
        let data = [
            0, 0, 0, 4, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x5A, 0x3C, 0x81, 0x7E,
        ];
        let first = decode_region(&data, &reference, u64::MAX).unwrap();
        let second = decode_region(&data, &reference, u64::MAX).unwrap();
        assert_eq!(first.bitmap, second.bitmap);
        assert_eq!(first.bitmap.width, 4);
    }
}

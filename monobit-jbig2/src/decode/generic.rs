//! The generic region decoding procedure (6.2) and generic region segments
//! (7.4.6).

use super::{AdaptiveTemplatePixel, Region, RegionSegmentInfo, Template, read_at_pixels};
use crate::arithmetic_decoder::{ArithmeticDecoder, ContextTable};
use crate::bitmap::Bitmap;
use crate::error::{RegionError, Result, TemplateError, bail};
use crate::reader::Reader;

/// Parameters of one invocation of the generic region decoding procedure
/// (Table 2).
#[derive(Debug, Clone, Copy)]
pub(crate) struct GenericParams<'a> {
    /// "GBW"
    pub(crate) width: u32,
    /// "GBH"
    pub(crate) height: u32,
    /// "GBTEMPLATE", together with "EXTTEMPLATE".
    pub(crate) template: Template,
    /// "TPGDON"
    pub(crate) tpgdon: bool,
    /// "GBAT"
    pub(crate) at_pixels: &'a [AdaptiveTemplatePixel],
    /// "SKIP", if "USESKIP" is 1.
    pub(crate) skip: Option<&'a Bitmap>,
}

/// Decode a generic region segment (7.4.6).
pub(crate) fn decode_region(
    data: &[u8],
    had_unknown_length: bool,
    max_pixels: u64,
) -> Result<Region> {
    let mut reader = Reader::new(data);
    let mut info = RegionSegmentInfo::parse(&mut reader)?;

    // 7.4.6.2
    let flags = reader.read_byte()?;
    let mmr = flags & 0x01 != 0;
    let tpgdon = flags & 0x08 != 0;
    let template = Template::from_bits(flags >> 1);
    // "EXTTEMPLATE" only extends template 0.
    let template = if flags & 0x10 != 0 && template == Template::Template0 {
        Template::Extended
    } else {
        template
    };

    let at_pixels = if mmr {
        Vec::new()
    } else {
        let pixels = read_at_pixels(&mut reader, template)?;
        // The extended template field is 32 bytes long, of which the twelve
        // AT pixels take up the first 24.
        if template == Template::Extended {
            reader.skip_bytes(8)?;
        }

        pixels
    };

    let mut coded = reader.tail();

    // "As a special case, as noted in 7.2.7, an immediate generic region
    // segment may have an unknown length. In this case, it also indicates the
    // height of the generic region (i.e. the number of rows that have been
    // decoded in this segment; it must be no greater than the region segment
    // bitmap height value in the segment's region segment information field."
    // (7.4.6.4)
    if had_unknown_length {
        let split = coded.len().checked_sub(4).ok_or(RegionError::InvalidDimension)?;
        let (head, row_count) = coded.split_at(split);
        let row_count = Reader::new(row_count).read_u32()?;

        if row_count > info.height {
            bail!(RegionError::InvalidDimension);
        }

        info.height = row_count;
        coded = head;
    }

    let bitmap = if mmr {
        decode_bitmap_mmr(coded, info.width, info.height, max_pixels)?.0
    } else {
        let mut decoder = ArithmeticDecoder::new(coded);
        let mut contexts = ContextTable::new(1 << template.context_bits());

        decode_bitmap(
            &mut decoder,
            &mut contexts,
            &GenericParams {
                width: info.width,
                height: info.height,
                template,
                tpgdon,
                at_pixels: &at_pixels,
                skip: None,
            },
            max_pixels,
        )?
    };

    Ok(Region { info, bitmap })
}

/// Decode a bitmap with template-based arithmetic coding (6.2.5).
///
/// `contexts` must have room for `1 << params.template.context_bits()`
/// contexts.
pub(crate) fn decode_bitmap(
    decoder: &mut ArithmeticDecoder<'_>,
    contexts: &mut ContextTable,
    params: &GenericParams<'_>,
    max_pixels: u64,
) -> Result<Bitmap> {
    let mut bitmap = Bitmap::new_checked(params.width, params.height, max_pixels)?;
    let pixels = template_pixels(params.template, params.at_pixels)?;

    // See Figures 8 to 11. The extended template uses the context of
    // template 0.
    let sltp_context = match params.template {
        Template::Template0 | Template::Extended => 0b1001_1011_0010_0101,
        Template::Template1 => 0b0_0111_1001_0101,
        Template::Template2 => 0b00_1110_0101,
        Template::Template3 => 0b01_1001_0101,
    };

    // "1) Set: LTP = 0"
    let mut ltp = false;

    for y in 0..bitmap.height {
        // "b) If TPGDON is 1, then decode a bit using the arithmetic entropy
        // coder [...] Let SLTP be the value of this bit. Set: LTP = LTP XOR
        // SLTP"
        if params.tpgdon {
            ltp ^= decoder.decode(contexts.get(sltp_context)) != 0;
        }

        // "c) If LTP = 1 then set every pixel of the current row of GBREG
        // equal to the corresponding pixel of the row immediately above."
        if ltp {
            if y > 0 {
                let width = bitmap.width as usize;
                let start = y as usize * width;
                bitmap.data.copy_within(start - width..start, start);
            }

            continue;
        }

        // "d) If LTP = 0 then, from left to right, decode each pixel of the
        // current row of GBREG."
        for x in 0..bitmap.width {
            // "If USESKIP is 1 and the pixel in the bitmap SKIP at the
            // location corresponding to the current pixel is 1, then set the
            // value of the current pixel to 0."
            if params.skip.is_some_and(|skip| skip.get_pixel(x, y)) {
                continue;
            }

            let context = gather_context(&bitmap, x as i32, y as i32, &pixels);
            if decoder.decode(contexts.get(context)) != 0 {
                bitmap.set_pixel(x, y, true);
            }
        }
    }

    Ok(bitmap)
}

/// The template pixels of Figures 3 to 6, most significant context bit first.
///
/// AT pixels take the place of their nominal positions. The extended template
/// consists of the twelve AT pixels followed by the four pixels to the left of
/// the current pixel.
fn template_pixels(
    template: Template,
    at: &[AdaptiveTemplatePixel],
) -> Result<Vec<AdaptiveTemplatePixel>> {
    if at.len() != template.at_pixel_count() {
        bail!(TemplateError::Invalid);
    }

    let p = AdaptiveTemplatePixel::new;

    #[rustfmt::skip]
    let pixels = match template {
        Template::Template0 => vec![
            at[3], p(-1, -2), p(0, -2), p(1, -2), at[2],
            at[1], p(-2, -1), p(-1, -1), p(0, -1), p(1, -1), p(2, -1), at[0],
            p(-4, 0), p(-3, 0), p(-2, 0), p(-1, 0),
        ],
        Template::Template1 => vec![
            p(-1, -2), p(0, -2), p(1, -2), p(2, -2),
            p(-2, -1), p(-1, -1), p(0, -1), p(1, -1), p(2, -1), at[0],
            p(-3, 0), p(-2, 0), p(-1, 0),
        ],
        Template::Template2 => vec![
            p(-1, -2), p(0, -2), p(1, -2),
            p(-2, -1), p(-1, -1), p(0, -1), p(1, -1), at[0],
            p(-2, 0), p(-1, 0),
        ],
        Template::Template3 => vec![
            p(-3, -1), p(-2, -1), p(-1, -1), p(0, -1), p(1, -1), at[0],
            p(-4, 0), p(-3, 0), p(-2, 0), p(-1, 0),
        ],
        Template::Extended => {
            let mut pixels = at.to_vec();
            pixels.extend([p(-4, 0), p(-3, 0), p(-2, 0), p(-1, 0)]);
            pixels
        }
    };

    Ok(pixels)
}

#[inline]
fn gather_context(bitmap: &Bitmap, x: i32, y: i32, pixels: &[AdaptiveTemplatePixel]) -> u32 {
    pixels
        .iter()
        .fold(0, |context, p| (context << 1) | bitmap.pixel(x + p.x, y + p.y))
}

/// Decode a bitmap with MMR coding (6.2.6), returning it together with the
/// number of bytes consumed.
///
/// "An invocation of the generic region decoding procedure with MMR equal to
/// 1 shall consume an integral number of bytes, beginning and ending on a
/// byte boundary."
pub(crate) fn decode_bitmap_mmr(
    data: &[u8],
    width: u32,
    height: u32,
    max_pixels: u64,
) -> Result<(Bitmap, usize)> {
    struct Sink<'a> {
        bitmap: &'a mut Bitmap,
        x: u32,
        y: u32,
    }

    impl monobit_ccitt::Decoder for Sink<'_> {
        fn push_pixels(&mut self, value: bool, count: u32) {
            if value && self.y < self.bitmap.height {
                let end = self.x.saturating_add(count).min(self.bitmap.width);
                let row = self.y as usize * self.bitmap.width as usize;
                self.bitmap.data[row + self.x as usize..row + end as usize].fill(true);
            }

            self.x = self.x.saturating_add(count).min(self.bitmap.width);
        }

        fn next_line(&mut self) {
            self.x = 0;
            self.y += 1;
        }
    }

    let mut bitmap = Bitmap::new_checked(width, height, max_pixels)?;
    if bitmap.is_empty() {
        return Ok((bitmap, 0));
    }

    let settings = monobit_ccitt::DecodeSettings {
        columns: width,
        rows: height,
        // "If the number of bytes contained in the encoded bitmap is known in
        // advance, then it is permissible for the data stream not to contain
        // an EOFB."
        end_of_block: true,
        // "Pixels decoded by the MMR decoder having the value 'black' shall be
        // treated as having the value 1."
        black_is_1: true,
    };

    let mut sink = Sink {
        bitmap: &mut bitmap,
        x: 0,
        y: 0,
    };
    let consumed = monobit_ccitt::decode(data, &mut sink, &settings)?;

    Ok((bitmap, consumed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    const NOMINAL_AT: [AdaptiveTemplatePixel; 4] = [
        AdaptiveTemplatePixel::new(3, -1),
        AdaptiveTemplatePixel::new(-3, -1),
        AdaptiveTemplatePixel::new(2, -2),
        AdaptiveTemplatePixel::new(-2, -2),
    ];

    fn params(template: Template, tpgdon: bool, at: &[AdaptiveTemplatePixel]) -> GenericParams<'_> {
        GenericParams {
            width: 16,
            height: 8,
            template,
            tpgdon,
            at_pixels: at,
            skip: None,
        }
    }

    #[test]
    fn decoding_is_deterministic() {
        let data = [0x4A, 0x91, 0x3C, 0x07, 0xE2, 0x55, 0x18, 0xB3, 0x6F, 0x20];
        let decode = || {
            decode_bitmap(
                &mut ArithmeticDecoder::new(&data),
                &mut ContextTable::new(1 << 16),
                &params(Template::Template0, false, &NOMINAL_AT),
                u64::MAX,
            )
            .unwrap()
        };

        assert_eq!(decode(), decode());
    }

    #[test]
    fn skipped_pixels_stay_white() {
        let mut skip = Bitmap::new(16, 8);
        skip.fill(true);

        let data = [0xFF; 16];
        let decoded = decode_bitmap(
            &mut ArithmeticDecoder::new(&data),
            &mut ContextTable::new(1 << 16),
            &GenericParams {
                skip: Some(&skip),
                ..params(Template::Template0, false, &NOMINAL_AT)
            },
            u64::MAX,
        )
        .unwrap();

        assert!(decoded.data.iter().all(|p| !p));
    }

    #[test]
    fn extended_template_uses_its_own_layout() {
        let mut bitmap = Bitmap::new(8, 4);
        for (x, y) in [(0, 0), (2, 1), (5, 1), (3, 2), (6, 3)] {
            bitmap.set_pixel(x, y, true);
        }

        let mut at = NOMINAL_AT.to_vec();
        let standard = template_pixels(Template::Template0, &at).unwrap();

        // Twelve AT pixels covering the nominal positions of template 0 that
        // are not on the current row, nearest row first.
        at = [(-3, -1), (-2, -1), (-1, -1), (0, -1), (1, -1), (2, -1), (3, -1)]
            .into_iter()
            .chain([(-2, -2), (-1, -2), (0, -2), (1, -2), (2, -2)])
            .map(|(x, y)| AdaptiveTemplatePixel::new(x, y))
            .collect();
        let extended = template_pixels(Template::Extended, &at).unwrap();

        let standard_context = gather_context(&bitmap, 4, 3, &standard);
        let extended_context = gather_context(&bitmap, 4, 3, &extended);

        // Both read the same pixels, in a different order.
        assert_eq!(standard_context.count_ones(), extended_context.count_ones());
        assert_ne!(standard_context, extended_context);
        assert_eq!(standard_context, 0b1001_0001_0000_0000);
        assert_eq!(extended_context, 0b0010_0001_0010_0000);
    }

    #[test]
    fn extension_flag_is_ignored_for_other_templates() {
        let mut data = vec![0, 0, 0, 8, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        // GBTEMPLATE 1 with the EXTTEMPLATE bit set, followed by the single
        // AT pixel of template 1.
        data.extend([0x12, 0x03, 0xFF]);
        data.extend([0x00, 0x00, 0xFF, 0xAC]);

        let region = decode_region(&data, false, u64::MAX).unwrap();
        assert_eq!(region.bitmap.width, 8);
        assert_eq!(region.bitmap.height, 4);

        // With GBTEMPLATE 0 the coded bytes are read as the extended AT
        // field, whose second pixel (0, 0) is not causal.
        data[17] = 0x10;
        assert_eq!(
            decode_region(&data, false, u64::MAX).unwrap_err(),
            DecodeError::Template(TemplateError::InvalidAtPixel)
        );
    }

    #[test]
    fn wrong_number_of_at_pixels() {
        assert_eq!(
            template_pixels(Template::Extended, &NOMINAL_AT).unwrap_err(),
            DecodeError::Template(TemplateError::Invalid)
        );
    }

    #[test]
    fn mmr_region() {
        // Two rows of "00111000", see the fax decoder tests.
        let (bitmap, consumed) = decode_bitmap_mmr(&[0x2F, 0x78], 8, 2, u64::MAX).unwrap();
        assert_eq!(consumed, 2);
        let expected = [false, false, true, true, true, false, false, false];
        assert_eq!(bitmap.row(0), expected);
        assert_eq!(bitmap.row(1), expected);
    }

    #[test]
    fn region_with_unknown_length_uses_row_count() {
        let mut data = vec![0, 0, 0, 8, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        // MMR.
        data.push(0x01);
        data.extend([0x2F, 0x78, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02]);

        let region = decode_region(&data, true, u64::MAX).unwrap();
        assert_eq!(region.bitmap.height, 2);
        assert!(region.bitmap.get_pixel(2, 1));

        let mut too_many = data.clone();
        *too_many.last_mut().unwrap() = 5;
        assert_eq!(
            decode_region(&too_many, true, u64::MAX).unwrap_err(),
            DecodeError::Region(RegionError::InvalidDimension)
        );
    }
}

//! The gray-scale image decoding procedure (Annex C).

use crate::arithmetic_decoder::{ArithmeticDecoder, ContextTable};
use crate::bitmap::Bitmap;
use crate::decode::generic::{self, GenericParams};
use crate::decode::{AdaptiveTemplatePixel, Template};
use crate::error::{LimitError, Result, bail};

/// Parameters of the gray-scale image decoding procedure (Table C.1).
#[derive(Debug, Clone, Copy)]
pub(crate) struct GrayScaleParams<'a> {
    /// "GSMMR"
    pub(crate) mmr: bool,
    /// "GSUSESKIP" and "GSKIP"
    pub(crate) skip: Option<&'a Bitmap>,
    /// "GSBPP"
    pub(crate) bits_per_pixel: u32,
    /// "GSW"
    pub(crate) width: u32,
    /// "GSH"
    pub(crate) height: u32,
    /// "GSTEMPLATE"
    pub(crate) template: Template,
}

/// Decode "GSVALS", one value per pixel in row-major order (C.5).
pub(crate) fn decode_gray_scale_image(
    data: &[u8],
    params: &GrayScaleParams<'_>,
    max_pixels: u64,
) -> Result<Vec<u32>> {
    let pixels = u64::from(params.width) * u64::from(params.height);
    if pixels > max_pixels {
        bail!(LimitError::BitmapTooLarge);
    }

    if params.mmr {
        let mut offset = 0;

        combine_bitplanes(params, pixels as usize, || {
            let (plane, consumed) = generic::decode_bitmap_mmr(
                data.get(offset..).unwrap_or_default(),
                params.width,
                params.height,
                max_pixels,
            )?;
            offset += consumed;

            Ok(plane)
        })
    } else {
        // Table C.4
        let p = AdaptiveTemplatePixel::new;
        let a1_x = if matches!(params.template, Template::Template0 | Template::Template1) {
            3
        } else {
            2
        };
        let a1 = p(a1_x, -1);
        let at_pixels = match params.template {
            Template::Template0 => vec![a1, p(-3, -1), p(2, -2), p(-2, -2)],
            _ => vec![a1],
        };

        let mut decoder = ArithmeticDecoder::new(data);
        let mut contexts = ContextTable::new(1 << params.template.context_bits());

        combine_bitplanes(params, pixels as usize, || {
            generic::decode_bitmap(
                &mut decoder,
                &mut contexts,
                &GenericParams {
                    width: params.width,
                    height: params.height,
                    template: params.template,
                    tpgdon: false,
                    at_pixels: &at_pixels,
                    skip: params.skip,
                },
                max_pixels,
            )
        })
    }
}

/// Decode the bitplanes from the most significant one down and undo the Gray
/// coding.
///
/// "2) Set J = GSBPP – 2. 3) While J ≥ 0: a) Decode GSPLANES[J] [...]
/// b) For each pixel (x, y) in GSPLANES[J], set:
/// GSPLANES[J][x, y] = GSPLANES[J + 1][x, y] XOR GSPLANES[J][x, y]"
fn combine_bitplanes(
    params: &GrayScaleParams<'_>,
    pixels: usize,
    mut next_plane: impl FnMut() -> Result<Bitmap>,
) -> Result<Vec<u32>> {
    let mut values = vec![0_u32; pixels];
    let mut previous: Option<Bitmap> = None;

    for j in (0..params.bits_per_pixel).rev() {
        let mut plane = next_plane()?;

        if let Some(previous) = &previous {
            for (bit, above) in plane.data.iter_mut().zip(&previous.data) {
                *bit ^= *above;
            }
        }

        // "4) For each (x, y), set: GSVALS[x, y] = Σ GSPLANES[J][x, y] × 2^J"
        for (value, &bit) in values.iter_mut().zip(&plane.data) {
            *value |= u32::from(bit) << j;
        }

        previous = Some(plane);
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(bits_per_pixel: u32) -> GrayScaleParams<'static> {
        GrayScaleParams {
            mmr: true,
            skip: None,
            bits_per_pixel,
            width: 8,
            height: 2,
            template: Template::Template0,
        }
    }

    fn plane(rows: [&str; 2]) -> Bitmap {
        let mut bitmap = Bitmap::new(8, 2);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.bytes().enumerate() {
                bitmap.set_pixel(x as u32, y as u32, c == b'1');
            }
        }
        bitmap
    }

    #[test]
    fn gray_code_is_undone() {
        // Gray codes 00, 01, 11, 10 stand for 0, 1, 2, 3.
        let mut planes = vec![
            plane(["00110000", "00000000"]),
            plane(["01100000", "00000000"]),
        ]
        .into_iter();

        let values = combine_bitplanes(&params(2), 16, || Ok(planes.next().unwrap())).unwrap();
        assert_eq!(&values[..4], &[0, 1, 2, 3]);
        assert!(values[4..].iter().all(|v| *v == 0));
    }

    #[test]
    fn mmr_planes_follow_each_other() {
        // Two planes of "00111000" x 2 (H W2 B3 V0 | V0 V0 V0), each two
        // bytes long. The second plane XORs the first away.
        let data = [0x2F, 0x78, 0x2F, 0x78];
        let values = decode_gray_scale_image(&data, &params(2), 1 << 20).unwrap();

        assert_eq!(&values[..8], &[0, 0, 2, 2, 2, 0, 0, 0]);
    }

    #[test]
    fn oversized_image() {
        assert_eq!(
            decode_gray_scale_image(&[], &params(1), 15),
            Err(LimitError::BitmapTooLarge.into())
        );
    }
}

//! Integration with the [image] crate

use ::image::error::{DecodingError, ImageFormatHint};
use ::image::{ColorType, ExtendedColorType, GrayImage, ImageDecoder, ImageError, ImageResult};

use crate::Bitmap;

impl Bitmap {
    /// Convert the bitmap into an 8-bit grayscale image, with black as 0 and
    /// white as 255.
    pub fn to_luma8(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            ::image::Luma([luma(self.get_pixel(x, y))])
        })
    }
}

impl ImageDecoder for Bitmap {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn color_type(&self) -> ColorType {
        ColorType::L8
    }

    fn original_color_type(&self) -> ExtendedColorType {
        ExtendedColorType::L1
    }

    fn read_image(self, buf: &mut [u8]) -> ImageResult<()>
    where
        Self: Sized,
    {
        convert_inner(&self, buf)
    }

    fn read_image_boxed(self: Box<Self>, buf: &mut [u8]) -> ImageResult<()> {
        convert_inner(&self, buf)
    }
}

fn luma(black: bool) -> u8 {
    if black { 0 } else { 255 }
}

fn convert_inner(bitmap: &Bitmap, buf: &mut [u8]) -> ImageResult<()> {
    if buf.len() != bitmap.data.len() {
        return Err(ImageError::Decoding(DecodingError::new(
            ImageFormatHint::Name("JBIG2".to_string()),
            "output buffer has the wrong size",
        )));
    }

    for (out, black) in buf.iter_mut().zip(&bitmap.data) {
        *out = luma(*black);
    }

    Ok(())
}

impl From<crate::DecodeError> for DecodingError {
    fn from(value: crate::DecodeError) -> Self {
        let format = ImageFormatHint::Name("JBIG2".to_owned());
        Self::new(format, value)
    }
}

impl From<crate::DecodeError> for ImageError {
    fn from(value: crate::DecodeError) -> Self {
        Self::Decoding(value.into())
    }
}

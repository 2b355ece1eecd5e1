//! Bitmap representation and the region combination operators.
//!
//! "Pixels decoded by the MMR decoder having the value 'black' shall be treated
//! as having the value 1. Pixels decoded by the MMR decoder having the value
//! 'white' shall be treated as having the value 0." (6.2.6)

use crate::error::{LimitError, RegionError, Result, bail, err};

/// A bi-level image.
///
/// Pixels are stored as booleans where `true` means black, `false` means white.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel data, one bool per pixel, row-major order.
    pub data: Vec<bool>,
}

impl Bitmap {
    /// Create a new white bitmap.
    ///
    /// A bitmap with zero width or zero height is always the empty 0x0 bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Self::default();
        }

        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    /// Create a new white bitmap, refusing to allocate more than `max_pixels`.
    pub(crate) fn new_checked(width: u32, height: u32, max_pixels: u64) -> Result<Self> {
        if u64::from(width) * u64::from(height) > max_pixels {
            bail!(LimitError::BitmapTooLarge);
        }

        Ok(Self::new(width, height))
    }

    /// Whether the bitmap has no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a pixel value at (x, y). Out-of-bounds pixels are white.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }

        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Get a pixel value at signed coordinates as 0 or 1.
    ///
    /// "All pixels lying outside the bounds of the actual bitmap have the
    /// value 0." (6.2.5.2)
    #[inline(always)]
    pub(crate) fn pixel(&self, x: i32, y: i32) -> u32 {
        if x < 0 || y < 0 {
            return 0;
        }

        u32::from(self.get_pixel(x as u32, y as u32))
    }

    /// Set a pixel value at (x, y). Out-of-bounds writes are ignored.
    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, value: bool) {
        if x >= self.width || y >= self.height {
            return;
        }

        let width = self.width as usize;
        self.data[y as usize * width + x as usize] = value;
    }

    /// The pixels of row `y`.
    ///
    /// # Panics
    /// Panics if `y` is out of bounds.
    pub fn row(&self, y: u32) -> &[bool] {
        let width = self.width as usize;
        let start = y as usize * width;
        &self.data[start..start + width]
    }

    /// Set every pixel to `value`.
    pub fn fill(&mut self, value: bool) {
        self.data.fill(value);
    }

    /// Copy out the `width` x `height` rectangle whose top-left corner is at
    /// (x, y). Parts of the rectangle outside of this bitmap are white.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let mut out = Self::new(width, height);
        out.compose(self, -i64::from(x), -i64::from(y), CombinationOperator::Replace);
        out
    }

    /// Draw `source` with its top-left corner at (x, y) using `operator`.
    ///
    /// Only the part of `source` that overlaps this bitmap takes part. Pixels
    /// of this bitmap outside of that overlap keep their value for every
    /// operator, including [`CombinationOperator::Replace`].
    pub fn compose(&mut self, source: &Self, x: i64, y: i64, operator: CombinationOperator) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + i64::from(source.width)).min(i64::from(self.width));
        let y1 = (y + i64::from(source.height)).min(i64::from(self.height));

        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let dst_width = self.width as usize;
        let src_width = source.width as usize;
        let span = (x1 - x0) as usize;
        let src_x = (x0 - x) as usize;

        for dst_y in y0..y1 {
            let src_y = (dst_y - y) as usize;
            let src_start = src_y * src_width + src_x;
            let dst_start = dst_y as usize * dst_width + x0 as usize;

            let src = &source.data[src_start..src_start + span];
            let dst = &mut self.data[dst_start..dst_start + span];

            match operator {
                // "0 OR"
                CombinationOperator::Or => dst.iter_mut().zip(src).for_each(|(d, s)| *d |= *s),
                // "1 AND"
                CombinationOperator::And => dst.iter_mut().zip(src).for_each(|(d, s)| *d &= *s),
                // "2 XOR"
                CombinationOperator::Xor => dst.iter_mut().zip(src).for_each(|(d, s)| *d ^= *s),
                // "3 XNOR"
                CombinationOperator::Xnor => {
                    dst.iter_mut().zip(src).for_each(|(d, s)| *d = *d == *s);
                }
                // "4 REPLACE"
                CombinationOperator::Replace => dst.copy_from_slice(src),
            }
        }
    }
}

/// "These operators describe how the segment's bitmap is to be combined with
/// the page bitmap." (7.4.1.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinationOperator {
    /// 0 OR
    Or,
    /// 1 AND
    And,
    /// 2 XOR
    Xor,
    /// 3 XNOR
    Xnor,
    /// 4 REPLACE
    Replace,
}

impl CombinationOperator {
    pub(crate) fn from_value(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Or),
            1 => Ok(Self::And),
            2 => Ok(Self::Xor),
            3 => Ok(Self::Xnor),
            4 => Ok(Self::Replace),
            _ => err!(RegionError::InvalidCombinationOperator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_rows(rows: &[&str]) -> Bitmap {
        let mut bitmap = Bitmap::new(rows[0].len() as u32, rows.len() as u32);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.bytes().enumerate() {
                bitmap.set_pixel(x as u32, y as u32, c == b'1');
            }
        }
        bitmap
    }

    fn solid(width: u32, height: u32) -> Bitmap {
        let mut bitmap = Bitmap::new(width, height);
        bitmap.fill(true);
        bitmap
    }

    #[test]
    fn or_at_negative_offset_fills_the_top_left_overlap() {
        let mut page = Bitmap::new(3, 3);
        page.compose(&solid(3, 3), -1, -1, CombinationOperator::Or);
        assert_eq!(page, from_rows(&["110", "110", "000"]));
    }

    #[test]
    fn replace_only_touches_the_overlap() {
        let mut page = from_rows(&["101", "010", "101"]);
        let source = from_rows(&["111", "100", "100"]);
        page.compose(&source, -1, -1, CombinationOperator::Replace);
        // The overlap is the top-left 2x2 block of the page, filled from the
        // bottom-right 2x2 block of the source.
        assert_eq!(page, from_rows(&["001", "000", "101"]));
    }

    #[test]
    fn operators() {
        let base = from_rows(&["0011"]);
        let source = from_rows(&["0101"]);
        let expected = [
            (CombinationOperator::Or, "0111"),
            (CombinationOperator::And, "0001"),
            (CombinationOperator::Xor, "0110"),
            (CombinationOperator::Xnor, "1001"),
            (CombinationOperator::Replace, "0101"),
        ];

        for (operator, result) in expected {
            let mut dst = base.clone();
            dst.compose(&source, 0, 0, operator);
            assert_eq!(dst, from_rows(&[result]), "{operator:?}");
        }
    }

    #[test]
    fn compose_outside_is_a_no_op() {
        let mut page = Bitmap::new(4, 4);
        page.compose(&solid(2, 2), 4, 0, CombinationOperator::Or);
        page.compose(&solid(2, 2), -2, 1, CombinationOperator::Or);
        page.compose(&solid(2, 2), 1, i64::from(u32::MAX), CombinationOperator::Or);
        assert!(page.data.iter().all(|p| !p));
    }

    #[test]
    fn crop_pads_with_white() {
        let bitmap = solid(2, 2);
        assert_eq!(bitmap.crop(1, 1, 2, 2), from_rows(&["10", "00"]));
    }

    #[test]
    fn empty_and_limits() {
        assert!(Bitmap::new(0, 7).is_empty());
        assert_eq!(Bitmap::new(5, 0), Bitmap::default());
        assert!(Bitmap::new_checked(1000, 1000, 999_999).is_err());
        assert!(Bitmap::new_checked(1000, 1000, 1_000_000).is_ok());
    }
}

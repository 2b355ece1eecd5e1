//! The halftone region decoding procedure (6.6) and halftone region segments
//! (7.4.5).

use super::pattern::PatternDictionary;
use super::text::symbol_code_len;
use super::{Region, RegionSegmentInfo, Template};
use crate::bitmap::{Bitmap, CombinationOperator};
use crate::error::{RegionError, Result, bail};
use crate::gray_scale::{GrayScaleParams, decode_gray_scale_image};
use crate::reader::Reader;

/// The halftone grid (7.4.5.1.2, 7.4.5.1.3).
#[derive(Debug, Clone, Copy)]
struct Grid {
    /// "HGW"
    width: u32,
    /// "HGH"
    height: u32,
    /// "HGX"
    x: i32,
    /// "HGY"
    y: i32,
    /// "HRX", 256 times the horizontal component of the grid vector.
    vector_x: u16,
    /// "HRY"
    vector_y: u16,
}

impl Grid {
    /// The top-left corner of the pattern placed at grid cell (mg, ng).
    ///
    /// "x = HGX + mg × HRY + ng × HRX
    ///  y = HGY + mg × HRX – ng × HRY" (6.6.5.2)
    fn cell(&self, mg: u32, ng: u32) -> (i64, i64) {
        let (mg, ng) = (i64::from(mg), i64::from(ng));
        let (hrx, hry) = (i64::from(self.vector_x), i64::from(self.vector_y));

        let x = i64::from(self.x) + mg * hry + ng * hrx;
        let y = i64::from(self.y) + mg * hrx - ng * hry;

        (x >> 8, y >> 8)
    }
}

/// Decode a halftone region segment (7.4.5) with the patterns of `patterns`.
pub(crate) fn decode_region(
    data: &[u8],
    patterns: &PatternDictionary,
    max_pixels: u64,
) -> Result<Region> {
    let mut reader = Reader::new(data);
    let info = RegionSegmentInfo::parse(&mut reader)?;

    // 7.4.5.1.1
    let flags = reader.read_byte()?;
    let mmr = flags & 0x01 != 0;
    let template = Template::from_bits(flags >> 1);
    let enable_skip = flags & 0x08 != 0;
    let operator = CombinationOperator::from_value((flags >> 4) & 0x07)?;
    let default_pixel = flags & 0x80 != 0;

    let grid = Grid {
        width: reader.read_u32()?,
        height: reader.read_u32()?,
        x: reader.read_i32()?,
        y: reader.read_i32()?,
        vector_x: reader.read_u16()?,
        vector_y: reader.read_u16()?,
    };

    // "1) Fill a bitmap HTREG, of the size given by HBW and HBH, with the
    // HDEFPIXEL value." (6.6.5)
    let mut bitmap = Bitmap::new_checked(info.width, info.height, max_pixels)?;
    bitmap.fill(default_pixel);

    // "2) If HENABLESKIP equals 1, compute a bitmap HSKIP as shown in 6.6.5.1."
    let skip = if enable_skip && !mmr {
        Some(skip_bitmap(&grid, patterns, &bitmap, max_pixels)?)
    } else {
        None
    };

    // "3) Set HBPP to ⌈log2(HNUMPATS)⌉."
    let bits_per_pixel = symbol_code_len(patterns.patterns.len());

    // "4) Decode an image GI of size HGW by HGH with HBPP bits per pixel using
    // the gray-scale image decoding procedure as described in Annex C."
    let values = decode_gray_scale_image(
        reader.tail(),
        &GrayScaleParams {
            mmr,
            skip: skip.as_ref(),
            bits_per_pixel,
            width: grid.width,
            height: grid.height,
            template,
        },
        max_pixels,
    )?;

    // "5) Place sequentially the patterns corresponding to the values in GI
    // into HTREG by the procedure described in 6.6.5.2."
    render_patterns(&mut bitmap, &grid, &values, patterns, operator)?;

    ltrace!(
        "halftone region {}x{} with a {}x{} grid",
        info.width,
        info.height,
        grid.width,
        grid.height
    );

    Ok(Region { info, bitmap })
}

/// Compute "HSKIP", which marks grid cells whose pattern would not touch the
/// region (6.6.5.1).
fn skip_bitmap(
    grid: &Grid,
    patterns: &PatternDictionary,
    region: &Bitmap,
    max_pixels: u64,
) -> Result<Bitmap> {
    let mut skip = Bitmap::new_checked(grid.width, grid.height, max_pixels)?;
    let (pattern_width, pattern_height) = (i64::from(patterns.width), i64::from(patterns.height));
    let (region_width, region_height) = (i64::from(region.width), i64::from(region.height));

    for mg in 0..grid.height {
        for ng in 0..grid.width {
            let (x, y) = grid.cell(mg, ng);

            // "If ((x + HPW ≤ 0) OR (x ≥ HBW) OR (y + HPH ≤ 0) OR (y ≥ HBH))
            // then set: HSKIP[ng, mg] = 1"
            let outside = x + pattern_width <= 0
                || x >= region_width
                || y + pattern_height <= 0
                || y >= region_height;

            if outside {
                skip.set_pixel(ng, mg, true);
            }
        }
    }

    Ok(skip)
}

/// Draw the pattern selected by each gray value onto the region (6.6.5.2).
fn render_patterns(
    region: &mut Bitmap,
    grid: &Grid,
    values: &[u32],
    patterns: &PatternDictionary,
    operator: CombinationOperator,
) -> Result<()> {
    let cells = (0..grid.height).flat_map(|mg| (0..grid.width).map(move |ng| (mg, ng)));

    for ((mg, ng), &gray) in cells.zip(values) {
        let Some(pattern) = patterns.patterns.get(gray as usize) else {
            bail!(RegionError::GrayScaleOutOfRange);
        };

        let (x, y) = grid.cell(mg, ng);
        region.compose(pattern, x, y, operator);
    }

    Ok(())
}

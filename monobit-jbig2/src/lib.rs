/*!
A memory-safe, pure-Rust JBIG2 decoder.

`monobit-jbig2` decodes JBIG2 images as specified in ITU-T T.88 (also known as
ISO/IEC 14492), the bi-level image compression format used for scanned
documents, most commonly inside of PDF files.

Both standalone files and the embedded format used by PDF's `JBIG2Decode`
filter are supported. Segments that cannot be decoded are skipped, so that
damaged streams still render as much of the page as possible.

# Example
```rust,no_run
use monobit_jbig2::{DecodeSettings, Document};

let data = std::fs::read("image.jb2").unwrap();
let mut document = Document::new(&data, &DecodeSettings::default()).unwrap();

for page in document.page_numbers().to_vec() {
    let bitmap = document.decode_page(page).unwrap();
    println!("page {page}: {}x{}", bitmap.width, bitmap.height);
}
```

# Cargo features
- `image` (default): implements [`image::ImageDecoder`] for [`Bitmap`].
- `logging`: forwards diagnostics, such as skipped segments, to the `log`
  crate.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

#[macro_use]
mod log;

mod arithmetic_decoder;
mod bitmap;
mod decode;
mod document;
mod error;
mod file;
mod gray_scale;
mod huffman_table;
mod integer_decoder;
#[cfg(feature = "image")]
mod integration;
mod page;
mod reader;
mod segment;
mod symbol_id_decoder;

pub use bitmap::{Bitmap, CombinationOperator};
pub use document::Document;
pub use error::{
    DecodeError, FormatError, HuffmanError, LimitError, ParseError, RegionError, Result,
    SegmentError, SymbolError, TemplateError,
};
pub use file::{FileHeader, FileOrganization};

/// Settings for loading a JBIG2 stream.
#[derive(Debug, Clone, Copy)]
pub struct DecodeSettings {
    /// Whether the data is a bare sequence of segments without a file
    /// header, as embedded in PDF files.
    pub embedded: bool,
    /// The maximum number of pixels of any bitmap the decoder allocates,
    /// including pages, regions and symbols.
    pub max_bitmap_pixels: u64,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            embedded: false,
            max_bitmap_pixels: 1 << 28,
        }
    }
}

/// Decode the first page of a standalone JBIG2 file.
pub fn decode(data: &[u8]) -> Result<Bitmap> {
    let mut document = Document::new(data, &DecodeSettings::default())?;
    decode_first_page(&mut document)
}

/// Decode the first page of an embedded JBIG2 stream, together with the
/// segments of its `JBIG2Globals` stream, if any.
pub fn decode_embedded(data: &[u8], globals: Option<&[u8]>) -> Result<Bitmap> {
    let settings = DecodeSettings {
        embedded: true,
        ..DecodeSettings::default()
    };

    let mut document = match globals {
        Some(globals) => Document::with_globals(globals, data, &settings)?,
        None => Document::new(data, &settings)?,
    };

    decode_first_page(&mut document)
}

fn decode_first_page(document: &mut Document<'_>) -> Result<Bitmap> {
    let page = *document
        .page_numbers()
        .first()
        .ok_or(FormatError::MissingPageInfo)?;

    document.decode_page(page)
}

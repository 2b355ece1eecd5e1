//! Errors reported while loading a stream or decoding one of its segments.
//!
//! Most of these only ever surface inside a page decode, where the failing
//! segment is logged and skipped. The page-level ones ([`FormatError`] and
//! [`LimitError`]) are returned to the caller.

use core::fmt;

/// Any failure to decode JBIG2 data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The data ended early.
    Parse(ParseError),
    /// The file header or the page setup is broken.
    Format(FormatError),
    /// A segment header or the relation between segments is broken.
    Segment(SegmentError),
    /// Huffman-coded data or a table selection is broken.
    Huffman(HuffmanError),
    /// A region header describes an impossible region.
    Region(RegionError),
    /// A template or its AT pixels are unusable.
    Template(TemplateError),
    /// A symbol dictionary or text region is inconsistent.
    Symbol(SymbolError),
    /// Decoding would allocate more than the configured maximum.
    Limit(LimitError),
    /// The MMR decoder rejected its input.
    Mmr(monobit_ccitt::DecodeError),
    /// A coordinate or size computation left the range of its type.
    Overflow,
}

/// Errors of the byte and bit readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// A read went past the end of the data.
    UnexpectedEof,
}

/// Errors of the file header (D.4) and of page setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// The data does not start with the JBIG2 ID string.
    InvalidHeader,
    /// Reserved file header flags are set.
    ReservedBits,
    /// No page information segment was found.
    MissingPageInfo,
    /// The page height is 0xFFFFFFFF and no end of stripe segment tells the
    /// real one.
    UnknownPageHeight,
    /// No page with the requested number exists.
    UnknownPage,
}

/// Errors of segment headers (7.2) and segment references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    /// The segment type is reserved.
    UnknownType,
    /// The referred-to segment count uses a reserved value.
    InvalidReferredCount,
    /// A generic region of unknown length has no end sequence.
    MissingEndMarker,
    /// A segment other than an immediate generic region has an unknown
    /// length.
    UnknownLength,
    /// A halftone region does not refer to a pattern dictionary.
    MissingPatternDictionary,
    /// A refinement region refers to a region that is not available.
    MissingReference,
    /// A page information segment for a page that is already set up.
    DuplicatePageInfo,
    /// An extension segment that may not be ignored has an unknown type.
    UnsupportedExtension,
}

/// Errors of Huffman decoding (Annex B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuffmanError {
    /// The bits do not form a code of the table.
    InvalidCode,
    /// A table selection uses a reserved value.
    InvalidSelection,
    /// Fewer custom tables are referred to than selected.
    MissingTables,
    /// A table produced OOB where a value is required.
    UnexpectedOob,
    /// A table segment does not describe a valid table.
    InvalidTable,
}

/// Errors of region segment headers (7.4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
    /// The combination operator uses a reserved value.
    InvalidCombinationOperator,
    /// A width or height is zero or out of range.
    InvalidDimension,
    /// A halftone gray value has no pattern.
    GrayScaleOutOfRange,
    /// Reserved region flags are set.
    ReservedBits,
}

/// Errors of template parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateError {
    /// The number of AT pixels does not fit the template.
    Invalid,
    /// An AT pixel refers to a pixel that is not decoded yet.
    InvalidAtPixel,
    /// Retained contexts belong to different templates.
    ContextMismatch,
}

/// Errors of symbol dictionaries (6.5) and text regions (6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolError {
    /// A text region has instances but no symbols.
    NoSymbols,
    /// More symbols or instances were coded than declared.
    TooManySymbols,
    /// A symbol ID has no symbol.
    OutOfRange,
    /// An arithmetic integer decoded to OOB where a value is required.
    UnexpectedOob,
    /// An aggregate symbol has no instances.
    Invalid,
    /// An export run is negative, overruns the symbols or follows another
    /// empty run.
    InvalidExportRun,
    /// The number of exported symbols differs from "SDNUMEXSYMS".
    ExportCountMismatch,
}

/// Errors caused by [`DecodeSettings::max_bitmap_pixels`].
///
/// [`DecodeSettings::max_bitmap_pixels`]: crate::DecodeSettings::max_bitmap_pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitError {
    /// A bitmap has more pixels than allowed.
    BitmapTooLarge,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => e.fmt(f),
            Self::Format(e) => e.fmt(f),
            Self::Segment(e) => e.fmt(f),
            Self::Huffman(e) => e.fmt(f),
            Self::Region(e) => e.fmt(f),
            Self::Template(e) => e.fmt(f),
            Self::Symbol(e) => e.fmt(f),
            Self::Limit(e) => e.fmt(f),
            Self::Mmr(e) => write!(f, "MMR data: {e}"),
            Self::Overflow => f.write_str("numeric overflow"),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnexpectedEof => "data ended unexpectedly",
        })
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidHeader => "not a JBIG2 file",
            Self::ReservedBits => "reserved file header flags are set",
            Self::MissingPageInfo => "no page information segment",
            Self::UnknownPageHeight => "unknown page height without end of stripe segments",
            Self::UnknownPage => "page does not exist",
        })
    }
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownType => "reserved segment type",
            Self::InvalidReferredCount => "reserved referred-to segment count",
            Self::MissingEndMarker => "no end sequence after generic region of unknown length",
            Self::UnknownLength => "unknown data length for this segment type",
            Self::MissingPatternDictionary => "halftone region without pattern dictionary",
            Self::MissingReference => "refinement region without reference region",
            Self::DuplicatePageInfo => "second page information segment for a page",
            Self::UnsupportedExtension => "necessary extension is not supported",
        })
    }
}

impl fmt::Display for HuffmanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidCode => "invalid Huffman code",
            Self::InvalidSelection => "reserved Huffman table selection",
            Self::MissingTables => "missing custom Huffman table",
            Self::UnexpectedOob => "Huffman table produced OOB",
            Self::InvalidTable => "malformed custom Huffman table",
        })
    }
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidCombinationOperator => "reserved combination operator",
            Self::InvalidDimension => "invalid region dimension",
            Self::GrayScaleOutOfRange => "gray value without pattern",
            Self::ReservedBits => "reserved region flags are set",
        })
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invalid => "wrong number of AT pixels",
            Self::InvalidAtPixel => "AT pixel outside of the decoded area",
            Self::ContextMismatch => "retained contexts belong to other templates",
        })
    }
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoSymbols => "text region without symbols",
            Self::TooManySymbols => "more symbols than declared",
            Self::OutOfRange => "symbol ID out of range",
            Self::UnexpectedOob => "integer decoder produced OOB",
            Self::Invalid => "aggregate symbol without instances",
            Self::InvalidExportRun => "invalid export run",
            Self::ExportCountMismatch => "exported symbol count differs from declaration",
        })
    }
}

impl fmt::Display for LimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BitmapTooLarge => "bitmap exceeds the pixel limit",
        })
    }
}

impl core::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Mmr(e) => Some(e),
            _ => None,
        }
    }
}

macro_rules! sub_error {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl core::error::Error for $ty {}

            impl From<$ty> for DecodeError {
                fn from(e: $ty) -> Self {
                    Self::$variant(e)
                }
            }
        )+
    };
}

sub_error!(
    ParseError => Parse,
    FormatError => Format,
    SegmentError => Segment,
    HuffmanError => Huffman,
    RegionError => Region,
    TemplateError => Template,
    SymbolError => Symbol,
    LimitError => Limit,
);

impl From<monobit_ccitt::DecodeError> for DecodeError {
    fn from(e: monobit_ccitt::DecodeError) -> Self {
        Self::Mmr(e)
    }
}

/// The result of a decoding operation.
pub type Result<T> = core::result::Result<T, DecodeError>;

/// Return early with the given error, converted into a [`DecodeError`].
macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

macro_rules! err {
    ($err:expr) => {
        Err($err.into())
    };
}

pub(crate) use bail;
pub(crate) use err;

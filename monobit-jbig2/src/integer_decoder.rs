//! The arithmetic integer decoding procedure (A.2).

use crate::arithmetic_decoder::{ArithmeticDecoder, ContextTable};
use crate::error::{DecodeError, Result, SymbolError};

/// One IAx procedure with its own context memory.
///
/// "Each arithmetic integer decoding procedure requires 512 bytes of storage
/// for its context memory." (A.2)
pub(crate) struct IntegerDecoder {
    contexts: ContextTable,
}

impl IntegerDecoder {
    pub(crate) fn new() -> Self {
        Self {
            contexts: ContextTable::new(512),
        }
    }

    /// Decode a signed integer, or `None` for OOB.
    ///
    /// "The result of the integer arithmetic decoding procedure is equal to:
    /// V if S = 0; -V if S = 1 and V > 0; OOB if S = 1 and V = 0" (A.2)
    pub(crate) fn decode(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> Result<Option<i32>> {
        // "1) Set: PREV = 1"
        let mut prev = 1_u32;

        let s = self.bit(decoder, &mut prev);

        // Figure A.1: each prefix bit selects the next, larger value range.
        const RANGES: [(u32, u32); 6] = [(2, 0), (4, 4), (6, 20), (8, 84), (12, 340), (32, 4436)];

        let mut range = RANGES[RANGES.len() - 1];
        for &candidate in &RANGES[..RANGES.len() - 1] {
            if self.bit(decoder, &mut prev) == 0 {
                range = candidate;
                break;
            }
        }

        let (bits, offset) = range;
        let mut magnitude = 0_u64;
        for _ in 0..bits {
            magnitude = (magnitude << 1) | u64::from(self.bit(decoder, &mut prev));
        }

        let v = i32::try_from(magnitude + u64::from(offset)).map_err(|_| DecodeError::Overflow)?;

        Ok(match (s, v) {
            (0, v) => Some(v),
            (_, 0) => None,
            (_, v) => Some(-v),
        })
    }

    /// Decode a value where out-of-band is not permitted.
    pub(crate) fn decode_value(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> Result<i32> {
        self.decode(decoder)?
            .ok_or_else(|| SymbolError::UnexpectedOob.into())
    }

    /// Decode one bit with context PREV and shift it in.
    ///
    /// "If PREV < 256 set: PREV = (PREV << 1) OR D
    /// Otherwise set: PREV = (((PREV << 1) OR D) AND 511) OR 256" (A.2)
    #[inline]
    fn bit(&mut self, decoder: &mut ArithmeticDecoder<'_>, prev: &mut u32) -> u32 {
        let d = decoder.decode(self.contexts.get(*prev & 0x1FF));

        *prev = if *prev < 256 {
            (*prev << 1) | d
        } else {
            (((*prev << 1) | d) & 511) | 256
        };

        d
    }
}

/// The named IAx procedures used by symbol dictionaries and text regions
/// (Tables 31 and 35), each with independent contexts.
pub(crate) struct IntegerDecoders {
    /// IADH: delta height.
    pub(crate) dh: IntegerDecoder,
    /// IADW: delta width.
    pub(crate) dw: IntegerDecoder,
    /// IAEX: export flag run lengths.
    pub(crate) ex: IntegerDecoder,
    /// IAAI: aggregate symbol instance count.
    pub(crate) ai: IntegerDecoder,
    /// IADT: strip delta T.
    pub(crate) dt: IntegerDecoder,
    /// IAFS: first symbol S coordinate.
    pub(crate) fs: IntegerDecoder,
    /// IADS: symbol S difference.
    pub(crate) ds: IntegerDecoder,
    /// IAIT: symbol T coordinate within the strip.
    pub(crate) it: IntegerDecoder,
    /// IARI: refinement indicator.
    pub(crate) ri: IntegerDecoder,
    /// IARDW: refinement delta width.
    pub(crate) rdw: IntegerDecoder,
    /// IARDH: refinement delta height.
    pub(crate) rdh: IntegerDecoder,
    /// IARDX: refinement X offset.
    pub(crate) rdx: IntegerDecoder,
    /// IARDY: refinement Y offset.
    pub(crate) rdy: IntegerDecoder,
}

impl IntegerDecoders {
    pub(crate) fn new() -> Self {
        Self {
            dh: IntegerDecoder::new(),
            dw: IntegerDecoder::new(),
            ex: IntegerDecoder::new(),
            ai: IntegerDecoder::new(),
            dt: IntegerDecoder::new(),
            fs: IntegerDecoder::new(),
            ds: IntegerDecoder::new(),
            it: IntegerDecoder::new(),
            ri: IntegerDecoder::new(),
            rdw: IntegerDecoder::new(),
            rdh: IntegerDecoder::new(),
            rdx: IntegerDecoder::new(),
            rdy: IntegerDecoder::new(),
        }
    }
}

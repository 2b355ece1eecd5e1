//! The IAID symbol ID decoding procedure (A.3).

use crate::arithmetic_decoder::{ArithmeticDecoder, ContextTable};

pub(crate) struct SymbolIdDecoder {
    contexts: ContextTable,
    code_len: u32,
}

impl SymbolIdDecoder {
    pub(crate) fn new(code_len: u32) -> Self {
        // "The number of contexts required is 2^SBSYMCODELEN" (A.3)
        Self {
            contexts: ContextTable::new(1 << code_len),
            code_len,
        }
    }

    /// "1) Set: PREV = 1
    /// 2) Decode SBSYMCODELEN bits as follows: a) Decode a bit with CX equal
    /// to 'IAID + PREV' [...] b) After each bit is decoded, set:
    /// PREV = (PREV << 1) OR D
    /// 3) Set: IAID = PREV - 2^SBSYMCODELEN" (A.3)
    #[inline]
    pub(crate) fn decode(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> u32 {
        let mut prev = 1_u32;

        for _ in 0..self.code_len {
            // PREV never exceeds the table: it has at most SBSYMCODELEN bits
            // below its leading 1 before the last shift.
            let d = decoder.decode(self.contexts.get(prev));
            prev = (prev << 1) | d;
        }

        prev - (1 << self.code_len)
    }
}

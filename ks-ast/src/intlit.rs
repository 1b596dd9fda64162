//! Width-tagged integer literal carrier.
//!
//! Literals keep their original width and signedness tag through
//! parsing so that codegen can choose the right C integer suffix, but
//! constant folding during type checking needs a single arithmetic
//! domain. `widen` maps any tagged literal into a canonical i64;
//! `narrow` maps back, failing if the folded value no longer fits the
//! original tag. Folding a `u8` computation that overflows past 255
//! is therefore a hard error rather than a silent wraparound.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    fn bits(self) -> u32 {
        match self {
            IntWidth::W8 => 8,
            IntWidth::W16 => 16,
            IntWidth::W32 => 32,
            IntWidth::W64 => 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntLit {
    /// Raw bit pattern as parsed, zero-extended to 64 bits.
    pub raw: u64,
    pub width: IntWidth,
    pub signed: bool,
}

impl IntLit {
    pub fn new(raw: u64, width: IntWidth, signed: bool) -> Self {
        Self { raw, width, signed }
    }

    /// Default literal tag used for an un-suffixed decimal constant:
    /// the smallest signed width that the value fits in, capped at
    /// i64.
    pub fn from_decimal(value: i64) -> Self {
        Self {
            raw: value as u64,
            width: IntWidth::W64,
            signed: true,
        }
    }

    /// Widen to the canonical signed 64-bit form used by constant
    /// folding, sign-extending if the tag is signed.
    pub fn widen(&self) -> i64 {
        let bits = self.width.bits();
        if bits == 64 {
            return self.raw as i64;
        }
        let mask = (1u64 << bits) - 1;
        let truncated = self.raw & mask;
        if self.signed && (truncated & (1 << (bits - 1))) != 0 {
            (truncated | !mask) as i64
        } else {
            truncated as i64
        }
    }

    /// Reconstruct a tagged literal from a folded canonical value,
    /// rejecting values that no longer fit the original tag — this
    /// is the "reversibility" check the width tag exists to make
    /// possible.
    pub fn narrow(value: i64, width: IntWidth, signed: bool) -> Option<Self> {
        let bits = width.bits();
        if bits == 64 {
            return Some(Self {
                raw: value as u64,
                width,
                signed,
            });
        }
        if signed {
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            if value < min || value > max {
                return None;
            }
        } else {
            if value < 0 {
                return None;
            }
            let max = (1u64 << bits) - 1;
            if (value as u64) > max {
                return None;
            }
        }
        let mask = (1u64 << bits) - 1;
        Some(Self {
            raw: (value as u64) & mask,
            width,
            signed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_sign_extends_negative_i8() {
        let lit = IntLit::new(0xFF, IntWidth::W8, true);
        assert_eq!(lit.widen(), -1);
    }

    #[test]
    fn widen_zero_extends_unsigned_u8() {
        let lit = IntLit::new(0xFF, IntWidth::W8, false);
        assert_eq!(lit.widen(), 255);
    }

    #[test]
    fn narrow_rejects_overflow_of_original_tag() {
        assert!(IntLit::narrow(256, IntWidth::W8, false).is_none());
        assert!(IntLit::narrow(255, IntWidth::W8, false).is_some());
    }

    #[test]
    fn narrow_round_trips_through_widen() {
        let lit = IntLit::new(200, IntWidth::W16, true);
        let widened = lit.widen();
        let back = IntLit::narrow(widened, IntWidth::W16, true).unwrap();
        assert_eq!(back, lit);
    }
}

use num_bigint::BigUint;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use pool_hashes::Hash;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// The difficulty 1 target, `0x00000000ffff0000...0000`.
pub const MAX_TARGET: Target = {
    let mut bytes = [0u8; 32];
    bytes[4] = 0xff;
    bytes[5] = 0xff;
    Target(bytes)
};

// Fixed point scale applied to fractional difficulties before the integer division
const DIFFICULTY_SCALE: f64 = 4294967296.0;
const DIFFICULTY_SCALE_BITS: usize = 32;

/// An unsigned 256-bit threshold. A hash meets the target when its numeric
/// value, read little-endian from the internal hash bytes, is strictly below it.
///
/// Stored as big-endian bytes so the derived ordering is the numeric ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Target([u8; 32]);

impl Target {
    pub const ZERO: Target = Target([0u8; 32]);

    pub const fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Target(bytes)
    }

    pub const fn to_be_bytes(&self) -> [u8; 32] {
        self.0
    }

    /// The numeric value of a hash as a target-comparable quantity.
    pub fn from_hash(hash: &Hash) -> Self {
        Target(hash.reversed().as_bytes())
    }

    /// Decodes the compact `nBits` representation. Negative or overflowing
    /// encodings yield the zero target, which no hash can meet.
    pub fn from_compact(bits: u32) -> Self {
        let exponent = (bits >> 24) as usize;
        let mantissa = bits & 0x007f_ffff;
        if bits & 0x0080_0000 != 0 || mantissa == 0 {
            return Self::ZERO;
        }
        let value = if exponent <= 3 {
            BigUint::from(mantissa >> (8 * (3 - exponent)))
        } else {
            BigUint::from(mantissa) << (8 * (exponent - 3))
        };
        Self::from_biguint(&value).unwrap_or(Self::ZERO)
    }

    /// `MAX_TARGET / difficulty`, supporting fractional difficulties.
    /// Non-positive or non-finite inputs are treated as difficulty 1.
    pub fn from_difficulty(difficulty: f64) -> Self {
        if !difficulty.is_finite() || difficulty <= 0.0 {
            return MAX_TARGET;
        }
        let divisor = BigUint::from_f64(difficulty * DIFFICULTY_SCALE).filter(|d| !d.is_zero()).unwrap_or_else(|| BigUint::from(1u8));
        let value = (MAX_TARGET.to_biguint() << DIFFICULTY_SCALE_BITS) / divisor;
        Self::from_biguint(&value).unwrap_or(Target([0xff; 32]))
    }

    /// The difficulty this target represents, `MAX_TARGET / self`.
    pub fn difficulty(&self) -> f64 {
        let value = self.to_biguint();
        if value.is_zero() {
            return f64::INFINITY;
        }
        ratio(&MAX_TARGET.to_biguint(), &value)
    }

    /// Strict less-than comparison of the hash value against this target.
    #[inline]
    pub fn is_met_by(&self, hash: &Hash) -> bool {
        Self::from_hash(hash) < *self
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    fn from_biguint(value: &BigUint) -> Option<Self> {
        let bytes = value.to_bytes_be();
        if bytes.len() > 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out[32 - bytes.len()..].copy_from_slice(&bytes);
        Some(Target(out))
    }
}

/// The difficulty a single hash achieved, `MAX_TARGET / hash`.
pub fn hash_difficulty(hash: &Hash) -> f64 {
    Target::from_hash(hash).difficulty()
}

fn ratio(numerator: &BigUint, denominator: &BigUint) -> f64 {
    match (numerator.to_f64(), denominator.to_f64()) {
        (Some(n), Some(d)) if d > 0.0 => n / d,
        _ => f64::INFINITY,
    }
}

impl FromStr for Target {
    type Err = hex::FromHexError;

    /// Parses the 64 hex digit big-endian form daemons report as `target`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Target(bytes))
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Debug for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

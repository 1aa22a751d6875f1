//! 256-bit integers: an unsigned [`U256`] and decimal text conversion for both signs.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub use arrow_buffer::i256;
use proton_error::{ProtonError, ProtonResult, proton_bail, proton_err};

const TEN_POW_19: u64 = 10_000_000_000_000_000_000;

/// An unsigned 256-bit integer, stored as four little-endian 64-bit limbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct U256([u64; 4]);

impl U256 {
    /// Zero.
    pub const ZERO: U256 = U256([0; 4]);
    /// The largest representable value.
    pub const MAX: U256 = U256([u64::MAX; 4]);

    /// Build from the little-endian wire representation.
    pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *limb = u64::from_le_bytes(buf);
        }
        U256(limbs)
    }

    /// The little-endian wire representation.
    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (chunk, limb) in bytes.chunks_exact_mut(8).zip(self.0) {
            chunk.copy_from_slice(&limb.to_le_bytes());
        }
        bytes
    }

    /// Reinterpret the bits of a signed 256-bit integer.
    pub fn from_i256_bits(value: i256) -> Self {
        Self::from_le_bytes(value.to_le_bytes())
    }

    /// Reinterpret the bits as a signed 256-bit integer.
    pub fn to_i256_bits(&self) -> i256 {
        i256::from_le_bytes(self.to_le_bytes())
    }

    /// The value as a `u128`, if it fits.
    pub fn to_u128(&self) -> Option<u128> {
        (self.0[2] == 0 && self.0[3] == 0)
            .then(|| (u128::from(self.0[1]) << 64) | u128::from(self.0[0]))
    }

    fn is_zero(&self) -> bool {
        self.0.iter().all(|limb| *limb == 0)
    }

    /// Divide in place by a small divisor, returning the remainder.
    fn div_rem_small(&mut self, divisor: u64) -> u64 {
        let mut rem = 0u128;
        for limb in self.0.iter_mut().rev() {
            let cur = (rem << 64) | u128::from(*limb);
            let quotient = cur / u128::from(divisor);
            rem = cur % u128::from(divisor);
            *limb = u64::try_from(quotient).unwrap_or(u64::MAX);
        }
        u64::try_from(rem).unwrap_or(0)
    }

    /// `self * mul + add`, or `None` on overflow.
    #[allow(clippy::cast_possible_truncation)]
    fn checked_mul_add_small(&self, mul: u64, add: u64) -> Option<Self> {
        let mut carry = u128::from(add);
        let mut limbs = [0u64; 4];
        for (out, limb) in limbs.iter_mut().zip(self.0) {
            let cur = u128::from(limb) * u128::from(mul) + carry;
            *out = (cur & u128::from(u64::MAX)) as u64;
            carry = cur >> 64;
        }
        (carry == 0).then_some(U256(limbs))
    }
}

impl From<u128> for U256 {
    #[allow(clippy::cast_possible_truncation)]
    fn from(value: u128) -> Self {
        U256([
            (value & u128::from(u64::MAX)) as u64,
            (value >> 64) as u64,
            0,
            0,
        ])
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }
}

impl Display for U256 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let mut value = *self;
        let mut groups = Vec::with_capacity(4);
        while !value.is_zero() {
            groups.push(value.div_rem_small(TEN_POW_19));
        }
        let mut groups = groups.into_iter().rev();
        if let Some(first) = groups.next() {
            write!(f, "{first}")?;
        }
        for group in groups {
            write!(f, "{group:019}")?;
        }
        Ok(())
    }
}

impl FromStr for U256 {
    type Err = ProtonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('+').unwrap_or(s);
        if digits.is_empty() {
            proton_bail!(Data: "empty integer literal");
        }
        digits.chars().try_fold(U256::ZERO, |acc, c| {
            let digit = c
                .to_digit(10)
                .ok_or_else(|| proton_err!(Data: "invalid digit `{c}` in integer `{s}`"))?;
            acc.checked_mul_add_small(10, u64::from(digit))
                .ok_or_else(|| proton_err!(Data: "integer `{s}` does not fit in 256 bits"))
        })
    }
}

/// Render a signed 256-bit integer in decimal.
pub fn i256_to_string(value: i256) -> String {
    if value.is_negative() {
        // two's complement negation of i256::MIN reads back as 2^255 unsigned
        format!("-{}", U256::from_i256_bits(value.wrapping_neg()))
    } else {
        U256::from_i256_bits(value).to_string()
    }
}

/// Parse a signed 256-bit integer from decimal text.
pub fn parse_i256(text: &str) -> ProtonResult<i256> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude: U256 = digits.parse()?;
    let sign_bit = magnitude.0[3] >> 63 == 1;
    let bits = magnitude.to_i256_bits();
    match (negative, sign_bit) {
        (false, false) => Ok(bits),
        (true, false) => Ok(bits.wrapping_neg()),
        (true, true) if bits == i256::MIN => Ok(i256::MIN),
        _ => proton_bail!(Data: "integer `{text}` does not fit in a signed 256-bit value"),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0")]
    #[case("18446744073709551616")]
    #[case("340282366920938463463374607431768211456")]
    #[case("115792089237316195423570985008687907853269984665640564039457584007913129639935")]
    fn u256_text(#[case] text: &str) {
        let value: U256 = text.parse().unwrap();
        assert_eq!(value.to_string(), text);
        assert_eq!(U256::from_le_bytes(value.to_le_bytes()), value);
    }

    #[test]
    fn u256_overflow() {
        assert!(
            "115792089237316195423570985008687907853269984665640564039457584007913129639936"
                .parse::<U256>()
                .is_err()
        );
        assert_eq!(U256::MAX.to_string().len(), 78);
    }

    #[rstest]
    #[case("-1")]
    #[case("170141183460469231731687303715884105728")]
    #[case("-57896044618658097711785492504343953926634992332820282019728792003956564819968")]
    #[case("57896044618658097711785492504343953926634992332820282019728792003956564819967")]
    fn i256_text(#[case] text: &str) {
        let value = parse_i256(text).unwrap();
        assert_eq!(i256_to_string(value), text);
    }

    #[test]
    fn i256_bounds() {
        let min =
            "-57896044618658097711785492504343953926634992332820282019728792003956564819968";
        assert_eq!(parse_i256(min).unwrap(), i256::MIN);
        assert!(parse_i256(&min[1..]).is_err());
        assert_eq!(i256_to_string(i256::from_i128(-42)), "-42");
    }
}

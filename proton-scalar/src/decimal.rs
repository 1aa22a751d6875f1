use std::fmt::{Display, Formatter};
use std::str::FromStr;

use proton_error::{ProtonError, ProtonResult, proton_bail, proton_err};

use crate::bigint::{i256, i256_to_string, parse_i256};

/// The largest decimal precision of the server.
pub const MAX_DECIMAL_PRECISION: u8 = 76;

/// An exact decimal value: a 256-bit mantissa scaled by `10^-scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    mantissa: i256,
    scale: u8,
}

/// `10^exp` as an `i256`, or `None` past 10^76.
pub fn pow10(exp: u8) -> Option<i256> {
    let ten = i256::from_i128(10);
    (0..exp).try_fold(i256::ONE, |acc, _| acc.checked_mul(ten))
}

impl Decimal {
    /// Create a decimal from its raw mantissa and scale.
    pub fn new(mantissa: i256, scale: u8) -> Self {
        Self { mantissa, scale }
    }

    /// The unscaled integer value.
    pub fn mantissa(&self) -> i256 {
        self.mantissa
    }

    /// The number of digits after the decimal point.
    pub fn scale(&self) -> u8 {
        self.scale
    }

    /// Change the scale, truncating toward zero when digits are dropped.
    pub fn rescale(&self, scale: u8) -> ProtonResult<Decimal> {
        let mantissa = if scale >= self.scale {
            pow10(scale - self.scale).and_then(|factor| self.mantissa.checked_mul(factor))
        } else {
            pow10(self.scale - scale).and_then(|factor| self.mantissa.checked_div(factor))
        };
        mantissa
            .map(|mantissa| Decimal { mantissa, scale })
            .ok_or_else(|| proton_err!(Data: "decimal {self} can not be scaled to {scale} digits"))
    }

    /// Convert a float, rounded to the requested scale.
    pub fn from_f64(value: f64, scale: u8) -> ProtonResult<Decimal> {
        if !value.is_finite() {
            proton_bail!(Data: "{value} is not a finite decimal value");
        }
        let text = format!("{value:.prec$}", prec = usize::from(scale));
        text.parse::<Decimal>()?.rescale(scale)
    }

    /// Whether the number of significant digits fits within `precision`.
    pub fn fits_precision(&self, precision: u8) -> bool {
        let digits = i256_to_string(self.mantissa);
        digits.trim_start_matches('-').len() <= usize::from(precision)
    }

    /// The value as a float, for lossy conversions.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let digits = i256_to_string(self.mantissa);
        if self.scale == 0 {
            return write!(f, "{digits}");
        }
        let (sign, digits) = match digits.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("", digits.as_str()),
        };
        let scale = usize::from(self.scale);
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

impl FromStr for Decimal {
    type Err = ProtonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (int_part, frac_part) = text.split_once('.').unwrap_or((text, ""));
        if int_part.trim_start_matches(['-', '+']).is_empty() && frac_part.is_empty() {
            proton_bail!(Data: "`{s}` is not a decimal value");
        }
        let scale = u8::try_from(frac_part.len())
            .ok()
            .filter(|scale| *scale <= MAX_DECIMAL_PRECISION)
            .ok_or_else(|| proton_err!(Data: "too many fractional digits in `{s}`"))?;
        let digits = match int_part {
            "" | "+" => format!("0{frac_part}"),
            "-" => format!("-0{frac_part}"),
            int_part => format!("{int_part}{frac_part}"),
        };
        let mantissa = parse_i256(digits.trim_start_matches('+'))
            .map_err(|_| proton_err!(Data: "`{s}` is not a decimal value"))?;
        Ok(Decimal::new(mantissa, scale))
    }
}

use bytes::BytesMut;
use proton_dtype::TypeDef;
use proton_error::{ProtonResult, proton_bail, proton_err};
use proton_io::wire::write_array;
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::{Decimal, MAX_DECIMAL_PRECISION, Value, i256};

use crate::codec::{ReadState, TypeCodec};
use crate::codecs::{CodecBuilder, type_arg};
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

/// Fixed point decimals, stored as a scaled integer as wide as the precision needs.
#[derive(Debug)]
pub(crate) struct DecimalCodec {
    precision: u8,
    scale: u8,
    suffix: String,
}

impl DecimalCodec {
    fn new(precision: i64, scale: i64, suffix: String) -> ProtonResult<Self> {
        let precision = u8::try_from(precision)
            .ok()
            .filter(|p| (1..=MAX_DECIMAL_PRECISION).contains(p))
            .ok_or_else(|| proton_err!(Parse: "invalid decimal precision {precision}"))?;
        let scale = u8::try_from(scale)
            .ok()
            .filter(|s| *s <= precision)
            .ok_or_else(|| {
                proton_err!(Parse: "invalid decimal scale {scale} for precision {precision}")
            })?;
        Ok(Self {
            precision,
            scale,
            suffix,
        })
    }

    fn width(&self) -> usize {
        match self.precision {
            0..=9 => 4,
            10..=18 => 8,
            19..=38 => 16,
            _ => 32,
        }
    }

    fn encode(&self, value: &Value) -> ProtonResult<i256> {
        let decimal = match value {
            Value::Null => return Ok(i256::ZERO),
            Value::Decimal(d) => d.rescale(self.scale)?,
            Value::String(s) => s.parse::<Decimal>()?.rescale(self.scale)?,
            Value::Float32(_) | Value::Float64(_) => {
                Decimal::from_f64(value.as_f64().unwrap_or(f64::NAN), self.scale)?
            }
            other => {
                let int = other.as_i128().ok_or_else(|| {
                    other.mismatch(&format!("decimal({}, {})", self.precision, self.scale))
                })?;
                Decimal::new(i256::from_i128(int), 0).rescale(self.scale)?
            }
        };
        if !decimal.fits_precision(self.precision) {
            proton_bail!(Data: "decimal value {decimal} exceeds precision {}", self.precision);
        }
        Ok(decimal.mantissa())
    }

    fn decode(&self, mantissa: i256, format: Format) -> Value {
        let decimal = Decimal::new(mantissa, self.scale);
        match format {
            Format::String => Value::String(decimal.to_string()),
            _ => Value::Decimal(decimal),
        }
    }
}

fn narrow<T: TryFrom<i128>>(mantissas: &[i256]) -> ProtonResult<Vec<T>> {
    mantissas
        .iter()
        .map(|m| {
            m.to_i128()
                .and_then(|m| T::try_from(m).ok())
                .ok_or_else(|| proton_err!(Data: "decimal mantissa does not fit its column width"))
        })
        .collect()
}

impl TypeCodec for DecimalCodec {
    fn valid_formats(&self) -> &'static [Format] {
        &[Format::Native, Format::String]
    }

    fn byte_size(&self) -> Option<usize> {
        Some(self.width())
    }

    fn name_suffix(&self) -> String {
        self.suffix.clone()
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let mantissas: Vec<i256> = match self.width() {
            4 => source
                .read_array::<i32>(rows)?
                .into_iter()
                .map(|m| i256::from_i128(i128::from(m)))
                .collect(),
            8 => source
                .read_array::<i64>(rows)?
                .into_iter()
                .map(|m| i256::from_i128(i128::from(m)))
                .collect(),
            16 => source.read_array::<i128>(rows)?.into_iter().map(i256::from_i128).collect(),
            _ => source
                .read_fixed_col(rows, 32)?
                .iter()
                .map(|chunk| {
                    let mut bytes = [0u8; 32];
                    bytes.copy_from_slice(chunk);
                    i256::from_le_bytes(bytes)
                })
                .collect(),
        };
        Ok(mantissas.into_iter().map(|m| self.decode(m, format)).collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let mantissas = column
            .iter()
            .map(|v| self.encode(v))
            .collect::<ProtonResult<Vec<_>>>()?;
        match self.width() {
            4 => write_array(&narrow::<i32>(&mantissas)?, dest),
            8 => write_array(&narrow::<i64>(&mantissas)?, dest),
            16 => write_array(&narrow::<i128>(&mantissas)?, dest),
            _ => {
                dest.reserve(mantissas.len() * 32);
                for m in mantissas {
                    dest.extend_from_slice(&m.to_le_bytes());
                }
            }
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        self.decode(i256::ZERO, format)
    }
}

fn int_arg(def: &TypeDef, ix: usize, type_name: &str) -> ProtonResult<i64> {
    let arg = type_arg(def, ix, type_name)?;
    arg.as_int()
        .ok_or_else(|| proton_err!(Parse: "argument `{arg}` of {type_name} is not an integer"))
}

fn decimal(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let precision = int_arg(def, 0, "decimal")?;
    let scale = int_arg(def, 1, "decimal")?;
    Ok(Box::new(DecimalCodec::new(precision, scale, def.arg_str())?))
}

macro_rules! sized_decimal {
    ($name:ident, $precision:literal) => {
        fn $name(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
            let scale = int_arg(def, 0, stringify!($name))?;
            Ok(Box::new(DecimalCodec::new($precision, scale, def.arg_str())?))
        }
    };
}

sized_decimal!(decimal32, 9);
sized_decimal!(decimal64, 18);
sized_decimal!(decimal128, 38);
sized_decimal!(decimal256, 76);

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "decimal" => decimal,
        "decimal32" => decimal32,
        "decimal64" => decimal64,
        "decimal128" => decimal128,
        "decimal256" => decimal256,
    ]
}

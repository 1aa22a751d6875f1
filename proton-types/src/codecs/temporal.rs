use bytes::BytesMut;
use jiff::Timestamp;
use jiff::civil::{Date, Time};
use jiff::tz::TimeZone;
use proton_dtype::{TypeArg, TypeDef};
use proton_error::{ProtonResult, proton_bail, proton_err};
use proton_io::wire::write_array;
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::{
    Value, date_to_epoch_days, epoch_days_to_date, parse_datetime, ticks_to_timestamp,
    timestamp_to_ticks, timestamp_value, value_timestamp,
};

use crate::codec::{ReadState, TypeCodec};
use crate::codecs::{CodecBuilder, type_arg};
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

const FORMATS: &[Format] = &[Format::Native, Format::Int];

/// Day counts since the epoch: `date` as `u16`, `date32` as `i32`.
#[derive(Debug)]
pub(crate) struct DateCodec {
    wide: bool,
}

impl DateCodec {
    fn type_name(&self) -> &'static str {
        if self.wide { "date32" } else { "date" }
    }

    fn epoch_days(&self, value: &Value) -> ProtonResult<i64> {
        match value {
            Value::Null => Ok(0),
            Value::Date(d) => Ok(date_to_epoch_days(*d)),
            Value::DateTime(dt) => Ok(date_to_epoch_days(dt.date())),
            Value::Zoned(z) => Ok(date_to_epoch_days(z.date())),
            Value::String(s) => Ok(date_to_epoch_days(parse_datetime(s)?.date())),
            other => other.as_i64().ok_or_else(|| other.mismatch(self.type_name())),
        }
    }

    fn decode(days: i64, format: Format) -> ProtonResult<Value> {
        Ok(match format {
            Format::Int => Value::Int(days),
            _ => Value::Date(epoch_days_to_date(days)?),
        })
    }
}

impl TypeCodec for DateCodec {
    fn valid_formats(&self) -> &'static [Format] {
        FORMATS
    }

    fn byte_size(&self) -> Option<usize> {
        Some(if self.wide { 4 } else { 2 })
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let days: Vec<i64> = if self.wide {
            source.read_array::<i32>(rows)?.into_iter().map(i64::from).collect()
        } else {
            source.read_array::<u16>(rows)?.into_iter().map(i64::from).collect()
        };
        days.into_iter().map(|days| Self::decode(days, format)).collect()
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let days = column
            .iter()
            .map(|v| self.epoch_days(v))
            .collect::<ProtonResult<Vec<_>>>()?;
        let out_of_range =
            |days: i64| proton_err!(Data: "day {days} is out of range for {}", self.type_name());
        if self.wide {
            let days = days
                .into_iter()
                .map(|d| i32::try_from(d).map_err(|_| out_of_range(d)))
                .collect::<ProtonResult<Vec<_>>>()?;
            write_array(&days, dest);
        } else {
            let days = days
                .into_iter()
                .map(|d| u16::try_from(d).map_err(|_| out_of_range(d)))
                .collect::<ProtonResult<Vec<_>>>()?;
            write_array(&days, dest);
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::Int => Value::Int(0),
            _ => Value::Date(Date::constant(1970, 1, 1)),
        }
    }
}

/// `datetime[(tz)]` as `u32` seconds and `datetime64(p[, tz])` as `i64` ticks of `10^-p` seconds.
#[derive(Debug)]
pub(crate) struct DateTimeCodec {
    /// Sub-second digits, `None` for `datetime`.
    precision: Option<u8>,
    tz: Option<TimeZone>,
    suffix: String,
}

impl DateTimeCodec {
    fn type_name(&self) -> &'static str {
        if self.precision.is_some() { "datetime64" } else { "datetime" }
    }

    fn timestamp(&self, raw: i64) -> ProtonResult<Timestamp> {
        match self.precision {
            Some(precision) => ticks_to_timestamp(raw, precision),
            None => Ok(Timestamp::from_second(raw)?),
        }
    }

    fn raw(&self, value: &Value) -> ProtonResult<i64> {
        match (value, self.precision) {
            (Value::Null, _) => Ok(0),
            (Value::Int(ticks), Some(_)) => Ok(*ticks),
            (value, Some(precision)) => {
                timestamp_to_ticks(value_timestamp(value, self.tz.as_ref())?, precision)
            }
            (value, None) => Ok(value_timestamp(value, self.tz.as_ref())?.as_second()),
        }
    }
}

impl TypeCodec for DateTimeCodec {
    fn valid_formats(&self) -> &'static [Format] {
        FORMATS
    }

    fn byte_size(&self) -> Option<usize> {
        Some(if self.precision.is_some() { 8 } else { 4 })
    }

    fn name_suffix(&self) -> String {
        self.suffix.clone()
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let raw: Vec<i64> = if self.precision.is_some() {
            source.read_array::<i64>(rows)?
        } else {
            source.read_array::<u32>(rows)?.into_iter().map(i64::from).collect()
        };
        if format == Format::Int {
            return Ok(raw.into_iter().map(Value::Int).collect());
        }
        let tz = ctx.active_tz(self.tz.as_ref());
        raw.into_iter()
            .map(|raw| Ok(timestamp_value(self.timestamp(raw)?, tz.as_ref())))
            .collect()
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let raw = column
            .iter()
            .map(|v| self.raw(v))
            .collect::<ProtonResult<Vec<_>>>()?;
        if self.precision.is_some() {
            write_array(&raw, dest);
            return Ok(());
        }
        let seconds = raw
            .into_iter()
            .map(|secs| {
                u32::try_from(secs)
                    .map_err(|_| proton_err!(Data: "{secs} seconds is out of range for datetime"))
            })
            .collect::<ProtonResult<Vec<_>>>()?;
        write_array(&seconds, dest);
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::Int => Value::Int(0),
            _ => Value::DateTime(Date::constant(1970, 1, 1).to_datetime(Time::midnight())),
        }
    }
}

fn zone(arg: Option<&TypeArg>, type_name: &str) -> ProtonResult<Option<TimeZone>> {
    match arg {
        None => Ok(None),
        Some(TypeArg::Str(name)) => Ok(Some(TimeZone::get(name)?)),
        Some(other) => proton_bail!(Parse: "invalid time zone `{other}` of {type_name}"),
    }
}

fn date(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(DateCodec { wide: false }))
}

fn date32(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(DateCodec { wide: true }))
}

fn datetime(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(DateTimeCodec {
        precision: None,
        tz: zone(def.values().first(), "datetime")?,
        suffix: def.arg_str(),
    }))
}

fn datetime64(def: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    let arg = type_arg(def, 0, "datetime64")?;
    let precision = arg
        .as_int()
        .and_then(|p| u8::try_from(p).ok())
        .filter(|p| *p <= 9)
        .ok_or_else(|| proton_err!(Parse: "invalid datetime64 precision `{arg}`"))?;
    let codec = DateTimeCodec {
        precision: Some(precision),
        tz: zone(def.values().get(1), "datetime64")?,
        suffix: def.arg_str(),
    };
    Ok(Box::new(codec))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "date" => date,
        "date32" => date32,
        "datetime" => datetime,
        "datetime64" => datetime64,
    ]
}

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::BytesMut;
use proton_dtype::TypeDef;
use proton_error::{ProtonResult, proton_err};
use proton_io::wire::write_array;
use proton_io::{ByteSource, ByteSourceExt};
use proton_scalar::Value;

use crate::codec::{ReadState, TypeCodec};
use crate::codecs::CodecBuilder;
use crate::context::{InsertContext, QueryContext};
use crate::format::Format;

const FORMATS: &[Format] = &[Format::Native, Format::String];

/// `ipv4`, a little-endian `u32`.
#[derive(Debug)]
pub(crate) struct Ipv4Codec;

impl Ipv4Codec {
    fn encode(value: &Value) -> ProtonResult<u32> {
        Ok(match value {
            Value::Null => 0,
            Value::Ipv4(ip) => u32::from(*ip),
            Value::String(s) => s
                .trim()
                .parse::<Ipv4Addr>()
                .map(u32::from)
                .map_err(|_| proton_err!(Data: "`{s}` is not a valid ipv4 address"))?,
            other => other.as_u32().ok_or_else(|| other.mismatch("ipv4"))?,
        })
    }
}

impl TypeCodec for Ipv4Codec {
    fn valid_formats(&self) -> &'static [Format] {
        FORMATS
    }

    fn byte_size(&self) -> Option<usize> {
        Some(4)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        let addrs = source.read_array::<u32>(rows)?.into_iter().map(Ipv4Addr::from);
        Ok(match format {
            Format::String => addrs.map(|ip| Value::String(ip.to_string())).collect(),
            _ => addrs.map(Value::Ipv4).collect(),
        })
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        let values = column
            .iter()
            .map(Self::encode)
            .collect::<ProtonResult<Vec<_>>>()?;
        write_array(&values, dest);
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::String => Value::String(String::new()),
            _ => Value::Ipv4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

/// `ipv6`, 16 bytes in network order. IPv4 addresses are stored mapped.
#[derive(Debug)]
pub(crate) struct Ipv6Codec;

impl Ipv6Codec {
    fn encode(value: &Value) -> ProtonResult<[u8; 16]> {
        let addr = match value {
            Value::Null => Ipv6Addr::UNSPECIFIED,
            Value::Ipv6(ip) => *ip,
            Value::Ipv4(ip) => ip.to_ipv6_mapped(),
            Value::String(s) => {
                let text = s.trim();
                text.parse::<Ipv6Addr>()
                    .or_else(|_| text.parse::<Ipv4Addr>().map(|ip| ip.to_ipv6_mapped()))
                    .map_err(|_| proton_err!(Data: "`{s}` is not a valid ipv6 address"))?
            }
            Value::Bytes(b) => <[u8; 16]>::try_from(b.as_ref())
                .map(Ipv6Addr::from)
                .map_err(|_| value.mismatch("ipv6"))?,
            other => return Err(other.mismatch("ipv6")),
        };
        Ok(addr.octets())
    }

    /// Mapped IPv4 addresses decode as IPv4.
    fn decode(octets: &[u8], format: Format) -> Value {
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(octets);
        let addr = Ipv6Addr::from(bytes);
        match (format, addr.to_ipv4_mapped()) {
            (Format::String, Some(v4)) => Value::String(v4.to_string()),
            (Format::String, None) => Value::String(addr.to_string()),
            (_, Some(v4)) => Value::Ipv4(v4),
            (_, None) => Value::Ipv6(addr),
        }
    }
}

impl TypeCodec for Ipv6Codec {
    fn valid_formats(&self) -> &'static [Format] {
        FORMATS
    }

    fn byte_size(&self) -> Option<usize> {
        Some(16)
    }

    fn read_binary(
        &self,
        source: &mut dyn ByteSource,
        rows: usize,
        _ctx: &QueryContext,
        _state: &ReadState,
        format: Format,
    ) -> ProtonResult<Vec<Value>> {
        Ok(source
            .read_fixed_col(rows, 16)?
            .iter()
            .map(|octets| Self::decode(octets, format))
            .collect())
    }

    fn write_binary(
        &self,
        column: &[Value],
        dest: &mut BytesMut,
        _ctx: &InsertContext,
        _format: Format,
    ) -> ProtonResult<()> {
        dest.reserve(column.len() * 16);
        for value in column {
            dest.extend_from_slice(&Self::encode(value)?);
        }
        Ok(())
    }

    fn null_value(&self, format: Format) -> Value {
        match format {
            Format::String => Value::String(String::new()),
            _ => Value::Ipv6(Ipv6Addr::UNSPECIFIED),
        }
    }
}

fn ipv4(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(Ipv4Codec))
}

fn ipv6(_: &TypeDef) -> ProtonResult<Box<dyn TypeCodec>> {
    Ok(Box::new(Ipv6Codec))
}

pub(crate) fn builders() -> Vec<(&'static str, CodecBuilder)> {
    codec_table![
        "ipv4" => ipv4,
        "ipv6" => ipv6,
    ]
}

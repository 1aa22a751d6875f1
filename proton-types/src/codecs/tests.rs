use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Bytes, BytesMut};
use jiff::civil::date;
use jiff::tz::TimeZone;
use proton_error::ProtonError;
use proton_io::{ByteSource, ChunkIter, ChunkSource, ResponseBuffer};
use proton_scalar::{Decimal, U256, Value, i256};
use rstest::rstest;
use uuid::Uuid;

use crate::context::{InsertContext, QueryContext};
use crate::registry::get_from_name;

fn hex(text: &str) -> Vec<u8> {
    let digits: Vec<u8> = text.bytes().filter(u8::is_ascii_hexdigit).collect();
    digits
        .chunks(2)
        .map(|pair| u8::from_str_radix(std::str::from_utf8(pair).unwrap(), 16).unwrap())
        .collect()
}

fn source(bytes: &[u8]) -> ResponseBuffer<impl ChunkSource + use<>> {
    ResponseBuffer::new(ChunkIter::new([Bytes::copy_from_slice(bytes)]))
}

fn write(type_name: &str, column: &[Value]) -> Vec<u8> {
    let col_type = get_from_name(type_name).unwrap();
    let mut dest = BytesMut::new();
    col_type
        .write_column(column, &mut dest, &InsertContext::detached())
        .unwrap();
    dest.to_vec()
}

fn write_err(type_name: &str, column: &[Value]) -> ProtonError {
    get_from_name(type_name)
        .unwrap()
        .write_column(column, &mut BytesMut::new(), &InsertContext::detached())
        .unwrap_err()
}

/// Read `rows` values, requiring the payload to be consumed exactly.
fn read(type_name: &str, bytes: &[u8], rows: usize, ctx: &QueryContext) -> Vec<Value> {
    let mut source = source(bytes);
    let values = get_from_name(type_name)
        .unwrap()
        .read_column(&mut source, rows, ctx)
        .unwrap();
    assert!(source.at_end().unwrap(), "{type_name} left bytes unread");
    values
}

fn round_trip(type_name: &str, column: &[Value]) -> Vec<Value> {
    read(type_name, &write(type_name, column), column.len(), &QueryContext::default())
}

fn with_format(pattern: &str, format: &str) -> QueryContext {
    QueryContext::builder("").query_format(pattern, format).build().unwrap()
}

fn object(fields: &[(&str, Value)]) -> Value {
    Value::Object(fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
}

#[test]
fn uint16_nulls() {
    let values = read(
        "Nullable(UInt16)",
        &hex("0100 0100 0000 1400 0000 2800"),
        4,
        &QueryContext::default(),
    );
    assert_eq!(values, vec![Value::Null, Value::UInt(20), Value::Null, Value::UInt(40)]);
}

#[test]
fn low_cardinality_with_placeholder() {
    let payload = hex(
        "0100 0000 0000 0000 0006 0000 0000 0000 0300 0000 0000 0000
         0004 4344 4d41 0347 534d 0200 0000 0000 0000 0102",
    );
    let values = read("LowCardinality(String)", &payload, 2, &QueryContext::default());
    assert_eq!(values, vec![Value::from("CDMA"), Value::from("GSM")]);
}

#[test]
fn low_card_array_of_empty_rows() {
    let payload = hex("0100 0000 0000 0000 0000 0000 0000 0000 0000 0000 0000 0000");
    let values = read("Array(LowCardinality(String))", &payload, 2, &QueryContext::default());
    assert_eq!(values, vec![Value::Array(vec![]), Value::Array(vec![])]);
}

#[test]
fn simple_map() {
    let payload =
        hex("0200 0000 0000 0000 046b 6579 3104 6b65 7932 0676 616c 7565 3106 7661 6c75 6532");
    let values = read("Map(String, String)", &payload, 1, &QueryContext::default());
    assert_eq!(
        values,
        vec![Value::Map(vec![
            (Value::from("key1"), Value::from("value1")),
            (Value::from("key2"), Value::from("value2")),
        ])]
    );
}

#[test]
fn low_card_map_with_nullable_uuids() {
    let payload = hex(
        "0100 0000 0000 0000 0200 0000 0000 0000 0400 0000 0000 0000
         0006 0000 0000 0000 0300 0000 0000 0000 0004 6967 6f72 0667
         656f 7267 6504 0000 0000 0000 0001 0201 0201 0000 0000 0000
         0000 0000 0000 0000 0000 0000 00 235f 7dc5 799f 431d a9e1
         93ca ccff c652 235f 7dc5 799f 437f a9e1 93ca ccff 0052 235f
         7dc5 799f 431d a9e1 93ca ccff c652",
    );
    let values = read(
        "Map(LowCardinality(String), Nullable(UUID))",
        &payload,
        2,
        &QueryContext::default(),
    );
    let george = Uuid::parse_str("1d439f79-c57d-5f23-52c6-ffccca93e1a9").unwrap();
    assert_eq!(
        values[0],
        Value::Map(vec![
            (Value::from("igor"), Value::Null),
            (Value::from("george"), Value::Uuid(george)),
        ])
    );
    assert!(matches!(&values[1], Value::Map(entries) if entries.len() == 2));
}

#[test]
fn map_write_payload() {
    let bytes = write(
        "map(low_cardinality(string), string)",
        &[object(&[("key1", Value::from("1")), ("key2", Value::from("two"))])],
    );
    let expected = hex(
        "0100 0000 0000 0000 0200 0000 0000 0000 0006 0000 0000 0000
         0200 0000 0000 0000 046b 6579 3104 6b65 7932 0200 0000 0000
         0000 0001 0131 0374 776f",
    );
    assert_eq!(bytes, expected);
}

#[test]
fn array_offsets_before_items() {
    let column = [Value::array([Some(1u8), None]), Value::Array(vec![])];
    let bytes = write("array(nullable(uint8))", &column);
    assert_eq!(
        bytes,
        hex("0200 0000 0000 0000 0200 0000 0000 0000 0001 0100")
    );
    assert_eq!(round_trip("array(nullable(uint8))", &column), column);

    let nested = [Value::Array(vec![Value::array([1u16, 2]), Value::array([3u16])])];
    assert_eq!(round_trip("array(array(uint16))", &nested), nested);
}

#[test]
fn enum_canonical_names() {
    let col_type = get_from_name("enum8('value1' = 7, 'value2'=5)").unwrap();
    assert_eq!(col_type.name(), "enum8('value2' = 5, 'value1' = 7)");
    assert!(get_from_name("enum8('big' = 300)").unwrap_err().is_data_error());
}

#[test]
fn enum_values() {
    let type_name = "enum16('a' = 1, 'b' = -2)";
    let column = [Value::from("a"), Value::from(-2i16)];
    assert_eq!(write(type_name, &column), hex("0100 feff"));
    assert_eq!(round_trip(type_name, &column), vec![Value::from("a"), Value::from("b")]);
    let ints = read(type_name, &hex("0100 feff"), 2, &with_format("enum*", "int"));
    assert_eq!(ints, vec![Value::Int(1), Value::Int(-2)]);
    assert!(write_err(type_name, &[Value::from("c")]).is_data_error());
}

#[test]
fn fixed_string_bounds() {
    let err = write_err("fixed_string(4)", &[Value::from("abcdef")]);
    assert!(err.is_data_error());
    assert!(err.to_string().contains("61 62 63 64 65 66 exceeds column size 4"));

    let err = write_err("fixed_string(4)", &[Value::from(vec![1u8, 2, 3])]);
    assert!(err.to_string().contains("01 02 03 does not match column size 4"));

    let bytes = write("fixed_string(4)", &[Value::from("ab")]);
    assert_eq!(bytes, b"ab\0\0");
    let native = read("fixed_string(4)", &bytes, 1, &QueryContext::default());
    assert_eq!(native, vec![Value::Bytes(Bytes::from_static(b"ab\0\0"))]);
    let text = read("fixed_string(4)", &bytes, 1, &with_format("fixed*", "string"));
    assert_eq!(text, vec![Value::from("ab")]);
}

#[test]
fn strings_and_bytes() {
    let column = [Value::from("it's"), Value::from(vec![0xffu8])];
    assert_eq!(write("string", &column), hex("0469 7427 7301 ff"));
    let bytes = read("string", &hex("0201 02"), 1, &with_format("string", "bytes"));
    assert_eq!(bytes, vec![Value::Bytes(Bytes::from_static(&[1, 2]))]);
}

#[test]
fn uuid_halves() {
    let uuid = Uuid::parse_str("1d439f79-c57d-5f23-52c6-ffccca93e1a9").unwrap();
    let bytes = write("uuid", &[Value::Uuid(uuid)]);
    assert_eq!(bytes, hex("235f 7dc5 799f 431d a9e1 93ca ccff c652"));
    assert_eq!(round_trip("uuid", &[Value::from(uuid.to_string())]), vec![Value::Uuid(uuid)]);
    let text = read("uuid", &bytes, 1, &with_format("uuid", "string"));
    assert_eq!(text, vec![Value::from("1d439f79-c57d-5f23-52c6-ffccca93e1a9")]);
}

#[test]
fn ip_addresses() {
    let ips = ["192.168.5.3", "202.44.8.25", "0.0.2.2"];
    let column = ips.iter().map(|ip| Value::from(*ip)).collect::<Vec<_>>();
    let expected = ips
        .iter()
        .map(|ip| Value::Ipv4(ip.parse::<Ipv4Addr>().unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(round_trip("ipv4", &column), expected);

    let v6: Ipv6Addr = "2001:db8::1".parse().unwrap();
    let column = [Value::Ipv6(v6), Value::Ipv4(Ipv4Addr::new(10, 0, 0, 1))];
    assert_eq!(round_trip("ipv6", &column), column);
}

#[rstest]
#[case("ipv4", true)]
#[case("ipv6", true)]
#[case("uint32", false)]
fn ip_wildcard_format(#[case] type_name: &str, #[case] as_string: bool) {
    let ctx = with_format("IP*", "string");
    let width = get_from_name(type_name).unwrap().byte_size().unwrap();
    let value = read(type_name, &vec![0; width], 1, &ctx).remove(0);
    assert_eq!(matches!(value, Value::String(_)), as_string);
}

#[test]
fn column_formats_win_inside_tuples() {
    let type_name = "tuple(ipv4, uint8)";
    let bytes = write(type_name, &[Value::tuple([Value::from("1.2.3.4"), Value::from(5u8)])]);

    let mut ctx = QueryContext::builder("")
        .query_format("ipv4", "native")
        .column_type_format("addr", "ipv*", "string")
        .build()
        .unwrap();
    ctx.start_column("addr");
    let value = read(type_name, &bytes, 1, &ctx).remove(0);
    assert_eq!(value, Value::tuple([Value::from("1.2.3.4"), Value::from(5u8)]));

    ctx.start_column("other");
    let value = read(type_name, &bytes, 1, &ctx).remove(0);
    assert_eq!(
        value,
        Value::tuple([Value::Ipv4(Ipv4Addr::new(1, 2, 3, 4)), Value::from(5u8)])
    );
}

#[test]
fn tuple_formats() {
    let type_name = "tuple(a string, b uint8)";
    let bytes = write(type_name, &[object(&[("b", Value::from(2u8)), ("a", Value::from("x"))])]);
    assert_eq!(bytes, hex("0178 02"));
    let dict = read(type_name, &bytes, 1, &with_format("tuple", "dict"));
    assert_eq!(dict, vec![object(&[("a", Value::from("x")), ("b", Value::UInt(2))])]);
    let json = read(type_name, &bytes, 1, &with_format("tuple", "json"));
    assert_eq!(json, vec![Value::from(r#"{"a":"x","b":2}"#)]);
    assert!(write_err(type_name, &[Value::tuple(["x"])]).is_data_error());
}

#[test]
fn nested_rows_are_objects() {
    let column = [Value::Array(vec![
        object(&[("str1", Value::from("one")), ("int32", Value::from(5i32))]),
        object(&[("str1", Value::from("two")), ("int32", Value::from(55i32))]),
    ])];
    let values = round_trip("nested(str1 string, int32 int32)", &column);
    assert_eq!(values, column);
}

#[test]
fn decimals() {
    let type_name = "decimal(10, 2)";
    let column = [Value::from("123.45"), Value::from(1.5f64), Value::from(-3i32)];
    let bytes = write(type_name, &column);
    assert_eq!(&bytes[..8], &12345i64.to_le_bytes());
    let values = round_trip(type_name, &column);
    assert_eq!(values[1], Value::Decimal("1.50".parse::<Decimal>().unwrap()));
    let text = read(type_name, &bytes, 3, &with_format("decimal", "string"));
    assert_eq!(text, vec![Value::from("123.45"), Value::from("1.50"), Value::from("-3.00")]);
    assert!(write_err("decimal32(2)", &[Value::from("123456789.5")]).is_data_error());

    let wide = [Value::from("-1.000001")];
    assert_eq!(
        round_trip("decimal256(6)", &wide),
        vec![Value::Decimal(Decimal::new(i256::from_i128(-1_000_001), 6))]
    );
}

#[test]
fn wide_integers() {
    let column = [
        Value::Int256(i256::from_i128(-1)),
        Value::from("170141183460469231731687303715884105728"),
    ];
    let values = round_trip("int256", &column);
    assert_eq!(values[0], Value::Int256(i256::from_i128(-1)));
    let text = read("int256", &write("int256", &column), 2, &with_format("int256", "string"));
    assert_eq!(text[1], Value::from("170141183460469231731687303715884105728"));
    assert_eq!(
        round_trip("uint256", &[Value::UInt256(U256::MAX)]),
        vec![Value::UInt256(U256::MAX)]
    );
}

#[test]
fn dates() {
    let leap = date(1976, 2, 29);
    let bytes = write("date", &[Value::Date(leap)]);
    assert_eq!(bytes, 2250u16.to_le_bytes());
    assert_eq!(
        round_trip("date32", &[Value::from(date(1920, 4, 8))]),
        vec![Value::from(date(1920, 4, 8))]
    );
    let days = read("date32", &(-18165i32).to_le_bytes(), 1, &with_format("date32", "int"));
    assert_eq!(days, vec![Value::Int(-18165)]);
    assert!(write_err("date", &[Value::from(date(1960, 1, 1))]).is_data_error());
}

#[test]
fn datetimes_in_zones() {
    let naive = date(1970, 1, 1).at(8, 0, 0, 0);
    let bytes = write("datetime('Asia/Shanghai')", &[Value::DateTime(naive)]);
    assert_eq!(bytes, 0u32.to_le_bytes());

    let values = read("datetime('Asia/Shanghai')", &bytes, 1, &QueryContext::default());
    assert!(matches!(
        &values[0],
        Value::Zoned(z) if z.hour() == 8 && z.timestamp().as_second() == 0
    ));

    let utc = read("datetime", &bytes, 1, &QueryContext::default());
    assert_eq!(utc, vec![Value::DateTime(date(1970, 1, 1).at(0, 0, 0, 0))]);

    let ctx = QueryContext::builder("")
        .query_tz(TimeZone::get("Asia/Shanghai").unwrap())
        .build()
        .unwrap();
    let zoned = read("datetime", &bytes, 1, &ctx);
    assert!(matches!(&zoned[0], Value::Zoned(z) if z.hour() == 8));
}

#[test]
fn datetime64_ticks() {
    let type_name = "datetime64(3)";
    let ts = date(2023, 1, 21).at(10, 11, 12, 123_000_000);
    let bytes = write(type_name, &[Value::DateTime(ts)]);
    let ticks = read(type_name, &bytes, 1, &with_format("datetime64", "int"));
    assert_eq!(ticks, vec![Value::Int(1_674_295_872_123)]);
    assert_eq!(round_trip(type_name, &[Value::DateTime(ts)]), vec![Value::DateTime(ts)]);
    assert!(get_from_name("datetime64(12)").is_err());
}

#[test]
fn variant_columns() {
    let type_name = "variant(string, uint8)";
    let payload = hex("0000 0000 0000 0000 00ff 0101 7807");
    let values = read(type_name, &payload, 3, &QueryContext::default());
    assert_eq!(values, vec![Value::from("x"), Value::Null, Value::UInt(7)]);

    let col_type = get_from_name(type_name).unwrap();
    assert_eq!(col_type.insert_name(), "string");
    let bytes = write(type_name, &[Value::from("x"), Value::Null, Value::from(7u8)]);
    assert_eq!(bytes, hex("0178 044e 554c 4c01 37"));
}

#[test]
fn dynamic_columns() {
    let payload = hex(
        "0200 0000 0000 0000 0105 696e 7436 3400 0000 0000 0000 00
         0001 ff 2a00 0000 0000 0000 0173",
    );
    let values = read("dynamic", &payload, 3, &QueryContext::default());
    assert_eq!(values, vec![Value::Int(42), Value::from("s"), Value::Null]);

    let bad = get_from_name("dynamic")
        .unwrap()
        .read_column(&mut source(&hex("0300 0000 0000 0000")), 1, &QueryContext::default())
        .unwrap_err();
    assert!(bad.to_string().contains("Unrecognized dynamic structure version"));
    assert_eq!(get_from_name("dynamic(max_types=4)").unwrap().insert_name(), "string");
}

#[test]
fn json_rows() {
    let type_name = "json(`a.b` uint8, SKIP `x`)";
    let col_type = get_from_name(type_name).unwrap();
    assert_eq!(col_type.name(), "json(`a.b` uint8, SKIP `x`)");
    assert_eq!(col_type.insert_name(), col_type.name());

    let payload = hex(
        "0200 0000 0000 0000 0101 63
         0200 0000 0000 0000 0000 0000 0000 0000 00
         0102 00ff 0268 69",
    );
    let values = read(type_name, &payload, 2, &QueryContext::default());
    assert_eq!(
        values,
        vec![
            object(&[("a", object(&[("b", Value::UInt(1))])), ("c", Value::from("hi"))]),
            object(&[("a", object(&[("b", Value::UInt(2))]))]),
        ]
    );
    let text = read(type_name, &payload, 2, &with_format("json", "string"));
    assert_eq!(text[0], Value::from(r#"{"a":{"b":1},"c":"hi"}"#));

    let bad = col_type
        .read_column(&mut source(&hex("0500 0000 0000 0000")), 1, &QueryContext::default())
        .unwrap_err();
    assert!(bad.to_string().contains("Unrecognized json structure version: 5"));

    let bytes = write(type_name, &[object(&[("k", Value::from(1u8))]), Value::from("{}")]);
    let mut expected = 1u64.to_le_bytes().to_vec();
    expected.extend_from_slice(b"\x07{\"k\":1}\x02{}");
    assert_eq!(bytes, expected);
}

#[test]
fn legacy_json_object() {
    let bytes = write("object('json')", &[Value::from(r#"{"a":1}"#)]);
    assert_eq!(bytes[0], 0x01);
    let values = read("object('json')", &bytes[1..], 1, &QueryContext::default());
    assert_eq!(values, vec![Value::Json(serde_json::json!({"a": 1}))]);
    assert!(get_from_name("object('other')").is_err());
}

#[test]
fn nothing_columns() {
    let bytes = write("nothing", &[Value::Null, Value::Null]);
    assert_eq!(bytes, vec![1, 1, 0x30, 0x30]);
    assert_eq!(round_trip("nothing", &[Value::Null]), vec![Value::Null]);
}

#[test]
fn aggregate_functions() {
    let type_name = "simple_aggregate_function(sum, nullable(uint64))";
    let column = [Value::from(5u64), Value::Null];
    assert_eq!(round_trip(type_name, &column), column);

    let col_type = get_from_name("aggregate_function(uniq, string)").unwrap();
    let err = col_type
        .read_column(&mut source(&[0]), 1, &QueryContext::default())
        .unwrap_err();
    assert!(matches!(err, ProtonError::NotImplemented(..)));
}

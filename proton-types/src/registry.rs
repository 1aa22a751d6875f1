//! Resolution of type names to shared [`ColumnType`]s.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use log::{debug, error};
use proton_dtype::{normalize_base, parse_name};
use proton_error::{ContextExt, ProtonResult, proton_err};

use crate::codecs::{CodecBuilder, codec_builders};
use crate::column_type::{ColumnType, TypeRef};

/// Codec builders keyed by normalized base name.
static TYPE_MAP: LazyLock<HashMap<&'static str, CodecBuilder>> =
    LazyLock::new(|| codec_builders().into_iter().collect());

/// Resolved types keyed by the exact name they were requested with.
static TYPE_CACHE: LazyLock<DashMap<String, TypeRef>> = LazyLock::new(DashMap::new);

/// Resolve a type name, building its column type on first use.
///
/// Lookups are cached on the name exactly as given, so differently spelled names of the same type
/// resolve independently. Names that fail to resolve are not cached.
pub fn get_from_name(name: &str) -> ProtonResult<TypeRef> {
    if let Some(col_type) = TYPE_CACHE.get(name) {
        return Ok(col_type.clone());
    }
    let col_type = Arc::new(build(name)?);
    debug!("resolved type {name} as {}", col_type.name());
    // another thread may have built the same name meanwhile; keep the first
    Ok(TYPE_CACHE
        .entry(name.to_string())
        .or_insert(col_type)
        .clone())
}

fn build(name: &str) -> ProtonResult<ColumnType> {
    let (base, _, type_def) =
        parse_name(name).with_context(|| format!("invalid type name `{name}`"))?;
    let builder = TYPE_MAP.get(normalize_base(&base).as_str()).ok_or_else(|| {
        error!("unrecognized type base {base} in type name {name}");
        proton_err!(UnknownType: "Unrecognized type base: {base} name: {name}")
    })?;
    let codec = builder(&type_def).with_context(|| format!("invalid type `{name}`"))?;
    Ok(ColumnType::new(&base, type_def, codec))
}

/// Whether a normalized base name has a codec.
pub fn is_registered(base: &str) -> bool {
    TYPE_MAP.contains_key(normalize_base(base).as_str())
}

#[cfg(test)]
mod tests {
    use proton_dtype::parse_enum;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("uint8", "uint8")]
    #[case("Nullable(String)", "nullable(String)")]
    #[case("low_cardinality(nullable(string))", "low_cardinality(nullable(string))")]
    #[case("array(nullable(int32))", "array(nullable(int32))")]
    #[case("map(string, array(uint8))", "map(string, array(uint8))")]
    #[case("datetime64(3, 'Asia/Shanghai')", "datetime64(3, 'Asia/Shanghai')")]
    #[case("decimal(10, 2)", "decimal(10, 2)")]
    #[case("fixed_string(16)", "fixed_string(16)")]
    #[case("tuple(a string, `b c` uint8)", "tuple(`a` string, `b c` uint8)")]
    #[case("nested(a string, b uint8)", "nested(a string, b uint8)")]
    #[case("dynamic(max_types=10)", "dynamic(max_types=10)")]
    #[case("simple_aggregate_function(sum, uint64)", "simple_aggregate_function(sum, uint64)")]
    fn canonical_names(#[case] name: &str, #[case] canonical: &str) {
        assert_eq!(get_from_name(name).unwrap().name(), canonical);
    }

    #[test]
    fn cached_by_exact_name() {
        let first = get_from_name("array(string)").unwrap();
        let second = get_from_name("array(string)").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let other = get_from_name("array( string )").unwrap();
        assert_eq!(first.name(), other.name());
    }

    #[test]
    fn unknown_base() {
        let err = get_from_name("not_a_type").unwrap_err();
        assert!(err.to_string().contains("Unrecognized type base: not_a_type"));
        assert!(get_from_name("array(not_a_type)").is_err());
        assert!(is_registered("FixedString"));
        assert!(!is_registered("not_a_type"));
    }

    #[test]
    fn map_without_value_type() {
        assert!(get_from_name("map(string, )").is_err());
        assert!(get_from_name("map(string, uint8)").is_ok());
    }

    #[test]
    fn random_enum_names_are_canonical() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let entries: Vec<String> = (0..rng.random_range(1..10))
                .map(|_| format!("'e{}' = {}", rng.random_range(0..5), rng.random_range(-100..100)))
                .collect();
            let name = format!("enum16({})", entries.join(", "));
            let canonical = get_from_name(&name).unwrap().name().to_string();
            let (keys, values) = parse_enum(&canonical).unwrap();
            assert!(values.is_sorted_by(|a, b| a < b), "{canonical}");
            assert_eq!(parse_enum(&name).unwrap(), (keys, values), "{name}");
        }
    }

    #[test]
    fn nothing_is_nullable() {
        let col_type = get_from_name("nothing").unwrap();
        assert!(col_type.nullable());
        assert_eq!(col_type.name(), "nothing");
    }
}

//! Resolves decoded wire datums into destination-facing JSON values.
//!
//! Dispatch is driven by the catalog name of the column type, normalized to
//! tolerate the many aliases the source exposes for the same storage type.

use std::fmt::Write as _;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;
use tracing::{debug, warn};

use crate::conversions::bool::parse_bool;
use crate::conversions::numeric::parse_money;
use crate::conversions::time::{
    DATE_FORMAT, TIME_FORMAT, TIMESTAMP_FORMAT, parse_date, parse_time, parse_timestamp,
    parse_timestamptz, timestamp_sentinel, timestamptz_sentinel,
};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;
use crate::types::catalog::{TypeCatalog, TypeKind};
use crate::types::Datum;

/// A resolved column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Scalar(Value),
    /// Array values keep their source text form alongside the element type.
    Array { element_oid: u32, text: String },
}

impl ResolvedValue {
    /// Flattens the value into plain JSON for record building.
    pub fn into_json(self) -> Value {
        match self {
            ResolvedValue::Scalar(value) => value,
            ResolvedValue::Array { text, .. } => Value::String(text),
        }
    }
}

/// Normalizes a type name for dispatch.
///
/// Trims, lowercases, drops any parenthesized length or precision suffix,
/// turns quotes into spaces and collapses runs of whitespace.
pub fn normalize_type_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();

    let mut stripped = String::with_capacity(lowered.len());
    let mut depth = 0usize;
    for c in lowered.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '"' => {
                if depth == 0 {
                    stripped.push(' ');
                }
            }
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Converts wire datums to JSON values by column type.
pub struct ValueResolver {
    include_unknown_types: bool,
    warned_unknown: bool,
}

impl ValueResolver {
    pub fn new(include_unknown_types: bool) -> Self {
        Self {
            include_unknown_types,
            warned_unknown: false,
        }
    }

    /// Resolves one column datum.
    ///
    /// Returns `Ok(None)` for null and missing datums; the caller decides
    /// whether the column appears in the record.
    pub fn resolve(
        &mut self,
        column_name: &str,
        type_oid: u32,
        full_type_name: &str,
        datum: &Datum,
        catalog: &TypeCatalog,
    ) -> SyncResult<Option<ResolvedValue>> {
        if matches!(datum, Datum::Null | Datum::Missing) {
            return Ok(None);
        }

        match catalog.resolved_kind(type_oid) {
            TypeKind::Array { element } => {
                return Ok(Some(ResolvedValue::Array {
                    element_oid: element,
                    text: datum_text(datum),
                }));
            }
            TypeKind::Enum => {
                return Ok(Some(ResolvedValue::Scalar(Value::String(datum_text(
                    datum,
                )))));
            }
            TypeKind::Base | TypeKind::Alias { .. } => {}
        }

        let catalog_name = catalog.resolved_name(type_oid);
        let effective = effective_type_name(catalog_name, full_type_name);
        let name = normalize_type_name(&effective);

        let value = match name.as_str() {
            "bool" | "boolean" => Value::Bool(resolve_bool(column_name, datum)?),

            "integer" | "int" | "int4" | "smallint" | "int2" | "int1" | "int3" | "smallserial"
            | "serial" | "serial2" | "serial4" | "year" | "tinyint" | "mediumint" | "middleint"
            | "bigint" | "bigserial" | "int8" | "serial8" | "oid" => {
                Value::Number(resolve_i64(column_name, datum)?.into())
            }

            "real" | "float4" | "float" | "binary_float" => {
                float_value(resolve_f32(column_name, datum)? as f64)
            }
            "double precision" | "float8" | "binary_double" => {
                float_value(resolve_f64(column_name, datum)?)
            }

            "numeric" | "decimal" | "dec" | "number" => {
                Value::String(resolve_decimal(column_name, datum)?.to_string())
            }

            "char" | "character" | "character varying" | "varchar" | "bpchar" | "text"
            | "name" | "nchar" | "nvarchar" | "varchar2" | "nvarchar2" | "clob" | "tinytext"
            | "mediumtext" | "longtext" => Value::String(datum_text(datum)),

            "date" => {
                let text = datum_text(datum);
                Value::String(parse_date(&text)?.format(DATE_FORMAT).to_string())
            }

            "timestamptz" | "timestamp with time zone" | "timestampltz"
            | "timestamp with local time zone" => {
                let text = datum_text(datum);
                let ts = match timestamptz_sentinel(&text) {
                    Some(sentinel) => sentinel,
                    None => parse_timestamptz(&text)?,
                };
                Value::String(ts.format(TIMESTAMP_FORMAT).to_string())
            }
            "timestamp" | "timestamp without time zone" | "datetime" | "datetime2"
            | "smalldatetime" => {
                let text = datum_text(datum);
                let ts = match timestamp_sentinel(&text) {
                    Some(sentinel) => sentinel,
                    None => parse_timestamp(&text)?,
                };
                Value::String(ts.format(TIMESTAMP_FORMAT).to_string())
            }

            // Bare `time` keeps its source form; the qualified spelling is
            // validated and reformatted.
            "time" => Value::String(datum_text(datum)),
            "time without time zone" => {
                let text = datum_text(datum);
                Value::String(parse_time(&text)?.format(TIME_FORMAT).to_string())
            }
            "timetz" | "time with time zone" => Value::String(datum_text(datum)),

            "bytea" | "blob" | "binary" | "varbinary" | "tinyblob" | "mediumblob"
            | "longblob" => Value::String(resolve_hex(datum)),

            "box" | "circle" | "interval" | "line" | "lseg" | "path" | "polygon" => {
                Value::String(datum_text(datum))
            }

            "money" => {
                let text = datum_text(datum);
                Value::String(parse_money(&text)?.to_string())
            }

            "point" => Value::String(resolve_point(column_name, datum)?),

            "hstore" | "geometry" | "geography" | "citext" | "bit" | "bit varying" | "varbit"
            | "json" | "jsonb" | "xml" | "uuid" | "int4range" | "numrange" | "tsrange"
            | "tstzrange" | "daterange" | "int8range" | "inet" | "cidr" | "macaddr"
            | "macaddr8" | "tsvector" | "tsquery" => Value::String(datum_text(datum)),

            other => {
                if !self.warned_unknown {
                    self.warned_unknown = true;
                    if self.include_unknown_types {
                        debug!(
                            column = column_name,
                            type_name = other,
                            "unrecognized column type, passing raw value through"
                        );
                    } else {
                        warn!(
                            column = column_name,
                            type_name = other,
                            "unrecognized column type, passing raw value through"
                        );
                    }
                }
                Value::String(datum_text(datum))
            }
        };

        Ok(Some(ResolvedValue::Scalar(value)))
    }
}

/// Picks the usable type name between the catalog name and the richer
/// metadata name.
fn effective_type_name(catalog_name: &str, full_type_name: &str) -> String {
    if catalog_name.is_empty() || catalog_name == "unknown" {
        full_type_name.to_string()
    } else {
        catalog_name.to_string()
    }
}

fn datum_text(datum: &Datum) -> String {
    match datum {
        Datum::Text(s) => s.clone(),
        Datum::Bool(b) => (if *b { "t" } else { "f" }).to_string(),
        Datum::I32(v) => v.to_string(),
        Datum::I64(v) => v.to_string(),
        Datum::F32(v) => v.to_string(),
        Datum::F64(v) => v.to_string(),
        Datum::Bytes(b) => hex_text(b),
        Datum::Point { x, y } => format!("({x},{y})"),
        Datum::Null | Datum::Missing => String::new(),
    }
}

fn hex_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn resolve_bool(column_name: &str, datum: &Datum) -> SyncResult<bool> {
    match datum {
        Datum::Bool(b) => Ok(*b),
        Datum::Text(s) => parse_bool(s),
        Datum::I32(v) => Ok(*v != 0),
        other => Err(conversion_mismatch(column_name, "bool", other)),
    }
}

fn resolve_i64(column_name: &str, datum: &Datum) -> SyncResult<i64> {
    match datum {
        Datum::I32(v) => Ok(i64::from(*v)),
        Datum::I64(v) => Ok(*v),
        Datum::Text(s) => Ok(s.trim().parse()?),
        other => Err(conversion_mismatch(column_name, "integer", other)),
    }
}

fn resolve_f32(column_name: &str, datum: &Datum) -> SyncResult<f32> {
    match datum {
        Datum::F32(v) => Ok(*v),
        Datum::F64(v) => Ok(*v as f32),
        Datum::Text(s) => Ok(s.trim().parse()?),
        other => Err(conversion_mismatch(column_name, "float", other)),
    }
}

fn resolve_f64(column_name: &str, datum: &Datum) -> SyncResult<f64> {
    match datum {
        Datum::F64(v) => Ok(*v),
        Datum::F32(v) => Ok(f64::from(*v)),
        Datum::Text(s) => Ok(s.trim().parse()?),
        other => Err(conversion_mismatch(column_name, "double", other)),
    }
}

fn resolve_decimal(column_name: &str, datum: &Datum) -> SyncResult<BigDecimal> {
    match datum {
        Datum::Text(s) => Ok(BigDecimal::from_str(s.trim())?),
        Datum::F64(v) => Ok(BigDecimal::from_str(&v.to_string())?),
        Datum::F32(v) => Ok(BigDecimal::from_str(&v.to_string())?),
        Datum::I32(v) => Ok(BigDecimal::from(*v)),
        Datum::I64(v) => Ok(BigDecimal::from(*v)),
        other => Err(conversion_mismatch(column_name, "numeric", other)),
    }
}

fn resolve_point(column_name: &str, datum: &Datum) -> SyncResult<String> {
    match datum {
        Datum::Point { x, y } => Ok(format!("({x},{y})")),
        Datum::Text(s) => Ok(s.clone()),
        other => Err(conversion_mismatch(column_name, "point", other)),
    }
}

fn resolve_hex(datum: &Datum) -> String {
    match datum {
        Datum::Bytes(b) => hex_text(b),
        other => datum_text(other),
    }
}

fn float_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(v.to_string()))
}

fn conversion_mismatch(column_name: &str, expected: &str, datum: &Datum) -> SyncError {
    sync_error!(
        ErrorKind::ConversionError,
        "Datum does not match column type",
        format!("column '{column_name}' expected {expected}, got {datum:?}")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve_one(
        oid: u32,
        full_name: &str,
        datum: Datum,
    ) -> SyncResult<Option<ResolvedValue>> {
        let catalog = TypeCatalog::new();
        let mut resolver = ValueResolver::new(true);
        resolver.resolve("c", oid, full_name, &datum, &catalog)
    }

    fn scalar(value: SyncResult<Option<ResolvedValue>>) -> Value {
        match value.unwrap().unwrap() {
            ResolvedValue::Scalar(v) => v,
            other => panic!("expected scalar, got {other:?}"),
        }
    }

    #[test]
    fn normalizes_type_names() {
        assert_eq!(normalize_type_name("  VARCHAR(255) "), "varchar");
        assert_eq!(normalize_type_name("numeric(10, 2)"), "numeric");
        assert_eq!(
            normalize_type_name("TIMESTAMP   WITHOUT  TIME ZONE"),
            "timestamp without time zone"
        );
        assert_eq!(normalize_type_name("\"char\""), "char");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "  VARCHAR(255) ",
            "TIMESTAMP   WITHOUT  TIME ZONE",
            "\"char\"",
            "numeric(10, 2)",
            "already normal",
        ] {
            let once = normalize_type_name(raw);
            assert_eq!(normalize_type_name(&once), once);
        }
    }

    #[test]
    fn foreign_alias_spellings_dispatch_to_families() {
        crate::telemetry::init_test_tracing();

        // Temporal aliases reformat rather than passing raw text through.
        for name in ["datetime2", "smalldatetime(3)"] {
            assert_eq!(
                scalar(resolve_one(
                    999_999,
                    name,
                    Datum::Text("2024-03-15 10:00:00".to_string())
                )),
                json!("2024-03-15 10:00:00")
            );
        }
        assert_eq!(
            scalar(resolve_one(
                999_999,
                "TIMESTAMP WITH LOCAL TIME ZONE",
                Datum::Text("2024-03-15 12:00:00+02".to_string())
            )),
            json!("2024-03-15 10:00:00")
        );
        assert_eq!(
            scalar(resolve_one(
                999_999,
                "timestampltz",
                Datum::Text("2024-03-15 12:00:00+02:00".to_string())
            )),
            json!("2024-03-15 10:00:00")
        );

        for name in ["tinytext", "mediumtext", "longtext"] {
            assert_eq!(
                scalar(resolve_one(999_999, name, Datum::Text("abc".to_string()))),
                json!("abc")
            );
        }

        for name in ["varbinary(16)", "tinyblob", "mediumblob", "longblob"] {
            assert_eq!(
                scalar(resolve_one(999_999, name, Datum::Bytes(vec![0x0f, 0xa0]))),
                json!("\\x0fa0")
            );
        }
    }

    #[test]
    fn null_and_missing_resolve_to_none() {
        assert!(resolve_one(23, "", Datum::Null).unwrap().is_none());
        assert!(resolve_one(23, "", Datum::Missing).unwrap().is_none());
    }

    #[test]
    fn integers_widen_to_i64() {
        assert_eq!(scalar(resolve_one(21, "", Datum::I32(-7))), json!(-7));
        assert_eq!(scalar(resolve_one(23, "", Datum::I32(42))), json!(42));
        assert_eq!(
            scalar(resolve_one(20, "", Datum::I64(9_000_000_000))),
            json!(9_000_000_000i64)
        );
        assert_eq!(
            scalar(resolve_one(20, "", Datum::Text("12".to_string()))),
            json!(12)
        );
    }

    #[test]
    fn booleans_resolve_from_wire_and_text() {
        assert_eq!(scalar(resolve_one(16, "", Datum::Bool(true))), json!(true));
        assert_eq!(
            scalar(resolve_one(16, "", Datum::Text("f".to_string()))),
            json!(false)
        );
    }

    #[test]
    fn floats_resolve_as_numbers() {
        assert_eq!(scalar(resolve_one(700, "", Datum::F32(1.5))), json!(1.5));
        assert_eq!(scalar(resolve_one(701, "", Datum::F64(2.25))), json!(2.25));
    }

    #[test]
    fn numerics_resolve_as_decimal_strings() {
        assert_eq!(
            scalar(resolve_one(1700, "", Datum::Text("123.450".to_string()))),
            json!("123.450")
        );
        assert_eq!(scalar(resolve_one(1700, "", Datum::I64(5))), json!("5"));
        assert!(resolve_one(1700, "", Datum::Text("abc".to_string())).is_err());
    }

    #[test]
    fn dates_and_timestamps_reformat() {
        assert_eq!(
            scalar(resolve_one(1082, "", Datum::Text("2024-03-15".to_string()))),
            json!("2024-03-15")
        );
        assert_eq!(
            scalar(resolve_one(
                1114,
                "",
                Datum::Text("2024-03-15 10:00:00".to_string())
            )),
            json!("2024-03-15 10:00:00")
        );
        assert_eq!(
            scalar(resolve_one(
                1184,
                "",
                Datum::Text("2024-03-15 12:00:00+02".to_string())
            )),
            json!("2024-03-15 10:00:00")
        );
    }

    #[test]
    fn infinity_sentinels_map_to_extremes() {
        use chrono::{DateTime, NaiveDateTime, Utc};

        assert_eq!(
            scalar(resolve_one(1114, "", Datum::Text("infinity".to_string()))),
            json!(NaiveDateTime::MAX.format(TIMESTAMP_FORMAT).to_string())
        );
        assert_eq!(
            scalar(resolve_one(1184, "", Datum::Text("-infinity".to_string()))),
            json!(
                DateTime::<Utc>::MIN_UTC
                    .format(TIMESTAMP_FORMAT)
                    .to_string()
            )
        );
    }

    #[test]
    fn bytea_renders_as_hex() {
        assert_eq!(
            scalar(resolve_one(17, "", Datum::Bytes(vec![0xde, 0xad, 0x01]))),
            json!("\\xdead01")
        );
    }

    #[test]
    fn money_strips_formatting() {
        assert_eq!(
            scalar(resolve_one(790, "", Datum::Text("-$1,234.50".to_string()))),
            json!("-1234.50")
        );
    }

    #[test]
    fn points_render_as_pairs() {
        assert_eq!(
            scalar(resolve_one(600, "", Datum::Point { x: 1.5, y: -2.0 })),
            json!("(1.5,-2)")
        );
    }

    #[test]
    fn arrays_keep_text_and_element_oid() {
        let value = resolve_one(1007, "", Datum::Text("{1,2,3}".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(
            value,
            ResolvedValue::Array {
                element_oid: 23,
                text: "{1,2,3}".to_string()
            }
        );
        assert_eq!(value.into_json(), json!("{1,2,3}"));
    }

    #[test]
    fn enums_resolve_as_labels() {
        let mut catalog = TypeCatalog::new();
        catalog.register(16_001, "order_status", TypeKind::Enum);
        let mut resolver = ValueResolver::new(true);
        let value = resolver
            .resolve(
                "status",
                16_001,
                "",
                &Datum::Text("shipped".to_string()),
                &catalog,
            )
            .unwrap()
            .unwrap();
        assert_eq!(value, ResolvedValue::Scalar(json!("shipped")));
    }

    #[test]
    fn domain_alias_uses_root_type() {
        let mut catalog = TypeCatalog::new();
        catalog.register(16_010, "positive_int", TypeKind::Alias { parent: 23 });
        let mut resolver = ValueResolver::new(true);
        let value = resolver
            .resolve("n", 16_010, "", &Datum::I32(9), &catalog)
            .unwrap()
            .unwrap();
        assert_eq!(value, ResolvedValue::Scalar(json!(9)));
    }

    #[test]
    fn unknown_type_passes_raw_text() {
        let value = resolve_one(999_999, "custom_thing", Datum::Text("raw".to_string()));
        assert_eq!(scalar(value), json!("raw"));
    }

    #[test]
    fn unknown_catalog_name_defers_to_full_name() {
        // OID unknown to the catalog, but the metadata name drives dispatch.
        let value = resolve_one(999_999, "NUMERIC(10,2)", Datum::Text("1.50".to_string()));
        assert_eq!(scalar(value), json!("1.50"));
    }

    #[test]
    fn mismatched_datum_is_an_error() {
        assert!(resolve_one(23, "", Datum::Point { x: 0.0, y: 0.0 }).is_err());
        assert!(resolve_one(16, "", Datum::F64(1.0)).is_err());
    }
}

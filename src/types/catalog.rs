//! Source type catalog.
//!
//! Maps type OIDs to their catalog names through a static builtin table,
//! extended at runtime with user-defined types discovered from the source.

use std::collections::HashMap;

/// Classification of a catalog type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Base,
    /// Array type with the OID of its element type.
    Array { element: u32 },
    /// User-defined enum, rendered as its label text.
    Enum,
    /// Domain or alias over another catalog type.
    Alias { parent: u32 },
}

/// One resolved catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogType {
    pub name: String,
    pub kind: TypeKind,
}

enum Builtin {
    Base,
    Array(u32),
}

/// Builtin type OIDs, fixed by the source catalog.
#[rustfmt::skip]
static BUILTIN_TYPES: &[(u32, &str, Builtin)] = &[
    (16, "bool", Builtin::Base),
    (17, "bytea", Builtin::Base),
    (18, "char", Builtin::Base),
    (19, "name", Builtin::Base),
    (20, "int8", Builtin::Base),
    (21, "int2", Builtin::Base),
    (23, "int4", Builtin::Base),
    (25, "text", Builtin::Base),
    (26, "oid", Builtin::Base),
    (114, "json", Builtin::Base),
    (142, "xml", Builtin::Base),
    (600, "point", Builtin::Base),
    (601, "lseg", Builtin::Base),
    (602, "path", Builtin::Base),
    (603, "box", Builtin::Base),
    (604, "polygon", Builtin::Base),
    (628, "line", Builtin::Base),
    (650, "cidr", Builtin::Base),
    (700, "float4", Builtin::Base),
    (701, "float8", Builtin::Base),
    (705, "unknown", Builtin::Base),
    (718, "circle", Builtin::Base),
    (774, "macaddr8", Builtin::Base),
    (790, "money", Builtin::Base),
    (829, "macaddr", Builtin::Base),
    (869, "inet", Builtin::Base),
    (1042, "bpchar", Builtin::Base),
    (1043, "varchar", Builtin::Base),
    (1082, "date", Builtin::Base),
    (1083, "time", Builtin::Base),
    (1114, "timestamp", Builtin::Base),
    (1184, "timestamptz", Builtin::Base),
    (1186, "interval", Builtin::Base),
    (1266, "timetz", Builtin::Base),
    (1560, "bit", Builtin::Base),
    (1562, "varbit", Builtin::Base),
    (1700, "numeric", Builtin::Base),
    (2950, "uuid", Builtin::Base),
    (3614, "tsvector", Builtin::Base),
    (3615, "tsquery", Builtin::Base),
    (3802, "jsonb", Builtin::Base),
    (3904, "int4range", Builtin::Base),
    (3906, "numrange", Builtin::Base),
    (3908, "tsrange", Builtin::Base),
    (3910, "tstzrange", Builtin::Base),
    (3912, "daterange", Builtin::Base),
    (3926, "int8range", Builtin::Base),
    (143, "_xml", Builtin::Array(142)),
    (199, "_json", Builtin::Array(114)),
    (651, "_cidr", Builtin::Array(650)),
    (791, "_money", Builtin::Array(790)),
    (1000, "_bool", Builtin::Array(16)),
    (1001, "_bytea", Builtin::Array(17)),
    (1002, "_char", Builtin::Array(18)),
    (1003, "_name", Builtin::Array(19)),
    (1005, "_int2", Builtin::Array(21)),
    (1007, "_int4", Builtin::Array(23)),
    (1009, "_text", Builtin::Array(25)),
    (1014, "_bpchar", Builtin::Array(1042)),
    (1015, "_varchar", Builtin::Array(1043)),
    (1016, "_int8", Builtin::Array(20)),
    (1017, "_point", Builtin::Array(600)),
    (1021, "_float4", Builtin::Array(700)),
    (1022, "_float8", Builtin::Array(701)),
    (1028, "_oid", Builtin::Array(26)),
    (1040, "_macaddr", Builtin::Array(829)),
    (1041, "_inet", Builtin::Array(869)),
    (1115, "_timestamp", Builtin::Array(1114)),
    (1182, "_date", Builtin::Array(1082)),
    (1183, "_time", Builtin::Array(1083)),
    (1185, "_timestamptz", Builtin::Array(1184)),
    (1187, "_interval", Builtin::Array(1186)),
    (1231, "_numeric", Builtin::Array(1700)),
    (1270, "_timetz", Builtin::Array(1266)),
    (1561, "_bit", Builtin::Array(1560)),
    (1563, "_varbit", Builtin::Array(1562)),
    (2951, "_uuid", Builtin::Array(2950)),
    (3807, "_jsonb", Builtin::Array(3802)),
];

/// Maximum alias chain length followed before giving up.
const MAX_ALIAS_DEPTH: usize = 16;

/// Catalog of source types keyed by OID.
///
/// Lookups are total: OIDs the catalog has never seen resolve to the
/// `unknown` base type and flow through the raw string path downstream.
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    types: HashMap<u32, CatalogType>,
}

impl TypeCatalog {
    /// Creates a catalog preloaded with the builtin type table.
    pub fn new() -> Self {
        let mut types = HashMap::with_capacity(BUILTIN_TYPES.len());
        for (oid, name, builtin) in BUILTIN_TYPES {
            let kind = match builtin {
                Builtin::Base => TypeKind::Base,
                Builtin::Array(element) => TypeKind::Array { element: *element },
            };
            types.insert(
                *oid,
                CatalogType {
                    name: (*name).to_string(),
                    kind,
                },
            );
        }
        Self { types }
    }

    /// Registers a user-defined type, replacing any previous entry for the OID.
    pub fn register(&mut self, oid: u32, name: impl Into<String>, kind: TypeKind) {
        self.types.insert(
            oid,
            CatalogType {
                name: name.into(),
                kind,
            },
        );
    }

    pub fn lookup(&self, oid: u32) -> Option<&CatalogType> {
        self.types.get(&oid)
    }

    /// Catalog name for an OID, `"unknown"` when the OID is not registered.
    pub fn type_name(&self, oid: u32) -> &str {
        self.lookup(oid).map(|t| t.name.as_str()).unwrap_or("unknown")
    }

    /// Follows alias chains to the underlying type OID.
    ///
    /// Bounded to guard against alias cycles in corrupted registrations.
    pub fn resolve_root(&self, oid: u32) -> u32 {
        let mut current = oid;
        for _ in 0..MAX_ALIAS_DEPTH {
            match self.lookup(current) {
                Some(CatalogType {
                    kind: TypeKind::Alias { parent },
                    ..
                }) => current = *parent,
                _ => return current,
            }
        }
        current
    }

    /// Kind of the fully resolved type behind an OID.
    pub fn resolved_kind(&self, oid: u32) -> TypeKind {
        self.lookup(self.resolve_root(oid))
            .map(|t| t.kind)
            .unwrap_or(TypeKind::Base)
    }

    /// Catalog name of the fully resolved type behind an OID.
    pub fn resolved_name(&self, oid: u32) -> &str {
        self.type_name(self.resolve_root(oid))
    }
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a source type name to the destination column type used in DDL.
///
/// Matching is substring-based over the lowercased source name, mirroring
/// the loose naming the source exposes through its information schema.
pub fn doris_type_for(type_name: &str, numeric_scale: Option<i32>, char_len: Option<i64>) -> String {
    let name = type_name.trim().to_lowercase();

    if name.contains("int2") || name.contains("smallint") || name.contains("smallserial") {
        return "SMALLINT".to_string();
    }
    if name.contains("int8") || name.contains("bigint") || name.contains("bigserial") {
        return "BIGINT".to_string();
    }
    if name.contains("int4") || name.contains("integer") || name.contains("serial") || name == "int"
    {
        return "INT".to_string();
    }
    if name.contains("float4") || name.contains("real") {
        return "FLOAT".to_string();
    }
    if name.contains("float8") || name.contains("double") {
        return "DOUBLE".to_string();
    }
    if name.contains("numeric") || name.contains("decimal") || name.contains("money") {
        let scale = match numeric_scale {
            Some(s) if s >= 0 => s.min(18),
            _ => 4,
        };
        return format!("DECIMAL(38,{scale})");
    }
    if name.contains("bool") {
        return "BOOLEAN".to_string();
    }
    if name.contains("date") {
        return "DATE".to_string();
    }
    if name.contains("timestamp") || name.contains("time") {
        return "DATETIME".to_string();
    }
    if name.contains("char")
        || name.contains("text")
        || name.contains("json")
        || name.contains("uuid")
        || name.contains("xml")
        || name.contains("inet")
        || name.contains("cidr")
        || name.contains("macaddr")
    {
        return "STRING".to_string();
    }
    if name.contains("bytea") || name.contains("blob") || name.contains("binary") {
        return "STRING".to_string();
    }
    if let Some(len) = char_len {
        if (1..=65533).contains(&len) {
            return format!("VARCHAR({len})");
        }
    }

    "STRING".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_has_no_duplicate_oids() {
        let mut seen = std::collections::HashSet::new();
        for (oid, name, _) in BUILTIN_TYPES {
            assert!(seen.insert(*oid), "duplicate OID {oid} for {name}");
        }
    }

    #[test]
    fn builtin_array_elements_are_registered() {
        let catalog = TypeCatalog::new();
        for (oid, name, builtin) in BUILTIN_TYPES {
            if let Builtin::Array(element) = builtin {
                assert!(
                    catalog.lookup(*element).is_some(),
                    "array {name} ({oid}) references unregistered element {element}"
                );
            }
        }
    }

    #[test]
    fn lookup_is_total_with_unknown_fallback() {
        let catalog = TypeCatalog::new();
        assert_eq!(catalog.type_name(23), "int4");
        assert_eq!(catalog.type_name(999_999), "unknown");
    }

    #[test]
    fn registered_enum_resolves_by_name() {
        let mut catalog = TypeCatalog::new();
        catalog.register(16_001, "order_status", TypeKind::Enum);
        assert_eq!(catalog.type_name(16_001), "order_status");
        assert_eq!(catalog.resolved_kind(16_001), TypeKind::Enum);
    }

    #[test]
    fn alias_chain_resolves_to_root() {
        let mut catalog = TypeCatalog::new();
        catalog.register(16_010, "positive_int", TypeKind::Alias { parent: 23 });
        catalog.register(16_011, "order_count", TypeKind::Alias { parent: 16_010 });
        assert_eq!(catalog.resolve_root(16_011), 23);
        assert_eq!(catalog.resolved_name(16_011), "int4");
    }

    #[test]
    fn alias_cycle_is_bounded() {
        let mut catalog = TypeCatalog::new();
        catalog.register(16_020, "a", TypeKind::Alias { parent: 16_021 });
        catalog.register(16_021, "b", TypeKind::Alias { parent: 16_020 });
        // Terminates at one of the cycle members.
        let root = catalog.resolve_root(16_020);
        assert!(root == 16_020 || root == 16_021);
    }

    #[test]
    fn doris_type_integer_families() {
        assert_eq!(doris_type_for("smallint", None, None), "SMALLINT");
        assert_eq!(doris_type_for("int2", None, None), "SMALLINT");
        assert_eq!(doris_type_for("bigserial", None, None), "BIGINT");
        assert_eq!(doris_type_for("integer", None, None), "INT");
        assert_eq!(doris_type_for("int", None, None), "INT");
        assert_eq!(doris_type_for("serial", None, None), "INT");
    }

    #[test]
    fn doris_type_numeric_scale_clamped() {
        assert_eq!(doris_type_for("numeric", Some(2), None), "DECIMAL(38,2)");
        assert_eq!(doris_type_for("numeric", Some(30), None), "DECIMAL(38,18)");
        assert_eq!(doris_type_for("numeric", None, None), "DECIMAL(38,4)");
        assert_eq!(doris_type_for("money", Some(-1), None), "DECIMAL(38,4)");
    }

    #[test]
    fn doris_type_temporal_and_text() {
        assert_eq!(doris_type_for("date", None, None), "DATE");
        assert_eq!(doris_type_for("timestamptz", None, None), "DATETIME");
        assert_eq!(doris_type_for("time without time zone", None, None), "DATETIME");
        assert_eq!(doris_type_for("text", None, None), "STRING");
        assert_eq!(doris_type_for("character varying", Some(0), Some(255)), "STRING");
        assert_eq!(doris_type_for("uuid", None, None), "STRING");
    }

    #[test]
    fn doris_type_varchar_from_length() {
        assert_eq!(doris_type_for("custom_thing", None, Some(64)), "VARCHAR(64)");
        assert_eq!(doris_type_for("custom_thing", None, Some(70_000)), "STRING");
        assert_eq!(doris_type_for("custom_thing", None, None), "STRING");
    }
}

//! Maps source tables to destination databases and tables.

use crate::config::{RouteConfig, RouteMode};
use crate::destination::TargetTable;
use crate::types::TableId;

/// Lowercases a raw name into a safe destination identifier.
///
/// Anything outside ASCII letters, digits and underscores becomes an
/// underscore; empty or digit-leading results get a `t` prefix so the
/// output is always a valid identifier.
pub fn sanitize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        return "t".to_string();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("t_{out}");
    }
    out
}

/// Applies the configured naming rules to source tables.
pub struct TableRouter {
    config: RouteConfig,
}

impl TableRouter {
    pub fn new(config: RouteConfig) -> Self {
        Self { config }
    }

    pub fn route(&self, source: &TableId) -> TargetTable {
        let c = &self.config;
        match c.mode {
            RouteMode::SchemaAsDb => TargetTable::new(
                sanitize_name(&format!("{}{}", c.database_prefix, source.schema)),
                sanitize_name(&format!(
                    "{}{}{}",
                    c.table_prefix, source.table, c.table_suffix
                )),
            ),
            RouteMode::SchemaTable => TargetTable::new(
                sanitize_name(&c.database),
                sanitize_name(&format!(
                    "{}{}{}{}{}",
                    c.table_prefix,
                    source.schema,
                    c.schema_table_separator,
                    source.table,
                    c.table_suffix
                )),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_replaces() {
        assert_eq!(sanitize_name("Public"), "public");
        assert_eq!(sanitize_name("my-table name"), "my_table_name");
        assert_eq!(sanitize_name("naïve"), "na_ve");
    }

    #[test]
    fn sanitize_guards_empty_and_digit_leading() {
        assert_eq!(sanitize_name(""), "t");
        assert_eq!(sanitize_name("1st"), "t_1st");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for raw in ["Public", "my-table name", "naïve", "", "1st", "t_1st"] {
            let once = sanitize_name(raw);
            assert_eq!(sanitize_name(&once), once);
        }
    }

    #[test]
    fn schema_table_mode_joins_with_separator() {
        let router = TableRouter::new(RouteConfig::default());
        let target = router.route(&TableId::new("sales", "Items"));
        assert_eq!(target.database, "cdc");
        assert_eq!(target.table, "sales__items");
    }

    #[test]
    fn schema_table_mode_applies_prefix_and_suffix() {
        let router = TableRouter::new(RouteConfig {
            table_prefix: "t_".to_string(),
            table_suffix: "_v1".to_string(),
            ..RouteConfig::default()
        });
        let target = router.route(&TableId::new("sales", "items"));
        assert_eq!(target.table, "t_sales__items_v1");
    }

    #[test]
    fn schema_as_db_mode_prefixes_database() {
        let router = TableRouter::new(RouteConfig {
            mode: RouteMode::SchemaAsDb,
            ..RouteConfig::default()
        });
        let target = router.route(&TableId::new("sales", "items"));
        assert_eq!(target.database, "cdc_sales");
        assert_eq!(target.table, "items");
    }
}

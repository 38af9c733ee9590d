//! Applies normalized records to the destination as DML.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlPool};
use sqlx::query::Query;
use sqlx::MySql;
use tracing::warn;

use crate::config::{DeleteMode, SinkConfig};
use crate::conversions::bool::parse_bool;
use crate::conversions::normalizer::NormalizedRecord;
use crate::destination::{TargetTable, backtick};
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::replication::source::SourceTableMeta;
use crate::sync_error;
use crate::types::TableId;

/// A value coerced to the destination column type, ready to bind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BoundParam {
    Null,
    I64(i64),
    F64(f64),
    Decimal(BigDecimal),
    Bool(bool),
    Text(String),
}

impl BoundParam {
    fn bind<'q>(
        self,
        query: Query<'q, MySql, MySqlArguments>,
    ) -> Query<'q, MySql, MySqlArguments> {
        match self {
            BoundParam::Null => query.bind(None::<String>),
            BoundParam::I64(v) => query.bind(v),
            BoundParam::F64(v) => query.bind(v),
            BoundParam::Decimal(v) => query.bind(v),
            BoundParam::Bool(v) => query.bind(v),
            BoundParam::Text(v) => query.bind(v),
        }
    }
}

/// Per-table prepared statement text, cached on first use.
struct TableRuntime {
    meta: Arc<SourceTableMeta>,
    upsert_sql: String,
    /// Empty when the table has no primary key.
    delete_sql: String,
}

/// Writes normalized records to the destination.
///
/// Statement text is cached per source table; the pipeline is the single
/// writer of the cache.
pub struct SinkWriter {
    delete_mode: DeleteMode,
    logical_delete_column: String,
    skip_delete_without_pk: bool,
    cache: HashMap<TableId, TableRuntime>,
}

impl SinkWriter {
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            delete_mode: config.delete_mode,
            logical_delete_column: config.logical_delete_column.clone(),
            skip_delete_without_pk: config.skip_delete_without_pk,
            cache: HashMap::new(),
        }
    }

    fn logical_delete(&self) -> bool {
        self.delete_mode == DeleteMode::LogicalDeleteSign
    }

    /// Applies one record against its routed destination table.
    pub async fn apply(
        &mut self,
        pool: &MySqlPool,
        source: &TableId,
        target: &TargetTable,
        meta: &Arc<SourceTableMeta>,
        record: &NormalizedRecord,
    ) -> SyncResult<()> {
        if record.tombstone && !record.deleted {
            return Ok(());
        }

        let stale = match self.cache.get(source) {
            Some(runtime) => !Arc::ptr_eq(&runtime.meta, meta),
            None => true,
        };
        if stale {
            let sign = self.logical_delete().then(|| self.logical_delete_column.clone());
            self.cache.insert(
                source.clone(),
                TableRuntime {
                    meta: meta.clone(),
                    upsert_sql: build_upsert_sql(target, meta, sign.as_deref()),
                    delete_sql: build_delete_sql(target, meta),
                },
            );
        }

        if record.deleted {
            self.apply_delete(pool, source, record).await
        } else {
            self.apply_upsert(pool, source, record, false).await
        }
    }

    async fn apply_upsert(
        &self,
        pool: &MySqlPool,
        source: &TableId,
        record: &NormalizedRecord,
        delete_sign: bool,
    ) -> SyncResult<()> {
        let runtime = self.runtime(source)?;
        let Some(data) = &record.data else {
            return Err(sync_error!(
                ErrorKind::InvalidData,
                "Record has no row image to upsert",
                source.to_string()
            ));
        };

        let mut query = sqlx::query(&runtime.upsert_sql);
        for column in &runtime.meta.columns {
            let param = coerce(data.get(&column.name), &column.doris_type)?;
            query = param.bind(query);
        }
        if self.logical_delete() {
            query = query.bind(i64::from(delete_sign));
        }
        query.execute(pool).await?;
        Ok(())
    }

    async fn apply_delete(
        &self,
        pool: &MySqlPool,
        source: &TableId,
        record: &NormalizedRecord,
    ) -> SyncResult<()> {
        if self.logical_delete() {
            let covers_all = record.data.as_ref().is_some_and(|data| {
                !data.is_empty()
                    && self
                        .runtime(source)
                        .map(|r| r.meta.columns.iter().all(|c| data.contains_key(&c.name)))
                        .unwrap_or(false)
            });
            if covers_all {
                return self.apply_upsert(pool, source, record, true).await;
            }
            warn!(
                table = %source,
                "delete image incomplete, falling back to physical delete"
            );
        }

        let runtime = self.runtime(source)?;
        if runtime.delete_sql.is_empty() {
            if self.skip_delete_without_pk {
                warn!(table = %source, "skipping delete for table without primary key");
                return Ok(());
            }
            return Err(sync_error!(
                ErrorKind::MissingPrimaryKey,
                "Cannot delete from table without primary key",
                source.to_string()
            ));
        }

        let mut query = sqlx::query(&runtime.delete_sql);
        for pk in &runtime.meta.primary_keys {
            let value = record
                .key
                .get(pk)
                .or_else(|| record.data.as_ref().and_then(|d| d.get(pk)));
            let Some(value) = value else {
                return Err(sync_error!(
                    ErrorKind::InvalidData,
                    "Delete record is missing a primary key value",
                    format!("{source}: {pk}")
                ));
            };
            let doris_type = runtime
                .meta
                .column(pk)
                .map(|c| c.doris_type.as_str())
                .unwrap_or("STRING");
            query = coerce(Some(value), doris_type)?.bind(query);
        }
        query.execute(pool).await?;
        Ok(())
    }

    fn runtime(&self, source: &TableId) -> SyncResult<&TableRuntime> {
        self.cache.get(source).ok_or_else(|| {
            sync_error!(
                ErrorKind::InvalidState,
                "No cached statements for table",
                source.to_string()
            )
        })
    }
}

fn build_upsert_sql(
    target: &TargetTable,
    meta: &SourceTableMeta,
    logical_delete_column: Option<&str>,
) -> String {
    let mut columns: Vec<String> = meta.columns.iter().map(|c| backtick(&c.name)).collect();
    if let Some(sign) = logical_delete_column {
        columns.push(backtick(sign));
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        target.qualified_name(),
        columns.join(", "),
        placeholders
    )
}

fn build_delete_sql(target: &TargetTable, meta: &SourceTableMeta) -> String {
    if meta.primary_keys.is_empty() {
        return String::new();
    }
    let conditions = meta
        .primary_keys
        .iter()
        .map(|pk| format!("{} = ?", backtick(pk)))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!("DELETE FROM {} WHERE {}", target.qualified_name(), conditions)
}

/// Coerces a JSON value to the parameter type of a destination column.
pub(crate) fn coerce(value: Option<&Value>, doris_type: &str) -> SyncResult<BoundParam> {
    let Some(value) = value else {
        return Ok(BoundParam::Null);
    };
    if value.is_null() {
        return Ok(BoundParam::Null);
    }

    let upper = doris_type.to_uppercase();
    if upper.starts_with("BIGINT")
        || upper.starts_with("INT")
        || upper.starts_with("SMALLINT")
        || upper.starts_with("TINYINT")
    {
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        };
        return parsed.map(BoundParam::I64).ok_or_else(|| type_mismatch(value, doris_type));
    }
    if upper.starts_with("DOUBLE") || upper.starts_with("FLOAT") {
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        return parsed.map(BoundParam::F64).ok_or_else(|| type_mismatch(value, doris_type));
    }
    if upper.starts_with("DECIMAL") {
        let parsed = match value {
            Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
            Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
            _ => None,
        };
        return parsed
            .map(BoundParam::Decimal)
            .ok_or_else(|| type_mismatch(value, doris_type));
    }
    if upper.starts_with("BOOLEAN") {
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            Value::String(s) => parse_bool(s).ok(),
            _ => None,
        };
        return parsed.map(BoundParam::Bool).ok_or_else(|| type_mismatch(value, doris_type));
    }

    let text = match value {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => value.to_string(),
        other => other.to_string(),
    };
    Ok(BoundParam::Text(text))
}

fn type_mismatch(value: &Value, doris_type: &str) -> SyncError {
    sync_error!(
        ErrorKind::ConversionError,
        "Value cannot be bound to destination type",
        format!("{value} as {doris_type}")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::source::SourceColumn;
    use serde_json::json;

    fn column(name: &str, doris_type: &str) -> SourceColumn {
        SourceColumn {
            name: name.to_string(),
            data_type: String::new(),
            udt_name: String::new(),
            doris_type: doris_type.to_string(),
            nullable: true,
        }
    }

    fn meta(pks: &[&str]) -> SourceTableMeta {
        SourceTableMeta {
            id: TableId::new("public", "orders"),
            columns: vec![column("id", "INT"), column("qty", "DECIMAL(38,2)")],
            primary_keys: pks.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn upsert_sql_lists_all_columns() {
        let sql = build_upsert_sql(&TargetTable::new("cdc", "public__orders"), &meta(&["id"]), None);
        assert_eq!(
            sql,
            "INSERT INTO `cdc`.`public__orders` (`id`, `qty`) VALUES (?, ?)"
        );
    }

    #[test]
    fn upsert_sql_appends_logical_delete_sign() {
        let sql = build_upsert_sql(
            &TargetTable::new("cdc", "t"),
            &meta(&["id"]),
            Some("__DORIS_DELETE_SIGN__"),
        );
        assert_eq!(
            sql,
            "INSERT INTO `cdc`.`t` (`id`, `qty`, `__DORIS_DELETE_SIGN__`) VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn delete_sql_filters_on_every_primary_key() {
        let mut meta = meta(&["id"]);
        meta.primary_keys.push("qty".to_string());
        let sql = build_delete_sql(&TargetTable::new("cdc", "t"), &meta);
        assert_eq!(sql, "DELETE FROM `cdc`.`t` WHERE `id` = ? AND `qty` = ?");
    }

    #[test]
    fn delete_sql_empty_without_primary_keys() {
        assert_eq!(build_delete_sql(&TargetTable::new("cdc", "t"), &meta(&[])), "");
    }

    #[test]
    fn coerce_integers() {
        assert_eq!(coerce(Some(&json!(7)), "INT").unwrap(), BoundParam::I64(7));
        assert_eq!(coerce(Some(&json!("42")), "BIGINT").unwrap(), BoundParam::I64(42));
        assert_eq!(coerce(Some(&json!(true)), "TINYINT").unwrap(), BoundParam::I64(1));
        assert!(coerce(Some(&json!("abc")), "INT").is_err());
    }

    #[test]
    fn coerce_floats_and_decimals() {
        assert_eq!(coerce(Some(&json!(1.5)), "DOUBLE").unwrap(), BoundParam::F64(1.5));
        assert_eq!(
            coerce(Some(&json!("3.25")), "FLOAT").unwrap(),
            BoundParam::F64(3.25)
        );
        assert_eq!(
            coerce(Some(&json!("12.50")), "DECIMAL(38,2)").unwrap(),
            BoundParam::Decimal(BigDecimal::from_str("12.50").unwrap())
        );
    }

    #[test]
    fn coerce_booleans() {
        assert_eq!(coerce(Some(&json!(true)), "BOOLEAN").unwrap(), BoundParam::Bool(true));
        assert_eq!(coerce(Some(&json!("f")), "BOOLEAN").unwrap(), BoundParam::Bool(false));
        assert_eq!(coerce(Some(&json!(0)), "BOOLEAN").unwrap(), BoundParam::Bool(false));
    }

    #[test]
    fn coerce_nulls_and_text() {
        assert_eq!(coerce(None, "INT").unwrap(), BoundParam::Null);
        assert_eq!(coerce(Some(&json!(null)), "STRING").unwrap(), BoundParam::Null);
        assert_eq!(
            coerce(Some(&json!("hello")), "VARCHAR(10)").unwrap(),
            BoundParam::Text("hello".to_string())
        );
        assert_eq!(
            coerce(Some(&json!({"a": 1})), "STRING").unwrap(),
            BoundParam::Text("{\"a\":1}".to_string())
        );
    }
}

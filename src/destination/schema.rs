//! Destination DDL: databases, tables and additive column evolution.

use std::collections::HashSet;

use sqlx::mysql::MySqlPool;
use sqlx::Row;
use tracing::{debug, info};

use crate::config::DorisConfig;
use crate::destination::{TargetTable, backtick};
use crate::error::{ErrorKind, SyncResult};
use crate::replication::source::SourceTableMeta;
use crate::sync_error;

/// Creates and evolves destination objects ahead of the write path.
pub struct DorisAdmin {
    pool: MySqlPool,
    config: DorisConfig,
    /// Set when deletes are applied as logical sign updates.
    logical_delete_column: Option<String>,
}

impl DorisAdmin {
    pub fn new(pool: MySqlPool, config: DorisConfig, logical_delete_column: Option<String>) -> Self {
        Self {
            pool,
            config,
            logical_delete_column,
        }
    }

    pub async fn ensure_database(&self, database: &str) -> SyncResult<()> {
        if !self.config.auto_create_database {
            return Ok(());
        }
        let sql = format!("CREATE DATABASE IF NOT EXISTS {}", backtick(database));
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn table_exists(&self, target: &TargetTable) -> SyncResult<bool> {
        let sql = format!(
            "SHOW TABLES FROM {} LIKE '{}'",
            backtick(&target.database),
            target.table.replace('\'', "''")
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(!rows.is_empty())
    }

    /// Makes sure the destination table matches the source metadata.
    ///
    /// Creates the table when allowed, otherwise only adds columns the
    /// source has grown since creation. Destructive changes are never
    /// issued. A missing table with auto creation disabled is fatal for
    /// the table, not a per-record condition.
    pub async fn ensure_target_table(
        &self,
        target: &TargetTable,
        meta: &SourceTableMeta,
    ) -> SyncResult<()> {
        self.ensure_database(&target.database).await?;

        if self.table_exists(target).await? {
            if self.config.auto_add_columns {
                self.add_missing_columns(target, meta).await?;
            }
            return Ok(());
        }

        let sql = self.create_table_sql_for_missing(target, meta)?;
        sqlx::query(&sql).execute(&self.pool).await?;
        info!(target = %target, "created destination table");
        Ok(())
    }

    /// DDL for a table known to be absent, or an error when creation is
    /// disabled.
    pub(crate) fn create_table_sql_for_missing(
        &self,
        target: &TargetTable,
        meta: &SourceTableMeta,
    ) -> SyncResult<String> {
        if !self.config.auto_create_table {
            return Err(sync_error!(
                ErrorKind::DestinationError,
                "Destination table does not exist and auto creation is disabled",
                target.to_string()
            ));
        }
        Ok(self.build_create_table_sql(target, meta))
    }

    pub(crate) fn build_create_table_sql(
        &self,
        target: &TargetTable,
        meta: &SourceTableMeta,
    ) -> String {
        let mut column_defs: Vec<String> = meta
            .columns
            .iter()
            .map(|c| {
                format!(
                    "{} {} {}",
                    backtick(&c.name),
                    c.doris_type,
                    if c.nullable { "NULL" } else { "NOT NULL" }
                )
            })
            .collect();
        if let Some(sign) = &self.logical_delete_column {
            let exists = meta.columns.iter().any(|c| c.name.eq_ignore_ascii_case(sign));
            if !exists {
                column_defs.push(format!("{} TINYINT NOT NULL DEFAULT 0", backtick(sign)));
            }
        }

        let dist_column = meta
            .primary_keys
            .first()
            .or_else(|| meta.columns.first().map(|c| &c.name))
            .cloned()
            .unwrap_or_default();

        let (key_clause, properties) = if meta.primary_keys.is_empty() {
            (
                format!("DUPLICATE KEY({})", backtick(&dist_column)),
                format!("\"replication_num\" = \"{}\"", self.config.replication_num),
            )
        } else {
            let keys = meta
                .primary_keys
                .iter()
                .map(|k| backtick(k))
                .collect::<Vec<_>>()
                .join(", ");
            (
                format!("UNIQUE KEY({keys})"),
                format!(
                    "\"replication_num\" = \"{}\", \"enable_unique_key_merge_on_write\" = \"true\"",
                    self.config.replication_num
                ),
            )
        };

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n) {}\nDISTRIBUTED BY HASH({}) BUCKETS {}\nPROPERTIES ({})",
            target.qualified_name(),
            column_defs.join(",\n"),
            key_clause,
            backtick(&dist_column),
            self.config.buckets,
            properties
        )
    }

    /// Adds source columns the destination table does not have yet.
    pub async fn add_missing_columns(
        &self,
        target: &TargetTable,
        meta: &SourceTableMeta,
    ) -> SyncResult<()> {
        let sql = format!("SHOW COLUMNS FROM {}", target.qualified_name());
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let existing: HashSet<String> = rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>(0).ok())
            .map(|name| name.to_lowercase())
            .collect();

        for column in &meta.columns {
            if existing.contains(&column.name.to_lowercase()) {
                continue;
            }
            let sql = format!(
                "ALTER TABLE {} ADD COLUMN {} {} NULL",
                target.qualified_name(),
                backtick(&column.name),
                column.doris_type
            );
            sqlx::query(&sql).execute(&self.pool).await?;
            info!(target = %target, column = %column.name, "added destination column");
        }
        Ok(())
    }

    /// Drops and truncates destination tables once at bootstrap.
    ///
    /// Every touched database is ensured first so the DDL cannot fail on
    /// a database that auto creation would have produced later. Truncates
    /// silently skip tables that do not exist yet.
    pub async fn apply_startup_actions(
        &self,
        drop_targets: &[TargetTable],
        truncate_targets: &[TargetTable],
    ) -> SyncResult<()> {
        for database in startup_databases(drop_targets, truncate_targets) {
            self.ensure_database(database).await?;
        }
        for target in drop_targets {
            let sql = format!("DROP TABLE IF EXISTS {}", target.qualified_name());
            sqlx::query(&sql).execute(&self.pool).await?;
            info!(target = %target, "dropped destination table at startup");
        }
        for target in truncate_targets {
            if !self.table_exists(target).await? {
                debug!(target = %target, "skipping truncate, table does not exist");
                continue;
            }
            let sql = format!("TRUNCATE TABLE {}", target.qualified_name());
            sqlx::query(&sql).execute(&self.pool).await?;
            info!(target = %target, "truncated destination table at startup");
        }
        Ok(())
    }
}

/// Distinct databases referenced by the startup targets, in first-seen
/// order.
pub(crate) fn startup_databases<'a>(
    drop_targets: &'a [TargetTable],
    truncate_targets: &'a [TargetTable],
) -> Vec<&'a str> {
    let mut databases: Vec<&str> = Vec::new();
    for target in drop_targets.iter().chain(truncate_targets) {
        if !databases.contains(&target.database.as_str()) {
            databases.push(&target.database);
        }
    }
    databases
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::source::SourceColumn;
    use crate::types::TableId;

    fn column(name: &str, doris_type: &str, nullable: bool) -> SourceColumn {
        SourceColumn {
            name: name.to_string(),
            data_type: String::new(),
            udt_name: String::new(),
            doris_type: doris_type.to_string(),
            nullable,
        }
    }

    fn admin(logical_delete_column: Option<&str>) -> DorisAdmin {
        DorisAdmin {
            pool: MySqlPool::connect_lazy("mysql://root@localhost:9030/cdc")
                .expect("lazy pool"),
            config: DorisConfig {
                host: "localhost".to_string(),
                port: 9030,
                username: "root".to_string(),
                password: String::new(),
                auto_create_database: true,
                auto_create_table: true,
                auto_add_columns: true,
                buckets: 10,
                replication_num: 1,
                startup_drop_tables: vec![],
                startup_truncate_tables: vec![],
                startup_drop_all_included: false,
                startup_truncate_all_included: false,
            },
            logical_delete_column: logical_delete_column.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_table_with_primary_key_uses_unique_key() {
        let meta = SourceTableMeta {
            id: TableId::new("public", "orders"),
            columns: vec![
                column("id", "INT", false),
                column("qty", "DECIMAL(38,2)", true),
            ],
            primary_keys: vec!["id".to_string()],
        };
        let sql = admin(None)
            .build_create_table_sql(&TargetTable::new("cdc", "public__orders"), &meta);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS `cdc`.`public__orders`"));
        assert!(sql.contains("`id` INT NOT NULL"));
        assert!(sql.contains("`qty` DECIMAL(38,2) NULL"));
        assert!(sql.contains("UNIQUE KEY(`id`)"));
        assert!(sql.contains("DISTRIBUTED BY HASH(`id`) BUCKETS 10"));
        assert!(sql.contains("\"enable_unique_key_merge_on_write\" = \"true\""));
    }

    #[tokio::test]
    async fn create_table_without_primary_key_uses_duplicate_key() {
        let meta = SourceTableMeta {
            id: TableId::new("public", "events"),
            columns: vec![column("ts", "DATETIME", true), column("msg", "STRING", true)],
            primary_keys: vec![],
        };
        let sql =
            admin(None).build_create_table_sql(&TargetTable::new("cdc", "public__events"), &meta);
        assert!(sql.contains("DUPLICATE KEY(`ts`)"));
        assert!(sql.contains("DISTRIBUTED BY HASH(`ts`)"));
        assert!(!sql.contains("enable_unique_key_merge_on_write"));
    }

    #[tokio::test]
    async fn logical_delete_column_appended_once() {
        let meta = SourceTableMeta {
            id: TableId::new("public", "orders"),
            columns: vec![column("id", "INT", false)],
            primary_keys: vec!["id".to_string()],
        };
        let sql = admin(Some("__DORIS_DELETE_SIGN__"))
            .build_create_table_sql(&TargetTable::new("cdc", "t"), &meta);
        assert!(sql.contains("`__DORIS_DELETE_SIGN__` TINYINT NOT NULL DEFAULT 0"));

        // Not duplicated when the source already carries the column.
        let meta = SourceTableMeta {
            id: TableId::new("public", "orders"),
            columns: vec![
                column("id", "INT", false),
                column("__doris_delete_sign__", "TINYINT", false),
            ],
            primary_keys: vec!["id".to_string()],
        };
        let sql = admin(Some("__DORIS_DELETE_SIGN__"))
            .build_create_table_sql(&TargetTable::new("cdc", "t"), &meta);
        assert_eq!(sql.matches("TINYINT").count(), 1);
    }

    #[tokio::test]
    async fn missing_table_without_auto_create_is_an_error() {
        crate::telemetry::init_test_tracing();
        let meta = SourceTableMeta {
            id: TableId::new("public", "orders"),
            columns: vec![column("id", "INT", false)],
            primary_keys: vec!["id".to_string()],
        };
        let target = TargetTable::new("cdc", "public__orders");

        let mut admin = admin(None);
        admin.config.auto_create_table = false;
        let err = admin
            .create_table_sql_for_missing(&target, &meta)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DestinationError);
        assert_eq!(err.detail(), Some("cdc.public__orders"));

        admin.config.auto_create_table = true;
        let sql = admin.create_table_sql_for_missing(&target, &meta).unwrap();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS"));
    }

    #[test]
    fn startup_databases_cover_both_action_lists() {
        let drops = vec![
            TargetTable::new("cdc", "public__orders"),
            TargetTable::new("audit", "public__log"),
        ];
        let truncates = vec![
            TargetTable::new("cdc", "public__events"),
            TargetTable::new("stage", "public__tmp"),
        ];
        assert_eq!(
            startup_databases(&drops, &truncates),
            vec!["cdc", "audit", "stage"]
        );
    }

    #[tokio::test]
    async fn create_table_respects_replication_num() {
        let meta = SourceTableMeta {
            id: TableId::new("public", "orders"),
            columns: vec![column("id", "INT", false)],
            primary_keys: vec![],
        };
        let mut admin = admin(None);
        admin.config.replication_num = 3;
        let sql = admin.build_create_table_sql(&TargetTable::new("cdc", "t"), &meta);
        assert!(sql.contains("\"replication_num\" = \"3\""));
    }
}

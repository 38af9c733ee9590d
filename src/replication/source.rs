//! Source database administration: slots, replica identity and metadata.

use std::collections::HashMap;
use std::sync::Arc;

use pg_escape::quote_identifier;
use tokio_postgres::Client;
use tracing::{info, warn};

use crate::config::SourceConfig;
use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::sync_error;
use crate::types::TableId;
use crate::types::catalog::{TypeCatalog, TypeKind, doris_type_for};

/// One source column with its destination type already mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
    pub doris_type: String,
    pub nullable: bool,
}

/// Cached metadata for one source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTableMeta {
    pub id: TableId,
    pub columns: Vec<SourceColumn>,
    pub primary_keys: Vec<String>,
}

impl SourceTableMeta {
    pub fn column(&self, name: &str) -> Option<&SourceColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Administrative access to the source database.
///
/// Table metadata is memoized per instance; the pipeline owns the single
/// admin and all cache writes go through it.
pub struct SourceAdmin {
    client: Client,
    config: SourceConfig,
    meta_cache: HashMap<TableId, Arc<SourceTableMeta>>,
}

impl SourceAdmin {
    pub fn new(client: Client, config: SourceConfig) -> Self {
        Self {
            client,
            config,
            meta_cache: HashMap::new(),
        }
    }

    /// Creates or recreates the replication slot according to configuration.
    pub async fn init_slot_if_needed(&self) -> SyncResult<()> {
        if self.config.slot_recreate {
            self.drop_slot().await;
            self.create_slot().await?;
            return Ok(());
        }
        if !self.config.slot_init {
            return Ok(());
        }
        if self.slot_exists().await {
            info!(slot = %self.config.slot_name, "replication slot already exists");
            return Ok(());
        }
        self.create_slot().await
    }

    /// Checks both catalog spellings for the slot; query failures count as
    /// the slot not existing.
    pub async fn slot_exists(&self) -> bool {
        for table in [
            "sys_catalog.sys_replication_slots",
            "pg_catalog.pg_replication_slots",
        ] {
            let sql = format!("SELECT 1 FROM {table} WHERE slot_name = $1");
            if let Ok(rows) = self.client.query(&sql, &[&self.config.slot_name]).await {
                if !rows.is_empty() {
                    return true;
                }
            }
        }
        false
    }

    async fn create_slot(&self) -> SyncResult<()> {
        let args: [&(dyn tokio_postgres::types::ToSql + Sync); 2] =
            [&self.config.slot_name, &self.config.plugin];
        let sys = self
            .client
            .execute(
                "SELECT sys_create_logical_replication_slot($1, $2)",
                &args,
            )
            .await;
        if sys.is_err() {
            self.client
                .execute("SELECT pg_create_logical_replication_slot($1, $2)", &args)
                .await
                .map_err(SyncError::from)?;
        }
        info!(
            slot = %self.config.slot_name,
            plugin = %self.config.plugin,
            "created replication slot"
        );
        Ok(())
    }

    async fn drop_slot(&self) {
        let args: [&(dyn tokio_postgres::types::ToSql + Sync); 1] = [&self.config.slot_name];
        let sys = self
            .client
            .execute("SELECT sys_drop_replication_slot($1)", &args)
            .await;
        if sys.is_err() {
            let pg = self
                .client
                .execute("SELECT pg_drop_replication_slot($1)", &args)
                .await;
            if pg.is_err() {
                warn!(slot = %self.config.slot_name, "could not drop replication slot");
            }
        }
    }

    /// Forces `REPLICA IDENTITY FULL` on the resolved target tables.
    pub async fn apply_replica_identity_full(&self) -> SyncResult<()> {
        if !self.config.replica_identity_full {
            return Ok(());
        }

        let targets = if !self.config.replica_identity_full_tables.is_empty() {
            self.config.replica_identity_tables()
        } else {
            self.resolve_sync_targets().await?
        };

        for table in targets {
            let sql = format!(
                "ALTER TABLE {}.{} REPLICA IDENTITY FULL",
                quote_identifier(&table.schema),
                quote_identifier(&table.table)
            );
            if let Err(e) = self.client.execute(&sql, &[]).await {
                if self.config.replica_identity_full_fail_fast {
                    return Err(sync_error!(
                        ErrorKind::SourceQueryFailed,
                        "Failed to set replica identity",
                        format!("{table}: {e}")
                    ));
                }
                warn!(table = %table, error = %e, "failed to set replica identity");
            } else {
                info!(table = %table, "set replica identity to FULL");
            }
        }
        Ok(())
    }

    /// Tables in scope for this pipeline: the explicit include list, or
    /// every table in the included schemas.
    pub async fn resolve_sync_targets(&self) -> SyncResult<Vec<TableId>> {
        let included = self.config.included_tables();
        if !included.is_empty() {
            return Ok(included);
        }
        self.list_tables_by_schemas(&self.config.schema_include_list)
            .await
    }

    pub async fn list_tables_by_schemas(&self, schemas: &[String]) -> SyncResult<Vec<TableId>> {
        if schemas.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .client
            .query(
                "SELECT table_schema, table_name FROM information_schema.tables \
                 WHERE table_schema = ANY($1) \
                 AND table_type IN ('BASE TABLE', 'FOREIGN TABLE') \
                 ORDER BY table_schema, table_name",
                &[&schemas],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| TableId::new(row.get::<_, String>(0), row.get::<_, String>(1)))
            .collect())
    }

    /// Loads column and primary key metadata for a table, memoized.
    pub async fn load_table_meta(&mut self, id: &TableId) -> SyncResult<Arc<SourceTableMeta>> {
        if let Some(meta) = self.meta_cache.get(id) {
            return Ok(meta.clone());
        }

        let rows = self
            .client
            .query(
                "SELECT column_name, data_type, udt_name, numeric_precision, numeric_scale, \
                 character_maximum_length, is_nullable \
                 FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 \
                 ORDER BY ordinal_position",
                &[&id.schema, &id.table],
            )
            .await?;
        if rows.is_empty() {
            return Err(sync_error!(
                ErrorKind::MissingTableMetadata,
                "Source table has no columns",
                id.to_string()
            ));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.get(0);
            let data_type: String = row.get(1);
            let udt_name: String = row.get(2);
            let numeric_scale: Option<i32> = row.get(4);
            let char_len: Option<i32> = row.get(5);
            let is_nullable: String = row.get(6);

            let source_type = column_source_type(&data_type, &udt_name);
            let doris_type =
                doris_type_for(source_type, numeric_scale, char_len.map(i64::from));
            columns.push(SourceColumn {
                name,
                data_type,
                udt_name,
                doris_type,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
            });
        }

        let pk_rows = self
            .client
            .query(
                "SELECT kcu.column_name \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                   ON tc.constraint_name = kcu.constraint_name \
                  AND tc.table_schema = kcu.table_schema \
                 WHERE tc.constraint_type = 'PRIMARY KEY' \
                   AND tc.table_schema = $1 AND tc.table_name = $2 \
                 ORDER BY kcu.ordinal_position",
                &[&id.schema, &id.table],
            )
            .await?;
        let primary_keys = pk_rows.iter().map(|row| row.get::<_, String>(0)).collect();

        let meta = Arc::new(SourceTableMeta {
            id: id.clone(),
            columns,
            primary_keys,
        });
        self.meta_cache.insert(id.clone(), meta.clone());
        Ok(meta)
    }

    /// Registers user-defined enums and domains so the resolver can see
    /// through them.
    pub async fn load_custom_types(&self, catalog: &mut TypeCatalog) -> SyncResult<()> {
        let rows = self
            .client
            .query(
                "SELECT t.oid, t.typname, t.typtype, t.typbasetype \
                 FROM pg_catalog.pg_type t \
                 WHERE t.oid >= 16384 AND t.typtype IN ('e', 'd')",
                &[],
            )
            .await?;
        for row in &rows {
            let oid: u32 = row.get(0);
            let name: String = row.get(1);
            let typtype: i8 = row.get(2);
            match typtype as u8 {
                b'e' => catalog.register(oid, name, TypeKind::Enum),
                b'd' => {
                    let parent: u32 = row.get(3);
                    catalog.register(oid, name, TypeKind::Alias { parent });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Prefers the concrete type name when the generic one hides it.
fn column_source_type<'a>(data_type: &'a str, udt_name: &'a str) -> &'a str {
    if data_type.eq_ignore_ascii_case("USER-DEFINED") || data_type.eq_ignore_ascii_case("ARRAY") {
        udt_name
    } else {
        data_type
    }
}

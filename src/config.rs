use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TableId;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The replication slot name cannot be empty when slot management is enabled.
    #[error("`slot_name` cannot be empty when `slot_init` is true")]
    MissingSlotName,
    /// Bucket count for created tables cannot be zero.
    #[error("`buckets` cannot be zero")]
    BucketsZero,
    /// Replication factor for created tables cannot be zero.
    #[error("`replication_num` cannot be zero")]
    ReplicationNumZero,
    /// The secondary sink flushes in batches, so the batch size cannot be zero.
    #[error("`batch_size` cannot be zero")]
    BatchSizeZero,
    /// Logical delete mode needs a marker column name.
    #[error("`logical_delete_column` cannot be empty when `delete_mode` is `logical_delete_sign`")]
    MissingLogicalDeleteColumn,
    /// Source table references must be `schema.table`.
    #[error("invalid table reference `{0}`: expected `schema.table`")]
    InvalidTableReference(String),
}

/// Top-level configuration for a sync pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Logical name of this connector instance, used in destination labels.
    #[serde(default = "default_connector_name")]
    pub connector_name: String,
    pub source: SourceConfig,
    pub destination: DorisConfig,
    #[serde(default)]
    pub route: RouteConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub debug: DebugFlags,
}

impl PipelineConfig {
    /// Validates the whole configuration tree.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.destination.validate()?;
        self.sink.validate()?;

        Ok(())
    }
}

/// Connection and replication settings for the source database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub host: String,
    #[serde(default = "default_source_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    /// Logical replication slot consumed by this pipeline.
    #[serde(default = "default_slot_name")]
    pub slot_name: String,
    /// Output plugin bound to the slot when it is created.
    #[serde(default = "default_plugin")]
    pub plugin: String,
    /// Create the slot at bootstrap when it does not exist.
    #[serde(default = "default_true")]
    pub slot_init: bool,
    /// Drop and recreate the slot at bootstrap.
    #[serde(default)]
    pub slot_recreate: bool,
    /// Enforce `REPLICA IDENTITY FULL` on the resolved table list at bootstrap.
    #[serde(default)]
    pub replica_identity_full: bool,
    /// Abort bootstrap on the first replica identity failure instead of warning.
    #[serde(default)]
    pub replica_identity_full_fail_fast: bool,
    /// Explicit `schema.table` targets for replica identity enforcement.
    #[serde(default)]
    pub replica_identity_full_tables: Vec<String>,
    /// `schema.table` entries limiting the sync scope.
    #[serde(default)]
    pub table_include_list: Vec<String>,
    /// Schemas limiting the sync scope when no explicit table list is given.
    #[serde(default)]
    pub schema_include_list: Vec<String>,
    /// Resolve values of unknown source types to their raw string form.
    #[serde(default = "default_true")]
    pub include_unknown_types: bool,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.slot_init && self.slot_name.trim().is_empty() {
            return Err(ValidationError::MissingSlotName);
        }
        for raw in self
            .replica_identity_full_tables
            .iter()
            .chain(self.table_include_list.iter())
        {
            TableId::parse(raw)
                .map_err(|_| ValidationError::InvalidTableReference(raw.clone()))?;
        }

        Ok(())
    }

    /// Parsed `schema.table` include list, in declaration order.
    pub fn included_tables(&self) -> Vec<TableId> {
        parse_table_refs(&self.table_include_list)
    }

    /// Parsed replica identity target list, in declaration order.
    pub fn replica_identity_tables(&self) -> Vec<TableId> {
        parse_table_refs(&self.replica_identity_full_tables)
    }
}

/// Connection and DDL settings for the Doris destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DorisConfig {
    pub host: String,
    #[serde(default = "default_doris_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Create missing databases before writing.
    #[serde(default = "default_true")]
    pub auto_create_database: bool,
    /// Create missing tables from source metadata before writing.
    #[serde(default = "default_true")]
    pub auto_create_table: bool,
    /// Issue additive `ALTER TABLE ... ADD COLUMN` for source columns missing downstream.
    #[serde(default = "default_true")]
    pub auto_add_columns: bool,
    /// Bucket count used by `DISTRIBUTED BY HASH` for created tables.
    #[serde(default = "default_buckets")]
    pub buckets: u32,
    /// Replica count property for created tables.
    #[serde(default = "default_replication_num")]
    pub replication_num: u32,
    /// `schema.table` sources whose destination tables are dropped at bootstrap.
    #[serde(default)]
    pub startup_drop_tables: Vec<String>,
    /// `schema.table` sources whose destination tables are truncated at bootstrap.
    #[serde(default)]
    pub startup_truncate_tables: Vec<String>,
    /// Drop the destination tables of every included source table at bootstrap.
    #[serde(default)]
    pub startup_drop_all_included: bool,
    /// Truncate the destination tables of every included source table at bootstrap.
    #[serde(default)]
    pub startup_truncate_all_included: bool,
}

impl DorisConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.buckets == 0 {
            return Err(ValidationError::BucketsZero);
        }
        if self.replication_num == 0 {
            return Err(ValidationError::ReplicationNumZero);
        }
        for raw in self
            .startup_drop_tables
            .iter()
            .chain(self.startup_truncate_tables.iter())
        {
            TableId::parse(raw)
                .map_err(|_| ValidationError::InvalidTableReference(raw.clone()))?;
        }

        Ok(())
    }

    pub fn startup_drop_targets(&self) -> Vec<TableId> {
        parse_table_refs(&self.startup_drop_tables)
    }

    pub fn startup_truncate_targets(&self) -> Vec<TableId> {
        parse_table_refs(&self.startup_truncate_tables)
    }
}

/// How source tables map to destination databases and tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    /// Fixed destination database; table names carry the source schema as a prefix.
    SchemaTable,
    /// One destination database per source schema.
    SchemaAsDb,
}

/// Naming rules applied when routing a source table to its destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default = "default_route_mode")]
    pub mode: RouteMode,
    /// Destination database for [`RouteMode::SchemaTable`].
    #[serde(default = "default_database")]
    pub database: String,
    /// Database name prefix for [`RouteMode::SchemaAsDb`].
    #[serde(default = "default_database_prefix")]
    pub database_prefix: String,
    #[serde(default)]
    pub table_prefix: String,
    #[serde(default)]
    pub table_suffix: String,
    /// Joins schema and table in [`RouteMode::SchemaTable`] names.
    #[serde(default = "default_separator")]
    pub schema_table_separator: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            mode: default_route_mode(),
            database: default_database(),
            database_prefix: default_database_prefix(),
            table_prefix: String::new(),
            table_suffix: String::new(),
            schema_table_separator: default_separator(),
        }
    }
}

/// Which outputs a pipeline produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// DML against the destination only.
    JdbcDml,
    /// Enhanced JSON batches only.
    EnhancedJson,
    /// Both outputs.
    Both,
}

impl OutputMode {
    pub fn has_dml_output(&self) -> bool {
        matches!(self, OutputMode::JdbcDml | OutputMode::Both)
    }

    pub fn has_enhanced_json_output(&self) -> bool {
        matches!(self, OutputMode::EnhancedJson | OutputMode::Both)
    }
}

/// How delete events are applied downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// `DELETE` by primary key.
    PhysicalDelete,
    /// Upsert with the logical delete marker set.
    LogicalDeleteSign,
}

/// How deltas behave when one side of a changed field is not numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaNullPolicy {
    /// Omit the field from the delta mapping.
    Skip,
    /// Substitute zero for the non-numeric side.
    Zero,
}

/// Write-path behavior shared by the DML writer and the secondary sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_output_mode")]
    pub output_mode: OutputMode,
    #[serde(default = "default_delete_mode")]
    pub delete_mode: DeleteMode,
    /// Marker column appended under [`DeleteMode::LogicalDeleteSign`].
    #[serde(default = "default_logical_delete_column")]
    pub logical_delete_column: String,
    /// Warn and drop delete events when the destination table has no primary key.
    #[serde(default = "default_true")]
    pub skip_delete_without_pk: bool,
    /// Rows buffered before the secondary sink flushes a batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// File receiving one JSON array per flushed batch; unset disables file output.
    #[serde(default)]
    pub output_file: Option<String>,
    #[serde(default = "default_delta_null_policy")]
    pub delta_null_policy: DeltaNullPolicy,
    #[serde(default = "default_true")]
    pub include_changed_fields: bool,
    #[serde(default = "default_true")]
    pub include_deltas: bool,
    /// Treat tombstones as deletes of their key instead of inert markers.
    #[serde(default)]
    pub tombstone_as_delete: bool,
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::BatchSizeZero);
        }
        if self.delete_mode == DeleteMode::LogicalDeleteSign
            && self.logical_delete_column.trim().is_empty()
        {
            return Err(ValidationError::MissingLogicalDeleteColumn);
        }

        Ok(())
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_mode: default_output_mode(),
            delete_mode: default_delete_mode(),
            logical_delete_column: default_logical_delete_column(),
            skip_delete_without_pk: true,
            batch_size: default_batch_size(),
            output_file: None,
            delta_null_policy: default_delta_null_policy(),
            include_changed_fields: true,
            include_deltas: true,
            tombstone_as_delete: false,
        }
    }
}

/// Diagnostic switches threaded through the pipeline explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebugFlags {
    /// Fail on undecodable replication messages instead of skipping them.
    #[serde(default)]
    pub strict_wal_parse: bool,
    /// Log a hex preview of every raw replication message.
    #[serde(default)]
    pub log_raw_wal: bool,
}

fn parse_table_refs(raw: &[String]) -> Vec<TableId> {
    let mut seen = Vec::new();
    for item in raw {
        if let Ok(id) = TableId::parse(item) {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
    }
    seen
}

fn default_connector_name() -> String {
    "pg2doris".to_string()
}

fn default_source_port() -> u16 {
    5432
}

fn default_slot_name() -> String {
    "pg2doris_slot".to_string()
}

fn default_plugin() -> String {
    "decoderbufs".to_string()
}

fn default_doris_port() -> u16 {
    9030
}

fn default_buckets() -> u32 {
    10
}

fn default_replication_num() -> u32 {
    1
}

fn default_route_mode() -> RouteMode {
    RouteMode::SchemaTable
}

fn default_database() -> String {
    "cdc".to_string()
}

fn default_database_prefix() -> String {
    "cdc_".to_string()
}

fn default_separator() -> String {
    "__".to_string()
}

fn default_output_mode() -> OutputMode {
    OutputMode::JdbcDml
}

fn default_delete_mode() -> DeleteMode {
    DeleteMode::PhysicalDelete
}

fn default_logical_delete_column() -> String {
    "__DORIS_DELETE_SIGN__".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_delta_null_policy() -> DeltaNullPolicy {
    DeltaNullPolicy::Skip
}

fn default_true() -> bool {
    true
}

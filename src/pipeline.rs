//! The sync pipeline: decode, resolve, normalize, route and apply.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use tokio_postgres::NoTls;
use tracing::{error, info, warn};

use crate::config::{DeleteMode, PipelineConfig};
use crate::conversions::normalizer::{ChangeEnvelope, ChangeNormalizer, NormalizedRecord};
use crate::conversions::resolver::ValueResolver;
use crate::destination::emitter::EnhancedJsonEmitter;
use crate::destination::schema::DorisAdmin;
use crate::destination::writer::SinkWriter;
use crate::destination::TargetTable;
use crate::error::SyncResult;
use crate::replication::decoder::WalDecoder;
use crate::replication::source::{SourceAdmin, SourceTableMeta};
use crate::router::TableRouter;
use crate::types::catalog::TypeCatalog;
use crate::types::{ChangeOp, ColumnChange, Datum, RowChange, TableId};

/// A connected sync pipeline.
///
/// The caller owns the replication stream and feeds payloads through
/// [`Pipeline::on_message`] sequentially; delivery is at-least-once and the
/// write path is idempotent.
pub struct Pipeline {
    config: PipelineConfig,
    catalog: TypeCatalog,
    decoder: WalDecoder,
    resolver: ValueResolver,
    normalizer: ChangeNormalizer,
    router: TableRouter,
    source: SourceAdmin,
    doris: DorisAdmin,
    pool: MySqlPool,
    writer: SinkWriter,
    emitter: Option<EnhancedJsonEmitter>,
    ensured_tables: HashSet<TableId>,
}

impl Pipeline {
    /// Validates the configuration and connects to both databases.
    pub async fn connect(config: PipelineConfig) -> SyncResult<Self> {
        config.validate()?;

        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.source.host)
            .port(config.source.port)
            .user(&config.source.username)
            .password(&config.source.password)
            .dbname(&config.source.database);
        let (client, connection) = pg.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "source connection closed");
            }
        });

        let options = MySqlConnectOptions::new()
            .host(&config.destination.host)
            .port(config.destination.port)
            .username(&config.destination.username)
            .password(&config.destination.password);
        let pool = MySqlPoolOptions::new().connect_lazy_with(options);

        let logical_delete_column = (config.sink.delete_mode == DeleteMode::LogicalDeleteSign)
            .then(|| config.sink.logical_delete_column.clone());

        let emitter = if config.sink.output_mode.has_enhanced_json_output() {
            Some(EnhancedJsonEmitter::new(&config.sink)?)
        } else {
            None
        };

        Ok(Self {
            catalog: TypeCatalog::new(),
            decoder: WalDecoder::new(config.debug.strict_wal_parse, config.debug.log_raw_wal),
            resolver: ValueResolver::new(config.source.include_unknown_types),
            normalizer: ChangeNormalizer::new(
                config.sink.delta_null_policy,
                config.sink.include_changed_fields,
                config.sink.include_deltas,
                config.sink.tombstone_as_delete,
            ),
            router: TableRouter::new(config.route.clone()),
            source: SourceAdmin::new(client, config.source.clone()),
            doris: DorisAdmin::new(pool.clone(), config.destination.clone(), logical_delete_column),
            pool,
            writer: SinkWriter::new(&config.sink),
            emitter,
            ensured_tables: HashSet::new(),
            config,
        })
    }

    /// Runs one-time source and destination preparation before streaming.
    pub async fn bootstrap(&mut self) -> SyncResult<()> {
        self.source.init_slot_if_needed().await?;
        self.source.load_custom_types(&mut self.catalog).await?;
        self.source.apply_replica_identity_full().await?;

        let included = if self.config.destination.startup_drop_all_included
            || self.config.destination.startup_truncate_all_included
        {
            self.source.resolve_sync_targets().await?
        } else {
            Vec::new()
        };

        let drops = self.startup_targets(
            self.config.destination.startup_drop_targets(),
            self.config.destination.startup_drop_all_included,
            &included,
        );
        let truncates = self.startup_targets(
            self.config.destination.startup_truncate_targets(),
            self.config.destination.startup_truncate_all_included,
            &included,
        );
        self.doris.apply_startup_actions(&drops, &truncates).await?;

        info!("pipeline bootstrap complete");
        Ok(())
    }

    fn startup_targets(
        &self,
        explicit: Vec<TableId>,
        all_included: bool,
        included: &[TableId],
    ) -> Vec<TargetTable> {
        let mut sources = explicit;
        if all_included {
            for id in included {
                if !sources.contains(id) {
                    sources.push(id.clone());
                }
            }
        }
        let mut targets = Vec::new();
        for id in &sources {
            let target = self.router.route(id);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }

    /// Processes one replication payload.
    ///
    /// Transaction markers and dropped messages return without output.
    /// Decode failures follow the strict-parse setting; failures applying
    /// an individual record are logged with their table and operation and
    /// the record is dropped.
    pub async fn on_message(&mut self, buf: &[u8]) -> SyncResult<()> {
        let Some(change) = self.decoder.decode(buf)? else {
            return Ok(());
        };
        if change.op.is_transactional_marker() {
            return Ok(());
        }
        let Some(table_id) = change.table_id() else {
            warn!("skipping row change without a table name");
            return Ok(());
        };

        let op = change.op.as_op_str();
        if let Err(e) = self.apply_change(&table_id, change).await {
            error!(table = %table_id, op, error = %e, "dropping record after apply failure");
        }
        Ok(())
    }

    async fn apply_change(&mut self, table_id: &TableId, change: RowChange) -> SyncResult<()> {
        let meta = self.source.load_table_meta(table_id).await?;

        let after = resolve_columns(
            &mut self.resolver,
            &self.catalog,
            &change.new_columns,
            &meta,
        )?;
        let before = resolve_columns(
            &mut self.resolver,
            &self.catalog,
            &change.old_columns,
            &meta,
        )?;

        let deleted = change.op == ChangeOp::Delete;
        let key = key_from_images(&meta, before.as_ref(), after.as_ref(), deleted);

        let envelope = ChangeEnvelope {
            op: change.op.as_op_str().to_string(),
            key,
            before,
            after,
            tombstone: false,
            table: table_id.to_string(),
            destination: format!("{}.{}", self.config.connector_name, table_id),
        };
        let record = self.normalizer.normalize(envelope);

        self.dispatch(table_id, &meta, &record).await
    }

    /// Feeds a key-only tombstone through the same normalization and write
    /// path as decoded changes.
    pub async fn on_tombstone(
        &mut self,
        table_id: &TableId,
        key: Map<String, Value>,
    ) -> SyncResult<()> {
        let meta = self.source.load_table_meta(table_id).await?;
        let envelope = ChangeEnvelope {
            op: String::new(),
            key,
            before: None,
            after: None,
            tombstone: true,
            table: table_id.to_string(),
            destination: format!("{}.{}", self.config.connector_name, table_id),
        };
        let record = self.normalizer.normalize(envelope);
        if let Err(e) = self.dispatch(table_id, &meta, &record).await {
            error!(table = %table_id, op = "t", error = %e, "dropping tombstone after apply failure");
        }
        Ok(())
    }

    async fn dispatch(
        &mut self,
        table_id: &TableId,
        meta: &Arc<SourceTableMeta>,
        record: &NormalizedRecord,
    ) -> SyncResult<()> {
        if self.config.sink.output_mode.has_dml_output() {
            let target = self.router.route(table_id);
            if self.ensured_tables.insert(table_id.clone()) {
                self.doris.ensure_target_table(&target, meta).await?;
            }
            self.writer
                .apply(&self.pool, table_id, &target, meta, record)
                .await?;
        }
        if let Some(emitter) = &self.emitter {
            emitter.append(record.to_enhanced_json())?;
        }
        Ok(())
    }

    /// Flushes buffered output; call once when the stream ends.
    pub fn close(&self) -> SyncResult<()> {
        if let Some(emitter) = &self.emitter {
            emitter.close()?;
        }
        Ok(())
    }
}

/// Resolves a tuple into an ordered column mapping.
///
/// Missing datums (unchanged TOAST values) are left out entirely; explicit
/// nulls appear as JSON null.
fn resolve_columns(
    resolver: &mut ValueResolver,
    catalog: &TypeCatalog,
    columns: &[ColumnChange],
    meta: &SourceTableMeta,
) -> SyncResult<Option<Map<String, Value>>> {
    if columns.is_empty() {
        return Ok(None);
    }
    let mut map = Map::new();
    for column in columns {
        if matches!(column.datum, Datum::Missing) {
            continue;
        }
        let full_type_name = meta
            .column(&column.name)
            .map(|c| c.data_type.as_str())
            .unwrap_or("");
        let value = resolver.resolve(
            &column.name,
            column.type_oid,
            full_type_name,
            &column.datum,
            catalog,
        )?;
        map.insert(
            column.name.clone(),
            value.map(|v| v.into_json()).unwrap_or(Value::Null),
        );
    }
    Ok(Some(map))
}

/// Builds the primary key mapping from the row images.
fn key_from_images(
    meta: &SourceTableMeta,
    before: Option<&Map<String, Value>>,
    after: Option<&Map<String, Value>>,
    deleted: bool,
) -> Map<String, Value> {
    let images = if deleted { [before, after] } else { [after, before] };
    let mut key = Map::new();
    for pk in &meta.primary_keys {
        for image in images.into_iter().flatten() {
            if let Some(value) = image.get(pk) {
                key.insert(pk.clone(), value.clone());
                break;
            }
        }
    }
    key
}

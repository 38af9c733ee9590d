//! Decodes raw logical replication payloads into canonical row changes.
//!
//! Deployments differ in how the plugin frames its messages on the wire and
//! in which revision of the message schema they speak. The decoder tries a
//! fixed list of framing hypotheses, then parses each candidate against the
//! vendor revision first and the upstream revision second.

use std::fmt::Write as _;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use prost::Message;
use prost::encoding::decode_varint;
use tracing::{debug, warn};

use crate::error::{ErrorKind, SyncResult};
use crate::replication::proto::{self, Op, TypeInfo};
use crate::sync_error;
use crate::types::{ChangeOp, ColumnChange, Datum, RowChange, TypeModifier};

/// Bytes shown in raw payload previews.
const PREVIEW_LEN: usize = 32;

/// Stateful decoder for replication payloads.
pub struct WalDecoder {
    strict: bool,
    log_raw: bool,
    warned_unknown_op: bool,
}

impl WalDecoder {
    pub fn new(strict: bool, log_raw: bool) -> Self {
        Self {
            strict,
            log_raw,
            warned_unknown_op: false,
        }
    }

    /// Decodes one replication payload.
    ///
    /// Returns `Ok(None)` for payloads that are skipped: unsupported
    /// operations always, and undecodable payloads unless strict parsing
    /// is enabled.
    pub fn decode(&mut self, buf: &[u8]) -> SyncResult<Option<RowChange>> {
        if self.log_raw {
            debug!(len = buf.len(), preview = %hex_preview(buf), "raw replication payload");
        }

        for candidate in payload_candidates(buf) {
            if let Ok(msg) = proto::local::RowMessage::decode(candidate) {
                if looks_misparsed(&msg) {
                    continue;
                }
                return self.finish(convert_local(msg)?);
            }
        }
        for candidate in payload_candidates(buf) {
            if let Ok(msg) = proto::official::RowMessage::decode(candidate) {
                return self.finish(convert_official(msg)?);
            }
        }

        if self.strict {
            return Err(sync_error!(
                ErrorKind::WalDecodeFailed,
                "Undecodable replication payload",
                format!("len={}, preview={}", buf.len(), hex_preview(buf))
            ));
        }
        warn!(
            len = buf.len(),
            preview = %hex_preview(buf),
            "skipping undecodable replication payload"
        );
        Ok(None)
    }

    fn finish(&mut self, change: Option<RowChange>) -> SyncResult<Option<RowChange>> {
        if change.is_none() && !self.warned_unknown_op {
            self.warned_unknown_op = true;
            warn!("skipping replication messages with unsupported operations");
        }
        Ok(change)
    }
}

/// Framing hypotheses for one payload, deduplicated, most common first.
fn payload_candidates<'a>(buf: &'a [u8]) -> Vec<&'a [u8]> {
    let mut candidates: Vec<&[u8]> = vec![buf];
    let mut push = |slice: &'a [u8], candidates: &mut Vec<&'a [u8]>| {
        if !candidates.contains(&slice) {
            candidates.push(slice);
        }
    };

    if buf.len() >= 4 {
        let be = BigEndian::read_u32(buf) as usize;
        if be > 0 && be == buf.len() - 4 {
            push(&buf[4..], &mut candidates);
        }
        let le = LittleEndian::read_u32(buf) as usize;
        if le > 0 && le == buf.len() - 4 {
            push(&buf[4..], &mut candidates);
        }
    }

    let mut cursor = buf;
    if let Ok(value) = decode_varint(&mut cursor) {
        if value > 0 && value == cursor.len() as u64 {
            push(cursor, &mut candidates);
        }
    }

    candidates
}

/// Upstream payloads sometimes parse under the vendor layout with the
/// table name landing in the schema field. Such a parse carries no table,
/// no tuples and no operation.
fn looks_misparsed(msg: &proto::local::RowMessage) -> bool {
    msg.op.unwrap_or(Op::Unknown as i32) == Op::Unknown as i32
        && msg.schema.is_some()
        && msg.table.is_none()
        && msg.new_tuple.is_empty()
        && msg.old_tuple.is_empty()
}

fn convert_local(msg: proto::local::RowMessage) -> SyncResult<Option<RowChange>> {
    let Some(op) = convert_op(msg.op) else {
        return Ok(None);
    };

    let new_columns: Vec<ColumnChange> = msg.new_tuple.into_iter().map(local_column).collect();
    let old_columns: Vec<ColumnChange> = msg.old_tuple.into_iter().map(local_column).collect();
    check_type_info(&msg.new_typeinfo, new_columns.len())?;

    Ok(Some(RowChange {
        transaction_id: msg.transaction_id.unwrap_or(0),
        commit_time: msg.commit_time.unwrap_or(0) as i64,
        schema: msg.schema,
        table: msg.table,
        op,
        new_columns,
        old_columns,
        new_type_info: convert_type_info(&msg.new_typeinfo),
    }))
}

fn convert_official(msg: proto::official::RowMessage) -> SyncResult<Option<RowChange>> {
    let Some(op) = convert_op(msg.op) else {
        return Ok(None);
    };

    let new_columns: Vec<ColumnChange> = msg.new_tuple.into_iter().map(official_column).collect();
    let old_columns: Vec<ColumnChange> = msg.old_tuple.into_iter().map(official_column).collect();
    check_type_info(&msg.new_typeinfo, new_columns.len())?;

    Ok(Some(RowChange {
        transaction_id: msg.transaction_id.unwrap_or(0),
        commit_time: msg.commit_time.unwrap_or(0) as i64,
        schema: None,
        table: msg.table,
        op,
        new_columns,
        old_columns,
        new_type_info: convert_type_info(&msg.new_typeinfo),
    }))
}

fn convert_op(raw: Option<i32>) -> Option<ChangeOp> {
    match Op::try_from(raw.unwrap_or(Op::Unknown as i32)).ok()? {
        Op::Insert => Some(ChangeOp::Insert),
        Op::Update => Some(ChangeOp::Update),
        Op::Delete => Some(ChangeOp::Delete),
        Op::Begin => Some(ChangeOp::Begin),
        Op::Commit => Some(ChangeOp::Commit),
        Op::Unknown => None,
    }
}

fn check_type_info(type_info: &[TypeInfo], new_columns: usize) -> SyncResult<()> {
    if !type_info.is_empty() && type_info.len() != new_columns {
        return Err(sync_error!(
            ErrorKind::ProtocolViolation,
            "Type info count does not match new tuple",
            format!("{} type infos for {} columns", type_info.len(), new_columns)
        ));
    }
    Ok(())
}

fn convert_type_info(type_info: &[TypeInfo]) -> Vec<TypeModifier> {
    type_info
        .iter()
        .map(|t| TypeModifier {
            modifier: t.modifier.unwrap_or(-1),
            value_optional: t.value_optional.unwrap_or(false),
        })
        .collect()
}

fn local_column(datum: proto::local::DatumMessage) -> ColumnChange {
    use proto::local::Datum as D;
    let value = match datum.datum {
        None | Some(D::DatumNull(_)) => Datum::Null,
        Some(D::DatumMissing(true)) => Datum::Missing,
        Some(D::DatumMissing(false)) => Datum::Null,
        Some(D::DatumInt32(v)) => Datum::I32(v),
        Some(D::DatumInt64(v)) => Datum::I64(v),
        Some(D::DatumFloat(v)) => Datum::F32(v),
        Some(D::DatumDouble(v)) => Datum::F64(v),
        Some(D::DatumBool(v)) => Datum::Bool(v),
        Some(D::DatumString(v)) => Datum::Text(v),
        Some(D::DatumBytes(v)) => Datum::Bytes(v),
        Some(D::DatumPoint(p)) => Datum::Point { x: p.x, y: p.y },
    };
    ColumnChange {
        name: datum.column_name.unwrap_or_default(),
        type_oid: datum.column_type.unwrap_or(0) as u32,
        datum: value,
    }
}

fn official_column(datum: proto::official::DatumMessage) -> ColumnChange {
    use proto::official::Datum as D;
    let value = match datum.datum {
        None => Datum::Null,
        Some(D::DatumMissing(true)) => Datum::Missing,
        Some(D::DatumMissing(false)) => Datum::Null,
        Some(D::DatumInt32(v)) => Datum::I32(v),
        Some(D::DatumInt64(v)) => Datum::I64(v),
        Some(D::DatumFloat(v)) => Datum::F32(v),
        Some(D::DatumDouble(v)) => Datum::F64(v),
        Some(D::DatumBool(v)) => Datum::Bool(v),
        Some(D::DatumString(v)) => Datum::Text(v),
        Some(D::DatumBytes(v)) => Datum::Bytes(v),
        Some(D::DatumPoint(p)) => Datum::Point { x: p.x, y: p.y },
    };
    ColumnChange {
        name: datum.column_name.unwrap_or_default(),
        type_oid: datum.column_type.unwrap_or(0) as u32,
        datum: value,
    }
}

fn hex_preview(buf: &[u8]) -> String {
    let mut out = String::new();
    for b in buf.iter().take(PREVIEW_LEN) {
        let _ = write!(out, "{b:02x}");
    }
    if buf.len() > PREVIEW_LEN {
        out.push_str("..");
    }
    out
}

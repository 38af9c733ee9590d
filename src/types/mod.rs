//! Core data types shared across the sync pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SyncError};
use crate::sync_error;

pub mod catalog;

/// Fully qualified source table identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    pub schema: String,
    pub table: String,
}

impl TableId {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Parses a `schema.table` reference, splitting on the first dot.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let raw = raw.trim();
        match raw.split_once('.') {
            Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                Ok(Self::new(schema, table))
            }
            _ => Err(sync_error!(
                ErrorKind::InvalidData,
                "Invalid table reference",
                format!("expected `schema.table`, got `{raw}`")
            )),
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Kind of change carried by a replication message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
    Begin,
    Commit,
}

impl ChangeOp {
    /// Single-letter operation code used in downstream records.
    pub fn as_op_str(&self) -> &'static str {
        match self {
            ChangeOp::Insert => "c",
            ChangeOp::Update => "u",
            ChangeOp::Delete => "d",
            ChangeOp::Begin => "b",
            ChangeOp::Commit => "m",
        }
    }

    /// Transaction control messages carry no row data.
    pub fn is_transactional_marker(&self) -> bool {
        matches!(self, ChangeOp::Begin | ChangeOp::Commit)
    }
}

/// A decoded column value.
///
/// Closed set of representations the wire format can produce. `Missing`
/// marks columns excluded from the message by the source (for example
/// unchanged TOAST values), which is distinct from an explicit `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Missing,
    Bool(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Point { x: f64, y: f64 },
}

/// One column of a decoded row image.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    pub name: String,
    pub type_oid: u32,
    pub datum: Datum,
}

/// Per-column type metadata attached to new row images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeModifier {
    pub modifier: i32,
    pub value_optional: bool,
}

/// A decoded row-level change in canonical form.
///
/// Both wire revisions decode into this shape; the older revision carries
/// schema and table separately while the newer one packs them into the
/// table field.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    pub transaction_id: u32,
    pub commit_time: i64,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub op: ChangeOp,
    pub new_columns: Vec<ColumnChange>,
    pub old_columns: Vec<ColumnChange>,
    pub new_type_info: Vec<TypeModifier>,
}

impl RowChange {
    /// Resolves the source table this change belongs to.
    ///
    /// Prefers the explicit schema field; otherwise splits a dotted table
    /// name on the first dot.
    pub fn table_id(&self) -> Option<TableId> {
        let table = self.table.as_deref()?;
        match self.schema.as_deref() {
            Some(schema) if !schema.is_empty() => Some(TableId::new(schema, table)),
            _ => match table.split_once('.') {
                Some((schema, table)) if !schema.is_empty() && !table.is_empty() => {
                    Some(TableId::new(schema, table))
                }
                _ => Some(TableId::new("public", table)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_id_parse_splits_on_first_dot() {
        let id = TableId::parse("public.orders").unwrap();
        assert_eq!(id.schema, "public");
        assert_eq!(id.table, "orders");

        let id = TableId::parse("public.orders.v2").unwrap();
        assert_eq!(id.schema, "public");
        assert_eq!(id.table, "orders.v2");
    }

    #[test]
    fn table_id_parse_rejects_bare_names() {
        assert!(TableId::parse("orders").is_err());
        assert!(TableId::parse(".orders").is_err());
        assert!(TableId::parse("public.").is_err());
        assert!(TableId::parse("").is_err());
    }

    #[test]
    fn table_id_display_round_trips() {
        let id = TableId::new("sales", "items");
        assert_eq!(id.to_string(), "sales.items");
    }

    #[test]
    fn change_op_letters() {
        assert_eq!(ChangeOp::Insert.as_op_str(), "c");
        assert_eq!(ChangeOp::Update.as_op_str(), "u");
        assert_eq!(ChangeOp::Delete.as_op_str(), "d");
        assert!(ChangeOp::Begin.is_transactional_marker());
        assert!(ChangeOp::Commit.is_transactional_marker());
        assert!(!ChangeOp::Insert.is_transactional_marker());
    }

    #[test]
    fn row_change_table_id_prefers_schema_field() {
        let change = RowChange {
            transaction_id: 1,
            commit_time: 0,
            schema: Some("sales".to_string()),
            table: Some("items".to_string()),
            op: ChangeOp::Insert,
            new_columns: vec![],
            old_columns: vec![],
            new_type_info: vec![],
        };
        assert_eq!(change.table_id(), Some(TableId::new("sales", "items")));
    }

    #[test]
    fn row_change_table_id_splits_dotted_table() {
        let change = RowChange {
            transaction_id: 1,
            commit_time: 0,
            schema: None,
            table: Some("sales.items".to_string()),
            op: ChangeOp::Insert,
            new_columns: vec![],
            old_columns: vec![],
            new_type_info: vec![],
        };
        assert_eq!(change.table_id(), Some(TableId::new("sales", "items")));
    }

    #[test]
    fn row_change_table_id_defaults_schema() {
        let change = RowChange {
            transaction_id: 1,
            commit_time: 0,
            schema: None,
            table: Some("items".to_string()),
            op: ChangeOp::Insert,
            new_columns: vec![],
            old_columns: vec![],
            new_type_info: vec![],
        };
        assert_eq!(change.table_id(), Some(TableId::new("public", "items")));
    }
}

//! Normalizes resolved row images into flat downstream records.

use serde_json::{Map, Value};

use crate::config::DeltaNullPolicy;
use crate::conversions::numeric::{to_big_decimal, values_equal};

/// A resolved change event before normalization.
#[derive(Debug, Clone, Default)]
pub struct ChangeEnvelope {
    /// Single-letter operation code, `c`, `u` or `d`.
    pub op: String,
    pub key: Map<String, Value>,
    pub before: Option<Map<String, Value>>,
    pub after: Option<Map<String, Value>>,
    /// Key-only marker event with no row images.
    pub tombstone: bool,
    /// Source table in `schema.table` form.
    pub table: String,
    /// Connector-scoped destination label, may be blank.
    pub destination: String,
}

/// A normalized record ready for the write path.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub data: Option<Map<String, Value>>,
    pub op: String,
    pub deleted: bool,
    pub tombstone: bool,
    pub key: Map<String, Value>,
    pub changed_fields: Vec<String>,
    pub deltas: Map<String, Value>,
    pub table: String,
    pub destination: String,
}

impl NormalizedRecord {
    /// Flattens the record into a single JSON object.
    ///
    /// Data fields come first, followed by the metadata fields. Empty
    /// collections and blank labels are omitted.
    pub fn to_enhanced_json(&self) -> Value {
        let mut out = Map::new();
        if let Some(data) = &self.data {
            for (k, v) in data {
                out.insert(k.clone(), v.clone());
            }
        }
        out.insert("__op".to_string(), Value::String(self.op.clone()));
        out.insert("__deleted".to_string(), Value::Bool(self.deleted));
        out.insert("__tombstone".to_string(), Value::Bool(self.tombstone));
        if !self.changed_fields.is_empty() {
            out.insert(
                "changed_fields".to_string(),
                Value::Array(
                    self.changed_fields
                        .iter()
                        .map(|f| Value::String(f.clone()))
                        .collect(),
                ),
            );
        }
        if !self.deltas.is_empty() {
            out.insert("deltas".to_string(), Value::Object(self.deltas.clone()));
        }
        out.insert("__table".to_string(), Value::String(self.table.clone()));
        if !self.destination.trim().is_empty() {
            out.insert(
                "__destination".to_string(),
                Value::String(self.destination.clone()),
            );
        }
        if !self.key.is_empty() {
            out.insert("__key".to_string(), Value::Object(self.key.clone()));
        }
        Value::Object(out)
    }
}

/// Turns change envelopes into normalized records.
pub struct ChangeNormalizer {
    delta_null_policy: DeltaNullPolicy,
    include_changed_fields: bool,
    include_deltas: bool,
    tombstone_as_delete: bool,
}

impl ChangeNormalizer {
    pub fn new(
        delta_null_policy: DeltaNullPolicy,
        include_changed_fields: bool,
        include_deltas: bool,
        tombstone_as_delete: bool,
    ) -> Self {
        Self {
            delta_null_policy,
            include_changed_fields,
            include_deltas,
            tombstone_as_delete,
        }
    }

    pub fn normalize(&self, envelope: ChangeEnvelope) -> NormalizedRecord {
        if envelope.tombstone {
            return self.normalize_tombstone(envelope);
        }

        let op = envelope.op.to_lowercase();
        let deleted = op == "d";
        let data = if deleted {
            envelope.before.clone().or_else(|| envelope.after.clone())
        } else {
            envelope.after.clone().or_else(|| envelope.before.clone())
        };

        let changed_fields = if self.include_changed_fields {
            collect_changed_fields(envelope.before.as_ref(), envelope.after.as_ref())
        } else {
            Vec::new()
        };
        let deltas = if self.include_deltas {
            self.compute_deltas(
                envelope.before.as_ref(),
                envelope.after.as_ref(),
                &changed_fields,
            )
        } else {
            Map::new()
        };

        NormalizedRecord {
            data,
            op,
            deleted,
            tombstone: false,
            key: envelope.key,
            changed_fields,
            deltas,
            table: envelope.table,
            destination: envelope.destination,
        }
    }

    fn normalize_tombstone(&self, envelope: ChangeEnvelope) -> NormalizedRecord {
        if !self.tombstone_as_delete {
            return NormalizedRecord {
                data: None,
                op: "t".to_string(),
                deleted: false,
                tombstone: true,
                key: envelope.key,
                changed_fields: Vec::new(),
                deltas: Map::new(),
                table: envelope.table,
                destination: envelope.destination,
            };
        }

        // The key image stands in for the deleted row.
        let changed_fields = if self.include_changed_fields {
            collect_changed_fields(Some(&envelope.key), None)
        } else {
            Vec::new()
        };
        let deltas = if self.include_deltas {
            self.compute_deltas(Some(&envelope.key), None, &changed_fields)
        } else {
            Map::new()
        };

        NormalizedRecord {
            data: Some(envelope.key.clone()),
            op: "d".to_string(),
            deleted: true,
            tombstone: true,
            key: envelope.key,
            changed_fields,
            deltas,
            table: envelope.table,
            destination: envelope.destination,
        }
    }

    fn compute_deltas(
        &self,
        before: Option<&Map<String, Value>>,
        after: Option<&Map<String, Value>>,
        changed_fields: &[String],
    ) -> Map<String, Value> {
        let mut deltas = Map::new();
        for field in changed_fields {
            let old = before
                .and_then(|m| m.get(field))
                .and_then(to_big_decimal);
            let new = after.and_then(|m| m.get(field)).and_then(to_big_decimal);

            let delta = match (old, new) {
                (Some(old), Some(new)) => new - old,
                (old, new) => match self.delta_null_policy {
                    DeltaNullPolicy::Skip => continue,
                    DeltaNullPolicy::Zero => match (old, new) {
                        (None, None) => continue,
                        (Some(old), None) => -old,
                        (None, Some(new)) => new,
                        _ => continue,
                    },
                },
            };
            deltas.insert(field.clone(), Value::String(delta.to_string()));
        }
        deltas
    }
}

/// Ordered union of field names whose values differ between the images.
fn collect_changed_fields(
    before: Option<&Map<String, Value>>,
    after: Option<&Map<String, Value>>,
) -> Vec<String> {
    let mut fields = Vec::new();
    let mut push_changed = |name: &String| {
        if fields.contains(name) {
            return;
        }
        let old = before.and_then(|m| m.get(name));
        let new = after.and_then(|m| m.get(name));
        if !values_equal(old, new) {
            fields.push(name.clone());
        }
    };

    if let Some(before) = before {
        for name in before.keys() {
            push_changed(name);
        }
    }
    if let Some(after) = after {
        for name in after.keys() {
            push_changed(name);
        }
    }
    fields
}

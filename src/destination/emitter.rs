//! Secondary sink emitting flattened records as JSON batches.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::SinkConfig;
use crate::error::{ErrorKind, SyncResult};
use crate::sync_error;

struct EmitterState {
    buffer: Vec<Value>,
    batch_no: u64,
    total_rows: u64,
}

/// Buffers enhanced JSON records and flushes them in batches.
///
/// Each flush appends one JSON array line to the output file, when one is
/// configured.
pub struct EnhancedJsonEmitter {
    batch_size: usize,
    output_file: Option<PathBuf>,
    state: Mutex<EmitterState>,
}

impl EnhancedJsonEmitter {
    pub fn new(config: &SinkConfig) -> SyncResult<Self> {
        let output_file = config.output_file.as_ref().map(PathBuf::from);
        if let Some(path) = &output_file {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            OpenOptions::new().create(true).append(true).open(path)?;
        }
        Ok(Self {
            batch_size: config.batch_size.max(1),
            output_file,
            state: Mutex::new(EmitterState {
                buffer: Vec::new(),
                batch_no: 0,
                total_rows: 0,
            }),
        })
    }

    /// Buffers one record, flushing when the batch is full.
    pub fn append(&self, record: Value) -> SyncResult<()> {
        let mut state = self.lock()?;
        state.buffer.push(record);
        if state.buffer.len() >= self.batch_size {
            self.flush_locked(&mut state)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> SyncResult<()> {
        let mut state = self.lock()?;
        self.flush_locked(&mut state)
    }

    /// Flushes remaining records and reports totals.
    pub fn close(&self) -> SyncResult<()> {
        let mut state = self.lock()?;
        self.flush_locked(&mut state)?;
        info!(
            batches = state.batch_no,
            rows = state.total_rows,
            "enhanced JSON emitter closed"
        );
        Ok(())
    }

    fn flush_locked(&self, state: &mut EmitterState) -> SyncResult<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }
        let batch: Vec<Value> = std::mem::take(&mut state.buffer);
        state.batch_no += 1;
        state.total_rows += batch.len() as u64;

        if let Some(path) = &self.output_file {
            let line = serde_json::to_string(&Value::Array(batch.clone()))?;
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{line}")?;
        }
        debug!(
            batch_no = state.batch_no,
            rows = batch.len(),
            total_rows = state.total_rows,
            "flushed enhanced JSON batch"
        );
        Ok(())
    }

    fn lock(&self) -> SyncResult<std::sync::MutexGuard<'_, EmitterState>> {
        self.state.lock().map_err(|_| {
            sync_error!(ErrorKind::InvalidState, "Emitter state lock is poisoned")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("emitter-{name}-{}", std::process::id()));
        path
    }

    fn config(batch_size: usize, path: Option<&PathBuf>) -> SinkConfig {
        SinkConfig {
            batch_size,
            output_file: path.map(|p| p.to_string_lossy().into_owned()),
            ..SinkConfig::default()
        }
    }

    #[test]
    fn flushes_when_batch_fills() {
        crate::telemetry::init_test_tracing();
        let path = temp_path("fill");
        let _ = fs::remove_file(&path);
        let emitter = EnhancedJsonEmitter::new(&config(2, Some(&path))).unwrap();

        emitter.append(json!({"id": 1})).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");

        emitter.append(json!({"id": 2})).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[{\"id\":1},{\"id\":2}]\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn close_flushes_partial_batch() {
        let path = temp_path("close");
        let _ = fs::remove_file(&path);
        let emitter = EnhancedJsonEmitter::new(&config(100, Some(&path))).unwrap();

        emitter.append(json!({"id": 1})).unwrap();
        emitter.close().unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[{\"id\":1}]\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn batches_append_as_separate_lines() {
        let path = temp_path("lines");
        let _ = fs::remove_file(&path);
        let emitter = EnhancedJsonEmitter::new(&config(1, Some(&path))).unwrap();

        emitter.append(json!({"id": 1})).unwrap();
        emitter.append(json!({"id": 2})).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn works_without_output_file() {
        let emitter = EnhancedJsonEmitter::new(&config(1, None)).unwrap();
        emitter.append(json!({"id": 1})).unwrap();
        emitter.close().unwrap();
    }

    #[test]
    fn zero_batch_size_still_flushes() {
        let emitter = EnhancedJsonEmitter::new(&config(0, None)).unwrap();
        emitter.append(json!({"id": 1})).unwrap();
    }
}

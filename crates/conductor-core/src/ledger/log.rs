//! Persisted record log: one JSON record per line, append-only.
//!
//! The bit-exact contract for crash recovery: replaying every line in
//! `sequence_no` order rebuilds the snapshot. Appends are flushed per
//! record; nothing ever rewrites earlier lines.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::ConductorError;

use super::record::LedgerRecord;

/// Sink for ledger records. `in_memory` is for tests and ephemeral runs;
/// `open` appends to a JSONL file.
pub struct RecordLog {
    writer: Option<BufWriter<File>>,
}

impl RecordLog {
    /// No persistence; records live only in the snapshot.
    pub fn in_memory() -> Self {
        Self { writer: None }
    }

    /// Open (or create) an append-only log file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConductorError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Append one record and flush it to disk.
    pub fn append(&mut self, record: &LedgerRecord) -> Result<(), ConductorError> {
        if let Some(writer) = self.writer.as_mut() {
            let line = serde_json::to_string(record)?;
            writeln!(writer, "{line}")?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Read every record from a log file, in file order.
    ///
    /// Returns an empty vec when the file does not exist (fresh start).
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<LedgerRecord>, ConductorError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

//! Result sink seam and the two built-in sinks.

use crate::rules::Verdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sink lock poisoned")]
    Poisoned,
}

/// A verdict as persisted, tagged with the image it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub source: String,
    pub recorded_at: DateTime<Utc>,
    pub verdict: Verdict,
}

/// Destination for verdicts. A failing sink never changes the verdict.
pub trait ResultSink: Send + Sync {
    fn record(&self, verdict: &Verdict, source_image_ref: &str) -> Result<(), SinkError>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<VerdictRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<VerdictRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ResultSink for MemorySink {
    fn record(&self, verdict: &Verdict, source_image_ref: &str) -> Result<(), SinkError> {
        let mut records = self.records.lock().map_err(|_| SinkError::Poisoned)?;
        records.push(VerdictRecord {
            source: source_image_ref.to_string(),
            recorded_at: Utc::now(),
            verdict: verdict.clone(),
        });
        Ok(())
    }
}

/// Writes one JSON record per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn record(&self, verdict: &Verdict, source_image_ref: &str) -> Result<(), SinkError> {
        let record = VerdictRecord {
            source: source_image_ref.to_string(),
            recorded_at: Utc::now(),
            verdict: verdict.clone(),
        };
        let line = serde_json::to_string(&record)?;
        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected() -> Verdict {
        Verdict {
            is_valid: false,
            face_count: 0,
            reasons: vec!["no face detected".into()],
            attributes: None,
        }
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.record(&rejected(), "a.jpg").unwrap();
        sink.record(&rejected(), "b.jpg").unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "a.jpg");
        assert_eq!(records[1].source, "b.jpg");
        assert_eq!(records[1].verdict, rejected());
    }

    #[test]
    fn test_json_lines_sink_writes_one_record_per_line() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.record(&rejected(), "a.jpg").unwrap();
        sink.record(&rejected(), "b.jpg").unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: VerdictRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(record.source, "b.jpg");
        assert!(!record.verdict.is_valid);
        assert_eq!(record.verdict.reasons, vec!["no face detected"]);
    }
}

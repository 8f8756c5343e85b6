use crate::interfaces::{RecordSink, SinkError};
use crate::types::ExecutionRecord;
use parking_lot::Mutex;

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRecordSink;

impl RecordSink for NullRecordSink {
    fn append(&self, _run_id: &str, _record: &ExecutionRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps records in memory, tagged with their run id.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<(String, ExecutionRecord)>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(String, ExecutionRecord)> {
        self.records.lock().clone()
    }

    pub fn for_run(&self, run_id: &str) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .iter()
            .filter(|(id, _)| id == run_id)
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordSink for MemoryRecordSink {
    fn append(&self, run_id: &str, record: &ExecutionRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .push((run_id.to_string(), record.clone()));
        Ok(())
    }
}

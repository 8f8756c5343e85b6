//! Append-only JSONL journal of execution records.

use deskpilot_core::{ExecutionRecord, RecordSink, SinkError};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct JournalLine<'a> {
    run_id: &'a str,
    record: &'a ExecutionRecord,
}

pub struct JsonlRecordSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlRecordSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonlRecordSink {
    fn append(&self, run_id: &str, record: &ExecutionRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(&JournalLine { run_id, record })?;
        let mut file = self.file.lock();
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

pub mod cli;
pub mod config;
pub mod journal;
pub mod summary;

pub use config::{AppConfig, OracleSettings, SnapshotSource};
pub use journal::JsonlRecordSink;

use async_trait::async_trait;
use chrono::Utc;
use deskpilot_core::{Snapshot, SnapshotError, SnapshotProvider};
use serde_json::json;
use sysinfo::System;

/// Process and memory state via `sysinfo`, for hosts without a compositor.
#[derive(Debug, Clone)]
pub struct SystemSnapshotProvider {
    max_processes: usize,
}

impl SystemSnapshotProvider {
    pub fn new() -> Self {
        Self { max_processes: 200 }
    }

    pub fn with_max_processes(mut self, max_processes: usize) -> Self {
        self.max_processes = max_processes;
        self
    }

    fn collect(max_processes: usize) -> Snapshot {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_processes();

        let mut processes: Vec<String> = sys
            .processes()
            .values()
            .map(|process| process.name().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        processes.sort();
        processes.dedup();
        processes.truncate(max_processes);

        Snapshot::new(Utc::now())
            .with_field("processes", json!(processes))
            .with_field("memory_used_mb", json!(sys.used_memory() / 1024 / 1024))
            .with_field("memory_total_mb", json!(sys.total_memory() / 1024 / 1024))
            .with_field("uptime_seconds", json!(System::uptime()))
    }
}

impl Default for SystemSnapshotProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotProvider for SystemSnapshotProvider {
    async fn capture(&self) -> Result<Snapshot, SnapshotError> {
        let max_processes = self.max_processes;
        tokio::task::spawn_blocking(move || Self::collect(max_processes))
            .await
            .map_err(|e| SnapshotError::Capture(format!("system scan failed: {}", e)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_reports_memory_and_processes() {
        let snapshot = SystemSnapshotProvider::new().capture().await.unwrap();
        assert!(snapshot.extra_fields["memory_total_mb"].as_u64().unwrap() > 0);
        let processes = snapshot.extra_fields["processes"].as_array().unwrap();
        assert!(!processes.is_empty());
        assert!(snapshot.active_application.is_none());
    }

    #[tokio::test]
    async fn test_process_list_is_bounded() {
        let snapshot = SystemSnapshotProvider::new()
            .with_max_processes(1)
            .capture()
            .await
            .unwrap();
        assert_eq!(snapshot.extra_fields["processes"].as_array().unwrap().len(), 1);
    }
}

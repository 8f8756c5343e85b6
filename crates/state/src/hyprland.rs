//! Desktop state from Hyprland's JSON queries.

use async_trait::async_trait;
use chrono::Utc;
use deskpilot_core::{Snapshot, SnapshotError, SnapshotProvider, WindowInfo};
use serde_json::{json, Value};
use tokio::process::Command;

async fn query(what: &str) -> Result<Value, SnapshotError> {
    let output = Command::new("hyprctl")
        .args([what, "-j"])
        .output()
        .await
        .map_err(|e| SnapshotError::Capture(format!("hyprctl {}: {}", what, e)))?;

    if !output.status.success() {
        return Err(SnapshotError::Capture(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }

    serde_json::from_slice(&output.stdout).map_err(|e| {
        SnapshotError::Capture(format!("hyprctl {} returned invalid JSON: {}", what, e))
    })
}

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Builds a snapshot from `activewindow`, `clients` and `activeworkspace` output.
///
/// `activewindow` is `{}` when nothing has focus.
pub fn build_snapshot(
    active_window: &Value,
    clients: &Value,
    active_workspace: &Value,
) -> Result<Snapshot, SnapshotError> {
    let clients = clients.as_array().ok_or_else(|| {
        SnapshotError::Capture("hyprctl clients did not return an array".to_string())
    })?;

    let active_address = non_empty(&active_window["address"]);

    let window_list = clients
        .iter()
        .filter(|client| client["mapped"].as_bool().unwrap_or(true))
        .map(|client| {
            let id = non_empty(&client["address"]).unwrap_or_default();
            WindowInfo {
                focused: active_address.as_deref() == Some(id.as_str()),
                title: client["title"].as_str().unwrap_or_default().to_string(),
                application: client["class"].as_str().unwrap_or_default().to_string(),
                workspace: client["workspace"]["id"].as_i64(),
                id,
            }
        })
        .collect::<Vec<_>>();

    let mut snapshot = Snapshot::new(Utc::now());
    snapshot.active_application = non_empty(&active_window["class"]);
    snapshot
        .extra_fields
        .insert("window_count".to_string(), json!(window_list.len()));
    snapshot.window_list = window_list;

    if let Some(id) = active_workspace["id"].as_i64() {
        snapshot
            .extra_fields
            .insert("active_workspace".to_string(), json!(id));
    }
    if let Some(title) = non_empty(&active_window["title"]) {
        snapshot
            .extra_fields
            .insert("active_window_title".to_string(), json!(title));
    }
    if let Some(address) = active_address {
        snapshot
            .extra_fields
            .insert("active_window_address".to_string(), json!(address));
    }

    Ok(snapshot)
}

#[derive(Debug, Default, Clone)]
pub struct HyprlandSnapshotProvider;

impl HyprlandSnapshotProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SnapshotProvider for HyprlandSnapshotProvider {
    async fn capture(&self) -> Result<Snapshot, SnapshotError> {
        let (active_window, clients, active_workspace) = tokio::join!(
            query("activewindow"),
            query("clients"),
            query("activeworkspace")
        );
        let snapshot = build_snapshot(&active_window?, &clients?, &active_workspace?)?;
        tracing::debug!(
            "Captured {} windows, active: {:?}",
            snapshot.window_list.len(),
            snapshot.active_application
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn clients() -> Value {
        json!([
            {
                "address": "0x55d1",
                "mapped": true,
                "class": "kitty",
                "title": "~/src",
                "workspace": {"id": 1, "name": "1"}
            },
            {
                "address": "0x55d2",
                "mapped": true,
                "class": "firefox",
                "title": "Inbox - Mozilla Firefox",
                "workspace": {"id": 2, "name": "2"}
            },
            {
                "address": "0x55d3",
                "mapped": false,
                "class": "hidden",
                "title": "",
                "workspace": {"id": -99, "name": "special"}
            }
        ])
    }

    #[test]
    fn test_build_snapshot_marks_focus() {
        let active = json!({
            "address": "0x55d2",
            "class": "firefox",
            "title": "Inbox - Mozilla Firefox"
        });
        let snapshot = build_snapshot(&active, &clients(), &json!({"id": 2, "name": "2"})).unwrap();

        assert_eq!(snapshot.active_application.as_deref(), Some("firefox"));
        assert_eq!(snapshot.window_list.len(), 2);
        assert!(!snapshot.window_list[0].focused);
        assert!(snapshot.window_list[1].focused);
        assert_eq!(snapshot.window_list[1].workspace, Some(2));
        assert_eq!(snapshot.extra_fields["active_workspace"], 2);
        assert_eq!(snapshot.extra_fields["window_count"], 2);
        assert_eq!(
            snapshot.extra_fields["active_window_title"],
            "Inbox - Mozilla Firefox"
        );
    }

    #[test]
    fn test_build_snapshot_without_focus() {
        let snapshot = build_snapshot(&json!({}), &clients(), &json!({"id": 1})).unwrap();
        assert!(snapshot.active_application.is_none());
        assert!(snapshot.window_list.iter().all(|w| !w.focused));
        assert!(snapshot.extra_fields.get("active_window_address").is_none());
    }

    #[test]
    fn test_build_snapshot_rejects_bad_clients() {
        let err = build_snapshot(&json!({}), &json!({"oops": true}), &json!({})).unwrap_err();
        assert!(matches!(err, SnapshotError::Capture(_)));
    }
}

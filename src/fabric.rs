//! Context fabric: cross-session knowledge graph and event log
//!
//! The orchestrator reads a snapshot before planning and appends a summary
//! event when a call finishes. [`JsonFabric`] is the bundled implementation:
//! an in-memory graph persisted as one JSON document.
//!
//! Concurrent orchestrations sharing one fabric must serialize access
//! themselves; the orchestrator wraps its handle in a mutex.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{OrchestratorError, Result};

/// Events kept by [`JsonFabric`] before the oldest are dropped
pub const DEFAULT_EVENT_CAPACITY: usize = 500;

pub const ROOT_NODE: &str = "context:root";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricNode {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: u64,
    #[serde(default)]
    pub payload: Value,
}

/// Graph, recent events and metadata at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FabricSnapshot {
    #[serde(default)]
    pub nodes: Vec<FabricNode>,
    #[serde(default)]
    pub edges: Vec<FabricEdge>,
    #[serde(default)]
    pub events: Vec<FabricEvent>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Knowledge fabric consumed by the orchestrator
pub trait ContextFabric: Send {
    /// Full graph plus the newest `event_limit` events
    fn snapshot(&self, event_limit: usize) -> FabricSnapshot;

    fn record_event(&mut self, event_type: &str, payload: Value);

    /// Shallow merge; later keys overwrite earlier ones
    fn merge_metadata(&mut self, metadata: Map<String, Value>);

    fn save(&self, path: &Path) -> Result<()>;
}

/// In-memory fabric persisted as JSON
#[derive(Debug, Clone, PartialEq)]
pub struct JsonFabric {
    state: FabricSnapshot,
    event_capacity: usize,
    next_event: u64,
}

impl Default for JsonFabric {
    fn default() -> Self {
        Self::with_state(FabricSnapshot::default())
    }
}

impl JsonFabric {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state(mut state: FabricSnapshot) -> Self {
        if !state.nodes.iter().any(|n| n.id == ROOT_NODE) {
            state.nodes.insert(
                0,
                FabricNode {
                    id: ROOT_NODE.to_string(),
                    kind: "context".to_string(),
                    attributes: Map::new(),
                },
            );
        }
        let next_event = state
            .events
            .iter()
            .filter_map(|e| e.id.strip_prefix("event:")?.parse::<u64>().ok())
            .max()
            .map_or(0, |n| n + 1);
        Self {
            state,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            next_event,
        }
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self.trim_events();
        self
    }

    /// Load from `path`; a missing or unreadable document yields an empty fabric.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read fabric, starting empty");
                return Self::new();
            }
        };
        match serde_json::from_str::<FabricSnapshot>(&content) {
            Ok(state) => Self::with_state(state),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt fabric, starting empty");
                Self::new()
            }
        }
    }

    pub fn events(&self) -> &[FabricEvent] {
        &self.state.events
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.state.metadata
    }

    fn trim_events(&mut self) {
        let excess = self.state.events.len().saturating_sub(self.event_capacity);
        if excess == 0 {
            return;
        }
        let dropped: Vec<String> = self
            .state
            .events
            .drain(..excess)
            .map(|e| e.id)
            .collect();
        self.state.nodes.retain(|n| !dropped.contains(&n.id));
        self.state
            .edges
            .retain(|e| !dropped.contains(&e.source) && !dropped.contains(&e.target));
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl ContextFabric for JsonFabric {
    fn snapshot(&self, event_limit: usize) -> FabricSnapshot {
        let skip = self.state.events.len().saturating_sub(event_limit);
        FabricSnapshot {
            nodes: self.state.nodes.clone(),
            edges: self.state.edges.clone(),
            events: self.state.events[skip..].to_vec(),
            metadata: self.state.metadata.clone(),
        }
    }

    fn record_event(&mut self, event_type: &str, payload: Value) {
        let id = format!("event:{}", self.next_event);
        self.next_event += 1;
        let timestamp = unix_now();

        let mut attributes = Map::new();
        attributes.insert("type".into(), json!(event_type));
        attributes.insert("timestamp".into(), json!(timestamp));
        self.state.nodes.push(FabricNode {
            id: id.clone(),
            kind: "event".to_string(),
            attributes,
        });
        self.state.edges.push(FabricEdge {
            source: ROOT_NODE.to_string(),
            target: id.clone(),
            relation: "recorded".to_string(),
        });
        self.state.events.push(FabricEvent {
            id,
            event_type: event_type.to_string(),
            timestamp,
            payload,
        });
        self.trim_events();
    }

    fn merge_metadata(&mut self, metadata: Map<String, Value>) {
        self.state.metadata.extend(metadata);
    }

    /// Write to a sibling temp file (mode 0600) and rename over `path`.
    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file_name = path
            .file_name()
            .ok_or_else(|| OrchestratorError::fabric(format!("invalid fabric path {}", path.display())))?;
        let tmp = path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name.to_string_lossy(),
            std::process::id()
        ));

        let body = serde_json::to_vec_pretty(&self.state)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        tracing::debug!(path = %path.display(), events = self.state.events.len(), "fabric saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_record_event_links_to_root() {
        let mut fabric = JsonFabric::new();
        fabric.record_event("orchestrator.request", json!({"request": "hi"}));
        let snap = fabric.snapshot(10);
        assert_eq!(snap.events.len(), 1);
        assert_eq!(snap.events[0].event_type, "orchestrator.request");
        assert!(snap.nodes.iter().any(|n| n.id == "event:0" && n.kind == "event"));
        assert_eq!(
            snap.edges,
            [FabricEdge {
                source: ROOT_NODE.into(),
                target: "event:0".into(),
                relation: "recorded".into()
            }]
        );
    }

    #[test]
    fn test_snapshot_limits_events() {
        let mut fabric = JsonFabric::new();
        for n in 0..5 {
            fabric.record_event("tick", json!(n));
        }
        let snap = fabric.snapshot(2);
        assert_eq!(
            snap.events.iter().map(|e| e.payload.clone()).collect::<Vec<_>>(),
            [json!(3), json!(4)]
        );
    }

    #[test]
    fn test_capacity_drops_oldest_with_nodes() {
        let mut fabric = JsonFabric::new().with_event_capacity(3);
        for n in 0..5 {
            fabric.record_event("tick", json!(n));
        }
        assert_eq!(fabric.events().len(), 3);
        assert_eq!(fabric.events()[0].id, "event:2");
        let snap = fabric.snapshot(10);
        assert!(!snap.nodes.iter().any(|n| n.id == "event:0"));
        assert_eq!(snap.edges.len(), 3);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("fabric.json");

        let mut fabric = JsonFabric::new();
        fabric.record_event("a", json!({}));
        let mut meta = Map::new();
        meta.insert("last_request".into(), json!("open firefox"));
        fabric.merge_metadata(meta);
        fabric.save(&path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        let mut loaded = JsonFabric::load(&path);
        assert_eq!(loaded.metadata()["last_request"], "open firefox");
        loaded.record_event("b", json!({}));
        assert_eq!(loaded.events()[1].id, "event:1");
    }

    #[test]
    fn test_missing_or_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(JsonFabric::load(&dir.path().join("nope.json")).events().is_empty());

        let corrupt = dir.path().join("bad.json");
        fs::write(&corrupt, "{not json").unwrap();
        let fabric = JsonFabric::load(&corrupt);
        assert!(fabric.events().is_empty());
        assert_eq!(fabric.snapshot(1).nodes[0].id, ROOT_NODE);
    }
}

//! Cache-backed incremental progress for polling clients.
//!
//! Everything here is ephemeral with short TTLs: finished-node lists for
//! incremental UI progress, per-node "still streaming" markers, and bounded
//! streaming buffers a concurrent reader can tail. Cache loss degrades
//! progress visibility, never the persisted result.

use std::{sync::Arc, time::Duration};

use serde_json::{Value as JsonValue, json};

use crate::{
    common::MemCache,
    model::{NODE_FINISHED, NODE_STREAMING, NodeId},
};

#[derive(Clone)]
pub struct ProgressTracker {
    cache: Arc<MemCache<String, JsonValue>>,
    finished_ttl: Duration,
    stream_ttl: Duration,
}

impl ProgressTracker {
    pub fn new(
        cache: Arc<MemCache<String, JsonValue>>,
        finished_ttl: Duration,
        stream_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            finished_ttl,
            stream_ttl,
        }
    }

    fn finished_key(record_id: &str) -> String {
        format!("workflow:{record_id}:finished_nodes")
    }

    fn stream_key(
        record_id: &str,
        node_id: &str,
    ) -> String {
        format!("workflow:{record_id}:node:{node_id}:streaming")
    }

    fn data_key(
        record_id: &str,
        node_id: &str,
    ) -> String {
        format!("workflow:{record_id}:node:{node_id}:data")
    }

    /// Best-effort node progress report. A 200 appends the node to the
    /// finished list; a 202 marks it as in-progress so polling clients can
    /// tell "still streaming" from "not started".
    pub fn report_node_status(
        &self,
        record_id: &str,
        node_id: &str,
        status: u16,
    ) {
        match status {
            NODE_FINISHED => {
                let key = Self::finished_key(record_id);
                let mut nodes = self.finished_nodes(record_id);
                if !nodes.iter().any(|n| n == node_id) {
                    nodes.push(node_id.to_string());
                }
                self.cache.set(key, json!(nodes), Some(self.finished_ttl));
                self.cache.remove(&Self::stream_key(record_id, node_id));
            }
            NODE_STREAMING => {
                self.cache.set(Self::stream_key(record_id, node_id), json!(true), Some(self.stream_ttl));
            }
            _ => {}
        }
    }

    pub fn finished_nodes(
        &self,
        record_id: &str,
    ) -> Vec<NodeId> {
        self.cache
            .get(&Self::finished_key(record_id))
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn is_node_streaming(
        &self,
        record_id: &str,
        node_id: &str,
    ) -> bool {
        self.cache.get(&Self::stream_key(record_id, node_id)).is_some()
    }

    /// Append a chunk to a node's short-lived streaming buffer.
    pub fn push_node_data(
        &self,
        record_id: &str,
        node_id: &str,
        data: JsonValue,
    ) {
        let key = Self::data_key(record_id, node_id);
        let mut buffer: Vec<JsonValue> = self.cache.get(&key).and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default();
        buffer.push(data);
        self.cache.set(key, json!(buffer), Some(self.stream_ttl));
    }

    /// Drain a node's streaming buffer.
    pub fn pull_node_data(
        &self,
        record_id: &str,
        node_id: &str,
    ) -> Vec<JsonValue> {
        let key = Self::data_key(record_id, node_id);
        let buffer = self.cache.get(&key).and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default();
        self.cache.remove(&key);
        buffer
    }

    /// Drop a run's transient progress keys on terminal status.
    pub fn clear(
        &self,
        record_id: &str,
        node_ids: impl Iterator<Item = impl AsRef<str>>,
    ) {
        self.cache.remove(&Self::finished_key(record_id));
        for node_id in node_ids {
            self.cache.remove(&Self::stream_key(record_id, node_id.as_ref()));
            self.cache.remove(&Self::data_key(record_id, node_id.as_ref()));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tracker() -> ProgressTracker {
        ProgressTracker::new(Arc::new(MemCache::new(256)), Duration::from_secs(60), Duration::from_secs(60))
    }

    #[test]
    fn test_finished_nodes_accumulate_without_duplicates() {
        let tracker = tracker();
        tracker.report_node_status("r1", "a", NODE_FINISHED);
        tracker.report_node_status("r1", "b", NODE_FINISHED);
        tracker.report_node_status("r1", "a", NODE_FINISHED);
        assert_eq!(tracker.finished_nodes("r1"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_streaming_marker_cleared_on_finish() {
        let tracker = tracker();
        tracker.report_node_status("r1", "a", NODE_STREAMING);
        assert!(tracker.is_node_streaming("r1", "a"));
        tracker.report_node_status("r1", "a", NODE_FINISHED);
        assert!(!tracker.is_node_streaming("r1", "a"));
    }

    #[test]
    fn test_push_pull_drains_buffer() {
        let tracker = tracker();
        tracker.push_node_data("r1", "a", json!({"content": "he"}));
        tracker.push_node_data("r1", "a", json!({"content": "llo"}));
        let chunks = tracker.pull_node_data("r1", "a");
        assert_eq!(chunks.len(), 2);
        assert!(tracker.pull_node_data("r1", "a").is_empty());
    }
}

//! Operation log written after a batch commits at least one instance.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Shared by every entry of one batch.
    pub correlation_id: Uuid,
    pub property: String,
    pub org_value: Option<String>,
    pub new_value: String,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entries: Vec<AuditEntry>);
}

/// Entries for a batch that migrated `committed` instances from `source` to `target`.
pub fn batch_entries(
    correlation_id: Uuid,
    source_definition_id: &str,
    target_definition_id: &str,
    committed: usize,
) -> Vec<AuditEntry> {
    let entry = |property: &str, org_value: Option<&str>, new_value: String| AuditEntry {
        correlation_id,
        property: property.to_string(),
        org_value: org_value.map(str::to_string),
        new_value,
    };
    vec![
        entry(
            "processDefinitionId",
            Some(source_definition_id),
            target_definition_id.to_string(),
        ),
        entry("async", None, false.to_string()),
        entry("nrOfInstances", None, committed.to_string()),
    ]
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, entries: Vec<AuditEntry>) {
        if let Ok(mut log) = self.entries.lock() {
            log.extend(entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_entries_share_the_correlation_id() {
        let id = Uuid::new_v4();
        let entries = batch_entries(id, "proc:1", "proc:2", 5);

        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.property.as_str(), e.org_value.as_deref(), e.new_value.as_str()))
            .collect();
        similar_asserts::assert_eq!(
            summary,
            vec![
                ("processDefinitionId", Some("proc:1"), "proc:2"),
                ("async", None, "false"),
                ("nrOfInstances", None, "5"),
            ]
        );
        assert!(entries.iter().all(|e| e.correlation_id == id));
    }
}

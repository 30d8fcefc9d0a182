use dashmap::DashMap;
use flowshift_types::InstanceSnapshot;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Persistence boundary for process instance snapshots.
///
/// `commit` replaces the stored snapshot in one write; a failed commit leaves
/// the stored snapshot untouched.
pub trait InstanceStore: Send + Sync {
    fn load(&self, process_instance_id: &str) -> Option<InstanceSnapshot>;

    fn commit(&self, snapshot: InstanceSnapshot) -> Result<(), StoreError>;

    /// Ids of every running instance of `definition_id`, sorted.
    fn find_by_definition(&self, definition_id: &str) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct InMemoryInstanceStore {
    instances: DashMap<String, InstanceSnapshot>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, snapshot: InstanceSnapshot) {
        self.instances
            .insert(snapshot.process_instance_id.clone(), snapshot);
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl InstanceStore for InMemoryInstanceStore {
    fn load(&self, process_instance_id: &str) -> Option<InstanceSnapshot> {
        self.instances
            .get(process_instance_id)
            .map(|s| s.value().clone())
    }

    fn commit(&self, snapshot: InstanceSnapshot) -> Result<(), StoreError> {
        let Some(mut stored) = self.instances.get_mut(&snapshot.process_instance_id) else {
            return Err(StoreError(format!(
                "process instance '{}' is not stored",
                snapshot.process_instance_id
            )));
        };
        *stored = snapshot;
        Ok(())
    }

    fn find_by_definition(&self, definition_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .instances
            .iter()
            .filter(|s| s.process_definition_id == definition_id && !s.is_ended())
            .map(|s| s.key().clone())
            .collect();
        ids.sort();
        ids
    }
}

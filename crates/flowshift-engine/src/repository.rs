use dashmap::DashMap;
use flowshift_types::ProcessModel;
use std::sync::Arc;

/// Deployed process models by definition id.
pub trait ModelRepository: Send + Sync {
    fn find(&self, definition_id: &str) -> Option<Arc<ProcessModel>>;
}

#[derive(Debug, Default)]
pub struct InMemoryModelRepository {
    models: DashMap<String, Arc<ProcessModel>>,
}

impl InMemoryModelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&self, model: ProcessModel) -> Arc<ProcessModel> {
        let model = Arc::new(model);
        self.models.insert(model.id().to_string(), model.clone());
        model
    }
}

impl ModelRepository for InMemoryModelRepository {
    fn find(&self, definition_id: &str) -> Option<Arc<ProcessModel>> {
        self.models.get(definition_id).map(|m| m.value().clone())
    }
}

use flowshift_core::{ListenerError, ScopeEvent, ScopeLifecycleListener, ScopeTransition};
use std::sync::Mutex;
use tracing::debug;

/// Keeps every scope event it receives, in order.
///
/// Scopes can be made to fail so that listener errors can be exercised.
#[derive(Debug, Default)]
pub struct RecordingListener {
    events: Mutex<Vec<ScopeEvent>>,
    failing: Vec<(ScopeTransition, String)>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, transition: ScopeTransition, activity_id: impl Into<String>) -> Self {
        self.failing.push((transition, activity_id.into()));
        self
    }

    pub fn events(&self) -> Vec<ScopeEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ScopeLifecycleListener for RecordingListener {
    fn on_scope_event(&self, event: &ScopeEvent) -> Result<(), ListenerError> {
        debug!(
            transition = ?event.transition,
            activity = %event.activity_id,
            execution = %event.execution_id,
            "scope event"
        );
        if self
            .failing
            .iter()
            .any(|(t, a)| *t == event.transition && *a == event.activity_id)
        {
            return Err(ListenerError {
                activity_id: event.activity_id.clone(),
                message: match event.transition {
                    ScopeTransition::Created => "start listener failed".into(),
                    ScopeTransition::Removed => "end listener failed".into(),
                },
            });
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::artifacts::ArtifactLookup;
use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::model::{TaskId, TaskOptions};
use crate::stream::StreamEvent;
use crate::task::TaskStream;

/// Owns the event bus and every open task stream.
///
/// At most one stream exists per task id; reopening an id disposes the old
/// stream first.
pub struct StreamHub {
    bus: EventBus,
    lookup: Arc<dyn ArtifactLookup>,
    config: EngineConfig,
    tasks: DashMap<TaskId, Arc<TaskStream>>,
}

impl StreamHub {
    pub fn new(bus: EventBus, lookup: Arc<dyn ArtifactLookup>, config: EngineConfig) -> Self {
        Self {
            bus,
            lookup,
            config,
            tasks: DashMap::new(),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens a stream for `options.task_id`, replacing any existing one.
    pub fn open(&self, options: TaskOptions) -> Result<Arc<TaskStream>, EngineError> {
        let task_id = options.task_id.clone();
        if let Some((_, previous)) = self.tasks.remove(&task_id) {
            debug!(event = "hub.task_replaced", task_id = %task_id);
            previous.dispose();
        }
        let stream = Arc::new(TaskStream::open(
            &self.bus,
            Arc::clone(&self.lookup),
            self.config.clone(),
            options,
        )?);
        self.tasks.insert(task_id, Arc::clone(&stream));
        Ok(stream)
    }

    pub fn get(&self, task_id: &TaskId) -> Option<Arc<TaskStream>> {
        self.tasks.get(task_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Publishes `event` on the shared bus.
    pub fn publish(&self, event: &StreamEvent) {
        self.bus.publish(event);
    }

    /// Disposes and forgets the stream for `task_id`. Returns whether one existed.
    pub fn dispose(&self, task_id: &TaskId) -> bool {
        match self.tasks.remove(task_id) {
            Some((_, stream)) => {
                stream.dispose();
                true
            }
            None => false,
        }
    }

    pub fn dispose_all(&self) {
        let ids: Vec<TaskId> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.dispose(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for StreamHub {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::StaticArtifactLookup;
    use crate::stream::EventKind;

    fn hub() -> StreamHub {
        StreamHub::new(
            EventBus::new(),
            Arc::new(StaticArtifactLookup::new()),
            EngineConfig::default(),
        )
    }

    fn section(task: &str, text: &str) -> StreamEvent {
        StreamEvent::AssistantSection {
            task_id: task.into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn routes_events_to_open_tasks() {
        let hub = hub();
        let a = hub.open(TaskOptions::assistant("a")).expect("open a");
        let b = hub.open(TaskOptions::assistant("b")).expect("open b");

        hub.publish(&section("b", "for b"));

        assert_eq!(a.state().current_section_text, "");
        assert_eq!(b.state().current_section_text, "for b");
        assert_eq!(hub.len(), 2);
    }

    #[tokio::test]
    async fn reopening_disposes_previous_stream() {
        let hub = hub();
        let first = hub.open(TaskOptions::assistant("a")).expect("open");
        let second = hub.open(TaskOptions::assistant("a")).expect("reopen");

        assert!(first.is_disposed());
        assert!(!second.is_disposed());
        assert_eq!(hub.len(), 1);
        assert_eq!(hub.bus().subscriber_count(EventKind::AssistantSection), 1);

        hub.publish(&section("a", "fresh"));
        assert_eq!(first.state().current_section_text, "");
        assert_eq!(second.state().current_section_text, "fresh");
    }

    #[tokio::test]
    async fn dispose_removes_and_unsubscribes() {
        let hub = hub();
        let stream = hub.open(TaskOptions::assistant("a")).expect("open");
        let id = TaskId::new("a");

        assert!(hub.dispose(&id));
        assert!(!hub.dispose(&id));
        assert!(stream.is_disposed());
        assert!(hub.get(&id).is_none());
        assert_eq!(hub.bus().subscriber_count(EventKind::MessageStart), 0);
    }

    #[tokio::test]
    async fn dispose_all_empties_the_hub() {
        let hub = hub();
        for id in ["a", "b", "c"] {
            hub.open(TaskOptions::assistant(id)).expect("open");
        }
        hub.dispose_all();
        assert!(hub.is_empty());
        assert_eq!(hub.bus().subscriber_count(EventKind::FinalResponse), 0);
    }
}

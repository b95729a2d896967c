//! Per-task stream state machine.
//!
//! A `TaskStream` subscribes to every event kind on an `EventBus`, keeps the
//! events addressed to its task, folds them through a pure reducer and
//! republishes the reconciled `TaskStreamState` on a watch channel. Timers
//! (display debounce, slide-in window) and the artifact retrieval loop run as
//! tokio tasks bound to cancellation tokens released by `dispose()`.

mod reducer;
mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::artifacts::{Artifact, ArtifactLookup, RetrievalOutcome, retrieve_artifacts};
use crate::bus::{EventBus, Subscription};
use crate::cancel::{CancelHandle, CancelToken, cancel_pair};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::model::{ArtifactKey, TaskId, TaskOptions};
use crate::stream::{EventKind, StreamEvent};

use reducer::{Effects, TaskReducer};

pub use reducer::RenderPosition;
pub use state::{DisplayBody, TaskStreamState, TaskView};

struct TaskCore {
    reducer: TaskReducer,
    artifacts_cancel: Option<CancelHandle>,
}

struct TaskShared {
    task_id: TaskId,
    artifact_key: Option<ArtifactKey>,
    config: EngineConfig,
    lookup: Arc<dyn ArtifactLookup>,
    runtime: Handle,
    core: Mutex<TaskCore>,
    state_tx: watch::Sender<TaskStreamState>,
    disposed: AtomicBool,
    lifetime: CancelHandle,
}

/// Live reconciliation of one task's event stream.
pub struct TaskStream {
    shared: Arc<TaskShared>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl TaskStream {
    /// Opens a stream for `options.task_id` and subscribes it to `bus`.
    ///
    /// Must be called from within a tokio runtime. When the options say
    /// artifacts are expected, retrieval starts immediately.
    pub fn open(
        bus: &EventBus,
        lookup: Arc<dyn ArtifactLookup>,
        config: EngineConfig,
        options: TaskOptions,
    ) -> Result<Self, EngineError> {
        if options.task_id.as_str().trim().is_empty() {
            return Err(EngineError::Validation("task id must not be empty".into()));
        }
        let runtime = Handle::try_current().map_err(|e| EngineError::NoRuntime(e.to_string()))?;

        let reducer = TaskReducer::new(&options, config.default_timeout_message.clone());
        let (state_tx, _) = watch::channel(reducer.state().clone());
        let (lifetime, _) = cancel_pair();
        let shared = Arc::new(TaskShared {
            task_id: options.task_id.clone(),
            artifact_key: options.artifact_key(),
            config,
            lookup,
            runtime,
            core: Mutex::new(TaskCore {
                reducer,
                artifacts_cancel: None,
            }),
            state_tx,
            disposed: AtomicBool::new(false),
            lifetime,
        });

        let subscriptions = EventKind::ALL
            .iter()
            .map(|kind| {
                let weak: Weak<TaskShared> = Arc::downgrade(&shared);
                bus.subscribe(*kind, move |event| {
                    if let Some(shared) = weak.upgrade() {
                        shared.handle(event);
                    }
                })
            })
            .collect();

        debug!(
            event = "task.opened",
            task_id = %shared.task_id,
            role = ?options.role,
            has_artifact_context = shared.artifact_key.is_some(),
            expects_artifacts = options.expects_artifacts
        );
        if options.expects_artifacts {
            shared.start_artifact_retrieval();
        }

        Ok(Self {
            shared,
            subscriptions: Mutex::new(subscriptions),
        })
    }

    pub fn task_id(&self) -> &TaskId {
        &self.shared.task_id
    }

    /// Snapshot of the current reconciled state.
    pub fn state(&self) -> TaskStreamState {
        self.shared.state_tx.borrow().clone()
    }

    /// Render-ready projection of the current state.
    pub fn view(&self) -> TaskView {
        self.shared.state_tx.borrow().view()
    }

    /// Receiver notified after every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<TaskStreamState> {
        self.shared.state_tx.subscribe()
    }

    /// Reports where the presentation layer draws this task; used to size the
    /// slide-in for user submissions.
    pub fn set_render_position(&self, position: RenderPosition) {
        self.shared.lock_core().reducer.set_render_position(position);
    }

    /// Starts artifact retrieval because task metadata says files exist.
    pub fn request_artifacts(&self) {
        if self.is_disposed() {
            return;
        }
        self.shared.start_artifact_retrieval();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }

    /// Unsubscribes from the bus and cancels timers and artifact retrieval.
    /// No state change is published afterwards. Idempotent.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscriptions = std::mem::take(
            &mut *self
                .subscriptions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        {
            let mut core = self.shared.lock_core();
            if let Some(cancel) = core.artifacts_cancel.take() {
                cancel.cancel();
            }
        }
        self.shared.lifetime.cancel();
        debug!(event = "task.disposed", task_id = %self.shared.task_id);
    }
}

impl Drop for TaskStream {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl TaskShared {
    fn lock_core(&self) -> MutexGuard<'_, TaskCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn handle(self: &Arc<Self>, event: &StreamEvent) {
        if self.is_disposed() {
            return;
        }
        let effects = {
            let mut core = self.lock_core();
            if !core.reducer.accepts(event) {
                return;
            }
            let effects = core.reducer.apply(event);
            if effects.cancel_artifacts
                && let Some(cancel) = core.artifacts_cancel.take()
            {
                cancel.cancel();
            }
            if effects.changed {
                self.state_tx.send_replace(core.reducer.state().clone());
            }
            effects
        };
        debug!(
            event = "task.event_applied",
            task_id = %self.task_id,
            kind = %event.kind(),
            changed = effects.changed
        );
        self.run_effects(&effects);
    }

    fn run_effects(self: &Arc<Self>, effects: &Effects) {
        if let Some(generation) = effects.schedule_display {
            let delay = self.config.display_delay;
            self.after(delay, move |core| core.reducer.mark_visible(generation));
        }
        if let Some(slide_generation) = effects.schedule_slide_clear {
            let window = self.config.slide_in_window;
            self.after(window, move |core| core.reducer.clear_slide(slide_generation));
        }
        if effects.fetch_artifacts {
            self.start_artifact_retrieval();
        }
    }

    /// Runs `update` after `delay` unless the task is disposed first.
    fn after<F>(self: &Arc<Self>, delay: std::time::Duration, update: F)
    where
        F: FnOnce(&mut TaskCore) -> bool + Send + 'static,
    {
        let weak = Arc::downgrade(self);
        let lifetime = self.lifetime.token();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = lifetime.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(shared) = weak.upgrade() {
                        shared.update_if_live(update);
                    }
                }
            }
        });
    }

    fn update_if_live<F>(&self, update: F)
    where
        F: FnOnce(&mut TaskCore) -> bool,
    {
        if self.is_disposed() {
            return;
        }
        let mut core = self.lock_core();
        if update(&mut *core) {
            self.state_tx.send_replace(core.reducer.state().clone());
        }
    }

    fn start_artifact_retrieval(self: &Arc<Self>) {
        let Some(key) = self.artifact_key.clone() else {
            debug!(
                event = "artifact.retrieval_skipped",
                task_id = %self.task_id,
                reason = "no assistant project/agent context"
            );
            return;
        };
        let (handle, token) = cancel_pair();
        {
            let mut core = self.lock_core();
            if let Some(previous) = core.artifacts_cancel.replace(handle) {
                previous.cancel();
            }
        }
        info!(event = "artifact.retrieval_started", task_id = %self.task_id, key = %key);

        let weak = Arc::downgrade(self);
        let lookup = Arc::clone(&self.lookup);
        let policy = self.config.artifact_retry.clone();
        self.runtime.spawn(async move {
            let outcome = retrieve_artifacts(lookup.as_ref(), &key, &policy, &token).await;
            if let RetrievalOutcome::Found(artifacts) = outcome
                && let Some(shared) = weak.upgrade()
            {
                shared.apply_artifacts(artifacts, &token);
            }
        });
    }

    fn apply_artifacts(&self, artifacts: Vec<Artifact>, token: &CancelToken) {
        if self.is_disposed() {
            return;
        }
        let mut core = self.lock_core();
        // Re-checked under the lock: cancellation always happens while holding it.
        if token.is_cancelled() {
            return;
        }
        let count = artifacts.len();
        if core.reducer.set_artifacts(artifacts) {
            self.state_tx.send_replace(core.reducer.state().clone());
            info!(
                event = "artifact.retrieval_applied",
                task_id = %self.task_id,
                count = count as u64
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::StaticArtifactLookup;
    use crate::errors::LookupError;
    use crate::policy::RetryPolicy;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    const TASK: &str = "task-1";

    struct CountingLookup {
        calls: AtomicU32,
        artifacts: Vec<Artifact>,
    }

    impl CountingLookup {
        fn returning(artifacts: Vec<Artifact>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                artifacts,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ArtifactLookup for CountingLookup {
        async fn list(&self, _key: &ArtifactKey) -> Result<Vec<Artifact>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.artifacts.clone())
        }
    }

    fn artifact(name: &str) -> Artifact {
        Artifact {
            filename: name.to_string(),
            size: 1,
            last_modified: None,
            download_url: format!("/files/{name}"),
        }
    }

    fn options() -> TaskOptions {
        TaskOptions::assistant(TASK).project("p1").agent("a1")
    }

    fn open(bus: &EventBus, lookup: Arc<dyn ArtifactLookup>, options: TaskOptions) -> TaskStream {
        TaskStream::open(bus, lookup, EngineConfig::default(), options).expect("open")
    }

    fn ev_start() -> StreamEvent {
        StreamEvent::MessageStart {
            task_id: TASK.into(),
        }
    }

    fn ev_complete() -> StreamEvent {
        StreamEvent::MessageComplete {
            task_id: TASK.into(),
        }
    }

    /// Lets spawned tasks and (paused) timers run to quiescence.
    async fn settle() {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_tool_section_completion() {
        let bus = EventBus::new();
        let lookup = CountingLookup::returning(vec![artifact("out.csv")]);
        let stream = open(&bus, lookup.clone(), options());

        bus.publish(&ev_start());
        bus.publish(&StreamEvent::ToolUseStart {
            task_id: TASK.into(),
            tool_id: "t1".into(),
            tool_name: "Read".into(),
            input: serde_json::Map::new(),
        });
        bus.publish(&StreamEvent::ToolUseComplete {
            task_id: TASK.into(),
            tool_id: "t1".into(),
            result: serde_json::json!("ok"),
        });
        bus.publish(&StreamEvent::AssistantSection {
            task_id: TASK.into(),
            text: "done".into(),
        });
        bus.publish(&ev_complete());
        bus.publish(&ev_complete());
        settle().await;

        let state = stream.state();
        assert_eq!(state.current_section_text, "done");
        assert!(state.tool_calls().is_empty());
        assert!(!state.is_streaming);
        assert!(state.is_visible);
        assert_eq!(state.artifacts, vec![artifact("out.csv")]);
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn display_flag_waits_for_debounce() {
        let bus = EventBus::new();
        let stream = open(&bus, Arc::new(StaticArtifactLookup::new()), options());

        bus.publish(&ev_start());
        assert!(stream.state().is_streaming);
        assert!(!stream.state().is_visible);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stream.state().is_visible);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(stream.state().is_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn interleaved_tasks_stay_independent() {
        let bus = EventBus::new();
        let lookup: Arc<dyn ArtifactLookup> = Arc::new(StaticArtifactLookup::new());
        let first = open(&bus, Arc::clone(&lookup), TaskOptions::assistant("a"));
        let second = open(&bus, Arc::clone(&lookup), TaskOptions::assistant("b"));

        for (task, text) in [("a", "alpha"), ("b", "beta"), ("a", "alpha 2")] {
            bus.publish(&StreamEvent::AssistantSection {
                task_id: task.into(),
                text: text.into(),
            });
        }
        bus.publish(&StreamEvent::FinalResponse {
            task_id: "b".into(),
            response: "final beta".into(),
        });

        assert_eq!(first.state().current_section_text, "alpha 2");
        assert_eq!(first.state().final_response, None);
        assert_eq!(second.view().body, DisplayBody::Final("final beta".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn state_subscribers_observe_updates() {
        let bus = EventBus::new();
        let stream = open(&bus, Arc::new(StaticArtifactLookup::new()), options());
        let mut rx = stream.subscribe_state();

        bus.publish(&ev_start());
        rx.changed().await.expect("changed");
        assert!(rx.borrow_and_update().is_streaming);

        bus.publish(&StreamEvent::FinalResponse {
            task_id: TASK.into(),
            response: "answer".into(),
        });
        rx.changed().await.expect("changed");
        assert_eq!(rx.borrow().final_response.as_deref(), Some("answer"));
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_unsubscribes_and_cancels_retrieval() {
        let bus = EventBus::new();
        let lookup = CountingLookup::returning(Vec::new());
        let stream = open(&bus, lookup.clone(), options());

        bus.publish(&ev_start());
        bus.publish(&ev_complete());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(lookup.calls(), 1);

        stream.dispose();
        assert_eq!(bus.subscriber_count(EventKind::MessageStart), 0);
        settle().await;
        assert_eq!(lookup.calls(), 1);

        bus.publish(&StreamEvent::AssistantSection {
            task_id: TASK.into(),
            text: "ignored".into(),
        });
        assert_eq!(stream.state().current_section_text, "");
    }

    #[tokio::test(start_paused = true)]
    async fn new_stream_cancels_previous_retrieval() {
        let bus = EventBus::new();
        let lookup = CountingLookup::returning(Vec::new());
        let config = EngineConfig::default().artifact_retry(RetryPolicy::default());
        let _stream = TaskStream::open(&bus, lookup.clone(), config, options()).expect("open");

        bus.publish(&ev_start());
        bus.publish(&ev_complete());
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish(&ev_start());
        settle().await;

        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_and_owner_error_fetch_artifacts_once() {
        let endings = [
            StreamEvent::TaskTimeout {
                task_id: TASK.into(),
                message: None,
            },
            StreamEvent::StreamError {
                task_id: TASK.into(),
                agent_id: "a1".into(),
                error: "upstream failed".into(),
            },
        ];
        for ending in endings {
            let bus = EventBus::new();
            let lookup = CountingLookup::returning(vec![artifact("partial.txt")]);
            let stream = open(&bus, lookup.clone(), options());

            bus.publish(&ev_start());
            bus.publish(&ending);
            bus.publish(&ev_complete());
            settle().await;

            assert!(!stream.state().is_streaming);
            assert_eq!(lookup.calls(), 1, "{:?}", ending.kind());
            assert_eq!(stream.state().artifacts, vec![artifact("partial.txt")]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_hint_fetches_on_open() {
        let bus = EventBus::new();
        let lookup = CountingLookup::returning(vec![artifact("a.png")]);
        let stream = open(
            &bus,
            lookup.clone(),
            options().initial_content("earlier answer").expects_artifacts(true),
        );
        settle().await;

        assert_eq!(lookup.calls(), 1);
        assert_eq!(stream.view().artifacts.len(), 1);
        assert_eq!(stream.view().body, DisplayBody::Text("earlier answer".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_without_context_never_fetch() {
        let bus = EventBus::new();
        let lookup = CountingLookup::returning(vec![artifact("a.png")]);
        let _stream = open(&bus, lookup.clone(), TaskOptions::assistant(TASK));

        bus.publish(&ev_start());
        bus.publish(&ev_complete());
        settle().await;

        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slide_in_clears_after_window() {
        let bus = EventBus::new();
        let stream = open(
            &bus,
            Arc::new(StaticArtifactLookup::new()),
            TaskOptions::user("u1", "hello"),
        );
        stream.set_render_position(RenderPosition {
            element_top: 100.0,
            viewport_bottom: 340.0,
        });

        bus.publish(&StreamEvent::UserMessageSubmit {
            task_id: "composer".into(),
            text: "hello".into(),
        });
        assert_eq!(stream.state().slide_in, Some(240.0));

        settle().await;
        assert_eq!(stream.state().slide_in, None);
    }

    #[test]
    fn open_outside_runtime_fails() {
        let bus = EventBus::new();
        let result = TaskStream::open(
            &bus,
            Arc::new(StaticArtifactLookup::new()),
            EngineConfig::default(),
            options(),
        );
        assert!(matches!(result, Err(EngineError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn empty_task_id_is_rejected() {
        let bus = EventBus::new();
        let result = TaskStream::open(
            &bus,
            Arc::new(StaticArtifactLookup::new()),
            EngineConfig::default(),
            TaskOptions::assistant("  "),
        );
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}

//! Activity recording.
//!
//! Policy creation and every evaluation leave an entry in the surrounding
//! system's activity feed. Recording is a side channel: it happens after the
//! primary operation has committed, and a failing sink is logged and
//! otherwise ignored.

use parking_lot::Mutex;
use rights_core::error::Result;
use rights_core::id::{ActorId, ProjectId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Event type recorded for policy creation and evaluation.
pub const POLICY_EVALUATED: &str = "policy_evaluated";

/// Entity type of activity about a policy.
pub const ENTITY_POLICY: &str = "rights_policy";

/// Entity type of activity about a decision.
pub const ENTITY_DECISION: &str = "rights_decision";

/// One activity feed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Who caused the activity, `None` when the caller did not say.
    pub actor_id: Option<ActorId>,

    /// Project context, when the caller supplied one.
    pub project_id: Option<ProjectId>,

    /// What happened.
    pub event_type: String,

    /// Kind of entity the activity concerns.
    pub entity_type: String,

    /// Id of that entity.
    pub entity_id: i64,

    /// Short human-readable summary.
    pub title: Option<String>,
}

impl ActivityEvent {
    /// Create an event with no project context and no title.
    pub fn new(
        actor_id: impl Into<Option<ActorId>>,
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: i64,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            project_id: None,
            event_type: event_type.into(),
            entity_type: entity_type.into(),
            entity_id,
            title: None,
        }
    }

    /// Attach project context.
    pub fn in_project(mut self, project_id: Option<ProjectId>) -> Self {
        self.project_id = project_id;
        self
    }

    /// Attach a title.
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Destination for activity events.
pub trait ActivitySink: Send + Sync {
    /// Record one event.
    fn record(&self, event: &ActivityEvent) -> Result<()>;
}

impl<S: ActivitySink + ?Sized> ActivitySink for Arc<S> {
    fn record(&self, event: &ActivityEvent) -> Result<()> {
        (**self).record(event)
    }
}

/// Record an event, logging instead of failing.
pub fn emit_best_effort(sink: &dyn ActivitySink, event: &ActivityEvent) {
    if let Err(err) = sink.record(event) {
        warn!(
            error = %err,
            event_type = %event.event_type,
            entity_type = %event.entity_type,
            entity_id = event.entity_id,
            "Failed to record activity"
        );
    }
}

/// Sink that writes each event as a structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, event: &ActivityEvent) -> Result<()> {
        info!(
            actor_id = ?event.actor_id.map(|id| id.value()),
            project_id = ?event.project_id.map(|id| id.value()),
            event_type = %event.event_type,
            entity_type = %event.entity_type,
            entity_id = event.entity_id,
            title = event.title.as_deref().unwrap_or(""),
            "activity"
        );
        Ok(())
    }
}

/// Sink that keeps events in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActivitySink {
    events: Arc<Mutex<Vec<ActivityEvent>>>,
}

impl InMemoryActivitySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().clone()
    }
}

impl ActivitySink for InMemoryActivitySink {
    fn record(&self, event: &ActivityEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

//! Domain events raised by the CRUD workflow.
//!
//! Listeners subscribe per event name with a weight (lower runs first) and
//! do the actual persisting. Any listener may stop propagation, which skips
//! the remaining listeners and every later event in the batch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

/// A change about to be applied to an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// An entity is about to be created or updated.
    EntityChangeIntended {
        entity_type: String,
        entity: serde_json::Value,
        /// True for a new entity, false for an update.
        created: bool,
    },
    /// An entity is about to be removed.
    EntityRemovalIntended {
        entity_type: String,
        entity: serde_json::Value,
    },
}

impl DomainEvent {
    pub const CHANGE_INTENDED: &'static str = "entity.change_intended";
    pub const REMOVAL_INTENDED: &'static str = "entity.removal_intended";

    pub fn change_intended(
        entity_type: impl Into<String>,
        entity: serde_json::Value,
        created: bool,
    ) -> Self {
        DomainEvent::EntityChangeIntended {
            entity_type: entity_type.into(),
            entity,
            created,
        }
    }

    pub fn removal_intended(entity_type: impl Into<String>, entity: serde_json::Value) -> Self {
        DomainEvent::EntityRemovalIntended {
            entity_type: entity_type.into(),
            entity,
        }
    }

    /// Name listeners subscribe to.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::EntityChangeIntended { .. } => Self::CHANGE_INTENDED,
            DomainEvent::EntityRemovalIntended { .. } => Self::REMOVAL_INTENDED,
        }
    }

    pub fn entity_type(&self) -> &str {
        match self {
            DomainEvent::EntityChangeIntended { entity_type, .. }
            | DomainEvent::EntityRemovalIntended { entity_type, .. } => entity_type,
        }
    }

    pub fn entity(&self) -> &serde_json::Value {
        match self {
            DomainEvent::EntityChangeIntended { entity, .. }
            | DomainEvent::EntityRemovalIntended { entity, .. } => entity,
        }
    }
}

/// Whether later listeners (and later events) still run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle(&self, event: &DomainEvent) -> Result<Propagation>;
}

#[derive(Clone)]
struct Subscription {
    listener: Arc<dyn EventListener>,
    weight: i32,
}

/// Event dispatcher. Listeners are registered at startup.
#[derive(Default, Clone)]
pub struct EventService {
    listeners: HashMap<String, Vec<Subscription>>,
}

impl fmt::Debug for EventService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .listeners
            .iter()
            .map(|(name, subs)| (name.as_str(), subs.len()))
            .collect();
        f.debug_struct("EventService")
            .field("listeners", &counts)
            .finish()
    }
}

impl EventService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener. Equal weights keep registration order.
    pub fn subscribe(
        &mut self,
        event_name: &str,
        weight: i32,
        listener: Arc<dyn EventListener>,
    ) -> &mut Self {
        let subs = self.listeners.entry(event_name.to_string()).or_default();
        subs.push(Subscription { listener, weight });
        subs.sort_by_key(|s| s.weight);
        self
    }

    pub fn has_listeners(&self, event_name: &str) -> bool {
        self.listeners
            .get(event_name)
            .is_some_and(|subs| !subs.is_empty())
    }

    /// Dispatch one event. Returns false if a listener stopped propagation.
    ///
    /// A failing listener is logged and skipped.
    pub async fn dispatch(&self, event: &DomainEvent) -> bool {
        let Some(subs) = self.listeners.get(event.name()) else {
            debug!(event = event.name(), "no listeners registered for event");
            return true;
        };

        for sub in subs {
            match sub.listener.handle(event).await {
                Ok(Propagation::Continue) => {}
                Ok(Propagation::Stop) => {
                    debug!(
                        event = event.name(),
                        entity_type = event.entity_type(),
                        weight = sub.weight,
                        "event propagation stopped"
                    );
                    return false;
                }
                Err(e) => {
                    error!(
                        event = event.name(),
                        entity_type = event.entity_type(),
                        error = %e,
                        "event listener failed"
                    );
                }
            }
        }

        true
    }

    /// Dispatch events in order, stopping at the first stopped one.
    ///
    /// Returns true only when every event ran to completion.
    pub async fn dispatch_all(&self, events: &[DomainEvent]) -> bool {
        for event in events {
            if !self.dispatch(event).await {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records its tag on every call and answers with a fixed result.
    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        answer: fn() -> Result<Propagation>,
    }

    #[async_trait]
    impl EventListener for Recorder {
        async fn handle(&self, _event: &DomainEvent) -> Result<Propagation> {
            self.log.lock().unwrap().push(self.tag);
            (self.answer)()
        }
    }

    fn recorder(
        tag: &'static str,
        log: &Arc<Mutex<Vec<&'static str>>>,
        answer: fn() -> Result<Propagation>,
    ) -> Arc<dyn EventListener> {
        Arc::new(Recorder {
            tag,
            log: Arc::clone(log),
            answer,
        })
    }

    fn change() -> DomainEvent {
        DomainEvent::change_intended("BlogPost", serde_json::json!({"id": 1}), true)
    }

    #[test]
    fn event_names() {
        assert_eq!(change().name(), "entity.change_intended");
        assert_eq!(
            DomainEvent::removal_intended("BlogPost", serde_json::json!({})).name(),
            "entity.removal_intended"
        );
        assert_eq!(change().entity_type(), "BlogPost");
    }

    #[tokio::test]
    async fn listeners_run_in_weight_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventService::new();
        events
            .subscribe(DomainEvent::CHANGE_INTENDED, 10, recorder("late", &log, || Ok(Propagation::Continue)))
            .subscribe(DomainEvent::CHANGE_INTENDED, -5, recorder("early", &log, || Ok(Propagation::Continue)))
            .subscribe(DomainEvent::CHANGE_INTENDED, 10, recorder("later", &log, || Ok(Propagation::Continue)));

        assert!(events.dispatch(&change()).await);
        assert_eq!(*log.lock().unwrap(), vec!["early", "late", "later"]);
    }

    #[tokio::test]
    async fn stop_skips_remaining_listeners_and_events() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventService::new();
        events
            .subscribe(DomainEvent::CHANGE_INTENDED, 0, recorder("veto", &log, || Ok(Propagation::Stop)))
            .subscribe(DomainEvent::CHANGE_INTENDED, 1, recorder("after", &log, || Ok(Propagation::Continue)))
            .subscribe(DomainEvent::REMOVAL_INTENDED, 0, recorder("removal", &log, || Ok(Propagation::Continue)));

        let batch = vec![
            change(),
            DomainEvent::removal_intended("BlogPost", serde_json::json!({})),
        ];
        assert!(!events.dispatch_all(&batch).await);
        assert_eq!(*log.lock().unwrap(), vec!["veto"]);
    }

    #[tokio::test]
    async fn failing_listener_is_skipped() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventService::new();
        events
            .subscribe(DomainEvent::CHANGE_INTENDED, 0, recorder("broken", &log, || Err(anyhow::anyhow!("boom"))))
            .subscribe(DomainEvent::CHANGE_INTENDED, 1, recorder("ok", &log, || Ok(Propagation::Continue)));

        assert!(events.dispatch_all(&[change()]).await);
        assert_eq!(*log.lock().unwrap(), vec!["broken", "ok"]);
    }

    #[tokio::test]
    async fn no_listeners_continues() {
        let events = EventService::new();
        assert!(!events.has_listeners(DomainEvent::CHANGE_INTENDED));
        assert!(events.dispatch_all(&[change()]).await);
        assert!(events.dispatch_all(&[]).await);
    }
}

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::scraper::listing::EventData;

pub type ListenerId = u64;

const BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Data,
    Error,
    InvalidSession,
    End,
}

/// Identifies one (query, location) run. `run_id` tells apart concurrent
/// runs of the same pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: Uuid,
    pub query: String,
    pub location: String,
}

impl RunContext {
    pub fn new(query: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.into(),
            location: location.into(),
        }
    }

    /// Log prefix shared by everything the run writes.
    pub fn tag(&self) -> String {
        format!("[{}][{}]", self.query, self.location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub context: RunContext,
    /// Set when the failure belongs to a single listing attempt.
    pub job_index: Option<usize>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Done,
    Aborted(String),
}

impl RunOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, RunOutcome::Aborted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub context: RunContext,
    pub processed: usize,
    pub failed: usize,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeEvent {
    Data(EventData),
    Error(ErrorEvent),
    InvalidSession(RunContext),
    End(RunSummary),
}

impl ScrapeEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ScrapeEvent::Data(_) => Topic::Data,
            ScrapeEvent::Error(_) => Topic::Error,
            ScrapeEvent::InvalidSession(_) => Topic::InvalidSession,
            ScrapeEvent::End(_) => Topic::End,
        }
    }
}

type Callback = Arc<dyn Fn(&ScrapeEvent) -> Result<()> + Send + Sync>;

struct Listener {
    id: ListenerId,
    topic: Topic,
    once: bool,
    callback: Callback,
}

/// Process-wide publish/subscribe register for scrape lifecycle events.
///
/// Listeners run synchronously, in registration order, on the emitting task.
/// A listener that fails or panics is logged and skipped; the emitter never
/// sees the failure.
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
    broadcaster: broadcast::Sender<ScrapeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (broadcaster, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            broadcaster,
        }
    }

    /// Register a callback for every event of `topic`.
    pub fn on<F>(&self, topic: Topic, callback: F) -> ListenerId
    where
        F: Fn(&ScrapeEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.register(topic, false, Arc::new(callback))
    }

    /// Register a callback that is removed after its first dispatch.
    pub fn once<F>(&self, topic: Topic, callback: F) -> ListenerId
    where
        F: Fn(&ScrapeEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.register(topic, true, Arc::new(callback))
    }

    pub fn on_data<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&EventData) -> Result<()> + Send + Sync + 'static,
    {
        self.on(Topic::Data, move |event| match event {
            ScrapeEvent::Data(data) => callback(data),
            _ => Ok(()),
        })
    }

    pub fn on_error<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&ErrorEvent) -> Result<()> + Send + Sync + 'static,
    {
        self.on(Topic::Error, move |event| match event {
            ScrapeEvent::Error(error) => callback(error),
            _ => Ok(()),
        })
    }

    pub fn on_invalid_session<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&RunContext) -> Result<()> + Send + Sync + 'static,
    {
        self.on(Topic::InvalidSession, move |event| match event {
            ScrapeEvent::InvalidSession(context) => callback(context),
            _ => Ok(()),
        })
    }

    pub fn on_end<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&RunSummary) -> Result<()> + Send + Sync + 'static,
    {
        self.on(Topic::End, move |event| match event {
            ScrapeEvent::End(summary) => callback(summary),
            _ => Ok(()),
        })
    }

    /// Returns `false` when no listener had this id.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    pub fn remove_all_listeners(&self, topic: Topic) {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|l| l.topic != topic);
    }

    pub fn listener_count(&self, topic: Topic) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        listeners.iter().filter(|l| l.topic == topic).count()
    }

    /// Receive every emitted event asynchronously. Slow receivers may lag and
    /// miss events; synchronous listeners never do.
    pub fn subscribe(&self) -> broadcast::Receiver<ScrapeEvent> {
        self.broadcaster.subscribe()
    }

    pub fn emit(&self, event: ScrapeEvent) {
        let topic = event.topic();

        // Snapshot so listeners may register or remove listeners while running.
        // Once-listeners leave the registry under the same lock, so concurrent
        // emitters cannot both claim one.
        let targets: Vec<(ListenerId, Callback)> = {
            let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
            let targets = listeners
                .iter()
                .filter(|l| l.topic == topic)
                .map(|l| (l.id, l.callback.clone()))
                .collect();
            listeners.retain(|l| !(l.once && l.topic == topic));
            targets
        };

        for (id, callback) in targets {
            match catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Listener {} for {:?} failed: {}", id, topic, e),
                Err(_) => warn!("Listener {} for {:?} panicked", id, topic),
            }
        }

        if self.broadcaster.send(event).is_err() {
            debug!("No async subscribers for {:?}", topic);
        }
    }

    fn register(&self, topic: Topic, once: bool, callback: Callback) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners.push(Listener {
            id,
            topic,
            once,
            callback,
        });
        id
    }
}

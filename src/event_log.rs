//! Ring-buffered, broadcastable event log for ambient observability
//! (gc/abort/interrupt/stack-shift notices).
//!
//! `tracing` covers structured logging for operators reading stdout; this
//! module additionally keeps a bounded in-memory history and a broadcast
//! channel so a running engine can be introspected or streamed to (the same
//! split the teacher keeps between its `tracing` calls and `ChainEmitter`).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    GcStart,
    GcEnd,
    HeapShift,
    ChoiceTrailShift,
    LocalShift,
    Abort,
    Interrupted,
    PredicateAbolished,
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.detail)
    }
}

pub struct EventLog {
    history: Mutex<VecDeque<EngineEvent>>,
    max_history: usize,
    tx: broadcast::Sender<EngineEvent>,
}

impl EventLog {
    pub fn new(max_history: usize) -> Self {
        let (tx, _) = broadcast::channel(1000);
        EventLog { history: Mutex::new(VecDeque::with_capacity(max_history)), max_history, tx }
    }

    pub fn publish(&self, kind: EventKind, detail: impl Into<String>) {
        let event = EngineEvent { at: Utc::now(), kind, detail: detail.into() };
        tracing::debug!(kind = ?event.kind, detail = %event.detail, "engine event");
        let mut history = self.history.lock().unwrap();
        if history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(event.clone());
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn history(&self) -> Vec<EngineEvent> {
        self.history.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_bounded() {
        let log = EventLog::new(2);
        log.publish(EventKind::HeapShift, "a");
        log.publish(EventKind::HeapShift, "b");
        log.publish(EventKind::HeapShift, "c");
        let h = log.history();
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].detail, "b");
        assert_eq!(h[1].detail, "c");
    }

    #[test]
    fn subscribers_receive_published_events() {
        let log = EventLog::new(10);
        let mut rx = log.subscribe();
        log.publish(EventKind::Abort, "serious fault");
        let received = rx.try_recv().unwrap();
        assert_eq!(received.kind, EventKind::Abort);
    }
}

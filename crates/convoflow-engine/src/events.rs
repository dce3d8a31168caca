//! Engine event system for observability.
//!
//! Emits [`EngineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (loggers, dashboards, tests) can follow a session without
//! coupling to the engine internals.

use serde::{Deserialize, Serialize};

use crate::engine::Termination;

/// Events emitted during a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    SessionStarted {
        session_id: String,
        start_node: String,
    },
    NodePresented {
        node_id: String,
        terminal: bool,
        depth: usize,
    },
    TransitionTaken {
        from_node: String,
        keyword: String,
        to_node: String,
    },
    Backtracked {
        from_node: String,
        to_node: String,
    },
    AlreadyAtBeginning {
        node_id: String,
    },
    RoutingFailed {
        node_id: String,
        input: String,
    },
    InvalidTransition {
        node_id: String,
        keyword: String,
    },
    NodeNotFound {
        node_id: String,
    },
    SessionEnded {
        session_id: String,
        termination: Termination,
        steps_recorded: usize,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<EngineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_sends_and_receives() {
        let emitter = EventEmitter::new(16);
        let mut rx = emitter.subscribe();

        emitter.emit(EngineEvent::Backtracked {
            from_node: "billing".into(),
            to_node: "start".into(),
        });

        match rx.recv().await.unwrap() {
            EngineEvent::Backtracked { from_node, to_node } => {
                assert_eq!(from_node, "billing");
                assert_eq!(to_node, "start");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_silent() {
        let emitter = EventEmitter::default();
        emitter.emit(EngineEvent::NodeNotFound {
            node_id: "x".into(),
        });
    }

    #[test]
    fn events_serialize() {
        let event = EngineEvent::SessionEnded {
            session_id: "s".into(),
            termination: Termination::Exit,
            steps_recorded: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["SessionEnded"]["steps_recorded"], 2);
        assert_eq!(json["SessionEnded"]["termination"]["kind"], "exit");
    }
}

//! Dialogue traversal engine: the per-session control loop.
//!
//! A session moves through three states. **Presenting** means the current
//! node's text is on screen and a line of input is awaited. **Resolving**
//! maps that line onto one of the node's transitions. **Terminated** is
//! reached on a terminal node, on `exit`, when input closes, or when a node
//! cannot be found. The recorder's session is closed exactly once on every
//! path out, including fatal collaborator errors.

use std::sync::Arc;

use convoflow_resolver::TransitionResolver;
use convoflow_types::{ConvoflowError, Resolution, Result, SessionId, StepRecord};
use serde::{Deserialize, Serialize};

use crate::accessor::{GraphAccessor, Transitions};
use crate::events::{EngineEvent, EventEmitter};
use crate::graph::DEFAULT_START_NODE;
use crate::prompt::{Notice, Prompter};
use crate::recorder::StepRecorder;
use crate::stack::NavigationStack;

/// Inputs intercepted before the resolver sees them, compared case-insensitively.
pub const RESERVED_COMMANDS: &[&str] = &["exit", "go back"];

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub start_node: String,
}

impl EngineConfig {
    pub fn new(start_node: impl Into<String>) -> Self {
        Self {
            start_node: start_node.into(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_START_NODE)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    TerminalNode { node: String },
    Exit,
    InputClosed,
    StackExhausted,
    NodeNotFound { node: String },
}

/// The result of one completed session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: SessionId,
    /// The navigation stack when the session ended, start node first.
    pub path: Vec<String>,
    pub steps_recorded: usize,
    pub termination: Termination,
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

enum State {
    Presenting {
        node: String,
        transitions: Transitions,
    },
    Resolving {
        node: String,
        transitions: Transitions,
        input: String,
    },
    Terminated(Termination),
}

enum Command {
    Exit,
    GoBack,
}

fn parse_command(input: &str) -> Option<Command> {
    match input.to_lowercase().as_str() {
        "exit" => Some(Command::Exit),
        "go back" => Some(Command::GoBack),
        _ => None,
    }
}

struct Session {
    id: SessionId,
    stack: NavigationStack,
    steps_recorded: usize,
}

// ---------------------------------------------------------------------------
// TraversalEngine
// ---------------------------------------------------------------------------

pub struct TraversalEngine {
    config: EngineConfig,
    graph: Arc<dyn GraphAccessor>,
    resolver: Arc<dyn TransitionResolver>,
    recorder: Arc<dyn StepRecorder>,
    prompter: Arc<dyn Prompter>,
    emitter: EventEmitter,
}

impl TraversalEngine {
    pub fn new(
        config: EngineConfig,
        graph: Arc<dyn GraphAccessor>,
        resolver: Arc<dyn TransitionResolver>,
        recorder: Arc<dyn StepRecorder>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            config,
            graph,
            resolver,
            recorder,
            prompter,
            emitter: EventEmitter::default(),
        }
    }

    pub fn events(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Run one session from the start node until it terminates.
    pub async fn run(&self) -> Result<SessionSummary> {
        let session_id = self.recorder.start_session().await?;
        tracing::info!(session = %session_id, start = %self.config.start_node, resolver = self.resolver.name(), "Session started");
        self.emitter.emit(EngineEvent::SessionStarted {
            session_id: session_id.to_string(),
            start_node: self.config.start_node.clone(),
        });

        let mut session = Session {
            id: session_id,
            stack: NavigationStack::new(self.config.start_node.clone()),
            steps_recorded: 0,
        };
        let outcome = self.drive(&mut session).await;
        let closed = self.recorder.end_session(&session.id).await;

        let termination = match (outcome, closed) {
            (Ok(termination), Ok(())) => termination,
            (Ok(_), Err(e)) => return Err(e),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!(session = %session.id, error = %close_err, "Failed to close session after error");
                }
                tracing::error!(session = %session.id, error = %e, "Session aborted");
                return Err(e);
            }
        };

        tracing::info!(session = %session.id, termination = ?termination, steps = session.steps_recorded, "Session ended");
        self.emitter.emit(EngineEvent::SessionEnded {
            session_id: session.id.to_string(),
            termination: termination.clone(),
            steps_recorded: session.steps_recorded,
        });

        Ok(SessionSummary {
            session_id: session.id,
            path: session.stack.into_path(),
            steps_recorded: session.steps_recorded,
            termination,
        })
    }

    async fn drive(&self, session: &mut Session) -> Result<Termination> {
        self.prompter.notify(&Notice::Banner).await?;
        let mut state = self.enter(session).await?;
        loop {
            state = match state {
                State::Terminated(termination) => return Ok(termination),
                State::Presenting { node, transitions } => {
                    self.await_input(session, node, transitions).await?
                }
                State::Resolving {
                    node,
                    transitions,
                    input,
                } => self.resolve(session, node, transitions, input).await?,
            };
        }
    }

    /// Fetch and show the node on top of the stack.
    async fn enter(&self, session: &Session) -> Result<State> {
        let Some(node) = session.stack.current().map(String::from) else {
            tracing::warn!(session = %session.id, "Navigation stack is empty");
            return Ok(State::Terminated(Termination::StackExhausted));
        };

        let text = match self.graph.node_text(&node).await {
            Ok(text) => text,
            Err(ConvoflowError::NodeNotFound { node }) => return self.node_not_found(node).await,
            Err(e) => return Err(e),
        };
        let transitions = match self.graph.transitions(&node).await {
            Ok(transitions) => transitions,
            Err(ConvoflowError::NodeNotFound { node }) => return self.node_not_found(node).await,
            Err(e) => return Err(e),
        };

        let terminal = transitions.is_empty();
        let depth = session.stack.depth();
        tracing::debug!(node = %node, depth, terminal, "Presenting node");
        self.emitter.emit(EngineEvent::NodePresented {
            node_id: node.clone(),
            terminal,
            depth,
        });
        self.prompter.present(&node, &text).await?;

        if terminal {
            self.prompter.notify(&Notice::SessionComplete).await?;
            return Ok(State::Terminated(Termination::TerminalNode { node }));
        }
        Ok(State::Presenting { node, transitions })
    }

    async fn node_not_found(&self, node: String) -> Result<State> {
        tracing::error!(node = %node, "Node not found in call flow");
        self.emitter.emit(EngineEvent::NodeNotFound {
            node_id: node.clone(),
        });
        self.prompter
            .notify(&Notice::NodeNotFound { node: node.clone() })
            .await?;
        Ok(State::Terminated(Termination::NodeNotFound { node }))
    }

    /// Read one line and intercept the reserved commands.
    async fn await_input(
        &self,
        session: &mut Session,
        node: String,
        transitions: Transitions,
    ) -> Result<State> {
        let Some(raw) = self.prompter.read_input().await? else {
            tracing::info!(node = %node, "Input closed");
            return Ok(State::Terminated(Termination::InputClosed));
        };
        let input = raw.trim().to_string();

        match parse_command(&input) {
            Some(Command::Exit) => {
                tracing::info!(node = %node, "Caller exited");
                Ok(State::Terminated(Termination::Exit))
            }
            Some(Command::GoBack) => {
                if session.stack.go_back() {
                    let to_node = session.stack.current().unwrap_or_default().to_string();
                    tracing::debug!(from = %node, to = %to_node, "Backtracked");
                    self.emitter.emit(EngineEvent::Backtracked {
                        from_node: node,
                        to_node,
                    });
                } else {
                    self.emitter.emit(EngineEvent::AlreadyAtBeginning {
                        node_id: node,
                    });
                    self.prompter.notify(&Notice::AlreadyAtBeginning).await?;
                }
                self.enter(session).await
            }
            None => Ok(State::Resolving {
                node,
                transitions,
                input,
            }),
        }
    }

    /// Map the input onto a transition and advance when it is valid.
    async fn resolve(
        &self,
        session: &mut Session,
        node: String,
        transitions: Transitions,
        input: String,
    ) -> Result<State> {
        let candidates: Vec<String> = transitions.keys().cloned().collect();
        let keyword = match self.resolver.resolve(&input, &candidates).await? {
            Resolution::Keyword(keyword) => keyword,
            Resolution::NoDecision => {
                tracing::info!(node = %node, input = %input, "No transition matched");
                self.emitter.emit(EngineEvent::RoutingFailed {
                    node_id: node.clone(),
                    input: input.clone(),
                });
                self.prompter.notify(&Notice::NoDecision { input }).await?;
                return Ok(State::Presenting { node, transitions });
            }
        };

        let Some(target) = transitions.get(&keyword).cloned() else {
            let violation = ConvoflowError::InvalidTransition {
                node: node.clone(),
                keyword: keyword.clone(),
            };
            tracing::error!(node = %node, keyword = %keyword, resolver = self.resolver.name(), error = %violation, "Resolver contract violation");
            self.emitter.emit(EngineEvent::InvalidTransition {
                node_id: node.clone(),
                keyword,
            });
            self.prompter.notify(&Notice::InvalidTransition).await?;
            return Ok(State::Presenting { node, transitions });
        };

        self.recorder
            .log_step(&StepRecord::new(
                session.id.clone(),
                node.as_str(),
                input.as_str(),
                Some(keyword.as_str()),
            ))
            .await?;
        session.steps_recorded += 1;

        tracing::info!(node = %node, keyword = %keyword, target = %target, "Transition taken");
        self.emitter.emit(EngineEvent::TransitionTaken {
            from_node: node,
            keyword,
            to_node: target.clone(),
        });
        session.stack.push(target);
        self.enter(session).await
    }
}

//! Dialogue traversal engine, call-flow graph, step recorders, and flow validation.
//!
//! This crate implements the ConvoFlow runtime: an in-memory call flow built
//! from DOT, the navigation state machine that walks it one caller turn at a
//! time, recorders that log every routing decision, and the lint rules that
//! catch broken flows before a caller ever reaches them.

pub mod accessor;
pub mod engine;
pub mod events;
pub mod export;
pub mod graph;
pub mod prompt;
pub mod recorder;
pub mod stack;
pub mod validation;

pub use accessor::{GraphAccessor, Transitions};
pub use engine::{EngineConfig, SessionSummary, Termination, TraversalEngine, RESERVED_COMMANDS};
pub use events::{EngineEvent, EventEmitter};
pub use export::export_dot;
pub use graph::{CallFlowGraph, FlowNode, DEFAULT_START_NODE};
pub use prompt::{ConsolePrompter, Notice, Prompter, ScriptedPrompter, Shown};
pub use recorder::{
    JournalEntry, JsonlRecorder, MemoryRecorder, NullRecorder, SqliteRecorder, StepRecorder,
};
pub use stack::NavigationStack;
pub use validation::{validate, validate_or_raise, Diagnostic, LintRule, Severity};

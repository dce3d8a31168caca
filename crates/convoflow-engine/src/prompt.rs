//! The caller-facing surface: shows node text and notices, reads one line
//! of input per turn.

use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use convoflow_types::{ConvoflowError, Result};

/// Messages the engine shows the caller besides node text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// How to use the reserved commands, shown once per session.
    Banner,
    AlreadyAtBeginning,
    NoDecision { input: String },
    InvalidTransition,
    NodeNotFound { node: String },
    SessionComplete,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Banner => write!(
                f,
                "Type 'go back' to return to the previous step.\nType 'exit' to quit."
            ),
            Notice::AlreadyAtBeginning => write!(f, "Already at the beginning."),
            Notice::NoDecision { input } => write!(
                f,
                "Router could not determine a valid transition for '{input}'. Please try again."
            ),
            Notice::InvalidTransition => write!(
                f,
                "Internal Error: Router selected an invalid transition. Please try again."
            ),
            Notice::NodeNotFound { node } => {
                write!(f, "Error: Node '{node}' not found in the database.")
            }
            Notice::SessionComplete => write!(f, "Session complete. Goodbye!"),
        }
    }
}

#[async_trait]
pub trait Prompter: Send + Sync {
    async fn present(&self, node_id: &str, text: &str) -> Result<()>;

    async fn notify(&self, notice: &Notice) -> Result<()>;

    /// One line from the caller, or `None` once input is closed.
    async fn read_input(&self) -> Result<Option<String>>;
}

// ---------------------------------------------------------------------------
// ConsolePrompter
// ---------------------------------------------------------------------------

/// Talks to the caller over stdin/stdout.
pub struct ConsolePrompter;

#[async_trait]
impl Prompter for ConsolePrompter {
    async fn present(&self, node_id: &str, text: &str) -> Result<()> {
        println!("\n[{}]: {}", node_id.to_uppercase(), text);
        Ok(())
    }

    async fn notify(&self, notice: &Notice) -> Result<()> {
        match notice {
            Notice::SessionComplete => println!("\n[{notice}]"),
            _ => println!("{notice}"),
        }
        Ok(())
    }

    async fn read_input(&self) -> Result<Option<String>> {
        print!("You: ");
        std::io::stdout().flush().map_err(ConvoflowError::Io)?;
        let mut line = String::new();
        let read = std::io::stdin()
            .read_line(&mut line)
            .map_err(ConvoflowError::Io)?;
        if read == 0 {
            println!();
            return Ok(None);
        }
        Ok(Some(line))
    }
}

// ---------------------------------------------------------------------------
// ScriptedPrompter
// ---------------------------------------------------------------------------

/// Something the engine showed the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Node { id: String, text: String },
    Notice(Notice),
}

/// Plays back queued input lines and records everything shown.
pub struct ScriptedPrompter {
    inputs: Mutex<VecDeque<String>>,
    shown: Mutex<Vec<Shown>>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: Mutex::new(inputs.into_iter().map(Into::into).collect()),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn transcript(&self) -> Vec<Shown> {
        self.shown.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Ids of presented nodes, in order.
    pub fn presented(&self) -> Vec<String> {
        self.transcript()
            .into_iter()
            .filter_map(|s| match s {
                Shown::Node { id, .. } => Some(id),
                Shown::Notice(_) => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.transcript()
            .into_iter()
            .filter_map(|s| match s {
                Shown::Notice(n) => Some(n),
                Shown::Node { .. } => None,
            })
            .collect()
    }

    pub fn remaining_inputs(&self) -> usize {
        self.inputs.lock().map(|i| i.len()).unwrap_or(0)
    }

    fn record(&self, shown: Shown) -> Result<()> {
        self.shown
            .lock()
            .map_err(|_| ConvoflowError::Other("prompter transcript lock poisoned".into()))?
            .push(shown);
        Ok(())
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn present(&self, node_id: &str, text: &str) -> Result<()> {
        self.record(Shown::Node {
            id: node_id.to_string(),
            text: text.to_string(),
        })
    }

    async fn notify(&self, notice: &Notice) -> Result<()> {
        self.record(Shown::Notice(notice.clone()))
    }

    async fn read_input(&self) -> Result<Option<String>> {
        let next = self
            .inputs
            .lock()
            .map_err(|_| ConvoflowError::Other("prompter input lock poisoned".into()))?
            .pop_front();
        Ok(next)
    }
}

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use convoflow_types::{Resolution, Result};

use crate::TransitionResolver;

/// One recorded call to [`ScriptedResolver::classify`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyCall {
    pub input: String,
    pub candidates: Vec<String>,
}

/// Plays back a fixed queue of resolutions and records every classify call.
///
/// Once the queue is drained every further call yields `NoDecision`.
pub struct ScriptedResolver {
    answers: Mutex<VecDeque<Resolution>>,
    calls: Mutex<Vec<ClassifyCall>>,
}

impl ScriptedResolver {
    pub fn new(answers: Vec<Resolution>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand for a script made only of keywords.
    pub fn keywords(keywords: &[&str]) -> Self {
        Self::new(keywords.iter().map(|k| Resolution::keyword(*k)).collect())
    }

    pub fn calls(&self) -> Vec<ClassifyCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TransitionResolver for ScriptedResolver {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(&self, input: &str, candidates: &[String]) -> Result<Resolution> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ClassifyCall {
                input: input.to_string(),
                candidates: candidates.to_vec(),
            });
        }
        let next = self
            .answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front());
        Ok(next.unwrap_or(Resolution::NoDecision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two() -> Vec<String> {
        vec!["account_balance".into(), "make_payment".into()]
    }

    #[tokio::test]
    async fn plays_back_in_order_then_no_decision() {
        let resolver = ScriptedResolver::new(vec![
            Resolution::keyword("make_payment"),
            Resolution::NoDecision,
        ]);
        assert_eq!(
            resolver.resolve("pay", &two()).await.unwrap(),
            Resolution::keyword("make_payment")
        );
        assert_eq!(resolver.resolve("huh", &two()).await.unwrap(), Resolution::NoDecision);
        assert_eq!(resolver.resolve("again", &two()).await.unwrap(), Resolution::NoDecision);
        assert_eq!(resolver.remaining(), 0);
    }

    #[tokio::test]
    async fn records_classify_calls_but_not_short_circuits() {
        let resolver = ScriptedResolver::keywords(&["account_balance"]);
        resolver.resolve("only one", &["billing".to_string()]).await.unwrap();
        resolver.resolve("my balance", &two()).await.unwrap();

        let calls = resolver.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input, "my balance");
        assert_eq!(calls[0].candidates, two());
        assert_eq!(resolver.remaining(), 0);
    }
}

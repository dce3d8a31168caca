//! Transition resolvers: map free-text input to one of a node's outgoing keywords.
//!
//! Provides the [`TransitionResolver`] trait and three implementations:
//! [`LexicalResolver`] (offline keyword overlap), [`OpenAiResolver`]
//! (OpenAI-compatible chat completions) and [`ScriptedResolver`] (playback
//! for tests and demos).

mod lexical;
mod openai;
mod retry;
mod scripted;

use async_trait::async_trait;
use convoflow_types::{Resolution, Result};

pub use lexical::{LexicalConfig, LexicalResolver};
pub use openai::OpenAiResolver;
pub use retry::{with_retry, BackoffPolicy};
pub use scripted::{ClassifyCall, ScriptedResolver};

// ---------------------------------------------------------------------------
// TransitionResolver
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TransitionResolver: Send + Sync {
    /// Short identifier used in logs (e.g. "lexical", "openai").
    fn name(&self) -> &str;

    /// Pick the best of two or more candidates, or [`Resolution::NoDecision`].
    ///
    /// Implementations must only ever return a member of `candidates`.
    async fn classify(&self, input: &str, candidates: &[String]) -> Result<Resolution>;

    /// Resolve `input` against a node's outgoing keywords.
    ///
    /// A single candidate is returned as-is without classification. An empty
    /// candidate list yields `NoDecision`.
    async fn resolve(&self, input: &str, candidates: &[String]) -> Result<Resolution> {
        match candidates {
            [] => {
                tracing::warn!(input, resolver = self.name(), "Resolve called with no candidate keywords");
                Ok(Resolution::NoDecision)
            }
            [only] => Ok(Resolution::Keyword(only.clone())),
            _ => self.classify(input, candidates).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Classifier that always answers with a keyword no node has.
    struct Contrarian {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TransitionResolver for Contrarian {
        fn name(&self) -> &str {
            "contrarian"
        }

        async fn classify(&self, _input: &str, _candidates: &[String]) -> Result<Resolution> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Resolution::keyword("something_else"))
        }
    }

    fn candidates(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn single_candidate_short_circuits_classification() {
        let resolver = Contrarian {
            calls: AtomicUsize::new(0),
        };
        let result = resolver
            .resolve("complete gibberish", &candidates(&["only_option"]))
            .await
            .unwrap();
        assert_eq!(result, Resolution::keyword("only_option"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_candidates_yield_no_decision() {
        let resolver = Contrarian {
            calls: AtomicUsize::new(0),
        };
        let result = resolver.resolve("anything", &[]).await.unwrap();
        assert_eq!(result, Resolution::NoDecision);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn multiple_candidates_reach_classify() {
        let resolver = Contrarian {
            calls: AtomicUsize::new(0),
        };
        let result = resolver
            .resolve("anything", &candidates(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(result, Resolution::keyword("something_else"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn short_circuit_holds_through_trait_object() {
        let resolver: Box<dyn TransitionResolver> = Box::new(ScriptedResolver::new(vec![
            Resolution::keyword("never_used"),
        ]));
        let result = resolver
            .resolve("hello", &candidates(&["billing"]))
            .await
            .unwrap();
        assert_eq!(result, Resolution::keyword("billing"));
    }
}

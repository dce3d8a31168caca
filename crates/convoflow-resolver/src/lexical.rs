//! Offline resolver that scores candidates by word overlap with the input.
//!
//! Keywords are split on `_`, `-` and whitespace. A keyword's score is the
//! fraction of its content words found in the input, where a word also
//! matches an input word it is a prefix of (or that is a prefix of it) once
//! the shorter side has at least three characters. So `bill` matches
//! `billing` and `pay` matches `payment`.

use async_trait::async_trait;
use convoflow_types::{Resolution, Result};

use crate::TransitionResolver;

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "for", "i", "in", "my", "of", "on", "or", "the", "to", "with",
];

const MIN_PREFIX_LEN: usize = 3;

#[derive(Debug, Clone)]
pub struct LexicalConfig {
    /// Minimum score the winner needs, in `0.0..=1.0`.
    pub min_score: f64,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self { min_score: 0.5 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LexicalResolver {
    config: LexicalConfig,
}

impl LexicalResolver {
    pub fn new(config: LexicalConfig) -> Self {
        Self { config }
    }

    pub fn with_min_score(min_score: f64) -> Self {
        Self::new(LexicalConfig { min_score })
    }

    /// Score every candidate against `input`, preserving candidate order.
    pub fn scores(&self, input: &str, candidates: &[String]) -> Vec<(String, f64)> {
        let input_tokens = tokenize(input);
        candidates
            .iter()
            .map(|c| (c.clone(), score(&input_tokens, c)))
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn content_words(keyword: &str) -> Vec<String> {
    let all = tokenize(keyword);
    let content: Vec<String> = all
        .iter()
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .cloned()
        .collect();
    if content.is_empty() {
        all
    } else {
        content
    }
}

fn words_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= MIN_PREFIX_LEN && long.starts_with(short)
}

fn score(input_tokens: &[String], keyword: &str) -> f64 {
    let words = content_words(keyword);
    if words.is_empty() {
        return 0.0;
    }
    let hits = words
        .iter()
        .filter(|w| input_tokens.iter().any(|t| words_match(t, w)))
        .count();
    hits as f64 / words.len() as f64
}

#[async_trait]
impl TransitionResolver for LexicalResolver {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn classify(&self, input: &str, candidates: &[String]) -> Result<Resolution> {
        let scores = self.scores(input, candidates);
        tracing::info!(input, scores = ?scores, "Lexical scores");

        let mut best: Option<(&str, f64)> = None;
        let mut runner_up = 0.0_f64;
        for (keyword, s) in &scores {
            match best {
                Some((_, top)) if *s > top => {
                    runner_up = top;
                    best = Some((keyword.as_str(), *s));
                }
                Some(_) => runner_up = runner_up.max(*s),
                None => best = Some((keyword.as_str(), *s)),
            }
        }

        Ok(match best {
            Some((keyword, top)) if top >= self.config.min_score && top > runner_up => {
                Resolution::keyword(keyword)
            }
            _ => Resolution::NoDecision,
        })
    }
}

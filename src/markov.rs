//! N-gram Markov chain over word or character tokens.
//!
//! A [`ChainModel`] maps a context (the previous `order` tokens) to a
//! [`TransitionNode`] counting which token followed it. Models are built
//! fresh for each request and never persisted.

use rand::seq::IteratorRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const MAX_ORDER: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("model has no transitions")]
    Empty,
    #[error("model order must be between 1 and {MAX_ORDER}, got {0}")]
    InvalidOrder(usize),
}

/// How text is split into tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMode {
    #[default]
    Word,
    Character,
}

impl TokenMode {
    pub fn tokenize(self, text: &str) -> Vec<String> {
        match self {
            TokenMode::Word => words(text).map(str::to_string).collect(),
            TokenMode::Character => text.chars().map(String::from).collect(),
        }
    }

    fn join(self, tokens: &[String]) -> String {
        match self {
            TokenMode::Word => tokens.join(" "),
            TokenMode::Character => tokens.concat(),
        }
    }
}

/// Whitespace word tokenizer shared by training and corpus statistics.
pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

/// Outgoing transitions of one context.
#[derive(Debug, Clone, Default)]
pub struct TransitionNode {
    total_count: u64,
    next_token_counts: HashMap<String, u64>,
}

impl TransitionNode {
    fn record(&mut self, token: &str) {
        *self.next_token_counts.entry(token.to_string()).or_insert(0) += 1;
        self.total_count += 1;
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn count_of(&self, token: &str) -> u64 {
        self.next_token_counts.get(token).copied().unwrap_or(0)
    }

    /// Walks the cumulative distribution in map order and returns the first
    /// token whose threshold reaches the draw. Rounding can leave the final
    /// threshold just under 1.0, in which case the last token wins.
    fn sample<R: Rng>(&self, rng: &mut R) -> Option<&String> {
        if self.total_count == 0 {
            return None;
        }
        let draw: f64 = rng.random();
        let total = self.total_count as f64;

        let mut cumulative = 0.0;
        let mut last = None;
        for (token, count) in &self.next_token_counts {
            cumulative += *count as f64 / total;
            if cumulative >= draw {
                return Some(token);
            }
            last = Some(token);
        }
        last
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerateOptions {
    pub min_length: usize,
    pub max_length: usize,
    pub seed: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChainModel {
    order: usize,
    mode: TokenMode,
    nodes: HashMap<Vec<String>, TransitionNode>,
}

impl ChainModel {
    pub fn new(order: usize, mode: TokenMode) -> Result<Self, ModelError> {
        if !(1..=MAX_ORDER).contains(&order) {
            return Err(ModelError::InvalidOrder(order));
        }
        Ok(Self {
            order,
            mode,
            nodes: HashMap::new(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct contexts.
    pub fn context_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct context → token edges.
    pub fn transition_count(&self) -> usize {
        self.nodes.values().map(|n| n.next_token_counts.len()).sum()
    }

    pub fn node(&self, context: &[&str]) -> Option<&TransitionNode> {
        let key: Vec<String> = context.iter().map(|t| t.to_string()).collect();
        self.nodes.get(&key)
    }

    /// Records every `order`-token context and the token following it.
    /// Text with `order` tokens or fewer contributes nothing.
    pub fn train(&mut self, text: &str) {
        let tokens = self.mode.tokenize(text);
        if tokens.len() <= self.order {
            return;
        }

        for window in tokens.windows(self.order + 1) {
            let (context, next) = window.split_at(self.order);
            self.nodes
                .entry(context.to_vec())
                .or_default()
                .record(&next[0]);
        }
    }

    /// Samples a token sequence.
    ///
    /// The walk starts from the seed's trailing context when the model knows
    /// it, otherwise from a uniformly chosen context. The target length (in
    /// tokens, prefix included) is drawn from `[min_length, max_length]`; the
    /// walk also ends early at a context with no outgoing transitions.
    pub fn generate<R: Rng>(
        &self,
        options: &GenerateOptions,
        rng: &mut R,
    ) -> Result<String, ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::Empty);
        }

        let (low, high) = if options.min_length <= options.max_length {
            (options.min_length, options.max_length)
        } else {
            (options.max_length, options.min_length)
        };
        let target = rng.random_range(low..=high);

        let (mut output, mut context) = match self.seed_context(options.seed.as_deref()) {
            Some(start) => start,
            None => {
                let context = self
                    .nodes
                    .keys()
                    .choose(rng)
                    .cloned()
                    .ok_or(ModelError::Empty)?;
                (context.clone(), context)
            }
        };

        while output.len() < target {
            let Some(next) = self.nodes.get(&context).and_then(|n| n.sample(rng)) else {
                break;
            };
            let next = next.clone();
            context.rotate_left(1);
            if let Some(slot) = context.last_mut() {
                *slot = next.clone();
            }
            output.push(next);
        }

        Ok(self.mode.join(&output))
    }

    fn seed_context(&self, seed: Option<&str>) -> Option<(Vec<String>, Vec<String>)> {
        let tokens = self.mode.tokenize(seed?);
        if tokens.len() < self.order {
            return None;
        }
        let context = tokens[tokens.len() - self.order..].to_vec();
        self.nodes
            .contains_key(&context)
            .then_some((tokens, context))
    }
}

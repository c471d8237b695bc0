use serde::{Deserialize, Serialize};

use crate::stream::UsagePayload;

/// Token usage for one iteration, or accumulated across a whole turn.
///
/// Turn totals only ever grow: `merge` adds, nothing subtracts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,
}

impl Usage {
    /// Add another iteration's usage into this accumulator.
    pub fn merge(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
        self.cost += other.cost;
        self.cached_tokens = self.cached_tokens.saturating_add(other.cached_tokens);
        self.reasoning_tokens = self.reasoning_tokens.saturating_add(other.reasoning_tokens);
    }

    pub fn merged(&self, other: &Usage) -> Usage {
        let mut sum = self.clone();
        sum.merge(other);
        sum
    }

    pub fn is_empty(&self) -> bool {
        *self == Usage::default()
    }
}

impl From<&UsagePayload> for Usage {
    fn from(p: &UsagePayload) -> Self {
        let prompt_tokens = p.prompt_tokens.unwrap_or(0);
        let completion_tokens = p.completion_tokens.unwrap_or(0);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: p.total_tokens
                .unwrap_or(prompt_tokens.saturating_add(completion_tokens)),
            cost: p.cost.unwrap_or(0.0),
            cached_tokens: p
                .prompt_tokens_details
                .as_ref()
                .and_then(|d| d.cached_tokens)
                .unwrap_or(0),
            reasoning_tokens: p
                .completion_tokens_details
                .as_ref()
                .and_then(|d| d.reasoning_tokens)
                .unwrap_or(0),
        }
    }
}

//! Engine settings derived from [`WorkerConfig`].

use dialectic_budget::BudgetPolicy;
use dialectic_config::WorkerConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub policy: BudgetPolicy,
    pub max_continuations: u32,
    pub history_tail_len: usize,
    pub user_spacer: String,
}

impl From<&WorkerConfig> for EngineSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            policy: BudgetPolicy {
                rationality_threshold: config.rationality_threshold,
                safety_buffer_tokens: config.safety_buffer_tokens,
            },
            max_continuations: config.max_continuations,
            history_tail_len: config.history_tail_len,
            user_spacer: config.user_spacer.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

//! Runtime limits and collector tuning.

/// Configuration for a [`State`](super::State).
///
/// # Example
///
/// ```
/// use tether_core::{State, StateConfig};
///
/// let config = StateConfig::new()
///     .with_max_stack_depth(4096)
///     .with_auto_collect_threshold(1024);
/// let state = State::with_config(config);
/// assert_eq!(state.config().max_stack_depth, 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConfig {
    /// Maximum number of values on the stack across all active frames.
    pub max_stack_depth: usize,
    /// Maximum nesting of native calls.
    pub max_call_depth: usize,
    /// Run a collection at the next top-level call once this many objects
    /// were allocated since the previous collection. `None` leaves
    /// collection entirely to the embedder.
    pub auto_collect_threshold: Option<usize>,
}

impl StateConfig {
    pub const DEFAULT_MAX_STACK_DEPTH: usize = 1 << 16;
    pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_auto_collect_threshold(mut self, allocations: usize) -> Self {
        self.auto_collect_threshold = Some(allocations);
        self
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: Self::DEFAULT_MAX_STACK_DEPTH,
            max_call_depth: Self::DEFAULT_MAX_CALL_DEPTH,
            auto_collect_threshold: None,
        }
    }
}

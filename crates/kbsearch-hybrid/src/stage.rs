//! Per-query pipeline state.

use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dispatched,
    BackendsReturned,
    Fused,
    Deduplicated,
    Reranked,
    Cited,
    Completed,
    Failed,
}

impl Stage {
    /// Legal successors. Rerank is optional, so `Deduplicated` may go straight
    /// to `Cited`; `Failed` is only reachable once both searchers have answered.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Dispatched, BackendsReturned)
                | (BackendsReturned, Fused)
                | (BackendsReturned, Failed)
                | (Fused, Deduplicated)
                | (Deduplicated, Reranked)
                | (Deduplicated, Cited)
                | (Reranked, Cited)
                | (Cited, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks the current stage and logs each transition with the elapsed time.
#[derive(Debug)]
pub struct QueryTrace {
    stage: Stage,
    started: Instant,
}

impl QueryTrace {
    pub fn dispatch() -> Self {
        tracing::debug!(stage = %Stage::Dispatched, "query stage");
        Self { stage: Stage::Dispatched, started: Instant::now() }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn advance(&mut self, next: Stage) {
        debug_assert!(self.stage.can_advance_to(next), "illegal transition {} -> {}", self.stage, next);
        tracing::debug!(from = %self.stage, to = %next, elapsed_ms = self.elapsed_ms(), "query stage");
        self.stage = next;
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

//! Per-request pipeline state machine.
//!
//! Tracks which stage a request has reached so stage functions can assert
//! ordering and every transition lands in the trace log. Terminal phases
//! are `RejectedLowConfidence` and `Drafted`.

use tracing::debug;

/// Stages a retrieval/draft request moves through, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelinePhase {
    QueryReceived,
    VectorSearched,
    TenantFiltered,
    Reranked,
    PrecisionExtracted,
    Scored,
    RejectedLowConfidence,
    Drafted,
}

impl PipelinePhase {
    /// Legal successors of this phase.
    fn next_allowed(self) -> &'static [PipelinePhase] {
        use PipelinePhase::*;
        match self {
            QueryReceived => &[VectorSearched],
            VectorSearched => &[TenantFiltered],
            TenantFiltered => &[Reranked],
            Reranked => &[PrecisionExtracted],
            PrecisionExtracted => &[Scored],
            Scored => &[RejectedLowConfidence, Drafted],
            RejectedLowConfidence | Drafted => &[],
        }
    }

    /// True when no further transition is possible.
    pub fn is_terminal(self) -> bool {
        self.next_allowed().is_empty()
    }
}

/// Mutable tracker advancing through [`PipelinePhase`]s.
#[derive(Debug)]
pub struct PhaseTracker {
    phase: PipelinePhase,
}

impl PhaseTracker {
    /// Starts a request at `QueryReceived`.
    pub fn start() -> Self {
        Self {
            phase: PipelinePhase::QueryReceived,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Advances to `next`, tracing the transition. Returns `false` (and
    /// stays put) on an illegal transition; stage code treats that as a
    /// programming error caught by tests, not a runtime failure.
    pub fn advance(&mut self, next: PipelinePhase) -> bool {
        if self.phase.next_allowed().contains(&next) {
            debug!(from = ?self.phase, to = ?next, "pipeline transition");
            self.phase = next;
            true
        } else {
            debug!(from = ?self.phase, to = ?next, "illegal pipeline transition ignored");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_to_draft() {
        let mut t = PhaseTracker::start();
        for phase in [
            PipelinePhase::VectorSearched,
            PipelinePhase::TenantFiltered,
            PipelinePhase::Reranked,
            PipelinePhase::PrecisionExtracted,
            PipelinePhase::Scored,
            PipelinePhase::Drafted,
        ] {
            assert!(t.advance(phase));
        }
        assert!(t.phase().is_terminal());
    }

    #[test]
    fn rejection_branch_is_terminal() {
        let mut t = PhaseTracker::start();
        t.advance(PipelinePhase::VectorSearched);
        t.advance(PipelinePhase::TenantFiltered);
        t.advance(PipelinePhase::Reranked);
        t.advance(PipelinePhase::PrecisionExtracted);
        t.advance(PipelinePhase::Scored);
        assert!(t.advance(PipelinePhase::RejectedLowConfidence));
        assert!(!t.advance(PipelinePhase::Drafted));
    }

    #[test]
    fn skipping_stages_is_rejected() {
        let mut t = PhaseTracker::start();
        assert!(!t.advance(PipelinePhase::Reranked));
        assert_eq!(t.phase(), PipelinePhase::QueryReceived);
    }
}

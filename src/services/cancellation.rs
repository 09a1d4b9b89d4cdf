//! Cooperative cancellation for map matching runs
//!
//! Each new request for a trajectory takes a ticket from the shared
//! generation counter, which supersedes every earlier ticket. Runs check
//! their ticket after each suspension point and discard their results once
//! superseded. Network calls already in flight are left to complete.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MatchGeneration {
    counter: Arc<AtomicU64>,
}

/// Proof that a run was the latest request at the time it started
#[derive(Debug, Clone)]
pub struct MatchTicket {
    generation: u64,
    counter: Arc<AtomicU64>,
}

impl MatchGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new run, superseding all outstanding tickets
    pub fn issue(&self) -> MatchTicket {
        let generation = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        MatchTicket { generation, counter: self.counter.clone() }
    }

    /// Supersede all outstanding tickets without starting a run
    pub fn invalidate(&self) {
        self.counter.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }
}

impl MatchTicket {
    /// A ticket that is never superseded
    pub fn detached() -> Self {
        MatchGeneration::new().issue()
    }

    #[inline]
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::Acquire) == self.generation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ticket_supersedes_old() {
        let gen = MatchGeneration::new();
        let first = gen.issue();
        assert!(first.is_current());

        let second = gen.issue();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(second.generation(), first.generation() + 1);
    }

    #[test]
    fn test_invalidate() {
        let gen = MatchGeneration::new();
        let ticket = gen.issue();
        gen.invalidate();
        assert!(!ticket.is_current());
        assert_eq!(gen.current(), 2);
    }

    #[test]
    fn test_detached_ticket_stays_current() {
        let ticket = MatchTicket::detached();
        assert!(ticket.is_current());
    }

    #[test]
    fn test_clones_share_counter() {
        let gen = MatchGeneration::new();
        let handle = gen.clone();
        let ticket = gen.issue();
        handle.issue();
        assert!(!ticket.is_current());
    }
}

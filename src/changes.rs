//! Change tracking.
//!
//! Every `apply_mods` call marks its target dirty, and stats whose
//! derived value moved queue re-application requests for their own
//! modifier payloads. Both land in a `ChangeSink` that is threaded
//! through the engine explicitly (there is no ambient global set) and
//! drained by the external tick driver exactly once per logical tick.

use crate::desc::ModDesc;
use crate::graph::NodeId;
use std::collections::HashSet;

/// A request to re-apply a modifier description at a new strength.
///
/// Produced by [`Stat::update`](crate::Stat::update) when a stat that
/// carries its own modifier payload changes value, and by the initial
/// call of `apply_mods` for `"mod"` branches found in its results tree.
/// The driver dispatches these via
/// [`ModGraph::flush_reapplies`](crate::ModGraph::flush_reapplies).
#[derive(Debug, Clone)]
pub struct ReapplyRequest {
    /// The description to re-apply.
    pub desc: ModDesc,
    /// The amount it should be applied at.
    pub amount: f64,
}

/// Per-tick collection of changed entities plus pending re-applications.
///
/// Adding the same node twice is a no-op (set semantics). The consumer
/// drains once per tick; draining clears.
#[derive(Debug, Default)]
pub struct ChangeSink {
    dirty: HashSet<NodeId>,
    reapply: Vec<ReapplyRequest>,
}

impl ChangeSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a node as changed this tick.
    pub fn mark_dirty(&mut self, node: NodeId) {
        self.dirty.insert(node);
    }

    /// Whether a node is currently marked dirty.
    pub fn is_dirty(&self, node: NodeId) -> bool {
        self.dirty.contains(&node)
    }

    /// Number of nodes currently marked dirty.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Drain the dirty set, clearing it.
    pub fn drain_dirty(&mut self) -> Vec<NodeId> {
        self.dirty.drain().collect()
    }

    /// Queue a re-application request.
    pub fn push_reapply(&mut self, request: ReapplyRequest) {
        self.reapply.push(request);
    }

    /// Take all pending re-application requests, clearing the queue.
    pub fn take_reapplies(&mut self) -> Vec<ReapplyRequest> {
        std::mem::take(&mut self.reapply)
    }

    /// Whether there are pending re-application requests.
    pub fn has_reapplies(&self) -> bool {
        !self.reapply.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_set_semantics() {
        let mut sink = ChangeSink::new();
        sink.mark_dirty(NodeId(1));
        sink.mark_dirty(NodeId(1));
        sink.mark_dirty(NodeId(2));
        assert_eq!(sink.dirty_len(), 2);

        let drained = sink.drain_dirty();
        assert_eq!(drained.len(), 2);
        assert_eq!(sink.dirty_len(), 0);
    }

    #[test]
    fn test_reapply_queue() {
        let mut sink = ChangeSink::new();
        assert!(!sink.has_reapplies());
        sink.push_reapply(ReapplyRequest {
            desc: ModDesc::Number(1.0),
            amount: 2.0,
        });
        assert!(sink.has_reapplies());
        let taken = sink.take_reapplies();
        assert_eq!(taken.len(), 1);
        assert!(!sink.has_reapplies());
    }
}

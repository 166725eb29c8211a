//! Assigns tensor storage slots along an execution order.
//!
//! Requests are processed position by position: every tensor starting at a position is
//! allocated before any tensor ending there is released, so a node's inputs never share a slot
//! with its outputs. The reuse policy decides which free slot an allocation takes.
mod compact;
mod liveness;
mod mru;

pub use compact::CompactPolicy;
pub use liveness::{compute_liveness, Interval, LivenessMode};
pub use mru::MruPolicy;

use crate::engines::MemoryPolicy;
use crate::ir::EdgeId;
use std::collections::BTreeMap;

pub type SlotId = usize;

/// Every slot capacity is a multiple of this many bytes.
pub const SLOT_ALIGNMENT: usize = 64;

pub fn align_up(bytes: usize) -> usize {
    bytes.max(1).div_ceil(SLOT_ALIGNMENT) * SLOT_ALIGNMENT
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Planned storage of {required} bytes exceeds the limit of {limit} bytes")]
    AllocationFailure { required: usize, limit: usize },
    #[error("Edges {a} and {b} are live together but share slot {slot}")]
    OverlappingAssignment { a: EdgeId, b: EdgeId, slot: SlotId },
    #[error("Edge {edge} needs {needed} bytes but slot {slot} holds {capacity}")]
    SlotTooSmall {
        edge: EdgeId,
        slot: SlotId,
        needed: usize,
        capacity: usize,
    },
}

/// Storage demand of one edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TensorRequest {
    pub edge: EdgeId,
    pub live: Interval,
    pub bytes: usize,
}

/// Picks and recycles slots. `slots` holds the capacity of every slot created so far; a policy
/// may grow a free slot or append a new one.
pub trait ReusePolicy {
    fn acquire(&mut self, slots: &mut Vec<usize>, bytes: usize) -> SlotId;
    fn release(&mut self, slot: SlotId);
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryPlan {
    pub policy: MemoryPolicy,
    /// Slot of every planned edge.
    pub assignments: BTreeMap<EdgeId, SlotId>,
    pub requests: BTreeMap<EdgeId, TensorRequest>,
    /// Capacity in bytes of every slot.
    pub slots: Vec<usize>,
    /// Sum of slot capacities.
    pub total_bytes: usize,
    /// Largest sum of aligned tensor sizes live at one position. This is the floor for any
    /// assignment and does not depend on the policy; compare it with `total_bytes`.
    pub peak_live_bytes: usize,
}

impl MemoryPlan {
    pub fn slot_of(&self, edge: EdgeId) -> Option<SlotId> {
        self.assignments.get(&edge).copied()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Checks that every edge fits its slot and that no two edges live at the same time share
    /// a slot.
    pub fn validate(&self) -> Result<(), MemoryError> {
        let mut by_slot: BTreeMap<SlotId, Vec<&TensorRequest>> = BTreeMap::new();
        for (edge, slot) in &self.assignments {
            let Some(request) = self.requests.get(edge) else {
                continue;
            };
            let capacity = self.slots.get(*slot).copied().unwrap_or(0);
            if capacity < request.bytes {
                return Err(MemoryError::SlotTooSmall {
                    edge: *edge,
                    slot: *slot,
                    needed: request.bytes,
                    capacity,
                });
            }
            by_slot.entry(*slot).or_default().push(request);
        }
        for (slot, requests) in by_slot {
            for (i, a) in requests.iter().enumerate() {
                for b in &requests[i + 1..] {
                    if a.live.overlaps(&b.live) {
                        return Err(MemoryError::OverlappingAssignment {
                            a: a.edge,
                            b: b.edge,
                            slot,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Largest sum of aligned sizes live at any single position; no assignment can use less.
pub fn live_lower_bound(requests: &[TensorRequest]) -> usize {
    let last = requests.iter().map(|r| r.live.end).max().unwrap_or(0);
    (0..=last)
        .map(|p| {
            requests
                .iter()
                .filter(|r| r.live.contains(p))
                .map(|r| align_up(r.bytes))
                .sum::<usize>()
        })
        .max()
        .unwrap_or(0)
}

/// Largest number of requests live at any single position: the fewest slots an assignment can
/// use. Compact reaches it, since it only opens a slot when every existing one is occupied.
pub fn live_count_lower_bound(requests: &[TensorRequest]) -> usize {
    let last = requests.iter().map(|r| r.live.end).max().unwrap_or(0);
    (0..=last)
        .map(|p| requests.iter().filter(|r| r.live.contains(p)).count())
        .max()
        .unwrap_or(0)
}

#[derive(Clone, Debug)]
pub struct MemoryPlanner {
    policy: MemoryPolicy,
    limit: Option<usize>,
}

impl MemoryPlanner {
    pub fn new(policy: MemoryPolicy, limit: Option<usize>) -> Self {
        Self { policy, limit }
    }

    pub fn plan(&self, requests: &[TensorRequest]) -> Result<MemoryPlan, MemoryError> {
        match self.policy {
            MemoryPolicy::Compact => self.plan_with(requests, CompactPolicy::default()),
            MemoryPolicy::Mru => self.plan_with(requests, MruPolicy::default()),
        }
    }

    fn plan_with(&self, requests: &[TensorRequest], mut policy: impl ReusePolicy) -> Result<MemoryPlan, MemoryError> {
        let last = requests.iter().map(|r| r.live.end.max(r.live.start)).max().unwrap_or(0);
        let mut starts: Vec<Vec<&TensorRequest>> = vec![Vec::new(); last + 1];
        let mut ends: Vec<Vec<&TensorRequest>> = vec![Vec::new(); last + 1];
        for r in requests {
            starts[r.live.start].push(r);
            ends[r.live.end.max(r.live.start)].push(r);
        }

        let mut plan = MemoryPlan {
            policy: self.policy,
            ..Default::default()
        };
        let mut live_bytes = 0usize;
        for position in 0..=last {
            starts[position].sort_by_key(|r| r.edge);
            for r in &starts[position] {
                let bytes = align_up(r.bytes);
                let slot = policy.acquire(&mut plan.slots, bytes);
                plan.assignments.insert(r.edge, slot);
                plan.requests.insert(r.edge, **r);
                live_bytes += bytes;
            }
            plan.peak_live_bytes = plan.peak_live_bytes.max(live_bytes);
            ends[position].sort_by_key(|r| r.edge);
            for r in &ends[position] {
                if let Some(slot) = plan.assignments.get(&r.edge) {
                    policy.release(*slot);
                    live_bytes -= align_up(r.bytes);
                }
            }
        }
        plan.total_bytes = plan.slots.iter().sum();

        if let Some(limit) = self.limit {
            if plan.total_bytes > limit {
                log::error!(
                    "{} plan needs {} bytes in {} slots, limit is {}",
                    self.policy,
                    plan.total_bytes,
                    plan.slots.len(),
                    limit
                );
                return Err(MemoryError::AllocationFailure {
                    required: plan.total_bytes,
                    limit,
                });
            }
        }
        log::debug!(
            "{} plan: {} edges in {} slots, {} bytes total, {} bytes peak live",
            self.policy,
            plan.assignments.len(),
            plan.slots.len(),
            plan.total_bytes,
            plan.peak_live_bytes
        );
        Ok(plan)
    }
}

/*
 * Process Record
 *
 * A process is a participant in the allocation simulation, not an OS-level
 * task: it has no address space or file descriptor table here, only the
 * bookkeeping the arbiter needs to grant, deny, and recover allocations.
 */

use std::collections::BTreeMap;

use crate::ids::{ProcessId, ResourceId};

/// A single process in the simulation.
#[derive(Debug, Clone)]
pub struct Process {
    /// Unique process identifier.
    pub id: ProcessId,

    /// Resources currently held, keyed by resource id. Zero-valued entries
    /// are never materialised; a key present here always means `count > 0`.
    pub holdings: BTreeMap<ResourceId, u32>,

    /// Declared maximum simultaneous holding per resource. Required for
    /// requests under AVOID, optional under DETECT.
    pub max_claim: BTreeMap<ResourceId, u32>,

    /// Aging priority. Starts at zero, never decreases except through an
    /// explicit reset (not exposed by the core).
    pub priority: u32,

    /// Seconds-since-epoch timestamp of when this process most recently
    /// began waiting. Zero means "not currently timing a wait".
    pub wait_start: u64,
}

impl Process {
    pub fn new(id: ProcessId) -> Self {
        Process {
            id,
            holdings: BTreeMap::new(),
            max_claim: BTreeMap::new(),
            priority: 0,
            wait_start: 0,
        }
    }

    /// Instances of `rid` currently held (zero if none).
    pub fn held(&self, rid: ResourceId) -> u32 {
        self.holdings.get(&rid).copied().unwrap_or(0)
    }

    /// Declared max-claim for `rid`, if any.
    pub fn max_claim_of(&self, rid: ResourceId) -> Option<u32> {
        self.max_claim.get(&rid).copied()
    }

    /// Need remaining under the Banker's algorithm: `max_claim - held`.
    /// `None` when no max-claim is declared for `rid`.
    pub fn need(&self, rid: ResourceId) -> Option<i64> {
        self.max_claim_of(rid)
            .map(|max| max as i64 - self.held(rid) as i64)
    }

    /// Add `count` instances of `rid` to this process's holdings.
    pub fn grant(&mut self, rid: ResourceId, count: u32) {
        *self.holdings.entry(rid).or_insert(0) += count;
    }

    /// Remove up to `count` instances of `rid`; prunes the entry on reaching
    /// zero. Returns the amount actually removed (capped at what was held).
    pub fn take(&mut self, rid: ResourceId, count: u32) -> u32 {
        let Some(held) = self.holdings.get_mut(&rid) else {
            return 0;
        };
        let removed = (*held).min(count);
        *held -= removed;
        if *held == 0 {
            self.holdings.remove(&rid);
        }
        removed
    }

    /// Release everything this process holds, returning the counts that
    /// were cleared, keyed by resource id. Used by the recovery agent.
    pub fn clear_all_holdings(&mut self) -> BTreeMap<ResourceId, u32> {
        std::mem::take(&mut self.holdings)
    }

    /// Total instances held across every resource.
    pub fn total_held(&self) -> u32 {
        self.holdings.values().sum()
    }

    /// Number of distinct resource types held.
    pub fn distinct_types_held(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_start != 0
    }

    pub fn reset_wait_timer(&mut self) {
        self.wait_start = 0;
    }

    pub fn start_waiting(&mut self, now: u64) {
        if self.wait_start == 0 {
            self.wait_start = now;
        }
    }

    pub fn bump_priority(&mut self) {
        self.priority += 1;
    }
}

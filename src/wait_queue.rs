/*
 * Wait Registry
 *
 * Generic blocking abstraction, one queue per resource: a process that
 * cannot be satisfied immediately is parked here, carrying the exact count
 * it asked for, until a release, a preemption, or a re-request wakes it.
 *
 * Mirrors the per-channel wait-queue shape used for I/O blocking, except
 * the "channel" here is a resource id and entries carry a requested count
 * rather than being bare identifiers.
 */

use std::collections::{BTreeMap, VecDeque};

use crate::ids::{ProcessId, ResourceId};

/// A single process parked on a resource's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEntry {
    pub process: ProcessId,
    pub requested: u32,
}

/// Per-resource FIFO wait queues.
///
/// Invariant: a given process appears at most once in any one resource's
/// queue (§3, invariant 5).
#[derive(Debug, Clone, Default)]
pub struct WaitRegistry {
    queues: BTreeMap<ResourceId, VecDeque<WaitEntry>>,
}

impl WaitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `(pid, requested)` for `rid`, idempotently: if `pid` is
    /// already queued for `rid` the existing entry is left unchanged.
    pub fn enqueue(&mut self, rid: ResourceId, pid: ProcessId, requested: u32) {
        let queue = self.queues.entry(rid).or_default();
        if queue.iter().any(|e| e.process == pid) {
            return;
        }
        queue.push_back(WaitEntry {
            process: pid,
            requested,
        });
    }

    /// Remove `pid`'s entry from `rid`'s queue, if present. Prunes the
    /// queue if it becomes empty.
    pub fn remove(&mut self, rid: ResourceId, pid: ProcessId) {
        if let Some(queue) = self.queues.get_mut(&rid) {
            queue.retain(|e| e.process != pid);
            if queue.is_empty() {
                self.queues.remove(&rid);
            }
        }
    }

    /// Remove `pid` from every resource's queue. Used by the recovery
    /// agent when victimising a process.
    pub fn remove_everywhere(&mut self, pid: ProcessId) {
        self.queues.retain(|_, queue| {
            queue.retain(|e| e.process != pid);
            !queue.is_empty()
        });
    }

    pub fn is_waiting(&self, pid: ProcessId) -> bool {
        self.queues.values().any(|q| q.iter().any(|e| e.process == pid))
    }

    pub fn queue(&self, rid: ResourceId) -> &[WaitEntry] {
        self.queues
            .get(&rid)
            .map(|q| q.as_slices().0)
            .unwrap_or(&[])
    }

    /// Replace `rid`'s queue, pruning it from the registry if left empty.
    /// Used by re-evaluation after it decides which entries remain.
    pub fn set_queue(&mut self, rid: ResourceId, entries: VecDeque<WaitEntry>) {
        if entries.is_empty() {
            self.queues.remove(&rid);
        } else {
            self.queues.insert(rid, entries);
        }
    }

    pub fn take_queue(&mut self, rid: ResourceId) -> VecDeque<WaitEntry> {
        self.queues.remove(&rid).unwrap_or_default()
    }

    /// All resource ids that currently have at least one waiter.
    pub fn resources_with_waiters(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.queues.keys().copied()
    }

    /// Every process id that appears as a waiter on any queue.
    pub fn all_waiters(&self) -> impl Iterator<Item = ProcessId> + '_ {
        self.queues.values().flat_map(|q| q.iter().map(|e| e.process))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, &WaitEntry)> {
        self.queues
            .iter()
            .flat_map(|(&rid, q)| q.iter().map(move |e| (rid, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_is_idempotent() {
        let mut reg = WaitRegistry::new();
        reg.enqueue(ResourceId(0), ProcessId(1), 2);
        reg.enqueue(ResourceId(0), ProcessId(1), 99); // different count, ignored
        assert_eq!(reg.queue(ResourceId(0)).len(), 1);
        assert_eq!(reg.queue(ResourceId(0))[0].requested, 2);
    }

    #[test]
    fn remove_prunes_empty_queue() {
        let mut reg = WaitRegistry::new();
        reg.enqueue(ResourceId(0), ProcessId(1), 2);
        reg.remove(ResourceId(0), ProcessId(1));
        assert!(reg.queue(ResourceId(0)).is_empty());
        assert_eq!(reg.resources_with_waiters().count(), 0);
    }

    #[test]
    fn remove_everywhere_clears_all_queues() {
        let mut reg = WaitRegistry::new();
        reg.enqueue(ResourceId(0), ProcessId(1), 1);
        reg.enqueue(ResourceId(1), ProcessId(1), 1);
        reg.enqueue(ResourceId(1), ProcessId(2), 1);
        reg.remove_everywhere(ProcessId(1));
        assert!(reg.queue(ResourceId(0)).is_empty());
        assert_eq!(reg.queue(ResourceId(1)).len(), 1);
    }
}

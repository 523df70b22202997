/*
 * Arbiter
 *
 * Orchestrates every external event against the shared state: processes,
 * resources, and wait queues. Each public method is one complete event;
 * there are no internal yield points (§5), so nothing here needs to guard
 * against another event starting mid-way through.
 */

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::aging;
use crate::clock::{Clock, MonotonicClock};
use crate::config::ArbiterConfig;
use crate::cycle;
use crate::error::{ArbiterError, ArbiterResult};
use crate::ids::{ProcessId, ResourceId};
use crate::policy::PolicyMode;
use crate::process::Process;
use crate::recovery::{self, RecoveryOutcome};
use crate::resource::Resource;
use crate::snapshot::Snapshot;
use crate::wait_queue::{WaitEntry, WaitRegistry};

/// Result of a `request` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Granted,
    Waiting,
}

/// The resource-allocation arbiter. Generic over its clock source so tests
/// can drive aging deterministically; production code uses the default.
pub struct Arbiter<C: Clock = MonotonicClock> {
    processes: BTreeMap<ProcessId, Process>,
    resources: BTreeMap<ResourceId, Resource>,
    waits: WaitRegistry,
    policy: PolicyMode,
    config: ArbiterConfig,
    clock: C,
    last_cycle: Vec<ProcessId>,
}

impl Arbiter<MonotonicClock> {
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }
}

impl Default for Arbiter<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Arbiter<C> {
    pub fn with_clock(clock: C) -> Self {
        Self::with_clock_and_config(clock, ArbiterConfig::default())
    }

    pub fn with_clock_and_config(clock: C, config: ArbiterConfig) -> Self {
        Arbiter {
            processes: BTreeMap::new(),
            resources: BTreeMap::new(),
            waits: WaitRegistry::new(),
            policy: PolicyMode::default(),
            config,
            clock,
            last_cycle: Vec::new(),
        }
    }

    pub fn policy(&self) -> PolicyMode {
        self.policy
    }

    pub fn processes(&self) -> &BTreeMap<ProcessId, Process> {
        &self.processes
    }

    pub fn resources(&self) -> &BTreeMap<ResourceId, Resource> {
        &self.resources
    }

    pub fn waits(&self) -> &WaitRegistry {
        &self.waits
    }

    /// §4.1: allowed only between events. Every public method here runs a
    /// whole event to completion (§5), so there is never a "mid-event"
    /// state to protect against; the check is trivially satisfied.
    pub fn set_policy(&mut self, mode: PolicyMode) -> ArbiterResult<()> {
        log::info!("policy set to {}", mode.name());
        self.policy = mode;
        Ok(())
    }

    pub fn add_process(&mut self, pid: ProcessId) -> ArbiterResult<()> {
        if self.processes.contains_key(&pid) {
            return Err(ArbiterError::DuplicateProcess(pid));
        }
        self.processes.insert(pid, Process::new(pid));
        log::debug!("added process {pid}");
        Ok(())
    }

    pub fn add_resource(&mut self, rid: ResourceId, total: u32) -> ArbiterResult<()> {
        if self.resources.contains_key(&rid) {
            return Err(ArbiterError::DuplicateResource(rid));
        }
        if total == 0 {
            return Err(ArbiterError::NonPositiveResourceTotal(0));
        }
        self.resources.insert(rid, Resource::new(rid, total));
        log::debug!("added resource {rid} with {total} instance(s)");
        Ok(())
    }

    /// Declares a process's max simultaneous claim. A claim above the
    /// resource's total is a setup error, not clamped (§4.1).
    pub fn declare_max(&mut self, pid: ProcessId, rid: ResourceId, count: u32) -> ArbiterResult<()> {
        let total = self
            .resources
            .get(&rid)
            .ok_or(ArbiterError::UnknownResource(rid))?
            .total;
        if !self.processes.contains_key(&pid) {
            return Err(ArbiterError::UnknownProcess(pid));
        }
        if count > total {
            return Err(ArbiterError::MaxClaimExceedsTotal {
                pid,
                rid,
                claim: count,
                total,
            });
        }

        self.processes.get_mut(&pid).unwrap().max_claim.insert(rid, count);
        Ok(())
    }

    pub fn request(&mut self, pid: ProcessId, rid: ResourceId, count: u32) -> ArbiterResult<RequestOutcome> {
        self.check_known(pid, rid)?;
        if count == 0 {
            return Err(ArbiterError::NonPositiveCount(0));
        }

        let outcome = match self.policy {
            PolicyMode::Detect => self.request_detect(pid, rid, count)?,
            PolicyMode::Avoid => self.request_avoid(pid, rid, count)?,
        };

        self.run_aging();
        Ok(outcome)
    }

    fn request_detect(&mut self, pid: ProcessId, rid: ResourceId, count: u32) -> ArbiterResult<RequestOutcome> {
        let available = self.resources[&rid].available;
        if count <= available {
            self.apply_allocation(pid, rid, count);
            self.finalize_grant(pid, rid, count);
            return Ok(RequestOutcome::Granted);
        }

        self.enqueue_waiter(pid, rid, count);

        if cycle::has_cycle(&self.processes, &self.waits) {
            log::warn!("deadlock detected, invoking recovery");
            if let Some(outcome) = self.run_recovery() {
                self.reevaluate_resources(outcome.preempted.keys().copied().collect());
            }
        }

        Ok(RequestOutcome::Waiting)
    }

    fn request_avoid(&mut self, pid: ProcessId, rid: ResourceId, count: u32) -> ArbiterResult<RequestOutcome> {
        let max = self
            .processes[&pid]
            .max_claim_of(rid)
            .ok_or(ArbiterError::MaxClaimUndeclared { pid, rid })?;
        let held = self.processes[&pid].held(rid);
        if count + held > max {
            return Err(ArbiterError::MaxClaimExceeded {
                pid,
                rid,
                requested: count,
                max,
            });
        }

        let available = self.resources[&rid].available;
        if count <= available {
            self.apply_allocation(pid, rid, count);
            if self.is_safe() {
                self.finalize_grant(pid, rid, count);
                return Ok(RequestOutcome::Granted);
            }
            // Roll back: the tentative grant left the system unsafe. Only
            // the resource/holdings bookkeeping was touched, so the wait
            // timer is untouched and there is nothing to restore.
            self.revert_allocation(pid, rid, count);
            log::warn!("{pid} request for {count} of {rid} denied: would leave an unsafe state");
        }

        self.enqueue_waiter(pid, rid, count);
        Ok(RequestOutcome::Waiting)
    }

    pub fn release(&mut self, pid: ProcessId, rid: ResourceId, count: u32) -> ArbiterResult<()> {
        self.check_known(pid, rid)?;
        if count == 0 {
            return Err(ArbiterError::NonPositiveCount(0));
        }

        let held = self.processes[&pid].held(rid);
        if count > held {
            return Err(ArbiterError::ReleaseExceedsHeld {
                pid,
                rid,
                requested: count,
                held,
            });
        }

        self.processes.get_mut(&pid).unwrap().take(rid, count);
        self.resources.get_mut(&rid).unwrap().available += count;
        log::info!("{pid} released {count} of {rid}");

        self.reevaluate_resources(std::iter::once(rid).collect());
        self.run_aging();
        Ok(())
    }

    /// `X`: aging plus a read-only cycle scan for the snapshot, no mutation
    /// of allocations (§4.1).
    pub fn examine(&mut self) -> Snapshot {
        self.run_aging();
        self.last_cycle = if self.policy == PolicyMode::Detect {
            cycle::find_cycle_members(&self.processes, &self.waits)
        } else {
            Vec::new()
        };
        self.snapshot(Vec::new())
    }

    /// `C`: force recovery outside of the normal request path. A no-op
    /// under AVOID, where recovery has no meaning.
    pub fn force_recovery(&mut self) -> ArbiterResult<Option<RecoveryOutcome>> {
        if self.policy != PolicyMode::Detect {
            log::warn!("force-recovery ignored: policy is AVOID");
            return Ok(None);
        }
        let outcome = self.run_recovery();
        if let Some(o) = &outcome {
            self.reevaluate_resources(o.preempted.keys().copied().collect());
        }
        self.run_aging();
        Ok(outcome)
    }

    pub fn snapshot(&self, log: Vec<String>) -> Snapshot {
        Snapshot::build(&self.resources, &self.processes, &self.waits, &self.last_cycle, log)
    }

    fn check_known(&self, pid: ProcessId, rid: ResourceId) -> ArbiterResult<()> {
        if !self.processes.contains_key(&pid) {
            return Err(ArbiterError::UnknownProcess(pid));
        }
        if !self.resources.contains_key(&rid) {
            return Err(ArbiterError::UnknownResource(rid));
        }
        Ok(())
    }

    /// Pure resource/holdings bookkeeping for a grant, with no side effect
    /// on the wait timer or the wait registry. Used both for grants that
    /// are already known-final (DETECT) and for grants that are merely
    /// tentative pending a safety check (AVOID) — in the tentative case,
    /// `revert_allocation` undoes exactly this and nothing else, so a
    /// rejected tentative grant never disturbs `wait_start` or the queue
    /// entry (§3 invariant 6).
    fn apply_allocation(&mut self, pid: ProcessId, rid: ResourceId, count: u32) {
        self.resources.get_mut(&rid).unwrap().available -= count;
        self.processes.get_mut(&pid).unwrap().grant(rid, count);
    }

    fn revert_allocation(&mut self, pid: ProcessId, rid: ResourceId, count: u32) {
        self.processes.get_mut(&pid).unwrap().take(rid, count);
        self.resources.get_mut(&rid).unwrap().available += count;
    }

    /// Marks a grant as final: clears the wait timer and drops the queue
    /// entry. Call only once the allocation is known to stick — after
    /// `apply_allocation` for an unconditional grant, or after
    /// `apply_allocation` has also passed a safety check under AVOID.
    fn finalize_grant(&mut self, pid: ProcessId, rid: ResourceId, count: u32) {
        self.processes.get_mut(&pid).unwrap().reset_wait_timer();
        self.waits.remove(rid, pid);
        log::info!("{pid} granted {count} of {rid}");
    }

    fn enqueue_waiter(&mut self, pid: ProcessId, rid: ResourceId, count: u32) {
        self.waits.enqueue(rid, pid, count);
        let now = self.clock.now();
        self.processes.get_mut(&pid).unwrap().start_waiting(now);
        log::info!("{pid} waiting for {count} of {rid}");
    }

    fn is_safe(&self) -> bool {
        crate::safety::check_safety(&self.processes, &self.resources)
            .map(|r| r.safe)
            .unwrap_or(false)
    }

    fn run_recovery(&mut self) -> Option<RecoveryOutcome> {
        recovery::recover(&mut self.processes, &mut self.resources, &mut self.waits)
    }

    fn run_aging(&mut self) {
        aging::run_aging_pass(
            &mut self.processes,
            &self.waits,
            &self.clock,
            self.config.aging_threshold_secs,
        );
    }

    /// Fixed-point re-evaluation of the given resources' wait queues
    /// (§4.2), bounded by `retry_pass_cap`.
    fn reevaluate_resources(&mut self, mut pending: BTreeSet<ResourceId>) {
        let mut passes = 0;
        while passes < self.config.retry_pass_cap && !pending.is_empty() {
            passes += 1;
            let mut any_grant = false;
            for rid in pending.clone() {
                if self.reevaluate_one(rid) {
                    any_grant = true;
                }
            }
            if !any_grant {
                break;
            }
            pending = self.waits.resources_with_waiters().collect();
        }
        if passes == self.config.retry_pass_cap && self.waits.all_waiters().next().is_some() {
            log::warn!("wait-queue re-evaluation hit its {}-pass cap with waiters remaining", self.config.retry_pass_cap);
        }
    }

    /// One pass over a single resource's queue, highest priority first,
    /// FIFO within a priority band. Returns whether any grant occurred.
    fn reevaluate_one(&mut self, rid: ResourceId) -> bool {
        let queue: Vec<WaitEntry> = self.waits.queue(rid).to_vec();
        if queue.is_empty() {
            return false;
        }

        let mut order: Vec<usize> = (0..queue.len()).collect();
        order.sort_by_key(|&i| {
            let prio = self
                .processes
                .get(&queue[i].process)
                .map(|p| p.priority)
                .unwrap_or(0);
            (Reverse(prio), i)
        });

        let mut granted = BTreeSet::new();
        for i in order {
            let entry = queue[i];
            if !self.processes.contains_key(&entry.process) {
                continue;
            }
            let available = self.resources[&rid].available;
            if entry.requested > available {
                break;
            }

            match self.policy {
                PolicyMode::Detect => {
                    self.apply_allocation(entry.process, rid, entry.requested);
                    self.finalize_grant(entry.process, rid, entry.requested);
                    granted.insert(i);
                }
                PolicyMode::Avoid => {
                    self.apply_allocation(entry.process, rid, entry.requested);
                    if self.is_safe() {
                        self.finalize_grant(entry.process, rid, entry.requested);
                        granted.insert(i);
                    } else {
                        // Skipped on safety grounds only; keep scanning.
                        // The entry stays in the queue untouched below, and
                        // since only the allocation was tentative, its wait
                        // timer was never disturbed.
                        self.revert_allocation(entry.process, rid, entry.requested);
                    }
                }
            }
        }

        let remaining: VecDeque<WaitEntry> = queue
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !granted.contains(i))
            .map(|(_, e)| e)
            .collect();
        self.waits.set_queue(rid, remaining);
        !granted.is_empty()
    }
}

/*
 * Recovery Agent
 *
 * Invoked once the cycle detector reports a deadlock under DETECT. Picks a
 * victim, returns everything it holds to the pool, drops its pending waits.
 * Preemption never terminates the victim in this model; it merely clears
 * its state so the external driver may re-issue requests on its behalf.
 */

use std::collections::{BTreeMap, BTreeSet};

use crate::ids::{ProcessId, ResourceId};
use crate::process::Process;
use crate::resource::Resource;
use crate::wait_queue::WaitRegistry;

/// What the recovery agent did, for logging and snapshot purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub victim: ProcessId,
    pub preempted: BTreeMap<ResourceId, u32>,
}

/// Candidate set per §4.5: every waiter, union every holder of a resource
/// some waiter is contesting.
fn candidates(processes: &BTreeMap<ProcessId, Process>, waits: &WaitRegistry) -> BTreeSet<ProcessId> {
    let mut set: BTreeSet<ProcessId> = waits.all_waiters().collect();
    for rid in waits.resources_with_waiters() {
        for (&pid, p) in processes {
            if p.held(rid) > 0 {
                set.insert(pid);
            }
        }
    }
    set.retain(|pid| processes.contains_key(pid));
    set
}

fn cost(p: &Process) -> i64 {
    p.total_held() as i64 + p.distinct_types_held() as i64 - p.priority as i64
}

/// Select, preempt, and clean up after a victim. Returns `None` if no
/// candidate exists (recovery failure, logged critical by the caller).
pub fn recover(
    processes: &mut BTreeMap<ProcessId, Process>,
    resources: &mut BTreeMap<ResourceId, Resource>,
    waits: &mut WaitRegistry,
) -> Option<RecoveryOutcome> {
    let candidate_set = candidates(processes, waits);
    if candidate_set.is_empty() {
        log::error!("recovery failure: deadlock detected but no candidate to victimise");
        return None;
    }

    let victim = candidate_set
        .iter()
        .copied()
        .min_by_key(|&pid| (cost(&processes[&pid]), pid.as_u32()))
        .expect("candidate_set is non-empty");

    let preempted = {
        let p = processes
            .get_mut(&victim)
            .expect("victim drawn from processes");
        p.clear_all_holdings()
    };

    for (&rid, &count) in &preempted {
        if let Some(r) = resources.get_mut(&rid) {
            r.available += count;
        }
    }

    waits.remove_everywhere(victim);
    if let Some(p) = processes.get_mut(&victim) {
        p.reset_wait_timer();
    }

    log::info!(
        "recovery: victimised {victim}, preempted {} resource type(s)",
        preempted.len()
    );

    Some(RecoveryOutcome { victim, preempted })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_two_process_deadlock() -> (
        BTreeMap<ProcessId, Process>,
        BTreeMap<ResourceId, Resource>,
        WaitRegistry,
    ) {
        let mut processes = BTreeMap::new();
        let mut p0 = Process::new(ProcessId(0));
        p0.grant(ResourceId(0), 1);
        let mut p1 = Process::new(ProcessId(1));
        p1.grant(ResourceId(1), 1);
        processes.insert(ProcessId(0), p0);
        processes.insert(ProcessId(1), p1);

        let mut resources = BTreeMap::new();
        resources.insert(ResourceId(0), Resource::new(ResourceId(0), 1));
        resources.insert(ResourceId(1), Resource::new(ResourceId(1), 1));
        resources.get_mut(&ResourceId(0)).unwrap().available = 0;
        resources.get_mut(&ResourceId(1)).unwrap().available = 0;

        let mut waits = WaitRegistry::new();
        waits.enqueue(ResourceId(1), ProcessId(0), 1);
        waits.enqueue(ResourceId(0), ProcessId(1), 1);

        (processes, resources, waits)
    }

    #[test]
    fn lower_id_wins_tie() {
        let (mut processes, mut resources, mut waits) = setup_two_process_deadlock();
        let outcome = recover(&mut processes, &mut resources, &mut waits).unwrap();
        assert_eq!(outcome.victim, ProcessId(0));
        assert_eq!(resources[&ResourceId(0)].available, 1);
        assert_eq!(processes[&ProcessId(0)].total_held(), 0);
        assert!(!waits.is_waiting(ProcessId(0)));
        assert!(waits.is_waiting(ProcessId(1)));
    }

    #[test]
    fn higher_priority_protects_from_victimisation() {
        let (mut processes, mut resources, mut waits) = setup_two_process_deadlock();
        processes.get_mut(&ProcessId(0)).unwrap().priority = 5;
        let outcome = recover(&mut processes, &mut resources, &mut waits).unwrap();
        assert_eq!(outcome.victim, ProcessId(1));
    }

    #[test]
    fn no_candidates_returns_none() {
        let mut processes = BTreeMap::new();
        let mut resources = BTreeMap::new();
        let mut waits = WaitRegistry::new();
        assert_eq!(recover(&mut processes, &mut resources, &mut waits), None);
    }
}

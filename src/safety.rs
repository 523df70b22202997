/*
 * Safety Checker -- Banker's Algorithm
 *
 * Deadlock *avoidance*: given a hypothetical state, decide whether some
 * ordering of the processes lets each one's remaining need be satisfied
 * in turn from accumulating releases. Used by the arbiter to test a
 * tentative allocation before committing to it under AVOID.
 */

use std::collections::BTreeMap;

use crate::ids::{ProcessId, ResourceId};
use crate::process::Process;
use crate::resource::Resource;

/// Outcome of a safety check: whether the state is safe and, if so, one
/// valid finishing order (ascending-id tie-break makes it reproducible).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyReport {
    pub safe: bool,
    pub safe_sequence: Vec<ProcessId>,
}

/// Run the Banker's algorithm over the given processes and resources.
///
/// Returns `None` if the state is malformed: some process has
/// `need(p, r) < 0`, i.e. holds more of `r` than it declared as its
/// maximum claim. A malformed check cannot be answered and callers must
/// treat that as "not safe" without pretending to have scanned it.
pub fn check_safety(
    processes: &BTreeMap<ProcessId, Process>,
    resources: &BTreeMap<ResourceId, Resource>,
) -> Option<SafetyReport> {
    let mut work: BTreeMap<ResourceId, i64> =
        resources.iter().map(|(&rid, r)| (rid, r.available as i64)).collect();

    let mut finish: BTreeMap<ProcessId, bool> =
        processes.keys().map(|&pid| (pid, false)).collect();

    for (&pid, p) in processes {
        for &rid in resources.keys() {
            if let Some(need) = p.need(rid) {
                if need < 0 {
                    log::error!(
                        "safety check malformed: {pid} holds more of {rid} than its declared max-claim"
                    );
                    return None;
                }
            }
        }
    }

    let mut safe_sequence = Vec::with_capacity(processes.len());
    loop {
        let mut progressed = false;
        // Deterministic ascending-id scan (§4.3) for a reproducible safe
        // sequence across implementations.
        for (&pid, p) in processes {
            if finish[&pid] {
                continue;
            }
            let can_finish = resources.keys().all(|&rid| {
                let need = p.need(rid).unwrap_or(0);
                need <= *work.get(&rid).unwrap_or(&0)
            });
            if can_finish {
                for (&rid, &held) in &p.holdings {
                    *work.entry(rid).or_insert(0) += held as i64;
                }
                finish.insert(pid, true);
                safe_sequence.push(pid);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    let safe = finish.values().all(|&done| done);
    Some(SafetyReport {
        safe,
        safe_sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(id: u32, holdings: &[(u32, u32)], max: &[(u32, u32)]) -> Process {
        let mut p = Process::new(ProcessId(id));
        for &(r, c) in holdings {
            p.grant(ResourceId(r), c);
        }
        for &(r, c) in max {
            p.max_claim.insert(ResourceId(r), c);
        }
        p
    }

    #[test]
    fn classic_safe_state() {
        // Textbook Banker's example: total=10, available after allocation=3.
        let mut processes = BTreeMap::new();
        processes.insert(ProcessId(0), proc(0, &[(0, 3)], &[(0, 7)]));
        processes.insert(ProcessId(1), proc(1, &[(0, 2)], &[(0, 4)]));
        processes.insert(ProcessId(2), proc(2, &[(0, 2)], &[(0, 9)]));

        let mut resources = BTreeMap::new();
        resources.insert(ResourceId(0), Resource { id: ResourceId(0), total: 10, available: 3 });

        let report = check_safety(&processes, &resources).unwrap();
        assert!(report.safe);
    }

    #[test]
    fn unsafe_request_denied() {
        // Mirrors scenario 2 in §8: after granting P0=5 and P1=2, available=3.
        // P2 requesting 3 more yields work=0, need (4,2,4): unsafe.
        let mut processes = BTreeMap::new();
        processes.insert(ProcessId(0), proc(0, &[(0, 5)], &[(0, 9)]));
        processes.insert(ProcessId(1), proc(1, &[(0, 2)], &[(0, 4)]));
        processes.insert(ProcessId(2), proc(2, &[(0, 3)], &[(0, 7)]));

        let mut resources = BTreeMap::new();
        resources.insert(ResourceId(0), Resource { id: ResourceId(0), total: 10, available: 0 });

        let report = check_safety(&processes, &resources).unwrap();
        assert!(!report.safe);
    }

    #[test]
    fn malformed_need_returns_none() {
        let mut processes = BTreeMap::new();
        let mut p = Process::new(ProcessId(0));
        p.grant(ResourceId(0), 5);
        p.max_claim.insert(ResourceId(0), 2); // held > max_claim: malformed
        processes.insert(ProcessId(0), p);

        let mut resources = BTreeMap::new();
        resources.insert(ResourceId(0), Resource { id: ResourceId(0), total: 10, available: 5 });

        assert_eq!(check_safety(&processes, &resources), None);
    }
}

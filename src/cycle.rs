/*
 * Cycle Detector -- Wait-For Graph
 *
 * Deadlock *detection*: build a directed graph where an edge `waiter -> holder`
 * means "waiter is blocked on a resource holder currently has some of", then
 * look for a back edge into the current DFS recursion stack.
 *
 * The core only needs a yes/no answer (§4.4); `find_cycle_members` below is
 * an ambient addition for the ids printed in a snapshot and is not consulted
 * by the arbiter's policy decisions.
 */

use std::collections::{BTreeMap, BTreeSet};

use crate::ids::{ProcessId, ResourceId};
use crate::process::Process;
use crate::wait_queue::WaitRegistry;

fn build_wait_for_graph(
    processes: &BTreeMap<ProcessId, Process>,
    waits: &WaitRegistry,
) -> BTreeMap<ProcessId, BTreeSet<ProcessId>> {
    let mut graph: BTreeMap<ProcessId, BTreeSet<ProcessId>> = BTreeMap::new();

    for (rid, entry) in waits.iter() {
        let waiter = entry.process;
        let edges = graph.entry(waiter).or_default();
        for (&pid, p) in processes {
            if pid != waiter && p.held(rid) > 0 {
                edges.insert(pid);
            }
        }
    }

    graph
}

enum Color {
    White,
    Gray,
    Black,
}

/// Does the current wait-for graph contain a cycle?
///
/// Roots are every known process id plus every waiter id (orphaned wait
/// entries referencing an id outside `processes` are visited as isolated,
/// edge-less nodes rather than panicking).
pub fn has_cycle(processes: &BTreeMap<ProcessId, Process>, waits: &WaitRegistry) -> bool {
    if waits.all_waiters().next().is_none() {
        return false;
    }

    let graph = build_wait_for_graph(processes, waits);

    let mut roots: BTreeSet<ProcessId> = processes.keys().copied().collect();
    for pid in waits.all_waiters() {
        if !roots.contains(&pid) {
            log::warn!("orphaned wait entry for unknown process {pid}; treated as no-op");
        }
        roots.insert(pid);
    }

    let mut colors: BTreeMap<ProcessId, Color> =
        roots.iter().map(|&pid| (pid, Color::White)).collect();

    for &root in &roots {
        if matches!(colors.get(&root), Some(Color::White)) {
            if dfs_has_cycle(root, &graph, &mut colors) {
                return true;
            }
        }
    }
    false
}

fn dfs_has_cycle(
    node: ProcessId,
    graph: &BTreeMap<ProcessId, BTreeSet<ProcessId>>,
    colors: &mut BTreeMap<ProcessId, Color>,
) -> bool {
    colors.insert(node, Color::Gray);
    if let Some(neighbors) = graph.get(&node) {
        for &next in neighbors {
            match colors.get(&next) {
                Some(Color::Gray) => return true,
                Some(Color::Black) => {}
                _ => {
                    if dfs_has_cycle(next, graph, colors) {
                        return true;
                    }
                }
            }
        }
    }
    colors.insert(node, Color::Black);
    false
}

/// Ambient helper for the state snapshot (§4.9): the process ids that
/// participate in some cycle in the current wait-for graph, or an empty
/// vector when there is none. Deterministic (ascending id) ordering.
pub fn find_cycle_members(
    processes: &BTreeMap<ProcessId, Process>,
    waits: &WaitRegistry,
) -> Vec<ProcessId> {
    let graph = build_wait_for_graph(processes, waits);
    let mut on_cycle = BTreeSet::new();

    for &start in graph.keys() {
        let mut stack = vec![start];
        let mut path = Vec::new();
        let mut visited = BTreeSet::new();
        // Small per-root DFS that records the path so a discovered back
        // edge can mark exactly the cycle it closes, not the whole graph.
        fn walk(
            node: ProcessId,
            graph: &BTreeMap<ProcessId, BTreeSet<ProcessId>>,
            path: &mut Vec<ProcessId>,
            visited: &mut BTreeSet<ProcessId>,
            on_cycle: &mut BTreeSet<ProcessId>,
        ) {
            if let Some(pos) = path.iter().position(|&n| n == node) {
                on_cycle.extend(path[pos..].iter().copied());
                return;
            }
            if !visited.insert(node) {
                return;
            }
            path.push(node);
            if let Some(neighbors) = graph.get(&node) {
                for &next in neighbors {
                    walk(next, graph, path, visited, on_cycle);
                }
            }
            path.pop();
        }
        walk(start, &graph, &mut path, &mut visited, &mut on_cycle);
        stack.clear();
    }

    on_cycle.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Process;

    #[test]
    fn no_waiters_means_no_cycle() {
        let processes = BTreeMap::new();
        let waits = WaitRegistry::new();
        assert!(!has_cycle(&processes, &waits));
    }

    #[test]
    fn two_process_cycle_detected() {
        let mut processes = BTreeMap::new();
        let mut p0 = Process::new(ProcessId(0));
        p0.grant(ResourceId(0), 1);
        let mut p1 = Process::new(ProcessId(1));
        p1.grant(ResourceId(1), 1);
        processes.insert(ProcessId(0), p0);
        processes.insert(ProcessId(1), p1);

        let mut waits = WaitRegistry::new();
        waits.enqueue(ResourceId(1), ProcessId(0), 1);
        waits.enqueue(ResourceId(0), ProcessId(1), 1);

        assert!(has_cycle(&processes, &waits));
        let members = find_cycle_members(&processes, &waits);
        assert_eq!(members, vec![ProcessId(0), ProcessId(1)]);
    }

    #[test]
    fn orphaned_waiter_does_not_panic() {
        let processes = BTreeMap::new();
        let mut waits = WaitRegistry::new();
        waits.enqueue(ResourceId(0), ProcessId(99), 1);
        assert!(!has_cycle(&processes, &waits));
    }
}

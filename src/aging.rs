/*
 * Starvation Guardian
 *
 * Runs after every state-changing event (§4.6). Keeps each process's wait
 * timer honest and converts an overlong wait into a priority bump, which
 * feeds back into wait-queue re-evaluation ordering.
 */

use std::collections::BTreeMap;

use crate::clock::Clock;
use crate::ids::ProcessId;
use crate::process::Process;
use crate::wait_queue::WaitRegistry;

/// Scan every process and age out any that have waited past `threshold_secs`.
/// Returns the ids that were boosted this pass, for logging/snapshot use.
pub fn run_aging_pass(
    processes: &mut BTreeMap<ProcessId, Process>,
    waits: &WaitRegistry,
    clock: &dyn Clock,
    threshold_secs: u64,
) -> Vec<ProcessId> {
    let now = clock.now();
    let mut boosted = Vec::new();

    for (&pid, p) in processes.iter_mut() {
        let waiting = waits.is_waiting(pid);
        if waiting {
            if !p.is_waiting() {
                p.start_waiting(now);
            } else if now.saturating_sub(p.wait_start) > threshold_secs {
                p.bump_priority();
                p.wait_start = now;
                boosted.push(pid);
                log::info!("aging: boosted {pid} to priority {}", p.priority);
            }
        } else {
            p.reset_wait_timer();
        }
    }

    boosted
}

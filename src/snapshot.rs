/*
 * State Snapshot
 *
 * A serializable read-only view of the arbiter, built from its public
 * accessors (§4.9). Not a core type: the core never constructs or
 * consumes a `Snapshot`, it only exposes what one is built from.
 */

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ids::{ProcessId, ResourceId};
use crate::process::Process;
use crate::resource::Resource;
use crate::wait_queue::WaitRegistry;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceView {
    pub id: u32,
    pub total: u32,
    pub available: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Count {
    pub id: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProcessView {
    pub id: u32,
    pub priority: u32,
    pub held: Vec<Count>,
    pub max_need: Vec<Count>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WaitLink {
    pub process_id: u32,
    pub resource_id: u32,
    pub count: u32,
}

/// A point-in-time view of the arbiter's state, plus whatever log lines
/// were produced since the previous snapshot.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub resources: Vec<ResourceView>,
    pub processes: Vec<ProcessView>,
    pub wait_links: Vec<WaitLink>,
    pub deadlock_cycle: Vec<u32>,
    pub log: Vec<String>,
}

impl Snapshot {
    pub fn build(
        resources: &BTreeMap<ResourceId, Resource>,
        processes: &BTreeMap<ProcessId, Process>,
        waits: &WaitRegistry,
        deadlock_cycle: &[ProcessId],
        log: Vec<String>,
    ) -> Self {
        let resources = resources
            .values()
            .map(|r| ResourceView {
                id: r.id.as_u32(),
                total: r.total,
                available: r.available,
            })
            .collect();

        let processes = processes
            .values()
            .map(|p| ProcessView {
                id: p.id.as_u32(),
                priority: p.priority,
                held: p
                    .holdings
                    .iter()
                    .map(|(&rid, &count)| Count {
                        id: rid.as_u32(),
                        count,
                    })
                    .collect(),
                max_need: p
                    .max_claim
                    .iter()
                    .map(|(&rid, &max)| Count {
                        id: rid.as_u32(),
                        count: (max as i64 - p.held(rid) as i64).max(0) as u32,
                    })
                    .collect(),
            })
            .collect();

        let wait_links = waits
            .iter()
            .map(|(rid, entry)| WaitLink {
                process_id: entry.process.as_u32(),
                resource_id: rid.as_u32(),
                count: entry.requested,
            })
            .collect();

        Snapshot {
            resources,
            processes,
            wait_links,
            deadlock_cycle: deadlock_cycle.iter().map(|p| p.as_u32()).collect(),
            log,
        }
    }

    /// Frame the snapshot's JSON body with resync delimiters for a
    /// line-oriented transport (§4.9).
    pub fn to_framed_json(&self) -> serde_json::Result<String> {
        let body = serde_json::to_string(self)?;
        Ok(format!("--- SNAPSHOT BEGIN ---\n{body}\n--- SNAPSHOT END ---"))
    }
}

/// Accumulates `log` records in memory so a snapshot can drain exactly the
/// lines produced since the previous one (§4.9). Wired in by the CLI entry
/// point as the format callback of the installed `env_logger` instance, so
/// every line that reaches stderr is also captured here.
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: std::sync::Mutex<Vec<String>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        self.lines.lock().expect("log buffer mutex poisoned").push(line);
    }

    /// Remove and return every line accumulated so far.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().expect("log buffer mutex poisoned"))
    }
}

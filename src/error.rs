/*
 * Error Types
 *
 * Setup errors and event-validation errors (§7) are reported identically
 * by every caller in this crate: log it, skip or deny the offending
 * command, leave state untouched. They share one enum for that reason.
 * Unsafe-state denial and deadlock are explicitly *not* errors -- they are
 * ordinary outcomes of `request` -- so neither appears here.
 */

use thiserror::Error;

use crate::ids::{ProcessId, ResourceId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArbiterError {
    #[error("process {0} already exists")]
    DuplicateProcess(ProcessId),

    #[error("resource {0} already exists")]
    DuplicateResource(ResourceId),

    #[error("unknown process {0}")]
    UnknownProcess(ProcessId),

    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    #[error("id must be non-negative, got {value}")]
    NegativeId { value: i64 },

    #[error("resource total must be strictly positive, got {0}")]
    NonPositiveResourceTotal(i64),

    #[error("count must be strictly positive, got {0}")]
    NonPositiveCount(i64),

    #[error("max-claim {claim} for {pid}/{rid} exceeds total {total}")]
    MaxClaimExceedsTotal {
        pid: ProcessId,
        rid: ResourceId,
        claim: u32,
        total: u32,
    },

    #[error("{pid} has no declared max-claim for {rid}, required under AVOID")]
    MaxClaimUndeclared { pid: ProcessId, rid: ResourceId },

    #[error("{pid} request of {requested} for {rid} exceeds max-claim {max}")]
    MaxClaimExceeded {
        pid: ProcessId,
        rid: ResourceId,
        requested: u32,
        max: u32,
    },

    #[error("{pid} cannot release {requested} of {rid}, only holds {held}")]
    ReleaseExceedsHeld {
        pid: ProcessId,
        rid: ResourceId,
        requested: u32,
        held: u32,
    },

    #[error("failed to read configuration: {0}")]
    Config(String),
}

pub type ArbiterResult<T> = Result<T, ArbiterError>;

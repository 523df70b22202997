/*
 * Configuration
 *
 * The two knobs the core spec calls "configurable" (§4.11): the
 * wait-queue re-evaluation pass cap and the aging threshold. Both have
 * defaults baked in; an `arbiter.toml` file, if present, overrides them.
 */

use std::path::Path;

use serde::Deserialize;

use crate::error::{ArbiterError, ArbiterResult};

/// Runtime-tunable arbiter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterConfig {
    /// Ceiling on wait-queue re-evaluation passes per event (§4.1).
    pub retry_pass_cap: u32,
    /// Seconds a process may wait before its priority is bumped (§4.6).
    pub aging_threshold_secs: u64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        ArbiterConfig {
            retry_pass_cap: 3,
            aging_threshold_secs: 5,
        }
    }
}

/// On-disk shape of `arbiter.toml`. Every field optional; absent fields
/// fall back to `ArbiterConfig::default()`.
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    retry_pass_cap: Option<u32>,
    aging_threshold_secs: Option<u64>,
}

impl ArbiterConfig {
    /// Load overrides from `path`. A missing file yields the defaults
    /// unchanged; a present-but-malformed file is a setup failure.
    pub fn load(path: &Path) -> ArbiterResult<Self> {
        if !path.exists() {
            log::debug!("no config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| ArbiterError::Config(format!("{}: {e}", path.display())))?;
        let raw: RawConfig = toml::from_str(&text)
            .map_err(|e| ArbiterError::Config(format!("{}: {e}", path.display())))?;

        let mut cfg = Self::default();
        if let Some(cap) = raw.retry_pass_cap {
            cfg.retry_pass_cap = cap;
        }
        if let Some(secs) = raw.aging_threshold_secs {
            cfg.aging_threshold_secs = secs;
        }
        Ok(cfg)
    }
}

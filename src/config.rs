//! Engine configuration

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_SIG_CACHE_SIZE, MAX_MAX_SIG_CACHE_SIZE};
use crate::error::{ConsensusError, Result};
use crate::script_flags::ScriptFlags;

/// Settings of a [`crate::ConsensusEngine`]; missing JSON fields take their defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Signature cache budget in MiB
    pub max_sig_cache_size: usize,
    /// Verification flags replacing the standard set
    pub script_flags: Option<ScriptFlags>,
    /// Verify the inputs of a transaction on the rayon pool
    pub parallel_script_checks: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            max_sig_cache_size: DEFAULT_MAX_SIG_CACHE_SIZE,
            script_flags: None,
            parallel_script_checks: true,
        }
    }
}

impl ConsensusConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: ConsensusConfig = serde_json::from_str(json).context("invalid consensus configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("in {}", path.display()))
    }

    /// Cache budget clamped to `[0, MAX_MAX_SIG_CACHE_SIZE]`
    pub fn sig_cache_size(&self) -> usize {
        self.max_sig_cache_size.min(MAX_MAX_SIG_CACHE_SIZE)
    }

    pub fn flags(&self) -> ScriptFlags {
        self.script_flags.unwrap_or(ScriptFlags::STANDARD)
    }

    /// Reject flag overrides the interpreter cannot run under
    pub fn validate(&self) -> Result<()> {
        let Some(flags) = self.script_flags else {
            return Ok(());
        };
        if ScriptFlags::from_bits(flags.bits()).is_none() {
            return Err(ConsensusError::Configuration(format!("unknown script flag bits {:#x}", flags.bits())));
        }
        if flags.contains(ScriptFlags::CLEANSTACK) && !flags.contains(ScriptFlags::P2SH) {
            return Err(ConsensusError::Configuration("CLEANSTACK requires P2SH".into()));
        }
        Ok(())
    }
}

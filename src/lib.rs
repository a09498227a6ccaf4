//! # Cash Consensus
//!
//! Script and signature verification core of a Bitcoin Cash node, with the
//! block index skip list and active-chain bookkeeping that sit next to it.
//!
//! ## Architecture
//!
//! - Primitives: amounts, transactions, headers and their consensus encoding
//! - Script: opcodes, numbers, flags, the interpreter and its signature checker
//! - Signatures: encoding rules, SignatureHash and the signature cache
//! - Chain: proof of work, the block tree with skip pointers and the active chain
//! - Boundaries: per-transaction input checks and the C verification interface
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: verification depends only on its inputs and flags
//! 2. **Explicit context**: everything a script may inspect is passed in
//! 3. **Exact Version Pinning**: consensus-critical cryptography is pinned
//! 4. **No global state**: caches belong to the engine that created them
//!
//! ## Usage
//!
//! ```rust
//! use cash_consensus::{ConsensusEngine, ConsensusConfig};
//!
//! let engine = ConsensusEngine::new(ConsensusConfig::default());
//! // OP_1 satisfies OP_1 OP_EQUAL
//! assert!(engine.verify_script(&[0x51], &[0x51, 0x87]).is_ok());
//! ```

pub mod amount;
pub mod base58;
pub mod chain;
pub mod checker;
pub mod compressor;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod hash;
pub mod interpreter;
pub mod key;
pub mod libconsensus;
pub mod pow;
pub mod pubkey;
pub mod script;
pub mod script_error;
pub mod script_flags;
pub mod script_num;
pub mod serialize;
pub mod sigcache;
pub mod sigencoding;
pub mod sighash;
pub mod types;
pub mod uint;
pub mod validation;

use std::sync::Arc;

// Re-export commonly used types
pub use amount::Amount;
pub use chain::{BlockId, BlockIndex, BlockLocator, BlockTree, Chain, ChainState};
pub use checker::{
    BaseSignatureChecker, CachingTransactionSignatureChecker, SignatureChecker, TransactionSignatureChecker,
};
pub use config::ConsensusConfig;
pub use constants::*;
pub use context::{PrevoutResolver, ScriptExecutionContext, SpentOutputs};
pub use error::{ConsensusError, Result};
pub use interpreter::{eval_script, ScriptExecutionMetrics};
pub use pow::PowParams;
pub use script_error::ScriptError;
pub use script_flags::ScriptFlags;
pub use sigcache::SignatureCache;
pub use sighash::{PrecomputedTransactionData, SigHashType};
pub use types::*;
pub use uint::U256;
pub use validation::{check_input_scripts, InputCheckOptions, ScriptCheck};

/// Verification entry point owning the signature cache and flag set
///
/// # Examples
///
/// ```
/// use cash_consensus::{ConsensusConfig, ConsensusEngine, ScriptFlags};
///
/// let config = ConsensusConfig { max_sig_cache_size: 1, ..Default::default() };
/// let engine = ConsensusEngine::new(config);
/// assert_eq!(engine.flags(), ScriptFlags::STANDARD);
/// ```
pub struct ConsensusEngine {
    config: ConsensusConfig,
    flags: ScriptFlags,
    signature_cache: Arc<SignatureCache>,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        let signature_cache = Arc::new(SignatureCache::new(config.sig_cache_size()));
        ConsensusEngine { flags: config.flags(), config, signature_cache }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn flags(&self) -> ScriptFlags {
        self.flags
    }

    /// Shared handle, for verifiers running outside the engine
    pub fn signature_cache(&self) -> Arc<SignatureCache> {
        Arc::clone(&self.signature_cache)
    }

    /// Verify a script pair with no transaction, under the engine's flags.
    ///
    /// Only data signatures can succeed; transaction signatures and lock
    /// time checks fail for lack of a transaction.
    ///
    /// # Examples
    ///
    /// ```
    /// use cash_consensus::{ConsensusEngine, ScriptError};
    ///
    /// let engine = ConsensusEngine::default();
    /// // OP_1 OP_2 against OP_ADD OP_3 OP_EQUAL
    /// assert!(engine.verify_script(&[0x51, 0x52], &[0x93, 0x53, 0x87]).is_ok());
    /// assert_eq!(engine.verify_script(&[0x51], &[0x00, 0x87]), Err(ScriptError::EvalFalse));
    /// ```
    pub fn verify_script(
        &self,
        script_sig: &[u8],
        script_pubkey: &[u8],
    ) -> std::result::Result<ScriptExecutionMetrics, ScriptError> {
        interpreter::verify_script(script_sig, script_pubkey, self.flags, &BaseSignatureChecker)
    }

    /// Verify every input of `tx` against its resolved spent outputs.
    ///
    /// `store_in_cache` is set for mempool admission, where later block
    /// validation will meet the same signatures again; it is cleared for
    /// block connection.
    pub fn verify_transaction(&self, tx: &Transaction, spent: &SpentOutputs, store_in_cache: bool) -> Result<usize> {
        let options = InputCheckOptions {
            cache: Some(self.signature_cache.as_ref()),
            store_in_cache,
            parallel: self.config.parallel_script_checks,
        };
        check_input_scripts(tx, spent, self.flags, options)
    }

    /// Resolve the spent outputs of `tx` through `resolver`, then verify it
    pub fn resolve_and_verify<R: PrevoutResolver + ?Sized>(
        &self,
        tx: &Transaction,
        resolver: &R,
        store_in_cache: bool,
    ) -> Result<usize> {
        let spent = SpentOutputs::resolve(tx, resolver)?;
        self.verify_transaction(tx, &spent, store_in_cache)
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(ConsensusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_engine_flags_from_config() {
        let config = ConsensusConfig { script_flags: Some(ScriptFlags::P2SH), ..Default::default() };
        let engine = ConsensusEngine::new(config);
        assert_eq!(engine.flags(), ScriptFlags::P2SH);
        assert!(engine.config().parallel_script_checks);
    }

    #[test]
    fn test_engine_shares_cache() {
        let engine = ConsensusEngine::new(ConsensusConfig { max_sig_cache_size: 1, ..Default::default() });
        let cache = engine.signature_cache();
        assert_eq!(Arc::strong_count(&cache), 2);
        assert_eq!(cache.capacity(), (1 << 20) / 32);
    }

    #[test]
    fn test_engine_scripts_without_transaction() {
        let engine = ConsensusEngine::default();
        assert!(engine.verify_script(&[0x51], &[0x51, 0x87]).is_ok());
        // lock time checks need a transaction
        assert_eq!(engine.verify_script(&[0x51], &[0xb1]), Err(ScriptError::UnsatisfiedLocktime));
    }

    #[test]
    fn test_resolve_missing_prevout() {
        let engine = ConsensusEngine::default();
        let tx = Transaction {
            version: 2,
            inputs: vec![TransactionInput { prevout: OutPoint::new([5; 32], 0), script_sig: vec![0x51], sequence: 0 }],
            outputs: vec![],
            lock_time: 0,
        };
        let mut utxos: HashMap<OutPoint, TransactionOutput> = HashMap::new();
        assert!(matches!(engine.resolve_and_verify(&tx, &utxos, true), Err(ConsensusError::MissingPrevout(_))));

        utxos.insert(OutPoint::new([5; 32], 0), TransactionOutput::new(Amount::from_sat(1), vec![0x51]));
        // OP_1 against OP_1 leaves two elements
        assert!(matches!(
            engine.resolve_and_verify(&tx, &utxos, true),
            Err(ConsensusError::InputScript { input: 0, error: ScriptError::CleanStack })
        ));
    }
}

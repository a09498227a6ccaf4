//! Script verification of every input of a transaction

use rayon::prelude::*;
use tracing::debug;

use crate::checker::{CachingTransactionSignatureChecker, TransactionSignatureChecker};
use crate::context::{ScriptExecutionContext, SpentOutputs};
use crate::error::{ConsensusError, Result};
use crate::interpreter::{verify_script, ScriptExecutionMetrics};
use crate::script_error::ScriptError;
use crate::script_flags::ScriptFlags;
use crate::sigcache::SignatureCache;
use crate::sighash::PrecomputedTransactionData;
use crate::types::Transaction;

/// Verification of one input's scripts, ready to run on any thread
#[derive(Clone, Copy)]
pub struct ScriptCheck<'a> {
    context: ScriptExecutionContext<'a>,
    precomputed: &'a PrecomputedTransactionData,
    flags: ScriptFlags,
    cache: Option<(&'a SignatureCache, bool)>,
}

impl<'a> ScriptCheck<'a> {
    pub fn new(context: ScriptExecutionContext<'a>, precomputed: &'a PrecomputedTransactionData, flags: ScriptFlags) -> Self {
        ScriptCheck { context, precomputed, flags, cache: None }
    }

    /// Consult `cache` for signatures; `store` inserts fresh successes
    /// instead of evicting hits
    pub fn with_cache(mut self, cache: &'a SignatureCache, store: bool) -> Self {
        self.cache = Some((cache, store));
        self
    }

    pub fn input_index(&self) -> usize {
        self.context.input_index()
    }

    /// VerifyScript(scriptSig, coin scriptPubKey, flags) for this input
    pub fn run(&self) -> std::result::Result<ScriptExecutionMetrics, ScriptError> {
        let script_sig = self.context.script_sig(self.context.input_index())?;
        let script_pubkey = self.context.coin_script_pubkey();
        let checker = TransactionSignatureChecker::new(self.context, self.precomputed);
        match self.cache {
            Some((cache, store)) => verify_script(
                script_sig,
                script_pubkey,
                self.flags,
                &CachingTransactionSignatureChecker::new(checker, cache, store),
            ),
            None => verify_script(script_sig, script_pubkey, self.flags, &checker),
        }
    }
}

/// Options for [`check_input_scripts`]
#[derive(Clone, Copy, Default)]
pub struct InputCheckOptions<'a> {
    pub cache: Option<&'a SignatureCache>,
    /// Insert successes into the cache (mempool) rather than evicting hits (blocks)
    pub store_in_cache: bool,
    /// Spread inputs over the rayon pool
    pub parallel: bool,
}

/// CheckInputScripts: 𝒯𝒳 × 𝒯* × ℱ → ℕ ∪ (ℕ × 𝔼)
///
/// 1. Build one context per input over the resolved spent outputs
/// 2. Precompute the shared FORKID digest components once
/// 3. Verify every input, sequentially or in parallel
/// 4. Report the lowest failing input index with its error, else the total
///    sig-check count
pub fn check_input_scripts(
    tx: &Transaction,
    spent: &SpentOutputs,
    flags: ScriptFlags,
    options: InputCheckOptions<'_>,
) -> Result<usize> {
    let contexts = ScriptExecutionContext::for_all_inputs(tx, spent)?;
    let Some(first) = contexts.first() else {
        return Ok(0);
    };
    let precomputed = PrecomputedTransactionData::new(first);

    let checks: Vec<ScriptCheck<'_>> = contexts
        .iter()
        .map(|context| {
            let check = ScriptCheck::new(*context, &precomputed, flags);
            match options.cache {
                Some(cache) => check.with_cache(cache, options.store_in_cache),
                None => check,
            }
        })
        .collect();

    let results: Vec<_> = if options.parallel {
        checks.par_iter().map(ScriptCheck::run).collect()
    } else {
        checks.iter().map(ScriptCheck::run).collect()
    };

    let mut sig_checks = 0usize;
    for (input, result) in results.into_iter().enumerate() {
        match result {
            Ok(metrics) => sig_checks += metrics.sig_checks,
            Err(error) => {
                debug!(input, ?error, "input script verification failed");
                return Err(ConsensusError::InputScript { input, error });
            }
        }
    }
    Ok(sig_checks)
}

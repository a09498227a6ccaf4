//! Signature checkers injected into the interpreter

use crate::constants::*;
use crate::context::ScriptExecutionContext;
use crate::pubkey;
use crate::script_flags::ScriptFlags;
use crate::sigcache::SignatureCache;
use crate::sighash::{get_hash_type, signature_hash, PrecomputedTransactionData};
use crate::types::Hash;

/// Capability the interpreter uses for everything that needs cryptography
/// or the spending transaction.
///
/// Only `verify_signature` is required; the transaction-bound operations
/// default to failing, which is the behaviour for scripts evaluated outside
/// of any transaction.
pub trait SignatureChecker {
    /// Verify a signature (without hash type byte) over a 32-byte digest
    fn verify_signature(&self, sig: &[u8], pubkey: &[u8], sighash: &Hash) -> bool;

    /// Digest a transaction signature (with hash type byte) commits to,
    /// `None` when there is no transaction to hash
    fn signature_digest(&self, _sig: &[u8], _script_code: &[u8], _flags: ScriptFlags) -> Option<Hash> {
        None
    }

    /// OP_CHECKSIG: `sig` carries its hash type byte
    fn check_sig(&self, sig: &[u8], pubkey: &[u8], script_code: &[u8], flags: ScriptFlags) -> bool {
        let Some((_, body)) = sig.split_last() else {
            return false;
        };
        match self.signature_digest(sig, script_code, flags) {
            Some(sighash) => self.verify_signature(body, pubkey, &sighash),
            None => false,
        }
    }

    /// OP_CHECKLOCKTIMEVERIFY against the transaction lock time
    fn check_lock_time(&self, _lock_time: i64) -> bool {
        false
    }

    /// OP_CHECKSEQUENCEVERIFY against the input's sequence
    fn check_sequence(&self, _sequence: i64) -> bool {
        false
    }

    /// Transaction context for introspection opcodes
    fn context(&self) -> Option<&ScriptExecutionContext<'_>> {
        None
    }
}

/// Checker with no transaction: data signatures only
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseSignatureChecker;

impl SignatureChecker for BaseSignatureChecker {
    fn verify_signature(&self, sig: &[u8], pubkey: &[u8], sighash: &Hash) -> bool {
        pubkey::verify_signature(sig, pubkey, sighash)
    }
}

/// Checker bound to one input of a transaction
#[derive(Debug, Clone, Copy)]
pub struct TransactionSignatureChecker<'a> {
    context: ScriptExecutionContext<'a>,
    precomputed: Option<&'a PrecomputedTransactionData>,
}

impl<'a> TransactionSignatureChecker<'a> {
    pub fn new(context: ScriptExecutionContext<'a>, precomputed: &'a PrecomputedTransactionData) -> Self {
        TransactionSignatureChecker { context, precomputed: Some(precomputed) }
    }

    /// Checker that hashes the transaction components on every signature
    pub fn without_precomputed(context: ScriptExecutionContext<'a>) -> Self {
        TransactionSignatureChecker { context, precomputed: None }
    }
}

impl SignatureChecker for TransactionSignatureChecker<'_> {
    fn verify_signature(&self, sig: &[u8], pubkey: &[u8], sighash: &Hash) -> bool {
        pubkey::verify_signature(sig, pubkey, sighash)
    }

    /// `None` for an empty signature, or for SIGHASH_UTXOS in a limited
    /// context which lacks the sibling coins it commits to
    fn signature_digest(&self, sig: &[u8], script_code: &[u8], flags: ScriptFlags) -> Option<Hash> {
        if sig.is_empty() {
            return None;
        }
        let hash_type = get_hash_type(sig);
        if hash_type.has_utxos() && flags.contains(ScriptFlags::ENABLE_TOKENS) && self.context.is_limited() {
            return None;
        }
        Some(signature_hash(script_code, &self.context, hash_type, flags, self.precomputed))
    }

    /// BIP65: same lock time kind, not beyond the transaction's, input not
    /// final
    fn check_lock_time(&self, lock_time: i64) -> bool {
        let tx = self.context.tx();
        let tx_lock_time = i64::from(tx.lock_time);
        let threshold = i64::from(LOCKTIME_THRESHOLD);

        // There are two kinds of lock time: block heights and timestamps.
        // Comparing across kinds is meaningless.
        if !((tx_lock_time < threshold && lock_time < threshold)
            || (tx_lock_time >= threshold && lock_time >= threshold))
        {
            return false;
        }
        if lock_time > tx_lock_time {
            return false;
        }

        // A final input would let the transaction bypass its lock time.
        tx.inputs[self.context.input_index()].sequence != SEQUENCE_FINAL
    }

    /// BIP112: relative lock time of the same kind and no greater than the
    /// input's sequence
    fn check_sequence(&self, sequence: i64) -> bool {
        let tx = self.context.tx();
        let tx_sequence = i64::from(tx.inputs[self.context.input_index()].sequence);

        // Relative lock times are only enforced from version 2.
        if (tx.version as u32) < 2 {
            return false;
        }
        if tx_sequence & i64::from(SEQUENCE_LOCKTIME_DISABLE_FLAG) != 0 {
            return false;
        }

        let mask = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG | SEQUENCE_LOCKTIME_MASK);
        let type_flag = i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG);
        let tx_masked = tx_sequence & mask;
        let masked = sequence & mask;

        if !((tx_masked < type_flag && masked < type_flag) || (tx_masked >= type_flag && masked >= type_flag)) {
            return false;
        }
        masked <= tx_masked
    }

    fn context(&self) -> Option<&ScriptExecutionContext<'_>> {
        Some(&self.context)
    }
}

/// Checker memoizing successful verifications of an inner checker.
///
/// With `store` set, fresh successes are inserted; without it, hits are
/// flagged so the slot can be reused (a block is unlikely to revisit them).
pub struct CachingTransactionSignatureChecker<'a, C = TransactionSignatureChecker<'a>> {
    inner: C,
    cache: &'a SignatureCache,
    store: bool,
}

impl<'a, C: SignatureChecker> CachingTransactionSignatureChecker<'a, C> {
    pub fn new(inner: C, cache: &'a SignatureCache, store: bool) -> Self {
        CachingTransactionSignatureChecker { inner, cache, store }
    }

    /// Is the triple already known to be valid?
    pub fn is_cached(&self, sig: &[u8], pubkey: &[u8], sighash: &Hash) -> bool {
        let entry = self.cache.compute_entry(sighash, pubkey, sig);
        self.cache.get(&entry, false)
    }
}

impl<C: SignatureChecker> SignatureChecker for CachingTransactionSignatureChecker<'_, C> {
    fn verify_signature(&self, sig: &[u8], pubkey: &[u8], sighash: &Hash) -> bool {
        let entry = self.cache.compute_entry(sighash, pubkey, sig);
        if self.cache.get(&entry, !self.store) {
            return true;
        }
        if !self.inner.verify_signature(sig, pubkey, sighash) {
            return false;
        }
        if self.store {
            self.cache.insert(entry);
        }
        true
    }

    fn signature_digest(&self, sig: &[u8], script_code: &[u8], flags: ScriptFlags) -> Option<Hash> {
        self.inner.signature_digest(sig, script_code, flags)
    }

    fn check_lock_time(&self, lock_time: i64) -> bool {
        self.inner.check_lock_time(lock_time)
    }

    fn check_sequence(&self, sequence: i64) -> bool {
        self.inner.check_sequence(sequence)
    }

    fn context(&self) -> Option<&ScriptExecutionContext<'_>> {
        self.inner.context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::context::SpentOutputs;
    use crate::types::*;

    fn tx_with(version: i32, lock_time: u32, sequence: u32) -> Transaction {
        Transaction {
            version,
            inputs: vec![TransactionInput { prevout: OutPoint::new([1; 32], 0), script_sig: vec![], sequence }],
            outputs: vec![TransactionOutput::new(Amount::from_sat(1), vec![])],
            lock_time,
        }
    }

    fn spent() -> SpentOutputs {
        SpentOutputs::new(vec![TransactionOutput::new(Amount::from_sat(10), vec![0x51])])
    }

    #[test]
    fn test_base_checker_defaults() {
        let checker = BaseSignatureChecker;
        assert!(!checker.check_sig(&[0x30, 0x01], &[0x02; 33], &[], ScriptFlags::NONE));
        assert!(!checker.check_lock_time(0));
        assert!(!checker.check_sequence(0));
        assert!(checker.context().is_none());
    }

    #[test]
    fn test_check_lock_time() {
        let spent = spent();
        let tx = tx_with(1, 500, 0);
        let context = ScriptExecutionContext::new(&tx, 0, &spent).unwrap();
        let checker = TransactionSignatureChecker::without_precomputed(context);
        assert!(checker.check_lock_time(499));
        assert!(checker.check_lock_time(500));
        assert!(!checker.check_lock_time(501));
        assert!(!checker.check_lock_time(500_000_000));

        let final_tx = tx_with(1, 500, SEQUENCE_FINAL);
        let context = ScriptExecutionContext::new(&final_tx, 0, &spent).unwrap();
        assert!(!TransactionSignatureChecker::without_precomputed(context).check_lock_time(100));
    }

    #[test]
    fn test_check_sequence() {
        let spent = spent();
        let tx = tx_with(2, 0, 10);
        let context = ScriptExecutionContext::new(&tx, 0, &spent).unwrap();
        let checker = TransactionSignatureChecker::without_precomputed(context);
        assert!(checker.check_sequence(10));
        assert!(checker.check_sequence(9));
        assert!(!checker.check_sequence(11));
        assert!(!checker.check_sequence(i64::from(SEQUENCE_LOCKTIME_TYPE_FLAG) | 1));

        let v1 = tx_with(1, 0, 10);
        let context = ScriptExecutionContext::new(&v1, 0, &spent).unwrap();
        assert!(!TransactionSignatureChecker::without_precomputed(context).check_sequence(1));

        let disabled = tx_with(2, 0, SEQUENCE_LOCKTIME_DISABLE_FLAG | 10);
        let context = ScriptExecutionContext::new(&disabled, 0, &spent).unwrap();
        assert!(!TransactionSignatureChecker::without_precomputed(context).check_sequence(1));
    }

    #[test]
    fn test_check_sig_empty_signature() {
        let spent = spent();
        let tx = tx_with(2, 0, 0);
        let context = ScriptExecutionContext::new(&tx, 0, &spent).unwrap();
        let checker = TransactionSignatureChecker::without_precomputed(context);
        assert!(!checker.check_sig(&[], &[0x02; 33], &[0xac], ScriptFlags::STANDARD));
        assert_eq!(checker.context().map(|c| c.input_index()), Some(0));
    }

    struct CountingChecker {
        calls: std::cell::Cell<usize>,
        result: bool,
    }

    impl SignatureChecker for CountingChecker {
        fn verify_signature(&self, _sig: &[u8], _pubkey: &[u8], _sighash: &Hash) -> bool {
            self.calls.set(self.calls.get() + 1);
            self.result
        }
    }

    #[test]
    fn test_caching_checker_verifies_once() {
        let cache = SignatureCache::new(1);
        let inner = CountingChecker { calls: std::cell::Cell::new(0), result: true };
        let checker = CachingTransactionSignatureChecker::new(inner, &cache, true);
        assert!(!checker.is_cached(&[1], &[2], &[3; 32]));
        assert!(checker.verify_signature(&[1], &[2], &[3; 32]));
        assert!(checker.verify_signature(&[1], &[2], &[3; 32]));
        assert_eq!(checker.inner.calls.get(), 1);
        assert!(checker.is_cached(&[1], &[2], &[3; 32]));
    }

    #[test]
    fn test_caching_checker_never_caches_failures() {
        let cache = SignatureCache::new(1);
        let inner = CountingChecker { calls: std::cell::Cell::new(0), result: false };
        let checker = CachingTransactionSignatureChecker::new(inner, &cache, true);
        assert!(!checker.verify_signature(&[1], &[2], &[3; 32]));
        assert!(!checker.verify_signature(&[1], &[2], &[3; 32]));
        assert_eq!(checker.inner.calls.get(), 2);
    }

    #[test]
    fn test_caching_checker_without_store() {
        let cache = SignatureCache::new(1);
        let inner = CountingChecker { calls: std::cell::Cell::new(0), result: true };
        let checker = CachingTransactionSignatureChecker::new(inner, &cache, false);
        assert!(checker.verify_signature(&[1], &[2], &[3; 32]));
        assert!(checker.verify_signature(&[1], &[2], &[3; 32]));
        assert_eq!(checker.inner.calls.get(), 2);
    }
}

//! Script verification flags

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

/// Set of script verification rules in effect for one evaluation
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptFlags(u32);

impl ScriptFlags {
    pub const NONE: ScriptFlags = ScriptFlags(0);

    /// Evaluate P2SH subscripts
    pub const P2SH: ScriptFlags = ScriptFlags(1 << 0);
    /// Strict signature, pubkey and hashtype encoding
    pub const STRICTENC: ScriptFlags = ScriptFlags(1 << 1);
    /// Strict DER signature encoding (BIP66)
    pub const DERSIG: ScriptFlags = ScriptFlags(1 << 2);
    /// Low S values in ECDSA signatures
    pub const LOW_S: ScriptFlags = ScriptFlags(1 << 3);
    /// Only push operators in scriptSig
    pub const SIGPUSHONLY: ScriptFlags = ScriptFlags(1 << 5);
    /// Minimal push and number encodings
    pub const MINIMALDATA: ScriptFlags = ScriptFlags(1 << 6);
    /// Reject NOP1, NOP4..NOP10
    pub const DISCOURAGE_UPGRADABLE_NOPS: ScriptFlags = ScriptFlags(1 << 7);
    /// Exactly one stack element after evaluation
    pub const CLEANSTACK: ScriptFlags = ScriptFlags(1 << 8);
    /// OP_CHECKLOCKTIMEVERIFY (BIP65)
    pub const CHECKLOCKTIMEVERIFY: ScriptFlags = ScriptFlags(1 << 9);
    /// OP_CHECKSEQUENCEVERIFY (BIP112)
    pub const CHECKSEQUENCEVERIFY: ScriptFlags = ScriptFlags(1 << 10);
    /// OP_IF/OP_NOTIF argument must be empty or 0x01
    pub const MINIMALIF: ScriptFlags = ScriptFlags(1 << 13);
    /// Failed signature checks require empty signatures
    pub const NULLFAIL: ScriptFlags = ScriptFlags(1 << 14);
    /// Replay-protected signature hashing
    pub const ENABLE_SIGHASH_FORKID: ScriptFlags = ScriptFlags(1 << 16);
    /// No exemption for spends of P2SH-wrapped segwit programs
    pub const DISALLOW_SEGWIT_RECOVERY: ScriptFlags = ScriptFlags(1 << 20);
    /// Bitfield (Schnorr) mode for OP_CHECKMULTISIG
    pub const ENABLE_SCHNORR_MULTISIG: ScriptFlags = ScriptFlags(1 << 21);
    /// Limit sigchecks per input by scriptSig length
    pub const INPUT_SIGCHECKS: ScriptFlags = ScriptFlags(1 << 22);
    /// Enforce block and transaction sigchecks limits
    pub const ENFORCE_SIGCHECKS: ScriptFlags = ScriptFlags(1 << 23);
    /// 64-bit script integers and OP_MUL
    pub const INTEGERS_64_BIT: ScriptFlags = ScriptFlags(1 << 24);
    /// Native introspection opcodes
    pub const NATIVE_INTROSPECTION: ScriptFlags = ScriptFlags(1 << 25);
    /// 32-byte pay-to-script-hash
    pub const ENABLE_P2SH_32: ScriptFlags = ScriptFlags(1 << 26);
    /// CashTokens: token opcodes and SIGHASH_UTXOS
    pub const ENABLE_TOKENS: ScriptFlags = ScriptFlags(1 << 27);

    /// Every defined flag
    pub const ALL: ScriptFlags = ScriptFlags(
        (1 << 0)
            | (1 << 1)
            | (1 << 2)
            | (1 << 3)
            | (1 << 5)
            | (1 << 6)
            | (1 << 7)
            | (1 << 8)
            | (1 << 9)
            | (1 << 10)
            | (1 << 13)
            | (1 << 14)
            | (1 << 16)
            | (1 << 20)
            | (1 << 21)
            | (1 << 22)
            | (1 << 23)
            | (1 << 24)
            | (1 << 25)
            | (1 << 26)
            | (1 << 27),
    );

    /// Rules every block must satisfy
    pub const MANDATORY: ScriptFlags = ScriptFlags(
        Self::P2SH.0 | Self::STRICTENC.0 | Self::ENABLE_SIGHASH_FORKID.0 | Self::LOW_S.0 | Self::NULLFAIL.0,
    );

    /// Rules applied to transactions accepted for relay
    pub const STANDARD: ScriptFlags = ScriptFlags(
        Self::MANDATORY.0
            | Self::DERSIG.0
            | Self::SIGPUSHONLY.0
            | Self::MINIMALDATA.0
            | Self::DISCOURAGE_UPGRADABLE_NOPS.0
            | Self::CLEANSTACK.0
            | Self::CHECKLOCKTIMEVERIFY.0
            | Self::CHECKSEQUENCEVERIFY.0
            | Self::MINIMALIF.0
            | Self::DISALLOW_SEGWIT_RECOVERY.0
            | Self::ENABLE_SCHNORR_MULTISIG.0
            | Self::INPUT_SIGCHECKS.0
            | Self::INTEGERS_64_BIT.0
            | Self::NATIVE_INTROSPECTION.0
            | Self::ENABLE_P2SH_32.0
            | Self::ENABLE_TOKENS.0,
    );

    pub const fn from_bits_retain(bits: u32) -> Self {
        ScriptFlags(bits)
    }

    /// Accept only defined flag bits
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL.0 != 0 {
            return None;
        }
        Some(ScriptFlags(bits))
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: ScriptFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: ScriptFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: ScriptFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ScriptFlags) {
        self.0 &= !other.0;
    }

    pub fn without(self, other: ScriptFlags) -> Self {
        ScriptFlags(self.0 & !other.0)
    }
}

impl BitOr for ScriptFlags {
    type Output = ScriptFlags;
    fn bitor(self, rhs: ScriptFlags) -> ScriptFlags {
        ScriptFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ScriptFlags {
    fn bitor_assign(&mut self, rhs: ScriptFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ScriptFlags {
    type Output = ScriptFlags;
    fn bitand(self, rhs: ScriptFlags) -> ScriptFlags {
        ScriptFlags(self.0 & rhs.0)
    }
}

impl Not for ScriptFlags {
    type Output = ScriptFlags;
    fn not(self) -> ScriptFlags {
        ScriptFlags(!self.0)
    }
}

impl fmt::Debug for ScriptFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptFlags({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bits() {
        assert_eq!(ScriptFlags::P2SH.bits(), 1);
        assert_eq!(ScriptFlags::ENABLE_SIGHASH_FORKID.bits(), 0x10000);
        assert_eq!(ScriptFlags::ENABLE_TOKENS.bits(), 1 << 27);
    }

    #[test]
    fn test_from_bits_rejects_undefined() {
        assert!(ScriptFlags::from_bits(1 << 4).is_none());
        assert!(ScriptFlags::from_bits(1 << 11).is_none());
        assert_eq!(ScriptFlags::from_bits(0x3), Some(ScriptFlags::P2SH | ScriptFlags::STRICTENC));
    }

    #[test]
    fn test_presets_nest() {
        assert!(ScriptFlags::STANDARD.contains(ScriptFlags::MANDATORY));
        assert!(ScriptFlags::ALL.contains(ScriptFlags::STANDARD));
        assert!(!ScriptFlags::MANDATORY.contains(ScriptFlags::CLEANSTACK));
    }

    #[test]
    fn test_set_operations() {
        let mut flags = ScriptFlags::P2SH;
        flags.insert(ScriptFlags::DERSIG);
        assert!(flags.contains(ScriptFlags::DERSIG));
        assert!(flags.intersects(ScriptFlags::DERSIG | ScriptFlags::LOW_S));
        flags.remove(ScriptFlags::P2SH);
        assert_eq!(flags, ScriptFlags::DERSIG);
        assert_eq!((flags | ScriptFlags::LOW_S).without(ScriptFlags::DERSIG), ScriptFlags::LOW_S);
    }
}

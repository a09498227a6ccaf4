//! Script execution failures

use thiserror::Error;

/// Every way a script can fail to verify.
///
/// The discriminants are stable and follow the historical ordering so that
/// the numeric code of an error can be reported across an FFI boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ScriptError {
    #[error("No error")]
    Ok = 0,
    #[error("unknown error")]
    Unknown,
    #[error("Script evaluated without error but finished with a false/empty top stack element")]
    EvalFalse,
    #[error("OP_RETURN was encountered")]
    OpReturn,

    // Max sizes
    #[error("Script is too big")]
    ScriptSize,
    #[error("Push value size limit exceeded")]
    PushSize,
    #[error("Operation limit exceeded")]
    OpCount,
    #[error("Stack size limit exceeded")]
    StackSize,
    #[error("Signature count negative or greater than pubkey count")]
    SigCount,
    #[error("Pubkey count negative or limit exceeded")]
    PubkeyCount,
    #[error("Input SigChecks limit exceeded")]
    InputSigChecks,

    // Operands checks
    #[error("Invalid operand size")]
    InvalidOperandSize,
    #[error("Given operand is not a number within the valid range [-2^31 + 1, 2^31 - 1]")]
    InvalidNumberRange,
    #[error("The requested encoding is impossible to satisfy")]
    ImpossibleEncoding,
    #[error("Invalid OP_SPLIT range")]
    InvalidSplitRange,
    #[error("Invalid number of bit set in OP_CHECKMULTISIG")]
    InvalidBitCount,

    // Failed verify operations
    #[error("Script failed an OP_VERIFY operation")]
    Verify,
    #[error("Script failed an OP_EQUALVERIFY operation")]
    EqualVerify,
    #[error("Script failed an OP_CHECKMULTISIGVERIFY operation")]
    CheckMultisigVerify,
    #[error("Script failed an OP_CHECKSIGVERIFY operation")]
    CheckSigVerify,
    #[error("Script failed an OP_CHECKDATASIGVERIFY operation")]
    CheckDataSigVerify,
    #[error("Script failed an OP_NUMEQUALVERIFY operation")]
    NumEqualVerify,

    // Logical/Format/Canonical errors
    #[error("Opcode missing or not understood")]
    BadOpcode,
    #[error("Attempted to use a disabled opcode")]
    DisabledOpcode,
    #[error("Operation not valid with the current stack size")]
    InvalidStackOperation,
    #[error("Operation not valid with the current altstack size")]
    InvalidAltstackOperation,
    #[error("Invalid OP_IF construction")]
    UnbalancedConditional,

    // Divisor errors
    #[error("Division by zero error")]
    DivByZero,
    #[error("Modulo by zero error")]
    ModByZero,

    // Bitfield errors
    #[error("Bitfield of unexpected size error")]
    InvalidBitfieldSize,
    #[error("Bitfield's bit out of the expected range")]
    InvalidBitRange,

    // CHECKLOCKTIMEVERIFY and CHECKSEQUENCEVERIFY
    #[error("Negative locktime")]
    NegativeLocktime,
    #[error("Locktime requirement not satisfied")]
    UnsatisfiedLocktime,

    // Malleability
    #[error("Signature hash type missing or not understood")]
    SigHashType,
    #[error("Non-canonical DER signature")]
    SigDer,
    #[error("Data push larger than necessary")]
    MinimalData,
    #[error("Only push operators allowed in signatures")]
    SigPushOnly,
    #[error("Non-canonical signature: S value is unnecessarily high")]
    SigHighS,
    #[error("Public key is neither compressed or uncompressed")]
    PubkeyType,
    #[error("Script did not clean its stack")]
    CleanStack,
    #[error("OP_IF/NOTIF argument must be minimal")]
    MinimalIf,
    #[error("Signature must be zero for failed CHECK(MULTI)SIG operation")]
    SigNullFail,
    #[error("Numbers on the stack must be minimally encoded")]
    MinimalNum,

    // Schnorr
    #[error("Signature has an invalid length")]
    SigBadLength,
    #[error("Only Schnorr signatures allowed in this operation")]
    SigNonSchnorr,

    // Softfork safeness
    #[error("NOPx reserved for soft-fork upgrades")]
    DiscourageUpgradableNops,

    // Anti replay
    #[error("Illegal use of SIGHASH_FORKID")]
    IllegalForkId,
    #[error("Signature must use SIGHASH_FORKID")]
    MustUseForkId,

    // Auxiliary, not produced by the interpreter
    #[error("Validation resources exceeded (SigChecks)")]
    SigChecksLimitExceeded,

    // Operands checks with 64-bit integers
    #[error("Given operand is not a number within the valid range [-2^63 + 1, 2^63 - 1]")]
    InvalidNumberRange64Bit,

    // Native introspection
    #[error("Introspection opcode used without a script execution context")]
    ContextNotPresent,
    #[error("Introspection of sibling inputs is not available in this context")]
    LimitedContextNoSiblingInfo,
    #[error("Transaction input index out of range")]
    InvalidTxInputIndex,
    #[error("Transaction output index out of range")]
    InvalidTxOutputIndex,
}

/// Number of distinct script errors
pub const SCRIPT_ERROR_COUNT: u32 = ScriptError::InvalidTxOutputIndex as u32 + 1;

impl ScriptError {
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Collapse a verification result into a single error value
    pub fn from_result(result: &Result<(), ScriptError>) -> ScriptError {
        match result {
            Ok(()) => ScriptError::Ok,
            Err(e) => *e,
        }
    }
}

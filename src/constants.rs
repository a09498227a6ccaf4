//! Consensus constants for script evaluation and the block index

/// Maximum script length in bytes
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Maximum size of a single pushed stack element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum number of non-push operations per script
pub const MAX_OPS_PER_SCRIPT: usize = 201;

/// Maximum combined size of the main and alt stacks
pub const MAX_STACK_SIZE: usize = 1000;

/// Maximum number of public keys per multisig
pub const MAX_PUBKEYS_PER_MULTISIG: usize = 20;

/// Default operand size for script numbers
pub const MAX_SCRIPTNUM_SIZE_32: usize = 4;

/// Operand size for script numbers once 64-bit integers are active
pub const MAX_SCRIPTNUM_SIZE_64: usize = 8;

/// Operand size accepted by OP_CHECKLOCKTIMEVERIFY and OP_CHECKSEQUENCEVERIFY
pub const LOCKTIME_SCRIPTNUM_SIZE: usize = 5;

/// Lock time threshold: lock times below this are block heights
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number marking an input final
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Sequence bit disabling relative lock time
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;

/// Sequence bit selecting time-based relative lock time
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;

/// Sequence bits holding the relative lock time value
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;

/// Scriptsig bytes required per signature check beyond the allowance
pub const SIGCHECKS_DENSITY_FACTOR: usize = 43;

/// Scriptsig byte allowance for the sigchecks density rule
pub const SIGCHECKS_DENSITY_BONUS: usize = 60;

/// Upper bound on any compact-size length prefix
pub const MAX_SERIALIZED_SIZE: u64 = 0x0200_0000;

/// Default signature cache size in MiB
pub const DEFAULT_MAX_SIG_CACHE_SIZE: usize = 32;

/// Largest accepted signature cache size in MiB
pub const MAX_MAX_SIG_CACHE_SIZE: usize = 16384;

/// Number of dense (step 1) entries at the head of a block locator
pub const LOCATOR_DENSE_ENTRIES: usize = 10;

/// Number of blocks used for the median time past
pub const MEDIAN_TIME_SPAN: usize = 11;

//! Error types for consensus validation

use thiserror::Error;

use crate::script_error::ScriptError;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Script execution failed: {0}")]
    ScriptExecution(#[from] ScriptError),

    #[error("Input {input} script verification failed: {error}")]
    InputScript { input: usize, error: ScriptError },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid base58 string: {0}")]
    InvalidBase58(String),

    #[error("Missing previous output: {0}")]
    MissingPrevout(String),

    #[error("Unknown parent block: {0}")]
    UnknownParent(String),

    #[error("Unknown block: {0}")]
    UnknownBlock(String),

    #[error("Duplicate block header: {0}")]
    DuplicateHeader(String),

    #[error("Invalid proof of work: {0}")]
    InvalidProofOfWork(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

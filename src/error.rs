//! Error types for mxsim

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Unsupported tensor rank {0} (expected 2 or 4)")]
    UnsupportedRank(usize),

    #[error("Group size {group_size} does not divide feature width {features}")]
    MisalignedGroups { features: usize, group_size: usize },

    #[error("{groups} scale groups cannot be laid out over {heads} attention heads")]
    HeadGroupMismatch { heads: usize, groups: usize },

    #[error("A scale was set to 0 (broken zero-fallback invariant)")]
    DegenerateScale,

    #[error("Unknown quantizer: {0}")]
    UnknownQuantizer(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, Error>;

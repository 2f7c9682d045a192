//! Error types for barrel operations

use thiserror::Error;

/// Main error type for barrel operations
#[derive(Error, Debug)]
pub enum BarrelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid cube length: {0}")]
    InvalidCubeLength(u64),

    #[error("Misaligned offset: {0}")]
    MisalignedOffset(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Truncated header: expected {expected} bytes, got {actual}")]
    TruncatedHeader { expected: usize, actual: usize },

    #[error("Invalid magic bytes")]
    InvalidMagic,

    #[error("Unsupported barrel version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid data type code: {0}")]
    InvalidDataType(u8),

    #[error("Invalid block type code: {0}")]
    InvalidBlockType(u8),

    #[error("Data type mismatch: file holds {file}, requested {requested}")]
    DataTypeMismatch { file: String, requested: String },

    #[error("Block type mismatch: {0}")]
    BlockTypeMismatch(String),

    #[error("Buffer too small: need {needed} elements, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("Corrupt jump table: {0}")]
    CorruptJumpTable(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BarrelError {
    /// Integer status reported through [`crate::status::read_raw_data`].
    ///
    /// Zero is reserved for success, so every error maps to a negative code.
    pub fn status(&self) -> i32 {
        match self {
            BarrelError::InvalidCubeLength(_) => -1,
            BarrelError::MisalignedOffset(_) | BarrelError::OutOfBounds(_) => -2,
            BarrelError::NotFound(_) => -3,
            BarrelError::TruncatedHeader { .. } => -4,
            BarrelError::InvalidMagic
            | BarrelError::UnsupportedVersion(_)
            | BarrelError::InvalidDataType(_)
            | BarrelError::InvalidBlockType(_) => -5,
            BarrelError::DataTypeMismatch { .. } => -6,
            BarrelError::BlockTypeMismatch(_) => -7,
            BarrelError::BufferTooSmall { .. } => -8,
            BarrelError::CorruptJumpTable(_) | BarrelError::Decompression(_) => -9,
            BarrelError::Compression(_) => -10,
            BarrelError::AlreadyExists(_) => -11,
            BarrelError::Io(_) => -12,
            BarrelError::InvalidDimensions(_)
            | BarrelError::Metadata(_)
            | BarrelError::Serialization(_)
            | BarrelError::InvalidUrl(_)
            | BarrelError::Configuration(_) => -13,
        }
    }
}

/// Specialized Result type for barrel operations
pub type Result<T> = std::result::Result<T, BarrelError>;

impl From<bincode::Error> for BarrelError {
    fn from(err: bincode::Error) -> Self {
        BarrelError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for BarrelError {
    fn from(err: serde_json::Error) -> Self {
        BarrelError::Serialization(err.to_string())
    }
}

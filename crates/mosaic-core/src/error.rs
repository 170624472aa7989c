//! Error types for the quantization stage.
//!
//! The taxonomy splits into two classes:
//!
//! - **Startup (fatal)**: the vocabulary or the persisted index cannot be
//!   loaded, or they disagree with each other or with the configuration.
//!   The process must not serve requests; a short or shifted vocabulary
//!   silently corrupts every word identifier written downstream.
//! - **Per-request (recoverable)**: decode failures, size-policy violations,
//!   persistence failures. Isolated to the one image request and mapped to a
//!   [`ResponseCode`](crate::response::ResponseCode); the process keeps
//!   serving.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors produced by the quantization stage.
#[derive(Debug, Error)]
pub enum Error {
    /// The vocabulary file could not be opened.
    #[error("vocabulary file {path:?} could not be opened: {source}")]
    VocabularyUnreadable {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The vocabulary row count differs from the configured size.
    #[error("vocabulary holds {actual} words, expected {expected}")]
    VocabularySizeMismatch {
        /// Configured vocabulary size.
        expected: usize,
        /// Number of words actually read.
        actual: usize,
    },

    /// The persisted nearest-neighbor index could not be loaded.
    #[error("nearest-neighbor index at {path:?} could not be loaded: {detail}")]
    IndexUnreadable {
        /// Index directory that failed to load.
        path: PathBuf,
        /// Loader failure detail.
        detail: String,
    },

    /// The persisted index does not structurally match the vocabulary.
    #[error(
        "nearest-neighbor index is incompatible with the vocabulary: \
         index has {index} entries of dimension {dimension}, \
         vocabulary has {vocabulary} words"
    )]
    IndexIncompatible {
        /// Entry count recorded in the persisted index.
        index: usize,
        /// Descriptor dimension recorded in the persisted index.
        dimension: usize,
        /// Word count of the loaded vocabulary.
        vocabulary: usize,
    },

    /// The image byte buffer could not be decoded into a pixel grid.
    #[error("image could not be decoded: {0}")]
    ImageNotDecoded(String),

    /// A decoded image exceeds the configured upper size bound.
    #[error("image is {width}x{height}, larger than the {limit} pixel bound")]
    ImageTooLarge {
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Configured upper bound.
        limit: u32,
    },

    /// A decoded image falls below the configured lower size bound.
    #[error("image is {width}x{height}, smaller than the {limit} pixel bound")]
    ImageTooSmall {
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
        /// Configured lower bound.
        limit: u32,
    },

    /// The feature detector failed on a decoded image.
    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),

    /// A descriptor does not live in the vocabulary's vector space.
    #[error("descriptor has {actual} dimensions, the vocabulary uses {expected}")]
    DescriptorDimension {
        /// Dimension of the vocabulary's vector space.
        expected: usize,
        /// Dimension of the offending descriptor.
        actual: usize,
    },

    /// The per-image hit file could not be created.
    #[error("hit file {path:?} could not be created: {source}")]
    FileUnwritable {
        /// Destination path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A write to an open hit file failed.
    #[error("write to hit file {path:?} failed: {source}")]
    Persistence {
        /// Path of the hit file being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A hit file's size is not a whole number of records.
    #[error("hit file {path:?} is {len} bytes, not a whole number of 12-byte records")]
    TruncatedHitFile {
        /// Path of the offending file.
        path: PathBuf,
        /// Observed file length in bytes.
        len: u64,
    },

    /// The configuration is semantically invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration sources could not be read or merged.
    #[error(transparent)]
    Config(#[from] figment::Error),

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for startup errors after which the process must not
    /// serve requests.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::VocabularyUnreadable { .. }
                | Self::VocabularySizeMismatch { .. }
                | Self::IndexUnreadable { .. }
                | Self::IndexIncompatible { .. }
                | Self::InvalidConfig(_)
                | Self::Config(_)
        )
    }
}

use std::net::AddrParseError;
use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced while reading or validating configuration.
pub enum ConfigError {
    /// A port value could not be parsed.
    #[error("invalid port value '{value}': {source}")]
    PortParseError {
        /// Raw environment value.
        value: String,
        /// Parse error.
        source: ParseIntError,
    },

    /// Port zero is not bindable.
    #[error("port must be non-zero, got '{value}'")]
    InvalidPort {
        /// Raw environment value.
        value: String,
    },

    /// A bind address could not be parsed.
    #[error("invalid bind address '{value}': {source}")]
    InvalidBindAddr {
        /// Raw environment value.
        value: String,
        /// Parse error.
        source: AddrParseError,
    },

    /// An integer-valued variable could not be parsed.
    #[error("invalid integer for {var}: '{value}': {source}")]
    InvalidInteger {
        /// Environment variable name.
        var: &'static str,
        /// Raw environment value.
        value: String,
        /// Parse error.
        source: ParseIntError,
    },

    /// A float-valued variable could not be parsed.
    #[error("invalid number for {var}: '{value}': {source}")]
    InvalidFloat {
        /// Environment variable name.
        var: &'static str,
        /// Raw environment value.
        value: String,
        /// Parse error.
        source: ParseFloatError,
    },

    /// A threshold fell outside `[0, 1]`.
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange {
        /// Threshold name.
        name: &'static str,
        /// Offending value.
        value: f32,
    },

    /// Chunk overlap must leave room for fresh content.
    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge {
        /// Configured overlap.
        overlap: usize,
        /// Configured chunk size.
        size: usize,
    },

    /// Context cut cannot exceed the retrieval fan-out.
    #[error("k_context ({k_context}) must not exceed k_retrieve ({k_retrieve})")]
    ContextExceedsRetrieve {
        /// Configured k_context.
        k_context: usize,
        /// Configured k_retrieve.
        k_retrieve: usize,
    },

    /// A required value was zero.
    #[error("{name} must be non-zero")]
    MustBeNonZero {
        /// Field name.
        name: &'static str,
    },
}

//! Error types for the classification pipeline.
//!
//! This module provides the crate-wide error enum, helper constructors for building
//! well-structured errors with context and error chaining, and the `AcneResult` alias.
//!
//! # Usage
//!
//! ```rust
//! use acne_classifier::core::errors::{AcneError, ProcessingStage};
//!
//! // Wrap a decoder failure
//! let error = AcneError::decode(
//!     "upload.jpg",
//!     std::io::Error::new(std::io::ErrorKind::InvalidData, "truncated JPEG"),
//! );
//! assert!(error.to_string().contains("upload.jpg"));
//!
//! // Training-time failure without an underlying cause
//! let error = AcneError::training_error("embedding dimension 12 does not match head input 1280");
//! assert!(matches!(error, AcneError::Training { .. }));
//! ```

pub mod constructors;
pub mod types;

pub use types::{AcneError, ProcessingStage, SimpleError};

/// Convenient result alias for classification operations.
pub type AcneResult<T> = Result<T, AcneError>;

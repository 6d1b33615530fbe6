//! Error types for rust-jwks

use std::fmt;
use thiserror::Error;

/// Custom `Result` type
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Algorithm id unknown or inconsistent with the requested key type
    UnsupportedAlgorithm,
    /// Elliptic curve not supported
    UnsupportedCurve,
    /// Requested parameters are below the minimum strength policy
    WeakKeyRequested,
    /// Stored private parameters could not be reassembled
    KeyReconstructionFailure,
    /// Store has no current key
    NoCurrentKey,
    /// Cryptographic operation failed
    CryptoFailure,
    /// Storage backend error
    StorageFailure,
    /// Insufficient entropy
    InsufficientEntropy,
    /// Serialization/deserialization failed
    SerializationFailure,
    /// I/O error
    IoFailure,
    /// Configuration error
    ConfigurationError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedAlgorithm => write!(f, "UNSUPPORTED_ALGORITHM"),
            Self::UnsupportedCurve => write!(f, "UNSUPPORTED_CURVE"),
            Self::WeakKeyRequested => write!(f, "WEAK_KEY_REQUESTED"),
            Self::KeyReconstructionFailure => write!(f, "KEY_RECONSTRUCTION_FAILURE"),
            Self::NoCurrentKey => write!(f, "NO_CURRENT_KEY"),
            Self::CryptoFailure => write!(f, "CRYPTO_FAILURE"),
            Self::StorageFailure => write!(f, "STORAGE_FAILURE"),
            Self::InsufficientEntropy => write!(f, "INSUFFICIENT_ENTROPY"),
            Self::SerializationFailure => write!(f, "SERIALIZATION_FAILURE"),
            Self::IoFailure => write!(f, "IO_FAILURE"),
            Self::ConfigurationError => write!(f, "CONFIGURATION_ERROR"),
        }
    }
}

/// `rust-jwks` error type with operation context
#[derive(Debug, Error)]
pub enum Error {
    /// Algorithm id is unknown, or does not belong to the requested key type
    #[error("unsupported algorithm: {algorithm} ({reason})")]
    UnsupportedAlgorithm {
        /// The algorithm identifier as requested
        algorithm: String,
        /// Why it was rejected
        reason: String,
    },

    /// Curve name is not one of the supported named curves
    #[error("unsupported curve: {curve}")]
    UnsupportedCurve {
        /// The curve name as requested
        curve: String,
    },

    /// Requested key parameters violate the minimum strength policy
    #[error("weak key requested: {requested} bits (minimum {minimum})")]
    WeakKeyRequested {
        /// Requested size in bits
        requested: usize,
        /// Minimum accepted size in bits
        minimum: usize,
    },

    /// A stored record could not be turned back into a usable private key
    #[error("cannot reconstruct key {key_id}: {reason}")]
    KeyReconstructionFailure {
        /// The ID of the record that failed
        key_id: String,
        /// Which parameter was missing or inconsistent
        reason: String,
    },

    /// The store holds no current key for the requested use
    #[error("no current {key_use} key in store")]
    NoCurrentKey {
        /// Key use slot that was queried
        key_use: String,
    },

    /// Cryptographic operation failed
    #[error("cryptographic error during {operation}: {message}")]
    CryptoError {
        /// The operation that was being performed when the error occurred
        operation: String,
        /// Detailed error message
        message: String,
        /// Optional key ID involved in the operation
        key_id: Option<String>,
    },

    /// Storage backend failed
    #[error("storage error during {operation}: {message}")]
    StorageError {
        /// The operation that was being performed when the error occurred
        operation: String,
        /// Detailed error message
        message: String,
        /// Optional filesystem path involved in the operation
        path: Option<String>,
    },

    /// Insufficient entropy available
    #[error("insufficient entropy for operation: {operation}")]
    InsufficientEntropy {
        /// The operation that required entropy
        operation: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error during {operation}: {message}")]
    SerializationError {
        /// The serialization operation that failed
        operation: String,
        /// Detailed error message
        message: String,
    },

    /// Generic I/O error with context
    #[error("I/O error during {operation}: {source}")]
    IoError {
        /// The I/O operation that failed
        operation: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem
        message: String,
    },
}

impl Error {
    /// Get the error code for programmatic handling
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedAlgorithm { .. } => ErrorCode::UnsupportedAlgorithm,
            Self::UnsupportedCurve { .. } => ErrorCode::UnsupportedCurve,
            Self::WeakKeyRequested { .. } => ErrorCode::WeakKeyRequested,
            Self::KeyReconstructionFailure { .. } => ErrorCode::KeyReconstructionFailure,
            Self::NoCurrentKey { .. } => ErrorCode::NoCurrentKey,
            Self::CryptoError { .. } => ErrorCode::CryptoFailure,
            Self::StorageError { .. } => ErrorCode::StorageFailure,
            Self::InsufficientEntropy { .. } => ErrorCode::InsufficientEntropy,
            Self::SerializationError { .. } => ErrorCode::SerializationFailure,
            Self::IoError { .. } => ErrorCode::IoFailure,
            Self::ConfigurationError { .. } => ErrorCode::ConfigurationError,
        }
    }

    /// Create an unsupported algorithm error
    pub fn unsupported_algorithm<S: Into<String>, R: Into<String>>(
        algorithm: S,
        reason: R,
    ) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
            reason: reason.into(),
        }
    }

    /// Create a reconstruction error for a stored record
    pub fn reconstruction<S: Into<String>, R: Into<String>>(key_id: S, reason: R) -> Self {
        Self::KeyReconstructionFailure {
            key_id: key_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a crypto error with context
    pub fn crypto<S: Into<String>, M: Into<String>>(operation: S, message: M) -> Self {
        Self::CryptoError {
            operation: operation.into(),
            message: message.into(),
            key_id: None,
        }
    }

    /// Create a crypto error with key context
    pub fn crypto_with_key<S: Into<String>, M: Into<String>, K: Into<String>>(
        operation: S,
        message: M,
        key_id: K,
    ) -> Self {
        Self::CryptoError {
            operation: operation.into(),
            message: message.into(),
            key_id: Some(key_id.into()),
        }
    }

    /// Create a storage error with context
    pub fn storage<S: Into<String>, M: Into<String>>(operation: S, message: M) -> Self {
        Self::StorageError {
            operation: operation.into(),
            message: message.into(),
            path: None,
        }
    }

    /// Create a storage error with path context
    pub fn storage_with_path<S: Into<String>, M: Into<String>, P: Into<String>>(
        operation: S,
        message: M,
        path: P,
    ) -> Self {
        Self::StorageError {
            operation: operation.into(),
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a serialization error with context
    pub fn serialization<S: Into<String>, M: Into<String>>(operation: S, message: M) -> Self {
        Self::SerializationError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Attach an operation name to an I/O error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::IoError {
            operation: operation.into(),
            source,
        }
    }

    /// Check if error is retryable
    ///
    /// The key set service never retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageError { .. } | Self::IoError { .. })
    }

    /// Check if the caller asked for something the catalog or policy rejects
    pub fn is_rejected_request(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedAlgorithm { .. }
                | Self::UnsupportedCurve { .. }
                | Self::WeakKeyRequested { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

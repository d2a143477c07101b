//! Subspace and transformer errors.

use snafu::Snafu;

use crate::tuple::TupleError;

/// Errors produced while packing or unpacking through a subspace.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SubspaceError {
    /// The key does not start with the subspace prefix.
    #[snafu(display("key {} is not in subspace {}", hex::encode(key), hex::encode(prefix)))]
    NotInSubspace {
        /// The rejected key.
        key: Vec<u8>,
        /// The subspace prefix.
        prefix: Vec<u8>,
    },

    /// Tuple encoding failed.
    #[snafu(display("tuple encoding error: {source}"))]
    Tuple {
        /// The underlying tuple error.
        source: TupleError,
    },

    /// A fixed-width value had the wrong size.
    #[snafu(display("expected {expected} bytes, found {actual}"))]
    InvalidLength {
        /// Expected byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// A string value was not UTF-8.
    #[snafu(display("invalid UTF-8: {source}"))]
    InvalidUtf8 {
        /// The underlying UTF-8 error.
        source: std::str::Utf8Error,
    },

    /// A JSON value could not be encoded or decoded.
    #[snafu(display("JSON error: {source}"))]
    Json {
        /// The underlying serde_json error.
        source: serde_json::Error,
    },
}

//! Keys for ordered key-value stores.
//!
//! This crate holds the pieces that turn structured data into store keys
//! and values without touching the store itself:
//!
//! - [`Tuple`] / [`Element`]: the order-preserving tuple codec
//! - [`Subspace`]: a key prefix with key and value transformers
//! - [`Transformer`] implementations for tuples, raw bytes, strings,
//!   big-endian `i32`, little-endian counters, empty values and JSON
//! - [`KeyRange`] and [`strinc`] for prefix range computation

pub mod error;
pub mod range;
pub mod subspace;
pub mod transformer;
pub mod tuple;

#[cfg(test)]
mod proptest;

pub use error::SubspaceError;
pub use range::KeyRange;
pub use range::StrincError;
pub use range::strinc;
pub use subspace::Subspace;
pub use transformer::CounterEncoding;
pub use transformer::Int32BeEncoding;
pub use transformer::JsonEncoding;
pub use transformer::RawEncoding;
pub use transformer::StringEncoding;
pub use transformer::Transformer;
pub use transformer::TupleEncoding;
pub use transformer::VoidEncoding;
pub use tuple::DecodeMode;
pub use tuple::Element;
pub use tuple::Tuple;
pub use tuple::TupleError;

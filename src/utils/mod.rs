//! Utility functions shared across the index, query and worker layers.
//!
//! - [`ngram`] - n-gram extraction for indexing and querying
//! - [`encoding`] - varint/delta codecs and posting key layout
//! - [`cancel`] - cooperative cancellation token
//! - [`progress`] - progress bars (no-op without the `progress` feature)

pub mod cancel;
pub mod encoding;
pub mod ngram;
pub mod progress;

pub use cancel::*;
pub use encoding::*;
pub use ngram::*;

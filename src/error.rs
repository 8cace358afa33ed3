use std::fmt;

use crate::word::Word;

/// Errors raised at the [`ReuseTree`](crate::tree::ReuseTree) boundary.
///
/// Mirrors the two error kinds called out in the design: [`InvalidArgument`]
/// is a programmer error (never a partial mutation precedes it, since every
/// check runs before the first write), while [`NonDeterministicBehavior`]
/// is a domain-level contradiction raised by `insert` at the first
/// conflicting position.
///
/// [`InvalidArgument`]: ReuseCacheError::InvalidArgument
/// [`NonDeterministicBehavior`]: ReuseCacheError::NonDeterministicBehavior
#[derive(thiserror::Error, Debug)]
pub enum ReuseCacheError<I: fmt::Debug, O: fmt::Debug> {
    /// A required argument was missing or malformed, e.g. a query whose
    /// length does not match its claimed output length.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// `insert` observed an output that conflicts with a previously cached
    /// transition for the same node and input symbol.
    #[error(
        "non-deterministic behavior at position {position}: cached output {cached_output:?}, \
         new output {new_output:?} for input {input:?}"
    )]
    NonDeterministicBehavior {
        /// The query word whose insertion triggered the conflict.
        query: Word<I>,
        /// The input symbol at the conflicting position.
        input: I,
        /// The output already recorded in the tree for this transition.
        cached_output: O,
        /// The conflicting output produced by the new insert.
        new_output: O,
        /// The zero-based position within `query` at which the conflict
        /// occurred.
        position: usize,
    },
}

impl<I: fmt::Debug, O: fmt::Debug> ReuseCacheError<I, O> {
    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Non-panicking constructor used by [`crate::tree::ReuseTree::insert`].
    pub(crate) fn non_deterministic(
        query: Word<I>,
        input: I,
        cached_output: O,
        new_output: O,
        position: usize,
    ) -> Self {
        Self::NonDeterministicBehavior {
            query,
            input,
            cached_output,
            new_output,
            position,
        }
    }
}

pub type Result<T, I, O> = std::result::Result<T, ReuseCacheError<I, O>>;

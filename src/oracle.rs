use std::fmt::Debug;
use std::hash::Hash;

use crate::error::ReuseCacheError;
use crate::event::{self, EventKind};
use crate::tree::{QueryResult, ReuseTree};
use crate::word::Word;

/// The external SUL driver a [`ReuseOracle`] dispatches to when the tree
/// cannot answer a query from cache alone.
///
/// `process_query` always resets the SUL first; `continue_query` resumes
/// from a previously captured state and must not reset. Per the contract in
/// the design notes, calling `continue_query` twice with the same state is
/// undefined — a state is consumed by its first use.
pub trait ReuseCapableOracle<I, O, S> {
    /// Runs `word` against the SUL from its reset state.
    fn process_query(&mut self, word: &Word<I>) -> QueryResult<O, S>;

    /// Resumes from `state` and runs `word` (a suffix of some larger
    /// query) without resetting the SUL.
    fn continue_query(&mut self, word: &Word<I>, state: S) -> QueryResult<O, S>;
}

/// Front-end façade implementing the membership-query oracle contract on
/// top of a [`ReuseTree`].
///
/// Per the concurrency model (§5 of the design notes), the tree is locked
/// only for the `fetch`/`insert` steps; the call into the underlying
/// [`ReuseCapableOracle`] happens with no lock held, so a slow SUL round
/// trip on one thread does not block lookups on another.
pub struct ReuseOracle<I, O, S, D> {
    tree: ReuseTree<I, O, S>,
    delegate: D,
}

impl<I, O, S, D> ReuseOracle<I, O, S, D>
where
    I: Clone + Eq + Hash + Debug,
    O: Clone + Eq + Hash + Debug,
    S: Clone,
    D: ReuseCapableOracle<I, O, S>,
{
    pub fn new(tree: ReuseTree<I, O, S>, delegate: D) -> Self {
        Self { tree, delegate }
    }

    pub fn tree(&self) -> &ReuseTree<I, O, S> {
        &self.tree
    }

    /// Answers `query`, consulting the cache first and otherwise
    /// dispatching a full or suffix-continuation query to the delegate.
    pub fn answer(&mut self, query: &Word<I>) -> Result<Word<O>, ReuseCacheError<I, O>> {
        if let Some(cached) = self.tree.get_output(query) {
            return Ok(cached);
        }

        match self.tree.fetch_system_state(query) {
            None => {
                let result = self.delegate.process_query(query);
                let output = result.output.clone();
                self.tree.insert(query.clone(), result)?;
                Ok(output)
            }
            Some(fetched) => {
                let suffix = query.suffix(fetched.prefix_length);
                let result = self.delegate.continue_query(&suffix, fetched.state);
                if !result.old_invalidated {
                    // The state was already detached by `fetch_system_state`
                    // (invalidation is the default). Per the resolved open
                    // question in DESIGN.md, we do not attempt to reinstall
                    // it on the originating node: we only log and proceed.
                    event::emit(EventKind::DriverDeclinedInvalidation {
                        node: fetched.node,
                    });
                }
                let output = result.output.clone();
                self.tree.insert_suffix(suffix, fetched.node, result)?;
                Ok(output)
            }
        }
    }
}

//! A prefix-sharing reuse cache for automata-learning membership-query
//! oracles.
//!
//! A membership query applies an input word to a System Under Learning
//! (SUL) from its reset state and observes the equal-length output word.
//! Learning experiments issue millions of these queries whose inputs
//! overlap heavily in prefixes; this crate lets a new query skip a shared
//! prefix by resuming SUL execution from a previously observed
//! configuration instead of resetting.
//!
//! The core is [`tree::ReuseTree`], a prefix-sharing tree augmented with
//! reusable system states and two domain-specific pumping optimizations
//! (model-invariant inputs, failure outputs — see [`tree::ReuseTreeBuilder`]).
//! [`oracle::ReuseOracle`] is the front-end façade that wires the tree to an
//! external [`oracle::ReuseCapableOracle`] SUL driver.
//!
//! [`symbol_query_cache::SymbolQueryCache`] is an independent, simpler
//! front-end for symbol-at-a-time oracles: an incrementally constructed
//! Mealy automaton that caches transitions without reusing SUL states.

pub mod alphabet;
pub mod error;
mod event;
pub mod node;
pub mod oracle;
pub mod symbol_query_cache;
pub mod tree;
pub mod word;

pub use alphabet::Alphabet;
pub use error::{ReuseCacheError, Result};
pub use node::{NodeId, ReuseEdge};
pub use oracle::{ReuseCapableOracle, ReuseOracle};
pub use symbol_query_cache::{SymbolOracle, SymbolQueryCache};
pub use tree::{NodeResult, QueryResult, ReuseTree, ReuseTreeBuilder};
pub use word::Word;

use std::hash::Hash;

use rustc_hash::FxHashMap;

/// A finite, ordered set of input symbols with an O(1) bijection to
/// `0..size()`.
///
/// The index assigned to a symbol is fixed for the lifetime of the
/// `Alphabet` (insertion order of [`Alphabet::from_symbols`]); it is what
/// lets a [`ReuseNode`](crate::node::ReuseNode) store its outgoing edges in
/// a flat, densely packed array instead of a map.
#[derive(Debug, Clone)]
pub struct Alphabet<I> {
    symbols: Vec<I>,
    index_of: FxHashMap<I, usize>,
}

impl<I> Alphabet<I>
where
    I: Clone + Eq + Hash,
{
    /// Builds an alphabet from an ordered, duplicate-free list of symbols.
    ///
    /// Symbols are indexed in the order they appear.
    pub fn from_symbols(symbols: impl IntoIterator<Item = I>) -> Self {
        let symbols: Vec<I> = symbols.into_iter().collect();
        let mut index_of = FxHashMap::default();
        index_of.reserve(symbols.len());
        for (idx, symbol) in symbols.iter().enumerate() {
            let prior = index_of.insert(symbol.clone(), idx);
            assert!(prior.is_none(), "duplicate symbol in alphabet");
        }
        Self { symbols, index_of }
    }

    /// Number of symbols in the alphabet.
    pub fn size(&self) -> usize {
        self.symbols.len()
    }

    /// The dense index of `symbol`, or `None` if it is not part of this
    /// alphabet.
    pub fn index_of(&self, symbol: &I) -> Option<usize> {
        self.index_of.get(symbol).copied()
    }

    /// The symbol stored at `index`, as assigned by [`Self::from_symbols`].
    pub fn symbol_at(&self, index: usize) -> Option<&I> {
        self.symbols.get(index)
    }

    pub fn symbols(&self) -> &[I] {
        &self.symbols
    }
}

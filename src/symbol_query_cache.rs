use std::fmt::Debug;
use std::hash::Hash;

use rustc_hash::FxHashMap;

/// The symbol-at-a-time oracle a [`SymbolQueryCache`] wraps.
///
/// Unlike [`ReuseCapableOracle`](crate::oracle::ReuseCapableOracle), this
/// delegate is driven one symbol at a time and keeps its own cursor; `reset`
/// rewinds that cursor to the SUL's initial configuration.
pub trait SymbolOracle<I, O> {
    /// Resets the delegate's internal walk to the SUL's initial state.
    fn reset(&mut self);

    /// Steps the delegate by one symbol from wherever its cursor currently
    /// is, returning the observed output.
    fn query(&mut self, input: &I) -> O;
}

type CacheStateId = usize;

/// An incrementally constructed Mealy automaton: one state per node of a
/// tree-shaped prefix graph, transitions labeled `(input -> output, next)`.
struct MealyAutomaton<I, O> {
    transitions: Vec<FxHashMap<I, (O, CacheStateId)>>,
}

impl<I, O> MealyAutomaton<I, O>
where
    I: Clone + Eq + Hash,
    O: Clone,
{
    fn new() -> Self {
        Self {
            transitions: vec![FxHashMap::default()],
        }
    }

    fn initial(&self) -> CacheStateId {
        0
    }

    fn transition(&self, state: CacheStateId, input: &I) -> Option<&(O, CacheStateId)> {
        self.transitions[state].get(input)
    }

    /// Adds a fresh state and a transition from `state` on `input` to it,
    /// returning the new state id.
    fn extend(&mut self, state: CacheStateId, input: I, output: O) -> CacheStateId {
        let next = self.transitions.len();
        self.transitions.push(FxHashMap::default());
        self.transitions[state].insert(input, (output, next));
        next
    }
}

/// An incremental Mealy-automaton cache for stream-style (symbol-at-a-time)
/// oracles.
///
/// Unlike [`ReuseTree`](crate::tree::ReuseTree), this cache does not reuse
/// SUL system states: it only remembers input/output transitions already
/// observed, replaying the delegate from its reset state whenever the walk
/// falls off the cached prefix. See §4.6 of the design notes.
pub struct SymbolQueryCache<I, O, D> {
    cache: MealyAutomaton<I, O>,
    current_state: CacheStateId,
    current_trace: Vec<I>,
    current_trace_valid: bool,
    delegate: D,
}

impl<I, O, D> SymbolQueryCache<I, O, D>
where
    I: Clone + Eq + Hash + Debug,
    O: Clone + PartialEq + Debug,
    D: SymbolOracle<I, O>,
{
    pub fn new(delegate: D) -> Self {
        let cache = MealyAutomaton::new();
        let current_state = cache.initial();
        Self {
            cache,
            current_state,
            current_trace: Vec::new(),
            current_trace_valid: true,
            delegate,
        }
    }

    /// Rewinds the cache's walk pointer to the automaton's initial state and
    /// clears the replay trace. Does **not** touch the delegate; the
    /// delegate is only reset lazily, the first time a cache miss forces a
    /// replay (step 2 of the walk discipline).
    pub fn reset(&mut self) {
        self.current_state = self.cache.initial();
        self.current_trace.clear();
        self.current_trace_valid = true;
    }

    /// Answers `input`, following the walk discipline in §4.6: a cache hit
    /// returns the recorded output with no delegate call; a cache miss
    /// replays the trace against the delegate (if the walk had still been
    /// valid) and then queries the delegate directly, growing the automaton
    /// with a fresh transition.
    pub fn query(&mut self, input: &I) -> O {
        if self.current_trace_valid {
            if let Some((output, next)) = self.cache.transition(self.current_state, input) {
                let output = output.clone();
                self.current_state = *next;
                self.current_trace.push(input.clone());
                return output;
            }

            self.current_trace_valid = false;
            self.delegate.reset();
            for replayed in &self.current_trace {
                self.delegate.query(replayed);
            }
        }

        let output = self.delegate.query(input);

        match self.cache.transition(self.current_state, input) {
            Some((cached_output, next)) => {
                debug_assert_eq!(
                    cached_output, &output,
                    "delegate produced an output inconsistent with a previously cached \
                     transition for the same cache state and input"
                );
                self.current_state = *next;
            }
            None => {
                self.current_state =
                    self.cache
                        .extend(self.current_state, input.clone(), output.clone());
            }
        }

        output
    }
}

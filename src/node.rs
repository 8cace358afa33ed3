use std::fmt;

use smallvec::SmallVec;

/// Stable identity of a [`ReuseNode`] within one generation of a
/// [`ReuseTree`](crate::tree::ReuseTree).
///
/// The counter backing this id is per-tree, not process-global, and is
/// reset by `clear_tree`; do not treat it as a stable cross-process
/// identifier.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) const ROOT: NodeId = NodeId(0);

    pub(crate) fn from_usize(value: usize) -> Self {
        NodeId(value)
    }

    pub(crate) fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// An edge of the reuse tree: `source` and `target` are [`NodeId`]s,
/// `input`/`output` are the symbols observed on this transition.
///
/// Immutable after construction. `target == source` marks a *reflexive*
/// (pump) edge, created only when the input is model-invariant or the
/// output is a failure output.
#[derive(Clone)]
pub struct ReuseEdge<I, O> {
    pub source: NodeId,
    pub target: NodeId,
    pub input: I,
    pub output: O,
}

impl<I, O> ReuseEdge<I, O> {
    /// A reflexive edge exists iff `source == target`; pumping relies on
    /// this equality rather than on any separate "is a pump edge" flag.
    pub fn is_reflexive(&self) -> bool {
        self.source == self.target
    }
}

/// A node of the reuse tree.
///
/// `edges` is indexed by the alphabet's dense symbol index (see
/// [`Alphabet`](crate::alphabet::Alphabet)), giving `O(1)` child lookup and
/// determinism by construction: a slot can hold at most one edge.
pub(crate) struct ReuseNode<I, O, S> {
    id: NodeId,
    // Learning alphabets are typically small (a handful of input symbols),
    // so the common case fits inline; `SmallVec` spills to the heap for
    // larger alphabets exactly like a `Vec` would.
    edges: SmallVec<[Option<ReuseEdge<I, O>>; 4]>,
    system_state: Option<S>,
}

impl<I, O, S> ReuseNode<I, O, S> {
    pub(crate) fn new(id: NodeId, alphabet_size: usize) -> Self {
        let mut edges = SmallVec::with_capacity(alphabet_size);
        edges.resize_with(alphabet_size, || None);
        Self {
            id,
            edges,
            system_state: None,
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn edge(&self, symbol_index: usize) -> Option<&ReuseEdge<I, O>> {
        self.edges[symbol_index].as_ref()
    }

    pub(crate) fn set_edge(&mut self, symbol_index: usize, edge: ReuseEdge<I, O>) {
        self.edges[symbol_index] = Some(edge);
    }

    pub(crate) fn edges(&self) -> impl Iterator<Item = &ReuseEdge<I, O>> {
        self.edges.iter().filter_map(|slot| slot.as_ref())
    }

    pub(crate) fn has_system_state(&self) -> bool {
        self.system_state.is_some()
    }

    pub(crate) fn system_state(&self) -> Option<&S> {
        self.system_state.as_ref()
    }

    /// Attaches `state`, replacing and returning any previously stored
    /// state. The caller is responsible for disposing of the returned
    /// value (per §4.3, it has just been consumed by the driver that
    /// produced the new one, so it is dropped silently by most callers).
    pub(crate) fn attach_system_state(&mut self, state: S) -> Option<S> {
        self.system_state.replace(state)
    }

    /// Removes and returns the stored state, if any.
    pub(crate) fn take_system_state(&mut self) -> Option<S> {
        self.system_state.take()
    }
}

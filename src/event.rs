//! Structured tracing events emitted by [`crate::tree::ReuseTree`] and
//! [`crate::oracle::ReuseOracle`].
//!
//! These are not a public callback API (the learning literature's
//! graph-visualization and logging-filter tooling is out of scope here);
//! they are emitted through the [`tracing`] crate so that a caller can
//! subscribe with whatever subscriber fits their deployment, the same way
//! the rest of the ambient stack defers formatting/filtering decisions to
//! `tracing`.

use crate::node::NodeId;

/// Identifies a notable event inside a [`ReuseTree`](crate::tree::ReuseTree).
#[derive(Debug)]
pub enum EventKind {
    /// A fresh, non-reflexive `ReuseNode` was allocated during an insert.
    DidCreateNode { node: NodeId },

    /// An edge was created as a self-loop because its input is a
    /// model-invariant input or its output is a failure output.
    DidCreatePumpEdge { node: NodeId },

    /// A system state was attached to a node by `insert`/`insert_suffix`,
    /// replacing whatever state (if any) was previously stored there.
    DidAttachSystemState { node: NodeId, replaced_existing: bool },

    /// `fetch_system_state` detached a state from a node because
    /// invalidation is enabled.
    DidDetachSystemState { node: NodeId, prefix_length: usize },

    /// `dispose_system_states` invoked the disposer for a node's state.
    DidDisposeSystemState { node: NodeId },

    /// `clear_tree` reset the tree to a single empty root.
    DidClearTree,

    /// `insert`/`insert_suffix` found an existing edge whose output
    /// conflicts with the one being inserted.
    DidDetectNonDeterminism { node: NodeId, position: usize },

    /// A driver reported `old_invalidated = false` after being resumed from
    /// a state that `fetch_system_state` had already detached. See
    /// `DESIGN.md` for why the tree does not attempt to reinstall it.
    DriverDeclinedInvalidation { node: NodeId },
}

/// Emits `event` at an appropriate `tracing` level.
///
/// Kept as a single free function (rather than a method on the tree) so
/// that call sites read like `event::emit(EventKind::...)` without needing
/// a `&self` borrow of the tree while it may already be locked.
pub(crate) fn emit(kind: EventKind) {
    match &kind {
        EventKind::DidDetectNonDeterminism { node, position } => {
            tracing::warn!(?node, position, "non-deterministic behavior detected");
        }
        EventKind::DriverDeclinedInvalidation { node } => {
            tracing::warn!(?node, "driver declined invalidation of resumed state");
        }
        EventKind::DidCreateNode { node } => {
            tracing::trace!(?node, "created reuse node");
        }
        EventKind::DidCreatePumpEdge { node } => {
            tracing::trace!(?node, "created pump (reflexive) edge");
        }
        EventKind::DidAttachSystemState {
            node,
            replaced_existing,
        } => {
            tracing::trace!(?node, replaced_existing, "attached system state");
        }
        EventKind::DidDetachSystemState {
            node,
            prefix_length,
        } => {
            tracing::trace!(?node, prefix_length, "detached system state on fetch");
        }
        EventKind::DidDisposeSystemState { node } => {
            tracing::debug!(?node, "disposed system state");
        }
        EventKind::DidClearTree => {
            tracing::debug!("cleared tree");
        }
    }
}

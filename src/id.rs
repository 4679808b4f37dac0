//! Opaque node identity, used only as an edge-map key.
//!
//! A `NodeId` is distinct from the weak or strong handle used to
//! actually reach a node: it is `Copy`, hashable, and meaningless once
//! detached from the node it was issued to. Edge maps key on `NodeId`
//! rather than on the handle itself so that lookups don't require
//! upgrading a weak reference first.

use std::cell::Cell;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct NodeId(usize);

thread_local! {
    static NEXT_ID: Cell<usize> = Cell::new(1);
}

/// Issues a fresh, process-local id. Single-threaded, so a plain
/// `Cell` counter is sufficient; there is no cross-thread uniqueness
/// requirement to pay an atomic for.
pub(crate) fn fresh_node_id() -> NodeId {
    NEXT_ID.with(|cell| {
        let id = cell.get();
        cell.set(id + 1);
        NodeId(id)
    })
}

//! The sparse-or-dense edge map (spec §4.6) and the producer-side
//! notification fan-out (spec §4.5) built on top of it.
//!
//! Most nodes in a real graph have a handful of producers or
//! consumers, so a linear scan over a small inline buffer beats
//! hashing. A node that accumulates enough edges to make that scan
//! expensive transparently migrates to a hashed representation with
//! identical external semantics.

use std::cell::RefCell;
use std::hash::BuildHasherDefault;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::FxHasher;
use smallvec::SmallVec;

use crate::id::NodeId;
use crate::plumbing::{DynConsumer, DynProducer};
use crate::version::Version;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Live entries beyond this many cause a sparse map to migrate to a
/// hashed representation.
const UPGRADE_THRESHOLD: usize = 100;

/// One edge-map value: the handle (weak consumer, or strong producer)
/// plus the version that was observed when the edge was last
/// (re)registered.
#[derive(Clone)]
pub(crate) struct Entry<H> {
    pub(crate) handle: H,
    pub(crate) version: Version,
}

enum Repr<H> {
    Sparse(SmallVec<[Option<(NodeId, Entry<H>)>; 4]>),
    Dense(FxIndexMap<NodeId, Entry<H>>),
}

/// A small-cardinality mapping from `NodeId` to `Entry<H>`, tolerant of
/// in-place tombstoning and transparent upgrade to a hashed
/// representation once it grows large.
pub(crate) struct EdgeMap<H> {
    repr: Repr<H>,
}

impl<H: Clone> EdgeMap<H> {
    pub(crate) fn new() -> Self {
        EdgeMap {
            repr: Repr::Sparse(SmallVec::new()),
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<Entry<H>> {
        match &self.repr {
            Repr::Sparse(slots) => slots
                .iter()
                .flatten()
                .find(|(k, _)| *k == id)
                .map(|(_, e)| e.clone()),
            Repr::Dense(map) => map.get(&id).cloned(),
        }
    }

    /// Inserts or overwrites the entry for `id`.
    pub(crate) fn set(&mut self, id: NodeId, entry: Entry<H>) {
        match &mut self.repr {
            Repr::Sparse(slots) => {
                if let Some(slot) = slots.iter_mut().flatten().find(|(k, _)| *k == id) {
                    slot.1 = entry;
                    return;
                }
                if let Some(slot) = slots.iter_mut().find(|slot| slot.is_none()) {
                    *slot = Some((id, entry));
                } else {
                    slots.push(Some((id, entry)));
                }
                if self.live_len() > UPGRADE_THRESHOLD {
                    self.upgrade();
                }
            }
            Repr::Dense(map) => {
                map.insert(id, entry);
            }
        }
    }

    /// Tombstones (sparse) or removes (dense) the entry for `id`.
    /// Returns whether an entry was present.
    pub(crate) fn delete(&mut self, id: NodeId) -> bool {
        match &mut self.repr {
            Repr::Sparse(slots) => {
                for slot in slots.iter_mut() {
                    if matches!(slot, Some((k, _)) if *k == id) {
                        *slot = None;
                        return true;
                    }
                }
                false
            }
            Repr::Dense(map) => map.swap_remove(&id).is_some(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.live_len()
    }

    fn live_len(&self) -> usize {
        match &self.repr {
            Repr::Sparse(slots) => slots.iter().filter(|slot| slot.is_some()).count(),
            Repr::Dense(map) => map.len(),
        }
    }

    /// A snapshot of the currently-live keys, safe to iterate while
    /// mutating the map (deletions observed during a prior call don't
    /// retroactively invalidate this list; deletions performed while
    /// walking it just mean a `get` for that id later returns `None`).
    pub(crate) fn keys(&self) -> Vec<NodeId> {
        match &self.repr {
            Repr::Sparse(slots) => slots.iter().flatten().map(|(k, _)| *k).collect(),
            Repr::Dense(map) => map.keys().copied().collect(),
        }
    }

    /// Compacts tombstones out of the sparse representation. Never
    /// required for correctness; purely a memory/scan-length
    /// optimization.
    pub(crate) fn defragment(&mut self) {
        if let Repr::Sparse(slots) = &mut self.repr {
            slots.retain(|slot| slot.is_some());
        }
    }

    fn upgrade(&mut self) {
        if let Repr::Sparse(slots) = &mut self.repr {
            let mut map: FxIndexMap<NodeId, Entry<H>> = FxIndexMap::default();
            for (id, entry) in slots.drain(..).flatten() {
                map.insert(id, entry);
            }
            self.repr = Repr::Dense(map);
        }
    }
}

/// The sole mechanism for stale-propagation and the sole opportunistic
/// garbage collector for edges (spec §4.5).
///
/// Walks `consumers`, notifying every still-live, still-current
/// consumer that `self_id` may have changed; upgrades that fail, or
/// whose recorded `trackingVersion` no longer matches the live
/// consumer's current one, are pruned from both sides instead.
pub(crate) fn notify_consumers(
    self_id: NodeId,
    self_as_producer: &RefCell<Weak<dyn DynProducer>>,
    consumers: &RefCell<EdgeMap<Weak<dyn DynConsumer>>>,
) {
    let source = self_as_producer.borrow().upgrade();
    let ids = consumers.borrow().keys();
    log::trace!("notify_consumers: node {:?} fanning out to {} recorded consumer(s)", self_id, ids.len());
    for id in ids {
        let entry = match consumers.borrow().get(id) {
            Some(entry) => entry,
            None => continue,
        };
        match entry.handle.upgrade() {
            None => {
                log::trace!("notify_consumers: pruning reclaimed consumer");
                consumers.borrow_mut().delete(id);
            }
            Some(live) => {
                if live.tracking_version() != entry.version {
                    log::trace!("notify_consumers: pruning stale edge (tracking version mismatch)");
                    consumers.borrow_mut().delete(id);
                    live.remove_producer(self_id);
                } else {
                    live.notify(source.clone());
                }
            }
        }
    }
}

//! Leaf producers: directly-settable values with no dependencies of
//! their own (spec.md §4.1).

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::edge::{notify_consumers, Entry, EdgeMap};
use crate::id::{fresh_node_id, NodeId};
use crate::plumbing::{DynConsumer, DynProducer};
use crate::runtime::producer_accessed;
use crate::version::Version;

struct ValueNodeInner<T> {
    id: NodeId,
    value: RefCell<T>,
    value_version: Cell<Version>,
    consumers: RefCell<EdgeMap<Weak<dyn DynConsumer>>>,
    self_as_producer: RefCell<Weak<dyn DynProducer>>,
}

/// A directly-settable leaf node. Bumps its `valueVersion` whenever a
/// write actually changes the value by `PartialEq`, and notifies every
/// recorded consumer when that happens.
///
/// Identity is compared with `T: PartialEq`; wrapping a scalar result
/// in a container type that always compares unequal (or always equal)
/// defeats the "only notify on an actual change" shortcut this node
/// relies on.
pub struct ValueNode<T> {
    inner: Rc<ValueNodeInner<T>>,
}

impl<T> Clone for ValueNode<T> {
    fn clone(&self) -> Self {
        ValueNode { inner: self.inner.clone() }
    }
}

impl<T: PartialEq + 'static> ValueNode<T> {
    /// Creates a new leaf node holding `initial`, at its initial
    /// `valueVersion`.
    pub fn new(initial: T) -> Self {
        let inner = Rc::new(ValueNodeInner {
            id: fresh_node_id(),
            value: RefCell::new(initial),
            value_version: Cell::new(Version::INITIAL),
            consumers: RefCell::new(EdgeMap::new()),
            self_as_producer: RefCell::new(Weak::<ValueNodeInner<T>>::new()),
        });
        let weak: Weak<dyn DynProducer> = Rc::downgrade(&inner);
        *inner.self_as_producer.borrow_mut() = weak;
        ValueNode { inner }
    }

    /// Reads the current value, recording an edge to the ambient
    /// active consumer (if any) first.
    pub fn value(&self) -> T
    where
        T: Clone,
    {
        let self_as_producer = self.inner.self_as_producer.borrow().upgrade();
        if let Some(producer) = self_as_producer {
            producer_accessed(&producer);
        }
        self.inner.value.borrow().clone()
    }

    /// Overwrites the value unconditionally, bumping `valueVersion` and
    /// notifying consumers only if the new value differs by `PartialEq`
    /// from the old one.
    pub fn set(&self, new_value: T) {
        let changed = *self.inner.value.borrow() != new_value;
        *self.inner.value.borrow_mut() = new_value;
        if changed {
            self.bump_and_notify();
        }
    }

    /// Computes a replacement from the current value via `f`, then
    /// behaves like [`ValueNode::set`].
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let new_value = f(&self.inner.value.borrow());
        self.set(new_value);
    }

    /// Mutates the value in place via `f`. Always bumps `valueVersion`
    /// and notifies consumers: a `&mut T` mutation offers no way to
    /// cheaply compare before/after, so this path cannot take the
    /// unchanged-value shortcut that `set`/`update` take.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.bump_and_notify();
    }

    fn bump_and_notify(&self) {
        self.inner.value_version.set(self.inner.value_version.get().succ());
        notify_consumers(self.inner.id, &self.inner.self_as_producer, &self.inner.consumers);
    }

    #[cfg(test)]
    pub(crate) fn consumer_count(&self) -> usize {
        self.inner.consumers.borrow().len()
    }
}

impl<T: PartialEq + 'static> DynProducer for ValueNodeInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn value_version(&self) -> Version {
        self.value_version.get()
    }

    fn check_for_actually_changed_value(&self) {}

    fn register_consumer(&self, consumer: Weak<dyn DynConsumer>, consumer_id: NodeId, tracking_version: Version) {
        self.consumers.borrow_mut().set(consumer_id, Entry { handle: consumer, version: tracking_version });
    }

    fn consumer_tracking_version_for(&self, consumer_id: NodeId) -> Option<Version> {
        self.consumers.borrow().get(consumer_id).map(|entry| entry.version)
    }

    fn remove_consumer(&self, consumer_id: NodeId) {
        self.consumers.borrow_mut().delete(consumer_id);
    }
}

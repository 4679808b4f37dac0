//! Interior nodes: both a consumer of whatever they read during
//! `calculate()`, and a producer to whoever reads them (spec.md §4.2,
//! §4.3).

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::edge::{notify_consumers, Entry, EdgeMap};
use crate::error::EngineError;
use crate::id::{fresh_node_id, NodeId};
use crate::plumbing::{DynConsumer, DynProducer};
use crate::runtime::{producer_accessed, ActiveConsumerGuard};
use crate::version::Version;

/// What's cached for this node right now.
enum CacheState<T> {
    /// Never calculated, or reset after a failed calculation.
    Unset,
    /// Currently inside its own `calculate()`. Reading the node again
    /// while in this state is the cycle spec.md §4.2 detects.
    Computing,
    Value(T),
}

/// Whether a cached value might be outdated, and if so, the cheapest
/// way known to find out (spec.md §4.3).
#[derive(Clone)]
enum Stale {
    /// Nothing has notified this node since it last recomputed.
    Clean,
    /// The first producer that notified this node since its last
    /// recomputation; polling can check just that one's `valueVersion`
    /// first. Only ever the *first* notifier of an epoch (spec.md §9
    /// Open Question 2) — `notify()` is idempotent once already stale,
    /// so a second, independent notifier never overwrites this hint.
    /// When this one producer turns out unchanged and more than one
    /// producer is recorded, polling falls back to checking the rest.
    DirtySingleSource(Rc<dyn DynProducer>),
    /// The first notification of this epoch carried no specific
    /// source; must poll every recorded producer.
    DirtyUnknownSource,
}

struct ComputedNodeInner<T> {
    id: NodeId,
    calculate: Box<dyn Fn() -> T>,
    cache: RefCell<CacheState<T>>,
    stale: RefCell<Stale>,
    value_version: Cell<Version>,
    tracking_version: Cell<Version>,
    producers: RefCell<EdgeMap<Rc<dyn DynProducer>>>,
    consumers: RefCell<EdgeMap<Weak<dyn DynConsumer>>>,
    self_weak: RefCell<Weak<ComputedNodeInner<T>>>,
    self_as_producer: RefCell<Weak<dyn DynProducer>>,
    self_as_consumer: RefCell<Weak<dyn DynConsumer>>,
}

/// A lazily, on-demand recomputed node (spec.md §4.2). Recomputes at
/// most once per call to [`ComputedNode::value`] or
/// [`ComputedNode::try_value`], and only when polling its recorded
/// dependencies (or the absence of any prior computation) says it must.
///
/// Identity is compared with `T: PartialEq`, exactly as on
/// [`crate::ValueNode`]: wrapping a scalar result in a container type
/// that always compares unequal defeats the shortcut that keeps
/// unaffected downstream consumers from being notified.
pub struct ComputedNode<T> {
    inner: Rc<ComputedNodeInner<T>>,
}

impl<T> Clone for ComputedNode<T> {
    fn clone(&self) -> Self {
        ComputedNode { inner: self.inner.clone() }
    }
}

impl<T: PartialEq + Clone + 'static> ComputedNode<T> {
    /// Wraps `calculate` as a lazily recomputed node. `calculate` is not
    /// run until the first call to [`Self::value`] or
    /// [`Self::try_value`].
    pub fn new(calculate: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new(ComputedNodeInner {
            id: fresh_node_id(),
            calculate: Box::new(calculate),
            cache: RefCell::new(CacheState::Unset),
            stale: RefCell::new(Stale::DirtyUnknownSource),
            value_version: Cell::new(Version::default()),
            tracking_version: Cell::new(Version::default()),
            producers: RefCell::new(EdgeMap::new()),
            consumers: RefCell::new(EdgeMap::new()),
            self_weak: RefCell::new(Weak::new()),
            self_as_producer: RefCell::new(Weak::<ComputedNodeInner<T>>::new()),
            self_as_consumer: RefCell::new(Weak::<ComputedNodeInner<T>>::new()),
        });
        *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);
        let producer_weak: Weak<dyn DynProducer> = Rc::downgrade(&inner);
        let consumer_weak: Weak<dyn DynConsumer> = Rc::downgrade(&inner);
        *inner.self_as_producer.borrow_mut() = producer_weak;
        *inner.self_as_consumer.borrow_mut() = consumer_weak;
        ComputedNode { inner }
    }

    /// Returns the up-to-date value, recomputing first if needed, and
    /// panicking with an [`EngineError`] payload on a cycle or a
    /// dependency mutated mid-calculation. See [`Self::try_value`] for
    /// the non-panicking form.
    pub fn value(&self) -> T {
        match self.try_value() {
            Ok(value) => value,
            Err(err) => panic::panic_any(err),
        }
    }

    /// Like [`Self::value`], but converts a `Cycle` or
    /// `ChangedWhileCalculating` failure into an `Err` instead of
    /// unwinding past this call.
    ///
    /// Internally, recomputation signals these two failures by
    /// unwinding with an `EngineError` payload (see SPEC_FULL.md §4);
    /// this is the boundary that catches that unwind and downcasts it
    /// back into a `Result`. Any other panic is resumed untouched.
    pub fn try_value(&self) -> Result<T, EngineError> {
        let inner = self.inner.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| inner.resolve_staleness()));

        match result {
            Ok(()) => {}
            Err(payload) => match payload.downcast::<EngineError>() {
                Ok(err) => return Err(*err),
                Err(payload) => panic::resume_unwind(payload),
            },
        }

        let self_as_producer = self.inner.self_as_producer.borrow().upgrade();
        if let Some(producer) = self_as_producer {
            producer_accessed(&producer);
        }

        match &*self.inner.cache.borrow() {
            CacheState::Value(value) => Ok(value.clone()),
            CacheState::Unset | CacheState::Computing => {
                unreachable!("resolve_staleness leaves the cache in Value state on success")
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn producer_count(&self) -> usize {
        self.inner.producers.borrow().len()
    }

    #[cfg(test)]
    pub(crate) fn consumer_count(&self) -> usize {
        self.inner.consumers.borrow().len()
    }
}

impl<T: PartialEq + Clone + 'static> ComputedNodeInner<T> {
    /// Ensures `cache` holds an up-to-date value, recomputing if (and
    /// only if) necessary (spec.md §4.2/§4.3).
    fn resolve_staleness(self: &Rc<Self>) {
        let needs_recompute = match &*self.cache.borrow() {
            CacheState::Unset => true,
            CacheState::Computing => panic::panic_any(EngineError::Cycle),
            CacheState::Value(_) => self.poll_dependencies(),
        };
        if needs_recompute {
            self.recompute();
        }
    }

    /// Checks whether any recorded producer has actually changed since
    /// this node last recomputed, without forcing a recomputation of
    /// this node itself (spec.md §4.3). Resolves each producer's own
    /// staleness along the way, which is how staleness propagates
    /// lazily down the graph one read at a time.
    fn poll_dependencies(self: &Rc<Self>) -> bool {
        match self.stale.borrow().clone() {
            Stale::Clean => false,
            Stale::DirtySingleSource(producer) => self.poll_with_hint(producer),
            Stale::DirtyUnknownSource => self.poll_all(None),
        }
    }

    /// Step 1 of spec.md §4.3: try the remembered single-source shortcut
    /// first. Falls back to [`Self::poll_all`] (skipping `producer`,
    /// since it was already checked here) whenever the shortcut alone
    /// can't settle the answer — more than one recorded producer, or the
    /// edge to the hinted producer turned out to be stale.
    fn poll_with_hint(self: &Rc<Self>, producer: Rc<dyn DynProducer>) -> bool {
        let producer_id = producer.node_id();
        let Some(seen) = self.producers.borrow().get(producer_id).map(|e| e.version) else {
            return true;
        };

        let edge_current = producer
            .consumer_tracking_version_for(self.id)
            .map(|recorded| recorded == self.tracking_version.get())
            .unwrap_or(false);

        if !edge_current {
            return self.poll_all(None);
        }

        producer.check_for_actually_changed_value();
        if producer.value_version() != seen {
            return true;
        }
        if self.producers.borrow().len() == 1 {
            return false;
        }
        self.poll_all(Some(producer_id))
    }

    /// Step 2 of spec.md §4.3: walk every recorded producer except
    /// `skip`, pruning any whose edge has gone stale (the producer's
    /// record of our `trackingVersion` no longer matches) instead of
    /// treating a dead edge as a change, and returning `true` the moment
    /// a real change is found rather than forcing every remaining
    /// producer's `checkForActuallyChangedValue()` regardless.
    fn poll_all(self: &Rc<Self>, skip: Option<NodeId>) -> bool {
        let ids = self.producers.borrow().keys();
        for id in ids {
            if Some(id) == skip {
                continue;
            }
            let Some(entry) = self.producers.borrow().get(id) else {
                continue;
            };
            let edge_current = entry
                .handle
                .consumer_tracking_version_for(self.id)
                .map(|recorded| recorded == self.tracking_version.get())
                .unwrap_or(false);
            if !edge_current {
                log::trace!("poll_all: pruning dead edge to a producer that re-tracked elsewhere");
                self.producers.borrow_mut().delete(id);
                entry.handle.remove_consumer(self.id);
                continue;
            }
            entry.handle.check_for_actually_changed_value();
            if entry.handle.value_version() != entry.version {
                return true;
            }
        }
        false
    }

    /// Runs `calculate()` under a fresh `trackingVersion`, replacing
    /// this node's recorded producer set with whatever was actually
    /// read, then notifies consumers if the resulting value changed.
    fn recompute(self: &Rc<Self>) {
        self.tracking_version.set(self.tracking_version.get().succ());
        log::trace!(
            "recompute: node {:?} starting at tracking_version {:?}",
            self.id,
            self.tracking_version.get()
        );

        let recompute_guard = RecomputeGuard { inner: self.clone(), armed: true };
        *self.cache.borrow_mut() = CacheState::Computing;
        *self.producers.borrow_mut() = EdgeMap::new();
        // Cleared before `calculate()` runs so that any notification
        // arriving for an edge re-registered during this same pass (a
        // dependency read and then reentrantly mutated before this
        // call returns) flips it back to dirty and is detectable below.
        *self.stale.borrow_mut() = Stale::Clean;

        let self_as_consumer = self
            .self_as_consumer
            .borrow()
            .upgrade()
            .expect("a node recomputing itself must still be holding itself alive");
        let active_guard = ActiveConsumerGuard::install(self_as_consumer);

        let new_value = (self.calculate)();

        drop(active_guard);

        if !matches!(&*self.stale.borrow(), Stale::Clean) {
            drop(recompute_guard);
            panic::panic_any(EngineError::ChangedWhileCalculating);
        }

        let old_version = self.value_version.get();
        let changed = match &*self.cache.borrow() {
            CacheState::Value(old) => *old != new_value,
            _ => true,
        };
        *self.cache.borrow_mut() = CacheState::Value(new_value);
        recompute_guard.disarm();

        if changed {
            self.value_version.set(old_version.succ());
        }
        log::trace!(
            "recompute: node {:?} finished, value_version {:?} -> {:?}",
            self.id,
            old_version,
            self.value_version.get()
        );
        if changed {
            notify_consumers(self.id, &self.self_as_producer, &self.consumers);
        }
    }
}

/// Resets the cache to `Unset` unless calculation reaches normal
/// completion (spec.md §9 Open Question: recoverability after a failed
/// recompute). Installed before the active-consumer guard in
/// `recompute()` so that, on unwind, the active-consumer slot is
/// restored first and this reset runs second.
struct RecomputeGuard<T> {
    inner: Rc<ComputedNodeInner<T>>,
    armed: bool,
}

impl<T> RecomputeGuard<T> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<T> Drop for RecomputeGuard<T> {
    fn drop(&mut self) {
        if self.armed {
            *self.inner.cache.borrow_mut() = CacheState::Unset;
        }
    }
}

impl<T: PartialEq + Clone + 'static> DynProducer for ComputedNodeInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn value_version(&self) -> Version {
        self.value_version.get()
    }

    fn check_for_actually_changed_value(&self) {
        if let Some(rc) = self.self_weak.borrow().upgrade() {
            rc.resolve_staleness();
        }
    }

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

#[cfg(test)]
thread_local! {
    /// Counts every call to any node's `notify()`, regardless of type
    /// parameter. Used only to assert that a non-clean node does not
    /// re-walk its own consumer set on a second incoming notify.
    static NOTIFY_CALL_COUNT: Cell<u32> = Cell::new(0);
}

#[cfg(test)]
pub(crate) fn reset_notify_call_count() {
    NOTIFY_CALL_COUNT.with(|c| c.set(0));
}

#[cfg(test)]
pub(crate) fn notify_call_count() -> u32 {
    NOTIFY_CALL_COUNT.with(|c| c.get())
}

impl<T: PartialEq + Clone + 'static> DynConsumer for ComputedNodeInner<T> {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn tracking_version(&self) -> Version {
        self.tracking_version.get()
    }

    fn notify(self: Rc<Self>, source: Option<Rc<dyn DynProducer>>) {
        #[cfg(test)]
        NOTIFY_CALL_COUNT.with(|c| c.set(c.get() + 1));

        let mut stale = self.stale.borrow_mut();
        if !matches!(&*stale, Stale::Clean) {
            // Already stale (spec.md §4.2: "If already stale, return
            // (idempotent)"). Consumers were already fanned out to when
            // this node first left Clean; a second, independent
            // notifier degrades polling to the general path on its own
            // (`poll_with_hint` falls back to `poll_all`), so there is
            // nothing further to record or cascade here. Without this
            // early return, a node with fan-in > 1 re-walks its own
            // full consumer set on every incoming notify, turning a
            // layered DAG's O(edges) fan-out into O(W^depth).
            return;
        }
        *stale = match source {
            Some(source) => Stale::DirtySingleSource(source),
            None => Stale::DirtyUnknownSource,
        };
        drop(stale);
        notify_consumers(self.id, &self.self_as_producer, &self.consumers);
    }

    fn record_producer(&self, producer: Rc<dyn DynProducer>, producer_id: NodeId, value_version: Version) {
        self.producers.borrow_mut().set(producer_id, Entry { handle: producer, version: value_version });
    }

    fn remove_producer(&self, producer_id: NodeId) {
        self.producers.borrow_mut().delete(producer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueNode;
    use std::cell::Cell as StdCell;

    #[test]
    fn recomputes_lazily_on_first_read() {
        let calls = Rc::new(StdCell::new(0u32));
        let calls_clone = calls.clone();
        let computed = ComputedNode::new(move || {
            calls_clone.set(calls_clone.get() + 1);
            42
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(computed.value(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn caches_result_across_reads_with_no_changed_dependency() {
        let source = ValueNode::new(1);
        let calls = Rc::new(StdCell::new(0u32));
        let calls_clone = calls.clone();
        let source_clone = source.clone();
        let computed = ComputedNode::new(move || {
            calls_clone.set(calls_clone.get() + 1);
            source_clone.value() * 2
        });
        assert_eq!(computed.value(), 2);
        assert_eq!(computed.value(), 2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn recomputes_after_a_dependency_changes() {
        let source = ValueNode::new(1);
        let calls = Rc::new(StdCell::new(0u32));
        let calls_clone = calls.clone();
        let source_clone = source.clone();
        let computed = ComputedNode::new(move || {
            calls_clone.set(calls_clone.get() + 1);
            source_clone.value() * 2
        });
        assert_eq!(computed.value(), 2);
        source.set(5);
        assert_eq!(computed.value(), 10);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn does_not_recompute_when_dependency_is_set_to_same_value() {
        let source = ValueNode::new(1);
        let calls = Rc::new(StdCell::new(0u32));
        let calls_clone = calls.clone();
        let source_clone = source.clone();
        let computed = ComputedNode::new(move || {
            calls_clone.set(calls_clone.get() + 1);
            source_clone.value() * 2
        });
        assert_eq!(computed.value(), 2);
        source.set(1);
        assert_eq!(computed.value(), 2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn detects_a_self_referential_cycle() {
        let node: Rc<RefCell<Option<ComputedNode<i32>>>> = Rc::new(RefCell::new(None));
        let node_clone = node.clone();
        let computed = ComputedNode::new(move || node_clone.borrow().as_ref().unwrap().value());
        *node.borrow_mut() = Some(computed.clone());
        let result = computed.try_value();
        assert_eq!(result, Err(EngineError::Cycle));
    }

    #[test]
    fn recovers_after_a_failed_recompute() {
        let node: Rc<RefCell<Option<ComputedNode<i32>>>> = Rc::new(RefCell::new(None));
        let node_clone = node.clone();
        let fail = Rc::new(StdCell::new(true));
        let fail_clone = fail.clone();
        let computed = ComputedNode::new(move || {
            if fail_clone.get() {
                node_clone.borrow().as_ref().unwrap().value()
            } else {
                7
            }
        });
        *node.borrow_mut() = Some(computed.clone());
        assert_eq!(computed.try_value(), Err(EngineError::Cycle));
        fail.set(false);
        assert_eq!(computed.try_value(), Ok(7));
    }

    #[test]
    fn detects_a_dependency_mutated_reentrantly_during_its_own_calculation() {
        let source = ValueNode::new(1);
        let source_clone = source.clone();
        let computed = ComputedNode::new(move || {
            let v = source_clone.value();
            source_clone.set(v + 100);
            v
        });
        assert_eq!(computed.try_value(), Err(EngineError::ChangedWhileCalculating));
    }

    #[test]
    fn diamond_dependency_recomputes_once() {
        let source = ValueNode::new(1);
        let left_calls = Rc::new(StdCell::new(0u32));
        let right_calls = Rc::new(StdCell::new(0u32));
        let sink_calls = Rc::new(StdCell::new(0u32));

        let left = {
            let source = source.clone();
            let calls = left_calls.clone();
            ComputedNode::new(move || {
                calls.set(calls.get() + 1);
                source.value() + 1
            })
        };
        let right = {
            let source = source.clone();
            let calls = right_calls.clone();
            ComputedNode::new(move || {
                calls.set(calls.get() + 1);
                source.value() + 2
            })
        };
        let sink = {
            let left = left.clone();
            let right = right.clone();
            let calls = sink_calls.clone();
            ComputedNode::new(move || {
                calls.set(calls.get() + 1);
                left.value() + right.value()
            })
        };

        assert_eq!(sink.value(), 5);
        assert_eq!(sink.producer_count(), 2);
        assert_eq!(left.consumer_count(), 1);
        source.set(10);
        assert_eq!(sink.value(), 23);
        assert_eq!(left_calls.get(), 2);
        assert_eq!(right_calls.get(), 2);
        assert_eq!(sink_calls.get(), 2);
    }

    #[test]
    fn single_source_hint_falls_back_to_polling_other_producers() {
        // `sink` depends on two producers: `mid` (derived, changes
        // identity-stably) and `b` (a leaf never touched in this test).
        // `a.set` notifies `mid`, which cascades a single notify to
        // `sink` (stale = DirtySingleSource(mid)) before `mid` itself
        // has resolved whether it actually changed. By the time `sink`
        // polls, `mid`'s own recompute lands on an identical value (no
        // version bump) — the single-source shortcut alone must not
        // conclude "unchanged" here, since `sink` has more than one
        // recorded producer; it must fall through to check `b` too.
        let a = ValueNode::new(0i32);
        let b = ValueNode::new(5i32);
        let mid_calls = Rc::new(StdCell::new(0u32));
        let sink_calls = Rc::new(StdCell::new(0u32));

        let mid = {
            let a = a.clone();
            let calls = mid_calls.clone();
            ComputedNode::new(move || {
                calls.set(calls.get() + 1);
                a.value() % 2
            })
        };
        let sink = {
            let mid = mid.clone();
            let b = b.clone();
            let calls = sink_calls.clone();
            ComputedNode::new(move || {
                calls.set(calls.get() + 1);
                mid.value() + b.value()
            })
        };

        assert_eq!(sink.value(), 5);
        assert_eq!(sink.producer_count(), 2);
        assert_eq!(mid_calls.get(), 1);
        assert_eq!(sink_calls.get(), 1);

        // 0 -> 2 is a genuine change to `a`, but `a % 2` is unchanged,
        // so `mid` recomputes to an identity-equal value and does not
        // bump its own `valueVersion` — yet it still cascades one
        // notify to `sink` purely from having been notified itself.
        a.set(2);
        assert_eq!(sink.value(), 5);
        assert_eq!(mid_calls.get(), 2);
        assert_eq!(sink_calls.get(), 1, "sink must not recompute when neither producer actually changed");
    }

    #[test]
    fn notify_does_not_recascade_once_a_node_is_already_stale() {
        // leaf -> {c0,c1,c2} -> {d0,d1,d2} -> sink: each `d_i` has fan-in
        // 3. A single leaf write fires one `notify()` per edge if (and
        // only if) a node that is already non-clean returns without
        // re-walking its own consumers. A node that re-cascades on every
        // incoming notify would instead fire the `d_i -> sink` edge 3
        // times per `d_i` (9 total) instead of once each (3 total).
        let leaf = ValueNode::new(0i32);

        let layer1: Vec<ComputedNode<i32>> = (0..3)
            .map(|_| {
                let leaf = leaf.clone();
                ComputedNode::new(move || leaf.value())
            })
            .collect();

        let layer2: Vec<ComputedNode<i32>> = (0..3)
            .map(|_| {
                let layer1 = layer1.clone();
                ComputedNode::new(move || layer1.iter().map(|c| c.value()).sum())
            })
            .collect();

        let sink = {
            let layer2 = layer2.clone();
            ComputedNode::new(move || layer2.iter().map(|d| d.value()).sum())
        };

        assert_eq!(sink.value(), 0);

        reset_notify_call_count();
        leaf.set(5);

        // 3 leaf->layer1 edges + 9 layer1->layer2 edges + 3 layer2->sink
        // edges = 15 notify() calls total for this one write, one per
        // edge, if (and only if) an already-stale node never re-cascades.
        assert_eq!(notify_call_count(), 15);
        assert_eq!(sink.value(), 45);
    }

    #[test]
    fn poll_all_stops_at_the_first_changed_producer_without_checking_the_rest() {
        // `out` always reads `mid` first, then branches on `cond` to
        // read either `a` or `spy` — so `spy` is only a recorded
        // producer while `cond` is false, and is never touched again
        // once `cond` flips to true.
        //
        // Two writes land before the next read of `out`: `b.set` (which
        // cascades through `mid` and becomes `out`'s stale hint, since it
        // arrives first) and `spy_source.set` (idempotent no-op, `out`
        // is already non-clean). `cond.set` also lands, as an idempotent
        // no-op. On the next read, `mid`'s own recompute lands on an
        // identity-equal value, so the hint is inconclusive and `poll_all`
        // must scan `out`'s other recorded producers (`cond`, `spy`, in
        // that read order) — it must return as soon as it finds `cond`
        // changed, never forcing a recompute of `spy`, which this epoch's
        // `calculate()` won't even read.
        let b = ValueNode::new(4i32);
        let mid_calls = Rc::new(StdCell::new(0u32));
        let mid = {
            let b = b.clone();
            let calls = mid_calls.clone();
            ComputedNode::new(move || {
                calls.set(calls.get() + 1);
                b.value() % 2
            })
        };
        let cond = ValueNode::new(false);
        let a = ValueNode::new(1000i32);
        let spy_source = ValueNode::new(1i32);
        let spy_calls = Rc::new(StdCell::new(0u32));
        let spy = {
            let spy_source = spy_source.clone();
            let calls = spy_calls.clone();
            ComputedNode::new(move || {
                calls.set(calls.get() + 1);
                spy_source.value()
            })
        };

        let out = {
            let mid = mid.clone();
            let cond = cond.clone();
            let a = a.clone();
            let spy = spy.clone();
            ComputedNode::new(move || {
                let m = mid.value();
                if cond.value() {
                    m + a.value()
                } else {
                    m + spy.value()
                }
            })
        };

        assert_eq!(out.value(), 0 + 1);
        assert_eq!(out.producer_count(), 3);
        assert_eq!(spy_calls.get(), 1);

        b.set(6); // cascades through `mid`, becomes `out`'s stale hint
        cond.set(true); // `out` already non-clean: idempotent no-op
        spy_source.set(9); // cascades through `spy`, also idempotent no-op

        assert_eq!(out.value(), 0 + 1000);
        assert_eq!(mid_calls.get(), 2, "mid polls once to confirm it is identity-stable");
        assert_eq!(
            spy_calls.get(),
            1,
            "poll_all must stop at `cond` and never force-check `spy`, which this epoch never reads"
        );
    }
}

//! The ambient "which consumer is currently reading producers" slot.
//!
//! This is how dynamic dependency discovery works (spec.md §3 invariant
//! 6, §5): while a `ComputedNode` is inside its own `calculate()`, it
//! installs itself here, and every producer consults this slot when it
//! is read to decide whether to record an edge. Single-threaded, so a
//! plain thread-local cell is enough; there is no per-thread runtime
//! fork or snapshot concept to maintain.

use std::cell::RefCell;
use std::rc::Rc;

use crate::plumbing::{DynConsumer, DynProducer};

thread_local! {
    static ACTIVE_CONSUMER: RefCell<Option<Rc<dyn DynConsumer>>> = RefCell::new(None);
}

/// The consumer currently executing `calculate()`, if any.
fn active_consumer() -> Option<Rc<dyn DynConsumer>> {
    ACTIVE_CONSUMER.with(|slot| slot.borrow().clone())
}

/// Installs `consumer` as the active consumer for the lifetime of this
/// guard, restoring whatever was active before on drop (including on
/// unwind, which is how a panicking `calculate()` still leaves the slot
/// correctly restored for its caller).
pub(crate) struct ActiveConsumerGuard {
    previous: Option<Rc<dyn DynConsumer>>,
}

impl ActiveConsumerGuard {
    pub(crate) fn install(consumer: Rc<dyn DynConsumer>) -> Self {
        let previous = ACTIVE_CONSUMER.with(|slot| slot.replace(Some(consumer)));
        ActiveConsumerGuard { previous }
    }
}

impl Drop for ActiveConsumerGuard {
    fn drop(&mut self) {
        ACTIVE_CONSUMER.with(|slot| {
            *slot.borrow_mut() = self.previous.take();
        });
    }
}

/// Called whenever a producer is read. If a consumer is currently
/// calculating, records the bidirectional edge between them at the
/// consumer's current `trackingVersion` (spec.md §4.4).
pub(crate) fn producer_accessed(producer: &Rc<dyn DynProducer>) {
    let Some(consumer) = active_consumer() else {
        return;
    };
    let tracking_version = consumer.tracking_version();
    let consumer_id = consumer.node_id();
    let producer_id = producer.node_id();
    let value_version = producer.value_version();

    producer.register_consumer(Rc::downgrade(&consumer), consumer_id, tracking_version);
    consumer.record_producer(producer.clone(), producer_id, value_version);
}

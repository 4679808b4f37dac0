//! Internal object-safe contracts that erase `ValueNode<T>` and
//! `ComputedNode<T>` down to their Producer/Consumer roles.
//!
//! Items here are exempt from any stability guarantee the rest of the
//! crate carries; nothing in this module is re-exported.

use std::rc::Rc;
use std::rc::Weak;

use crate::id::NodeId;
use crate::version::Version;

/// Anything that can be read and carries a `valueVersion`.
pub(crate) trait DynProducer {
    fn node_id(&self) -> NodeId;

    fn value_version(&self) -> Version;

    /// For leaves, a no-op. For computed nodes, resolves staleness:
    /// polls recorded dependencies and recomputes if needed.
    fn check_for_actually_changed_value(&self);

    /// Records that `consumer` read this producer while at
    /// `tracking_version`. Overwrites any prior entry for the same
    /// consumer.
    fn register_consumer(
        &self,
        consumer: Weak<dyn DynConsumer>,
        consumer_id: NodeId,
        tracking_version: Version,
    );

    /// The `trackingVersion` this producer last recorded for
    /// `consumer_id`, if any edge to it still exists.
    fn consumer_tracking_version_for(&self, consumer_id: NodeId) -> Option<Version>;

    fn remove_consumer(&self, consumer_id: NodeId);
}

/// Anything that reads other producers and carries a
/// `trackingVersion`.
pub(crate) trait DynConsumer {
    fn node_id(&self) -> NodeId;

    fn tracking_version(&self) -> Version;

    /// Informs this consumer that an upstream producer may have
    /// changed. `source`, when present, is the specific producer that
    /// notified (enables the single-source polling shortcut).
    ///
    /// Takes `Rc<Self>` because the fan-out in `edge::notify_consumers`
    /// only ever holds an upgraded, type-erased `Rc<dyn DynConsumer>`.
    fn notify(self: Rc<Self>, source: Option<Rc<dyn DynProducer>>);

    /// Records that this consumer read `producer` and observed
    /// `value_version`. Overwrites any prior entry for the same
    /// producer.
    fn record_producer(&self, producer: Rc<dyn DynProducer>, producer_id: NodeId, value_version: Version);

    fn remove_producer(&self, producer_id: NodeId);
}

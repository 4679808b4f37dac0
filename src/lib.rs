#![warn(rust_2018_idioms)]
#![warn(missing_docs)]

//! `weft` is a single-threaded incremental computation graph: a small
//! number of directly-settable leaf values ([`ValueNode`]), and
//! derived, lazily recomputed values built on top of them and of each
//! other ([`ComputedNode`]).
//!
//! Reading a node never forces work beyond the minimum needed to bring
//! it up to date: a computed node polls the `valueVersion` of whatever
//! it previously read before deciding whether to actually re-run its
//! calculation, and that polling recurses lazily through the graph one
//! read at a time rather than eagerly recomputing everything that
//! might be affected.
//!
//! ```
//! use weft::{ComputedNode, ValueNode};
//!
//! let width = ValueNode::new(3);
//! let height = ValueNode::new(4);
//! let area = {
//!     let width = width.clone();
//!     let height = height.clone();
//!     ComputedNode::new(move || width.value() * height.value())
//! };
//!
//! assert_eq!(area.value(), 12);
//! width.set(10);
//! assert_eq!(area.value(), 40);
//! ```

mod computed;
mod edge;
mod error;
mod id;
mod version;
mod value;

/// Internal object-safe contracts that erase [`ValueNode`] and
/// [`ComputedNode`] down to their producer/consumer roles. Exempt from
/// any stability guarantee the rest of the crate carries.
mod plumbing;
mod runtime;

pub use crate::computed::ComputedNode;
pub use crate::error::EngineError;
pub use crate::value::ValueNode;

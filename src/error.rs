use std::fmt;

/// The two failure kinds the engine can raise, surfaced at the public
/// boundary (see [`crate::ComputedNode::try_value`]).
///
/// Everything else the engine discovers mid-flight — a reclaimed weak
/// handle, a missing or stale edge, a version mismatch — is ordinary
/// control flow and is repaired silently; it never produces an
/// `EngineError`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EngineError {
    /// A computed node read itself, transitively, during its own
    /// `calculate()`.
    Cycle,
    /// A dependency changed while this node was still in the middle of
    /// calculating its own value — typically a `calculate()` that
    /// mutates one of its own (or a sibling's) dependencies.
    ChangedWhileCalculating,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Cycle => write!(
                f,
                "cycle detected: a computed node read itself, transitively, during its own calculation"
            ),
            EngineError::ChangedWhileCalculating => write!(
                f,
                "a dependency changed while this node was still calculating its own value"
            ),
        }
    }
}

impl std::error::Error for EngineError {}

//! Modifier count sources.
//!
//! A modifier's effective count can be driven by an external quantity
//! ("apply once per owned copy", "apply once per 10 strength"). A
//! `SourceRef` names that quantity, either a plain constant or a live
//! node in a [`ModGraph`](crate::ModGraph), and a `SourceResolver`
//! turns the reference into a number at recalc time.

use crate::graph::NodeId;

/// Reference to the external quantity backing a modifier's count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceRef {
    /// A fixed numeric source.
    Const(f64),
    /// A live node in the target graph, read at resolution time.
    Node(NodeId),
}

/// Resolve a [`SourceRef`] to its current numeric value.
///
/// [`ModGraph`](crate::ModGraph) implements this by reading the
/// referenced node; [`NullResolver`] is for standalone `Stat`/`Mod`
/// use where no graph exists.
pub trait SourceResolver {
    /// Current numeric value of `source`.
    fn value_of(&self, source: &SourceRef) -> f64;
}

/// Resolver for detached use: constants resolve to themselves, node
/// references resolve to 0.
///
/// # Examples
///
/// ```rust
/// use modtree::source::{NullResolver, SourceRef, SourceResolver};
///
/// assert_eq!(NullResolver.value_of(&SourceRef::Const(3.0)), 3.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl SourceResolver for NullResolver {
    fn value_of(&self, source: &SourceRef) -> f64 {
        match source {
            SourceRef::Const(v) => *v,
            SourceRef::Node(_) => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_resolver() {
        assert_eq!(NullResolver.value_of(&SourceRef::Const(25.0)), 25.0);
        assert_eq!(NullResolver.value_of(&SourceRef::Node(NodeId(7))), 0.0);
    }
}

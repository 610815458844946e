//! Error types for modifier parsing and application.
//!
//! Application-time conditions (`Parse`, `UnwritableTarget`,
//! `UnknownShape`) are non-fatal inside a recursive walk: the engine
//! reports them and keeps processing sibling keys, leaving the failed
//! branch unmodified. Only `Cycle` aborts an `apply_mods` call.

use crate::path::ModPath;
use thiserror::Error;

/// Errors that can occur while parsing or applying modifiers.
///
/// # Examples
///
/// ```rust
/// use modtree::{ModError, ModPath};
///
/// let err = ModError::UnwritableTarget(ModPath::new("hp.max"));
/// println!("{}", err); // "target not writable: hp.max"
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModError {
    /// A modifier string did not match the `[sign]num[[sign]num%]` form.
    #[error("malformed modifier string: {0:?}")]
    Parse(String),

    /// Materializing a new value holder was refused by the write policy.
    #[error("target not writable: {0}")]
    UnwritableTarget(ModPath),

    /// A modifier or target shape matched none of the recognized cases.
    #[error("unknown modifier shape at {path}: {detail}")]
    UnknownShape {
        /// Where in the target tree the shape was encountered.
        path: ModPath,
        /// What was found there.
        detail: String,
    },

    /// The recursion budget was exhausted.
    ///
    /// Description trees are owned values and cannot be cyclic, but a
    /// pathologically deep tree would otherwise overflow the stack; the
    /// engine fails with this error instead.
    #[error("recursion limit ({depth}) exceeded at {path}; cyclic or pathological modifier tree")]
    Cycle {
        /// The deepest path reached before giving up.
        path: ModPath,
        /// The depth budget that was exhausted.
        depth: usize,
    },
}

//! Write policies for holder materialization.
//!
//! Before the apply engine materializes a new value holder at an absent
//! property, it consults a `WritePolicy`, the guard that keeps modifier
//! descriptions from stamping over reserved or computed properties.

use crate::path::ModPath;
use std::collections::HashSet;

/// Decides whether a new value holder may be created at `key` under the
/// branch at `path`.
pub trait WritePolicy {
    /// `true` if the absent→materialized transition is allowed.
    fn can_write(&self, path: &ModPath, key: &str) -> bool;
}

/// Policy that allows every materialization. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl WritePolicy for AllowAll {
    fn can_write(&self, _path: &ModPath, _key: &str) -> bool {
        true
    }
}

/// Policy that refuses a fixed set of property names anywhere in the
/// tree.
///
/// # Examples
///
/// ```rust
/// use modtree::policy::{ReservedKeys, WritePolicy};
/// use modtree::ModPath;
///
/// let policy = ReservedKeys::new(["id", "template"]);
/// assert!(!policy.can_write(&ModPath::new("sword"), "id"));
/// assert!(policy.can_write(&ModPath::new("sword"), "dmg"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReservedKeys {
    keys: HashSet<String>,
}

impl ReservedKeys {
    /// Build a policy denying each of `keys`.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl WritePolicy for ReservedKeys {
    fn can_write(&self, _path: &ModPath, key: &str) -> bool {
        !self.keys.contains(key)
    }
}

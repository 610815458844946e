//! Modifier path identifiers.
//!
//! Provides the `ModPath` type, an interned dotted-path identifier used
//! both as the stacking key inside modifier maps and as a diagnostic
//! label (e.g. `"sword.attack.dmg"`). Uses `Arc<str>` so clones are cheap
//! and comparison is fast.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Identifier given to modifiers that were created without one.
///
/// Anonymous modifiers all stack under this single key, so two unnamed
/// modifiers overwrite each other unless the caller assigns distinct ids.
pub const DEFAULT_MOD: &str = "all";

/// Interned dotted-path identifier.
///
/// A `ModPath` is never required to be globally unique, only unique
/// within the modifier map it is stored under. It is the stacking key
/// that makes a re-applied modifier overwrite its prior instance.
///
/// # Examples
///
/// ```rust
/// use modtree::ModPath;
///
/// let sword = ModPath::new("sword");
/// let dmg = sword.child("attack").child("dmg");
/// assert_eq!(dmg.as_str(), "sword.attack.dmg");
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModPath(Arc<str>);

impl ModPath {
    /// Create a new `ModPath` from a string slice.
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// The path for an anonymous modifier (see [`DEFAULT_MOD`]).
    pub fn anonymous() -> Self {
        Self::new(DEFAULT_MOD)
    }

    /// Build a child path by appending `key` with a dot separator.
    ///
    /// An empty parent produces just `key`.
    pub fn child(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self::new(key)
        } else {
            Self(Arc::from(format!("{}.{}", self.0, key)))
        }
    }

    /// Get the string representation of this path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this path is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for ModPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ModPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ModPath::from(s))
    }
}

impl From<&str> for ModPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ModPath {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl std::fmt::Display for ModPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_creation() {
        let a = ModPath::new("hp");
        let b = ModPath::new("hp");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "hp");
    }

    #[test]
    fn test_child_paths() {
        let root = ModPath::new("sword");
        let leaf = root.child("attack").child("dmg");
        assert_eq!(leaf.as_str(), "sword.attack.dmg");

        let empty = ModPath::new("");
        assert_eq!(empty.child("hp").as_str(), "hp");
    }

    #[test]
    fn test_anonymous() {
        assert_eq!(ModPath::anonymous().as_str(), DEFAULT_MOD);
    }

    #[test]
    fn test_serde_round_trip() {
        let p = ModPath::new("a.b.c");
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, "\"a.b.c\"");
        let back: ModPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}

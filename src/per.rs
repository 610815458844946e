//! Threshold modifiers.
//!
//! A `PerMod` grants `value` once per `per` units of its source
//! quantity, with the bonus landing only on exact multiples. Wire form
//! is the compact `"value:per"` string.

use crate::error::ModError;
use crate::path::ModPath;
use crate::source::{SourceRef, SourceResolver};
use serde::{Serialize, Serializer};

use crate::modifier::precise;

fn is_plain_number(s: &str) -> bool {
    !s.contains(['+', '-']) && s.parse::<f64>().is_ok()
}

/// A `value` granted once per `per` units of a source quantity.
///
/// `count = floor(source / per)`; the pulse amount `get_apply` is
/// `count * value` only when the source sits exactly on a multiple of
/// `per`, and 0 otherwise. Unlike a plain [`Mod`](crate::Mod), a
/// `PerMod` without a source contributes nothing.
///
/// # Examples
///
/// ```rust
/// use modtree::{ModPath, PerMod};
/// use modtree::source::{NullResolver, SourceRef};
///
/// let p = PerMod::parse("5:10", ModPath::new("level.hp"))
///     .unwrap()
///     .with_source(SourceRef::Const(25.0));
/// assert_eq!(p.count(&NullResolver), 2.0);
/// assert_eq!(p.get_apply(&NullResolver), 0.0); // 25 is not a multiple of 10
/// ```
#[derive(Debug, Clone)]
pub struct PerMod {
    id: ModPath,
    value: f64,
    per: f64,
    source: Option<SourceRef>,
}

impl PerMod {
    /// A threshold modifier granting `value` per `per` source units.
    pub fn new(id: impl Into<ModPath>, value: f64, per: f64) -> Self {
        let id = id.into();
        let id = if id.is_empty() {
            ModPath::anonymous()
        } else {
            id
        };
        Self {
            id,
            value,
            per,
            source: None,
        }
    }

    /// Whether `text` has the `"value:per"` shape (both sides optional
    /// unsigned numbers).
    pub fn is_per(text: &str) -> bool {
        let mut parts = text.splitn(2, ':');
        match (parts.next(), parts.next()) {
            (Some(value), Some(per)) => {
                (value.is_empty() || is_plain_number(value))
                    && (per.is_empty() || is_plain_number(per))
            }
            _ => false,
        }
    }

    /// Parse the `"value:per"` wire form; either side defaults to 1.
    pub fn parse(text: &str, id: impl Into<ModPath>) -> Result<Self, ModError> {
        if !Self::is_per(text) {
            return Err(ModError::Parse(text.to_owned()));
        }
        let mut parts = text.splitn(2, ':');
        let value = parts.next().unwrap_or("");
        let per = parts.next().unwrap_or("");
        let value = if value.is_empty() {
            1.0
        } else {
            value
                .parse::<f64>()
                .map_err(|_| ModError::Parse(text.to_owned()))?
        };
        let per = if per.is_empty() {
            1.0
        } else {
            per.parse::<f64>()
                .map_err(|_| ModError::Parse(text.to_owned()))?
        };
        Ok(Self::new(id, value, per))
    }

    /// Set the source quantity (builder form).
    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn id(&self) -> &ModPath {
        &self.id
    }

    pub fn set_id(&mut self, id: ModPath) {
        self.id = if id.is_empty() {
            ModPath::anonymous()
        } else {
            id
        };
    }

    /// Amount granted per threshold crossing.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Source units required per grant.
    pub fn per(&self) -> f64 {
        self.per
    }

    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Option<SourceRef>) {
        self.source = source;
    }

    /// Completed thresholds: `floor(source / per)`, 0 without a source.
    pub fn count(&self, resolver: &dyn SourceResolver) -> f64 {
        match &self.source {
            Some(source) => (resolver.value_of(source) / self.per).floor(),
            None => 0.0,
        }
    }

    /// Pulse amount: `count * value` when the source sits exactly on a
    /// multiple of `per`, else 0.
    pub fn get_apply(&self, resolver: &dyn SourceResolver) -> f64 {
        match &self.source {
            Some(source) => {
                let src = resolver.value_of(source);
                if src % self.per == 0.0 {
                    (src / self.per).floor() * self.value
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    /// Total flat contribution when stacked on a stat.
    pub fn count_bonus(&self, resolver: &dyn SourceResolver) -> f64 {
        self.value * self.count(resolver)
    }

    /// A standalone copy. The live source is kept: a threshold modifier
    /// is meaningless without one.
    pub fn instantiate(&self) -> PerMod {
        self.clone()
    }
}

/// Wire form `"<value>:<per>"`; round-trips through [`PerMod::parse`].
impl Serialize for PerMod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}:{}", precise(self.value), precise(self.per)))
    }
}

impl std::fmt::Display for PerMod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", precise(self.value), precise(self.per))
    }
}

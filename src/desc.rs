//! Modifier descriptions.
//!
//! A `ModDesc` is the parsed, owned form of a JSON modifier block: the
//! declarative "what this thing does to its target" data attached to
//! items, upgrades, and events. Leaves are numbers, booleans, or typed
//! modifiers; interior nodes are string-keyed maps whose keys mirror
//! the target tree.

use crate::error::ModError;
use crate::modifier::Mod;
use crate::path::ModPath;
use crate::per::PerMod;
use crate::source::SourceRef;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// One node of a parsed modifier description tree.
#[derive(Debug, Clone)]
pub enum ModDesc {
    /// Bare number: folded into the target's base, scaled by `amt`.
    Number(f64),
    /// Boolean toggle for flag targets.
    Bool(bool),
    /// Stackable flat/percent modifier.
    Mod(Mod),
    /// Stackable threshold modifier.
    Per(PerMod),
    /// Interior node keyed like the target tree.
    Map(BTreeMap<String, ModDesc>),
}

impl ModDesc {
    /// Parse a JSON modifier block rooted at `path`.
    ///
    /// Strings in `"value:per"` shape become threshold modifiers, all
    /// other strings go through [`Mod::parse`], and malformed strings
    /// surface as [`ModError::Parse`]. Typed leaves take the path they
    /// sit at as their stacking id, so two items parsed under different
    /// roots stack independently.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modtree::{ModDesc, ModPath};
    ///
    /// let desc = ModDesc::parse(
    ///     &serde_json::json!({ "hp": "5+10%", "regen": ":10" }),
    ///     &ModPath::new("ring"),
    /// ).unwrap();
    /// assert!(matches!(desc.get("hp"), Some(ModDesc::Mod(_))));
    /// assert!(matches!(desc.get("regen"), Some(ModDesc::Per(_))));
    /// ```
    pub fn parse(value: &Value, path: &ModPath) -> Result<Self, ModError> {
        match value {
            Value::Number(n) => Ok(ModDesc::Number(n.as_f64().unwrap_or(0.0))),
            Value::Bool(b) => Ok(ModDesc::Bool(*b)),
            Value::String(s) => {
                if PerMod::is_per(s) {
                    Ok(ModDesc::Per(PerMod::parse(s, path.clone())?))
                } else {
                    Ok(ModDesc::Mod(Mod::parse(s, path.clone())?))
                }
            }
            Value::Object(map) => {
                let mut out = BTreeMap::new();
                for (key, sub) in map {
                    out.insert(key.clone(), ModDesc::parse(sub, &path.child(key))?);
                }
                Ok(ModDesc::Map(out))
            }
            other => Err(ModError::UnknownShape {
                path: path.clone(),
                detail: format!("unsupported description value: {}", other),
            }),
        }
    }

    /// Child lookup on a map node.
    pub fn get(&self, key: &str) -> Option<&ModDesc> {
        match self {
            ModDesc::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// An empty map describes nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, ModDesc::Map(map) if map.is_empty())
    }

    /// Set an explicit count on every typed modifier in the tree.
    ///
    /// Used when the owning source has a known multiplicity at parse
    /// time. Threshold modifiers keep their source-driven count.
    pub fn set_counts(&mut self, count: f64) {
        match self {
            ModDesc::Mod(m) => m.set_count(Some(count)),
            ModDesc::Map(map) => {
                for sub in map.values_mut() {
                    sub.set_counts(count);
                }
            }
            _ => {}
        }
    }

    /// Re-key every typed modifier in the tree to `id`.
    ///
    /// Collapses the tree onto a single stacking identity, typically
    /// the owning item's id.
    pub fn set_ids(&mut self, id: &ModPath) {
        match self {
            ModDesc::Mod(m) => m.set_id(id.clone()),
            ModDesc::Per(p) => p.set_id(id.clone()),
            ModDesc::Map(map) => {
                for sub in map.values_mut() {
                    sub.set_ids(id);
                }
            }
            _ => {}
        }
    }

    /// Build a [`Mod`] from a map of field leaves (`base`, `basePct`,
    /// `count`, or a nested compact string under `str`/`value`).
    ///
    /// This is how an inline map like `{"base": -150}` lands on a
    /// reactive target: as one stackable modifier keyed by the target's
    /// path. Unrecognized fields are skipped with a debug note.
    pub fn build_mod(&self, id: ModPath, source: Option<SourceRef>) -> Option<Mod> {
        let ModDesc::Map(map) = self else {
            return None;
        };
        let mut m = Mod::new(id);
        m.set_source(source);
        for (key, field) in map {
            match (key.as_str(), field) {
                ("base", ModDesc::Number(n)) => m.set_base(*n),
                ("basePct", ModDesc::Number(n)) => m.set_base_pct(*n),
                ("count", ModDesc::Number(n)) => m.set_count(Some(*n)),
                ("str" | "value", ModDesc::Mod(parsed)) => {
                    m.set_base(parsed.base());
                    m.set_base_pct(parsed.base_pct());
                }
                ("str" | "value", ModDesc::Number(n)) => m.set_base(*n),
                _ => {
                    debug!(key, "ignoring unrecognized mod field");
                }
            }
        }
        Some(m)
    }
}

impl From<f64> for ModDesc {
    fn from(n: f64) -> Self {
        ModDesc::Number(n)
    }
}

impl From<bool> for ModDesc {
    fn from(b: bool) -> Self {
        ModDesc::Bool(b)
    }
}

impl From<Mod> for ModDesc {
    fn from(m: Mod) -> Self {
        ModDesc::Mod(m)
    }
}

impl From<PerMod> for ModDesc {
    fn from(p: PerMod) -> Self {
        ModDesc::Per(p)
    }
}

/// Serializes back to the natural JSON forms: numbers and booleans as
/// themselves, typed modifiers via their compact wire strings, maps as
/// objects.
impl Serialize for ModDesc {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ModDesc::Number(n) => serializer.serialize_f64(*n),
            ModDesc::Bool(b) => serializer.serialize_bool(*b),
            ModDesc::Mod(m) => m.serialize(serializer),
            ModDesc::Per(p) => p.serialize(serializer),
            ModDesc::Map(map) => {
                let mut state = serializer.serialize_map(Some(map.len()))?;
                for (key, sub) in map {
                    state.serialize_entry(key, sub)?;
                }
                state.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leaf_kinds() {
        let root = ModPath::new("item");
        assert!(matches!(
            ModDesc::parse(&json!(5), &root).unwrap(),
            ModDesc::Number(n) if n == 5.0
        ));
        assert!(matches!(
            ModDesc::parse(&json!(true), &root).unwrap(),
            ModDesc::Bool(true)
        ));
        assert!(matches!(
            ModDesc::parse(&json!("5+10%"), &root).unwrap(),
            ModDesc::Mod(_)
        ));
        assert!(matches!(
            ModDesc::parse(&json!("5:10"), &root).unwrap(),
            ModDesc::Per(_)
        ));
    }

    #[test]
    fn test_parse_assigns_path_ids() {
        let desc = ModDesc::parse(&json!({ "hp": { "max": "5" } }), &ModPath::new("ring")).unwrap();
        let Some(hp) = desc.get("hp") else {
            panic!("expected map under hp");
        };
        let Some(ModDesc::Mod(m)) = hp.get("max") else {
            panic!("expected mod under hp.max");
        };
        assert_eq!(m.id().as_str(), "ring.hp.max");
    }

    #[test]
    fn test_parse_rejects_malformed_string() {
        let err = ModDesc::parse(&json!({ "hp": "banana" }), &ModPath::new("x"));
        assert!(matches!(err, Err(ModError::Parse(_))));
    }

    #[test]
    fn test_parse_rejects_arrays() {
        let err = ModDesc::parse(&json!([1, 2]), &ModPath::new("x"));
        assert!(matches!(err, Err(ModError::UnknownShape { .. })));
    }

    #[test]
    fn test_set_counts_and_ids() {
        let mut desc =
            ModDesc::parse(&json!({ "hp": "5", "mana": "10%" }), &ModPath::new("ring")).unwrap();
        desc.set_counts(3.0);
        desc.set_ids(&ModPath::new("ring#1"));
        for key in ["hp", "mana"] {
            let Some(ModDesc::Mod(m)) = desc.get(key) else {
                panic!("expected mod under {key}");
            };
            assert_eq!(m.explicit_count(), Some(3.0));
            assert_eq!(m.id().as_str(), "ring#1");
        }
    }

    #[test]
    fn test_build_mod_from_fields() {
        let desc = ModDesc::parse(&json!({ "base": -150.0, "basePct": 0.1 }), &ModPath::new("x"))
            .unwrap();
        let m = desc.build_mod(ModPath::new("player.hp"), None).unwrap();
        assert_eq!(m.base(), -150.0);
        assert_eq!(m.base_pct(), 0.1);
        assert_eq!(m.id().as_str(), "player.hp");
    }

    #[test]
    fn test_serialize_round_trip() {
        let src = json!({ "hp": "5+10%", "regen": "1:10", "locked": true, "gold": 3.0 });
        let desc = ModDesc::parse(&src, &ModPath::new("item")).unwrap();
        assert_eq!(serde_json::to_value(&desc).unwrap(), src);
    }

    #[test]
    fn test_is_empty() {
        assert!(ModDesc::Map(BTreeMap::new()).is_empty());
        assert!(!ModDesc::Number(0.0).is_empty());
        assert!(!ModDesc::parse(&json!({ "hp": 1 }), &ModPath::new("x"))
            .unwrap()
            .is_empty());
    }
}

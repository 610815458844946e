//! Modifiers.
//!
//! A `Mod` is one named modifier: a flat component, a percentage
//! component, and a count saying how many instances are active. Mods are
//! themselves modifiable (mods-on-mods), so a modifier's effective
//! strength can itself be buffed.
//!
//! Mods parse from compact strings (`"5"`, `"+10%"`, `"5+10%"`) and
//! serialize back to the same lossy wire form.

use crate::error::ModError;
use crate::path::{ModPath, DEFAULT_MOD};
use crate::source::{SourceRef, SourceResolver};
use crate::stat::StackedMod;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing::debug;

/// Format a value for the wire/display forms, trimming float noise
/// (`0.1 * 100` prints as `10`, not `10.000000000000002`).
pub(crate) fn precise(v: f64) -> String {
    let rounded = (v * 1e8).round() / 1e8;
    format!("{}", rounded)
}

/// Take a leading `[+-]?digits[.digits]` number off `s`.
///
/// Returns the byte length consumed and the parsed value.
fn split_number(s: &str) -> Option<(usize, f64)> {
    let b = s.as_bytes();
    let mut i = 0;
    if i < b.len() && (b[i] == b'+' || b[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < b.len() && b[i].is_ascii_digit() {
        i += 1;
    }
    let mut has_digits = i > int_start;
    if i < b.len() && b[i] == b'.' {
        let dot = i;
        i += 1;
        let frac_start = i;
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i > frac_start {
            has_digits = true;
        } else {
            // lone trailing dot is not part of the number
            i = dot;
        }
    }
    if !has_digits {
        return None;
    }
    s[..i].parse::<f64>().ok().map(|v| (i, v))
}

/// A named flat + percentage modifier.
///
/// Derived quantities:
/// - `bonus = (base + m_base) * (1 + m_pct)`
/// - `pct_tot = (1 + base_pct) * (1 + m_pct) - 1`
/// - `count_bonus = bonus * count`, `count_pct = pct_tot * count`
///
/// where `m_base`/`m_pct` aggregate any mods applied *to this mod*, and
/// `count` is the explicit count if set, else the resolved source value,
/// else 1 (a modifier applies once by default).
///
/// # Examples
///
/// ```rust
/// use modtree::{Mod, ModPath};
/// use modtree::source::NullResolver;
///
/// let m = Mod::parse("5+10%", ModPath::new("ring.hp")).unwrap();
/// assert_eq!(m.base(), 5.0);
/// assert_eq!(m.base_pct(), 0.10);
/// assert_eq!(m.count_bonus(&NullResolver), 5.0);
/// ```
#[derive(Debug, Clone)]
pub struct Mod {
    id: ModPath,
    base: f64,
    base_pct: f64,
    count: Option<f64>,
    source: Option<SourceRef>,
    m_base: f64,
    m_pct: f64,
    mods: HashMap<ModPath, Option<StackedMod>>,
}

impl Mod {
    /// Create a zeroed modifier under `id`.
    pub fn new(id: impl Into<ModPath>) -> Self {
        let id = id.into();
        let id = if id.is_empty() {
            ModPath::anonymous()
        } else {
            id
        };
        Self {
            id,
            base: 0.0,
            base_pct: 0.0,
            count: None,
            source: None,
            m_base: 0.0,
            m_pct: 0.0,
            mods: HashMap::new(),
        }
    }

    /// A flat-only modifier.
    pub fn flat(id: impl Into<ModPath>, base: f64) -> Self {
        let mut m = Self::new(id);
        m.base = base;
        m
    }

    /// A percent-only modifier; `pct` is a decimal (0.10 = +10%).
    pub fn percent(id: impl Into<ModPath>, pct: f64) -> Self {
        let mut m = Self::new(id);
        m.base_pct = pct;
        m
    }

    /// Parse a compact modifier string: `[sign]num`, `[sign]num%`, or
    /// `[sign]num[sign]num%`.
    ///
    /// The first number is the flat component; the `%`-suffixed number is
    /// the percent component as a fraction of 100. Malformed input is a
    /// surfaced [`ModError::Parse`], never a silent default.
    pub fn parse(text: &str, id: impl Into<ModPath>) -> Result<Self, ModError> {
        let t = text.trim();
        let mut base = None;
        let mut pct = None;
        let mut rest = t;
        if let Some((n, v)) = split_number(rest) {
            let after = &rest[n..];
            if let Some(stripped) = after.strip_prefix('%') {
                pct = Some(v);
                rest = stripped;
            } else {
                base = Some(v);
                rest = after;
                if let Some((n2, v2)) = split_number(rest) {
                    match rest[n2..].strip_prefix('%') {
                        Some(stripped) => {
                            pct = Some(v2);
                            rest = stripped;
                        }
                        None => return Err(ModError::Parse(text.to_owned())),
                    }
                }
            }
        }
        if !rest.is_empty() {
            return Err(ModError::Parse(text.to_owned()));
        }
        let mut m = Self::new(id);
        m.base = base.unwrap_or(0.0);
        m.base_pct = pct.unwrap_or(0.0) / 100.0;
        Ok(m)
    }

    /// Set an explicit count (builder form).
    pub fn with_count(mut self, count: f64) -> Self {
        self.count = Some(count);
        self
    }

    /// Set the count source (builder form).
    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.source = Some(source);
        self
    }

    /// Stacking identity of this modifier.
    pub fn id(&self) -> &ModPath {
        &self.id
    }

    /// Re-key this modifier.
    pub fn set_id(&mut self, id: ModPath) {
        self.id = if id.is_empty() {
            ModPath::anonymous()
        } else {
            id
        };
    }

    /// Flat component.
    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn set_base(&mut self, base: f64) {
        self.base = base;
    }

    /// Percent component as a decimal.
    pub fn base_pct(&self) -> f64 {
        self.base_pct
    }

    pub fn set_base_pct(&mut self, pct: f64) {
        self.base_pct = pct;
    }

    /// Explicit count, if any.
    pub fn explicit_count(&self) -> Option<f64> {
        self.count
    }

    pub fn set_count(&mut self, count: Option<f64>) {
        self.count = count;
    }

    /// Count source, if any.
    pub fn source(&self) -> Option<&SourceRef> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, source: Option<SourceRef>) {
        self.source = source;
    }

    /// Flat bonus after mods applied to this mod. The percent component
    /// is excluded: it acts on the *target* of the mod.
    pub fn bonus(&self) -> f64 {
        (self.base + self.m_base) * (1.0 + self.m_pct)
    }

    /// Modified percent bonus of this mod.
    pub fn pct_tot(&self) -> f64 {
        (1.0 + self.base_pct) * (1.0 + self.m_pct) - 1.0
    }

    /// Effective number of times this mod is applied.
    pub fn count(&self, resolver: &dyn SourceResolver) -> f64 {
        if let Some(c) = self.count {
            return c;
        }
        match &self.source {
            Some(source) => resolver.value_of(source),
            None => {
                debug!(id = %self.id, "mod has no count or source; applying once");
                1.0
            }
        }
    }

    /// Flat bonus times the number of applications.
    pub fn count_bonus(&self, resolver: &dyn SourceResolver) -> f64 {
        self.bonus() * self.count(resolver)
    }

    /// Percent bonus times the number of applications.
    pub fn count_pct(&self, resolver: &dyn SourceResolver) -> f64 {
        self.pct_tot() * self.count(resolver)
    }

    /// Stack a modifier onto this modifier (mods-on-mods). Accepts the
    /// same modifier kinds a stat does.
    ///
    /// A mod sharing the incoming id is overwritten, not accumulated,
    /// and aggregates are recomputed either way.
    pub fn add_mod(&mut self, m: impl Into<StackedMod>, resolver: &dyn SourceResolver) {
        let m = m.into();
        self.mods.insert(m.id().clone(), Some(m));
        self.recalc(resolver);
    }

    /// Tombstone the mod stored under `id`; no-op if never present.
    pub fn remove_mods(&mut self, id: &ModPath, resolver: &dyn SourceResolver) {
        if !matches!(self.mods.get(id), Some(Some(_))) {
            return;
        }
        self.mods.insert(id.clone(), None);
        self.recalc(resolver);
    }

    /// Recompute the aggregate bonus and percent over present sub-mods.
    pub fn recalc(&mut self, resolver: &dyn SourceResolver) {
        let mut bonus = 0.0;
        let mut pct = 0.0;
        for m in self.mods.values().flatten() {
            bonus += m.count_bonus(resolver);
            pct += m.count_pct(resolver);
        }
        self.m_base = bonus;
        self.m_pct = pct;
    }

    /// Whether this mod carries the shared anonymous id.
    pub fn is_anonymous(&self) -> bool {
        self.id.as_str() == DEFAULT_MOD
    }

    /// Freeze the current derived totals into a detached standalone copy
    /// under the same id: `base` becomes today's `bonus`, `base_pct`
    /// today's `pct_tot`, and the live source is replaced by its resolved
    /// count.
    pub fn instantiate(&self, resolver: &dyn SourceResolver) -> Mod {
        Mod {
            id: self.id.clone(),
            base: self.bonus(),
            base_pct: self.pct_tot(),
            count: self
                .source
                .as_ref()
                .map(|s| resolver.value_of(s))
                .or(self.count),
            source: None,
            m_base: 0.0,
            m_pct: 0.0,
            mods: HashMap::new(),
        }
    }
}

/// Lossy wire form: a bare number when there is no percent component,
/// else the compact `"<base><sign><pct*100>%"` string. Round-trips
/// through [`Mod::parse`].
impl Serialize for Mod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.base_pct == 0.0 {
            serializer.serialize_f64(self.base)
        } else {
            let mut out = String::new();
            if self.base != 0.0 {
                out.push_str(&precise(self.base));
            }
            if self.base_pct > 0.0 {
                out.push('+');
            }
            out.push_str(&precise(self.base_pct * 100.0));
            out.push('%');
            serializer.serialize_str(&out)
        }
    }
}

impl std::fmt::Display for Mod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = if self.bonus() != 0.0 {
            precise(self.bonus())
        } else {
            String::new()
        };
        if self.pct_tot() != 0.0 {
            if !s.is_empty() {
                s.push_str(", ");
            }
            if self.pct_tot() > 0.0 {
                s.push('+');
            }
            s.push_str(&precise(100.0 * self.pct_tot()));
            s.push('%');
        }
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NullResolver;

    #[test]
    fn test_parse_flat_and_percent() {
        let m = Mod::parse("5+10%", ModPath::new("x")).unwrap();
        assert_eq!(m.base(), 5.0);
        assert_eq!(m.base_pct(), 0.10);

        let m = Mod::parse("-2.5", ModPath::new("x")).unwrap();
        assert_eq!(m.base(), -2.5);
        assert_eq!(m.base_pct(), 0.0);

        let m = Mod::parse("10%", ModPath::new("x")).unwrap();
        assert_eq!(m.base(), 0.0);
        assert_eq!(m.base_pct(), 0.10);

        let m = Mod::parse("5-10%", ModPath::new("x")).unwrap();
        assert_eq!(m.base(), 5.0);
        assert_eq!(m.base_pct(), -0.10);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            Mod::parse("abc", ModPath::new("x")),
            Err(ModError::Parse(_))
        ));
        assert!(matches!(
            Mod::parse("5+10", ModPath::new("x")),
            Err(ModError::Parse(_))
        ));
        assert!(matches!(
            Mod::parse("5%%", ModPath::new("x")),
            Err(ModError::Parse(_))
        ));
    }

    #[test]
    fn test_wire_round_trip() {
        let m = Mod::parse("5+10%", ModPath::new("x")).unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json, serde_json::json!("5+10%"));

        let back = Mod::parse(json.as_str().unwrap(), ModPath::new("x")).unwrap();
        assert_eq!(back.base(), m.base());
        assert_eq!(back.base_pct(), m.base_pct());
    }

    #[test]
    fn test_wire_flat_only_is_number() {
        let m = Mod::flat("x", 7.0);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json, serde_json::json!(7.0));
    }

    #[test]
    fn test_anonymous_id() {
        let m = Mod::new("");
        assert!(m.is_anonymous());
        assert_eq!(m.id().as_str(), DEFAULT_MOD);
    }

    #[test]
    fn test_count_fallbacks() {
        let r = NullResolver;
        let m = Mod::flat("x", 4.0);
        assert_eq!(m.count(&r), 1.0); // neither count nor source

        let m = Mod::flat("x", 4.0).with_count(3.0);
        assert_eq!(m.count_bonus(&r), 12.0);

        let m = Mod::flat("x", 4.0).with_source(SourceRef::Const(2.0));
        assert_eq!(m.count_bonus(&r), 8.0);
    }

    #[test]
    fn test_mods_on_mods() {
        let r = NullResolver;
        let mut m = Mod::flat("outer", 10.0);
        m.add_mod(Mod::flat("buff", 5.0), &r);
        assert_eq!(m.bonus(), 15.0);

        m.add_mod(Mod::percent("amp", 0.5), &r);
        // (10 + 5) * (1 + 0.5)
        assert_eq!(m.bonus(), 22.5);

        m.remove_mods(&ModPath::new("buff"), &r);
        assert_eq!(m.bonus(), 15.0);
    }

    #[test]
    fn test_threshold_stacks_on_mod() {
        use crate::per::PerMod;
        let r = NullResolver;
        let mut m = Mod::flat("outer", 10.0);
        m.add_mod(
            PerMod::new("lvl", 2.0, 5.0).with_source(SourceRef::Const(20.0)),
            &r,
        );
        // 4 completed thresholds of +2 each
        assert_eq!(m.bonus(), 18.0);

        m.remove_mods(&ModPath::new("lvl"), &r);
        assert_eq!(m.bonus(), 10.0);
    }

    #[test]
    fn test_instantiate_detaches() {
        let r = NullResolver;
        let m = Mod::parse("5+10%", ModPath::new("x"))
            .unwrap()
            .with_source(SourceRef::Const(4.0));
        let inst = m.instantiate(&r);
        assert_eq!(inst.base(), 5.0);
        assert_eq!(inst.base_pct(), m.pct_tot());
        assert_eq!(inst.explicit_count(), Some(4.0));
        assert!(inst.source().is_none());
    }

    #[test]
    fn test_display() {
        let m = Mod::parse("5+10%", ModPath::new("x")).unwrap();
        assert_eq!(m.to_string(), "5, +10%");
        let m = Mod::percent("x", 0.25);
        assert_eq!(m.to_string(), "+25%");
    }
}

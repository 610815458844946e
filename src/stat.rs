//! Reactive stats.
//!
//! A `Stat` owns a base value plus a keyed collection of stacked
//! modifiers, and recomputes its aggregates whenever that collection
//! changes. Removal tombstones the entry so a stale re-add under the
//! same key cannot resurrect the old bonus.

use crate::changes::ReapplyRequest;
use crate::desc::ModDesc;
use crate::error::ModError;
use crate::modifier::Mod;
use crate::path::ModPath;
use crate::per::PerMod;
use crate::source::SourceResolver;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing::warn;

/// A modifier stacked on a reactive value (stat or mod): either a
/// plain [`Mod`] or a threshold [`PerMod`].
#[derive(Debug, Clone)]
pub enum StackedMod {
    Mod(Mod),
    Per(PerMod),
}

impl StackedMod {
    /// Stacking identity.
    pub fn id(&self) -> &ModPath {
        match self {
            StackedMod::Mod(m) => m.id(),
            StackedMod::Per(p) => p.id(),
        }
    }

    /// Total flat contribution.
    pub fn count_bonus(&self, resolver: &dyn SourceResolver) -> f64 {
        match self {
            StackedMod::Mod(m) => m.count_bonus(resolver),
            StackedMod::Per(p) => p.count_bonus(resolver),
        }
    }

    /// Total percent contribution. Threshold modifiers are flat-only.
    pub fn count_pct(&self, resolver: &dyn SourceResolver) -> f64 {
        match self {
            StackedMod::Mod(m) => m.count_pct(resolver),
            StackedMod::Per(_) => 0.0,
        }
    }

    /// Undiluted flat bonus of a single application.
    pub fn bonus(&self) -> f64 {
        match self {
            StackedMod::Mod(m) => m.bonus(),
            StackedMod::Per(p) => p.value(),
        }
    }

    /// Undiluted percent bonus of a single application.
    pub fn pct_tot(&self) -> f64 {
        match self {
            StackedMod::Mod(m) => m.pct_tot(),
            StackedMod::Per(_) => 0.0,
        }
    }
}

impl From<Mod> for StackedMod {
    fn from(m: Mod) -> Self {
        StackedMod::Mod(m)
    }
}

impl From<PerMod> for StackedMod {
    fn from(p: PerMod) -> Self {
        StackedMod::Per(p)
    }
}

/// Outcome of a stat mutation.
///
/// `changed` is whether the derived value moved from the last observed
/// one; `reapply` carries the stat's own modifier payload, queued for
/// re-application at the new value, when it did.
#[derive(Debug, Default)]
pub struct StatUpdate {
    pub changed: bool,
    pub reapply: Option<ReapplyRequest>,
}

impl StatUpdate {
    pub(crate) fn unchanged() -> Self {
        Self::default()
    }
}

/// A numeric stat with stacked modifiers.
///
/// Derived value: `b_tot = base + m_base; b_tot + |b_tot| * m_pct`,
/// floored at 0 when the stat is marked positive-only. The absolute
/// value keeps a percent bonus from making a negative total *more*
/// negative.
///
/// # Examples
///
/// ```rust
/// use modtree::{Mod, ModPath, Stat};
/// use modtree::source::NullResolver;
///
/// let mut hp = Stat::new(100.0, ModPath::new("player.hp")).with_pos(true);
/// let m = Mod::parse("25+10%", ModPath::new("ring.hp")).unwrap();
/// hp.add_mod(m, &NullResolver);
/// assert_eq!(hp.value(), 137.5); // (100 + 25) * 1.10
/// ```
#[derive(Debug, Clone)]
pub struct Stat {
    id: ModPath,
    base: f64,
    m_base: f64,
    m_pct: f64,
    pos: bool,
    prev: f64,
    recalcs: u64,
    mods: HashMap<ModPath, Option<StackedMod>>,
    mod_desc: Option<ModDesc>,
}

impl Stat {
    /// A stat with raw base `base` and no modifiers.
    pub fn new(base: f64, id: impl Into<ModPath>) -> Self {
        Self {
            id: id.into(),
            base,
            m_base: 0.0,
            m_pct: 0.0,
            pos: false,
            prev: 0.0,
            recalcs: 0,
            mods: HashMap::new(),
            mod_desc: None,
        }
    }

    /// Mark the stat positive-only (builder form). The derived value is
    /// floored at 0.
    pub fn with_pos(mut self, pos: bool) -> Self {
        self.pos = pos;
        self
    }

    /// Attach a modifier payload that is re-applied whenever the derived
    /// value changes (builder form).
    pub fn with_mod_desc(mut self, desc: ModDesc) -> Self {
        self.mod_desc = Some(desc);
        self
    }

    pub fn id(&self) -> &ModPath {
        &self.id
    }

    /// Raw base value, before modifiers.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Aggregate flat bonus over present modifiers.
    pub fn m_base(&self) -> f64 {
        self.m_base
    }

    /// Aggregate percent bonus over present modifiers.
    pub fn m_pct(&self) -> f64 {
        self.m_pct
    }

    pub fn is_pos(&self) -> bool {
        self.pos
    }

    pub fn mod_desc(&self) -> Option<&ModDesc> {
        self.mod_desc.as_ref()
    }

    pub fn set_mod_desc(&mut self, desc: Option<ModDesc>) {
        self.mod_desc = desc;
    }

    /// Number of aggregate recomputations performed so far.
    pub fn recalc_count(&self) -> u64 {
        self.recalcs
    }

    /// Whether a live (non-tombstoned) modifier is stacked under `id`.
    pub fn has_mod(&self, id: &ModPath) -> bool {
        matches!(self.mods.get(id), Some(Some(_)))
    }

    /// Derived value.
    pub fn value(&self) -> f64 {
        let b_tot = self.base + self.m_base;
        let v = b_tot + b_tot.abs() * self.m_pct;
        if self.pos && v < 0.0 {
            0.0
        } else {
            v
        }
    }

    /// Add `amt` to the raw base without touching modifiers.
    pub fn add(&mut self, amt: f64) -> StatUpdate {
        self.base += amt;
        self.update()
    }

    /// Replace the raw base.
    pub fn set(&mut self, base: f64) -> StatUpdate {
        self.base = base;
        self.update()
    }

    /// Hypothetical value after deltas `db` to the flat aggregate and
    /// `dp` to the percent aggregate. Multiplicative form, used for
    /// previewing a change without committing it.
    pub fn del_value(&self, db: f64, dp: f64) -> f64 {
        (self.base + self.m_base + db) * (1.0 + self.m_pct + dp)
    }

    /// Stack a modifier. An entry sharing the incoming id is always
    /// overwritten, live or tombstoned, and aggregates are recomputed
    /// even when the payload is identical.
    pub fn add_mod(
        &mut self,
        m: impl Into<StackedMod>,
        resolver: &dyn SourceResolver,
    ) -> StatUpdate {
        let m = m.into();
        self.mods.insert(m.id().clone(), Some(m));
        self.recalc(resolver)
    }

    /// Tombstone the modifier stored under `id`.
    ///
    /// The key stays in the collection with an empty payload, so the
    /// contribution is gone but a later re-add under the same key is an
    /// ordinary overwrite. Removing an id never stored is a no-op with
    /// no recompute.
    pub fn remove_mods(&mut self, id: &ModPath, resolver: &dyn SourceResolver) -> StatUpdate {
        if !matches!(self.mods.get(id), Some(Some(_))) {
            return StatUpdate::unchanged();
        }
        self.mods.insert(id.clone(), None);
        self.recalc(resolver)
    }

    /// Apply a modifier description directly to this stat.
    ///
    /// Typed modifiers stack; a bare number permanently folds
    /// `amt * n` into the raw base and cannot be unapplied by key. Any
    /// other shape is reported and leaves the stat untouched.
    pub fn apply(
        &mut self,
        desc: &ModDesc,
        amt: f64,
        resolver: &dyn SourceResolver,
    ) -> StatUpdate {
        match desc {
            ModDesc::Mod(m) => self.add_mod(m.clone(), resolver),
            ModDesc::Per(p) => self.add_mod(p.clone(), resolver),
            ModDesc::Number(n) => self.add(amt * n),
            ModDesc::Map(map) => {
                // legacy shape: fold a bonus/value field into base
                let folded = map
                    .get("bonus")
                    .or_else(|| map.get("value"))
                    .and_then(|d| match d {
                        ModDesc::Number(n) => Some(*n),
                        _ => None,
                    });
                match folded {
                    Some(n) => {
                        warn!(id = %self.id, "folding untyped bonus into stat base");
                        self.add(amt * n)
                    }
                    None => {
                        warn!(
                            error = %ModError::UnknownShape {
                                path: self.id.clone(),
                                detail: "untyped map applied to stat".into(),
                            },
                            "skipping modifier"
                        );
                        StatUpdate::unchanged()
                    }
                }
            }
            ModDesc::Bool(_) => {
                warn!(id = %self.id, "boolean applied to numeric stat; ignored");
                StatUpdate::unchanged()
            }
        }
    }

    /// Recompute the aggregates over present modifiers, then check for a
    /// value change.
    pub fn recalc(&mut self, resolver: &dyn SourceResolver) -> StatUpdate {
        self.recalcs += 1;
        let mut bonus = 0.0;
        let mut pct = 0.0;
        for m in self.mods.values().flatten() {
            bonus += m.count_bonus(resolver);
            pct += m.count_pct(resolver);
        }
        self.m_base = bonus;
        self.m_pct = pct;
        self.update()
    }

    /// Compare the derived value against the last observed one.
    ///
    /// When it moved and the stat carries a non-empty modifier payload,
    /// the returned update holds a [`ReapplyRequest`] for that payload
    /// at the new value.
    pub fn update(&mut self) -> StatUpdate {
        let current = self.value();
        let changed = current != self.prev;
        let reapply = if changed {
            self.mod_desc
                .as_ref()
                .filter(|d| !d.is_empty())
                .map(|d| ReapplyRequest {
                    desc: d.clone(),
                    amount: current,
                })
        } else {
            None
        };
        self.prev = current;
        StatUpdate { changed, reapply }
    }
}

/// Lossy wire form: the derived value as a plain number. Modifier
/// stacks are rebuilt from their owning sources on load, not restored
/// from the stat.
impl Serialize for Stat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(self.value())
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", crate::modifier::precise(self.value()))
    }
}

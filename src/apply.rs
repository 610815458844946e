//! Recursive modifier application.
//!
//! The engine walks a [`ModDesc`] tree and a [`ModGraph`] target in
//! lockstep: map keys descend into branches, typed leaves stack on
//! reactive slots, numbers fold, booleans toggle, and absent targets
//! are materialized as fresh holders when the write policy allows it.
//! Bad shapes are reported and skipped; only an exhausted recursion
//! budget aborts a call.

use crate::changes::{ChangeSink, ReapplyRequest};
use crate::desc::ModDesc;
use crate::error::ModError;
use crate::graph::{ModGraph, NodeId, Slot};
use crate::modifier::Mod;
use crate::path::ModPath;
use crate::source::SourceRef;
use crate::stat::{StackedMod, Stat, StatUpdate};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Depth budget for one application walk.
pub const MAX_DEPTH: usize = 64;

/// Passes allowed when draining re-application requests that keep
/// producing new ones.
const MAX_REAPPLY_PASSES: usize = 32;

/// Shape-preserving record of where an application landed.
///
/// Mirrors the description tree, but only keeps branches that touched a
/// reactive mod node. The initial call scans it for `"mod"` branches to
/// queue for re-application.
#[derive(Debug)]
pub enum Applied {
    /// A reactive mod node that received the modifier.
    Node(NodeId),
    /// Results under a map description, keyed like the description.
    Branch(BTreeMap<String, Applied>),
    /// Results fanned out over a list target.
    List(Vec<Applied>),
}

fn note_update(target: NodeId, upd: StatUpdate, sink: &mut ChangeSink) {
    if upd.changed {
        sink.mark_dirty(target);
    }
    if let Some(req) = upd.reapply {
        sink.push_reapply(req);
    }
}

/// Find the description under each first-encountered `"mod"` key whose
/// application produced a result.
fn collect_mod_branches<'d>(
    map: &'d BTreeMap<String, ModDesc>,
    applied: &Applied,
    out: &mut Vec<&'d ModDesc>,
) {
    let Applied::Branch(results) = applied else {
        return;
    };
    if results.contains_key("mod") {
        if let Some(desc) = map.get("mod") {
            out.push(desc);
            return;
        }
    }
    for (key, sub_applied) in results {
        if let Some(ModDesc::Map(sub_map)) = map.get(key) {
            collect_mod_branches(sub_map, sub_applied, out);
        }
    }
}

impl ModGraph {
    /// Apply a modifier description to `target` at strength `amt`.
    ///
    /// `amt` scales number seeds and, when negative, flips toggles to
    /// the negation of their described state. Typed modifiers stack by
    /// id regardless of `amt`; they are undone with
    /// [`remove_mods`](Self::remove_mods). Every visited node lands in
    /// the sink's dirty set, and `"mod"` branches that reached a
    /// reactive mod are queued for re-application at
    /// `amt * value(target)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modtree::{ChangeSink, ModDesc, ModGraph, ModPath};
    ///
    /// let mut graph = ModGraph::new("player");
    /// let root = graph.root();
    /// let hp = graph.add_stat(root, "hp", 100.0, true).unwrap();
    ///
    /// let desc = ModDesc::parse(&serde_json::json!({ "hp": "25+10%" }), &ModPath::new("ring"))
    ///     .unwrap();
    /// let mut sink = ChangeSink::new();
    /// graph.apply_mods(&desc, 1.0, root, &mut sink).unwrap();
    /// assert_eq!(graph.value(hp), 137.5);
    /// ```
    pub fn apply_mods(
        &mut self,
        desc: &ModDesc,
        amt: f64,
        target: NodeId,
        sink: &mut ChangeSink,
    ) -> Result<Option<Applied>, ModError> {
        let res = self.apply_desc(desc, amt, target, SourceRef::Node(target), 0, false, sink)?;
        if let (ModDesc::Map(map), Some(applied)) = (desc, &res) {
            let scale = amt * self.value(target);
            let mut found = Vec::new();
            collect_mod_branches(map, applied, &mut found);
            for sub in found {
                sink.push_reapply(ReapplyRequest {
                    desc: sub.clone(),
                    amount: scale,
                });
            }
        }
        Ok(res)
    }

    /// Undo a previously applied description: typed modifiers are
    /// tombstoned by id, map keys recurse. Folded numbers and toggles
    /// have no key to remove and are reported.
    pub fn remove_mods(&mut self, desc: &ModDesc, target: NodeId, sink: &mut ChangeSink) {
        sink.mark_dirty(target);
        self.remove_desc(desc, target, 0, sink);
    }

    /// Permanently shift plain numeric properties named by a map of
    /// deltas. No stacking, no keys: `subeffect(d, -amt)` is the only
    /// undo.
    pub fn subeffect(&mut self, target: NodeId, desc: &ModDesc, amt: f64, sink: &mut ChangeSink) {
        let ModDesc::Map(map) = desc else {
            warn!(path = %self.path(target), "subeffect requires a map description");
            return;
        };
        self.subeffect_map(target, map, amt, 0, sink);
    }

    /// Dispatch queued re-application requests against the graph root
    /// until the queue is quiet.
    ///
    /// Re-applications can change stats that queue further requests;
    /// a queue still busy after the pass budget is reported as a cycle.
    pub fn flush_reapplies(&mut self, sink: &mut ChangeSink) -> Result<(), ModError> {
        let mut passes = 0;
        while sink.has_reapplies() {
            passes += 1;
            if passes > MAX_REAPPLY_PASSES {
                return Err(ModError::Cycle {
                    path: self.path(self.root()).clone(),
                    depth: MAX_REAPPLY_PASSES,
                });
            }
            for req in sink.take_reapplies() {
                self.apply_mods(&req.desc, req.amount, self.root(), sink)?;
            }
        }
        Ok(())
    }

    fn apply_desc(
        &mut self,
        desc: &ModDesc,
        amt: f64,
        target: NodeId,
        src: SourceRef,
        depth: usize,
        is_mod: bool,
        sink: &mut ChangeSink,
    ) -> Result<Option<Applied>, ModError> {
        if depth > MAX_DEPTH {
            return Err(ModError::Cycle {
                path: self.path(target).clone(),
                depth: MAX_DEPTH,
            });
        }
        sink.mark_dirty(target);
        if self.slot(target).is_reactive() {
            return self.apply_node(desc, amt, target, depth, sink);
        }
        match desc {
            ModDesc::Map(map) => self.apply_obj(map, amt, target, src, depth, is_mod, sink),
            ModDesc::Mod(m) => {
                self.apply_to(&StackedMod::Mod(m.clone()), target, "value", amt, depth, sink)
            }
            ModDesc::Per(p) => {
                self.apply_to(&StackedMod::Per(p.clone()), target, "value", amt, depth, sink)
            }
            ModDesc::Number(_) => {
                warn!(path = %self.path(target), "raw number modifier has no target key; ignored");
                Ok(None)
            }
            ModDesc::Bool(_) => {
                warn!(path = %self.path(target), "boolean modifier has no target key; ignored");
                Ok(None)
            }
        }
    }

    /// Walk a map description against a branch target key by key.
    fn apply_obj(
        &mut self,
        map: &BTreeMap<String, ModDesc>,
        amt: f64,
        target: NodeId,
        src: SourceRef,
        depth: usize,
        is_mod: bool,
        sink: &mut ChangeSink,
    ) -> Result<Option<Applied>, ModError> {
        if depth > MAX_DEPTH {
            return Err(ModError::Cycle {
                path: self.path(target).clone(),
                depth: MAX_DEPTH,
            });
        }
        if !matches!(self.slot(target), Slot::Branch(_)) {
            warn!(
                error = %ModError::UnknownShape {
                    path: self.path(target).clone(),
                    detail: "map description aimed at a non-branch target".into(),
                },
                "skipping modifier"
            );
            return Ok(None);
        }
        let mut results = BTreeMap::new();
        for (key, sub_desc) in map {
            // a "mod" key switches the subtree into mod context: holders
            // materialized below it become mods, not stats
            let mod_ctx = is_mod || key == "mod";
            let sub_targ = self.child(target, key);
            let new_src = match sub_targ {
                Some(id) if !mod_ctx && self.slot(id).is_numeric() => SourceRef::Node(id),
                _ => src,
            };
            let res = match sub_targ {
                None => self.materialize(target, key, sub_desc, amt, new_src, depth, mod_ctx, sink)?,
                Some(st) if self.slot(st).is_reactive() => {
                    self.apply_node(sub_desc, amt, st, depth + 1, sink)?
                }
                Some(st) => match sub_desc {
                    ModDesc::Map(sub_map) if matches!(self.slot(st), Slot::Branch(_)) => {
                        self.apply_obj(sub_map, amt, st, new_src, depth + 1, mod_ctx, sink)?
                    }
                    ModDesc::Mod(m) => self.apply_to(
                        &StackedMod::Mod(m.clone()),
                        target,
                        key,
                        amt,
                        depth + 1,
                        sink,
                    )?,
                    ModDesc::Per(p) => self.apply_to(
                        &StackedMod::Per(p.clone()),
                        target,
                        key,
                        amt,
                        depth + 1,
                        sink,
                    )?,
                    ModDesc::Bool(b) => {
                        self.toggle(st, *b, amt, sink);
                        None
                    }
                    ModDesc::Number(_) => {
                        warn!(
                            path = %self.path(st),
                            "raw number aimed at existing non-reactive target; ignored"
                        );
                        None
                    }
                    ModDesc::Map(_) => {
                        warn!(
                            error = %ModError::UnknownShape {
                                path: self.path(st).clone(),
                                detail: "map description aimed at a leaf target".into(),
                            },
                            "skipping modifier"
                        );
                        None
                    }
                },
            };
            if let Some(r) = res {
                results.insert(key.clone(), r);
            }
        }
        Ok(if results.is_empty() {
            None
        } else {
            Some(Applied::Branch(results))
        })
    }

    /// Create a holder for an absent property and apply the sub
    /// description to it. In mod context the holder is a [`Mod`] fed by
    /// the propagated source; otherwise a zeroed [`Stat`].
    #[allow(clippy::too_many_arguments)]
    fn materialize(
        &mut self,
        parent: NodeId,
        key: &str,
        sub_desc: &ModDesc,
        amt: f64,
        src: SourceRef,
        depth: usize,
        mod_ctx: bool,
        sink: &mut ChangeSink,
    ) -> Result<Option<Applied>, ModError> {
        if !self.can_write(self.path(parent), key) {
            warn!(
                error = %ModError::UnwritableTarget(self.path(parent).child(key)),
                "skipping modifier"
            );
            return Ok(None);
        }
        if let ModDesc::Map(sub_map) = sub_desc {
            let Some(child) = self.add_branch(parent, key) else {
                return Ok(None);
            };
            return self.apply_obj(sub_map, amt, child, src, depth + 1, mod_ctx, sink);
        }
        let path = self.path(parent).child(key);
        let slot = if mod_ctx {
            let mut holder = Mod::new(path);
            holder.set_source(Some(src));
            Slot::Mod(holder)
        } else {
            Slot::Stat(Stat::new(0.0, path))
        };
        let Some(child) = self.add_child(parent, key, slot) else {
            return Ok(None);
        };
        // a bare number seeds the fresh holder; existing holders never
        // fold (see apply_node)
        if let ModDesc::Number(n) = sub_desc {
            let delta = amt * n;
            let upd = self.mutate_slot(child, |slot, _| match slot {
                Slot::Stat(s) => s.add(delta),
                Slot::Mod(m) => {
                    m.set_base(m.base() + delta);
                    StatUpdate::unchanged()
                }
                _ => StatUpdate::unchanged(),
            });
            sink.mark_dirty(child);
            note_update(child, upd, sink);
            return Ok(if mod_ctx {
                Some(Applied::Node(child))
            } else {
                None
            });
        }
        self.apply_node(sub_desc, amt, child, depth + 1, sink)
    }

    /// Apply a description to a reactive slot (stat or standalone mod).
    fn apply_node(
        &mut self,
        desc: &ModDesc,
        amt: f64,
        target: NodeId,
        depth: usize,
        sink: &mut ChangeSink,
    ) -> Result<Option<Applied>, ModError> {
        if depth > MAX_DEPTH {
            return Err(ModError::Cycle {
                path: self.path(target).clone(),
                depth: MAX_DEPTH,
            });
        }
        sink.mark_dirty(target);
        let is_mod_slot = matches!(self.slot(target), Slot::Mod(_));
        match desc {
            ModDesc::Mod(m) => self.stack_on(target, StackedMod::Mod(m.clone()), sink),
            ModDesc::Per(p) => self.stack_on(target, StackedMod::Per(p.clone()), sink),
            ModDesc::Map(_) => {
                // inline field map lands as one mod keyed by the target
                // path; it carries no source, so it applies exactly once
                // unless the map sets an explicit count
                let id = self.path(target).clone();
                if let Some(built) = desc.build_mod(id, None) {
                    self.stack_on(target, StackedMod::Mod(built), sink);
                }
            }
            ModDesc::Number(_) => {
                // bare numbers only seed freshly materialized holders;
                // folding into a live value would double-count on every
                // re-application with no key to undo it by
                warn!(
                    path = %self.path(target),
                    "bare number aimed at an existing reactive target; ignored"
                );
            }
            ModDesc::Bool(_) => {
                warn!(path = %self.path(target), "boolean applied to reactive target; ignored");
            }
        }
        Ok(if is_mod_slot {
            Some(Applied::Node(target))
        } else {
            None
        })
    }

    /// Stack a typed modifier at `parent[key]`, promoting plain numbers
    /// to stats and fanning out over lists.
    fn apply_to(
        &mut self,
        m: &StackedMod,
        parent: NodeId,
        key: &str,
        amt: f64,
        depth: usize,
        sink: &mut ChangeSink,
    ) -> Result<Option<Applied>, ModError> {
        if depth > MAX_DEPTH {
            return Err(ModError::Cycle {
                path: self.path(parent).clone(),
                depth: MAX_DEPTH,
            });
        }
        let Some(child) = self.child(parent, key) else {
            warn!(
                path = %self.path(parent),
                key,
                "typed modifier aimed at a missing property; ignored"
            );
            return Ok(None);
        };
        match self.slot(child) {
            Slot::Stat(_) | Slot::Mod(_) => {
                sink.mark_dirty(child);
                let is_mod_slot = matches!(self.slot(child), Slot::Mod(_));
                self.stack_on(child, m.clone(), sink);
                Ok(if is_mod_slot {
                    Some(Applied::Node(child))
                } else {
                    None
                })
            }
            Slot::Number(v) => {
                let seed = *v;
                if !self.can_write(self.path(parent), key) {
                    warn!(
                        error = %ModError::UnwritableTarget(self.path(child).clone()),
                        "skipping modifier"
                    );
                    return Ok(None);
                }
                // promote the plain number to a stat seeded with it
                let path = self.path(child).clone();
                *self.slot_mut(child) = Slot::Stat(Stat::new(seed, path));
                sink.mark_dirty(child);
                self.stack_on(child, m.clone(), sink);
                Ok(None)
            }
            Slot::List(items) => {
                let items = items.clone();
                let mut out = Vec::new();
                for element in items {
                    if let Some(res) = self.apply_to(m, element, key, amt, depth + 1, sink)? {
                        out.push(res);
                    }
                }
                Ok(if out.is_empty() {
                    None
                } else {
                    Some(Applied::List(out))
                })
            }
            Slot::Branch(children) => {
                let has_value = children.contains_key("value");
                if has_value {
                    self.apply_to(m, child, "value", amt, depth + 1, sink)
                } else {
                    // inert branch: stamp a one-shot value instead of stacking
                    let stamped = amt * m.bonus() * (1.0 + amt * m.pct_tot());
                    warn!(
                        path = %self.path(child),
                        stamped,
                        "typed modifier stamped onto an inert branch"
                    );
                    self.add_child(child, "value", Slot::Number(stamped));
                    sink.mark_dirty(child);
                    Ok(None)
                }
            }
            Slot::Bool(_) | Slot::Vacant => {
                warn!(
                    error = %ModError::UnknownShape {
                        path: self.path(child).clone(),
                        detail: "typed modifier aimed at a flag or vacant slot".into(),
                    },
                    "skipping modifier"
                );
                Ok(None)
            }
        }
    }

    fn stack_on(&mut self, target: NodeId, m: StackedMod, sink: &mut ChangeSink) {
        let upd = self.mutate_slot(target, |slot, resolver| match slot {
            Slot::Stat(s) => s.add_mod(m, resolver),
            Slot::Mod(holder) => {
                holder.add_mod(m, resolver);
                StatUpdate::unchanged()
            }
            _ => StatUpdate::unchanged(),
        });
        note_update(target, upd, sink);
    }

    fn toggle(&mut self, target: NodeId, desired: bool, amt: f64, sink: &mut ChangeSink) {
        if amt == 0.0 {
            return;
        }
        // un-applying sets the negation of the described state
        let next = if amt > 0.0 { desired } else { !desired };
        if let Slot::Bool(b) = self.slot_mut(target) {
            *b = next;
            sink.mark_dirty(target);
            return;
        }
        if matches!(self.slot(target), Slot::Branch(_)) {
            match self.child(target, "value") {
                Some(v) => {
                    let slot = self.slot_mut(v);
                    match slot {
                        Slot::Bool(b) => *b = next,
                        Slot::Number(_) | Slot::Vacant => *slot = Slot::Bool(next),
                        _ => {
                            warn!(path = %self.path(v), "toggle aimed at a non-flag value; ignored");
                            return;
                        }
                    }
                    sink.mark_dirty(v);
                }
                None => {
                    self.add_child(target, "value", Slot::Bool(next));
                }
            }
            sink.mark_dirty(target);
            return;
        }
        warn!(path = %self.path(target), "boolean toggle aimed at a non-flag target; ignored");
    }

    fn remove_desc(&mut self, desc: &ModDesc, target: NodeId, depth: usize, sink: &mut ChangeSink) {
        if depth > MAX_DEPTH {
            warn!(path = %self.path(target), "removal recursion limit reached; stopping");
            return;
        }
        match desc {
            ModDesc::Mod(m) => {
                let id = m.id().clone();
                self.unstack(target, &id, sink);
            }
            ModDesc::Per(p) => {
                let id = p.id().clone();
                self.unstack(target, &id, sink);
            }
            ModDesc::Map(map) => {
                if self.slot(target).is_reactive() {
                    // the inline field map stacked under the target path
                    let id = self.path(target).clone();
                    self.unstack(target, &id, sink);
                    return;
                }
                for (key, sub) in map {
                    if let Some(child) = self.child(target, key) {
                        self.remove_desc(sub, child, depth + 1, sink);
                    }
                }
            }
            ModDesc::Number(_) => {
                warn!(path = %self.path(target), "folded number modifier cannot be removed by key");
            }
            ModDesc::Bool(_) => {
                debug!(path = %self.path(target), "toggle removal has no keyed entry; ignored");
            }
        }
    }

    fn unstack(&mut self, target: NodeId, id: &ModPath, sink: &mut ChangeSink) {
        match self.slot(target) {
            Slot::Stat(_) | Slot::Mod(_) => {
                let upd = self.mutate_slot(target, |slot, resolver| match slot {
                    Slot::Stat(s) => s.remove_mods(id, resolver),
                    Slot::Mod(m) => {
                        m.remove_mods(id, resolver);
                        StatUpdate::unchanged()
                    }
                    _ => StatUpdate::unchanged(),
                });
                sink.mark_dirty(target);
                note_update(target, upd, sink);
            }
            Slot::Branch(_) => {
                if let Some(v) = self.child(target, "value") {
                    self.unstack(v, id, sink);
                }
            }
            _ => {}
        }
    }

    fn subeffect_map(
        &mut self,
        target: NodeId,
        map: &BTreeMap<String, ModDesc>,
        amt: f64,
        depth: usize,
        sink: &mut ChangeSink,
    ) {
        if depth > MAX_DEPTH {
            warn!(path = %self.path(target), "subeffect recursion limit reached; stopping");
            return;
        }
        for (key, sub) in map {
            let Some(child) = self.child(target, key) else {
                debug!(path = %self.path(target), key, "subeffect target missing; skipped");
                continue;
            };
            match sub {
                ModDesc::Map(sub_map) => self.subeffect_map(child, sub_map, amt, depth + 1, sink),
                ModDesc::Number(n) => self.bump(child, amt * n, sink),
                _ => {
                    debug!(key, "subeffect supports plain numbers and maps only");
                }
            }
        }
    }

    /// Shift a node's plain value by `delta`.
    fn bump(&mut self, node: NodeId, delta: f64, sink: &mut ChangeSink) {
        if matches!(self.slot(node), Slot::Branch(_)) {
            match self.child(node, "value") {
                Some(v) => self.bump(v, delta, sink),
                None => {
                    self.add_child(node, "value", Slot::Number(delta));
                    sink.mark_dirty(node);
                }
            }
            return;
        }
        match self.slot_mut(node) {
            Slot::Number(v) => {
                *v += delta;
                sink.mark_dirty(node);
            }
            Slot::Stat(_) => {
                let upd = self.mutate_slot(node, |slot, _| match slot {
                    Slot::Stat(s) => s.add(delta),
                    _ => StatUpdate::unchanged(),
                });
                sink.mark_dirty(node);
                note_update(node, upd, sink);
            }
            Slot::Mod(m) => {
                m.set_base(m.base() + delta);
                sink.mark_dirty(node);
            }
            _ => {
                warn!(path = %self.path(node), "subeffect aimed at a non-numeric target; ignored");
            }
        }
    }
}

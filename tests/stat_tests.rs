//! Standalone stat and modifier behavior, no graph involved.

use modtree::source::{NullResolver, SourceRef};
use modtree::{Mod, ModDesc, ModPath, PerMod, Stat};
use serde_json::json;

#[test]
fn test_item_block_applied_to_stat() {
    let r = NullResolver;
    let mut hp = Stat::new(100.0, ModPath::new("player.hp")).with_pos(true);

    let desc = ModDesc::parse(&json!("25+10%"), &ModPath::new("ring.hp")).unwrap();
    hp.apply(&desc, 1.0, &r);
    assert_eq!(hp.value(), 137.5);

    // same id overwrites instead of double-counting
    hp.apply(&desc, 1.0, &r);
    assert_eq!(hp.value(), 137.5);

    hp.remove_mods(&ModPath::new("ring.hp"), &r);
    assert_eq!(hp.value(), 100.0);
}

#[test]
fn test_two_sources_stack_independently() {
    let r = NullResolver;
    let mut dmg = Stat::new(10.0, ModPath::new("dmg"));
    dmg.add_mod(Mod::parse("5", ModPath::new("sword.dmg")).unwrap(), &r);
    dmg.add_mod(Mod::parse("50%", ModPath::new("rage.dmg")).unwrap(), &r);
    // (10 + 5) + |15| * 0.5
    assert_eq!(dmg.value(), 22.5);

    dmg.remove_mods(&ModPath::new("sword.dmg"), &r);
    assert_eq!(dmg.value(), 15.0);
}

#[test]
fn test_threshold_pulses_on_exact_multiples() {
    let r = NullResolver;
    let p = PerMod::parse("5:10", ModPath::new("lvl.hp")).unwrap();

    let at = |src: f64| {
        let p = p.clone().with_source(SourceRef::Const(src));
        (p.count(&r), p.get_apply(&r))
    };
    assert_eq!(at(9.0), (0.0, 0.0));
    assert_eq!(at(10.0), (1.0, 5.0));
    assert_eq!(at(25.0), (2.0, 0.0));
    assert_eq!(at(30.0), (3.0, 15.0));
}

#[test]
fn test_counted_source_scales_contribution() {
    let r = NullResolver;
    let mut crit = Stat::new(5.0, ModPath::new("crit"));
    // one +2 per owned copy, 3 copies owned
    crit.add_mod(
        Mod::flat("dagger.crit", 2.0).with_source(SourceRef::Const(3.0)),
        &r,
    );
    assert_eq!(crit.value(), 11.0);
}

#[test]
fn test_snapshot_freezes_live_totals() {
    let r = NullResolver;
    let mut aura = Mod::parse("4+20%", ModPath::new("aura")).unwrap();
    aura.add_mod(Mod::flat("amp", 2.0), &r);
    assert_eq!(aura.bonus(), 6.0);

    let frozen = aura.instantiate(&r);
    assert_eq!(frozen.base(), 6.0);
    assert_eq!(frozen.base_pct(), aura.pct_tot());

    // later buffs to the live mod do not touch the snapshot
    aura.add_mod(Mod::flat("amp2", 10.0), &r);
    assert_eq!(frozen.base(), 6.0);
}

#[test]
fn test_wire_forms() {
    // percent math stays clean on the wire: 0.1 * 100 prints as 10
    let m = Mod::percent("x", 0.1);
    assert_eq!(serde_json::to_value(&m).unwrap(), json!("+10%"));

    let m = Mod::parse("5+10%", ModPath::new("x")).unwrap();
    assert_eq!(serde_json::to_value(&m).unwrap(), json!("5+10%"));

    let p = PerMod::parse("5:10", ModPath::new("x")).unwrap();
    assert_eq!(serde_json::to_value(&p).unwrap(), json!("5:10"));

    let r = NullResolver;
    let mut s = Stat::new(100.0, ModPath::new("hp"));
    s.add_mod(Mod::flat("b", 25.0), &r);
    assert_eq!(serde_json::to_value(&s).unwrap(), json!(125.0));
}

#[test]
fn test_malformed_strings_surface_errors() {
    assert!(ModDesc::parse(&json!("banana"), &ModPath::new("x")).is_err());
    assert!(ModDesc::parse(&json!("5++10%"), &ModPath::new("x")).is_err());
    assert!(ModDesc::parse(&json!({ "hp": "1:2:3" }), &ModPath::new("x")).is_err());
}

//! # modtree - Generic Attribute Modifier Composition
//!
//! A composition engine for stacked attribute modifiers:
//! - **Declarative** modifier descriptions parsed from JSON data
//! - **Keyed stacking** (re-applying under the same id overwrites, never
//!   double-counts)
//! - **Reactive** stats that recompute aggregates on every change
//! - **Explicit** change tracking through a per-tick sink
//!
//! ## Core Concepts
//!
//! ### Descriptions and targets
//!
//! A [`ModDesc`] is the parsed form of a JSON modifier block. Its map
//! keys mirror the target tree, a [`ModGraph`] of branches and leaves:
//!
//! ```text
//! { "hp": "25+10%" }      stacks a flat+percent mod on the hp stat
//! { "regen": "1:10" }     grants 1 regen per 10 of the source quantity
//! { "gold": 5 }           folds 5 * amt into gold's base
//! { "locked": true }      toggles a flag
//! ```
//!
//! Applying with a positive amount applies, with a negative amount
//! un-applies; typed modifiers are keyed by dotted-path id so repeated
//! application is idempotent.
//!
//! ### Stats
//!
//! A [`Stat`] aggregates its stacked modifiers into a flat and a
//! percent component:
//!
//! ```text
//! b_tot = base + m_base
//! value = b_tot + |b_tot| * m_pct      (floored at 0 when positive-only)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use modtree::{ChangeSink, ModDesc, ModGraph, ModPath};
//!
//! // target tree: a player with an hp stat
//! let mut graph = ModGraph::new("player");
//! let root = graph.root();
//! let hp = graph.add_stat(root, "hp", 100.0, true).unwrap();
//!
//! // an item's modifier block, parsed from data
//! let desc = ModDesc::parse(
//!     &serde_json::json!({ "hp": "25+10%" }),
//!     &ModPath::new("ring"),
//! ).unwrap();
//!
//! let mut sink = ChangeSink::new();
//! graph.apply_mods(&desc, 1.0, root, &mut sink).unwrap();
//! assert_eq!(graph.value(hp), 137.5); // (100 + 25) * 1.10
//!
//! // taking the ring off un-applies by id
//! graph.remove_mods(&desc, root, &mut sink);
//! assert_eq!(graph.value(hp), 100.0);
//! ```

pub mod apply;
pub mod changes;
pub mod desc;
pub mod error;
pub mod graph;
pub mod modifier;
pub mod path;
pub mod per;
pub mod policy;
pub mod source;
pub mod stat;

pub use apply::{Applied, MAX_DEPTH};
pub use changes::{ChangeSink, ReapplyRequest};
pub use desc::ModDesc;
pub use error::ModError;
pub use graph::{ModGraph, NodeId, Slot};
pub use modifier::Mod;
pub use path::{ModPath, DEFAULT_MOD};
pub use per::PerMod;
pub use stat::{StackedMod, Stat, StatUpdate};

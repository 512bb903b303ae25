//! # bitbdd-rs: Bit-precise symbolic program analysis in Rust
//!
//! **`bitbdd-rs`** is a manager-centric engine for **bit-precise abstract
//! interpretation** over Binary Decision Diagrams (BDDs). Program facts are
//! boolean formulas ("regions") over named bit predicates; machine integers
//! are vectors of regions, one per bit, combined with two's-complement
//! arithmetic circuits.
//!
//! ## Why regions?
//!
//! A region is a **canonical** BDD node --- for a fixed variable ordering,
//! every boolean function has exactly one representation. Equality of facts
//! is therefore a pointer comparison, and entailment (the lattice order of
//! the analysis) is a single cached ITE query.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: All formula operations go through the
//!   [`RegionManager`][crate::region::RegionManager]. This ensures structural
//!   sharing (hash consing) and keeps the canonical form invariant.
//! - **Bit-precise arithmetic**: [`BitvectorManager`][crate::bitvector::BitvectorManager]
//!   builds ripple-carry adders, shift-and-add multipliers, restoring
//!   dividers, and logarithmic shifters directly over regions.
//! - **Tunable precision**: three expression strategies (boolean, compressed
//!   integer-equality, general bitvector) selected per variable partition,
//!   gated by [`AnalysisConfig`][crate::config::AnalysisConfig].
//! - **Compact orderings**: [`PartitionOrderer`][crate::ordering::PartitionOrderer]
//!   clusters variables that jointly decide branches, shrinking the shared
//!   formula for nested-conditional programs.
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use bitbdd_rs::config::AnalysisConfig;
//! use bitbdd_rs::expr::{CType, Expr, ScopedName};
//! use bitbdd_rs::ordering::{PartitionId, PartitionInfo, PartitionKind};
//! use bitbdd_rs::region::RegionManager;
//! use bitbdd_rs::state::AnalysisState;
//! use bitbdd_rs::transfer::{CfgEdge, TransferRelation};
//!
//! let regions = Rc::new(RegionManager::default());
//! let relation = TransferRelation::new(Rc::clone(&regions), &AnalysisConfig::default());
//! let state = AnalysisState::initial(Rc::clone(&regions));
//!
//! // flag = 1;
//! let flag = ScopedName::global("flag");
//! let partition = Some(PartitionInfo {
//!     id: PartitionId(1),
//!     kind: PartitionKind::Boolean,
//!     literals: vec![],
//!     var_count: 1,
//! });
//! let edge = CfgEdge::Assign {
//!     lhs: flag.clone(),
//!     ty: CType::boolean(),
//!     partition: partition.clone(),
//!     rhs: Expr::literal(1),
//! };
//! let state = relation.successor(&state, &edge, &|| false).unwrap().unwrap();
//!
//! // [!flag] is now infeasible: zero successors.
//! let edge = CfgEdge::Assume {
//!     condition: Expr::var(flag),
//!     ty: CType::boolean(),
//!     partition,
//!     polarity: false,
//! };
//! assert!(relation.successor(&state, &edge, &|| false).unwrap().is_none());
//! ```
//!
//! ## Core Components
//!
//! - **[`region`]**: the BDD engine. [`RegionManager`][crate::region::RegionManager]
//!   with hash consing, complement edges, and ITE-based apply.
//! - **[`bitvector`]**: arithmetic circuits over region vectors.
//! - **[`predicate`]**: the name-to-regions store and declaration-order policy.
//! - **[`ordering`]**: partition ordering from control-flow structure.
//! - **[`state`]** / **[`transfer`]**: the analysis lattice and the per-edge
//!   transfer relation.
//! - **[`compile`]**: expression-to-region translation strategies.
//! - **[`dump`]**: DOT/text rendering and host queries.

pub mod bitvector;
pub mod cache;
pub mod compile;
pub mod config;
pub mod dump;
pub mod expr;
pub mod ordering;
pub mod predicate;
pub mod region;
pub mod state;
pub mod transfer;

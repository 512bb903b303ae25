//! Scoped-variable predicate bindings.
//!
//! The [`PredicateStore`] maps a scoped variable name to a fixed-width
//! [`Bitvector`] of canonical regions. Each (name, bit) pair is backed by one
//! region variable whose id is computed from the declaration-order policy
//! fixed at construction; repeated binds return the same canonical regions.
//!
//! Re-declaring a name never re-derives its regions: invalidation is the
//! caller's job (existentially forget the old bits, then keep using the same
//! binding). The declaration order affects only formula compactness, never
//! correctness.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::rc::Rc;

use log::{debug, info};

use crate::bitvector::Bitvector;
use crate::config::AnalysisConfig;
use crate::expr::ScopedName;
use crate::ordering::PartitionKind;
use crate::region::RegionManager;

/// Allocates and memoizes predicate bindings for scoped variable names.
pub struct PredicateStore {
    regions: Rc<RegionManager>,
    bit_major: bool,
    bits_increasing: bool,
    partition_ordered: bool,
    max_positions: usize,
    max_width: usize,
    bindings: RefCell<BTreeMap<ScopedName, Bitvector>>,
    positions: RefCell<HashMap<ScopedName, usize>>,
    position_order: RefCell<Vec<ScopedName>>,
}

impl PredicateStore {
    pub fn new(regions: Rc<RegionManager>, config: &AnalysisConfig) -> Self {
        config.validate();
        Self {
            regions,
            bit_major: config.bit_major_declaration,
            bits_increasing: config.bits_increasing,
            partition_ordered: config.partition_ordered,
            max_positions: config.max_tracked_variables,
            max_width: config.max_bitwidth,
            bindings: RefCell::new(BTreeMap::new()),
            positions: RefCell::new(HashMap::new()),
            position_order: RefCell::new(Vec::new()),
        }
    }

    pub fn regions(&self) -> &Rc<RegionManager> {
        &self.regions
    }

    /// Pre-assign declaration positions, typically from the
    /// partition-grouped order computed by the `PartitionOrderer`. Must run
    /// before the first `bind`; later binds of unlisted names append after
    /// the installed ones.
    ///
    /// Ignored when partition-grouped ordering is disabled in the
    /// configuration: positions then follow first use.
    pub fn install_variable_order(&self, names: impl IntoIterator<Item = ScopedName>) {
        assert!(
            self.bindings.borrow().is_empty(),
            "Variable order must be installed before the first binding"
        );
        if !self.partition_ordered {
            debug!("partition-grouped ordering disabled, keeping first-use order");
            return;
        }
        for name in names {
            self.position_of(&name);
        }
    }

    fn position_of(&self, name: &ScopedName) -> usize {
        if let Some(&p) = self.positions.borrow().get(name) {
            return p;
        }
        let mut order = self.position_order.borrow_mut();
        let p = order.len();
        assert!(p < self.max_positions, "Tracked-variable capacity exceeded");
        order.push(name.clone());
        self.positions.borrow_mut().insert(name.clone(), p);
        p
    }

    /// Region variable id for bit `bit` of the name at `position`.
    ///
    /// Bit-major interleaves all variables' equal bit indices; variable-major
    /// keeps each variable's bits contiguous. `bits_increasing` flips the
    /// direction of bits within the order.
    fn var_id(&self, position: usize, bit: usize) -> u32 {
        let level_bit = if self.bits_increasing {
            bit
        } else {
            self.max_width - 1 - bit
        };
        let id = if self.bit_major {
            level_bit * self.max_positions + position
        } else {
            position * self.max_width + level_bit
        };
        // Region variables are 1-indexed.
        (id + 1) as u32
    }

    /// Fresh or memoized binding for `name` at the given width.
    ///
    /// The width is chosen once (from the variable's partition/type) and is
    /// stable; binding the same name at a different width is a caller bug.
    pub fn bind(&self, name: &ScopedName, width: usize) -> Bitvector {
        assert!(width > 0, "Binding width must be positive");
        assert!(width <= self.max_width, "Binding width exceeds the declaration id space");

        if let Some(bv) = self.bindings.borrow().get(name) {
            assert_eq!(
                bv.width(),
                width,
                "Binding width for {} is fixed at first use",
                name
            );
            return bv.clone();
        }

        let position = self.position_of(name);
        let bits = (0..width)
            .map(|bit| self.regions.mk_var(self.var_id(position, bit)))
            .collect();
        let bv = Bitvector::new(bits);
        debug!("bind({}, width = {}) at position {}", name, width, position);
        self.bindings.borrow_mut().insert(name.clone(), bv.clone());
        bv
    }

    /// Binding for `name` if it was ever bound.
    pub fn lookup(&self, name: &ScopedName) -> Option<Bitvector> {
        self.bindings.borrow().get(name).cloned()
    }

    /// All names ever bound, in sorted order (deterministic diagnostics).
    pub fn tracked_names(&self) -> Vec<ScopedName> {
        self.bindings.borrow().keys().cloned().collect()
    }

    pub fn num_tracked(&self) -> usize {
        self.bindings.borrow().len()
    }

    /// Bindings whose names belong to the given function's scope.
    pub fn bindings_in_scope(&self, function: &str) -> Vec<(ScopedName, Bitvector)> {
        self.bindings
            .borrow()
            .iter()
            .filter(|(name, _)| name.is_scoped_to(function))
            .map(|(name, bv)| (name.clone(), bv.clone()))
            .collect()
    }

    /// Write the chosen declaration order, one name per line, for
    /// reproducibility across runs.
    pub fn write_variable_order(&self, out: &mut impl Write) -> io::Result<()> {
        for name in self.position_order.borrow().iter() {
            writeln!(out, "{}", name)?;
        }
        Ok(())
    }

    /// Log the tracked variables grouped by partition class.
    pub fn log_tracked_by_class(&self, kinds: &HashMap<ScopedName, PartitionKind>) {
        let mut by_class: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
        for name in self.bindings.borrow().keys() {
            let class = match kinds.get(name) {
                Some(PartitionKind::Boolean) => "boolean",
                Some(PartitionKind::IntEqual) => "intEqual",
                Some(PartitionKind::IntAdd) => "intAdd",
                None => "untracked",
            };
            by_class.entry(class).or_default().push(name.to_string());
        }
        for (class, names) in by_class {
            info!("tracked {} variables ({}): {}", class, names.len(), names.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn store(configure: impl FnOnce(&mut AnalysisConfig)) -> PredicateStore {
        let mut config = AnalysisConfig::default();
        configure(&mut config);
        let regions = Rc::new(RegionManager::default());
        PredicateStore::new(regions, &config)
    }

    #[test]
    fn test_bind_is_memoized() {
        let store = store(|_| {});
        let x = ScopedName::local("main", "x");
        let first = store.bind(&x, 8);
        let second = store.bind(&x, 8);
        // Same canonical regions, not re-derived.
        assert_eq!(first, second);
        assert_eq!(store.num_tracked(), 1);
    }

    #[test]
    #[should_panic(expected = "fixed at first use")]
    fn test_width_is_stable() {
        let store = store(|_| {});
        let x = ScopedName::global("x");
        store.bind(&x, 8);
        store.bind(&x, 16);
    }

    #[test]
    fn test_variable_major_ids() {
        let store = store(|c| {
            c.bit_major_declaration = false;
            c.bits_increasing = true;
            c.default_bitwidth = 8;
            c.max_bitwidth = 8;
        });
        let regions = Rc::clone(store.regions());
        let a = store.bind(&ScopedName::global("a"), 2);
        let b = store.bind(&ScopedName::global("b"), 2);
        // All bits of a, then all bits of b.
        assert_eq!(regions.variable(a.bit(0).index()), 1);
        assert_eq!(regions.variable(a.bit(1).index()), 2);
        assert_eq!(regions.variable(b.bit(0).index()), 9);
        assert_eq!(regions.variable(b.bit(1).index()), 10);
    }

    #[test]
    fn test_bit_major_ids() {
        let store = store(|c| {
            c.bit_major_declaration = true;
            c.bits_increasing = true;
            c.max_tracked_variables = 4;
        });
        let regions = Rc::clone(store.regions());
        let a = store.bind(&ScopedName::global("a"), 2);
        let b = store.bind(&ScopedName::global("b"), 2);
        // All variables' bit 0, then all bit 1.
        assert_eq!(regions.variable(a.bit(0).index()), 1);
        assert_eq!(regions.variable(b.bit(0).index()), 2);
        assert_eq!(regions.variable(a.bit(1).index()), 5);
        assert_eq!(regions.variable(b.bit(1).index()), 6);
    }

    #[test]
    fn test_bits_decreasing() {
        let store = store(|c| {
            c.bit_major_declaration = false;
            c.bits_increasing = false;
            c.default_bitwidth = 8;
            c.max_bitwidth = 8;
        });
        let regions = Rc::clone(store.regions());
        let a = store.bind(&ScopedName::global("a"), 2);
        // Bit 1 sits earlier in the order than bit 0.
        assert!(regions.variable(a.bit(1).index()) < regions.variable(a.bit(0).index()));
    }

    #[test]
    fn test_installed_order() {
        let store = store(|_| {});
        let (a, b) = (ScopedName::global("a"), ScopedName::global("b"));
        store.install_variable_order([b.clone(), a.clone()]);
        let bv_a = store.bind(&a, 1);
        let bv_b = store.bind(&b, 1);
        let regions = store.regions();
        // b was installed first, so its region variable comes first.
        assert!(regions.variable(bv_b.bit(0).index()) < regions.variable(bv_a.bit(0).index()));
    }

    #[test]
    fn test_installed_order_ignored_when_disabled() {
        let store = store(|c| c.partition_ordered = false);
        let (a, b) = (ScopedName::global("a"), ScopedName::global("b"));
        store.install_variable_order([b.clone(), a.clone()]);
        let bv_a = store.bind(&a, 1);
        let bv_b = store.bind(&b, 1);
        let regions = store.regions();
        // First-use order wins: a was bound first.
        assert!(regions.variable(bv_a.bit(0).index()) < regions.variable(bv_b.bit(0).index()));
    }

    #[test]
    fn test_write_variable_order() {
        let store = store(|_| {});
        store.bind(&ScopedName::global("x"), 1);
        store.bind(&ScopedName::local("f", "y"), 1);
        let mut out = Vec::new();
        store.write_variable_order(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x\nf::y\n");
    }

    #[test]
    fn test_bindings_in_scope() {
        let store = store(|_| {});
        store.bind(&ScopedName::local("f", "x"), 1);
        store.bind(&ScopedName::local("g", "x"), 1);
        store.bind(&ScopedName::global("z"), 1);
        let in_f = store.bindings_in_scope("f");
        assert_eq!(in_f.len(), 1);
        assert_eq!(in_f[0].0, ScopedName::local("f", "x"));
    }
}

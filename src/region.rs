//! Canonical boolean-formula regions.
//!
//! A [`Region`] is an immutable, structurally shared boolean formula over
//! numbered bit-predicates. All regions live in a [`RegionManager`], which
//! hash-conses nodes so that two regions representing the same formula are
//! the *same* handle: equality and hashing are O(1).
//!
//! The manager is a reduced ordered BDD with complement edges. Negation is
//! free (`-r`), the `high` child of a stored node is never negated, and the
//! variable order is the numeric order of variable ids, fixed for the
//! manager's lifetime. The rest of the engine consumes regions only through
//! the small interface here: `apply_*` connectives, [`exists`] for forgetting
//! bits, and [`entails`] for the lattice order.
//!
//! [`exists`]: RegionManager::exists
//! [`entails`]: RegionManager::entails

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{self, Debug, Display};
use std::ops::Neg;

use log::debug;

use crate::cache::{pairing3, Cache, CacheKey};

/// Opaque handle to a canonical formula node.
///
/// The sign encodes a complement edge: `-r` is the negation of `r` and costs
/// nothing. Index 1 is the terminal `one`; its complement is `zero`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Region(i32);

impl Region {
    pub(crate) const fn positive(index: u32) -> Self {
        Region(index as i32)
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    /// Index of the underlying node, ignoring the complement edge.
    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    /// Signed-to-unsigned packing for cache keys.
    pub(crate) fn as_key(self) -> u64 {
        ((self.0.unsigned_abs() as u64) << 1) | (self.0 < 0) as u64
    }
}

impl Neg for Region {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Region(-self.0)
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Region,
    high: Region,
}

#[derive(Debug, Eq, PartialEq, Clone)]
enum OpKey {
    Ite(Region, Region, Region),
}

impl CacheKey for OpKey {
    fn hash(&self) -> u64 {
        match self {
            OpKey::Ite(f, g, h) => pairing3(f.as_key(), g.as_key(), h.as_key()),
        }
    }
}

/// Manager owning the shared node table and operation caches.
///
/// All region operations go through the manager. Interior mutability keeps
/// the public API `&self`, matching the value-like feel of regions; the
/// manager is single-threaded by construction (one manager per analysis).
pub struct RegionManager {
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<HashMap<Node, u32>>,
    ite_cache: RefCell<Cache<OpKey, Region>>,
    size_cache: RefCell<Cache<(u64, u64), u64>>,
    max_nodes: usize,
    pub zero: Region,
    pub one: Region,
}

impl RegionManager {
    /// Create a manager with room for `2^storage_bits` nodes.
    ///
    /// Exhausting the node table is a fatal failure (the underlying formula
    /// blew up); it panics rather than returning a recoverable error, since
    /// intermediate analysis state cannot be salvaged.
    pub fn new(storage_bits: usize) -> Self {
        assert!(storage_bits <= 31, "Storage bits should be in the range 0..=31");

        let cache_bits = storage_bits.min(16);

        // Slot 0 is unused, slot 1 is the terminal node.
        let terminal = Node {
            variable: 0,
            low: Region(1),
            high: Region(1),
        };
        let nodes = vec![terminal, terminal];
        let one = Region::positive(1);
        let zero = -one;

        Self {
            nodes: RefCell::new(nodes),
            unique: RefCell::new(HashMap::new()),
            ite_cache: RefCell::new(Cache::new(cache_bits)),
            size_cache: RefCell::new(Cache::new(cache_bits)),
            max_nodes: 1usize << storage_bits,
            zero,
            one,
        }
    }
}

impl Default for RegionManager {
    fn default() -> Self {
        RegionManager::new(20)
    }
}

impl Debug for RegionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionManager")
            .field("nodes", &(self.nodes.borrow().len() - 2))
            .field("capacity", &self.max_nodes)
            .finish()
    }
}

impl RegionManager {
    pub fn variable(&self, index: u32) -> u32 {
        self.nodes.borrow()[index as usize].variable
    }
    pub fn low(&self, index: u32) -> Region {
        self.nodes.borrow()[index as usize].low
    }
    pub fn high(&self, index: u32) -> Region {
        self.nodes.borrow()[index as usize].high
    }

    /// Low child with the complement edge of `node` pushed down.
    pub fn low_node(&self, node: Region) -> Region {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    /// High child with the complement edge of `node` pushed down.
    pub fn high_node(&self, node: Region) -> Region {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Region) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Region) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Region) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    /// Number of live (hash-consed) nodes, terminals excluded.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len() - 2
    }

    pub fn mk_node(&self, v: u32, low: Region, high: Region) -> Region {
        debug!("mk(v = {}, low = {}, high = {})", v, low, high);

        assert_ne!(v, 0, "Variable index should not be zero");

        // Canonicity: the high child is never negated.
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        // Reduction: both children equal.
        if low == high {
            return low;
        }

        let node = Node { variable: v, low, high };
        if let Some(&i) = self.unique.borrow().get(&node) {
            return Region::positive(i);
        }

        let mut nodes = self.nodes.borrow_mut();
        assert!(nodes.len() < self.max_nodes, "Region node table exhausted");
        let i = nodes.len() as u32;
        nodes.push(node);
        self.unique.borrow_mut().insert(node, i);
        Region::positive(i)
    }

    pub fn mk_var(&self, v: u32) -> Region {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.mk_node(v, self.zero, self.one)
    }

    /// Cofactors of `node` with respect to variable `v`, which must be at or
    /// above the node's top variable in the order.
    pub fn top_cofactors(&self, node: Region, v: u32) -> (Region, Region) {
        assert_ne!(v, 0, "Variable index should not be zero");

        let i = node.index();
        if self.is_terminal(node) || v < self.variable(i) {
            return (node, node);
        }
        assert_eq!(v, self.variable(i));
        if node.is_negated() {
            (-self.low(i), -self.high(i))
        } else {
            (self.low(i), self.high(i))
        }
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Region, g: Region, h: Region) -> Region {
        debug!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

        // From now on, F is known not to be a constant
        assert!(!self.is_terminal(f));

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        let (f, mut g, mut h) = (f, g, h);
        if g == f {
            g = self.one;
        } else if g == -f {
            g = self.zero;
        }
        if h == f {
            h = self.zero;
        } else if h == -f {
            h = self.one;
        }

        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Normalization: make F regular, then G.
        //   ite(~F,G,H) => ite(F,H,G)
        //   ite(F,~G,H) => ~ite(F,G,~H)
        let mut f = f;
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }

        let key = OpKey::Ite(f, g, h);
        if let Some(&res) = self.ite_cache.borrow().get(&key) {
            return if n { -res } else { res };
        }

        // Determine the top variable:
        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());
        assert_ne!(i, 0);
        let mut m = i;
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }
        assert_ne!(m, 0);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);

        let res = self.mk_node(m, e, t);
        debug!("computed: apply_ite(f = {}, g = {}, h = {}) -> {}", f, g, h, res);
        self.ite_cache.borrow_mut().insert(&key, res);

        if n {
            -res
        } else {
            res
        }
    }

    fn maybe_constant(&self, node: Region) -> Option<bool> {
        if self.is_zero(node) {
            Some(false)
        } else if self.is_one(node) {
            Some(true)
        } else {
            None
        }
    }

    /// Early-terminating check whether `ITE(f, g, h)` is a constant, without
    /// building any new nodes.
    pub fn ite_constant(&self, f: Region, g: Region, h: Region) -> Option<bool> {
        if self.is_one(f) {
            return self.maybe_constant(g);
        }
        if self.is_zero(f) {
            return self.maybe_constant(h);
        }

        if g == h {
            return self.maybe_constant(g);
        }
        if self.is_one(g) && self.is_zero(h) {
            return None;
        }
        if self.is_zero(g) && self.is_one(h) {
            return None;
        }
        if self.is_one(g) && h == -f {
            return Some(true);
        }
        if g == f && self.is_one(h) {
            return Some(true);
        }
        if g == -f && self.is_zero(h) {
            return Some(false);
        }
        if self.is_zero(g) && h == f {
            return None;
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let k = self.variable(h.index());
        assert_ne!(i, 0);
        let mut m = i;
        if j != 0 {
            m = m.min(j);
        }
        if k != 0 {
            m = m.min(k);
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let t = self.ite_constant(f1, g1, h1)?;
        let e = self.ite_constant(f0, g0, h0)?;
        if t == e {
            Some(t)
        } else {
            None
        }
    }

    /// Logical entailment: `f ⇒ g`.
    ///
    /// This is the lattice order on analysis facts. Decided without building
    /// nodes via [`ite_constant`][Self::ite_constant].
    pub fn entails(&self, f: Region, g: Region) -> bool {
        debug!("entails(f = {}, g = {})", f, g);
        self.ite_constant(f, g, self.one) == Some(true)
    }

    pub fn apply_not(&self, f: Region) -> Region {
        -f
    }

    pub fn apply_and(&self, u: Region, v: Region) -> Region {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Region, v: Region) -> Region {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Region, v: Region) -> Region {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Region, v: Region) -> Region {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Region>) -> Region {
        let mut res = self.one;
        for node in nodes.into_iter() {
            res = self.apply_and(res, node);
        }
        res
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Region>) -> Region {
        let mut res = self.zero;
        for node in nodes.into_iter() {
            res = self.apply_or(res, node);
        }
        res
    }

    /// Existentially eliminate the given variables from `f`:
    /// `∃v. f = f[v<-0] ∨ f[v<-1]` for each `v` in `vars`.
    ///
    /// This is the "forget" primitive: after eliminating the bits of a
    /// predicate binding, the fact no longer constrains (or correlates with)
    /// that binding.
    pub fn exists(&self, f: Region, vars: &HashSet<u32>) -> Region {
        debug!("exists(f = {}, vars = {:?})", f, vars);
        if vars.is_empty() {
            return f;
        }
        let mut cache = HashMap::new();
        self.exists_(f, vars, &mut cache)
    }

    fn exists_(&self, f: Region, vars: &HashSet<u32>, cache: &mut HashMap<Region, Region>) -> Region {
        if self.is_terminal(f) {
            return f;
        }

        if let Some(&res) = cache.get(&f) {
            return res;
        }

        let v = self.variable(f.index());
        let low = self.exists_(self.low_node(f), vars, cache);
        let high = self.exists_(self.high_node(f), vars, cache);

        let res = if vars.contains(&v) {
            self.apply_or(low, high)
        } else {
            self.mk_node(v, low, high)
        };
        cache.insert(f, res);
        res
    }

    /// The set of variables `f` depends on.
    pub fn support(&self, f: Region) -> HashSet<u32> {
        let mut support = HashSet::new();
        for i in self.descendants([f]) {
            let v = self.variable(i);
            if v != 0 {
                support.insert(v);
            }
        }
        support
    }

    /// Indices of all nodes reachable from the given roots (terminal included).
    pub fn descendants(&self, nodes: impl IntoIterator<Item = Region>) -> HashSet<u32> {
        let mut visited = HashSet::new();
        visited.insert(self.one.index());
        let mut queue = VecDeque::from_iter(nodes);

        while let Some(node) = queue.pop_front() {
            let i = node.index();
            if visited.insert(i) {
                queue.push_back(self.low(i));
                queue.push_back(self.high(i));
            }
        }

        visited
    }

    /// Number of distinct nodes in `f`, terminal included.
    pub fn size(&self, f: Region) -> u64 {
        let key = (f.as_key(), 0);
        if let Some(&size) = self.size_cache.borrow().get(&key) {
            return size;
        }
        let size = self.descendants([f]).len() as u64;
        self.size_cache.borrow_mut().insert(&key, size);
        size
    }

    /// Render `f` as a nested `(var, high, low)` bracket string.
    pub fn to_bracket_string(&self, node: Region) -> String {
        if self.is_zero(node) {
            return "(0)".to_string();
        } else if self.is_one(node) {
            return "(1)".to_string();
        }

        let v = self.variable(node.index());
        let low = self.low_node(node);
        let high = self.high_node(node);

        format!(
            "{}:(x{}, {}, {})",
            node,
            v,
            self.to_bracket_string(high),
            self.to_bracket_string(low)
        )
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_var() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);

        assert_eq!(mgr.variable(x.index()), 1);
        assert_eq!(mgr.high_node(x), mgr.one);
        assert_eq!(mgr.low_node(x), mgr.zero);
    }

    #[test]
    fn test_canonicity() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(2);

        let f = mgr.apply_and(x, y);
        let g = mgr.apply_and(y, x);
        assert_eq!(f, g);

        let h = -mgr.apply_or(-x, -y);
        assert_eq!(f, h); // De Morgan
    }

    #[test]
    fn test_xor() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(2);
        let f = mgr.apply_and(x, y);

        assert_eq!(mgr.apply_xor(f, f), mgr.zero);
        assert_eq!(mgr.apply_xor(f, -f), mgr.one);
        assert_eq!(mgr.apply_xor(x, mgr.zero), x);
        assert_eq!(mgr.apply_xor(x, mgr.one), -x);
    }

    #[test]
    fn test_apply_ite() {
        let mgr = RegionManager::default();

        let g = mgr.mk_var(2);
        let h = mgr.mk_var(3);
        assert_eq!(mgr.apply_ite(mgr.one, g, h), g);
        assert_eq!(mgr.apply_ite(mgr.zero, g, h), h);

        let f = mgr.mk_var(5);
        assert_eq!(mgr.apply_ite(f, g, g), g);
        assert_eq!(mgr.apply_ite(f, mgr.one, mgr.zero), f);
        assert_eq!(mgr.apply_ite(f, mgr.zero, mgr.one), -f);

        assert_eq!(mgr.apply_ite(f, f, h), mgr.apply_or(f, h));
        assert_eq!(mgr.apply_ite(f, g, f), mgr.apply_and(f, g));
    }

    #[test]
    fn test_entails() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(2);
        let f = mgr.apply_and(x, y);

        assert!(mgr.entails(f, x));
        assert!(mgr.entails(f, y));
        assert!(!mgr.entails(f, -x));
        assert!(!mgr.entails(x, f));
        assert!(mgr.entails(f, mgr.apply_or(x, y)));
        assert!(mgr.entails(mgr.zero, x));
        assert!(mgr.entails(x, mgr.one));
    }

    #[test]
    fn test_exists_single() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(2);
        let f = mgr.apply_and(x, y);

        // ∃x. (x ∧ y) = y
        let vars = HashSet::from([1]);
        assert_eq!(mgr.exists(f, &vars), y);

        // ∃y. (x ∧ y) = x
        let vars = HashSet::from([2]);
        assert_eq!(mgr.exists(f, &vars), x);

        // ∃x,y. (x ∧ y) = 1
        let vars = HashSet::from([1, 2]);
        assert_eq!(mgr.exists(f, &vars), mgr.one);
    }

    #[test]
    fn test_exists_keeps_unrelated() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(2);
        let z = mgr.mk_var(3);

        // ∃y. (x ∧ y ∧ z) = x ∧ z
        let f = mgr.apply_and_many([x, y, z]);
        let vars = HashSet::from([2]);
        assert_eq!(mgr.exists(f, &vars), mgr.apply_and(x, z));
    }

    #[test]
    fn test_exists_negated() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(2);

        // ∃x. ¬(x ∧ y) = 1, not ¬(∃x. x ∧ y)
        let f = -mgr.apply_and(x, y);
        let vars = HashSet::from([1]);
        assert_eq!(mgr.exists(f, &vars), mgr.one);
    }

    #[test]
    fn test_support() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(4);
        let f = mgr.apply_xor(x, y);

        assert_eq!(mgr.support(f), HashSet::from([1, 4]));
        assert!(mgr.support(mgr.one).is_empty());
    }

    #[test]
    fn test_size() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(2);

        assert_eq!(mgr.size(mgr.one), 1);
        assert_eq!(mgr.size(x), 2);
        assert_eq!(mgr.size(mgr.apply_and(x, y)), 3);
    }

    #[test]
    fn test_hash_consing() {
        let mgr = RegionManager::default();

        let x = mgr.mk_var(1);
        let y = mgr.mk_var(2);
        assert_eq!(mgr.num_nodes(), 2);

        // Re-deriving an existing function allocates nothing.
        let f = mgr.apply_and(x, y);
        let before = mgr.num_nodes();
        let g = mgr.apply_and(x, y);
        assert_eq!(f, g);
        assert_eq!(mgr.num_nodes(), before);
    }
}

//! The analysis lattice element: one region of known facts.
//!
//! An [`AnalysisState`] wraps a single [`Region`] — the conjunction of every
//! equality and assumption currently known. States are immutable values:
//! every operation returns a new state, or one of its operands when a fixed
//! point is detected. The lattice order is region entailment, the join is
//! disjunction, and a state whose fact is logically false marks an
//! infeasible path that callers must turn into "no successor".

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::bitvector::{Bitvector, BitvectorManager};
use crate::region::{Region, RegionManager};

#[derive(Clone)]
pub struct AnalysisState {
    fact: Region,
    regions: Rc<RegionManager>,
}

impl AnalysisState {
    /// The initial state: nothing is known, the fact is `true`.
    pub fn initial(regions: Rc<RegionManager>) -> Self {
        let fact = regions.one;
        Self { fact, regions }
    }

    pub fn with_fact(&self, fact: Region) -> Self {
        Self {
            fact,
            regions: Rc::clone(&self.regions),
        }
    }

    pub fn fact(&self) -> Region {
        self.fact
    }

    pub fn regions(&self) -> &Rc<RegionManager> {
        &self.regions
    }

    /// True when the fact is unsatisfiable: the path is infeasible.
    pub fn is_false(&self) -> bool {
        self.regions.is_zero(self.fact)
    }

    /// Least upper bound. Returns an operand unchanged when the join is a
    /// fixed point, so callers can detect stabilization by identity.
    pub fn join(&self, other: &AnalysisState) -> AnalysisState {
        let joined = self.regions.apply_or(self.fact, other.fact);
        if joined == other.fact {
            other.clone()
        } else if joined == self.fact {
            self.clone()
        } else {
            self.with_fact(joined)
        }
    }

    /// Lattice order: does this state's fact entail the other's?
    pub fn is_less_or_equal(&self, other: &AnalysisState) -> bool {
        self.regions.entails(self.fact, other.fact)
    }

    /// Conjoin a constraint into the fact.
    pub fn add_constraint(&self, constraint: Region) -> AnalysisState {
        self.with_fact(self.regions.apply_and(self.fact, constraint))
    }

    /// Conjoin the bitwise equality of two vectors into the fact.
    ///
    /// Either side may be absent ("could not be evaluated"); the assignment
    /// then soundly drops information instead of failing.
    pub fn add_assignment(
        &self,
        bvm: &BitvectorManager,
        lhs: Option<&Bitvector>,
        rhs: Option<&Bitvector>,
    ) -> AnalysisState {
        match (lhs, rhs) {
            (Some(lhs), Some(rhs)) => {
                let equality = bvm.make_equal(lhs, rhs);
                self.add_constraint(equality)
            }
            _ => {
                debug!("add_assignment: one side unevaluated, keeping state");
                self.clone()
            }
        }
    }

    /// Existentially eliminate the given bits from the fact.
    ///
    /// Required before rebinding a variable that might otherwise stay
    /// spuriously correlated with its old value.
    pub fn forget(&self, bits: impl IntoIterator<Item = Region>) -> AnalysisState {
        let mut vars: HashSet<u32> = HashSet::new();
        for bit in bits {
            vars.extend(self.regions.support(bit));
        }
        if vars.is_empty() {
            return self.clone();
        }
        self.with_fact(self.regions.exists(self.fact, &vars))
    }

    /// Forget every bit of the given bindings.
    pub fn forget_bindings<'a>(
        &self,
        bindings: impl IntoIterator<Item = &'a Bitvector>,
    ) -> AnalysisState {
        self.forget(bindings.into_iter().flat_map(|bv| bv.iter()))
    }
}

impl PartialEq for AnalysisState {
    fn eq(&self, other: &Self) -> bool {
        // Regions are canonical: same fact, same state.
        self.fact == other.fact
    }
}

impl Eq for AnalysisState {}

impl fmt::Debug for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_false() {
            write!(f, "AnalysisState(⊥)")
        } else if self.regions.is_one(self.fact) {
            write!(f, "AnalysisState(⊤)")
        } else {
            write!(f, "AnalysisState({})", self.fact)
        }
    }
}

impl fmt::Display for AnalysisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_false() {
            write!(f, "⊥")
        } else if self.regions.is_one(self.fact) {
            write!(f, "⊤")
        } else {
            write!(f, "{}", self.fact)
        }
    }
}

//! Transfer relation over control-flow edges.
//!
//! [`TransferRelation`] consumes one [`CfgEdge`] at a time and produces zero
//! or one successor [`AnalysisState`]. Zero successors mean the edge is
//! infeasible under the current fact, never an error.
//!
//! The external fixed-point driver invokes the relation once per edge. The
//! driver supplies a cooperative shutdown check; the relation consults it
//! before doing any work on an edge and reports [`Interrupted`] when the
//! host has requested cancellation.

use std::error::Error;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::bitvector::Bitvector;
use crate::compile::ExpressionCompiler;
use crate::config::AnalysisConfig;
use crate::expr::{CType, Expr, ScopedName};
use crate::ordering::PartitionInfo;
use crate::predicate::PredicateStore;
use crate::region::RegionManager;
use crate::state::AnalysisState;

/// Predicate name holding a function's return value between the return
/// statement and the matching return edge.
const RETURN_VARIABLE: &str = "__retval__";

/// The host requested cancellation between edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "analysis interrupted by host shutdown request")
    }
}

impl Error for Interrupted {}

/// One argument of a function call: the caller-side expression together
/// with the callee-scoped parameter it binds.
#[derive(Debug, Clone)]
pub struct Argument {
    pub param: ScopedName,
    pub ty: CType,
    pub partition: Option<PartitionInfo>,
    pub expr: Expr,
}

/// A control-flow edge event, carrying resolved types and partition
/// classifications from the host frontend.
#[derive(Debug, Clone)]
pub enum CfgEdge {
    /// `lhs = rhs`
    Assign {
        lhs: ScopedName,
        ty: CType,
        partition: Option<PartitionInfo>,
        rhs: Expr,
    },
    /// Declaration of `var`, with optional initializer.
    Declare {
        var: ScopedName,
        ty: CType,
        partition: Option<PartitionInfo>,
        init: Option<Expr>,
    },
    /// Call into `callee`, binding each argument to its parameter.
    Call { callee: String, args: Vec<Argument> },
    /// `return expr?` inside `function`.
    Return {
        function: String,
        ty: CType,
        partition: Option<PartitionInfo>,
        expr: Option<Expr>,
    },
    /// The edge back to the caller, optionally assigning the call-site lhs.
    ReturnEdge {
        function: String,
        ty: CType,
        partition: Option<PartitionInfo>,
        lhs: Option<ScopedName>,
    },
    /// Branch condition, taken with the given polarity.
    Assume {
        condition: Expr,
        ty: CType,
        partition: Option<PartitionInfo>,
        polarity: bool,
    },
    /// Anything the analysis does not model.
    Other,
}

pub struct TransferRelation {
    compiler: ExpressionCompiler,
    predicates: Rc<PredicateStore>,
}

impl TransferRelation {
    pub fn new(regions: Rc<RegionManager>, config: &AnalysisConfig) -> Self {
        let predicates = Rc::new(PredicateStore::new(Rc::clone(&regions), config));
        Self {
            compiler: ExpressionCompiler::new(regions, config),
            predicates,
        }
    }

    pub fn predicates(&self) -> &Rc<PredicateStore> {
        &self.predicates
    }

    pub fn compiler(&self) -> &ExpressionCompiler {
        &self.compiler
    }

    /// Apply one edge to `state`.
    ///
    /// `Ok(None)` means the edge is infeasible from `state` and the path is
    /// pruned. `Err(Interrupted)` is returned without touching the state
    /// when `shutdown` reports a pending cancellation.
    pub fn successor(
        &self,
        state: &AnalysisState,
        edge: &CfgEdge,
        shutdown: &dyn Fn() -> bool,
    ) -> Result<Option<AnalysisState>, Interrupted> {
        if shutdown() {
            return Err(Interrupted);
        }
        let next = match edge {
            CfgEdge::Assign {
                lhs,
                ty,
                partition,
                rhs,
            } => self.handle_assign(state, lhs, *ty, partition.as_ref(), rhs),
            CfgEdge::Declare {
                var,
                ty,
                partition,
                init,
            } => self.handle_declare(state, var, *ty, partition.as_ref(), init.as_ref()),
            CfgEdge::Call { callee, args } => self.handle_call(state, callee, args),
            CfgEdge::Return {
                function,
                ty,
                partition,
                expr,
            } => self.handle_return(state, function, *ty, partition.as_ref(), expr.as_ref()),
            CfgEdge::ReturnEdge {
                function,
                ty,
                partition,
                lhs,
            } => self.handle_return_edge(state, function, *ty, partition.as_ref(), lhs.as_ref()),
            CfgEdge::Assume {
                condition,
                ty,
                partition,
                polarity,
            } => self.handle_assume(state, condition, *ty, partition.as_ref(), *polarity),
            CfgEdge::Other => state.clone(),
        };
        if next.is_false() {
            debug!("infeasible path, pruning");
            return Ok(None);
        }
        Ok(Some(next))
    }

    fn handle_assign(
        &self,
        state: &AnalysisState,
        lhs: &ScopedName,
        ty: CType,
        partition: Option<&PartitionInfo>,
        rhs: &Expr,
    ) -> AnalysisState {
        let width = self.compiler.width_for(partition, Some(ty));
        let lhs_bits = self.predicates.bind(lhs, width);
        let rhs_bits = self
            .compiler
            .evaluate(rhs, partition, Some(ty), self.predicates.as_ref());

        let Some(rhs_bits) = rhs_bits else {
            // Opaque rhs: the target may now hold anything.
            debug!("assignment to {} has unmodeled rhs, forgetting target", lhs);
            return state.forget_bindings([&lhs_bits]);
        };

        if rhs.contains_var(lhs) {
            // Self-reference (`a = !a`): evaluate into a temp before the
            // old value of lhs is erased, then drop the temp.
            let temp_bits = self.predicates.bind(&temp_for(lhs), width);
            let state = state.add_assignment(self.compiler.bitvectors(), Some(&temp_bits), Some(&rhs_bits));
            let state = state.forget_bindings([&lhs_bits]);
            let state =
                state.add_assignment(self.compiler.bitvectors(), Some(&lhs_bits), Some(&temp_bits));
            state.forget_bindings([&temp_bits])
        } else {
            let state = state.forget_bindings([&lhs_bits]);
            state.add_assignment(self.compiler.bitvectors(), Some(&lhs_bits), Some(&rhs_bits))
        }
    }

    fn handle_declare(
        &self,
        state: &AnalysisState,
        var: &ScopedName,
        ty: CType,
        partition: Option<&PartitionInfo>,
        init: Option<&Expr>,
    ) -> AnalysisState {
        let width = self.compiler.width_for(partition, Some(ty));
        let bits = self.predicates.bind(var, width);
        // A stale binding survives re-entry into the declaring block.
        let state = state.forget_bindings([&bits]);
        match init {
            Some(init) => self.handle_assign(&state, var, ty, partition, init),
            None => state,
        }
    }

    fn handle_call(&self, state: &AnalysisState, callee: &str, args: &[Argument]) -> AnalysisState {
        let mut state = state.clone();
        for arg in args {
            assert!(
                arg.param.is_scoped_to(callee),
                "Call parameter {} must be scoped to the callee {}",
                arg.param,
                callee
            );
            let width = self.compiler.width_for(arg.partition.as_ref(), Some(arg.ty));
            // Argument expressions are evaluated in the caller's scope;
            // parameter predicates are fresh, so no pre-forget is needed.
            let value = self.compiler.evaluate(
                &arg.expr,
                arg.partition.as_ref(),
                Some(arg.ty),
                self.predicates.as_ref(),
            );
            let param_bits = self.predicates.bind(&arg.param, width);
            state = state.add_assignment(
                self.compiler.bitvectors(),
                Some(&param_bits),
                value.as_ref(),
            );
        }
        state
    }

    fn handle_return(
        &self,
        state: &AnalysisState,
        function: &str,
        ty: CType,
        partition: Option<&PartitionInfo>,
        expr: Option<&Expr>,
    ) -> AnalysisState {
        let state = match expr {
            Some(expr) => {
                let retval = ScopedName::local(function, RETURN_VARIABLE);
                let state = self.handle_assign(state, &retval, ty, partition, expr);
                // Keep the return value alive across the scope wipe below.
                let keep = self.predicates.bind(&retval, self.compiler.width_for(partition, Some(ty)));
                return self.forget_function_scope(&state, function, Some(&keep));
            }
            None => state.clone(),
        };
        self.forget_function_scope(&state, function, None)
    }

    fn handle_return_edge(
        &self,
        state: &AnalysisState,
        function: &str,
        ty: CType,
        partition: Option<&PartitionInfo>,
        lhs: Option<&ScopedName>,
    ) -> AnalysisState {
        let state = match lhs {
            Some(lhs) => {
                let width = self.compiler.width_for(partition, Some(ty));
                let retval_bits = self
                    .predicates
                    .bind(&ScopedName::local(function, RETURN_VARIABLE), width);
                let lhs_bits = self.predicates.bind(lhs, width);
                let state = state.forget_bindings([&lhs_bits]);
                state.add_assignment(
                    self.compiler.bitvectors(),
                    Some(&lhs_bits),
                    Some(&retval_bits),
                )
            }
            None => state.clone(),
        };
        // Covers both early returns and fallthrough, and keeps the shared
        // formula from growing across repeated or recursive calls.
        self.forget_function_scope(&state, function, None)
    }

    fn handle_assume(
        &self,
        state: &AnalysisState,
        condition: &Expr,
        ty: CType,
        partition: Option<&PartitionInfo>,
        polarity: bool,
    ) -> AnalysisState {
        let region = self.compiler.evaluate_predicate(
            condition,
            partition,
            Some(ty),
            self.predicates.as_ref(),
        );
        match region {
            Some(region) => {
                let region = if polarity { region } else { -region };
                state.add_constraint(region)
            }
            None => {
                // An unmodeled condition constrains nothing.
                debug!("assume condition unmodeled, keeping state");
                state.clone()
            }
        }
    }

    /// Existentially drop every predicate scoped to `function`, except
    /// `keep` (the in-flight return value, if any).
    fn forget_function_scope(
        &self,
        state: &AnalysisState,
        function: &str,
        keep: Option<&Bitvector>,
    ) -> AnalysisState {
        let locals = self.predicates.bindings_in_scope(function);
        let bits = locals
            .iter()
            .filter(|(_, bv)| keep.map_or(true, |k| k != bv))
            .flat_map(|(_, bv)| bv.iter());
        state.forget(bits)
    }
}

fn temp_for(lhs: &ScopedName) -> ScopedName {
    // One temp per assignment target keeps the memoized binding width
    // stable across repeated visits to the same statement.
    ScopedName {
        function: lhs.function.clone(),
        name: format!("{}!tmp", lhs.name),
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use num_bigint::BigInt;

    use crate::expr::BinaryOp;
    use crate::expr::UnaryOp;
    use crate::ordering::{PartitionId, PartitionKind};

    use super::*;

    fn no_shutdown() -> bool {
        false
    }

    fn bool_part() -> Option<PartitionInfo> {
        Some(PartitionInfo {
            id: PartitionId(1),
            kind: PartitionKind::Boolean,
            literals: vec![],
            var_count: 4,
        })
    }

    fn int_part() -> Option<PartitionInfo> {
        Some(PartitionInfo {
            id: PartitionId(2),
            kind: PartitionKind::IntAdd,
            literals: vec![],
            var_count: 4,
        })
    }

    fn setup() -> (Rc<RegionManager>, TransferRelation, AnalysisState) {
        let regions = Rc::new(RegionManager::default());
        let relation = TransferRelation::new(Rc::clone(&regions), &AnalysisConfig::default());
        let state = AnalysisState::initial(Rc::clone(&regions));
        (regions, relation, state)
    }

    fn apply(relation: &TransferRelation, state: &AnalysisState, edge: CfgEdge) -> AnalysisState {
        relation
            .successor(state, &edge, &no_shutdown)
            .unwrap()
            .expect("edge must be feasible")
    }

    fn states_equivalent(a: &AnalysisState, b: &AnalysisState) -> bool {
        a.is_less_or_equal(b) && b.is_less_or_equal(a)
    }

    #[test]
    fn test_shutdown_interrupts() {
        let (_, relation, state) = setup();
        let result = relation.successor(&state, &CfgEdge::Other, &|| true);
        assert_eq!(result, Err(Interrupted));
    }

    #[test]
    fn test_assign_literal_then_assume() {
        let (regions, relation, state) = setup();
        let a = ScopedName::global("a");

        let state = apply(
            &relation,
            &state,
            CfgEdge::Assign {
                lhs: a.clone(),
                ty: CType::boolean(),
                partition: bool_part(),
                rhs: Expr::literal(1),
            },
        );
        // a == 1 entails a.
        let a_bit = relation.predicates().bind(&a, 1).bit(0);
        assert!(regions.entails(state.fact(), a_bit));

        // assume(!a) is infeasible now.
        let result = relation
            .successor(
                &state,
                &CfgEdge::Assume {
                    condition: Expr::var(a.clone()),
                    ty: CType::boolean(),
                    partition: bool_part(),
                    polarity: false,
                },
                &no_shutdown,
            )
            .unwrap();
        assert!(result.is_none());

        // assume(a) keeps the state feasible.
        let result = relation
            .successor(
                &state,
                &CfgEdge::Assume {
                    condition: Expr::var(a),
                    ty: CType::boolean(),
                    partition: bool_part(),
                    polarity: true,
                },
                &no_shutdown,
            )
            .unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn test_self_referential_assignment() {
        let (regions, relation, state) = setup();
        let a = ScopedName::global("a");

        // a = 1; a = !a; the result must encode a == 0, not bottom.
        let state = apply(
            &relation,
            &state,
            CfgEdge::Assign {
                lhs: a.clone(),
                ty: CType::boolean(),
                partition: bool_part(),
                rhs: Expr::literal(1),
            },
        );
        let state = apply(
            &relation,
            &state,
            CfgEdge::Assign {
                lhs: a.clone(),
                ty: CType::boolean(),
                partition: bool_part(),
                rhs: Expr::unary(UnaryOp::Not, Expr::var(a.clone())),
            },
        );
        assert!(!state.is_false());
        let a_bit = relation.predicates().bind(&a, 1).bit(0);
        assert!(regions.entails(state.fact(), -a_bit));
        assert!(!regions.entails(state.fact(), a_bit));
    }

    #[test]
    fn test_unmodeled_rhs_forgets_target() {
        let (regions, relation, state) = setup();
        let a = ScopedName::global("a");

        let state = apply(
            &relation,
            &state,
            CfgEdge::Assign {
                lhs: a.clone(),
                ty: CType::boolean(),
                partition: bool_part(),
                rhs: Expr::literal(1),
            },
        );
        let state = apply(
            &relation,
            &state,
            CfgEdge::Assign {
                lhs: a.clone(),
                ty: CType::boolean(),
                partition: bool_part(),
                rhs: Expr::Unknown,
            },
        );
        // Nothing is known about a anymore.
        let a_bit = relation.predicates().bind(&a, 1).bit(0);
        assert!(!regions.entails(state.fact(), a_bit));
        assert!(!regions.entails(state.fact(), -a_bit));
    }

    #[test]
    fn test_declare_shadowing_forgets_stale_binding() {
        let (regions, relation, state) = setup();
        let x = ScopedName::local("f", "x");
        let ty = CType::new(8, true);

        let state = apply(
            &relation,
            &state,
            CfgEdge::Declare {
                var: x.clone(),
                ty,
                partition: int_part(),
                init: Some(Expr::literal(7)),
            },
        );
        // Re-entering the block re-declares x without an initializer.
        let state = apply(
            &relation,
            &state,
            CfgEdge::Declare {
                var: x.clone(),
                ty,
                partition: int_part(),
                init: None,
            },
        );
        let seven = relation
            .compiler()
            .bitvectors()
            .make_number(&BigInt::from(7), 8);
        let x_bits = relation.predicates().bind(&x, 8);
        let still_seven = relation.compiler().bitvectors().make_equal(&x_bits, &seven);
        assert!(!regions.entails(state.fact(), still_seven));
    }

    #[test]
    fn test_call_return_scope_cleanup() {
        let (_, relation, state) = setup();
        let g = ScopedName::global("g");
        let ty = CType::new(8, true);

        // Establish a caller-side fact: g = 3.
        let pre_call = apply(
            &relation,
            &state,
            CfgEdge::Assign {
                lhs: g.clone(),
                ty,
                partition: int_part(),
                rhs: Expr::literal(3),
            },
        );

        // Call f(g + 1); the callee touches no globals.
        let p = ScopedName::local("f", "p");
        let state = apply(
            &relation,
            &pre_call,
            CfgEdge::Call {
                callee: "f".into(),
                args: vec![Argument {
                    param: p.clone(),
                    ty,
                    partition: int_part(),
                    expr: Expr::binary(BinaryOp::Add, Expr::var(g.clone()), Expr::literal(1)),
                }],
            },
        );
        let state = apply(
            &relation,
            &state,
            CfgEdge::Return {
                function: "f".into(),
                ty,
                partition: int_part(),
                expr: Some(Expr::var(p)),
            },
        );
        let state = apply(
            &relation,
            &state,
            CfgEdge::ReturnEdge {
                function: "f".into(),
                ty,
                partition: int_part(),
                lhs: None,
            },
        );
        // No leaked locals: the fact is equivalent to the pre-call fact.
        assert!(states_equivalent(&state, &pre_call));
    }

    #[test]
    fn test_return_value_reaches_caller() {
        let (regions, relation, state) = setup();
        let r = ScopedName::global("r");
        let ty = CType::new(8, true);

        let p = ScopedName::local("f", "p");
        let state = apply(
            &relation,
            &state,
            CfgEdge::Call {
                callee: "f".into(),
                args: vec![Argument {
                    param: p.clone(),
                    ty,
                    partition: int_part(),
                    expr: Expr::literal(20),
                }],
            },
        );
        // return p + 1;
        let state = apply(
            &relation,
            &state,
            CfgEdge::Return {
                function: "f".into(),
                ty,
                partition: int_part(),
                expr: Some(Expr::binary(BinaryOp::Add, Expr::var(p), Expr::literal(1))),
            },
        );
        // r = f(20);
        let state = apply(
            &relation,
            &state,
            CfgEdge::ReturnEdge {
                function: "f".into(),
                ty,
                partition: int_part(),
                lhs: Some(r.clone()),
            },
        );
        let r_bits = relation.predicates().bind(&r, 8);
        let twenty_one = relation
            .compiler()
            .bitvectors()
            .make_number(&BigInt::from(21), 8);
        let eq = relation
            .compiler()
            .bitvectors()
            .make_equal(&r_bits, &twenty_one);
        assert!(regions.entails(state.fact(), eq));

        // The callee scope itself is gone.
        assert!(relation
            .predicates()
            .bindings_in_scope("f")
            .iter()
            .flat_map(|(_, bv)| bv.iter())
            .map(|bit| regions.support(bit))
            .all(|vars| {
                let fact_vars = regions.support(state.fact());
                vars.iter().all(|v| !fact_vars.contains(v))
            }));
    }

    #[test]
    fn test_unmodeled_assume_keeps_state() {
        let (_, relation, state) = setup();
        let result = relation
            .successor(
                &state,
                &CfgEdge::Assume {
                    condition: Expr::Unknown,
                    ty: CType::boolean(),
                    partition: bool_part(),
                    polarity: true,
                },
                &no_shutdown,
            )
            .unwrap();
        assert_eq!(result, Some(state));
    }

    #[test]
    fn test_untracked_partition_is_noop() {
        let (_, relation, state) = setup();
        let a = ScopedName::global("a");
        // No partition classification at all: assignment only forgets.
        let next = apply(
            &relation,
            &state,
            CfgEdge::Assign {
                lhs: a,
                ty: CType::boolean(),
                partition: None,
                rhs: Expr::literal(1),
            },
        );
        assert!(states_equivalent(&next, &state));
    }
}

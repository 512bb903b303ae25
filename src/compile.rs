//! Expression evaluation strategies.
//!
//! Three interchangeable strategies translate typed expressions into region
//! vectors, selected per partition kind:
//!
//! - **boolean**: width 1, only the logical connectives;
//! - **compressed**: equality-only partitions encoded as codepoints of width
//!   ⌈log2(#literals + #vars)⌉, with literals 0 and 1 pinned to codepoints
//!   0 and 1 so boolean-derived comparisons stay compatible;
//! - **vector**: full two's-complement arithmetic at the declared width.
//!
//! Every strategy returns `Option<Bitvector>`; `None` means "unsupported"
//! and propagates upward through parent expressions unchanged, so absence of
//! information is monotone. Variable access goes through an injected
//! [`ResolveVariable`] capability rather than a fixed store type.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use num_bigint::BigInt;

use crate::bitvector::{Bitvector, BitvectorManager};
use crate::config::AnalysisConfig;
use crate::expr::{BinaryOp, CType, Expr, ScopedName, UnaryOp};
use crate::ordering::{PartitionId, PartitionInfo, PartitionKind};
use crate::predicate::PredicateStore;
use crate::region::{Region, RegionManager};

/// Capability to resolve a scoped variable into its predicate binding.
pub trait ResolveVariable {
    fn resolve(&self, name: &ScopedName, width: usize) -> Option<Bitvector>;
}

impl ResolveVariable for PredicateStore {
    fn resolve(&self, name: &ScopedName, width: usize) -> Option<Bitvector> {
        Some(self.bind(name, width))
    }
}

/// ⌈log2(n)⌉ clamped to at least one bit.
fn ceil_log2(n: usize) -> usize {
    if n <= 2 {
        1
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }
}

struct CodepointTable {
    codes: HashMap<BigInt, u64>,
    width: usize,
}

/// Translates expressions into region vectors.
///
/// The codepoint tables are owned by the compiler instance (one per
/// analysis), never by global state, so independent analyses cannot leak
/// encodings into each other.
pub struct ExpressionCompiler {
    regions: Rc<RegionManager>,
    bvm: BitvectorManager,
    track_boolean: bool,
    track_int_equal: bool,
    track_int_add: bool,
    compress_int_equal: bool,
    default_bitwidth: usize,
    codepoints: RefCell<HashMap<PartitionId, Rc<CodepointTable>>>,
}

impl ExpressionCompiler {
    pub fn new(regions: Rc<RegionManager>, config: &AnalysisConfig) -> Self {
        Self {
            bvm: BitvectorManager::new(Rc::clone(&regions)),
            regions,
            track_boolean: config.track_boolean,
            track_int_equal: config.track_int_equal,
            track_int_add: config.track_int_add,
            compress_int_equal: config.compress_int_equal,
            default_bitwidth: config.default_bitwidth,
            codepoints: RefCell::new(HashMap::new()),
        }
    }

    pub fn bitvectors(&self) -> &BitvectorManager {
        &self.bvm
    }

    /// Width at which values of this partition are encoded.
    pub fn width_for(&self, partition: Option<&PartitionInfo>, ty: Option<CType>) -> usize {
        match partition {
            Some(info) if info.kind == PartitionKind::Boolean => 1,
            Some(info) if info.kind == PartitionKind::IntEqual && self.compress_int_equal => {
                self.codepoint_table(info).width
            }
            _ => ty.map(|t| t.width).unwrap_or(self.default_bitwidth),
        }
    }

    fn codepoint_table(&self, info: &PartitionInfo) -> Rc<CodepointTable> {
        if let Some(table) = self.codepoints.borrow().get(&info.id) {
            return Rc::clone(table);
        }

        // Codepoints 0 and 1 are pinned to the literals 0 and 1, keeping
        // compatibility with boolean-derived comparison results.
        let mut codes = HashMap::new();
        codes.insert(BigInt::from(0), 0u64);
        codes.insert(BigInt::from(1), 1u64);
        let mut next = 2u64;
        for literal in &info.literals {
            codes.entry(literal.clone()).or_insert_with(|| {
                let code = next;
                next += 1;
                code
            });
        }
        let width = ceil_log2(codes.len() + info.var_count);
        debug!(
            "codepoint table for partition {:?}: {} literals, width {}",
            info.id,
            codes.len(),
            width
        );

        let table = Rc::new(CodepointTable { codes, width });
        self.codepoints.borrow_mut().insert(info.id, Rc::clone(&table));
        table
    }

    /// Evaluate `expr` under the strategy chosen by its partition.
    ///
    /// Returns `None` when the partition is untracked (per configuration) or
    /// the expression contains a construct the strategy does not model.
    pub fn evaluate(
        &self,
        expr: &Expr,
        partition: Option<&PartitionInfo>,
        ty: Option<CType>,
        resolver: &dyn ResolveVariable,
    ) -> Option<Bitvector> {
        let info = partition?;
        match info.kind {
            PartitionKind::Boolean => {
                if !self.track_boolean {
                    return None;
                }
                self.eval_boolean(expr, resolver)
            }
            PartitionKind::IntEqual => {
                if !self.track_int_equal {
                    return None;
                }
                if self.compress_int_equal {
                    let table = self.codepoint_table(info);
                    self.eval_compressed(expr, &table, resolver)
                } else {
                    let ty = ty.unwrap_or(CType::new(self.default_bitwidth, true));
                    self.eval_vector(expr, ty.width, ty.signed, resolver)
                }
            }
            PartitionKind::IntAdd => {
                if !self.track_int_add {
                    return None;
                }
                let ty = ty.unwrap_or(CType::new(self.default_bitwidth, true));
                self.eval_vector(expr, ty.width, ty.signed, resolver)
            }
        }
    }

    /// Evaluate `expr` as a branch condition: a single region that is true
    /// exactly when the expression is nonzero.
    pub fn evaluate_predicate(
        &self,
        expr: &Expr,
        partition: Option<&PartitionInfo>,
        ty: Option<CType>,
        resolver: &dyn ResolveVariable,
    ) -> Option<Region> {
        let info = partition?;
        match info.kind {
            PartitionKind::Boolean => {
                if !self.track_boolean {
                    return None;
                }
                self.eval_boolean(expr, resolver).map(|bv| bv.bit(0))
            }
            _ => self
                .evaluate(expr, partition, ty, resolver)
                .map(|bv| self.bvm.any_bit_set(&bv)),
        }
    }

    /// Boolean strategy: width 1, logical connectives only.
    fn eval_boolean(&self, expr: &Expr, resolver: &dyn ResolveVariable) -> Option<Bitvector> {
        let r = &self.regions;
        let single = |region: Region| Some(Bitvector::new(vec![region]));
        match expr {
            Expr::Literal(v) => {
                if *v == BigInt::from(0) {
                    single(r.zero)
                } else if *v == BigInt::from(1) {
                    single(r.one)
                } else {
                    None
                }
            }
            Expr::Var(name) => resolver.resolve(name, 1),
            Expr::Unary(UnaryOp::Not, e) => {
                let inner = self.eval_boolean(e, resolver)?;
                single(-inner.bit(0))
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval_boolean(lhs, resolver)?;
                let b = self.eval_boolean(rhs, resolver)?;
                let (a, b) = (a.bit(0), b.bit(0));
                match op {
                    BinaryOp::LogicalAnd => single(r.apply_and(a, b)),
                    BinaryOp::LogicalOr => single(r.apply_or(a, b)),
                    BinaryOp::Eq => single(r.apply_eq(a, b)),
                    BinaryOp::Ne => single(r.apply_xor(a, b)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Compressed strategy: codepoint equality only.
    fn eval_compressed(
        &self,
        expr: &Expr,
        table: &CodepointTable,
        resolver: &dyn ResolveVariable,
    ) -> Option<Bitvector> {
        match expr {
            Expr::Literal(v) => {
                let code = *table.codes.get(v)?;
                Some(self.bvm.make_number(&BigInt::from(code), table.width))
            }
            Expr::Var(name) => resolver.resolve(name, table.width),
            Expr::Binary(op @ (BinaryOp::Eq | BinaryOp::Ne), lhs, rhs) => {
                let a = self.eval_compressed(lhs, table, resolver)?;
                let b = self.eval_compressed(rhs, table, resolver)?;
                let eq = self.bvm.make_equal(&a, &b);
                let bit = if *op == BinaryOp::Eq { eq } else { -eq };
                Some(Bitvector::new(vec![bit]))
            }
            _ => None,
        }
    }

    /// Vector strategy: full two's-complement arithmetic at `width`.
    fn eval_vector(
        &self,
        expr: &Expr,
        width: usize,
        signed: bool,
        resolver: &dyn ResolveVariable,
    ) -> Option<Bitvector> {
        let bvm = &self.bvm;
        let as_bool = |region: Region| {
            // Comparison results are one boolean bit, widened to the context.
            bvm.to_bitsize(width, false, &Bitvector::new(vec![region]))
        };
        match expr {
            Expr::Literal(v) => Some(bvm.make_number(v, width)),
            Expr::Var(name) => resolver.resolve(name, width),
            Expr::Unary(UnaryOp::Neg, e) => {
                let inner = self.eval_vector(e, width, signed, resolver)?;
                Some(bvm.make_neg(&inner))
            }
            Expr::Unary(UnaryOp::Not, e) => {
                // Logical not: x == 0. On width 1 this is the plain bit flip.
                let inner = self.eval_vector(e, width, signed, resolver)?;
                Some(as_bool(-bvm.any_bit_set(&inner)))
            }
            Expr::Unary(UnaryOp::BitNot, e) => {
                let inner = self.eval_vector(e, width, signed, resolver)?;
                Some(bvm.make_not(&inner))
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval_vector(lhs, width, signed, resolver)?;
                let b = self.eval_vector(rhs, width, signed, resolver)?;
                let result = match op {
                    BinaryOp::Add => bvm.make_add(&a, &b),
                    BinaryOp::Sub => bvm.make_sub(&a, &b),
                    BinaryOp::Mul => bvm.make_mult(&a, &b),
                    BinaryOp::Div => bvm.make_div(&a, &b, signed),
                    BinaryOp::Mod => bvm.make_mod(&a, &b, signed),
                    BinaryOp::Shl => bvm.make_shift_left(&a, &b),
                    BinaryOp::Shr => bvm.make_shift_right(&a, &b, signed),
                    BinaryOp::BitAnd => bvm.make_and(&a, &b),
                    BinaryOp::BitOr => bvm.make_or(&a, &b),
                    BinaryOp::BitXor => bvm.make_xor(&a, &b),
                    BinaryOp::Eq => as_bool(bvm.make_equal(&a, &b)),
                    BinaryOp::Ne => as_bool(-bvm.make_equal(&a, &b)),
                    BinaryOp::Lt => as_bool(bvm.make_less(&a, &b, signed)),
                    BinaryOp::Le => as_bool(bvm.make_less_or_equal(&a, &b, signed)),
                    BinaryOp::Gt => as_bool(bvm.make_less(&b, &a, signed)),
                    BinaryOp::Ge => as_bool(bvm.make_less_or_equal(&b, &a, signed)),
                    BinaryOp::LogicalAnd => {
                        let bit = self
                            .regions
                            .apply_and(bvm.any_bit_set(&a), bvm.any_bit_set(&b));
                        as_bool(bit)
                    }
                    BinaryOp::LogicalOr => {
                        let bit = self
                            .regions
                            .apply_or(bvm.any_bit_set(&a), bvm.any_bit_set(&b));
                        as_bool(bit)
                    }
                };
                Some(result)
            }
            Expr::Cast(src, e) => {
                // Evaluate at the source width, then extend or truncate to
                // the context using the source signedness.
                let inner = self.eval_vector(e, src.width, src.signed, resolver)?;
                Some(bvm.to_bitsize(width, src.signed, &inner))
            }
            Expr::Unknown => None,
        }
    }
}

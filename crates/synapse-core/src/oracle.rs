//! The expression oracle interface.
//!
//! Everything that needs to reason about symbolic values (equivalence checks,
//! simplification, byte-range decomposition of header fields) goes through an
//! explicit [`ExprOracle`] handle instead of a global solver. Components take
//! the handle as a parameter so it can be swapped for an SMT-backed
//! implementation or a test double.
//!
//! [`StructuralOracle`] is the reference implementation: it decides
//! equivalence syntactically after a small set of rewrites.

use crate::error::CoreError;
use crate::expr::{CmpOp, Expr};

/// A contiguous, symbol-aligned bit range of a composite expression.
///
/// `offset` is the position of the range inside the decomposed expression
/// (bit 0 is the least significant bit). `symbol_offset` is where the range
/// starts inside `symbol`; it is 0 for constant groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprGroup {
    /// The symbol the range is taken from, or `None` for constant bits.
    pub symbol: Option<String>,
    pub symbol_offset: u32,
    pub offset: u32,
    pub width: u32,
}

/// Symbolic-expression services consumed by the engine and generators.
pub trait ExprOracle: Send + Sync {
    /// Returns `true` if both expressions always evaluate to the same value.
    fn equivalent(&self, a: &Expr, b: &Expr) -> bool;

    fn simplify(&self, expr: &Expr) -> Expr;

    /// Extracts `width` bits starting at bit `offset`.
    fn extract(&self, expr: &Expr, offset: u32, width: u32) -> Expr;

    /// Concatenates parts, most significant first.
    fn concat(&self, parts: &[Expr]) -> Expr;

    /// Decomposes a composite value into symbol-aligned groups, ordered from
    /// the least significant bit upwards.
    fn groups(&self, expr: &Expr) -> Vec<ExprGroup>;

    /// The concrete value of a constant expression.
    fn constant_value(&self, expr: &Expr) -> Result<u64, CoreError>;

    /// Logical negation of a boolean expression.
    fn negate(&self, expr: &Expr) -> Expr {
        expr.negated()
    }
}

fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Syntactic oracle: two expressions are equivalent when their simplified
/// forms are structurally equal (modulo operand order of `==`/`!=`).
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralOracle;

impl StructuralOracle {
    pub fn new() -> Self {
        StructuralOracle
    }

    fn simplify_extract(&self, arg: Expr, offset: u32, width: u32) -> Expr {
        if offset == 0 && width == arg.width() {
            return arg;
        }
        match arg {
            Expr::Const { value, .. } => {
                let shifted = if offset >= 64 { 0 } else { value >> offset };
                Expr::constant(shifted & mask(width), width)
            }
            Expr::Extract {
                arg: inner,
                offset: inner_offset,
                ..
            } => self.simplify_extract(*inner, inner_offset + offset, width),
            Expr::Concat { parts } => {
                // Walk parts from the least significant end and look for the
                // single part that covers the requested range.
                let mut low = 0;
                for part in parts.iter().rev() {
                    let high = low + part.width();
                    if offset >= low && offset + width <= high {
                        return self.simplify_extract(part.clone(), offset - low, width);
                    }
                    low = high;
                }
                Expr::extract(Expr::Concat { parts }, offset, width)
            }
            other => Expr::extract(other, offset, width),
        }
    }

    fn simplify_concat(&self, parts: Vec<Expr>) -> Expr {
        let mut flat = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Expr::Concat { parts: inner } => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        let total: u32 = flat.iter().map(Expr::width).sum();
        if total <= 64 && flat.iter().all(|p| p.as_const().is_some()) {
            let value = flat.iter().fold(0u64, |acc, p| {
                let w = p.width();
                let shifted = if w >= 64 { 0 } else { acc << w };
                shifted | (p.as_const().unwrap_or(0) & mask(w))
            });
            return Expr::constant(value, total);
        }
        Expr::Concat { parts: flat }
    }
}

impl ExprOracle for StructuralOracle {
    fn equivalent(&self, a: &Expr, b: &Expr) -> bool {
        let a = self.simplify(a);
        let b = self.simplify(b);
        if a == b {
            return true;
        }
        match (&a, &b) {
            (
                Expr::Cmp { cmp: c1, lhs: l1, rhs: r1 },
                Expr::Cmp { cmp: c2, lhs: l2, rhs: r2 },
            ) if c1 == c2 && matches!(c1, CmpOp::Eq | CmpOp::Ne) => l1 == r2 && r1 == l2,
            _ => false,
        }
    }

    fn simplify(&self, expr: &Expr) -> Expr {
        match expr {
            Expr::Symbol { .. } | Expr::Const { .. } => expr.clone(),
            Expr::Not { arg } => match self.simplify(arg) {
                Expr::Not { arg } => *arg,
                Expr::Const { value, .. } => Expr::constant(u64::from(value == 0), 1),
                Expr::Cmp { cmp, lhs, rhs } => Expr::Cmp {
                    cmp: cmp.inverse(),
                    lhs,
                    rhs,
                },
                other => Expr::not(other),
            },
            Expr::And { lhs, rhs } => match (self.simplify(lhs), self.simplify(rhs)) {
                (Expr::Const { value: 0, .. }, _) | (_, Expr::Const { value: 0, .. }) => {
                    Expr::constant(0, 1)
                }
                (Expr::Const { .. }, other) | (other, Expr::Const { .. }) => other,
                (l, r) => Expr::and(l, r),
            },
            Expr::Or { lhs, rhs } => match (self.simplify(lhs), self.simplify(rhs)) {
                (Expr::Const { value: 0, .. }, other) | (other, Expr::Const { value: 0, .. }) => {
                    other
                }
                (Expr::Const { .. }, _) | (_, Expr::Const { .. }) => Expr::truth(),
                (l, r) => Expr::or(l, r),
            },
            Expr::Cmp { cmp, lhs, rhs } => {
                let l = self.simplify(lhs);
                let r = self.simplify(rhs);
                match (l.as_const(), r.as_const()) {
                    (Some(a), Some(b)) => Expr::constant(u64::from(cmp.eval(a, b)), 1),
                    _ if l == r && *cmp == CmpOp::Eq => Expr::truth(),
                    _ => Expr::cmp(*cmp, l, r),
                }
            }
            Expr::Extract { arg, offset, width } => {
                self.simplify_extract(self.simplify(arg), *offset, *width)
            }
            Expr::Concat { parts } => {
                self.simplify_concat(parts.iter().map(|p| self.simplify(p)).collect())
            }
            Expr::Apply { name, args, width } => Expr::Apply {
                name: name.clone(),
                args: args.iter().map(|a| self.simplify(a)).collect(),
                width: *width,
            },
        }
    }

    fn extract(&self, expr: &Expr, offset: u32, width: u32) -> Expr {
        self.simplify_extract(self.simplify(expr), offset, width)
    }

    fn concat(&self, parts: &[Expr]) -> Expr {
        self.simplify_concat(parts.iter().map(|p| self.simplify(p)).collect())
    }

    fn groups(&self, expr: &Expr) -> Vec<ExprGroup> {
        let simplified = self.simplify(expr);
        let parts = match simplified {
            Expr::Concat { parts } => parts,
            other => vec![other],
        };

        let mut groups: Vec<ExprGroup> = Vec::new();
        let mut offset = 0;
        for part in parts.iter().rev() {
            let width = part.width();
            let (symbol, symbol_offset) = match part {
                Expr::Symbol { name, .. } => (Some(name.clone()), 0),
                Expr::Extract {
                    arg,
                    offset: inner,
                    ..
                } => match arg.as_ref() {
                    Expr::Symbol { name, .. } => (Some(name.clone()), *inner),
                    _ => (None, 0),
                },
                _ => (None, 0),
            };

            // Merge with the previous group when it continues the same symbol.
            if let Some(last) = groups.last_mut() {
                let contiguous = last.symbol.is_some()
                    && last.symbol == symbol
                    && last.symbol_offset + last.width == symbol_offset;
                let both_const = last.symbol.is_none() && symbol.is_none();
                if contiguous || both_const {
                    last.width += width;
                    offset += width;
                    continue;
                }
            }
            groups.push(ExprGroup {
                symbol,
                symbol_offset,
                offset,
                width,
            });
            offset += width;
        }
        groups
    }

    fn constant_value(&self, expr: &Expr) -> Result<u64, CoreError> {
        self.simplify(expr)
            .as_const()
            .ok_or_else(|| CoreError::NotConstant { expr: expr.clone() })
    }
}

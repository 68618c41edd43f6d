//! Serializable symbolic expressions.
//!
//! [`Expr`] is the value language of the trace: call arguments, produced
//! symbols and branch conditions are all expressions. The search engine never
//! interprets them itself; equivalence, simplification and decomposition go
//! through an [`ExprOracle`](crate::oracle::ExprOracle). The only structural
//! operation provided here is [`Expr::negated`], which path constraints rely on
//! to pair a condition with its negation.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Unsigned comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl CmpOp {
    /// The operator `op'` such that `!(a op b) == (a op' b)`.
    pub fn inverse(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Ult => CmpOp::Uge,
            CmpOp::Ule => CmpOp::Ugt,
            CmpOp::Ugt => CmpOp::Ule,
            CmpOp::Uge => CmpOp::Ult,
        }
    }

    /// Evaluates the comparison on concrete values.
    pub fn eval(self, lhs: u64, rhs: u64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Ult => lhs < rhs,
            CmpOp::Ule => lhs <= rhs,
            CmpOp::Ugt => lhs > rhs,
            CmpOp::Uge => lhs >= rhs,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Ult => "<",
            CmpOp::Ule => "<=",
            CmpOp::Ugt => ">",
            CmpOp::Uge => ">=",
        }
    }
}

/// A fixed-width symbolic expression.
///
/// Widths are in bits. Boolean-valued expressions (`Not`, `And`, `Or`, `Cmp`)
/// have width 1. `Concat` parts are ordered most significant first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Symbol { name: String, width: u32 },
    Const { value: u64, width: u32 },
    Not { arg: Box<Expr> },
    And { lhs: Box<Expr>, rhs: Box<Expr> },
    Or { lhs: Box<Expr>, rhs: Box<Expr> },
    Cmp { cmp: CmpOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Extract { arg: Box<Expr>, offset: u32, width: u32 },
    Concat { parts: Vec<Expr> },
    /// Uninterpreted operation, e.g. a hash or an arithmetic op the oracle
    /// knows about but the engine does not.
    Apply { name: String, args: Vec<Expr>, width: u32 },
}

impl Expr {
    pub fn symbol(name: impl Into<String>, width: u32) -> Expr {
        Expr::Symbol {
            name: name.into(),
            width,
        }
    }

    pub fn constant(value: u64, width: u32) -> Expr {
        Expr::Const { value, width }
    }

    /// The boolean constant `true`.
    pub fn truth() -> Expr {
        Expr::Const { value: 1, width: 1 }
    }

    pub fn not(arg: Expr) -> Expr {
        Expr::Not { arg: Box::new(arg) }
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Expr {
        Expr::And {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Or {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn cmp(cmp: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Cmp {
            cmp,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        Expr::cmp(CmpOp::Eq, lhs, rhs)
    }

    pub fn extract(arg: Expr, offset: u32, width: u32) -> Expr {
        Expr::Extract {
            arg: Box::new(arg),
            offset,
            width,
        }
    }

    pub fn concat(parts: Vec<Expr>) -> Expr {
        Expr::Concat { parts }
    }

    /// Width of the expression in bits.
    pub fn width(&self) -> u32 {
        match self {
            Expr::Symbol { width, .. }
            | Expr::Const { width, .. }
            | Expr::Extract { width, .. }
            | Expr::Apply { width, .. } => *width,
            Expr::Not { .. } | Expr::And { .. } | Expr::Or { .. } | Expr::Cmp { .. } => 1,
            Expr::Concat { parts } => parts.iter().map(Expr::width).sum(),
        }
    }

    /// Returns the logical negation, stripping a leading `Not` instead of
    /// stacking a second one. `e.negated().negated() == e` for every `e`.
    pub fn negated(&self) -> Expr {
        match self {
            Expr::Not { arg } => (**arg).clone(),
            other => Expr::not(other.clone()),
        }
    }

    /// Returns `true` if `self` is structurally the negation of `other`.
    pub fn is_negation_of(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Not { arg }, _) if **arg == *other => true,
            (_, Expr::Not { arg }) if **arg == *self => true,
            _ => false,
        }
    }

    /// If the expression is a constant, its value.
    pub fn as_const(&self) -> Option<u64> {
        match self {
            Expr::Const { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Names of every symbol the expression mentions.
    pub fn symbols(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Symbol { name, .. } => {
                out.insert(name.as_str());
            }
            Expr::Const { .. } => {}
            Expr::Not { arg } | Expr::Extract { arg, .. } => arg.collect_symbols(out),
            Expr::And { lhs, rhs } | Expr::Or { lhs, rhs } | Expr::Cmp { lhs, rhs, .. } => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Expr::Concat { parts } => parts.iter().for_each(|p| p.collect_symbols(out)),
            Expr::Apply { args, .. } => args.iter().for_each(|a| a.collect_symbols(out)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Symbol { name, .. } => write!(f, "{}", name),
            Expr::Const { value, width } => write!(f, "{}w{}", value, width),
            Expr::Not { arg } => write!(f, "!({})", arg),
            Expr::And { lhs, rhs } => write!(f, "({} && {})", lhs, rhs),
            Expr::Or { lhs, rhs } => write!(f, "({} || {})", lhs, rhs),
            Expr::Cmp { cmp, lhs, rhs } => write!(f, "({} {} {})", lhs, cmp.symbol(), rhs),
            Expr::Extract { arg, offset, width } => {
                write!(f, "{}[{}:{}]", arg, (offset + width).saturating_sub(1), offset)
            }
            Expr::Concat { parts } => {
                write!(f, "{{")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, "}}")
            }
            Expr::Apply { name, args, .. } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

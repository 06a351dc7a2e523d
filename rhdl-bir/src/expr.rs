use core::fmt;

use rhdl_bitvec::{BitVec, Width};

use crate::component::SignalId;

/// Binary operator kinds.
///
/// Arithmetic and bitwise operators require both operands and the result to
/// share one width; comparisons produce a single bit; shift amounts are taken
/// from the runtime value of the right operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum BinaryOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Bitwise AND.
    And,
    /// Bitwise OR.
    Or,
    /// Bitwise XOR.
    Xor,
    /// Equality, 1-bit result.
    Eq,
    /// Inequality, 1-bit result.
    Ne,
    /// Unsigned less-than, 1-bit result.
    Lt,
    /// Unsigned less-or-equal, 1-bit result.
    Le,
    /// Unsigned greater-than, 1-bit result.
    Gt,
    /// Unsigned greater-or-equal, 1-bit result.
    Ge,
    /// Logical shift left.
    Shl,
    /// Logical shift right.
    Shr,
}

impl BinaryOp {
    /// True for the six comparison operators, whose result width is 1.
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Source-level symbol, used by diagnostics and the code generators.
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
pub enum UnaryOp {
    /// Bitwise complement.
    Not,
    /// Two's complement negation.
    Neg,
    /// AND of all bits, 1-bit result.
    ReduceAnd,
    /// OR of all bits, 1-bit result.
    ReduceOr,
    /// XOR of all bits, 1-bit result.
    ReduceXor,
}

impl UnaryOp {
    /// True for the reductions, whose result width is 1.
    pub const fn is_reduction(&self) -> bool {
        matches!(self, Self::ReduceAnd | Self::ReduceOr | Self::ReduceXor)
    }
}

/// A behavioral expression.
///
/// Every node has a width computable from its operands and the widths of the
/// signals it references; the elaborator checks widths once, before any
/// backend runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Constant value with explicit width.
    Literal(BitVec),
    /// Reference to a declared signal.
    Signal(SignalId),
    /// Reference to an enclosing `Let` binding.
    Local(String),
    /// Bit slice `operand[high:low]`, both ends inclusive.
    Slice {
        /// Sliced operand.
        operand: Box<Expr>,
        /// High bit, inclusive.
        high: Width,
        /// Low bit, inclusive.
        low: Width,
    },
    /// Concatenation, MSB-first.
    Concat(Vec<Expr>),
    /// Binary operation.
    Binary {
        /// Operator kind.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Unary operation.
    Unary {
        /// Operator kind.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Two-way multiplexer; `sel` must be 1 bit wide and both arms must
    /// share one width.
    Mux {
        /// Select bit; 1 routes `then_`, 0 routes `else_`.
        sel: Box<Expr>,
        /// Value when the select bit is 1.
        then_: Box<Expr>,
        /// Value when the select bit is 0.
        else_: Box<Expr>,
    },
    /// Parallel case select: the selector is compared against literal keys;
    /// all result arms and the default share one width.
    Case {
        /// Selector expression.
        sel: Box<Expr>,
        /// `(key, value)` arms; keys must match the selector width.
        arms: Vec<(BitVec, Expr)>,
        /// Value when no key matches.
        default: Box<Expr>,
    },
    /// Single-assignment local binding scoped to `body`.
    Let {
        /// Binding name, visible to `Local` references inside `body`.
        name: String,
        /// Bound value, evaluated once.
        value: Box<Expr>,
        /// Expression the binding is visible in.
        body: Box<Expr>,
    },
}

impl Expr {
    /// Visit every signal reference in the tree.
    pub fn for_each_signal(&self, f: &mut impl FnMut(SignalId)) {
        match self {
            Expr::Literal(_) | Expr::Local(_) => {}
            Expr::Signal(id) => f(*id),
            Expr::Slice { operand, .. } => operand.for_each_signal(f),
            Expr::Unary { operand, .. } => operand.for_each_signal(f),
            Expr::Concat(parts) => parts.iter().for_each(|p| p.for_each_signal(f)),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_signal(f);
                rhs.for_each_signal(f);
            }
            Expr::Mux { sel, then_, else_ } => {
                sel.for_each_signal(f);
                then_.for_each_signal(f);
                else_.for_each_signal(f);
            }
            Expr::Case { sel, arms, default } => {
                sel.for_each_signal(f);
                arms.iter().for_each(|(_, e)| e.for_each_signal(f));
                default.for_each_signal(f);
            }
            Expr::Let { value, body, .. } => {
                value.for_each_signal(f);
                body.for_each_signal(f);
            }
        }
    }

    /// Rewrite every signal reference through `f`. Used when inlining child
    /// instances into the flat design.
    pub fn map_signals(&self, f: &mut impl FnMut(SignalId) -> Expr) -> Expr {
        match self {
            Expr::Literal(v) => Expr::Literal(*v),
            Expr::Local(name) => Expr::Local(name.clone()),
            Expr::Signal(id) => f(*id),
            Expr::Slice { operand, high, low } => Expr::Slice {
                operand: Box::new(operand.map_signals(f)),
                high: *high,
                low: *low,
            },
            Expr::Concat(parts) => {
                Expr::Concat(parts.iter().map(|p| p.map_signals(f)).collect())
            }
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(lhs.map_signals(f)),
                rhs: Box::new(rhs.map_signals(f)),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.map_signals(f)),
            },
            Expr::Mux { sel, then_, else_ } => Expr::Mux {
                sel: Box::new(sel.map_signals(f)),
                then_: Box::new(then_.map_signals(f)),
                else_: Box::new(else_.map_signals(f)),
            },
            Expr::Case { sel, arms, default } => Expr::Case {
                sel: Box::new(sel.map_signals(f)),
                arms: arms
                    .iter()
                    .map(|(k, e)| (*k, e.map_signals(f)))
                    .collect(),
                default: Box::new(default.map_signals(f)),
            },
            Expr::Let { name, value, body } => Expr::Let {
                name: name.clone(),
                value: Box::new(value.map_signals(f)),
                body: Box::new(body.map_signals(f)),
            },
        }
    }
}

/// Literal expression from a raw value and width. The value is truncated to
/// the width, matching the kernel constructor.
///
/// Traps on a width outside `1..=128`; widths in the construction DSL are
/// static properties of the design, not runtime data.
pub fn lit(value: u128, width: Width) -> Expr {
    Expr::Literal(BitVec::new(value, width).expect("literal width must be in 1..=128"))
}

/// Signal reference.
pub fn sig(id: SignalId) -> Expr {
    Expr::Signal(id)
}

/// Reference to a `let_in` binding.
pub fn local(name: impl Into<String>) -> Expr {
    Expr::Local(name.into())
}

/// Bit slice, both ends inclusive.
pub fn slice(operand: Expr, high: Width, low: Width) -> Expr {
    Expr::Slice {
        operand: Box::new(operand),
        high,
        low,
    }
}

/// Concatenation, MSB-first.
pub fn cat(parts: Vec<Expr>) -> Expr {
    Expr::Concat(parts)
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Wrapping addition.
pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Add, lhs, rhs)
}

/// Wrapping subtraction.
pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Sub, lhs, rhs)
}

/// Bitwise AND.
pub fn and(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::And, lhs, rhs)
}

/// Bitwise OR.
pub fn or(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Or, lhs, rhs)
}

/// Bitwise XOR.
pub fn xor(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Xor, lhs, rhs)
}

/// Equality compare.
pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Eq, lhs, rhs)
}

/// Inequality compare.
pub fn ne(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Ne, lhs, rhs)
}

/// Unsigned less-than.
pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Lt, lhs, rhs)
}

/// Unsigned less-or-equal.
pub fn le(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Le, lhs, rhs)
}

/// Unsigned greater-than.
pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Gt, lhs, rhs)
}

/// Unsigned greater-or-equal.
pub fn ge(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Ge, lhs, rhs)
}

/// Logical shift left by the runtime value of `rhs`.
pub fn shl(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Shl, lhs, rhs)
}

/// Logical shift right by the runtime value of `rhs`.
pub fn shr(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Shr, lhs, rhs)
}

/// Bitwise complement.
pub fn bnot(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Not,
        operand: Box::new(operand),
    }
}

/// Two's complement negation.
pub fn neg(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Neg,
        operand: Box::new(operand),
    }
}

/// AND reduction of all bits.
pub fn reduce_and(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::ReduceAnd,
        operand: Box::new(operand),
    }
}

/// OR reduction of all bits.
pub fn reduce_or(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::ReduceOr,
        operand: Box::new(operand),
    }
}

/// XOR reduction of all bits.
pub fn reduce_xor(operand: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::ReduceXor,
        operand: Box::new(operand),
    }
}

/// Two-way multiplexer.
pub fn mux(sel: Expr, then_: Expr, else_: Expr) -> Expr {
    Expr::Mux {
        sel: Box::new(sel),
        then_: Box::new(then_),
        else_: Box::new(else_),
    }
}

/// Parallel case select over literal keys.
pub fn case(sel: Expr, arms: Vec<(BitVec, Expr)>, default: Expr) -> Expr {
    Expr::Case {
        sel: Box::new(sel),
        arms,
        default: Box::new(default),
    }
}

/// Single-assignment binding scoped to `body`.
pub fn let_in(name: impl Into<String>, value: Expr, body: Expr) -> Expr {
    Expr::Let {
        name: name.into(),
        value: Box::new(value),
        body: Box::new(body),
    }
}

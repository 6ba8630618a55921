//! Constraint expressions.
//!
//! An [`Expr`] is an immutable, reference-counted node tree. Terminals are variables,
//! constants, vectors and foreach placeholders; operators are unary, binary, ite and the
//! vector-level `foreach` and `unique`. Every expression carries its [`Sort`], computed once
//! at construction.
//!
//! Binary operands of different sorts meet in their [common sort][Sort::common]: the wider
//! width wins, and mixing signed with unsigned yields a signed sort with room for the
//! unsigned operand. Arithmetic wraps at the result width.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::ops::{Add, BitAnd, BitOr, BitXor, Div, Mul, Neg, Not, Rem, Shl, Shr, Sub};
use std::sync::Arc;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Sort {
    Bool,
    BitVec { width: u32, signed: bool },
}

impl Sort {
    pub const fn unsigned(width: u32) -> Self {
        Sort::BitVec { width, signed: false }
    }

    pub const fn signed(width: u32) -> Self {
        Sort::BitVec { width, signed: true }
    }

    pub const fn width(self) -> u32 {
        match self {
            Sort::Bool => 1,
            Sort::BitVec { width, .. } => width,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Sort::BitVec { signed: true, .. })
    }

    pub const fn is_bool(self) -> bool {
        matches!(self, Sort::Bool)
    }

    /// Bit mask covering the low `width` bits.
    pub const fn mask(self) -> u64 {
        let width = self.width();
        if width >= 64 {
            u64::MAX
        } else {
            (1 << width) - 1
        }
    }

    pub const fn truncate(self, bits: u64) -> u64 {
        bits & self.mask()
    }

    /// Smallest sort that represents `value`: unsigned when non-negative, signed otherwise.
    pub const fn of_literal(value: i64) -> Self {
        if value >= 0 {
            let width = 64 - value.leading_zeros();
            Sort::unsigned(if width == 0 { 1 } else { width })
        } else {
            Sort::signed(65 - (!value).leading_zeros())
        }
    }

    /// Sort in which two operands are combined.
    pub fn common(self, other: Sort) -> Sort {
        if self.is_bool() && other.is_bool() {
            return Sort::Bool;
        }
        let (wa, sa) = (self.width(), self.is_signed());
        let (wb, sb) = (other.width(), other.is_signed());
        if sa == sb {
            Sort::BitVec {
                width: wa.max(wb),
                signed: sa,
            }
        } else {
            let (ws, wu) = if sa { (wa, wb) } else { (wb, wa) };
            Sort::signed(ws.max(wu + 1))
        }
    }
}

impl Display for Sort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Sort::Bool => write!(f, "bool"),
            Sort::BitVec { width, signed: true } => write!(f, "i{}", width),
            Sort::BitVec { width, signed: false } => write!(f, "u{}", width),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Two's complement negation.
    Neg,
    /// Bitwise complement.
    Complement,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        }
    }

    pub const fn is_predicate(self) -> bool {
        matches!(
            self,
            BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
        )
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Node {
    Variable { id: u32, sort: Sort },
    Constant { value: u64, sort: Sort },
    /// Index variable bound by a `foreach`.
    Placeholder { id: u32 },
    Vector { id: u32, elem: Sort },
    VectorAccess { vector: Expr, index: Expr },
    Unary { op: UnaryOp, arg: Expr },
    Inside { arg: Expr, set: Vec<i64> },
    /// Widen by `by` bits, sign-extending signed operands.
    Extend { arg: Expr, by: u32 },
    BitSlice { arg: Expr, hi: u32, lo: u32 },
    Binary { op: BinaryOp, lhs: Expr, rhs: Expr },
    Ite { cond: Expr, then: Expr, other: Expr },
    ForEach { vector: Expr, placeholder: u32, body: Expr },
    Unique { vector: Expr },
}

/// Sort of foreach placeholders and of the literal indices substituted for them.
pub const INDEX_SORT: Sort = Sort::unsigned(32);

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Expr {
    node: Arc<Node>,
    sort: Sort,
}

impl Expr {
    pub fn new(node: Node) -> Self {
        let sort = match &node {
            Node::Variable { sort, .. } | Node::Constant { sort, .. } => *sort,
            Node::Placeholder { .. } => INDEX_SORT,
            Node::Vector { elem, .. } => *elem,
            Node::VectorAccess { vector, .. } => vector.sort,
            Node::Unary { op: UnaryOp::Not, .. } => Sort::Bool,
            Node::Unary { arg, .. } => arg.sort,
            Node::Inside { .. } => Sort::Bool,
            Node::Extend { arg, by } => Sort::BitVec {
                width: arg.sort.width() + by,
                signed: arg.sort.is_signed(),
            },
            Node::BitSlice { hi, lo, .. } => Sort::unsigned(hi - lo + 1),
            Node::Binary { op, .. } if op.is_predicate() => Sort::Bool,
            Node::Binary {
                op: BinaryOp::Shl | BinaryOp::Shr,
                lhs,
                ..
            } => lhs.sort,
            Node::Binary { lhs, rhs, .. } => lhs.sort.common(rhs.sort),
            Node::Ite { then, other, .. } => then.sort.common(other.sort),
            Node::ForEach { .. } | Node::Unique { .. } => Sort::Bool,
        };
        Self {
            node: Arc::new(node),
            sort,
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn variable(id: u32, sort: Sort) -> Self {
        Self::new(Node::Variable { id, sort })
    }

    pub fn constant(value: u64, sort: Sort) -> Self {
        Self::new(Node::Constant {
            value: sort.truncate(value),
            sort,
        })
    }

    /// Integer literal in its smallest sort.
    pub fn lit(value: i64) -> Self {
        let sort = Sort::of_literal(value);
        Self::constant(value as u64, sort)
    }

    pub fn bool(value: bool) -> Self {
        Self::constant(value as u64, Sort::Bool)
    }

    pub fn placeholder(id: u32) -> Self {
        Self::new(Node::Placeholder { id })
    }

    pub fn vector(id: u32, elem: Sort) -> Self {
        Self::new(Node::Vector { id, elem })
    }

    /// Id of a variable, vector or placeholder terminal.
    pub fn id(&self) -> Option<u32> {
        match *self.node {
            Node::Variable { id, .. } | Node::Vector { id, .. } | Node::Placeholder { id } => Some(id),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<u64> {
        match *self.node {
            Node::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::new(Node::Binary { op, lhs, rhs })
    }

    pub fn equal(&self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::Equal, self.clone(), rhs.into())
    }
    pub fn not_equal(&self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::NotEqual, self.clone(), rhs.into())
    }
    pub fn lt(&self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::Less, self.clone(), rhs.into())
    }
    pub fn le(&self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::LessEqual, self.clone(), rhs.into())
    }
    pub fn gt(&self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::Greater, self.clone(), rhs.into())
    }
    pub fn ge(&self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::GreaterEqual, self.clone(), rhs.into())
    }
    pub fn and(&self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::And, self.clone(), rhs.into())
    }
    pub fn or(&self, rhs: impl Into<Expr>) -> Expr {
        Self::binary(BinaryOp::Or, self.clone(), rhs.into())
    }
    pub fn implies(&self, rhs: impl Into<Expr>) -> Expr {
        self.logical_not().or(rhs)
    }

    pub fn logical_not(&self) -> Expr {
        Expr::new(Node::Unary {
            op: UnaryOp::Not,
            arg: self.clone(),
        })
    }

    pub fn inside(&self, set: impl IntoIterator<Item = i64>) -> Expr {
        Expr::new(Node::Inside {
            arg: self.clone(),
            set: set.into_iter().collect(),
        })
    }

    pub fn extend(&self, by: u32) -> Expr {
        Expr::new(Node::Extend { arg: self.clone(), by })
    }

    /// Bits `hi..=lo` as an unsigned value.
    pub fn slice(&self, hi: u32, lo: u32) -> Expr {
        assert!(lo <= hi && hi < self.sort.width(), "Invalid bit slice [{}:{}] of {}", hi, lo, self.sort);
        Expr::new(Node::BitSlice { arg: self.clone(), hi, lo })
    }

    /// Element access on a vector terminal.
    pub fn at(&self, index: impl Into<Expr>) -> Expr {
        assert!(matches!(*self.node, Node::Vector { .. }), "Element access on a non-vector expression");
        Expr::new(Node::VectorAccess {
            vector: self.clone(),
            index: index.into(),
        })
    }

    pub fn ite(cond: impl Into<Expr>, then: impl Into<Expr>, other: impl Into<Expr>) -> Expr {
        Expr::new(Node::Ite {
            cond: cond.into(),
            then: then.into(),
            other: other.into(),
        })
    }

    pub fn foreach(vector: &Expr, placeholder: u32, body: Expr) -> Expr {
        Expr::new(Node::ForEach {
            vector: vector.clone(),
            placeholder,
            body,
        })
    }

    pub fn unique(vector: &Expr) -> Expr {
        Expr::new(Node::Unique { vector: vector.clone() })
    }

    /// Whether this expression is a vector-level constraint root.
    pub fn is_vector_constraint(&self) -> bool {
        matches!(*self.node, Node::ForEach { .. } | Node::Unique { .. })
    }

    pub fn children(&self) -> Vec<&Expr> {
        match &*self.node {
            Node::Variable { .. } | Node::Constant { .. } | Node::Placeholder { .. } | Node::Vector { .. } => vec![],
            Node::VectorAccess { vector, index } => vec![vector, index],
            Node::Unary { arg, .. } | Node::Inside { arg, .. } | Node::Extend { arg, .. } | Node::BitSlice { arg, .. } => {
                vec![arg]
            }
            Node::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Node::Ite { cond, then, other } => vec![cond, then, other],
            Node::ForEach { vector, body, .. } => vec![vector, body],
            Node::Unique { vector } => vec![vector],
        }
    }

    /// Rebuild this node with every child replaced by `f(child)`.
    pub fn try_map_children<E>(&self, mut f: impl FnMut(&Expr) -> Result<Expr, E>) -> Result<Expr, E> {
        let node = match &*self.node {
            Node::Variable { .. } | Node::Constant { .. } | Node::Placeholder { .. } | Node::Vector { .. } => {
                return Ok(self.clone());
            }
            Node::VectorAccess { vector, index } => Node::VectorAccess {
                vector: f(vector)?,
                index: f(index)?,
            },
            Node::Unary { op, arg } => Node::Unary { op: *op, arg: f(arg)? },
            Node::Inside { arg, set } => Node::Inside {
                arg: f(arg)?,
                set: set.clone(),
            },
            Node::Extend { arg, by } => Node::Extend { arg: f(arg)?, by: *by },
            Node::BitSlice { arg, hi, lo } => Node::BitSlice {
                arg: f(arg)?,
                hi: *hi,
                lo: *lo,
            },
            Node::Binary { op, lhs, rhs } => Node::Binary {
                op: *op,
                lhs: f(lhs)?,
                rhs: f(rhs)?,
            },
            Node::Ite { cond, then, other } => Node::Ite {
                cond: f(cond)?,
                then: f(then)?,
                other: f(other)?,
            },
            Node::ForEach {
                vector,
                placeholder,
                body,
            } => Node::ForEach {
                vector: f(vector)?,
                placeholder: *placeholder,
                body: f(body)?,
            },
            Node::Unique { vector } => Node::Unique { vector: f(vector)? },
        };
        Ok(Expr::new(node))
    }

    /// Pre-order traversal.
    pub fn visit(&self, visitor: &mut impl FnMut(&Expr)) {
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            visitor(expr);
            stack.extend(expr.children().into_iter().rev());
        }
    }

    /// Ids of the variables and vectors occurring in the expression.
    ///
    /// Placeholders are bound, so they are not part of the support.
    pub fn support(&self) -> BTreeSet<u32> {
        let mut support = BTreeSet::new();
        self.visit(&mut |e| {
            if let Node::Variable { id, .. } | Node::Vector { id, .. } = *e.node {
                support.insert(id);
            }
        });
        support
    }

    /// Scalar variable terminals by id.
    pub fn variables(&self) -> Vec<Expr> {
        let mut seen = BTreeSet::new();
        let mut vars = Vec::new();
        self.visit(&mut |e| {
            if let Node::Variable { id, .. } = *e.node {
                if seen.insert(id) {
                    vars.push(e.clone());
                }
            }
        });
        vars
    }

    /// Short node label, used by the dot writer.
    pub fn label(&self) -> String {
        match &*self.node {
            Node::Variable { id, sort } => format!("v{}: {}", id, sort),
            Node::Constant { value, sort } => {
                if sort.is_bool() {
                    format!("{}", *value != 0)
                } else {
                    format!("{}: {}", display_constant(*value, *sort), sort)
                }
            }
            Node::Placeholder { id } => format!("_{}", id),
            Node::Vector { id, elem } => format!("vec{}: [{}]", id, elem),
            Node::VectorAccess { .. } => "[]".to_string(),
            Node::Unary { op: UnaryOp::Not, .. } => "!".to_string(),
            Node::Unary { op: UnaryOp::Neg, .. } => "-".to_string(),
            Node::Unary {
                op: UnaryOp::Complement,
                ..
            } => "~".to_string(),
            Node::Inside { set, .. } => format!("inside {:?}", set),
            Node::Extend { by, .. } => format!("extend +{}", by),
            Node::BitSlice { hi, lo, .. } => format!("[{}:{}]", hi, lo),
            Node::Binary { op, .. } => op.symbol().to_string(),
            Node::Ite { .. } => "ite".to_string(),
            Node::ForEach { placeholder, .. } => format!("foreach _{}", placeholder),
            Node::Unique { .. } => "unique".to_string(),
        }
    }
}

fn display_constant(value: u64, sort: Sort) -> String {
    if sort.is_signed() && sort.width() < 64 && value >> (sort.width() - 1) & 1 == 1 {
        format!("{}", (value | !sort.mask()) as i64)
    } else if sort.is_signed() {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &*self.node {
            Node::Variable { id, .. } => write!(f, "v{}", id),
            Node::Constant { value, sort } if sort.is_bool() => write!(f, "{}", *value != 0),
            Node::Constant { value, sort } => write!(f, "{}", display_constant(*value, *sort)),
            Node::Placeholder { id } => write!(f, "_{}", id),
            Node::Vector { id, .. } => write!(f, "vec{}", id),
            Node::VectorAccess { vector, index } => write!(f, "{}[{}]", vector, index),
            Node::Unary { op, arg } => {
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                    UnaryOp::Complement => "~",
                };
                write!(f, "{}{}", symbol, arg)
            }
            Node::Inside { arg, set } => write!(f, "({} inside {:?})", arg, set),
            Node::Extend { arg, by } => write!(f, "extend({}, {})", arg, by),
            Node::BitSlice { arg, hi, lo } => write!(f, "{}[{}:{}]", arg, hi, lo),
            Node::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Node::Ite { cond, then, other } => write!(f, "({} ? {} : {})", cond, then, other),
            Node::ForEach { vector, body, .. } => write!(f, "foreach({}, {})", vector, body),
            Node::Unique { vector } => write!(f, "unique({})", vector),
        }
    }
}

impl From<&Expr> for Expr {
    fn from(expr: &Expr) -> Self {
        expr.clone()
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::bool(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::lit(value as i64)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::lit(value)
    }
}

impl From<u32> for Expr {
    fn from(value: u32) -> Self {
        Expr::lit(value as i64)
    }
}

impl From<u64> for Expr {
    fn from(value: u64) -> Self {
        if value > i64::MAX as u64 {
            Expr::constant(value, Sort::unsigned(64))
        } else {
            Expr::lit(value as i64)
        }
    }
}

macro_rules! impl_binary_ops {
    ($($trait:ident, $method:ident, $op:expr;)*) => {
        $(
            impl<R: Into<Expr>> $trait<R> for Expr {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    Expr::binary($op, self, rhs.into())
                }
            }

            impl<R: Into<Expr>> $trait<R> for &Expr {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    Expr::binary($op, self.clone(), rhs.into())
                }
            }
        )*
    };
}

impl_binary_ops! {
    Add, add, BinaryOp::Add;
    Sub, sub, BinaryOp::Sub;
    Mul, mul, BinaryOp::Mul;
    Div, div, BinaryOp::Div;
    Rem, rem, BinaryOp::Rem;
    Shl, shl, BinaryOp::Shl;
    Shr, shr, BinaryOp::Shr;
    BitAnd, bitand, BinaryOp::BitAnd;
    BitOr, bitor, BinaryOp::BitOr;
    BitXor, bitxor, BinaryOp::BitXor;
}

impl Not for Expr {
    type Output = Expr;

    /// Logical negation on booleans, bitwise complement on bit-vectors.
    fn not(self) -> Expr {
        let op = if self.sort.is_bool() {
            UnaryOp::Not
        } else {
            UnaryOp::Complement
        };
        Expr::new(Node::Unary { op, arg: self })
    }
}

impl Not for &Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        !self.clone()
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::new(Node::Unary {
            op: UnaryOp::Neg,
            arg: self,
        })
    }
}

impl Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        -self.clone()
    }
}

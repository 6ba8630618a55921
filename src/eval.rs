//! Concrete evaluation of scalar expressions.
//!
//! The semantics match the bit-blaster exactly: operands are resized to their common sort,
//! arithmetic wraps at the result width, division by zero yields all ones (quotient) or
//! the dividend (remainder), and `>>` is arithmetic on signed operands.

use crate::expr::{BinaryOp, Expr, Node, Sort, UnaryOp};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Value {
    bits: u128,
    sort: Sort,
}

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1 << width) - 1
    }
}

fn to_signed(bits: u128, width: u32) -> i128 {
    if width == 0 || width >= 128 {
        return bits as i128;
    }
    let shift = 128 - width;
    ((bits << shift) as i128) >> shift
}

impl Value {
    pub fn new(bits: u128, sort: Sort) -> Self {
        Self {
            bits: bits & mask(sort.width()),
            sort,
        }
    }

    pub fn bits(&self) -> u128 {
        self.bits
    }
    pub fn sort(&self) -> Sort {
        self.sort
    }

    pub fn as_bool(&self) -> bool {
        self.bits != 0
    }

    /// Low 64 bits, zero-extended.
    pub fn as_u64(&self) -> u64 {
        self.bits as u64
    }

    /// Value interpreted in its own signedness.
    pub fn as_i128(&self) -> i128 {
        if self.sort.is_signed() {
            to_signed(self.bits, self.sort.width())
        } else {
            self.bits as i128
        }
    }

    /// Bits of this value resized to `sort`, sign-extending signed values.
    fn resize(&self, sort: Sort) -> u128 {
        let extended = if self.sort.is_signed() {
            to_signed(self.bits, self.sort.width()) as u128
        } else {
            self.bits
        };
        extended & mask(sort.width())
    }
}

/// Evaluates `expr` with variable values supplied by `env`.
///
/// Returns `None` when a variable is unbound or the expression contains a vector-level node.
pub fn eval(expr: &Expr, env: &impl Fn(u32) -> Option<u64>) -> Option<Value> {
    let sort = expr.sort();
    let value = match expr.node() {
        Node::Variable { id, sort } => Value::new(env(*id)? as u128, *sort),
        Node::Constant { value, sort } => Value::new(*value as u128, *sort),
        Node::Placeholder { .. }
        | Node::Vector { .. }
        | Node::VectorAccess { .. }
        | Node::ForEach { .. }
        | Node::Unique { .. } => return None,
        Node::Unary { op, arg } => {
            let a = eval(arg, env)?;
            match op {
                UnaryOp::Not => Value::new(!a.as_bool() as u128, Sort::Bool),
                UnaryOp::Neg => Value::new(0u128.wrapping_sub(a.bits), sort),
                UnaryOp::Complement => Value::new(!a.bits, sort),
            }
        }
        Node::Inside { arg, set } => {
            let a = eval(arg, env)?;
            let hit = set.iter().any(|&c| {
                let c = Value::new(c as u128, Sort::of_literal(c));
                let common = a.sort.common(c.sort);
                a.resize(common) == c.resize(common)
            });
            Value::new(hit as u128, Sort::Bool)
        }
        Node::Extend { arg, .. } => {
            let a = eval(arg, env)?;
            Value::new(a.resize(sort), sort)
        }
        Node::BitSlice { arg, lo, .. } => {
            let a = eval(arg, env)?;
            Value::new(a.bits >> lo, sort)
        }
        Node::Ite { cond, then, other } => {
            let branch = if eval(cond, env)?.as_bool() { then } else { other };
            let v = eval(branch, env)?;
            Value::new(v.resize(sort), sort)
        }
        Node::Binary { op, lhs, rhs } => binary(*op, eval(lhs, env)?, eval(rhs, env)?, sort),
    };
    Some(value)
}

fn binary(op: BinaryOp, a: Value, b: Value, sort: Sort) -> Value {
    let common = a.sort.common(b.sort);
    let width = common.width();
    let (x, y) = (a.resize(common), b.resize(common));
    let truth = |t: bool| Value::new(t as u128, Sort::Bool);
    let less = |x: u128, y: u128| {
        if common.is_signed() {
            to_signed(x, width) < to_signed(y, width)
        } else {
            x < y
        }
    };

    match op {
        BinaryOp::And => truth(a.as_bool() && b.as_bool()),
        BinaryOp::Or => truth(a.as_bool() || b.as_bool()),
        BinaryOp::Equal => truth(x == y),
        BinaryOp::NotEqual => truth(x != y),
        BinaryOp::Less => truth(less(x, y)),
        BinaryOp::LessEqual => truth(!less(y, x)),
        BinaryOp::Greater => truth(less(y, x)),
        BinaryOp::GreaterEqual => truth(!less(x, y)),
        BinaryOp::Add => Value::new(x.wrapping_add(y), sort),
        BinaryOp::Sub => Value::new(x.wrapping_sub(y), sort),
        BinaryOp::Mul => Value::new(x.wrapping_mul(y), sort),
        BinaryOp::BitAnd => Value::new(x & y, sort),
        BinaryOp::BitOr => Value::new(x | y, sort),
        BinaryOp::BitXor => Value::new(x ^ y, sort),
        BinaryOp::Div if common.is_signed() => {
            let (sx, sy) = (to_signed(x, width), to_signed(y, width));
            let q = if sy == 0 {
                if sx >= 0 {
                    -1
                } else {
                    1
                }
            } else {
                sx.wrapping_div(sy)
            };
            Value::new(q as u128, sort)
        }
        BinaryOp::Div => Value::new(if y == 0 { u128::MAX } else { x / y }, sort),
        BinaryOp::Rem if common.is_signed() => {
            let (sx, sy) = (to_signed(x, width), to_signed(y, width));
            let r = if sy == 0 { sx } else { sx.wrapping_rem(sy) };
            Value::new(r as u128, sort)
        }
        BinaryOp::Rem => Value::new(if y == 0 { x } else { x % y }, sort),
        BinaryOp::Shl | BinaryOp::Shr => {
            let width = sort.width();
            let x = a.bits;
            let amount = b.bits;
            let bits = match op {
                BinaryOp::Shl if amount >= width as u128 => 0,
                BinaryOp::Shl => x << amount,
                _ if sort.is_signed() => {
                    let shift = amount.min(width as u128 - 1) as u32;
                    (to_signed(x, width) >> shift) as u128
                }
                _ if amount >= width as u128 => 0,
                _ => x >> amount,
            };
            Value::new(bits, sort)
        }
    }
}

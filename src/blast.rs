//! Bit-blasting of scalar expressions into BDDs.
//!
//! Every expression becomes a vector of BDD references, least significant bit first.
//! Variable bits are interleaved most-significant first: bit `b` of the terminal occupying
//! slot `s` is BDD variable `1 + (63 - b) * SLOTS + s`, so equal-weight bits of all
//! variables sit next to each other in the order.

use std::collections::{BTreeSet, HashMap};

use log::trace;

use crate::bdd::Bdd;
use crate::error::{Error, Result};
use crate::expr::{BinaryOp, Expr, Node, Sort, UnaryOp};
use crate::reference::Ref;

const SLOTS: u32 = 1 << 16;

#[derive(Debug, Default)]
pub struct Blaster {
    slots: HashMap<u32, u32>,
    domain: BTreeSet<u32>,
}

impl Blaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// BDD variable holding bit `bit` of the terminal in `slot`.
    pub fn bit_variable(slot: u32, bit: u32) -> u32 {
        assert!(bit < 64, "Variables are at most 64 bits wide");
        1 + (63 - bit) * SLOTS + slot
    }

    fn slot(&mut self, id: u32) -> u32 {
        let next = self.slots.len() as u32;
        assert!(next < SLOTS, "Too many variables for a single solver");
        *self.slots.entry(id).or_insert_with(|| {
            trace!("blast: variable {} gets slot {}", id, next);
            next
        })
    }

    /// BDD variables of a blasted terminal, least significant first.
    pub fn variable_bits(&self, id: u32, sort: Sort) -> Option<Vec<u32>> {
        let slot = *self.slots.get(&id)?;
        Some((0..sort.width()).map(|bit| Self::bit_variable(slot, bit)).collect())
    }

    /// All BDD variables allocated so far, ascending.
    pub fn domain(&self) -> Vec<u32> {
        self.domain.iter().copied().collect()
    }

    /// Boolean value of an expression: any bit set.
    pub fn predicate(&mut self, bdd: &Bdd, expr: &Expr) -> Result<Ref> {
        let bits = self.bits(bdd, expr)?;
        Ok(to_bool(bdd, &bits))
    }

    /// Bits of `expr` in its own sort.
    pub fn bits(&mut self, bdd: &Bdd, expr: &Expr) -> Result<Vec<Ref>> {
        let sort = expr.sort();
        let bits = match expr.node() {
            Node::Variable { id, sort } => {
                let slot = self.slot(*id);
                (0..sort.width())
                    .map(|bit| {
                        let v = Self::bit_variable(slot, bit);
                        self.domain.insert(v);
                        bdd.mk_var(v)
                    })
                    .collect()
            }
            Node::Constant { value, sort } => constant(bdd, *value as u128, sort.width()),
            Node::Placeholder { .. } => return Err(Error::UnsupportedNode("placeholder")),
            Node::Vector { .. } => return Err(Error::UnsupportedNode("vector")),
            Node::VectorAccess { .. } => return Err(Error::UnsupportedNode("vector access")),
            Node::ForEach { .. } => return Err(Error::UnsupportedNode("foreach")),
            Node::Unique { .. } => return Err(Error::UnsupportedNode("unique")),
            Node::Unary { op, arg } => {
                let a = self.bits(bdd, arg)?;
                match op {
                    UnaryOp::Not => vec![-to_bool(bdd, &a)],
                    UnaryOp::Neg => neg(bdd, &a),
                    UnaryOp::Complement => a.iter().map(|&x| -x).collect(),
                }
            }
            Node::Inside { arg, set } => {
                let a = self.bits(bdd, arg)?;
                let hits: Vec<Ref> = set
                    .iter()
                    .map(|&c| {
                        let c_sort = Sort::of_literal(c);
                        let common = arg.sort().common(c_sort);
                        let x = resize(bdd, &a, arg.sort(), common.width());
                        let y = resize(bdd, &constant(bdd, c as u128, c_sort.width()), c_sort, common.width());
                        equal(bdd, &x, &y)
                    })
                    .collect();
                vec![bdd.apply_or_many(hits)]
            }
            Node::Extend { arg, .. } => {
                let a = self.bits(bdd, arg)?;
                resize(bdd, &a, arg.sort(), sort.width())
            }
            Node::BitSlice { arg, hi, lo } => {
                let a = self.bits(bdd, arg)?;
                a[*lo as usize..=*hi as usize].to_vec()
            }
            Node::Ite { cond, then, other } => {
                let c = self.predicate(bdd, cond)?;
                let t = self.bits(bdd, then)?;
                let e = self.bits(bdd, other)?;
                let t = resize(bdd, &t, then.sort(), sort.width());
                let e = resize(bdd, &e, other.sort(), sort.width());
                mux(bdd, c, &t, &e)
            }
            Node::Binary { op, lhs, rhs } => {
                let a = self.bits(bdd, lhs)?;
                let b = self.bits(bdd, rhs)?;
                binary(bdd, *op, (&a, lhs.sort()), (&b, rhs.sort()))
            }
        };
        debug_assert_eq!(bits.len(), sort.width() as usize);
        Ok(bits)
    }
}

fn binary(bdd: &Bdd, op: BinaryOp, (a, sa): (&[Ref], Sort), (b, sb): (&[Ref], Sort)) -> Vec<Ref> {
    let common = sa.common(sb);
    let width = common.width();

    match op {
        BinaryOp::And => return vec![bdd.apply_and(to_bool(bdd, a), to_bool(bdd, b))],
        BinaryOp::Or => return vec![bdd.apply_or(to_bool(bdd, a), to_bool(bdd, b))],
        BinaryOp::Shl => return shift_left(bdd, a, b),
        BinaryOp::Shr => return shift_right(bdd, a, b, sa.is_signed()),
        _ => {}
    }

    let x = resize(bdd, a, sa, width);
    let y = resize(bdd, b, sb, width);
    let less = |x: &[Ref], y: &[Ref]| {
        if common.is_signed() {
            signed_less(bdd, x, y)
        } else {
            unsigned_less(bdd, x, y)
        }
    };

    match op {
        BinaryOp::Equal => vec![equal(bdd, &x, &y)],
        BinaryOp::NotEqual => vec![-equal(bdd, &x, &y)],
        BinaryOp::Less => vec![less(&x, &y)],
        BinaryOp::LessEqual => vec![-less(&y, &x)],
        BinaryOp::Greater => vec![less(&y, &x)],
        BinaryOp::GreaterEqual => vec![-less(&x, &y)],
        BinaryOp::Add => add(bdd, &x, &y, bdd.zero()),
        BinaryOp::Sub => subtract(bdd, &x, &y),
        BinaryOp::Mul => multiply(bdd, &x, &y),
        BinaryOp::BitAnd => x.iter().zip(&y).map(|(&p, &q)| bdd.apply_and(p, q)).collect(),
        BinaryOp::BitOr => x.iter().zip(&y).map(|(&p, &q)| bdd.apply_or(p, q)).collect(),
        BinaryOp::BitXor => x.iter().zip(&y).map(|(&p, &q)| bdd.apply_xor(p, q)).collect(),
        BinaryOp::Div if common.is_signed() => signed_divide(bdd, &x, &y).0,
        BinaryOp::Rem if common.is_signed() => signed_divide(bdd, &x, &y).1,
        BinaryOp::Div => unsigned_divide(bdd, &x, &y).0,
        BinaryOp::Rem => unsigned_divide(bdd, &x, &y).1,
        BinaryOp::And | BinaryOp::Or | BinaryOp::Shl | BinaryOp::Shr => unreachable!(),
    }
}

fn constant(bdd: &Bdd, value: u128, width: u32) -> Vec<Ref> {
    (0..width)
        .map(|i| {
            if i < 128 && (value >> i) & 1 == 1 {
                bdd.one()
            } else {
                bdd.zero()
            }
        })
        .collect()
}

fn to_bool(bdd: &Bdd, bits: &[Ref]) -> Ref {
    bdd.apply_or_many(bits.iter().copied())
}

/// Truncate or extend to `width`, sign-extending when `sort` is signed.
fn resize(bdd: &Bdd, bits: &[Ref], sort: Sort, width: u32) -> Vec<Ref> {
    let width = width as usize;
    let fill = match bits.last() {
        Some(&msb) if sort.is_signed() => msb,
        _ => bdd.zero(),
    };
    let mut result: Vec<Ref> = bits.iter().copied().take(width).collect();
    result.resize(width, fill);
    result
}

fn mux(bdd: &Bdd, cond: Ref, then: &[Ref], other: &[Ref]) -> Vec<Ref> {
    then.iter().zip(other).map(|(&t, &e)| bdd.apply_ite(cond, t, e)).collect()
}

fn equal(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> Ref {
    bdd.apply_and_many(a.iter().zip(b).map(|(&x, &y)| bdd.apply_eq(x, y)))
}

fn add(bdd: &Bdd, a: &[Ref], b: &[Ref], carry_in: Ref) -> Vec<Ref> {
    let mut carry = carry_in;
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let half = bdd.apply_xor(x, y);
            let sum = bdd.apply_xor(half, carry);
            carry = bdd.apply_or(bdd.apply_and(x, y), bdd.apply_and(carry, half));
            sum
        })
        .collect()
}

fn subtract(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> Vec<Ref> {
    let not_b: Vec<Ref> = b.iter().map(|&x| -x).collect();
    add(bdd, a, &not_b, bdd.one())
}

fn neg(bdd: &Bdd, a: &[Ref]) -> Vec<Ref> {
    let zeros = vec![bdd.zero(); a.len()];
    subtract(bdd, &zeros, a)
}

fn multiply(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> Vec<Ref> {
    let n = a.len();
    let mut acc = vec![bdd.zero(); n];
    for (i, &ai) in a.iter().enumerate() {
        let partial: Vec<Ref> = (0..n)
            .map(|k| if k < i { bdd.zero() } else { bdd.apply_and(ai, b[k - i]) })
            .collect();
        acc = add(bdd, &acc, &partial, bdd.zero());
    }
    acc
}

fn unsigned_less(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> Ref {
    let mut less = bdd.zero();
    for (&x, &y) in a.iter().zip(b) {
        less = bdd.apply_ite(bdd.apply_xor(x, y), y, less);
    }
    less
}

fn signed_less(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> Ref {
    let flip = |bits: &[Ref]| {
        let mut bits = bits.to_vec();
        if let Some(msb) = bits.last_mut() {
            *msb = -*msb;
        }
        bits
    };
    unsigned_less(bdd, &flip(a), &flip(b))
}

/// Restoring division. Division by zero gives an all-ones quotient and the dividend as remainder.
fn unsigned_divide(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> (Vec<Ref>, Vec<Ref>) {
    let n = a.len();
    let divisor = resize(bdd, b, Sort::unsigned(n as u32), n as u32 + 1);
    let mut remainder = vec![bdd.zero(); n + 1];
    let mut quotient = vec![bdd.zero(); n];
    for i in (0..n).rev() {
        let mut shifted = Vec::with_capacity(n + 1);
        shifted.push(a[i]);
        shifted.extend_from_slice(&remainder[..n]);
        let fits = -unsigned_less(bdd, &shifted, &divisor);
        let reduced = subtract(bdd, &shifted, &divisor);
        remainder = mux(bdd, fits, &reduced, &shifted);
        quotient[i] = fits;
    }
    remainder.truncate(n);
    (quotient, remainder)
}

fn signed_divide(bdd: &Bdd, a: &[Ref], b: &[Ref]) -> (Vec<Ref>, Vec<Ref>) {
    let (Some(&sa), Some(&sb)) = (a.last(), b.last()) else {
        return (vec![], vec![]);
    };
    let ua = mux(bdd, sa, &neg(bdd, a), a);
    let ub = mux(bdd, sb, &neg(bdd, b), b);
    let (q, r) = unsigned_divide(bdd, &ua, &ub);
    let quotient = mux(bdd, bdd.apply_xor(sa, sb), &neg(bdd, &q), &q);
    let remainder = mux(bdd, sa, &neg(bdd, &r), &r);
    (quotient, remainder)
}

fn shift_left(bdd: &Bdd, a: &[Ref], amount: &[Ref]) -> Vec<Ref> {
    let n = a.len();
    let mut result = a.to_vec();
    for (k, &bit) in amount.iter().enumerate() {
        let shifted: Vec<Ref> = match 1usize.checked_shl(k as u32) {
            Some(s) if s < n => (0..n).map(|i| if i < s { bdd.zero() } else { result[i - s] }).collect(),
            _ => vec![bdd.zero(); n],
        };
        result = mux(bdd, bit, &shifted, &result);
    }
    result
}

fn shift_right(bdd: &Bdd, a: &[Ref], amount: &[Ref], arithmetic: bool) -> Vec<Ref> {
    let n = a.len();
    let fill = match a.last() {
        Some(&msb) if arithmetic => msb,
        _ => bdd.zero(),
    };
    let mut result = a.to_vec();
    for (k, &bit) in amount.iter().enumerate() {
        let shifted: Vec<Ref> = match 1usize.checked_shl(k as u32) {
            Some(s) if s < n => (0..n).map(|i| if i + s < n { result[i + s] } else { fill }).collect(),
            _ => vec![fill; n],
        };
        result = mux(bdd, bit, &shifted, &result);
    }
    result
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::eval::eval;
    use test_log::test;

    /// Evaluate blasted bits of a constant-only expression.
    fn blast_const(bdd: &Bdd, e: &Expr) -> u128 {
        let mut blaster = Blaster::new();
        let bits = blaster.bits(bdd, e).unwrap();
        bits.iter().enumerate().fold(0u128, |acc, (i, &bit)| {
            assert!(bdd.is_terminal(bit), "constant expression blasted to a non-constant bit");
            acc | ((bdd.is_one(bit) as u128) << i)
        })
    }

    fn agrees(bdd: &Bdd, e: &Expr) {
        let expected = eval(e, &|_| None).unwrap().bits();
        assert_eq!(blast_const(bdd, e), expected, "mismatch on {}", e);
    }

    #[test]
    fn test_constant_circuits_match_evaluation() {
        let bdd = Bdd::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..40 {
            let x: u64 = rng.gen_range(0..256);
            let y: u64 = rng.gen_range(0..256);
            let shift: u64 = rng.gen_range(0..10);
            for sort in [Sort::unsigned(8), Sort::signed(8)] {
                let a = Expr::constant(x, sort);
                let b = Expr::constant(y, sort);
                let s = Expr::constant(shift, Sort::unsigned(4));
                agrees(&bdd, &(&a + &b));
                agrees(&bdd, &(&a - &b));
                agrees(&bdd, &(&a * &b));
                agrees(&bdd, &(&a / &b));
                agrees(&bdd, &(&a % &b));
                agrees(&bdd, &(&a << &s));
                agrees(&bdd, &(&a >> &s));
                agrees(&bdd, &(&a & &b));
                agrees(&bdd, &(&a ^ &b));
                agrees(&bdd, &-&a);
                agrees(&bdd, &a.lt(&b));
                agrees(&bdd, &a.ge(&b));
                agrees(&bdd, &a.equal(&b));
                agrees(&bdd, &a.extend(4));
                agrees(&bdd, &a.slice(6, 2));
                agrees(&bdd, &a.inside([1, -3, 200]));
            }
        }
    }

    #[test]
    fn test_division_by_zero_matches_evaluation() {
        let bdd = Bdd::default();
        for sort in [Sort::unsigned(8), Sort::signed(8)] {
            for x in [0u64, 1, 7, 0x80, 0xFF] {
                let a = Expr::constant(x, sort);
                let zero = Expr::constant(0, sort);
                agrees(&bdd, &(&a / &zero));
                agrees(&bdd, &(&a % &zero));
            }
        }
    }

    #[test]
    fn test_mixed_sorts_match_evaluation() {
        let bdd = Bdd::default();
        let a = Expr::constant(0xF0, Sort::signed(8));
        let b = Expr::constant(0x10, Sort::unsigned(8));
        agrees(&bdd, &a.lt(&b));
        agrees(&bdd, &(&a + &b));
        agrees(&bdd, &Expr::ite(a.lt(0), &a, &b));
    }

    #[test]
    fn test_variable_bits_layout() {
        let bdd = Bdd::default();
        let mut blaster = Blaster::new();
        let x = Expr::variable(5, Sort::unsigned(4));
        let y = Expr::variable(9, Sort::unsigned(4));
        blaster.bits(&bdd, &(&x + &y)).unwrap();
        let xb = blaster.variable_bits(5, Sort::unsigned(4)).unwrap();
        let yb = blaster.variable_bits(9, Sort::unsigned(4)).unwrap();
        assert_eq!(xb[0], Blaster::bit_variable(0, 0));
        assert_eq!(yb[0], Blaster::bit_variable(1, 0));
        // Higher bits come first in the order and the two variables interleave.
        assert!(xb[3] < yb[3] && yb[3] < xb[2]);
        assert_eq!(blaster.domain().len(), 8);
        assert_eq!(blaster.variable_bits(7, Sort::unsigned(4)), None);
    }

    #[test]
    fn test_predicate_counts_models() {
        let bdd = Bdd::default();
        let mut blaster = Blaster::new();
        let x = Expr::variable(1, Sort::unsigned(8));
        let f = blaster.predicate(&bdd, &x.ge(100).and(x.lt(110))).unwrap();
        let domain = blaster.domain();
        assert_eq!(bdd.sat_count(f, &domain), num_bigint::BigUint::from(10u32));
    }

    #[test]
    fn test_vector_nodes_are_rejected() {
        let bdd = Bdd::default();
        let mut blaster = Blaster::new();
        let v = Expr::vector(1, Sort::unsigned(8));
        let result = blaster.predicate(&bdd, &v.at(0).lt(3));
        assert!(matches!(result, Err(Error::UnsupportedNode(_))));
    }
}

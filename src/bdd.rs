//! Reduced ordered BDD manager with complement edges.
//!
//! All operations go through [`Bdd`], which owns the unique table (hash consing) and the
//! computed table. Variables are 1-indexed and their index is their level: a smaller index
//! sits closer to the root. Index 0 is reserved for the terminal node.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::Debug;

use log::trace;

use crate::cache::Cache;
use crate::reference::Ref;
use crate::table::Table;
use crate::utils::{pairing3, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(self.variable as u64, self.low.as_lit(), self.high.as_lit())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct IteKey(Ref, Ref, Ref);

impl MyHash for IteKey {
    fn hash(&self) -> u64 {
        pairing3(self.0.as_lit(), self.1.as_lit(), self.2.as_lit())
    }
}

pub struct Bdd {
    storage: RefCell<Table<Node>>,
    cache: RefCell<Cache<IteKey, Ref>>,
    one: Ref,
    zero: Ref,
}

impl Bdd {
    pub fn new(storage_bits: usize) -> Self {
        assert!(storage_bits <= 31, "Storage bits should be in the range 0..=31");

        let mut storage = Table::new(storage_bits);

        // Allocate the terminal node:
        let one = storage.add(Node::default());
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one as u32);

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(storage_bits.max(10))),
            one,
            zero: -one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(16)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("buckets", &storage.capacity())
            .field("size", &storage.size())
            .finish()
    }
}

impl Bdd {
    pub fn one(&self) -> Ref {
        self.one
    }
    pub fn zero(&self) -> Ref {
        self.zero
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == 1
    }

    /// Total number of nodes ever allocated, terminal included.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().size()
    }

    /// Hit and miss counters of the computed table.
    pub fn cache_stats(&self) -> (usize, usize) {
        let cache = self.cache.borrow();
        (cache.hits(), cache.misses())
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().value(index as usize).variable
    }
    pub fn low(&self, index: u32) -> Ref {
        self.storage.borrow().value(index as usize).low
    }
    pub fn high(&self, index: u32) -> Ref {
        self.storage.borrow().value(index as usize).high
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity: high edges are never negated.
        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }

        // Handle duplicates
        if low == high {
            return low;
        }

        let i = self.storage.borrow_mut().put(Node { variable: v, low, high });
        Ref::positive(i as u32)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of literals given as signed variable indices.
    pub fn mk_cube(&self, literals: impl IntoIterator<Item = i32>) -> Ref {
        let mut literals: Vec<i32> = literals.into_iter().collect();
        literals.sort_by_key(|&lit| std::cmp::Reverse(lit.unsigned_abs()));
        let mut current = self.one;
        for lit in literals {
            assert_ne!(lit, 0, "Variable index should not be zero");
            let v = lit.unsigned_abs();
            current = if lit < 0 {
                self.mk_node(v, current, self.zero)
            } else {
                self.mk_node(v, self.zero, current)
            };
        }
        current
    }

    /// Disjunction of literals given as signed variable indices.
    pub fn mk_clause(&self, literals: impl IntoIterator<Item = i32>) -> Ref {
        -self.mk_cube(literals.into_iter().map(|lit| -lit))
    }

    fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        if self.is_terminal(node) || v < self.variable(node.index()) {
            return (node, node);
        }
        assert_eq!(v, self.variable(node.index()));
        (self.low_node(node), self.high_node(node))
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }

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
        let (g, h) = if g == f {
            (self.one, h)
        } else if g == -f {
            (self.zero, h)
        } else {
            (g, h)
        };
        let (g, h) = if h == f {
            (g, self.zero)
        } else if h == -f {
            (g, self.one)
        } else {
            (g, h)
        };
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // ite(~F,G,H) => ite(F,H,G)
        let (f, g, h) = if f.is_negated() { (-f, h, g) } else { (f, g, h) };

        // ite(F,~G,H) => ~ite(F,G,~H)
        let (g, h, negate) = if g.is_negated() { (-g, -h, true) } else { (g, h, false) };

        let key = IteKey(f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            trace!("cache: ite({}, {}, {}) -> {}", f, g, h, res);
            return if negate { -res } else { res };
        }

        // Determine the top variable:
        let mut m = self.variable(f.index());
        for x in [g, h] {
            if !self.is_terminal(x) {
                m = m.min(self.variable(x.index()));
            }
        }

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);
        let res = self.mk_node(m, e, t);
        self.cache.borrow_mut().insert(key, res);

        if negate {
            -res
        } else {
            res
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.one)
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.one;
        for node in nodes {
            res = self.apply_and(res, node);
            if self.is_zero(res) {
                break;
            }
        }
        res
    }

    pub fn apply_or_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Ref {
        let mut res = self.zero;
        for node in nodes {
            res = self.apply_or(res, node);
            if self.is_one(res) {
                break;
            }
        }
        res
    }

    /// Indices of all nodes reachable from the given roots, terminal included.
    pub fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<u32> {
        let mut visited = HashSet::new();
        let mut stack: Vec<u32> = nodes.into_iter().map(|node| node.index()).collect();
        while let Some(i) = stack.pop() {
            if !visited.insert(i) || i == 1 {
                continue;
            }
            stack.push(self.low(i).index());
            stack.push(self.high(i).index());
        }
        visited
    }

    pub fn size(&self, node: Ref) -> usize {
        self.descendants([node]).len()
    }

    /// Variables occurring in the BDD, in ascending order.
    pub fn support(&self, node: Ref) -> Vec<u32> {
        let mut vars: Vec<u32> = self
            .descendants([node])
            .into_iter()
            .filter(|&i| i != 1)
            .map(|i| self.variable(i))
            .collect();
        vars.sort_unstable();
        vars.dedup();
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_terminals() {
        let bdd = Bdd::default();
        assert!(bdd.is_one(bdd.one()));
        assert!(bdd.is_zero(bdd.zero()));
        assert_eq!(-bdd.one(), bdd.zero());
        assert!(bdd.is_terminal(bdd.zero()));
    }

    #[test]
    fn test_mk_node_canonical() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        assert_eq!(bdd.mk_node(1, bdd.zero(), bdd.one()), x);
        assert_eq!(bdd.mk_node(1, bdd.one(), bdd.zero()), -x);
        assert_eq!(bdd.mk_node(2, x, x), x);
        assert!(!bdd.high(x.index()).is_negated());
    }

    #[test]
    fn test_ite_identities() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);

        let f = bdd.apply_ite(x, y, z);
        assert_eq!(f, bdd.mk_node(1, z, y));
        let x_and_y = bdd.apply_and(x, y);
        let not_x_and_z = bdd.apply_and(-x, z);
        assert_eq!(f, bdd.apply_or(x_and_y, not_x_and_z));

        assert_eq!(bdd.apply_ite(x, x, y), bdd.apply_or(x, y));
        assert_eq!(bdd.apply_ite(x, y, x), x_and_y);
        assert_eq!(bdd.apply_ite(-x, y, z), bdd.apply_ite(x, z, y));
    }

    #[test]
    fn test_boolean_laws() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);

        assert_eq!(bdd.apply_and(x, -x), bdd.zero());
        assert_eq!(bdd.apply_or(x, -x), bdd.one());
        assert_eq!(bdd.apply_xor(x, x), bdd.zero());
        assert_eq!(bdd.apply_eq(x, x), bdd.one());
        // De Morgan
        assert_eq!(-bdd.apply_and(x, y), bdd.apply_or(-x, -y));
        assert_eq!(bdd.apply_imply(x, y), bdd.apply_or(-x, y));
        assert_eq!(bdd.apply_xor(x, y), -bdd.apply_eq(x, y));
    }

    #[test]
    fn test_cube_and_clause() {
        let bdd = Bdd::default();
        let c = bdd.mk_cube([1, -2, 3]);
        let expected = bdd.apply_and_many([bdd.mk_var(1), -bdd.mk_var(2), bdd.mk_var(3)]);
        assert_eq!(c, expected);

        let d = bdd.mk_clause([-1, 2]);
        assert_eq!(d, bdd.apply_or(-bdd.mk_var(1), bdd.mk_var(2)));
        assert_eq!(bdd.mk_clause([]), bdd.zero());
        assert_eq!(bdd.mk_cube([]), bdd.one());
    }

    #[test]
    fn test_support_and_size() {
        let bdd = Bdd::default();
        let f = bdd.apply_xor(bdd.mk_var(4), bdd.mk_var(2));
        assert_eq!(bdd.support(f), vec![2, 4]);
        // two internal nodes plus the terminal
        assert_eq!(bdd.size(f), 3);
    }

    #[test]
    fn test_cache_is_used() {
        let bdd = Bdd::default();
        let x = bdd.mk_var(1);
        let y = bdd.mk_var(2);
        let z = bdd.mk_var(3);
        let f = bdd.apply_ite(x, y, z);
        let (hits_before, _) = bdd.cache_stats();
        let g = bdd.apply_ite(x, y, z);
        let (hits_after, _) = bdd.cache_stats();
        assert_eq!(f, g);
        assert!(hits_after > hits_before);
    }
}

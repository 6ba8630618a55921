use std::collections::HashMap;

use num_bigint::{BigUint, RandBigInt};
use rand::Rng;

use crate::bdd::Bdd;
use crate::reference::Ref;

/// Model counting and sampling over an explicit, ascending variable domain.
///
/// The domain must contain every variable of the counted BDD; variables of the domain that
/// the BDD does not test are free and double the count.
pub struct Counter<'a> {
    bdd: &'a Bdd,
    domain: &'a [u32],
    cache: HashMap<u32, BigUint>,
}

impl<'a> Counter<'a> {
    pub fn new(bdd: &'a Bdd, domain: &'a [u32]) -> Self {
        debug_assert!(domain.windows(2).all(|w| w[0] < w[1]), "domain must be sorted");
        Self {
            bdd,
            domain,
            cache: HashMap::new(),
        }
    }

    fn position(&self, v: u32) -> usize {
        match self.domain.binary_search(&v) {
            Ok(p) => p,
            Err(_) => panic!("Variable {} is outside of the counting domain", v),
        }
    }

    /// Number of assignments to `domain[from..]` that satisfy `node`.
    pub fn count_from(&mut self, node: Ref, from: usize) -> BigUint {
        let n = self.domain.len();
        if self.bdd.is_zero(node) {
            return BigUint::ZERO;
        }
        if self.bdd.is_one(node) {
            return BigUint::from(1u32) << (n - from);
        }

        let p = self.position(self.bdd.variable(node.index()));
        assert!(p >= from);
        let regular = self.count_top(node.index(), p);
        let count = if node.is_negated() {
            (BigUint::from(1u32) << (n - p)) - regular
        } else {
            regular
        };
        count << (p - from)
    }

    fn count_top(&mut self, index: u32, p: usize) -> BigUint {
        if let Some(count) = self.cache.get(&index) {
            return count.clone();
        }
        let low = self.bdd.low(index);
        let high = self.bdd.high(index);
        let count = self.count_from(low, p + 1) + self.count_from(high, p + 1);
        self.cache.insert(index, count.clone());
        count
    }

    pub fn count(&mut self, node: Ref) -> BigUint {
        self.count_from(node, 0)
    }

    /// Draw a satisfying assignment uniformly at random.
    ///
    /// The result is aligned with the domain. Returns `None` for the constant false function.
    pub fn sample<R: Rng + ?Sized>(&mut self, node: Ref, rng: &mut R) -> Option<Vec<bool>> {
        if self.bdd.is_zero(node) {
            return None;
        }

        let mut values = Vec::with_capacity(self.domain.len());
        let mut current = node;
        for i in 0..self.domain.len() {
            if self.bdd.is_terminal(current) || self.bdd.variable(current.index()) != self.domain[i] {
                values.push(rng.gen::<bool>());
                continue;
            }
            let low = self.bdd.low_node(current);
            let high = self.bdd.high_node(current);
            let count_low = self.count_from(low, i + 1);
            let count_high = self.count_from(high, i + 1);
            let total = &count_low + &count_high;
            let take_high = rng.gen_biguint_below(&total) >= count_low;
            values.push(take_high);
            current = if take_high { high } else { low };
        }
        assert!(self.bdd.is_one(current));

        Some(values)
    }
}

impl Bdd {
    /// Returns one satisfying assignment as signed variable indices, if any exists.
    ///
    /// The high branch is preferred at every node, and only tested variables are listed.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<i32>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;
        while !self.is_one(current) {
            let v = self.variable(current.index()) as i32;
            let high = self.high_node(current);
            if !self.is_zero(high) {
                path.push(v);
                current = high;
            } else {
                path.push(-v);
                current = self.low_node(current);
            }
        }

        Some(path)
    }

    pub fn sat_count(&self, node: Ref, domain: &[u32]) -> BigUint {
        Counter::new(self, domain).count(node)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use test_log::test;

    #[test]
    fn test_one_sat() {
        let bdd = Bdd::default();

        let f = bdd.mk_cube([1, -2, -3]);
        let model = bdd.one_sat(f);
        assert_eq!(model, Some(vec![1, -2, -3]));

        let g = bdd.apply_and(f, -bdd.mk_cube(model.unwrap()));
        assert_eq!(bdd.one_sat(g), None);
    }

    #[test]
    fn test_one_sat_prefers_high() {
        let bdd = Bdd::default();
        let f = bdd.mk_clause([1, 2]);
        assert_eq!(bdd.one_sat(f), Some(vec![1]));
    }

    #[test]
    fn test_sat_count_terminal() {
        let bdd = Bdd::default();
        assert_eq!(bdd.sat_count(bdd.zero(), &[1, 2, 3]), BigUint::from(0u32));
        assert_eq!(bdd.sat_count(bdd.one(), &[1]), BigUint::from(2u32));
        assert_eq!(bdd.sat_count(bdd.one(), &[1, 2, 3]), BigUint::from(8u32));
    }

    #[test]
    fn test_sat_count_cube_and_clause() {
        let bdd = Bdd::default();

        let f = bdd.mk_cube([2, 4]);
        assert_eq!(bdd.sat_count(f, &[2, 4]), BigUint::from(1u32));
        assert_eq!(bdd.sat_count(f, &[1, 2, 3, 4]), BigUint::from(4u32));
        assert_eq!(bdd.sat_count(-f, &[1, 2, 3, 4]), BigUint::from(12u32));

        let g = bdd.mk_clause([1, 2]);
        assert_eq!(bdd.sat_count(g, &[1, 2]), BigUint::from(3u32));
        assert_eq!(bdd.sat_count(g, &[1, 2, 5]), BigUint::from(6u32));
    }

    #[test]
    fn test_sample_satisfies() {
        let bdd = Bdd::default();
        let f = bdd.apply_xor(bdd.mk_var(1), bdd.mk_var(3));
        let domain = [1, 2, 3];
        let mut rng = StdRng::seed_from_u64(7);
        let mut counter = Counter::new(&bdd, &domain);
        for _ in 0..50 {
            let values = counter.sample(f, &mut rng).unwrap();
            assert_ne!(values[0], values[2]);
        }
        assert_eq!(counter.sample(bdd.zero(), &mut rng), None);
    }

    #[test]
    fn test_sample_is_roughly_uniform() {
        // x1 | x2 has three models; each should show up.
        let bdd = Bdd::default();
        let f = bdd.mk_clause([1, 2]);
        let domain = [1, 2];
        let mut rng = StdRng::seed_from_u64(42);
        let mut counter = Counter::new(&bdd, &domain);
        let mut seen = HashMap::new();
        for _ in 0..300 {
            let values = counter.sample(f, &mut rng).unwrap();
            *seen.entry(values).or_insert(0) += 1;
        }
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains_key(&vec![false, false]));
        for &n in seen.values() {
            assert!(n > 50, "skewed sample: {:?}", seen);
        }
    }
}

//! Solver backends.
//!
//! [`Solver`] is the uniform interface the variable and vector solvers talk to, and
//! [`SolverFactory`] creates fresh instances of it. [`BddSolver`] is the bundled
//! implementation: constraints are bit-blasted into one BDD manager and models are drawn
//! uniformly at random from the satisfying assignments.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::bdd::Bdd;
use crate::blast::Blaster;
use crate::config::GeneratorConfig;
use crate::error::Result;
use crate::expr::{Expr, Node};
use crate::mus::minimal_unsat_subsets;
use crate::reference::Ref;
use crate::sat::Counter;

pub trait Solver: Send {
    /// Add a hard constraint.
    fn make_assertion(&mut self, expr: &Expr) -> Result<()>;
    /// Add a soft constraint, honored by [`solve`][Solver::solve] unless softs are ignored.
    fn make_soft_assertion(&mut self, expr: &Expr) -> Result<()>;
    /// Add a constraint for the next solve only, dropped at random while it conflicts.
    fn make_suggestion(&mut self, expr: &Expr) -> Result<()>;
    /// Add a hard constraint for the next solve only.
    fn make_assumption(&mut self, expr: &Expr) -> Result<()>;

    /// Search for a model. Assumptions and suggestions are cleared afterwards.
    fn solve(&mut self, ignore_softs: bool) -> bool;

    /// Value of a variable in the last model.
    fn read(&self, expr: &Expr) -> Option<u64>;

    fn read_vector(&self, symbols: &[Expr]) -> Option<Vec<u64>> {
        symbols.iter().map(|s| self.read(s)).collect()
    }

    /// Minimal unsatisfiable subsets of the given constraints, by key.
    fn analyse_contradiction(&mut self, constraints: &BTreeMap<usize, Expr>) -> Result<Vec<Vec<usize>>>;

    /// Greedily keep soft constraints in declaration order and return the positions of
    /// those that had to be dropped. The kept ones become hard; the soft list is cleared.
    fn analyse_softs(&mut self) -> Vec<usize>;
}

pub trait SolverFactory: Send + Sync {
    fn create(&self, seed: u64) -> Box<dyn Solver>;
}

pub struct BddSolver {
    bdd: Bdd,
    blaster: Blaster,
    hard: Ref,
    softs: Vec<Ref>,
    assumptions: Vec<Ref>,
    suggestions: Vec<Ref>,
    model: HashMap<u32, bool>,
    rng: StdRng,
}

impl BddSolver {
    pub fn new(storage_bits: usize, seed: u64) -> Self {
        let bdd = Bdd::new(storage_bits);
        let hard = bdd.one();
        Self {
            bdd,
            blaster: Blaster::new(),
            hard,
            softs: Vec::new(),
            assumptions: Vec::new(),
            suggestions: Vec::new(),
            model: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn blast(&mut self, expr: &Expr) -> Result<Ref> {
        self.blaster.predicate(&self.bdd, expr)
    }

    fn sample(&mut self, f: Ref) -> bool {
        let domain = self.blaster.domain();
        let mut counter = Counter::new(&self.bdd, &domain);
        match counter.sample(f, &mut self.rng) {
            Some(values) => {
                self.model = domain.into_iter().zip(values).collect();
                true
            }
            None => {
                self.model.clear();
                false
            }
        }
    }
}

impl Debug for BddSolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BddSolver")
            .field("nodes", &self.bdd.num_nodes())
            .field("softs", &self.softs.len())
            .field("assumptions", &self.assumptions.len())
            .field("suggestions", &self.suggestions.len())
            .finish()
    }
}

impl Solver for BddSolver {
    fn make_assertion(&mut self, expr: &Expr) -> Result<()> {
        let f = self.blast(expr)?;
        self.hard = self.bdd.apply_and(self.hard, f);
        Ok(())
    }

    fn make_soft_assertion(&mut self, expr: &Expr) -> Result<()> {
        let f = self.blast(expr)?;
        self.softs.push(f);
        Ok(())
    }

    fn make_suggestion(&mut self, expr: &Expr) -> Result<()> {
        let f = self.blast(expr)?;
        self.suggestions.push(f);
        Ok(())
    }

    fn make_assumption(&mut self, expr: &Expr) -> Result<()> {
        let f = self.blast(expr)?;
        self.assumptions.push(f);
        Ok(())
    }

    fn solve(&mut self, ignore_softs: bool) -> bool {
        let mut base = self.bdd.apply_and_many(self.assumptions.drain(..).chain([self.hard]));
        if !ignore_softs {
            base = self.bdd.apply_and_many(self.softs.iter().copied().chain([base]));
        }

        let mut suggestions = std::mem::take(&mut self.suggestions);
        suggestions.shuffle(&mut self.rng);
        let f = loop {
            let f = self.bdd.apply_and_many(suggestions.iter().copied().chain([base]));
            if !self.bdd.is_zero(f) || suggestions.is_empty() {
                break f;
            }
            suggestions.pop();
        };
        trace!("bdd: solving over {} nodes", self.bdd.num_nodes());

        self.sample(f)
    }

    fn read(&self, expr: &Expr) -> Option<u64> {
        let Node::Variable { id, sort } = *expr.node() else {
            return None;
        };
        let bits = self.blaster.variable_bits(id, sort)?;
        bits.iter().enumerate().try_fold(0u64, |acc, (i, v)| {
            let bit = *self.model.get(v)?;
            Some(acc | ((bit as u64) << i))
        })
    }

    fn analyse_contradiction(&mut self, constraints: &BTreeMap<usize, Expr>) -> Result<Vec<Vec<usize>>> {
        let keys: Vec<usize> = constraints.keys().copied().collect();
        let refs = constraints.values().map(|e| self.blast(e)).collect::<Result<Vec<_>>>()?;
        let mut groups: Vec<Vec<usize>> = minimal_unsat_subsets(&self.bdd, &refs)
            .into_iter()
            .map(|core| core.into_iter().map(|i| keys[i]).collect())
            .collect();
        for group in groups.iter_mut() {
            group.sort_unstable();
        }
        groups.sort();
        Ok(groups)
    }

    fn analyse_softs(&mut self) -> Vec<usize> {
        let mut dropped = Vec::new();
        for (i, soft) in std::mem::take(&mut self.softs).into_iter().enumerate() {
            let f = self.bdd.apply_and(self.hard, soft);
            if self.bdd.is_zero(f) {
                dropped.push(i);
            } else {
                self.hard = f;
            }
        }
        debug!("bdd: soft analysis dropped {:?}", dropped);
        dropped
    }
}

/// Creates [`BddSolver`]s with a fixed unique-table size.
#[derive(Debug, Clone)]
pub struct BddSolverFactory {
    storage_bits: usize,
}

impl BddSolverFactory {
    pub fn new(storage_bits: usize) -> Self {
        Self { storage_bits }
    }
}

impl Default for BddSolverFactory {
    fn default() -> Self {
        Self::new(16)
    }
}

impl SolverFactory for BddSolverFactory {
    fn create(&self, seed: u64) -> Box<dyn Solver> {
        Box::new(BddSolver::new(self.storage_bits, seed))
    }
}

/// A solver factory together with the configuration and seed stream of one generator.
#[derive(Clone)]
pub struct SolverBuilder {
    factory: Arc<dyn SolverFactory>,
    config: GeneratorConfig,
    rng: StdRng,
}

impl SolverBuilder {
    pub fn new(factory: Arc<dyn SolverFactory>, config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { factory, config, rng }
    }

    /// An independent builder whose seeds derive from this one.
    pub fn fork(&mut self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            config: self.config.clone(),
            rng: StdRng::seed_from_u64(self.next_seed()),
        }
    }

    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }

    pub fn factory(&self) -> &dyn SolverFactory {
        self.factory.as_ref()
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn create(&mut self) -> Box<dyn Solver> {
        let seed = self.next_seed();
        self.factory.create(seed)
    }
}

impl Debug for SolverBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverBuilder").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::expr::Sort;
    use test_log::test;

    fn solver() -> BddSolver {
        BddSolver::new(12, 1)
    }

    #[test]
    fn test_solve_and_read() {
        let mut s = solver();
        let x = Expr::variable(1, Sort::unsigned(8));
        s.make_assertion(&x.gt(200).and(x.lt(203))).unwrap();
        for _ in 0..10 {
            assert!(s.solve(false));
            let v = s.read(&x).unwrap();
            assert!(v == 201 || v == 202, "v = {}", v);
        }
    }

    #[test]
    fn test_read_unknown() {
        let mut s = solver();
        let x = Expr::variable(1, Sort::unsigned(8));
        let y = Expr::variable(2, Sort::unsigned(8));
        s.make_assertion(&x.equal(3)).unwrap();
        assert_eq!(s.read(&x), None);
        assert!(s.solve(false));
        assert_eq!(s.read(&x), Some(3));
        assert_eq!(s.read(&y), None);
        assert_eq!(s.read_vector(&[x.clone(), y]), None);
        assert_eq!(s.read_vector(&[x.clone(), x]), Some(vec![3, 3]));
    }

    #[test]
    fn test_unsat_clears_model() {
        let mut s = solver();
        let x = Expr::variable(1, Sort::unsigned(4));
        s.make_assertion(&x.equal(3)).unwrap();
        assert!(s.solve(false));
        s.make_assumption(&x.equal(4)).unwrap();
        assert!(!s.solve(false));
        assert_eq!(s.read(&x), None);
        // The assumption applies to a single solve.
        assert!(s.solve(false));
    }

    #[test]
    fn test_conflicting_suggestions_are_dropped() {
        let mut s = solver();
        let x = Expr::variable(1, Sort::unsigned(4));
        s.make_assertion(&x.lt(8)).unwrap();
        s.make_suggestion(&x.equal(5)).unwrap();
        assert!(s.solve(false));
        assert_eq!(s.read(&x), Some(5));

        s.make_suggestion(&x.equal(12)).unwrap();
        assert!(s.solve(false));
        assert!(s.read(&x).unwrap() < 8);
    }

    #[test]
    fn test_softs_ignored_on_request() {
        let mut s = solver();
        let x = Expr::variable(1, Sort::unsigned(4));
        s.make_soft_assertion(&x.equal(1)).unwrap();
        s.make_soft_assertion(&x.equal(2)).unwrap();
        assert!(!s.solve(false));
        assert!(s.solve(true));
    }

    #[test]
    fn test_analyse_softs_is_greedy() {
        let mut s = solver();
        let x = Expr::variable(1, Sort::unsigned(4));
        s.make_assertion(&x.gt(2)).unwrap();
        s.make_soft_assertion(&x.equal(1)).unwrap();
        s.make_soft_assertion(&x.equal(5)).unwrap();
        s.make_soft_assertion(&x.equal(6)).unwrap();
        assert_eq!(s.analyse_softs(), vec![0, 2]);
        assert!(s.solve(false));
        assert_eq!(s.read(&x), Some(5));
    }

    #[test]
    fn test_analyse_contradiction() {
        let mut s = solver();
        let t = Expr::bool(true);
        let f = Expr::bool(false);
        let groups = s
            .analyse_contradiction(&BTreeMap::from([(0, t.clone()), (1, f.clone())]))
            .unwrap();
        assert_eq!(groups, vec![vec![1]]);

        let groups = s
            .analyse_contradiction(&BTreeMap::from([(0, f.clone()), (1, f.clone())]))
            .unwrap();
        assert_eq!(groups, vec![vec![0], vec![1]]);

        let b = Expr::variable(10, Sort::unsigned(8));
        let d = Expr::variable(11, Sort::unsigned(8));
        let groups = s
            .analyse_contradiction(&BTreeMap::from([(0, t), (1, f), (2, d.not_equal(&b)), (3, d.equal(&b))]))
            .unwrap();
        assert_eq!(groups, vec![vec![1], vec![2, 3]]);
    }

    #[test]
    fn test_analyse_contradiction_triangle() {
        let mut s = solver();
        let a = Expr::variable(1, Sort::Bool);
        let b = Expr::variable(2, Sort::Bool);
        let c = Expr::variable(3, Sort::Bool);
        let groups = s
            .analyse_contradiction(&BTreeMap::from([
                (0, a.not_equal(&b)),
                (1, b.not_equal(&c)),
                (2, a.not_equal(&c)),
            ]))
            .unwrap();
        assert_eq!(groups, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_keys_are_reported() {
        let mut s = solver();
        let groups = s
            .analyse_contradiction(&BTreeMap::from([(4, Expr::bool(false)), (9, Expr::bool(true))]))
            .unwrap();
        assert_eq!(groups, vec![vec![4]]);
    }

    #[test]
    fn test_vector_nodes_rejected() {
        let mut s = solver();
        let v = Expr::vector(1, Sort::unsigned(8));
        let result = s.make_assertion(&Expr::unique(&v));
        assert!(matches!(result, Err(Error::UnsupportedNode("unique"))));
    }

    #[test]
    fn test_factory_seeds_are_reproducible() {
        let factory = BddSolverFactory::new(10);
        let x = Expr::variable(1, Sort::unsigned(16));
        let draw = |seed| {
            let mut s = factory.create(seed);
            s.make_assertion(&x.gt(10)).unwrap();
            assert!(s.solve(false));
            s.read(&x).unwrap()
        };
        assert_eq!(draw(7), draw(7));
    }
}

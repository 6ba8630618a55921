//! Variable generators: one solver per partition, composed into a single answer.

use std::sync::{Mutex, PoisonError};
use std::thread;

use log::debug;

use crate::backend::SolverBuilder;
use crate::error::Result;
use crate::partition::ConstraintPartition;
use crate::variable_solver::{CoverageVariableSolver, DefaultVariableSolver, VariableSolver};
use crate::variables::VariableContainer;

pub trait VariableGenerator: Send {
    /// Drop all solvers and build one per partition.
    fn reset(&mut self, vars: &VariableContainer, partitions: &[ConstraintPartition]) -> Result<()>;

    fn solve(&mut self, vars: &VariableContainer) -> bool;

    fn solvers(&self) -> &[Box<dyn VariableSolver>];

    /// Value of `var` from the solver owning it.
    fn read(&self, var: u32) -> Option<u64> {
        self.solvers().iter().find_map(|s| s.read(var))
    }

    fn contradictions(&self) -> Vec<Vec<String>> {
        self.solvers().iter().flat_map(|s| s.contradictions().iter().cloned()).collect()
    }

    fn inactive_softs(&self) -> Vec<String> {
        self.solvers().iter().flat_map(|s| s.inactive_softs().iter().cloned()).collect()
    }
}

fn build_default(
    builder: &mut SolverBuilder,
    vars: &VariableContainer,
    partitions: &[ConstraintPartition],
) -> Result<Vec<Box<dyn VariableSolver>>> {
    partitions
        .iter()
        .map(|p| {
            let seed = builder.next_seed();
            let solver = DefaultVariableSolver::new(vars, p.clone(), builder.factory(), builder.config(), seed)?;
            Ok(Box::new(solver) as Box<dyn VariableSolver>)
        })
        .collect()
}

/// Solves partitions one after another and stops at the first failure.
pub struct DefaultVariableGenerator {
    builder: SolverBuilder,
    solvers: Vec<Box<dyn VariableSolver>>,
}

impl DefaultVariableGenerator {
    pub fn new(builder: SolverBuilder) -> Self {
        Self {
            builder,
            solvers: Vec::new(),
        }
    }
}

impl VariableGenerator for DefaultVariableGenerator {
    fn reset(&mut self, vars: &VariableContainer, partitions: &[ConstraintPartition]) -> Result<()> {
        self.solvers = build_default(&mut self.builder, vars, partitions)?;
        Ok(())
    }

    fn solve(&mut self, vars: &VariableContainer) -> bool {
        self.solvers.iter_mut().all(|s| s.solve(vars))
    }

    fn solvers(&self) -> &[Box<dyn VariableSolver>] {
        &self.solvers
    }
}

/// Builds and solves every partition on its own scoped thread.
pub struct ThreadedVariableGenerator {
    builder: SolverBuilder,
    solvers: Vec<Box<dyn VariableSolver>>,
}

impl ThreadedVariableGenerator {
    pub fn new(builder: SolverBuilder) -> Self {
        Self {
            builder,
            solvers: Vec::new(),
        }
    }
}

impl VariableGenerator for ThreadedVariableGenerator {
    fn reset(&mut self, vars: &VariableContainer, partitions: &[ConstraintPartition]) -> Result<()> {
        let seeds: Vec<u64> = partitions.iter().map(|_| self.builder.next_seed()).collect();
        let built = Mutex::new(Vec::with_capacity(partitions.len()));
        let builder = &self.builder;

        thread::scope(|scope| {
            for (index, (partition, seed)) in partitions.iter().zip(seeds).enumerate() {
                let built = &built;
                scope.spawn(move || {
                    let result =
                        DefaultVariableSolver::new(vars, partition.clone(), builder.factory(), builder.config(), seed);
                    built.lock().unwrap_or_else(PoisonError::into_inner).push((index, result));
                });
            }
        });

        let mut built = built.into_inner().unwrap_or_else(PoisonError::into_inner);
        built.sort_by_key(|(index, _)| *index);
        debug!("threaded generator: built {} solvers", built.len());
        self.solvers = built
            .into_iter()
            .map(|(_, result)| result.map(|s| Box::new(s) as Box<dyn VariableSolver>))
            .collect::<Result<_>>()?;
        Ok(())
    }

    fn solve(&mut self, vars: &VariableContainer) -> bool {
        let results: Vec<bool> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .solvers
                .iter_mut()
                .map(|solver| scope.spawn(move || solver.solve(vars)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });
        results.into_iter().all(|ok| ok)
    }

    fn solvers(&self) -> &[Box<dyn VariableSolver>] {
        &self.solvers
    }
}

/// Tries to hit a new cover constraint in every partition.
pub struct CoverageVariableGenerator {
    builder: SolverBuilder,
    solvers: Vec<Box<dyn VariableSolver>>,
}

impl CoverageVariableGenerator {
    pub fn new(builder: SolverBuilder) -> Self {
        Self {
            builder,
            solvers: Vec::new(),
        }
    }
}

impl VariableGenerator for CoverageVariableGenerator {
    fn reset(&mut self, vars: &VariableContainer, partitions: &[ConstraintPartition]) -> Result<()> {
        self.solvers = partitions
            .iter()
            .map(|p| {
                let seed = self.builder.next_seed();
                let solver =
                    CoverageVariableSolver::new(vars, p.clone(), self.builder.factory(), self.builder.config(), seed)?;
                Ok(Box::new(solver) as Box<dyn VariableSolver>)
            })
            .collect::<Result<_>>()?;
        Ok(())
    }

    /// Succeeds if any partition hit a cover constraint. Every partition is tried.
    fn solve(&mut self, vars: &VariableContainer) -> bool {
        let mut hit = false;
        for solver in self.solvers.iter_mut() {
            hit |= solver.solve(vars);
        }
        hit
    }

    fn solvers(&self) -> &[Box<dyn VariableSolver>] {
        &self.solvers
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::BddSolverFactory;
    use crate::config::GeneratorConfig;
    use crate::constraint::ConstraintRegistry;
    use crate::context::Context;
    use crate::partition::ConstraintPartitioner;
    use test_log::test;

    fn builder(seed: u64) -> SolverBuilder {
        SolverBuilder::new(Arc::new(BddSolverFactory::new(12)), GeneratorConfig::default().with_seed(seed))
    }

    fn partitions(registry: &ConstraintRegistry) -> Vec<ConstraintPartition> {
        let mut partitioner = ConstraintPartitioner::new();
        partitioner.merge(registry);
        partitioner.partition();
        partitioner.partitions().to_vec()
    }

    #[test]
    fn test_and_composition() {
        let ctx = Context::new();
        let x = ctx.var::<u8>();
        let y = ctx.var::<u8>();
        let mut registry = ConstraintRegistry::new(&ctx);
        registry.make_constraint(None, x.lt(10), false, false).unwrap();
        registry.make_constraint(None, y.gt(200), false, false).unwrap();
        let partitions = partitions(&registry);
        assert_eq!(partitions.len(), 2);

        let mut generator = DefaultVariableGenerator::new(builder(1));
        generator.reset(&ctx.variables(), &partitions).unwrap();
        assert!(generator.solve(&ctx.variables()));
        assert!(x.get() < 10 && y.get() > 200);
        assert_eq!(generator.read(y.id()), Some(y.get() as u64));

        registry.make_constraint(None, y.lt(100), false, false).unwrap();
        let partitions = self::partitions(&registry);
        generator.reset(&ctx.variables(), &partitions).unwrap();
        assert!(!generator.solve(&ctx.variables()));
        assert_eq!(generator.contradictions().len(), 1);
    }

    #[test]
    fn test_threaded_matches_default() {
        let ctx = Context::new();
        let vars: Vec<_> = (0..6).map(|_| ctx.var::<u8>()).collect();
        let mut registry = ConstraintRegistry::new(&ctx);
        for (i, v) in vars.iter().enumerate() {
            registry.make_constraint(None, v.equal(i as i32 * 10), false, false).unwrap();
        }
        let partitions = partitions(&registry);
        assert_eq!(partitions.len(), 6);

        let mut generator = ThreadedVariableGenerator::new(builder(2));
        generator.reset(&ctx.variables(), &partitions).unwrap();
        assert!(generator.solve(&ctx.variables()));
        for (i, v) in vars.iter().enumerate() {
            assert_eq!(v.get() as usize, i * 10);
        }
        assert_eq!(generator.solvers().len(), 6);
        assert_eq!(generator.solvers()[3].partition().support(), partitions[3].support());
    }

    #[test]
    fn test_threaded_reports_failure() {
        let ctx = Context::new();
        let x = ctx.var::<u8>();
        let y = ctx.var::<u8>();
        let mut registry = ConstraintRegistry::new(&ctx);
        registry.make_constraint(None, x.lt(10), false, false).unwrap();
        registry.make_constraint(None, y.lt(0), false, false).unwrap();

        let mut generator = ThreadedVariableGenerator::new(builder(3));
        generator.reset(&ctx.variables(), &partitions(&registry)).unwrap();
        assert!(!generator.solve(&ctx.variables()));
        // The satisfiable partition is still solved.
        assert!(x.get() < 10);
    }

    #[test]
    fn test_coverage_is_or_composed() {
        let ctx = Context::new();
        let x = ctx.var::<u8>();
        let y = ctx.var::<u8>();
        let mut registry = ConstraintRegistry::new(&ctx);
        registry.make_constraint(None, x.equal(4), false, true).unwrap();
        registry.make_constraint(None, y.lt(10), false, false).unwrap();

        let mut generator = CoverageVariableGenerator::new(builder(4));
        generator.reset(&ctx.variables(), &partitions(&registry)).unwrap();
        assert!(generator.solve(&ctx.variables()));
        assert_eq!(x.get(), 4);
        assert!(!generator.solve(&ctx.variables()));
    }
}

//! The top-level generator.

use std::sync::Arc;

use log::debug;

use crate::backend::{BddSolverFactory, SolverBuilder, SolverFactory};
use crate::config::GeneratorConfig;
use crate::constraint::ConstraintRegistry;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::partition::{ConstraintPartition, ConstraintPartitioner};
use crate::variable_generator::{
    CoverageVariableGenerator, DefaultVariableGenerator, ThreadedVariableGenerator, VariableGenerator,
};
use crate::variables::{RandType, Var};
use crate::vector::VectorGenerator;

/// Owns a set of constraints and produces random solutions for them.
///
/// Constraints are partitioned lazily: the first [`next`][Generator::next] after any
/// change rebuilds the partitions and their solvers.
pub struct Generator {
    context: Context,
    config: GeneratorConfig,
    registry: ConstraintRegistry,
    partitioner: ConstraintPartitioner,
    var_gen: Box<dyn VariableGenerator>,
    vec_gen: VectorGenerator,
    var_cov_gen: CoverageVariableGenerator,
    vec_cov_gen: VectorGenerator,
    covered: bool,
}

impl Generator {
    pub fn new(context: &Context) -> Self {
        Self::with_config(context, GeneratorConfig::default())
    }

    pub fn with_config(context: &Context, config: GeneratorConfig) -> Self {
        let factory = Arc::new(BddSolverFactory::new(config.storage_bits));
        Self::with_factory(context, config, factory)
    }

    pub fn with_factory(context: &Context, config: GeneratorConfig, factory: Arc<dyn SolverFactory>) -> Self {
        let mut builder = SolverBuilder::new(factory, config.clone());
        let var_gen: Box<dyn VariableGenerator> = if config.multithreaded {
            Box::new(ThreadedVariableGenerator::new(builder.fork()))
        } else {
            Box::new(DefaultVariableGenerator::new(builder.fork()))
        };
        Self {
            context: context.clone(),
            registry: ConstraintRegistry::new(context),
            partitioner: ConstraintPartitioner::new(),
            var_gen,
            vec_gen: VectorGenerator::new(builder.fork(), context),
            var_cov_gen: CoverageVariableGenerator::new(builder.fork()),
            vec_cov_gen: VectorGenerator::new(builder.fork(), context),
            covered: false,
            config,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConstraintRegistry {
        &self.registry
    }

    pub fn partitions(&self) -> &[ConstraintPartition] {
        self.partitioner.partitions()
    }

    fn constraint(&mut self, name: Option<&str>, expr: Expr, soft: bool, cover: bool) -> Result<&mut Self> {
        self.registry.make_constraint(name, expr, soft, cover)?;
        Ok(self)
    }

    /// Add a hard constraint.
    pub fn add(&mut self, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(None, expr.into(), false, false)
    }

    pub fn add_named(&mut self, name: &str, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(Some(name), expr.into(), false, false)
    }

    /// Add a soft constraint, dropped when it conflicts with the hard ones.
    pub fn soft(&mut self, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(None, expr.into(), true, false)
    }

    pub fn soft_named(&mut self, name: &str, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(Some(name), expr.into(), true, false)
    }

    /// Add a cover constraint, hit once by [`next_cov`][Generator::next_cov].
    pub fn cover(&mut self, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(None, expr.into(), false, true)
    }

    pub fn cover_named(&mut self, name: &str, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(Some(name), expr.into(), false, true)
    }

    pub fn enable_constraint(&mut self, name: &str) -> bool {
        self.registry.enable(name)
    }

    pub fn disable_constraint(&mut self, name: &str) -> bool {
        self.registry.disable(name)
    }

    pub fn is_constraint_enabled(&self, name: &str) -> bool {
        self.registry.is_enabled(name)
    }

    pub fn is_changed(&self) -> bool {
        self.registry.is_changed()
    }

    /// Forget all merged constraints and coverage progress.
    pub fn reset(&mut self) {
        self.registry.reset_changed();
        self.partitioner.reset();
        self.covered = false;
    }

    /// Include the constraints of another registry in the next rebuild.
    ///
    /// The registry must belong to this generator's context.
    pub fn merge(&mut self, registry: &ConstraintRegistry) {
        debug_assert!(
            registry.context().ptr_eq(&self.context),
            "registry {} belongs to another context",
            registry.id()
        );
        self.partitioner.merge(registry);
    }

    /// Partition the merged constraints and build fresh solvers.
    pub fn rebuild(&mut self, self_include: bool) -> Result<()> {
        if self_include {
            self.partitioner.merge(&self.registry);
        }
        self.partitioner.partition();
        debug!(
            "generator: rebuilding {} partitions, {} vector constraints",
            self.partitioner.partitions().len(),
            self.partitioner.vector_constraints().len()
        );

        let vars = self.context.variables();
        self.var_gen.reset(&vars, self.partitioner.partitions())?;
        self.vec_gen.reset(self.partitioner.vector_constraints());
        self.var_cov_gen.reset(&vars, self.partitioner.partitions())?;
        self.vec_cov_gen.reset(self.partitioner.vector_constraints());
        Ok(())
    }

    fn rebuild_if_changed(&mut self) -> Result<()> {
        if self.registry.is_changed() {
            self.reset();
            self.rebuild(true)?;
        }
        Ok(())
    }

    /// Produce the next solution. Returns `false` when the constraints are unsatisfiable.
    pub fn next(&mut self) -> Result<bool> {
        self.rebuild_if_changed()?;
        let vars = self.context.variables();
        if !self.var_gen.solve(&vars) {
            return Ok(false);
        }
        let var_gen = &self.var_gen;
        self.vec_gen.solve(&|id| var_gen.read(id), &vars)
    }

    /// Like [`next`][Generator::next], but unsatisfiability is an error.
    pub fn try_next(&mut self) -> Result<()> {
        if self.next()? {
            Ok(())
        } else {
            Err(Error::Unsatisfiable)
        }
    }

    /// Produce a solution hitting a not yet covered cover constraint, or a plain solution
    /// once every cover constraint has been hit.
    ///
    /// Partitions without a new hit keep the values of a plain solve.
    pub fn next_cov(&mut self) -> Result<bool> {
        self.rebuild_if_changed()?;
        if !self.covered {
            let vars = self.context.variables();
            if !self.var_gen.solve(&vars) {
                return Ok(false);
            }
            if self.var_cov_gen.solve(&vars) {
                let (var_gen, var_cov_gen) = (&self.var_gen, &self.var_cov_gen);
                let read = |id: u32| var_cov_gen.read(id).or_else(|| var_gen.read(id));
                if self.vec_cov_gen.solve(&read, &vars)? {
                    return Ok(true);
                }
            }
            debug!("generator: coverage exhausted");
            self.covered = true;
        }
        self.next()
    }

    pub fn is_covered(&self) -> bool {
        self.covered
    }

    /// Start coverage over: every cover constraint can be hit again.
    pub fn reset_coverage(&mut self) -> Result<()> {
        self.covered = false;
        let vars = self.context.variables();
        self.var_cov_gen.reset(&vars, self.partitioner.partitions())?;
        self.vec_cov_gen.reset(self.partitioner.vector_constraints());
        Ok(())
    }

    /// Raw bits of `var` in the last solution.
    pub fn read_bits(&self, var: u32) -> Result<u64> {
        self.var_gen.read(var).ok_or(Error::InvalidRead(var))
    }

    pub fn read<T: RandType>(&self, var: &Var<T>) -> Result<T> {
        self.read_bits(var.id()).map(T::from_bits)
    }

    /// Groups of hard constraints that cannot hold together, by name.
    pub fn analyse_contradiction(&self) -> Vec<Vec<String>> {
        self.var_gen.contradictions()
    }

    /// Soft constraints that were dropped, by name.
    pub fn inactive_softs(&self) -> Vec<String> {
        self.var_gen.inactive_softs()
    }

    /// Graphviz rendering of the current partitions.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        crate::dot::partitions_to_dot(self.partitioner.partitions(), self.partitioner.vector_constraints())
    }
}

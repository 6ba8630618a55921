//! One solver per partition.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{Solver, SolverFactory};
use crate::config::GeneratorConfig;
use crate::constraint::Constraint;
use crate::error::Result;
use crate::expr::Expr;
use crate::partition::ConstraintPartition;
use crate::variables::VariableContainer;

pub trait VariableSolver: Send {
    fn partition(&self) -> &ConstraintPartition;

    /// Solve the partition and write the results into the write references.
    fn solve(&mut self, vars: &VariableContainer) -> bool;

    /// Value of `var` from the last successful solve, if `var` belongs to this partition.
    fn read(&self, var: u32) -> Option<u64>;

    /// Names of the constraints in each minimal contradicting group.
    fn contradictions(&self) -> &[Vec<String>] {
        &[]
    }

    /// Names of the soft constraints dropped to keep the partition satisfiable.
    fn inactive_softs(&self) -> &[String] {
        &[]
    }
}

fn support_variables(partition: &ConstraintPartition) -> BTreeMap<u32, Expr> {
    partition
        .constraints()
        .iter()
        .flat_map(|c| c.expr().variables())
        .filter_map(|v| Some((v.id()?, v)))
        .collect()
}

/// `size <= max` for every vector whose size variable occurs in `variables`.
fn size_bounds(variables: &BTreeMap<u32, Expr>, vars: &VariableContainer, max: usize) -> BTreeMap<u32, Expr> {
    let max = max.min(u32::MAX as usize) as u64;
    vars.vectors()
        .filter_map(|entry| {
            let id = entry.size.id()?;
            let size = variables.get(&id)?;
            Some((id, size.le(Expr::constant(max, size.sort()))))
        })
        .collect()
}

fn equal_to(expr: &Expr, bits: u64) -> Expr {
    expr.equal(Expr::constant(bits, expr.sort()))
}

fn assume_read_refs(solver: &mut dyn Solver, variables: &BTreeMap<u32, Expr>, vars: &VariableContainer) -> Result<()> {
    for (id, bits) in vars.read_refs() {
        if let Some(expr) = variables.get(&id) {
            solver.make_assumption(&equal_to(expr, bits))?;
        }
    }
    Ok(())
}

fn write_back(solver: &dyn Solver, variables: &BTreeMap<u32, Expr>, vars: &VariableContainer) {
    for (&id, expr) in variables {
        if let Some(bits) = solver.read(expr) {
            vars.write(id, bits);
        }
    }
}

/// Solves the hard and soft constraints of a partition.
///
/// Construction analyses the partition once: contradicting groups of hard constraints
/// make every solve fail, and soft constraints that cannot hold together with the hard
/// ones are dropped for good.
pub struct DefaultVariableSolver {
    partition: ConstraintPartition,
    solver: Box<dyn Solver>,
    variables: BTreeMap<u32, Expr>,
    size_bounds: BTreeMap<u32, Expr>,
    presolvers: Vec<(Expr, Box<dyn Solver>)>,
    contradictions: Vec<Vec<String>>,
    inactive_softs: Vec<String>,
    rng: StdRng,
}

impl DefaultVariableSolver {
    pub fn new(
        vars: &VariableContainer,
        partition: ConstraintPartition,
        factory: &dyn SolverFactory,
        config: &GeneratorConfig,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut solver = factory.create(rng.gen());
        for c in partition.constraints().iter().filter(|c| !c.is_cover()) {
            if c.is_soft() {
                solver.make_soft_assertion(c.expr())?;
            } else {
                solver.make_assertion(c.expr())?;
            }
        }
        let variables = support_variables(&partition);
        let size_bounds = size_bounds(&variables, vars, config.max_vector_size);
        for bound in size_bounds.values() {
            solver.make_assertion(bound)?;
        }

        let mut this = Self {
            variables,
            size_bounds,
            partition,
            solver,
            presolvers: Vec::new(),
            contradictions: Vec::new(),
            inactive_softs: Vec::new(),
            rng,
        };
        if config.bypass_constraint_analysis {
            return Ok(this);
        }

        if !this.solver.solve(true) {
            this.analyse_hards(factory)?;
        }
        if this.contradictions.is_empty() {
            this.analyse_softs();
            if config.single_var_presolve {
                this.build_presolvers(vars, factory)?;
            }
        }
        Ok(this)
    }

    fn analyse_hards(&mut self, factory: &dyn SolverFactory) -> Result<()> {
        let hards: Vec<&Constraint> = self.partition.constraints().iter().filter(|c| c.is_hard()).collect();
        let keyed: BTreeMap<usize, Expr> = hards.iter().enumerate().map(|(i, c)| (i, c.expr().clone())).collect();
        let mut checker = factory.create(self.rng.gen());
        let groups = checker.analyse_contradiction(&keyed)?;
        self.contradictions = groups
            .into_iter()
            .map(|group| group.into_iter().map(|i| hards[i].name().to_string()).collect())
            .collect();
        debug!("variable solver: contradictions {:?}", self.contradictions);
        Ok(())
    }

    fn analyse_softs(&mut self) {
        let softs: Vec<&Constraint> = self.partition.constraints().iter().filter(|c| c.is_soft()).collect();
        if softs.is_empty() {
            return;
        }
        self.inactive_softs = self
            .solver
            .analyse_softs()
            .into_iter()
            .map(|i| softs[i].name().to_string())
            .collect();
        if !self.inactive_softs.is_empty() {
            debug!("variable solver: inactive softs {:?}", self.inactive_softs);
        }
    }

    fn build_presolvers(&mut self, vars: &VariableContainer, factory: &dyn SolverFactory) -> Result<()> {
        for (&id, expr) in &self.variables {
            let constraints = self.partition.single_var_constraints(id);
            if constraints.is_empty() || !vars.is_write_ref(id) || vars.has_dist_ref(id) {
                continue;
            }
            let mut presolver = factory.create(self.rng.gen());
            for c in constraints {
                presolver.make_assertion(c.expr())?;
            }
            if let Some(bound) = self.size_bounds.get(&id) {
                presolver.make_assertion(bound)?;
            }
            self.presolvers.push((expr.clone(), presolver));
        }
        Ok(())
    }

    fn prepare(&mut self, vars: &VariableContainer) -> Result<()> {
        for (expr, presolver) in self.presolvers.iter_mut() {
            if presolver.solve(false) {
                if let Some(bits) = presolver.read(expr) {
                    self.solver.make_suggestion(&equal_to(expr, bits))?;
                }
            }
        }
        assume_read_refs(self.solver.as_mut(), &self.variables, vars)?;
        for (id, sampler) in vars.dist_refs() {
            if let Some(expr) = self.variables.get(&id) {
                let bits = sampler(&mut self.rng);
                self.solver.make_suggestion(&equal_to(expr, bits))?;
            }
        }
        Ok(())
    }
}

impl VariableSolver for DefaultVariableSolver {
    fn partition(&self) -> &ConstraintPartition {
        &self.partition
    }

    fn solve(&mut self, vars: &VariableContainer) -> bool {
        if !self.contradictions.is_empty() {
            return false;
        }
        if let Err(err) = self.prepare(vars) {
            warn!("variable solver: {}", err);
            return false;
        }
        if !self.solver.solve(false) {
            return false;
        }
        write_back(self.solver.as_ref(), &self.variables, vars);
        true
    }

    fn read(&self, var: u32) -> Option<u64> {
        let expr = self.variables.get(&var)?;
        self.solver.read(expr)
    }

    fn contradictions(&self) -> &[Vec<String>] {
        &self.contradictions
    }

    fn inactive_softs(&self) -> &[String] {
        &self.inactive_softs
    }
}

/// Hits the cover constraints of a partition one at a time.
///
/// [`read`][VariableSolver::read] only answers after a solve that hit a cover constraint.
pub struct CoverageVariableSolver {
    partition: ConstraintPartition,
    solver: Box<dyn Solver>,
    variables: BTreeMap<u32, Expr>,
    covered: BTreeSet<String>,
    hit: bool,
}

impl CoverageVariableSolver {
    pub fn new(
        vars: &VariableContainer,
        partition: ConstraintPartition,
        factory: &dyn SolverFactory,
        config: &GeneratorConfig,
        seed: u64,
    ) -> Result<Self> {
        let mut solver = factory.create(seed);
        for c in partition.constraints().iter().filter(|c| c.is_hard()) {
            solver.make_assertion(c.expr())?;
        }
        let variables = support_variables(&partition);
        for bound in size_bounds(&variables, vars, config.max_vector_size).values() {
            solver.make_assertion(bound)?;
        }
        Ok(Self {
            variables,
            partition,
            solver,
            covered: BTreeSet::new(),
            hit: false,
        })
    }

    pub fn covered(&self) -> &BTreeSet<String> {
        &self.covered
    }

    fn try_cover(&mut self, cover: &Constraint, vars: &VariableContainer) -> Result<bool> {
        assume_read_refs(self.solver.as_mut(), &self.variables, vars)?;
        self.solver.make_assumption(cover.expr())?;
        Ok(self.solver.solve(false))
    }
}

impl VariableSolver for CoverageVariableSolver {
    fn partition(&self) -> &ConstraintPartition {
        &self.partition
    }

    fn solve(&mut self, vars: &VariableContainer) -> bool {
        self.hit = false;
        let candidates: Vec<Constraint> = self
            .partition
            .constraints()
            .iter()
            .filter(|c| c.is_cover() && !self.covered.contains(c.name()))
            .cloned()
            .collect();
        for cover in candidates {
            match self.try_cover(&cover, vars) {
                Ok(true) => {
                    debug!("coverage solver: hit {}", cover.name());
                    self.covered.insert(cover.name().to_string());
                    write_back(self.solver.as_ref(), &self.variables, vars);
                    self.hit = true;
                    return true;
                }
                Ok(false) => {}
                Err(err) => warn!("coverage solver: {}", err),
            }
        }
        false
    }

    fn read(&self, var: u32) -> Option<u64> {
        if !self.hit {
            return None;
        }
        let expr = self.variables.get(&var)?;
        self.solver.read(expr)
    }
}

//! Vector solving.
//!
//! Vector constraints are written once against a symbolic vector. Before each solve the
//! vector gets a concrete size, every `foreach` body is instantiated once per index with
//! the placeholder replaced by that index, and `unique` expands to pairwise disequalities.

use std::collections::BTreeMap;

use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::backend::{Solver, SolverBuilder};
use crate::constraint::Constraint;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::eval::eval;
use crate::expr::{Expr, Node, Sort, INDEX_SORT};
use crate::variables::{VariableContainer, VectorEntry};

/// Why an instantiation of a foreach body was dropped.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Skip {
    NonConstantIndex,
    OutOfRange(i128),
}

/// Replace `placeholder` with `index` and resolve element accesses to element symbols.
fn instantiate(expr: &Expr, placeholder: u32, index: usize, elements: &[Expr]) -> Result<Expr, Skip> {
    match expr.node() {
        Node::Placeholder { id } if *id == placeholder => Ok(Expr::constant(index as u64, INDEX_SORT)),
        Node::VectorAccess { index: access, .. } => {
            let access = instantiate(access, placeholder, index, elements)?;
            let value = eval(&access, &|_| None).ok_or(Skip::NonConstantIndex)?.as_i128();
            usize::try_from(value)
                .ok()
                .and_then(|i| elements.get(i))
                .cloned()
                .ok_or(Skip::OutOfRange(value))
        }
        _ => expr.try_map_children(|child| instantiate(child, placeholder, index, elements)),
    }
}

/// Value of a scalar variable from the last variable solve.
pub type ReadVar<'a> = dyn Fn(u32) -> Option<u64> + 'a;

fn size_of(entry: &VectorEntry, read: &ReadVar<'_>, default: usize) -> usize {
    entry.size.id().and_then(read).map_or(default, |size| size as usize)
}

/// Solver for the constraints of one vector.
#[derive(Debug)]
pub struct VectorSolver {
    vector_id: u32,
    context: Context,
    constraints: Vec<Constraint>,
    elements: Vec<Expr>,
}

impl VectorSolver {
    pub fn new(vector_id: u32, context: &Context) -> Self {
        Self {
            vector_id,
            context: context.clone(),
            constraints: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub fn vector_id(&self) -> u32 {
        self.vector_id
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Ids of the element symbols created so far.
    pub fn element_ids(&self) -> Vec<u32> {
        self.elements.iter().filter_map(Expr::id).collect()
    }

    fn grow(&mut self, size: usize, elem: Sort) {
        while self.elements.len() < size {
            self.elements.push(Expr::variable(self.context.new_id(), elem));
        }
    }

    fn assert_all(&self, solver: &mut dyn Solver, size: usize) -> Result<()> {
        let elements = &self.elements[..size];
        for c in &self.constraints {
            let mut add = |e: &Expr| {
                if c.is_soft() {
                    solver.make_soft_assertion(e)
                } else {
                    solver.make_assertion(e)
                }
            };
            match c.expr().node() {
                Node::Unique { .. } => {
                    for i in 0..size {
                        for j in i + 1..size {
                            add(&elements[i].not_equal(&elements[j]))?;
                        }
                    }
                }
                Node::ForEach { placeholder, body, .. } => {
                    for i in 0..size {
                        match instantiate(body, *placeholder, i, elements) {
                            Ok(e) => add(&e)?,
                            Err(skip) => trace!("vector {}: {} skipped at index {}: {:?}", self.vector_id, c.name(), i, skip),
                        }
                    }
                }
                _ => warn!("vector {}: {} is not a vector constraint", self.vector_id, c.name()),
            }
        }
        Ok(())
    }

    /// Size the vector, solve its constraints and store the elements.
    pub fn solve(
        &mut self,
        builder: &mut SolverBuilder,
        read: &ReadVar<'_>,
        vars: &VariableContainer,
        rng: &mut dyn RngCore,
    ) -> Result<bool> {
        let Some(entry) = vars.vector(self.vector_id) else {
            warn!("vector {}: not declared in this context", self.vector_id);
            return Ok(false);
        };
        let size = size_of(entry, read, builder.config().default_vector_size);
        let max = builder.config().max_vector_size;
        if size > max {
            return Err(Error::VectorTooLarge {
                vector: self.vector_id,
                size,
                max,
            });
        }
        debug!("vector {}: solving with size {}", self.vector_id, size);

        self.grow(size, entry.elem);
        let mut solver = builder.create();
        self.assert_all(solver.as_mut(), size)?;
        if !(solver.solve(false) || solver.solve(true)) {
            return Ok(false);
        }

        let values = self.elements[..size]
            .iter()
            .map(|e| solver.read(e).unwrap_or_else(|| entry.elem.truncate(rng.next_u64())))
            .collect();
        entry.store(values);
        Ok(true)
    }
}

/// Solvers for every constrained vector, plus random contents for the rest.
#[derive(Debug)]
pub struct VectorGenerator {
    builder: SolverBuilder,
    context: Context,
    rng: StdRng,
    solvers: BTreeMap<u32, VectorSolver>,
}

impl VectorGenerator {
    pub fn new(mut builder: SolverBuilder, context: &Context) -> Self {
        let rng = StdRng::seed_from_u64(builder.next_seed());
        Self {
            builder,
            context: context.clone(),
            rng,
            solvers: BTreeMap::new(),
        }
    }

    /// Group vector constraints by the vector they constrain.
    pub fn reset(&mut self, constraints: &[Constraint]) {
        self.solvers.clear();
        for c in constraints {
            let Some(id) = c.vector_id() else {
                continue;
            };
            self.solvers
                .entry(id)
                .or_insert_with(|| VectorSolver::new(id, &self.context))
                .add_constraint(c.clone());
        }
    }

    pub fn solver(&self, vector_id: u32) -> Option<&VectorSolver> {
        self.solvers.get(&vector_id)
    }

    pub fn solvers(&self) -> impl Iterator<Item = &VectorSolver> + '_ {
        self.solvers.values()
    }

    /// Solve every constrained vector, stopping at the first failure, then fill the
    /// unconstrained vectors of `vars` with random elements.
    pub fn solve(&mut self, read: &ReadVar<'_>, vars: &VariableContainer) -> Result<bool> {
        for solver in self.solvers.values_mut() {
            if !solver.solve(&mut self.builder, read, vars, &mut self.rng)? {
                debug!("vector {}: unsatisfiable", solver.vector_id());
                return Ok(false);
            }
        }

        let default = self.builder.config().default_vector_size;
        for entry in vars.vectors().filter(|entry| !self.solvers.contains_key(&entry.id)) {
            let size = size_of(entry, read, default);
            let values = (0..size).map(|_| entry.elem.truncate(self.rng.next_u64())).collect();
            entry.store(values);
        }
        Ok(true)
    }
}

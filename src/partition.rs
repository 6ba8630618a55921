//! Splitting the constraint pool into variable-disjoint partitions.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, warn};

use crate::constraint::{Constraint, ConstraintRegistry};

/// A group of constraints sharing no variable with any other group.
#[derive(Debug, Clone, Default)]
pub struct ConstraintPartition {
    constraints: Vec<Constraint>,
    support: BTreeSet<u32>,
    single_var: BTreeMap<u32, Vec<Constraint>>,
}

impl ConstraintPartition {
    fn add(&mut self, constraint: Constraint) {
        self.support.extend(constraint.support().iter().copied());
        self.constraints.push(constraint);
    }

    fn finish(&mut self) {
        self.constraints.sort_by(|a, b| b.id().cmp(&a.id()));
        for c in &self.constraints {
            if c.is_hard() && c.support().len() == 1 {
                if let Some(&var) = c.support().first() {
                    self.single_var.entry(var).or_default().push(c.clone());
                }
            }
        }
    }

    /// Constraints, newest first.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn support(&self) -> &BTreeSet<u32> {
        &self.support
    }

    pub fn contains_var(&self, var: u32) -> bool {
        self.support.contains(&var)
    }

    /// Hard constraints whose only variable is `var`.
    pub fn single_var_constraints(&self, var: u32) -> &[Constraint] {
        self.single_var.get(&var).map_or(&[], Vec::as_slice)
    }

    pub fn single_var_index(&self) -> &BTreeMap<u32, Vec<Constraint>> {
        &self.single_var
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.constraints.iter().map(Constraint::name).collect()
    }
}

#[derive(Debug, Default)]
pub struct ConstraintPartitioner {
    pool: VecDeque<Constraint>,
    vector_constraints: Vec<Constraint>,
    partitions: Vec<ConstraintPartition>,
    merged: BTreeSet<u32>,
}

impl ConstraintPartitioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.pool.clear();
        self.vector_constraints.clear();
        self.partitions.clear();
        self.merged.clear();
    }

    /// Add the enabled constraints of `registry` to the pool.
    pub fn merge(&mut self, registry: &ConstraintRegistry) {
        if !self.merged.insert(registry.id()) {
            warn!("partitioner: registry {} is already merged", registry.id());
            return;
        }
        for c in registry.constraints().iter().filter(|c| c.is_enabled()) {
            if c.is_vector() {
                self.vector_constraints.push(c.clone());
            } else {
                self.pool.push_back(c.clone());
            }
        }
    }

    /// Group the pooled constraints into partitions.
    ///
    /// Each partition grows from the oldest remaining constraint until no remaining
    /// constraint shares a variable with it.
    pub fn partition(&mut self) {
        while let Some(seed) = self.pool.pop_front() {
            let mut partition = ConstraintPartition::default();
            partition.add(seed);
            loop {
                let (joining, rest): (VecDeque<Constraint>, VecDeque<Constraint>) = self
                    .pool
                    .drain(..)
                    .partition(|c| !c.support().is_disjoint(&partition.support));
                self.pool = rest;
                if joining.is_empty() {
                    break;
                }
                for c in joining {
                    partition.add(c);
                }
            }
            partition.finish();
            debug!("partitioner: partition {} = {:?}", self.partitions.len(), partition.names());
            self.partitions.push(partition);
        }
    }

    pub fn partitions(&self) -> &[ConstraintPartition] {
        &self.partitions
    }

    pub fn vector_constraints(&self) -> &[Constraint] {
        &self.vector_constraints
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty() && self.vector_constraints.is_empty() && self.pool.is_empty()
    }
}

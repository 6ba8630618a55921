//! Named constraints and their per-object registry.

use std::collections::{BTreeSet, HashMap};

use log::{debug, trace};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::{Expr, Node};

#[derive(Debug, Clone)]
pub struct Constraint {
    id: u32,
    name: String,
    expr: Expr,
    support: BTreeSet<u32>,
    soft: bool,
    cover: bool,
    enabled: bool,
}

impl Constraint {
    pub fn id(&self) -> u32 {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
    pub fn support(&self) -> &BTreeSet<u32> {
        &self.support
    }
    pub fn is_soft(&self) -> bool {
        self.soft
    }
    pub fn is_cover(&self) -> bool {
        self.cover
    }
    pub fn is_hard(&self) -> bool {
        !self.soft && !self.cover
    }
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether this is a `foreach` or `unique` constraint over a vector.
    pub fn is_vector(&self) -> bool {
        self.expr.is_vector_constraint()
    }

    pub fn is_unique(&self) -> bool {
        matches!(self.expr.node(), Node::Unique { .. })
    }

    /// The constrained vector, for vector constraints.
    pub fn vector_id(&self) -> Option<u32> {
        if self.is_vector() {
            self.support.first().copied()
        } else {
            None
        }
    }
}

fn contains_vector_nodes(expr: &Expr) -> bool {
    let mut found = false;
    expr.visit(&mut |e| {
        found |= matches!(
            e.node(),
            Node::Vector { .. } | Node::VectorAccess { .. } | Node::Placeholder { .. } | Node::ForEach { .. } | Node::Unique { .. }
        );
    });
    found
}

/// Constraints declared by one randomizable object.
///
/// Names are unique within a registry. Any change to the set of active constraints marks
/// the registry as changed until [`reset_changed`][ConstraintRegistry::reset_changed].
#[derive(Debug)]
pub struct ConstraintRegistry {
    id: u32,
    context: Context,
    constraints: Vec<Constraint>,
    index: HashMap<String, usize>,
    changed: bool,
}

impl ConstraintRegistry {
    pub fn new(context: &Context) -> Self {
        Self {
            id: context.new_constraint_id(),
            context: context.clone(),
            constraints: Vec::new(),
            index: HashMap::new(),
            changed: false,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// All constraints, in declaration order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn constraint(&self, name: &str) -> Option<&Constraint> {
        self.index.get(name).map(|&i| &self.constraints[i])
    }

    pub fn make_constraint(&mut self, name: Option<&str>, expr: Expr, soft: bool, cover: bool) -> Result<&Constraint> {
        if let Some(name) = name {
            if self.index.contains_key(name) {
                return Err(Error::DuplicateConstraintName(name.to_string()));
            }
        }
        let label = name.unwrap_or("<unnamed>");
        let invalid = |reason| Error::InvalidConstraint { name: label.to_string(), reason };

        if soft && cover {
            return Err(invalid("a constraint cannot be both soft and cover"));
        }
        let support = expr.support();
        if expr.is_vector_constraint() {
            if cover {
                return Err(invalid("vector constraints cannot be cover constraints"));
            }
            if support.len() != 1 {
                return Err(invalid("a vector constraint must refer to exactly one vector"));
            }
        } else if contains_vector_nodes(&expr) {
            return Err(invalid("vector elements can only be constrained inside foreach"));
        }

        // Ids are only taken by accepted constraints.
        let id = self.context.new_constraint_id();
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("constraint_{}", id),
        };
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateConstraintName(name));
        }

        trace!("registry {}: new constraint {} = {}", self.id, name, expr);
        let constraint = Constraint {
            id,
            name: name.clone(),
            expr,
            support,
            soft,
            cover,
            enabled: true,
        };
        self.index.insert(name, self.constraints.len());
        self.constraints.push(constraint);
        self.changed = true;
        Ok(&self.constraints[self.constraints.len() - 1])
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        let Some(&i) = self.index.get(name) else {
            return false;
        };
        let constraint = &mut self.constraints[i];
        if constraint.enabled != enabled {
            debug!("registry {}: {} {}", self.id, if enabled { "enable" } else { "disable" }, name);
            constraint.enabled = enabled;
            self.changed = true;
        }
        true
    }

    /// Returns `false` if no constraint has this name.
    pub fn enable(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    /// Returns `false` if no constraint has this name.
    pub fn disable(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.constraint(name).is_some_and(|c| c.enabled)
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn reset_changed(&mut self) {
        self.changed = false;
    }
}

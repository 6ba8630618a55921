//! Constraint partitions to DOT (Graphviz) conversion.
//!
//! The generated graph has one cluster per partition and one extra cluster for the
//! vector constraints:
//! - **Constraint nodes** are boxes labeled with the constraint name, styled by kind
//!   (solid for hard, dashed for soft, bold for cover, grey when disabled)
//! - **Expression nodes** hang below their constraint, one node per operator or leaf
//!
//! # Examples
//!
//! ```
//! use crave_rs::context::Context;
//! use crave_rs::generator::Generator;
//!
//! let ctx = Context::new();
//! let x = ctx.var::<u8>();
//! let mut gen = Generator::new(&ctx);
//! gen.add_named("small", x.lt(10)).unwrap();
//! gen.next().unwrap();
//!
//! let dot = gen.to_dot().unwrap();
//! // Write to file and render with: dot -Tpng output.dot -o output.png
//! assert!(dot.contains("small"));
//! ```

use std::fmt::Write as _;

use crate::constraint::Constraint;
use crate::expr::Expr;
use crate::partition::ConstraintPartition;

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for constraint nodes (default: "box")
    pub constraint_shape: &'static str,
    /// Shape for expression nodes (default: "ellipse")
    pub node_shape: &'static str,
    /// Style for hard constraints (default: "solid")
    pub hard_style: &'static str,
    /// Style for soft constraints (default: "dashed")
    pub soft_style: &'static str,
    /// Style for cover constraints (default: "bold")
    pub cover_style: &'static str,
    /// Whether to draw the expression tree of each constraint (default: true)
    pub show_expressions: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            constraint_shape: "box",
            node_shape: "ellipse",
            hard_style: "solid",
            soft_style: "dashed",
            cover_style: "bold",
            show_expressions: true,
        }
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

struct Writer<'a> {
    dot: String,
    config: &'a DotConfig,
    next_node: usize,
}

impl<'a> Writer<'a> {
    fn fresh(&mut self) -> usize {
        self.next_node += 1;
        self.next_node
    }

    fn expr(&mut self, expr: &Expr) -> Result<usize, std::fmt::Error> {
        let id = self.fresh();
        writeln!(
            self.dot,
            "n{} [shape={}, label=\"{}\"];",
            id,
            self.config.node_shape,
            escape(&expr.label())
        )?;
        for child in expr.children() {
            let child_id = self.expr(child)?;
            writeln!(self.dot, "n{} -> n{};", id, child_id)?;
        }
        Ok(id)
    }

    fn constraint(&mut self, constraint: &Constraint) -> Result<(), std::fmt::Error> {
        let id = self.fresh();
        let style = if constraint.is_soft() {
            self.config.soft_style
        } else if constraint.is_cover() {
            self.config.cover_style
        } else {
            self.config.hard_style
        };
        let color = if constraint.is_enabled() { "black" } else { "grey" };
        writeln!(
            self.dot,
            "n{} [shape={}, style={}, color={}, label=\"{}\"];",
            id,
            self.config.constraint_shape,
            style,
            color,
            escape(constraint.name())
        )?;
        if self.config.show_expressions {
            let root = self.expr(constraint.expr())?;
            writeln!(self.dot, "n{} -> n{};", id, root)?;
        }
        Ok(())
    }

    fn cluster(&mut self, name: &str, label: &str, constraints: &[Constraint]) -> Result<(), std::fmt::Error> {
        writeln!(self.dot, "subgraph cluster_{} {{", name)?;
        writeln!(self.dot, "label=\"{}\";", escape(label))?;
        for c in constraints {
            self.constraint(c)?;
        }
        writeln!(self.dot, "}}")
    }
}

/// Converts partitions and vector constraints to DOT format.
pub fn partitions_to_dot(
    partitions: &[ConstraintPartition],
    vector_constraints: &[Constraint],
) -> Result<String, std::fmt::Error> {
    partitions_to_dot_with_config(partitions, vector_constraints, &DotConfig::default())
}

/// Converts partitions and vector constraints to DOT format with custom configuration.
pub fn partitions_to_dot_with_config(
    partitions: &[ConstraintPartition],
    vector_constraints: &[Constraint],
    config: &DotConfig,
) -> Result<String, std::fmt::Error> {
    let mut writer = Writer {
        dot: String::new(),
        config,
        next_node: 0,
    };
    writeln!(writer.dot, "digraph {{")?;

    for (i, partition) in partitions.iter().enumerate() {
        let support: Vec<String> = partition.support().iter().map(|v| format!("v{}", v)).collect();
        let label = format!("partition {} {{{}}}", i, support.join(", "));
        writer.cluster(&format!("p{}", i), &label, partition.constraints())?;
    }
    if !vector_constraints.is_empty() {
        writer.cluster("vectors", "vector constraints", vector_constraints)?;
    }

    writeln!(writer.dot, "}}")?;
    Ok(writer.dot)
}

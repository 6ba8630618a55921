//! # crave-rs: constrained-random stimulus generation
//!
//! **`crave-rs`** produces random values for variables that must satisfy a set of
//! constraints, the way a verification testbench randomizes transactions.
//!
//! ## How it works
//!
//! Constraints are collected in a [`ConstraintRegistry`][crate::constraint::ConstraintRegistry]
//! and split into **partitions** that share no variable. Each partition is bit-blasted into a
//! [`Bdd`][crate::bdd::Bdd] and solved on its own, so a solution is drawn uniformly from
//! the models of every partition independently. Vector constraints (`foreach`, `unique`)
//! are solved afterwards, once the vector sizes are known.
//!
//! ## Key Features
//!
//! - **Soft constraints**: dropped when they conflict with the hard ones, keeping a maximal
//!   consistent subset.
//! - **Cover constraints**: [`next_cov`][crate::generator::Generator::next_cov] hits each one
//!   once before falling back to plain solving.
//! - **Contradiction analysis**: all minimal groups of conflicting hard constraints, by name.
//! - **Distributions**: weighted ranges and values suggested on every solve.
//! - **Object trees**: [`RandObject`][crate::object::RandObject] composes the constraints of
//!   nested objects into a single generator.
//!
//! ## Basic Usage
//!
//! ```rust
//! use crave_rs::context::Context;
//! use crave_rs::generator::Generator;
//!
//! let ctx = Context::new();
//! let x = ctx.var::<u8>();
//! let y = ctx.var::<u8>();
//!
//! let mut gen = Generator::new(&ctx);
//! gen.add(x.lt(&y)).unwrap();
//! gen.add(y.le(100)).unwrap();
//! gen.add((&x + &y).equal(100)).unwrap();
//!
//! assert!(gen.next().unwrap());
//! assert!(x.get() < y.get());
//! assert_eq!(x.get() as u32 + y.get() as u32, 100);
//! ```
//!
//! ## Core Components
//!
//! - **[`generator`]**: The top-level [`Generator`][crate::generator::Generator].
//! - **[`expr`]**: Constraint expressions and their sorts.
//! - **[`backend`]**: The solver interface and its BDD implementation.
//! - **[`bdd`]**: The BDD manager the backend is built on.

pub mod backend;
pub mod bdd;
pub mod blast;
pub mod cache;
pub mod config;
pub mod constraint;
pub mod context;
pub mod distribution;
pub mod dot;
pub mod error;
pub mod eval;
pub mod expr;
pub mod generator;
pub mod mus;
pub mod object;
pub mod partition;
pub mod reference;
pub mod sat;
pub mod table;
pub mod utils;
pub mod variable_generator;
pub mod variable_solver;
pub mod variables;
pub mod vector;

//! Randomizable objects arranged in a tree.
//!
//! Every [`RandObject`] declares its own variables and constraints. Solving the root
//! solves the constraints of the whole tree at once, so a child may constrain its
//! parent's variables and vice versa.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::GeneratorConfig;
use crate::constraint::ConstraintRegistry;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::generator::Generator;
use crate::variables::{RandType, RandVec, Randomize, Var};

pub struct RandObject {
    name: String,
    context: Context,
    config: GeneratorConfig,
    registry: ConstraintRegistry,
    children: Vec<RandObject>,
    members: Vec<Box<dyn Randomize>>,
    generator: Option<Generator>,
    rng: StdRng,
    rebuild: bool,
}

impl RandObject {
    pub fn new(name: &str) -> Self {
        Self::with_config(name, GeneratorConfig::default())
    }

    pub fn with_config(name: &str, config: GeneratorConfig) -> Self {
        Self::in_context(name, &Context::new(), config)
    }

    fn in_context(name: &str, context: &Context, config: GeneratorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            name: name.to_string(),
            context: context.clone(),
            registry: ConstraintRegistry::new(context),
            children: Vec::new(),
            members: Vec::new(),
            generator: None,
            rng,
            rebuild: true,
            config,
        }
    }

    /// A new object sharing this object's context, ready for [`add_child`][RandObject::add_child].
    pub fn child(&self, name: &str) -> RandObject {
        let mut config = self.config.clone();
        config.seed = config.seed.map(|seed| seed.wrapping_add(u64::from(self.context.new_id())));
        Self::in_context(name, &self.context, config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn registry(&self) -> &ConstraintRegistry {
        &self.registry
    }

    pub fn children(&self) -> &[RandObject] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [RandObject] {
        &mut self.children
    }

    /// The generator built by the last rebuild, if any.
    pub fn generator(&self) -> Option<&Generator> {
        self.generator.as_ref()
    }

    /// Attach `child`. The next [`next`][RandObject::next] rebuilds the generator.
    pub fn add_child(&mut self, child: RandObject) -> &mut RandObject {
        assert!(
            self.context.ptr_eq(&child.context),
            "child {} must be created with RandObject::child",
            child.name
        );
        self.rebuild = true;
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Declare a random member variable.
    pub fn var<T: RandType>(&mut self) -> Var<T> {
        let var = self.context.var::<T>();
        self.members.push(Box::new(var.clone()));
        var
    }

    /// Declare a random member vector.
    pub fn vector<T: RandType>(&mut self) -> RandVec<T> {
        let vector = self.context.vector::<T>();
        self.members.push(Box::new(vector.size().clone()));
        vector
    }

    fn constraint(&mut self, name: Option<&str>, expr: Expr, soft: bool, cover: bool) -> Result<&mut Self> {
        self.registry.make_constraint(name, expr, soft, cover)?;
        Ok(self)
    }

    pub fn add(&mut self, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(None, expr.into(), false, false)
    }

    pub fn add_named(&mut self, name: &str, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(Some(name), expr.into(), false, false)
    }

    pub fn soft(&mut self, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(None, expr.into(), true, false)
    }

    pub fn soft_named(&mut self, name: &str, expr: impl Into<Expr>) -> Result<&mut Self> {
        self.constraint(Some(name), expr.into(), true, false)
    }

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

    fn is_dirty(&self) -> bool {
        self.rebuild || self.registry.is_changed() || self.children.iter().any(RandObject::is_dirty)
    }

    fn merge_into(&self, generator: &mut Generator) {
        for child in &self.children {
            child.merge_into(generator);
        }
        generator.merge(&self.registry);
    }

    fn mark_clean(&mut self) {
        for child in &mut self.children {
            child.mark_clean();
        }
        self.registry.reset_changed();
        self.rebuild = false;
    }

    /// Assign fresh uniform values to every member in the subtree.
    pub fn pre_randomize(&mut self) {
        for member in &self.members {
            member.randomize(&mut self.rng);
        }
        for child in &mut self.children {
            child.pre_randomize();
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        let mut generator = Generator::with_config(&self.context, self.config.clone());
        self.merge_into(&mut generator);
        self.mark_clean();
        generator.rebuild(false)?;
        debug!("object {}: rebuilt with {} partitions", self.name, generator.partitions().len());
        self.generator = Some(generator);
        Ok(())
    }

    fn prepare(&mut self) -> Result<Option<&mut Generator>> {
        if self.generator.is_none() || self.is_dirty() {
            self.rebuild()?;
        }
        self.pre_randomize();
        Ok(self.generator.as_mut())
    }

    /// Randomize the whole tree. Returns `false` when its constraints are unsatisfiable.
    pub fn next(&mut self) -> Result<bool> {
        match self.prepare()? {
            Some(generator) => generator.next(),
            None => Ok(false),
        }
    }

    /// Randomize the whole tree, hitting a cover constraint of the tree not hit before.
    ///
    /// Once every cover constraint has been hit this behaves like [`next`][RandObject::next].
    /// A rebuild starts coverage over.
    pub fn next_cov(&mut self) -> Result<bool> {
        match self.prepare()? {
            Some(generator) => generator.next_cov(),
            None => Ok(false),
        }
    }

    pub fn is_covered(&self) -> bool {
        self.generator.as_ref().is_some_and(Generator::is_covered)
    }

    pub fn reset_coverage(&mut self) -> Result<()> {
        match self.generator.as_mut() {
            Some(generator) => generator.reset_coverage(),
            None => Ok(()),
        }
    }

    /// Randomize the whole tree once with `exprs` as additional hard constraints.
    ///
    /// The extra constraints are solved by a temporary generator; the tree's own
    /// generator and later calls to [`next`][RandObject::next] do not see them.
    pub fn next_with(&mut self, exprs: &[Expr]) -> Result<bool> {
        let mut inline = ConstraintRegistry::new(&self.context);
        for expr in exprs {
            inline.make_constraint(None, expr.clone(), false, false)?;
        }

        let mut config = self.config.clone();
        config.seed = config.seed.map(|_| self.rng.gen());
        let mut generator = Generator::with_config(&self.context, config);
        self.merge_into(&mut generator);
        generator.merge(&inline);
        generator.rebuild(false)?;
        debug!(
            "object {}: {} inline constraints, {} partitions",
            self.name,
            inline.len(),
            generator.partitions().len()
        );
        self.pre_randomize();
        generator.next()
    }

    pub fn try_next(&mut self) -> Result<()> {
        if self.next()? {
            Ok(())
        } else {
            Err(Error::Unsatisfiable)
        }
    }
}

use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::trace;
use rand::RngCore;

use crate::distribution::Distribution;
use crate::expr::Expr;
use crate::variables::{RandType, RandVec, Sampler, Var, VariableContainer};

struct ContextInner {
    next_id: AtomicU32,
    next_constraint_id: AtomicU32,
    variables: RwLock<VariableContainer>,
}

/// Shared state of one generator or object tree: id counters and the variable table.
///
/// Cloning a context is cheap and yields a handle to the same state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                next_id: AtomicU32::new(1),
                next_constraint_id: AtomicU32::new(1),
                variables: RwLock::new(VariableContainer::new()),
            }),
        }
    }

    /// Whether both handles point to the same state.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Fresh id for a variable, vector or placeholder.
    pub fn new_id(&self) -> u32 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Fresh id for a constraint or registry.
    pub fn new_constraint_id(&self) -> u32 {
        self.inner.next_constraint_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn variables(&self) -> RwLockReadGuard<'_, VariableContainer> {
        self.inner.variables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn variables_mut(&self) -> RwLockWriteGuard<'_, VariableContainer> {
        self.inner.variables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a random variable; solutions are written back into it.
    pub fn var<T: RandType>(&self) -> Var<T> {
        let var = Var::new(self.new_id(), T::from_bits(0));
        trace!("context: new variable {}", var.expr());
        self.variables_mut().add_write_ref(&var);
        var
    }

    /// Declare a reference: its current value is assumed on every solve.
    pub fn reference<T: RandType>(&self, value: T) -> Var<T> {
        let var = Var::new(self.new_id(), value);
        trace!("context: new reference {}", var.expr());
        self.variables_mut().add_read_ref(&var);
        var
    }

    /// Declare a random vector with its own random size variable.
    pub fn vector<T: RandType>(&self) -> RandVec<T> {
        let id = self.new_id();
        let size = self.var::<u32>();
        let vector = RandVec::new(id, size);
        trace!("context: new vector {}", vector.expr());
        self.variables_mut().add_vector(vector.entry());
        vector
    }

    /// Suggest values drawn from `dist` for `var` on every solve.
    pub fn dist<T: RandType>(&self, var: &Var<T>, dist: Distribution<T>) {
        let sampler: Sampler = Arc::new(move |rng: &mut dyn RngCore| dist.next_value(rng).to_bits());
        self.variables_mut().add_dist_ref(var.id(), sampler);
    }

    pub fn placeholder(&self) -> Expr {
        Expr::placeholder(self.new_id())
    }

    /// Constraint applying `body` to every index of `vector`.
    ///
    /// The closure receives the index placeholder; use [`RandVec::at`] with it.
    pub fn foreach<T: RandType>(&self, vector: &RandVec<T>, body: impl FnOnce(&Expr) -> Expr) -> Expr {
        let index = self.placeholder();
        let body = body(&index);
        let id = index.id().unwrap_or_default();
        Expr::foreach(vector.expr(), id, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Node;
    use test_log::test;

    #[test]
    fn test_ids_are_unique() {
        let ctx = Context::new();
        let x = ctx.var::<u8>();
        let v = ctx.vector::<u8>();
        let p = ctx.placeholder();
        let ids = [x.id(), v.id(), v.size().id(), p.id().unwrap()];
        let unique: std::collections::BTreeSet<u32> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ctx.new_constraint_id(), 1);
        assert_eq!(ctx.new_constraint_id(), 2);
    }

    #[test]
    fn test_references_are_registered() {
        let ctx = Context::new();
        let x = ctx.var::<u8>();
        let r = ctx.reference::<u8>(7);
        let vars = ctx.variables();
        assert!(vars.is_write_ref(x.id()));
        assert!(!vars.is_write_ref(r.id()));
        assert_eq!(vars.read_refs().collect::<Vec<_>>(), vec![(r.id(), 7)]);
        assert!(vars.variable(x.id()).is_some());
    }

    #[test]
    fn test_vector_registration() {
        let ctx = Context::new();
        let v = ctx.vector::<i32>();
        let vars = ctx.variables();
        let entry = vars.vector(v.id()).unwrap();
        assert_eq!(entry.size.id(), Some(v.size().id()));
        assert!(vars.is_write_ref(v.size().id()));
    }

    #[test]
    fn test_foreach_binds_placeholder() {
        let ctx = Context::new();
        let v = ctx.vector::<u8>();
        let c = ctx.foreach(&v, |i| v.at(i).lt(10));
        let Node::ForEach { placeholder, body, .. } = c.node() else {
            panic!("expected foreach");
        };
        let mut seen = false;
        body.visit(&mut |e| {
            if let Node::Placeholder { id } = e.node() {
                assert_eq!(id, placeholder);
                seen = true;
            }
        });
        assert!(seen);
        assert_eq!(c.support().into_iter().collect::<Vec<_>>(), vec![v.id()]);
    }

    #[test]
    fn test_dist_registration() {
        let ctx = Context::new();
        let x = ctx.var::<u8>();
        ctx.dist(&x, Distribution::new().value(3).unwrap());
        assert!(ctx.variables().has_dist_ref(x.id()));
    }
}

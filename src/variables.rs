//! Random variables, vectors and the table of references solvers read and write.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::ops::{Add, BitAnd, BitOr, BitXor, Deref, Div, Mul, Rem, Shl, Shr, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::RngCore;

use crate::expr::{Expr, Sort};

/// Scalar types a random variable can hold.
///
/// Values cross the solver boundary as raw bits, zero-extended from the type's width.
pub trait RandType: Copy + Send + Sync + Debug + PartialEq + 'static {
    const SORT: Sort;

    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
    fn to_i128(self) -> i128;
    fn from_i128(value: i128) -> Self;
}

impl RandType for bool {
    const SORT: Sort = Sort::Bool;

    fn to_bits(self) -> u64 {
        self as u64
    }
    fn from_bits(bits: u64) -> Self {
        bits & 1 == 1
    }
    fn to_i128(self) -> i128 {
        self as i128
    }
    fn from_i128(value: i128) -> Self {
        value != 0
    }
}

macro_rules! impl_rand_type {
    ($($t:ty => $bits:ty, $signed:expr;)*) => {
        $(
            impl RandType for $t {
                const SORT: Sort = Sort::BitVec {
                    width: <$t>::BITS,
                    signed: $signed,
                };

                fn to_bits(self) -> u64 {
                    self as $bits as u64
                }
                fn from_bits(bits: u64) -> Self {
                    bits as $bits as $t
                }
                fn to_i128(self) -> i128 {
                    self as i128
                }
                fn from_i128(value: i128) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_rand_type! {
    u8 => u8, false;
    u16 => u16, false;
    u32 => u32, false;
    u64 => u64, false;
    i8 => u8, true;
    i16 => u16, true;
    i32 => u32, true;
    i64 => u64, true;
}

/// Handle to a scalar random variable.
///
/// Dereferences to its [`Expr`], so constraint builders can be called on it directly.
pub struct Var<T: RandType> {
    expr: Expr,
    cell: Arc<AtomicU64>,
    _marker: PhantomData<T>,
}

impl<T: RandType> Clone for Var<T> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            cell: Arc::clone(&self.cell),
            _marker: PhantomData,
        }
    }
}

impl<T: RandType> Var<T> {
    pub(crate) fn new(id: u32, value: T) -> Self {
        Self {
            expr: Expr::variable(id, T::SORT),
            cell: Arc::new(AtomicU64::new(value.to_bits())),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> u32 {
        self.expr.id().unwrap_or_default()
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Current value: the last solution for random variables, the user value for references.
    pub fn get(&self) -> T {
        T::from_bits(self.cell.load(Ordering::Acquire))
    }

    pub fn set(&self, value: T) {
        self.cell.store(value.to_bits(), Ordering::Release);
    }

    pub(crate) fn cell(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.cell)
    }
}

impl<T: RandType> Debug for Var<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={:?}", self.expr, self.get())
    }
}

impl<T: RandType> Deref for Var<T> {
    type Target = Expr;

    fn deref(&self) -> &Expr {
        &self.expr
    }
}

impl<T: RandType> From<&Var<T>> for Expr {
    fn from(var: &Var<T>) -> Self {
        var.expr.clone()
    }
}

macro_rules! impl_var_ops {
    ($($trait:ident, $method:ident;)*) => {
        $(
            impl<T: RandType, R: Into<Expr>> $trait<R> for &Var<T> {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    $trait::$method(&self.expr, rhs)
                }
            }
        )*
    };
}

impl_var_ops! {
    Add, add;
    Sub, sub;
    Mul, mul;
    Div, div;
    Rem, rem;
    Shl, shl;
    Shr, shr;
    BitAnd, bitand;
    BitOr, bitor;
    BitXor, bitxor;
}

/// Handle to a random vector. Its length is the scalar variable [`size`][RandVec::size].
pub struct RandVec<T: RandType> {
    expr: Expr,
    size: Var<u32>,
    storage: Arc<Mutex<Vec<u64>>>,
    _marker: PhantomData<T>,
}

impl<T: RandType> Clone for RandVec<T> {
    fn clone(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            size: self.size.clone(),
            storage: Arc::clone(&self.storage),
            _marker: PhantomData,
        }
    }
}

impl<T: RandType> RandVec<T> {
    pub(crate) fn new(id: u32, size: Var<u32>) -> Self {
        Self {
            expr: Expr::vector(id, T::SORT),
            size,
            storage: Arc::new(Mutex::new(Vec::new())),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> u32 {
        self.expr.id().unwrap_or_default()
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn size(&self) -> &Var<u32> {
        &self.size
    }

    /// Element access, for use inside a foreach body.
    pub fn at(&self, index: impl Into<Expr>) -> Expr {
        self.expr.at(index)
    }

    /// Constraint requiring pairwise distinct elements.
    pub fn unique(&self) -> Expr {
        Expr::unique(&self.expr)
    }

    fn elements(&self) -> std::sync::MutexGuard<'_, Vec<u64>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.elements().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.elements().get(index).map(|&bits| T::from_bits(bits))
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.elements().iter().map(|&bits| T::from_bits(bits)).collect()
    }

    pub(crate) fn entry(&self) -> VectorEntry {
        VectorEntry {
            id: self.id(),
            elem: T::SORT,
            size: self.size.expr().clone(),
            size_cell: self.size.cell(),
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<T: RandType> Debug for RandVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={:?}", self.expr, self.to_vec())
    }
}

/// Draws a raw value for a distribution reference.
pub type Sampler = Arc<dyn Fn(&mut dyn RngCore) -> u64 + Send + Sync>;

/// Solver-side view of a declared vector.
#[derive(Clone)]
pub struct VectorEntry {
    pub id: u32,
    pub elem: Sort,
    pub size: Expr,
    size_cell: Arc<AtomicU64>,
    storage: Arc<Mutex<Vec<u64>>>,
}

impl VectorEntry {
    /// Replace the contents and record the new length in the size variable.
    pub fn store(&self, values: Vec<u64>) {
        self.size_cell.store(values.len() as u64, Ordering::Release);
        *self.storage.lock().unwrap_or_else(PoisonError::into_inner) = values;
    }
}

impl Debug for VectorEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorEntry")
            .field("id", &self.id)
            .field("elem", &self.elem)
            .field("size", &self.size)
            .finish()
    }
}

/// Declared symbols plus the references connecting them to user-visible values.
///
/// - write references receive solver results,
/// - read references are assumed equal to their current value on every solve,
/// - distribution references are suggested a fresh sample on every solve.
#[derive(Default)]
pub struct VariableContainer {
    variables: BTreeMap<u32, Expr>,
    write_refs: BTreeMap<u32, Arc<AtomicU64>>,
    read_refs: BTreeMap<u32, Arc<AtomicU64>>,
    dist_refs: BTreeMap<u32, Sampler>,
    vectors: BTreeMap<u32, VectorEntry>,
}

impl VariableContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_write_ref<T: RandType>(&mut self, var: &Var<T>) {
        self.variables.insert(var.id(), var.expr().clone());
        self.write_refs.insert(var.id(), var.cell());
    }

    pub(crate) fn add_read_ref<T: RandType>(&mut self, var: &Var<T>) {
        self.variables.insert(var.id(), var.expr().clone());
        self.read_refs.insert(var.id(), var.cell());
    }

    pub(crate) fn add_dist_ref(&mut self, id: u32, sampler: Sampler) {
        self.dist_refs.insert(id, sampler);
    }

    pub(crate) fn add_vector(&mut self, entry: VectorEntry) {
        self.vectors.insert(entry.id, entry);
    }

    pub fn variable(&self, id: u32) -> Option<&Expr> {
        self.variables.get(&id)
    }

    pub fn is_write_ref(&self, id: u32) -> bool {
        self.write_refs.contains_key(&id)
    }

    pub fn has_dist_ref(&self, id: u32) -> bool {
        self.dist_refs.contains_key(&id)
    }

    /// Store a solver result into a write reference. Returns whether `id` is one.
    pub fn write(&self, id: u32, bits: u64) -> bool {
        match self.write_refs.get(&id) {
            Some(cell) => {
                cell.store(bits, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Current values of the read references, by id.
    pub fn read_refs(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.read_refs.iter().map(|(&id, cell)| (id, cell.load(Ordering::Acquire)))
    }

    pub fn dist_refs(&self) -> impl Iterator<Item = (u32, &Sampler)> + '_ {
        self.dist_refs.iter().map(|(&id, sampler)| (id, sampler))
    }

    pub fn vector(&self, id: u32) -> Option<&VectorEntry> {
        self.vectors.get(&id)
    }

    pub fn vectors(&self) -> impl Iterator<Item = &VectorEntry> + '_ {
        self.vectors.values()
    }
}

/// Something whose random members can be set to fresh uniform values.
pub trait Randomize: Send + Sync {
    fn randomize(&self, rng: &mut dyn RngCore);
}

impl<T: RandType> Randomize for Var<T> {
    fn randomize(&self, rng: &mut dyn RngCore) {
        self.cell.store(T::SORT.truncate(rng.next_u64()), Ordering::Release);
    }
}

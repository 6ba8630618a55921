use std::marker::PhantomData;

use rand::Rng;

use crate::error::{Error, Result};
use crate::variables::RandType;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct WeightedRange {
    lo: i128,
    hi: i128,
    weight: u128,
}

/// Value distribution for a random variable.
///
/// A distribution is a set of disjoint ranges, each with a weight. By default a range
/// weighs as much as it has values, so plain ranges are sampled uniformly over their union.
/// A distribution without ranges is uniform over the whole type.
#[derive(Debug, Clone)]
pub struct Distribution<T: RandType> {
    ranges: Vec<WeightedRange>,
    total: u128,
    probability: Option<f64>,
    _marker: PhantomData<T>,
}

impl<T: RandType> Default for Distribution<T> {
    fn default() -> Self {
        Self {
            ranges: Vec::new(),
            total: 0,
            probability: None,
            _marker: PhantomData,
        }
    }
}

impl<T: RandType> Distribution<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty() && self.probability.is_none()
    }

    /// Add the inclusive range `lo..=hi`, weighted by its size.
    pub fn range(self, lo: T, hi: T) -> Result<Self> {
        let weight = (hi.to_i128() - lo.to_i128() + 1).max(0) as u128;
        self.weighted_range(lo, hi, weight)
    }

    pub fn weighted_range(mut self, lo: T, hi: T, weight: u128) -> Result<Self> {
        let (lo, hi) = (lo.to_i128(), hi.to_i128());
        if lo > hi {
            return Err(Error::InvalidRange(lo, hi));
        }
        if self.ranges.iter().any(|r| r.lo <= hi && lo <= r.hi) {
            return Err(Error::OverlappingRange);
        }
        if weight == 0 {
            return Err(Error::InvalidWeight(weight));
        }
        self.total = self.total.checked_add(weight).ok_or(Error::WeightOverflow)?;
        self.ranges.push(WeightedRange { lo, hi, weight });
        Ok(self)
    }

    pub fn value(self, value: T) -> Result<Self> {
        self.weighted_range(value, value, 1)
    }

    pub fn weighted_value(self, value: T, weight: u128) -> Result<Self> {
        self.weighted_range(value, value, weight)
    }

    pub fn next_value<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        if let Some(p) = self.probability {
            return T::from_i128(rng.gen_bool(p) as i128);
        }

        if self.ranges.is_empty() {
            return T::from_bits(rng.next_u64());
        }

        let mut pick = rng.gen_range(0..self.total);
        for r in &self.ranges {
            if pick < r.weight {
                return T::from_i128(rng.gen_range(r.lo..=r.hi));
            }
            pick -= r.weight;
        }
        unreachable!("pick is below the total weight")
    }
}

impl Distribution<bool> {
    /// `true` with probability `p`.
    pub fn bernoulli(p: f64) -> Self {
        assert!((0.0..=1.0).contains(&p), "Probability {} is outside of [0, 1]", p);
        Self {
            ranges: Vec::new(),
            total: 0,
            probability: Some(p),
            _marker: PhantomData,
        }
    }
}

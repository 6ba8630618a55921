use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// Edge into the node table of a [`Bdd`][crate::bdd::Bdd].
///
/// The sign carries the complement bit: `-r` denotes the negation of `r`.
/// Index `1` is the terminal node, so `Ref::positive(1)` is `true` and its negation is `false`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ref(i32);

impl Ref {
    pub const fn positive(index: u32) -> Self {
        Self(index as i32)
    }

    pub const fn negative(index: u32) -> Self {
        Self(-(index as i32))
    }

    pub const fn is_negated(self) -> bool {
        self.0 < 0
    }

    /// Return the index of the referenced node.
    pub const fn index(self) -> u32 {
        self.0.unsigned_abs()
    }

    /// Return the internal representation of the reference.
    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Non-negative encoding used for hashing: `2 * index + sign`.
    pub(crate) const fn as_lit(self) -> u64 {
        ((self.0.unsigned_abs() as u64) << 1) | (self.0 < 0) as u64
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", if self.is_negated() { "~" } else { "" }, self.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation() {
        let r = Ref::positive(5);
        assert!(!r.is_negated());
        assert!((-r).is_negated());
        assert_eq!(-(-r), r);
        assert_eq!((-r).index(), 5);
        assert_eq!(Ref::negative(5), -r);
    }

    #[test]
    fn test_lit_encoding() {
        assert_eq!(Ref::positive(3).as_lit(), 6);
        assert_eq!(Ref::negative(3).as_lit(), 7);
    }

    #[test]
    fn test_display() {
        assert_eq!(Ref::positive(7).to_string(), "@7");
        assert_eq!(Ref::negative(7).to_string(), "~@7");
    }
}

//! Charge arithmetic: the abelian group the conserved charges live in.

use crate::error::{AbelianError, Result};

/// A conserved additive quantum number.
pub type Charge = i64;

/// The group charges are combined in: either the integers under addition,
/// or a finite cyclic group of a given order.
///
/// Every tensor carries its group; binary operations require both operands
/// to use the same group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeGroup {
    /// Unrestricted integers, ordinary addition.
    U1,
    /// Integers modulo `order`, with canonical representatives in
    /// `[0, order)`.
    Zn(u32),
}

impl ChargeGroup {
    /// The group identity.
    pub fn identity(&self) -> Charge {
        0
    }

    /// Canonical representative of a charge.
    pub fn canonical(&self, c: Charge) -> Charge {
        match self {
            ChargeGroup::U1 => c,
            ChargeGroup::Zn(n) => c.rem_euclid(*n as Charge),
        }
    }

    /// Combine two charges (group addition).
    pub fn combine(&self, a: Charge, b: Charge) -> Charge {
        self.canonical(a + b)
    }

    /// Group inverse of a charge.
    pub fn negate(&self, c: Charge) -> Charge {
        self.canonical(-c)
    }

    /// Whether a block key conserves the total charge: the direction-weighted
    /// sum of the per-leg charges must equal `total` in this group.
    pub fn conserved(&self, total: Charge, dirs: &[i8], key: &[Charge]) -> bool {
        debug_assert_eq!(dirs.len(), key.len());
        let sum = dirs
            .iter()
            .zip(key.iter())
            .fold(0, |acc, (&d, &q)| acc + d as Charge * q);
        self.canonical(sum) == self.canonical(total)
    }

    /// Check that `other` is the same group, for binary operations.
    pub(crate) fn require_same(&self, other: &ChargeGroup) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(AbelianError::ChargeMismatch(format!(
                "operands use different charge groups: {self:?} vs {other:?}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_zn() {
        let g = ChargeGroup::Zn(3);
        assert_eq!(g.canonical(5), 2);
        assert_eq!(g.canonical(-1), 2);
        assert_eq!(g.canonical(0), 0);
    }

    #[test]
    fn test_combine_and_negate() {
        let g = ChargeGroup::Zn(4);
        assert_eq!(g.combine(3, 2), 1);
        assert_eq!(g.negate(1), 3);
        assert_eq!(g.negate(0), 0);

        let u = ChargeGroup::U1;
        assert_eq!(u.combine(3, 2), 5);
        assert_eq!(u.negate(7), -7);
    }

    #[test]
    fn test_conserved() {
        let g = ChargeGroup::Zn(2);
        // +1*1 - 1*1 == 0
        assert!(g.conserved(0, &[1, -1], &[1, 1]));
        // +1*1 - 1*0 == 1 != 0
        assert!(!g.conserved(0, &[1, -1], &[1, 0]));
        // wraps mod 2: 1 + 1 == 0
        assert!(g.conserved(0, &[1, 1], &[1, 1]));
    }

    #[test]
    fn test_require_same() {
        assert!(ChargeGroup::U1.require_same(&ChargeGroup::U1).is_ok());
        assert!(ChargeGroup::Zn(2).require_same(&ChargeGroup::Zn(3)).is_err());
    }
}

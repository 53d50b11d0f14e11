//! Leg metadata: one tensor axis decomposed into charge sectors.

use std::collections::BTreeMap;

use itertools::Itertools;

use crate::charge::{Charge, ChargeGroup};
use crate::error::{AbelianError, Result};

/// One axis of a tensor, decomposed into charge sectors.
///
/// `dims[i]` is the dimension of the sector labeled `charges[i]`. The charge
/// labels are kept strictly increasing; this ordering is load-bearing for
/// block lookups and for the deterministic layout of joined legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    dims: Vec<usize>,
    charges: Vec<Charge>,
    dir: i8,
}

impl Leg {
    /// Create a leg, validating the sector metadata.
    pub fn new(dims: Vec<usize>, charges: Vec<Charge>, dir: i8) -> Result<Self> {
        if dims.len() != charges.len() {
            return Err(AbelianError::ShapeMismatch {
                expected: vec![charges.len()],
                actual: vec![dims.len()],
            });
        }
        if !charges.windows(2).all(|w| w[0] < w[1]) {
            return Err(AbelianError::ChargeMismatch(format!(
                "charge labels must be strictly increasing, got {charges:?}"
            )));
        }
        if dir != 1 && dir != -1 {
            return Err(AbelianError::ChargeMismatch(format!(
                "leg direction must be +1 or -1, got {dir}"
            )));
        }
        Ok(Self { dims, charges, dir })
    }

    /// A leg with a single sector carrying the group identity charge.
    pub fn trivial(dim: usize, dir: i8) -> Self {
        Self {
            dims: vec![dim],
            charges: vec![0],
            dir,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn charges(&self) -> &[Charge] {
        &self.charges
    }

    pub fn dir(&self) -> i8 {
        self.dir
    }

    pub fn num_sectors(&self) -> usize {
        self.charges.len()
    }

    /// Total dimension of the flattened (dense) axis.
    pub fn flat_dim(&self) -> usize {
        self.dims.iter().sum()
    }

    /// Position of a charge label among this leg's sectors.
    pub fn sector_pos(&self, charge: Charge) -> Option<usize> {
        self.charges.binary_search(&charge).ok()
    }

    /// Dimension of the sector with the given charge label.
    pub fn sector_dim(&self, charge: Charge) -> Option<usize> {
        self.sector_pos(charge).map(|p| self.dims[p])
    }

    /// Offset of a sector within the flattened (dense) axis.
    pub fn sector_offset(&self, charge: Charge) -> Option<usize> {
        self.sector_pos(charge)
            .map(|p| self.dims[..p].iter().sum())
    }

    /// The same leg with its direction reversed: the direction sign and all
    /// charge labels are negated, and sectors are reordered so the labels
    /// stay sorted. Applying this twice returns the original leg.
    pub fn flipped(&self, group: &ChargeGroup) -> Leg {
        let mut sectors: Vec<(Charge, usize)> = self
            .charges
            .iter()
            .zip(self.dims.iter())
            .map(|(&q, &d)| (group.negate(q), d))
            .collect();
        sectors.sort_by_key(|&(q, _)| q);
        Leg {
            charges: sectors.iter().map(|&(q, _)| q).collect(),
            dims: sectors.iter().map(|&(_, d)| d).collect(),
            dir: -self.dir,
        }
    }

    /// The same leg with only the direction sign reversed. Unlike `flipped`,
    /// the charge labels and sector layout are untouched.
    pub(crate) fn reversed(&self) -> Leg {
        Leg {
            dims: self.dims.clone(),
            charges: self.charges.clone(),
            dir: -self.dir,
        }
    }

    /// Whether two legs can be contracted against each other: equal charge
    /// labels, equal sector dimensions, opposite directions.
    pub(crate) fn contractible_with(&self, other: &Leg) -> Result<()> {
        if self.charges != other.charges {
            return Err(AbelianError::ChargeMismatch(format!(
                "contracted legs carry different charge labels: {:?} vs {:?}",
                self.charges, other.charges
            )));
        }
        if self.dims != other.dims {
            return Err(AbelianError::ShapeMismatch {
                expected: self.dims.clone(),
                actual: other.dims.clone(),
            });
        }
        if self.dir != -other.dir {
            return Err(AbelianError::ChargeMismatch(format!(
                "contracted legs must have opposite directions, got {} and {}",
                self.dir, other.dir
            )));
        }
        Ok(())
    }
}

/// Build legs from the loose per-leg metadata the constructors accept.
///
/// A missing `qhape` means every leg is a single trivial sector; a missing
/// `dirs` means every leg points inward (+1).
pub fn make_legs(
    shape: &[Vec<usize>],
    qhape: Option<&[Vec<Charge>]>,
    dirs: Option<&[i8]>,
) -> Result<Vec<Leg>> {
    if let Some(q) = qhape {
        if q.len() != shape.len() {
            return Err(AbelianError::InvalidIndex(format!(
                "qhape lists {} legs, shape lists {}",
                q.len(),
                shape.len()
            )));
        }
    }
    if let Some(d) = dirs {
        if d.len() != shape.len() {
            return Err(AbelianError::InvalidIndex(format!(
                "dirs lists {} legs, shape lists {}",
                d.len(),
                shape.len()
            )));
        }
    }
    shape
        .iter()
        .enumerate()
        .map(|(i, dims)| {
            let (dims, charges) = match qhape {
                Some(q) => (dims.clone(), q[i].clone()),
                None => (vec![dims.iter().sum()], vec![0]),
            };
            let dir = dirs.map(|d| d[i]).unwrap_or(1);
            Leg::new(dims, charges, dir)
        })
        .collect()
}

/// Layout of a leg obtained by fusing several legs into one.
///
/// Enumerates every combination of constituent sectors in lexicographic
/// order of the constituent charge tuple. Combinations with the same fused
/// charge are concatenated along the fused axis in that order; the table
/// records where each combination landed so that splitting can undo the
/// fusion exactly.
#[derive(Debug, Clone)]
pub struct FusedLeg {
    leg: Leg,
    /// combo charge tuple -> (fused charge, offset within fused sector, flat dim)
    table: BTreeMap<Vec<Charge>, (Charge, usize, usize)>,
    /// fused charge -> combos in layout order
    groups: BTreeMap<Charge, Vec<Vec<Charge>>>,
}

impl FusedLeg {
    /// Compute the fused layout of `legs` under the given new direction.
    pub fn fuse(group: &ChargeGroup, legs: &[Leg], new_dir: i8) -> Result<FusedLeg> {
        if legs.is_empty() {
            return Err(AbelianError::InvalidIndex(
                "cannot fuse an empty group of legs".into(),
            ));
        }
        if new_dir != 1 && new_dir != -1 {
            return Err(AbelianError::ChargeMismatch(format!(
                "fused leg direction must be +1 or -1, got {new_dir}"
            )));
        }

        // Sector charges are sorted per leg, so the cartesian product comes
        // out in lexicographic order of the charge tuples.
        let mut table = BTreeMap::new();
        let mut groups: BTreeMap<Charge, Vec<Vec<Charge>>> = BTreeMap::new();
        let mut totals: BTreeMap<Charge, usize> = BTreeMap::new();
        for combo in legs
            .iter()
            .map(|leg| leg.charges().iter().copied().zip(leg.dims().iter().copied()))
            .multi_cartesian_product()
        {
            let key: Vec<Charge> = combo.iter().map(|&(q, _)| q).collect();
            let dim: usize = combo.iter().map(|&(_, d)| d).product();
            let weighted: Charge = combo
                .iter()
                .zip(legs.iter())
                .map(|(&(q, _), leg)| leg.dir() as Charge * q)
                .sum();
            let fused = group.canonical(new_dir as Charge * weighted);
            let offset = totals.entry(fused).or_insert(0);
            table.insert(key.clone(), (fused, *offset, dim));
            *offset += dim;
            groups.entry(fused).or_default().push(key);
        }

        let charges: Vec<Charge> = totals.keys().copied().collect();
        let dims: Vec<usize> = totals.values().copied().collect();
        Ok(FusedLeg {
            leg: Leg::new(dims, charges, new_dir)?,
            table,
            groups,
        })
    }

    /// The fused leg itself.
    pub fn leg(&self) -> &Leg {
        &self.leg
    }

    /// Where a constituent charge combination landed:
    /// (fused charge, offset within the fused sector, flat dimension).
    pub fn locate(&self, combo: &[Charge]) -> Option<(Charge, usize, usize)> {
        self.table.get(combo).copied()
    }

    /// All constituent combinations mapping to a fused charge, in layout order.
    pub fn combos_of(&self, fused: Charge) -> &[Vec<Charge>] {
        self.groups.get(&fused).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leg_validation() {
        assert!(Leg::new(vec![2, 3], vec![0, 1], 1).is_ok());
        assert!(Leg::new(vec![2, 3], vec![1, 0], 1).is_err());
        assert!(Leg::new(vec![2, 3], vec![0, 0], 1).is_err());
        assert!(Leg::new(vec![2], vec![0, 1], 1).is_err());
        assert!(Leg::new(vec![2, 3], vec![0, 1], 0).is_err());
    }

    #[test]
    fn test_sector_lookup() {
        let leg = Leg::new(vec![2, 3, 4], vec![0, 1, 3], -1).unwrap();
        assert_eq!(leg.flat_dim(), 9);
        assert_eq!(leg.sector_dim(1), Some(3));
        assert_eq!(leg.sector_dim(2), None);
        assert_eq!(leg.sector_offset(3), Some(5));
    }

    #[test]
    fn test_flip_is_involution() {
        let group = ChargeGroup::Zn(3);
        let leg = Leg::new(vec![2, 3], vec![0, 1], 1).unwrap();
        let flipped = leg.flipped(&group);
        assert_eq!(flipped.dir(), -1);
        assert_eq!(flipped.charges(), &[0, 2]);
        assert_eq!(flipped.dims(), &[2, 3]);
        assert_eq!(flipped.flipped(&group), leg);
    }

    #[test]
    fn test_fuse_two_legs() {
        let group = ChargeGroup::U1;
        let a = Leg::new(vec![2, 3], vec![0, 1], 1).unwrap();
        let b = Leg::new(vec![1, 2], vec![0, 1], 1).unwrap();
        let fused = FusedLeg::fuse(&group, &[a, b], 1).unwrap();
        // Fused charges: 0 (dim 2*1), 1 (dim 2*2 + 3*1), 2 (dim 3*2).
        assert_eq!(fused.leg().charges(), &[0, 1, 2]);
        assert_eq!(fused.leg().dims(), &[2, 7, 6]);
        // (0,1) precedes (1,0) within fused charge 1.
        assert_eq!(fused.locate(&[0, 1]), Some((1, 0, 4)));
        assert_eq!(fused.locate(&[1, 0]), Some((1, 4, 3)));
        assert_eq!(fused.combos_of(1), &[vec![0, 1], vec![1, 0]]);
    }

    #[test]
    fn test_fuse_respects_directions_and_modulus() {
        let group = ChargeGroup::Zn(2);
        let a = Leg::new(vec![2, 3], vec![0, 1], 1).unwrap();
        let b = Leg::new(vec![1, 2], vec![0, 1], -1).unwrap();
        // Fusing with new_dir = -1 negates the weighted sum mod 2.
        let fused = FusedLeg::fuse(&group, &[a, b], -1).unwrap();
        assert_eq!(fused.leg().charges(), &[0, 1]);
        // charge 0: (0,0) dim 2 and (1,1) dim 6; charge 1: (0,1) dim 4 and (1,0) dim 3.
        assert_eq!(fused.leg().dims(), &[8, 7]);
        assert_eq!(fused.locate(&[1, 1]), Some((0, 2, 6)));
    }
}

//! The block-sparse symmetric tensor type.

use std::collections::BTreeMap;

use itertools::Itertools;
use mdarray::Tensor;
use num_complex::Complex64;
use rand::Rng;

use crate::block::Block;
use crate::charge::{Charge, ChargeGroup};
use crate::error::{AbelianError, Result};
use crate::leg::Leg;
use crate::scalar::Scalar;

/// A tensor whose entries are constrained by a conserved additive charge.
///
/// Each leg is decomposed into charge sectors; the data is a map from
/// per-leg charge keys to dense blocks. When `invar` is true, only keys
/// whose direction-weighted charge sum equals `charge` may carry data,
/// so most of the dense array is implicitly zero and never stored.
///
/// Operations never mutate their operands: every transforming method
/// builds a fresh tensor.
#[derive(Debug, Clone)]
pub struct AbelianTensor<T: Scalar> {
    group: ChargeGroup,
    legs: Vec<Leg>,
    charge: Charge,
    invar: bool,
    sects: BTreeMap<Vec<Charge>, Block<T>>,
}

/// Every key combination over the legs' sectors, in charge-sorted order.
/// A tensor with no legs has exactly one key, the empty tuple.
pub(crate) fn key_combos(legs: &[Leg]) -> Vec<Vec<Charge>> {
    if legs.is_empty() {
        return vec![Vec::new()];
    }
    legs.iter()
        .map(|leg| leg.charges().iter().copied())
        .multi_cartesian_product()
        .collect()
}

impl<T: Scalar> AbelianTensor<T> {
    pub(crate) fn from_parts(
        group: ChargeGroup,
        legs: Vec<Leg>,
        charge: Charge,
        invar: bool,
        sects: BTreeMap<Vec<Charge>, Block<T>>,
    ) -> Self {
        Self {
            group,
            legs,
            charge,
            invar,
            sects,
        }
    }

    /// An invariant tensor with the given legs and no stored blocks.
    pub fn zeros(group: ChargeGroup, legs: Vec<Leg>, charge: Charge) -> Self {
        Self {
            group,
            legs,
            charge: group.canonical(charge),
            invar: true,
            sects: BTreeMap::new(),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            group: self.group,
            legs: self.legs.clone(),
            charge: self.charge,
            invar: self.invar,
            sects: BTreeMap::new(),
        }
    }

    /// An invariant tensor with every allowed block filled by `f`, which
    /// receives the block key and the element's within-block index.
    pub fn filled(
        group: ChargeGroup,
        legs: Vec<Leg>,
        charge: Charge,
        mut f: impl FnMut(&[Charge], &[usize]) -> T,
    ) -> Self {
        let charge = group.canonical(charge);
        let mut sects = BTreeMap::new();
        let dirs: Vec<i8> = legs.iter().map(|l| l.dir()).collect();
        for key in key_combos(&legs) {
            if !group.conserved(charge, &dirs, &key) {
                continue;
            }
            let shape = block_shape(&legs, &key);
            if shape.iter().product::<usize>() == 0 {
                continue;
            }
            let block = Block::from_fn(&shape, |idx| f(&key, idx));
            if !block.is_all_zero() {
                sects.insert(key, block);
            }
        }
        Self {
            group,
            legs,
            charge,
            invar: true,
            sects,
        }
    }

    pub fn ones(group: ChargeGroup, legs: Vec<Leg>, charge: Charge) -> Self {
        Self::filled(group, legs, charge, |_, _| T::one())
    }

    /// An invariant tensor with every allowed block drawn from `rng`.
    pub fn random<R: Rng>(group: ChargeGroup, legs: Vec<Leg>, charge: Charge, rng: &mut R) -> Self {
        Self::filled(group, legs, charge, |_, _| {
            if T::is_complex_type() {
                T::from_complex(Complex64::new(rng.gen::<f64>(), rng.gen::<f64>()))
            } else {
                T::from_f64(rng.gen::<f64>())
            }
        })
    }

    /// The identity matrix on a leg with the given sector structure:
    /// legs directed (+1, -1), one identity block per charge sector.
    pub fn eye(group: ChargeGroup, dims: Vec<usize>, qim: Option<Vec<Charge>>) -> Result<Self> {
        let (dims, charges) = match qim {
            Some(q) => (dims, q),
            None => (vec![dims.iter().sum()], vec![0]),
        };
        let row = Leg::new(dims.clone(), charges.clone(), 1)?;
        let col = Leg::new(dims.clone(), charges.clone(), -1)?;
        let mut sects = BTreeMap::new();
        for (&q, &d) in charges.iter().zip(dims.iter()) {
            if d == 0 {
                continue;
            }
            let block = Block::from_fn(&[d, d], |idx| {
                if idx[0] == idx[1] {
                    T::one()
                } else {
                    T::zero()
                }
            });
            sects.insert(vec![q, q], block);
        }
        Ok(Self {
            group,
            legs: vec![row, col],
            charge: group.identity(),
            invar: true,
            sects,
        })
    }

    /// A rank-0 tensor holding a single scalar.
    pub fn scalar(group: ChargeGroup, value: T) -> Self {
        let mut sects = BTreeMap::new();
        if !value.is_zero() {
            sects.insert(Vec::new(), Block::from_fn(&[], |_| value));
        }
        Self {
            group,
            legs: Vec::new(),
            charge: group.identity(),
            invar: true,
            sects,
        }
    }

    /// The value of a rank-0 tensor.
    pub fn value(&self) -> Result<T> {
        if !self.legs.is_empty() {
            return Err(AbelianError::InvalidIndex(format!(
                "value() requires a rank-0 tensor, got rank {}",
                self.legs.len()
            )));
        }
        Ok(self
            .sects
            .get(&Vec::new())
            .map(|b| b.get(&[]))
            .unwrap_or_else(T::zero))
    }

    pub fn group(&self) -> &ChargeGroup {
        &self.group
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    pub fn rank(&self) -> usize {
        self.legs.len()
    }

    pub fn charge(&self) -> Charge {
        self.charge
    }

    pub fn invar(&self) -> bool {
        self.invar
    }

    /// Dimension-per-sector lists, one per leg.
    pub fn shape(&self) -> Vec<Vec<usize>> {
        self.legs.iter().map(|l| l.dims().to_vec()).collect()
    }

    /// Charge-label lists, one per leg.
    pub fn qhape(&self) -> Vec<Vec<Charge>> {
        self.legs.iter().map(|l| l.charges().to_vec()).collect()
    }

    pub fn dirs(&self) -> Vec<i8> {
        self.legs.iter().map(|l| l.dir()).collect()
    }

    /// Dense (flattened) dimension of each leg.
    pub fn flat_shape(&self) -> Vec<usize> {
        self.legs.iter().map(|l| l.flat_dim()).collect()
    }

    /// Total number of dense elements, stored or implicit.
    pub fn dense_len(&self) -> usize {
        self.flat_shape().iter().product()
    }

    pub fn sects(&self) -> &BTreeMap<Vec<Charge>, Block<T>> {
        &self.sects
    }

    pub fn num_blocks(&self) -> usize {
        self.sects.len()
    }

    pub fn get_block(&self, key: &[Charge]) -> Option<&Block<T>> {
        self.sects.get(key)
    }

    /// Store a block under a key, validating key membership and shape but
    /// not charge conservation (the consistency checker catches that).
    pub fn set_block(&mut self, key: Vec<Charge>, block: Block<T>) -> Result<()> {
        if key.len() != self.rank() {
            return Err(AbelianError::InvalidIndex(format!(
                "block key has {} charges, tensor has rank {}",
                key.len(),
                self.rank()
            )));
        }
        let mut shape = Vec::with_capacity(key.len());
        for (leg, &q) in self.legs.iter().zip(key.iter()) {
            match leg.sector_dim(q) {
                Some(d) => shape.push(d),
                None => {
                    return Err(AbelianError::InvalidIndex(format!(
                        "charge {q} not present on leg"
                    )))
                }
            }
        }
        if block.shape() != shape {
            return Err(AbelianError::ShapeMismatch {
                expected: shape,
                actual: block.shape(),
            });
        }
        self.sects.insert(key, block);
        Ok(())
    }

    pub(crate) fn insert_raw(&mut self, key: Vec<Charge>, block: Block<T>) {
        self.sects.insert(key, block);
    }

    pub(crate) fn block_shape_of(&self, key: &[Charge]) -> Vec<usize> {
        block_shape(&self.legs, key)
    }

    /// Check that two tensors have identical leg structure, as required by
    /// addition and comparison.
    fn require_same_legs(&self, other: &Self) -> Result<()> {
        self.group.require_same(&other.group)?;
        for (a, b) in self.legs.iter().zip(other.legs.iter()) {
            if a.charges() != b.charges() || a.dir() != b.dir() {
                return Err(AbelianError::ChargeMismatch(format!(
                    "legs disagree: {a:?} vs {b:?}"
                )));
            }
            if a.dims() != b.dims() {
                return Err(AbelianError::ShapeMismatch {
                    expected: a.dims().to_vec(),
                    actual: b.dims().to_vec(),
                });
            }
        }
        if self.rank() != other.rank() {
            return Err(AbelianError::InvalidIndex(format!(
                "rank mismatch: {} vs {}",
                self.rank(),
                other.rank()
            )));
        }
        Ok(())
    }

    fn zip_blocks(&self, other: &Self, f: impl Fn(T, T) -> T + Copy) -> BTreeMap<Vec<Charge>, Block<T>> {
        let mut sects = BTreeMap::new();
        let keys: Vec<Vec<Charge>> = self
            .sects
            .keys()
            .chain(other.sects.keys())
            .cloned()
            .unique()
            .collect();
        for key in keys {
            let shape = self.block_shape_of(&key);
            let a = self
                .sects
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Block::zeros(&shape));
            let b = other
                .sects
                .get(&key)
                .cloned()
                .unwrap_or_else(|| Block::zeros(&shape));
            let out = a.zip_map(&b, f);
            if !out.is_all_zero() {
                sects.insert(key, out);
            }
        }
        sects
    }

    /// Element-wise sum. Legs and total charge must agree.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.require_same_legs(other)?;
        if self.charge != other.charge {
            return Err(AbelianError::ChargeMismatch(format!(
                "cannot add tensors with charges {} and {}",
                self.charge, other.charge
            )));
        }
        Ok(Self {
            group: self.group,
            legs: self.legs.clone(),
            charge: self.charge,
            invar: self.invar && other.invar,
            sects: self.zip_blocks(other, |a, b| a + b),
        })
    }

    /// Element-wise difference. Legs and total charge must agree.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.require_same_legs(other)?;
        if self.charge != other.charge {
            return Err(AbelianError::ChargeMismatch(format!(
                "cannot subtract tensors with charges {} and {}",
                self.charge, other.charge
            )));
        }
        Ok(Self {
            group: self.group,
            legs: self.legs.clone(),
            charge: self.charge,
            invar: self.invar && other.invar,
            sects: self.zip_blocks(other, |a, b| a - b),
        })
    }

    /// Element-wise product. Legs must agree; since the product vanishes
    /// wherever either factor does, only keys stored by both survive.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.require_same_legs(other)?;
        let mut sects = BTreeMap::new();
        for (key, a) in &self.sects {
            let Some(b) = other.sects.get(key) else {
                continue;
            };
            let out = a.zip_map(b, |x, y| x * y);
            if !out.is_all_zero() {
                sects.insert(key.clone(), out);
            }
        }
        Ok(Self {
            group: self.group,
            legs: self.legs.clone(),
            charge: self.charge,
            invar: self.invar && other.invar,
            sects,
        })
    }

    pub fn ones_like(&self) -> Self {
        Self::ones(self.group, self.legs.clone(), self.charge)
    }

    /// Multiply every element by a scalar.
    pub fn scale(&self, factor: T) -> Self {
        let mut out = self.zeros_like();
        if factor.is_zero() {
            return out;
        }
        for (key, block) in &self.sects {
            out.sects.insert(key.clone(), block.scale(factor));
        }
        out
    }

    pub fn neg(&self) -> Self {
        self.scale(T::zero() - T::one())
    }

    /// Add a scalar to every dense element, conserving or not. The result
    /// is no longer invariant since charge-forbidden entries become
    /// non-zero; every key combination is materialized.
    pub fn scalar_add(&self, s: T) -> Self {
        let mut sects = BTreeMap::new();
        for key in key_combos(&self.legs) {
            let shape = self.block_shape_of(&key);
            if shape.iter().product::<usize>() == 0 {
                continue;
            }
            let block = match self.sects.get(&key) {
                Some(b) => b.map(|x| x + s),
                None => Block::from_fn(&shape, |_| s),
            };
            if !block.is_all_zero() {
                sects.insert(key, block);
            }
        }
        Self {
            group: self.group,
            legs: self.legs.clone(),
            charge: self.charge,
            invar: false,
            sects,
        }
    }

    pub fn scalar_sub(&self, s: T) -> Self {
        self.scalar_add(T::zero() - s)
    }

    /// Element-wise square root of the stored blocks.
    pub fn sqrt(&self) -> Self {
        let mut out = self.zeros_like();
        for (key, block) in &self.sects {
            out.sects.insert(key.clone(), block.map(|x| x.sqrt()));
        }
        out
    }

    /// Apply `f` to every stored element, keeping the sparsity pattern.
    pub fn map_blocks(&self, f: impl Fn(T) -> T + Copy) -> Self {
        let mut out = self.zeros_like();
        for (key, block) in &self.sects {
            let b = block.map(f);
            if !b.is_all_zero() {
                out.sects.insert(key.clone(), b);
            }
        }
        out
    }

    /// Reorder legs. Block keys and block axes are permuted identically.
    pub fn transpose(&self, perm: &[usize]) -> Result<Self> {
        let rank = self.rank();
        if perm.len() != rank {
            return Err(AbelianError::InvalidIndex(format!(
                "permutation of length {} applied to rank {rank}",
                perm.len()
            )));
        }
        let mut seen = vec![false; rank];
        for &p in perm {
            if p >= rank || seen[p] {
                return Err(AbelianError::InvalidIndex(format!(
                    "invalid permutation {perm:?} for rank {rank}"
                )));
            }
            seen[p] = true;
        }
        let legs: Vec<Leg> = perm.iter().map(|&p| self.legs[p].clone()).collect();
        let mut sects = BTreeMap::new();
        for (key, block) in &self.sects {
            let new_key: Vec<Charge> = perm.iter().map(|&p| key[p]).collect();
            sects.insert(new_key, block.permute(perm));
        }
        Ok(Self {
            group: self.group,
            legs,
            charge: self.charge,
            invar: self.invar,
            sects,
        })
    }

    /// Exchange two legs. Its own inverse; swapping a leg with itself is a
    /// no-op.
    pub fn swap_axes(&self, i: usize, j: usize) -> Result<Self> {
        let rank = self.rank();
        if i >= rank {
            return Err(AbelianError::axis_out_of_range(i, rank));
        }
        if j >= rank {
            return Err(AbelianError::axis_out_of_range(j, rank));
        }
        let mut perm: Vec<usize> = (0..rank).collect();
        perm.swap(i, j);
        self.transpose(&perm)
    }

    /// Insert a new leg of a single identity-charge sector of dimension 1.
    pub fn expand_dims(&self, axis: usize, dir: i8) -> Result<Self> {
        let rank = self.rank();
        if axis > rank {
            return Err(AbelianError::axis_out_of_range(axis, rank + 1));
        }
        if dir != 1 && dir != -1 {
            return Err(AbelianError::ChargeMismatch(format!(
                "leg direction must be +1 or -1, got {dir}"
            )));
        }
        let mut legs = self.legs.clone();
        legs.insert(axis, Leg::trivial(1, dir));
        let mut sects = BTreeMap::new();
        for (key, block) in &self.sects {
            let mut new_key = key.clone();
            new_key.insert(axis, self.group.identity());
            let mut shape = block.shape();
            shape.insert(axis, 1);
            sects.insert(new_key, block.reshape(&shape));
        }
        Ok(Self {
            group: self.group,
            legs,
            charge: self.charge,
            invar: self.invar,
            sects,
        })
    }

    /// Remove a trivial leg (single identity-charge sector of dimension 1),
    /// undoing `expand_dims`.
    pub fn squeeze(&self, axis: usize) -> Result<Self> {
        let rank = self.rank();
        if axis >= rank {
            return Err(AbelianError::axis_out_of_range(axis, rank));
        }
        let leg = &self.legs[axis];
        if leg.charges() != [self.group.identity()] || leg.dims() != [1] {
            return Err(AbelianError::InvalidIndex(format!(
                "axis {axis} is not a trivial dimension-1 leg"
            )));
        }
        let mut legs = self.legs.clone();
        legs.remove(axis);
        let mut sects = BTreeMap::new();
        for (key, block) in &self.sects {
            let mut new_key = key.clone();
            new_key.remove(axis);
            let mut shape = block.shape();
            shape.remove(axis);
            sects.insert(new_key, block.reshape(&shape));
        }
        Ok(Self {
            group: self.group,
            legs,
            charge: self.charge,
            invar: self.invar,
            sects,
        })
    }

    /// Reverse one leg's direction, negating its charge labels. The stored
    /// data is unchanged; only the labeling moves. An involution.
    pub fn flip_dir(&self, axis: usize) -> Result<Self> {
        let rank = self.rank();
        if axis >= rank {
            return Err(AbelianError::axis_out_of_range(axis, rank));
        }
        let mut legs = self.legs.clone();
        legs[axis] = legs[axis].flipped(&self.group);
        let mut sects = BTreeMap::new();
        for (key, block) in &self.sects {
            let mut new_key = key.clone();
            new_key[axis] = self.group.negate(key[axis]);
            sects.insert(new_key, block.clone());
        }
        Ok(Self {
            group: self.group,
            legs,
            charge: self.charge,
            invar: self.invar,
            sects,
        })
    }

    /// Complex conjugate: conjugates every element, reverses every leg
    /// direction and negates the total charge. Charge labels and block
    /// keys stay put, so conservation is preserved.
    pub fn conjugate(&self) -> Self {
        let legs: Vec<Leg> = self
            .legs
            .iter()
            .map(Leg::reversed)
            .collect();
        let sects = self
            .sects
            .iter()
            .map(|(k, b)| (k.clone(), b.conj()))
            .collect();
        Self {
            group: self.group,
            legs,
            charge: self.group.negate(self.charge),
            invar: self.invar,
            sects,
        }
    }

    /// Expand into an ordinary dense array, zero-filling charge-forbidden
    /// entries. Sectors are laid out along each axis in charge order.
    pub fn to_dense(&self) -> Tensor<T> {
        let flat = self.flat_shape();
        let mut dense = Block::zeros(&flat);
        for (key, block) in &self.sects {
            let offsets: Vec<usize> = self
                .legs
                .iter()
                .zip(key.iter())
                .map(|(leg, &q)| leg.sector_offset(q).unwrap_or(0))
                .collect();
            dense.copy_region_from(block, &offsets);
        }
        dense.into_tensor()
    }

    /// Slice a dense array along each leg's sector boundaries, keeping the
    /// charge-conserving slices (or all slices when `invar` is false).
    pub fn from_dense(
        group: ChargeGroup,
        dense: &Tensor<T>,
        shape: &[Vec<usize>],
        qhape: Option<&[Vec<Charge>]>,
        dirs: Option<&[i8]>,
        charge: Charge,
        invar: bool,
    ) -> Result<Self> {
        let legs = crate::leg::make_legs(shape, qhape, dirs)?;
        let charge = group.canonical(charge);
        let flat: Vec<usize> = legs.iter().map(|l| l.flat_dim()).collect();
        if dense.dims() != &flat[..] {
            return Err(AbelianError::ShapeMismatch {
                expected: flat,
                actual: dense.dims().to_vec(),
            });
        }
        let dense = Block::from_tensor(dense.clone());
        let leg_dirs: Vec<i8> = legs.iter().map(|l| l.dir()).collect();
        let mut sects = BTreeMap::new();
        for key in key_combos(&legs) {
            if invar && !group.conserved(charge, &leg_dirs, &key) {
                continue;
            }
            let block_shape = block_shape(&legs, &key);
            if block_shape.iter().product::<usize>() == 0 {
                continue;
            }
            let offsets: Vec<usize> = legs
                .iter()
                .zip(key.iter())
                .map(|(leg, &q)| leg.sector_offset(q).unwrap_or(0))
                .collect();
            let block = dense.extract_region(&offsets, &block_shape);
            if !block.is_all_zero() {
                sects.insert(key, block);
            }
        }
        Ok(Self {
            group,
            legs,
            charge,
            invar,
            sects,
        })
    }

    /// Whether all elements of two tensors with identical leg structure
    /// agree within an absolute tolerance. Missing blocks count as zero.
    pub fn allclose(&self, other: &Self, atol: f64) -> bool {
        if self.require_same_legs(other).is_err() {
            return false;
        }
        let keys: Vec<Vec<Charge>> = self
            .sects
            .keys()
            .chain(other.sects.keys())
            .cloned()
            .unique()
            .collect();
        for key in keys {
            let shape = self.block_shape_of(&key);
            let zeros = Block::zeros(&shape);
            let a = self.sects.get(&key).unwrap_or(&zeros);
            let b = other.sects.get(&key).unwrap_or(&zeros);
            let close = a
                .to_flat()
                .into_iter()
                .zip(b.to_flat())
                .all(|(x, y)| Scalar::abs_sq(&(x - y)).sqrt() <= atol);
            if !close {
                return false;
            }
        }
        true
    }

    /// Sum of all dense elements.
    pub fn sum(&self) -> T {
        self.sects
            .values()
            .flat_map(|b| b.to_flat())
            .fold(T::zero(), |acc, x| acc + x)
    }

    /// Mean of all dense elements, implicit zeros included.
    pub fn average(&self) -> Result<T> {
        let n = self.dense_len();
        if n == 0 {
            return Err(AbelianError::InvalidIndex(
                "average over a tensor with no elements".into(),
            ));
        }
        Ok(self.sum() / T::from_f64(n as f64))
    }

    /// Largest real part over all dense elements, implicit zeros included.
    pub fn max(&self) -> Result<f64> {
        self.extremum(f64::max)
    }

    /// Smallest real part over all dense elements, implicit zeros included.
    pub fn min(&self) -> Result<f64> {
        self.extremum(f64::min)
    }

    fn extremum(&self, pick: impl Fn(f64, f64) -> f64) -> Result<f64> {
        let n = self.dense_len();
        if n == 0 {
            return Err(AbelianError::InvalidIndex(
                "reduction over a tensor with no elements".into(),
            ));
        }
        let stored: usize = self.sects.values().map(|b| b.len()).sum();
        let mut acc: Option<f64> = if stored < n { Some(0.0) } else { None };
        for block in self.sects.values() {
            for x in block.to_flat() {
                let v = x.real_f64();
                acc = Some(match acc {
                    Some(a) => pick(a, v),
                    None => v,
                });
            }
        }
        Ok(acc.expect("dense length checked above"))
    }
}

/// The shape a block stored under `key` must have.
pub(crate) fn block_shape(legs: &[Leg], key: &[Charge]) -> Vec<usize> {
    legs.iter()
        .zip(key.iter())
        .map(|(leg, &q)| leg.sector_dim(q).unwrap_or(0))
        .collect()
}

impl<T: Scalar> PartialEq for AbelianTensor<T> {
    /// Exact dense-semantics equality: same group and legs, and every
    /// element equal, with missing blocks counting as zero. The `invar`
    /// flag and total charge are bookkeeping and do not participate.
    fn eq(&self, other: &Self) -> bool {
        if self.require_same_legs(other).is_err() {
            return false;
        }
        let keys: Vec<Vec<Charge>> = self
            .sects
            .keys()
            .chain(other.sects.keys())
            .cloned()
            .unique()
            .collect();
        keys.into_iter().all(|key| {
            let shape = block_shape(&self.legs, &key);
            let zeros = Block::zeros(&shape);
            let a = self.sects.get(&key).unwrap_or(&zeros);
            let b = other.sects.get(&key).unwrap_or(&zeros);
            a.to_flat() == b.to_flat()
        })
    }
}

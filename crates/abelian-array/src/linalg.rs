//! Block-wise linear algebra: contraction, trace, diag, norm, and
//! truncated decompositions with a global cross-block truncation policy.

use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use num_complex::Complex64;

use crate::backend::{eig_block, eigh_block, svd_block};
use crate::block::Block;
use crate::charge::Charge;
use crate::error::{AbelianError, Result};
use crate::leg::Leg;
use crate::scalar::Scalar;
use crate::tensor::AbelianTensor;

/// Which side a diagonal factor multiplies from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Truncation policy for SVD and eigendecompositions.
///
/// `max_rank` caps the total number of kept values across all blocks.
/// `max_ranks` gives a list of candidate caps; with `rtol` set, the
/// smallest cap whose relative truncation error stays within `rtol` wins,
/// falling back to the largest cap. With `rtol` alone, the smallest kept
/// count meeting the tolerance is chosen.
#[derive(Debug, Clone, Default)]
pub struct TruncateOptions {
    pub rtol: Option<f64>,
    pub max_rank: Option<usize>,
    pub max_ranks: Option<Vec<usize>>,
}

impl TruncateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rtol(mut self, rtol: f64) -> Self {
        self.rtol = Some(rtol);
        self
    }

    pub fn with_max_rank(mut self, max_rank: usize) -> Self {
        self.max_rank = Some(max_rank);
        self
    }

    pub fn with_max_ranks(mut self, max_ranks: Vec<usize>) -> Self {
        self.max_ranks = Some(max_ranks);
        self
    }
}

/// Result of a truncated SVD: `u . diag(s) . v` approximates the
/// matricized input, with `rel_err` the Frobenius-relative weight of the
/// discarded spectrum.
#[derive(Debug, Clone)]
pub struct SvdOutcome<T: Scalar> {
    pub u: AbelianTensor<T>,
    pub s: AbelianTensor<T>,
    pub v: AbelianTensor<T>,
    pub rel_err: f64,
}

/// Result of a truncated eigendecomposition. Always complex, since a real
/// block can carry complex eigenpairs.
#[derive(Debug, Clone)]
pub struct EigOutcome {
    pub values: AbelianTensor<Complex64>,
    pub vectors: AbelianTensor<Complex64>,
    pub rel_err: f64,
}

/// Pick how many of the descending magnitudes to keep, and the relative
/// error of discarding the rest.
fn decide_kept(mags: &[f64], opts: &TruncateOptions) -> (usize, f64) {
    let total: f64 = mags.iter().map(|m| m * m).sum();
    let rel_err = |kept: usize| -> f64 {
        if total == 0.0 {
            return 0.0;
        }
        let tail: f64 = mags[kept..].iter().map(|m| m * m).sum();
        (tail / total).sqrt()
    };
    let mut caps: Vec<usize> = match (&opts.max_ranks, opts.max_rank) {
        (Some(list), _) => list.clone(),
        (None, Some(r)) => vec![r],
        (None, None) => {
            if opts.rtol.is_some() {
                (0..=mags.len()).collect()
            } else {
                vec![mags.len()]
            }
        }
    };
    caps.sort_unstable();
    caps.dedup();
    if caps.is_empty() {
        caps.push(mags.len());
    }
    if let Some(rtol) = opts.rtol {
        for &cap in &caps {
            let kept = cap.min(mags.len());
            let err = rel_err(kept);
            if err <= rtol {
                return (kept, err);
            }
        }
    }
    let kept = caps.last().copied().unwrap_or(mags.len()).min(mags.len());
    (kept, rel_err(kept))
}

impl<T: Scalar> AbelianTensor<T> {
    /// Frobenius norm squared: the sum of squared magnitudes over all
    /// stored blocks.
    pub fn norm_sq(&self) -> f64 {
        self.sects().values().map(|b| b.frobenius_sq()).sum()
    }

    /// Frobenius norm.
    pub fn norm(&self) -> f64 {
        self.norm_sq().sqrt()
    }

    /// Contract legs of two tensors pairwise. Each pair must have equal
    /// dimension-per-sector and opposite directions on matching charge
    /// labels. An empty pair list is an outer product. The result carries
    /// the uncontracted legs of `self` (ascending) followed by those of
    /// `other` (ascending).
    pub fn dot(&self, other: &Self, pairs: &[(usize, usize)]) -> Result<Self> {
        self.group().require_same(other.group())?;
        for (n, &(i, j)) in pairs.iter().enumerate() {
            if i >= self.rank() {
                return Err(AbelianError::axis_out_of_range(i, self.rank()));
            }
            if j >= other.rank() {
                return Err(AbelianError::axis_out_of_range(j, other.rank()));
            }
            if pairs[..n].iter().any(|&(a, b)| a == i || b == j) {
                return Err(AbelianError::InvalidIndex(format!(
                    "contraction pair ({i}, {j}) repeats an axis"
                )));
            }
            self.legs()[i].contractible_with(&other.legs()[j])?;
        }

        // A rank-0 operand is a plain scalar factor.
        if self.rank() == 0 {
            return Ok(other.scale(self.value()?));
        }
        if other.rank() == 0 {
            return Ok(self.scale(other.value()?));
        }

        let mut a = self.clone();
        let mut b = other.clone();
        let mut a_con: Vec<usize> = pairs.iter().map(|p| p.0).collect();
        let mut b_con: Vec<usize> = pairs.iter().map(|p| p.1).collect();
        if pairs.is_empty() {
            // Outer product: contract a pair of trivial legs instead.
            a = a.expand_dims(a.rank(), -1)?;
            b = b.expand_dims(0, 1)?;
            a_con = vec![a.rank() - 1];
            b_con = vec![0];
        }
        let mut a_free: Vec<usize> = (0..a.rank()).filter(|i| !a_con.contains(i)).collect();
        let mut b_free: Vec<usize> = (0..b.rank()).filter(|i| !b_con.contains(i)).collect();
        let a_padded = a_free.is_empty();
        if a_padded {
            a = a.expand_dims(0, 1)?;
            a_free = vec![0];
            a_con = a_con.iter().map(|i| i + 1).collect();
        }
        let b_padded = b_free.is_empty();
        if b_padded {
            b = b.expand_dims(b.rank(), -1)?;
            b_free = vec![b.rank() - 1];
        }

        let (am, a_info) = a.to_matrix(&a_free, &a_con)?;
        let (bm, b_info) = b.to_matrix(&b_con, &b_free)?;

        // Group the right operand's blocks by contracted charge, then
        // multiply-accumulate per shared charge.
        let mut b_by_qc: BTreeMap<Charge, Vec<(Charge, &Block<T>)>> = BTreeMap::new();
        for (key, block) in bm.sects() {
            b_by_qc.entry(key[0]).or_default().push((key[1], block));
        }
        let mut sects: BTreeMap<Vec<Charge>, Block<T>> = BTreeMap::new();
        for (key, a_block) in am.sects() {
            let (ql, qc) = (key[0], key[1]);
            let Some(partners) = b_by_qc.get(&qc) else {
                continue;
            };
            for &(qr, b_block) in partners {
                let prod = a_block.matmul(b_block);
                match sects.entry(vec![ql, qr]) {
                    Entry::Vacant(e) => {
                        e.insert(prod);
                    }
                    Entry::Occupied(mut e) => {
                        let sum = e.get().zip_map(&prod, |x, y| x + y);
                        e.insert(sum);
                    }
                }
            }
        }
        sects.retain(|_, b| !b.is_all_zero());

        let c = AbelianTensor::from_parts(
            *self.group(),
            vec![am.legs()[0].clone(), bm.legs()[1].clone()],
            self.group().combine(am.charge(), bm.charge()),
            am.invar() && bm.invar(),
            sects,
        );
        let mut out = c.split_indices(&[(0, a_info.left_legs), (1, b_info.right_legs)])?;
        if a_padded {
            out = out.squeeze(0)?;
        }
        if b_padded {
            out = out.squeeze(out.rank() - 1)?;
        }
        Ok(out)
    }

    /// Partial trace over two legs with matching sectors and opposite
    /// directions. The traced legs are removed.
    pub fn trace(&self, i: usize, j: usize) -> Result<Self> {
        let rank = self.rank();
        if i >= rank {
            return Err(AbelianError::axis_out_of_range(i, rank));
        }
        if j >= rank {
            return Err(AbelianError::axis_out_of_range(j, rank));
        }
        if i == j {
            return Err(AbelianError::InvalidIndex(
                "cannot trace a leg against itself".into(),
            ));
        }
        self.legs()[i].contractible_with(&self.legs()[j])?;

        let rest_axes: Vec<usize> = (0..rank).filter(|&a| a != i && a != j).collect();
        let new_legs: Vec<Leg> = rest_axes.iter().map(|&a| self.legs()[a].clone()).collect();
        let mut sects: BTreeMap<Vec<Charge>, Block<T>> = BTreeMap::new();
        for (key, block) in self.sects() {
            if key[i] != key[j] {
                continue;
            }
            let shape = block.shape();
            let d = shape[i];
            let rest_shape: Vec<usize> = rest_axes.iter().map(|&a| shape[a]).collect();
            let traced = Block::from_fn(&rest_shape, |idx| {
                let mut full = vec![0usize; rank];
                for (slot, &a) in rest_axes.iter().enumerate() {
                    full[a] = idx[slot];
                }
                let mut acc = T::zero();
                for dd in 0..d {
                    full[i] = dd;
                    full[j] = dd;
                    acc = acc + block.get(&full);
                }
                acc
            });
            let rest_key: Vec<Charge> = rest_axes.iter().map(|&a| key[a]).collect();
            match sects.entry(rest_key) {
                Entry::Vacant(e) => {
                    e.insert(traced);
                }
                Entry::Occupied(mut e) => {
                    let sum = e.get().zip_map(&traced, |x, y| x + y);
                    e.insert(sum);
                }
            }
        }
        sects.retain(|_, b| !b.is_all_zero());
        Ok(AbelianTensor::from_parts(
            *self.group(),
            new_legs,
            self.charge(),
            self.invar(),
            sects,
        ))
    }

    /// Vector to diagonal matrix, or matrix to its diagonal vector.
    ///
    /// A rank-1 tensor gains a mirrored second leg of opposite direction,
    /// with each sector becoming a diagonal matrix block; the result is
    /// invariant with the identity total charge. A rank-2 tensor
    /// must be square and charge-matched; its per-sector diagonals become
    /// a vector, which is no longer invariant.
    pub fn diag(&self) -> Result<Self> {
        match self.rank() {
            1 => {
                let leg = self.legs()[0].clone();
                let mirror = leg.reversed();
                let mut sects = BTreeMap::new();
                for (key, block) in self.sects() {
                    let d = block.shape()[0];
                    let matrix = Block::from_fn(&[d, d], |idx| {
                        if idx[0] == idx[1] {
                            block.get(&[idx[0]])
                        } else {
                            T::zero()
                        }
                    });
                    sects.insert(vec![key[0], key[0]], matrix);
                }
                // The (q, q) blocks with opposite directions conserve the
                // identity, whatever charge the vector carried.
                Ok(AbelianTensor::from_parts(
                    *self.group(),
                    vec![leg, mirror],
                    self.group().identity(),
                    true,
                    sects,
                ))
            }
            2 => {
                self.legs()[0].contractible_with(&self.legs()[1])?;
                let leg = self.legs()[0].clone();
                let mut sects = BTreeMap::new();
                for (key, block) in self.sects() {
                    if key[0] != key[1] {
                        continue;
                    }
                    let d = block.shape()[0];
                    let vector = Block::from_fn(&[d], |idx| block.get(&[idx[0], idx[0]]));
                    if !vector.is_all_zero() {
                        sects.insert(vec![key[0]], vector);
                    }
                }
                Ok(AbelianTensor::from_parts(
                    *self.group(),
                    vec![leg],
                    self.charge(),
                    false,
                    sects,
                ))
            }
            r => Err(AbelianError::InvalidIndex(format!(
                "diag requires rank 1 or 2, got rank {r}"
            ))),
        }
    }

    /// Multiply along one leg by a diagonal vector, without materializing
    /// the diagonal matrix. `Side::Left` is `diag(d) . T` along that leg
    /// and requires the vector's direction to equal the leg's;
    /// `Side::Right` is `T . diag(d)` and requires the opposite.
    pub fn multiply_diag(&self, diag: &AbelianTensor<T>, axis: usize, side: Side) -> Result<Self> {
        self.group().require_same(diag.group())?;
        if diag.rank() != 1 {
            return Err(AbelianError::InvalidIndex(format!(
                "diagonal factor must be rank 1, got rank {}",
                diag.rank()
            )));
        }
        if axis >= self.rank() {
            return Err(AbelianError::axis_out_of_range(axis, self.rank()));
        }
        let leg = &self.legs()[axis];
        let d_leg = &diag.legs()[0];
        if leg.charges() != d_leg.charges() {
            return Err(AbelianError::ChargeMismatch(format!(
                "diagonal charges {:?} do not match leg charges {:?}",
                d_leg.charges(),
                leg.charges()
            )));
        }
        if leg.dims() != d_leg.dims() {
            return Err(AbelianError::ShapeMismatch {
                expected: leg.dims().to_vec(),
                actual: d_leg.dims().to_vec(),
            });
        }
        let wanted = match side {
            Side::Left => leg.dir(),
            Side::Right => -leg.dir(),
        };
        if d_leg.dir() != wanted {
            return Err(AbelianError::ChargeMismatch(format!(
                "diagonal direction {} incompatible with leg direction {} on that side",
                d_leg.dir(),
                leg.dir()
            )));
        }

        let mut sects = BTreeMap::new();
        for (key, block) in self.sects() {
            let Some(d_block) = diag.get_block(&[key[axis]]) else {
                continue;
            };
            let dvals = d_block.to_flat();
            let scaled = Block::from_fn(&block.shape(), |idx| block.get(idx) * dvals[idx[axis]]);
            if !scaled.is_all_zero() {
                sects.insert(key.clone(), scaled);
            }
        }
        Ok(AbelianTensor::from_parts(
            *self.group(),
            self.legs().to_vec(),
            self.charge(),
            self.invar(),
            sects,
        ))
    }

    /// Truncated singular-value decomposition across a left/right leg
    /// partition.
    ///
    /// Each stored block of the matricized tensor is decomposed
    /// independently; all singular values are then ranked together and
    /// truncated by one global policy. Returns U with the left legs plus a
    /// new bond leg, the singular values as a vector on the bond, and V
    /// with the bond leg plus the right legs. The total charge moves to V.
    pub fn svd(
        &self,
        left: &[usize],
        right: &[usize],
        opts: &TruncateOptions,
    ) -> Result<SvdOutcome<T>> {
        if !self.invar() {
            return Err(AbelianError::ChargeMismatch(
                "svd requires an invariant tensor".into(),
            ));
        }
        let (m, info) = self.to_matrix(left, right)?;

        let mut keys: Vec<Vec<Charge>> = Vec::new();
        let mut us: Vec<Block<T>> = Vec::new();
        let mut svals: Vec<Vec<f64>> = Vec::new();
        let mut vts: Vec<Block<T>> = Vec::new();
        for (key, block) in m.sects() {
            let (u, s, vt) = svd_block(block, key)?;
            keys.push(key.clone());
            us.push(u);
            svals.push(s);
            vts.push(vt);
        }

        // Gather the full spectrum, rank it globally, and decide how many
        // values survive. Per-block spectra are already descending, so the
        // survivors of each block form a prefix.
        let mut entries: Vec<(f64, usize)> = Vec::new();
        for (b, s) in svals.iter().enumerate() {
            entries.extend(s.iter().map(|&v| (v, b)));
        }
        entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        let mags: Vec<f64> = entries.iter().map(|e| e.0).collect();
        let (kept, rel_err) = decide_kept(&mags, opts);
        let mut counts = vec![0usize; keys.len()];
        for &(_, b) in &entries[..kept] {
            counts[b] += 1;
        }

        let mut bond_dims = Vec::new();
        let mut bond_charges = Vec::new();
        for (b, key) in keys.iter().enumerate() {
            if counts[b] > 0 {
                bond_charges.push(key[0]);
                bond_dims.push(counts[b]);
            }
        }
        let bond_u = Leg::new(bond_dims.clone(), bond_charges.clone(), -1)?;
        let bond_s = Leg::new(bond_dims, bond_charges, 1)?;

        let mut u_sects = BTreeMap::new();
        let mut s_sects = BTreeMap::new();
        let mut v_sects = BTreeMap::new();
        for (b, key) in keys.iter().enumerate() {
            let c_b = counts[b];
            if c_b == 0 {
                continue;
            }
            let (ql, qr) = (key[0], key[1]);
            let rows = us[b].shape()[0];
            let cols = vts[b].shape()[1];
            u_sects.insert(vec![ql, ql], us[b].extract_region(&[0, 0], &[rows, c_b]));
            s_sects.insert(
                vec![ql],
                Block::from_flat(&[c_b], svals[b][..c_b].iter().map(|&v| T::from_f64(v)).collect()),
            );
            v_sects.insert(vec![ql, qr], vts[b].extract_region(&[0, 0], &[c_b, cols]));
        }

        let group = *self.group();
        let u_mat = AbelianTensor::from_parts(
            group,
            vec![m.legs()[0].clone(), bond_u],
            group.identity(),
            true,
            u_sects,
        );
        let s = AbelianTensor::from_parts(group, vec![bond_s.clone()], group.identity(), false, s_sects);
        let v_mat = AbelianTensor::from_parts(
            group,
            vec![bond_s, m.legs()[1].clone()],
            m.charge(),
            true,
            v_sects,
        );
        let u = u_mat.split_indices(&[(0, info.left_legs)])?;
        let v = v_mat.split_indices(&[(1, info.right_legs)])?;
        Ok(SvdOutcome { u, s, v, rel_err })
    }

    /// Truncated eigendecomposition across a left/right leg partition.
    ///
    /// The matricized tensor must be square and charge-matched with total
    /// charge zero, so every stored block sits on the charge diagonal.
    /// Truncation ranks eigenvalues by magnitude globally, like `svd`.
    /// With `hermitian` set, each block goes through the self-adjoint
    /// solver, so the eigenvalues are real and the eigenvectors stay
    /// orthonormal even for degenerate spectra.
    pub fn eig(
        &self,
        left: &[usize],
        right: &[usize],
        hermitian: bool,
        opts: &TruncateOptions,
    ) -> Result<EigOutcome> {
        if !self.invar() {
            return Err(AbelianError::ChargeMismatch(
                "eig requires an invariant tensor".into(),
            ));
        }
        let (m, info) = self.to_matrix(left, right)?;
        if m.charge() != m.group().identity() {
            return Err(AbelianError::ChargeMismatch(format!(
                "eig requires total charge {}, got {}",
                m.group().identity(),
                m.charge()
            )));
        }
        m.legs()[0].contractible_with(&m.legs()[1])?;

        let mut keys: Vec<Vec<Charge>> = Vec::new();
        let mut specs: Vec<Vec<Complex64>> = Vec::new();
        let mut vecs: Vec<Block<Complex64>> = Vec::new();
        for (key, block) in m.sects() {
            let complex = block.map_into(|x| x.to_complex());
            let (values, vectors): (Vec<Complex64>, Block<Complex64>) = if hermitian {
                let (w, v) = eigh_block(&complex, key)?;
                (w.into_iter().map(|x| Complex64::new(x, 0.0)).collect(), v)
            } else {
                eig_block(&complex, key)?
            };
            // Order each block's eigenpairs by descending magnitude so
            // global truncation keeps a per-block prefix.
            let mut order: Vec<usize> = (0..values.len()).collect();
            order.sort_by(|&x, &y| {
                values[y]
                    .norm()
                    .partial_cmp(&values[x].norm())
                    .unwrap_or(Ordering::Equal)
            });
            let n = vectors.shape()[0];
            let sorted_vecs =
                Block::from_fn(&[n, n], |idx| vectors.get(&[idx[0], order[idx[1]]]));
            let sorted_vals: Vec<Complex64> = order.iter().map(|&i| values[i]).collect();
            keys.push(key.clone());
            specs.push(sorted_vals);
            vecs.push(sorted_vecs);
        }

        let mut entries: Vec<(f64, usize)> = Vec::new();
        for (b, s) in specs.iter().enumerate() {
            entries.extend(s.iter().map(|v| (v.norm(), b)));
        }
        entries.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        let mags: Vec<f64> = entries.iter().map(|e| e.0).collect();
        let (kept, rel_err) = decide_kept(&mags, opts);
        let mut counts = vec![0usize; keys.len()];
        for &(_, b) in &entries[..kept] {
            counts[b] += 1;
        }

        let mut bond_dims = Vec::new();
        let mut bond_charges = Vec::new();
        for (b, key) in keys.iter().enumerate() {
            if counts[b] > 0 {
                bond_charges.push(key[0]);
                bond_dims.push(counts[b]);
            }
        }
        let bond_u = Leg::new(bond_dims.clone(), bond_charges.clone(), -1)?;
        let bond_s = Leg::new(bond_dims, bond_charges, 1)?;

        let mut u_sects = BTreeMap::new();
        let mut s_sects = BTreeMap::new();
        for (b, key) in keys.iter().enumerate() {
            let c_b = counts[b];
            if c_b == 0 {
                continue;
            }
            let q = key[0];
            let n = vecs[b].shape()[0];
            u_sects.insert(vec![q, q], vecs[b].extract_region(&[0, 0], &[n, c_b]));
            s_sects.insert(vec![q], Block::from_flat(&[c_b], specs[b][..c_b].to_vec()));
        }

        let group = *self.group();
        let left_legs: Vec<Leg> = info.left_legs.clone();
        let u_mat = AbelianTensor::from_parts(
            group,
            vec![m.legs()[0].clone(), bond_u],
            group.identity(),
            true,
            u_sects,
        );
        let values =
            AbelianTensor::from_parts(group, vec![bond_s], group.identity(), false, s_sects);
        let vectors = u_mat.split_indices(&[(0, left_legs)])?;
        Ok(EigOutcome {
            values,
            vectors,
            rel_err,
        })
    }

    /// SVD followed by absorbing `sqrt(S)` into both factors, so the two
    /// returned pieces contract to the (possibly truncated) original.
    pub fn split_decomp(
        &self,
        left: &[usize],
        right: &[usize],
        opts: &TruncateOptions,
    ) -> Result<(Self, Self, f64)> {
        let SvdOutcome { u, s, v, rel_err } = self.svd(left, right, opts)?;
        let s_sqrt = s.sqrt();
        let last = u.rank() - 1;
        let left_piece = u.multiply_diag(&s_sqrt, last, Side::Right)?;
        let right_piece = v.multiply_diag(&s_sqrt, 0, Side::Left)?;
        Ok((left_piece, right_piece, rel_err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charge::ChargeGroup;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn matrix_legs() -> Vec<Leg> {
        vec![
            Leg::new(vec![2, 3], vec![0, 1], 1).unwrap(),
            Leg::new(vec![2, 3], vec![0, 1], -1).unwrap(),
        ]
    }

    #[test]
    fn test_decide_kept_rank_cap() {
        let mags = vec![4.0, 3.0, 2.0, 1.0];
        let opts = TruncateOptions::new().with_max_rank(2);
        let (kept, err) = decide_kept(&mags, &opts);
        assert_eq!(kept, 2);
        assert_relative_eq!(err, (5.0f64 / 30.0).sqrt());
    }

    #[test]
    fn test_decide_kept_rtol_alone() {
        let mags = vec![10.0, 1e-9, 1e-10];
        let opts = TruncateOptions::new().with_rtol(1e-6);
        let (kept, err) = decide_kept(&mags, &opts);
        assert_eq!(kept, 1);
        assert!(err < 1e-6);
    }

    #[test]
    fn test_decide_kept_no_truncation() {
        let mags = vec![2.0, 1.0];
        let (kept, err) = decide_kept(&mags, &TruncateOptions::new());
        assert_eq!(kept, 2);
        assert_eq!(err, 0.0);
    }

    #[test]
    fn test_decide_kept_empty_spectrum() {
        let (kept, err) = decide_kept(&[], &TruncateOptions::new().with_rtol(1e-8));
        assert_eq!(kept, 0);
        assert_eq!(err, 0.0);
    }

    #[test]
    fn test_trace_of_eye() {
        let id = AbelianTensor::<f64>::eye(ChargeGroup::U1, vec![2, 3], Some(vec![0, 1])).unwrap();
        let tr = id.trace(0, 1).unwrap();
        assert_eq!(tr.rank(), 0);
        assert_relative_eq!(tr.value().unwrap(), 5.0);
    }

    #[test]
    fn test_diag_round_trip() {
        // A singular-value-style vector: not invariant, data in every sector.
        let leg = Leg::new(vec![2, 3], vec![0, 1], 1).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(20);
        let mut sects = std::collections::BTreeMap::new();
        sects.insert(vec![0], Block::from_fn(&[2], |_| rng.gen::<f64>()));
        sects.insert(vec![1], Block::from_fn(&[3], |_| rng.gen::<f64>()));
        let v = AbelianTensor::<f64>::from_parts(ChargeGroup::U1, vec![leg], 0, false, sects);
        let matrix = v.diag().unwrap();
        assert_eq!(matrix.rank(), 2);
        assert_eq!(matrix.dirs(), vec![1, -1]);
        assert!(matrix.invar());
        let back = matrix.diag().unwrap();
        assert_eq!(back.qhape(), v.qhape());
        for (key, block) in v.sects() {
            assert_eq!(back.get_block(key).unwrap().to_flat(), block.to_flat());
        }
    }

    #[test]
    fn test_diag_of_charged_vector_conserves_identity() {
        // The (q, q) keys of the diagonal matrix sum to zero regardless of
        // the charge the vector carried.
        let leg = Leg::new(vec![2, 3], vec![0, 1], 1).unwrap();
        let mut sects = std::collections::BTreeMap::new();
        sects.insert(vec![0], Block::from_fn(&[2], |idx| (idx[0] + 1) as f64));
        sects.insert(vec![1], Block::from_fn(&[3], |idx| (idx[0] + 3) as f64));
        let v = AbelianTensor::<f64>::from_parts(ChargeGroup::U1, vec![leg], 1, false, sects);
        let matrix = v.diag().unwrap();
        matrix.check_consistency().unwrap();
        assert!(matrix.invar());
        assert_eq!(matrix.charge(), 0);
        let back = matrix.diag().unwrap();
        for (key, block) in v.sects() {
            assert_eq!(back.get_block(key).unwrap().to_flat(), block.to_flat());
        }
    }

    #[test]
    fn test_norm_matches_dense() {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let t = AbelianTensor::<f64>::random(ChargeGroup::Zn(2), matrix_legs(), 0, &mut rng);
        let dense = t.to_dense();
        let mut dense_sq = 0.0;
        for i in 0..5 {
            for j in 0..5 {
                let x = dense[&[i, j][..]];
                dense_sq += x * x;
            }
        }
        assert_relative_eq!(t.norm_sq(), dense_sq, epsilon = 1e-12);
        assert_relative_eq!(t.norm(), dense_sq.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_multiply_diag_matches_dot() {
        let mut rng = ChaCha8Rng::seed_from_u64(22);
        let t = AbelianTensor::<f64>::random(ChargeGroup::U1, matrix_legs(), 0, &mut rng);
        let d_leg = Leg::new(vec![2, 3], vec![0, 1], 1).unwrap();
        let mut rng2 = ChaCha8Rng::seed_from_u64(23);
        let d = AbelianTensor::<f64>::filled(ChargeGroup::U1, vec![d_leg], 0, |_, _| {
            rng2.gen::<f64>()
        });
        // T . diag(d): contract T's column leg with the diagonal matrix.
        let via_dot = t.dot(&d.diag().unwrap(), &[(1, 0)]).unwrap();
        let via_diag = t.multiply_diag(&d, 1, Side::Right).unwrap();
        assert!(via_dot.allclose(&via_diag, 1e-12));
    }

    #[test]
    fn test_dot_rejects_mismatched_dirs() {
        let t = AbelianTensor::<f64>::ones(ChargeGroup::U1, matrix_legs(), 0);
        // Leg 0 of both has direction +1; contraction must fail.
        assert!(t.dot(&t, &[(0, 0)]).is_err());
        assert!(t.dot(&t, &[(1, 0)]).is_ok());
    }

    #[test]
    fn test_svd_rejects_non_invariant() {
        let t = AbelianTensor::<f64>::ones(ChargeGroup::U1, matrix_legs(), 0).scalar_add(1.0);
        assert!(t.svd(&[0], &[1], &TruncateOptions::new()).is_err());
    }
}

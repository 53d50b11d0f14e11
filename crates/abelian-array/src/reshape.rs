//! Index fusion and its inverse: join, split, matricization.
//!
//! Joining places the fused leg at the position of its batch's first
//! index relative to the legs that are not being joined. Within a fused
//! sector, constituent charge combinations are laid out in lexicographic
//! order of the constituent charge tuple; splitting relies on exactly
//! this ordering to be a bit-for-bit inverse.

use std::collections::BTreeMap;

use crate::block::Block;
use crate::charge::Charge;
use crate::error::{AbelianError, Result};
use crate::leg::{FusedLeg, Leg};
use crate::scalar::Scalar;
use crate::tensor::AbelianTensor;

/// How an N-legged tensor was matricized, kept so the matrix form can be
/// split back into the original legs.
#[derive(Debug, Clone)]
pub struct MatricizeInfo {
    /// The legs fused into the row super-leg, in transposed order.
    pub left_legs: Vec<Leg>,
    /// The legs fused into the column super-leg, in transposed order.
    pub right_legs: Vec<Leg>,
}

/// One output axis of a join: either an untouched leg or a fused batch.
enum JoinItem {
    Single(usize),
    Batch(usize),
}

impl<T: Scalar> AbelianTensor<T> {
    /// Fuse each batch of legs into a single new leg with the given
    /// direction. Batches must be disjoint; legs inside a batch are fused
    /// in the order given, and the fused leg takes the position of the
    /// batch's first index among the surviving legs.
    pub fn join_indices(&self, batches: &[Vec<usize>], new_dirs: &[i8]) -> Result<Self> {
        let rank = self.rank();
        if batches.len() != new_dirs.len() {
            return Err(AbelianError::InvalidIndex(format!(
                "{} batches but {} directions",
                batches.len(),
                new_dirs.len()
            )));
        }
        let mut used = vec![false; rank];
        for batch in batches {
            if batch.is_empty() {
                return Err(AbelianError::InvalidIndex("empty join batch".into()));
            }
            for &i in batch {
                if i >= rank {
                    return Err(AbelianError::axis_out_of_range(i, rank));
                }
                if used[i] {
                    return Err(AbelianError::InvalidIndex(format!(
                        "leg {i} appears in more than one join batch"
                    )));
                }
                used[i] = true;
            }
        }

        // Output order: untouched legs and batches interleaved by the
        // position of each batch's first index.
        let mut items: Vec<(usize, JoinItem)> = (0..rank)
            .filter(|&i| !used[i])
            .map(|i| (i, JoinItem::Single(i)))
            .collect();
        for (b, batch) in batches.iter().enumerate() {
            items.push((batch[0], JoinItem::Batch(b)));
        }
        items.sort_by_key(|&(pos, _)| pos);

        // Permute so every batch is contiguous, then fuse in place.
        let mut perm = Vec::with_capacity(rank);
        for (_, item) in &items {
            match item {
                JoinItem::Single(i) => perm.push(*i),
                JoinItem::Batch(b) => perm.extend(batches[*b].iter().copied()),
            }
        }
        let t = self.transpose(&perm)?;

        // Per output axis: the new leg, the source span in the transposed
        // tensor, and the fusion table for batch axes.
        let mut new_legs = Vec::with_capacity(items.len());
        let mut spans: Vec<(usize, usize, Option<FusedLeg>)> = Vec::with_capacity(items.len());
        let mut cursor = 0;
        for (_, item) in &items {
            match item {
                JoinItem::Single(_) => {
                    new_legs.push(t.legs()[cursor].clone());
                    spans.push((cursor, 1, None));
                    cursor += 1;
                }
                JoinItem::Batch(b) => {
                    let width = batches[*b].len();
                    let fused = FusedLeg::fuse(
                        self.group(),
                        &t.legs()[cursor..cursor + width],
                        new_dirs[*b],
                    )?;
                    new_legs.push(fused.leg().clone());
                    spans.push((cursor, width, Some(fused)));
                    cursor += width;
                }
            }
        }

        let mut sects: BTreeMap<Vec<Charge>, Block<T>> = BTreeMap::new();
        for (key, block) in t.sects() {
            let mut new_key = Vec::with_capacity(spans.len());
            let mut offsets = Vec::with_capacity(spans.len());
            let mut src_shape = Vec::with_capacity(spans.len());
            for (start, width, fused) in &spans {
                match fused {
                    None => {
                        new_key.push(key[*start]);
                        offsets.push(0);
                        src_shape.push(block.shape()[*start]);
                    }
                    Some(fused) => {
                        let combo = &key[*start..*start + *width];
                        let (q, offset, dim) = fused
                            .locate(combo)
                            .expect("stored key selects valid sectors");
                        new_key.push(q);
                        offsets.push(offset);
                        src_shape.push(dim);
                    }
                }
            }
            let dst_shape: Vec<usize> = new_legs
                .iter()
                .zip(new_key.iter())
                .map(|(leg, &q)| leg.sector_dim(q).unwrap_or(0))
                .collect();
            if dst_shape.iter().product::<usize>() == 0 {
                continue;
            }
            let src = block.reshape(&src_shape);
            sects
                .entry(new_key)
                .or_insert_with(|| Block::zeros(&dst_shape))
                .copy_region_from(&src, &offsets);
        }

        Ok(AbelianTensor::from_parts(
            *self.group(),
            new_legs,
            self.charge(),
            self.invar(),
            sects,
        ))
    }

    /// Split previously fused legs back into their constituents. Each
    /// entry gives the axis to split and the target legs; fusing the
    /// targets with the axis's current direction must reproduce the
    /// axis's sector structure exactly.
    pub fn split_indices(&self, splits: &[(usize, Vec<Leg>)]) -> Result<Self> {
        let rank = self.rank();
        let mut seen = vec![false; rank];
        let mut fusions: BTreeMap<usize, FusedLeg> = BTreeMap::new();
        for (axis, targets) in splits {
            if *axis >= rank {
                return Err(AbelianError::axis_out_of_range(*axis, rank));
            }
            if seen[*axis] {
                return Err(AbelianError::InvalidIndex(format!(
                    "axis {axis} split more than once"
                )));
            }
            seen[*axis] = true;
            let fused = FusedLeg::fuse(self.group(), targets, self.legs()[*axis].dir())?;
            if fused.leg() != &self.legs()[*axis] {
                return Err(AbelianError::ChargeMismatch(format!(
                    "target legs do not fuse back into axis {axis}: {:?} vs {:?}",
                    fused.leg(),
                    self.legs()[*axis]
                )));
            }
            fusions.insert(*axis, fused);
        }

        let mut new_legs: Vec<Leg> = Vec::new();
        for (axis, leg) in self.legs().iter().enumerate() {
            match splits.iter().find(|(a, _)| *a == axis) {
                Some((_, targets)) => new_legs.extend(targets.iter().cloned()),
                None => new_legs.push(leg.clone()),
            }
        }

        let mut sects: BTreeMap<Vec<Charge>, Block<T>> = BTreeMap::new();
        for (key, block) in self.sects() {
            // Cartesian product over the split axes of the constituent
            // combinations that fused into each axis's charge.
            let mut partial: Vec<(Vec<Charge>, Vec<usize>, Vec<usize>, Vec<usize>)> =
                vec![(Vec::new(), Vec::new(), Vec::new(), Vec::new())];
            for (axis, &q) in key.iter().enumerate() {
                let mut next = Vec::new();
                match fusions.get(&axis) {
                    None => {
                        let dim = block.shape()[axis];
                        for (k, off, reg, shp) in &partial {
                            let mut k = k.clone();
                            k.push(q);
                            let mut off = off.clone();
                            off.push(0);
                            let mut reg = reg.clone();
                            reg.push(dim);
                            let mut shp = shp.clone();
                            shp.push(dim);
                            next.push((k, off, reg, shp));
                        }
                    }
                    Some(fused) => {
                        for combo in fused.combos_of(q) {
                            let (_, offset, dim) = fused
                                .locate(combo)
                                .expect("combo comes from the fusion table");
                            if dim == 0 {
                                continue;
                            }
                            let (_, targets) = splits
                                .iter()
                                .find(|(a, _)| *a == axis)
                                .expect("axis has a fusion entry");
                            let combo_dims: Vec<usize> = targets
                                .iter()
                                .zip(combo.iter())
                                .map(|(leg, &c)| leg.sector_dim(c).unwrap_or(0))
                                .collect();
                            for (k, off, reg, shp) in &partial {
                                let mut k = k.clone();
                                k.extend(combo.iter().copied());
                                let mut off = off.clone();
                                off.push(offset);
                                let mut reg = reg.clone();
                                reg.push(dim);
                                let mut shp = shp.clone();
                                shp.extend(combo_dims.iter().copied());
                                next.push((k, off, reg, shp));
                            }
                        }
                    }
                }
                partial = next;
            }
            for (new_key, offsets, region, shape) in partial {
                let piece = block.extract_region(&offsets, &region).reshape(&shape);
                if piece.is_all_zero() {
                    continue;
                }
                sects.insert(new_key, piece);
            }
        }

        Ok(AbelianTensor::from_parts(
            *self.group(),
            new_legs,
            self.charge(),
            self.invar(),
            sects,
        ))
    }

    /// Reshape into a matrix by grouping legs into a row super-leg
    /// (direction +1) and a column super-leg (direction -1). Together the
    /// two groups must cover every leg exactly once, and neither may be
    /// empty. Returns the matrix along with the layout needed to undo it.
    pub fn to_matrix(&self, left: &[usize], right: &[usize]) -> Result<(Self, MatricizeInfo)> {
        let rank = self.rank();
        if left.is_empty() || right.is_empty() {
            return Err(AbelianError::InvalidIndex(
                "matricization needs at least one leg on each side".into(),
            ));
        }
        if left.len() + right.len() != rank {
            return Err(AbelianError::InvalidIndex(format!(
                "{} + {} legs grouped, tensor has rank {rank}",
                left.len(),
                right.len()
            )));
        }
        let perm: Vec<usize> = left.iter().chain(right.iter()).copied().collect();
        let t = self.transpose(&perm)?;
        let nl = left.len();
        let info = MatricizeInfo {
            left_legs: t.legs()[..nl].to_vec(),
            right_legs: t.legs()[nl..].to_vec(),
        };
        let matrix = t.join_indices(
            &[(0..nl).collect(), (nl..rank).collect()],
            &[1, -1],
        )?;
        Ok((matrix, info))
    }

    /// Undo `to_matrix`, reproducing the tensor in the transposed leg
    /// order the matricization used.
    pub fn from_matrix(&self, info: &MatricizeInfo) -> Result<Self> {
        self.split_indices(&[
            (0, info.left_legs.clone()),
            (1, info.right_legs.clone()),
        ])
    }
}

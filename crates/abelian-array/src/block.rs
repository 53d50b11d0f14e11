//! Dense blocks: the per-sector payloads of a block-sparse tensor.

use mdarray::expr::Expression;
use mdarray::{DynRank, Shape, Tensor};
use mdarray_linalg::contract::ContractBuilder;
use mdarray_linalg::Contract;
use mdarray_linalg_faer::Faer;

use crate::scalar::Scalar;

/// One dense block, stored as a dynamic-rank mdarray tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<T: Scalar> {
    tensor: Tensor<T>,
}

impl<T: Scalar> Block<T> {
    pub fn from_tensor(tensor: Tensor<T>) -> Self {
        Self { tensor }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            tensor: Tensor::from_fn(shape, |_| T::zero()),
        }
    }

    pub fn from_fn(shape: &[usize], f: impl FnMut(&[usize]) -> T) -> Self {
        Self {
            tensor: Tensor::from_fn(shape, f),
        }
    }

    /// Build a block from row-major flat data.
    pub fn from_flat(shape: &[usize], data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), shape.iter().product::<usize>());
        Self {
            tensor: Tensor::from(data).into_shape(DynRank::from_dims(shape)),
        }
    }

    /// Row-major flat copy of the block contents.
    pub fn to_flat(&self) -> Vec<T> {
        let shape = self.shape();
        let mut out = Vec::with_capacity(self.len());
        let mut idx = vec![0usize; shape.len()];
        for _ in 0..self.len() {
            out.push(self.tensor[&idx[..]]);
            for ax in (0..shape.len()).rev() {
                idx[ax] += 1;
                if idx[ax] < shape[ax] {
                    break;
                }
                idx[ax] = 0;
            }
        }
        out
    }

    pub fn tensor(&self) -> &Tensor<T> {
        &self.tensor
    }

    pub fn into_tensor(self) -> Tensor<T> {
        self.tensor
    }

    pub fn rank(&self) -> usize {
        self.tensor.rank()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.tensor.shape().dims().to_vec()
    }

    pub fn len(&self) -> usize {
        self.tensor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensor.len() == 0
    }

    pub fn get(&self, idx: &[usize]) -> T {
        self.tensor[idx]
    }

    pub fn set(&mut self, idx: &[usize], val: T) {
        self.tensor[idx] = val;
    }

    /// Permute axes, returning a new owned block.
    pub fn permute(&self, perm: &[usize]) -> Self {
        let view = self.tensor.permute(perm);
        Self {
            tensor: view.cloned().eval(),
        }
    }

    /// Reshape, returning a new owned block.
    pub fn reshape(&self, shape: &[usize]) -> Self {
        let view = self.tensor.reshape(shape);
        Self {
            tensor: view.cloned().eval(),
        }
    }

    pub fn map(&self, mut f: impl FnMut(T) -> T) -> Self {
        Self {
            tensor: self.tensor.expr().map(|x| f(*x)).eval(),
        }
    }

    /// Element-wise conversion into another scalar type.
    pub fn map_into<U: Scalar>(&self, mut f: impl FnMut(T) -> U) -> Block<U> {
        Block {
            tensor: self.tensor.expr().map(|x| f(*x)).eval(),
        }
    }

    /// Element-wise combination of two blocks of equal shape.
    pub fn zip_map(&self, other: &Self, mut f: impl FnMut(T, T) -> T) -> Self {
        debug_assert_eq!(self.shape(), other.shape());
        Self {
            tensor: self
                .tensor
                .expr()
                .zip(other.tensor.expr())
                .map(|(a, b)| f(*a, *b))
                .eval(),
        }
    }

    pub fn scale(&self, factor: T) -> Self {
        self.map(|x| x * factor)
    }

    pub fn conj(&self) -> Self {
        self.map(|x| x.conj())
    }

    /// Sum of squared magnitudes of all elements.
    pub fn frobenius_sq(&self) -> f64 {
        self.tensor
            .expr()
            .fold(0.0, |acc, x| acc + Scalar::abs_sq(x))
    }

    pub fn is_all_zero(&self) -> bool {
        self.tensor.expr().fold(true, |acc, x| acc && x.is_zero())
    }

    /// Matrix multiplication for 2-D blocks, C = A * B.
    pub fn matmul(&self, other: &Self) -> Self {
        debug_assert_eq!(self.rank(), 2);
        debug_assert_eq!(other.rank(), 2);
        debug_assert_eq!(self.shape()[1], other.shape()[0]);
        Self {
            tensor: Faer.contract_n(&self.tensor, &other.tensor, 1).eval(),
        }
    }

    /// Copy `src` into this block at the given per-axis offsets.
    pub fn copy_region_from(&mut self, src: &Block<T>, offsets: &[usize]) {
        let src_shape = src.shape();
        debug_assert_eq!(src_shape.len(), self.rank());
        if src.is_empty() {
            return;
        }
        let mut idx = vec![0usize; src_shape.len()];
        let mut dst_idx = offsets.to_vec();
        for _ in 0..src.len() {
            self.tensor[&dst_idx[..]] = src.tensor[&idx[..]];
            for ax in (0..src_shape.len()).rev() {
                idx[ax] += 1;
                dst_idx[ax] += 1;
                if idx[ax] < src_shape[ax] {
                    break;
                }
                idx[ax] = 0;
                dst_idx[ax] = offsets[ax];
            }
        }
    }

    /// Copy out the region of the given shape starting at the given offsets.
    pub fn extract_region(&self, offsets: &[usize], shape: &[usize]) -> Block<T> {
        debug_assert_eq!(offsets.len(), self.rank());
        debug_assert_eq!(shape.len(), self.rank());
        Block::from_fn(shape, |idx| {
            let src: Vec<usize> = idx
                .iter()
                .zip(offsets.iter())
                .map(|(&i, &o)| i + o)
                .collect();
            self.tensor[&src[..]]
        })
    }
}

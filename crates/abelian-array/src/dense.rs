//! Plain dense tensors behind the same interface, used as a correctness
//! oracle for the block-sparse implementation.

use mdarray::Tensor;

use crate::backend::{eig_block, svd_block};
use crate::block::Block;
use crate::error::{AbelianError, Result};
use crate::scalar::Scalar;
use crate::tensor::AbelianTensor;

/// Capability interface shared by the dense and block-sparse variants.
pub trait TensorLike<T: Scalar>: Sized {
    fn rank(&self) -> usize;

    /// Dense dimension of each axis.
    fn flat_dims(&self) -> Vec<usize>;

    fn to_dense(&self) -> Tensor<T>;

    fn norm(&self) -> f64;

    fn transpose_axes(&self, perm: &[usize]) -> Result<Self>;

    /// Contract axes pairwise; uncontracted axes of `self` come first.
    fn contract(&self, other: &Self, pairs: &[(usize, usize)]) -> Result<Self>;
}

/// A dense tensor with no charge structure: a thin adapter over one block.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTensor<T: Scalar> {
    block: Block<T>,
}

impl<T: Scalar> DenseTensor<T> {
    pub fn new(data: Tensor<T>) -> Self {
        Self {
            block: Block::from_tensor(data),
        }
    }

    pub fn from_fn(shape: &[usize], f: impl FnMut(&[usize]) -> T) -> Self {
        Self {
            block: Block::from_fn(shape, f),
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        self.block.shape()
    }

    pub fn get(&self, idx: &[usize]) -> T {
        self.block.get(idx)
    }

    fn split_axes(&self, pairs: &[(usize, usize)], mine: bool) -> (Vec<usize>, Vec<usize>) {
        let con: Vec<usize> = pairs
            .iter()
            .map(|p| if mine { p.0 } else { p.1 })
            .collect();
        let free: Vec<usize> = (0..self.rank()).filter(|i| !con.contains(i)).collect();
        (free, con)
    }

    /// Flatten into a matrix with the given axes fused left and right.
    fn matricize(&self, left: &[usize], right: &[usize]) -> Block<T> {
        let perm: Vec<usize> = left.iter().chain(right.iter()).copied().collect();
        let permuted = self.block.permute(&perm);
        let dims = permuted.shape();
        let rows: usize = dims[..left.len()].iter().product();
        let cols: usize = dims[left.len()..].iter().product();
        permuted.reshape(&[rows, cols])
    }

    /// Singular values of the matricization, descending.
    pub fn svd_spectrum(&self, left: &[usize], right: &[usize]) -> Result<Vec<f64>> {
        let m = self.matricize(left, right);
        let (_, s, _) = svd_block(&m, &[])?;
        Ok(s)
    }

    /// Eigenvalue magnitudes of the (square) matricization, descending.
    pub fn eig_spectrum(&self, left: &[usize], right: &[usize]) -> Result<Vec<f64>> {
        let m = self.matricize(left, right);
        let shape = m.shape();
        if shape[0] != shape[1] {
            return Err(AbelianError::ShapeMismatch {
                expected: vec![shape[0], shape[0]],
                actual: shape,
            });
        }
        let complex = m.map_into(|x| x.to_complex());
        let (values, _) = eig_block(&complex, &[])?;
        let mut mags: Vec<f64> = values.iter().map(|v| v.norm()).collect();
        mags.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        Ok(mags)
    }
}

impl<T: Scalar> TensorLike<T> for DenseTensor<T> {
    fn rank(&self) -> usize {
        self.block.rank()
    }

    fn flat_dims(&self) -> Vec<usize> {
        self.block.shape()
    }

    fn to_dense(&self) -> Tensor<T> {
        self.block.tensor().clone()
    }

    fn norm(&self) -> f64 {
        self.block.frobenius_sq().sqrt()
    }

    fn transpose_axes(&self, perm: &[usize]) -> Result<Self> {
        if perm.len() != self.rank() {
            return Err(AbelianError::InvalidIndex(format!(
                "permutation of length {} applied to rank {}",
                perm.len(),
                self.rank()
            )));
        }
        Ok(Self {
            block: self.block.permute(perm),
        })
    }

    /// Plain dense tensordot: permute, flatten, matrix-multiply, unflatten.
    fn contract(&self, other: &Self, pairs: &[(usize, usize)]) -> Result<Self> {
        let dims_a = self.dims();
        let dims_b = other.dims();
        for &(i, j) in pairs {
            if i >= self.rank() {
                return Err(AbelianError::axis_out_of_range(i, self.rank()));
            }
            if j >= other.rank() {
                return Err(AbelianError::axis_out_of_range(j, other.rank()));
            }
            if dims_a[i] != dims_b[j] {
                return Err(AbelianError::ShapeMismatch {
                    expected: vec![dims_a[i]],
                    actual: vec![dims_b[j]],
                });
            }
        }
        let (a_free, a_con) = self.split_axes(pairs, true);
        let (b_free, b_con) = other.split_axes(pairs, false);
        let a2 = self.matricize(&a_free, &a_con);
        let b2 = other.matricize(&b_con, &b_free);
        let c2 = a2.matmul(&b2);
        let out_dims: Vec<usize> = a_free
            .iter()
            .map(|&i| dims_a[i])
            .chain(b_free.iter().map(|&j| dims_b[j]))
            .collect();
        Ok(Self {
            block: c2.reshape(&out_dims),
        })
    }
}

impl<T: Scalar> TensorLike<T> for AbelianTensor<T> {
    fn rank(&self) -> usize {
        AbelianTensor::rank(self)
    }

    fn flat_dims(&self) -> Vec<usize> {
        self.flat_shape()
    }

    fn to_dense(&self) -> Tensor<T> {
        AbelianTensor::to_dense(self)
    }

    fn norm(&self) -> f64 {
        AbelianTensor::norm(self)
    }

    fn transpose_axes(&self, perm: &[usize]) -> Result<Self> {
        self.transpose(perm)
    }

    fn contract(&self, other: &Self, pairs: &[(usize, usize)]) -> Result<Self> {
        self.dot(other, pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dense_contract_matches_manual() {
        // (2,3) . (3,2) over the shared axis.
        let a = DenseTensor::from_fn(&[2, 3], |idx| (idx[0] * 3 + idx[1]) as f64);
        let b = DenseTensor::from_fn(&[3, 2], |idx| (idx[0] * 2 + idx[1]) as f64);
        let c = a.contract(&b, &[(1, 0)]).unwrap();
        assert_eq!(c.dims(), vec![2, 2]);
        // c[0,0] = 0*0 + 1*2 + 2*4 = 10
        assert_relative_eq!(c.get(&[0, 0]), 10.0);
        assert_relative_eq!(c.get(&[1, 1]), 3.0 * 1.0 + 4.0 * 3.0 + 5.0 * 5.0);
    }

    #[test]
    fn test_dense_transpose_and_norm() {
        let a = DenseTensor::from_fn(&[2, 2], |idx| (idx[0] * 2 + idx[1]) as f64);
        let t = a.transpose_axes(&[1, 0]).unwrap();
        assert_relative_eq!(t.get(&[0, 1]), 2.0);
        assert_relative_eq!(a.norm(), (0.0f64 + 1.0 + 4.0 + 9.0).sqrt());
    }

    #[test]
    fn test_svd_spectrum_of_diagonal() {
        let a = DenseTensor::from_fn(&[2, 2], |idx| {
            if idx[0] == idx[1] {
                (idx[0] + 1) as f64
            } else {
                0.0
            }
        });
        let s = a.svd_spectrum(&[0], &[1]).unwrap();
        assert_relative_eq!(s[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(s[1], 1.0, epsilon = 1e-12);
    }
}

//! Dense decomposition backend for single blocks.
//!
//! Wraps the mdarray-linalg Faer backend behind crate-local signatures so
//! the block-wise SVD/eig code never sees upstream types.

use mdarray::DTensor;
use mdarray_linalg::eig::{Eig, EigDecomp, EighDecomp};
use mdarray_linalg::svd::{SVD, SVDDecomp};
use mdarray_linalg_faer::Faer;
use num_complex::Complex64;

use crate::block::Block;
use crate::charge::Charge;
use crate::error::{AbelianError, Result};
use crate::scalar::Scalar;

/// SVD of one dense 2-D block: A = U * diag(s) * Vt.
///
/// Returns U as m×k, the k singular values as reals, and Vt as k×n,
/// where k = min(m, n).
pub(crate) fn svd_block<T: Scalar>(
    block: &Block<T>,
    key: &[Charge],
) -> Result<(Block<T>, Vec<f64>, Block<T>)> {
    debug_assert_eq!(block.rank(), 2);
    let shape = block.shape();
    let (m, n) = (shape[0], shape[1]);
    let k = m.min(n);

    // The backend destroys its input, so work on a copy.
    let mut a = DTensor::<T, 2>::from_fn([m, n], |idx| block.get(&[idx[0], idx[1]]));
    let SVDDecomp { s, u, vt } =
        Faer
            .svd(a.as_mut())
            .map_err(|e| AbelianError::DecompositionFailure {
                key: key.to_vec(),
                reason: format!("svd: {e}"),
            })?;

    let s_vec: Vec<f64> = (0..k).map(|i| s[[i]].real_f64()).collect();

    // U comes back m×m; keep the first k columns. Vt comes back n×n; keep
    // the first k rows.
    let u_block = Block::from_fn(&[m, k], |idx| u[[idx[0], idx[1]]]);
    let vt_block = Block::from_fn(&[k, n], |idx| vt[[idx[0], idx[1]]]);
    Ok((u_block, s_vec, vt_block))
}

/// Eigendecomposition of one dense square block: A * V = V * diag(w).
///
/// Returns the eigenvalues and the n×n matrix whose columns are the
/// eigenvectors. Always works in the complex plane since a real block can
/// have complex eigenpairs.
pub(crate) fn eig_block(
    block: &Block<Complex64>,
    key: &[Charge],
) -> Result<(Vec<Complex64>, Block<Complex64>)> {
    debug_assert_eq!(block.rank(), 2);
    let shape = block.shape();
    debug_assert_eq!(shape[0], shape[1]);
    let n = shape[0];

    let mut a = DTensor::<Complex64, 2>::from_fn([n, n], |idx| block.get(&[idx[0], idx[1]]));
    let EigDecomp {
        eigenvalues,
        right_eigenvectors,
        ..
    } = Faer
        .eig(a.as_mut())
        .map_err(|e| AbelianError::DecompositionFailure {
            key: key.to_vec(),
            reason: format!("eig: {e}"),
        })?;
    let Some(eigenvectors) = right_eigenvectors else {
        return Err(AbelianError::DecompositionFailure {
            key: key.to_vec(),
            reason: "eig returned no right eigenvectors".into(),
        });
    };

    let values: Vec<Complex64> = (0..n).map(|i| eigenvalues[[i]]).collect();
    let vectors = Block::from_fn(&[n, n], |idx| eigenvectors[[idx[0], idx[1]]]);
    Ok((values, vectors))
}

/// Self-adjoint eigendecomposition of one dense Hermitian block.
///
/// Returns the real eigenvalues and the unitary matrix whose columns are
/// the eigenvectors, orthonormal even for degenerate spectra.
pub(crate) fn eigh_block(
    block: &Block<Complex64>,
    key: &[Charge],
) -> Result<(Vec<f64>, Block<Complex64>)> {
    debug_assert_eq!(block.rank(), 2);
    let shape = block.shape();
    debug_assert_eq!(shape[0], shape[1]);
    let n = shape[0];

    let mut a = DTensor::<Complex64, 2>::from_fn([n, n], |idx| block.get(&[idx[0], idx[1]]));
    let EighDecomp {
        eigenvalues,
        eigenvectors,
    } = Faer
        .eigh(a.as_mut())
        .map_err(|e| AbelianError::DecompositionFailure {
            key: key.to_vec(),
            reason: format!("eigh: {e}"),
        })?;

    let values: Vec<f64> = (0..n)
        .map(|i| Complex64::from(eigenvalues[[i]]).re)
        .collect();
    let vectors = Block::from_fn(&[n, n], |idx| eigenvectors[[idx[0], idx[1]]]);
    Ok((values, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_svd_block_reconstructs() {
        let a = Block::from_flat(&[3, 2], vec![1.0, 0.0, 0.0, 2.0, 0.0, 0.0]);
        let (u, s, vt) = svd_block(&a, &[0]).unwrap();
        assert_eq!(u.shape(), vec![3, 2]);
        assert_eq!(s.len(), 2);
        assert_eq!(vt.shape(), vec![2, 2]);
        assert_relative_eq!(s[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(s[1], 1.0, epsilon = 1e-12);
        // U * diag(s) * Vt == A
        let us = Block::from_fn(&[3, 2], |idx| u.get(idx) * s[idx[1]]);
        let back = us.matmul(&vt);
        for (x, y) in back.to_flat().into_iter().zip(a.to_flat()) {
            assert_relative_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_eig_block_diagonal() {
        let a = Block::from_fn(&[2, 2], |idx| {
            if idx[0] == idx[1] {
                Complex64::new((idx[0] + 1) as f64, 0.0)
            } else {
                Complex64::new(0.0, 0.0)
            }
        });
        let (values, vectors) = eig_block(&a, &[0]).unwrap();
        let mut mags: Vec<f64> = values.iter().map(|v| v.re).collect();
        mags.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_relative_eq!(mags[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(mags[1], 2.0, epsilon = 1e-10);
        assert_eq!(vectors.shape(), vec![2, 2]);
    }

    #[test]
    fn test_eigh_block_pauli_x() {
        let a = Block::from_fn(&[2, 2], |idx| {
            if idx[0] == idx[1] {
                Complex64::new(0.0, 0.0)
            } else {
                Complex64::new(1.0, 0.0)
            }
        });
        let (values, vectors) = eigh_block(&a, &[0]).unwrap();
        let mut w = values.clone();
        w.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_relative_eq!(w[0], -1.0, epsilon = 1e-10);
        assert_relative_eq!(w[1], 1.0, epsilon = 1e-10);
        // Columns are orthonormal.
        for i in 0..2 {
            for j in 0..2 {
                let dot: Complex64 = (0..2)
                    .map(|r| vectors.get(&[r, i]).conj() * vectors.get(&[r, j]))
                    .sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(dot.norm(), expected, epsilon = 1e-10);
            }
        }
    }
}

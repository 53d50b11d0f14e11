//! Block-sparse tensors with an abelian conserved charge.
//!
//! Every leg of a tensor is decomposed into charge sectors; a conserved
//! additive quantum number constrains which blocks of the dense array can
//! be non-zero, so only those blocks are stored. All index algebra
//! (transpose, join/split, matricization) and block-wise linear algebra
//! (contraction, trace, truncated SVD/eig) preserve the conservation
//! invariant exactly while matching the semantics of the same operations
//! on the dense form.
//!
//! # Core Types
//!
//! - [`ChargeGroup`]: the group charges are combined in (integers or Z_n)
//! - [`Leg`]: one axis, decomposed into charge sectors with a direction
//! - [`Block`]: the dense payload stored for one charge-key combination
//! - [`AbelianTensor`]: the block-sparse tensor itself
//! - [`DenseTensor`]: a plain dense adapter behind the same [`TensorLike`]
//!   interface, used as a correctness oracle
//!
//! # Example
//!
//! ```
//! use abelian_array::{AbelianTensor, ChargeGroup, Leg};
//!
//! // A 5x5 matrix split into charge sectors {0: dim 2, 1: dim 3} on each
//! // side; with total charge 0 only the (0,0) and (1,1) blocks exist.
//! let legs = vec![
//!     Leg::new(vec![2, 3], vec![0, 1], 1).unwrap(),
//!     Leg::new(vec![2, 3], vec![0, 1], -1).unwrap(),
//! ];
//! let t = AbelianTensor::<f64>::ones(ChargeGroup::U1, legs, 0);
//!
//! assert_eq!(t.num_blocks(), 2);
//! assert_eq!(t.flat_shape(), vec![5, 5]);
//! ```

mod backend;
mod block;
mod charge;
mod checker;
mod dense;
mod error;
mod leg;
mod linalg;
mod reshape;
mod scalar;
mod tensor;

pub use block::Block;
pub use charge::{Charge, ChargeGroup};
pub use dense::{DenseTensor, TensorLike};
pub use error::{AbelianError, Result};
pub use leg::{make_legs, FusedLeg, Leg};
pub use linalg::{EigOutcome, Side, SvdOutcome, TruncateOptions};
pub use reshape::MatricizeInfo;
pub use scalar::Scalar;
pub use tensor::AbelianTensor;

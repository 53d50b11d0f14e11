//! Scalar trait for generic block operations.
//!
//! Abstracts over `f64` and `Complex64` so the tensor type and the
//! block-wise linear algebra can be written once for both element types.

use std::fmt::Debug;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use faer_traits::ComplexField;
use num_complex::{Complex64, ComplexFloat};
use num_traits::{MulAdd, One, Zero};

/// Trait for scalar types stored in tensor blocks.
///
/// The bounds match what the matmul and decomposition backends require,
/// plus a handful of conversions the charge-sector bookkeeping needs.
pub trait Scalar:
    Clone
    + Copy
    + Debug
    + Default
    + PartialEq
    + Zero
    + One
    + Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Sum
    + ComplexFloat
    + ComplexField
    + MulAdd<Output = Self>
    + Send
    + Sync
    + 'static
{
    /// Create a scalar from f64.
    fn from_f64(val: f64) -> Self;

    /// Get the real part as f64.
    fn real_f64(&self) -> f64;

    /// Squared magnitude as f64.
    fn abs_sq(&self) -> f64;

    /// Lift into the complex plane (identity for `Complex64`).
    fn to_complex(&self) -> Complex64;

    /// Project from the complex plane (real part for `f64`).
    fn from_complex(val: Complex64) -> Self;

    /// Check if this type is complex.
    fn is_complex_type() -> bool;
}

impl Scalar for f64 {
    fn from_f64(val: f64) -> Self {
        val
    }

    fn real_f64(&self) -> f64 {
        *self
    }

    fn abs_sq(&self) -> f64 {
        self * self
    }

    fn to_complex(&self) -> Complex64 {
        Complex64::new(*self, 0.0)
    }

    fn from_complex(val: Complex64) -> Self {
        val.re
    }

    fn is_complex_type() -> bool {
        false
    }
}

impl Scalar for Complex64 {
    fn from_f64(val: f64) -> Self {
        Complex64::new(val, 0.0)
    }

    fn real_f64(&self) -> f64 {
        self.re
    }

    fn abs_sq(&self) -> f64 {
        self.re * self.re + self.im * self.im
    }

    fn to_complex(&self) -> Complex64 {
        *self
    }

    fn from_complex(val: Complex64) -> Self {
        val
    }

    fn is_complex_type() -> bool {
        true
    }
}

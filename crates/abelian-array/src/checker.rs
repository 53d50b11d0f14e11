//! Consistency checker: validates the structural invariants of a tensor.
//!
//! Used by tests and as a debugging aid; normal operations maintain the
//! invariants by construction and never call this.

use crate::error::{AbelianError, Result};
use crate::scalar::Scalar;
use crate::tensor::AbelianTensor;

impl<T: Scalar> AbelianTensor<T> {
    /// Verify every structural invariant, returning `ConsistencyViolation`
    /// on the first breach found.
    pub fn check_consistency(&self) -> Result<()> {
        let group = self.group();
        let rank = self.rank();

        for (axis, leg) in self.legs().iter().enumerate() {
            if leg.dims().len() != leg.charges().len() {
                return Err(AbelianError::ConsistencyViolation(format!(
                    "leg {axis}: {} dims for {} charge labels",
                    leg.dims().len(),
                    leg.charges().len()
                )));
            }
            if !leg.charges().windows(2).all(|w| w[0] < w[1]) {
                return Err(AbelianError::ConsistencyViolation(format!(
                    "leg {axis}: charge labels not strictly increasing: {:?}",
                    leg.charges()
                )));
            }
            if leg.dir() != 1 && leg.dir() != -1 {
                return Err(AbelianError::ConsistencyViolation(format!(
                    "leg {axis}: direction {} is not +1 or -1",
                    leg.dir()
                )));
            }
            for &q in leg.charges() {
                if group.canonical(q) != q {
                    return Err(AbelianError::ConsistencyViolation(format!(
                        "leg {axis}: charge label {q} is not canonical in {group:?}"
                    )));
                }
            }
        }

        if group.canonical(self.charge()) != self.charge() {
            return Err(AbelianError::ConsistencyViolation(format!(
                "total charge {} is not canonical in {group:?}",
                self.charge()
            )));
        }

        let dirs = self.dirs();
        for (key, block) in self.sects() {
            if key.len() != rank {
                return Err(AbelianError::ConsistencyViolation(format!(
                    "block key {key:?} has {} charges for rank {rank}",
                    key.len()
                )));
            }
            let mut shape = Vec::with_capacity(rank);
            for (axis, (leg, &q)) in self.legs().iter().zip(key.iter()).enumerate() {
                match leg.sector_dim(q) {
                    Some(d) => shape.push(d),
                    None => {
                        return Err(AbelianError::ConsistencyViolation(format!(
                            "block key {key:?}: charge {q} not present on leg {axis}"
                        )))
                    }
                }
            }
            if block.shape() != shape {
                return Err(AbelianError::ConsistencyViolation(format!(
                    "block {key:?} has shape {:?}, legs select {shape:?}",
                    block.shape()
                )));
            }
            if self.invar() && !group.conserved(self.charge(), &dirs, key) {
                return Err(AbelianError::ConsistencyViolation(format!(
                    "block {key:?} violates charge conservation for total charge {}",
                    self.charge()
                )));
            }
        }
        Ok(())
    }
}

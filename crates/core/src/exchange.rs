//! Cross-process exchange and reduction primitives
//!
//! The horizontal plane is decomposed over independent worker processes.
//! Every operation that reaches across that decomposition goes through an
//! explicit [`ProcessContext`] handed into the call, never through ambient
//! global state. Failures are fatal to the step and are not retried.

use crate::error::ExchangeError;
use crate::grid::Grid;

/// Context of the horizontal domain decomposition: periodic ghost-cell
/// exchange and global sum reductions.
pub trait ProcessContext {
    /// Fill the horizontal ghost cells of a flattened 3D field from the
    /// periodic neighbors.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Boundary`] when the exchange fails.
    fn boundary_cyclic(&self, data: &mut [f64], grid: &Grid) -> Result<(), ExchangeError>;

    /// Sum per-level counts across all worker processes, in place.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Reduction`] when the reduction fails.
    fn sum_counts(&self, counts: &mut [u64]) -> Result<(), ExchangeError>;

    /// Sum a per-level profile across all worker processes, in place.
    ///
    /// # Errors
    ///
    /// Returns [`ExchangeError::Reduction`] when the reduction fails.
    fn sum_profile(&self, profile: &mut [f64]) -> Result<(), ExchangeError>;
}

/// Single-process context. The periodic exchange wraps around the local
/// domain; reductions are identity operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct Serial;

impl ProcessContext for Serial {
    fn boundary_cyclic(&self, data: &mut [f64], grid: &Grid) -> Result<(), ExchangeError> {
        let ii = 1;
        let jj = grid.icells;

        // East-west, then north-south so the corners pick up the exchanged
        // west/east columns.
        for k in 0..grid.kcells {
            let kk = k * grid.ijcells;
            for j in 0..grid.jcells {
                for g in 0..grid.igc {
                    data[kk + j * jj + g * ii] = data[kk + j * jj + (grid.iend - grid.igc + g) * ii];
                    data[kk + j * jj + (grid.iend + g) * ii] = data[kk + j * jj + (grid.istart + g) * ii];
                }
            }
            for g in 0..grid.jgc {
                for i in 0..grid.icells {
                    data[kk + g * jj + i] = data[kk + (grid.jend - grid.jgc + g) * jj + i];
                    data[kk + (grid.jend + g) * jj + i] = data[kk + (grid.jstart + g) * jj + i];
                }
            }
        }
        Ok(())
    }

    fn sum_counts(&self, _counts: &mut [u64]) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn sum_profile(&self, _profile: &mut [f64]) -> Result<(), ExchangeError> {
        Ok(())
    }
}

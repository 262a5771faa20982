//! Cloud and buoyant-core mask diagnostics
//!
//! Per-cell boolean indicator fields at full and half levels, plus per-level
//! counts reduced across all worker processes. A cell is "in cloud" when its
//! diagnosed liquid water is positive; it belongs to the "active core" when
//! it is additionally more buoyant than the horizontal mean at its level.
//! Half-level predicates average the two straddling full levels. Counts at
//! the rigid top and bottom boundaries are forced to zero.

use crate::error::ExchangeError;
use crate::exchange::ProcessContext;
use crate::grid::Grid;

/// Mask predicates the closure provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskType {
    /// Cloudy cells: `ql > 0`.
    Ql,
    /// Buoyant cloud cores: `ql > 0` and buoyancy above the level mean.
    QlCore,
}

impl MaskType {
    /// Resolve a mask name once at setup.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ql" => Some(Self::Ql),
            "qlcore" => Some(Self::QlCore),
            _ => None,
        }
    }
}

/// Per-level mask counts at both staggerings, summed over all processes.
#[derive(Debug, Clone)]
pub struct MaskCounts {
    /// Full-level counts, length `kcells`.
    pub nmask: Vec<u64>,
    /// Half-level counts, length `kcells`.
    pub nmaskh: Vec<u64>,
}

impl MaskCounts {
    /// Zeroed counts for a column of `kcells` levels.
    #[must_use]
    pub fn new(kcells: usize) -> Self {
        Self {
            nmask: vec![0; kcells],
            nmaskh: vec![0; kcells],
        }
    }
}

/// Build the cloud mask from a diagnosed `ql` field.
///
/// # Errors
///
/// Propagates boundary-exchange and reduction failures; both are fatal to
/// the step.
pub fn calc_mask_ql(
    mask: &mut [f64],
    maskh: &mut [f64],
    counts: &mut MaskCounts,
    ql: &[f64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    let jj = grid.icells;
    let kk = grid.ijcells;

    for k in grid.kstart..grid.kend {
        let mut n = 0;
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let ijk = i + j * jj + k * kk;
                let inside = u64::from(ql[ijk] > 0.0);
                n += inside;
                mask[ijk] = inside as f64;
            }
        }
        counts.nmask[k] = n;
    }

    for k in grid.kstart..=grid.kend {
        let mut n = 0;
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let ijk = i + j * jj + k * kk;
                let inside = u64::from(ql[ijk - kk] + ql[ijk] > 0.0);
                n += inside;
                maskh[ijk] = inside as f64;
            }
        }
        counts.nmaskh[k] = n;
    }

    finalize_mask(mask, maskh, counts, grid, ctx)
}

/// Build the buoyant-core mask: cloudy and more buoyant than the
/// horizontal-mean buoyancy at the level.
///
/// # Errors
///
/// Propagates boundary-exchange and reduction failures; both are fatal to
/// the step.
#[allow(clippy::too_many_arguments)]
pub fn calc_mask_ql_core(
    mask: &mut [f64],
    maskh: &mut [f64],
    counts: &mut MaskCounts,
    ql: &[f64],
    b: &[f64],
    bmean: &[f64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    let jj = grid.icells;
    let kk = grid.ijcells;

    for k in grid.kstart..grid.kend {
        let mut n = 0;
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let ijk = i + j * jj + k * kk;
                let inside = u64::from(ql[ijk] > 0.0 && b[ijk] - bmean[k] > 0.0);
                n += inside;
                mask[ijk] = inside as f64;
            }
        }
        counts.nmask[k] = n;
    }

    for k in grid.kstart..=grid.kend {
        let mut n = 0;
        for j in grid.jstart..grid.jend {
            for i in grid.istart..grid.iend {
                let ijk = i + j * jj + k * kk;
                let inside = u64::from(
                    ql[ijk - kk] + ql[ijk] > 0.0
                        && b[ijk - kk] + b[ijk] - bmean[k - 1] - bmean[k] > 0.0,
                );
                n += inside;
                maskh[ijk] = inside as f64;
            }
        }
        counts.nmaskh[k] = n;
    }

    finalize_mask(mask, maskh, counts, grid, ctx)
}

/// Shared tail of both mask builds: exchange the indicator ghost cells,
/// reduce the counts, and zero the rigid-boundary half levels.
fn finalize_mask(
    mask: &mut [f64],
    maskh: &mut [f64],
    counts: &mut MaskCounts,
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    ctx.boundary_cyclic(mask, grid)?;
    ctx.boundary_cyclic(maskh, grid)?;

    ctx.sum_counts(&mut counts.nmask)?;
    ctx.sum_counts(&mut counts.nmaskh)?;

    // No cloud flux through the rigid lids.
    counts.nmaskh[grid.kstart] = 0;
    counts.nmaskh[grid.kend] = 0;

    Ok(())
}

//! Statistics profiles and time series
//!
//! The closure exposes a set of named per-level profiles and scalar time
//! series (buoyancy budget, liquid water, cloud fraction, liquid water
//! path, cloud cover). [`Statistics`] owns the registered quantities and the
//! sampling mask under which the conditional means are taken; the reductions
//! are masked horizontal averages normalized with the globally reduced mask
//! counts.
//!
//! The diffusive buoyancy flux needs a turbulent diffusivity. Whichever
//! turbulence closure is active advertises it through the
//! [`EddyDiffusivity`] capability trait, resolved once at setup; without one
//! the molecular diffusivity of the scalar is used.

use rustc_hash::FxHashMap;

use crate::error::ExchangeError;
use crate::exchange::ProcessContext;
use crate::grid::Grid;
use crate::thermo::functions::{interp2, interp4};

/// Staggering of a statistics profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Cell centers.
    Full,
    /// Cell faces.
    Half,
}

/// One registered profile.
#[derive(Debug, Clone)]
pub struct Prof {
    /// Descriptive name.
    pub longname: String,
    /// Physical unit.
    pub unit: String,
    /// Staggering.
    pub level: Level,
    /// Values per vertical level, length `kcells`.
    pub data: Vec<f64>,
}

/// One registered scalar time series.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    /// Descriptive name.
    pub longname: String,
    /// Physical unit.
    pub unit: String,
    /// Current value.
    pub value: f64,
}

/// Capability of the active turbulence closure to provide an eddy
/// diffusivity for scalar fluxes.
pub trait EddyDiffusivity {
    /// Eddy viscosity field, same layout as the 3D fields.
    fn eddy_viscosity(&self) -> &[f64];
    /// Turbulent Prandtl number converting viscosity to scalar diffusivity.
    fn turbulent_prandtl(&self) -> f64;
}

/// Registry of statistics quantities plus the sampling mask.
#[derive(Debug)]
pub struct Statistics {
    profs: FxHashMap<String, Prof>,
    tseries: FxHashMap<String, TimeSeries>,
    /// Full-level sampling indicator field.
    pub mask: Vec<f64>,
    /// Half-level sampling indicator field.
    pub maskh: Vec<f64>,
    /// Globally reduced full-level mask counts.
    pub nmask: Vec<u64>,
    /// Globally reduced half-level mask counts.
    pub nmaskh: Vec<u64>,
    kcells: usize,
}

impl Statistics {
    /// Allocate an empty registry sampling the full domain.
    #[must_use]
    pub fn new(grid: &Grid) -> Self {
        let mut stats = Self {
            profs: FxHashMap::default(),
            tseries: FxHashMap::default(),
            mask: vec![1.0; grid.ijcells * grid.kcells],
            maskh: vec![1.0; grid.ijcells * grid.kcells],
            nmask: vec![0; grid.kcells],
            nmaskh: vec![0; grid.kcells],
            kcells: grid.kcells,
        };
        stats.set_full_mask(grid);
        stats
    }

    /// Sample the entire horizontal domain (the default mask).
    pub fn set_full_mask(&mut self, grid: &Grid) {
        self.mask.fill(1.0);
        self.maskh.fill(1.0);
        let all = (grid.itot * grid.jtot) as u64;
        self.nmask.fill(all);
        self.nmaskh.fill(all);
    }

    /// Register an evolving profile.
    pub fn add_prof(&mut self, name: &str, longname: &str, unit: &str, level: Level) {
        self.profs.insert(
            name.to_string(),
            Prof {
                longname: longname.to_string(),
                unit: unit.to_string(),
                level,
                data: vec![0.0; self.kcells],
            },
        );
    }

    /// Register a fixed profile with its values set once.
    pub fn add_fixed_prof(&mut self, name: &str, longname: &str, unit: &str, level: Level, data: &[f64]) {
        self.profs.insert(
            name.to_string(),
            Prof {
                longname: longname.to_string(),
                unit: unit.to_string(),
                level,
                data: data.to_vec(),
            },
        );
    }

    /// Register a scalar time series.
    pub fn add_tseries(&mut self, name: &str, longname: &str, unit: &str) {
        self.tseries.insert(
            name.to_string(),
            TimeSeries {
                longname: longname.to_string(),
                unit: unit.to_string(),
                value: 0.0,
            },
        );
    }

    /// Look up a registered profile.
    #[must_use]
    pub fn prof(&self, name: &str) -> Option<&Prof> {
        self.profs.get(name)
    }

    /// Look up a registered time series.
    #[must_use]
    pub fn tseries(&self, name: &str) -> Option<&TimeSeries> {
        self.tseries.get(name)
    }

    /// Store computed profile data under a registered name. Unregistered
    /// names are ignored (the statistics output was not requested).
    pub fn store_prof(&mut self, name: &str, data: &[f64]) {
        if let Some(prof) = self.profs.get_mut(name) {
            prof.data.copy_from_slice(data);
        }
    }

    /// Store a time-series value under a registered name.
    pub fn store_tseries(&mut self, name: &str, value: f64) {
        if let Some(ts) = self.tseries.get_mut(name) {
            ts.value = value;
        }
    }

    /// Sampling mask and counts for a staggering.
    #[must_use]
    pub fn sampling(&self, level: Level) -> (&[f64], &[u64]) {
        match level {
            Level::Full => (&self.mask, &self.nmask),
            Level::Half => (&self.maskh, &self.nmaskh),
        }
    }
}

/// Masked horizontal mean per level over the whole column.
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
pub fn calc_mean(
    out: &mut [f64],
    data: &[f64],
    mask: &[f64],
    nmask: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    for k in 0..grid.kcells {
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * grid.ijcells;
            for i in grid.istart..grid.iend {
                sum += mask[base + i] * data[base + i];
            }
        }
        out[k] = sum;
    }
    ctx.sum_profile(out)?;
    for k in 0..grid.kcells {
        out[k] = if nmask[k] > 0 { out[k] / nmask[k] as f64 } else { 0.0 };
    }
    Ok(())
}

/// Masked central moment of order `power` about the given mean profile.
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
#[allow(clippy::too_many_arguments)]
pub fn calc_moment(
    out: &mut [f64],
    data: &[f64],
    mean: &[f64],
    power: i32,
    mask: &[f64],
    nmask: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    for k in 0..grid.kcells {
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * grid.ijcells;
            for i in grid.istart..grid.iend {
                sum += mask[base + i] * (data[base + i] - mean[k]).powi(power);
            }
        }
        out[k] = sum;
    }
    ctx.sum_profile(out)?;
    for k in 0..grid.kcells {
        out[k] = if nmask[k] > 0 { out[k] / nmask[k] as f64 } else { 0.0 };
    }
    Ok(())
}

/// Masked vertical gradient at half levels, centered 2-point differences.
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
pub fn calc_grad_2nd(
    out: &mut [f64],
    data: &[f64],
    dzhi: &[f64],
    maskh: &[f64],
    nmaskh: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    let kk = grid.ijcells;
    out.fill(0.0);
    for k in grid.kstart..=grid.kend {
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * kk;
            for i in grid.istart..grid.iend {
                let ijk = base + i;
                sum += maskh[ijk] * (data[ijk] - data[ijk - kk]) * dzhi[k];
            }
        }
        out[k] = sum;
    }
    ctx.sum_profile(out)?;
    normalize_half(out, nmaskh, grid);
    Ok(())
}

/// Masked vertical gradient at half levels, 4th-order face stencil
/// (uniform vertical spacing).
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
pub fn calc_grad_4th(
    out: &mut [f64],
    data: &[f64],
    dzhi: &[f64],
    maskh: &[f64],
    nmaskh: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    let kk = grid.ijcells;
    out.fill(0.0);
    for k in grid.kstart..=grid.kend {
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * kk;
            for i in grid.istart..grid.iend {
                let ijk = base + i;
                let grad = (data[ijk - 2 * kk] - 27.0 * data[ijk - kk] + 27.0 * data[ijk]
                    - data[ijk + kk])
                    * dzhi[k]
                    / 24.0;
                sum += maskh[ijk] * grad;
            }
        }
        out[k] = sum;
    }
    ctx.sum_profile(out)?;
    normalize_half(out, nmaskh, grid);
    Ok(())
}

/// Masked turbulent flux `<w'b'>` at half levels, 2nd-order interpolation of
/// the scalar to the face; level means of both factors are subtracted.
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
#[allow(clippy::too_many_arguments)]
pub fn calc_flux_2nd(
    out: &mut [f64],
    data: &[f64],
    datamean: &[f64],
    w: &[f64],
    wmean: &[f64],
    maskh: &[f64],
    nmaskh: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    let kk = grid.ijcells;
    out.fill(0.0);
    for k in grid.kstart..=grid.kend {
        let meanh = interp2(datamean[k - 1], datamean[k]);
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * kk;
            for i in grid.istart..grid.iend {
                let ijk = base + i;
                let datah = interp2(data[ijk - kk], data[ijk]);
                sum += maskh[ijk] * (w[ijk] - wmean[k]) * (datah - meanh);
            }
        }
        out[k] = sum;
    }
    ctx.sum_profile(out)?;
    normalize_half(out, nmaskh, grid);
    Ok(())
}

/// Masked turbulent flux at half levels, 4th-order interpolation of the
/// scalar to the face.
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
#[allow(clippy::too_many_arguments)]
pub fn calc_flux_4th(
    out: &mut [f64],
    data: &[f64],
    datamean: &[f64],
    w: &[f64],
    wmean: &[f64],
    maskh: &[f64],
    nmaskh: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    let kk = grid.ijcells;
    out.fill(0.0);
    for k in grid.kstart..=grid.kend {
        let meanh = interp4(datamean[k - 2], datamean[k - 1], datamean[k], datamean[k + 1]);
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * kk;
            for i in grid.istart..grid.iend {
                let ijk = base + i;
                let datah = interp4(
                    data[ijk - 2 * kk],
                    data[ijk - kk],
                    data[ijk],
                    data[ijk + kk],
                );
                sum += maskh[ijk] * (w[ijk] - wmean[k]) * (datah - meanh);
            }
        }
        out[k] = sum;
    }
    ctx.sum_profile(out)?;
    normalize_half(out, nmaskh, grid);
    Ok(())
}

/// Masked diffusive flux at half levels with an eddy diffusivity field:
/// `−0.5·(Km[k−1]+Km[k])/Pr_t · ∂b/∂z`. The boundary faces carry the
/// prescribed surface/top fluxes instead.
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
#[allow(clippy::too_many_arguments)]
pub fn calc_diff_2nd(
    out: &mut [f64],
    data: &[f64],
    evisc: &[f64],
    tpr: f64,
    dzhi: &[f64],
    fluxbot: &[f64],
    fluxtop: &[f64],
    maskh: &[f64],
    nmaskh: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    let kk = grid.ijcells;
    out.fill(0.0);
    for k in grid.kstart + 1..grid.kend {
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * kk;
            for i in grid.istart..grid.iend {
                let ijk = base + i;
                let eviscs = 0.5 * (evisc[ijk - kk] + evisc[ijk]) / tpr;
                sum += maskh[ijk] * (-eviscs * (data[ijk] - data[ijk - kk]) * dzhi[k]);
            }
        }
        out[k] = sum;
    }
    // Boundary faces carry the prescribed fluxes.
    let mut bot = 0.0;
    let mut top = 0.0;
    for j in grid.jstart..grid.jend {
        let base = j * grid.icells;
        for i in grid.istart..grid.iend {
            let ij = base + i;
            bot += maskh[ij + grid.kstart * kk] * fluxbot[ij];
            top += maskh[ij + grid.kend * kk] * fluxtop[ij];
        }
    }
    out[grid.kstart] = bot;
    out[grid.kend] = top;
    ctx.sum_profile(out)?;
    normalize_half(out, nmaskh, grid);
    Ok(())
}

/// Masked diffusive flux at half levels from a constant molecular
/// diffusivity, 4th-order gradient (uniform vertical spacing).
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
#[allow(clippy::too_many_arguments)]
pub fn calc_diff_4th(
    out: &mut [f64],
    data: &[f64],
    visc: f64,
    dzhi: &[f64],
    maskh: &[f64],
    nmaskh: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    let kk = grid.ijcells;
    out.fill(0.0);
    for k in grid.kstart..=grid.kend {
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * kk;
            for i in grid.istart..grid.iend {
                let ijk = base + i;
                let grad = (data[ijk - 2 * kk] - 27.0 * data[ijk - kk] + 27.0 * data[ijk]
                    - data[ijk + kk])
                    * dzhi[k]
                    / 24.0;
                sum += maskh[ijk] * (-visc * grad);
            }
        }
        out[k] = sum;
    }
    ctx.sum_profile(out)?;
    normalize_half(out, nmaskh, grid);
    Ok(())
}

/// Total flux = turbulent + diffusive, per level.
pub fn add_fluxes(total: &mut [f64], turb: &[f64], diff: &[f64]) {
    for (t, (a, b)) in total.iter_mut().zip(turb.iter().zip(diff.iter())) {
        *t = a + b;
    }
}

/// Masked fraction of cells exceeding a threshold, per level (e.g. the
/// cloud fraction for `ql > 0`).
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
pub fn calc_count(
    out: &mut [f64],
    data: &[f64],
    threshold: f64,
    mask: &[f64],
    nmask: &[u64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    for k in 0..grid.kcells {
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * grid.ijcells;
            for i in grid.istart..grid.iend {
                if data[base + i] > threshold {
                    sum += mask[base + i];
                }
            }
        }
        out[k] = sum;
    }
    ctx.sum_profile(out)?;
    for k in 0..grid.kcells {
        out[k] = if nmask[k] > 0 { out[k] / nmask[k] as f64 } else { 0.0 };
    }
    Ok(())
}

/// Projected cover: the global fraction of columns in which any interior
/// level exceeds the threshold.
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
pub fn calc_cover(
    data: &[f64],
    threshold: f64,
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<f64, ExchangeError> {
    let mut cover = [0.0];
    for j in grid.jstart..grid.jend {
        for i in grid.istart..grid.iend {
            let covered = (grid.kstart..grid.kend)
                .any(|k| data[i + j * grid.icells + k * grid.ijcells] > threshold);
            if covered {
                cover[0] += 1.0;
            }
        }
    }
    ctx.sum_profile(&mut cover)?;
    Ok(cover[0] / grid.ijtot())
}

/// Vertically integrated path `∫ρ·q·dz`, averaged over all columns (e.g.
/// the liquid water path).
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
pub fn calc_path(
    data: &[f64],
    rhoref: &[f64],
    dz: &[f64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<f64, ExchangeError> {
    let mut path = [0.0];
    for k in grid.kstart..grid.kend {
        let weight = rhoref[k] * dz[k];
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * grid.ijcells;
            for i in grid.istart..grid.iend {
                path[0] += weight * data[base + i];
            }
        }
    }
    ctx.sum_profile(&mut path)?;
    Ok(path[0] / grid.ijtot())
}

fn normalize_half(out: &mut [f64], nmaskh: &[u64], grid: &Grid) {
    for k in 0..grid.kcells {
        out[k] = if nmaskh[k] > 0 { out[k] / nmaskh[k] as f64 } else { 0.0 };
    }
}

//! Field buffers of the simulator state
//!
//! A [`Field3`] is a flattened 3D array over (i, j, k) with the i index
//! fastest, plus the associated surface slices (value and flux at the bottom
//! boundary) and a per-level horizontal-mean profile. The [`Fields`] registry
//! owns the prognostic scalars, the vertical velocity and its tendency, the
//! reference density profiles, and a fixed set of scratch buffers. Field
//! handles are struct members resolved at compile time; diagnostic names form
//! the closed [`ThermoField`] enumeration, so hot loops never dispatch on
//! strings.

use crate::error::ExchangeError;
use crate::exchange::ProcessContext;
use crate::grid::Grid;

/// Diagnostic fields the closure can materialize on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThermoField {
    /// Buoyancy `b` (m/s²).
    Buoyancy,
    /// Liquid water mixing ratio `ql` (kg/kg).
    LiquidWater,
    /// Squared Brunt–Väisälä frequency `N²` (1/s²).
    BruntVaisala,
}

impl ThermoField {
    /// Resolve a diagnostic name once at setup. Unknown names return `None`
    /// and are treated as "unsupported" by callers.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "b" => Some(Self::Buoyancy),
            "ql" => Some(Self::LiquidWater),
            "N2" => Some(Self::BruntVaisala),
            _ => None,
        }
    }

    /// Canonical diagnostic name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Buoyancy => "b",
            Self::LiquidWater => "ql",
            Self::BruntVaisala => "N2",
        }
    }
}

/// One 3D field with its boundary slices and horizontal-mean profile.
#[derive(Debug, Clone)]
pub struct Field3 {
    /// Short name of the field.
    pub name: &'static str,
    /// Physical unit.
    pub unit: &'static str,
    /// Molecular diffusivity of the field (m²/s).
    pub visc: f64,
    /// Cell values, length `icells * jcells * kcells`.
    pub data: Vec<f64>,
    /// Surface values, one horizontal plane.
    pub bot: Vec<f64>,
    /// Surface fluxes, one horizontal plane.
    pub fluxbot: Vec<f64>,
    /// Top-boundary fluxes, one horizontal plane.
    pub fluxtop: Vec<f64>,
    /// Horizontal-mean profile, length `kcells`.
    pub mean: Vec<f64>,
}

impl Field3 {
    /// Allocate a zero-initialized field on `grid`.
    #[must_use]
    pub fn new(grid: &Grid, name: &'static str, unit: &'static str) -> Self {
        Self {
            name,
            unit,
            visc: 0.0,
            data: vec![0.0; grid.ijcells * grid.kcells],
            bot: vec![0.0; grid.ijcells],
            fluxbot: vec![0.0; grid.ijcells],
            fluxtop: vec![0.0; grid.ijcells],
            mean: vec![0.0; grid.kcells],
        }
    }

    /// One horizontal slab at level `k`.
    #[inline]
    #[must_use]
    pub fn slab(&self, grid: &Grid, k: usize) -> &[f64] {
        &self.data[k * grid.ijcells..(k + 1) * grid.ijcells]
    }

    /// Recompute the horizontal-mean profile over the interior of every
    /// level, reduced across all worker processes.
    ///
    /// # Errors
    ///
    /// Propagates a failed cross-process reduction.
    pub fn calc_mean(&mut self, grid: &Grid, ctx: &dyn ProcessContext) -> Result<(), ExchangeError> {
        calc_mean_profile(&mut self.mean, &self.data, grid, ctx)
    }
}

/// Horizontal-mean profile of a flattened 3D array, interior cells only,
/// globally normalized.
///
/// # Errors
///
/// Propagates a failed cross-process reduction.
pub fn calc_mean_profile(
    mean: &mut [f64],
    data: &[f64],
    grid: &Grid,
    ctx: &dyn ProcessContext,
) -> Result<(), ExchangeError> {
    for (k, m) in mean.iter_mut().enumerate().take(grid.kcells) {
        let mut sum = 0.0;
        for j in grid.jstart..grid.jend {
            let base = j * grid.icells + k * grid.ijcells;
            for i in grid.istart..grid.iend {
                sum += data[base + i];
            }
        }
        *m = sum;
    }
    ctx.sum_profile(mean)?;
    let norm = 1.0 / grid.ijtot();
    for m in mean.iter_mut() {
        *m *= norm;
    }
    Ok(())
}

/// Registry of all fields the closure touches. Owned by the simulator for
/// the run; the closure borrows it per call and never extends lifetimes.
#[derive(Debug)]
pub struct Fields {
    /// Liquid-water potential temperature (K), prognostic.
    pub thl: Field3,
    /// Total water mixing ratio (kg/kg), prognostic.
    pub qt: Field3,
    /// Vertical velocity (m/s), half levels.
    pub w: Field3,
    /// Vertical-velocity tendency (m/s²), half levels.
    pub wt: Field3,
    /// Full-level reference density profile (kg/m³).
    pub rhoref: Vec<f64>,
    /// Half-level reference density profile (kg/m³).
    pub rhorefh: Vec<f64>,
    /// Scratch field for diagnostics.
    pub tmp0: Field3,
    /// Second scratch field for diagnostics.
    pub tmp1: Field3,
}

impl Fields {
    /// Allocate the full registry on `grid`.
    #[must_use]
    pub fn new(grid: &Grid) -> Self {
        Self {
            thl: Field3::new(grid, "thl", "K"),
            qt: Field3::new(grid, "qt", "kg kg-1"),
            w: Field3::new(grid, "w", "m s-1"),
            wt: Field3::new(grid, "wt", "m s-2"),
            rhoref: vec![0.0; grid.kcells],
            rhorefh: vec![0.0; grid.kcells],
            tmp0: Field3::new(grid, "tmp0", "-"),
            tmp1: Field3::new(grid, "tmp1", "-"),
        }
    }

    /// Fill a prognostic scalar from a horizontally uniform interior
    /// profile of length `kmax`.
    ///
    /// # Panics
    ///
    /// Panics if the profile length does not match the interior levels.
    pub fn init_from_profile(field: &mut Field3, profile: &[f64], grid: &Grid) {
        assert_eq!(profile.len(), grid.kmax, "profile length must equal kmax");
        for (k, &value) in profile.iter().enumerate() {
            let slab =
                &mut field.data[(grid.kstart + k) * grid.ijcells..(grid.kstart + k + 1) * grid.ijcells];
            slab.fill(value);
        }
    }
}

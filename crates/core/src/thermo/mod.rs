//! Moist thermodynamics closure
//!
//! [`ThermoMoist`] ties the pieces together: it owns the hydrostatic base
//! state, injects the buoyancy force into the vertical-velocity tendency
//! every step, and serves the diagnostic surfaces (fields, masks, statistics
//! and cross sections). The prognostic scalars it closes over are the
//! liquid-water potential temperature `thl` and the total water mixing ratio
//! `qt`; everything else is derived.

pub mod base_state;
pub mod buoyancy;
pub mod functions;
pub mod masks;
pub mod saturation;

use tracing::{debug, warn};

use crate::config::ThermoConfig;
use crate::cross::{self, CrossSink};
use crate::error::ThermoError;
use crate::exchange::ProcessContext;
use crate::fields::{calc_mean_profile, Field3, Fields, ThermoField};
use crate::grid::{Grid, SpatialOrder};
use crate::stats::{self, EddyDiffusivity, Level, Statistics};

use base_state::{calc_base_state, BaseState};
use buoyancy::{
    calc_buoyancy, calc_buoyancy_bot, calc_buoyancy_flux_bot, calc_buoyancy_tend_2nd,
    calc_buoyancy_tend_4th, calc_n2, calc_ql_field,
};
use masks::{calc_mask_ql, calc_mask_ql_core, MaskCounts, MaskType};

/// Scratch column profiles for the optional per-step base-state refresh.
/// Only the pressure and Exner profiles are updated in place; density and
/// virtual potential temperature land here so the fixed reference profiles
/// survive.
#[derive(Debug)]
struct RefreshScratch {
    rho: Vec<f64>,
    rhoh: Vec<f64>,
    thv: Vec<f64>,
    thvh: Vec<f64>,
}

/// The moist thermodynamics closure.
#[derive(Debug)]
pub struct ThermoMoist {
    ps: f64,
    update_base_state: bool,
    crosslist: Vec<String>,
    base: BaseState,
    scratch: RefreshScratch,
}

impl ThermoMoist {
    /// Initialize the closure: validate the cross list against the spatial
    /// order, extend the initial soundings into the ghost cells, and build
    /// the hydrostatic base state. The reference density profiles are
    /// written into `fields` where the dynamical core reads them.
    ///
    /// `thl_profile` and `qt_profile` are the initial soundings over the
    /// `kmax` interior levels.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::Config`] for soundings of the wrong length and
    /// [`ThermoError::PressureBase`] when the hydrostatic integration fails
    /// on them.
    pub fn new(
        config: &ThermoConfig,
        grid: &Grid,
        fields: &mut Fields,
        thl_profile: &[f64],
        qt_profile: &[f64],
    ) -> Result<Self, ThermoError> {
        if thl_profile.len() != grid.kmax || qt_profile.len() != grid.kmax {
            return Err(ThermoError::Config(format!(
                "initial soundings must have {} levels, got {} and {}",
                grid.kmax,
                thl_profile.len(),
                qt_profile.len()
            )));
        }

        let crosslist = cross::validate_cross_list(&config.crosslist, grid.order);

        fields.thl.visc = config.thl_diffusivity;
        fields.qt.visc = config.qt_diffusivity;

        let mut base = BaseState::new(grid.kcells);
        extend_sounding(&mut base.thl0, thl_profile, grid);
        extend_sounding(&mut base.qt0, qt_profile, grid);

        calc_base_state(
            grid,
            config.ps,
            &mut base.pref,
            &mut base.prefh,
            &mut fields.rhoref,
            &mut fields.rhorefh,
            &mut base.thvref,
            &mut base.thvrefh,
            &mut base.exnref,
            &mut base.exnrefh,
            &base.thl0,
            &base.qt0,
        )?;

        debug!(
            ps = config.ps,
            update = config.update_base_state,
            crosslist = ?crosslist,
            "thermo_moist initialized"
        );

        Ok(Self {
            ps: config.ps,
            update_base_state: config.update_base_state,
            crosslist,
            base,
            scratch: RefreshScratch {
                rho: vec![0.0; grid.kcells],
                rhoh: vec![0.0; grid.kcells],
                thv: vec![0.0; grid.kcells],
                thvh: vec![0.0; grid.kcells],
            },
        })
    }

    /// Prognostic scalars this closure advances.
    #[must_use]
    pub fn prog_vars(&self) -> &'static [&'static str] {
        &["thl", "qt"]
    }

    /// The hydrostatic reference state.
    #[must_use]
    pub fn base(&self) -> &BaseState {
        &self.base
    }

    /// Cross variables that survived validation.
    #[must_use]
    pub fn crosslist(&self) -> &[String] {
        &self.crosslist
    }

    /// One time step: optionally refresh the base-state pressures from the
    /// current horizontal means, then add the buoyancy force to the
    /// vertical-velocity tendency.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::Saturation`] when cells hit the saturation
    /// iteration cap (the tendency still holds their best estimates), and
    /// propagates reduction failures from the mean profiles.
    pub fn exec(
        &mut self,
        fields: &mut Fields,
        grid: &Grid,
        ctx: &dyn ProcessContext,
    ) -> Result<(), ThermoError> {
        self.refresh_base_state(fields, grid, ctx)?;

        let cells = match grid.order {
            SpatialOrder::Second => calc_buoyancy_tend_2nd(
                &mut fields.wt.data,
                &fields.thl.data,
                &fields.qt.data,
                &self.base.prefh,
                &self.base.thvrefh,
                grid,
            ),
            SpatialOrder::Fourth => calc_buoyancy_tend_4th(
                &mut fields.wt.data,
                &fields.thl.data,
                &fields.qt.data,
                &self.base.prefh,
                &self.base.thvrefh,
                grid,
            ),
        };
        if cells > 0 {
            return Err(ThermoError::Saturation { cells });
        }
        Ok(())
    }

    /// Refresh the base-state pressures from the current horizontal means
    /// when the run asks for an evolving base state. Density and θv land in
    /// scratch so the fixed buoyancy reference survives.
    fn refresh_base_state(
        &mut self,
        fields: &mut Fields,
        grid: &Grid,
        ctx: &dyn ProcessContext,
    ) -> Result<(), ThermoError> {
        if self.update_base_state {
            fields.thl.calc_mean(grid, ctx)?;
            fields.qt.calc_mean(grid, ctx)?;
            calc_base_state(
                grid,
                self.ps,
                &mut self.base.pref,
                &mut self.base.prefh,
                &mut self.scratch.rho,
                &mut self.scratch.rhoh,
                &mut self.scratch.thv,
                &mut self.scratch.thvh,
                &mut self.base.exnref,
                &mut self.base.exnrefh,
                &fields.thl.mean,
                &fields.qt.mean,
            )?;
        }
        Ok(())
    }

    /// Materialize a diagnostic field into `out`. Diagnostics can run before
    /// any `exec`, so the base-state refresh is applied here as well.
    /// Saturation-cap hits in diagnostics are logged, not fatal; the
    /// affected cells carry their best estimates.
    ///
    /// # Errors
    ///
    /// Propagates reduction failures from the base-state refresh.
    pub fn thermo_field(
        &mut self,
        which: ThermoField,
        out: &mut Field3,
        fields: &mut Fields,
        grid: &Grid,
        ctx: &dyn ProcessContext,
    ) -> Result<(), ThermoError> {
        self.refresh_base_state(fields, grid, ctx)?;
        let cells = match which {
            ThermoField::Buoyancy => calc_buoyancy(
                &mut out.data,
                &fields.thl.data,
                &fields.qt.data,
                &self.base.pref,
                &self.base.thvref,
                grid,
            ),
            ThermoField::LiquidWater => {
                out.data.fill(0.0);
                calc_ql_field(&mut out.data, &fields.thl.data, &fields.qt.data, &self.base.pref, grid)
            }
            ThermoField::BruntVaisala => {
                calc_n2(&mut out.data, &fields.thl.data, &grid.dzi, &self.base.thvref, grid);
                0
            }
        };
        if cells > 0 {
            warn!(field = which.name(), cells, "saturation adjustment hit the iteration cap");
        }
        Ok(())
    }

    /// Resolve a diagnostic by name and materialize it.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::UnsupportedField`] for names outside the
    /// supported set and propagates [`Self::thermo_field`] failures.
    pub fn thermo_field_by_name(
        &mut self,
        name: &str,
        out: &mut Field3,
        fields: &mut Fields,
        grid: &Grid,
        ctx: &dyn ProcessContext,
    ) -> Result<(), ThermoError> {
        let which = ThermoField::parse(name)
            .ok_or_else(|| ThermoError::UnsupportedField(name.to_string()))?;
        self.thermo_field(which, out, fields, grid, ctx)
    }

    /// Surface buoyancy: fill `b`'s lowest level, surface plane, and surface
    /// flux plane from the scalar surface values and fluxes.
    pub fn buoyancy_surf(&self, b: &mut Field3, fields: &Fields, grid: &Grid) {
        calc_buoyancy_bot(
            &mut b.data,
            &mut b.bot,
            &fields.thl.data,
            &fields.thl.bot,
            &fields.qt.data,
            &fields.qt.bot,
            &self.base.thvref,
            &self.base.thvrefh,
            grid,
        );
        calc_buoyancy_flux_bot(
            &mut b.fluxbot,
            &fields.thl.bot,
            &fields.thl.fluxbot,
            &fields.qt.bot,
            &fields.qt.fluxbot,
            &self.base.thvrefh,
            grid,
        );
    }

    /// Surface buoyancy flux plane only.
    pub fn buoyancy_flux_bot(&self, bfluxbot: &mut [f64], fields: &Fields, grid: &Grid) {
        calc_buoyancy_flux_bot(
            bfluxbot,
            &fields.thl.bot,
            &fields.thl.fluxbot,
            &fields.qt.bot,
            &fields.qt.fluxbot,
            &self.base.thvrefh,
            grid,
        );
    }

    /// Build a conditional-sampling mask into the statistics registry.
    ///
    /// # Errors
    ///
    /// Propagates boundary-exchange and reduction failures.
    pub fn mask(
        &self,
        which: MaskType,
        stats: &mut Statistics,
        fields: &mut Fields,
        grid: &Grid,
        ctx: &dyn ProcessContext,
    ) -> Result<(), ThermoError> {
        let Fields { thl, qt, tmp0, tmp1, .. } = fields;
        let mut counts = MaskCounts::new(grid.kcells);

        match which {
            MaskType::Ql => {
                tmp0.data.fill(0.0);
                calc_ql_field(&mut tmp0.data, &thl.data, &qt.data, &self.base.pref, grid);
                calc_mask_ql(
                    &mut stats.mask,
                    &mut stats.maskh,
                    &mut counts,
                    &tmp0.data,
                    grid,
                    ctx,
                )?;
            }
            MaskType::QlCore => {
                tmp0.data.fill(0.0);
                calc_ql_field(&mut tmp0.data, &thl.data, &qt.data, &self.base.pref, grid);
                calc_buoyancy(
                    &mut tmp1.data,
                    &thl.data,
                    &qt.data,
                    &self.base.pref,
                    &self.base.thvref,
                    grid,
                );
                calc_mean_profile(&mut tmp1.mean, &tmp1.data, grid, ctx)?;
                calc_mask_ql_core(
                    &mut stats.mask,
                    &mut stats.maskh,
                    &mut counts,
                    &tmp0.data,
                    &tmp1.data,
                    &tmp1.mean,
                    grid,
                    ctx,
                )?;
            }
        }

        stats.nmask.copy_from_slice(&counts.nmask);
        stats.nmaskh.copy_from_slice(&counts.nmaskh);
        Ok(())
    }

    /// Register the statistics this closure produces. The reference density
    /// profiles come from the shared field registry where `new` wrote them.
    pub fn register_stats(&self, stats: &mut Statistics, fields: &Fields) {
        stats.add_fixed_prof("pref", "Hydrostatic pressure", "Pa", Level::Full, &self.base.pref);
        stats.add_fixed_prof("prefh", "Hydrostatic pressure", "Pa", Level::Half, &self.base.prefh);
        stats.add_fixed_prof("rhoref", "Reference density", "kg m-3", Level::Full, &fields.rhoref);
        stats.add_fixed_prof("rhorefh", "Reference density", "kg m-3", Level::Half, &fields.rhorefh);

        stats.add_prof("b", "Buoyancy", "m s-2", Level::Full);
        stats.add_prof("b2", "Buoyancy variance", "m2 s-4", Level::Full);
        stats.add_prof("b3", "Buoyancy third moment", "m3 s-6", Level::Full);
        stats.add_prof("b4", "Buoyancy fourth moment", "m4 s-8", Level::Full);
        stats.add_prof("bgrad", "Buoyancy gradient", "s-2", Level::Half);
        stats.add_prof("bw", "Turbulent buoyancy flux", "m2 s-3", Level::Half);
        stats.add_prof("bdiff", "Diffusive buoyancy flux", "m2 s-3", Level::Half);
        stats.add_prof("bflux", "Total buoyancy flux", "m2 s-3", Level::Half);

        stats.add_prof("ql", "Liquid water mixing ratio", "kg kg-1", Level::Full);
        stats.add_prof("cfrac", "Cloud fraction", "-", Level::Full);

        stats.add_tseries("lwp", "Liquid water path", "kg m-2");
        stats.add_tseries("ccover", "Projected cloud cover", "-");
    }

    /// Compute all registered statistics under the current sampling mask.
    ///
    /// An eddy diffusivity from the active turbulence closure feeds the
    /// diffusive flux; without one the molecular diffusivity of `thl` is
    /// used.
    ///
    /// # Errors
    ///
    /// Propagates reduction failures.
    #[allow(clippy::too_many_lines)]
    pub fn exec_stats(
        &self,
        stats: &mut Statistics,
        fields: &mut Fields,
        diffusivity: Option<&dyn EddyDiffusivity>,
        grid: &Grid,
        ctx: &dyn ProcessContext,
    ) -> Result<(), ThermoError> {
        let Fields { thl, qt, w, tmp0, tmp1, rhoref, .. } = fields;
        let kcells = grid.kcells;

        // Buoyancy over the whole column, ghost levels included, so the
        // half-level reductions can reach below kstart.
        let cells = calc_buoyancy(
            &mut tmp0.data,
            &thl.data,
            &qt.data,
            &self.base.pref,
            &self.base.thvref,
            grid,
        );
        if cells > 0 {
            warn!(cells, "saturation adjustment hit the iteration cap in statistics");
        }

        let mut prof = vec![0.0; kcells];
        let mut bmean = vec![0.0; kcells];

        {
            let (mask, nmask) = stats.sampling(Level::Full);
            stats::calc_mean(&mut bmean, &tmp0.data, mask, nmask, grid, ctx)?;
        }
        stats.store_prof("b", &bmean);

        for (power, name) in [(2, "b2"), (3, "b3"), (4, "b4")] {
            let (mask, nmask) = stats.sampling(Level::Full);
            stats::calc_moment(&mut prof, &tmp0.data, &bmean, power, mask, nmask, grid, ctx)?;
            stats.store_prof(name, &prof);
        }

        let mut bgrad = vec![0.0; kcells];
        {
            let (maskh, nmaskh) = stats.sampling(Level::Half);
            match grid.order {
                SpatialOrder::Second => stats::calc_grad_2nd(
                    &mut bgrad, &tmp0.data, &grid.dzhi, maskh, nmaskh, grid, ctx,
                )?,
                SpatialOrder::Fourth => stats::calc_grad_4th(
                    &mut bgrad, &tmp0.data, &grid.dzhi, maskh, nmaskh, grid, ctx,
                )?,
            }
        }
        stats.store_prof("bgrad", &bgrad);

        // Turbulent flux <w'b'> under the half-level mask.
        let mut bw = vec![0.0; kcells];
        {
            let (maskh, nmaskh) = stats.sampling(Level::Half);
            let mut wmean = vec![0.0; kcells];
            stats::calc_mean(&mut wmean, &w.data, maskh, nmaskh, grid, ctx)?;
            match grid.order {
                SpatialOrder::Second => stats::calc_flux_2nd(
                    &mut bw, &tmp0.data, &bmean, &w.data, &wmean, maskh, nmaskh, grid, ctx,
                )?,
                SpatialOrder::Fourth => stats::calc_flux_4th(
                    &mut bw, &tmp0.data, &bmean, &w.data, &wmean, maskh, nmaskh, grid, ctx,
                )?,
            }
        }
        stats.store_prof("bw", &bw);

        // Diffusive flux: resolved eddy diffusivity when the turbulence
        // closure provides one, molecular diffusivity otherwise. Fourth
        // order always uses the molecular diffusivity and its own stencil.
        let mut bdiff = vec![0.0; kcells];
        match (grid.order, diffusivity) {
            (SpatialOrder::Second, Some(eddy)) => {
                calc_buoyancy_flux_bot(
                    &mut tmp0.fluxbot,
                    &thl.bot,
                    &thl.fluxbot,
                    &qt.bot,
                    &qt.fluxbot,
                    &self.base.thvrefh,
                    grid,
                );
                tmp0.fluxtop.fill(0.0);
                let (maskh, nmaskh) = stats.sampling(Level::Half);
                stats::calc_diff_2nd(
                    &mut bdiff,
                    &tmp0.data,
                    eddy.eddy_viscosity(),
                    eddy.turbulent_prandtl(),
                    &grid.dzhi,
                    &tmp0.fluxbot,
                    &tmp0.fluxtop,
                    maskh,
                    nmaskh,
                    grid,
                    ctx,
                )?;
            }
            (SpatialOrder::Fourth, _) => {
                let (maskh, nmaskh) = stats.sampling(Level::Half);
                stats::calc_diff_4th(
                    &mut bdiff, &tmp0.data, thl.visc, &grid.dzhi, maskh, nmaskh, grid, ctx,
                )?;
            }
            (SpatialOrder::Second, None) => {
                for k in 0..kcells {
                    bdiff[k] = -thl.visc * bgrad[k];
                }
            }
        }
        stats.store_prof("bdiff", &bdiff);

        let mut bflux = vec![0.0; kcells];
        stats::add_fluxes(&mut bflux, &bw, &bdiff);
        stats.store_prof("bflux", &bflux);

        // Liquid water and the cloud summaries.
        tmp1.data.fill(0.0);
        let cells = calc_ql_field(&mut tmp1.data, &thl.data, &qt.data, &self.base.pref, grid);
        if cells > 0 {
            warn!(cells, "saturation adjustment hit the iteration cap in statistics");
        }

        {
            let (mask, nmask) = stats.sampling(Level::Full);
            stats::calc_mean(&mut prof, &tmp1.data, mask, nmask, grid, ctx)?;
        }
        stats.store_prof("ql", &prof);

        {
            let (mask, nmask) = stats.sampling(Level::Full);
            stats::calc_count(&mut prof, &tmp1.data, 0.0, mask, nmask, grid, ctx)?;
        }
        stats.store_prof("cfrac", &prof);

        let lwp = stats::calc_path(&tmp1.data, rhoref, &grid.dz, grid, ctx)?;
        stats.store_tseries("lwp", lwp);

        let ccover = stats::calc_cover(&tmp1.data, 0.0, grid, ctx)?;
        stats.store_tseries("ccover", ccover);

        Ok(())
    }

    /// Produce every validated cross section into the sink.
    ///
    /// # Errors
    ///
    /// Propagates sink and boundary-exchange failures.
    pub fn exec_cross(
        &self,
        sink: &mut dyn CrossSink,
        fields: &mut Fields,
        grid: &Grid,
        ctx: &dyn ProcessContext,
    ) -> Result<(), ThermoError> {
        let Fields { thl, qt, tmp0, tmp1, rhoref, .. } = fields;

        for name in &self.crosslist {
            match name.as_str() {
                "b" => {
                    calc_buoyancy(
                        &mut tmp0.data,
                        &thl.data,
                        &qt.data,
                        &self.base.pref,
                        &self.base.thvref,
                        grid,
                    );
                    ctx.boundary_cyclic(&mut tmp0.data, grid)?;
                    sink.write_volume("b", &tmp0.data, grid)?;
                }
                "blngrad" => {
                    calc_buoyancy(
                        &mut tmp0.data,
                        &thl.data,
                        &qt.data,
                        &self.base.pref,
                        &self.base.thvref,
                        grid,
                    );
                    ctx.boundary_cyclic(&mut tmp0.data, grid)?;
                    cross::calc_lngrad(&mut tmp1.data, &tmp0.data, grid);
                    sink.write_volume("blngrad", &tmp1.data, grid)?;
                }
                "ql" => {
                    tmp0.data.fill(0.0);
                    calc_ql_field(&mut tmp0.data, &thl.data, &qt.data, &self.base.pref, grid);
                    ctx.boundary_cyclic(&mut tmp0.data, grid)?;
                    sink.write_volume("ql", &tmp0.data, grid)?;
                }
                "qlpath" => {
                    tmp0.data.fill(0.0);
                    calc_ql_field(&mut tmp0.data, &thl.data, &qt.data, &self.base.pref, grid);
                    cross::calc_path_plane(&mut tmp1.bot, &tmp0.data, rhoref, grid);
                    sink.write_plane("qlpath", &tmp1.bot, grid)?;
                }
                "bbot" => {
                    calc_buoyancy_bot(
                        &mut tmp0.data,
                        &mut tmp0.bot,
                        &thl.data,
                        &thl.bot,
                        &qt.data,
                        &qt.bot,
                        &self.base.thvref,
                        &self.base.thvrefh,
                        grid,
                    );
                    sink.write_plane("bbot", &tmp0.bot, grid)?;
                }
                "bfluxbot" => {
                    calc_buoyancy_flux_bot(
                        &mut tmp0.fluxbot,
                        &thl.bot,
                        &thl.fluxbot,
                        &qt.bot,
                        &qt.fluxbot,
                        &self.base.thvrefh,
                        grid,
                    );
                    sink.write_plane("bfluxbot", &tmp0.fluxbot, grid)?;
                }
                // The list was validated at setup.
                _ => {}
            }
        }
        Ok(())
    }
}

/// Extend an interior sounding of length `kmax` into a full column profile
/// of length `kcells`, linearly extrapolated through the boundaries.
fn extend_sounding(full: &mut [f64], interior: &[f64], grid: &Grid) {
    for (k, &value) in interior.iter().enumerate() {
        full[grid.kstart + k] = value;
    }
    let bot_slope =
        (full[grid.kstart + 1] - full[grid.kstart]) / (grid.z[grid.kstart + 1] - grid.z[grid.kstart]);
    for k in (0..grid.kstart).rev() {
        full[k] = full[grid.kstart] + bot_slope * (grid.z[k] - grid.z[grid.kstart]);
    }
    let top_slope = (full[grid.kend - 1] - full[grid.kend - 2])
        / (grid.z[grid.kend - 1] - grid.z[grid.kend - 2]);
    for k in grid.kend..grid.kcells {
        full[k] = full[grid.kend - 1] + top_slope * (grid.z[k] - grid.z[grid.kend - 1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::P0;
    use crate::exchange::Serial;
    use approx::assert_relative_eq;

    fn soundings(grid: &Grid) -> (Vec<f64>, Vec<f64>) {
        let mut thl = Vec::with_capacity(grid.kmax);
        let mut qt = Vec::with_capacity(grid.kmax);
        for k in 0..grid.kmax {
            let z = grid.z[grid.kstart + k];
            thl.push(300.0 + 0.003 * z);
            qt.push((0.008 - 2.0e-6 * z).max(0.0));
        }
        (thl, qt)
    }

    fn setup(order: SpatialOrder) -> (Grid, Fields, ThermoMoist) {
        let grid = Grid::uniform(4, 4, 16, 400.0, 400.0, 1600.0, order);
        let mut fields = Fields::new(&grid);
        let (thl, qt) = soundings(&grid);
        Fields::init_from_profile(&mut fields.thl, &thl, &grid);
        Fields::init_from_profile(&mut fields.qt, &qt, &grid);
        let config = ThermoConfig::from_toml("ps = 1.0e5").unwrap();
        let thermo = ThermoMoist::new(&config, &grid, &mut fields, &thl, &qt).unwrap();
        // Vertical ghost cells of the scalars follow the sounding.
        for k in 0..grid.kcells {
            fields.thl.data[k * grid.ijcells..(k + 1) * grid.ijcells]
                .fill(thermo.base().thl0[k]);
            fields.qt.data[k * grid.ijcells..(k + 1) * grid.ijcells].fill(thermo.base().qt0[k]);
        }
        (grid, fields, thermo)
    }

    #[test]
    fn new_rejects_short_soundings() {
        let grid = Grid::uniform(4, 4, 16, 400.0, 400.0, 1600.0, SpatialOrder::Second);
        let mut fields = Fields::new(&grid);
        let config = ThermoConfig::from_toml("ps = 1.0e5").unwrap();
        let err = ThermoMoist::new(&config, &grid, &mut fields, &[300.0], &[0.008]).unwrap_err();
        assert!(matches!(err, ThermoError::Config(_)));
    }

    #[test]
    fn new_fills_reference_density() {
        let (grid, fields, _) = setup(SpatialOrder::Second);
        for k in grid.kstart..grid.kend {
            assert!(fields.rhoref[k] > 0.9 && fields.rhoref[k] < 1.3);
        }
        assert_relative_eq!(
            fields.rhorefh[grid.kstart],
            P0 / (crate::constants::RD * 301.46),
            max_relative = 1e-3
        );
    }

    #[test]
    fn sounding_extension_is_linear_through_the_surface() {
        let (grid, _, thermo) = setup(SpatialOrder::Second);
        let thl0 = &thermo.base().thl0;
        let slope = (thl0[grid.kstart + 1] - thl0[grid.kstart])
            / (grid.z[grid.kstart + 1] - grid.z[grid.kstart]);
        assert_relative_eq!(slope, 0.003, max_relative = 1e-10);
        let ghost_slope =
            (thl0[grid.kstart] - thl0[grid.kstart - 1]) / (grid.z[grid.kstart] - grid.z[grid.kstart - 1]);
        assert_relative_eq!(ghost_slope, 0.003, max_relative = 1e-10);
    }

    #[test]
    fn exec_forces_nothing_on_a_balanced_column() {
        for order in [SpatialOrder::Second, SpatialOrder::Fourth] {
            let (grid, mut fields, mut thermo) = setup(order);
            thermo.exec(&mut fields, &grid, &Serial).unwrap();
            // Horizontally uniform column in its own reference state: the
            // buoyancy force is identically zero.
            for k in grid.kstart + 1..grid.kend {
                let v = fields.wt.data[grid.idx(grid.istart, grid.jstart, k)];
                assert!(v.abs() < 1e-10, "order {order:?}, level {k}: wt = {v}");
            }
        }
    }

    #[test]
    fn exec_forces_a_warm_bubble_upward() {
        let (grid, mut fields, mut thermo) = setup(SpatialOrder::Second);
        let k = grid.kstart + 4;
        for dk in 0..2 {
            let idx = grid.idx(grid.istart + 1, grid.jstart + 1, k + dk);
            fields.thl.data[idx] += 2.0;
        }
        thermo.exec(&mut fields, &grid, &Serial).unwrap();
        assert!(fields.wt.data[grid.idx(grid.istart + 1, grid.jstart + 1, k + 1)] > 0.0);
        assert!(fields.wt.data[grid.idx(grid.istart, grid.jstart, k + 1)].abs() < 1e-10);
    }

    #[test]
    fn unknown_diagnostic_name_is_an_unsupported_field() {
        let (grid, mut fields, mut thermo) = setup(SpatialOrder::Second);
        let mut out = Field3::new(&grid, "tmp", "-");
        let err = thermo
            .thermo_field_by_name("vorticity", &mut out, &mut fields, &grid, &Serial)
            .unwrap_err();
        assert!(matches!(err, ThermoError::UnsupportedField(_)));
        thermo
            .thermo_field_by_name("ql", &mut out, &mut fields, &grid, &Serial)
            .unwrap();
    }

    #[test]
    fn diagnostics_refresh_an_evolving_base_state() {
        let grid = Grid::uniform(4, 4, 16, 400.0, 400.0, 1600.0, SpatialOrder::Second);
        let mut fields = Fields::new(&grid);
        let (thl, qt) = soundings(&grid);
        let config = ThermoConfig::from_toml("ps = 1.0e5\nupdate_base_state = true").unwrap();
        let mut thermo = ThermoMoist::new(&config, &grid, &mut fields, &thl, &qt).unwrap();
        for k in 0..grid.kcells {
            fields.thl.data[k * grid.ijcells..(k + 1) * grid.ijcells]
                .fill(thermo.base().thl0[k]);
            fields.qt.data[k * grid.ijcells..(k + 1) * grid.ijcells].fill(thermo.base().qt0[k]);
        }
        let p_before = thermo.base().pref[grid.kend - 1];
        for v in fields.thl.data.iter_mut() {
            *v += 5.0;
        }
        // A field request before any step must see the refreshed pressures.
        let mut out = Field3::new(&grid, "tmp", "-");
        thermo
            .thermo_field(ThermoField::Buoyancy, &mut out, &mut fields, &grid, &Serial)
            .unwrap();
        assert!(thermo.base().pref[grid.kend - 1] > p_before);
    }

    #[test]
    fn fixed_profiles_are_registered_under_reference_names() {
        let (grid, fields, thermo) = setup(SpatialOrder::Second);
        let mut stats = Statistics::new(&grid);
        thermo.register_stats(&mut stats, &fields);
        assert_eq!(stats.prof("pref").unwrap().data[grid.kstart], thermo.base().pref[grid.kstart]);
        assert_eq!(
            stats.prof("prefh").unwrap().data[grid.kstart],
            thermo.base().prefh[grid.kstart]
        );
        assert_eq!(stats.prof("rhoref").unwrap().data[grid.kstart], fields.rhoref[grid.kstart]);
    }

    #[test]
    fn update_base_state_tracks_a_warming_column() {
        let grid = Grid::uniform(4, 4, 16, 400.0, 400.0, 1600.0, SpatialOrder::Second);
        let mut fields = Fields::new(&grid);
        let (thl, qt) = soundings(&grid);
        let config = ThermoConfig::from_toml("ps = 1.0e5\nupdate_base_state = true").unwrap();
        let mut thermo = ThermoMoist::new(&config, &grid, &mut fields, &thl, &qt).unwrap();
        for k in 0..grid.kcells {
            fields.thl.data[k * grid.ijcells..(k + 1) * grid.ijcells]
                .fill(thermo.base().thl0[k]);
            fields.qt.data[k * grid.ijcells..(k + 1) * grid.ijcells].fill(thermo.base().qt0[k]);
        }
        let p_before = thermo.base().pref[grid.kend - 1];
        let thv_before = thermo.base().thvref[grid.kstart];
        // Warm the whole column; a warmer column is less dense, so the
        // refreshed pressure aloft rises.
        for v in fields.thl.data.iter_mut() {
            *v += 5.0;
        }
        thermo.exec(&mut fields, &grid, &Serial).unwrap();
        assert!(thermo.base().pref[grid.kend - 1] > p_before);
        // The fixed buoyancy reference is untouched by the refresh.
        assert_relative_eq!(thermo.base().thvref[grid.kstart], thv_before);
    }

    #[test]
    fn stats_of_a_clear_column_have_no_cloud() {
        let (grid, mut fields, thermo) = setup(SpatialOrder::Second);
        let mut stats = Statistics::new(&grid);
        thermo.register_stats(&mut stats, &fields);
        thermo.exec_stats(&mut stats, &mut fields, None, &grid, &Serial).unwrap();
        assert_eq!(stats.tseries("lwp").unwrap().value, 0.0);
        assert_eq!(stats.tseries("ccover").unwrap().value, 0.0);
        for k in grid.kstart..grid.kend {
            assert_eq!(stats.prof("cfrac").unwrap().data[k], 0.0);
            assert_eq!(stats.prof("ql").unwrap().data[k], 0.0);
        }
    }

    #[test]
    fn saturated_column_produces_cloud_statistics() {
        let (grid, mut fields, thermo) = setup(SpatialOrder::Second);
        // Push one column well past saturation in the middle of the domain.
        for k in grid.kstart + 4..grid.kstart + 8 {
            let idx = grid.idx(grid.istart, grid.jstart, k);
            fields.qt.data[idx] = 0.03;
        }
        let mut stats = Statistics::new(&grid);
        thermo.register_stats(&mut stats, &fields);
        thermo.exec_stats(&mut stats, &mut fields, None, &grid, &Serial).unwrap();
        assert!(stats.tseries("lwp").unwrap().value > 0.0);
        assert_relative_eq!(stats.tseries("ccover").unwrap().value, 1.0 / 16.0);
        let cfrac = &stats.prof("cfrac").unwrap().data;
        assert!(cfrac[grid.kstart + 5] > 0.0);
        assert_eq!(cfrac[grid.kstart], 0.0);
    }

    #[test]
    fn cross_sections_cover_the_validated_list() {
        let (grid, mut fields, _) = setup(SpatialOrder::Second);
        let config = ThermoConfig::from_toml(
            "ps = 1.0e5\ncrosslist = [\"b\", \"ql\", \"qlpath\", \"bbot\", \"bfluxbot\", \"unknown\"]",
        )
        .unwrap();
        let (thl, qt) = soundings(&grid);
        let thermo = ThermoMoist::new(&config, &grid, &mut fields, &thl, &qt).unwrap();
        assert_eq!(thermo.crosslist(), ["b", "bbot", "bfluxbot", "ql", "qlpath"]);
        let mut sink = cross::MemorySink::default();
        thermo.exec_cross(&mut sink, &mut fields, &grid, &Serial).unwrap();
        assert!(sink.volumes.contains_key("b"));
        assert!(sink.volumes.contains_key("ql"));
        assert!(sink.planes.contains_key("qlpath"));
        assert!(sink.planes.contains_key("bbot"));
        assert!(sink.planes.contains_key("bfluxbot"));
    }
}

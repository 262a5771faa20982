//! Hydrostatically balanced reference atmosphere
//!
//! The builder integrates the discrete hydrostatic relation
//! `dΠ/dz = −g/(cp·θv)` upward from the surface, alternating between full
//! and half levels: the pressure at each next level follows from the virtual
//! potential temperature at the level below, and θv at each level follows
//! from a saturation adjustment at that level's pressure. The resulting
//! profiles (pressure, Exner, θv, density at both staggerings) are the
//! process-local reference state read by every buoyancy call site.

use crate::constants::{CP, GRAV, LV, P0, RD, RV};
use crate::error::ThermoError;
use crate::grid::{Grid, SpatialOrder};
use crate::thermo::functions::{exner, interp2, interp4};
use crate::thermo::saturation::sat_adjust;

/// Reference-state profiles, allocated once at setup with length `kcells`
/// and never resized. The initial `thl0`/`qt0` profiles keep the ghost-cell
/// mirror extrapolation applied at creation.
#[derive(Debug, Clone)]
pub struct BaseState {
    /// Full-level pressure (Pa).
    pub pref: Vec<f64>,
    /// Half-level pressure (Pa).
    pub prefh: Vec<f64>,
    /// Full-level Exner function.
    pub exnref: Vec<f64>,
    /// Half-level Exner function.
    pub exnrefh: Vec<f64>,
    /// Full-level virtual potential temperature (K).
    pub thvref: Vec<f64>,
    /// Half-level virtual potential temperature (K).
    pub thvrefh: Vec<f64>,
    /// Initial liquid-water potential temperature profile (K).
    pub thl0: Vec<f64>,
    /// Initial total water profile (kg/kg).
    pub qt0: Vec<f64>,
}

impl BaseState {
    /// Allocate zeroed profiles for a column of `kcells` levels.
    #[must_use]
    pub fn new(kcells: usize) -> Self {
        Self {
            pref: vec![0.0; kcells],
            prefh: vec![0.0; kcells],
            exnref: vec![0.0; kcells],
            exnrefh: vec![0.0; kcells],
            thvref: vec![0.0; kcells],
            thvrefh: vec![0.0; kcells],
            thl0: vec![0.0; kcells],
            qt0: vec![0.0; kcells],
        }
    }
}

/// Virtual potential temperature from adjusted state:
/// `(thl + Lv·ql/(cp·Π))·(1 − (1 − Rv/Rd)·qt − (Rv/Rd)·ql)`.
#[inline]
fn virtual_theta(thl: f64, qt: f64, ql: f64, ex: f64) -> f64 {
    (thl + LV * ql / (CP * ex)) * (1.0 - (1.0 - RV / RD) * qt - RV / RD * ql)
}

/// One hydrostatic integration step: solve
/// `p^(Rd/cp) = p_below^(Rd/cp) − g·p0^(Rd/cp)·Δz/(cp·θv)` for the pressure
/// at the next level. The base of the fractional power is checked before
/// `powf`; a non-positive base means the input profile left the physically
/// meaningful range.
fn integrate_pressure(p_below: f64, dz: f64, thv: f64, level: usize) -> Result<f64, ThermoError> {
    let rdcp = RD / CP;
    let base = p_below.powf(rdcp) - GRAV * P0.powf(rdcp) * dz / (CP * thv);
    if base <= 0.0 {
        return Err(ThermoError::PressureBase { level });
    }
    Ok(base.powf(1.0 / rdcp))
}

/// Build the reference state from horizontally averaged `thl`/`qt` profiles
/// (ghost cells filled) and the surface pressure `ps`.
///
/// Output arrays are all of length `kcells`; density and θv may be scratch
/// buffers when only the pressure/Exner profiles should be refreshed.
///
/// # Errors
///
/// Returns [`ThermoError::PressureBase`] when the hydrostatic integration
/// loses pressure positivity.
#[allow(clippy::too_many_arguments)]
pub fn calc_base_state(
    grid: &Grid,
    ps: f64,
    pref: &mut [f64],
    prefh: &mut [f64],
    rho: &mut [f64],
    rhoh: &mut [f64],
    thv: &mut [f64],
    thvh: &mut [f64],
    ex: &mut [f64],
    exh: &mut [f64],
    thlmean: &[f64],
    qtmean: &[f64],
) -> Result<(), ThermoError> {
    let kstart = grid.kstart;
    let kend = grid.kend;

    let (ssurf, qtsurf) = match grid.order {
        SpatialOrder::Second => (
            interp2(thlmean[kstart - 1], thlmean[kstart]),
            interp2(qtmean[kstart - 1], qtmean[kstart]),
        ),
        SpatialOrder::Fourth => (
            interp4(
                thlmean[kstart - 2],
                thlmean[kstart - 1],
                thlmean[kstart],
                thlmean[kstart + 1],
            ),
            interp4(
                qtmean[kstart - 2],
                qtmean[kstart - 1],
                qtmean[kstart],
                qtmean[kstart + 1],
            ),
        ),
    };

    // Surface half level from the surface pressure directly.
    exh[kstart] = exner(ps);
    let ql = sat_adjust(ssurf, qtsurf, ps, exh[kstart]).ql;
    thvh[kstart] = virtual_theta(ssurf, qtsurf, ql, exh[kstart]);
    prefh[kstart] = ps;
    rhoh[kstart] = ps / (RD * exh[kstart] * thvh[kstart]);

    // First full-level pressure from the surface θv over the height of the
    // first cell center.
    pref[kstart] = integrate_pressure(ps, grid.z[kstart], thvh[kstart], kstart)?;

    for k in kstart + 1..=kend {
        // Full level below the face zh[k].
        ex[k - 1] = exner(pref[k - 1]);
        let ql = sat_adjust(thlmean[k - 1], qtmean[k - 1], pref[k - 1], ex[k - 1]).ql;
        thv[k - 1] = virtual_theta(thlmean[k - 1], qtmean[k - 1], ql, ex[k - 1]);
        rho[k - 1] = pref[k - 1] / (RD * ex[k - 1] * thv[k - 1]);

        // Half-level pressure at zh[k] over one full grid spacing.
        prefh[k] = integrate_pressure(prefh[k - 1], grid.dz[k - 1], thv[k - 1], k)?;

        // Conserved variables interpolated to the face.
        let (si, qti) = match grid.order {
            SpatialOrder::Second => (
                interp2(thlmean[k - 1], thlmean[k]),
                interp2(qtmean[k - 1], qtmean[k]),
            ),
            SpatialOrder::Fourth => (
                interp4(thlmean[k - 2], thlmean[k - 1], thlmean[k], thlmean[k + 1]),
                interp4(qtmean[k - 2], qtmean[k - 1], qtmean[k], qtmean[k + 1]),
            ),
        };

        exh[k] = exner(prefh[k]);
        let qli = sat_adjust(si, qti, prefh[k], exh[k]).ql;
        thvh[k] = virtual_theta(si, qti, qli, exh[k]);
        rhoh[k] = prefh[k] / (RD * exh[k] * thvh[k]);

        // Full-level pressure at z[k] over the half spacing.
        if k < kend {
            pref[k] = integrate_pressure(pref[k - 1], grid.dzh[k], thvh[k], k)?;
        }
    }

    // Ghost-cell pressures and θv by extrapolation through the boundary
    // faces; the buoyancy diagnostics evaluate the whole column, so the
    // ghost-level reference state must be populated too.
    match grid.order {
        SpatialOrder::Second => {
            pref[kstart - 1] = 2.0 * prefh[kstart] - pref[kstart];
            pref[kend] = 2.0 * prefh[kend] - pref[kend - 1];
            thv[kstart - 1] = 2.0 * thvh[kstart] - thv[kstart];
            thv[kend] = 2.0 * thvh[kend] - thv[kend - 1];
        }
        SpatialOrder::Fourth => {
            pref[kstart - 1] =
                (8.0 / 3.0) * prefh[kstart] - 2.0 * pref[kstart] + (1.0 / 3.0) * pref[kstart + 1];
            pref[kstart - 2] = 8.0 * prefh[kstart] - 9.0 * pref[kstart] + 2.0 * pref[kstart + 1];
            pref[kend] =
                (8.0 / 3.0) * prefh[kend] - 2.0 * pref[kend - 1] + (1.0 / 3.0) * pref[kend - 2];
            pref[kend + 1] = 8.0 * prefh[kend] - 9.0 * pref[kend - 1] + 2.0 * pref[kend - 2];
            thv[kstart - 1] = 2.0 * thvh[kstart] - thv[kstart];
            thv[kstart - 2] = 2.0 * thv[kstart - 1] - thv[kstart];
            thv[kend] = 2.0 * thvh[kend] - thv[kend - 1];
            thv[kend + 1] = 2.0 * thv[kend] - thv[kend - 1];
        }
    }
    for k in (0..kstart).chain(kend..grid.kcells) {
        ex[k] = exner(pref[k]);
        rho[k] = pref[k] / (RD * ex[k] * thv[k]);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::P0;
    use approx::assert_relative_eq;

    fn stable_profiles(grid: &Grid) -> (Vec<f64>, Vec<f64>) {
        // Weakly stable: θl increasing with height, drying with height.
        let mut thl = vec![0.0; grid.kcells];
        let mut qt = vec![0.0; grid.kcells];
        for k in 0..grid.kcells {
            thl[k] = 300.0 + 0.003 * grid.z[k];
            qt[k] = (0.008 - 2.0e-6 * grid.z[k]).max(0.0);
        }
        (thl, qt)
    }

    fn build(grid: &Grid, ps: f64) -> BaseState {
        let (thl, qt) = stable_profiles(grid);
        let mut bs = BaseState::new(grid.kcells);
        let mut rho = vec![0.0; grid.kcells];
        let mut rhoh = vec![0.0; grid.kcells];
        calc_base_state(
            grid,
            ps,
            &mut bs.pref,
            &mut bs.prefh,
            &mut rho,
            &mut rhoh,
            &mut bs.thvref,
            &mut bs.thvrefh,
            &mut bs.exnref,
            &mut bs.exnrefh,
            &thl,
            &qt,
        )
        .unwrap();
        bs
    }

    #[test]
    fn pressure_decreases_strictly_with_height() {
        for order in [SpatialOrder::Second, SpatialOrder::Fourth] {
            let grid = Grid::uniform(4, 4, 32, 400.0, 400.0, 3200.0, order);
            let bs = build(&grid, P0);
            for k in grid.kstart..grid.kend - 1 {
                assert!(bs.pref[k + 1] < bs.pref[k], "pref must drop, order {order:?}");
            }
            for k in grid.kstart..grid.kend {
                assert!(bs.prefh[k + 1] < bs.prefh[k], "prefh must drop, order {order:?}");
            }
        }
    }

    #[test]
    fn surface_values_match_surface_pressure() {
        let grid = Grid::uniform(4, 4, 16, 400.0, 400.0, 1600.0, SpatialOrder::Second);
        let bs = build(&grid, P0);
        assert_relative_eq!(bs.prefh[grid.kstart], P0);
        assert_relative_eq!(bs.exnrefh[grid.kstart], 1.0, max_relative = 1e-14);
        // Unsaturated 300 K, 8 g/kg surface air: θv ≈ 300·(1 + 0.61·0.008).
        assert_relative_eq!(bs.thvrefh[grid.kstart], 301.46, max_relative = 1e-3);
    }

    #[test]
    fn density_follows_ideal_gas_with_virtual_temperature() {
        let grid = Grid::uniform(4, 4, 16, 400.0, 400.0, 1600.0, SpatialOrder::Second);
        let (thl, qt) = stable_profiles(&grid);
        let mut bs = BaseState::new(grid.kcells);
        let mut rho = vec![0.0; grid.kcells];
        let mut rhoh = vec![0.0; grid.kcells];
        calc_base_state(
            &grid,
            P0,
            &mut bs.pref,
            &mut bs.prefh,
            &mut rho,
            &mut rhoh,
            &mut bs.thvref,
            &mut bs.thvrefh,
            &mut bs.exnref,
            &mut bs.exnrefh,
            &thl,
            &qt,
        )
        .unwrap();
        for k in grid.kstart..grid.kend {
            let expect = bs.pref[k] / (RD * bs.exnref[k] * bs.thvref[k]);
            assert_relative_eq!(rho[k], expect, max_relative = 1e-12);
            assert!(rho[k] > 0.5 && rho[k] < 1.5, "density out of range at {k}");
        }
    }

    #[test]
    fn pathological_profile_is_rejected_not_powed() {
        // A tiny θv over a huge spacing drives the fractional-power base
        // negative; the builder must reject instead of producing NaN.
        let grid = Grid::uniform(4, 4, 4, 400.0, 400.0, 2.0e6, SpatialOrder::Second);
        let thl = vec![1.0; grid.kcells];
        let qt = vec![0.0; grid.kcells];
        let mut bs = BaseState::new(grid.kcells);
        let mut rho = vec![0.0; grid.kcells];
        let mut rhoh = vec![0.0; grid.kcells];
        let err = calc_base_state(
            &grid,
            P0,
            &mut bs.pref,
            &mut bs.prefh,
            &mut rho,
            &mut rhoh,
            &mut bs.thvref,
            &mut bs.thvrefh,
            &mut bs.exnref,
            &mut bs.exnrefh,
            &thl,
            &qt,
        )
        .unwrap_err();
        assert!(matches!(err, ThermoError::PressureBase { .. }));
    }

    #[test]
    fn ghost_reference_state_is_populated_at_both_boundaries() {
        for order in [SpatialOrder::Second, SpatialOrder::Fourth] {
            let grid = Grid::uniform(4, 4, 16, 400.0, 400.0, 1600.0, order);
            let (thl, qt) = stable_profiles(&grid);
            let mut bs = BaseState::new(grid.kcells);
            let mut rho = vec![0.0; grid.kcells];
            let mut rhoh = vec![0.0; grid.kcells];
            calc_base_state(
                &grid,
                P0,
                &mut bs.pref,
                &mut bs.prefh,
                &mut rho,
                &mut rhoh,
                &mut bs.thvref,
                &mut bs.thvrefh,
                &mut bs.exnref,
                &mut bs.exnrefh,
                &thl,
                &qt,
            )
            .unwrap();
            // Every full level carries a usable reference state, ghost
            // levels included.
            for k in 0..grid.kcells {
                assert!(bs.thvref[k] > 250.0 && bs.thvref[k] < 350.0, "thvref[{k}], {order:?}");
                assert!(rho[k] > 0.5 && rho[k] < 1.5, "rho[{k}], {order:?}");
                assert!(bs.exnref[k].is_finite(), "exnref[{k}], {order:?}");
            }
            // θv mirrors through the boundary faces.
            assert_relative_eq!(
                bs.thvref[grid.kstart - 1],
                2.0 * bs.thvrefh[grid.kstart] - bs.thvref[grid.kstart],
                max_relative = 1e-14
            );
            assert_relative_eq!(
                bs.thvref[grid.kend],
                2.0 * bs.thvrefh[grid.kend] - bs.thvref[grid.kend - 1],
                max_relative = 1e-14
            );
        }
    }

    #[test]
    fn ghost_pressure_extrapolation_is_linear_for_second_order() {
        let grid = Grid::uniform(4, 4, 16, 400.0, 400.0, 1600.0, SpatialOrder::Second);
        let bs = build(&grid, P0);
        assert_relative_eq!(
            bs.pref[grid.kstart - 1],
            2.0 * bs.prefh[grid.kstart] - bs.pref[grid.kstart],
            max_relative = 1e-14
        );
    }
}

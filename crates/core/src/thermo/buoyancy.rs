//! Buoyancy evaluation and the vertical-velocity forcing
//!
//! The tendency integrators walk the interior half levels from one above the
//! bottom boundary to one below the top. The Exner function is computed once
//! per level (the reference pressure is a horizontal mean), every horizontal
//! column is independent, and rows are processed in parallel with rayon.
//! Vertical levels stay sequential only because of the per-level Exner
//! evaluation; there is no loop-carried dependency inside a level.
//!
//! Every kernel returns the number of cells whose saturation adjustment hit
//! the iteration cap; the orchestrating step aggregates those counts.

use rayon::prelude::*;

use crate::constants::GRAV;
use crate::grid::Grid;
use crate::thermo::functions::{bu, bu_flux_no_ql, bu_no_ql, exner, interp2, interp4};
use crate::thermo::saturation::{ql_quick, sat_adjust};

/// Add the buoyancy force to the vertical-velocity tendency, second-order
/// stencils. Accumulates into `wt`, never overwrites.
pub fn calc_buoyancy_tend_2nd(
    wt: &mut [f64],
    thl: &[f64],
    qt: &[f64],
    prefh: &[f64],
    thvrefh: &[f64],
    grid: &Grid,
) -> usize {
    let ij = grid.ijcells;
    let mut nonconverged = 0;

    for k in grid.kstart + 1..grid.kend {
        let ph = prefh[k];
        let exnh = exner(ph);
        let thvh = thvrefh[k];
        let thl_below = &thl[(k - 1) * ij..k * ij];
        let thl_at = &thl[k * ij..(k + 1) * ij];
        let qt_below = &qt[(k - 1) * ij..k * ij];
        let qt_at = &qt[k * ij..(k + 1) * ij];
        let wt_at = &mut wt[k * ij..(k + 1) * ij];

        nonconverged += wt_at
            .par_chunks_mut(grid.icells)
            .enumerate()
            .map(|(j, row)| {
                if j < grid.jstart || j >= grid.jend {
                    return 0;
                }
                let base = j * grid.icells;
                let mut bad = 0;
                for i in grid.istart..grid.iend {
                    let idx = base + i;
                    let sh = interp2(thl_below[idx], thl_at[idx]);
                    let qth = interp2(qt_below[idx], qt_at[idx]);
                    let (ql, ok) = ql_quick(sh, qth, ph, exnh);
                    if !ok {
                        bad += 1;
                    }
                    row[i] += bu(ph, sh, qth, ql, thvh);
                }
                bad
            })
            .sum::<usize>();
    }
    nonconverged
}

/// Fourth-order variant: 4-point asymmetric vertical stencil with weights
/// (−1, 9, 9, −1)/16 reading two levels below and one above the face.
pub fn calc_buoyancy_tend_4th(
    wt: &mut [f64],
    thl: &[f64],
    qt: &[f64],
    prefh: &[f64],
    thvrefh: &[f64],
    grid: &Grid,
) -> usize {
    let ij = grid.ijcells;
    let mut nonconverged = 0;

    for k in grid.kstart + 1..grid.kend {
        let ph = prefh[k];
        let exnh = exner(ph);
        let thvh = thvrefh[k];
        let thl_mm = &thl[(k - 2) * ij..(k - 1) * ij];
        let thl_m = &thl[(k - 1) * ij..k * ij];
        let thl_0 = &thl[k * ij..(k + 1) * ij];
        let thl_p = &thl[(k + 1) * ij..(k + 2) * ij];
        let qt_mm = &qt[(k - 2) * ij..(k - 1) * ij];
        let qt_m = &qt[(k - 1) * ij..k * ij];
        let qt_0 = &qt[k * ij..(k + 1) * ij];
        let qt_p = &qt[(k + 1) * ij..(k + 2) * ij];
        let wt_at = &mut wt[k * ij..(k + 1) * ij];

        nonconverged += wt_at
            .par_chunks_mut(grid.icells)
            .enumerate()
            .map(|(j, row)| {
                if j < grid.jstart || j >= grid.jend {
                    return 0;
                }
                let base = j * grid.icells;
                let mut bad = 0;
                for i in grid.istart..grid.iend {
                    let idx = base + i;
                    let sh = interp4(thl_mm[idx], thl_m[idx], thl_0[idx], thl_p[idx]);
                    let qth = interp4(qt_mm[idx], qt_m[idx], qt_0[idx], qt_p[idx]);
                    let (ql, ok) = ql_quick(sh, qth, ph, exnh);
                    if !ok {
                        bad += 1;
                    }
                    row[i] += bu(ph, sh, qth, ql, thvh);
                }
                bad
            })
            .sum::<usize>();
    }
    nonconverged
}

/// Buoyancy over the full column including ghost levels, written into `b`.
/// Uses the estimate-then-solve shortcut per cell.
pub fn calc_buoyancy(
    b: &mut [f64],
    thl: &[f64],
    qt: &[f64],
    pref: &[f64],
    thvref: &[f64],
    grid: &Grid,
) -> usize {
    let ij = grid.ijcells;
    let mut nonconverged = 0;

    for k in 0..grid.kcells {
        let p = pref[k];
        let ex = exner(p);
        let thv = thvref[k];
        let thl_at = &thl[k * ij..(k + 1) * ij];
        let qt_at = &qt[k * ij..(k + 1) * ij];
        let b_at = &mut b[k * ij..(k + 1) * ij];

        nonconverged += b_at
            .par_chunks_mut(grid.icells)
            .enumerate()
            .map(|(j, row)| {
                if j < grid.jstart || j >= grid.jend {
                    return 0;
                }
                let base = j * grid.icells;
                let mut bad = 0;
                for i in grid.istart..grid.iend {
                    let idx = base + i;
                    let (ql, ok) = ql_quick(thl_at[idx], qt_at[idx], p, ex);
                    if !ok {
                        bad += 1;
                    }
                    row[i] = bu(p, thl_at[idx], qt_at[idx], ql, thv);
                }
                bad
            })
            .sum::<usize>();
    }
    nonconverged
}

/// Liquid water mixing ratio over the interior levels, full saturation
/// adjustment per cell.
pub fn calc_ql_field(
    ql: &mut [f64],
    thl: &[f64],
    qt: &[f64],
    pref: &[f64],
    grid: &Grid,
) -> usize {
    let ij = grid.ijcells;
    let mut nonconverged = 0;

    for k in grid.kstart..grid.kend {
        let p = pref[k];
        let ex = exner(p);
        let thl_at = &thl[k * ij..(k + 1) * ij];
        let qt_at = &qt[k * ij..(k + 1) * ij];
        let ql_at = &mut ql[k * ij..(k + 1) * ij];

        nonconverged += ql_at
            .par_chunks_mut(grid.icells)
            .enumerate()
            .map(|(j, row)| {
                if j < grid.jstart || j >= grid.jend {
                    return 0;
                }
                let base = j * grid.icells;
                let mut bad = 0;
                for i in grid.istart..grid.iend {
                    let idx = base + i;
                    let sat = sat_adjust(thl_at[idx], qt_at[idx], p, ex);
                    if !sat.converged {
                        bad += 1;
                    }
                    row[i] = sat.ql;
                }
                bad
            })
            .sum::<usize>();
    }
    nonconverged
}

/// Squared Brunt–Väisälä frequency `N² = g/θv_ref · ∂θl/∂z` over the
/// interior levels.
pub fn calc_n2(n2: &mut [f64], thl: &[f64], dzi: &[f64], thvref: &[f64], grid: &Grid) {
    let ij = grid.ijcells;
    for k in grid.kstart..grid.kend {
        let factor = GRAV / thvref[k] * 0.5 * dzi[k];
        let thl_below = &thl[(k - 1) * ij..k * ij];
        let thl_above = &thl[(k + 1) * ij..(k + 2) * ij];
        let n2_at = &mut n2[k * ij..(k + 1) * ij];

        n2_at
            .par_chunks_mut(grid.icells)
            .enumerate()
            .for_each(|(j, row)| {
                if j < grid.jstart || j >= grid.jend {
                    return;
                }
                let base = j * grid.icells;
                for i in grid.istart..grid.iend {
                    let idx = base + i;
                    row[i] = factor * (thl_above[idx] - thl_below[idx]);
                }
            });
    }
}

/// Surface buoyancy: the surface plane and the lowest model level, assuming
/// no liquid water there. Covers the full plane including ghost columns.
#[allow(clippy::too_many_arguments)]
pub fn calc_buoyancy_bot(
    b: &mut [f64],
    bbot: &mut [f64],
    thl: &[f64],
    thlbot: &[f64],
    qt: &[f64],
    qtbot: &[f64],
    thvref: &[f64],
    thvrefh: &[f64],
    grid: &Grid,
) {
    let kstart = grid.kstart;
    let thv = thvref[kstart];
    let thvh = thvrefh[kstart];
    let koff = kstart * grid.ijcells;

    for ij in 0..grid.ijcells {
        bbot[ij] = bu_no_ql(thlbot[ij], qtbot[ij], thvh);
        b[koff + ij] = bu_no_ql(thl[koff + ij], qt[koff + ij], thv);
    }
}

/// Surface buoyancy flux from the surface scalar values and fluxes, no
/// liquid water.
pub fn calc_buoyancy_flux_bot(
    bfluxbot: &mut [f64],
    thlbot: &[f64],
    thlfluxbot: &[f64],
    qtbot: &[f64],
    qtfluxbot: &[f64],
    thvrefh: &[f64],
    grid: &Grid,
) {
    let thvh = thvrefh[grid.kstart];
    for ij in 0..grid.ijcells {
        bfluxbot[ij] = bu_flux_no_ql(thlbot[ij], thlfluxbot[ij], qtbot[ij], qtfluxbot[ij], thvh);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::P0;
    use crate::grid::SpatialOrder;

    fn reference_column(grid: &Grid) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
        // Uniform unsaturated state; prefh/thvrefh consistent with it so the
        // buoyancy force vanishes identically.
        let n = grid.ijcells * grid.kcells;
        let thl = vec![300.0; n];
        let qt = vec![0.01; n];
        let prefh = vec![P0; grid.kcells];
        let rv_rd = crate::constants::RV / crate::constants::RD;
        let thvrefh = vec![300.0 * (1.0 - (1.0 - rv_rd) * 0.01); grid.kcells];
        (thl, qt, prefh, thvrefh)
    }

    #[test]
    fn tendency_accumulates_zero_at_reference_conditions() {
        let grid = Grid::uniform(4, 4, 8, 400.0, 400.0, 800.0, SpatialOrder::Second);
        let (thl, qt, prefh, thvrefh) = reference_column(&grid);
        let mut wt = vec![1.5; grid.ijcells * grid.kcells];
        let bad = calc_buoyancy_tend_2nd(&mut wt, &thl, &qt, &prefh, &thvrefh, &grid);
        assert_eq!(bad, 0);
        for k in grid.kstart + 1..grid.kend {
            let v = wt[grid.idx(grid.istart, grid.jstart, k)];
            assert!((v - 1.5).abs() < 1e-10, "wt must stay at its prior value, got {v}");
        }
    }

    #[test]
    fn fourth_order_matches_second_on_vertically_uniform_state() {
        let grid = Grid::uniform(4, 4, 8, 400.0, 400.0, 800.0, SpatialOrder::Fourth);
        let (thl, qt, prefh, thvrefh) = reference_column(&grid);
        let mut wt2 = vec![0.0; grid.ijcells * grid.kcells];
        let mut wt4 = vec![0.0; grid.ijcells * grid.kcells];
        calc_buoyancy_tend_2nd(&mut wt2, &thl, &qt, &prefh, &thvrefh, &grid);
        calc_buoyancy_tend_4th(&mut wt4, &thl, &qt, &prefh, &thvrefh, &grid);
        for k in grid.kstart + 1..grid.kend {
            for j in grid.jstart..grid.jend {
                for i in grid.istart..grid.iend {
                    let idx = grid.idx(i, j, k);
                    assert!((wt2[idx] - wt4[idx]).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn warm_anomaly_forces_positive_tendency() {
        let grid = Grid::uniform(4, 4, 8, 400.0, 400.0, 800.0, SpatialOrder::Second);
        let (mut thl, qt, prefh, thvrefh) = reference_column(&grid);
        // Warm one column by 1 K through the whole depth.
        for k in 0..grid.kcells {
            let idx = grid.idx(grid.istart, grid.jstart, k);
            thl[idx] += 1.0;
        }
        let mut wt = vec![0.0; grid.ijcells * grid.kcells];
        calc_buoyancy_tend_2nd(&mut wt, &thl, &qt, &prefh, &thvrefh, &grid);
        let k = grid.kstart + 2;
        assert!(wt[grid.idx(grid.istart, grid.jstart, k)] > 0.0);
        // Neighboring columns remain unforced.
        assert!(wt[grid.idx(grid.istart + 1, grid.jstart + 1, k)].abs() < 1e-10);
    }

    #[test]
    fn ql_field_is_zero_for_unsaturated_column() {
        let grid = Grid::uniform(4, 4, 8, 400.0, 400.0, 800.0, SpatialOrder::Second);
        let (thl, qt, prefh, _) = reference_column(&grid);
        let mut ql = vec![-1.0; grid.ijcells * grid.kcells];
        let bad = calc_ql_field(&mut ql, &thl, &qt, &prefh, &grid);
        assert_eq!(bad, 0);
        for k in grid.kstart..grid.kend {
            assert_eq!(ql[grid.idx(grid.istart, grid.jstart, k)], 0.0);
        }
    }

    #[test]
    fn n2_sign_follows_stratification() {
        let grid = Grid::uniform(4, 4, 8, 400.0, 400.0, 800.0, SpatialOrder::Second);
        let mut thl = vec![0.0; grid.ijcells * grid.kcells];
        for k in 0..grid.kcells {
            let value = 300.0 + 0.01 * grid.z[k]; // stable stratification
            thl[k * grid.ijcells..(k + 1) * grid.ijcells].fill(value);
        }
        let thvref = vec![300.0; grid.kcells];
        let mut n2 = vec![0.0; grid.ijcells * grid.kcells];
        calc_n2(&mut n2, &thl, &grid.dzi, &thvref, &grid);
        for k in grid.kstart..grid.kend {
            assert!(n2[grid.idx(grid.istart, grid.jstart, k)] > 0.0);
        }
    }

    #[test]
    fn surface_buoyancy_flux_combines_both_scalar_fluxes() {
        let grid = Grid::uniform(2, 2, 4, 200.0, 200.0, 400.0, SpatialOrder::Second);
        let thvrefh = vec![301.0; grid.kcells];
        let thlbot = vec![300.0; grid.ijcells];
        let qtbot = vec![0.008; grid.ijcells];
        let thlflux = vec![0.1; grid.ijcells];
        let qtflux = vec![5.0e-5; grid.ijcells];
        let mut bflux = vec![0.0; grid.ijcells];
        calc_buoyancy_flux_bot(&mut bflux, &thlbot, &thlflux, &qtbot, &qtflux, &thvrefh, &grid);
        // Both a positive heat flux and a positive moisture flux make the
        // surface buoyancy flux positive.
        assert!(bflux[0] > 0.0);
        let mut bflux_dry = vec![0.0; grid.ijcells];
        let no_qtflux = vec![0.0; grid.ijcells];
        calc_buoyancy_flux_bot(&mut bflux_dry, &thlbot, &thlflux, &qtbot, &no_qtflux, &thvrefh, &grid);
        assert!(bflux[0] > bflux_dry[0]);
    }
}

//! Saturation adjustment
//!
//! Pointwise nonlinear solve for the liquid water content of a grid cell:
//! partition total water `qt` into vapor at saturation and liquid, consistent
//! with the liquid-water potential temperature `s` at pressure `p`. The
//! iteration is Newton–Raphson on temperature, starting from the unsaturated
//! temperature `T0 = s·Π`. Latent heating feeds back through the
//! Clausius–Clapeyron slope of the saturation curve.
//!
//! The solve is bounded: after [`SAT_MAX_ITER`] iterations the best estimate
//! is returned with the convergence flag cleared, so a pathological state
//! can never hang a step.

use crate::constants::{CP, LV, RV, SAT_MAX_ITER, SAT_TOL};
use crate::thermo::functions::qsat;

/// Converged (or best-estimate) saturation state of one cell.
#[derive(Debug, Clone, Copy)]
pub struct SatAdjust {
    /// Liquid water mixing ratio, `max(0, qt − qs(T))`.
    pub ql: f64,
    /// Adjusted absolute temperature.
    pub t: f64,
    /// Whether the Newton iteration met the relative tolerance.
    pub converged: bool,
    /// Iterations used.
    pub iterations: usize,
}

/// Full Newton solve of the saturation adjustment.
///
/// # Arguments
///
/// * `s` - liquid-water potential temperature (K)
/// * `qt` - total water mixing ratio (kg/kg)
/// * `p` - pressure (Pa)
/// * `ex` - Exner function at `p`
#[must_use]
pub fn sat_adjust(s: f64, qt: f64, p: f64, ex: f64) -> SatAdjust {
    let tl = s * ex;
    let mut tnr = tl;
    let mut tnr_old = 1.0e9;
    let mut qs = 0.0;
    let mut iterations = 0;

    while (tnr - tnr_old).abs() / tnr_old > SAT_TOL {
        if iterations >= SAT_MAX_ITER {
            return SatAdjust {
                ql: (qt - qs).max(0.0),
                t: tnr,
                converged: false,
                iterations,
            };
        }
        iterations += 1;
        tnr_old = tnr;
        qs = qsat(p, tnr);
        tnr -= (tnr + (LV / CP) * qs - tl - (LV / CP) * qt)
            / (1.0 + LV * LV * qs / (RV * CP * tnr * tnr));
    }

    SatAdjust {
        ql: (qt - qs).max(0.0),
        t: tnr,
        converged: true,
        iterations,
    }
}

/// Estimate-then-solve shortcut for the hot buoyancy paths.
///
/// A single saturation evaluation at `T0 = s·ex` decides whether the cell
/// can hold liquid at all: unsaturated cells return exactly 0 without
/// iterating (condensation is monotone in `qt`, so a non-positive single-shot
/// estimate can never turn positive under latent heating). Returns the
/// liquid water content and whether the solve (if any) converged.
#[inline]
#[must_use]
pub fn ql_quick(s: f64, qt: f64, p: f64, ex: f64) -> (f64, bool) {
    let tl = s * ex;
    if qt - qsat(p, tl) > 0.0 {
        let sat = sat_adjust(s, qt, p, ex);
        (sat.ql, sat.converged)
    } else {
        (0.0, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::P0;
    use crate::thermo::functions::exner;
    use approx::assert_relative_eq;

    #[test]
    fn unsaturated_cell_returns_exactly_zero() {
        // 300 K at surface pressure holds about 22 g/kg at saturation.
        let (ql, ok) = ql_quick(300.0, 0.01, P0, 1.0);
        assert!(ok);
        assert_eq!(ql, 0.0);
    }

    #[test]
    fn supersaturated_cell_condenses_bounded_by_excess() {
        // qt exceeds qs(T0) by 2 g/kg; latent heating raises T and qs, so
        // the condensed amount stays strictly inside (0, excess).
        let s = 290.0;
        let p = 9.0e4;
        let ex = exner(p);
        let excess = 0.002;
        let qt = qsat(p, s * ex) + excess;
        let sat = sat_adjust(s, qt, p, ex);
        assert!(sat.converged);
        assert!(sat.ql > 0.0);
        assert!(sat.ql < excess);
        assert!(sat.t > s * ex, "latent heating must raise the temperature");
    }

    #[test]
    fn ql_is_non_decreasing_in_qt() {
        let s = 285.0;
        let p = 8.5e4;
        let ex = exner(p);
        let mut last = 0.0;
        for step in 0..40 {
            let qt = 0.004 + 0.0005 * f64::from(step);
            let (ql, ok) = ql_quick(s, qt, p, ex);
            assert!(ok);
            assert!(ql >= last, "ql must not decrease when qt grows");
            last = ql;
        }
    }

    #[test]
    fn converged_solution_is_a_fixed_point() {
        let s = 288.0;
        let p = 9.2e4;
        let ex = exner(p);
        let qt = qsat(p, s * ex) + 0.0015;
        let sat = sat_adjust(s, qt, p, ex);
        assert!(sat.converged);
        // Re-evaluating qs at the returned temperature reproduces ql.
        let ql_check = qt - qsat(p, sat.t);
        assert_relative_eq!(sat.ql, ql_check, epsilon = 1e-5);
    }

    #[test]
    fn solver_terminates_on_extreme_input() {
        // Nonsense-hot input exercises the iteration cap rather than hanging.
        let sat = sat_adjust(1.0e4, 0.5, 1.0e3, 1.0);
        assert!(sat.iterations <= SAT_MAX_ITER);
    }
}

//! Pointwise thermodynamic functions
//!
//! The scalar building blocks of the closure: Exner function, saturation
//! vapor pressure and mixing ratio, the buoyancy formulas, and the
//! interpolation stencils of both spatial orders.
//!
//! # Conventions
//!
//! `s` is the liquid-water potential temperature, `qt` the total water
//! mixing ratio, `ql` the liquid water mixing ratio, `p` pressure. Virtual
//! potential temperature enters the buoyancy as
//! `θv = (s + Lv·ql/(cp·Π))·(1 − (1 − Rv/Rd)·qt − (Rv/Rd)·ql)`.

use crate::constants::{CP, EP, ESAT_POLY, GRAV, LV, P0, RD, RV, TMELT};

/// Exner function `Π = (p/p0)^(Rd/cp)`. Equals 1 at the reference pressure.
#[inline]
#[must_use]
pub fn exner(p: f64) -> f64 {
    (p / P0).powf(RD / CP)
}

/// Saturation vapor pressure over liquid water (Pa), 8th-order polynomial
/// fit in `T − TMELT`, clamped below −80 K offset.
#[inline]
#[must_use]
pub fn esat(t: f64) -> f64 {
    let x = (t - TMELT).max(-80.0);
    let c = &ESAT_POLY;
    c[0] + x * (c[1] + x * (c[2] + x * (c[3] + x * (c[4] + x * (c[5] + x * (c[6] + x * (c[7] + x * c[8])))))))
}

/// Saturation mixing ratio `qs = ε·esat/(p − (1 − ε)·esat)`.
#[inline]
#[must_use]
pub fn qsat(p: f64, t: f64) -> f64 {
    let es = esat(t);
    EP * es / (p - (1.0 - EP) * es)
}

/// Full buoyancy from state and the reference virtual potential temperature
/// at the same level.
#[inline]
#[must_use]
pub fn bu(p: f64, s: f64, qt: f64, ql: f64, thvref: f64) -> f64 {
    GRAV * ((s + LV * ql / (CP * exner(p))) * (1.0 - (1.0 - RV / RD) * qt - RV / RD * ql) - thvref)
        / thvref
}

/// Buoyancy without liquid water, used at the lowest model level where
/// `ql = 0` is assumed.
#[inline]
#[must_use]
pub fn bu_no_ql(s: f64, qt: f64, thvref: f64) -> f64 {
    GRAV * (s * (1.0 - (1.0 - RV / RD) * qt) - thvref) / thvref
}

/// Surface buoyancy flux from the surface scalar values and fluxes, no
/// liquid water.
#[inline]
#[must_use]
pub fn bu_flux_no_ql(s: f64, sflux: f64, qt: f64, qtflux: f64, thvref: f64) -> f64 {
    GRAV / thvref * (sflux * (1.0 - (1.0 - RV / RD) * qt) - (1.0 - RV / RD) * s * qtflux)
}

/// Centered 2-point interpolation.
#[inline]
#[must_use]
pub fn interp2(a: f64, b: f64) -> f64 {
    0.5 * (a + b)
}

/// 4-point interpolation with weights (−1, 9, 9, −1)/16.
#[inline]
#[must_use]
pub fn interp4(a: f64, b: f64, c: f64, d: f64) -> f64 {
    (-a + 9.0 * b + 9.0 * c - d) / 16.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn exner_is_one_at_reference_pressure() {
        assert_relative_eq!(exner(P0), 1.0, max_relative = 1e-14);
    }

    #[test]
    fn exner_decreases_with_pressure() {
        assert!(exner(8.0e4) < exner(9.0e4));
        assert!(exner(9.0e4) < 1.0);
    }

    #[test]
    fn esat_at_melting_point_matches_fit_constant() {
        // The polynomial's constant term is the fit value at T = TMELT.
        assert_relative_eq!(esat(TMELT), ESAT_POLY[0], max_relative = 1e-14);
    }

    #[test]
    fn esat_clamps_below_minus_eighty() {
        assert_eq!(esat(TMELT - 120.0), esat(TMELT - 80.0));
    }

    #[test]
    fn qsat_increases_with_temperature() {
        let p = 1.0e5;
        assert!(qsat(p, 280.0) < qsat(p, 290.0));
        assert!(qsat(p, 290.0) < qsat(p, 300.0));
    }

    #[test]
    fn buoyancy_vanishes_at_reference_conditions() {
        // At exact reference state (ql = 0), θv equals θv_ref by construction.
        let s = 300.0;
        let qt = 0.01;
        let thvref = s * (1.0 - (1.0 - RV / RD) * qt);
        assert_relative_eq!(bu_no_ql(s, qt, thvref), 0.0, epsilon = 1e-12);
        assert_relative_eq!(bu(P0, s, qt, 0.0, thvref), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn virtual_temperature_factor_is_positive() {
        // θv ≈ θl·(1 + 0.61·qt) for unsaturated air; check the sign and size.
        let thv = 300.0 * (1.0 - (1.0 - RV / RD) * 0.01);
        assert_relative_eq!(thv, 301.83, max_relative = 1e-3);
    }

    #[test]
    fn interp4_weights_reproduce_linear_fields() {
        // Exact for constants and straight lines through four equidistant points.
        assert_relative_eq!(interp4(2.0, 2.0, 2.0, 2.0), 2.0, max_relative = 1e-14);
        assert_relative_eq!(interp4(1.0, 2.0, 3.0, 4.0), 2.5, max_relative = 1e-14);
        assert_relative_eq!(interp2(2.0, 3.0), 2.5, max_relative = 1e-14);
    }
}

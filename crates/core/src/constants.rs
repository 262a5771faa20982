//! Physical constants for moist atmospheric thermodynamics
//!
//! All values follow the conventions of large-eddy simulation practice:
//! dry-air and water-vapor gas constants, the dry-air heat capacity used in
//! the Exner function, and the latent heat of vaporization treated as
//! constant over the simulated temperature range.

/// Gas constant of dry air (J/(kg·K)).
pub const RD: f64 = 287.04;

/// Gas constant of water vapor (J/(kg·K)).
pub const RV: f64 = 461.5;

/// Ratio of gas constants Rd/Rv (molecular mass ratio of water to dry air).
pub const EP: f64 = RD / RV;

/// Specific heat of dry air at constant pressure (J/(kg·K)).
pub const CP: f64 = 1005.0;

/// Latent heat of vaporization (J/kg).
pub const LV: f64 = 2.5e6;

/// Density of liquid water (kg/m³).
pub const RHOW: f64 = 1.0e3;

/// Melting point of water (K), reference for the saturation polynomial.
pub const TMELT: f64 = 273.15;

/// Reference pressure of the Exner function (Pa).
pub const P0: f64 = 1.0e5;

/// Gravitational acceleration (m/s²).
pub const GRAV: f64 = 9.81;

/// Coefficients of the 8th-order polynomial fit of the saturation vapor
/// pressure over liquid water, in offset temperature x = T − TMELT.
/// Valid down to x = −80 K; the evaluation clamps below that.
pub const ESAT_POLY: [f64; 9] = [
    0.6105851e+03,
    0.4440316e+02,
    0.1430341e+01,
    0.2641412e-01,
    0.2995057e-03,
    0.2031998e-05,
    0.6936113e-08,
    0.2564861e-11,
    -0.3704404e-13,
];

/// Relative temperature tolerance of the saturation-adjustment Newton solve.
pub const SAT_TOL: f64 = 1e-5;

/// Iteration cap of the saturation-adjustment Newton solve. The solve
/// normally converges in a handful of iterations; hitting the cap flags the
/// cell as non-converged and returns the best estimate.
pub const SAT_MAX_ITER: usize = 100;

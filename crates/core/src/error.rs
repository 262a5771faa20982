//! Error taxonomy of the thermodynamics closure
//!
//! Configuration problems abort initialization before any physics runs.
//! Numeric failures inside a step are aggregated per kernel and surfaced as
//! a step failure; the surrounding driver decides whether that is fatal.

use thiserror::Error;

/// Failure of a cross-process exchange or reduction. These are fatal to the
/// step and never retried.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The boundary exchange of horizontal ghost cells failed.
    #[error("boundary exchange failed: {0}")]
    Boundary(String),
    /// The global sum reduction failed.
    #[error("sum reduction failed: {0}")]
    Reduction(String),
}

/// Failure of a cross-section sink consuming extracted planes or volumes.
#[derive(Debug, Error)]
#[error("cross-section sink failure for `{name}`: {reason}")]
pub struct CrossError {
    /// Cross-section variable being written.
    pub name: String,
    /// Sink-reported reason.
    pub reason: String,
}

/// Errors of the moist-thermodynamics closure.
#[derive(Debug, Error)]
pub enum ThermoError {
    /// Missing or invalid configuration; initialization aborts.
    #[error("configuration error: {0}")]
    Config(String),

    /// A diagnostic field name outside the supported set was requested.
    /// Callers treat this as "unsupported", not as a crash.
    #[error("unsupported thermo field `{0}`")]
    UnsupportedField(String),

    /// The hydrostatic integration produced a non-positive base for the
    /// fractional power, i.e. the input profile is outside the physically
    /// meaningful range. Rejected instead of fed to `powf`.
    #[error("hydrostatic integration lost pressure positivity at level {level}")]
    PressureBase {
        /// Vertical level index at which positivity was lost.
        level: usize,
    },

    /// Aggregated count of cells whose saturation adjustment did not
    /// converge within the iteration cap. The kernels have still written
    /// their best-estimate results.
    #[error("saturation adjustment did not converge in {cells} cells")]
    Saturation {
        /// Number of non-converged cells in the step.
        cells: usize,
    },

    /// A cross-process primitive failed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// A cross-section sink failed.
    #[error(transparent)]
    Cross(#[from] CrossError),
}

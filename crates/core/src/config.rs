//! Configuration of the thermodynamics closure
//!
//! Parsed once at initialization; a missing or invalid key aborts before any
//! physics runs. The requested cross-section list is validated later against
//! the supported names for the configured spatial order.

use serde::Deserialize;

use crate::error::ThermoError;

fn default_diffusivity() -> f64 {
    1.0e-5
}

/// Closure configuration, deserialized from the `[thermo]` section of the
/// run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThermoConfig {
    /// Surface pressure (Pa). Required.
    pub ps: f64,

    /// Recompute the base-state pressure and Exner profiles every step from
    /// the current horizontal-mean profiles instead of keeping the initial
    /// base state.
    #[serde(default)]
    pub update_base_state: bool,

    /// Requested cross-section variable names. Unknown names are dropped
    /// with a warning at setup.
    #[serde(default)]
    pub crosslist: Vec<String>,

    /// Diffusivity of the liquid-water potential temperature (m²/s).
    #[serde(default = "default_diffusivity")]
    pub thl_diffusivity: f64,

    /// Diffusivity of the total water mixing ratio (m²/s).
    #[serde(default = "default_diffusivity")]
    pub qt_diffusivity: f64,
}

impl ThermoConfig {
    /// Parse the configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ThermoError::Config`] for missing required keys, unknown
    /// keys, or malformed values.
    pub fn from_toml(text: &str) -> Result<Self, ThermoError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ThermoError::Config(e.to_string()))?;
        if config.ps <= 0.0 {
            return Err(ThermoError::Config(format!(
                "surface pressure must be positive, got {}",
                config.ps
            )));
        }
        Ok(config)
    }
}

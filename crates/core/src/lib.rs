//! Stratus Core Library
//!
//! Moist thermodynamics closure for a turbulence-resolving atmospheric
//! simulator. The closure advances no fields itself; it diagnoses the state
//! from the conserved pair (liquid-water potential temperature, total water
//! mixing ratio) and feeds the dynamical core.
//!
//! ## What the closure provides
//!
//! - Saturation adjustment partitioning total water into vapor and liquid
//! - A hydrostatically balanced reference atmosphere on the staggered grid
//! - The buoyancy force on the vertical-velocity tendency (2nd/4th order)
//! - Cloud and cloud-core conditional-sampling masks
//! - Buoyancy and liquid-water statistics, plus cross-section extraction

// Shared infrastructure
pub mod config;
pub mod constants;
pub mod error;
pub mod exchange;
pub mod fields;
pub mod grid;

// The closure itself and its diagnostic surfaces
pub mod cross;
pub mod stats;
pub mod thermo;

// Re-export the state containers
pub use fields::{Field3, Fields, ThermoField};
pub use grid::{Grid, SpatialOrder};

// Re-export the closure and its configuration
pub use config::ThermoConfig;
pub use error::{CrossError, ExchangeError, ThermoError};
pub use thermo::base_state::BaseState;
pub use thermo::masks::MaskType;
pub use thermo::ThermoMoist;

// Re-export the diagnostic surfaces
pub use cross::{CrossSink, MemorySink};
pub use exchange::{ProcessContext, Serial};
pub use stats::{EddyDiffusivity, Statistics};

//! Physical units for setpoints and thresholds.
//!
//! All branch flows handled by the optimizer are expressed in megawatts;
//! setpoints keep their native unit (degrees for phase-shifting
//! transformers, megawatts for HVDC and injections, raw tap positions for
//! discretized devices). The unit is a label carried alongside the value,
//! not a compile-time wrapper: the optimizer itself never converts between
//! units, it only reports them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a setpoint or threshold value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Active power (MW) - branch flows, HVDC and injection setpoints
    Megawatt,
    /// Current (A) - alternative threshold unit upstream, converted to MW
    /// before entering the optimizer
    Ampere,
    /// Phase-shift angle (°) - PST setpoints
    Degree,
    /// Raw tap position - discretized device coordinate
    Tap,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Unit::Megawatt => "MW",
            Unit::Ampere => "A",
            Unit::Degree => "°",
            Unit::Tap => "tap",
        };
        f.write_str(label)
    }
}

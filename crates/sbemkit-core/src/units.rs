//! Unit conversion utilities
//!
//! Slice thickness and pixel size are entered in nanometres, stage
//! coordinates are in micrometres. Durations shown to the operator are
//! formatted in minutes and seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const NM_PER_UM: f64 = 1000.0;

/// Length unit accepted from operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Nanometres
    #[default]
    Nm,
    /// Micrometres
    Um,
}

impl fmt::Display for LengthUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nm => write!(f, "nm"),
            Self::Um => write!(f, "µm"),
        }
    }
}

impl FromStr for LengthUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nm" => Ok(Self::Nm),
            "um" | "µm" | "micron" | "microns" => Ok(Self::Um),
            _ => Err(format!("Unknown length unit: {}", s)),
        }
    }
}

/// Convert nanometres to micrometres
pub fn nm_to_um(nm: f64) -> f64 {
    nm / NM_PER_UM
}

/// Convert micrometres to nanometres
pub fn um_to_nm(um: f64) -> f64 {
    um * NM_PER_UM
}

/// Convert a length to micrometres
pub fn to_um(value: f64, unit: LengthUnit) -> f64 {
    match unit {
        LengthUnit::Nm => nm_to_um(value),
        LengthUnit::Um => value,
    }
}

/// Parse a length such as `"25 nm"`, `"0.5um"` or a bare number in `default`
pub fn parse_length(input: &str, default: LengthUnit) -> Result<f64, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| c.is_alphabetic() || c == 'µ')
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("Invalid length: {}", input))?;
    let unit = if unit.trim().is_empty() {
        default
    } else {
        unit.parse()?
    };
    Ok(to_um(value, unit))
}

/// Format a removed depth in micrometres with three decimals
pub fn format_depth_um(um: f64) -> String {
    format!("{:.3} µm", um)
}

/// Format a duration as `"M min S s"` (or `"S s"` under a minute)
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (min, sec) = (secs / 60, secs % 60);
    if min > 0 {
        format!("{} min {} s", min, sec)
    } else {
        format!("{} s", sec)
    }
}

//! Human friendly formatting and parsing of scaled quantities (`1.3K`, `8.7ms`)
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub name: &'static str,
    /// Value of one of this unit in the base unit
    pub multiplier: u64,
}
const fn unit(name: &'static str, multiplier: u64) -> Unit {
    Unit { name, multiplier }
}

const K: u64 = 1000;
const KI: u64 = 1024;
pub const UNITS_1000: &[Unit] = &[
    unit("", 1),
    unit("K", K),
    unit("M", K * K),
    unit("G", K * K * K),
    unit("T", K * K * K * K),
    unit("P", K * K * K * K * K),
];
pub const UNITS_1024: &[Unit] = &[
    unit("", 1),
    unit("K", KI),
    unit("M", KI * KI),
    unit("G", KI * KI * KI),
    unit("T", KI * KI * KI * KI),
    unit("P", KI * KI * KI * KI * KI),
];
const SECOND: u64 = 1_000_000_000;
/// Durations with nanoseconds as the base unit
pub const UNITS_TIME: &[Unit] = &[
    unit("", 1),
    unit("ns", 1),
    unit("us", 1_000),
    unit("ms", 1_000_000),
    unit("s", SECOND),
    unit("m", SECOND * 60),
    unit("h", SECOND * 60 * 60),
    unit("d", SECOND * 60 * 60 * 24),
    unit("w", SECOND * 60 * 60 * 24 * 7),
    unit("fn", SECOND * 60 * 60 * 24 * 14),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitsError {
    #[error("Invalid number {0:?}")]
    InvalidNumber(String),
    #[error("Unknown unit {0:?}")]
    UnknownUnit(String),
}

/// Scales `value` by the largest unit not greater than it
///
/// `units` must be ordered by increasing multiplier. Non-finite values are
/// printed as they are.
pub fn format_units(value: f64, units: &[Unit], precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let mut scaled = value;
    let mut name = "";
    for unit in units {
        let multiplier = unit.multiplier as f64;
        if value < multiplier {
            break;
        }
        scaled = value / multiplier;
        name = unit.name;
    }
    format!("{scaled:.precision$}{name}")
}

/// Parses a number with an optional unit suffix into the base unit, truncating
pub fn parse_units(value: &str, units: &[Unit]) -> Result<u64, UnitsError> {
    let split = value
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    let number: f64 = number
        .trim()
        .parse()
        .map_err(|_| UnitsError::InvalidNumber(number.to_owned()))?;
    if !number.is_finite() || number < 0.0 {
        return Err(UnitsError::InvalidNumber(value.to_owned()));
    }
    let unit = units
        .iter()
        .find(|unit| unit.name == suffix)
        .ok_or_else(|| UnitsError::UnknownUnit(suffix.to_owned()))?;
    Ok((unit.multiplier as f64 * number) as u64)
}

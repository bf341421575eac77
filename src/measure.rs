//! # Measure Parsing Module
//!
//! Naive quantity extraction from free-text measures ("2 cups", "1.5kg",
//! "1/2 tsp"). Only the leading decimal number is read; anything the
//! pattern cannot read counts as a quantity of one.

use lazy_static::lazy_static;
use log::trace;
use regex::Regex;

// Leading decimal number, e.g. "2", "1.5", ".75", "3." (fractions stop at the slash)
pub const LEADING_NUMBER_PATTERN: &str = r"^\s*(\d+(?:\.\d*)?|\.\d+)";

// Lazy static regex for the leading number to avoid recompilation
lazy_static! {
    pub static ref LEADING_NUMBER_REGEX: Regex =
        Regex::new(LEADING_NUMBER_PATTERN).expect("Leading number pattern should be valid");
}

/// Read the leading decimal number of a measure, if any
///
/// # Examples
///
/// ```rust
/// use kitchen_chef::measure::leading_number;
///
/// assert_eq!(leading_number("2 cups"), Some(2.0));
/// assert_eq!(leading_number("1/2 tsp"), Some(1.0));
/// assert_eq!(leading_number("a pinch"), None);
/// ```
pub fn leading_number(measure: &str) -> Option<f64> {
    let captures = LEADING_NUMBER_REGEX.captures(measure)?;
    captures.get(1)?.as_str().parse::<f64>().ok()
}

/// Quantity used for calorie estimation
///
/// Missing, unreadable and zero quantities all fall back to 1.
pub fn quantity_or_one(measure: Option<&str>) -> f64 {
    let quantity = measure
        .and_then(leading_number)
        .filter(|q| q.is_finite() && *q > 0.0)
        .unwrap_or(1.0);
    trace!("Parsed quantity {} from measure {:?}", quantity, measure);
    quantity
}

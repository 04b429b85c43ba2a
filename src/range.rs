//! Gain-mode range selection.
//!
//! Picks the hardware temperature range that best fits a target interval.
//! Bounds are compared in whole degrees; fractional bounds are truncated
//! toward zero first.

use serde::{Deserialize, Serialize};

/// A hardware-selectable temperature interval, in degrees Celsius.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub low: f64,
    pub high: f64,
}

impl TemperatureRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    fn whole_degrees(&self) -> (i32, i32) {
        (self.low as i32, self.high as i32)
    }
}

/// Index of the candidate that best matches `[target_min, target_max]`.
///
/// The candidate covering the largest part of the target wins outright. When
/// several share the largest coverage, the one whose bounds deviate least from
/// the target (sum of squared differences) wins, and the first of those wins
/// any remaining tie. Returns `None` for an empty list.
///
/// # Example
///
/// ```rust
/// use thermal_fsm::range::{match_range, TemperatureRange};
///
/// let ranges = [
///     TemperatureRange::new(0.0, 20.0),
///     TemperatureRange::new(-10.0, 30.0),
/// ];
/// assert_eq!(match_range(&ranges, 5, 15), Some(0));
/// ```
pub fn match_range(ranges: &[TemperatureRange], target_min: i32, target_max: i32) -> Option<usize> {
    match ranges.len() {
        0 => return None,
        1 => return Some(0),
        _ => {}
    }

    let coverages: Vec<i32> = ranges
        .iter()
        .map(|range| coverage(range, target_min, target_max))
        .collect();
    let best = coverages.iter().copied().max()?;

    let mut tied = coverages
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == best)
        .map(|(index, _)| index);
    let first = tied.next()?;

    Some(tied.fold(first, |chosen, index| {
        let candidate = deviation(&ranges[index], target_min, target_max);
        if candidate < deviation(&ranges[chosen], target_min, target_max) {
            index
        } else {
            chosen
        }
    }))
}

/// Whole degrees of the target covered by `range`; 0 when disjoint.
fn coverage(range: &TemperatureRange, min: i32, max: i32) -> i32 {
    let (low, high) = range.whole_degrees();
    if low > max || high < min {
        return 0;
    }

    let mut covered = max - min;
    if low > min {
        covered -= low - min;
    }
    if high < max {
        covered -= max - high;
    }
    covered.max(0)
}

fn deviation(range: &TemperatureRange, min: i32, max: i32) -> i64 {
    let (low, high) = range.whole_degrees();
    let below = i64::from(low) - i64::from(min);
    let above = i64::from(high) - i64::from(max);
    below * below + above * above
}

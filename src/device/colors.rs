//! Temperature-to-color mapping bounds.

/// Display color mapping, in degrees Celsius.
///
/// Updates never leave the bounds closer than `min_span` apart. Any accepted
/// change marks the mapping for re-application on the next processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorRange {
    min: f64,
    max: f64,
    min_span: f64,
    needs_setup: bool,
}

impl ColorRange {
    pub fn new(min: f64, max: f64, min_span: f64) -> Self {
        Self {
            min,
            max,
            min_span,
            needs_setup: true,
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Returns `false` and changes nothing if `min` is not finite or too
    /// close to the upper bound.
    pub fn set_min(&mut self, min: f64) -> bool {
        if !min.is_finite() || !(self.max - min >= self.min_span) {
            return false;
        }
        self.min = min;
        self.needs_setup = true;
        true
    }

    /// Returns `false` and changes nothing if `max` is not finite or too
    /// close to the lower bound.
    pub fn set_max(&mut self, max: f64) -> bool {
        if !max.is_finite() || !(max - self.min >= self.min_span) {
            return false;
        }
        self.max = max;
        self.needs_setup = true;
        true
    }

    pub fn mark_dirty(&mut self) {
        self.needs_setup = true;
    }

    pub fn needs_setup(&self) -> bool {
        self.needs_setup
    }

    /// Bounds to apply, if they changed since the last call.
    pub fn take_pending(&mut self) -> Option<(f64, f64)> {
        if !self.needs_setup {
            return None;
        }
        self.needs_setup = false;
        Some((self.min, self.max))
    }
}

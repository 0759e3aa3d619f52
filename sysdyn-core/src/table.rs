//! Piecewise-linear lookup over a fixed-step numeric domain.

use crate::diagnostics::{DiagnosticEvent, DiagnosticSink};
use crate::state::FloatValue;

/// Table of output samples at `min, min + step, ..., max`.
///
/// Sources at or beyond the domain edges clamp to the first/last sample;
/// anything in between is linearly interpolated between the two bracketing
/// samples.
pub struct Table {
    data: Vec<FloatValue>,
    min: FloatValue,
    max: FloatValue,
    step: FloatValue,
}

impl Table {
    /// Panics if the sample list is empty or the step is not positive.
    pub fn new(data: Vec<FloatValue>, min: FloatValue, max: FloatValue, step: FloatValue) -> Self {
        assert!(!data.is_empty(), "table requires at least one sample");
        assert!(step > 0.0, "table step must be positive, got {}", step);
        assert!(min < max, "table domain is empty: [{}, {}]", min, max);
        Self {
            data,
            min,
            max,
            step,
        }
    }

    pub fn data(&self) -> &[FloatValue] {
        &self.data
    }

    /// Interpolated value for `source`.
    ///
    /// Interpolation fractions outside `[0, 1]` and results outside the
    /// envelope of the first/last sample are reported through `sink`; the
    /// value is returned unchanged either way. Panics if `source` cannot be
    /// bracketed, which the edge clamping makes unreachable for finite input.
    pub(crate) fn lookup(&self, name: &str, source: FloatValue, sink: &dyn DiagnosticSink) -> FloatValue {
        if source <= self.min {
            return self.data[0];
        }
        if source >= self.max {
            return self.data[self.data.len() - 1];
        }

        let mut grid = self.min;
        let mut index = 0usize;
        while grid <= self.max {
            if grid >= source {
                let lower = self.data[index - 1];
                let upper = self.data[index];
                let fraction = (source - (grid - self.step)) / self.step;
                if !(0.0..=1.0).contains(&fraction) {
                    sink.record(DiagnosticEvent::InterpolationOutOfRange {
                        table: name.to_string(),
                        source,
                        fraction,
                    });
                }
                let value = lower + fraction * (upper - lower);
                self.check_envelope(name, value, sink);
                return value;
            }
            grid += self.step;
            index += 1;
        }

        panic!("table '{}' failed to bracket source value {}", name, source);
    }

    fn check_envelope(&self, name: &str, value: FloatValue, sink: &dyn DiagnosticSink) {
        let first = self.data[0];
        let last = self.data[self.data.len() - 1];
        if value < first.min(last) || value > first.max(last) {
            sink.record(DiagnosticEvent::LookupOutsideEnvelope {
                table: name.to_string(),
                value,
            });
        }
    }
}

//! Lag operators: first-order smoothing and transport delays.
//!
//! All three operators name their input equation as a string and resolve it
//! to an [`EquationId`] when the simulator resets, so a model can wire an
//! operator to an equation that has not been registered yet.

use std::collections::VecDeque;

use crate::equation::EquationId;
use crate::errors::{SimError, SimResult};
use crate::state::{FloatValue, Values};

/// Initial value of a smooth: a literal, or a function evaluated lazily on
/// the first update, once the whole network exists.
pub(crate) enum SmoothInitial {
    Literal(FloatValue),
    Computed(Box<dyn Fn(&Values) -> FloatValue>),
}

/// First-order exponential lag with time constant `tau`.
///
/// The recurrence reads the input's previous-tick value, so the result does
/// not depend on where the smooth sits in the ordered auxiliary pass relative
/// to its input.
pub struct Smooth {
    pub(crate) tau: FloatValue,
    pub(crate) input_name: String,
    pub(crate) input: Option<EquationId>,
    pub(crate) initial: SmoothInitial,
    pub(crate) first_call: bool,
}

impl Smooth {
    pub(crate) fn new(tau: FloatValue, input_name: &str, initial: FloatValue) -> Self {
        Self {
            tau,
            input_name: input_name.to_string(),
            input: None,
            initial: SmoothInitial::Literal(initial),
            first_call: true,
        }
    }

    /// `own_j + dt * (input_j - own_j) / tau`.
    pub(crate) fn next(&self, own_j: FloatValue, input_j: FloatValue, dt: FloatValue) -> FloatValue {
        own_j + dt * (input_j - own_j) / self.tau
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Stage {
    pub j: FloatValue,
    pub k: FloatValue,
}

/// Third-order lag approximating a pure transport delay of total length
/// `delay`: three cascaded first-order stages, each with constant `delay / 3`.
pub struct Delay {
    pub(crate) delay_per_stage: FloatValue,
    pub(crate) input_name: String,
    pub(crate) input: Option<EquationId>,
    pub(crate) first_call: bool,
    pub(crate) stages: [Stage; 3],
}

impl Delay {
    pub(crate) fn new(delay: FloatValue, input_name: &str) -> Self {
        Self {
            delay_per_stage: delay / 3.0,
            input_name: input_name.to_string(),
            input: None,
            first_call: true,
            stages: [Stage::default(); 3],
        }
    }

    /// Set every stage's J and K to `value`.
    pub(crate) fn seed(&mut self, value: FloatValue) {
        for stage in &mut self.stages {
            stage.j = value;
            stage.k = value;
        }
    }

    /// Advance all three stages by one step and return the new output.
    ///
    /// The stages commit internally (J <- K); this is separate from the
    /// equation-wide end-of-tick commit.
    pub(crate) fn advance(&mut self, input_j: FloatValue, dt: FloatValue) -> FloatValue {
        let [alpha, beta, gamma] = &mut self.stages;
        alpha.k = alpha.j + dt * (input_j - alpha.j) / self.delay_per_stage;
        beta.k = beta.j + dt * (alpha.j - beta.j) / self.delay_per_stage;
        gamma.k = gamma.j + dt * (beta.j - gamma.j) / self.delay_per_stage;
        alpha.j = alpha.k;
        beta.j = beta.k;
        gamma.j = gamma.k;
        gamma.k
    }
}

/// Exact transport delay: a fixed-length FIFO of historical input samples,
/// shifted by exactly one sample per tick.
pub struct PipelineDelay {
    pub(crate) delay: FloatValue,
    pub(crate) input_name: String,
    pub(crate) input: Option<EquationId>,
    pub(crate) stages: VecDeque<FloatValue>,
}

impl PipelineDelay {
    pub(crate) fn new(delay: FloatValue, input_name: &str) -> Self {
        Self {
            delay,
            input_name: input_name.to_string(),
            input: None,
            stages: VecDeque::new(),
        }
    }

    /// Fill the buffer with `floor(delay / dt)` copies of the input's current
    /// value. Changing the time step invalidates the buffer, so this runs on
    /// every start.
    pub(crate) fn initialize(
        &mut self,
        name: &str,
        input_k: FloatValue,
        dt: FloatValue,
    ) -> SimResult<()> {
        let stage_count = (self.delay / dt) as usize;
        if stage_count < 1 {
            return Err(SimError::DelayTooShort {
                name: name.to_string(),
                delay: self.delay,
                delta_time: dt,
            });
        }
        self.stages.clear();
        self.stages.resize(stage_count, input_k);
        Ok(())
    }

    /// Pop the oldest sample as the output and push the input's current value.
    pub(crate) fn advance(&mut self, input_k: FloatValue) -> FloatValue {
        let output = *self.stages.back().expect("pipeline delay initialized before use");
        self.stages.push_front(input_k);
        self.stages.pop_back();
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn smooth_moves_a_fixed_fraction_toward_the_input() {
        let smooth = Smooth::new(5.0, "input", 0.0);
        assert_relative_eq!(smooth.next(0.0, 10.0, 1.0), 2.0);
        assert_relative_eq!(smooth.next(2.0, 10.0, 1.0), 3.6);
        // At the input the recurrence is a fixed point.
        assert_relative_eq!(smooth.next(10.0, 10.0, 1.0), 10.0);
    }

    #[test]
    fn delay_converges_to_a_constant_input() {
        let mut delay = Delay::new(6.0, "input");
        delay.seed(0.0);
        let mut output = 0.0;
        for _ in 0..400 {
            output = delay.advance(1.0, 1.0);
        }
        assert_relative_eq!(output, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn delay_holds_a_seeded_steady_state() {
        let mut delay = Delay::new(9.0, "input");
        delay.seed(4.0);
        for _ in 0..10 {
            assert_relative_eq!(delay.advance(4.0, 1.0), 4.0);
        }
    }

    #[test]
    fn pipeline_shifts_one_sample_per_update() {
        let mut pipeline = PipelineDelay::new(3.0, "input");
        pipeline.initialize("pipe", 0.0, 1.0).unwrap();
        assert_eq!(pipeline.stages.len(), 3);

        // A step from 0 to 1 exits exactly three updates later.
        assert_eq!(pipeline.advance(1.0), 0.0);
        assert_eq!(pipeline.advance(1.0), 0.0);
        assert_eq!(pipeline.advance(1.0), 0.0);
        assert_eq!(pipeline.advance(1.0), 1.0);
    }

    #[test]
    fn pipeline_steady_state_is_the_identity() {
        let mut pipeline = PipelineDelay::new(4.0, "input");
        pipeline.initialize("pipe", 7.5, 0.5).unwrap();
        assert_eq!(pipeline.stages.len(), 8);
        for _ in 0..20 {
            assert_eq!(pipeline.advance(7.5), 7.5);
        }
    }

    #[test]
    fn pipeline_rejects_sub_step_delays() {
        let mut pipeline = PipelineDelay::new(0.5, "input");
        let result = pipeline.initialize("pipe", 0.0, 1.0);
        assert!(matches!(result, Err(SimError::DelayTooShort { .. })));
    }
}

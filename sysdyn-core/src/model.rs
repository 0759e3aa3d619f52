//! The contract between a concrete model and the display layer.

use crate::errors::SimResult;
use crate::plot::PlotDefinition;
use crate::simulator::Simulator;
use crate::state::FloatValue;

/// A concrete model: a wired equation network plus the hooks the display
/// layer drives.
///
/// The shell binds sliders to the simulator's parameters, calls
/// [`parametrize`](SystemModel::parametrize) before each run to push the
/// committed values into the model's constants, then starts the simulator and
/// ticks it until [`simulation_ended`](SystemModel::simulation_ended).
pub trait SystemModel {
    fn simulator(&self) -> &Simulator;

    fn simulator_mut(&mut self) -> &mut Simulator;

    /// Push the current parameter values into the model's constants.
    fn parametrize(&mut self);

    /// Termination predicate, typically `time > initial_time + duration`.
    fn simulation_ended(&self) -> bool;

    /// Plot descriptors for the display layer.
    fn plots(&self) -> Vec<PlotDefinition>;

    /// Label of the time axis, e.g. "Days".
    fn time_unit(&self) -> &str {
        ""
    }

    fn plot_rows(&self) -> usize {
        1
    }

    fn plot_cols(&self) -> usize {
        1
    }

    /// Drive a complete headless run: parametrize, start, tick to the end.
    fn run(&mut self, delta_time: FloatValue) -> SimResult<()> {
        self.parametrize();
        self.simulator_mut().start(delta_time)?;
        while !self.simulation_ended() {
            self.simulator_mut().tick();
        }
        Ok(())
    }
}

//! Core engine for discrete-time system dynamics models: levels, rates,
//! ordered auxiliaries, table lookups, lag operators and the staggered
//! fixed-step evaluation protocol that ties them together.

pub mod diagnostics;
pub mod equation;
pub mod errors;
mod example_models;
pub mod functions;
pub mod lag;
pub mod model;
pub mod parameters;
pub mod plot;
pub mod simulator;
pub mod state;
pub mod table;

pub use equation::EquationId;
pub use errors::{SimError, SimResult};
pub use simulator::Simulator;
pub use state::{FloatValue, Time, Values};

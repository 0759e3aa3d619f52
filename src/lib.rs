//! Facade crate: re-exports the engine and the example models.

pub use sysdyn_core as engine;
pub use sysdyn_models as models;

pub use sysdyn_core::{EquationId, FloatValue, SimError, SimResult, Simulator, Time, Values};

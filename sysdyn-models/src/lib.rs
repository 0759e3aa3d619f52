//! Example models built on the `sysdyn-core` engine.
//!
//! These models are consumers of the engine's public surface: they wire an
//! equation network, declare parameters and plots, and implement the
//! [`SystemModel`](sysdyn_core::model::SystemModel) hooks a display layer
//! drives.

pub mod flu;

pub use flu::FluModel;

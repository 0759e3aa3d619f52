//! Plot descriptors handed to the display layer.
//!
//! These carry no numeric meaning; they only tell an external chart renderer
//! which logged equations belong together and how to scale them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotKind {
    /// Plot the logged values as-is.
    Absolute,
    /// Plot each signal scaled into `[0, 1]` by its observed envelope, for
    /// comparing signals with different magnitudes.
    Normalized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotDefinition {
    pub name: String,
    pub kind: PlotKind,
    /// Names of the logged equations shown on this plot.
    pub equations: Vec<String>,
}

impl PlotDefinition {
    pub fn new(name: &str, kind: PlotKind, equations: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            equations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_serde() {
        let plot = PlotDefinition::new(
            "Population",
            PlotKind::Normalized,
            vec!["susceptible".to_string(), "sick".to_string()],
        );
        let json = serde_json::to_string(&plot).unwrap();
        let back: PlotDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, plot.name);
        assert_eq!(back.kind, plot.kind);
        assert_eq!(back.equations, plot.equations);
    }
}

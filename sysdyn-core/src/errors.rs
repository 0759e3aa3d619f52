use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("equation not found: {0}")]
    UnknownEquation(String),
    #[error("parameter not found: {0}")]
    UnknownParameter(String),
    #[error("pipeline delay '{name}': delay {delay} is shorter than one time step of {delta_time}")]
    DelayTooShort {
        name: String,
        delay: f64,
        delta_time: f64,
    },
    #[error("failed to parse parameter file: {0}")]
    InvalidParameterFile(#[from] toml::de::Error),
}

/// Convenience type for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

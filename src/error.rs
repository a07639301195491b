use thiserror::Error;

/// Errors raised while configuring or running a grid-world MDP.
///
/// Out-of-range coordinates are not errors: queries degrade to
/// `Field::OutOfBounds` and setters are no-ops.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MdpError {
    #[error(
        "invalid step probabilities: forward={forward}, sidestep={sidestep}, \
         backstep={backstep}, nostep={nostep} ({reason})"
    )]
    InvalidProbabilities {
        forward: f64,
        sidestep: f64,
        backstep: f64,
        nostep: f64,
        reason: &'static str,
    },

    #[error("grid has no non-terminal cell to start an episode from")]
    NoStartPosition,

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("failed to read configuration file: {0}")]
    ConfigFile(#[from] config_file::ConfigFileError),

    #[error("failed to write reward trace: {0}")]
    Csv(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MdpError>;

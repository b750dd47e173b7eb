use std::error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]

/**
 * Error to represent a failed heat-diffusion run. None of these are locally
 * recoverable: a worker that sees one aborts, and so does the rest of the
 * group.
 */
pub enum Error {
    Partition { grid_size: usize, workers: usize },
    Allocation { elements: usize },
    Communication(String),
    Output(String),
    Config(String),
    Unstable { alpha: f64 },
    Aborted { rank: usize },
    Interrupted,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error was raised by a peer rather than this worker. Such
    /// errors have already been announced to the group.
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::Aborted { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Error::*;

        match self {
            Partition { grid_size, workers } => write!(
                fmt,
                "grid size {} is not divisible by the number of workers {}",
                grid_size, workers
            ),
            Allocation { elements } => write!(fmt, "failed to allocate {} grid cells", elements),
            Communication(msg) => write!(fmt, "communication failed: {}", msg),
            Output(msg) => write!(fmt, "failed to write output: {}", msg),
            Config(msg) => write!(fmt, "invalid configuration: {}", msg),
            Unstable { alpha } => write!(
                fmt,
                "diffusion coefficient {} exceeds the explicit stability bound 0.25",
                alpha
            ),
            Aborted { rank } => write!(fmt, "run aborted by worker {}", rank),
            Interrupted => write!(fmt, "run interrupted"),
        }
    }
}

impl error::Error for Error {}

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest diffusion coefficient for which the explicit 5-point scheme is
/// stable on a unit-spaced grid. The bound is inclusive: `alpha == 0.25` is
/// accepted, anything above it fails with `Error::Unstable`.
pub const MAX_STABLE_ALPHA: f64 = 0.25;

/// Smallest grid for which the heat source sits off the boundary columns.
pub const MIN_GRID_SIZE: usize = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]

/**
 * Run parameters. Every worker in a group must hold an identical copy; this
 * is verified by broadcast before the first step.
 */
pub struct Config {
    /// Number of rows and columns of the square grid.
    pub grid_size: usize,

    /// Number of simulation steps.
    pub steps: usize,

    /// Diffusion coefficient of the explicit update.
    pub alpha: f64,

    /// Temperature of every owned cell at start-up.
    pub initial_temp: f64,

    /// Temperature the heat source is pinned to.
    pub source_temp: f64,

    /// Temperature of the fixed boundary columns and of the region beyond
    /// the first and last global rows.
    pub boundary_temp: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grid_size: 100,
            steps: 500,
            alpha: 0.1,
            initial_temp: 20.0,
            source_temp: 100.0,
            boundary_temp: 20.0,
        }
    }
}

impl Config {
    /// Check the parameters independently of the worker count.
    pub fn validate(&self) -> Result<()> {
        if self.grid_size < MIN_GRID_SIZE {
            return Err(Error::Config(format!(
                "grid size must be at least {}, got {}",
                MIN_GRID_SIZE, self.grid_size
            )));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(Error::Config(format!(
                "diffusion coefficient must be finite and non-negative, got {}",
                self.alpha
            )));
        }
        if self.alpha > MAX_STABLE_ALPHA {
            return Err(Error::Unstable { alpha: self.alpha });
        }
        for (name, value) in [
            ("initial", self.initial_temp),
            ("source", self.source_temp),
            ("boundary", self.boundary_temp),
        ]
        .iter()
        {
            if !value.is_finite() {
                return Err(Error::Config(format!(
                    "{} temperature must be finite, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Global coordinate of the heat source: the center of the grid.
    pub fn source(&self) -> (usize, usize) {
        (self.grid_size / 2, self.grid_size / 2)
    }
}

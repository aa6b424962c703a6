//! Error types for the fluid simulation.
//!
//! Numerical edge cases (isolated particles, displacements beyond the kernel
//! support) are not errors: they are absorbed by the relaxation epsilon and by
//! the kernels returning zero. What remains here is configuration failures,
//! corrupted state, and bad caller input.

use thiserror::Error;

/// Fluid simulation errors.
#[derive(Error, Debug)]
pub enum FluidError {
    /// A parameter or setup request is out of its valid domain.
    #[error("invalid configuration: `{field}` {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    /// A frame produced a NaN or infinite value.
    #[error("non-finite {quantity} for particle {particle} in frame {frame}")]
    NonFiniteState {
        frame: u64,
        particle: usize,
        quantity: &'static str,
    },

    /// The simulation was corrupted by an earlier frame and must be reset.
    #[error("simulation corrupted in frame {frame}; reset particles before stepping again")]
    Corrupted { frame: u64 },

    /// A per-particle accessor was called with an invalid index.
    #[error("particle index {index} out of range (particle count {count})")]
    ParticleOutOfRange { index: usize, count: usize },

    /// Configuration file could not be read.
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl FluidError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }
}

pub type FluidResult<T> = Result<T, FluidError>;

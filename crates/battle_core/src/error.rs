//! Error types for the battle simulation.
//!
//! In-tick failures (no path, invalid target, empty magazine, budget
//! exhausted) are never errors: they degrade to "the unit does nothing
//! productive this tick" and surface as `None`/`false` results. This
//! type covers host API misuse and serialization only.

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Top-level error type for host-facing simulation APIs.
#[derive(Debug, Error)]
pub enum SimError {
    /// Referenced unit does not exist (or is already destroyed).
    #[error("Unit not found: {0}")]
    UnitNotFound(u64),

    /// Referenced building does not exist.
    #[error("Building not found: {0}")]
    BuildingNotFound(u64),

    /// Unit-type id missing from the catalog.
    #[error("Unknown unit type: {0}")]
    UnknownUnitType(String),

    /// Catalog file parsing error.
    #[error("Failed to parse catalog '{path}': {message}")]
    CatalogParseError {
        /// Path or label of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Invalid simulation state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// Desync detected between two lockstep peers.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}

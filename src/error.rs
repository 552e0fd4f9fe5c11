//! Error types for gridbot.
//!
//! Domain failures of robot actions (walls, empty inventory, ...) are *not* errors:
//! they are reported on the [`TraceEvent`](crate::action::TraceEvent) as a
//! [`FailureReason`](crate::action::FailureReason). The types here cover malformed
//! input, script faults, and runtime plumbing problems.

use thiserror::Error;

/// Validation errors raised while checking input data.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Grid size is non-positive or above the configured maximum.
    #[error("Grid dimensions {width}x{height} are invalid (max {max_width}x{max_height})")]
    InvalidDimensions {
        /// Requested width.
        width: i64,
        /// Requested height.
        height: i64,
        /// Configured width limit.
        max_width: u32,
        /// Configured height limit.
        max_height: u32,
    },

    /// A cell lies outside the grid.
    #[error("Coordinate ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        /// Column of the offending cell.
        x: i64,
        /// Row of the offending cell.
        y: i64,
        /// Grid width.
        width: u32,
        /// Grid height.
        height: u32,
    },

    /// A map key that is not of the form `"x,y"`.
    #[error("Invalid coordinate key '{key}', expected \"x,y\"")]
    InvalidCoordinateKey {
        /// The rejected key.
        key: String,
    },

    /// A count range with `min > max` or a negative bound.
    #[error("Invalid count range {min}-{max}")]
    InvalidRange {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },

    /// An orientation that is neither a code `0..=3` nor a known name.
    #[error("Invalid orientation code: {code}")]
    InvalidOrientation {
        /// The rejected code.
        code: String,
    },

    /// A configuration file or value that cannot be used.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it.
        reason: String,
    },

    /// A world document that does not describe a valid world.
    #[error("Invalid world document: {reason}")]
    InvalidDocument {
        /// What is wrong with it.
        reason: String,
    },
}

/// Execution errors raised while running builder scripts, programs, or playback.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A builder-script statement failed; earlier statements keep their effects.
    #[error("Builder statement #{index} ({op}) failed: {reason}")]
    BuilderScript {
        /// Zero-based position of the statement.
        index: usize,
        /// Statement name, e.g. `add_object`.
        op: String,
        /// Why it failed.
        reason: String,
    },

    /// The learner's program raised.
    #[error("Program fault: {message}")]
    HostScript {
        /// Message reported by the host.
        message: String,
    },

    /// Raised by primitives issued after `done()`; ends the program normally.
    #[error("Program already finished with done()")]
    ProgramFinished,

    /// `start` or a manual step was requested while a pass is running.
    #[error("Playback is already running")]
    PlaybackRunning,

    /// The engine was accessed from a trace listener while it was stepping.
    #[error("Engine re-entered from a trace listener")]
    Reentrant,
}

/// Top-level error type for gridbot.
#[derive(Debug, Error)]
pub enum GridError {
    /// Malformed input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Script or playback failure.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Runtime plumbing failure (poisoned lock, worker panic, I/O).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl GridError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a host-script fault, the error an embedded-language host reports when the
    /// learner's program raises.
    #[must_use]
    pub fn host(message: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::HostScript {
            message: message.into(),
        })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if this error only signals that `done()` ended the program.
    #[must_use]
    pub const fn is_program_finished(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::ProgramFinished))
    }
}

/// Result type alias for gridbot operations.
pub type GridResult<T> = Result<T, GridError>;

//! Robot actions and the trace events produced when they run.
//!
//! Actions are serializable so an event log can be exported and replayed by an
//! external player.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::world::World;

/// One atomic, queued robot command. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "message", rename_all = "snake_case")]
pub enum Action {
    /// Step one cell forward.
    Move,
    /// Quarter turn counter-clockwise.
    TurnLeft,
    /// Pick up one object from the current cell.
    Take,
    /// Drop the oldest carried object.
    Put,
    /// Drop one of the robot's tokens.
    PutToken,
    /// Pick up a token into the robot's token count.
    TakeToken,
    /// Wall off the edge the robot faces.
    BuildWall,
    /// Abandon every action still queued.
    Done,
    /// No-op that records a sensor reading in the event log.
    Trace(String),
}

impl Action {
    /// Primitive name as seen by scripts.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::TurnLeft => "turn_left",
            Self::Take => "take",
            Self::Put => "put",
            Self::PutToken => "put_token",
            Self::TakeToken => "take_token",
            Self::BuildWall => "build_wall",
            Self::Done => "done",
            Self::Trace(_) => "trace",
        }
    }

    /// True for sensor-trace records.
    #[must_use]
    pub const fn is_trace(&self) -> bool {
        matches!(self, Self::Trace(_))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace(message) => write!(f, "trace({message})"),
            other => write!(f, "{}()", other.name()),
        }
    }
}

/// Why an action was rejected. Reported on the event, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The move would leave the grid.
    OutOfBounds,
    /// A wall is on the edge ahead.
    BlockedByWall,
    /// Nothing to pick up on this cell.
    NoObjectHere,
    /// The robot has no tokens.
    NoTokenToPut,
    /// The robot carries nothing.
    NoItemToPut,
}

impl FailureReason {
    /// Wire code of this reason.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::OutOfBounds => "out_of_bounds",
            Self::BlockedByWall => "blocked_by_wall",
            Self::NoObjectHere => "no_object_here",
            Self::NoTokenToPut => "no_token_to_put",
            Self::NoItemToPut => "no_item_to_put",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of applying one transition rule.
pub type ActionOutcome = Result<(), FailureReason>;

/// A queued action together with the pacing delay active when it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    /// The queued command.
    pub action: Action,
    /// How long playback waits before running this action.
    pub delay: Duration,
}

/// The record of one attempted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Monotonic step counter (1 for the first step after a reset).
    pub step: u64,
    /// What was attempted.
    pub action: Action,
    /// Deep copy of the world before the transition.
    pub before: World,
    /// Deep copy after the transition; present only when `ok`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<World>,
    /// False if a rule rejected the action.
    pub ok: bool,
    /// Set exactly when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Wall-clock time of the step.
    pub recorded_at: DateTime<Utc>,
}

impl TraceEvent {
    /// The world as it stands after this event (unchanged on failure).
    #[must_use]
    pub fn resulting_world(&self) -> &World {
        self.after.as_ref().unwrap_or(&self.before)
    }
}

//! # gridbot - a grid-world robot with a paced action engine
//!
//! A program (written in any embedded language, treated here as an opaque host) drives a
//! robot across a bounded grid of walls and countable objects. Program calls are
//! queued on an [`ActionEngine`] and replayed later, one action per pacing interval,
//! with full forward and backward stepping. A shadow plan world answers the program's
//! sensor queries as if every issued action had already run.
//!
//! ## Core Concepts
//!
//! - **World**: grid size, robot pose, walls, object stacks, and an optional goal
//! - **Action**: one queued robot command; running it yields a [`TraceEvent`]
//! - **Plan world**: the predictive mirror kept by [`ShadowSynchronizer`]
//! - **Goal**: declarative success condition checked by [`goal::evaluate`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gridbot::{api, ActionEngine, GridConfig, ShadowSynchronizer, WorldBuilder, WorldDocument};
//!
//! let mut builder = WorldBuilder::new(GridConfig::default())?;
//! let doc = WorldDocument::from_json(r#"{"rows": 10, "cols": 10, "robots": [{"x": 1, "y": 1}]}"#)?;
//! let mut engine = ActionEngine::new(builder.build(&doc)?.world);
//!
//! let mut shadow = ShadowSynchronizer::new();
//! let mut program = api::from_fn(|robot: &mut api::RobotApi<'_>| {
//!     while !robot.wall_in_front()? {
//!         robot.move_forward()?;
//!     }
//!     Ok(())
//! });
//! api::run_program(&mut engine, &mut shadow, &mut program)?;
//!
//! while let Some(event) = engine.step() {
//!     println!("{} ok={}", event.action, event.ok);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// World model and rules
pub mod action;
pub mod error;
pub mod goal;
pub mod rules;
pub mod world;

// Execution
pub mod api;
pub mod engine;
pub mod shadow;

// Construction and ambient
pub mod builder;
pub mod config;
pub mod logging;

pub use action::{Action, ActionOutcome, FailureReason, TraceEvent};
pub use api::{run_program, PrimitiveCall, ProgramReport, RobotApi, ScriptHost};
pub use builder::{BuildOutcome, BuildWarning, Statement, WorldBuilder, WorldDocument};
pub use config::{Catalog, GridConfig};
pub use engine::{ActionEngine, PlaybackSummary, Player, SharedEngine, Subscription, SubscriptionId};
pub use error::{ExecutionError, GridError, GridResult, ValidationError};
pub use goal::{Goal, GoalPosition, GoalReport, GoalViolation, ObjectTarget};
pub use shadow::{RunId, ShadowSynchronizer};
pub use world::{
    Background, Coord, CountRange, Direction, Kind, ObjectStack, RobotPose, WallSegment, World,
};

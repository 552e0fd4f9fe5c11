//! Plan world kept in lock-step with the engine's queue.
//!
//! A running program decides its next action from sensor answers, but the committed
//! world only advances later, when playback steps the queue. The shadow synchronizer
//! closes that gap: every action a program issues is enqueued on the engine and applied
//! at once to a private plan world with the same [`rules`]. Sensors read the plan world.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{Action, ActionOutcome};
use crate::engine::ActionEngine;
use crate::rules;
use crate::world::World;

/// Identifier of one program run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Create a new random run ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of the plan world for the duration of a program run.
#[derive(Debug, Clone)]
pub struct ShadowSynchronizer {
    plan: Option<World>,
    delay: Duration,
    run_id: Option<RunId>,
}

impl Default for ShadowSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowSynchronizer {
    /// Creates an idle synchronizer with no plan world.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            plan: None,
            delay: Duration::ZERO,
            run_id: None,
        }
    }

    /// Starts a run: clones the engine's committed world into a fresh plan world and
    /// resets pacing to the engine default.
    pub fn begin(&mut self, engine: &ActionEngine) -> RunId {
        let id = RunId::new();
        self.plan = Some(engine.state());
        self.delay = engine.default_delay();
        self.run_id = Some(id);
        log::debug!("run {id}: plan world initialized");
        id
    }

    /// Ends the run and returns the final plan world.
    pub fn finish(&mut self) -> Option<World> {
        if let Some(id) = self.run_id.take() {
            log::debug!("run {id}: plan world released");
        }
        self.plan.take()
    }

    /// True between [`ShadowSynchronizer::begin`] and [`ShadowSynchronizer::finish`].
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.plan.is_some()
    }

    /// Id of the active run.
    #[must_use]
    pub const fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    /// Pacing delay attached to actions issued from now on.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Current pacing delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Enqueues `action` on the engine and applies it to the plan world.
    ///
    /// Returns the plan-world outcome, or `None` when no run is active (the action is then
    /// only enqueued).
    pub fn issue(&mut self, engine: &mut ActionEngine, action: Action) -> Option<ActionOutcome> {
        let outcome = self.plan.as_mut().map(|plan| rules::apply(plan, &action));
        engine.enqueue_paced(action, self.delay);
        outcome
    }

    /// World that sensors should read: the plan world, or the committed world outside a run.
    #[must_use]
    pub fn view<'a>(&'a self, engine: &ActionEngine) -> Cow<'a, World> {
        match &self.plan {
            Some(plan) => Cow::Borrowed(plan),
            None => Cow::Owned(engine.state()),
        }
    }
}

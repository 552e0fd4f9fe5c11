//! Primitive API called by program hosts.
//!
//! A host (an embedded-language interpreter, a closure, or a recorded list of
//! [`PrimitiveCall`]s) drives the robot through [`RobotApi`]. Action primitives enqueue
//! on the engine and advance the plan world; sensors answer from the plan world and leave
//! a `trace` action behind so the event log shows what the program observed.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionOutcome, FailureReason};
use crate::engine::ActionEngine;
use crate::error::{ExecutionError, GridError, GridResult};
use crate::goal;
use crate::rules;
use crate::shadow::{RunId, ShadowSynchronizer};
use crate::world::{Coord, Direction, Kind, World};

/// Predicted outcome of one issued action, as computed on the plan world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Issued {
    /// What the rules said on the plan world.
    pub outcome: ActionOutcome,
}

impl Issued {
    /// True if the action is predicted to succeed.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Predicted failure, if any.
    #[must_use]
    pub const fn reason(&self) -> Option<FailureReason> {
        match self.outcome {
            Ok(()) => None,
            Err(reason) => Some(reason),
        }
    }
}

/// Handle a host uses for the duration of one run.
#[derive(Debug)]
pub struct RobotApi<'a> {
    engine: &'a mut ActionEngine,
    shadow: &'a mut ShadowSynchronizer,
    finished: bool,
    issued: u64,
    predicted_failures: u64,
}

impl<'a> RobotApi<'a> {
    /// Binds the API to an engine, starting a plan world if none is active.
    pub fn new(engine: &'a mut ActionEngine, shadow: &'a mut ShadowSynchronizer) -> Self {
        if !shadow.is_active() {
            shadow.begin(engine);
        }
        Self {
            engine,
            shadow,
            finished: false,
            issued: 0,
            predicted_failures: 0,
        }
    }

    /// True once `done()` has been issued.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Deep copy of the plan world.
    #[must_use]
    pub fn plan(&self) -> World {
        self.shadow.view(self.engine).into_owned()
    }

    fn issue(&mut self, action: Action) -> GridResult<Issued> {
        if self.finished {
            return Err(ExecutionError::ProgramFinished.into());
        }
        let outcome = self.shadow.issue(self.engine, action).unwrap_or(Ok(()));
        self.issued += 1;
        if outcome.is_err() {
            self.predicted_failures += 1;
        }
        Ok(Issued { outcome })
    }

    fn record(&mut self, sensor: &str, answer: &str) -> GridResult<()> {
        self.issue(Action::Trace(format!("{sensor}() -> {answer}")))
            .map(|_| ())
    }

    /// Queues a step forward.
    pub fn move_forward(&mut self) -> GridResult<Issued> {
        self.issue(Action::Move)
    }

    /// Queues a left quarter turn.
    pub fn turn_left(&mut self) -> GridResult<Issued> {
        self.issue(Action::TurnLeft)
    }

    /// Queues picking up one object here.
    pub fn take(&mut self) -> GridResult<Issued> {
        self.issue(Action::Take)
    }

    /// Queues dropping the oldest carried object.
    pub fn put(&mut self) -> GridResult<Issued> {
        self.issue(Action::Put)
    }

    /// Queues dropping a token.
    pub fn put_token(&mut self) -> GridResult<Issued> {
        self.issue(Action::PutToken)
    }

    /// Queues picking up a token.
    pub fn take_token(&mut self) -> GridResult<Issued> {
        self.issue(Action::TakeToken)
    }

    /// Queues building a wall ahead.
    pub fn build_wall(&mut self) -> GridResult<Issued> {
        self.issue(Action::BuildWall)
    }

    /// Ends the program. Later primitives fail with [`ExecutionError::ProgramFinished`].
    pub fn done(&mut self) -> GridResult<Issued> {
        let issued = self.issue(Action::Done)?;
        self.finished = true;
        Ok(issued)
    }

    /// Sets the playback delay for every action issued after this call.
    pub fn think(&mut self, ms: u64) {
        self.shadow.set_delay(Duration::from_millis(ms));
    }

    /// True if a wall or the grid edge is directly ahead.
    pub fn wall_in_front(&mut self) -> GridResult<bool> {
        let answer = self.blocked_ahead();
        self.record("wall_in_front", &answer.to_string())?;
        Ok(answer)
    }

    /// Negation of [`RobotApi::wall_in_front`].
    pub fn front_is_clear(&mut self) -> GridResult<bool> {
        let answer = !self.blocked_ahead();
        self.record("front_is_clear", &answer.to_string())?;
        Ok(answer)
    }

    /// True if a wall or the grid edge is on the robot's right-hand side.
    pub fn wall_on_right(&mut self) -> GridResult<bool> {
        let answer = self.blocked_right();
        self.record("wall_on_right", &answer.to_string())?;
        Ok(answer)
    }

    /// Negation of [`RobotApi::wall_on_right`].
    pub fn right_is_clear(&mut self) -> GridResult<bool> {
        let answer = !self.blocked_right();
        self.record("right_is_clear", &answer.to_string())?;
        Ok(answer)
    }

    /// Kinds lying on the robot's cell, in name order.
    pub fn object_here(&mut self) -> GridResult<Vec<Kind>> {
        let kinds = {
            let view = self.shadow.view(self.engine);
            let (x, y) = (view.robot.x, view.robot.y);
            let mut kinds: Vec<Kind> = view.objects_at(x, y).map(|o| o.kind.clone()).collect();
            kinds.sort();
            kinds
        };
        self.record("object_here", &list(&kinds))?;
        Ok(kinds)
    }

    /// Carried kinds in pickup order.
    pub fn carries_object(&mut self) -> GridResult<Vec<Kind>> {
        let kinds: Vec<Kind> = self
            .shadow
            .view(self.engine)
            .robot
            .inventory
            .iter()
            .cloned()
            .collect();
        self.record("carries_object", &list(&kinds))?;
        Ok(kinds)
    }

    /// True if the plan world satisfies its goal (or has none).
    pub fn at_goal(&mut self) -> GridResult<bool> {
        let answer = goal::evaluate_world(&self.shadow.view(self.engine));
        self.record("at_goal", &answer.to_string())?;
        Ok(answer)
    }

    /// True if the robot faces north.
    pub fn is_facing_north(&mut self) -> GridResult<bool> {
        let answer = self.shadow.view(self.engine).robot.dir == Direction::North;
        self.record("is_facing_north", &answer.to_string())?;
        Ok(answer)
    }

    /// The robot's cell on the plan world.
    pub fn position(&mut self) -> GridResult<Coord> {
        let at = self.shadow.view(self.engine).robot.position();
        self.record("position", &at.to_string())?;
        Ok(at)
    }

    fn blocked_ahead(&self) -> bool {
        rules::destination(&self.shadow.view(self.engine)).is_err()
    }

    fn blocked_right(&self) -> bool {
        let view = self.shadow.view(self.engine);
        let robot = &view.robot;
        let right = robot.dir.turn_right();
        let next = robot.position().step(right);
        !view.in_bounds(next.x, next.y) || view.wall_blocks(robot.x, robot.y, right)
    }
}

fn list(kinds: &[Kind]) -> String {
    format!("[{}]", kinds.join(", "))
}

/// An opaque program host.
pub trait ScriptHost {
    /// Runs the whole program against `api`.
    ///
    /// Returning [`ExecutionError::ProgramFinished`] (what primitives raise after
    /// `done()`) counts as normal termination.
    fn run(&mut self, api: &mut RobotApi<'_>) -> GridResult<()>;
}

/// Host backed by a closure. Build one with [`from_fn`].
pub struct FnHost<F>(F);

impl<F> std::fmt::Debug for FnHost<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnHost")
    }
}

/// Wraps a closure as a [`ScriptHost`].
pub fn from_fn<F>(f: F) -> FnHost<F>
where
    F: FnMut(&mut RobotApi<'_>) -> GridResult<()>,
{
    FnHost(f)
}

impl<F> ScriptHost for FnHost<F>
where
    F: FnMut(&mut RobotApi<'_>) -> GridResult<()>,
{
    fn run(&mut self, api: &mut RobotApi<'_>) -> GridResult<()> {
        (self.0)(api)
    }
}

/// One recorded primitive call. Each variant invokes the [`RobotApi`] method of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum PrimitiveCall {
    /// [`RobotApi::move_forward`].
    #[serde(alias = "move_forward")]
    Move,
    /// [`RobotApi::turn_left`].
    TurnLeft,
    /// [`RobotApi::take`].
    Take,
    /// [`RobotApi::put`].
    Put,
    /// [`RobotApi::put_token`].
    PutToken,
    /// [`RobotApi::take_token`].
    TakeToken,
    /// [`RobotApi::build_wall`].
    BuildWall,
    /// [`RobotApi::done`].
    Done,
    /// [`RobotApi::think`].
    Think {
        /// Pacing delay in milliseconds.
        ms: u64,
    },
    /// [`RobotApi::wall_in_front`].
    WallInFront,
    /// [`RobotApi::front_is_clear`].
    FrontIsClear,
    /// [`RobotApi::wall_on_right`].
    WallOnRight,
    /// [`RobotApi::right_is_clear`].
    RightIsClear,
    /// [`RobotApi::object_here`].
    ObjectHere,
    /// [`RobotApi::carries_object`].
    CarriesObject,
    /// [`RobotApi::at_goal`].
    AtGoal,
    /// [`RobotApi::is_facing_north`].
    IsFacingNorth,
    /// [`RobotApi::position`].
    Position,
}

static CALL_LINE: OnceLock<Regex> = OnceLock::new();

fn call_re() -> &'static Regex {
    CALL_LINE.get_or_init(|| {
        Regex::new(r"^([a-z_]+)\s*\(\s*(\d*)\s*\)$").expect("call pattern is valid")
    })
}

impl PrimitiveCall {
    /// Parses one call written as `name()` or `think(ms)`.
    pub fn parse(text: &str) -> GridResult<Self> {
        let text = text.trim();
        let fault = |message: String| GridError::host(message);
        let caps = call_re()
            .captures(text)
            .ok_or_else(|| fault(format!("not a primitive call: {text}")))?;
        let name = &caps[1];
        let arg = &caps[2];

        if name == "think" {
            let ms = arg
                .parse::<u64>()
                .map_err(|_| fault(format!("think() needs a delay in ms: {text}")))?;
            return Ok(Self::Think { ms });
        }
        if !arg.is_empty() {
            return Err(fault(format!("{name}() takes no arguments")));
        }
        let call = match name {
            "move" | "move_forward" => Self::Move,
            "turn_left" => Self::TurnLeft,
            "take" => Self::Take,
            "put" => Self::Put,
            "put_token" => Self::PutToken,
            "take_token" => Self::TakeToken,
            "build_wall" => Self::BuildWall,
            "done" => Self::Done,
            "wall_in_front" => Self::WallInFront,
            "front_is_clear" => Self::FrontIsClear,
            "wall_on_right" => Self::WallOnRight,
            "right_is_clear" => Self::RightIsClear,
            "object_here" => Self::ObjectHere,
            "carries_object" => Self::CarriesObject,
            "at_goal" => Self::AtGoal,
            "is_facing_north" => Self::IsFacingNorth,
            "position" => Self::Position,
            other => return Err(fault(format!("unknown primitive: {other}()"))),
        };
        Ok(call)
    }

    /// Parses a call list separated by newlines or `;`. `#` starts a comment.
    pub fn parse_program(source: &str) -> GridResult<Vec<Self>> {
        source
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default())
            .flat_map(|line| line.split(';'))
            .map(str::trim)
            .filter(|call| !call.is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Performs this call. Sensor answers are only recorded as traces.
    pub fn invoke(&self, api: &mut RobotApi<'_>) -> GridResult<()> {
        match self {
            Self::Move => api.move_forward().map(drop),
            Self::TurnLeft => api.turn_left().map(drop),
            Self::Take => api.take().map(drop),
            Self::Put => api.put().map(drop),
            Self::PutToken => api.put_token().map(drop),
            Self::TakeToken => api.take_token().map(drop),
            Self::BuildWall => api.build_wall().map(drop),
            Self::Done => api.done().map(drop),
            Self::Think { ms } => {
                api.think(*ms);
                Ok(())
            }
            Self::WallInFront => api.wall_in_front().map(drop),
            Self::FrontIsClear => api.front_is_clear().map(drop),
            Self::WallOnRight => api.wall_on_right().map(drop),
            Self::RightIsClear => api.right_is_clear().map(drop),
            Self::ObjectHere => api.object_here().map(drop),
            Self::CarriesObject => api.carries_object().map(drop),
            Self::AtGoal => api.at_goal().map(drop),
            Self::IsFacingNorth => api.is_facing_north().map(drop),
            Self::Position => api.position().map(drop),
        }
    }
}

impl ScriptHost for Vec<PrimitiveCall> {
    fn run(&mut self, api: &mut RobotApi<'_>) -> GridResult<()> {
        for call in self.iter() {
            call.invoke(api)?;
        }
        Ok(())
    }
}

/// Outcome of one program run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramReport {
    /// The run this report belongs to.
    pub run_id: RunId,
    /// Actions enqueued, sensor traces included.
    pub issued: u64,
    /// Actions the plan world predicts will fail.
    pub predicted_failures: u64,
    /// True if the program ended with `done()`.
    pub finished: bool,
    /// Final plan world.
    pub plan: World,
}

/// Runs `host` against a fresh plan world cloned from `engine`.
///
/// Actions are only enqueued; stepping them is up to the caller or a
/// [`Player`](crate::engine::Player). A host fault is logged and returned. Actions the
/// program issued before the fault stay queued.
pub fn run_program<H>(
    engine: &mut ActionEngine,
    shadow: &mut ShadowSynchronizer,
    host: &mut H,
) -> GridResult<ProgramReport>
where
    H: ScriptHost + ?Sized,
{
    let run_id = shadow.begin(engine);
    let (result, issued, predicted_failures, finished) = {
        let mut api = RobotApi::new(engine, shadow);
        let result = host.run(&mut api);
        (result, api.issued, api.predicted_failures, api.finished)
    };
    let plan = shadow.finish().unwrap_or_else(|| engine.state());

    match result {
        Err(err) if !err.is_program_finished() => {
            log::error!("run {run_id} aborted after {issued} action(s): {err}");
            return Err(err);
        }
        _ => {}
    }

    log::info!(
        "run {run_id}: {issued} action(s) queued, {predicted_failures} predicted failure(s)"
    );
    Ok(ProgramReport {
        run_id,
        issued,
        predicted_failures,
        finished,
        plan,
    })
}

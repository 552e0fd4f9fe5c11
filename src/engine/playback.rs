//! Timer-paced playback of the engine's queue.
//!
//! A [`Player`] shares the engine through a [`SharedEngine`] handle and drains it on a
//! dedicated worker thread, waiting each pending action's pacing delay before calling
//! [`ActionEngine::step`]. Stopping is deterministic: the cancel flag is checked under
//! the engine lock right before each step, and [`Player::stop`] joins the worker, so no
//! step fires once `stop` (or `reset`) has returned.
//!
//! Trace listeners run while the engine lock is held. A listener that reaches back into
//! the engine through a [`SharedEngine`] gets [`ExecutionError::Reentrant`] instead of
//! deadlocking.

use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::action::TraceEvent;
use crate::api::{self, ProgramReport, ScriptHost};
use crate::error::{ExecutionError, GridError, GridResult};
use crate::goal::GoalReport;
use crate::shadow::ShadowSynchronizer;
use crate::world::World;

use super::ActionEngine;

thread_local! {
    /// Set while this thread holds a [`SharedEngine`] lock.
    static HOLDS_ENGINE: Cell<bool> = const { Cell::new(false) };
}

/// Exclusive access to a shared engine. Clears the holder flag on drop.
struct EngineGuard<'a> {
    guard: MutexGuard<'a, ActionEngine>,
}

impl Deref for EngineGuard<'_> {
    type Target = ActionEngine;

    fn deref(&self) -> &ActionEngine {
        &self.guard
    }
}

impl DerefMut for EngineGuard<'_> {
    fn deref_mut(&mut self) -> &mut ActionEngine {
        &mut self.guard
    }
}

impl Drop for EngineGuard<'_> {
    fn drop(&mut self) {
        HOLDS_ENGINE.with(|held| held.set(false));
    }
}

/// Cloneable handle to an engine owned by a [`Player`].
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<ActionEngine>>,
}

impl std::fmt::Debug for SharedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedEngine").finish_non_exhaustive()
    }
}

impl SharedEngine {
    fn new(engine: ActionEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    fn lock(&self) -> GridResult<EngineGuard<'_>> {
        if HOLDS_ENGINE.with(Cell::get) {
            return Err(ExecutionError::Reentrant.into());
        }
        let guard = self
            .inner
            .lock()
            .map_err(|_| GridError::internal("engine lock poisoned"))?;
        HOLDS_ENGINE.with(|held| held.set(true));
        Ok(EngineGuard { guard })
    }

    /// Runs `f` with exclusive access to the engine.
    ///
    /// Fails with [`ExecutionError::Reentrant`] when called while this thread already
    /// holds the engine, e.g. from a trace listener during a step.
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut ActionEngine) -> T) -> GridResult<T> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    /// Deep copy of the committed world.
    pub fn state(&self) -> GridResult<World> {
        self.with_engine(|e| e.state())
    }
}

/// What one playback pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSummary {
    /// Steps executed by this pass.
    pub steps: u64,
    /// Steps that produced `ok == false`.
    pub failures: u64,
    /// True if the pass was stopped before the queue ran dry.
    pub cancelled: bool,
    /// Goal verdict once the queue is exhausted; `None` if cancelled.
    pub goal_met: Option<bool>,
    /// Goal violations at the end of the pass, when the world has a goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<GoalReport>,
}

struct Worker {
    stop_tx: Sender<()>,
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<PlaybackSummary>,
}

/// Paced, cancellable consumer of an [`ActionEngine`].
pub struct Player {
    engine: SharedEngine,
    worker: Option<Worker>,
}

impl std::fmt::Debug for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Player {
    /// Takes ownership of `engine`.
    #[must_use]
    pub fn new(engine: ActionEngine) -> Self {
        Self {
            engine: SharedEngine::new(engine),
            worker: None,
        }
    }

    /// Shared handle to the engine, for observers and listeners.
    #[must_use]
    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    /// Runs `f` with exclusive access to the engine. See [`SharedEngine::with_engine`].
    pub fn with_engine<T>(&self, f: impl FnOnce(&mut ActionEngine) -> T) -> GridResult<T> {
        self.engine.with_engine(f)
    }

    /// Deep copy of the committed world.
    pub fn state(&self) -> GridResult<World> {
        self.engine.state()
    }

    /// True while a playback pass is draining the queue.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.handle.is_finished())
    }

    /// Starts draining the queue in the background.
    pub fn start(&mut self) -> GridResult<()> {
        if self.is_running() {
            return Err(ExecutionError::PlaybackRunning.into());
        }
        // Reap a finished pass.
        self.join_worker()?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let cancelled = Arc::new(AtomicBool::new(false));
        let engine = self.engine.clone();
        let thread_cancelled = Arc::clone(&cancelled);
        let handle = thread::Builder::new()
            .name("gridbot-playback".to_string())
            .spawn(move || playback_loop(&engine, &thread_cancelled, &stop_rx))
            .map_err(|e| GridError::internal(format!("failed to spawn playback worker: {e}")))?;

        self.worker = Some(Worker {
            stop_tx,
            cancelled,
            handle,
        });
        Ok(())
    }

    /// Cancels the running pass and waits for the worker to exit.
    ///
    /// Returns the summary of the pass, or `None` if nothing was started.
    pub fn stop(&mut self) -> GridResult<Option<PlaybackSummary>> {
        if let Some(worker) = &self.worker {
            worker.cancelled.store(true, Ordering::Release);
            let _ = worker.stop_tx.try_send(());
        }
        self.join_worker()
    }

    /// Blocks until the current pass drains the queue (or is stopped elsewhere).
    pub fn wait(&mut self) -> GridResult<Option<PlaybackSummary>> {
        self.join_worker()
    }

    /// Stops playback, then resets the engine to `world` (or its original).
    pub fn reset(&mut self, world: Option<World>) -> GridResult<()> {
        self.stop()?;
        self.with_engine(|e| e.reset(world))
    }

    /// Single manual step forward. Not allowed while a pass is running.
    pub fn step_forward(&mut self) -> GridResult<Option<TraceEvent>> {
        self.ensure_idle()?;
        self.with_engine(ActionEngine::step)
    }

    /// Single manual step back. Not allowed while a pass is running.
    pub fn step_back(&mut self) -> GridResult<Option<World>> {
        self.ensure_idle()?;
        self.with_engine(ActionEngine::step_prev)
    }

    /// Starts a new run: stops playback, resets the engine to its original world, and
    /// runs `host` against it. The queued actions are left for [`Player::start`].
    pub fn run_program<H>(&mut self, shadow: &mut ShadowSynchronizer, host: &mut H) -> GridResult<ProgramReport>
    where
        H: ScriptHost + ?Sized,
    {
        self.stop()?;
        let mut guard = self.engine.lock()?;
        guard.reset(None);
        api::run_program(&mut guard, shadow, host)
    }

    fn ensure_idle(&self) -> GridResult<()> {
        if self.is_running() {
            return Err(ExecutionError::PlaybackRunning.into());
        }
        Ok(())
    }

    fn join_worker(&mut self) -> GridResult<Option<PlaybackSummary>> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        worker
            .handle
            .join()
            .map(Some)
            .map_err(|_| GridError::internal("playback worker panicked"))
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        // Deterministic shutdown: no step may fire after the player is gone.
        if let Err(err) = self.stop() {
            log::warn!("playback shutdown: {err}");
        }
    }
}

fn playback_loop(engine: &SharedEngine, cancelled: &AtomicBool, stop_rx: &Receiver<()>) -> PlaybackSummary {
    let mut summary = PlaybackSummary::default();

    loop {
        let delay = match engine.with_engine(|e| e.next_delay()) {
            Ok(delay) => delay,
            Err(err) => {
                log::error!("playback stopped: {err}");
                summary.cancelled = true;
                break;
            }
        };

        if let Some(delay) = delay {
            select! {
                recv(stop_rx) -> _ => {
                    summary.cancelled = true;
                    break;
                }
                default(delay) => {}
            }
        }

        let mut guard = match engine.lock() {
            Ok(guard) => guard,
            Err(err) => {
                log::error!("playback stopped: {err}");
                summary.cancelled = true;
                break;
            }
        };
        if cancelled.load(Ordering::Acquire) {
            summary.cancelled = true;
            break;
        }

        match guard.step() {
            Some(event) => {
                summary.steps += 1;
                if !event.ok {
                    summary.failures += 1;
                }
            }
            None => {
                let met = guard.goal_met();
                summary.goal_met = Some(met);
                summary.goal = guard.goal_report();
                log::info!(
                    "playback finished after {} step(s), {} failure(s), goal met: {met}",
                    summary.steps,
                    summary.failures
                );
                break;
            }
        }
    }

    summary
}

//! Action engine: the single owner of the committed world.
//!
//! The engine keeps a FIFO queue of pending actions and a LIFO history of executed
//! events. [`ActionEngine::step`] is the only code path that mutates the committed
//! world; [`ActionEngine::step_prev`] undoes by restoring the event's `before`
//! snapshot rather than by replaying an inverse action.
//!
//! The engine itself is single-threaded. Timer-paced playback lives in [`playback`].

/// Timer-paced playback consumer.
pub mod playback;
/// Trace-event subscriptions.
pub mod subscription;

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::action::{Action, PendingAction, TraceEvent};
use crate::config::GridConfig;
use crate::goal::{self, GoalReport};
use crate::rules;
use crate::world::World;

pub use playback::{PlaybackSummary, Player, SharedEngine};
pub use subscription::{Listener, Subscription, SubscriptionId};

use subscription::ListenerRegistry;

/// One executed step, with what undo needs to restore the queue.
#[derive(Debug, Clone)]
struct HistoryEntry {
    event: TraceEvent,
    delay: Duration,
    /// Actions a `done` abandoned, in queue order.
    discarded: Vec<PendingAction>,
}

/// Owns the committed world, the pending queue, and the executed-event history.
#[derive(Debug)]
pub struct ActionEngine {
    original: World,
    world: World,
    queue: VecDeque<PendingAction>,
    history: Vec<HistoryEntry>,
    step_counter: u64,
    default_delay: Duration,
    listeners: ListenerRegistry,
}

impl ActionEngine {
    /// Create an engine over `world` with the default configuration.
    #[must_use]
    pub fn new(world: World) -> Self {
        Self::with_config(world, &GridConfig::default())
    }

    /// Create an engine over `world`.
    #[must_use]
    pub fn with_config(world: World, config: &GridConfig) -> Self {
        Self {
            original: world.clone(),
            world,
            queue: VecDeque::new(),
            history: Vec::new(),
            step_counter: 0,
            default_delay: config.default_delay(),
            listeners: ListenerRegistry::default(),
        }
    }

    /// Appends an action using the engine's default pacing delay.
    pub fn enqueue(&mut self, action: Action) {
        self.enqueue_paced(action, self.default_delay);
    }

    /// Appends an action that playback runs after `delay`. No validation happens here.
    pub fn enqueue_paced(&mut self, action: Action, delay: Duration) {
        self.queue.push_back(PendingAction { action, delay });
    }

    /// Runs the head of the queue.
    ///
    /// Returns `None` when the queue is empty. A rejected action still produces an event
    /// (`ok == false`) and is consumed.
    pub fn step(&mut self) -> Option<TraceEvent> {
        let PendingAction { action, delay } = self.queue.pop_front()?;

        let before = self.world.clone();
        let outcome = rules::apply(&mut self.world, &action);

        let discarded = if action == Action::Done {
            let abandoned: Vec<PendingAction> = self.queue.drain(..).collect();
            if !abandoned.is_empty() {
                log::debug!("done() abandoned {} queued action(s)", abandoned.len());
            }
            abandoned
        } else {
            Vec::new()
        };

        self.step_counter += 1;
        let event = TraceEvent {
            step: self.step_counter,
            after: outcome.is_ok().then(|| self.world.clone()),
            ok: outcome.is_ok(),
            reason: outcome.err(),
            action,
            before,
            recorded_at: Utc::now(),
        };

        match event.reason {
            None => log::debug!("step {}: {}", event.step, event.action),
            Some(reason) => log::info!("step {}: {} failed: {reason}", event.step, event.action),
        }

        self.history.push(HistoryEntry {
            event: event.clone(),
            delay,
            discarded,
        });
        self.listeners.notify(&event);
        Some(event)
    }

    /// Undoes the most recent step.
    ///
    /// Restores the committed world to that event's `before` snapshot and puts its
    /// action back at the front of the queue (behind nothing, ahead of everything).
    /// Returns the restored world, or `None` if there is nothing to undo.
    pub fn step_prev(&mut self) -> Option<World> {
        let HistoryEntry {
            event,
            delay,
            discarded,
        } = self.history.pop()?;

        for pending in discarded.into_iter().rev() {
            self.queue.push_front(pending);
        }
        self.queue.push_front(PendingAction {
            action: event.action,
            delay,
        });
        self.world = event.before;
        self.step_counter = self.step_counter.saturating_sub(1);

        log::debug!("undo to step {}", self.step_counter);
        Some(self.world.clone())
    }

    /// Replaces the committed world with `world` (or the original) and clears the queue,
    /// the history, and the step counter.
    pub fn reset(&mut self, world: Option<World>) {
        self.world = world.unwrap_or_else(|| self.original.clone());
        self.queue.clear();
        self.history.clear();
        self.step_counter = 0;
    }

    /// Resets to the original world with every ranged object count drawn again.
    pub fn reset_randomized<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut world = self.original.clone();
        world.rerandomize(rng);
        self.reset(Some(world));
    }

    /// Deep copy of the committed world.
    #[must_use]
    pub fn state(&self) -> World {
        self.world.clone()
    }

    /// Deep copy of the world the engine was created with.
    #[must_use]
    pub fn original_state(&self) -> World {
        self.original.clone()
    }

    /// Registers a listener for every event produced from now on.
    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&TraceEvent) + Send + 'static,
    {
        self.listeners.register(Box::new(listener))
    }

    /// Number of active listeners.
    pub fn listener_count(&mut self) -> usize {
        self.listeners.len()
    }

    /// Actions still waiting, head first.
    pub fn pending(&self) -> impl Iterator<Item = &Action> + '_ {
        self.queue.iter().map(|p| &p.action)
    }

    /// Number of actions still waiting.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Pacing delay of the next action, if any.
    #[must_use]
    pub fn next_delay(&self) -> Option<Duration> {
        self.queue.front().map(|p| p.delay)
    }

    /// Executed events, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TraceEvent> + '_ {
        self.history.iter().map(|h| &h.event)
    }

    /// Steps taken since the last reset.
    #[must_use]
    pub const fn step_count(&self) -> u64 {
        self.step_counter
    }

    /// Pacing delay a new run starts with.
    #[must_use]
    pub const fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty()
    }

    /// Goal check of the committed world; `None` when the world has no goal.
    #[must_use]
    pub fn goal_report(&self) -> Option<GoalReport> {
        self.world.goal.as_ref().map(|g| goal::check(&self.world, g))
    }

    /// True if the committed world satisfies its goal (or has none).
    #[must_use]
    pub fn goal_met(&self) -> bool {
        goal::evaluate_world(&self.world)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::action::FailureReason;
    use crate::world::{Direction, RobotPose};

    fn engine(x: i32, y: i32, dir: Direction) -> ActionEngine {
        ActionEngine::new(World::new(10, 10, RobotPose::new(x, y, dir)).unwrap())
    }

    #[test]
    fn empty_queue_is_distinct_from_failure() {
        let mut e = engine(1, 1, Direction::West);
        assert!(e.step().is_none());

        e.enqueue(Action::Move);
        let ev = e.step().unwrap();
        assert!(!ev.ok);
        assert_eq!(ev.reason, Some(FailureReason::OutOfBounds));
        assert!(ev.after.is_none());
        assert_eq!(e.state().robot, RobotPose::new(1, 1, Direction::West));
        assert!(e.is_drained());
    }

    #[test]
    fn step_snapshots_are_independent_copies() {
        let mut e = engine(1, 1, Direction::East);
        e.enqueue(Action::Move);
        let ev = e.step().unwrap();
        assert_eq!(ev.before.robot.x, 1);
        assert_eq!(ev.after.as_ref().unwrap().robot.x, 2);

        let mut copy = e.state();
        copy.robot.x = 9;
        assert_eq!(e.state().robot.x, 2);
    }

    #[test]
    fn step_prev_restores_and_requeues_at_front() {
        let mut e = engine(1, 1, Direction::East);
        e.enqueue(Action::Move);
        e.enqueue(Action::TurnLeft);

        let pre = e.state();
        e.step().unwrap();
        assert_eq!(e.step_count(), 1);

        let restored = e.step_prev().unwrap();
        assert_eq!(restored, pre);
        assert_eq!(e.state(), pre);
        assert_eq!(e.step_count(), 0);
        assert_eq!(e.pending().cloned().collect::<Vec<_>>(), vec![Action::Move, Action::TurnLeft]);

        assert!(e.step_prev().is_none());
        assert_eq!(e.step_count(), 0);
    }

    #[test]
    fn step_prev_is_lifo_across_many_undos() {
        let mut e = engine(1, 1, Direction::East);
        for _ in 0..3 {
            e.enqueue(Action::Move);
        }
        let s0 = e.state();
        e.step();
        let s1 = e.state();
        e.step();
        e.step();

        e.step_prev();
        e.step_prev();
        assert_eq!(e.state(), s1);
        e.step_prev();
        assert_eq!(e.state(), s0);
        assert_eq!(e.pending_len(), 3);
    }

    #[test]
    fn done_discards_rest_and_undo_brings_it_back() {
        let mut e = engine(1, 1, Direction::East);
        e.enqueue(Action::Move);
        e.enqueue(Action::Done);
        e.enqueue(Action::Move);
        e.enqueue(Action::Move);

        e.step().unwrap();
        let done = e.step().unwrap();
        assert!(done.ok);
        assert!(e.is_drained());
        assert!(e.step().is_none());
        assert_eq!(e.state().robot.x, 2);

        e.step_prev().unwrap();
        assert_eq!(
            e.pending().cloned().collect::<Vec<_>>(),
            vec![Action::Done, Action::Move, Action::Move]
        );
    }

    #[test]
    fn reset_clears_queue_history_and_counter() {
        let mut e = engine(1, 1, Direction::East);
        e.enqueue(Action::Move);
        e.enqueue(Action::Move);
        e.step();

        e.reset(None);
        assert_eq!(e.state(), e.original_state());
        assert_eq!(e.pending_len(), 0);
        assert_eq!(e.history().count(), 0);
        assert_eq!(e.step_count(), 0);

        let other = World::new(3, 3, RobotPose::new(2, 2, Direction::South)).unwrap();
        e.reset(Some(other.clone()));
        assert_eq!(e.state(), other);
        e.reset(None);
        assert_eq!(e.state().width, 10);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let mut e = engine(1, 1, Direction::East);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let a = Arc::clone(&seen);
        let _sa = e.subscribe(move |ev| a.lock().unwrap().push(("a", ev.step)));
        let b = Arc::clone(&seen);
        let sb = e.subscribe(move |ev| b.lock().unwrap().push(("b", ev.step)));

        e.enqueue(Action::Move);
        e.enqueue(Action::Move);
        e.step();
        sb.unsubscribe();
        e.step();

        assert_eq!(*seen.lock().unwrap(), vec![("a", 1), ("b", 1), ("a", 2)]);
        assert_eq!(e.listener_count(), 1);
    }

    #[test]
    fn dropping_handle_unsubscribes_unless_detached() {
        let mut e = engine(1, 1, Direction::East);
        let hits = Arc::new(Mutex::new(0u32));

        let h = Arc::clone(&hits);
        drop(e.subscribe(move |_| *h.lock().unwrap() += 1));
        let h = Arc::clone(&hits);
        e.subscribe(move |_| *h.lock().unwrap() += 10).detach();

        e.enqueue(Action::TurnLeft);
        e.step();
        assert_eq!(*hits.lock().unwrap(), 10);
    }

    #[test]
    fn unsubscribing_releases_listener_captures() {
        let mut e = engine(1, 1, Direction::East);
        let state = Arc::new(Mutex::new(0u32));

        let captured = Arc::clone(&state);
        let sub = e.subscribe(move |_| *captured.lock().unwrap() += 1);
        assert_eq!(Arc::strong_count(&state), 2);

        sub.unsubscribe();
        // Removal happens on the next registry access.
        assert_eq!(e.listener_count(), 0);
        assert_eq!(Arc::strong_count(&state), 1);
    }

    #[test]
    fn listener_can_unsubscribe_a_later_listener_mid_delivery() {
        let mut e = engine(1, 1, Direction::East);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let v = Arc::clone(&victim);
        let s1 = Arc::clone(&seen);
        e.subscribe(move |_| {
            s1.lock().unwrap().push("first");
            if let Some(sub) = v.lock().unwrap().take() {
                sub.unsubscribe();
            }
        })
        .detach();

        let s2 = Arc::clone(&seen);
        let sub = e.subscribe(move |_| s2.lock().unwrap().push("second"));
        *victim.lock().unwrap() = Some(sub);

        e.enqueue(Action::TurnLeft);
        e.step();
        assert_eq!(*seen.lock().unwrap(), vec!["first"]);
    }

    #[test]
    fn paced_actions_keep_their_delay() {
        let mut e = engine(1, 1, Direction::East);
        e.enqueue(Action::Move);
        e.enqueue_paced(Action::Move, Duration::from_millis(5));
        assert_eq!(e.next_delay(), Some(e.default_delay()));
        e.step();
        assert_eq!(e.next_delay(), Some(Duration::from_millis(5)));
        e.step();
        assert_eq!(e.next_delay(), None);
    }

    #[test]
    fn reset_randomized_redraws_from_original() {
        use rand::SeedableRng;
        use crate::world::CountRange;

        let mut world = World::new(5, 5, RobotPose::new(1, 1, Direction::North)).unwrap();
        let idx = world.add_objects(1, 1, "carrot", 2).unwrap();
        world.objects[idx].range = Some(CountRange::new(1, 4).unwrap());
        world.objects[idx].hidden = true;

        let mut e = ActionEngine::new(world);
        e.enqueue(Action::Take);
        e.step();

        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        e.reset_randomized(&mut rng);
        let state = e.state();
        assert!(state.robot.inventory.is_empty());
        let stack = &state.objects[0];
        assert!((1..=4).contains(&stack.count));
        assert!(stack.hidden);
    }
}

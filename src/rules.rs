//! Transition rules shared by the action engine and the shadow synchronizer.
//!
//! Each rule is a deterministic function of the world and the action. A rejected
//! action leaves the world untouched. Queue-level effects (`done` abandoning the
//! queue) belong to the engine; here `done` and `trace` are no-ops.

use crate::action::{Action, ActionOutcome, FailureReason};
use crate::world::{Coord, World, TOKEN_KIND};

/// Applies `action` to `world`.
pub fn apply(world: &mut World, action: &Action) -> ActionOutcome {
    match action {
        Action::Move => move_robot(world),
        Action::TurnLeft => {
            world.robot.dir = world.robot.dir.turn_left();
            Ok(())
        }
        Action::Take => take(world),
        Action::Put => put(world),
        Action::PutToken => put_token(world),
        Action::TakeToken => take_token(world),
        Action::BuildWall => {
            let robot = &world.robot;
            let (x, y, dir) = (robot.x, robot.y, robot.dir);
            world.add_wall(x, y, dir);
            Ok(())
        }
        Action::Done | Action::Trace(_) => Ok(()),
    }
}

/// Cell the robot would reach by moving forward, or why it cannot.
pub fn destination(world: &World) -> Result<Coord, FailureReason> {
    let robot = &world.robot;
    let next = robot.position().step(robot.dir);
    if !world.in_bounds(next.x, next.y) {
        return Err(FailureReason::OutOfBounds);
    }
    if world.wall_blocks(robot.x, robot.y, robot.dir) {
        return Err(FailureReason::BlockedByWall);
    }
    Ok(next)
}

fn move_robot(world: &mut World) -> ActionOutcome {
    let next = destination(world)?;
    world.robot.x = next.x;
    world.robot.y = next.y;
    Ok(())
}

/// Index of the stack `take` would draw from: goal-marked stacks first, then by kind name.
#[must_use]
pub fn take_candidate(world: &World) -> Option<usize> {
    let (x, y) = (world.robot.x, world.robot.y);
    world
        .objects
        .iter()
        .enumerate()
        .filter(|(_, o)| o.x == x && o.y == y && o.count > 0)
        .min_by(|(_, a), (_, b)| {
            b.goal_mark
                .cmp(&a.goal_mark)
                .then_with(|| a.kind.cmp(&b.kind))
        })
        .map(|(idx, _)| idx)
}

fn take(world: &mut World) -> ActionOutcome {
    let idx = take_candidate(world).ok_or(FailureReason::NoObjectHere)?;
    if let Some(stack) = world.objects.get_mut(idx) {
        stack.hidden = false;
    }
    let kind = world.take_one(idx).ok_or(FailureReason::NoObjectHere)?;
    world.robot.inventory.push_back(kind);
    Ok(())
}

fn put(world: &mut World) -> ActionOutcome {
    let kind = world
        .robot
        .inventory
        .pop_front()
        .ok_or(FailureReason::NoItemToPut)?;
    let (x, y) = (world.robot.x, world.robot.y);
    if let Some(stack) = world.add_objects(x, y, &kind, 1).and_then(|idx| world.objects.get_mut(idx)) {
        stack.hidden = false;
    }
    Ok(())
}

fn put_token(world: &mut World) -> ActionOutcome {
    if world.robot.token == 0 {
        return Err(FailureReason::NoTokenToPut);
    }
    world.robot.token -= 1;
    let (x, y) = (world.robot.x, world.robot.y);
    if let Some(stack) = world
        .add_objects(x, y, TOKEN_KIND, 1)
        .and_then(|idx| world.objects.get_mut(idx))
    {
        stack.hidden = false;
    }
    Ok(())
}

fn take_token(world: &mut World) -> ActionOutcome {
    let (x, y) = (world.robot.x, world.robot.y);
    let idx = world
        .stack_index(x, y, TOKEN_KIND)
        .ok_or(FailureReason::NoObjectHere)?;
    if let Some(stack) = world.objects.get_mut(idx) {
        stack.hidden = false;
    }
    world.take_one(idx).ok_or(FailureReason::NoObjectHere)?;
    world.robot.token = world.robot.token.saturating_add(1);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal::{Goal, ObjectTarget};
    use crate::world::{Direction, RobotPose};

    fn world_at(x: i32, y: i32, dir: Direction) -> World {
        World::new(10, 10, RobotPose::new(x, y, dir)).unwrap()
    }

    #[test]
    fn move_matrix_for_all_directions() {
        for dir in Direction::ALL {
            // Open field.
            let mut w = world_at(5, 5, dir);
            assert_eq!(apply(&mut w, &Action::Move), Ok(()));
            let (dx, dy) = dir.offset();
            assert_eq!((w.robot.x, w.robot.y), (5 + dx, 5 + dy));
            assert_eq!(w.robot.dir, dir);

            // Wall on the source edge.
            let mut w = world_at(5, 5, dir);
            w.add_wall(5, 5, dir);
            let before = w.clone();
            assert_eq!(apply(&mut w, &Action::Move), Err(FailureReason::BlockedByWall));
            assert_eq!(w, before);

            // Wall on the destination's opposing edge.
            let mut w = world_at(5, 5, dir);
            w.add_wall(5 + dx, 5 + dy, dir.opposite());
            assert_eq!(apply(&mut w, &Action::Move), Err(FailureReason::BlockedByWall));

            // Unrelated wall on the destination does not block.
            let mut w = world_at(5, 5, dir);
            w.add_wall(5 + dx, 5 + dy, dir);
            assert_eq!(apply(&mut w, &Action::Move), Ok(()));
        }
    }

    #[test]
    fn move_off_grid_is_out_of_bounds() {
        let edges = [
            (1, 1, Direction::West),
            (1, 1, Direction::South),
            (10, 10, Direction::East),
            (10, 10, Direction::North),
        ];
        for (x, y, dir) in edges {
            let mut w = world_at(x, y, dir);
            let before = w.clone();
            assert_eq!(apply(&mut w, &Action::Move), Err(FailureReason::OutOfBounds));
            assert_eq!(w, before);
        }
    }

    #[test]
    fn take_prefers_goal_marked_then_kind_order() {
        let mut w = world_at(2, 2, Direction::North);
        w.add_objects(2, 2, "strawberry", 1);
        w.add_objects(2, 2, "apple", 1);
        let idx = w.add_objects(2, 2, "carrot", 1).unwrap();
        w.objects[idx].goal_mark = true;

        apply(&mut w, &Action::Take).unwrap();
        apply(&mut w, &Action::Take).unwrap();
        apply(&mut w, &Action::Take).unwrap();
        assert_eq!(
            w.robot.inventory.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["carrot", "apple", "strawberry"]
        );
        assert!(w.objects.is_empty());
        assert_eq!(apply(&mut w, &Action::Take), Err(FailureReason::NoObjectHere));
    }

    #[test]
    fn goal_preference_survives_take_put_round_trip() {
        let mut w = world_at(2, 2, Direction::North);
        let mut goal = Goal::default();
        goal.require_objects(Coord::new(2, 2), "carrot", ObjectTarget::Exactly(1));
        w.goal = Some(goal);
        w.add_objects(2, 2, "apple", 1);
        w.add_objects(2, 2, "carrot", 1);

        apply(&mut w, &Action::Take).unwrap();
        assert_eq!(w.robot.inventory, ["carrot"]);
        apply(&mut w, &Action::Put).unwrap();
        let idx = w.stack_index(2, 2, "carrot").unwrap();
        assert!(w.objects[idx].goal_mark);

        apply(&mut w, &Action::Take).unwrap();
        assert_eq!(w.robot.inventory, ["carrot"]);
        assert_eq!(w.object_count(2, 2, "apple"), 1);
    }

    #[test]
    fn put_drops_oldest_pickup_first() {
        let mut w = world_at(3, 3, Direction::North);
        w.robot.inventory.push_back("banana".to_string());
        w.robot.inventory.push_back("apple".to_string());
        apply(&mut w, &Action::Put).unwrap();
        assert_eq!(w.object_count(3, 3, "banana"), 1);
        assert_eq!(w.object_count(3, 3, "apple"), 0);
        apply(&mut w, &Action::Put).unwrap();
        assert_eq!(apply(&mut w, &Action::Put), Err(FailureReason::NoItemToPut));
    }

    #[test]
    fn take_and_put_reveal_hidden_stacks() {
        let mut w = world_at(1, 1, Direction::North);
        let idx = w.add_objects(1, 1, "star", 3).unwrap();
        w.objects[idx].hidden = true;
        apply(&mut w, &Action::Take).unwrap();
        assert!(!w.objects[idx].hidden);
        assert_eq!(w.objects[idx].count, 2);
    }

    #[test]
    fn tokens_move_between_robot_and_cell() {
        let mut w = world_at(4, 4, Direction::North);
        assert_eq!(apply(&mut w, &Action::PutToken), Err(FailureReason::NoTokenToPut));
        assert_eq!(apply(&mut w, &Action::TakeToken), Err(FailureReason::NoObjectHere));

        w.robot.token = 1;
        apply(&mut w, &Action::PutToken).unwrap();
        assert_eq!(w.robot.token, 0);
        assert_eq!(w.object_count(4, 4, TOKEN_KIND), 1);
        apply(&mut w, &Action::TakeToken).unwrap();
        assert_eq!(w.robot.token, 1);
        assert!(w.objects.is_empty());
    }

    #[test]
    fn build_wall_is_idempotent() {
        let mut w = world_at(2, 2, Direction::East);
        apply(&mut w, &Action::BuildWall).unwrap();
        apply(&mut w, &Action::BuildWall).unwrap();
        assert_eq!(w.walls.len(), 1);
        assert!(w.has_wall(2, 2, Direction::East));
    }

    #[test]
    fn done_and_trace_leave_world_alone() {
        let mut w = world_at(2, 2, Direction::East);
        let before = w.clone();
        apply(&mut w, &Action::Done).unwrap();
        apply(&mut w, &Action::Trace("object_here() -> []".to_string())).unwrap();
        assert_eq!(w, before);
    }
}

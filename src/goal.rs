//! Goal specification and evaluation.
//!
//! A goal is the conjunction of its present fields; an absent field (or an absent goal)
//! is vacuously satisfied. Evaluation is a pure function of the world and the goal.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::world::{Coord, Direction, Kind, World};

/// Required amount of one kind on one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum ObjectTarget {
    /// Exactly this many.
    Exactly(u32),
    /// Every object of the kind, wherever it currently is.
    All,
}

impl TryFrom<serde_json::Value> for ObjectTarget {
    type Error = ValidationError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let invalid = |v: &serde_json::Value| ValidationError::InvalidDocument {
            reason: format!("goal object count must be a non-negative integer or \"all\", got {v}"),
        };
        match &value {
            serde_json::Value::Number(n) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(Self::Exactly)
                .ok_or_else(|| invalid(&value)),
            serde_json::Value::String(s) if s.trim().eq_ignore_ascii_case("all") => Ok(Self::All),
            serde_json::Value::String(s) => s
                .trim()
                .parse::<u32>()
                .map(Self::Exactly)
                .map_err(|_| invalid(&value)),
            _ => Err(invalid(&value)),
        }
    }
}

impl From<ObjectTarget> for serde_json::Value {
    fn from(target: ObjectTarget) -> Self {
        match target {
            ObjectTarget::Exactly(n) => Self::from(n),
            ObjectTarget::All => Self::from("all"),
        }
    }
}

/// A required robot position, optionally with a facing.
///
/// Accepts `[x, y]`, `[x, y, orientation]` or `{"x", "y", "orientation"}`; fractional
/// coordinates are floored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct GoalPosition {
    /// Required column.
    pub x: i32,
    /// Required row.
    pub y: i32,
    /// Required facing; any facing if `None`.
    pub orientation: Option<Direction>,
}

impl GoalPosition {
    /// Creates a position requirement.
    #[must_use]
    pub const fn new(x: i32, y: i32, orientation: Option<Direction>) -> Self {
        Self { x, y, orientation }
    }

    /// True if the robot stands here (and faces the required way, if any).
    #[must_use]
    pub fn matches(&self, world: &World) -> bool {
        self.matches_cell(world) && self.orientation.map_or(true, |dir| dir == world.robot.dir)
    }

    /// True if the robot stands here, whatever its facing.
    #[must_use]
    pub fn matches_cell(&self, world: &World) -> bool {
        world.robot.x == self.x && world.robot.y == self.y
    }
}

fn floor_coordinate(value: Option<&serde_json::Value>, axis: &str) -> Result<i32, ValidationError> {
    let invalid = || ValidationError::InvalidDocument {
        reason: format!("goal position needs a numeric {axis}"),
    };
    let raw = value.and_then(serde_json::Value::as_f64).ok_or_else(invalid)?;
    let floored = raw.floor();
    if floored < f64::from(i32::MIN) || floored > f64::from(i32::MAX) {
        return Err(invalid());
    }
    Ok(floored as i32)
}

impl TryFrom<serde_json::Value> for GoalPosition {
    type Error = ValidationError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let (x, y, orientation) = match &value {
            serde_json::Value::Array(items) => (items.first(), items.get(1), items.get(2)),
            serde_json::Value::Object(map) => (map.get("x"), map.get("y"), map.get("orientation")),
            other => {
                return Err(ValidationError::InvalidDocument {
                    reason: format!("goal position must be an array or object, got {other}"),
                })
            }
        };
        let orientation = match orientation {
            None | Some(serde_json::Value::Null) => None,
            Some(code) => Some(Direction::from_code(code)?),
        };
        Ok(Self {
            x: floor_coordinate(x, "x")?,
            y: floor_coordinate(y, "y")?,
            orientation,
        })
    }
}

impl From<GoalPosition> for serde_json::Value {
    fn from(pos: GoalPosition) -> Self {
        let mut map = serde_json::Map::new();
        map.insert("x".to_string(), Self::from(pos.x));
        map.insert("y".to_string(), Self::from(pos.y));
        if let Some(dir) = pos.orientation {
            map.insert("orientation".to_string(), Self::from(dir.as_str()));
        }
        Self::Object(map)
    }
}

/// Declarative success condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// Required objects per cell. An empty kind map means the cell must be cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objects: Option<BTreeMap<Coord, BTreeMap<Kind, ObjectTarget>>>,
    /// Walls that must exist. Unlisted walls are never checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walls: Option<BTreeMap<Coord, Vec<Direction>>>,
    /// Where the robot must end up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<GoalPosition>,
    /// Acceptable end positions; any one of them will do.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_final_positions: Option<Vec<GoalPosition>>,
}

impl Goal {
    /// True if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_none()
            && self.walls.is_none()
            && self.position.is_none()
            && self.possible_final_positions.is_none()
    }

    /// Adds an object requirement, creating the objects clause if needed.
    pub fn require_objects(&mut self, at: Coord, kind: impl Into<Kind>, target: ObjectTarget) {
        self.objects
            .get_or_insert_with(BTreeMap::new)
            .entry(at)
            .or_default()
            .insert(kind.into(), target);
    }

    /// Requires a wall on `(at, dir)`.
    pub fn require_wall(&mut self, at: Coord, dir: Direction) {
        let dirs = self.walls.get_or_insert_with(BTreeMap::new).entry(at).or_default();
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
}

/// One reason a goal is not met.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum GoalViolation {
    /// Objects lie on a cell the goal does not mention.
    UnexpectedObjects {
        /// The cell.
        at: Coord,
    },
    /// A cell holds a kind its requirement does not list.
    UnexpectedKind {
        /// The cell.
        at: Coord,
        /// The unlisted kind.
        kind: Kind,
    },
    /// A listed kind has the wrong count.
    CountMismatch {
        /// The cell.
        at: Coord,
        /// The kind.
        kind: Kind,
        /// Count the goal requires.
        expected: u32,
        /// Count on the cell.
        observed: u32,
    },
    /// `"all"` was required but no object of the kind lies on the grid.
    UnresolvableAll {
        /// The cell.
        at: Coord,
        /// The kind.
        kind: Kind,
    },
    /// A cell that must be cleared still holds objects.
    NotCleared {
        /// The cell.
        at: Coord,
        /// Objects still there.
        remaining: u32,
    },
    /// A required wall is absent.
    MissingWall {
        /// Owning cell of the wall.
        at: Coord,
        /// Edge of the cell.
        dir: Direction,
    },
    /// The robot stands on the wrong cell.
    WrongPosition {
        /// Required cell.
        expected: Coord,
        /// Robot's cell.
        actual: Coord,
    },
    /// The robot is on the right cell but faces the wrong way.
    WrongOrientation {
        /// Required facing.
        expected: Direction,
        /// Robot's facing.
        actual: Direction,
    },
    /// None of the acceptable final positions matched.
    NoFinalPositionMatched {
        /// Robot's cell.
        actual: Coord,
    },
}

impl fmt::Display for GoalViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedObjects { at } => write!(f, "objects left at {at}"),
            Self::UnexpectedKind { at, kind } => write!(f, "unexpected {kind} at {at}"),
            Self::CountMismatch {
                at,
                kind,
                expected,
                observed,
            } => write!(f, "expected {expected} {kind} at {at}, found {observed}"),
            Self::UnresolvableAll { at, kind } => {
                write!(f, "all {kind} required at {at}, but none exist")
            }
            Self::NotCleared { at, remaining } => {
                write!(f, "{at} must be empty, {remaining} object(s) remain")
            }
            Self::MissingWall { at, dir } => write!(f, "missing {dir} wall at {at}"),
            Self::WrongPosition { expected, actual } => {
                write!(f, "robot should be at {expected}, is at {actual}")
            }
            Self::WrongOrientation { expected, actual } => {
                write!(f, "robot should face {expected}, faces {actual}")
            }
            Self::NoFinalPositionMatched { actual } => {
                write!(f, "robot at {actual} is not at any acceptable final position")
            }
        }
    }
}

/// Outcome of checking a goal, with every violation found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalReport {
    /// Every unmet requirement, empty when satisfied.
    pub violations: Vec<GoalViolation>,
}

impl GoalReport {
    /// True if no requirement is violated.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.violations.is_empty()
    }
}

/// True if `world` satisfies `goal`.
#[must_use]
pub fn evaluate(world: &World, goal: &Goal) -> bool {
    check(world, goal).is_satisfied()
}

/// Evaluates the world's own goal; a world without one is always satisfied.
#[must_use]
pub fn evaluate_world(world: &World) -> bool {
    world.goal.as_ref().map_or(true, |goal| evaluate(world, goal))
}

/// Checks every goal clause and collects the violations.
#[must_use]
pub fn check(world: &World, goal: &Goal) -> GoalReport {
    let mut violations = Vec::new();
    if let Some(expected) = &goal.objects {
        check_objects(world, expected, &mut violations);
    }
    if let Some(walls) = &goal.walls {
        for (at, dirs) in walls {
            for dir in dirs {
                if !world.has_wall(at.x, at.y, *dir) {
                    violations.push(GoalViolation::MissingWall { at: *at, dir: *dir });
                }
            }
        }
    }
    if let Some(position) = &goal.position {
        check_position(world, position, &mut violations);
    }
    if let Some(candidates) = goal.possible_final_positions.as_ref().filter(|c| !c.is_empty()) {
        if !candidates.iter().any(|p| p.matches(world)) {
            violations.push(GoalViolation::NoFinalPositionMatched {
                actual: world.robot.position(),
            });
        }
    }
    if !violations.is_empty() {
        log::debug!("goal not met: {} violation(s)", violations.len());
    }
    GoalReport { violations }
}

fn check_objects(
    world: &World,
    expected: &BTreeMap<Coord, BTreeMap<Kind, ObjectTarget>>,
    out: &mut Vec<GoalViolation>,
) {
    let mut observed: BTreeMap<Coord, BTreeMap<&str, u32>> = BTreeMap::new();
    for stack in world.objects.iter().filter(|o| o.count > 0) {
        *observed
            .entry(stack.position())
            .or_default()
            .entry(stack.kind.as_str())
            .or_insert(0) += stack.count;
    }

    for (at, kinds) in &observed {
        match expected.get(at) {
            None => out.push(GoalViolation::UnexpectedObjects { at: *at }),
            Some(required) => {
                for kind in kinds.keys() {
                    if !required.contains_key(*kind) {
                        out.push(GoalViolation::UnexpectedKind {
                            at: *at,
                            kind: (*kind).to_string(),
                        });
                    }
                }
            }
        }
    }

    for (at, required) in expected {
        let here = observed.get(at);
        if required.is_empty() {
            let remaining: u32 = here.map_or(0, |m| m.values().sum());
            if remaining > 0 {
                out.push(GoalViolation::NotCleared { at: *at, remaining });
            }
            continue;
        }
        for (kind, target) in required {
            let want = match target {
                ObjectTarget::Exactly(n) => Some(*n),
                ObjectTarget::All => {
                    let total = world.kind_total(kind);
                    (total > 0).then_some(total)
                }
            };
            let have = here.and_then(|m| m.get(kind.as_str())).copied().unwrap_or(0);
            match want {
                None => out.push(GoalViolation::UnresolvableAll {
                    at: *at,
                    kind: kind.clone(),
                }),
                Some(w) if w != have => out.push(GoalViolation::CountMismatch {
                    at: *at,
                    kind: kind.clone(),
                    expected: w,
                    observed: have,
                }),
                Some(_) => {}
            }
        }
    }
}

fn check_position(world: &World, position: &GoalPosition, out: &mut Vec<GoalViolation>) {
    if !position.matches_cell(world) {
        out.push(GoalViolation::WrongPosition {
            expected: Coord::new(position.x, position.y),
            actual: world.robot.position(),
        });
    }
    if let Some(dir) = position.orientation {
        if dir != world.robot.dir {
            out.push(GoalViolation::WrongOrientation {
                expected: dir,
                actual: world.robot.dir,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::RobotPose;

    fn world() -> World {
        World::new(10, 10, RobotPose::new(1, 1, Direction::East)).unwrap()
    }

    fn goal_from(json: serde_json::Value) -> Goal {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn absent_goal_is_always_satisfied() {
        let mut w = world();
        w.add_objects(4, 4, "carrot", 3);
        assert!(evaluate_world(&w));
        assert!(evaluate(&w, &Goal::default()));
    }

    #[test]
    fn all_means_every_carrot_at_the_cell() {
        let goal = goal_from(serde_json::json!({"objects": {"5,5": {"carrot": "all"}}}));
        let mut w = world();
        w.add_objects(5, 5, "carrot", 2);
        assert!(evaluate(&w, &goal));

        w.add_objects(2, 2, "carrot", 1);
        let report = check(&w, &goal);
        assert!(report.violations.contains(&GoalViolation::UnexpectedObjects { at: Coord::new(2, 2) }));
        assert!(report.violations.contains(&GoalViolation::CountMismatch {
            at: Coord::new(5, 5),
            kind: "carrot".to_string(),
            expected: 3,
            observed: 2,
        }));
    }

    #[test]
    fn all_ignores_carried_objects() {
        let goal = goal_from(serde_json::json!({"objects": {"5,5": {"carrot": "all"}}}));
        let mut w = world();
        w.add_objects(5, 5, "carrot", 2);
        w.robot.inventory.push_back("carrot".to_string());
        assert!(evaluate(&w, &goal));

        // Only carried carrots left: nothing on the grid to resolve against.
        let mut w = world();
        w.robot.inventory.push_back("carrot".to_string());
        assert!(!evaluate(&w, &goal));
    }

    #[test]
    fn all_with_no_objects_anywhere_is_impossible() {
        let goal = goal_from(serde_json::json!({"objects": {"5,5": {"carrot": "all"}}}));
        let report = check(&world(), &goal);
        assert_eq!(
            report.violations,
            vec![GoalViolation::UnresolvableAll {
                at: Coord::new(5, 5),
                kind: "carrot".to_string()
            }]
        );
    }

    #[test]
    fn empty_requirement_rejects_any_object() {
        let goal = goal_from(serde_json::json!({"objects": {"3,1": {}}}));
        let mut w = world();
        assert!(evaluate(&w, &goal));
        w.add_objects(3, 1, "daisy", 1);
        let report = check(&w, &goal);
        assert!(report
            .violations
            .contains(&GoalViolation::NotCleared { at: Coord::new(3, 1), remaining: 1 }));
    }

    #[test]
    fn unlisted_kind_violates() {
        let goal = goal_from(serde_json::json!({"objects": {"2,2": {"apple": 1}}}));
        let mut w = world();
        w.add_objects(2, 2, "apple", 1);
        assert!(evaluate(&w, &goal));
        w.add_objects(2, 2, "banana", 1);
        assert!(!evaluate(&w, &goal));
    }

    #[test]
    fn walls_must_exist_but_extras_are_ignored() {
        let goal = goal_from(serde_json::json!({"walls": {"3,3": ["east", "north"]}}));
        let mut w = world();
        w.add_wall(3, 3, Direction::East);
        w.add_wall(7, 7, Direction::South);
        let report = check(&w, &goal);
        assert_eq!(
            report.violations,
            vec![GoalViolation::MissingWall {
                at: Coord::new(3, 3),
                dir: Direction::North
            }]
        );
        w.add_wall(3, 3, Direction::North);
        assert!(evaluate(&w, &goal));
    }

    #[test]
    fn position_floors_and_normalizes_orientation() {
        let goal = goal_from(serde_json::json!({"position": {"x": 3.7, "y": 2, "orientation": 1}}));
        assert_eq!(goal.position, Some(GoalPosition::new(3, 2, Some(Direction::North))));

        let mut w = world();
        w.robot.x = 3;
        w.robot.y = 2;
        assert!(!evaluate(&w, &goal));
        w.robot.dir = Direction::North;
        assert!(evaluate(&w, &goal));
    }

    #[test]
    fn possible_final_positions_need_one_match() {
        let goal = goal_from(serde_json::json!({
            "possible_final_positions": [[4, 4], [2, 1, "S"]]
        }));
        let mut w = world();
        assert!(!evaluate(&w, &goal));
        w.robot.x = 2;
        assert!(!evaluate(&w, &goal));
        w.robot.dir = Direction::South;
        assert!(evaluate(&w, &goal));
        w.robot.x = 4;
        w.robot.y = 4;
        assert!(evaluate(&w, &goal));
    }

    #[test]
    fn empty_final_positions_are_vacuous() {
        let goal = goal_from(serde_json::json!({"possible_final_positions": []}));
        assert!(evaluate(&world(), &goal));
    }

    #[test]
    fn goal_serializes_back_to_document_shape() {
        let mut goal = Goal::default();
        goal.require_objects(Coord::new(5, 5), "carrot", ObjectTarget::All);
        goal.require_wall(Coord::new(1, 2), Direction::East);
        goal.require_wall(Coord::new(1, 2), Direction::East);
        let json = serde_json::to_value(&goal).unwrap();
        assert_eq!(json["objects"]["5,5"]["carrot"], "all");
        assert_eq!(json["walls"]["1,2"], serde_json::json!(["east"]));
    }
}

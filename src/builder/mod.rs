//! World builder: turns a [`WorldDocument`] into an initial [`World`].
//!
//! Parsing is lenient. Entries that cannot be understood (unknown object kinds or
//! tiles, bad coordinate keys, bad counts, bad goal clauses) are skipped and reported as
//! [`BuildWarning`]s; only problems that leave no usable world (bad dimensions, the robot
//! off the grid, a faulting builder-script statement) are errors.

/// World document schema.
pub mod document;
/// Builder-script statements.
pub mod script;

use std::fmt;
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::GridConfig;
use crate::error::GridResult;
use crate::goal::{Goal, GoalPosition, ObjectTarget};
use crate::world::{Coord, CountRange, Direction, RobotPose, World};

pub use document::{RobotSpec, WorldDocument};
pub use script::{Arg, Statement};

use script::ScriptRunner;

static COUNT_RANGE: OnceLock<Regex> = OnceLock::new();

fn count_range_re() -> &'static Regex {
    COUNT_RANGE.get_or_init(|| {
        Regex::new(r"^\s*(\d+)\s*-\s*(\d+)\s*$").expect("count range pattern is valid")
    })
}

/// A document entry that was skipped or replaced by a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum BuildWarning {
    /// The document places no robot; one was put at (1,1) facing east.
    MissingRobot,
    /// Only the first robot is used.
    ExtraRobots {
        /// How many were dropped.
        ignored: usize,
    },
    /// Robot orientation code not understood; east was used.
    BadOrientation {
        /// The code as written.
        value: String,
    },
    /// A map key that is not a valid on-grid `"x,y"`.
    BadCoordinate {
        /// The key as written.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
    /// An object kind missing from the catalog.
    UnknownObject {
        /// Cell key.
        at: String,
        /// The unknown kind.
        kind: String,
    },
    /// A tile missing from the catalog.
    UnknownTile {
        /// Cell key; `None` for the background fill.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at: Option<String>,
        /// The unknown tile.
        tile: String,
    },
    /// An object count that is neither a number nor a `"lo-hi"` range.
    BadObjectCount {
        /// Cell key.
        at: String,
        /// Object kind.
        kind: String,
        /// The count as written.
        value: String,
    },
    /// A wall entry whose direction list cannot be read.
    BadWall {
        /// Cell key.
        at: String,
        /// The entry as written.
        value: String,
    },
    /// A goal clause was dropped and is treated as satisfied.
    BadGoal {
        /// Clause name, e.g. `position`.
        clause: String,
        /// Why it was dropped.
        reason: String,
    },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRobot => f.write_str("no robot in document, using (1, 1) facing east"),
            Self::ExtraRobots { ignored } => write!(f, "{ignored} extra robot(s) ignored"),
            Self::BadOrientation { value } => {
                write!(f, "orientation {value} not understood, facing east")
            }
            Self::BadCoordinate { key, reason } => write!(f, "skipped \"{key}\": {reason}"),
            Self::UnknownObject { at, kind } => write!(f, "unknown object {kind} at {at} skipped"),
            Self::UnknownTile { at: Some(at), tile } => {
                write!(f, "unknown tile {tile} at {at} skipped")
            }
            Self::UnknownTile { at: None, tile } => write!(f, "unknown background {tile} skipped"),
            Self::BadObjectCount { at, kind, value } => {
                write!(f, "bad count {value} for {kind} at {at} skipped")
            }
            Self::BadWall { at, value } => write!(f, "bad wall {value} at {at} skipped"),
            Self::BadGoal { clause, reason } => write!(f, "goal {clause} ignored: {reason}"),
        }
    }
}

/// A built world and the entries skipped along the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// The built world.
    pub world: World,
    /// Entries skipped or defaulted, in document order.
    pub warnings: Vec<BuildWarning>,
}

/// How one object entry resolves.
enum Placement {
    Fixed(u32),
    Ranged(CountRange),
}

/// Builds worlds from documents.
#[derive(Debug, Clone)]
pub struct WorldBuilder {
    config: GridConfig,
    rng: StdRng,
}

impl WorldBuilder {
    /// Creates a builder. Random counts use `config.seed`, or OS entropy if unset.
    pub fn new(config: GridConfig) -> GridResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { config, rng })
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &GridConfig {
        &self.config
    }

    /// The builder's random source, e.g. for
    /// [`ActionEngine::reset_randomized`](crate::engine::ActionEngine::reset_randomized).
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Builds the initial world for `doc`.
    pub fn build(&mut self, doc: &WorldDocument) -> GridResult<BuildOutcome> {
        let mut warnings = Vec::new();
        let (width, height) = self.config.check_dimensions(doc.cols, doc.rows)?;

        let robot = self.robot(doc, &mut warnings);
        let mut world = World::new(width, height, robot)?;
        world.description.clone_from(&doc.description);

        Self::walls(doc, &mut world, &mut warnings);
        world.goal = self.goal(doc, &mut warnings);
        self.objects(doc, &mut world, &mut warnings);
        self.background(doc, &mut world, &mut warnings);

        if !doc.onload.is_empty() {
            let script_warnings = self.run_script(&mut world, &doc.onload)?;
            warnings.extend(script_warnings);
        }

        if world.goal.as_ref().is_some_and(Goal::is_empty) {
            world.goal = None;
        }
        world.refresh_goal_marks();

        for warning in &warnings {
            log::warn!("world document: {warning}");
        }
        log::debug!(
            "built {}x{} world: {} wall(s), {} stack(s), goal: {}",
            world.width,
            world.height,
            world.walls.len(),
            world.objects.len(),
            world.goal.is_some()
        );
        Ok(BuildOutcome { world, warnings })
    }

    /// Runs builder-script statements against an existing world.
    ///
    /// On a fault the statements before the failing one keep their effects.
    pub fn run_script(&mut self, world: &mut World, statements: &[Statement]) -> GridResult<Vec<BuildWarning>> {
        let warnings = ScriptRunner::new(&self.config, &mut self.rng).run(world, statements)?;
        world.refresh_goal_marks();
        Ok(warnings)
    }

    fn robot(&self, doc: &WorldDocument, warnings: &mut Vec<BuildWarning>) -> RobotPose {
        let Some(spec) = doc.robots.first() else {
            warnings.push(BuildWarning::MissingRobot);
            return RobotPose::new(1, 1, Direction::East);
        };
        if doc.robots.len() > 1 {
            warnings.push(BuildWarning::ExtraRobots {
                ignored: doc.robots.len() - 1,
            });
        }

        let dir = match &spec.orientation {
            None => Direction::East,
            Some(code) => Direction::from_code(code).unwrap_or_else(|_| {
                warnings.push(BuildWarning::BadOrientation {
                    value: code.to_string(),
                });
                Direction::East
            }),
        };
        // Out-of-range coordinates saturate and are then rejected by `World::new`.
        let x = i32::try_from(spec.x).unwrap_or(i32::MAX);
        let y = i32::try_from(spec.y).unwrap_or(i32::MAX);
        let mut robot = RobotPose::new(x, y, dir);
        robot.token = spec.tokens;

        for (kind, count) in &spec.objects {
            if !self.config.catalog.knows_object(kind) {
                warnings.push(BuildWarning::UnknownObject {
                    at: "robot".to_string(),
                    kind: kind.clone(),
                });
                continue;
            }
            match count.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => robot.inventory.extend((0..n).map(|_| kind.clone())),
                None => warnings.push(BuildWarning::BadObjectCount {
                    at: "robot".to_string(),
                    kind: kind.clone(),
                    value: count.to_string(),
                }),
            }
        }
        robot
    }

    fn cell(world: &World, key: &str, warnings: &mut Vec<BuildWarning>) -> Option<Coord> {
        let parsed = Coord::parse_key(key).and_then(|at| {
            world.ensure_in_bounds(at.x, at.y)?;
            Ok(at)
        });
        match parsed {
            Ok(at) => Some(at),
            Err(err) => {
                warnings.push(BuildWarning::BadCoordinate {
                    key: key.to_string(),
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    fn walls(doc: &WorldDocument, world: &mut World, warnings: &mut Vec<BuildWarning>) {
        for (key, dirs) in &doc.walls {
            let Some(at) = Self::cell(world, key, warnings) else {
                continue;
            };
            let Some(dirs) = dirs.as_array() else {
                warnings.push(BuildWarning::BadWall {
                    at: key.clone(),
                    value: dirs.to_string(),
                });
                continue;
            };
            for code in dirs {
                match Direction::from_code(code) {
                    Ok(dir) => {
                        world.add_wall(at.x, at.y, dir);
                    }
                    Err(_) => warnings.push(BuildWarning::BadWall {
                        at: key.clone(),
                        value: code.to_string(),
                    }),
                }
            }
        }
    }

    fn objects(&mut self, doc: &WorldDocument, world: &mut World, warnings: &mut Vec<BuildWarning>) {
        for (key, kinds) in &doc.objects {
            let Some(at) = Self::cell(world, key, warnings) else {
                continue;
            };
            let Some(kinds) = kinds.as_object() else {
                warnings.push(BuildWarning::BadCoordinate {
                    key: key.clone(),
                    reason: format!("expected a kind map, got {kinds}"),
                });
                continue;
            };
            for (kind, spec) in kinds {
                if !self.config.catalog.knows_object(kind) {
                    warnings.push(BuildWarning::UnknownObject {
                        at: key.clone(),
                        kind: kind.clone(),
                    });
                    continue;
                }
                let bad_count = || BuildWarning::BadObjectCount {
                    at: key.clone(),
                    kind: kind.clone(),
                    value: spec.to_string(),
                };

                let (value, goal_only) = match spec {
                    Value::Object(map) => (
                        map.get("number").unwrap_or(&Value::Null),
                        map.get("goal").and_then(Value::as_bool).unwrap_or(false),
                    ),
                    other => (other, false),
                };
                let Some(placement) = parse_count(value) else {
                    warnings.push(bad_count());
                    continue;
                };

                match (placement, goal_only) {
                    (Placement::Fixed(n), true) => world
                        .goal
                        .get_or_insert_with(Goal::default)
                        .require_objects(at, kind.clone(), ObjectTarget::Exactly(n)),
                    (Placement::Ranged(_), true) => warnings.push(bad_count()),
                    (Placement::Fixed(n), false) => {
                        world.add_objects(at.x, at.y, kind, n);
                    }
                    (Placement::Ranged(range), false) => {
                        let n = range.draw(&mut self.rng);
                        if let Some(stack) = world
                            .add_objects(at.x, at.y, kind, n)
                            .and_then(|idx| world.objects.get_mut(idx))
                        {
                            stack.range = Some(range);
                            stack.hidden = true;
                        }
                    }
                }
            }
        }
    }

    fn goal(&self, doc: &WorldDocument, warnings: &mut Vec<BuildWarning>) -> Option<Goal> {
        let raw = doc.goal.as_ref()?;
        let Some(fields) = raw.as_object() else {
            warnings.push(BuildWarning::BadGoal {
                clause: "goal".to_string(),
                reason: format!("expected an object, got {raw}"),
            });
            return None;
        };

        let mut goal = Goal::default();
        for (clause, value) in fields {
            let parsed = match clause.as_str() {
                "objects" => serde_json::from_value(value.clone()).map(|v| goal.objects = Some(v)),
                "walls" => serde_json::from_value(value.clone()).map(|v| goal.walls = Some(v)),
                "position" => {
                    serde_json::from_value::<GoalPosition>(value.clone()).map(|v| goal.position = Some(v))
                }
                "possible_final_positions" => serde_json::from_value(value.clone())
                    .map(|v| goal.possible_final_positions = Some(v)),
                // Presentation-only fields.
                _ => Ok(()),
            };
            if let Err(err) = parsed {
                warnings.push(BuildWarning::BadGoal {
                    clause: clause.clone(),
                    reason: err.to_string(),
                });
            }
        }

        if let Some(objects) = goal.objects.as_mut() {
            for (at, kinds) in objects.iter_mut() {
                kinds.retain(|kind, _| {
                    let known = self.config.catalog.knows_object(kind);
                    if !known {
                        warnings.push(BuildWarning::UnknownObject {
                            at: at.key(),
                            kind: kind.clone(),
                        });
                    }
                    known
                });
            }
        }
        Some(goal)
    }

    fn background(&self, doc: &WorldDocument, world: &mut World, warnings: &mut Vec<BuildWarning>) {
        if let Some(fill) = &doc.background {
            if self.config.catalog.knows_tile(fill) {
                world.background.fill = Some(fill.clone());
            } else {
                warnings.push(BuildWarning::UnknownTile {
                    at: None,
                    tile: fill.clone(),
                });
            }
        }
        for (key, tile) in &doc.tiles {
            let Some(at) = Self::cell(world, key, warnings) else {
                continue;
            };
            if self.config.catalog.knows_tile(tile) {
                world.background.set_tile(at.x, at.y, tile.clone());
            } else {
                warnings.push(BuildWarning::UnknownTile {
                    at: Some(key.clone()),
                    tile: tile.clone(),
                });
            }
        }
    }
}

/// Parses a count: a non-negative integer, its string form, or a `"lo-hi"` range.
fn parse_count(value: &Value) -> Option<Placement> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(Placement::Fixed),
        Value::String(s) => {
            if let Ok(n) = s.trim().parse::<u32>() {
                return Some(Placement::Fixed(n));
            }
            let caps = count_range_re().captures(s)?;
            let lo = caps[1].parse::<i64>().ok()?;
            let hi = caps[2].parse::<i64>().ok()?;
            CountRange::new(lo, hi).ok().map(Placement::Ranged)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> WorldBuilder {
        WorldBuilder::new(GridConfig {
            seed: Some(5),
            ..GridConfig::default()
        })
        .unwrap()
    }

    fn build(json: &str) -> BuildOutcome {
        builder().build(&WorldDocument::from_json(json).unwrap()).unwrap()
    }

    #[test]
    fn builds_robot_walls_and_objects() {
        let out = build(
            r#"{
                "rows": 6, "cols": 8,
                "robots": [{"x": 2, "y": 3, "orientation": 1, "tokens": 3, "objects": {"apple": 2}}],
                "walls": {"2,1": ["e", "N"]},
                "objects": {"4,4": {"carrot": 3, "leaf": "2"}},
                "description": "warm-up"
            }"#,
        );
        assert!(out.warnings.is_empty(), "{:?}", out.warnings);
        let w = out.world;
        assert_eq!((w.width, w.height), (8, 6));
        assert_eq!(w.robot.position(), Coord::new(2, 3));
        assert_eq!(w.robot.dir, Direction::North);
        assert_eq!(w.robot.token, 3);
        assert_eq!(w.carried("apple"), 2);
        assert!(w.has_wall(2, 1, Direction::East));
        assert!(w.has_wall(2, 1, Direction::North));
        assert_eq!(w.object_count(4, 4, "carrot"), 3);
        assert_eq!(w.object_count(4, 4, "leaf"), 2);
        assert_eq!(w.description.as_deref(), Some("warm-up"));
        assert!(w.goal.is_none());
    }

    #[test]
    fn ranged_counts_are_hidden_and_remember_their_range() {
        let out = build(r#"{"robots": [{"x": 1, "y": 1}], "objects": {"3,3": {"star": "2-5"}}}"#);
        let stack = &out.world.objects[0];
        assert!((2..=5).contains(&stack.count));
        assert!(stack.hidden);
        assert_eq!(stack.range, Some(CountRange::new(2, 5).unwrap()));
    }

    #[test]
    fn same_seed_same_world() {
        let doc = WorldDocument::from_json(r#"{"objects": {"3,3": {"star": "1-50"}}}"#).unwrap();
        let a = builder().build(&doc).unwrap().world;
        let b = builder().build(&doc).unwrap().world;
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_and_malformed_entries_are_skipped() {
        let out = build(
            r#"{
                "robots": [{"x": 1, "y": 1, "orientation": "up"}],
                "walls": {"2,2": ["e", "sideways"], "nowhere": ["n"], "99,1": ["n"]},
                "objects": {"3,3": {"unicorn": 1, "carrot": "lots", "apple": "5-2", "leaf": 1}},
                "background": "lava",
                "tiles": {"1,1": "grass", "2,2": "void"}
            }"#,
        );
        let w = &out.world;
        assert_eq!(w.robot.dir, Direction::East);
        assert_eq!(w.walls.len(), 1);
        assert_eq!(w.objects.len(), 1);
        assert_eq!(w.background.fill, None);
        assert_eq!(w.background.tile_at(1, 1), Some("grass"));

        let has = |f: fn(&BuildWarning) -> bool| out.warnings.iter().any(f);
        assert!(has(|w| matches!(w, BuildWarning::BadOrientation { .. })));
        assert!(has(|w| matches!(w, BuildWarning::BadWall { .. })));
        assert!(has(|w| matches!(w, BuildWarning::BadCoordinate { key, .. } if key == "nowhere")));
        assert!(has(|w| matches!(w, BuildWarning::BadCoordinate { key, .. } if key == "99,1")));
        assert!(has(|w| matches!(w, BuildWarning::UnknownObject { kind, .. } if kind == "unicorn")));
        assert!(has(|w| matches!(w, BuildWarning::BadObjectCount { kind, .. } if kind == "carrot")));
        assert!(has(|w| matches!(w, BuildWarning::BadObjectCount { kind, .. } if kind == "apple")));
        assert!(has(|w| matches!(w, BuildWarning::UnknownTile { at: None, .. })));
        assert!(has(|w| matches!(w, BuildWarning::UnknownTile { at: Some(_), .. })));
    }

    #[test]
    fn missing_robot_gets_a_default() {
        let out = build(r#"{"rows": 3, "cols": 3}"#);
        assert_eq!(out.world.robot, RobotPose::new(1, 1, Direction::East));
        assert_eq!(out.warnings, vec![BuildWarning::MissingRobot]);
    }

    #[test]
    fn robot_off_grid_is_an_error() {
        let doc = WorldDocument::from_json(r#"{"rows": 3, "cols": 3, "robots": [{"x": 4, "y": 1}]}"#).unwrap();
        assert!(builder().build(&doc).unwrap_err().is_validation());
    }

    #[test]
    fn bad_dimensions_are_an_error() {
        let doc = WorldDocument::from_json(r#"{"rows": 0, "cols": 3}"#).unwrap();
        assert!(builder().build(&doc).unwrap_err().is_validation());
    }

    #[test]
    fn goal_only_objects_route_into_goal_and_mark_stacks() {
        let out = build(
            r#"{
                "robots": [{"x": 1, "y": 1}],
                "objects": {
                    "2,2": {"carrot": 1, "apple": 1},
                    "5,5": {"carrot": {"number": 1, "goal": true}}
                },
                "goal": {"objects": {"2,2": {"apple": 1}}, "walls": {"1,1": ["n"]}}
            }"#,
        );
        let w = &out.world;
        assert_eq!(w.object_count(5, 5, "carrot"), 0);
        let goal = w.goal.as_ref().unwrap();
        let objects = goal.objects.as_ref().unwrap();
        assert_eq!(objects[&Coord::new(5, 5)]["carrot"], ObjectTarget::Exactly(1));
        assert_eq!(objects[&Coord::new(2, 2)]["apple"], ObjectTarget::Exactly(1));
        assert_eq!(goal.walls.as_ref().unwrap()[&Coord::new(1, 1)], vec![Direction::North]);

        let apple = w.stack_index(2, 2, "apple").unwrap();
        let carrot = w.stack_index(2, 2, "carrot").unwrap();
        assert!(w.objects[apple].goal_mark);
        assert!(!w.objects[carrot].goal_mark);
    }

    #[test]
    fn bad_goal_clause_degrades_to_satisfied() {
        let out = build(
            r#"{
                "robots": [{"x": 1, "y": 1}],
                "goal": {"position": "top-left", "walls": {"1,1": ["n"]}}
            }"#,
        );
        let goal = out.world.goal.as_ref().unwrap();
        assert!(goal.position.is_none());
        assert!(goal.walls.is_some());
        assert!(out
            .warnings
            .iter()
            .any(|w| matches!(w, BuildWarning::BadGoal { clause, .. } if clause == "position")));

        let out = build(r#"{"robots": [{"x": 1, "y": 1}], "goal": {"position": "nowhere"}}"#);
        assert!(out.world.goal.is_none());
    }

    #[test]
    fn onload_script_runs_after_declarations() {
        let out = build(
            r#"{
                "robots": [{"x": 1, "y": 1}],
                "walls": {"2,2": ["e"]},
                "onload": [
                    {"op": "remove_wall", "x": 3, "y": 2, "dir": "w"},
                    {"op": "add_object", "x": 4, "y": 4, "kind": "star", "count": 2},
                    {"op": "fill_background", "tile": "grass"}
                ]
            }"#,
        );
        let w = &out.world;
        assert!(w.walls.is_empty());
        assert_eq!(w.object_count(4, 4, "star"), 2);
        assert_eq!(w.background.fill.as_deref(), Some("grass"));
    }

    #[test]
    fn onload_fault_fails_the_build() {
        let doc = WorldDocument::from_json(
            r#"{"onload": [{"op": "add_wall", "x": 20, "y": 1, "dir": "n"}]}"#,
        )
        .unwrap();
        let err = builder().build(&doc).unwrap_err();
        assert!(err.is_execution());
    }
}

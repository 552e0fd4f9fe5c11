//! Builder-script statements and their interpreter.
//!
//! The statement set is closed: a script can resize the grid, paint background tiles,
//! add or remove walls, place objects (or goal-only object requirements), and draw
//! random integers into named variables. Nothing else about the world is reachable.
//!
//! A failing statement aborts the script. Statements before it keep their effects.

use std::collections::BTreeMap;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{Catalog, GridConfig};
use crate::error::{ExecutionError, GridError, GridResult};
use crate::goal::{Goal, ObjectTarget};
use crate::world::{Coord, Direction, World};

use super::BuildWarning;

/// Integer argument: a literal or a variable set by `random_int`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    /// A literal.
    Int(i64),
    /// The value stored under `var`.
    Var {
        /// Variable name.
        var: String,
    },
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Var { var } => write!(f, "${var}"),
        }
    }
}

const fn one() -> Arg {
    Arg::Int(1)
}

/// One builder-script statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Statement {
    /// Changes the grid size, dropping what falls outside.
    Resize {
        /// New width.
        width: Arg,
        /// New height.
        height: Arg,
    },
    /// Sets the background fill tile.
    FillBackground {
        /// Tile name.
        tile: String,
    },
    /// Sets the tile of one cell.
    SetTile {
        /// Column.
        x: Arg,
        /// Row.
        y: Arg,
        /// Tile name.
        tile: String,
    },
    /// Adds a wall on one edge of a cell.
    AddWall {
        /// Column.
        x: Arg,
        /// Row.
        y: Arg,
        /// Edge of the cell.
        dir: Direction,
    },
    /// Removes both halves of the shared edge.
    RemoveWall {
        /// Column.
        x: Arg,
        /// Row.
        y: Arg,
        /// Edge of the cell.
        dir: Direction,
    },
    /// Places objects, or with `goal` set, requires them in the goal instead.
    AddObject {
        /// Column.
        x: Arg,
        /// Row.
        y: Arg,
        /// Object kind.
        kind: String,
        /// How many; defaults to one.
        #[serde(default = "one")]
        count: Arg,
        /// Require instead of place.
        #[serde(default)]
        goal: bool,
    },
    /// Stores a uniform draw from `[min, max]` in `var`.
    RandomInt {
        /// Variable to set.
        var: String,
        /// Lower bound.
        min: Arg,
        /// Upper bound.
        max: Arg,
    },
}

impl Statement {
    /// Statement name as used in the `op` tag.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Resize { .. } => "resize",
            Self::FillBackground { .. } => "fill_background",
            Self::SetTile { .. } => "set_tile",
            Self::AddWall { .. } => "add_wall",
            Self::RemoveWall { .. } => "remove_wall",
            Self::AddObject { .. } => "add_object",
            Self::RandomInt { .. } => "random_int",
        }
    }
}

/// Interpreter state for one script run.
pub(crate) struct ScriptRunner<'a, R: Rng + ?Sized> {
    config: &'a GridConfig,
    rng: &'a mut R,
    vars: BTreeMap<String, i64>,
    warnings: Vec<BuildWarning>,
}

impl<'a, R: Rng + ?Sized> ScriptRunner<'a, R> {
    pub(crate) fn new(config: &'a GridConfig, rng: &'a mut R) -> Self {
        Self {
            config,
            rng,
            vars: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Runs `statements` in order against `world`.
    pub(crate) fn run(mut self, world: &mut World, statements: &[Statement]) -> GridResult<Vec<BuildWarning>> {
        for (index, statement) in statements.iter().enumerate() {
            self.exec(world, statement).map_err(|reason| {
                GridError::from(ExecutionError::BuilderScript {
                    index,
                    op: statement.op().to_string(),
                    reason,
                })
            })?;
        }
        Ok(self.warnings)
    }

    fn catalog(&self) -> &Catalog {
        &self.config.catalog
    }

    fn value(&self, arg: &Arg) -> Result<i64, String> {
        match arg {
            Arg::Int(v) => Ok(*v),
            Arg::Var { var } => self
                .vars
                .get(var)
                .copied()
                .ok_or_else(|| format!("undefined variable {var}")),
        }
    }

    fn cell(&self, world: &World, x: &Arg, y: &Arg) -> Result<Coord, String> {
        let x = self.value(x)?;
        let y = self.value(y)?;
        let at = i32::try_from(x)
            .ok()
            .zip(i32::try_from(y).ok())
            .map(|(x, y)| Coord::new(x, y))
            .ok_or_else(|| format!("coordinate ({x}, {y}) out of range"))?;
        world.ensure_in_bounds(at.x, at.y).map_err(|e| e.to_string())?;
        Ok(at)
    }

    fn exec(&mut self, world: &mut World, statement: &Statement) -> Result<(), String> {
        match statement {
            Statement::Resize { width, height } => {
                let (w, h) = self
                    .config
                    .check_dimensions(self.value(width)?, self.value(height)?)
                    .map_err(|e| e.to_string())?;
                world.resize(w, h).map_err(|e| e.to_string())
            }
            Statement::FillBackground { tile } => {
                if self.catalog().knows_tile(tile) {
                    world.background.fill = Some(tile.clone());
                } else {
                    self.warn(BuildWarning::UnknownTile {
                        at: None,
                        tile: tile.clone(),
                    });
                }
                Ok(())
            }
            Statement::SetTile { x, y, tile } => {
                let at = self.cell(world, x, y)?;
                if self.catalog().knows_tile(tile) {
                    world.background.set_tile(at.x, at.y, tile.clone());
                } else {
                    self.warn(BuildWarning::UnknownTile {
                        at: Some(at.key()),
                        tile: tile.clone(),
                    });
                }
                Ok(())
            }
            Statement::AddWall { x, y, dir } => {
                let at = self.cell(world, x, y)?;
                world.add_wall(at.x, at.y, *dir);
                Ok(())
            }
            Statement::RemoveWall { x, y, dir } => {
                let at = self.cell(world, x, y)?;
                world.remove_wall(at.x, at.y, *dir);
                Ok(())
            }
            Statement::AddObject {
                x,
                y,
                kind,
                count,
                goal,
            } => {
                let at = self.cell(world, x, y)?;
                let n = self.value(count)?;
                let n = u32::try_from(n).map_err(|_| format!("object count {n} must be >= 0"))?;
                if !self.catalog().knows_object(kind) {
                    self.warn(BuildWarning::UnknownObject {
                        at: at.key(),
                        kind: kind.clone(),
                    });
                    return Ok(());
                }
                if *goal {
                    world
                        .goal
                        .get_or_insert_with(Goal::default)
                        .require_objects(at, kind.clone(), ObjectTarget::Exactly(n));
                } else {
                    world.add_objects(at.x, at.y, kind, n);
                }
                Ok(())
            }
            Statement::RandomInt { var, min, max } => {
                let lo = self.value(min)?;
                let hi = self.value(max)?;
                if hi < lo {
                    return Err(format!("empty range {lo}..={hi}"));
                }
                let v = self.rng.gen_range(lo..=hi);
                self.vars.insert(var.clone(), v);
                Ok(())
            }
        }
    }

    fn warn(&mut self, warning: BuildWarning) {
        log::warn!("builder script: {warning}");
        self.warnings.push(warning);
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::world::RobotPose;

    fn world() -> World {
        World::new(5, 5, RobotPose::new(1, 1, Direction::East)).unwrap()
    }

    fn run(world: &mut World, statements: &[Statement]) -> GridResult<Vec<BuildWarning>> {
        let config = GridConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        ScriptRunner::new(&config, &mut rng).run(world, statements)
    }

    #[test]
    fn statements_parse_from_tagged_json() {
        let statements: Vec<Statement> = serde_json::from_str(
            r#"[
                {"op": "random_int", "var": "n", "min": 2, "max": 4},
                {"op": "add_object", "x": 3, "y": 3, "kind": "star", "count": {"var": "n"}},
                {"op": "add_wall", "x": 1, "y": 1, "dir": 1},
                {"op": "add_object", "x": 5, "y": 5, "kind": "star", "goal": true}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            statements[1],
            Statement::AddObject {
                x: Arg::Int(3),
                y: Arg::Int(3),
                kind: "star".to_string(),
                count: Arg::Var { var: "n".to_string() },
                goal: false,
            }
        );
        assert_eq!(
            statements[2],
            Statement::AddWall {
                x: Arg::Int(1),
                y: Arg::Int(1),
                dir: Direction::North,
            }
        );

        let mut w = world();
        run(&mut w, &statements).unwrap();
        assert!((2..=4).contains(&w.object_count(3, 3, "star")));
        assert!(w.has_wall(1, 1, Direction::North));
        assert_eq!(w.object_count(5, 5, "star"), 0);
        let goal = w.goal.unwrap();
        assert_eq!(
            goal.objects.unwrap()[&Coord::new(5, 5)]["star"],
            ObjectTarget::Exactly(1)
        );
    }

    #[test]
    fn remove_wall_clears_both_halves() {
        let mut w = world();
        w.add_wall(2, 2, Direction::East);
        w.add_wall(3, 2, Direction::West);
        run(
            &mut w,
            &[Statement::RemoveWall {
                x: 3.into(),
                y: 2.into(),
                dir: Direction::West,
            }],
        )
        .unwrap();
        assert!(w.walls.is_empty());
    }

    #[test]
    fn unknown_identifiers_warn_and_continue() {
        let mut w = world();
        let warnings = run(
            &mut w,
            &[
                Statement::FillBackground {
                    tile: "lava".to_string(),
                },
                Statement::AddObject {
                    x: 2.into(),
                    y: 2.into(),
                    kind: "unicorn".to_string(),
                    count: 1.into(),
                    goal: false,
                },
                Statement::SetTile {
                    x: 2.into(),
                    y: 2.into(),
                    tile: "water".to_string(),
                },
            ],
        )
        .unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(w.objects.is_empty());
        assert_eq!(w.background.tile_at(2, 2), Some("water"));
    }

    #[test]
    fn fault_reports_statement_and_keeps_earlier_effects() {
        let mut w = world();
        let err = run(
            &mut w,
            &[
                Statement::AddWall {
                    x: 1.into(),
                    y: 1.into(),
                    dir: Direction::North,
                },
                Statement::AddObject {
                    x: Arg::Var { var: "missing".to_string() },
                    y: 1.into(),
                    kind: "star".to_string(),
                    count: 1.into(),
                    goal: false,
                },
            ],
        )
        .unwrap_err();

        let GridError::Execution(ExecutionError::BuilderScript { index, op, reason }) = err else {
            panic!("expected builder script error");
        };
        assert_eq!(index, 1);
        assert_eq!(op, "add_object");
        assert!(reason.contains("missing"));
        assert!(w.has_wall(1, 1, Direction::North));
    }

    #[test]
    fn resize_respects_limits_and_robot() {
        let mut w = world();
        run(
            &mut w,
            &[Statement::Resize {
                width: 8.into(),
                height: 3.into(),
            }],
        )
        .unwrap();
        assert_eq!((w.width, w.height), (8, 3));

        assert!(run(
            &mut w,
            &[Statement::Resize {
                width: 500.into(),
                height: 3.into(),
            }],
        )
        .is_err());
        assert!(run(
            &mut w,
            &[Statement::SetTile {
                x: 9.into(),
                y: 1.into(),
                tile: "grass".to_string(),
            }],
        )
        .is_err());
    }
}

//! World model: grid size, robot pose, walls, object stacks, and goal.
//!
//! Everything here is plain data with small invariant-preserving helpers. The only
//! component that mutates a committed [`World`] is the action engine; the shadow
//! synchronizer mutates its own independent copy through the same [`rules`](crate::rules).
//!
//! Coordinates are 1-based with `y` growing northward.

use std::collections::VecDeque;
use std::fmt;
use std::sync::OnceLock;

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::goal::Goal;

/// Object kind name (e.g. `"carrot"`).
pub type Kind = String;

/// Kind name used by the token primitives.
pub const TOKEN_KIND: &str = "token";

static COORD_KEY: OnceLock<Regex> = OnceLock::new();

fn coord_key_re() -> &'static Regex {
    COORD_KEY.get_or_init(|| {
        Regex::new(r"^\s*(-?\d+)\s*,\s*(-?\d+)\s*$").expect("coordinate key pattern is valid")
    })
}

/// A grid cell. Serialized as the `"x,y"` key used throughout world documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    /// Column, 1-based from the west edge.
    pub x: i32,
    /// Row, 1-based from the south edge.
    pub y: i32,
}

impl Coord {
    /// Creates a coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Parses an `"x,y"` key.
    pub fn parse_key(key: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidCoordinateKey {
            key: key.to_string(),
        };
        let caps = coord_key_re().captures(key).ok_or_else(invalid)?;
        let x = caps[1].parse::<i32>().map_err(|_| invalid())?;
        let y = caps[2].parse::<i32>().map_err(|_| invalid())?;
        Ok(Self { x, y })
    }

    /// The `"x,y"` key for this coordinate.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{},{}", self.x, self.y)
    }

    /// The neighbouring cell in direction `dir` (may be off-grid).
    #[must_use]
    pub const fn step(self, dir: Direction) -> Self {
        let (dx, dy) = dir.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl Serialize for Coord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for Coord {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Self::parse_key(&key).map_err(serde::de::Error::custom)
    }
}

/// Robot facing / wall edge.
///
/// Deserializes from any orientation code understood by [`Direction::from_code`];
/// serializes as the lowercase compass name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "String")]
pub enum Direction {
    /// Towards increasing `y`.
    North,
    /// Towards increasing `x`.
    East,
    /// Towards decreasing `y`.
    South,
    /// Towards decreasing `x`.
    West,
}

/// Numeric orientation codes, indexed by code.
const NUMERIC_ORIENTATIONS: [Direction; 4] = [
    Direction::East,
    Direction::North,
    Direction::West,
    Direction::South,
];

/// Textual orientation codes. Matching is case-insensitive.
const TEXT_ORIENTATIONS: [(&str, Direction); 8] = [
    ("e", Direction::East),
    ("east", Direction::East),
    ("n", Direction::North),
    ("north", Direction::North),
    ("w", Direction::West),
    ("west", Direction::West),
    ("s", Direction::South),
    ("south", Direction::South),
];

impl Direction {
    /// All four directions, clockwise from north.
    pub const ALL: [Self; 4] = [Self::North, Self::East, Self::South, Self::West];

    /// Unit offset of one step in this direction.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::North => (0, 1),
            Self::East => (1, 0),
            Self::South => (0, -1),
            Self::West => (-1, 0),
        }
    }

    /// Counter-clockwise quarter turn: N -> W -> S -> E -> N.
    #[must_use]
    pub const fn turn_left(self) -> Self {
        match self {
            Self::North => Self::West,
            Self::West => Self::South,
            Self::South => Self::East,
            Self::East => Self::North,
        }
    }

    /// Clockwise quarter turn.
    #[must_use]
    pub const fn turn_right(self) -> Self {
        match self {
            Self::North => Self::East,
            Self::East => Self::South,
            Self::South => Self::West,
            Self::West => Self::North,
        }
    }

    /// Half turn.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::East => Self::West,
            Self::South => Self::North,
            Self::West => Self::East,
        }
    }

    /// Numeric orientation code (0=E, 1=N, 2=W, 3=S).
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::East => 0,
            Self::North => 1,
            Self::West => 2,
            Self::South => 3,
        }
    }

    /// Lowercase compass name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        }
    }

    /// Parses a textual or numeric-string orientation code.
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        let trimmed = code.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return Self::from_numeric(n).ok_or_else(|| ValidationError::InvalidOrientation {
                code: code.to_string(),
            });
        }
        let lowered = trimmed.to_ascii_lowercase();
        TEXT_ORIENTATIONS
            .iter()
            .find(|(name, _)| *name == lowered)
            .map(|(_, dir)| *dir)
            .ok_or_else(|| ValidationError::InvalidOrientation {
                code: code.to_string(),
            })
    }

    /// Normalizes an orientation code from a document.
    ///
    /// This is the single mapping shared by robot placement and goal positions.
    pub fn from_code(value: &serde_json::Value) -> Result<Self, ValidationError> {
        match value {
            serde_json::Value::String(s) => Self::parse(s),
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .and_then(Self::from_numeric)
                .ok_or_else(|| ValidationError::InvalidOrientation {
                    code: n.to_string(),
                }),
            other => Err(ValidationError::InvalidOrientation {
                code: other.to_string(),
            }),
        }
    }

    fn from_numeric(n: i64) -> Option<Self> {
        usize::try_from(n)
            .ok()
            .and_then(|idx| NUMERIC_ORIENTATIONS.get(idx).copied())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Direction> for String {
    fn from(dir: Direction) -> Self {
        dir.as_str().to_string()
    }
}

impl TryFrom<serde_json::Value> for Direction {
    type Error = ValidationError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::from_code(&value)
    }
}

/// Robot position, facing, tokens, and carried objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotPose {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Facing.
    pub dir: Direction,
    /// Tokens available to `put_token`.
    #[serde(default)]
    pub token: u32,
    /// Carried objects, oldest pickup first.
    #[serde(default)]
    pub inventory: VecDeque<Kind>,
}

impl RobotPose {
    /// Creates a robot with no tokens and an empty inventory.
    #[must_use]
    pub fn new(x: i32, y: i32, dir: Direction) -> Self {
        Self {
            x,
            y,
            dir,
            token: 0,
            inventory: VecDeque::new(),
        }
    }

    /// The cell the robot stands on.
    #[must_use]
    pub const fn position(&self) -> Coord {
        Coord::new(self.x, self.y)
    }
}

/// True if `goal` requires objects of `kind` at `at`.
fn goal_lists_object(goal: Option<&Goal>, at: Coord, kind: &str) -> bool {
    goal.and_then(|g| g.objects.as_ref())
        .and_then(|m| m.get(&at))
        .is_some_and(|kinds| kinds.contains_key(kind))
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A wall on one edge of one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallSegment {
    /// Column of the owning cell.
    pub x: i32,
    /// Row of the owning cell.
    pub y: i32,
    /// Which edge of the cell.
    pub dir: Direction,
    /// Set when the goal lists this wall.
    #[serde(default, skip_serializing_if = "is_false")]
    pub goal_mark: bool,
}

impl WallSegment {
    /// Creates an unmarked wall.
    #[must_use]
    pub const fn new(x: i32, y: i32, dir: Direction) -> Self {
        Self {
            x,
            y,
            dir,
            goal_mark: false,
        }
    }
}

/// Inclusive range a hidden object count was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    /// Smallest possible count.
    pub min: u32,
    /// Largest possible count.
    pub max: u32,
}

impl CountRange {
    /// Creates a range; both ends must be positive and ordered.
    pub fn new(min: i64, max: i64) -> Result<Self, ValidationError> {
        if min < 1 || max < min {
            return Err(ValidationError::InvalidRange { min, max });
        }
        let lo = u32::try_from(min).map_err(|_| ValidationError::InvalidRange { min, max })?;
        let hi = u32::try_from(max).map_err(|_| ValidationError::InvalidRange { min, max })?;
        Ok(Self { min: lo, max: hi })
    }

    /// Uniform draw in `[min, max]`.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }
}

/// All objects of one kind on one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStack {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Object kind.
    pub kind: Kind,
    /// Always positive; empty stacks are removed.
    pub count: u32,
    /// Range the count is redrawn from on each run, if randomized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<CountRange>,
    /// True count withheld from observers until first reveal.
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    /// Set when the goal lists this cell and kind.
    #[serde(default, skip_serializing_if = "is_false")]
    pub goal_mark: bool,
}

impl ObjectStack {
    /// Creates a visible, unranged, unmarked stack.
    #[must_use]
    pub fn new(x: i32, y: i32, kind: impl Into<Kind>, count: u32) -> Self {
        Self {
            x,
            y,
            kind: kind.into(),
            count,
            range: None,
            hidden: false,
            goal_mark: false,
        }
    }

    /// The cell the stack lies on.
    #[must_use]
    pub const fn position(&self) -> Coord {
        Coord::new(self.x, self.y)
    }

    /// Count as an observer may see it: `None` while hidden.
    #[must_use]
    pub const fn visible_count(&self) -> Option<u32> {
        if self.hidden {
            None
        } else {
            Some(self.count)
        }
    }
}

/// A background tile hint for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Tile name from the catalog.
    pub tile: String,
}

/// Background metadata for renderers; never consulted by the rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Background {
    /// Tile for every cell without its own hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    /// Per-cell hints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiles: Vec<Tile>,
}

impl Background {
    /// Assigns `tile` to a cell, replacing any earlier hint there.
    pub fn set_tile(&mut self, x: i32, y: i32, tile: impl Into<String>) {
        let tile = tile.into();
        match self.tiles.iter_mut().find(|t| t.x == x && t.y == y) {
            Some(existing) => existing.tile = tile,
            None => self.tiles.push(Tile { x, y, tile }),
        }
    }

    /// Tile shown at a cell: its own hint, else the fill.
    #[must_use]
    pub fn tile_at(&self, x: i32, y: i32) -> Option<&str> {
        self.tiles
            .iter()
            .find(|t| t.x == x && t.y == y)
            .map(|t| t.tile.as_str())
            .or(self.fill.as_deref())
    }
}

/// The complete grid state at an instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct World {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// The robot.
    pub robot: RobotPose,
    /// Wall records, one per cell edge.
    #[serde(default)]
    pub walls: Vec<WallSegment>,
    /// Object stacks, at most one per cell and kind.
    #[serde(default)]
    pub objects: Vec<ObjectStack>,
    /// Target state, if the world has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<Goal>,
    /// Free-form task text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Renderer hints.
    #[serde(default)]
    pub background: Background,
}

impl World {
    /// Creates an empty world. The robot must be on the grid.
    pub fn new(width: u32, height: u32, robot: RobotPose) -> Result<Self, ValidationError> {
        if width == 0 || height == 0 || i32::try_from(width).is_err() || i32::try_from(height).is_err() {
            return Err(ValidationError::InvalidDimensions {
                width: i64::from(width),
                height: i64::from(height),
                max_width: i32::MAX as u32,
                max_height: i32::MAX as u32,
            });
        }
        let world = Self {
            width,
            height,
            robot,
            walls: Vec::new(),
            objects: Vec::new(),
            goal: None,
            description: None,
            background: Background::default(),
        };
        world.ensure_in_bounds(world.robot.x, world.robot.y)?;
        Ok(world)
    }

    /// True if `(x, y)` lies on the grid.
    #[must_use]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 1 && y >= 1 && i64::from(x) <= i64::from(self.width) && i64::from(y) <= i64::from(self.height)
    }

    /// Like [`World::in_bounds`], as a validation error.
    pub fn ensure_in_bounds(&self, x: i32, y: i32) -> Result<(), ValidationError> {
        if self.in_bounds(x, y) {
            Ok(())
        } else {
            Err(ValidationError::OutOfBounds {
                x: i64::from(x),
                y: i64::from(y),
                width: self.width,
                height: self.height,
            })
        }
    }

    /// True if this exact edge record exists.
    #[must_use]
    pub fn has_wall(&self, x: i32, y: i32, dir: Direction) -> bool {
        self.walls.iter().any(|w| w.x == x && w.y == y && w.dir == dir)
    }

    /// True if either half of the shared edge in direction `dir` from `(x, y)` holds a wall.
    #[must_use]
    pub fn wall_blocks(&self, x: i32, y: i32, dir: Direction) -> bool {
        let next = Coord::new(x, y).step(dir);
        self.has_wall(x, y, dir) || self.has_wall(next.x, next.y, dir.opposite())
    }

    /// Inserts a wall on one edge only. Returns false if it already existed.
    pub fn add_wall(&mut self, x: i32, y: i32, dir: Direction) -> bool {
        if self.has_wall(x, y, dir) {
            return false;
        }
        self.walls.push(WallSegment::new(x, y, dir));
        true
    }

    /// Removes the wall on `(x, y, dir)` and the neighbour's matching edge.
    ///
    /// Returns true if either record was present.
    pub fn remove_wall(&mut self, x: i32, y: i32, dir: Direction) -> bool {
        let next = Coord::new(x, y).step(dir);
        let back = dir.opposite();
        let before = self.walls.len();
        self.walls.retain(|w| {
            !((w.x == x && w.y == y && w.dir == dir) || (w.x == next.x && w.y == next.y && w.dir == back))
        });
        self.walls.len() != before
    }

    /// Stacks on one cell.
    pub fn objects_at(&self, x: i32, y: i32) -> impl Iterator<Item = &ObjectStack> + '_ {
        self.objects.iter().filter(move |o| o.x == x && o.y == y)
    }

    /// Index of the `kind` stack on `(x, y)`.
    #[must_use]
    pub fn stack_index(&self, x: i32, y: i32, kind: &str) -> Option<usize> {
        self.objects
            .iter()
            .position(|o| o.x == x && o.y == y && o.kind == kind)
    }

    /// Objects of `kind` on `(x, y)`, zero if none.
    #[must_use]
    pub fn object_count(&self, x: i32, y: i32, kind: &str) -> u32 {
        self.stack_index(x, y, kind)
            .and_then(|idx| self.objects.get(idx))
            .map_or(0, |o| o.count)
    }

    /// Adds `count` objects of `kind` to a cell, creating the stack if needed.
    ///
    /// A new stack is goal-marked when the goal lists its cell and kind. Returns the stack
    /// index, or `None` when `count == 0` and nothing existed.
    pub fn add_objects(&mut self, x: i32, y: i32, kind: &str, count: u32) -> Option<usize> {
        if let Some(idx) = self.stack_index(x, y, kind) {
            if let Some(stack) = self.objects.get_mut(idx) {
                stack.count = stack.count.saturating_add(count);
            }
            return Some(idx);
        }
        if count == 0 {
            return None;
        }
        let mut stack = ObjectStack::new(x, y, kind, count);
        stack.goal_mark = goal_lists_object(self.goal.as_ref(), stack.position(), kind);
        self.objects.push(stack);
        Some(self.objects.len() - 1)
    }

    /// Removes one object from the stack at `idx`, deleting the stack when it empties.
    pub fn take_one(&mut self, idx: usize) -> Option<Kind> {
        let stack = self.objects.get_mut(idx)?;
        if stack.count == 0 {
            return None;
        }
        stack.count -= 1;
        let kind = stack.kind.clone();
        if stack.count == 0 {
            self.objects.remove(idx);
        }
        Some(kind)
    }

    /// Total of `kind` lying on the grid.
    #[must_use]
    pub fn kind_total(&self, kind: &str) -> u32 {
        self.objects
            .iter()
            .filter(|o| o.kind == kind)
            .map(|o| o.count)
            .sum()
    }

    /// Number of `kind` items the robot carries.
    #[must_use]
    pub fn carried(&self, kind: &str) -> u32 {
        let n = self.robot.inventory.iter().filter(|k| k.as_str() == kind).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Redraws every ranged stack and hides it again.
    pub fn rerandomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for stack in &mut self.objects {
            if let Some(range) = stack.range {
                stack.count = range.draw(rng);
                stack.hidden = true;
            }
        }
    }

    /// Changes the grid size, dropping walls, objects and tiles that fall outside.
    ///
    /// Fails without changes if the robot would end up off the grid.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), ValidationError> {
        let mut resized = Self::new(width, height, self.robot.clone())?;
        resized.walls = std::mem::take(&mut self.walls);
        resized.objects = std::mem::take(&mut self.objects);
        resized.background = std::mem::take(&mut self.background);
        resized.goal = self.goal.take();
        resized.description = self.description.take();

        let in_bounds = |x: i32, y: i32| {
            x >= 1 && y >= 1 && i64::from(x) <= i64::from(width) && i64::from(y) <= i64::from(height)
        };
        resized.walls.retain(|w| in_bounds(w.x, w.y));
        resized.objects.retain(|o| in_bounds(o.x, o.y));
        resized.background.tiles.retain(|t| in_bounds(t.x, t.y));

        *self = resized;
        Ok(())
    }

    /// Flags stacks and walls that the goal refers to.
    pub fn refresh_goal_marks(&mut self) {
        let Some(goal) = self.goal.as_ref() else {
            for stack in &mut self.objects {
                stack.goal_mark = false;
            }
            for wall in &mut self.walls {
                wall.goal_mark = false;
            }
            return;
        };
        for stack in &mut self.objects {
            stack.goal_mark = goal_lists_object(Some(goal), stack.position(), &stack.kind);
        }
        for wall in &mut self.walls {
            wall.goal_mark = goal
                .walls
                .as_ref()
                .and_then(|m| m.get(&Coord::new(wall.x, wall.y)))
                .is_some_and(|dirs| dirs.contains(&wall.dir));
        }
    }
}

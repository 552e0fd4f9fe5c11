//! External world document schema.
//!
//! Fields whose entries are checked one by one (walls, objects, goal, robot orientation)
//! stay as raw JSON here so a single malformed entry can be skipped with a warning
//! instead of rejecting the whole document.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GridResult, ValidationError};

use super::script::Statement;

const fn default_dimension() -> i64 {
    10
}

/// Robot placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSpec {
    /// Column.
    pub x: i64,
    /// Row.
    pub y: i64,
    /// Orientation code, numeric or textual. Defaults to east.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Value>,
    /// Tokens available to `put_token`.
    #[serde(default)]
    pub tokens: u32,
    /// Carried objects, `kind -> count`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub objects: BTreeMap<String, Value>,
}

/// Declarative world description, usually read from JSON.
///
/// ```json
/// {
///   "rows": 5, "cols": 5,
///   "robots": [{"x": 1, "y": 1, "orientation": 0, "tokens": 2}],
///   "walls": {"2,1": ["e"]},
///   "objects": {"3,3": {"carrot": "2-4", "apple": {"number": 1, "goal": true}}},
///   "goal": {"position": [5, 5]},
///   "onload": [{"op": "add_wall", "x": 4, "y": 4, "dir": "n"}]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldDocument {
    /// Grid height.
    pub rows: i64,
    /// Grid width.
    pub cols: i64,
    /// Robot placements; only the first is used.
    pub robots: Vec<RobotSpec>,
    /// `"x,y" -> [direction code, ..]`.
    pub walls: BTreeMap<String, Value>,
    /// `"x,y" -> {kind: count | "lo-hi" | {"number": .., "goal": bool}}`.
    pub objects: BTreeMap<String, Value>,
    /// Goal clauses, parsed leniently.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<Value>,
    /// Fill tile for the whole grid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    /// `"x,y" -> tile`.
    pub tiles: BTreeMap<String, String>,
    /// Free-form task text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Builder-script statements run after the declarative part.
    pub onload: Vec<Statement>,
}

impl Default for WorldDocument {
    fn default() -> Self {
        Self {
            rows: default_dimension(),
            cols: default_dimension(),
            robots: Vec::new(),
            walls: BTreeMap::new(),
            objects: BTreeMap::new(),
            goal: None,
            background: None,
            tiles: BTreeMap::new(),
            description: None,
            onload: Vec::new(),
        }
    }
}

impl WorldDocument {
    /// Parses a JSON document.
    pub fn from_json(s: &str) -> GridResult<Self> {
        let doc = serde_json::from_str(s).map_err(|e| ValidationError::InvalidDocument {
            reason: format!("json: {e}"),
        })?;
        Ok(doc)
    }

    /// Reads a JSON document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> GridResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidDocument {
            reason: format!("read {}: {e}", path.display()),
        })?;
        Self::from_json(&raw)
    }

    /// Serializes to pretty JSON.
    pub fn to_json_pretty(&self) -> GridResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::GridError::internal(format!("serialize document: {e}")))
    }
}

//! Engine and builder configuration.
//!
//! Configuration is plain serde data with defaults, so it can be built in code or read
//! from a TOML file:
//!
//! ```toml
//! default_delay_ms = 150
//! max_width = 40
//! seed = 7
//!
//! [catalog]
//! objects = ["carrot", "apple", "token"]
//! tiles = ["grass", "water"]
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GridResult, ValidationError};

const DEFAULT_OBJECTS: &[&str] = &[
    "apple",
    "banana",
    "beeper",
    "box",
    "carrot",
    "daisy",
    "dandelion",
    "leaf",
    "square",
    "star",
    "strawberry",
    "token",
    "triangle",
    "tulip",
];

const DEFAULT_TILES: &[&str] = &[
    "bricks",
    "grass",
    "gravel",
    "ice",
    "mud",
    "pale_grass",
    "water",
];

/// Object kinds and background tiles the builder accepts.
///
/// Unknown identifiers in a world document are skipped with a warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    /// Known object kinds.
    pub objects: BTreeSet<String>,
    /// Known background tiles.
    pub tiles: BTreeSet<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            objects: DEFAULT_OBJECTS.iter().map(|s| (*s).to_string()).collect(),
            tiles: DEFAULT_TILES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl Catalog {
    /// True if `kind` is a known object kind.
    #[must_use]
    pub fn knows_object(&self, kind: &str) -> bool {
        self.objects.contains(kind)
    }

    /// True if `tile` is a known background tile.
    #[must_use]
    pub fn knows_tile(&self, tile: &str) -> bool {
        self.tiles.contains(tile)
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Pacing delay for actions issued before any `think()` call.
    pub default_delay_ms: u64,
    /// Largest grid a document or builder script may create.
    pub max_width: u32,
    /// See `max_width`.
    pub max_height: u32,
    /// Seed for random counts. `None` draws from OS entropy.
    pub seed: Option<u64>,
    /// Accepted object kinds and tiles.
    pub catalog: Catalog,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            default_delay_ms: 300,
            max_width: 100,
            max_height: 100,
            seed: None,
            catalog: Catalog::default(),
        }
    }
}

impl GridConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_width and max_height must be > 0".to_string(),
            });
        }
        if i32::try_from(self.max_width).is_err() || i32::try_from(self.max_height).is_err() {
            return Err(ValidationError::InvalidConfig {
                reason: "max_width and max_height must fit in i32".to_string(),
            });
        }
        if self.catalog.objects.iter().any(|k| k.trim().is_empty()) {
            return Err(ValidationError::InvalidConfig {
                reason: "catalog object kinds must be non-empty".to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(s: &str) -> GridResult<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("toml: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read a TOML configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> GridResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&raw)
    }

    /// `default_delay_ms` as a [`Duration`].
    #[must_use]
    pub const fn default_delay(&self) -> Duration {
        Duration::from_millis(self.default_delay_ms)
    }

    /// Checks document or script dimensions against the configured limits.
    pub fn check_dimensions(&self, width: i64, height: i64) -> Result<(u32, u32), ValidationError> {
        let err = || ValidationError::InvalidDimensions {
            width,
            height,
            max_width: self.max_width,
            max_height: self.max_height,
        };
        let w = u32::try_from(width).map_err(|_| err())?;
        let h = u32::try_from(height).map_err(|_| err())?;
        if w == 0 || h == 0 || w > self.max_width || h > self.max_height {
            return Err(err());
        }
        Ok((w, h))
    }
}

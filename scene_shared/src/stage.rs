//! Static stage layout.
//!
//! A stage is a character grid authored as plain text: any non-space
//! character is a solid cell. The scene only ever asks one question of it,
//! world-space solidity, and out-of-range queries are not solid rather than
//! an error.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Stage descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMeta {
    pub name: String,
    /// Edge length of one layout cell, in world units.
    pub grid_size: u32,
}

/// Solidity query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solidity {
    pub solid: bool,
}

/// A loaded stage: metadata plus the layout grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub meta: StageMeta,
    pub layout_data: String,
}

impl Stage {
    pub fn new(name: impl Into<String>, grid_size: u32, layout_data: impl Into<String>) -> Self {
        Self {
            meta: StageMeta {
                name: name.into(),
                grid_size,
            },
            layout_data: layout_data.into(),
        }
    }

    /// A stage with no geometry at all.
    pub fn empty() -> Self {
        Self::new("empty", 32, "")
    }

    /// Loads a stage from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read stage {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("parse stage {}", path.display()))
    }

    /// World-space solidity lookup. Coordinates outside the layout, including
    /// negative ones, are never solid.
    pub fn solidity_at(&self, x: f32, y: f32) -> Solidity {
        if self.meta.grid_size == 0 {
            return Solidity { solid: false };
        }
        let gx = (x / self.meta.grid_size as f32).floor();
        let gy = (y / self.meta.grid_size as f32).floor();
        if gx < 0.0 || gy < 0.0 {
            return Solidity { solid: false };
        }
        let solid = self
            .layout_data
            .lines()
            .nth(gy as usize)
            .and_then(|row| row.chars().nth(gx as usize))
            .is_some_and(|c| c != ' ');
        Solidity { solid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> Stage {
        // 3x2 grid, one wall segment on the second row.
        Stage::new("test", 10, "   \n ##\n")
    }

    #[test]
    fn solid_and_open_cells() {
        let s = stage();
        assert!(!s.solidity_at(5.0, 5.0).solid);
        assert!(s.solidity_at(15.0, 15.0).solid);
        assert!(s.solidity_at(25.0, 15.0).solid);
        assert!(!s.solidity_at(5.0, 15.0).solid);
    }

    #[test]
    fn out_of_range_is_not_solid() {
        let s = stage();
        assert!(!s.solidity_at(1000.0, 1000.0).solid);
        assert!(!s.solidity_at(-5.0, 5.0).solid);
        assert!(!s.solidity_at(5.0, -5.0).solid);
    }

    #[test]
    fn empty_stage_is_never_solid() {
        let s = Stage::empty();
        assert!(!s.solidity_at(0.0, 0.0).solid);
    }
}

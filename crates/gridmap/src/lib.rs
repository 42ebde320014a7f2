//! Probability occupancy grid and laser likelihood fields.
//!
//! The [`OccupancyGrid`] is the canonical environment representation: a
//! regular 2D array of cells holding an occupancy probability in [0, 1] or
//! the "unknown" sentinel. The [`LikelihoodMap`] derives from it the
//! distance transform and the two stretched log-likelihood fields the
//! localizer weights laser beams against.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod likelihood;

pub use likelihood::{LikelihoodMap, LikelihoodParams, HUGE_DISTANCE};

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid resolution: {0}")]
    InvalidResolution(f64),
    #[error("Cell data length {got} does not match {width}x{height}")]
    BadCellCount {
        got: usize,
        width: usize,
        height: usize,
    },
    #[error("Cell probability {0} outside [0, 1]")]
    BadProbability(f64),
}

/// Physical layout of a grid: cell counts, cell size and world origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Grid width in cells
    pub width: usize,
    /// Grid height in cells
    pub height: usize,
    /// Cell size in meters
    pub resolution: f64,
    /// World coordinates of the (0, 0) cell corner
    pub origin: (f64, f64),
}

impl GridConfig {
    pub fn new(width: usize, height: usize, resolution: f64) -> Self {
        Self {
            width,
            height,
            resolution,
            origin: (0.0, 0.0),
        }
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
}

/// Occupancy grid over probability cells.
///
/// A cell is either a probability in [0, 1] or [`OccupancyGrid::UNKNOWN`].
/// Storage is a flat row-major array indexed by `(gx, gy)`.
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    config: GridConfig,
    cells: Vec<f32>,
}

impl OccupancyGrid {
    /// Sentinel for cells with no occupancy information.
    pub const UNKNOWN: f32 = -1.0;

    /// Create a grid with every cell free.
    pub fn new(config: GridConfig) -> Result<Self, GridError> {
        if config.resolution <= 0.0 {
            return Err(GridError::InvalidResolution(config.resolution));
        }
        Ok(Self {
            cells: vec![0.0; config.cell_count()],
            config,
        })
    }

    /// Create a grid from existing cell probabilities.
    ///
    /// Cells must be in [0, 1] or [`OccupancyGrid::UNKNOWN`].
    pub fn from_cells(config: GridConfig, cells: Vec<f32>) -> Result<Self, GridError> {
        if config.resolution <= 0.0 {
            return Err(GridError::InvalidResolution(config.resolution));
        }
        if cells.len() != config.cell_count() {
            return Err(GridError::BadCellCount {
                got: cells.len(),
                width: config.width,
                height: config.height,
            });
        }
        for &c in &cells {
            if c != Self::UNKNOWN && !(0.0..=1.0).contains(&(c as f64)) {
                return Err(GridError::BadProbability(c as f64));
            }
        }
        Ok(Self { config, cells })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn width(&self) -> usize {
        self.config.width
    }

    pub fn height(&self) -> usize {
        self.config.height
    }

    pub fn resolution(&self) -> f64 {
        self.config.resolution
    }

    #[inline]
    fn index(&self, gx: usize, gy: usize) -> usize {
        gy * self.config.width + gx
    }

    /// Whether integer cell coordinates fall inside the grid.
    #[inline]
    pub fn contains(&self, gx: i64, gy: i64) -> bool {
        gx >= 0 && gy >= 0 && (gx as usize) < self.config.width && (gy as usize) < self.config.height
    }

    /// Raw cell value: probability or [`OccupancyGrid::UNKNOWN`].
    #[inline]
    pub fn cell(&self, gx: usize, gy: usize) -> Option<f32> {
        if gx < self.config.width && gy < self.config.height {
            Some(self.cells[self.index(gx, gy)])
        } else {
            None
        }
    }

    /// Occupancy probability, `None` for out-of-bounds or unknown cells.
    pub fn probability(&self, gx: usize, gy: usize) -> Option<f32> {
        match self.cell(gx, gy) {
            Some(c) if c != Self::UNKNOWN => Some(c),
            _ => None,
        }
    }

    pub fn is_unknown(&self, gx: usize, gy: usize) -> bool {
        matches!(self.cell(gx, gy), Some(c) if c == Self::UNKNOWN)
    }

    /// Whether the cell is above the given occupancy threshold.
    /// Out-of-bounds and unknown cells do not count as occupied.
    pub fn is_occupied(&self, gx: usize, gy: usize, occupied_prob: f64) -> bool {
        matches!(self.probability(gx, gy), Some(p) if p as f64 > occupied_prob)
    }

    /// Known free cell: inside the grid, known, and at or below threshold.
    pub fn is_free(&self, gx: usize, gy: usize, occupied_prob: f64) -> bool {
        matches!(self.probability(gx, gy), Some(p) if p as f64 <= occupied_prob)
    }

    pub fn set_cell(&mut self, gx: usize, gy: usize, value: f32) {
        if gx < self.config.width && gy < self.config.height {
            let idx = self.index(gx, gy);
            self.cells[idx] = value;
        }
    }

    /// Convert world coordinates to grid cell.
    pub fn world_to_grid(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let local_x = x - self.config.origin.0;
        let local_y = y - self.config.origin.1;
        if local_x < 0.0 || local_y < 0.0 {
            return None;
        }
        let gx = (local_x / self.config.resolution) as usize;
        let gy = (local_y / self.config.resolution) as usize;
        if gx < self.config.width && gy < self.config.height {
            Some((gx, gy))
        } else {
            None
        }
    }

    /// Convert grid cell to world coordinates (cell center).
    pub fn grid_to_world(&self, gx: usize, gy: usize) -> (f64, f64) {
        (
            self.config.origin.0 + (gx as f64 + 0.5) * self.config.resolution,
            self.config.origin.1 + (gy as f64 + 0.5) * self.config.resolution,
        )
    }

    /// World extent of the grid as a vector (width_m, height_m).
    pub fn world_size(&self) -> Vector2<f64> {
        Vector2::new(
            self.config.width as f64 * self.config.resolution,
            self.config.height as f64 * self.config.resolution,
        )
    }

    /// Raw cell slice (row-major), for map export.
    pub fn raw_cells(&self) -> &[f32] {
        &self.cells
    }
}

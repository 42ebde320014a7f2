//! Likelihood-field construction.
//!
//! Converts an occupancy grid into a chamfer distance transform plus two
//! stretched log-likelihood fields: a narrow one for pose tracking and a
//! wide one for global localization. The offset tables record the integer
//! displacement to the nearest obstacle border cell and drive the
//! scan-matching gradient without finite differences.

use tracing::debug;

use crate::{GridConfig, OccupancyGrid};

/// Distance assigned to cells before propagation; also the value reported
/// for maps with no occupied cell at all.
pub const HUGE_DISTANCE: f32 = 32000.0;

const SQRT2: f32 = std::f32::consts::SQRT_2;

/// Parameters of the likelihood-field construction.
#[derive(Debug, Clone, Copy)]
pub struct LikelihoodParams {
    /// Probability above which a cell counts as an obstacle
    pub occupied_prob: f64,
    /// Gaussian std of the tracking field (meters)
    pub lmap_std: f64,
    /// Gaussian std of the global-localization field (meters)
    pub global_lmap_std: f64,
    /// Per-beam likelihood floor in tracking mode
    pub tracking_beam_minlikelihood: f64,
    /// Per-beam likelihood floor in global mode
    pub global_beam_minlikelihood: f64,
}

impl Default for LikelihoodParams {
    fn default() -> Self {
        Self {
            occupied_prob: 0.5,
            lmap_std: 0.3,
            global_lmap_std: 0.6,
            tracking_beam_minlikelihood: 0.45,
            global_beam_minlikelihood: 0.9,
        }
    }
}

/// Distance transform and log-likelihood fields derived from an
/// occupancy grid.
#[derive(Debug, Clone)]
pub struct LikelihoodMap {
    config: GridConfig,
    grid: OccupancyGrid,
    params: LikelihoodParams,
    /// Distance in cells to the nearest obstacle border cell
    distance: Vec<f32>,
    /// Cell displacement to that border cell
    x_offset: Vec<i32>,
    y_offset: Vec<i32>,
    /// log p(z | cell) under the tracking field
    prob: Vec<f32>,
    /// log p(z | cell) under the global field
    gprob: Vec<f32>,
}

impl LikelihoodMap {
    /// Build the distance transform and both likelihood fields.
    ///
    /// The grid is cloned into the map so the localizer keeps a consistent
    /// view even if the source map is replaced later.
    pub fn build(grid: &OccupancyGrid, params: LikelihoodParams) -> Self {
        let config = *grid.config();
        let n = config.cell_count();
        let mut map = Self {
            config,
            grid: grid.clone(),
            params,
            distance: vec![HUGE_DISTANCE; n],
            x_offset: vec![0; n],
            y_offset: vec![0; n],
            prob: vec![0.0; n],
            gprob: vec![0.0; n],
        };

        map.compute_distance_transform();
        map.prob = map.stretched_field(params.lmap_std, params.tracking_beam_minlikelihood);
        map.gprob = map.stretched_field(params.global_lmap_std, params.global_beam_minlikelihood);

        debug!(
            width = config.width,
            height = config.height,
            resolution = config.resolution,
            "Built likelihood map"
        );
        map
    }

    #[inline]
    fn index(&self, gx: usize, gy: usize) -> usize {
        gy * self.config.width + gx
    }

    /// Seed obstacle borders at zero, then two chamfer passes with the
    /// 8-neighbor kernel (orthogonal 1, diagonal sqrt(2)).
    fn compute_distance_transform(&mut self) {
        let (w, h) = (self.config.width as i64, self.config.height as i64);
        let occupied = self.params.occupied_prob;

        // Only obstacle cells adjacent to known free space seed the
        // transform; obstacle interiors receive their distance by
        // propagation like everything else.
        for gx in 0..self.config.width {
            for gy in 0..self.config.height {
                if !self.grid.is_occupied(gx, gy, occupied) {
                    continue;
                }
                let mut border = false;
                for i in -1..=1i64 {
                    for j in -1..=1i64 {
                        if border || (i == 0 && j == 0) {
                            continue;
                        }
                        let (nx, ny) = (gx as i64 + i, gy as i64 + j);
                        if nx >= 0 && ny >= 0 && nx < w && ny < h
                            && self.grid.is_free(nx as usize, ny as usize, occupied)
                        {
                            border = true;
                        }
                    }
                }
                if border {
                    let idx = self.index(gx, gy);
                    self.distance[idx] = 0.0;
                    self.x_offset[idx] = 0;
                    self.y_offset[idx] = 0;
                }
            }
        }

        self.chamfer_pass(true);
        self.chamfer_pass(false);
    }

    fn chamfer_pass(&mut self, forward: bool) {
        let (w, h) = (self.config.width, self.config.height);
        let xs: Vec<usize> = if forward {
            (0..w).collect()
        } else {
            (0..w).rev().collect()
        };
        let ys: Vec<usize> = if forward {
            (0..h).collect()
        } else {
            (0..h).rev().collect()
        };

        for &gx in &xs {
            for &gy in &ys {
                let idx = self.index(gx, gy);
                for i in -1..=1i64 {
                    for j in -1..=1i64 {
                        if i == 0 && j == 0 {
                            continue;
                        }
                        let (nx, ny) = (gx as i64 + i, gy as i64 + j);
                        if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                            continue;
                        }
                        let nidx = self.index(nx as usize, ny as usize);
                        let step = if i * j != 0 { SQRT2 } else { 1.0 };
                        let v = self.distance[nidx] + step;
                        if v < self.distance[idx] {
                            self.distance[idx] = v;
                            self.x_offset[idx] = self.x_offset[nidx] + i as i32;
                            self.y_offset[idx] = self.y_offset[nidx] + j as i32;
                        }
                    }
                }
            }
        }
    }

    /// Gaussian over the distance transform, max-normalized, floored at
    /// `min_likelihood` and taken to log space.
    fn stretched_field(&self, std: f64, min_likelihood: f64) -> Vec<f32> {
        let res = self.config.resolution;
        let mut field: Vec<f32> = self
            .distance
            .iter()
            .map(|&d| {
                let z = d as f64 * res / std;
                (-0.5 * z * z).exp() as f32
            })
            .collect();

        let max = field.iter().cloned().fold(0.0f32, f32::max);
        if max > 0.0 {
            for p in &mut field {
                *p /= max;
            }
        }
        for p in &mut field {
            *p = (min_likelihood + (1.0 - min_likelihood) * *p as f64).ln() as f32;
        }
        field
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// The occupancy grid this map was built from.
    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn params(&self) -> &LikelihoodParams {
        &self.params
    }

    /// Distance in cells to the nearest obstacle border.
    pub fn distance(&self, gx: usize, gy: usize) -> f32 {
        if gx < self.config.width && gy < self.config.height {
            self.distance[gy * self.config.width + gx]
        } else {
            HUGE_DISTANCE
        }
    }

    /// Displacement (in cells) to the nearest obstacle border.
    pub fn offset(&self, gx: usize, gy: usize) -> (i32, i32) {
        if gx < self.config.width && gy < self.config.height {
            let idx = gy * self.config.width + gx;
            (self.x_offset[idx], self.y_offset[idx])
        } else {
            (0, 0)
        }
    }

    /// Tracking-field log likelihood of a beam endpoint in this cell.
    /// `None` outside the grid or over unknown terrain.
    pub fn log_prob(&self, gx: usize, gy: usize) -> Option<f32> {
        if gx < self.config.width && gy < self.config.height && !self.grid.is_unknown(gx, gy) {
            Some(self.prob[gy * self.config.width + gx])
        } else {
            None
        }
    }

    /// Global-field log likelihood, same bounds behavior as [`Self::log_prob`].
    pub fn log_gprob(&self, gx: usize, gy: usize) -> Option<f32> {
        if gx < self.config.width && gy < self.config.height && !self.grid.is_unknown(gx, gy) {
            Some(self.gprob[gy * self.config.width + gx])
        } else {
            None
        }
    }

    /// Log floor used when a tracking-mode beam misses the map.
    pub fn tracking_log_floor(&self) -> f32 {
        self.params.tracking_beam_minlikelihood.ln() as f32
    }

    /// Log floor used when a global-mode beam misses the map.
    pub fn global_log_floor(&self) -> f32 {
        self.params.global_beam_minlikelihood.ln() as f32
    }
}

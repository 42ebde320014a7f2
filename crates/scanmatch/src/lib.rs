//! Incremental laser scan matching.
//!
//! Each incoming scan is registered against a local evidence map built
//! from a sliding window of recent scans: clear the touched cells, re-
//! rasterize the history, blur it, then hill-climb a forward/sideward/
//! rotation correction bounded by a motion-model prior. The corrected
//! poses clean up raw odometry in log processing and can seed the
//! localizer.

use tracing::{debug, trace};
use transforms::{laser_endpoint, Move2D};
use types::Pose;

mod evidence;
mod matching;

pub use evidence::EvidenceMap;

/// Scan-matcher configuration. Defaults correspond to a long-range SICK
/// profile.
#[derive(Debug, Clone)]
pub struct MatchParams {
    /// Beams beyond this range are unusable and dropped by callers (meters)
    pub max_usable_laser_range: f64,
    /// Beams beyond this range do not enter the local map (meters)
    pub local_map_max_range: f64,
    /// Local map resolution (meters per cell)
    pub local_map_resolution: f64,
    /// Odd separable kernel length, in cells
    pub local_map_kernel_len: usize,
    /// Apply the odometry prior during the hill climb
    pub local_map_use_odometry: bool,
    /// Number of convolution rounds
    pub local_map_num_convolve: usize,
    /// Likelihood of unobserved cells
    pub local_map_std_val: f64,
    /// Scan history ring capacity
    pub local_map_history_length: usize,
    /// At most this many history scans enter the local map
    pub local_map_max_used_history: usize,
    /// Older scans only enter if at least this far from the previously
    /// included scan (meters)
    pub local_map_min_bbox_distance: f64,
    /// The most recent scans always enter, regardless of distance
    pub local_map_use_last_scans: usize,
    /// Endpoints beyond this range do not grow the bounding box (meters)
    pub bounding_box_max_range: f64,
    /// Bounding boxes are padded by this much on each side (meters)
    pub bounding_box_border: f64,
    /// Motion prior spread, forward (meters)
    pub motion_model_forward: f64,
    /// Motion prior spread, sideward (meters)
    pub motion_model_sideward: f64,
    /// Motion prior spread, rotation (radians)
    pub motion_model_rotation: f64,
    /// Initial hill-climb step, forward (meters)
    pub pos_corr_step_size_forward: f64,
    /// Initial hill-climb step, sideward (meters)
    pub pos_corr_step_size_sideward: f64,
    /// Initial hill-climb step, rotation (radians)
    pub pos_corr_step_size_rotation: f64,
    /// Number of step-halving refinement levels
    pub pos_corr_step_size_loop: usize,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            max_usable_laser_range: 81.9,
            local_map_max_range: 20.0,
            local_map_resolution: 0.08,
            local_map_kernel_len: 5,
            local_map_use_odometry: true,
            local_map_num_convolve: 1,
            local_map_std_val: 0.01,
            local_map_history_length: 5000,
            local_map_max_used_history: 300,
            local_map_min_bbox_distance: 0.6,
            local_map_use_last_scans: 2,
            bounding_box_max_range: 20.0,
            bounding_box_border: 0.0,
            motion_model_forward: 0.013,
            motion_model_sideward: 0.013,
            motion_model_rotation: 0.125,
            pos_corr_step_size_forward: 0.075,
            pos_corr_step_size_sideward: 0.075,
            pos_corr_step_size_rotation: 0.125,
            pos_corr_step_size_loop: 7,
        }
    }
}

/// Axis-aligned bounding box of a scan's endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBox {
    pub min: (f64, f64),
    pub max: (f64, f64),
}

impl BoundingBox {
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.0 <= other.max.0
            && other.min.0 <= self.max.0
            && self.min.1 <= other.max.1
            && other.min.1 <= self.max.1
    }
}

/// One archived scan with its corrected pose and world-frame endpoints.
#[derive(Debug, Clone, Default)]
struct HistoryScan {
    timestamp: f64,
    est_pose: Pose,
    ranges: Vec<f64>,
    angles: Vec<f64>,
    endpoints: Vec<(f64, f64)>,
    bbox: BoundingBox,
}

/// Incremental scan matcher over a ring of recent scans.
pub struct ScanMatcher {
    params: MatchParams,
    map: EvidenceMap,
    kernel: Vec<f64>,
    history: Vec<HistoryScan>,
    /// Monotone write counter; the slot is `ptr % capacity`
    ptr: usize,
    started: bool,
    last_pos: Pose,
}

impl ScanMatcher {
    pub fn new(params: MatchParams) -> Self {
        let map = EvidenceMap::new(
            params.local_map_max_range,
            params.local_map_resolution,
            params.local_map_std_val,
        );
        let kernel = evidence::gauss_kernel(params.local_map_kernel_len);
        let capacity = params.local_map_history_length.max(1);
        Self {
            map,
            kernel,
            history: vec![HistoryScan::default(); capacity],
            ptr: 0,
            started: false,
            last_pos: Pose::default(),
            params,
        }
    }

    pub fn params(&self) -> &MatchParams {
        &self.params
    }

    /// Number of scans archived so far.
    pub fn history_len(&self) -> usize {
        self.ptr.min(self.history.len())
    }

    /// Forget the scan history, e.g. after a map change or localize reset.
    pub fn reset(&mut self) {
        self.ptr = 0;
        self.started = false;
        self.map.clear(self.half_kernel());
        debug!("Scan matcher history reset");
    }

    fn half_kernel(&self) -> usize {
        (self.params.local_map_kernel_len - 1) / 2
    }

    /// Match a scan against the local map built from history.
    ///
    /// `pos` is the prior pose estimate (typically odometry). The first
    /// call seeds the history and returns the prior unchanged; later calls
    /// return the hill-climbed correction.
    pub fn match_scan(
        &mut self,
        ranges: &[f64],
        angles: &[f64],
        pos: Pose,
        timestamp: f64,
    ) -> Pose {
        let capacity = self.history.len();
        let slot = self.ptr % capacity;
        self.history[slot].timestamp = timestamp;
        self.history[slot].ranges = ranges.to_vec();
        self.history[slot].angles = angles.to_vec();

        let est_pose = if !self.started {
            self.started = true;
            trace!("First scan seeds matcher history");
            pos
        } else {
            let est_move = Move2D::between(&self.last_pos, &pos);
            self.map.clear(self.half_kernel());

            let prev = (self.ptr - 1) % capacity;
            let center_pos = self.history[prev].est_pose;
            self.rasterize(prev, Move2D::ZERO);

            // Walk the history backwards, skipping scans that cannot
            // overlap and scans too close to the last one included.
            let mut included_pose = self.history[prev].est_pose;
            let mut used = 1usize;
            // Entries older than one ring revolution have been overwritten.
            let floor_idx = self.ptr as i64 - capacity as i64;
            let mut h = self.ptr as i64 - 2;
            while h >= 0 && h > floor_idx && used < self.params.local_map_max_used_history {
                let hp = h as usize % capacity;
                let age = self.ptr - 1 - h as usize;
                let overlaps = self.history[prev].bbox.intersects(&self.history[hp].bbox);
                let spaced = age < self.params.local_map_use_last_scans
                    || included_pose.distance(&self.history[hp].est_pose)
                        > self.params.local_map_min_bbox_distance;
                if overlaps && spaced {
                    let mv = Move2D::between(&self.history[hp].est_pose, &center_pos);
                    self.rasterize(hp, mv);
                    included_pose = self.history[hp].est_pose;
                    used += 1;
                }
                h -= 1;
            }

            self.map
                .convolve(&self.kernel, self.params.local_map_num_convolve);

            let best = matching::fit_scan(
                &self.params,
                &self.map,
                &self.history[slot].ranges,
                &self.history[slot].angles,
                est_move,
            );
            trace!(
                scans = used,
                forward = best.forward,
                sideward = best.sideward,
                rotation = best.rotation,
                "Scan match"
            );
            best.apply(&center_pos)
        };

        let entry = &mut self.history[slot];
        entry.est_pose = est_pose;
        entry.endpoints = entry
            .ranges
            .iter()
            .zip(&entry.angles)
            .map(|(&r, &a)| laser_endpoint(&est_pose, r, a))
            .collect();
        let bbox = self.compute_bbox(slot);
        self.history[slot].bbox = bbox;

        self.last_pos = pos;
        self.ptr += 1;
        est_pose
    }

    /// Rasterize a history entry into the evidence map, displaced by `mv`
    /// relative to the map center.
    fn rasterize(&mut self, slot: usize, mv: Move2D) {
        let rpos = mv.backwards_origin_pose();
        let entry = &self.history[slot];
        let max_range = self.params.local_map_max_range;
        let cells: Vec<(i64, i64)> = entry
            .ranges
            .iter()
            .zip(&entry.angles)
            .filter(|(&r, _)| r < max_range)
            .map(|(&r, &a)| {
                let (x, y) = laser_endpoint(&rpos, r, a);
                self.map.cell_of(x, y)
            })
            .collect();
        for (cx, cy) in cells {
            self.map.add_endpoint(cx, cy);
        }
    }

    fn compute_bbox(&self, slot: usize) -> BoundingBox {
        let entry = &self.history[slot];
        let mut min = (f64::MAX, f64::MAX);
        let mut max = (f64::MIN, f64::MIN);
        for ((&r, _), &(x, y)) in entry
            .ranges
            .iter()
            .zip(&entry.angles)
            .zip(&entry.endpoints)
        {
            if r < self.params.bounding_box_max_range {
                min.0 = min.0.min(x);
                min.1 = min.1.min(y);
                max.0 = max.0.max(x);
                max.1 = max.1.max(y);
            }
        }
        let border = self.params.bounding_box_border;
        BoundingBox {
            min: (min.0 - border, min.1 - border),
            max: (max.0 + border, max.1 + border),
        }
    }
}

//! Monte-Carlo localization particle filter.
//!
//! The belief is a fixed-capacity set of weighted particles. Weights live
//! in log space between laser updates and only become linear at resample
//! and summary time, which keeps long products of per-beam likelihoods
//! from underflowing.

use rand::Rng;
use std::f64::consts::{FRAC_PI_2, PI};
use tracing::{debug, info};

use gridmap::LikelihoodMap;
use transforms::normalize_angle;
use types::{LaserConfig, Pose, RobotLaser};

use crate::motion::{sample_gaussian, MotionModel};
use crate::LocalizeParams;

/// A single pose hypothesis. `weight` is a log weight between resamples.
#[derive(Debug, Clone, Copy, Default)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub weight: f64,
}

/// Bounded max-queue of scored pose hypotheses for global initialization.
/// Keeps the best `capacity` entries; exposes the current worst score so
/// the scoring loop can bail out early.
struct HypothesisQueue {
    capacity: usize,
    entries: Vec<(f64, Pose)>,
}

impl HypothesisQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Score of the current tail, -inf while the queue has room.
    fn tail_score(&self) -> f64 {
        if self.is_full() {
            self.entries.last().map(|(s, _)| *s).unwrap_or(f64::NEG_INFINITY)
        } else {
            f64::NEG_INFINITY
        }
    }

    fn add(&mut self, score: f64, pose: Pose) {
        if self.is_full() && score <= self.tail_score() {
            return;
        }
        let at = self
            .entries
            .partition_point(|(s, _)| *s >= score);
        self.entries.insert(at, (score, pose));
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
    }
}

/// MCL particle filter state.
pub struct ParticleFilter {
    params: LocalizeParams,
    particles: Vec<Particle>,
    last_odometry: Pose,
    initialized: bool,
    first_odometry: bool,
    global_mode: bool,
    distance_travelled: f64,
    /// Resolved beam decimation (params.laser_skip, or derived from
    /// integrate_angle on the first scan).
    laser_skip: usize,
    /// Which beams contributed to the last weighting cycle
    laser_mask: Vec<bool>,
    /// Per-particle per-beam scratch for outlier filtering
    temp_weights: Vec<Vec<f64>>,
}

impl ParticleFilter {
    pub fn new(params: LocalizeParams) -> Self {
        let n = params.num_particles;
        Self {
            particles: vec![Particle::default(); n],
            last_odometry: Pose::default(),
            initialized: false,
            first_odometry: true,
            global_mode: false,
            distance_travelled: 0.0,
            laser_skip: params.laser_skip,
            laser_mask: Vec::new(),
            temp_weights: vec![Vec::new(); n],
            params,
        }
    }

    pub fn params(&self) -> &LocalizeParams {
        &self.params
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// True while the particle cloud is dispersed and the wide likelihood
    /// field is in use.
    pub fn global_mode(&self) -> bool {
        self.global_mode
    }

    pub fn distance_travelled(&self) -> f64 {
        self.distance_travelled
    }

    pub fn last_odometry(&self) -> Pose {
        self.last_odometry
    }

    /// Beams actually used in the last weighting cycle.
    pub fn laser_mask(&self) -> &[bool] {
        &self.laser_mask
    }

    fn resolve_laser_skip(&mut self, angular_resolution: f64) -> usize {
        if self.laser_skip == 0 {
            self.laser_skip =
                ((self.params.integrate_angle / angular_resolution).floor() as usize).max(1);
            debug!(skip = self.laser_skip, "Auto-derived laser skip");
        }
        self.laser_skip
    }

    /// Initialize from a single Gaussian.
    pub fn init_gaussian(&mut self, rng: &mut impl Rng, mean: Pose, std: Pose) {
        self.init_gaussians(rng, &[(mean, std)]);
    }

    /// Initialize from a mixture of Gaussians; particles are split evenly
    /// across the modes.
    pub fn init_gaussians(&mut self, rng: &mut impl Rng, modes: &[(Pose, Pose)]) {
        if modes.is_empty() {
            return;
        }
        let n = self.particles.len();
        let each = n / modes.len();
        for (m, (mean, std)) in modes.iter().enumerate() {
            let start = m * each;
            let end = if m == modes.len() - 1 { n } else { (m + 1) * each };
            for p in &mut self.particles[start..end] {
                p.x = sample_gaussian(rng, mean.x, std.x);
                p.y = sample_gaussian(rng, mean.y, std.y);
                p.theta = normalize_angle(sample_gaussian(rng, mean.theta, std.theta));
                p.weight = 0.0;
            }
        }
        self.initialized = true;
        self.first_odometry = true;
        self.global_mode = modes.len() >= 2;
        self.distance_travelled = 0.0;
        info!(modes = modes.len(), "Initialized particles from gaussians");
    }

    /// Global localization: scatter pose hypotheses over the free space of
    /// the map, score them against the wide likelihood field, and keep the
    /// best ones as the initial particle set.
    pub fn init_uniform(
        &mut self,
        rng: &mut impl Rng,
        laser: &RobotLaser,
        map: &LikelihoodMap,
    ) {
        let skip = self.resolve_laser_skip(laser.config.angular_resolution);
        self.initialized = false;

        let n = laser.ranges.len();
        let res = map.config().resolution;
        let (w, h) = (map.config().width, map.config().height);
        let occupied = self.params.likelihood.occupied_prob;
        let grid = map.grid();

        let beam_valid: Vec<bool> = laser
            .ranges
            .iter()
            .map(|&r| r < laser.config.maximum_range && r < self.params.max_range)
            .collect();

        // Beam endpoints in cell units for a hypothetical pose at the
        // origin with theta = 0; rotated per hypothesis below.
        let mut beam_x = vec![0.0f64; n];
        let mut beam_y = vec![0.0f64; n];
        for i in 0..n {
            let angle = laser.config.beam_angle(i);
            beam_x[i] = (self.params.front_laser_offset + laser.ranges[i] * angle.cos()) / res;
            beam_y[i] = laser.ranges[i] * angle.sin() / res;
        }

        let mut queue = HypothesisQueue::new(self.params.num_particles);
        for trial in 0..self.params.global_test_samples {
            if trial % 10000 == 0 {
                debug!(
                    trial,
                    total = self.params.global_test_samples,
                    "Global localization progress"
                );
            }
            let (cell_x, cell_y) = loop {
                let x = rng.gen_range(0.0..w as f64 - 1.0);
                let y = rng.gen_range(0.0..h as f64 - 1.0);
                if grid.is_free(x as usize, y as usize, occupied) {
                    break (x, y);
                }
            };
            let theta = rng.gen_range(-PI..PI);
            let (sin_t, cos_t) = theta.sin_cos();

            let mut score = 0.0;
            let mut j = 0;
            while j < n && (!queue.is_full() || score > queue.tail_score()) {
                if beam_valid[j] {
                    let x = (cell_x + beam_x[j] * cos_t - beam_y[j] * sin_t) as i64;
                    let y = (cell_y + beam_x[j] * sin_t + beam_y[j] * cos_t) as i64;
                    if grid.contains(x, y) {
                        score += map
                            .log_gprob(x as usize, y as usize)
                            .unwrap_or(map.global_log_floor())
                            as f64;
                    } else {
                        score -= 100.0;
                    }
                }
                j += skip;
            }
            queue.add(score, Pose::new(cell_x, cell_y, theta));
        }

        let (ox, oy) = map.config().origin;
        for (p, (_, pose)) in self.particles.iter_mut().zip(queue.entries.iter()) {
            p.x = ox + pose.x * res;
            p.y = oy + pose.y * res;
            p.theta = pose.theta;
            p.weight = 0.0;
        }

        if self.params.do_scanmatching {
            for i in 0..self.particles.len() {
                let mut pose = Pose::new(
                    self.particles[i].x,
                    self.particles[i].y,
                    self.particles[i].theta,
                );
                crate::gradient::refine_pose_gradient(
                    &laser.ranges,
                    &laser.config,
                    &mut pose,
                    self.params.front_laser_offset,
                    map,
                    skip,
                );
                self.particles[i].x = pose.x;
                self.particles[i].y = pose.y;
                self.particles[i].theta = pose.theta;
                self.particles[i].weight = 0.0;
            }
        }

        self.initialized = true;
        self.first_odometry = true;
        self.global_mode = true;
        self.distance_travelled = 0.0;
        info!(
            samples = self.params.global_test_samples,
            particles = self.particles.len(),
            "Global localization complete"
        );
    }

    /// Copy an explicit particle set into the filter, resizing if needed.
    pub fn init_manual(&mut self, x: &[f64], y: &[f64], theta: &[f64], weight: &[f64]) {
        let n = x.len().min(y.len()).min(theta.len()).min(weight.len());
        if n != self.particles.len() {
            self.particles.resize(n, Particle::default());
            self.temp_weights.resize(n, Vec::new());
            self.params.num_particles = n;
        }
        for i in 0..n {
            self.particles[i] = Particle {
                x: x[i],
                y: y[i],
                theta: theta[i],
                weight: weight[i],
            };
        }
        self.initialized = true;
        self.first_odometry = true;
        self.global_mode = false;
        self.distance_travelled = 0.0;
    }

    /// Propagate every particle by a noisy sample of the odometry delta.
    pub fn incorporate_odometry(&mut self, rng: &mut impl Rng, odometry: Pose) {
        if self.first_odometry {
            // The first reading only seeds the delta computation.
            self.last_odometry = odometry;
            self.first_odometry = false;
            return;
        }

        let dx = odometry.x - self.last_odometry.x;
        let dy = odometry.y - self.last_odometry.y;
        let delta_t = dx.hypot(dy);
        let delta_theta = normalize_angle(odometry.theta - self.last_odometry.theta);
        let backwards = dx * odometry.theta.cos() + dy * odometry.theta.sin() < 0.0;

        self.distance_travelled += delta_t;

        match self.params.motion {
            MotionModel::Standard(model) => {
                let sign = if backwards { -1.0 } else { 1.0 };
                for p in &mut self.particles {
                    let downrange = model.sample_downrange(rng, delta_t, delta_theta);
                    let crossrange = model.sample_crossrange(rng, delta_t, delta_theta);
                    let turn = model.sample_turn(rng, delta_t, delta_theta);
                    let heading = p.theta + turn / 2.0;
                    p.x += sign
                        * (downrange * heading.cos() + crossrange * (heading + FRAC_PI_2).cos());
                    p.y += sign
                        * (downrange * heading.sin() + crossrange * (heading + FRAC_PI_2).sin());
                    p.theta = normalize_angle(p.theta + turn);
                }
            }
            MotionModel::Legacy(model) => {
                // Rotate-translate-rotate decomposition; collapses for tiny
                // translations where the atan2 becomes unstable.
                let (dr1, dr2) = if delta_t < 0.05 {
                    let half = delta_theta / 2.0;
                    (half, half)
                } else {
                    let heading = if backwards {
                        (-dy).atan2(-dx)
                    } else {
                        dy.atan2(dx)
                    };
                    let dr1 = normalize_angle(heading - self.last_odometry.theta);
                    let dr2 = normalize_angle(
                        odometry.theta - self.last_odometry.theta - dr1,
                    );
                    (dr1, dr2)
                };
                let std_r1 = model.odom_a1 * dr1.abs() + model.odom_a2 * delta_t;
                let std_t = model.odom_a3 * delta_t + model.odom_a4 * (dr1.abs() + dr2.abs());
                let std_r2 = model.odom_a1 * dr2.abs() + model.odom_a2 * delta_t;
                let sign = if backwards { -1.0 } else { 1.0 };
                for p in &mut self.particles {
                    let hat_r1 = sample_gaussian(rng, dr1, std_r1);
                    let hat_t = sample_gaussian(rng, delta_t, std_t);
                    let hat_r2 = sample_gaussian(rng, dr2, std_r2);
                    p.x += sign * hat_t * (p.theta + hat_r1).cos();
                    p.y += sign * hat_t * (p.theta + hat_r1).sin();
                    p.theta = normalize_angle(p.theta + hat_r1 + hat_r2);
                }
            }
        }

        self.last_odometry = odometry;
    }

    /// Spread test: any particle farther than the threshold from the cloud
    /// mean (in either axis) pushes the filter into global mode.
    fn global_mode_test(&self) -> bool {
        let n = self.particles.len() as f64;
        let mean_x: f64 = self.particles.iter().map(|p| p.x).sum::<f64>() / n;
        let mean_y: f64 = self.particles.iter().map(|p| p.y).sum::<f64>() / n;
        self.particles.iter().any(|p| {
            (p.x - mean_x).abs() > self.params.global_distance_threshold
                || (p.y - mean_y).abs() > self.params.global_distance_threshold
        })
    }

    /// Weight every particle by the laser scan against the likelihood map.
    pub fn incorporate_laser(
        &mut self,
        map: &LikelihoodMap,
        ranges: &[f64],
        config: &LaserConfig,
        forward_offset: f64,
        backwards: bool,
    ) {
        let n = ranges.len();
        let skip = self.resolve_laser_skip(config.angular_resolution);
        let res = map.config().resolution;
        let (ox, oy) = map.config().origin;
        let grid = map.grid();
        let occupied = self.params.likelihood.occupied_prob;

        for p in &mut self.particles {
            p.weight = 0.0;
        }

        // Endpoint offsets in cell units for a particle at the origin with
        // theta = 0; constant across particles.
        let mut beam_x = vec![0.0f64; n];
        let mut beam_y = vec![0.0f64; n];
        self.laser_mask.clear();
        self.laser_mask.resize(n, false);
        for i in 0..n {
            let angle = config.beam_angle(i);
            beam_x[i] = (forward_offset + ranges[i] * angle.cos()) / res;
            beam_y[i] = ranges[i] * angle.sin() / res;
            if backwards {
                beam_x[i] = -beam_x[i];
                beam_y[i] = -beam_y[i];
            }
            self.laser_mask[i] =
                i % skip == 0 && ranges[i] < self.params.max_range && ranges[i] < config.maximum_range;
        }

        self.global_mode = self.global_mode_test();

        if self.global_mode {
            let floor = map.global_log_floor() as f64;
            for p in &mut self.particles {
                let cell_x = (p.x - ox) / res;
                let cell_y = (p.y - oy) / res;
                let (sin_t, cos_t) = p.theta.sin_cos();
                let robot_outside = self.params.constrain_to_map
                    && !Self::robot_cell_ok(grid, cell_x, cell_y, occupied);
                for j in (0..n).step_by(skip) {
                    if !self.laser_mask[j] {
                        continue;
                    }
                    let x = (cell_x + beam_x[j] * cos_t - beam_y[j] * sin_t) as i64;
                    let y = (cell_y + beam_x[j] * sin_t + beam_y[j] * cos_t) as i64;
                    let w = if robot_outside || !grid.contains(x, y) {
                        floor
                    } else {
                        map.log_gprob(x as usize, y as usize)
                            .map(|v| v as f64)
                            .unwrap_or(floor)
                    };
                    p.weight += w;
                }
            }
        } else {
            let floor = map.tracking_log_floor() as f64;
            for (i, p) in self.particles.iter().enumerate() {
                let scratch = &mut self.temp_weights[i];
                scratch.clear();
                scratch.resize(n, 0.0);
                let cell_x = (p.x - ox) / res;
                let cell_y = (p.y - oy) / res;
                let (sin_t, cos_t) = p.theta.sin_cos();
                let robot_outside = self.params.constrain_to_map
                    && !Self::robot_cell_ok(grid, cell_x, cell_y, occupied);
                for j in (0..n).step_by(skip) {
                    if !self.laser_mask[j] {
                        continue;
                    }
                    let x = (cell_x + beam_x[j] * cos_t - beam_y[j] * sin_t) as i64;
                    let y = (cell_y + beam_x[j] * sin_t + beam_y[j] * cos_t) as i64;
                    scratch[j] = if robot_outside || !grid.contains(x, y) {
                        floor
                    } else {
                        map.log_prob(x as usize, y as usize)
                            .map(|v| v as f64)
                            .unwrap_or(floor)
                    };
                }
            }

            // Beams improbable in a large fraction of the particles are
            // dynamic obstacles; drop them for this cycle only.
            let log_min_wall = self.params.min_wall_prob.ln();
            let num = self.particles.len() as f64;
            let mut dropped = 0usize;
            for j in (0..n).step_by(skip) {
                if !self.laser_mask[j] {
                    continue;
                }
                let count = self
                    .temp_weights
                    .iter()
                    .filter(|tw| tw[j] < log_min_wall)
                    .count();
                if count as f64 / num > self.params.outlier_fraction {
                    self.laser_mask[j] = false;
                    dropped += 1;
                }
            }
            if dropped > 0 {
                debug!(dropped, "Rejected outlier beams");
            }

            for (i, p) in self.particles.iter_mut().enumerate() {
                for j in (0..n).step_by(skip) {
                    if self.laser_mask[j] {
                        p.weight += self.temp_weights[i][j];
                    }
                }
            }
        }
    }

    fn robot_cell_ok(
        grid: &gridmap::OccupancyGrid,
        cell_x: f64,
        cell_y: f64,
        occupied_prob: f64,
    ) -> bool {
        let (x, y) = (cell_x as i64, cell_y as i64);
        grid.contains(x, y) && !grid.is_occupied(x as usize, y as usize, occupied_prob)
    }

    /// Low-variance (stochastic universal) resampling.
    pub fn resample(&mut self, rng: &mut impl Rng) {
        let n = self.particles.len();
        if n == 0 {
            return;
        }
        let max_weight = self
            .particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::NEG_INFINITY, f64::max);

        let mut cumulative = Vec::with_capacity(n);
        let mut total = 0.0;
        for p in &self.particles {
            total += (p.weight - max_weight).exp();
            cumulative.push(total);
        }
        if !(total > 0.0) {
            for p in &mut self.particles {
                p.weight = 0.0;
            }
            return;
        }

        let mut position = rng.gen_range(0.0..total);
        let step = total / n as f64;
        let mut which = 0usize;
        let mut survivors = Vec::with_capacity(n);
        for _ in 0..n {
            position += step;
            if position > total {
                position -= total;
                which = 0;
            }
            while which < n - 1 && position > cumulative[which] {
                which += 1;
            }
            survivors.push(self.particles[which]);
        }
        self.particles = survivors;
        for p in &mut self.particles {
            p.weight = 0.0;
        }
    }

    /// One full filter cycle from a robot laser message: motion integration
    /// of the stamped odometry, sensor weighting, and a resample once the
    /// robot has moved far enough.
    pub fn run(
        &mut self,
        rng: &mut impl Rng,
        map: &LikelihoodMap,
        laser: &RobotLaser,
        forward_offset: f64,
        backwards: bool,
    ) {
        if !self.initialized {
            return;
        }

        self.incorporate_odometry(rng, laser.robot_pose);

        if self.params.use_sensor {
            self.incorporate_laser(map, &laser.ranges, &laser.config, forward_offset, backwards);

            if self.distance_travelled > self.params.update_distance {
                self.resample(rng);
                self.distance_travelled = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::StandardMotionParams;
    use gridmap::{GridConfig, LikelihoodParams, OccupancyGrid};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn zero_noise_params(num_particles: usize) -> LocalizeParams {
        LocalizeParams {
            num_particles,
            motion: MotionModel::Standard(StandardMotionParams {
                std_dev_d_d: 0.0,
                std_dev_d_t: 0.0,
                std_dev_c_d: 0.0,
                std_dev_c_t: 0.0,
                std_dev_t_d: 0.0,
                std_dev_t_t: 0.0,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_odometry_only_seeds() {
        let mut filter = ParticleFilter::new(zero_noise_params(10));
        let mut rng = StdRng::seed_from_u64(1);
        filter.init_gaussian(&mut rng, Pose::default(), Pose::default());
        filter.incorporate_odometry(&mut rng, Pose::new(5.0, 5.0, 0.0));
        // No particle moved, no distance accumulated.
        assert_eq!(filter.distance_travelled(), 0.0);
        assert!(filter.particles().iter().all(|p| p.x == 0.0 && p.y == 0.0));
    }

    #[test]
    fn test_zero_delta_leaves_particles_unchanged() {
        let mut filter = ParticleFilter::new(zero_noise_params(10));
        let mut rng = StdRng::seed_from_u64(1);
        filter.init_gaussian(&mut rng, Pose::new(1.0, 2.0, 0.5), Pose::default());
        let pose = Pose::new(3.0, 3.0, 0.2);
        filter.incorporate_odometry(&mut rng, pose);
        filter.incorporate_odometry(&mut rng, pose);
        for p in filter.particles() {
            assert_eq!(p.x, 1.0);
            assert_eq!(p.y, 2.0);
            assert_eq!(p.theta, 0.5);
        }
    }

    #[test]
    fn test_forward_motion_propagates() {
        let mut filter = ParticleFilter::new(zero_noise_params(5));
        let mut rng = StdRng::seed_from_u64(1);
        filter.init_gaussian(&mut rng, Pose::default(), Pose::default());
        filter.incorporate_odometry(&mut rng, Pose::new(0.0, 0.0, 0.0));
        filter.incorporate_odometry(&mut rng, Pose::new(0.1, 0.0, 0.0));
        for p in filter.particles() {
            assert!((p.x - 0.1).abs() < 1e-12);
            assert!(p.y.abs() < 1e-12);
        }
        assert!((filter.distance_travelled() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_backwards_motion_detected() {
        let mut filter = ParticleFilter::new(zero_noise_params(5));
        let mut rng = StdRng::seed_from_u64(1);
        filter.init_gaussian(&mut rng, Pose::default(), Pose::default());
        filter.incorporate_odometry(&mut rng, Pose::new(0.0, 0.0, 0.0));
        // Robot facing +x but moving in -x: reverse.
        filter.incorporate_odometry(&mut rng, Pose::new(-0.2, 0.0, 0.0));
        for p in filter.particles() {
            assert!((p.x + 0.2).abs() < 1e-12);
        }
    }

    #[test]
    fn test_resample_keeps_only_weighted_particles() {
        let mut filter = ParticleFilter::new(zero_noise_params(4));
        filter.init_manual(
            &[0.0, 1.0, 2.0, 3.0],
            &[0.0; 4],
            &[0.0; 4],
            &[0.0, f64::NEG_INFINITY, 0.0, f64::NEG_INFINITY],
        );
        let mut rng = StdRng::seed_from_u64(99);
        filter.resample(&mut rng);
        for p in filter.particles() {
            assert!(p.x == 0.0 || p.x == 2.0, "survivor at x={}", p.x);
            assert_eq!(p.weight, 0.0);
        }
    }

    #[test]
    fn test_theta_normalized_after_updates() {
        let mut filter = ParticleFilter::new(zero_noise_params(8));
        let mut rng = StdRng::seed_from_u64(3);
        filter.init_gaussian(
            &mut rng,
            Pose::new(0.0, 0.0, 3.0),
            Pose::new(0.0, 0.0, 0.0),
        );
        filter.incorporate_odometry(&mut rng, Pose::new(0.0, 0.0, 3.0));
        filter.incorporate_odometry(&mut rng, Pose::new(0.0, 0.0, -3.0));
        for p in filter.particles() {
            assert!(p.theta > -PI && p.theta <= PI);
        }
    }

    #[test]
    fn test_global_mode_switch_uses_wide_field() {
        let config = GridConfig::new(20, 20, 0.1);
        let mut cells = vec![0.0f32; 400];
        cells[10 * 20 + 10] = 1.0;
        let grid = OccupancyGrid::from_cells(config, cells).unwrap();
        let map = gridmap::LikelihoodMap::build(&grid, LikelihoodParams::default());

        let mut params = zero_noise_params(4);
        params.global_distance_threshold = 0.5;
        params.laser_skip = 1;
        let mut filter = ParticleFilter::new(params);
        // Two clusters 1.6 m apart: spread beyond the threshold.
        filter.init_manual(
            &[0.2, 0.2, 1.8, 1.8],
            &[0.2, 0.2, 1.8, 1.8],
            &[0.0; 4],
            &[0.0; 4],
        );
        let config = LaserConfig {
            start_angle: 0.0,
            angular_resolution: 0.1,
            ..Default::default()
        };
        filter.incorporate_laser(&map, &[0.5, 0.5, 0.5], &config, 0.0, false);
        assert!(filter.global_mode());

        // A tight cluster drops back to tracking mode.
        filter.init_manual(&[0.5; 4], &[0.5; 4], &[0.0; 4], &[0.0; 4]);
        filter.incorporate_laser(&map, &[0.5, 0.5, 0.5], &config, 0.0, false);
        assert!(!filter.global_mode());
    }

    #[test]
    fn test_hypothesis_queue_bounded() {
        let mut queue = HypothesisQueue::new(3);
        for i in 0..10 {
            queue.add(i as f64, Pose::new(i as f64, 0.0, 0.0));
        }
        assert_eq!(queue.entries.len(), 3);
        // Best three scores survive, in descending order.
        let scores: Vec<f64> = queue.entries.iter().map(|(s, _)| *s).collect();
        assert_eq!(scores, vec![9.0, 8.0, 7.0]);
        assert_eq!(queue.tail_score(), 7.0);
    }
}

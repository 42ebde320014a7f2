//! Weighted summary statistics of the particle cloud.

use std::f64::consts::PI;

use gridmap::LikelihoodMap;
use transforms::normalize_angle;
use types::{LaserConfig, Pose};

use crate::filter::ParticleFilter;

/// One beam endpoint of the mean scan, in world coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanPoint {
    pub x: f64,
    pub y: f64,
    pub range: f64,
    /// Linear beam likelihood at the endpoint cell
    pub prob: f64,
    /// Whether the beam contributed to the last weighting cycle
    pub mask: bool,
}

/// Pose estimate published after each filter cycle.
#[derive(Debug, Clone, Default)]
pub struct LocalizeSummary {
    /// Weighted mean pose (circular mean over theta)
    pub mean: Pose,
    /// Componentwise standard deviation
    pub std: Pose,
    /// Odometry pose the estimate is paired with
    pub odometry_pos: Pose,
    /// Covariance between x and y
    pub xy_cov: f64,
    /// False while the filter is in global mode
    pub converged: bool,
    /// Mean-scan endpoints for display
    pub mean_scan: Vec<ScanPoint>,
}

impl ParticleFilter {
    /// Summarize the particle cloud and project the current scan from the
    /// mean pose.
    pub fn summarize(
        &self,
        map: &LikelihoodMap,
        ranges: &[f64],
        config: &LaserConfig,
        forward_offset: f64,
        backwards: bool,
    ) -> LocalizeSummary {
        let particles = self.particles();
        let n = particles.len();
        let mut summary = LocalizeSummary {
            converged: !self.global_mode(),
            odometry_pos: self.last_odometry(),
            ..Default::default()
        };
        if n == 0 {
            return summary;
        }

        // Log weights -> linear, shifted by the max to avoid underflow.
        let max_weight = particles
            .iter()
            .map(|p| p.weight)
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = particles
            .iter()
            .map(|p| (p.weight - max_weight).exp())
            .collect();
        let total_weight: f64 = weights.iter().sum();

        let mut mean_x = 0.0;
        let mut mean_y = 0.0;
        let mut theta_x = 0.0;
        let mut theta_y = 0.0;
        for (p, w) in particles.iter().zip(&weights) {
            mean_x += p.x * w;
            mean_y += p.y * w;
            theta_x += p.theta.cos() * w;
            theta_y += p.theta.sin() * w;
        }
        summary.mean.x = mean_x / total_weight;
        summary.mean.y = mean_y / total_weight;
        summary.mean.theta = if theta_x == 0.0 {
            0.0
        } else {
            theta_y.atan2(theta_x)
        };

        let mut std_x = 0.0;
        let mut std_y = 0.0;
        let mut std_theta = 0.0;
        let mut xy_cov = 0.0;
        for p in particles {
            let dx = p.x - summary.mean.x;
            let dy = p.y - summary.mean.y;
            let dtheta = normalize_angle(p.theta - summary.mean.theta);
            std_x += dx * dx;
            std_y += dy * dy;
            std_theta += dtheta * dtheta;
            xy_cov += dx * dy;
        }
        summary.std.x = (std_x / n as f64).sqrt();
        summary.std.y = (std_y / n as f64).sqrt();
        summary.std.theta = (std_theta / n as f64).sqrt();
        summary.xy_cov = xy_cov / n as f64;

        if self.params().do_scanmatching {
            crate::gradient::refine_pose_gradient(
                ranges,
                config,
                &mut summary.mean,
                forward_offset,
                map,
                1,
            );
        }

        let res = map.config().resolution;
        let (ox, oy) = map.config().origin;
        let grid = map.grid();
        let min_prob = self.params().likelihood.tracking_beam_minlikelihood;
        let mask = self.laser_mask();
        summary.mean_scan = ranges
            .iter()
            .enumerate()
            .map(|(i, &range)| {
                let (angle, offset_sign) = if backwards {
                    (summary.mean.theta + PI + config.beam_angle(i), -1.0)
                } else {
                    (summary.mean.theta + config.beam_angle(i), 1.0)
                };
                let x = summary.mean.x
                    + offset_sign * forward_offset * summary.mean.theta.cos()
                    + angle.cos() * range;
                let y = summary.mean.y
                    + offset_sign * forward_offset * summary.mean.theta.sin()
                    + angle.sin() * range;
                let gx = ((x - ox) / res) as i64;
                let gy = ((y - oy) / res) as i64;
                let prob = if grid.contains(gx, gy) {
                    map.log_prob(gx as usize, gy as usize)
                        .map(|v| (v as f64).exp())
                        .unwrap_or(min_prob)
                } else {
                    min_prob
                };
                ScanPoint {
                    x,
                    y,
                    range,
                    prob,
                    mask: mask.get(i).copied().unwrap_or(false),
                }
            })
            .collect();

        summary
    }
}

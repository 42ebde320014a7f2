//! Gradient-descent pose refinement against the distance transform.
//!
//! The likelihood map's offset tables give, for any cell, the displacement
//! to the nearest obstacle border. Summing those displacements over the
//! beam endpoints of a scan yields a descent direction in (x, y, theta)
//! without finite differences; a handful of damped steps walks the pose
//! into the local likelihood maximum.

use gridmap::LikelihoodMap;
use types::{LaserConfig, Pose};

/// Translation gain per degree of angular resolution.
const K_T: f64 = 1e-4;
/// Rotation gain per degree of angular resolution.
const K_ROT: f64 = 1e-5;

const MAX_ITERATIONS: usize = 20;

/// Refine `pose` in place by hill climbing the distance transform.
pub fn refine_pose_gradient(
    ranges: &[f64],
    config: &LaserConfig,
    pose: &mut Pose,
    forward_offset: f64,
    map: &LikelihoodMap,
    laser_skip: usize,
) {
    let skip = laser_skip.max(1);
    let res = map.config().resolution;
    let (ox, oy) = map.config().origin;
    let (w, h) = (map.config().width as i64, map.config().height as i64);
    let angular_res_deg = config.angular_resolution.to_degrees();

    for _ in 0..MAX_ITERATIONS {
        let mut grad_x = 0.0;
        let mut grad_y = 0.0;
        let mut grad_theta = 0.0;

        for i in (0..ranges.len()).step_by(skip) {
            let theta = pose.theta + config.beam_angle(i);
            let range_x = ranges[i] * theta.cos();
            let range_y = ranges[i] * theta.sin();
            let x_l = ((pose.x + forward_offset * pose.theta.cos() + range_x - ox) / res) as i64;
            let y_l = ((pose.y + forward_offset * pose.theta.sin() + range_y - oy) / res) as i64;

            if x_l >= 0 && y_l >= 0 && x_l < w && y_l < h {
                let (off_x, off_y) = map.offset(x_l as usize, y_l as usize);
                grad_x += off_x as f64;
                grad_y += off_y as f64;
                grad_theta += range_x * off_y as f64 - range_y * off_x as f64;
            }
        }

        grad_x *= K_T * angular_res_deg;
        grad_y *= K_T * angular_res_deg;
        grad_theta *= K_ROT * angular_res_deg;

        pose.x += grad_x;
        pose.y += grad_y;
        pose.theta += grad_theta;

        if grad_x.abs() <= 0.05
            && grad_y.abs() <= 0.05
            && grad_theta.abs() <= 0.25 / std::f64::consts::PI
        {
            break;
        }
    }
}

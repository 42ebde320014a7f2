//! Monte-Carlo localization over a known occupancy grid.
//!
//! The filter owns a weighted particle cloud, propagates it with a noisy
//! odometry motion model, weights it against the laser likelihood fields of
//! [`gridmap::LikelihoodMap`], resamples with the low-variance scheme, and
//! can polish hypotheses by gradient descent on the distance transform.
//!
//! The filter runs at laser rate and is single-threaded; callers hand in
//! the RNG so replays stay deterministic.

use gridmap::LikelihoodParams;
use transforms::normalize_angle;
use types::Pose;

mod filter;
mod gradient;
mod motion;
mod summary;

pub use filter::{Particle, ParticleFilter};
pub use gradient::refine_pose_gradient;
pub use motion::{LegacyMotionParams, MotionModel, StandardMotionParams};
pub use summary::{LocalizeSummary, ScanPoint};

/// Particle-filter configuration.
#[derive(Debug, Clone)]
pub struct LocalizeParams {
    /// Forward offset of the front laser from the robot center (meters)
    pub front_laser_offset: f64,
    /// Forward offset of the rear laser, measured backwards (meters)
    pub rear_laser_offset: f64,
    pub num_particles: usize,
    /// Beams beyond this range are ignored (meters)
    pub max_range: f64,
    /// Linear likelihood below which a beam counts against a wall
    pub min_wall_prob: f64,
    /// Fraction of particles that must reject a beam to drop it
    pub outlier_fraction: f64,
    /// Distance travelled between resamples (meters)
    pub update_distance: f64,
    /// Desired angle between integrated beams (radians); derives
    /// laser_skip when laser_skip is 0
    pub integrate_angle: f64,
    /// Beam decimation; 0 = derive from integrate_angle
    pub laser_skip: usize,
    pub use_rear_laser: bool,
    pub do_scanmatching: bool,
    /// Zero out particles whose own cell is occupied or off-map
    pub constrain_to_map: bool,
    /// Incorporate laser scans at all (off = dead reckoning)
    pub use_sensor: bool,
    /// Cloud spread that triggers global mode (meters)
    pub global_distance_threshold: f64,
    /// Pose hypotheses scored during global initialization
    pub global_test_samples: usize,
    pub likelihood: LikelihoodParams,
    pub motion: MotionModel,
}

impl Default for LocalizeParams {
    fn default() -> Self {
        Self {
            front_laser_offset: 0.0,
            rear_laser_offset: 0.0,
            num_particles: 250,
            max_range: 50.0,
            min_wall_prob: 0.25,
            outlier_fraction: 0.85,
            update_distance: 0.2,
            integrate_angle: 3.0_f64.to_radians(),
            laser_skip: 0,
            use_rear_laser: false,
            do_scanmatching: false,
            constrain_to_map: false,
            use_sensor: true,
            global_distance_threshold: 2.0,
            global_test_samples: 100_000,
            likelihood: LikelihoodParams::default(),
            motion: MotionModel::default(),
        }
    }
}

/// Map a raw odometry pose into the map frame using the latest summary:
/// the offset and rotation between the summary's mean and its paired
/// odometry pose are applied to the new reading.
pub fn correct_odometry(odometry: &Pose, summary_mean: &Pose, summary_odom: &Pose) -> Pose {
    let dtheta = summary_mean.theta - summary_odom.theta;
    let dx = odometry.x - summary_odom.x;
    let dy = odometry.y - summary_odom.y;
    let (sin_d, cos_d) = dtheta.sin_cos();
    Pose {
        x: summary_mean.x + dx * cos_d - dy * sin_d,
        y: summary_mean.y + dx * sin_d + dy * cos_d,
        theta: normalize_angle(odometry.theta + dtheta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_correct_odometry_identity_when_frames_agree() {
        let odom = Pose::new(3.0, 4.0, 0.5);
        let corrected = correct_odometry(&odom, &Pose::new(1.0, 1.0, 0.5), &Pose::new(1.0, 1.0, 0.5));
        assert_relative_eq!(corrected.x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(corrected.y, 4.0, epsilon = 1e-12);
        assert_relative_eq!(corrected.theta, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_correct_odometry_translates() {
        // Map frame is the odometry frame shifted by (10, 0).
        let corrected = correct_odometry(
            &Pose::new(2.0, 0.0, 0.0),
            &Pose::new(11.0, 0.0, 0.0),
            &Pose::new(1.0, 0.0, 0.0),
        );
        assert_relative_eq!(corrected.x, 12.0, epsilon = 1e-12);
        assert_relative_eq!(corrected.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_correct_odometry_rotates_delta() {
        // Summary says the robot is at the same spot but rotated 90 deg
        // relative to the odometry frame.
        let corrected = correct_odometry(
            &Pose::new(1.0, 0.0, 0.0),
            &Pose::new(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            &Pose::new(0.0, 0.0, 0.0),
        );
        assert_relative_eq!(corrected.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(corrected.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            corrected.theta,
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_default_params_sane() {
        let params = LocalizeParams::default();
        assert!(params.num_particles > 0);
        assert!(params.update_distance > 0.0);
        assert!(params.laser_skip == 0);
        assert!(params.likelihood.occupied_prob > 0.0);
    }
}

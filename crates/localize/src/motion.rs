//! Odometry motion models.
//!
//! Two parameterizations are supported. The standard model draws a
//! downrange / crossrange / turn triple whose mean and spread are linear in
//! the commanded translation and rotation. The legacy model decomposes the
//! odometry delta into rotate-translate-rotate and perturbs each stage.

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Coefficients of the standard (learned) motion model. For each of the
/// three output components, the mean and standard deviation are linear
/// combinations of |translation| and |rotation|.
#[derive(Debug, Clone, Copy)]
pub struct StandardMotionParams {
    pub mean_d_d: f64,
    pub mean_d_t: f64,
    pub std_dev_d_d: f64,
    pub std_dev_d_t: f64,
    pub mean_c_d: f64,
    pub mean_c_t: f64,
    pub std_dev_c_d: f64,
    pub std_dev_c_t: f64,
    pub mean_t_d: f64,
    pub mean_t_t: f64,
    pub std_dev_t_d: f64,
    pub std_dev_t_t: f64,
}

impl Default for StandardMotionParams {
    fn default() -> Self {
        // Downrange tracks translation, turn tracks rotation, crossrange
        // is pure noise.
        Self {
            mean_d_d: 1.0,
            mean_d_t: 0.0,
            std_dev_d_d: 0.2,
            std_dev_d_t: 0.0,
            mean_c_d: 0.0,
            mean_c_t: 0.0,
            std_dev_c_d: 0.1,
            std_dev_c_t: 0.0,
            mean_t_d: 0.0,
            mean_t_t: 1.0,
            std_dev_t_d: 0.1,
            std_dev_t_t: 0.2,
        }
    }
}

/// Coefficients of the legacy rotate-translate-rotate model.
#[derive(Debug, Clone, Copy)]
pub struct LegacyMotionParams {
    pub odom_a1: f64,
    pub odom_a2: f64,
    pub odom_a3: f64,
    pub odom_a4: f64,
}

impl Default for LegacyMotionParams {
    fn default() -> Self {
        Self {
            odom_a1: 0.2,
            odom_a2: 0.01,
            odom_a3: 0.2,
            odom_a4: 0.01,
        }
    }
}

/// Which motion model the filter propagates particles with.
#[derive(Debug, Clone, Copy)]
pub enum MotionModel {
    Standard(StandardMotionParams),
    Legacy(LegacyMotionParams),
}

impl Default for MotionModel {
    fn default() -> Self {
        MotionModel::Standard(StandardMotionParams::default())
    }
}

/// Draw from N(mean, std). A zero (or negative) spread collapses to the
/// mean so that a zero-noise parameterization is exact.
pub(crate) fn sample_gaussian(rng: &mut impl Rng, mean: f64, std: f64) -> f64 {
    if std <= 0.0 {
        return mean;
    }
    Normal::new(mean, std)
        .map(|n| n.sample(rng))
        .unwrap_or(mean)
}

impl StandardMotionParams {
    /// Sample the advance along the heading.
    pub fn sample_downrange(&self, rng: &mut impl Rng, delta_t: f64, delta_theta: f64) -> f64 {
        let mean = delta_t * self.mean_d_d + delta_theta * self.mean_d_t;
        let std = delta_t.abs() * self.std_dev_d_d + delta_theta.abs() * self.std_dev_d_t;
        sample_gaussian(rng, mean, std)
    }

    /// Sample the drift perpendicular to the heading.
    pub fn sample_crossrange(&self, rng: &mut impl Rng, delta_t: f64, delta_theta: f64) -> f64 {
        let mean = delta_t * self.mean_c_d + delta_theta * self.mean_c_t;
        let std = delta_t.abs() * self.std_dev_c_d + delta_theta.abs() * self.std_dev_c_t;
        sample_gaussian(rng, mean, std)
    }

    /// Sample the heading change.
    pub fn sample_turn(&self, rng: &mut impl Rng, delta_t: f64, delta_theta: f64) -> f64 {
        let mean = delta_t * self.mean_t_d + delta_theta * self.mean_t_t;
        let std = delta_t.abs() * self.std_dev_t_d + delta_theta.abs() * self.std_dev_t_t;
        sample_gaussian(rng, mean, std)
    }
}

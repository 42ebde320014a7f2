//! Configuration file handling (nav.toml).
//!
//! Every field has a default; the file only needs to name what it
//! overrides. Command-line arguments take precedence over the file.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use gridmap::LikelihoodParams;
use localize::{LegacyMotionParams, LocalizeParams, MotionModel, StandardMotionParams};
use planner::{PlannerConfig, RobotConfig};
use scanmatch::MatchParams;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub robot: RobotSection,
    pub localize: LocalizeSection,
    pub planner: PlannerSection,
    pub scan_match: ScanMatchSection,
    pub init: InitSection,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: FileConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
            Ok(FileConfig::default())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RobotSection {
    pub front_laser_offset: f64,
    pub rear_laser_offset: f64,
    pub max_t_vel: f64,
    pub max_r_vel: f64,
    pub approach_dist: f64,
    pub side_dist: f64,
    pub length: f64,
    pub width: f64,
    pub acceleration: f64,
    pub reaction_time: f64,
}

impl Default for RobotSection {
    fn default() -> Self {
        let robot = RobotConfig::default();
        Self {
            front_laser_offset: 0.0,
            rear_laser_offset: 0.0,
            max_t_vel: robot.max_t_vel,
            max_r_vel: robot.max_r_vel,
            approach_dist: robot.approach_dist,
            side_dist: robot.side_dist,
            length: robot.length,
            width: robot.width,
            acceleration: robot.acceleration,
            reaction_time: robot.reaction_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LocalizeSection {
    pub num_particles: usize,
    pub max_range: f64,
    pub min_wall_prob: f64,
    pub outlier_fraction: f64,
    pub update_distance: f64,
    pub integrate_angle_deg: f64,
    pub laser_skip: usize,
    pub use_rear_laser: bool,
    pub do_scanmatching: bool,
    pub constrain_to_map: bool,
    pub use_sensor: bool,
    pub occupied_prob: f64,
    pub lmap_std: f64,
    pub global_lmap_std: f64,
    pub global_distance_threshold: f64,
    pub global_test_samples: usize,
    pub tracking_beam_minlikelihood: f64,
    pub global_beam_minlikelihood: f64,
    /// "standard" or "legacy"
    pub motion_model: String,
    pub odom_a1: f64,
    pub odom_a2: f64,
    pub odom_a3: f64,
    pub odom_a4: f64,
}

impl Default for LocalizeSection {
    fn default() -> Self {
        let params = LocalizeParams::default();
        let legacy = LegacyMotionParams::default();
        Self {
            num_particles: params.num_particles,
            max_range: params.max_range,
            min_wall_prob: params.min_wall_prob,
            outlier_fraction: params.outlier_fraction,
            update_distance: params.update_distance,
            integrate_angle_deg: params.integrate_angle.to_degrees(),
            laser_skip: params.laser_skip,
            use_rear_laser: params.use_rear_laser,
            do_scanmatching: params.do_scanmatching,
            constrain_to_map: params.constrain_to_map,
            use_sensor: params.use_sensor,
            occupied_prob: params.likelihood.occupied_prob,
            lmap_std: params.likelihood.lmap_std,
            global_lmap_std: params.likelihood.global_lmap_std,
            global_distance_threshold: params.global_distance_threshold,
            global_test_samples: params.global_test_samples,
            tracking_beam_minlikelihood: params.likelihood.tracking_beam_minlikelihood,
            global_beam_minlikelihood: params.likelihood.global_beam_minlikelihood,
            motion_model: "standard".to_string(),
            odom_a1: legacy.odom_a1,
            odom_a2: legacy.odom_a2,
            odom_a3: legacy.odom_a3,
            odom_a4: legacy.odom_a4,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub goal_size: f64,
    pub waypoint_tolerance: f64,
    pub goal_theta_tolerance: f64,
    pub map_update_radius: f64,
    pub map_update_obstacles: bool,
    pub map_update_freespace: bool,
    pub num_lasers_to_use: usize,
    pub replan_frequency: f64,
    pub smooth_path: bool,
    pub dont_integrate_odometry: bool,
    pub plan_to_nearest_free_point: bool,
}

impl Default for PlannerSection {
    fn default() -> Self {
        let config = PlannerConfig::default();
        Self {
            goal_size: config.goal_size,
            waypoint_tolerance: config.waypoint_tolerance,
            goal_theta_tolerance: config.goal_theta_tolerance,
            map_update_radius: config.map_update_radius,
            map_update_obstacles: config.map_update_obstacles,
            map_update_freespace: config.map_update_freespace,
            num_lasers_to_use: config.num_lasers_to_use,
            replan_frequency: config.replan_frequency,
            smooth_path: config.smooth_path,
            dont_integrate_odometry: config.dont_integrate_odometry,
            plan_to_nearest_free_point: config.plan_to_nearest_free_point,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScanMatchSection {
    /// Run the incremental matcher over incoming scans to clean up the
    /// odometry poses before localization
    pub enabled: bool,
    pub max_usable_laser_range: f64,
    pub local_map_max_range: f64,
    pub local_map_resolution: f64,
    pub local_map_kernel_len: usize,
    pub local_map_use_odometry: bool,
    pub local_map_num_convolve: usize,
    pub local_map_std_val: f64,
    pub local_map_history_length: usize,
    pub local_map_max_used_history: usize,
    pub local_map_min_bbox_distance: f64,
    pub local_map_use_last_scans: usize,
}

impl Default for ScanMatchSection {
    fn default() -> Self {
        let params = MatchParams::default();
        Self {
            enabled: false,
            max_usable_laser_range: params.max_usable_laser_range,
            local_map_max_range: params.local_map_max_range,
            local_map_resolution: params.local_map_resolution,
            local_map_kernel_len: params.local_map_kernel_len,
            local_map_use_odometry: params.local_map_use_odometry,
            local_map_num_convolve: params.local_map_num_convolve,
            local_map_std_val: params.local_map_std_val,
            local_map_history_length: params.local_map_history_length,
            local_map_max_used_history: params.local_map_max_used_history,
            local_map_min_bbox_distance: params.local_map_min_bbox_distance,
            local_map_use_last_scans: params.local_map_use_last_scans,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InitSection {
    /// "gaussian" or "global"
    pub mode: String,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub std_x: f64,
    pub std_y: f64,
    pub std_theta: f64,
}

impl Default for InitSection {
    fn default() -> Self {
        Self {
            mode: "gaussian".to_string(),
            x: 0.0,
            y: 0.0,
            theta: 0.0,
            std_x: 0.2,
            std_y: 0.2,
            std_theta: 0.1,
        }
    }
}

impl FileConfig {
    pub fn localize_params(&self) -> LocalizeParams {
        let motion = if self.localize.motion_model == "legacy" {
            MotionModel::Legacy(LegacyMotionParams {
                odom_a1: self.localize.odom_a1,
                odom_a2: self.localize.odom_a2,
                odom_a3: self.localize.odom_a3,
                odom_a4: self.localize.odom_a4,
            })
        } else {
            MotionModel::Standard(StandardMotionParams::default())
        };
        LocalizeParams {
            front_laser_offset: self.robot.front_laser_offset,
            rear_laser_offset: self.robot.rear_laser_offset,
            num_particles: self.localize.num_particles,
            max_range: self.localize.max_range,
            min_wall_prob: self.localize.min_wall_prob,
            outlier_fraction: self.localize.outlier_fraction,
            update_distance: self.localize.update_distance,
            integrate_angle: self.localize.integrate_angle_deg.to_radians(),
            laser_skip: self.localize.laser_skip,
            use_rear_laser: self.localize.use_rear_laser,
            do_scanmatching: self.localize.do_scanmatching,
            constrain_to_map: self.localize.constrain_to_map,
            use_sensor: self.localize.use_sensor,
            global_distance_threshold: self.localize.global_distance_threshold,
            global_test_samples: self.localize.global_test_samples,
            likelihood: self.likelihood_params(),
            motion,
        }
    }

    pub fn likelihood_params(&self) -> LikelihoodParams {
        LikelihoodParams {
            occupied_prob: self.localize.occupied_prob,
            lmap_std: self.localize.lmap_std,
            global_lmap_std: self.localize.global_lmap_std,
            tracking_beam_minlikelihood: self.localize.tracking_beam_minlikelihood,
            global_beam_minlikelihood: self.localize.global_beam_minlikelihood,
        }
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            goal_size: self.planner.goal_size,
            waypoint_tolerance: self.planner.waypoint_tolerance,
            goal_theta_tolerance: self.planner.goal_theta_tolerance,
            map_update_radius: self.planner.map_update_radius,
            map_update_obstacles: self.planner.map_update_obstacles,
            map_update_freespace: self.planner.map_update_freespace,
            num_lasers_to_use: self.planner.num_lasers_to_use,
            replan_frequency: self.planner.replan_frequency,
            smooth_path: self.planner.smooth_path,
            dont_integrate_odometry: self.planner.dont_integrate_odometry,
            plan_to_nearest_free_point: self.planner.plan_to_nearest_free_point,
            occupied_prob: self.localize.occupied_prob,
        }
    }

    pub fn robot_config(&self) -> RobotConfig {
        RobotConfig {
            max_t_vel: self.robot.max_t_vel,
            max_r_vel: self.robot.max_r_vel,
            approach_dist: self.robot.approach_dist,
            side_dist: self.robot.side_dist,
            length: self.robot.length,
            width: self.robot.width,
            acceleration: self.robot.acceleration,
            reaction_time: self.robot.reaction_time,
        }
    }

    pub fn match_params(&self) -> MatchParams {
        MatchParams {
            max_usable_laser_range: self.scan_match.max_usable_laser_range,
            local_map_max_range: self.scan_match.local_map_max_range,
            local_map_resolution: self.scan_match.local_map_resolution,
            local_map_kernel_len: self.scan_match.local_map_kernel_len,
            local_map_use_odometry: self.scan_match.local_map_use_odometry,
            local_map_num_convolve: self.scan_match.local_map_num_convolve,
            local_map_std_val: self.scan_match.local_map_std_val,
            local_map_history_length: self.scan_match.local_map_history_length,
            local_map_max_used_history: self.scan_match.local_map_max_used_history,
            local_map_min_bbox_distance: self.scan_match.local_map_min_bbox_distance,
            local_map_use_last_scans: self.scan_match.local_map_use_last_scans,
            ..MatchParams::default()
        }
    }
}

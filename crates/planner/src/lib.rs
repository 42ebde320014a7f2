//! Grid planner: cost surface, backward value iteration, plan extraction
//! with smoothing, live map modification from laser data, and waypoint
//! arbitration with velocity command generation.
//!
//! The planner owns a pristine copy of the static map and a working copy
//! carrying dynamic obstacle marks; it is the only writer of either. All
//! state is threaded through [`Planner`], no module-level globals.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_8};
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use tracing::{debug, info, warn};
use transforms::angle_diff;
use types::{NavigatorStatus, Pose, RobotLaser, TrajPoint, VelocityCommand};

use gridmap::{GridConfig, OccupancyGrid};

mod bresenham;
mod cost;
mod dp;
mod map_modify;
mod path;

pub use cost::CostMap;
pub use dp::UtilityMap;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("No map has been set")]
    NoMap,
    #[error("No cost map available")]
    NoCostMap,
    #[error("No utility function available")]
    NoUtility,
    #[error("Compression failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Navigation behavior configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Distance at which the goal counts as reached (meters)
    pub goal_size: f64,
    /// Waypoints closer than this are skipped (meters)
    pub waypoint_tolerance: f64,
    /// Acceptable terminal heading error (radians)
    pub goal_theta_tolerance: f64,
    /// Beams reaching farther than this do not modify the map (meters)
    pub map_update_radius: f64,
    pub map_update_obstacles: bool,
    pub map_update_freespace: bool,
    /// Beam subsampling for map updates; 0 = use every beam
    pub num_lasers_to_use: usize,
    /// Maximum replans per second; 0 = unthrottled
    pub replan_frequency: f64,
    pub smooth_path: bool,
    pub dont_integrate_odometry: bool,
    pub plan_to_nearest_free_point: bool,
    /// Occupancy threshold shared with the localizer
    pub occupied_prob: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            goal_size: 0.4,
            waypoint_tolerance: 0.3,
            goal_theta_tolerance: 0.09,
            map_update_radius: 3.0,
            map_update_obstacles: true,
            map_update_freespace: false,
            num_lasers_to_use: 0,
            replan_frequency: 1.0,
            smooth_path: true,
            dont_integrate_odometry: false,
            plan_to_nearest_free_point: false,
            occupied_prob: 0.5,
        }
    }
}

/// Physical robot envelope and velocity limits.
#[derive(Debug, Clone)]
pub struct RobotConfig {
    pub max_t_vel: f64,
    pub max_r_vel: f64,
    /// Strong clearance band ahead of obstacles (meters)
    pub approach_dist: f64,
    /// Weak clearance band (meters)
    pub side_dist: f64,
    pub length: f64,
    pub width: f64,
    pub acceleration: f64,
    pub reaction_time: f64,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            max_t_vel: 1.0,
            max_r_vel: 1.0,
            approach_dist: 0.3,
            side_dist: 0.3,
            length: 0.6,
            width: 0.4,
            acceleration: 0.5,
            reaction_time: 0.2,
        }
    }
}

/// Which float grid a map request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Occupancy,
    Cost,
    Utility,
}

/// Float-grid reply, raw or gzip-compressed.
#[derive(Debug, Clone)]
pub struct NavigatorMapMessage {
    pub config: GridConfig,
    pub kind: MapKind,
    pub compressed: bool,
    /// Little-endian f32 cells, possibly gzipped
    pub data: Vec<u8>,
    pub uncompressed_size: usize,
}

/// Outcome of waypoint arbitration.
#[derive(Debug, Clone, Copy)]
pub enum WaypointResult {
    /// The terminal waypoint is reached (position and, when required,
    /// orientation)
    GoalReached,
    /// There is no usable plan
    NoPlan,
    /// Head for this waypoint
    Next {
        waypoint: TrajPoint,
        index: usize,
        is_goal: bool,
    },
}

/// Proportional gain from heading error to rotational velocity.
const HEADING_GAIN: f64 = 1.0;

/// The planner core.
pub struct Planner {
    nav_config: PlannerConfig,
    robot_config: RobotConfig,
    /// Static map as delivered by the map source
    pristine_map: Option<OccupancyGrid>,
    /// Static map plus dynamic marks from recent laser data
    working_map: Option<OccupancyGrid>,
    cost_map: Option<CostMap>,
    utility: Option<UtilityMap>,
    /// Cells of the working map that differ from the pristine map
    dynamic_marks: Vec<(usize, usize)>,
    robot: TrajPoint,
    last_robot_position: Option<TrajPoint>,
    requested_goal: Pose,
    intermediate_goal: Option<Pose>,
    allow_any_orientation: bool,
    goal_set: bool,
    goal_is_accessible: bool,
    have_plan: bool,
    path: Vec<TrajPoint>,
    last_plan_time: Option<f64>,
}

impl Planner {
    pub fn new(nav_config: PlannerConfig, robot_config: RobotConfig) -> Self {
        Self {
            nav_config,
            robot_config,
            pristine_map: None,
            working_map: None,
            cost_map: None,
            utility: None,
            dynamic_marks: Vec::new(),
            robot: TrajPoint::default(),
            last_robot_position: None,
            requested_goal: Pose::default(),
            intermediate_goal: None,
            allow_any_orientation: false,
            goal_set: false,
            goal_is_accessible: false,
            have_plan: false,
            path: Vec::new(),
            last_plan_time: None,
        }
    }

    pub fn nav_config(&self) -> &PlannerConfig {
        &self.nav_config
    }

    pub fn robot_config(&self) -> &RobotConfig {
        &self.robot_config
    }

    pub fn set_max_t_vel(&mut self, vel: f64) {
        self.robot_config.max_t_vel = vel;
    }

    pub fn path(&self) -> &[TrajPoint] {
        &self.path
    }

    pub fn goal_set(&self) -> bool {
        self.goal_set
    }

    pub fn goal_reachable(&self) -> bool {
        self.goal_set && self.goal_is_accessible
    }

    /// Install a new static map; dynamic marks are discarded.
    pub fn set_map(&mut self, map: OccupancyGrid, now: f64) {
        info!(
            width = map.width(),
            height = map.height(),
            resolution = map.resolution(),
            "Planner received map"
        );
        self.pristine_map = Some(map.clone());
        self.working_map = Some(map);
        self.dynamic_marks.clear();
        self.rebuild_costs();
        // Throttling does not apply to a fresh map.
        self.last_plan_time = None;
        if self.goal_set {
            self.plan(now);
            self.regenerate();
        }
    }

    /// Restore the working map to the pristine copy (e.g. after a
    /// localizer reset) and rebuild costs.
    pub fn reset_map(&mut self) {
        let (Some(working), Some(pristine)) = (&mut self.working_map, &self.pristine_map) else {
            return;
        };
        map_modify::clear_marks(working, pristine, &mut self.dynamic_marks);
        self.rebuild_costs();
        debug!("Working map reset to pristine");
    }

    fn rebuild_costs(&mut self) {
        if let Some(map) = &self.working_map {
            self.cost_map = Some(CostMap::build(
                map,
                &self.robot_config,
                self.nav_config.occupied_prob,
            ));
        }
    }

    /// Update the robot pose. Positions outside the map are ignored;
    /// movements below one cell do not trigger regeneration.
    pub fn update_robot(&mut self, position: &TrajPoint) -> bool {
        let Some(map) = &self.working_map else {
            return false;
        };
        let extent = map.world_size();
        let (ox, oy) = map.config().origin;
        if position.x < ox
            || position.y < oy
            || position.x > ox + extent.x
            || position.y > oy + extent.y
        {
            return false;
        }

        self.robot = *position;
        if let Some(prev) = self.last_robot_position {
            if position.distance(&prev) < map.resolution() {
                return false;
            }
        }
        self.regenerate();
        self.last_robot_position = Some(*position);
        true
    }

    /// Set a new goal and replan.
    pub fn update_goal(&mut self, goal: Pose, any_orientation: bool, now: f64) -> bool {
        if self.working_map.is_none() {
            return false;
        }
        debug!(x = goal.x, y = goal.y, any_orientation, "Goal updated");
        self.requested_goal = goal;
        self.allow_any_orientation = any_orientation;
        self.goal_set = true;
        self.plan(now);
        self.regenerate();
        true
    }

    /// Integrate a laser scan into the working map and replan.
    pub fn update_map(&mut self, laser: &RobotLaser, now: f64) {
        let (Some(working), Some(pristine)) = (&mut self.working_map, &self.pristine_map) else {
            return;
        };
        map_modify::clear_marks(working, pristine, &mut self.dynamic_marks);
        map_modify::apply_scan(working, laser, &self.nav_config, &mut self.dynamic_marks);
        self.rebuild_costs();
        if self.goal_set {
            self.plan(now);
            self.regenerate();
        }
    }

    /// Rounded grid cell of a world point; may lie outside the map.
    fn rounded_cell(map: &OccupancyGrid, x: f64, y: f64) -> (i64, i64) {
        let (ox, oy) = map.config().origin;
        (
            ((x - ox) / map.resolution()).round() as i64,
            ((y - oy) / map.resolution()).round() as i64,
        )
    }

    /// Run the dynamic program toward the current goal, throttled by
    /// `replan_frequency`.
    fn plan(&mut self, now: f64) {
        let Some(map) = &self.working_map else {
            return;
        };
        let Some(cost_map) = &self.cost_map else {
            return;
        };
        if self.nav_config.replan_frequency > 0.0 {
            if let Some(last) = self.last_plan_time {
                if now - last < 1.0 / self.nav_config.replan_frequency {
                    return;
                }
            }
        }

        let goal_cell = Self::rounded_cell(map, self.requested_goal.x, self.requested_goal.y);
        let goal_in_bounds = map.contains(goal_cell.0, goal_cell.1);
        let utility = if goal_in_bounds {
            UtilityMap::dynamic_program(cost_map, (goal_cell.0 as usize, goal_cell.1 as usize))
        } else {
            // An off-map goal is unreachable by construction.
            UtilityMap::dynamic_program(cost_map, (map.width(), map.height()))
        };

        let robot_cell = Self::rounded_cell(map, self.robot.x, self.robot.y);
        let robot_reachable = map.contains(robot_cell.0, robot_cell.1)
            && utility.is_reachable(robot_cell.0 as usize, robot_cell.1 as usize);

        if robot_reachable {
            self.goal_is_accessible = true;
            self.have_plan = true;
            self.intermediate_goal = None;
            self.utility = Some(utility);
        } else {
            self.goal_is_accessible = false;
            if self.nav_config.plan_to_nearest_free_point {
                self.have_plan = self.plan_to_nearest(goal_cell);
            } else {
                self.have_plan = false;
                self.utility = Some(utility);
            }
        }

        self.last_plan_time = Some(now);
    }

    /// Fallback when the requested goal is unreachable: find the reachable
    /// cell closest to it and plan there instead.
    fn plan_to_nearest(&mut self, goal_cell: (i64, i64)) -> bool {
        let (Some(map), Some(cost_map)) = (&self.working_map, &self.cost_map) else {
            return false;
        };
        let robot_cell = Self::rounded_cell(map, self.robot.x, self.robot.y);
        if !map.contains(robot_cell.0, robot_cell.1) {
            warn!("No accessible goal: robot outside map");
            return false;
        }

        let from_robot = UtilityMap::dynamic_program(
            cost_map,
            (robot_cell.0 as usize, robot_cell.1 as usize),
        );

        let mut closest: Option<(usize, usize)> = None;
        let mut closest_dist = f64::MAX;
        for gy in 0..map.height() {
            for gx in 0..map.width() {
                if !from_robot.is_reachable(gx, gy) {
                    continue;
                }
                let dist = (gx as f64 - goal_cell.0 as f64).hypot(gy as f64 - goal_cell.1 as f64);
                if dist < closest_dist {
                    closest_dist = dist;
                    closest = Some((gx, gy));
                }
            }
        }

        let Some(cell) = closest else {
            warn!("No accessible goal");
            return false;
        };
        let (wx, wy) = map.grid_to_world(cell.0, cell.1);
        self.intermediate_goal = Some(Pose::new(wx, wy, self.requested_goal.theta));
        self.utility = Some(UtilityMap::dynamic_program(cost_map, cell));
        info!(
            x = wx,
            y = wy,
            dist_cells = closest_dist,
            "Planning to nearest free point"
        );
        true
    }

    /// Re-extract the path from the current utility function.
    fn regenerate(&mut self) {
        self.path.clear();
        if !self.have_plan {
            return;
        }
        let (Some(map), Some(utility), Some(cost_map)) =
            (&self.working_map, &self.utility, &self.cost_map)
        else {
            return;
        };

        match path::extract(map, utility, &self.robot) {
            Some(mut points) => {
                if self.nav_config.smooth_path {
                    path::smooth(&mut points, map, cost_map, &self.robot, &self.nav_config);
                }
                path::assign_orientations(
                    &mut points,
                    &self.requested_goal,
                    self.goal_is_accessible,
                    self.allow_any_orientation,
                );
                self.path = points;
            }
            None => self.path.clear(),
        }
    }

    /// Pick the next waypoint to chase, skipping any the robot is already
    /// within tolerance of.
    pub fn next_waypoint(&mut self) -> WaypointResult {
        self.regenerate();

        if self.path.len() <= 1 {
            return WaypointResult::NoPlan;
        }

        let robot = self.robot;
        let mut next = 1usize;
        loop {
            if self.path.len() - next < 2 {
                break;
            }
            if robot.distance(&self.path[next]) >= self.nav_config.waypoint_tolerance {
                break;
            }
            next += 1;
        }

        let point = self.path[next];
        let dist = robot.distance(&point);
        if dist < self.nav_config.goal_size && self.path.len() - next == 1 {
            if self.allow_any_orientation || !self.goal_is_accessible {
                return WaypointResult::GoalReached;
            }
            let dtheta = angle_diff(robot.theta, self.requested_goal.theta).abs();
            if dtheta < self.nav_config.goal_theta_tolerance {
                return WaypointResult::GoalReached;
            }
        }

        WaypointResult::Next {
            waypoint: point,
            index: next,
            is_goal: self.path.len() <= 2,
        }
    }

    /// Velocity command toward a waypoint, respecting velocity caps and
    /// the stopping distance implied by acceleration and reaction time.
    pub fn velocity_command(&self, robot: &TrajPoint, waypoint: &TrajPoint) -> VelocityCommand {
        let heading = (waypoint.y - robot.y).atan2(waypoint.x - robot.x);
        let err = angle_diff(robot.theta, heading);
        let rv = (HEADING_GAIN * err).clamp(-self.robot_config.max_r_vel, self.robot_config.max_r_vel);

        let mut tv = self.robot_config.max_t_vel;
        if err.abs() > FRAC_PI_8 {
            tv *= (1.0 - err.abs() / FRAC_PI_2).max(0.0);
        }
        if let Some(terminal) = self.path.last() {
            // Largest speed whose braking distance v^2/2a + v*reaction
            // still fits in the remaining run.
            let remaining = robot.distance(terminal);
            let a = self.robot_config.acceleration;
            let rt = self.robot_config.reaction_time;
            let stop_limited = -a * rt + (a * a * rt * rt + 2.0 * a * remaining.max(0.0)).sqrt();
            tv = tv.min(stop_limited.max(0.0));
        }

        VelocityCommand { tv: tv.max(0.0), rv }
    }

    /// Status snapshot for publication.
    pub fn status(&self, autonomous: bool) -> NavigatorStatus {
        NavigatorStatus {
            autonomous,
            goal_set: self.goal_set,
            goal: self.requested_goal,
            robot: self.robot,
        }
    }

    /// The float grid of the requested kind, raw or gzip-compressed.
    pub fn map_message(&self, kind: MapKind, compress: bool) -> Result<NavigatorMapMessage, PlanError> {
        let map = self.working_map.as_ref().ok_or(PlanError::NoMap)?;
        let cells: Vec<f32> = match kind {
            MapKind::Occupancy => self
                .pristine_map
                .as_ref()
                .unwrap_or(map)
                .raw_cells()
                .to_vec(),
            MapKind::Cost => self
                .cost_map
                .as_ref()
                .ok_or(PlanError::NoCostMap)?
                .to_float_grid(),
            MapKind::Utility => self
                .utility
                .as_ref()
                .ok_or(PlanError::NoUtility)?
                .to_float_grid(),
        };

        let mut raw = Vec::with_capacity(cells.len() * 4);
        for c in &cells {
            raw.extend_from_slice(&c.to_le_bytes());
        }
        let uncompressed_size = raw.len();

        let data = if compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&raw)?;
            encoder.finish()?
        } else {
            raw
        };

        Ok(NavigatorMapMessage {
            config: *map.config(),
            kind,
            compressed: compress,
            data,
            uncompressed_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use gridmap::GridConfig;
    use std::io::Read;

    fn small_robot() -> RobotConfig {
        RobotConfig {
            width: 0.1,
            approach_dist: 0.1,
            side_dist: 0.1,
            ..Default::default()
        }
    }

    fn open_map(width: usize, height: usize) -> OccupancyGrid {
        OccupancyGrid::new(GridConfig::new(width, height, 0.1)).unwrap()
    }

    fn planner_with_map(map: OccupancyGrid, config: PlannerConfig) -> Planner {
        let mut planner = Planner::new(config, small_robot());
        planner.set_map(map, 0.0);
        planner
    }

    #[test]
    fn test_no_map_ignores_updates() {
        let mut planner = Planner::new(PlannerConfig::default(), small_robot());
        assert!(!planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0))));
        assert!(!planner.update_goal(Pose::new(1.0, 1.0, 0.0), true, 0.0));
    }

    #[test]
    fn test_out_of_map_robot_ignored() {
        let mut planner = planner_with_map(open_map(50, 50), PlannerConfig::default());
        assert!(!planner.update_robot(&TrajPoint::from_pose(Pose::new(100.0, 1.0, 0.0))));
        assert!(planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0))));
    }

    #[test]
    fn test_plan_reaches_goal() {
        let mut planner = planner_with_map(open_map(100, 100), PlannerConfig::default());
        planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0)));
        assert!(planner.update_goal(Pose::new(8.0, 8.0, 0.0), true, 0.0));
        assert!(planner.goal_reachable());
        let path = planner.path();
        assert!(path.len() > 1);
        let last = path.last().unwrap();
        assert!(last.pose().distance(&Pose::new(8.0, 8.0, 0.0)) < 0.2);
    }

    #[test]
    fn test_goal_on_wall_not_accessible() {
        let config = GridConfig::new(100, 100, 0.1);
        let mut cells = vec![0.0f32; 100 * 100];
        cells[50 * 100 + 50] = 1.0;
        let map = OccupancyGrid::from_cells(config, cells).unwrap();
        let mut planner = planner_with_map(map, PlannerConfig::default());
        planner.update_robot(&TrajPoint::from_pose(Pose::new(2.0, 5.0, 0.0)));
        planner.update_goal(Pose::new(5.05, 5.05, 0.0), true, 0.0);
        assert!(planner.goal_set());
        assert!(!planner.goal_reachable());
        assert!(planner.path().is_empty());
    }

    #[test]
    fn test_nearest_free_fallback() {
        let config = GridConfig::new(100, 100, 0.1);
        let mut cells = vec![0.0f32; 100 * 100];
        cells[50 * 100 + 50] = 1.0;
        let map = OccupancyGrid::from_cells(config, cells).unwrap();
        let nav = PlannerConfig {
            plan_to_nearest_free_point: true,
            ..Default::default()
        };
        let mut planner = planner_with_map(map, nav);
        planner.update_robot(&TrajPoint::from_pose(Pose::new(2.0, 5.0, 0.0)));
        // Goal on the wall cell, robot ~3 m away.
        planner.update_goal(Pose::new(5.05, 5.05, 0.0), true, 0.0);
        assert!(!planner.goal_reachable());
        let path = planner.path();
        assert!(!path.is_empty());
        let last = path.last().unwrap();
        // Terminus lands next to the requested goal cell.
        let dist = last.pose().distance(&Pose::new(5.05, 5.05, 0.0));
        assert!(dist < 0.1 * std::f64::consts::SQRT_2 + 0.15, "dist={dist}");
    }

    #[test]
    fn test_goal_reached_conditions() {
        let mut planner = planner_with_map(open_map(100, 100), PlannerConfig::default());
        planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0)));
        planner.update_goal(Pose::new(5.0, 5.0, 0.0), true, 0.0);
        match planner.next_waypoint() {
            WaypointResult::Next { waypoint, .. } => {
                assert!(waypoint.distance(&TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0))) > 0.0)
            }
            other => panic!("expected waypoint, got {other:?}"),
        }

        // Robot within goal_size of the goal, any orientation allowed.
        planner.update_robot(&TrajPoint::from_pose(Pose::new(4.8, 4.8, 1.0)));
        assert!(matches!(
            planner.next_waypoint(),
            WaypointResult::GoalReached
        ));
    }

    #[test]
    fn test_goal_theta_tolerance_enforced() {
        let nav = PlannerConfig {
            goal_theta_tolerance: 0.1,
            ..Default::default()
        };
        let mut planner = planner_with_map(open_map(100, 100), nav);
        planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0)));
        planner.update_goal(Pose::new(5.0, 5.0, 1.5), false, 0.0);

        // At the goal position but facing the wrong way: not reached.
        planner.update_robot(&TrajPoint::from_pose(Pose::new(4.8, 5.0, 0.0)));
        assert!(!matches!(
            planner.next_waypoint(),
            WaypointResult::GoalReached
        ));

        // Facing within tolerance: reached.
        planner.update_robot(&TrajPoint::from_pose(Pose::new(4.8, 5.0, 1.45)));
        assert!(matches!(
            planner.next_waypoint(),
            WaypointResult::GoalReached
        ));
    }

    #[test]
    fn test_replan_throttled() {
        let nav = PlannerConfig {
            replan_frequency: 1.0,
            ..Default::default()
        };
        let mut planner = planner_with_map(open_map(100, 100), nav);
        planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0)));
        planner.update_goal(Pose::new(5.0, 5.0, 0.0), true, 10.0);
        let first_goal = planner.utility.as_ref().unwrap().goal();

        // A second goal 0.2 s later is coalesced: the DP is not re-run.
        planner.update_goal(Pose::new(2.0, 2.0, 0.0), true, 10.2);
        assert_eq!(planner.utility.as_ref().unwrap().goal(), first_goal);

        // After the throttle window it goes through.
        planner.update_goal(Pose::new(2.0, 2.0, 0.0), true, 11.5);
        assert_ne!(planner.utility.as_ref().unwrap().goal(), first_goal);
    }

    #[test]
    fn test_map_update_blocks_path() {
        let nav = PlannerConfig {
            map_update_obstacles: true,
            map_update_radius: 6.0,
            replan_frequency: 0.0,
            smooth_path: true,
            ..Default::default()
        };
        // Full-size robot so the inflated laser curtain has no gaps.
        let mut planner = Planner::new(nav, RobotConfig::default());
        planner.set_map(open_map(100, 100), 0.0);
        planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 5.0, 0.0)));
        planner.update_goal(Pose::new(9.0, 5.0, 0.0), true, 0.0);
        let direct_len = planner.path().len();
        assert!(direct_len >= 2);

        // A wall of laser endpoints across the corridor ahead.
        let ranges = vec![4.0; 61];
        let laser = RobotLaser {
            config: types::LaserConfig {
                start_angle: -0.5,
                angular_resolution: 1.0 / 60.0,
                maximum_range: 80.0,
                ..Default::default()
            },
            ranges,
            laser_pose: Pose::new(1.0, 5.0, 0.0),
            robot_pose: Pose::new(1.0, 5.0, 0.0),
            ..Default::default()
        };
        planner.update_map(&laser, 5.0);
        // Path still exists but routes around the new obstacles.
        let blocked_path = planner.path();
        assert!(!blocked_path.is_empty());
        let max_detour = blocked_path
            .iter()
            .map(|p| (p.y - 5.0).abs())
            .fold(0.0f64, f64::max);
        assert!(max_detour > 0.5, "path did not deviate: {max_detour}");
    }

    #[test]
    fn test_reset_map_restores_pristine() {
        let nav = PlannerConfig {
            map_update_obstacles: true,
            map_update_radius: 6.0,
            replan_frequency: 0.0,
            ..Default::default()
        };
        let mut planner = planner_with_map(open_map(100, 100), nav);
        planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 5.0, 0.0)));
        let laser = RobotLaser {
            config: types::LaserConfig {
                start_angle: 0.0,
                angular_resolution: 0.01,
                maximum_range: 80.0,
                ..Default::default()
            },
            ranges: vec![2.0],
            laser_pose: Pose::new(1.0, 5.0, 0.0),
            robot_pose: Pose::new(1.0, 5.0, 0.0),
            ..Default::default()
        };
        planner.update_map(&laser, 0.0);
        let working = planner.working_map.as_ref().unwrap();
        let (gx, gy) = working.world_to_grid(3.0, 5.0).unwrap();
        assert_eq!(working.cell(gx, gy), Some(1.0));

        planner.reset_map();
        let working = planner.working_map.as_ref().unwrap();
        assert_eq!(working.cell(gx, gy), Some(0.0));
    }

    #[test]
    fn test_velocity_command_turns_toward_waypoint() {
        let planner = planner_with_map(open_map(50, 50), PlannerConfig::default());
        let robot = TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0));
        // Waypoint to the left: positive rotational velocity.
        let left = TrajPoint::from_pose(Pose::new(1.0, 2.0, 0.0));
        let cmd = planner.velocity_command(&robot, &left);
        assert!(cmd.rv > 0.0);
        // Waypoint to the right: negative.
        let right = TrajPoint::from_pose(Pose::new(1.0, 0.0, 0.0));
        let cmd = planner.velocity_command(&robot, &right);
        assert!(cmd.rv < 0.0);
    }

    #[test]
    fn test_velocity_command_straight_ahead_full_speed() {
        let mut planner = planner_with_map(open_map(100, 100), PlannerConfig::default());
        planner.update_robot(&TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0)));
        planner.update_goal(Pose::new(9.0, 1.0, 0.0), true, 0.0);
        let robot = TrajPoint::from_pose(Pose::new(1.0, 1.0, 0.0));
        let ahead = TrajPoint::from_pose(Pose::new(3.0, 1.0, 0.0));
        let cmd = planner.velocity_command(&robot, &ahead);
        assert!((cmd.rv).abs() < 1e-9);
        assert!(cmd.tv > 0.5);
    }

    #[test]
    fn test_map_message_roundtrip_gzip() {
        let mut planner = planner_with_map(open_map(20, 20), PlannerConfig::default());
        planner.update_robot(&TrajPoint::from_pose(Pose::new(0.5, 0.5, 0.0)));
        planner.update_goal(Pose::new(1.5, 1.5, 0.0), true, 0.0);

        let raw = planner.map_message(MapKind::Cost, false).unwrap();
        assert_eq!(raw.uncompressed_size, 20 * 20 * 4);
        assert_eq!(raw.data.len(), raw.uncompressed_size);

        let zipped = planner.map_message(MapKind::Cost, true).unwrap();
        assert!(zipped.compressed);
        let mut decoder = GzDecoder::new(zipped.data.as_slice());
        let mut inflated = Vec::new();
        decoder.read_to_end(&mut inflated).unwrap();
        assert_eq!(inflated, raw.data);
    }

    #[test]
    fn test_utility_message_requires_plan() {
        let planner = planner_with_map(open_map(20, 20), PlannerConfig::default());
        assert!(matches!(
            planner.map_message(MapKind::Utility, false),
            Err(PlanError::NoUtility)
        ));
    }
}

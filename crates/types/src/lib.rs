//! Shared types and message definitions for the navigation stack.

use serde::{Deserialize, Serialize};

/// 2D pose in the map frame (meters, radians).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// X position in meters
    pub x: f64,
    /// Y position in meters
    pub y: f64,
    /// Heading in radians (positive = counter-clockwise from X axis)
    pub theta: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Euclidean distance to another pose, ignoring heading.
    pub fn distance(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Velocity command: translational (m/s) and rotational (rad/s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub tv: f64,
    pub rv: f64,
}

impl VelocityCommand {
    pub const STOP: VelocityCommand = VelocityCommand { tv: 0.0, rv: 0.0 };
}

/// A point along a planned trajectory: pose plus the velocities the
/// follower should hold through it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrajPoint {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub t_vel: f64,
    pub r_vel: f64,
}

impl TrajPoint {
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }

    pub fn from_pose(pose: Pose) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            theta: pose.theta,
            t_vel: 0.0,
            r_vel: 0.0,
        }
    }

    pub fn distance(&self, other: &TrajPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Wheel odometry reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Odometry {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    /// Translational velocity (m/s)
    pub tv: f64,
    /// Rotational velocity (rad/s)
    pub rv: f64,
    /// Commanded acceleration (m/s^2)
    pub acceleration: f64,
    pub timestamp: f64,
    pub host: String,
}

impl Odometry {
    pub fn pose(&self) -> Pose {
        Pose::new(self.x, self.y, self.theta)
    }
}

/// Static configuration block of a planar range finder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaserConfig {
    /// Hardware type tag (kept numeric for log compatibility)
    pub laser_type: i32,
    /// Angle of the first beam relative to the sensor X axis (radians)
    pub start_angle: f64,
    /// Field of view (radians)
    pub fov: f64,
    /// Angle between adjacent beams (radians)
    pub angular_resolution: f64,
    /// Largest range the sensor can report (meters)
    pub maximum_range: f64,
    /// Range accuracy (meters)
    pub accuracy: f64,
    /// Remission (intensity) reporting mode
    pub remission_mode: i32,
}

impl Default for LaserConfig {
    fn default() -> Self {
        // 180 degree, 1 degree resolution SICK profile
        Self {
            laser_type: 0,
            start_angle: -std::f64::consts::FRAC_PI_2,
            fov: std::f64::consts::PI,
            angular_resolution: std::f64::consts::PI / 180.0,
            maximum_range: 80.0,
            accuracy: 0.01,
            remission_mode: 0,
        }
    }
}

impl LaserConfig {
    /// Beam angle of reading `i` in the sensor frame.
    pub fn beam_angle(&self, i: usize) -> f64 {
        self.start_angle + i as f64 * self.angular_resolution
    }
}

/// A laser scan stamped with the interpolated robot pose, as produced by
/// the robot front-end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RobotLaser {
    pub config: LaserConfig,
    pub ranges: Vec<f64>,
    pub remissions: Vec<f64>,
    /// Sensor pose in the map frame at scan time
    pub laser_pose: Pose,
    /// Robot pose in the map frame at scan time
    pub robot_pose: Pose,
    pub tv: f64,
    pub rv: f64,
    pub forward_safety_dist: f64,
    pub side_safety_dist: f64,
    pub turn_axis: f64,
    pub timestamp: f64,
    pub host: String,
}

/// Ground-truth pose from the simulator, used only for evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TruePos {
    pub true_pose: Pose,
    pub odometry_pose: Pose,
    pub timestamp: f64,
    pub host: String,
}

/// A named pose stored alongside a map, addressable as a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedPlace {
    pub name: String,
    pub pose: Pose,
    /// Standard deviations for localization initialization at this place
    pub std: Option<Pose>,
    /// Whether the place fixes an orientation or only a position
    pub kind: PlaceKind,
}

/// Whether a named place constrains heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaceKind {
    /// Position only; any arrival orientation is acceptable
    Named,
    /// Full pose; arrival heading must match
    Localization,
}

/// Why autonomous motion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    GoalReached,
    UserStopped,
    Unknown,
}

/// Snapshot of the navigator published after every cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigatorStatus {
    pub autonomous: bool,
    pub goal_set: bool,
    pub goal: Pose,
    pub robot: TrajPoint,
}

//! Shared fixtures for navigation integration tests.

use gridmap::{GridConfig, OccupancyGrid};
use types::{LaserConfig, Pose, RobotLaser};

/// Rectangular room with occupied border cells.
pub fn box_room_grid(width_m: f64, height_m: f64, resolution: f64) -> OccupancyGrid {
    let width = (width_m / resolution).round() as usize;
    let height = (height_m / resolution).round() as usize;
    let mut cells = vec![0.0f32; width * height];
    for gx in 0..width {
        cells[gx] = 1.0;
        cells[(height - 1) * width + gx] = 1.0;
    }
    for gy in 0..height {
        cells[gy * width] = 1.0;
        cells[gy * width + width - 1] = 1.0;
    }
    OccupancyGrid::from_cells(GridConfig::new(width, height, resolution), cells).unwrap()
}

/// Analytic range from a pose inside the room `[0, w] x [0, h]` along a
/// world-frame ray.
fn box_range(w: f64, h: f64, x: f64, y: f64, angle: f64) -> f64 {
    let (sin_a, cos_a) = angle.sin_cos();
    let mut min_dist = f64::INFINITY;

    if cos_a > 1e-9 {
        let t = (w - x) / cos_a;
        if (y + t * sin_a) >= 0.0 && (y + t * sin_a) <= h {
            min_dist = min_dist.min(t);
        }
    }
    if cos_a < -1e-9 {
        let t = -x / cos_a;
        if (y + t * sin_a) >= 0.0 && (y + t * sin_a) <= h {
            min_dist = min_dist.min(t);
        }
    }
    if sin_a > 1e-9 {
        let t = (h - y) / sin_a;
        if (x + t * cos_a) >= 0.0 && (x + t * cos_a) <= w {
            min_dist = min_dist.min(t);
        }
    }
    if sin_a < -1e-9 {
        let t = -y / sin_a;
        if (x + t * cos_a) >= 0.0 && (x + t * cos_a) <= w {
            min_dist = min_dist.min(t);
        }
    }

    min_dist
}

/// Synthetic laser scan taken from `pose` inside a `w x h` box room. The
/// reported `robot_pose` is the odometry estimate stamped on the scan.
pub fn box_room_scan(
    w: f64,
    h: f64,
    pose: &Pose,
    odometry_pose: &Pose,
    num_beams: usize,
    timestamp: f64,
) -> RobotLaser {
    let config = LaserConfig {
        start_angle: -std::f64::consts::FRAC_PI_2,
        fov: std::f64::consts::PI,
        angular_resolution: std::f64::consts::PI / (num_beams - 1) as f64,
        maximum_range: 80.0,
        ..Default::default()
    };
    let ranges = (0..num_beams)
        .map(|i| {
            let angle = pose.theta + config.beam_angle(i);
            box_range(w, h, pose.x, pose.y, angle)
        })
        .collect();
    RobotLaser {
        config,
        ranges,
        laser_pose: *pose,
        robot_pose: *odometry_pose,
        timestamp,
        ..Default::default()
    }
}

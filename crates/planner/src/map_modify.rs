//! Live map modification from laser scans.
//!
//! The planner keeps a pristine copy of the static map and paints dynamic
//! obstacles and cleared freespace into a working copy. Marks from the
//! previous scan are rolled back cell-by-cell before the next scan is
//! applied, so stale obstacles do not accumulate.

use gridmap::OccupancyGrid;
use tracing::trace;
use types::RobotLaser;

use crate::bresenham;
use crate::PlannerConfig;

/// Occupancy painted into endpoint cells.
const OBSTACLE_PROB: f32 = 1.0;
/// Occupancy painted into traversed cells.
const FREESPACE_PROB: f32 = 0.0;

/// Restore previously modified cells from the pristine map.
pub(crate) fn clear_marks(
    working: &mut OccupancyGrid,
    pristine: &OccupancyGrid,
    marks: &mut Vec<(usize, usize)>,
) {
    for &(gx, gy) in marks.iter() {
        if let Some(value) = pristine.cell(gx, gy) {
            working.set_cell(gx, gy, value);
        }
    }
    marks.clear();
}

/// Paint one laser scan into the working map. Returns the set of modified
/// cells so they can be rolled back later.
pub(crate) fn apply_scan(
    working: &mut OccupancyGrid,
    laser: &RobotLaser,
    config: &PlannerConfig,
    marks: &mut Vec<(usize, usize)>,
) {
    let Some(origin_cell) = working.world_to_grid(laser.laser_pose.x, laser.laser_pose.y) else {
        return;
    };
    let origin = (origin_cell.0 as i64, origin_cell.1 as i64);

    let step = if config.num_lasers_to_use > 0 {
        (laser.ranges.len() / config.num_lasers_to_use).max(1)
    } else {
        1
    };

    let mut painted = 0usize;
    for i in (0..laser.ranges.len()).step_by(step) {
        let range = laser.ranges[i];
        if range > config.map_update_radius || range >= laser.config.maximum_range {
            continue;
        }
        let angle = laser.laser_pose.theta + laser.config.beam_angle(i);
        let end_x = laser.laser_pose.x + range * angle.cos();
        let end_y = laser.laser_pose.y + range * angle.sin();
        let Some(end_cell) = working.world_to_grid(end_x, end_y) else {
            continue;
        };
        let end = (end_cell.0 as i64, end_cell.1 as i64);

        if config.map_update_freespace {
            for &(x, y) in bresenham::line(origin, end).iter() {
                if (x, y) == end {
                    break;
                }
                if x >= 0 && y >= 0 {
                    let (gx, gy) = (x as usize, y as usize);
                    if working.cell(gx, gy).is_some() {
                        working.set_cell(gx, gy, FREESPACE_PROB);
                        marks.push((gx, gy));
                    }
                }
            }
        }

        if config.map_update_obstacles {
            working.set_cell(end_cell.0, end_cell.1, OBSTACLE_PROB);
            marks.push(end_cell);
            painted += 1;
        }
    }
    trace!(painted, "Applied laser scan to working map");
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmap::GridConfig;
    use types::{LaserConfig, Pose};

    fn empty_map() -> OccupancyGrid {
        OccupancyGrid::new(GridConfig::new(100, 100, 0.1)).unwrap()
    }

    fn single_beam_laser(range: f64) -> RobotLaser {
        RobotLaser {
            config: LaserConfig {
                start_angle: 0.0,
                angular_resolution: 0.01,
                maximum_range: 80.0,
                ..Default::default()
            },
            ranges: vec![range],
            laser_pose: Pose::new(5.0, 5.0, 0.0),
            robot_pose: Pose::new(5.0, 5.0, 0.0),
            ..Default::default()
        }
    }

    fn nav_config() -> PlannerConfig {
        PlannerConfig {
            map_update_radius: 3.0,
            map_update_obstacles: true,
            map_update_freespace: true,
            num_lasers_to_use: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint_marked_occupied() {
        let pristine = empty_map();
        let mut working = pristine.clone();
        let mut marks = Vec::new();
        apply_scan(&mut working, &single_beam_laser(2.0), &nav_config(), &mut marks);
        // Beam along +x from (5, 5): endpoint at (7, 5).
        let (gx, gy) = working.world_to_grid(7.0, 5.0).unwrap();
        assert_eq!(working.cell(gx, gy), Some(1.0));
        assert!(!marks.is_empty());
    }

    #[test]
    fn test_intermediate_cells_marked_free() {
        let pristine = empty_map();
        let mut working = pristine.clone();
        let mut marks = Vec::new();
        apply_scan(&mut working, &single_beam_laser(2.0), &nav_config(), &mut marks);
        let (gx, gy) = working.world_to_grid(6.0, 5.0).unwrap();
        assert_eq!(working.cell(gx, gy), Some(0.0));
    }

    #[test]
    fn test_beam_beyond_radius_ignored() {
        let pristine = empty_map();
        let mut working = pristine.clone();
        let mut marks = Vec::new();
        apply_scan(&mut working, &single_beam_laser(5.0), &nav_config(), &mut marks);
        assert!(marks.is_empty());
    }

    #[test]
    fn test_clear_restores_pristine() {
        let pristine = empty_map();
        let mut working = pristine.clone();
        let mut marks = Vec::new();
        apply_scan(&mut working, &single_beam_laser(2.0), &nav_config(), &mut marks);
        let (gx, gy) = working.world_to_grid(7.0, 5.0).unwrap();
        assert_eq!(working.cell(gx, gy), Some(1.0));

        clear_marks(&mut working, &pristine, &mut marks);
        assert_eq!(working.cell(gx, gy), Some(0.0));
        assert!(marks.is_empty());
        assert_eq!(working.raw_cells(), pristine.raw_cells());
    }
}

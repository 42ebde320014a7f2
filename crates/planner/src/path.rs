//! Plan extraction and smoothing.

use gridmap::OccupancyGrid;
use types::{Pose, TrajPoint};

use crate::bresenham;
use crate::cost::CostMap;
use crate::dp::UtilityMap;
use crate::PlannerConfig;

/// Follow best-action arrows from the robot cell to the goal cell.
///
/// The returned path always starts at the robot's actual pose. Returns
/// `None` when the descent hits a fixed point before the goal.
pub(crate) fn extract(
    map: &OccupancyGrid,
    utility: &UtilityMap,
    robot: &TrajPoint,
) -> Option<Vec<TrajPoint>> {
    let mut path = vec![*robot];

    let mut cell = map.world_to_grid(robot.x, robot.y)?;
    let goal = utility.goal();
    loop {
        if cell == goal {
            return Some(path);
        }
        match utility.best_action(cell.0, cell.1) {
            Some(next) => {
                let (x, y) = map.grid_to_world(next.0, next.1);
                path.push(TrajPoint {
                    x,
                    y,
                    theta: 0.0,
                    t_vel: 0.0,
                    r_vel: 0.0,
                });
                cell = next;
            }
            None => return None,
        }
    }
}

/// Accumulated and minimum cost along the straight cell line between two
/// path points.
fn segment_cost(
    map: &OccupancyGrid,
    cost: &CostMap,
    from: &TrajPoint,
    to: &TrajPoint,
) -> (f64, f64) {
    let a = map
        .world_to_grid(from.x, from.y)
        .map(|(x, y)| (x as i64, y as i64))
        .unwrap_or((0, 0));
    let b = map
        .world_to_grid(to.x, to.y)
        .map(|(x, y)| (x as i64, y as i64))
        .unwrap_or((0, 0));

    let mut total = 0.0;
    let mut min_cost = f64::MAX;
    for (i, (x, y)) in bresenham::line(a, b).into_iter().enumerate() {
        let c = cost.cost(x.max(0) as usize, y.max(0) as usize);
        min_cost = min_cost.min(c);
        if i > 0 {
            total += c;
        }
    }
    (total, min_cost)
}

/// Drop interior waypoints whose removal neither raises the accumulated
/// cost nor moves the path through worse cells, then drop leading
/// waypoints the robot is already on top of.
pub(crate) fn smooth(
    path: &mut Vec<TrajPoint>,
    map: &OccupancyGrid,
    cost: &CostMap,
    robot: &TrajPoint,
    config: &PlannerConfig,
) {
    while path.len() > 2 && robot.distance(&path[1]) < config.goal_size {
        path.remove(1);
    }

    let mut i = 1;
    while i + 1 < path.len() {
        let (cost_prev, min_prev) = segment_cost(map, cost, &path[i - 1], &path[i]);
        let (cost_next, min_next) = segment_cost(map, cost, &path[i], &path[i + 1]);
        let (cost_direct, min_direct) = segment_cost(map, cost, &path[i - 1], &path[i + 1]);

        let via_is_cheaper = cost_prev + cost_next + 1e-6 < cost_direct;
        let via_is_safer = min_next < min_direct || min_prev < min_direct;
        if via_is_cheaper || via_is_safer {
            i += 1;
        } else {
            path.remove(i);
        }
    }
}

/// Point interior waypoints at their successors; the terminal waypoint
/// takes the requested goal heading unless any orientation is acceptable.
pub(crate) fn assign_orientations(
    path: &mut [TrajPoint],
    goal: &Pose,
    goal_accessible: bool,
    any_orientation: bool,
) {
    for i in 1..path.len().saturating_sub(1) {
        path[i].theta = (path[i + 1].y - path[i].y).atan2(path[i + 1].x - path[i].x);
    }
    if path.len() > 1 {
        let last = path.len() - 1;
        if !goal_accessible || any_orientation {
            path[last].theta = path[last - 1].theta;
        } else {
            path[last].theta = goal.theta;
        }
    }
}

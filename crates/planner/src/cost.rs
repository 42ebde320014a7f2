//! Cost surface over the occupancy grid.
//!
//! Occupied and unknown cells cost infinity; around them the robot radius
//! is lethal, an approach band adds a decaying gradient, and a wider side
//! band adds a small constant so plans prefer corridor centers.

use gridmap::OccupancyGrid;

use crate::RobotConfig;

/// Base traversal cost of a fully free cell.
pub(crate) const FREE_COST: f64 = 1.0;
/// Peak of the approach-distance gradient.
const APPROACH_COST: f64 = 50.0;
/// Constant addend inside the side-clearance band.
const SIDE_COST: f64 = 5.0;

/// Scalar traversal cost per cell, dimensioned like the occupancy grid.
#[derive(Debug, Clone)]
pub struct CostMap {
    width: usize,
    height: usize,
    resolution: f64,
    costs: Vec<f64>,
}

impl CostMap {
    /// Build costs from the working map: a chamfer distance to the nearest
    /// obstacle or unknown cell, converted into lethal / approach / side
    /// bands around the robot radius.
    pub fn build(map: &OccupancyGrid, robot: &RobotConfig, occupied_prob: f64) -> Self {
        let (width, height) = (map.width(), map.height());
        let resolution = map.resolution();
        let mut distance = vec![f64::MAX; width * height];

        for gy in 0..height {
            for gx in 0..width {
                if map.is_occupied(gx, gy, occupied_prob) || map.is_unknown(gx, gy) {
                    distance[gy * width + gx] = 0.0;
                }
            }
        }
        chamfer(&mut distance, width, height);

        let radius = robot.width / 2.0;
        let costs = distance
            .iter()
            .map(|&d| {
                let clearance = d * resolution - radius;
                if clearance <= 0.0 {
                    f64::INFINITY
                } else {
                    let mut cost = FREE_COST;
                    if clearance < robot.approach_dist {
                        cost += APPROACH_COST * (1.0 - clearance / robot.approach_dist);
                    }
                    if clearance < robot.approach_dist + robot.side_dist {
                        cost += SIDE_COST;
                    }
                    cost
                }
            })
            .collect();

        Self {
            width,
            height,
            resolution,
            costs,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    #[inline]
    pub fn cost(&self, gx: usize, gy: usize) -> f64 {
        if gx < self.width && gy < self.height {
            self.costs[gy * self.width + gx]
        } else {
            f64::INFINITY
        }
    }

    pub fn is_lethal(&self, gx: usize, gy: usize) -> bool {
        self.cost(gx, gy).is_infinite()
    }

    /// Costs as f32 for map export; infinite cells saturate.
    pub fn to_float_grid(&self) -> Vec<f32> {
        self.costs.iter().map(|&c| c as f32).collect()
    }
}

/// Two-pass 8-neighbor chamfer over a seeded distance field (cell units).
fn chamfer(distance: &mut [f64], width: usize, height: usize) {
    let sqrt2 = std::f64::consts::SQRT_2;
    let idx = |x: usize, y: usize| y * width + x;
    let relax = |distance: &mut [f64], x: usize, y: usize| {
        for i in -1..=1i64 {
            for j in -1..=1i64 {
                if i == 0 && j == 0 {
                    continue;
                }
                let (nx, ny) = (x as i64 + i, y as i64 + j);
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let step = if i * j != 0 { sqrt2 } else { 1.0 };
                let v = distance[idx(nx as usize, ny as usize)] + step;
                if v < distance[idx(x, y)] {
                    distance[idx(x, y)] = v;
                }
            }
        }
    };

    for y in 0..height {
        for x in 0..width {
            relax(distance, x, y);
        }
    }
    for y in (0..height).rev() {
        for x in (0..width).rev() {
            relax(distance, x, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridmap::GridConfig;

    fn robot() -> RobotConfig {
        RobotConfig {
            width: 0.4,
            approach_dist: 0.4,
            side_dist: 0.4,
            ..Default::default()
        }
    }

    fn map_with_wall() -> OccupancyGrid {
        // 10 m x 10 m at 0.1 m; wall column at x = 5 m.
        let config = GridConfig::new(100, 100, 0.1);
        let mut cells = vec![0.0f32; 100 * 100];
        for gy in 0..100 {
            cells[gy * 100 + 50] = 1.0;
        }
        OccupancyGrid::from_cells(config, cells).unwrap()
    }

    #[test]
    fn test_occupied_cells_are_lethal() {
        let cost = CostMap::build(&map_with_wall(), &robot(), 0.5);
        assert!(cost.is_lethal(50, 50));
    }

    #[test]
    fn test_robot_radius_is_lethal() {
        let cost = CostMap::build(&map_with_wall(), &robot(), 0.5);
        // 0.1 m from the wall: inside the 0.2 m robot radius.
        assert!(cost.is_lethal(49, 50));
        assert!(cost.is_lethal(51, 50));
    }

    #[test]
    fn test_cost_decays_with_clearance() {
        let cost = CostMap::build(&map_with_wall(), &robot(), 0.5);
        let near = cost.cost(45, 50);
        let farther = cost.cost(43, 50);
        let free = cost.cost(10, 50);
        assert!(near > farther);
        assert!(farther > free);
        assert_eq!(free, FREE_COST);
    }

    #[test]
    fn test_unknown_cells_are_lethal() {
        let config = GridConfig::new(10, 10, 0.1);
        let mut cells = vec![0.0f32; 100];
        cells[5 * 10 + 5] = OccupancyGrid::UNKNOWN;
        let map = OccupancyGrid::from_cells(config, cells).unwrap();
        let cost = CostMap::build(&map, &robot(), 0.5);
        assert!(cost.is_lethal(5, 5));
    }

    #[test]
    fn test_out_of_bounds_is_infinite() {
        let cost = CostMap::build(&map_with_wall(), &robot(), 0.5);
        assert!(cost.cost(100, 0).is_infinite());
    }
}

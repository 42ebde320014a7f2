//! Backward value iteration over the cost map.
//!
//! Dijkstra-style relaxation from the goal cell: the utility of a cell is
//! the minimal accumulated cost to reach the goal, stepping through the
//! 8-neighborhood with diagonal steps weighted by sqrt(2). Cells left at
//! infinity are unreachable.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::cost::CostMap;

const NEIGHBOR_X: [i64; 8] = [0, 1, 1, 1, 0, -1, -1, -1];
const NEIGHBOR_Y: [i64; 8] = [-1, -1, 0, 1, 1, 1, 0, -1];

/// Min-heap entry ordered by utility.
struct QueueEntry {
    utility: f64,
    cell: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.utility == other.utility
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the smallest utility.
        other.utility.total_cmp(&self.utility)
    }
}

/// Cost-to-go field computed from a goal cell.
#[derive(Debug, Clone)]
pub struct UtilityMap {
    width: usize,
    height: usize,
    utility: Vec<f64>,
    goal: (usize, usize),
}

impl UtilityMap {
    /// Run the dynamic program seeded at `goal`.
    ///
    /// A goal on a lethal cell yields an all-infinite field: nothing can
    /// reach it.
    pub fn dynamic_program(cost: &CostMap, goal: (usize, usize)) -> Self {
        let (width, height) = (cost.width(), cost.height());
        let mut utility = vec![f64::INFINITY; width * height];
        let mut map = Self {
            width,
            height,
            utility: Vec::new(),
            goal,
        };

        if goal.0 >= width || goal.1 >= height || cost.is_lethal(goal.0, goal.1) {
            map.utility = utility;
            return map;
        }

        let idx = |x: usize, y: usize| y * width + x;
        let mut heap = BinaryHeap::new();
        utility[idx(goal.0, goal.1)] = 0.0;
        heap.push(QueueEntry {
            utility: 0.0,
            cell: idx(goal.0, goal.1),
        });

        while let Some(QueueEntry { utility: u, cell }) = heap.pop() {
            if u > utility[cell] {
                continue;
            }
            let (cx, cy) = ((cell % width) as i64, (cell / width) as i64);
            for n in 0..8 {
                let (nx, ny) = (cx + NEIGHBOR_X[n], cy + NEIGHBOR_Y[n]);
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let step_cost = cost.cost(nx as usize, ny as usize);
                if step_cost.is_infinite() {
                    continue;
                }
                let factor = if NEIGHBOR_X[n] * NEIGHBOR_Y[n] != 0 {
                    std::f64::consts::SQRT_2
                } else {
                    1.0
                };
                let candidate = u + factor * step_cost;
                let nidx = idx(nx as usize, ny as usize);
                if candidate < utility[nidx] {
                    utility[nidx] = candidate;
                    heap.push(QueueEntry {
                        utility: candidate,
                        cell: nidx,
                    });
                }
            }
        }

        map.utility = utility;
        map
    }

    pub fn goal(&self) -> (usize, usize) {
        self.goal
    }

    pub fn utility(&self, gx: usize, gy: usize) -> f64 {
        if gx < self.width && gy < self.height {
            self.utility[gy * self.width + gx]
        } else {
            f64::INFINITY
        }
    }

    pub fn is_reachable(&self, gx: usize, gy: usize) -> bool {
        self.utility(gx, gy).is_finite()
    }

    /// Greedy descent direction: the 8-neighbor with minimal utility, or
    /// `None` if no neighbor improves on the cell itself.
    pub fn best_action(&self, gx: usize, gy: usize) -> Option<(usize, usize)> {
        let mut best = self.utility(gx, gy);
        let mut best_cell = None;
        for n in 0..8 {
            let (nx, ny) = (gx as i64 + NEIGHBOR_X[n], gy as i64 + NEIGHBOR_Y[n]);
            if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
                continue;
            }
            let u = self.utility(nx as usize, ny as usize);
            if u < best {
                best = u;
                best_cell = Some((nx as usize, ny as usize));
            }
        }
        best_cell
    }

    /// Utilities as f32 for map export; unreachable cells saturate.
    pub fn to_float_grid(&self) -> Vec<f32> {
        self.utility.iter().map(|&u| u as f32).collect()
    }
}

//! Local evidence map for scan matching.
//!
//! Beam endpoints of a handful of recent scans are rasterized into a dense
//! hit/observation grid, converted to an occupancy likelihood, and blurred
//! with a separable binomial kernel. A sparse set records which cells were
//! touched since the last clear, so clearing and convolving cost
//! O(touched) rather than a full-grid sweep.

/// Convolution/probability scratch states for a cell.
const UPDT_NOT: u8 = 0;
const UPDT_X: u8 = 1;
const UPDT_Y: u8 = 2;

pub(crate) const EPSILON: f64 = 1e-8;

/// Sparse set of touched cells: membership bitmap plus an insertion list,
/// so clearing and convolving cost O(touched), not O(cells).
#[derive(Debug)]
struct TouchedCells {
    member: Vec<bool>,
    cells: Vec<(usize, usize)>,
    width: usize,
}

impl TouchedCells {
    fn new(width: usize, height: usize) -> Self {
        Self {
            member: vec![false; width * height],
            cells: Vec::new(),
            width,
        }
    }

    fn mark(&mut self, x: usize, y: usize) {
        let idx = y * self.width + x;
        if !self.member[idx] {
            self.member[idx] = true;
            self.cells.push((x, y));
        }
    }

    fn drain(&mut self) -> Vec<(usize, usize)> {
        for &(x, y) in &self.cells {
            self.member[y * self.width + x] = false;
        }
        std::mem::take(&mut self.cells)
    }

    fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.cells.iter().copied()
    }
}

/// Normalized binomial approximation of a Gaussian kernel.
pub(crate) fn gauss_kernel(length: usize) -> Vec<f64> {
    let mut row = vec![0u64; length];
    row[0] = 1;
    for i in 0..length.saturating_sub(1) {
        row[i + 1] = 1;
        for j in (1..=i).rev() {
            row[j] += row[j - 1];
        }
    }
    let sum: u64 = row.iter().sum();
    row.iter().map(|&v| v as f64 / sum as f64).collect()
}

/// Dense local grid of scan evidence.
///
/// The grid is biased ahead of the robot: the robot cell sits near the low
/// x edge so forward beams get most of the coverage.
#[derive(Debug)]
pub struct EvidenceMap {
    size_x: usize,
    size_y: usize,
    center_x: i64,
    center_y: i64,
    resolution: f64,
    /// Default likelihood of unobserved cells
    std_val: f64,
    hit: Vec<f32>,
    sum: Vec<i32>,
    prob: Vec<f32>,
    calc: Vec<f32>,
    updated: Vec<u8>,
    touched: TouchedCells,
}

/// Cells between the robot and the forward edge of the local map.
const ROBOT_CELL_MARGIN: i64 = 60;

impl EvidenceMap {
    /// Allocate a local map sized for the given maximum usable range.
    pub fn new(max_range: f64, resolution: f64, std_val: f64) -> Self {
        let half = (max_range / resolution).ceil() as usize;
        let size_x = 2 * half;
        let size_y = half;
        Self {
            size_x,
            size_y,
            center_x: ROBOT_CELL_MARGIN.min(half as i64),
            center_y: (size_y / 2) as i64,
            resolution,
            std_val,
            hit: vec![0.0; size_x * size_y],
            sum: vec![0; size_x * size_y],
            prob: vec![std_val as f32; size_x * size_y],
            calc: vec![std_val as f32; size_x * size_y],
            updated: vec![UPDT_NOT; size_x * size_y],
            touched: TouchedCells::new(size_x, size_y),
        }
    }

    pub fn size(&self) -> (usize, usize) {
        (self.size_x, self.size_y)
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.size_x + x
    }

    /// Grid cell of a point in the map's local frame.
    #[inline]
    pub fn cell_of(&self, x: f64, y: f64) -> (i64, i64) {
        (
            self.center_x + (x / self.resolution) as i64,
            self.center_y + (y / self.resolution) as i64,
        )
    }

    #[inline]
    fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.size_x && (y as usize) < self.size_y
    }

    /// Smoothed occupancy likelihood for a beam endpoint, with the
    /// out-of-map default applied.
    pub fn value_at(&self, x: i64, y: i64) -> f64 {
        if self.contains(x, y) {
            EPSILON + self.prob[self.index(x as usize, y as usize)] as f64
        } else {
            EPSILON + self.std_val
        }
    }

    /// Record one beam endpoint.
    pub fn add_endpoint(&mut self, x: i64, y: i64) {
        if self.contains(x, y) {
            let idx = self.index(x as usize, y as usize);
            self.hit[idx] += 1.0;
            self.sum[idx] += 1;
            self.touched.mark(x as usize, y as usize);
        }
    }

    /// Reset every touched cell plus the convolution margin around it.
    pub fn clear(&mut self, half_kernel: usize) {
        let hk = half_kernel as i64;
        let std = self.std_val as f32;
        for (cx, cy) in self.touched.drain() {
            for x in (cx as i64 - hk).max(0)..=(cx as i64 + hk).min(self.size_x as i64 - 1) {
                for y in (cy as i64 - hk).max(0)..=(cy as i64 + hk).min(self.size_y as i64 - 1) {
                    let idx = self.index(x as usize, y as usize);
                    self.hit[idx] = 0.0;
                    self.sum[idx] = 0;
                    self.prob[idx] = std;
                    self.calc[idx] = std;
                    self.updated[idx] = UPDT_NOT;
                }
            }
        }
    }

    /// Convert hit counts to probabilities and run `passes` rounds of
    /// separable convolution over the touched neighborhoods.
    pub fn convolve(&mut self, kernel: &[f64], passes: usize) {
        let hk = kernel.len() / 2;

        // hit/sum where observed, capped at one; default elsewhere.
        let touched: Vec<(usize, usize)> = self.touched.iter().collect();
        for &(x, y) in &touched {
            let idx = self.index(x, y);
            self.prob[idx] = if self.sum[idx] > 0 {
                (self.hit[idx] / self.sum[idx] as f32).min(1.0)
            } else {
                self.std_val as f32
            };
        }

        for _ in 0..passes {
            for &(cx, cy) in &touched {
                self.convolve_calc_patch(kernel, hk, cx, cy);
            }
            for &(cx, cy) in &touched {
                self.convolve_prob_patch(kernel, hk, cx, cy);
            }
        }
    }

    /// X-direction kernel pass over the patch around a touched cell.
    fn convolve_calc_patch(&mut self, kernel: &[f64], hk: usize, cx: usize, cy: usize) {
        let hk_i = hk as i64;
        for x in (cx as i64 - hk_i).max(hk_i)..=(cx as i64 + hk_i).min(self.size_x as i64 - 1 - hk_i)
        {
            for y in (cy as i64 - hk_i).max(0)..=(cy as i64 + hk_i).min(self.size_y as i64 - 1) {
                let idx = self.index(x as usize, y as usize);
                if self.updated[idx] == UPDT_X {
                    continue;
                }
                let mut ksum = 0.0;
                for (k, &kv) in kernel.iter().enumerate() {
                    let nx = (x + k as i64 - hk_i) as usize;
                    let nidx = self.index(nx, y as usize);
                    if self.sum[nidx] > 0 {
                        ksum += kv * self.prob[nidx] as f64;
                    } else {
                        ksum += kv * self.std_val;
                    }
                }
                self.calc[idx] = ksum as f32;
                self.updated[idx] = UPDT_X;
            }
        }
    }

    /// Y-direction kernel pass over the patch around a touched cell.
    fn convolve_prob_patch(&mut self, kernel: &[f64], hk: usize, cx: usize, cy: usize) {
        let hk_i = hk as i64;
        for x in (cx as i64 - hk_i).max(0)..=(cx as i64 + hk_i).min(self.size_x as i64 - 1) {
            for y in (cy as i64 - hk_i).max(hk_i)..=(cy as i64 + hk_i).min(self.size_y as i64 - 1 - hk_i)
            {
                let idx = self.index(x as usize, y as usize);
                if self.updated[idx] == UPDT_Y {
                    continue;
                }
                let mut ksum = 0.0;
                for (k, &kv) in kernel.iter().enumerate() {
                    let ny = (y + k as i64 - hk_i) as usize;
                    ksum += kv * self.calc[self.index(x as usize, ny)] as f64;
                }
                self.prob[idx] = ksum as f32;
                self.updated[idx] = UPDT_Y;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauss_kernel_is_normalized_binomial() {
        let k = gauss_kernel(5);
        assert_eq!(k.len(), 5);
        let sum: f64 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        // 1 4 6 4 1 over 16
        assert!((k[0] - 1.0 / 16.0).abs() < 1e-12);
        assert!((k[2] - 6.0 / 16.0).abs() < 1e-12);
        assert!((k[1] - k[3]).abs() < 1e-12);
    }

    #[test]
    fn test_endpoint_raises_value() {
        let mut map = EvidenceMap::new(5.0, 0.1, 0.01);
        let (x, y) = map.cell_of(1.0, 0.0);
        let before = map.value_at(x, y);
        map.add_endpoint(x, y);
        map.convolve(&gauss_kernel(5), 1);
        let after = map.value_at(x, y);
        assert!(after > before);
    }

    #[test]
    fn test_convolution_spreads_to_neighbors() {
        let mut map = EvidenceMap::new(5.0, 0.1, 0.01);
        let (x, y) = map.cell_of(1.0, 0.0);
        map.add_endpoint(x, y);
        map.convolve(&gauss_kernel(5), 1);
        let center = map.value_at(x, y);
        let next = map.value_at(x + 1, y);
        let far = map.value_at(x + 10, y);
        assert!(next > far);
        assert!(center > next);
    }

    #[test]
    fn test_clear_restores_default() {
        let mut map = EvidenceMap::new(5.0, 0.1, 0.01);
        let (x, y) = map.cell_of(1.0, 0.0);
        map.add_endpoint(x, y);
        map.convolve(&gauss_kernel(5), 1);
        map.clear(2);
        let v = map.value_at(x, y);
        assert!((v - (EPSILON + 0.01)).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_map_value_is_default() {
        let map = EvidenceMap::new(5.0, 0.1, 0.01);
        assert!((map.value_at(-5, 0) - (EPSILON + 0.01)).abs() < 1e-12);
        assert!((map.value_at(100_000, 0) - (EPSILON + 0.01)).abs() < 1e-12);
    }

    #[test]
    fn test_repeated_clear_and_reuse() {
        let mut map = EvidenceMap::new(5.0, 0.1, 0.01);
        let kernel = gauss_kernel(5);
        for _ in 0..3 {
            let (x, y) = map.cell_of(2.0, 0.5);
            map.add_endpoint(x, y);
            map.convolve(&kernel, 1);
            assert!(map.value_at(x, y) > 0.1);
            map.clear(2);
        }
    }
}

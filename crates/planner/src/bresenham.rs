//! Integer line rasterization shared by path costing and map updates.

/// All cells on the line from `start` to `end`, inclusive.
pub(crate) fn line(start: (i64, i64), end: (i64, i64)) -> Vec<(i64, i64)> {
    let (mut x, mut y) = start;
    let (x1, y1) = end;
    let dx = (x1 - x).abs();
    let dy = (y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx - dy;

    let mut cells = Vec::with_capacity((dx.max(dy) + 1) as usize);
    loop {
        cells.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_point() {
        assert_eq!(line((3, 3), (3, 3)), vec![(3, 3)]);
    }

    #[test]
    fn test_horizontal() {
        assert_eq!(line((0, 0), (3, 0)), vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn test_diagonal() {
        assert_eq!(line((0, 0), (2, 2)), vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_endpoints_always_included() {
        for end in [(5, 2), (-4, 7), (3, -9), (-2, -2)] {
            let cells = line((0, 0), end);
            assert_eq!(*cells.first().unwrap(), (0, 0));
            assert_eq!(*cells.last().unwrap(), end);
        }
    }

    #[test]
    fn test_consecutive_cells_8_connected() {
        let cells = line((0, 0), (7, 3));
        for pair in cells.windows(2) {
            let dx = (pair[1].0 - pair[0].0).abs();
            let dy = (pair[1].1 - pair[0].1).abs();
            assert!(dx <= 1 && dy <= 1 && dx + dy > 0);
        }
    }
}

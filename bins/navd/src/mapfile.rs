//! Plain-text map files.
//!
//! Format: a header line `width height resolution`, then `height` rows of
//! `width` cell probabilities, row y = 0 first. Cells are probabilities in
//! [0, 1] or `-1` for unknown. Optional trailing lines
//! `place <name> <x> <y> [theta]` declare named goals.

use anyhow::{bail, Context, Result};
use std::path::Path;

use gridmap::{GridConfig, OccupancyGrid};
use types::{NamedPlace, PlaceKind, Pose};

pub struct MapFile {
    pub grid: OccupancyGrid,
    pub places: Vec<NamedPlace>,
}

pub fn load(path: &Path) -> Result<MapFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading map file {}", path.display()))?;
    parse(&content).with_context(|| format!("parsing map file {}", path.display()))
}

fn parse(content: &str) -> Result<MapFile> {
    let mut lines = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let header = lines.next().context("missing header line")?;
    let mut fields = header.split_whitespace();
    let width: usize = fields
        .next()
        .context("missing width")?
        .parse()
        .context("bad width")?;
    let height: usize = fields
        .next()
        .context("missing height")?
        .parse()
        .context("bad height")?;
    let resolution: f64 = fields
        .next()
        .context("missing resolution")?
        .parse()
        .context("bad resolution")?;

    let mut cells = vec![0.0f32; width * height];
    let mut places = Vec::new();
    let mut row = 0usize;
    for line in lines {
        if let Some(rest) = line.strip_prefix("place ") {
            places.push(parse_place(rest)?);
            continue;
        }
        if row >= height {
            bail!("more than {height} cell rows");
        }
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() != width {
            bail!("row {row} has {} cells, expected {width}", values.len());
        }
        for (col, v) in values.iter().enumerate() {
            cells[row * width + col] = v.parse::<f32>().with_context(|| {
                format!("bad cell value `{v}` at row {row} col {col}")
            })?;
        }
        row += 1;
    }
    if row != height {
        bail!("expected {height} cell rows, found {row}");
    }

    let grid = OccupancyGrid::from_cells(GridConfig::new(width, height, resolution), cells)?;
    Ok(MapFile { grid, places })
}

fn parse_place(rest: &str) -> Result<NamedPlace> {
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 3 {
        bail!("place line needs at least a name, x and y");
    }
    let name = fields[0].to_string();
    let x: f64 = fields[1].parse().context("bad place x")?;
    let y: f64 = fields[2].parse().context("bad place y")?;
    let (theta, kind) = if fields.len() > 3 {
        (
            fields[3].parse().context("bad place theta")?,
            PlaceKind::Localization,
        )
    } else {
        (0.0, PlaceKind::Named)
    };
    Ok(NamedPlace {
        name,
        pose: Pose::new(x, y, theta),
        std: None,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_map() {
        let map = parse("2 2 0.5\n0.0 1.0\n-1 0.25\n").unwrap();
        assert_eq!(map.grid.width(), 2);
        assert_eq!(map.grid.height(), 2);
        assert_eq!(map.grid.cell(1, 0), Some(1.0));
        assert!(map.grid.is_unknown(0, 1));
        assert!(map.places.is_empty());
    }

    #[test]
    fn test_parse_places() {
        let map = parse(
            "1 1 1.0\n0.0\nplace dock 3.0 4.0 1.57\nplace door 5.0 6.0\n",
        )
        .unwrap();
        assert_eq!(map.places.len(), 2);
        assert_eq!(map.places[0].name, "dock");
        assert_eq!(map.places[0].kind, PlaceKind::Localization);
        assert_eq!(map.places[1].kind, PlaceKind::Named);
    }

    #[test]
    fn test_bad_dimensions_rejected() {
        assert!(parse("2 2 0.5\n0.0 1.0\n").is_err());
        assert!(parse("2 2 0.5\n0.0\n0.0 1.0\n").is_err());
        assert!(parse("2 2 0.0\n0 0\n0 0\n").is_err());
    }
}

//! Alert vectorization
//!
//! Turns the per-pixel confidence grid into alert polygons: connected
//! components over the thresholded mask, boundaries traced along pixel
//! corners into exterior rings and holes, mapped through the geotransform
//! and filtered by minimum area.
//!
//! Areas assume a projected CRS in metres; geometry area / 10 000 is
//! hectares. Per-polygon confidence is the maximum confidence within the
//! component's pixel-space bounding box, matching the alert ledger's
//! established behavior.

use std::collections::BTreeMap;

use geo::Area;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use vigia_core::raster::Raster;
use vigia_core::vector::{Alert, AlertCollection, Confidence};
use vigia_core::{Error, Result};

/// Pixel adjacency used when grouping alert pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Four,
    Eight,
}

/// Parameters for [`vectorize_alerts`].
#[derive(Debug, Clone)]
pub struct VectorizeParams {
    /// Minimum confidence level a pixel needs to join the mask.
    pub min_confidence: u8,
    /// Polygons below this area are dropped.
    pub min_area_ha: f64,
    pub connectivity: Connectivity,
}

impl Default for VectorizeParams {
    fn default() -> Self {
        Self {
            min_confidence: 1,
            min_area_ha: 1.0,
            connectivity: Connectivity::Four,
        }
    }
}

/// Vectorize a confidence grid into an alert collection.
///
/// A scene with no alert pixels, or none surviving the area filter,
/// yields an empty collection; that is a valid result, not an error.
pub fn vectorize_alerts(
    confidence: &Raster<u8>,
    params: &VectorizeParams,
) -> Result<AlertCollection> {
    if params.min_confidence == 0 {
        return Err(Error::InvalidParameter {
            name: "min_confidence",
            value: "0".into(),
            reason: "level 0 means no alert".into(),
        });
    }

    let (rows, cols) = confidence.shape();
    let components = label_components(confidence, params.min_confidence, params.connectivity);

    let mut collection = AlertCollection::new(confidence.crs().cloned());
    let transform = confidence.transform();

    for component in &components {
        let rings = trace_rings(&component.pixels, rows, cols);
        let geometry = rings_to_multipolygon(rings, |x, y| {
            let (gx, gy) = transform.apply(x as f64, y as f64);
            Coord { x: gx, y: gy }
        });

        let area_ha = geometry.unsigned_area() / 10_000.0;
        if area_ha < params.min_area_ha {
            continue;
        }

        let level = max_confidence_in_bbox(confidence, component);
        let confidence_level = Confidence::from_level(level).unwrap_or(Confidence::Low);

        collection.push(Alert {
            geometry,
            area_ha: (area_ha * 100.0).round() / 100.0,
            confidence: confidence_level,
            detection_date: None,
        });
    }

    tracing::info!(
        polygons = collection.len(),
        components = components.len(),
        "alert vectorization complete"
    );
    Ok(collection)
}

struct Component {
    pixels: Vec<(usize, usize)>,
    r0: usize,
    r1: usize,
    c0: usize,
    c1: usize,
}

fn label_components(
    confidence: &Raster<u8>,
    min_confidence: u8,
    connectivity: Connectivity,
) -> Vec<Component> {
    let (rows, cols) = confidence.shape();
    let mut visited = vec![false; rows * cols];
    let mut components = Vec::new();

    let offsets_4: &[(i64, i64)] = &[(-1, 0), (1, 0), (0, -1), (0, 1)];
    let offsets_8: &[(i64, i64)] = &[
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, -1),
        (0, 1),
        (1, -1),
        (1, 0),
        (1, 1),
    ];
    let offsets = match connectivity {
        Connectivity::Four => offsets_4,
        Connectivity::Eight => offsets_8,
    };

    let in_mask = |r: usize, c: usize| unsafe { confidence.get_unchecked(r, c) } >= min_confidence;

    for row in 0..rows {
        for col in 0..cols {
            if visited[row * cols + col] || !in_mask(row, col) {
                continue;
            }

            let mut pixels = Vec::new();
            let mut stack = vec![(row, col)];
            visited[row * cols + col] = true;
            let (mut r0, mut r1, mut c0, mut c1) = (row, row, col, col);

            while let Some((r, c)) = stack.pop() {
                pixels.push((r, c));
                r0 = r0.min(r);
                r1 = r1.max(r);
                c0 = c0.min(c);
                c1 = c1.max(c);

                for (dr, dc) in offsets {
                    let nr = r as i64 + dr;
                    let nc = c as i64 + dc;
                    if nr < 0 || nc < 0 || nr >= rows as i64 || nc >= cols as i64 {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    if !visited[nr * cols + nc] && in_mask(nr, nc) {
                        visited[nr * cols + nc] = true;
                        stack.push((nr, nc));
                    }
                }
            }

            components.push(Component {
                pixels,
                r0,
                r1,
                c0,
                c1,
            });
        }
    }

    components
}

fn max_confidence_in_bbox(confidence: &Raster<u8>, component: &Component) -> u8 {
    let mut max = 0u8;
    for r in component.r0..=component.r1 {
        for c in component.c0..=component.c1 {
            max = max.max(unsafe { confidence.get_unchecked(r, c) });
        }
    }
    max
}

/// A closed ring of pixel-corner coordinates (x = col, y = row).
type PixelRing = Vec<(i64, i64)>;

/// Trace the boundary of a component as directed edges on pixel corners.
///
/// Each boundary edge keeps the component interior on its right in the
/// row-down pixel frame, so exterior rings come out with positive
/// shoelace area and holes negative.
fn trace_rings(pixels: &[(usize, usize)], rows: usize, cols: usize) -> Vec<PixelRing> {
    let mut member = vec![false; rows * cols];
    for &(r, c) in pixels {
        member[r * cols + c] = true;
    }
    let is_member = |r: i64, c: i64| {
        r >= 0 && c >= 0 && r < rows as i64 && c < cols as i64 && member[r as usize * cols + c as usize]
    };

    // start corner -> outgoing end corners
    let mut edges: BTreeMap<(i64, i64), Vec<(i64, i64)>> = BTreeMap::new();
    for &(r, c) in pixels {
        let (r, c) = (r as i64, c as i64);
        // top, right, bottom, left; absent neighbor exposes the edge
        let candidates = [
            (!is_member(r - 1, c), (c, r), (c + 1, r)),
            (!is_member(r, c + 1), (c + 1, r), (c + 1, r + 1)),
            (!is_member(r + 1, c), (c + 1, r + 1), (c, r + 1)),
            (!is_member(r, c - 1), (c, r + 1), (c, r)),
        ];
        for (exposed, start, end) in candidates {
            if exposed {
                edges.entry(start).or_default().push(end);
            }
        }
    }

    let mut rings = Vec::new();
    loop {
        // take the lexicographically first remaining edge
        let Some((&start, _)) = edges.iter().find(|(_, ends)| !ends.is_empty()) else {
            break;
        };
        let mut ring = vec![start];
        let mut current = start;
        let mut dir = (0i64, 0i64);

        loop {
            // every exposed edge belongs to exactly one closed cycle
            let Some(ends) = edges.get_mut(&current).filter(|e| !e.is_empty()) else {
                break;
            };
            let next = if ends.len() == 1 || dir == (0, 0) {
                ends.remove(0)
            } else {
                // at a pinch corner, prefer the clockwise turn so rings
                // stay simple
                let preferred = [rot_cw(dir), dir, rot_ccw(dir)];
                let mut pick = 0;
                'outer: for want in preferred {
                    for (i, end) in ends.iter().enumerate() {
                        let d = (end.0 - current.0, end.1 - current.1);
                        if d == want {
                            pick = i;
                            break 'outer;
                        }
                    }
                }
                ends.remove(pick)
            };

            dir = (next.0 - current.0, next.1 - current.1);
            ring.push(next);
            current = next;
            if current == start {
                break;
            }
        }

        rings.push(ring);
    }

    rings
}

fn rot_cw(d: (i64, i64)) -> (i64, i64) {
    (-d.1, d.0)
}

fn rot_ccw(d: (i64, i64)) -> (i64, i64) {
    (d.1, -d.0)
}

fn shoelace(ring: &PixelRing) -> f64 {
    let mut sum = 0.0;
    for w in ring.windows(2) {
        sum += (w[0].0 * w[1].1 - w[1].0 * w[0].1) as f64;
    }
    sum / 2.0
}

fn rings_to_multipolygon<F>(rings: Vec<PixelRing>, to_geo: F) -> MultiPolygon<f64>
where
    F: Fn(i64, i64) -> Coord<f64>,
{
    let mut exteriors: Vec<(PixelRing, (i64, i64, i64, i64))> = Vec::new();
    let mut holes: Vec<(PixelRing, (i64, i64, i64, i64))> = Vec::new();

    for ring in rings {
        let bbox = ring_bbox(&ring);
        if shoelace(&ring) > 0.0 {
            exteriors.push((ring, bbox));
        } else {
            holes.push((ring, bbox));
        }
    }

    let to_linestring = |ring: &PixelRing| -> LineString<f64> {
        LineString::from(
            ring.iter()
                .map(|&(x, y)| to_geo(x, y))
                .collect::<Vec<Coord<f64>>>(),
        )
    };

    let mut polygons: Vec<(Polygon<f64>, (i64, i64, i64, i64))> = Vec::new();
    for (ring, bbox) in &exteriors {
        polygons.push((Polygon::new(to_linestring(ring), Vec::new()), *bbox));
    }

    // 8-connected components can produce several exterior rings; assign
    // each hole to the first exterior whose pixel bbox contains it
    for (hole, hb) in &holes {
        for (polygon, eb) in polygons.iter_mut() {
            if hb.0 >= eb.0 && hb.1 >= eb.1 && hb.2 <= eb.2 && hb.3 <= eb.3 {
                polygon.interiors_push(to_linestring(hole));
                break;
            }
        }
    }

    MultiPolygon::new(polygons.into_iter().map(|(p, _)| p).collect())
}

fn ring_bbox(ring: &PixelRing) -> (i64, i64, i64, i64) {
    let mut min_x = i64::MAX;
    let mut min_y = i64::MAX;
    let mut max_x = i64::MIN;
    let mut max_y = i64::MIN;
    for &(x, y) in ring {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }
    (min_x, min_y, max_x, max_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigia_core::GeoTransform;

    /// 10 m pixels, so one pixel is 0.01 ha and a 10x10 block is 1 ha.
    fn confidence_grid(rows: usize, cols: usize) -> Raster<u8> {
        let mut grid: Raster<u8> = Raster::new(rows, cols);
        grid.set_transform(GeoTransform::new(500_000.0, 9_200_000.0, 10.0, -10.0));
        grid
    }

    fn fill_block(grid: &mut Raster<u8>, r0: usize, r1: usize, c0: usize, c1: usize, level: u8) {
        for r in r0..r1 {
            for c in c0..c1 {
                grid.set(r, c, level).unwrap();
            }
        }
    }

    #[test]
    fn test_empty_grid_yields_empty_collection() {
        let grid = confidence_grid(20, 20);
        let alerts = vectorize_alerts(&grid, &VectorizeParams::default()).unwrap();
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_block_becomes_one_polygon() {
        let mut grid = confidence_grid(30, 30);
        fill_block(&mut grid, 5, 17, 5, 17, 2);

        let alerts = vectorize_alerts(&grid, &VectorizeParams::default()).unwrap();
        assert_eq!(alerts.len(), 1);

        let alert = &alerts.alerts[0];
        // 12x12 pixels of 100 m2 = 1.44 ha
        assert!((alert.area_ha - 1.44).abs() < 1e-9);
        assert_eq!(alert.confidence, Confidence::Medium);
    }

    #[test]
    fn test_min_area_filter() {
        let mut grid = confidence_grid(30, 30);
        // 3x3 pixels = 0.09 ha, below the 1 ha default
        fill_block(&mut grid, 5, 8, 5, 8, 3);

        let alerts = vectorize_alerts(&grid, &VectorizeParams::default()).unwrap();
        assert!(alerts.is_empty());

        let relaxed = VectorizeParams {
            min_area_ha: 0.05,
            ..VectorizeParams::default()
        };
        let alerts = vectorize_alerts(&grid, &relaxed).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts.alerts[0].confidence, Confidence::High);
    }

    #[test]
    fn test_min_confidence_threshold() {
        let mut grid = confidence_grid(30, 30);
        fill_block(&mut grid, 5, 17, 5, 17, 1);

        let strict = VectorizeParams {
            min_confidence: 2,
            ..VectorizeParams::default()
        };
        assert!(vectorize_alerts(&grid, &strict).unwrap().is_empty());
        assert_eq!(vectorize_alerts(&grid, &VectorizeParams::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_zero_min_confidence_rejected() {
        let grid = confidence_grid(5, 5);
        let bad = VectorizeParams {
            min_confidence: 0,
            ..VectorizeParams::default()
        };
        assert!(vectorize_alerts(&grid, &bad).is_err());
    }

    #[test]
    fn test_separate_components_separate_polygons() {
        let mut grid = confidence_grid(40, 40);
        fill_block(&mut grid, 2, 14, 2, 14, 1);
        fill_block(&mut grid, 20, 32, 20, 32, 3);

        let alerts = vectorize_alerts(&grid, &VectorizeParams::default()).unwrap();
        assert_eq!(alerts.len(), 2);
    }

    #[test]
    fn test_polygon_confidence_is_component_max() {
        let mut grid = confidence_grid(30, 30);
        fill_block(&mut grid, 5, 17, 5, 17, 1);
        // a single high pixel inside the block lifts the whole polygon
        grid.set(10, 10, 3).unwrap();

        let alerts = vectorize_alerts(&grid, &VectorizeParams::default()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts.alerts[0].confidence, Confidence::High);
    }

    #[test]
    fn test_hole_preserved() {
        let mut grid = confidence_grid(40, 40);
        fill_block(&mut grid, 5, 25, 5, 25, 2);
        // carve out an interior hole
        fill_block(&mut grid, 12, 18, 12, 18, 0);

        let alerts = vectorize_alerts(&grid, &VectorizeParams::default()).unwrap();
        assert_eq!(alerts.len(), 1);

        let polygon = &alerts.alerts[0].geometry.0[0];
        assert_eq!(polygon.interiors().len(), 1);
        // 400 pixels minus 36 hole pixels, at 0.01 ha each
        assert!((alerts.alerts[0].area_ha - 3.64).abs() < 1e-9);
    }

    #[test]
    fn test_diagonal_pixels_split_under_four_connectivity() {
        let mut grid = confidence_grid(20, 20);
        grid.set(5, 5, 2).unwrap();
        grid.set(6, 6, 2).unwrap();

        let params = VectorizeParams {
            min_area_ha: 0.0,
            ..VectorizeParams::default()
        };
        let four = vectorize_alerts(&grid, &params).unwrap();
        assert_eq!(four.len(), 2);

        let eight = vectorize_alerts(
            &grid,
            &VectorizeParams {
                connectivity: Connectivity::Eight,
                ..params
            },
        )
        .unwrap();
        // one component, two exterior rings in its multipolygon
        assert_eq!(eight.len(), 1);
        assert_eq!(eight.alerts[0].geometry.0.len(), 2);
    }

    #[test]
    fn test_geometry_is_georeferenced() {
        let mut grid = confidence_grid(30, 30);
        fill_block(&mut grid, 0, 12, 0, 12, 2);

        let alerts = vectorize_alerts(&grid, &VectorizeParams::default()).unwrap();
        let polygon = &alerts.alerts[0].geometry.0[0];
        let first = polygon.exterior().0[0];
        // corner (0, 0) maps to the raster origin
        assert_eq!(first.x, 500_000.0);
        assert_eq!(first.y, 9_200_000.0);
    }
}

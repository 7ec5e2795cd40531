use geo_types::Coord;
use shared::Coordinate;

/// Default tolerance, in degrees of the (lng, lat) plane.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Reduce the number of points while staying within `tolerance` of the original shape.
///
/// Douglas–Peucker on the planar (lng, lat) path. The first and last points always
/// survive. Segments are processed from an explicit work list, so long tracks cannot
/// exhaust the call stack.
///
/// # Elevation
/// Surviving point `i` of `m` takes the elevation of original index
/// `round(i * (n - 1) / (m - 1))`, not the elevation of its own kept index. Stored
/// simplified tracks were produced with this mapping and stay comparable with new ones.
/// It can pick a neighbour's elevation when many points are dropped.
pub fn simplify_route(points: &[Coordinate], tolerance: f64) -> Vec<Coordinate> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let path: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord { x: p.lng, y: p.lat })
        .collect();

    let mut keep = vec![false; path.len()];
    keep[0] = true;
    keep[path.len() - 1] = true;
    mark_kept(&path, tolerance, &mut keep);

    let kept: Vec<Coord<f64>> = path
        .iter()
        .zip(&keep)
        .filter_map(|(coord, kept)| kept.then_some(*coord))
        .collect();

    let last_original = points.len() - 1;
    let last_kept = (kept.len() - 1).max(1);
    kept.iter()
        .enumerate()
        .map(|(i, coord)| {
            let source = ((i * last_original) as f64 / last_kept as f64).round() as usize;
            Coordinate {
                lat: coord.y,
                lng: coord.x,
                elevation: points[source.min(last_original)].elevation,
            }
        })
        .collect()
}

fn mark_kept(path: &[Coord<f64>], tolerance: f64, keep: &mut [bool]) {
    let mut segments = vec![(0, path.len() - 1)];

    while let Some((first, last)) = segments.pop() {
        if last <= first + 1 {
            continue;
        }

        let (mut max_distance, mut max_index) = (0.0, first);
        for idx in first + 1..last {
            let distance = perpendicular_distance(path[idx], path[first], path[last]);
            if distance > max_distance {
                max_distance = distance;
                max_index = idx;
            }
        }

        if max_distance < tolerance || max_index == first {
            continue;
        }

        keep[max_index] = true;
        segments.push((max_index, last));
        segments.push((first, max_index));
    }
}

/// Distance from `point` to the segment `start`-`end`, or to `start` when the segment
/// is degenerate.
fn perpendicular_distance(point: Coord<f64>, start: Coord<f64>, end: Coord<f64>) -> f64 {
    let d = end - start;
    let len_sq = d.x * d.x + d.y * d.y;

    if len_sq < 1e-20 {
        let off = point - start;
        return (off.x * off.x + off.y * off.y).sqrt();
    }

    let cross = d.x * (start.y - point.y) - d.y * (start.x - point.x);
    cross.abs() / len_sq.sqrt()
}

use shared::{Coordinate, ProfilePoint, RouteAnalysis};

use crate::geometry::{bounding_box, haversine_km, round_to};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("route analysis needs at least 2 points, got {0}")]
    InsufficientPoints(usize),
}

/// Aggregate distance, elevation and extent statistics for a track.
///
/// # Distance
/// Sum of haversine legs between consecutive points in input order, rounded to 2 decimals.
///
/// # Elevation
/// Only pairs where both points carry an elevation (see [`Coordinate::elevation_m`])
/// contribute. Positive deltas add to the gain, negative deltas to the loss, and both totals
/// are rounded to whole meters after accumulation.
pub fn analyze_route(points: &[Coordinate]) -> Result<RouteAnalysis, AnalysisError> {
    if points.len() < 2 {
        return Err(AnalysisError::InsufficientPoints(points.len()));
    }

    let mut distance_km = 0.0;
    let mut gain = 0.0;
    let mut loss = 0.0;

    for pair in points.windows(2) {
        distance_km += haversine_km(&pair[0], &pair[1]);

        if let (Some(prev), Some(curr)) = (pair[0].elevation_m(), pair[1].elevation_m()) {
            let delta = curr - prev;
            if delta > 0.0 {
                gain += delta;
            } else {
                loss += delta.abs();
            }
        }
    }

    let bounding_box =
        bounding_box(points).ok_or(AnalysisError::InsufficientPoints(points.len()))?;

    Ok(RouteAnalysis {
        total_distance_km: round_to(distance_km, 2),
        elevation_gain_m: gain.round() as i64,
        elevation_loss_m: loss.round() as i64,
        bounding_box,
    })
}

/// Cumulative distance against elevation, one entry per input point.
pub fn elevation_profile(points: &[Coordinate]) -> Vec<ProfilePoint> {
    let mut cumulative_km = 0.0;
    let mut profile = Vec::with_capacity(points.len());

    for (idx, point) in points.iter().enumerate() {
        if idx > 0 {
            cumulative_km += haversine_km(&points[idx - 1], point);
        }
        profile.push(ProfilePoint {
            cumulative_distance_km: cumulative_km,
            elevation_m: point.elevation_m().unwrap_or(0.0),
        });
    }

    profile
}

use shared::{Coordinate, SplitSuggestion};

use crate::analysis::analyze_route;
use crate::geometry::haversine_km;

/// Fraction of the per-day target at which a split is suggested.
const SPLIT_THRESHOLD: f64 = 0.9;

/// Suggest where to end each day of a multi-day trip.
///
/// Greedy single pass: walk the track accumulating leg distance and emit a split at the
/// first point where the running total reaches 90% of `total / target_days`. Never emits
/// more than `target_days - 1` splits, and returns nothing when `target_days <= 1` or
/// the track has fewer than two points per day.
pub fn suggest_day_splits(points: &[Coordinate], target_days: usize) -> Vec<SplitSuggestion> {
    if target_days <= 1 || points.len() < target_days.saturating_mul(2) {
        return Vec::new();
    }

    let Ok(route) = analyze_route(points) else {
        return Vec::new();
    };
    let target_per_day = route.total_distance_km / target_days as f64;
    let max_splits = target_days - 1;

    let mut splits = Vec::with_capacity(max_splits);
    let mut accumulated_km = 0.0;
    let mut segment_start = 0;

    for idx in 1..points.len() {
        if splits.len() >= max_splits {
            break;
        }
        accumulated_km += haversine_km(&points[idx - 1], &points[idx]);

        if accumulated_km >= target_per_day * SPLIT_THRESHOLD {
            let day = splits.len() + 1;
            let Ok(segment) = analyze_route(&points[segment_start..=idx]) else {
                continue;
            };
            tracing::debug!(
                "day {} ends at point {} after {:.2} km",
                day,
                idx,
                segment.total_distance_km
            );
            splits.push(SplitSuggestion {
                split_index: idx,
                coordinate: points[idx],
                reason: format!("Day {} → Day {}", day, day + 1),
                distance_km: segment.total_distance_km,
                elevation_gain_m: segment.elevation_gain_m,
            });
            accumulated_km = 0.0;
            segment_start = idx;
        }
    }

    splits
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `n` points 0.1 degrees apart along the equator, climbing 10 m per point.
    fn equator_track(n: usize) -> Vec<Coordinate> {
        (0..n)
            .map(|i| Coordinate::with_elevation(0.0, i as f64 * 0.1, 100.0 + 10.0 * i as f64))
            .collect()
    }

    #[test]
    fn single_day_or_less_yields_nothing() {
        let track = equator_track(20);
        assert!(suggest_day_splits(&track, 0).is_empty());
        assert!(suggest_day_splits(&track, 1).is_empty());
    }

    #[test]
    fn too_few_points_for_requested_days() {
        let track = equator_track(5);
        assert!(suggest_day_splits(&track, 3).is_empty());
        assert_eq!(suggest_day_splits(&track, 2).len(), 1);
    }

    #[test]
    fn three_days_split_evenly() {
        let track = equator_track(10);
        let splits = suggest_day_splits(&track, 3);

        let indices: Vec<usize> = splits.iter().map(|s| s.split_index).collect();
        assert_eq!(indices, vec![3, 6]);
        assert_eq!(splits[0].reason, "Day 1 → Day 2");
        assert_eq!(splits[1].reason, "Day 2 → Day 3");
        assert_eq!(splits[0].coordinate, track[3]);

        let leg = analyze_route(&track[0..=3]).unwrap().total_distance_km;
        assert_eq!(splits[0].distance_km, leg);
        assert_eq!(splits[0].elevation_gain_m, 30);
        assert_eq!(splits[1].elevation_gain_m, 30);
    }

    #[test]
    fn split_distances_reset_between_days() {
        let track = equator_track(12);
        let splits = suggest_day_splits(&track, 4);
        assert_eq!(splits.len(), 3);
        for split in &splits {
            assert!(split.distance_km > 0.0);
            assert!(split.distance_km < analyze_route(&track).unwrap().total_distance_km / 2.0);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn coord() -> impl Strategy<Value = Coordinate> {
            (-10.0..10.0f64, -10.0..10.0f64).prop_map(|(lat, lng)| Coordinate::new(lat, lng))
        }

        proptest! {
            #[test]
            fn prop_never_over_splits(
                points in prop::collection::vec(coord(), 0..80),
                days in 0usize..12
            ) {
                let splits = suggest_day_splits(&points, days);
                prop_assert!(splits.len() <= days.saturating_sub(1));
                for pair in splits.windows(2) {
                    prop_assert!(pair[1].split_index > pair[0].split_index);
                }
            }
        }
    }
}

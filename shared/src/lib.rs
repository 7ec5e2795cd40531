use serde::{Deserialize, Serialize};

/// A recorded position along a route.
///
/// `elevation` is `None` when the track file carried no `<ele>` value. An elevation of
/// exactly `0.0` is treated the same way by every consumer (see [`Coordinate::elevation_m`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            elevation: None,
        }
    }

    pub fn with_elevation(lat: f64, lng: f64, elevation: f64) -> Self {
        Self {
            lat,
            lng,
            elevation: Some(elevation),
        }
    }

    /// Usable elevation in meters, `None` when absent, zero or not finite.
    pub fn elevation_m(&self) -> Option<f64> {
        self.elevation.filter(|e| e.is_finite() && *e != 0.0)
    }

    pub fn needs_elevation(&self) -> bool {
        self.elevation_m().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub center: LatLng,
    pub radius_km: f64,
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteAnalysis {
    pub total_distance_km: f64,
    pub elevation_gain_m: i64,
    pub elevation_loss_m: i64,
    pub bounding_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSuggestion {
    pub split_index: usize,
    pub coordinate: Coordinate,
    pub reason: String,
    pub distance_km: f64,
    pub elevation_gain_m: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfilePoint {
    pub cumulative_distance_km: f64,
    pub elevation_m: f64,
}

/// Body returned by the track file upload endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub trackpoints: Vec<Coordinate>,
    pub waypoints: Vec<Waypoint>,
    pub has_elevation_data: bool,
    pub needs_elevation_fetch: bool,
    pub analysis: RouteAnalysis,
    pub profile: Vec<ProfilePoint>,
    pub simplified: Vec<Coordinate>,
    #[serde(default)]
    pub day_splits: Vec<SplitSuggestion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaySplitRequest {
    pub points: Vec<Coordinate>,
    pub target_days: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimplifyRequest {
    pub points: Vec<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

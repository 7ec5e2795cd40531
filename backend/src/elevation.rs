use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::Coordinate;
use tokio::task::JoinSet;

/// Per-call cap of the public Open-Elevation API.
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    #[error("elevation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("elevation service returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("elevation service returned {got} results for {expected} locations")]
    CountMismatch { expected: usize, got: usize },
    #[error("elevation batch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&Coordinate> for Location {
    fn from(coord: &Coordinate) -> Self {
        Self {
            latitude: coord.lat,
            longitude: coord.lng,
        }
    }
}

/// Source of elevation values for a batch of locations.
///
/// Results are aligned by index with the request. `None` marks a location the service
/// could not resolve.
#[async_trait]
pub trait ElevationLookup: Send + Sync {
    async fn lookup(&self, locations: &[Location]) -> Result<Vec<Option<f64>>, ElevationError>;
}

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    locations: &'a [Location],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    results: Vec<LookupResult>,
}

#[derive(Debug, Deserialize)]
struct LookupResult {
    elevation: Option<f64>,
}

/// Client for services speaking the Open-Elevation `POST /api/v1/lookup` format.
#[derive(Clone)]
pub struct OpenElevationClient {
    client: reqwest::Client,
    url: String,
}

impl OpenElevationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ElevationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ElevationLookup for OpenElevationClient {
    async fn lookup(&self, locations: &[Location]) -> Result<Vec<Option<f64>>, ElevationError> {
        let response = self
            .client
            .post(&self.url)
            .json(&LookupRequest { locations })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ElevationError::Status(response.status()));
        }

        let body: LookupResponse = response.json().await?;
        if body.results.len() != locations.len() {
            return Err(ElevationError::CountMismatch {
                expected: locations.len(),
                got: body.results.len(),
            });
        }

        Ok(body.results.into_iter().map(|r| r.elevation).collect())
    }
}

/// Fill missing elevations from `lookup`, batching requests by `batch_size`.
///
/// All batches run concurrently and are awaited as a group. If any batch fails the
/// input is returned untouched; this function never reports an error to the caller.
/// Merging is keyed on the exact `(lat, lng)` bits and never replaces a nonzero
/// elevation that was already present.
pub async fn backfill_elevation(
    lookup: Arc<dyn ElevationLookup>,
    points: Vec<Coordinate>,
    batch_size: usize,
) -> Vec<Coordinate> {
    let missing: Vec<Location> = points
        .iter()
        .filter(|p| p.needs_elevation())
        .map(Location::from)
        .collect();

    if missing.is_empty() {
        return points;
    }

    let batches: Vec<Vec<Location>> = missing
        .chunks(batch_size.max(1))
        .map(<[Location]>::to_vec)
        .collect();
    let batch_count = batches.len();
    tracing::info!(
        "Backfilling elevation for {} points in {} batch(es)",
        missing.len(),
        batch_count
    );

    let mut tasks = JoinSet::new();
    for (idx, batch) in batches.into_iter().enumerate() {
        let lookup = Arc::clone(&lookup);
        tasks.spawn(async move {
            let result = lookup.lookup(&batch).await;
            (idx, batch, result)
        });
    }

    let mut resolved: HashMap<(u64, u64), f64> = HashMap::with_capacity(missing.len());
    let mut failures = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, batch, Ok(elevations))) => {
                if elevations.len() != batch.len() {
                    failures.push(ElevationError::CountMismatch {
                        expected: batch.len(),
                        got: elevations.len(),
                    });
                    continue;
                }
                tracing::debug!("elevation batch {}/{} resolved", idx + 1, batch_count);
                for (location, elevation) in batch.iter().zip(elevations) {
                    if let Some(value) = elevation.filter(|v| v.is_finite()) {
                        resolved.insert(location_key(location.latitude, location.longitude), value);
                    }
                }
            }
            Ok((idx, _, Err(err))) => {
                tracing::debug!("elevation batch {}/{} failed: {}", idx + 1, batch_count, err);
                failures.push(err);
            }
            Err(join_err) => failures.push(ElevationError::Task(join_err)),
        }
    }

    if let Some(first) = failures.first() {
        tracing::warn!(
            "Elevation backfill skipped: {} of {} batch(es) failed (first error: {})",
            failures.len(),
            batch_count,
            first
        );
        return points;
    }

    points
        .into_iter()
        .map(|mut point| {
            if point.needs_elevation() {
                if let Some(value) = resolved.get(&location_key(point.lat, point.lng)) {
                    point.elevation = Some(*value);
                }
            }
            point
        })
        .collect()
}

fn location_key(lat: f64, lng: f64) -> (u64, u64) {
    (lat.to_bits(), lng.to_bits())
}

/// Linearly interpolate the elevation at `index` from the closest points on either side
/// that carry elevation, weighted by index distance.
///
/// Returns the point's own elevation when present and `0.0` when no bracketing pair exists.
pub fn interpolate_elevation(points: &[Coordinate], index: usize) -> f64 {
    let Some(point) = points.get(index) else {
        return 0.0;
    };
    if let Some(elevation) = point.elevation_m() {
        return elevation;
    }

    let before = points[..index]
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, p)| p.elevation_m().map(|e| (i, e)));
    let after = points[index + 1..]
        .iter()
        .enumerate()
        .find_map(|(offset, p)| p.elevation_m().map(|e| (index + 1 + offset, e)));

    match (before, after) {
        (Some((i0, e0)), Some((i1, e1))) => {
            let t = (index - i0) as f64 / (i1 - i0) as f64;
            e0 + (e1 - e0) * t
        }
        _ => 0.0,
    }
}

/// Apply [`interpolate_elevation`] to every point lacking elevation.
///
/// Interpolation always reads the input values, so filled points never feed later ones.
pub fn interpolate_missing(points: &[Coordinate]) -> Vec<Coordinate> {
    points
        .iter()
        .enumerate()
        .map(|(idx, point)| {
            if point.needs_elevation() {
                Coordinate {
                    elevation: Some(interpolate_elevation(points, idx)),
                    ..*point
                }
            } else {
                *point
            }
        })
        .collect()
}

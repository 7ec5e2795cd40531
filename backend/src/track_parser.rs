use shared::{Coordinate, Waypoint};

use crate::geometry::is_valid_position;

#[derive(Debug, thiserror::Error)]
pub enum TrackParseError {
    #[error("track file is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("track file is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("malformed track file: {0}")]
    Malformed(#[from] gpx::errors::GpxError),
    #[error("track point {index} has an invalid position ({lat}, {lng})")]
    InvalidCoordinate { index: usize, lat: f64, lng: f64 },
    #[error("track file contains no track points")]
    EmptyTrack,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTrack {
    pub trackpoints: Vec<Coordinate>,
    pub waypoints: Vec<Waypoint>,
}

impl ParsedTrack {
    /// True when at least one trackpoint carries a nonzero elevation.
    pub fn has_elevation_data(&self) -> bool {
        has_elevation_data(&self.trackpoints)
    }
}

pub fn has_elevation_data(points: &[Coordinate]) -> bool {
    points.iter().any(|p| p.elevation_m().is_some())
}

/// Parse the raw bytes of a GPX upload.
///
/// Track points are collected from every track and segment in document order. Standalone
/// `<wpt>` elements become [`Waypoint`]s; route points (`<rte>`) are ignored.
pub fn parse_track(content: &[u8], max_bytes: usize) -> Result<ParsedTrack, TrackParseError> {
    if content.len() > max_bytes {
        return Err(TrackParseError::TooLarge {
            size: content.len(),
            max: max_bytes,
        });
    }

    let text = std::str::from_utf8(content)?;
    let document = gpx::read(text.as_bytes())?;

    let trackpoints: Vec<Coordinate> = document
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .map(to_coordinate)
        .collect();

    if let Some((index, bad)) = trackpoints
        .iter()
        .enumerate()
        .find(|(_, c)| !is_valid_position(c.lat, c.lng))
    {
        return Err(TrackParseError::InvalidCoordinate {
            index,
            lat: bad.lat,
            lng: bad.lng,
        });
    }

    if trackpoints.is_empty() {
        return Err(TrackParseError::EmptyTrack);
    }

    let waypoints = document
        .waypoints
        .iter()
        .filter(|wpt| {
            let point = wpt.point();
            is_valid_position(point.y(), point.x())
        })
        .map(|wpt| Waypoint {
            name: wpt
                .name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            description: wpt
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            coordinate: to_coordinate(wpt),
        })
        .collect();

    let parsed = ParsedTrack {
        trackpoints,
        waypoints,
    };
    tracing::debug!(
        "parsed track: {} points, {} waypoints, elevation={}",
        parsed.trackpoints.len(),
        parsed.waypoints.len(),
        parsed.has_elevation_data()
    );
    Ok(parsed)
}

/// Non-finite `<ele>` values are treated as absent.
fn to_coordinate(point: &gpx::Waypoint) -> Coordinate {
    let position = point.point();
    Coordinate {
        lat: position.y(),
        lng: position.x(),
        elevation: point.elevation.filter(|e| e.is_finite()),
    }
}

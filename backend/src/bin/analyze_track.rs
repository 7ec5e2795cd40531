use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use shared::{Coordinate, ProfilePoint, RouteAnalysis, SplitSuggestion, Waypoint};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trail_backend::{
    analysis::{analyze_route, elevation_profile},
    config::DEFAULT_ELEVATION_API_URL,
    day_split::suggest_day_splits,
    elevation::{backfill_elevation, interpolate_missing, OpenElevationClient, DEFAULT_BATCH_SIZE},
    simplify::simplify_route,
    track_parser::{has_elevation_data, parse_track},
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Analyze a GPX track: distance, elevation, simplification and day splits"
)]
struct Args {
    /// Path to the GPX file
    gpx: PathBuf,

    /// Douglas-Peucker tolerance in degrees; prints the simplified track when set
    #[arg(long)]
    tolerance: Option<f64>,

    /// Suggest split points for a trip of this many days
    #[arg(long)]
    days: Option<usize>,

    /// Look up missing elevations from the elevation service
    #[arg(long)]
    backfill: bool,

    #[arg(long, default_value = DEFAULT_ELEVATION_API_URL)]
    elevation_url: String,

    /// Fill remaining elevation gaps by linear interpolation between known points
    #[arg(long)]
    interpolate: bool,

    /// Include the per-point elevation profile
    #[arg(long)]
    profile: bool,

    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    max_bytes: usize,
}

#[derive(Serialize)]
struct TrackReport {
    points: usize,
    has_elevation_data: bool,
    analysis: RouteAnalysis,
    waypoints: Vec<Waypoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    simplified: Option<Vec<Coordinate>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    day_splits: Vec<SplitSuggestion>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    profile: Vec<ProfilePoint>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let content = tokio::fs::read(&args.gpx).await?;
    let parsed = parse_track(&content, args.max_bytes)?;
    tracing::info!(
        "read {} track points and {} waypoints from {:?}",
        parsed.trackpoints.len(),
        parsed.waypoints.len(),
        args.gpx
    );

    let mut points = parsed.trackpoints;
    if args.backfill && !has_elevation_data(&points) {
        let client = OpenElevationClient::new(args.elevation_url.as_str(), Duration::from_secs(10))?;
        points = backfill_elevation(Arc::new(client), points, DEFAULT_BATCH_SIZE).await;
    }
    if args.interpolate {
        points = interpolate_missing(&points);
    }

    let report = TrackReport {
        points: points.len(),
        has_elevation_data: has_elevation_data(&points),
        analysis: analyze_route(&points)?,
        waypoints: parsed.waypoints,
        simplified: args.tolerance.map(|tolerance| simplify_route(&points, tolerance)),
        day_splits: args
            .days
            .map(|days| suggest_day_splits(&points, days))
            .unwrap_or_default(),
        profile: if args.profile {
            elevation_profile(&points)
        } else {
            Vec::new()
        },
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

//! Upload pipeline for track files: authorize, parse, analyze, backfill, persist.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::IngestResponse;

use crate::analysis::{analyze_route, elevation_profile};
use crate::auth::Authorizer;
use crate::config::Config;
use crate::database::{TrackFileRecord, TrackFileRepository};
use crate::day_split::suggest_day_splits;
use crate::elevation::{backfill_elevation, ElevationLookup, DEFAULT_BATCH_SIZE};
use crate::error::IngestError;
use crate::rate_limit::UploadLimiter;
use crate::simplify::{simplify_route, DEFAULT_TOLERANCE};
use crate::storage::{object_path, ObjectStore};
use crate::track_parser::{has_elevation_data, parse_track};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestSettings {
    pub max_upload_bytes: usize,
    pub elevation_batch_size: usize,
    pub simplify_tolerance: f64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: 10 * 1024 * 1024,
            elevation_batch_size: DEFAULT_BATCH_SIZE,
            simplify_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl From<&Config> for IngestSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            elevation_batch_size: config.elevation_batch_size,
            simplify_tolerance: config.simplify_tolerance,
        }
    }
}

/// One uploaded track file, as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub owner_id: String,
    pub filename: String,
    pub content: Vec<u8>,
    pub target_days: Option<usize>,
}

pub struct IngestService {
    authorizer: Arc<dyn Authorizer>,
    store: Arc<dyn ObjectStore>,
    records: Arc<dyn TrackFileRepository>,
    limiter: Arc<dyn UploadLimiter>,
    elevation: Option<Arc<dyn ElevationLookup>>,
    settings: IngestSettings,
}

impl IngestService {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        store: Arc<dyn ObjectStore>,
        records: Arc<dyn TrackFileRepository>,
        limiter: Arc<dyn UploadLimiter>,
    ) -> Self {
        Self {
            authorizer,
            store,
            records,
            limiter,
            elevation: None,
            settings: IngestSettings::default(),
        }
    }

    /// Enable elevation backfill for tracks uploaded without any elevation.
    pub fn with_elevation(mut self, lookup: Arc<dyn ElevationLookup>) -> Self {
        self.elevation = Some(lookup);
        self
    }

    pub fn with_settings(mut self, settings: IngestSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Run the full upload pipeline for `upload` on behalf of `credential`.
    ///
    /// The quota is charged only once the file has parsed and analyzed cleanly, right
    /// before anything is persisted, and is given back if nothing could be kept. If the
    /// record cannot be saved the stored object is removed again; the previous object of
    /// a replaced record is removed best-effort.
    pub async fn ingest(
        &self,
        credential: &str,
        upload: Upload,
    ) -> Result<IngestResponse, IngestError> {
        let owner_id = upload.owner_id.trim();
        if owner_id.is_empty() {
            return Err(IngestError::InvalidRequest("owner_id is required".to_string()));
        }

        let user_id = self.authorizer.authorize(credential, owner_id).await?;

        let parsed = parse_track(&upload.content, self.settings.max_upload_bytes)?;
        let uploaded_with_elevation = parsed.has_elevation_data();
        let waypoints = parsed.waypoints;
        let mut trackpoints = parsed.trackpoints;
        let mut analysis = analyze_route(&trackpoints)?;

        if !uploaded_with_elevation {
            if let Some(lookup) = &self.elevation {
                trackpoints = backfill_elevation(
                    Arc::clone(lookup),
                    trackpoints,
                    self.settings.elevation_batch_size,
                )
                .await;
                if has_elevation_data(&trackpoints) {
                    analysis = analyze_route(&trackpoints)?;
                }
            }
        }

        let uploaded_at = Utc::now();
        self.limiter.acquire(&user_id, uploaded_at).await?;

        let storage_path = object_path(owner_id, &upload.filename, uploaded_at);
        if let Err(err) = self.store.put(&storage_path, &upload.content).await {
            self.refund_upload(&user_id, uploaded_at).await;
            return Err(err.into());
        }

        let record = TrackFileRecord {
            owner_id: owner_id.to_string(),
            original_filename: upload.filename.clone(),
            storage_path: storage_path.clone(),
            total_distance_km: analysis.total_distance_km,
            total_elevation_gain_m: analysis.elevation_gain_m,
            total_points: trackpoints.len() as i64,
            uploaded_at,
        };

        match self.records.upsert(&record).await {
            Ok(Some(previous)) if previous != storage_path => {
                if let Err(err) = self.store.delete(&previous).await {
                    tracing::warn!("could not remove replaced track file {}: {}", previous, err);
                }
            }
            Ok(_) => {}
            Err(err) => {
                if let Err(cleanup) = self.store.delete(&storage_path).await {
                    tracing::error!(
                        "track file {} left behind after failed save: {}",
                        storage_path,
                        cleanup
                    );
                }
                self.refund_upload(&user_id, uploaded_at).await;
                return Err(err.into());
            }
        }

        tracing::info!(
            "ingested {} for {} by {}: {} points, {:.2} km, +{} m",
            upload.filename,
            owner_id,
            user_id,
            trackpoints.len(),
            analysis.total_distance_km,
            analysis.elevation_gain_m
        );

        let day_splits = upload
            .target_days
            .map(|days| suggest_day_splits(&trackpoints, days))
            .unwrap_or_default();

        Ok(IngestResponse {
            needs_elevation_fetch: !has_elevation_data(&trackpoints),
            has_elevation_data: uploaded_with_elevation,
            profile: elevation_profile(&trackpoints),
            simplified: simplify_route(&trackpoints, self.settings.simplify_tolerance),
            day_splits,
            analysis,
            trackpoints,
            waypoints,
        })
    }

    async fn refund_upload(&self, user_id: &str, charged_at: DateTime<Utc>) {
        if let Err(err) = self.limiter.release(user_id, charged_at).await {
            tracing::warn!("could not return upload slot to {}: {}", user_id, err);
        }
    }

    /// Fetch the stored record for `owner_id`, checking ownership first.
    pub async fn record(
        &self,
        credential: &str,
        owner_id: &str,
    ) -> Result<TrackFileRecord, IngestError> {
        self.authorizer.authorize(credential, owner_id).await?;
        Ok(self.records.get(owner_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::auth::StaticAuthorizer;
    use crate::database::{DatabaseError, InMemoryTrackFiles};
    use crate::elevation::{ElevationError, Location};
    use crate::rate_limit::{InMemoryUploadLimiter, UploadQuota};
    use crate::storage::StorageError;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<Vec<String>>,
    }

    impl MemoryStore {
        fn paths(&self) -> Vec<String> {
            self.objects.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put(&self, path: &str, _bytes: &[u8]) -> Result<(), StorageError> {
            self.objects.lock().unwrap().push(path.to_string());
            Ok(())
        }

        async fn delete(&self, path: &str) -> Result<(), StorageError> {
            self.objects.lock().unwrap().retain(|p| p != path);
            Ok(())
        }
    }

    struct BrokenRecords;

    #[async_trait]
    impl TrackFileRepository for BrokenRecords {
        async fn upsert(&self, _: &TrackFileRecord) -> Result<Option<String>, DatabaseError> {
            Err(DatabaseError::InvalidData("disk full".to_string()))
        }

        async fn get(&self, owner_id: &str) -> Result<TrackFileRecord, DatabaseError> {
            Err(DatabaseError::NotFound(owner_id.to_string()))
        }
    }

    struct FixedElevation {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ElevationLookup for FixedElevation {
        async fn lookup(&self, locations: &[Location]) -> Result<Vec<Option<f64>>, ElevationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(locations
                .iter()
                .map(|l| Some(1000.0 + l.latitude * 100.0))
                .collect())
        }
    }

    fn gpx(points: &[(f64, f64, Option<f64>)]) -> Vec<u8> {
        let trkpts: String = points
            .iter()
            .map(|(lat, lon, ele)| match ele {
                Some(e) => format!(r#"<trkpt lat="{lat}" lon="{lon}"><ele>{e}</ele></trkpt>"#),
                None => format!(r#"<trkpt lat="{lat}" lon="{lon}"></trkpt>"#),
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="45.1" lon="6.1"><name> Refuge </name></wpt>
  <trk><trkseg>{trkpts}</trkseg></trk>
</gpx>"#
        )
        .into_bytes()
    }

    fn upload(content: Vec<u8>) -> Upload {
        Upload {
            owner_id: "route-1".to_string(),
            filename: "tour.gpx".to_string(),
            content,
            target_days: None,
        }
    }

    fn service(store: Arc<MemoryStore>, records: Arc<dyn TrackFileRepository>) -> IngestService {
        IngestService::new(
            Arc::new(StaticAuthorizer::new().grant("tok", "guide", "route-1")),
            store,
            records,
            Arc::new(InMemoryUploadLimiter::new(UploadQuota::default())),
        )
    }

    #[tokio::test]
    async fn ingests_and_persists_track() {
        let store = Arc::new(MemoryStore::default());
        let records = Arc::new(InMemoryTrackFiles::new());
        let svc = service(store.clone(), records.clone());

        let content = gpx(&[
            (45.0, 6.0, Some(100.0)),
            (45.01, 6.0, Some(150.0)),
            (45.02, 6.0, Some(120.0)),
        ]);
        let mut request = upload(content);
        request.target_days = Some(1);
        let response = svc.ingest("tok", request).await.unwrap();

        assert!(response.has_elevation_data);
        assert!(!response.needs_elevation_fetch);
        assert_eq!(response.trackpoints.len(), 3);
        assert_eq!(response.waypoints[0].name, "Refuge");
        assert_eq!(response.analysis.elevation_gain_m, 50);
        assert_eq!(response.analysis.elevation_loss_m, 30);
        assert_eq!(response.profile.len(), 3);
        assert!(response.day_splits.is_empty());

        let stored = records.get("route-1").await.unwrap();
        assert_eq!(stored.total_points, 3);
        assert_eq!(stored.total_elevation_gain_m, 50);
        assert_eq!(store.paths(), vec![stored.storage_path]);
    }

    #[tokio::test]
    async fn reupload_replaces_previous_object() {
        let store = Arc::new(MemoryStore::default());
        let records = Arc::new(InMemoryTrackFiles::new());
        let svc = service(store.clone(), records.clone());
        let content = gpx(&[(45.0, 6.0, Some(100.0)), (45.01, 6.0, Some(110.0))]);

        svc.ingest("tok", upload(content.clone())).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        svc.ingest("tok", upload(content)).await.unwrap();

        let stored = records.get("route-1").await.unwrap();
        assert_eq!(store.paths(), vec![stored.storage_path]);
    }

    #[tokio::test]
    async fn failed_save_removes_stored_object() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone(), Arc::new(BrokenRecords));

        let err = svc
            .ingest("tok", upload(gpx(&[(45.0, 6.0, None), (45.1, 6.0, None)])))
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Database(_)));
        assert!(store.paths().is_empty());
    }

    #[tokio::test]
    async fn failed_save_returns_the_upload_slot() {
        let limiter = InMemoryUploadLimiter::new(UploadQuota {
            limit: 1,
            window: chrono::Duration::hours(1),
        });
        let svc = IngestService::new(
            Arc::new(StaticAuthorizer::new().grant("tok", "guide", "route-1")),
            Arc::new(MemoryStore::default()),
            Arc::new(BrokenRecords),
            Arc::new(limiter.clone()),
        );

        for _ in 0..3 {
            let err = svc
                .ingest("tok", upload(gpx(&[(45.0, 6.0, None), (45.1, 6.0, None)])))
                .await
                .unwrap_err();
            assert!(matches!(err, IngestError::Database(_)));
        }
        assert!(limiter.acquire("guide", Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_before_parsing_when_not_owner() {
        let store = Arc::new(MemoryStore::default());
        let svc = service(store.clone(), Arc::new(InMemoryTrackFiles::new()));
        let mut request = upload(b"not a gpx file".to_vec());
        request.owner_id = "route-2".to_string();

        let err = svc.ingest("tok", request).await.unwrap_err();
        assert!(matches!(err, IngestError::Unauthorized(_)));

        let err = svc
            .ingest("unknown", upload(b"not a gpx file".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingCredential(_)));
        assert!(store.paths().is_empty());
    }

    #[tokio::test]
    async fn single_point_track_is_rejected() {
        let svc = service(
            Arc::new(MemoryStore::default()),
            Arc::new(InMemoryTrackFiles::new()),
        );
        let err = svc
            .ingest("tok", upload(gpx(&[(45.0, 6.0, Some(10.0))])))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InsufficientPoints(1)));
    }

    #[tokio::test]
    async fn malformed_uploads_do_not_use_quota() {
        let store = Arc::new(MemoryStore::default());
        let svc = IngestService::new(
            Arc::new(StaticAuthorizer::new().grant("tok", "guide", "route-1")),
            store,
            Arc::new(InMemoryTrackFiles::new()),
            Arc::new(InMemoryUploadLimiter::new(UploadQuota {
                limit: 1,
                window: chrono::Duration::hours(1),
            })),
        );

        for _ in 0..3 {
            let err = svc.ingest("tok", upload(b"<gpx".to_vec())).await.unwrap_err();
            assert!(matches!(err, IngestError::Parse(_)));
        }
        let good = gpx(&[(45.0, 6.0, None), (45.1, 6.0, None)]);
        svc.ingest("tok", upload(good.clone())).await.unwrap();
        let err = svc.ingest("tok", upload(good)).await.unwrap_err();
        assert!(matches!(err, IngestError::RateLimitExceeded { limit: 1, .. }));
    }

    #[tokio::test]
    async fn backfills_tracks_without_elevation() {
        let lookup = Arc::new(FixedElevation {
            calls: AtomicUsize::new(0),
        });
        let svc = service(
            Arc::new(MemoryStore::default()),
            Arc::new(InMemoryTrackFiles::new()),
        )
        .with_elevation(lookup.clone());

        let response = svc
            .ingest("tok", upload(gpx(&[(45.0, 6.0, None), (46.0, 6.0, None)])))
            .await
            .unwrap();

        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
        assert!(!response.has_elevation_data);
        assert!(!response.needs_elevation_fetch);
        assert_eq!(response.analysis.elevation_gain_m, 100);
        assert!(response.trackpoints.iter().all(|p| p.elevation.is_some()));
    }

    #[tokio::test]
    async fn skips_backfill_when_elevation_present() {
        let lookup = Arc::new(FixedElevation {
            calls: AtomicUsize::new(0),
        });
        let svc = service(
            Arc::new(MemoryStore::default()),
            Arc::new(InMemoryTrackFiles::new()),
        )
        .with_elevation(lookup.clone());

        let response = svc
            .ingest(
                "tok",
                upload(gpx(&[(45.0, 6.0, Some(500.0)), (46.0, 6.0, None)])),
            )
            .await
            .unwrap();

        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
        assert!(response.trackpoints[1].elevation.is_none());
    }

    #[tokio::test]
    async fn record_requires_ownership() {
        let records = Arc::new(InMemoryTrackFiles::new());
        let svc = service(Arc::new(MemoryStore::default()), records);

        assert!(matches!(
            svc.record("tok", "route-1").await,
            Err(IngestError::NotFound(_))
        ));
        assert!(matches!(
            svc.record("tok", "route-9").await,
            Err(IngestError::Unauthorized(_))
        ));
    }
}

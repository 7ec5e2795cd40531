use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use shared::ApiError;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::rate_limit::RateLimitError;
use crate::storage::StorageError;
use crate::track_parser::TrackParseError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not parse track file: {0}")]
    Parse(String),
    #[error("track file contains no track points")]
    EmptyTrack,
    #[error("track file is {size} bytes, the limit is {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("route needs at least 2 points, got {0}")]
    InsufficientPoints(usize),
    #[error(transparent)]
    MissingCredential(AuthError),
    #[error("not authorized: {0}")]
    Unauthorized(AuthError),
    #[error("upload limit of {limit} per {window_secs}s reached")]
    RateLimitExceeded {
        limit: u32,
        window_secs: i64,
        retry_after_secs: i64,
    },
    #[error("failed to store track file: {0}")]
    Storage(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("{0}")]
    NotFound(String),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::Parse(_) | IngestError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            IngestError::EmptyTrack | IngestError::InsufficientPoints(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IngestError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            IngestError::Unauthorized(_) => StatusCode::FORBIDDEN,
            IngestError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            IngestError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl From<TrackParseError> for IngestError {
    fn from(err: TrackParseError) -> Self {
        match err {
            TrackParseError::EmptyTrack => IngestError::EmptyTrack,
            TrackParseError::TooLarge { size, max } => IngestError::TooLarge { size, max },
            other => IngestError::Parse(other.to_string()),
        }
    }
}

impl From<AnalysisError> for IngestError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InsufficientPoints(found) => IngestError::InsufficientPoints(found),
        }
    }
}

impl From<AuthError> for IngestError {
    fn from(err: AuthError) -> Self {
        match &err {
            AuthError::MissingCredential | AuthError::InvalidCredential => {
                IngestError::MissingCredential(err)
            }
            AuthError::Forbidden(_) => IngestError::Unauthorized(err),
            AuthError::Store(_) => IngestError::Database(err.to_string()),
        }
    }
}

impl From<RateLimitError> for IngestError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded {
                limit,
                window_secs,
                retry_after_secs,
            } => IngestError::RateLimitExceeded {
                limit,
                window_secs,
                retry_after_secs,
            },
            RateLimitError::Store(e) => IngestError::Database(e.to_string()),
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        IngestError::Storage(err.to_string())
    }
}

impl From<DatabaseError> for IngestError {
    fn from(err: DatabaseError) -> Self {
        match &err {
            DatabaseError::NotFound(_) => IngestError::NotFound(err.to_string()),
            _ => IngestError::Database(err.to_string()),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        } else {
            tracing::debug!("request rejected ({}): {}", status, self);
        }

        let retry_after = match &self {
            IngestError::RateLimitExceeded {
                retry_after_secs, ..
            } => HeaderValue::from_str(&retry_after_secs.to_string()).ok(),
            _ => None,
        };

        let mut response = (
            status,
            Json(ApiError {
                message: self.to_string(),
            }),
        )
            .into_response();
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        let cases = [
            (IngestError::Parse("bad".into()), StatusCode::BAD_REQUEST),
            (IngestError::EmptyTrack, StatusCode::UNPROCESSABLE_ENTITY),
            (
                IngestError::from(AuthError::Forbidden("r".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                IngestError::from(AuthError::MissingCredential),
                StatusCode::UNAUTHORIZED,
            ),
            (
                IngestError::from(RateLimitError::Exceeded {
                    limit: 10,
                    window_secs: 3600,
                    retry_after_secs: 5,
                }),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (IngestError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                IngestError::from(DatabaseError::NotFound("r".into())),
                StatusCode::NOT_FOUND,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }

    #[test]
    fn parse_errors_keep_their_class() {
        assert!(matches!(
            IngestError::from(TrackParseError::EmptyTrack),
            IngestError::EmptyTrack
        ));
        assert!(matches!(
            IngestError::from(TrackParseError::TooLarge { size: 20, max: 10 }),
            IngestError::TooLarge { size: 20, max: 10 }
        ));
        assert!(matches!(
            IngestError::from(TrackParseError::InvalidCoordinate {
                index: 3,
                lat: 91.0,
                lng: 0.0
            }),
            IngestError::Parse(msg) if msg.contains("track point 3")
        ));
    }

    #[test]
    fn rate_limit_response_carries_retry_after() {
        let response = IngestError::RateLimitExceeded {
            limit: 10,
            window_secs: 3600,
            retry_after_secs: 120,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "120");
    }
}

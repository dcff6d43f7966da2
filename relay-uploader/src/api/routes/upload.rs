//! Upload routes.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/upload-start` | Register a job and start copying `videoUrl` into `resumableUrl` |
//! | GET | `/upload-status/{id}` | Current state of a job |

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{get, post},
};
use tracing::{debug, info};
use url::Url;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{StartUploadRequest, StartUploadResponse};
use crate::api::server::AppState;
use crate::jobs::Job;
use crate::transfer::TransferRequest;

const MISSING_FIELDS: &str = "Missing videoUrl or resumableUrl";

/// Create the upload router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload-start", post(start_upload))
        .route("/upload-status/{id}", get(upload_status))
}

/// Register a job and hand its transfer to the background.
///
/// # Endpoint
///
/// `POST /upload-start`
///
/// # Response
///
/// `{ "jobId": "..." }` as soon as the job is registered; the transfer has
/// not necessarily started yet.
async fn start_upload(
    State(state): State<AppState>,
    payload: Result<Json<StartUploadRequest>, JsonRejection>,
) -> ApiResult<Json<StartUploadResponse>> {
    // A body that is not a JSON object carries neither field.
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            debug!(error = %rejection, "Unreadable upload request body");
            StartUploadRequest::default()
        }
    };

    let request = validate(payload)?;
    let job = state.registry.create_job().map_err(ApiError::from)?;

    info!(
        job_id = %job.id,
        video_url = %request.source_url,
        resumable_url = %request.destination_url,
        "New upload job"
    );

    state.orchestrator.spawn(job.id.clone(), request);

    Ok(Json(StartUploadResponse { job_id: job.id }))
}

/// Get the current state of a job.
///
/// # Endpoint
///
/// `GET /upload-status/{id}`
async fn upload_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.registry.get_job(&id).map_err(ApiError::from)?;
    Ok(Json(job))
}

fn validate(payload: StartUploadRequest) -> ApiResult<TransferRequest> {
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let (Some(video_url), Some(resumable_url)) = (
        non_empty(payload.video_url),
        non_empty(payload.resumable_url),
    ) else {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    };

    Ok(TransferRequest {
        source_url: parse_http_url("videoUrl", &video_url)?,
        destination_url: parse_http_url("resumableUrl", &resumable_url)?,
    })
}

fn parse_http_url(field: &str, raw: &str) -> ApiResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ApiError::bad_request(format!("Invalid {field}: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(ApiError::bad_request(format!(
            "Invalid {field}: must be an http(s) URL"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use crate::api::routes::create_router;
    use crate::config::TransferConfig;

    fn request(video_url: Option<&str>, resumable_url: Option<&str>) -> StartUploadRequest {
        StartUploadRequest {
            video_url: video_url.map(str::to_owned),
            resumable_url: resumable_url.map(str::to_owned),
        }
    }

    #[test]
    fn validate_requires_both_fields() {
        for payload in [
            request(None, Some("https://upload.example/s")),
            request(Some("https://cdn.example/a.mp4"), None),
            request(Some(""), Some("https://upload.example/s")),
            request(None, None),
        ] {
            let err = validate(payload).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
            assert_eq!(err.message, MISSING_FIELDS);
        }
    }

    #[test]
    fn validate_rejects_non_http_urls() {
        let err = validate(request(
            Some("ftp://cdn.example/a.mp4"),
            Some("https://upload.example/s"),
        ))
        .unwrap_err();
        assert!(err.message.starts_with("Invalid videoUrl"));

        let err = validate(request(Some("https://cdn.example/a.mp4"), Some("not a url")))
            .unwrap_err();
        assert!(err.message.starts_with("Invalid resumableUrl"));
    }

    #[test]
    fn validate_accepts_http_urls() {
        let request = validate(request(
            Some("https://cdn.example/a.mp4"),
            Some("https://upload.example/upload?upload_id=xyz"),
        ))
        .unwrap();
        assert_eq!(request.source_url.host_str(), Some("cdn.example"));
        assert_eq!(request.destination_url.query(), Some("upload_id=xyz"));
    }

    #[tokio::test]
    async fn non_json_body_is_reported_as_missing_fields() {
        let state = AppState::new(TransferConfig::default()).unwrap();
        let registry = state.registry.clone();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::post("/upload-start")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("videoUrl=x"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(registry.is_empty());
    }
}

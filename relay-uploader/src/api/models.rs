//! API request and response models (DTOs).

use serde::{Deserialize, Serialize};

/// Request body for `POST /upload-start`.
///
/// Both fields are optional at the type level so that absence can be
/// reported with the endpoint's own error message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadRequest {
    /// URL of the media to copy.
    pub video_url: Option<String>,
    /// Resumable upload session URL on the destination.
    pub resumable_url: Option<String>,
}

/// Response for `POST /upload-start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadResponse {
    pub job_id: String,
}

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Jobs tracked since startup.
    pub jobs: usize,
}

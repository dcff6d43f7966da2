//! Destination response handling.

use bytes::BytesMut;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::RelayError;

/// Longest slice of an error body kept in the failure message.
const ERROR_BODY_PREVIEW: usize = 256;

/// Resource created by the destination for a completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub id: String,
}

/// Parse a destination success body into an [`UploadReceipt`].
pub fn parse_receipt(body: &[u8]) -> Result<UploadReceipt, RelayError> {
    let receipt: UploadReceipt =
        serde_json::from_slice(body).map_err(|e| RelayError::response_parse(e.to_string()))?;

    if receipt.id.trim().is_empty() {
        return Err(RelayError::response_parse("`id` field is empty"));
    }

    Ok(receipt)
}

/// Wait for the destination to finish responding, then interpret the body.
pub(crate) async fn finish_exchange(
    response: Response<Incoming>,
    max_body: usize,
) -> Result<UploadReceipt, RelayError> {
    let status = response.status();
    let accepted = status == StatusCode::OK || status == StatusCode::CREATED;

    let mut body = BytesMut::new();
    let truncated = match read_body(response.into_body(), max_body, &mut body).await {
        Ok(truncated) => truncated,
        // A rejecting destination often hangs up right after its answer.
        Err(e) if !accepted => {
            debug!(status = %status, error = %e, "Destination error body cut short");
            false
        }
        Err(e) => return Err(e),
    };

    info!(status = %status, bytes = body.len(), "Destination responded");

    if !accepted {
        let preview = &body[..body.len().min(ERROR_BODY_PREVIEW)];
        return Err(RelayError::DestinationStatus {
            status,
            body: String::from_utf8_lossy(preview).into_owned(),
        });
    }

    if truncated {
        return Err(RelayError::response_parse(format!(
            "response body exceeds {max_body} bytes"
        )));
    }

    parse_receipt(&body)
}

/// Accumulate the response body into `buf`, keeping at most `max_body` bytes.
///
/// Returns whether anything was dropped. The remainder of an oversized body
/// is not read.
async fn read_body(
    mut body: Incoming,
    max_body: usize,
    buf: &mut BytesMut,
) -> Result<bool, RelayError> {
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(RelayError::destination_transport)?;
        let Ok(chunk) = frame.into_data() else {
            continue;
        };
        let room = max_body - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            debug!(limit = max_body, "Destination response body truncated");
            return Ok(true);
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(false)
}

//! Meeting record handlers: thin forwards to the vendor datasheet.

use axum::{
    Json,
    extract::{Path, State},
};
use bytes::Bytes;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::AppState;
use crate::api::models::meetings::{ApiResponse, MeetingInput};
use crate::config::RetryConfig;
use crate::errors::{Error, Result};
use crate::vendor::{Datasheet, NewRecord, RecordUpdate, VendorError};

#[instrument(skip_all)]
pub async fn list_meetings(State(state): State<AppState>) -> Result<Json<ApiResponse>> {
    let data = state
        .datasheet
        .query(&state.config.vendor.view_id)
        .await
        .map_err(|e| Error::upstream("Failed to fetch meeting records", e))?;

    Ok(Json(ApiResponse::ok("Meeting records fetched", data)))
}

#[instrument(skip_all)]
pub async fn create_meeting(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ApiResponse>> {
    let input = MeetingInput::parse(&body)?;
    let record = NewRecord {
        fields: input.create_fields(),
    };
    info!("Creating meeting record: {}", serde_json::Value::Object(record.fields.clone()));

    let data = create_with_retry(state.datasheet.as_ref(), record, state.config.records.create_retry)
        .await
        .map_err(|e| Error::upstream("Failed to create meeting record", e))?;

    Ok(Json(ApiResponse::ok("Meeting record created", data)))
}

/// Create one record, retrying both vendor rejections and transport failures.
///
/// Returns the first success, or the error from the final attempt.
pub async fn create_with_retry(
    datasheet: &dyn Datasheet,
    record: NewRecord,
    policy: RetryConfig,
) -> std::result::Result<Value, VendorError> {
    let mut attempt = 1;
    loop {
        match datasheet.create(vec![record.clone()]).await {
            Ok(data) => return Ok(data),
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    "Meeting creation failed, retrying in {:?}: {}",
                    policy.delay,
                    e
                );
                attempt += 1;
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                error!(attempt, "Meeting creation failed, giving up: {}", e);
                return Err(e);
            }
        }
    }
}

#[instrument(skip(state, body))]
pub async fn update_meeting(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    body: Bytes,
) -> Result<Json<ApiResponse>> {
    let input = MeetingInput::parse(&body)?;
    let update = RecordUpdate {
        record_id,
        fields: input.update_fields(),
    };

    let data = state
        .datasheet
        .update(vec![update])
        .await
        .map_err(|e| Error::upstream("Failed to update meeting record", e))?;

    Ok(Json(ApiResponse::ok("Meeting record updated", data)))
}

#[instrument(skip(state))]
pub async fn delete_meeting(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<Json<ApiResponse>> {
    let data = state
        .datasheet
        .delete(vec![record_id])
        .await
        .map_err(|e| Error::upstream("Failed to delete meeting record", e))?;

    Ok(Json(ApiResponse::ok("Meeting record deleted", data)))
}

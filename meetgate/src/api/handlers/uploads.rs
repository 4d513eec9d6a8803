use axum::{
    Json,
    extract::{Multipart, State, multipart::{MultipartError, MultipartRejection}},
    http::StatusCode,
};
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use rand::prelude::RngExt;
use rand::rng;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::AppState;
use crate::api::models::uploads::{LocalAttachment, UploadResponse};
use crate::config::UploadsConfig;
use crate::errors::{Error, MediaError};
use crate::vendor::AttachmentUpload;

/// A file received from the client, fully buffered.
struct IncomingFile {
    field_name: String,
    original_name: String,
    mime_type: String,
    bytes: Bytes,
}

fn multipart_error(e: MultipartError, limit: u64) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {e}"),
        }
    }
}

/// Pull the configured file field out of the form, enforcing the MIME allow-list and size limit
/// before anything touches the disk. Other fields are ignored.
async fn read_file_field(
    multipart: &mut Multipart,
    config: &UploadsConfig,
) -> Result<Option<IncomingFile>, Error> {
    let limit = config.max_file_size;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| multipart_error(e, limit))? {
        if field.name() != Some(config.field_name.as_str()) {
            continue;
        }

        let mime_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        if !config.allowed_mime_types.iter().any(|allowed| allowed.eq_ignore_ascii_case(&mime_type)) {
            return Err(Error::UnsupportedMediaType { mime: mime_type });
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mut buffer = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, limit))? {
            if (buffer.len() + chunk.len()) as u64 > limit {
                return Err(Error::PayloadTooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }

        return Ok(Some(IncomingFile {
            field_name: config.field_name.clone(),
            original_name,
            mime_type,
            bytes: buffer.freeze(),
        }));
    }

    Ok(None)
}

/// `<field>-<unix millis>-<random below 1e9><.ext>`; unique in practice, not guaranteed.
fn stored_file_name(field_name: &str, original_name: &str) -> String {
    let extension = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    let suffix: u32 = rng().random_range(0..1_000_000_000);
    format!("{field_name}-{}-{suffix}{extension}", Utc::now().timestamp_millis())
}

/// Random lowercase base-36 token for locally stored attachments.
fn local_token() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rng();
    (0..11).map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char).collect()
}

fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), Error> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| Error::Other(e.into()))?
        .into_dimensions()
        .map_err(|e| Error::BadRequest {
            message: format!("Uploaded file is not a readable image: {e}"),
        })
}

#[instrument(skip_all)]
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, MediaError> {
    // A body that is not multipart at all carries no file either
    let mut multipart = multipart.map_err(|rejection| {
        debug!("Upload body is not multipart/form-data: {}", rejection.body_text());
        Error::BadRequest {
            message: "No file uploaded".to_string(),
        }
    })?;
    let config = &state.config.uploads;
    let file = read_file_field(&mut multipart, config).await?.ok_or_else(|| Error::BadRequest {
        message: "No file uploaded".to_string(),
    })?;
    info!(
        filename = %file.original_name,
        mime_type = %file.mime_type,
        size = file.bytes.len(),
        "Received image upload"
    );

    let stored_name = stored_file_name(&file.field_name, &file.original_name);
    let stored_path = config.dir.join(&stored_name);
    tokio::fs::write(&stored_path, &file.bytes)
        .await
        .map_err(|e| Error::Other(anyhow::anyhow!("Failed to store upload at {}: {e}", stored_path.display())))?;

    let (width, height) = match image_dimensions(&file.bytes) {
        Ok(dimensions) => dimensions,
        Err(e) => {
            let _ = tokio::fs::remove_file(&stored_path).await;
            return Err(e.into());
        }
    };

    let upload = AttachmentUpload {
        file_name: file.original_name.clone(),
        mime_type: file.mime_type.clone(),
        bytes: file.bytes.clone(),
    };

    match state.datasheet.upload_attachment(upload).await {
        Ok(data) => Ok(Json(UploadResponse::vendor(data))),
        Err(e) => {
            warn!("Vendor attachment upload failed, falling back to local copy {}: {}", stored_name, e);
            let attachment = LocalAttachment {
                id: Utc::now().timestamp_millis().to_string(),
                name: file.original_name,
                size: file.bytes.len() as u64,
                mime_type: file.mime_type,
                token: local_token(),
                width,
                height,
                url: format!("{}/{}", config.public_path.trim_end_matches('/'), stored_name),
            };
            Ok(Json(UploadResponse::local(&attachment)))
        }
    }
}

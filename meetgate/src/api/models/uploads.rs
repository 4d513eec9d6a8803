//! Upload response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where an uploaded image ended up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Storage {
    /// Stored as a vendor attachment; `data` is the vendor's descriptor
    Vendor,
    /// Vendor upload failed; `data` describes the copy under the local uploads path
    Local,
}

/// Descriptor for a locally stored image, shaped like a vendor attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalAttachment {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub token: String,
    pub width: u32,
    pub height: u32,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub storage: Storage,
    pub data: Value,
}

impl UploadResponse {
    pub fn vendor(data: Value) -> Self {
        Self {
            success: true,
            storage: Storage::Vendor,
            data,
        }
    }

    pub fn local(attachment: &LocalAttachment) -> Self {
        Self {
            success: true,
            storage: Storage::Local,
            data: serde_json::to_value(attachment).unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProxyImageQuery {
    pub url: Option<String>,
}

//! Content reshaping between the backend dialect and MCP types
//!
//! Binary payloads (resource blobs, images, audio) are decoded to raw bytes as
//! soon as they leave the backend reply and are only base64-encoded again when
//! converted into protocol types at the wire boundary.

use base64::{engine::general_purpose::STANDARD, Engine};
use rmcp::model::{Content, ResourceContents};
use serde_json::{json, Value};
use tracing::warn;

use super::BackendError;

/// One item of a tool-call result
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text { text: String },
    Image { data: Vec<u8>, mime_type: String },
    Audio { data: Vec<u8>, mime_type: String },
    /// Any item we do not model; forwarded as-is
    Other(Value),
}

impl ContentItem {
    pub fn from_backend(value: Value) -> Self {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            "text" => match value.get("text").and_then(Value::as_str) {
                Some(text) => ContentItem::Text {
                    text: text.to_string(),
                },
                None => ContentItem::Other(value),
            },
            "image" | "audio" => match decode_binary(&value) {
                Some((data, mime_type)) if kind == "image" => ContentItem::Image { data, mime_type },
                Some((data, mime_type)) => ContentItem::Audio { data, mime_type },
                None => ContentItem::Other(value),
            },
            _ => ContentItem::Other(value),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            ContentItem::Text { .. } => "text",
            ContentItem::Image { .. } => "image",
            ContentItem::Audio { .. } => "audio",
            ContentItem::Other(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }

    /// Convert into an MCP content block.
    ///
    /// Items MCP has no variant for are carried as text holding their JSON.
    pub fn into_protocol(self) -> Content {
        match self {
            ContentItem::Text { text } => Content::text(text),
            ContentItem::Image { data, mime_type } => Content::image(STANDARD.encode(data), mime_type),
            ContentItem::Audio { data, mime_type } => {
                let raw = json!({
                    "type": "audio",
                    "data": STANDARD.encode(data),
                    "mimeType": mime_type,
                });
                passthrough(raw)
            }
            ContentItem::Other(value) => passthrough(value),
        }
    }
}

fn decode_binary(value: &Value) -> Option<(Vec<u8>, String)> {
    let data = value.get("data").and_then(Value::as_str)?;
    let mime_type = value
        .get("mimeType")
        .and_then(Value::as_str)
        .unwrap_or("application/octet-stream");
    let bytes = STANDARD.decode(data).ok()?;
    Some((bytes, mime_type.to_string()))
}

fn passthrough(value: Value) -> Content {
    match serde_json::from_value::<Content>(value.clone()) {
        Ok(content) => content,
        Err(_) => {
            let kind = value.get("type").and_then(|v| v.as_str()).unwrap_or("unknown");
            warn!(kind, "Forwarding unrecognized content item as text");
            Content::text(value.to_string())
        }
    }
}

/// Body of one resource content entry
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceBody {
    Text(String),
    Blob(Vec<u8>),
}

/// One entry of a `resources/read` result, binary already decoded
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePayload {
    pub uri: String,
    pub mime_type: Option<String>,
    pub body: ResourceBody,
}

impl ResourcePayload {
    pub fn from_backend(value: &Value) -> Result<Self, BackendError> {
        let uri = value
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::InvalidResponse("resource content without uri".into()))?
            .to_string();
        let mime_type = value
            .get("mimeType")
            .and_then(Value::as_str)
            .map(str::to_string);

        let body = if let Some(text) = value.get("text").and_then(Value::as_str) {
            ResourceBody::Text(text.to_string())
        } else if let Some(blob) = value.get("blob").and_then(Value::as_str) {
            let bytes = STANDARD.decode(blob).map_err(|e| {
                BackendError::InvalidResponse(format!("resource '{}' has invalid base64: {}", uri, e))
            })?;
            ResourceBody::Blob(bytes)
        } else {
            return Err(BackendError::InvalidResponse(format!(
                "resource '{}' has neither text nor blob",
                uri
            )));
        };

        Ok(Self {
            uri,
            mime_type,
            body,
        })
    }

    pub fn len(&self) -> usize {
        match &self.body {
            ResourceBody::Text(text) => text.len(),
            ResourceBody::Blob(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert into MCP resource contents, re-encoding blobs as base64
    pub fn into_protocol(self) -> Result<ResourceContents, serde_json::Error> {
        let mut raw = json!({ "uri": self.uri });
        if let Some(mime_type) = self.mime_type {
            raw["mimeType"] = Value::String(mime_type);
        }
        match self.body {
            ResourceBody::Text(text) => raw["text"] = Value::String(text),
            ResourceBody::Blob(bytes) => raw["blob"] = Value::String(STANDARD.encode(bytes)),
        }
        serde_json::from_value(raw)
    }
}

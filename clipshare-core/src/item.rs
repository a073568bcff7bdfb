//! Shared board items and their wire representation.
//!
//! On the wire an item is a flat JSON object with camelCase keys
//! (`msgType`, `fileOrTextHash`, `timestamp`, `size`, and the optional
//! `fileName`, `hashName`, `text`, `url`). In memory the payload is a sum
//! type, so a text item without text or a file item without a URL cannot be
//! constructed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content_hash::ContentHash;

/// Whether an item is a text snippet or an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Text,
    File,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Text => write!(f, "text"),
            ItemKind::File => write!(f, "file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    File {
        url: String,
        file_name: Option<String>,
        /// Name the server stored the file under
        hash_name: Option<String>,
    },
}

/// Errors from items that fail schema validation
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ItemError {
    #[error("text item {0} carries no text")]
    MissingText(ContentHash),

    #[error("file item {0} carries no url")]
    MissingUrl(ContentHash),
}

/// A single shared unit on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireItem", into = "WireItem")]
pub struct Item {
    pub hash: ContentHash,
    /// Server-assigned creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Payload size in bytes
    pub size: u64,
    pub payload: Payload,
}

impl Item {
    pub fn text(hash: ContentHash, timestamp: i64, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            hash,
            timestamp,
            size: text.len() as u64,
            payload: Payload::Text(text),
        }
    }

    pub fn file(
        hash: ContentHash,
        timestamp: i64,
        size: u64,
        url: impl Into<String>,
        file_name: Option<String>,
    ) -> Self {
        Self {
            hash,
            timestamp,
            size,
            payload: Payload::File {
                url: url.into(),
                file_name,
                hash_name: None,
            },
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self.payload {
            Payload::Text(_) => ItemKind::Text,
            Payload::File { .. } => ItemKind::File,
        }
    }

    /// The text content, or the file name for files.
    pub fn label(&self) -> &str {
        match &self.payload {
            Payload::Text(text) => text,
            Payload::File {
                file_name, url, ..
            } => file_name.as_deref().unwrap_or(url),
        }
    }

    pub fn url(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(_) => None,
            Payload::File { url, .. } => Some(url),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireItem {
    msg_type: ItemKind,
    file_or_text_hash: ContentHash,
    timestamp: i64,
    #[serde(default)]
    size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hash_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

impl TryFrom<WireItem> for Item {
    type Error = ItemError;

    fn try_from(wire: WireItem) -> Result<Self, Self::Error> {
        let payload = match wire.msg_type {
            ItemKind::Text => Payload::Text(
                wire.text
                    .ok_or_else(|| ItemError::MissingText(wire.file_or_text_hash.clone()))?,
            ),
            ItemKind::File => Payload::File {
                url: wire
                    .url
                    .ok_or_else(|| ItemError::MissingUrl(wire.file_or_text_hash.clone()))?,
                file_name: wire.file_name,
                hash_name: wire.hash_name,
            },
        };

        Ok(Self {
            hash: wire.file_or_text_hash,
            timestamp: wire.timestamp,
            size: wire.size,
            payload,
        })
    }
}

impl From<Item> for WireItem {
    fn from(item: Item) -> Self {
        let msg_type = item.kind();
        let (text, url, file_name, hash_name) = match item.payload {
            Payload::Text(text) => (Some(text), None, None, None),
            Payload::File {
                url,
                file_name,
                hash_name,
            } => (None, Some(url), file_name, hash_name),
        };

        Self {
            msg_type,
            file_or_text_hash: item.hash,
            timestamp: item.timestamp,
            size: item.size,
            file_name,
            hash_name,
            text,
            url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_item_wire_format() {
        let hash = ContentHash::of_text("hello");
        let item = Item::text(hash.clone(), 100, "hello");

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({
                "msgType": "text",
                "fileOrTextHash": hash.as_str(),
                "timestamp": 100,
                "size": 5,
                "text": "hello",
            })
        );
    }

    #[test]
    fn test_file_item_from_wire() {
        let value = json!({
            "msgType": "file",
            "fileOrTextHash": "abc123",
            "timestamp": 42,
            "size": 2048,
            "fileName": "report.pdf",
            "hashName": "abc123.pdf",
            "url": "/files/abc123",
        });

        let item: Item = serde_json::from_value(value).unwrap();
        assert_eq!(item.kind(), ItemKind::File);
        assert_eq!(item.size, 2048);
        assert_eq!(item.label(), "report.pdf");
        assert_eq!(item.url(), Some("/files/abc123"));
        match item.payload {
            Payload::File { hash_name, .. } => assert_eq!(hash_name.as_deref(), Some("abc123.pdf")),
            _ => panic!("Expected file payload"),
        }
    }

    #[test]
    fn test_missing_fields_rejected() {
        let no_text = json!({
            "msgType": "text",
            "fileOrTextHash": "abc",
            "timestamp": 1,
        });
        assert!(serde_json::from_value::<Item>(no_text).is_err());

        let no_url = json!({
            "msgType": "file",
            "fileOrTextHash": "abc",
            "timestamp": 1,
            "fileName": "a.txt",
        });
        assert!(serde_json::from_value::<Item>(no_url).is_err());

        let no_hash = json!({
            "msgType": "text",
            "fileOrTextHash": "",
            "timestamp": 1,
            "text": "x",
        });
        assert!(serde_json::from_value::<Item>(no_hash).is_err());
    }

    #[test]
    fn test_size_defaults_to_zero() {
        let value = json!({
            "msgType": "text",
            "fileOrTextHash": "abc",
            "timestamp": 1,
            "text": "hi",
        });
        let item: Item = serde_json::from_value(value).unwrap();
        assert_eq!(item.size, 0);
    }

    #[test]
    fn test_created_at() {
        let item = Item::text(ContentHash::of_text("t"), 1_700_000_000_000, "t");
        let created = item.created_at().unwrap();
        assert_eq!(created.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_file_label_falls_back_to_url() {
        let item = Item::file(ContentHash::of_file(b"x"), 1, 1, "/files/x", None);
        assert_eq!(item.label(), "/files/x");
    }
}

//! Push channel message types.
//!
//! One JSON text frame per message, discriminated by `action`. Field names
//! match the board server's wire format (`timeStamp`, `fileOrTextHash`,
//! `msgs`).

use serde::{Deserialize, Serialize};

use crate::content_hash::ContentHash;
use crate::item::Item;

/// Messages exchanged over the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum ProtocolMessage {
    /// A single item was added (or re-added) on the server
    #[serde(rename = "add")]
    Add {
        #[serde(
            rename = "timeStamp",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        time_stamp: Option<i64>,
        data: AddData,
    },
    /// An item was removed on the server, or a client asks for removal
    #[serde(rename = "delete")]
    Delete {
        #[serde(
            rename = "timeStamp",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        time_stamp: Option<i64>,
        data: DeleteData,
    },
    /// The complete authoritative item set
    #[serde(rename = "full")]
    Full {
        #[serde(
            rename = "timeStamp",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        time_stamp: Option<i64>,
        data: FullData,
    },
    /// Protocol-level keepalive
    #[serde(rename = "heartBeat")]
    HeartBeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        salt: Option<String>,
    },
    /// Request for a `full` resync
    #[serde(rename = "refresh")]
    Refresh {},
    /// Server-side error, shown to the user as a notice
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddData {
    pub msg: Item,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteData {
    pub file_or_text_hash: ContentHash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullData {
    pub msgs: Vec<Item>,
}

impl ProtocolMessage {
    pub fn add(item: Item) -> Self {
        ProtocolMessage::Add {
            time_stamp: Some(item.timestamp),
            data: AddData { msg: item },
        }
    }

    pub fn delete(hash: ContentHash) -> Self {
        ProtocolMessage::Delete {
            time_stamp: None,
            data: DeleteData {
                file_or_text_hash: hash,
            },
        }
    }

    pub fn full(items: Vec<Item>) -> Self {
        ProtocolMessage::Full {
            time_stamp: None,
            data: FullData { msgs: items },
        }
    }

    /// A heartbeat salted with the current time.
    pub fn heartbeat() -> Self {
        ProtocolMessage::HeartBeat {
            salt: Some(chrono::Utc::now().timestamp_millis().to_string()),
        }
    }

    pub fn refresh() -> Self {
        ProtocolMessage::Refresh {}
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProtocolMessage::Error {
            data: serde_json::Value::String(message.into()),
        }
    }

    /// The wire discriminant, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            ProtocolMessage::Add { .. } => "add",
            ProtocolMessage::Delete { .. } => "delete",
            ProtocolMessage::Full { .. } => "full",
            ProtocolMessage::HeartBeat { .. } => "heartBeat",
            ProtocolMessage::Refresh {} => "refresh",
            ProtocolMessage::Error { .. } => "error",
        }
    }

    /// Human-readable text of an `error` message.
    pub fn error_text(&self) -> Option<String> {
        match self {
            ProtocolMessage::Error { data } => Some(match data {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => "unknown server error".to_string(),
                other => other.to_string(),
            }),
            _ => None,
        }
    }

    /// Encode message as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode message from a JSON text frame.
    pub fn decode(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_item(text: &str, timestamp: i64) -> Item {
        Item::text(ContentHash::of_text(text), timestamp, text)
    }

    #[test]
    fn test_decode_add_frame() {
        let frame = json!({
            "action": "add",
            "timeStamp": 100,
            "data": {"msg": {
                "msgType": "text",
                "fileOrTextHash": "h1",
                "timestamp": 100,
                "size": 5,
                "text": "hello",
            }},
        })
        .to_string();

        match ProtocolMessage::decode(&frame).unwrap() {
            ProtocolMessage::Add { time_stamp, data } => {
                assert_eq!(time_stamp, Some(100));
                assert_eq!(data.msg.hash.as_str(), "h1");
                assert_eq!(data.msg.label(), "hello");
            }
            other => panic!("Expected Add message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_delete_without_timestamp() {
        let frame = r#"{"action":"delete","data":{"fileOrTextHash":"h1"}}"#;
        match ProtocolMessage::decode(frame).unwrap() {
            ProtocolMessage::Delete { time_stamp, data } => {
                assert_eq!(time_stamp, None);
                assert_eq!(data.file_or_text_hash.as_str(), "h1");
            }
            other => panic!("Expected Delete message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_payloadless_actions() {
        assert_eq!(
            ProtocolMessage::decode(r#"{"action":"refresh"}"#).unwrap(),
            ProtocolMessage::Refresh {}
        );
        assert_eq!(
            ProtocolMessage::decode(r#"{"action":"heartBeat","salt":"x"}"#).unwrap(),
            ProtocolMessage::HeartBeat {
                salt: Some("x".to_string())
            }
        );
        // Servers may attach extra fields to heartbeats
        assert!(matches!(
            ProtocolMessage::decode(r#"{"action":"heartBeat","data":null}"#).unwrap(),
            ProtocolMessage::HeartBeat { .. }
        ));
    }

    #[test]
    fn test_error_text() {
        let msg = ProtocolMessage::decode(r#"{"action":"error","data":"disk full"}"#).unwrap();
        assert_eq!(msg.error_text().as_deref(), Some("disk full"));

        let msg = ProtocolMessage::decode(r#"{"action":"error"}"#).unwrap();
        assert_eq!(msg.error_text().as_deref(), Some("unknown server error"));

        assert_eq!(ProtocolMessage::refresh().error_text(), None);
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(ProtocolMessage::decode("not json").is_err());
        assert!(ProtocolMessage::decode(r#"{"action":"explode"}"#).is_err());
        assert!(ProtocolMessage::decode(r#"{"data":{}}"#).is_err());
        // add without an item
        assert!(ProtocolMessage::decode(r#"{"action":"add","data":{}}"#).is_err());
        // full with a text item missing its text
        assert!(ProtocolMessage::decode(
            r#"{"action":"full","data":{"msgs":[{"msgType":"text","fileOrTextHash":"a","timestamp":1}]}}"#
        )
        .is_err());
    }

    #[test]
    fn test_full_encode_decode() {
        let msg = ProtocolMessage::full(vec![text_item("a", 1), text_item("b", 2)]);
        let encoded = msg.encode().unwrap();
        assert!(encoded.contains(r#""action":"full""#));
        assert!(!encoded.contains("timeStamp"));

        let decoded = ProtocolMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_outgoing_frames() {
        let delete = ProtocolMessage::delete(ContentHash::of_text("a"))
            .encode()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&delete).unwrap();
        assert_eq!(value["action"], "delete");
        assert_eq!(
            value["data"]["fileOrTextHash"],
            ContentHash::of_text("a").as_str()
        );

        let refresh = ProtocolMessage::refresh().encode().unwrap();
        assert_eq!(refresh, r#"{"action":"refresh"}"#);

        let heartbeat = ProtocolMessage::heartbeat();
        assert_eq!(heartbeat.action(), "heartBeat");
    }
}

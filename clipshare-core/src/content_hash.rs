//! Content addressing for shared items.
//!
//! Every item on the board is keyed by a SHA-256 digest of its content. The
//! digest covers a kind tag followed by the raw bytes (UTF-8 for text), so a
//! text snippet and a file with identical bytes are still distinct items.
//! Hashes are rendered as lowercase hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::item::ItemKind;

const TEXT_TAG: &[u8] = b"text:";
const FILE_TAG: &[u8] = b"file:";

/// Errors that can occur when parsing a content hash
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContentHashError {
    #[error("Content hash must not be empty")]
    Empty,

    #[error("Invalid character {0:?} in content hash")]
    InvalidCharacter(char),
}

/// The identity of a shared item.
///
/// Locally computed hashes are always 64 hex characters. Hashes received from
/// the server are accepted as any non-empty token without whitespace, since
/// the server is authoritative for the items it pushes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a text snippet.
    pub fn of_text(text: &str) -> Self {
        let mut hasher = ContentHasher::new(ItemKind::Text);
        hasher.update(text.as_bytes());
        hasher.finalize()
    }

    /// Hash the bytes of a file.
    pub fn of_file(bytes: &[u8]) -> Self {
        let mut hasher = ContentHasher::new(ItemKind::File);
        hasher.update(bytes);
        hasher.finalize()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines and terminal output.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentHash {
    type Err = ContentHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ContentHashError::Empty);
        }
        if let Some(c) = s.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(ContentHashError::InvalidCharacter(c));
        }
        Ok(Self(s.to_string()))
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A user-typed hash or leading part of one, e.g. the 8 characters shown by
/// `clipshare list`.
///
/// Parsing lowercases the input and requires hex digits only; matching
/// against board items happens where the board is known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HashPrefix(String);

impl HashPrefix {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, hash: &ContentHash) -> bool {
        hash.as_str().starts_with(&self.0)
    }
}

impl fmt::Display for HashPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for HashPrefix {
    type Err = ContentHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ContentHashError::Empty);
        }
        if let Some(c) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(ContentHashError::InvalidCharacter(c));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl From<ContentHash> for HashPrefix {
    fn from(hash: ContentHash) -> Self {
        Self(hash.0)
    }
}

/// Incremental hasher for content that arrives in chunks.
pub struct ContentHasher(Sha256);

impl ContentHasher {
    pub fn new(kind: ItemKind) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(match kind {
            ItemKind::Text => TEXT_TAG,
            ItemKind::File => FILE_TAG,
        });
        Self(hasher)
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash(format!("{:x}", self.0.finalize()))
    }
}

/// Content a client wants to put on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    File { name: String, bytes: Vec<u8> },
}

impl Content {
    pub fn kind(&self) -> ItemKind {
        match self {
            Content::Text(_) => ItemKind::Text,
            Content::File { .. } => ItemKind::File,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Content::Text(text) => text.as_bytes(),
            Content::File { bytes, .. } => bytes,
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    pub fn hash(&self) -> ContentHash {
        let mut hasher = ContentHasher::new(self.kind());
        hasher.update(self.bytes());
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let h1 = ContentHash::of_text("hello");
        let h2 = ContentHash::of_text("hello");
        assert_eq!(h1, h2);
        assert_eq!(h1.as_str().len(), 64);
        assert!(h1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_distinct_content_distinct_hash() {
        assert_ne!(ContentHash::of_text("hello"), ContentHash::of_text("hello "));
        assert_ne!(ContentHash::of_text("héllo"), ContentHash::of_text("hello"));
    }

    #[test]
    fn test_text_and_file_are_distinct() {
        assert_ne!(
            ContentHash::of_text("hello"),
            ContentHash::of_file(b"hello")
        );
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = vec![7u8; 200_000];
        let mut hasher = ContentHasher::new(ItemKind::File);
        for chunk in data.chunks(4096) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), ContentHash::of_file(&data));
    }

    #[test]
    fn test_content_hash_matches_helpers() {
        let text = Content::Text("clip".to_string());
        assert_eq!(text.hash(), ContentHash::of_text("clip"));
        assert_eq!(text.kind(), ItemKind::Text);

        let file = Content::File {
            name: "a.bin".to_string(),
            bytes: vec![1, 2, 3],
        };
        assert_eq!(file.hash(), ContentHash::of_file(&[1, 2, 3]));
        assert_eq!(file.len(), 3);
    }

    #[test]
    fn test_file_name_does_not_affect_hash() {
        let a = Content::File {
            name: "a.txt".to_string(),
            bytes: b"same".to_vec(),
        };
        let b = Content::File {
            name: "b.txt".to_string(),
            bytes: b"same".to_vec(),
        };
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!("".parse::<ContentHash>(), Err(ContentHashError::Empty));
        assert_eq!(
            "ab cd".parse::<ContentHash>(),
            Err(ContentHashError::InvalidCharacter(' '))
        );
        assert!("5d41402abc4b2a76".parse::<ContentHash>().is_ok());
    }

    #[test]
    fn test_serialization() {
        let hash = ContentHash::of_text("x");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash));
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, back);

        assert!(serde_json::from_str::<ContentHash>("\"\"").is_err());
    }

    #[test]
    fn test_prefix_parsing() {
        let prefix: HashPrefix = " 5D41402a ".parse().unwrap();
        assert_eq!(prefix.as_str(), "5d41402a");

        assert_eq!("".parse::<HashPrefix>(), Err(ContentHashError::Empty));
        assert_eq!(
            "abc/def".parse::<HashPrefix>(),
            Err(ContentHashError::InvalidCharacter('/'))
        );
        assert_eq!(
            "zz".parse::<HashPrefix>(),
            Err(ContentHashError::InvalidCharacter('z'))
        );
    }

    #[test]
    fn test_prefix_matches() {
        let hash = ContentHash::of_text("hello");
        let short: HashPrefix = hash.short().parse().unwrap();
        assert!(short.matches(&hash));
        assert!(HashPrefix::from(hash.clone()).matches(&hash));
        assert!(!short.matches(&ContentHash::of_text("other")));
    }

    #[test]
    fn test_short() {
        let hash = ContentHash::of_text("x");
        assert_eq!(hash.short().len(), 8);
        let tiny: ContentHash = "abc".parse().unwrap();
        assert_eq!(tiny.short(), "abc");
    }
}

//! In-memory board storage keyed by content hash.

use std::collections::HashMap;

use clipshare_core::{ContentHash, Item};

/// Outcome of storing an item.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored {
    /// First time this hash was seen
    New(Item),
    /// Already on the board; the stored item is returned unchanged
    Existing(Item),
}

impl Stored {
    pub fn item(&self) -> &Item {
        match self {
            Stored::New(item) | Stored::Existing(item) => item,
        }
    }

    pub fn into_item(self) -> Item {
        match self {
            Stored::New(item) | Stored::Existing(item) => item,
        }
    }
}

/// The board: items most recent first, plus file bodies.
#[derive(Debug, Default)]
pub struct BoardStore {
    items: Vec<Item>,
    files: HashMap<ContentHash, Vec<u8>>,
    last_timestamp: i64,
}

impl BoardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A creation timestamp that never repeats or goes backwards.
    pub fn next_timestamp(&mut self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    pub fn get(&self, hash: &ContentHash) -> Option<&Item> {
        self.items.iter().find(|item| item.hash == *hash)
    }

    /// Stores an item built by `make` unless its hash is already present.
    ///
    /// `make` receives a fresh timestamp.
    pub fn insert_with(
        &mut self,
        hash: &ContentHash,
        body: Option<Vec<u8>>,
        make: impl FnOnce(i64) -> Item,
    ) -> Stored {
        if let Some(existing) = self.get(hash) {
            return Stored::Existing(existing.clone());
        }

        let item = make(self.next_timestamp());
        if let Some(body) = body {
            self.files.insert(item.hash.clone(), body);
        }
        self.items.insert(0, item.clone());
        Stored::New(item)
    }

    pub fn remove(&mut self, hash: &ContentHash) -> Option<Item> {
        let idx = self.items.iter().position(|item| item.hash == *hash)?;
        self.files.remove(hash);
        Some(self.items.remove(idx))
    }

    /// File body and display name of a stored file item.
    pub fn file(&self, hash: &ContentHash) -> Option<(&[u8], &Item)> {
        let body = self.files.get(hash)?;
        let item = self.get(hash)?;
        Some((body, item))
    }

    pub fn items(&self) -> Vec<Item> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

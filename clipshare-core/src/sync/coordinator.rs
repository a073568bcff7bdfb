//! Applies protocol messages and local uploads to the item collection.
//!
//! The coordinator is the only writer of the collection. Every input is
//! applied completely or not at all, and the result is returned as an
//! [`Applied`] describing what the rendering layer should do and what, if
//! anything, must be sent back to the server.
//!
//! Ordering rules:
//! - the collection is most-recent-first; a new hash goes to the front, an
//!   existing hash is replaced in place
//! - for the same hash the later `timestamp` wins; on equal timestamps an
//!   authoritative item beats an optimistic one
//! - deletes leave a tombstone so stale adds and abandoned uploads for a
//!   deleted hash cannot bring it back
//! - `full` is absolute and ignores tombstones for the hashes it carries; it
//!   also drops every tombstone no outstanding upload depends on

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::content_hash::ContentHash;
use crate::item::Item;

use super::protocol::ProtocolMessage;

/// A change the rendering layer must reflect.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent {
    Added(Item),
    Updated(Item),
    Removed(ContentHash),
}

/// Outcome of applying one input.
#[derive(Debug, Default, PartialEq)]
pub struct Applied {
    pub events: Vec<CollectionEvent>,
    /// Message to send back to the server
    pub outgoing: Option<ProtocolMessage>,
    /// Human-readable notice for the user
    pub notice: Option<String>,
}

impl Applied {
    pub fn is_noop(&self) -> bool {
        self.events.is_empty() && self.outgoing.is_none() && self.notice.is_none()
    }
}

/// Proof that an upload started at a particular point in the local history.
///
/// Deletes seen after the ticket was issued suppress the upload's optimistic
/// add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTicket(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Optimistic,
    Authoritative,
}

#[derive(Debug, Clone)]
struct Entry {
    item: Item,
    origin: Origin,
}

#[derive(Debug, Clone, Copy)]
struct Tombstone {
    timestamp: Option<i64>,
    epoch: u64,
}

#[derive(Debug, Default)]
pub struct SyncCoordinator {
    entries: Vec<Entry>,
    tombstones: HashMap<ContentHash, Tombstone>,
    /// Bumped on every delete
    epoch: u64,
    /// Epochs of uploads begun but not yet applied or abandoned
    pending_uploads: BTreeMap<u64, usize>,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items, most recent first.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.entries.iter().map(|entry| &entry.item)
    }

    pub fn snapshot(&self) -> Vec<Item> {
        self.items().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, hash: &ContentHash) -> Option<&Item> {
        self.position(hash).map(|idx| &self.entries[idx].item)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.position(hash).is_some()
    }

    /// Items whose hash starts with `prefix`, most recent first.
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<&Item> {
        self.items()
            .filter(|item| item.hash.as_str().starts_with(prefix))
            .collect()
    }

    /// Whether the server has confirmed the item. `None` if absent.
    pub fn is_confirmed(&self, hash: &ContentHash) -> Option<bool> {
        self.position(hash)
            .map(|idx| self.entries[idx].origin == Origin::Authoritative)
    }

    /// Call before starting an upload; pass the ticket to
    /// [`apply_local_upload`](Self::apply_local_upload) when it completes, or
    /// to [`abandon_upload`](Self::abandon_upload) when it fails.
    pub fn begin_upload(&mut self) -> UploadTicket {
        *self.pending_uploads.entry(self.epoch).or_default() += 1;
        UploadTicket(self.epoch)
    }

    /// Releases the ticket of an upload that will never be applied.
    pub fn abandon_upload(&mut self, ticket: UploadTicket) {
        self.release(ticket);
    }

    /// Number of deleted hashes still remembered.
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    pub fn apply_message(&mut self, message: ProtocolMessage) -> Applied {
        let mut applied = Applied::default();

        match message {
            ProtocolMessage::Add { data, .. } => self.apply_add(data.msg, &mut applied),
            ProtocolMessage::Delete { time_stamp, data } => {
                self.apply_delete(data.file_or_text_hash, time_stamp, &mut applied)
            }
            ProtocolMessage::Full { data, .. } => self.apply_full(data.msgs, &mut applied),
            ProtocolMessage::HeartBeat { .. } => {}
            ProtocolMessage::Refresh {} => {
                applied.outgoing = Some(ProtocolMessage::refresh());
            }
            ref error @ ProtocolMessage::Error { .. } => {
                let text = error.error_text().unwrap_or_default();
                tracing::warn!("Server reported error: {}", text);
                applied.notice = Some(text);
            }
        }

        applied
    }

    /// Optimistically adds an item returned by a completed upload.
    pub fn apply_local_upload(&mut self, ticket: UploadTicket, item: Item) -> Applied {
        let mut applied = Applied::default();
        self.release(ticket);

        if let Some(tombstone) = self.tombstones.get(&item.hash) {
            if tombstone.epoch > ticket.0 {
                tracing::debug!(
                    "Suppressing upload of {}: deleted while in flight",
                    item.hash.short()
                );
                return applied;
            }
        }

        self.upsert(item, Origin::Optimistic, &mut applied);
        applied
    }

    fn apply_add(&mut self, item: Item, applied: &mut Applied) {
        if let Some(tombstone) = self.tombstones.get(&item.hash) {
            if tombstone
                .timestamp
                .is_some_and(|deleted_at| item.timestamp <= deleted_at)
            {
                tracing::debug!(
                    "Ignoring stale add of deleted item {}",
                    item.hash.short()
                );
                return;
            }
            self.tombstones.remove(&item.hash);
        }

        self.upsert(item, Origin::Authoritative, applied);
    }

    fn apply_delete(
        &mut self,
        hash: ContentHash,
        time_stamp: Option<i64>,
        applied: &mut Applied,
    ) {
        self.epoch += 1;

        let removed_at = self
            .position(&hash)
            .map(|idx| self.entries.remove(idx).item.timestamp);
        if removed_at.is_some() {
            applied.events.push(CollectionEvent::Removed(hash.clone()));
        }

        let epoch = self.epoch;
        let tombstone = self.tombstones.entry(hash).or_insert(Tombstone {
            timestamp: None,
            epoch,
        });
        tombstone.timestamp = tombstone.timestamp.max(time_stamp.or(removed_at));
        tombstone.epoch = epoch;
    }

    fn apply_full(&mut self, items: Vec<Item>, applied: &mut Applied) {
        let mut seen = HashSet::new();
        let incoming: Vec<Item> = items
            .into_iter()
            .filter(|item| seen.insert(item.hash.clone()))
            .collect();

        let mut previous: HashMap<ContentHash, Item> = HashMap::new();
        for entry in self.entries.drain(..) {
            if !seen.contains(&entry.item.hash) {
                applied
                    .events
                    .push(CollectionEvent::Removed(entry.item.hash.clone()));
            }
            previous.insert(entry.item.hash.clone(), entry.item);
        }

        for item in &incoming {
            match previous.remove(&item.hash) {
                Some(old) if old == *item => {}
                Some(_) => applied.events.push(CollectionEvent::Updated(item.clone())),
                None => applied.events.push(CollectionEvent::Added(item.clone())),
            }
            self.tombstones.remove(&item.hash);
        }

        self.entries = incoming
            .into_iter()
            .map(|item| Entry {
                item,
                origin: Origin::Authoritative,
            })
            .collect();

        self.prune_tombstones();
    }

    /// Drops tombstones that neither a stale add nor an upload can still hit.
    ///
    /// After a `full` the server has answered for every earlier delete, so a
    /// tombstone only matters while an upload begun before it is in flight.
    fn prune_tombstones(&mut self) {
        let oldest_pending = self.pending_uploads.keys().next().copied();
        let before = self.tombstones.len();
        self.tombstones.retain(|_, tombstone| {
            oldest_pending.is_some_and(|ticket_epoch| tombstone.epoch > ticket_epoch)
        });

        let pruned = before - self.tombstones.len();
        if pruned > 0 {
            tracing::debug!("Pruned {} tombstones", pruned);
        }
    }

    fn release(&mut self, ticket: UploadTicket) {
        if let Some(count) = self.pending_uploads.get_mut(&ticket.0) {
            *count -= 1;
            if *count == 0 {
                self.pending_uploads.remove(&ticket.0);
            }
        }
    }

    fn upsert(&mut self, item: Item, origin: Origin, applied: &mut Applied) {
        let Some(idx) = self.position(&item.hash) else {
            applied.events.push(CollectionEvent::Added(item.clone()));
            self.entries.insert(0, Entry { item, origin });
            return;
        };

        let entry = &mut self.entries[idx];
        if !supersedes(item.timestamp, origin, entry.item.timestamp, entry.origin) {
            tracing::debug!("Ignoring stale update of {}", item.hash.short());
            return;
        }

        let changed = entry.item != item;
        if changed
            && origin == Origin::Authoritative
            && entry.origin == Origin::Authoritative
            && entry.item.timestamp == item.timestamp
        {
            tracing::debug!(
                "Conflicting content for {} at timestamp {}, keeping the later delivery",
                item.hash.short(),
                item.timestamp
            );
        }

        entry.item = item;
        entry.origin = origin;
        if changed {
            applied
                .events
                .push(CollectionEvent::Updated(entry.item.clone()));
        }
    }

    fn position(&self, hash: &ContentHash) -> Option<usize> {
        self.entries.iter().position(|entry| entry.item.hash == *hash)
    }
}

fn supersedes(new_ts: i64, new_origin: Origin, old_ts: i64, old_origin: Origin) -> bool {
    match new_ts.cmp(&old_ts) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
            !(new_origin == Origin::Optimistic && old_origin == Origin::Authoritative)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str, timestamp: i64) -> Item {
        Item::text(ContentHash::of_text(content), timestamp, content)
    }

    fn hashes(coordinator: &SyncCoordinator) -> Vec<ContentHash> {
        coordinator.items().map(|item| item.hash.clone()).collect()
    }

    fn delete(item: &Item) -> ProtocolMessage {
        ProtocolMessage::delete(item.hash.clone())
    }

    #[test]
    fn test_add_inserts_at_front() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 1);
        let b = text("b", 2);

        let applied = coordinator.apply_message(ProtocolMessage::add(a.clone()));
        assert_eq!(applied.events, vec![CollectionEvent::Added(a.clone())]);
        coordinator.apply_message(ProtocolMessage::add(b.clone()));

        assert_eq!(hashes(&coordinator), vec![b.hash, a.hash]);
    }

    #[test]
    fn test_readd_updates_in_place() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 1);
        let b = text("b", 2);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));
        coordinator.apply_message(ProtocolMessage::add(b.clone()));

        let mut newer = a.clone();
        newer.timestamp = 5;
        let applied = coordinator.apply_message(ProtocolMessage::add(newer.clone()));

        assert_eq!(applied.events, vec![CollectionEvent::Updated(newer.clone())]);
        assert_eq!(hashes(&coordinator), vec![b.hash.clone(), a.hash.clone()]);
        assert_eq!(coordinator.get(&a.hash).unwrap().timestamp, 5);
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 1);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));
        let applied = coordinator.apply_message(ProtocolMessage::add(a.clone()));

        assert!(applied.is_noop());
        assert_eq!(coordinator.len(), 1);
    }

    #[test]
    fn test_stale_add_ignored() {
        let mut coordinator = SyncCoordinator::new();
        let mut a = text("a", 10);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));

        a.timestamp = 3;
        let applied = coordinator.apply_message(ProtocolMessage::add(a.clone()));
        assert!(applied.is_noop());
        assert_eq!(coordinator.get(&a.hash).unwrap().timestamp, 10);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 1);
        let b = text("b", 2);
        coordinator.apply_message(ProtocolMessage::full(vec![a.clone(), b.clone()]));

        let first = coordinator.apply_message(delete(&a));
        assert_eq!(first.events, vec![CollectionEvent::Removed(a.hash.clone())]);
        let after_once = coordinator.snapshot();

        let second = coordinator.apply_message(delete(&a));
        assert!(second.is_noop());
        assert_eq!(coordinator.snapshot(), after_once);
        assert_eq!(after_once, vec![b]);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut coordinator = SyncCoordinator::new();
        let applied = coordinator.apply_message(delete(&text("ghost", 1)));
        assert!(applied.is_noop());
        assert!(coordinator.is_empty());
    }

    #[test]
    fn test_full_replaces_everything() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 1);
        let b = text("b", 2);
        let c = text("c", 3);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));
        coordinator.apply_message(ProtocolMessage::add(b.clone()));

        let mut b2 = b.clone();
        b2.timestamp = 7;
        let applied = coordinator.apply_message(ProtocolMessage::full(vec![c.clone(), b2.clone()]));

        assert_eq!(
            applied.events,
            vec![
                CollectionEvent::Removed(a.hash.clone()),
                CollectionEvent::Added(c.clone()),
                CollectionEvent::Updated(b2.clone()),
            ]
        );
        assert_eq!(coordinator.snapshot(), vec![c, b2]);
    }

    #[test]
    fn test_full_is_idempotent_and_absolute() {
        let set = vec![text("x", 1), text("y", 2)];

        let mut coordinator = SyncCoordinator::new();
        coordinator.apply_message(ProtocolMessage::add(text("junk", 50)));
        coordinator.apply_message(delete(&set[0]));
        let ticket = coordinator.begin_upload();
        coordinator.apply_local_upload(ticket, text("local", 60));

        coordinator.apply_message(ProtocolMessage::full(set.clone()));
        assert_eq!(coordinator.snapshot(), set);

        let again = coordinator.apply_message(ProtocolMessage::full(set.clone()));
        assert!(again.is_noop());
        assert_eq!(coordinator.snapshot(), set);
    }

    #[test]
    fn test_full_keeps_first_of_duplicate_hashes() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 1);
        let mut a_dup = a.clone();
        a_dup.timestamp = 9;

        coordinator.apply_message(ProtocolMessage::full(vec![a.clone(), a_dup]));
        assert_eq!(coordinator.snapshot(), vec![a]);
    }

    #[test]
    fn test_full_then_delete() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("A", 1);
        let b = text("B", 2);
        coordinator.apply_message(ProtocolMessage::full(vec![a.clone(), b.clone()]));
        coordinator.apply_message(delete(&a));
        assert_eq!(coordinator.snapshot(), vec![b]);
    }

    #[test]
    fn test_optimistic_add_reconciled_by_authoritative_add() {
        let mut coordinator = SyncCoordinator::new();
        let h1 = text("hello", 100);

        let ticket = coordinator.begin_upload();
        let applied = coordinator.apply_local_upload(ticket, h1.clone());
        assert_eq!(applied.events, vec![CollectionEvent::Added(h1.clone())]);
        assert_eq!(coordinator.is_confirmed(&h1.hash), Some(false));

        // Same content from the server: no duplicate and no flicker
        let applied = coordinator.apply_message(ProtocolMessage::add(h1.clone()));
        assert!(applied.events.is_empty());
        assert_eq!(coordinator.len(), 1);
        assert_eq!(coordinator.is_confirmed(&h1.hash), Some(true));
    }

    #[test]
    fn test_authoritative_wins_equal_timestamp() {
        let mut coordinator = SyncCoordinator::new();
        let hash = ContentHash::of_file(b"data");
        let local = Item::file(hash.clone(), 100, 4, "/tmp/local", None);
        let server = Item::file(hash.clone(), 100, 4, "/files/abc", Some("data.bin".into()));

        let ticket = coordinator.begin_upload();
        coordinator.apply_local_upload(ticket, local);
        let applied = coordinator.apply_message(ProtocolMessage::add(server.clone()));
        assert_eq!(applied.events, vec![CollectionEvent::Updated(server.clone())]);

        // A late optimistic copy at the same timestamp does not win back
        let local_again = Item::file(hash.clone(), 100, 4, "/tmp/local", None);
        let ticket = coordinator.begin_upload();
        let applied = coordinator.apply_local_upload(ticket, local_again);
        assert!(applied.is_noop());
        assert_eq!(coordinator.get(&hash), Some(&server));
    }

    #[test]
    fn test_delete_suppresses_pending_upload() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 10);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));

        let ticket = coordinator.begin_upload();
        coordinator.apply_message(delete(&a));

        let applied = coordinator.apply_local_upload(ticket, a.clone());
        assert!(applied.is_noop());
        assert!(!coordinator.contains(&a.hash));
    }

    #[test]
    fn test_upload_started_after_delete_is_applied() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 10);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));
        coordinator.apply_message(delete(&a));

        let ticket = coordinator.begin_upload();
        let mut again = a.clone();
        again.timestamp = 20;
        let applied = coordinator.apply_local_upload(ticket, again.clone());
        assert_eq!(applied.events, vec![CollectionEvent::Added(again)]);
    }

    #[test]
    fn test_tombstone_blocks_replayed_add() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 10);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));
        coordinator.apply_message(delete(&a));

        // A replay of the original add is stale
        assert!(coordinator
            .apply_message(ProtocolMessage::add(a.clone()))
            .is_noop());

        // A genuine re-add is newer
        let mut readd = a.clone();
        readd.timestamp = 11;
        let applied = coordinator.apply_message(ProtocolMessage::add(readd.clone()));
        assert_eq!(applied.events, vec![CollectionEvent::Added(readd)]);
    }

    #[test]
    fn test_full_prunes_tombstones() {
        let mut coordinator = SyncCoordinator::new();
        for i in 0..20 {
            let item = text(&format!("gone {}", i), i);
            coordinator.apply_message(ProtocolMessage::add(item.clone()));
            coordinator.apply_message(delete(&item));
        }
        assert_eq!(coordinator.tombstone_count(), 20);

        coordinator.apply_message(ProtocolMessage::full(vec![text("kept", 100)]));
        assert_eq!(coordinator.tombstone_count(), 0);
    }

    #[test]
    fn test_full_keeps_tombstones_pending_uploads_need() {
        let mut coordinator = SyncCoordinator::new();
        let old = text("old", 1);
        coordinator.apply_message(ProtocolMessage::add(old.clone()));
        coordinator.apply_message(delete(&old));

        let a = text("a", 10);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));
        let ticket = coordinator.begin_upload();
        coordinator.apply_message(delete(&a));

        // Only the delete seen after the upload began survives
        coordinator.apply_message(ProtocolMessage::full(Vec::new()));
        assert_eq!(coordinator.tombstone_count(), 1);

        assert!(coordinator.apply_local_upload(ticket, a.clone()).is_noop());
        assert!(!coordinator.contains(&a.hash));

        coordinator.apply_message(ProtocolMessage::full(Vec::new()));
        assert_eq!(coordinator.tombstone_count(), 0);
    }

    #[test]
    fn test_abandoned_upload_releases_tombstones() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 10);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));
        let ticket = coordinator.begin_upload();
        coordinator.apply_message(delete(&a));

        coordinator.abandon_upload(ticket);
        coordinator.apply_message(ProtocolMessage::full(Vec::new()));
        assert_eq!(coordinator.tombstone_count(), 0);
    }

    #[test]
    fn test_find_by_prefix() {
        let mut coordinator = SyncCoordinator::new();
        let a = text("a", 1);
        coordinator.apply_message(ProtocolMessage::add(a.clone()));
        coordinator.apply_message(ProtocolMessage::add(text("b", 2)));

        assert_eq!(coordinator.find_by_prefix(a.hash.short()), vec![&a]);
        assert_eq!(coordinator.find_by_prefix("").len(), 2);
        assert!(coordinator.find_by_prefix("not-a-hash").is_empty());
    }

    #[test]
    fn test_control_messages() {
        let mut coordinator = SyncCoordinator::new();
        coordinator.apply_message(ProtocolMessage::add(text("a", 1)));
        let before = coordinator.snapshot();

        assert!(coordinator
            .apply_message(ProtocolMessage::heartbeat())
            .is_noop());

        let refresh = coordinator.apply_message(ProtocolMessage::refresh());
        assert_eq!(refresh.outgoing, Some(ProtocolMessage::refresh()));
        assert!(refresh.events.is_empty());

        let error = coordinator.apply_message(ProtocolMessage::error("quota exceeded"));
        assert_eq!(error.notice.as_deref(), Some("quota exceeded"));
        assert!(error.events.is_empty());

        assert_eq!(coordinator.snapshot(), before);
    }

    /// Small deterministic generator so the replay test needs no extra crates.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self, bound: u64) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) % bound
        }
    }

    #[test]
    fn test_replay_matches_log_semantics() {
        let contents = ["a", "b", "c", "d", "e"];

        for seed in 0..50 {
            let mut rng = Lcg(seed);
            let mut coordinator = SyncCoordinator::new();
            // Reference model: the board as a plain log replay
            let mut model: Vec<Item> = Vec::new();
            let mut clock = 0i64;

            for _ in 0..40 {
                let content = contents[rng.next(contents.len() as u64) as usize];
                clock += 1;
                match rng.next(10) {
                    0..=5 => {
                        let item = text(content, clock);
                        coordinator.apply_message(ProtocolMessage::add(item.clone()));
                        match model.iter_mut().find(|m| m.hash == item.hash) {
                            Some(existing) => *existing = item,
                            None => model.insert(0, item),
                        }
                    }
                    6..=8 => {
                        let hash = ContentHash::of_text(content);
                        coordinator.apply_message(ProtocolMessage::delete(hash.clone()));
                        model.retain(|m| m.hash != hash);
                    }
                    _ => {
                        let count = rng.next(4) as usize;
                        let set: Vec<Item> = contents[..count]
                            .iter()
                            .map(|c| text(c, clock))
                            .collect();
                        coordinator.apply_message(ProtocolMessage::full(set.clone()));
                        model = set;
                    }
                }

                let unique: HashSet<_> = coordinator.items().map(|i| i.hash.clone()).collect();
                assert_eq!(unique.len(), coordinator.len(), "duplicate hash, seed {}", seed);
            }

            assert_eq!(coordinator.snapshot(), model, "seed {}", seed);
        }
    }
}

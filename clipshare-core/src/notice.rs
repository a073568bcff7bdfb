//! Transient user notices.
//!
//! A notice is visible for [`NOTICE_HOLD`], fades for [`NOTICE_FADE`] and is
//! then recycled. Each step is reported as a [`NoticeEvent`] naming the slot,
//! so a renderer can follow one notice from appearance to removal. Handles come from a [`ResourcePool`] so bursts of notices
//! (a flapping connection, a run of failed uploads) reuse a bounded set of
//! slots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::pool::{Poolable, ResourcePool};

pub const NOTICE_HOLD: Duration = Duration::from_secs(1);
pub const NOTICE_FADE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticePhase {
    Visible,
    Fading,
}

/// A notice moving to its next phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeEvent {
    Fading(u64),
    Expired(u64),
}

/// A reusable notice slot.
#[derive(Debug)]
pub struct NoticeHandle {
    slot: u64,
    text: String,
    shown_at: Option<Instant>,
    reported: NoticePhase,
}

impl NoticeHandle {
    pub fn slot(&self) -> u64 {
        self.slot
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn phase(&self, now: Instant) -> Option<NoticePhase> {
        let elapsed = now.saturating_duration_since(self.shown_at?);
        if elapsed < NOTICE_HOLD {
            Some(NoticePhase::Visible)
        } else if elapsed < NOTICE_HOLD + NOTICE_FADE {
            Some(NoticePhase::Fading)
        } else {
            None
        }
    }

    /// When this notice next changes phase.
    fn deadline(&self) -> Option<Instant> {
        let shown_at = self.shown_at?;
        Some(match self.reported {
            NoticePhase::Visible => shown_at + NOTICE_HOLD,
            NoticePhase::Fading => shown_at + NOTICE_HOLD + NOTICE_FADE,
        })
    }
}

impl Poolable for NoticeHandle {
    fn reset(&mut self) {
        self.text.clear();
        self.shown_at = None;
        self.reported = NoticePhase::Visible;
    }
}

#[derive(Debug)]
pub struct NoticeBoard {
    pool: ResourcePool<NoticeHandle>,
    active: Vec<NoticeHandle>,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeBoard {
    pub fn new() -> Self {
        let next_slot = Arc::new(AtomicU64::new(0));
        let pool = ResourcePool::new(move || NoticeHandle {
            slot: next_slot.fetch_add(1, Ordering::Relaxed),
            text: String::new(),
            shown_at: None,
            reported: NoticePhase::Visible,
        });

        Self {
            pool,
            active: Vec::new(),
        }
    }

    /// Show a notice; returns the slot it occupies.
    pub fn show(&mut self, text: &str, now: Instant) -> u64 {
        let mut handle = self.pool.get();
        handle.text.push_str(text);
        handle.shown_at = Some(now);

        let slot = handle.slot;
        self.active.push(handle);
        slot
    }

    /// Moves notices along: reports those that started fading and recycles
    /// those that finished. A notice whose whole fade was missed is only
    /// reported as expired.
    pub fn expire(&mut self, now: Instant) -> Vec<NoticeEvent> {
        let mut events = Vec::new();
        let mut still_active = Vec::with_capacity(self.active.len());

        for mut handle in self.active.drain(..) {
            match handle.phase(now) {
                None => {
                    events.push(NoticeEvent::Expired(handle.slot));
                    self.pool.recycle(handle);
                }
                Some(NoticePhase::Fading) if handle.reported == NoticePhase::Visible => {
                    handle.reported = NoticePhase::Fading;
                    events.push(NoticeEvent::Fading(handle.slot));
                    still_active.push(handle);
                }
                Some(_) => still_active.push(handle),
            }
        }

        self.active = still_active;
        events
    }

    /// Drops every notice at once, e.g. when the session stops.
    pub fn clear(&mut self) -> Vec<NoticeEvent> {
        let mut events = Vec::with_capacity(self.active.len());
        for handle in self.active.drain(..) {
            events.push(NoticeEvent::Expired(handle.slot));
            self.pool.recycle(handle);
        }
        events
    }

    /// Notices still on screen, oldest first.
    pub fn showing(&self, now: Instant) -> Vec<(&str, NoticePhase)> {
        self.active
            .iter()
            .filter_map(|handle| handle.phase(now).map(|phase| (handle.text(), phase)))
            .collect()
    }

    /// The next moment any active notice changes phase.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.iter().filter_map(NoticeHandle::deadline).min()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn pool(&self) -> &ResourcePool<NoticeHandle> {
        &self.pool
    }
}

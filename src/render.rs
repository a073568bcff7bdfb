//! Terminal rendering of the board.

use std::collections::HashMap;

use chrono::{Local, TimeZone};
use clipshare_core::{ConnectionState, ContentHash, Item, ItemKind, RenderSink};

/// Labels longer than this are shortened with `[...]`.
pub const MAX_LABEL_CHARS: usize = 30;

const ELLIPSIS: &str = "[...]";

/// Shortens a text snippet or file name for a one-line listing.
///
/// File names keep their extension (`long_na[...].pdf`); names without one
/// keep their last six characters. Text is cut and suffixed.
pub fn shorten_label(label: &str, kind: ItemKind) -> String {
    let chars: Vec<char> = label.chars().collect();
    if chars.len() <= MAX_LABEL_CHARS {
        return label.to_string();
    }

    let head = |n: usize| chars[..n.min(chars.len())].iter().collect::<String>();

    match kind {
        ItemKind::Text => format!("{}{}", head(MAX_LABEL_CHARS), ELLIPSIS),
        ItemKind::File => match chars.iter().rposition(|c| *c == '.') {
            Some(dot) if dot > 0 => {
                let ext: String = chars[dot..].iter().collect();
                let keep = MAX_LABEL_CHARS.saturating_sub(chars.len() - dot);
                format!("{}{}{}", head(keep), ELLIPSIS, ext)
            }
            _ => {
                let tail: String = chars[chars.len() - 6..].iter().collect();
                format!("{}{}{}", head(MAX_LABEL_CHARS - 6), ELLIPSIS, tail)
            }
        },
    }
}

/// Shortened label of an item, with line breaks flattened.
pub fn item_label(item: &Item) -> String {
    let flat = item.label().replace(['\r', '\n', '\t'], " ");
    shorten_label(&flat, item.kind())
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{:.2} {}", value, unit)
}

/// Local time of a millisecond timestamp, `YYYY-MM-DD HH:MM:SS`.
pub fn format_time(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

/// Upload progress as a percentage; 100% only once the upload is confirmed.
pub fn format_progress(fraction: f64) -> String {
    if fraction >= 1.0 {
        return "100%".to_string();
    }
    let percent = (fraction * 100.0).clamp(0.0, 99.9);
    format!("{:.1}%", percent)
}

/// One listing line for an item.
pub fn item_line(item: &Item) -> String {
    let size = match item.kind() {
        ItemKind::File => format_size(item.size),
        ItemKind::Text => String::new(),
    };
    format!(
        "{:<8}  {:<4}  {:<35}  {:>10}  {}",
        item.hash.short(),
        item.kind(),
        item_label(item),
        size,
        format_time(item.timestamp)
    )
}

/// A notice the renderer knows is on screen.
#[derive(Debug)]
struct ShownNotice {
    text: String,
    fading: bool,
}

/// Prints board changes as they happen.
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    /// Last progress step printed per upload, in tenths of a percent
    last_progress: HashMap<ContentHash, u32>,
    notices: HashMap<u64, ShownNotice>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a notice in its slot. Returns the line to print, or `None` when
    /// the same text is already fully visible in another slot.
    fn notice_line(&mut self, slot: u64, text: &str) -> Option<String> {
        let repeated = self
            .notices
            .values()
            .any(|shown| !shown.fading && shown.text == text);
        self.notices.insert(
            slot,
            ShownNotice {
                text: text.to_string(),
                fading: false,
            },
        );
        (!repeated).then(|| format!("! {}", text))
    }
}

impl RenderSink for TerminalRenderer {
    fn on_item_added(&mut self, item: &Item) {
        println!("+ {}", item_line(item));
    }

    fn on_item_updated(&mut self, item: &Item) {
        println!("~ {}", item_line(item));
    }

    fn on_item_removed(&mut self, hash: &ContentHash) {
        println!("- {}", hash.short());
    }

    fn on_connection_state_changed(&mut self, state: ConnectionState) {
        eprintln!("[{}]", state);
    }

    fn on_upload_progress(&mut self, hash: &ContentHash, progress: f64) {
        // Print at most every 10%
        let step = (progress * 10.0).floor() as u32;
        let last = self.last_progress.get(hash).copied();
        if last.is_some_and(|last| step <= last) && progress < 1.0 {
            return;
        }
        eprintln!("Uploading {}: {}", hash.short(), format_progress(progress));
        if progress >= 1.0 {
            self.last_progress.remove(hash);
        } else {
            self.last_progress.insert(hash.clone(), step);
        }
    }

    fn on_notice(&mut self, slot: u64, text: &str) {
        if let Some(line) = self.notice_line(slot, text) {
            eprintln!("{}", line);
        }
    }

    fn on_notice_fading(&mut self, slot: u64) {
        if let Some(shown) = self.notices.get_mut(&slot) {
            shown.fading = true;
        }
    }

    fn on_notice_expired(&mut self, slot: u64) {
        if self.notices.remove(&slot).is_none() {
            tracing::debug!("Notice slot {} expired twice", slot);
        }
    }
}

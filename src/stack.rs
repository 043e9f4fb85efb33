use core::cmp::Ordering;
use core::fmt;

use embassy_time::{Duration, Instant};
use heapless::{String, Vec};

use crate::color::Rgb;
use crate::error::{Error, Result};
use crate::fade::{FadeStep, evaluate};

/// Maximum number of bytes in a stack key
pub const KEY_CAPACITY: usize = 32;

/// Maximum number of entries in one light stack
pub const MAX_STACK_DEPTH: usize = 16;

/// Identifies the logical source of a color command (a mode, a show step...)
///
/// Keys order by their bytes, which is the tie-break between entries of equal
/// priority. The empty key is used when a caller does not name itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackKey(String<KEY_CAPACITY>);

impl StackKey {
    /// Create a key from a string
    ///
    /// Returns [`Error::KeyTooLong`] if `key` exceeds [`KEY_CAPACITY`] bytes.
    pub fn new(key: &str) -> Result<Self> {
        let mut inner = String::new();
        inner.push_str(key).map_err(|()| Error::KeyTooLong)?;
        Ok(Self(inner))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for StackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pending color command on a light
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    /// Higher wins; ties are broken by `key`
    pub priority: i32,
    pub key: StackKey,
    /// Time the command was issued
    pub start_time: Instant,
    /// Color at `start_time`; `None` only for entries without a fade
    pub start_color: Option<Rgb>,
    /// End of the fade; `None` means the command applies instantly
    pub dest_time: Option<Instant>,
    /// Target color; `None` marks a transparent fade-out entry
    pub dest_color: Option<Rgb>,
}

impl StackEntry {
    /// Check if this entry is a fade-out revealing the entries below it
    pub const fn is_transparent(&self) -> bool {
        self.dest_color.is_none()
    }

    /// Check if the entry's fade is still running at `now`
    pub fn is_fading(&self, now: Instant) -> bool {
        self.dest_time.is_some_and(|dest_time| dest_time > now)
    }

    /// Stack order: descending by priority, then by key
    fn stack_order(&self, priority: i32, key: &StackKey) -> Ordering {
        (priority, key).cmp(&(self.priority, &self.key))
    }
}

/// Priority stack of color commands for one light
///
/// Always sorted by `(priority, key)` descending, with at most one entry per
/// key. The first entry is the one on top.
#[derive(Debug, Clone, Default)]
pub struct LightStack {
    entries: Vec<StackEntry, MAX_STACK_DEPTH>,
}

impl LightStack {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Entries from top to bottom
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry on top of the stack
    pub fn top(&self) -> Option<&StackEntry> {
        self.entries.first()
    }

    /// Position of the entry for `key`
    pub fn position(&self, key: &StackKey) -> Option<usize> {
        self.entries.iter().position(|entry| entry.key == *key)
    }

    /// Get the entry for `key`
    pub fn get(&self, key: &StackKey) -> Option<&StackEntry> {
        self.entries.iter().find(|entry| entry.key == *key)
    }

    /// Insert an entry, replacing any entry with the same key
    pub fn insert(&mut self, entry: StackEntry) -> Result<()> {
        self.remove(&entry.key);

        let index = self
            .entries
            .iter()
            .position(|existing| existing.stack_order(entry.priority, &entry.key).is_gt())
            .unwrap_or(self.entries.len());
        self.entries.insert(index, entry).map_err(|_| Error::StackFull)?;

        self.debug_check();
        Ok(())
    }

    /// Remove the entry for `key`
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&mut self, key: &StackKey) -> bool {
        let Some(index) = self.position(key) else {
            return false;
        };
        self.entries.remove(index);
        true
    }

    /// Remove the transparent fade-out entry for `key`, keeping an opaque one
    ///
    /// Returns `Some(visible)` if a fade-out was removed, where `visible` tells
    /// whether no opaque entry sat above it.
    pub fn remove_fade_out(&mut self, key: &StackKey) -> Option<bool> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.key == *key && entry.is_transparent())?;
        let visible = self.is_visible_at(index);
        self.entries.remove(index);
        Some(visible)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Check if no opaque entry sits above `index`
    pub fn is_visible_at(&self, index: usize) -> bool {
        self.entries
            .iter()
            .take(index)
            .all(StackEntry::is_transparent)
    }

    /// Entries at or below the `(priority, key)` position
    pub fn below(&self, priority: i32, key: &StackKey) -> &[StackEntry] {
        let start = self
            .entries
            .iter()
            .position(|entry| entry.stack_order(priority, key).is_ge())
            .unwrap_or(self.entries.len());
        self.entries.get(start..).unwrap_or_default()
    }

    /// Entries starting with the one for `key`
    pub fn from_key(&self, key: &StackKey) -> &[StackEntry] {
        match self.position(key) {
            Some(index) => self.entries.get(index..).unwrap_or_default(),
            None => &[],
        }
    }

    /// Evaluate the stack at `now`, looking at most `max_fade` ahead
    pub fn evaluate(&self, max_fade: Duration, now: Instant) -> FadeStep<Rgb> {
        evaluate(&self.entries, max_fade, now)
    }

    fn debug_check(&self) {
        debug_assert!(
            self.entries
                .windows(2)
                .all(|pair| pair[1].stack_order(pair[0].priority, &pair[0].key).is_gt()),
            "light stack out of order"
        );
        debug_assert!(
            self.entries.iter().enumerate().all(|(index, entry)| {
                self.entries[index + 1..]
                    .iter()
                    .all(|other| other.key != entry.key)
            }),
            "light stack with duplicate keys"
        );
    }
}

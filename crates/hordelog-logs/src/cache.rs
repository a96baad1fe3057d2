use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use hordelog_types::{LogLevel, LogLine};

/// Shared, copy-on-change view of the slot array.
///
/// A new `Arc` is produced whenever the array grows, so readers can detect
/// growth with [`Arc::ptr_eq`]. Slots themselves are shared between versions.
pub type SlotList = Arc<Vec<Arc<LogLineSlot>>>;

/// One line position in a log
pub struct LogLineSlot {
    index: usize,

    /// Set once a fetch covering this index has been issued; never cleared
    requested: AtomicBool,

    /// Line content, filled in when the fetch completes
    line: RwLock<Option<Arc<LogLine>>>,
}

impl LogLineSlot {
    fn new(index: usize) -> Self {
        Self {
            index,
            requested: AtomicBool::new(false),
            line: RwLock::new(None),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn is_populated(&self) -> bool {
        self.line.read().is_some()
    }

    /// Line content if it has arrived
    pub fn line(&self) -> Option<Arc<LogLine>> {
        self.line.read().clone()
    }

    /// Mark as requested; true if this call was the one that set the flag
    fn claim(&self) -> bool {
        !self.requested.swap(true, Ordering::AcqRel)
    }

    /// Store line content; true if the slot was empty before
    fn populate(&self, line: LogLine) -> bool {
        // A line can arrive for a slot that was never claimed when the server
        // returns more than was asked for.
        self.requested.store(true, Ordering::Release);
        let mut slot = self.line.write();
        let was_empty = slot.is_none();
        *slot = Some(Arc::new(line));
        was_empty
    }
}

impl std::fmt::Debug for LogLineSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLineSlot")
            .field("index", &self.index)
            .field("requested", &self.is_requested())
            .field("populated", &self.is_populated())
            .finish()
    }
}

/// Sparse, append-only cache of log lines
pub struct LogLineCache {
    /// Current slot array (replaced wholesale on growth)
    slots: RwLock<SlotList>,

    /// Number of slots holding content
    populated: AtomicUsize,

    /// Set by `clear`, read under the slots lock
    closed: AtomicBool,
}

impl LogLineCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Arc::new(Vec::new())),
            populated: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Current slot array
    pub fn items(&self) -> SlotList {
        Arc::clone(&*self.slots.read())
    }

    /// Number of slots (the last known line count)
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots whose content has arrived
    pub fn populated(&self) -> usize {
        self.populated.load(Ordering::Relaxed)
    }

    /// Get a single slot
    pub fn get(&self, index: usize) -> Option<Arc<LogLineSlot>> {
        self.slots.read().get(index).cloned()
    }

    /// Get the content of a single line, if loaded
    pub fn line(&self, index: usize) -> Option<Arc<LogLine>> {
        self.get(index).and_then(|slot| slot.line())
    }

    /// Grow to `line_count` slots. Never shrinks, and never grows once
    /// cleared.
    ///
    /// Returns the new array only when slots were added.
    pub fn resize(&self, line_count: usize) -> Option<SlotList> {
        let mut slots = self.slots.write();
        let current = slots.len();
        if line_count <= current || self.closed.load(Ordering::Acquire) {
            return None;
        }

        let mut next = Vec::with_capacity(line_count);
        next.extend(slots.iter().cloned());
        next.extend((current..line_count).map(|i| Arc::new(LogLineSlot::new(i))));

        let next = Arc::new(next);
        *slots = Arc::clone(&next);
        Some(next)
    }

    /// Mark every in-bounds, not yet requested index in the window as
    /// requested.
    ///
    /// Returns the smallest range covering the newly claimed indices, or
    /// `None` when there is nothing new to fetch.
    pub fn claim(&self, start: usize, count: usize) -> Option<Range<usize>> {
        let slots = self.items();
        let end = start.saturating_add(count).min(slots.len());
        if start >= end {
            return None;
        }

        let mut first = None;
        let mut last = start;
        for slot in &slots[start..end] {
            if slot.claim() {
                first.get_or_insert(slot.index);
                last = slot.index;
            }
        }

        first.map(|first| first..last + 1)
    }

    /// Store fetched lines starting at `first`. Lines past the end of the
    /// cache are dropped.
    ///
    /// Returns the number of slots that became populated.
    pub fn populate(&self, first: usize, lines: Vec<LogLine>) -> usize {
        let slots = self.items();
        let mut added = 0;
        for (offset, line) in lines.into_iter().enumerate() {
            let Some(slot) = slots.get(first + offset) else {
                break;
            };
            if slot.populate(line) {
                added += 1;
            }
        }
        self.populated.fetch_add(added, Ordering::Relaxed);
        added
    }

    /// Get entry count per log level over loaded lines
    pub fn level_counts(&self) -> LevelCounts {
        let mut counts = LevelCounts::default();
        for slot in self.items().iter() {
            let Some(line) = slot.line() else {
                continue;
            };
            match line.level {
                LogLevel::Trace => counts.trace += 1,
                LogLevel::Debug => counts.debug += 1,
                LogLevel::Info => counts.info += 1,
                LogLevel::Warn => counts.warn += 1,
                LogLevel::Error => counts.error += 1,
                LogLevel::Fatal => counts.fatal += 1,
                LogLevel::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// Drop every slot for good. Only used on teardown.
    pub fn clear(&self) {
        let mut slots = self.slots.write();
        self.closed.store(true, Ordering::Release);
        *slots = Arc::new(Vec::new());
        self.populated.store(0, Ordering::SeqCst);
    }
}

impl Default for LogLineCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts per log level
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub trace: usize,
    pub debug: usize,
    pub info: usize,
    pub warn: usize,
    pub error: usize,
    pub fatal: usize,
    pub unknown: usize,
}

impl LevelCounts {
    pub fn total(&self) -> usize {
        self.trace + self.debug + self.info + self.warn + self.error + self.fatal + self.unknown
    }
}

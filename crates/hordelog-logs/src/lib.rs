//! Incrementally loaded Horde logs
//!
//! This crate provides the sparse line cache, the polling log source with its
//! job and lease variants, line formatting, and filtering.

mod cache;
mod error;
mod filter;
mod formatter;
mod job;
mod lease;
mod source;
mod target;

pub use cache::{LevelCounts, LogLineCache, LogLineSlot, SlotList};
pub use error::{Result, SourceError};
pub use filter::{CompiledFilter, FilterPresets};
pub use formatter::{LineFormatter, LineSegment};
pub use job::JobLink;
pub use lease::LeaseLink;
pub use source::{
    DEFAULT_POLL_INTERVAL, LoadOutcome, LogSource, SourceKind, SourceOptions, SourcePhase,
    SourceSnapshot, SourceVariant,
};
pub use target::{LogTarget, SourceQuery, resolve_target};

// Re-export types used in our public API
pub use hordelog_types::{LogLevel, LogLine};

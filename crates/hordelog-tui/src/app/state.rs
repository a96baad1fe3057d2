use std::ops::Range;

use hordelog_logs::{CompiledFilter, SlotList};
use hordelog_types::LogEvent;

/// UI-specific transient state
pub struct UiState {
    /// Is help overlay visible?
    pub help_visible: bool,

    /// Is the search bar taking input?
    pub search_active: bool,

    /// Current search input text
    pub search_input: String,

    /// Compiled search (None = nothing to highlight)
    pub active_filter: Option<CompiledFilter>,

    /// Search input error message (e.g., invalid regex)
    pub filter_error: Option<String>,

    pub filter_case_insensitive: bool,

    /// Index of the first visible line
    pub log_scroll: usize,

    /// Keep the view pinned to the tail as the log grows
    pub follow: bool,

    /// Line picked by an event jump or search
    pub selected_line: Option<usize>,

    /// Transient message shown in the status area
    pub message: Option<String>,

    /// Lines that fit in the log pane; updated on every render
    pub viewport_height: usize,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            help_visible: false,
            search_active: false,
            search_input: String::new(),
            active_filter: None,
            filter_error: None,
            filter_case_insensitive: true,
            log_scroll: 0,
            follow: false,
            selected_line: None,
            message: None,
            viewport_height: 1,
        }
    }
}

/// Viewer state
pub struct AppState {
    pub ui_state: UiState,

    /// Whether the viewer should exit
    pub should_quit: bool,

    /// Dirty flag for rendering - only render when true
    pub render_dirty: bool,

    /// Line fetches are aligned to multiples of this
    pub page_size: usize,
}

impl AppState {
    pub fn new(page_size: usize) -> Self {
        Self {
            ui_state: UiState::default(),
            should_quit: false,
            render_dirty: true,
            page_size: page_size.max(1),
        }
    }

    fn max_scroll(&self, line_count: usize) -> usize {
        line_count.saturating_sub(self.ui_state.viewport_height.max(1))
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.ui_state.follow = false;
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: usize, line_count: usize) {
        let max = self.max_scroll(line_count);
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_add(lines).min(max);
    }

    pub fn page_up(&mut self) {
        self.scroll_up(self.ui_state.viewport_height.max(1));
    }

    pub fn page_down(&mut self, line_count: usize) {
        self.scroll_down(self.ui_state.viewport_height.max(1), line_count);
    }

    pub fn scroll_to_top(&mut self) {
        self.ui_state.follow = false;
        self.ui_state.log_scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self, line_count: usize) {
        self.ui_state.follow = true;
        self.ui_state.log_scroll = self.max_scroll(line_count);
    }

    pub fn toggle_follow(&mut self, line_count: usize) {
        if self.ui_state.follow {
            self.ui_state.follow = false;
        } else {
            self.scroll_to_bottom(line_count);
        }
    }

    /// Keep the scroll position valid for the current line count
    pub fn clamp_scroll(&mut self, line_count: usize) {
        let max = self.max_scroll(line_count);
        if self.ui_state.follow {
            self.ui_state.log_scroll = max;
        } else {
            self.ui_state.log_scroll = self.ui_state.log_scroll.min(max);
        }
    }

    /// Indices currently on screen
    pub fn visible_range(&self, line_count: usize) -> Range<usize> {
        let start = self.ui_state.log_scroll.min(line_count);
        let end = start
            .saturating_add(self.ui_state.viewport_height)
            .min(line_count);
        start..end
    }

    /// Page-aligned window covering the visible lines
    pub fn fetch_window(&self, line_count: usize) -> Range<usize> {
        let visible = self.visible_range(line_count);
        if visible.is_empty() {
            return visible;
        }
        let start = visible.start / self.page_size * self.page_size;
        let end = (visible.end.div_ceil(self.page_size) * self.page_size).min(line_count);
        start..end
    }

    /// Select a line and bring it to the middle of the viewport
    pub fn jump_to(&mut self, index: usize, line_count: usize) {
        self.ui_state.follow = false;
        self.ui_state.selected_line = Some(index);
        let half = self.ui_state.viewport_height / 2;
        self.ui_state.log_scroll = index.saturating_sub(half).min(self.max_scroll(line_count));
    }

    /// First line of the next (or previous) event, wrapping around
    pub fn next_event_line(&self, events: &[LogEvent], forward: bool) -> Option<usize> {
        let mut lines: Vec<usize> = events.iter().map(|e| e.line_index).collect();
        lines.sort_unstable();
        lines.dedup();

        let scroll = self.ui_state.log_scroll;
        let found = match (self.ui_state.selected_line, forward) {
            (Some(anchor), true) => lines.iter().find(|&&l| l > anchor),
            (None, true) => lines.iter().find(|&&l| l >= scroll),
            (Some(anchor), false) => lines.iter().rev().find(|&&l| l < anchor),
            (None, false) => lines.iter().rev().find(|&&l| l < scroll),
        };
        let wrapped = if forward { lines.first() } else { lines.last() };
        found.or(wrapped).copied()
    }

    /// Next loaded line matching the active search, wrapping around
    pub fn find_match(&self, slots: &SlotList, forward: bool) -> Option<usize> {
        let filter = self.ui_state.active_filter.as_ref()?;
        let len = slots.len();
        if len == 0 {
            return None;
        }

        let (start, first) = match self.ui_state.selected_line {
            Some(line) => (line.min(len - 1), 1),
            None => (self.ui_state.log_scroll.min(len - 1), 0),
        };
        (first..first + len)
            .map(|offset| {
                let offset = offset % len;
                if forward {
                    (start + offset) % len
                } else {
                    (start + len - offset) % len
                }
            })
            .find(|&index| {
                slots[index]
                    .line()
                    .is_some_and(|line| filter.matches(&line))
            })
    }

    /// Show a transient message
    pub fn show_message(&mut self, msg: impl Into<String>) {
        self.ui_state.message = Some(msg.into());
    }

    pub fn dismiss_message(&mut self) {
        self.ui_state.message = None;
    }

    /// Start search input mode
    pub fn start_search(&mut self) {
        self.ui_state.search_active = true;
        self.ui_state.search_input.clear();
        self.ui_state.filter_error = None;
    }

    /// Cancel search input, keeping any previous search
    pub fn cancel_search(&mut self) {
        self.ui_state.search_active = false;
        self.ui_state.filter_error = None;
    }

    /// Compile the current input as the active search
    pub fn apply_search(&mut self) {
        self.ui_state.search_active = false;
        self.ui_state.filter_error = None;

        if self.ui_state.search_input.is_empty() {
            self.ui_state.active_filter = None;
            return;
        }

        let result = if self.ui_state.filter_case_insensitive {
            CompiledFilter::new_case_insensitive(&self.ui_state.search_input)
        } else {
            CompiledFilter::new(&self.ui_state.search_input)
        };

        match result {
            Ok(filter) => {
                self.ui_state.active_filter = Some(filter);
            }
            Err(e) => {
                self.ui_state.filter_error = Some(format!("Invalid regex: {}", e));
                self.ui_state.search_active = true; // Keep input open to fix
            }
        }
    }

    /// Flip case sensitivity and recompile an active search
    pub fn toggle_case_sensitive(&mut self) {
        self.ui_state.filter_case_insensitive = !self.ui_state.filter_case_insensitive;
        if let Some(filter) = &self.ui_state.active_filter {
            self.ui_state.search_input = filter.pattern().to_string();
            self.apply_search();
        }
    }

    pub fn clear_search(&mut self) {
        self.ui_state.active_filter = None;
        self.ui_state.search_input.clear();
        self.ui_state.filter_error = None;
    }

    pub fn search_input_char(&mut self, c: char) {
        self.ui_state.search_input.push(c);
    }

    pub fn search_input_backspace(&mut self) {
        self.ui_state.search_input.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hordelog_logs::LogLineCache;
    use hordelog_types::{EventSeverity, LogLevel, LogLine};

    fn state(viewport: usize) -> AppState {
        let mut state = AppState::new(100);
        state.ui_state.viewport_height = viewport;
        state
    }

    #[test]
    fn test_scrolling_is_clamped() {
        let mut state = state(10);
        state.scroll_down(5, 12);
        assert_eq!(state.ui_state.log_scroll, 2);

        state.scroll_up(50);
        assert_eq!(state.ui_state.log_scroll, 0);

        state.page_down(100);
        assert_eq!(state.ui_state.log_scroll, 10);
        state.page_up();
        assert_eq!(state.ui_state.log_scroll, 0);
    }

    #[test]
    fn test_follow_tracks_growth() {
        let mut state = state(10);
        state.toggle_follow(30);
        assert!(state.ui_state.follow);
        assert_eq!(state.ui_state.log_scroll, 20);

        state.clamp_scroll(55);
        assert_eq!(state.ui_state.log_scroll, 45);

        state.scroll_up(1);
        assert!(!state.ui_state.follow);
        state.clamp_scroll(80);
        assert_eq!(state.ui_state.log_scroll, 44);
    }

    #[test]
    fn test_fetch_window_is_page_aligned() {
        let mut state = state(40);
        state.ui_state.log_scroll = 180;
        assert_eq!(state.visible_range(1000), 180..220);
        assert_eq!(state.fetch_window(1000), 100..300);
        assert_eq!(state.fetch_window(250), 100..250);
        assert_eq!(state.fetch_window(0), 0..0);
    }

    #[test]
    fn test_event_navigation_wraps() {
        let mut state = state(10);
        let events = vec![
            LogEvent::new(EventSeverity::Error, 40, 1),
            LogEvent::new(EventSeverity::Error, 5, 2),
            LogEvent::new(EventSeverity::Error, 0, 1),
        ];

        assert_eq!(state.next_event_line(&events, true), Some(0));
        state.jump_to(0, 100);
        assert_eq!(state.next_event_line(&events, true), Some(5));
        state.jump_to(40, 100);
        assert_eq!(state.next_event_line(&events, true), Some(0));
        assert_eq!(state.next_event_line(&events, false), Some(5));
        assert_eq!(state.ui_state.log_scroll, 35);
        assert!(state.next_event_line(&[], true).is_none());
    }

    #[test]
    fn test_search_finds_loaded_lines() {
        let cache = LogLineCache::new();
        cache.resize(6);
        cache.populate(
            0,
            vec![
                LogLine::new(LogLevel::Info, "Starting build"),
                LogLine::new(LogLevel::Error, "Link FAILED"),
                LogLine::new(LogLevel::Info, "retrying"),
                LogLine::new(LogLevel::Error, "link failed again"),
            ],
        );
        let slots = cache.items();

        let mut state = state(10);
        for c in "link failed".chars() {
            state.search_input_char(c);
        }
        state.apply_search();
        assert!(state.ui_state.active_filter.is_some());

        assert_eq!(state.find_match(&slots, true), Some(1));
        state.jump_to(1, 6);
        assert_eq!(state.find_match(&slots, true), Some(3));
        state.jump_to(3, 6);
        assert_eq!(state.find_match(&slots, true), Some(1));
        assert_eq!(state.find_match(&slots, false), Some(1));

        state.toggle_case_sensitive();
        state.ui_state.selected_line = None;
        assert_eq!(state.find_match(&slots, true), Some(3));
    }

    #[test]
    fn test_invalid_search_keeps_input_open() {
        let mut state = state(10);
        state.start_search();
        state.search_input_char('(');
        state.apply_search();
        assert!(state.ui_state.search_active);
        assert!(state.ui_state.filter_error.is_some());
        assert!(state.ui_state.active_filter.is_none());

        state.search_input_backspace();
        state.apply_search();
        assert!(!state.ui_state.search_active);
        assert!(state.ui_state.active_filter.is_none());
    }
}

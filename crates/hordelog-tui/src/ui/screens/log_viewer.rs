use ratatui::{
    Frame,
    layout::{Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use hordelog_logs::{CompiledFilter, LineFormatter, LineSegment, LogLineSlot, LogSource, SourcePhase, SourceSnapshot};
use hordelog_types::{EventSeverity, LogEvent, LogLine};

use crate::app::AppState;
use crate::ui::components::{HelpOverlay, StatusBar, viewer_hints};
use crate::ui::{Layout, Theme};

/// Log viewer screen
pub struct LogViewerScreen;

impl LogViewerScreen {
    pub fn render(frame: &mut Frame, state: &mut AppState, source: &LogSource) {
        let show_search = state.ui_state.search_active
            || state.ui_state.active_filter.is_some()
            || state.ui_state.filter_error.is_some();
        let (header, search, logs, status) = Layout::main(frame.area(), show_search);
        let snapshot = source.snapshot();

        Self::render_header(frame, header, source, &snapshot);
        if let Some(area) = search {
            Self::render_search_bar(frame, area, state);
        }
        Self::render_logs(frame, logs, state, source);
        Self::render_status_bar(frame, status, state, source, &snapshot);

        if let Some(error) = &snapshot.fatal_error {
            Self::render_fatal(frame, logs, error);
        }
        if state.ui_state.help_visible {
            HelpOverlay::render(frame);
        }
    }

    fn render_header(frame: &mut Frame, area: Rect, source: &LogSource, snapshot: &SourceSnapshot) {
        let mut crumbs = vec![Span::styled("hordelog", Theme::title())];
        for crumb in source.crumbs() {
            crumbs.push(Span::styled(" › ", Theme::text_dim()));
            crumbs.push(Span::styled(crumb.text, Theme::text()));
        }
        crumbs.push(Span::styled(" › ", Theme::text_dim()));
        crumbs.push(Span::styled(source.crumb_title(), Theme::text_highlight()));

        let phase_style = match snapshot.phase {
            SourcePhase::Active => Theme::live(),
            SourcePhase::Failed => Theme::error(),
            _ => Theme::text_dim(),
        };
        crumbs.push(Span::styled(" │ ", Theme::text_dim()));
        crumbs.push(Span::styled(format!("● {}", snapshot.phase.label()), phase_style));

        let mut summary = vec![Span::styled(source.summary(), Theme::text())];
        if let Some(percent) = source.percent_complete() {
            summary.push(Span::styled(" │ ", Theme::text_dim()));
            summary.push(Span::styled(format!("{:.0}% complete", percent), Theme::text_dim()));
        }
        let issues = source.issues();
        if !issues.is_empty() {
            summary.push(Span::styled(" │ ", Theme::text_dim()));
            summary.push(Span::styled(
                format!("{} issue{}", issues.len(), if issues.len() == 1 { "" } else { "s" }),
                Theme::error(),
            ));
        }

        let header = Paragraph::new(vec![Line::from(crumbs), Line::from(summary)]).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border()),
        );

        frame.render_widget(header, area);
    }

    fn render_search_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut spans = vec![];

        if state.ui_state.search_active {
            spans.push(Span::styled(
                " /",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::styled(" Search: ", Theme::text_dim()));
        }

        let pattern = if state.ui_state.search_active {
            &state.ui_state.search_input
        } else if let Some(filter) = &state.ui_state.active_filter {
            filter.pattern()
        } else {
            ""
        };
        spans.push(Span::styled(pattern.to_string(), Theme::text_highlight()));

        if state.ui_state.search_active {
            spans.push(Span::styled(
                "█",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::SLOW_BLINK),
            ));
        }

        if let Some(err) = &state.ui_state.filter_error {
            spans.push(Span::styled(" ", Theme::text()));
            spans.push(Span::styled(
                format!("⚠ {}", err),
                Style::default().fg(Color::Red),
            ));
        }

        spans.push(Span::styled("  ", Theme::text()));
        let case_text = if state.ui_state.filter_case_insensitive {
            "[i] case-insensitive"
        } else {
            "[i] case-sensitive"
        };
        spans.push(Span::styled(case_text, Theme::text_dim()));

        if state.ui_state.search_active {
            spans.push(Span::styled(
                "  [Enter] Apply  [Esc] Cancel",
                Theme::text_dim(),
            ));
        } else {
            spans.push(Span::styled("  [n/N] Next/Prev  [/] Edit", Theme::text_dim()));
        }

        let search_bar = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(if state.ui_state.search_active {
                    Style::default().fg(Color::Yellow)
                } else if state.ui_state.filter_error.is_some() {
                    Style::default().fg(Color::Red)
                } else {
                    Theme::border()
                })
                .title(Span::styled(" Search loaded lines ", Theme::title())),
        );

        frame.render_widget(search_bar, area);
    }

    fn render_logs(frame: &mut Frame, area: Rect, state: &mut AppState, source: &LogSource) {
        let line_count = source.line_count();
        let inner_height = area.height.saturating_sub(2) as usize;

        state.ui_state.viewport_height = inner_height.max(1);
        state.clamp_scroll(line_count);

        let slots = source.items();
        let events = source.events();
        let range = state.visible_range(line_count);

        // Borders on both sides plus the scrollbar column
        let inner_width = area.width.saturating_sub(3) as usize;
        let number_width = line_count.max(1).to_string().len();
        let content_width = inner_width.saturating_sub(number_width + 3);

        let lines: Vec<Line> = range
            .map(|index| {
                let mut spans = vec![
                    Span::styled(
                        format!("{:>width$} ", index + 1, width = number_width),
                        Theme::text_dim(),
                    ),
                    Self::event_marker(index, &events),
                    Span::raw(" "),
                ];
                spans.extend(Self::line_content(
                    &slots[index],
                    state.ui_state.active_filter.as_ref(),
                    content_width,
                ));

                let line = Line::from(spans);
                if state.ui_state.selected_line == Some(index) {
                    line.style(Theme::selected_line())
                } else {
                    line
                }
            })
            .collect();

        let title = match &state.ui_state.active_filter {
            Some(filter) => format!(" Log ({} lines, /{}/) ", line_count, filter.pattern()),
            None => format!(" Log ({} lines) ", line_count),
        };

        let logs_widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border())
                .title(Span::styled(title, Theme::title())),
        );

        frame.render_widget(logs_widget, area);

        let max_scroll = line_count.saturating_sub(inner_height);
        if max_scroll > 0 {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼"));

            let mut scrollbar_state = ScrollbarState::default()
                .content_length(max_scroll)
                .position(state.ui_state.log_scroll.min(max_scroll));

            frame.render_stateful_widget(
                scrollbar,
                area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }

    /// Gutter mark for lines covered by an error or warning event
    fn event_marker(index: usize, events: &[LogEvent]) -> Span<'static> {
        let severity = events
            .iter()
            .filter(|e| index >= e.line_index && index < e.line_index + e.line_count.max(1))
            .map(|e| e.severity)
            .max_by_key(|severity| match severity {
                EventSeverity::Error => 2,
                EventSeverity::Warning => 1,
                _ => 0,
            });

        match severity {
            Some(EventSeverity::Error) => Span::styled("▌", Style::default().fg(Theme::ERROR)),
            Some(EventSeverity::Warning) => Span::styled("▌", Style::default().fg(Theme::WARNING)),
            _ => Span::raw(" "),
        }
    }

    fn line_content(
        slot: &LogLineSlot,
        filter: Option<&CompiledFilter>,
        max_width: usize,
    ) -> Vec<Span<'static>> {
        let Some(line) = slot.line() else {
            let text = if slot.is_requested() { "loading…" } else { "" };
            return vec![Span::styled(text, Theme::placeholder())];
        };

        let pieces = styled_pieces(&line);
        let matches = match filter {
            Some(filter) if filter.has_pattern() => {
                let text: String = pieces.iter().map(|(text, _)| text.as_str()).collect();
                filter.find_matches(&text)
            }
            _ => Vec::new(),
        };

        truncate_spans(highlight(pieces, &matches), max_width)
    }

    fn render_status_bar(
        frame: &mut Frame,
        area: Rect,
        state: &AppState,
        source: &LogSource,
        snapshot: &SourceSnapshot,
    ) {
        let right = match &state.ui_state.message {
            Some(msg) => msg.clone(),
            None => {
                let counts = source.cache().level_counts();
                let follow = if state.ui_state.follow { " ▼ follow" } else { "" };
                format!(
                    "E:{} W:{} │ {}/{} lines{}",
                    source.errors().len().max(counts.error + counts.fatal),
                    source.warnings().len().max(counts.warn),
                    snapshot.populated,
                    snapshot.line_count,
                    follow
                )
            }
        };

        let bar = StatusBar::new().hints(viewer_hints()).right(right);
        let bar = if state.ui_state.message.is_some() {
            bar.right_style(Theme::status_bar_key())
        } else {
            bar
        };

        frame.render_widget(bar, area);
    }

    fn render_fatal(frame: &mut Frame, area: Rect, error: &str) {
        let popup = Layout::centered(area, 70, 6);
        frame.render_widget(Clear, popup);

        let body = Paragraph::new(vec![
            Line::from(Span::styled(error.to_string(), Theme::error())),
            Line::from(""),
            Line::from(Span::styled("[q] Quit", Theme::text_dim())),
        ])
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Theme::ERROR))
                .title(Span::styled(" Unable to load log ", Theme::error())),
        );

        frame.render_widget(body, popup);
    }
}

/// Text pieces of a line with their styles, control characters flattened
fn styled_pieces(line: &LogLine) -> Vec<(String, Style)> {
    let base = Theme::level_text(line.level);
    LineFormatter::segments(line)
        .into_iter()
        .map(|segment| {
            let style = match &segment {
                LineSegment::Text(_) => base,
                LineSegment::Property { kind, .. } => base.patch(Theme::property(kind.as_deref())),
            };
            (flatten(segment.text()), style)
        })
        .collect()
}

fn flatten(text: &str) -> String {
    text.chars()
        .flat_map(|c| match c {
            '\t' => vec![' '; 4],
            c if c.is_control() => vec![' '],
            c => vec![c],
        })
        .collect()
}

/// Split pieces at search match boundaries; `matches` are byte ranges over
/// the concatenated text, sorted and disjoint
fn highlight(pieces: Vec<(String, Style)>, matches: &[(usize, usize)]) -> Vec<Span<'static>> {
    if matches.is_empty() {
        return pieces
            .into_iter()
            .map(|(text, style)| Span::styled(text, style))
            .collect();
    }

    let mut spans = Vec::new();
    let mut offset = 0;
    for (text, style) in pieces {
        let end = offset + text.len();
        let mut cursor = 0;
        for &(match_start, match_end) in matches {
            let start = match_start.max(offset);
            let stop = match_end.min(end);
            if start >= stop {
                continue;
            }
            let (local_start, local_stop) = (start - offset, stop - offset);
            if local_start > cursor {
                spans.push(Span::styled(text[cursor..local_start].to_string(), style));
            }
            spans.push(Span::styled(
                text[local_start..local_stop].to_string(),
                style.patch(Theme::search_match()),
            ));
            cursor = local_stop;
        }
        if cursor < text.len() {
            spans.push(Span::styled(text[cursor..].to_string(), style));
        }
        offset = end;
    }
    spans
}

/// Cut spans to `max_width` display columns
fn truncate_spans(spans: Vec<Span<'static>>, max_width: usize) -> Vec<Span<'static>> {
    let mut used = 0;
    let mut out = Vec::new();
    for span in spans {
        let width = span.content.width();
        if used + width <= max_width {
            used += width;
            out.push(span);
            continue;
        }

        let mut text = String::new();
        for c in span.content.chars() {
            let char_width = c.width().unwrap_or(0);
            if used + char_width > max_width {
                break;
            }
            used += char_width;
            text.push(c);
        }
        if !text.is_empty() {
            out.push(Span::styled(text, span.style));
        }
        break;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use hordelog_api::MockHordeApi;
    use hordelog_logs::SourceOptions;
    use hordelog_types::{AgentRecord, LeaseRecord, LogLevel, LogRecord};
    use ratatui::{Terminal, backend::TestBackend, buffer::Buffer};

    fn screen_text(buffer: &Buffer) -> String {
        let area = buffer.area;
        (0..area.height)
            .map(|y| {
                (0..area.width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_highlight_splits_across_segments() {
        let pieces = vec![
            ("Link ".to_string(), Style::default()),
            ("Engine.dll".to_string(), Theme::property(Some("SourceFile"))),
            (" failed".to_string(), Style::default()),
        ];
        // "Engine" inside the property and "fail" in the trailing text
        let spans = highlight(pieces, &[(5, 11), (16, 20)]);
        let texts: Vec<&str> = spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(texts, vec!["Link ", "Engine", ".dll", " ", "fail", "ed"]);
        assert_eq!(spans[1].style.bg, Theme::search_match().bg);
        assert_eq!(spans[2].style, Theme::property(Some("SourceFile")));
    }

    #[test]
    fn test_truncate_respects_display_width() {
        let spans = vec![Span::raw("ab"), Span::raw("日本語"), Span::raw("tail")];
        let truncated = truncate_spans(spans, 5);
        let text: String = truncated.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "ab日");
        assert!(truncate_spans(vec![Span::raw("abc")], 0).is_empty());
    }

    #[test]
    fn test_pieces_expand_properties() {
        let mut line = LogLine::new(LogLevel::Error, "Compile Foo.cpp failed");
        line.format = Some("Compile {File}\tfailed".to_string());
        line.properties = Some(HashMap::from([(
            "File".to_string(),
            serde_json::json!({"$type": "SourceFile", "$text": "Foo.cpp"}),
        )]));

        let pieces = styled_pieces(&line);
        let text: String = pieces.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(text, "Compile Foo.cpp    failed");
        assert!(pieces[1].1.add_modifier.contains(Modifier::UNDERLINED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renders_loaded_lines() {
        let mut lease = LeaseRecord::new("L1", "Upgrade agent");
        lease.agent_id = Some("AGENT-9".to_string());
        let lines = vec![
            LogLine::new(LogLevel::Info, "Downloading package"),
            LogLine::new(LogLevel::Error, "Checksum mismatch"),
            LogLine::new(LogLevel::Info, "Retrying"),
        ];
        let api = Arc::new(
            MockHordeApi::new()
                .with_log(LogRecord::new("log2", 0), lines)
                .with_lease(lease)
                .with_agent(AgentRecord::new("AGENT-9")),
        );
        let source = LogSource::lease(api, "log2", "L1", SourceOptions::default());
        source.initialize().await.unwrap();
        source.load_lines(0, 3).await;

        let mut state = AppState::new(100);
        state.ui_state.search_input = "checksum".to_string();
        state.apply_search();

        let mut terminal = Terminal::new(TestBackend::new(100, 16)).unwrap();
        terminal
            .draw(|frame| LogViewerScreen::render(frame, &mut state, &source))
            .unwrap();

        let text = screen_text(terminal.backend().buffer());
        assert!(text.contains("Lease Upgrade agent"));
        assert!(text.contains("Upgrade agent on AGENT-9 (running)"));
        assert!(text.contains("● live"));
        assert!(text.contains("Checksum mismatch"));
        assert!(text.contains("Log (3 lines, /checksum/)"));
        assert!(text.contains("3/3 lines"));
        // 16 rows minus header, search bar, status and log borders
        assert_eq!(state.ui_state.viewport_height, 6);

        source.stop_polling();
    }

    #[tokio::test(start_paused = true)]
    async fn test_renders_fatal_error() {
        let api = Arc::new(MockHordeApi::new());
        let source = LogSource::job(api, "missing", SourceOptions::default());
        assert!(source.initialize().await.is_err());

        let mut state = AppState::new(100);
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal
            .draw(|frame| LogViewerScreen::render(frame, &mut state, &source))
            .unwrap();

        let text = screen_text(terminal.backend().buffer());
        assert!(text.contains("Unable to load log"));
        assert!(text.contains("● failed"));
        assert!(text.contains("Log missing"));
    }
}

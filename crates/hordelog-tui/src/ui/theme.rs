use ratatui::style::{Color, Modifier, Style};

use hordelog_types::LogLevel;

/// Color theme for the viewer
pub struct Theme;

impl Theme {
    // Base colors
    pub const BG: Color = Color::Reset;
    pub const FG: Color = Color::White;
    pub const FG_DIM: Color = Color::DarkGray;

    // Accent colors
    pub const PRIMARY: Color = Color::Cyan;
    pub const HIGHLIGHT: Color = Color::Yellow;

    // Status colors
    pub const SUCCESS: Color = Color::Green;
    pub const WARNING: Color = Color::Yellow;
    pub const ERROR: Color = Color::Red;

    pub fn border() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn title() -> Style {
        Style::default()
            .fg(Self::PRIMARY)
            .add_modifier(Modifier::BOLD)
    }

    pub fn text() -> Style {
        Style::default().fg(Self::FG)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(Self::FG_DIM)
    }

    pub fn text_highlight() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    /// Live/finished indicator in the header
    pub fn live() -> Style {
        Style::default()
            .fg(Self::SUCCESS)
            .add_modifier(Modifier::BOLD)
    }

    /// Message text by level
    pub fn level_text(level: LogLevel) -> Style {
        match level {
            LogLevel::Error | LogLevel::Fatal => Style::default().fg(Self::ERROR),
            LogLevel::Warn => Style::default().fg(Self::WARNING),
            _ => Style::default().fg(Self::FG),
        }
    }

    /// Substituted structured values, by `$type`
    pub fn property(kind: Option<&str>) -> Style {
        match kind {
            Some("SourceFile") | Some("Asset") => Style::default()
                .fg(Self::PRIMARY)
                .add_modifier(Modifier::UNDERLINED),
            Some(_) => Style::default().fg(Color::LightBlue),
            None => Style::default().fg(Color::LightCyan),
        }
    }

    /// Lines whose content has not arrived yet
    pub fn placeholder() -> Style {
        Style::default()
            .fg(Self::FG_DIM)
            .add_modifier(Modifier::ITALIC)
    }

    pub fn search_match() -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(Self::HIGHLIGHT)
            .add_modifier(Modifier::BOLD)
    }

    pub fn selected_line() -> Style {
        Style::default().bg(Color::Rgb(40, 40, 60))
    }

    // Status bar
    pub fn status_bar() -> Style {
        Style::default().fg(Self::FG_DIM).bg(Color::DarkGray)
    }

    pub fn status_bar_key() -> Style {
        Style::default()
            .fg(Self::HIGHLIGHT)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    }

    pub fn error() -> Style {
        Style::default()
            .fg(Self::ERROR)
            .add_modifier(Modifier::BOLD)
    }
}

use ratatui::layout::{Constraint, Direction, Layout as RatatuiLayout, Rect};

/// Layout helper for consistent screen layouts
pub struct Layout;

impl Layout {
    /// Split into header (crumbs and summary), optional search bar, log pane and
    /// status bar
    pub fn main(area: Rect, show_search: bool) -> (Rect, Option<Rect>, Rect, Rect) {
        let mut constraints = vec![Constraint::Length(4)];
        if show_search {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Min(1));
        constraints.push(Constraint::Length(1));

        let chunks = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        if show_search {
            (chunks[0], Some(chunks[1]), chunks[2], chunks[3])
        } else {
            (chunks[0], None, chunks[1], chunks[2])
        }
    }

    /// A `width` x `height` rectangle centered in `area`, shrunk to fit
    pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
        let width = width.min(area.width.saturating_sub(4));
        let height = height.min(area.height.saturating_sub(2));
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        Rect::new(x, y, width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_layout() {
        let area = Rect::new(0, 0, 80, 24);
        let (header, search, logs, status) = Layout::main(area, false);
        assert_eq!(header.height, 4);
        assert!(search.is_none());
        assert_eq!(logs.height, 19);
        assert_eq!(status.y, 23);

        let (_, search, logs, _) = Layout::main(area, true);
        assert_eq!(search.map(|r| r.height), Some(3));
        assert_eq!(logs.height, 16);
    }

    #[test]
    fn test_centered_fits() {
        let area = Rect::new(0, 0, 40, 10);
        let rect = Layout::centered(area, 100, 100);
        assert_eq!(rect, Rect::new(2, 1, 36, 8));
    }
}

//! Interactive viewer loop

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::debug;

use hordelog_logs::LogSource;
use hordelog_tui::{Action, AppState, Event, EventHandler, KeyBindings, KeyContext, LogViewerScreen, Tui};
use hordelog_types::LogEvent;

/// Results of background work started by actions
#[derive(Debug)]
enum InternalAction {
    Downloaded(Result<PathBuf, String>),
}

/// Run the viewer until the user quits. The source is cleared on exit.
pub async fn run(source: Arc<LogSource>, page_size: usize, download_dir: PathBuf) -> Result<()> {
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<InternalAction>();

    let mut state = AppState::new(page_size);
    let mut snapshots = source.subscribe();

    let mut tui = Tui::new()?;
    let mut events = EventHandler::new(Duration::from_millis(250));
    let keybindings = KeyBindings::new();

    // Metadata loads in the background; failures surface through the snapshot
    tokio::spawn({
        let source = source.clone();
        async move {
            let _ = source.initialize().await;
        }
    });

    render(&mut tui, &mut state, &source)?;

    loop {
        tokio::select! {
            Some(event) = events.next() => {
                match event {
                    Event::Key(key) => {
                        if state.ui_state.help_visible {
                            state.ui_state.help_visible = false;
                        } else {
                            state.dismiss_message();
                            let action = if state.ui_state.search_active {
                                keybindings.get_search_input_action(&key)
                            } else {
                                keybindings.get_action(KeyContext::LogViewer, &key)
                            };
                            if let Some(action) = action {
                                let _ = action_tx.send(action);
                            }
                        }
                    }
                    Event::Tick => {}
                    Event::Resize(_, _) => {
                        let _ = action_tx.send(Action::Render);
                    }
                    Event::Error(e) => {
                        state.show_message(e);
                    }
                }
            }

            // Lines arrived, the log grew or the source changed phase
            Ok(()) = snapshots.changed() => {}

            Some(action) = action_rx.recv() => {
                handle_action(&mut state, &source, &internal_tx, &download_dir, action);
            }

            Some(internal) = internal_rx.recv() => {
                match internal {
                    InternalAction::Downloaded(Ok(path)) => {
                        state.show_message(format!("Saved {}", path.display()));
                    }
                    InternalAction::Downloaded(Err(e)) => {
                        state.show_message(format!("Download failed: {}", e));
                    }
                }
            }
        }

        if state.should_quit {
            break;
        }

        render(&mut tui, &mut state, &source)?;
        request_visible_lines(&state, &source);
    }

    source.clear();
    events.shutdown();
    tui.restore()?;

    Ok(())
}

fn render(tui: &mut Tui, state: &mut AppState, source: &LogSource) -> Result<()> {
    tui.draw(|frame| LogViewerScreen::render(frame, state, source))?;
    state.render_dirty = false;
    Ok(())
}

/// Start a fetch for the page-aligned window around the viewport if any
/// line in it has not been requested yet
fn request_visible_lines(state: &AppState, source: &Arc<LogSource>) -> bool {
    let window = state.fetch_window(source.line_count());
    if window.is_empty() {
        return false;
    }

    let slots = source.items();
    let missing = slots
        .get(window.clone())
        .is_some_and(|slots| slots.iter().any(|slot| !slot.is_requested()));
    if !missing {
        return false;
    }

    debug!(start = window.start, end = window.end, "Requesting visible lines");
    let source = source.clone();
    tokio::spawn(async move {
        source.load_lines(window.start, window.len()).await;
    });
    true
}

fn handle_action(
    state: &mut AppState,
    source: &Arc<LogSource>,
    internal_tx: &mpsc::UnboundedSender<InternalAction>,
    download_dir: &Path,
    action: Action,
) {
    let line_count = source.line_count();
    state.render_dirty = true;

    match action {
        Action::Quit => {
            state.should_quit = true;
        }
        Action::ToggleHelp => {
            state.ui_state.help_visible = !state.ui_state.help_visible;
        }

        Action::ScrollUp(n) => state.scroll_up(n),
        Action::ScrollDown(n) => state.scroll_down(n, line_count),
        Action::ScrollToTop => state.scroll_to_top(),
        Action::ScrollToBottom => state.scroll_to_bottom(line_count),
        Action::PageUp => state.page_up(),
        Action::PageDown => state.page_down(line_count),
        Action::ToggleFollow => state.toggle_follow(line_count),

        Action::NextError => jump_to_event(state, &source.errors(), true, "errors", line_count),
        Action::PrevError => jump_to_event(state, &source.errors(), false, "errors", line_count),
        Action::NextWarning => {
            jump_to_event(state, &source.warnings(), true, "warnings", line_count)
        }
        Action::PrevWarning => {
            jump_to_event(state, &source.warnings(), false, "warnings", line_count)
        }

        Action::OpenSearch => state.start_search(),
        Action::CloseSearch => state.cancel_search(),
        Action::SearchInput(c) => state.search_input_char(c),
        Action::SearchBackspace => state.search_input_backspace(),
        Action::SearchClear => state.ui_state.search_input.clear(),
        Action::ApplySearch => {
            state.apply_search();
            if state.ui_state.active_filter.is_some() {
                state.ui_state.selected_line = None;
                jump_to_match(state, source, true, line_count);
            }
        }
        Action::NextMatch => jump_to_match(state, source, true, line_count),
        Action::PrevMatch => jump_to_match(state, source, false, line_count),
        Action::ToggleCaseSensitive => state.toggle_case_sensitive(),

        Action::Download { json } => {
            state.show_message("Downloading…");
            let source = source.clone();
            let tx = internal_tx.clone();
            let dir = download_dir.to_path_buf();
            tokio::spawn(async move {
                let result = source.download(json, &dir).await.map_err(|e| e.to_string());
                let _ = tx.send(InternalAction::Downloaded(result));
            });
        }

        Action::ShowMessage(msg) => state.show_message(msg),
        Action::DismissMessage => state.dismiss_message(),
        Action::Render => {}
    }
}

fn jump_to_event(
    state: &mut AppState,
    events: &[LogEvent],
    forward: bool,
    what: &str,
    line_count: usize,
) {
    match state.next_event_line(events, forward) {
        Some(index) => state.jump_to(index, line_count),
        None => state.show_message(format!("No {} in this log", what)),
    }
}

fn jump_to_match(state: &mut AppState, source: &LogSource, forward: bool, line_count: usize) {
    if state.ui_state.active_filter.is_none() {
        return;
    }
    match state.find_match(&source.items(), forward) {
        Some(index) => state.jump_to(index, line_count),
        None => state.show_message("No matches in loaded lines"),
    }
}

/// All possible actions in the viewer (command pattern)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleHelp,

    // Scrolling
    ScrollUp(usize),
    ScrollDown(usize),
    ScrollToTop,
    ScrollToBottom,
    PageUp,
    PageDown,
    ToggleFollow,

    // Event navigation
    NextError,
    PrevError,
    NextWarning,
    PrevWarning,

    // Search
    OpenSearch,
    CloseSearch,
    SearchInput(char),
    SearchBackspace,
    SearchClear,
    ApplySearch,
    NextMatch,
    PrevMatch,
    ToggleCaseSensitive,

    // Download the full log (`json` selects the structured form)
    Download { json: bool },

    // Messages
    ShowMessage(String),
    DismissMessage,

    // Render request
    Render,
}

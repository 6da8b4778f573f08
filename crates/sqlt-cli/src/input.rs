//! Classification of stdin lines.

use sqlt_session::{Command, KeyChord};

/// What one line of input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Text appended to the editor buffer.
    Text(String),
    /// A toolbar command.
    Toolbar(Command),
    /// A key combination for the keyboard dispatcher.
    Chord(KeyChord),
    /// Flip the favorite flag.
    Favorite,
    /// Move to the next exercise.
    Next,
    /// Move to the previous exercise.
    Previous,
    /// Print the buffer and panes.
    Show,
    /// List the available commands.
    Help,
    /// Leave the workspace.
    Quit,
    /// A `:` line that names no known command.
    Unknown(String),
}

/// Classifies one line.
///
/// Lines starting with `:` are commands. Lines that parse as a modified key
/// chord (`alt+x`, `ctrl+c`) are chords. Everything else is buffer text.
pub fn parse_line(line: &str) -> Input {
    let trimmed = line.trim();

    if let Some(name) = trimmed.strip_prefix(':') {
        return match name.trim().to_ascii_lowercase().as_str() {
            "x" | "execute" => Input::Toolbar(Command::Execute),
            "c" | "check" => Input::Toolbar(Command::Check),
            "s" | "solution" => Input::Toolbar(Command::ShowSolution),
            "reset" => Input::Toolbar(Command::Reset),
            "clear" => Input::Toolbar(Command::Clear),
            "model" => Input::Toolbar(Command::ShowDataModel),
            "fav" => Input::Favorite,
            "next" => Input::Next,
            "prev" => Input::Previous,
            "show" => Input::Show,
            "help" | "?" => Input::Help,
            "q" | "quit" => Input::Quit,
            other => Input::Unknown(other.to_string()),
        };
    }

    if trimmed.contains('+') {
        if let Ok(chord) = KeyChord::parse(trimmed) {
            return Input::Chord(chord);
        }
    }

    Input::Text(line.to_string())
}

/// One-line summaries of the `:` commands.
pub const HELP: &[(&str, &str)] = &[
    (":x", "execute the buffer"),
    (":c", "check the buffer against the solution"),
    (":s", "show the solution"),
    (":reset", "reset the exercise database"),
    (":clear", "empty the buffer"),
    (":model", "toggle the data model"),
    (":fav", "toggle favorite"),
    (":next / :prev", "move between exercises"),
    (":show", "print the buffer and result panes"),
    (":quit", "save the buffer and exit"),
];

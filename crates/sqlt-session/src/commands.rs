//! Toolbar commands, accelerator chords and keyboard listener registration.
//!
//! The toolbar exposes a closed set of [`Command`]s. Each command except
//! [`Command::ShowDataModel`] is bound to one or more accelerator keys in a
//! [`Keymap`] that is validated when it is built. A chord only dispatches when
//! the platform modifier is held: Control on Mac, Alt everywhere else.
//!
//! Listeners are registered on a [`KeyboardHub`] and removed when their
//! [`KeyListener`] is dropped, so a session that is torn down never leaves a
//! stale listener behind.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const MOD_SHIFT: u8 = 0b0001;
const MOD_CONTROL: u8 = 0b0010;
const MOD_ALT: u8 = 0b0100;
const MOD_META: u8 = 0b1000;

// ============================================================================
// Command
// ============================================================================

/// A toolbar command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Command {
    /// Toggle the schema diagram.
    ShowDataModel,
    /// Run the learner's query.
    Execute,
    /// Grade the learner's query.
    Check,
    /// Insert and run the reference solution.
    ShowSolution,
    /// Reset the sandbox database.
    Reset,
    /// Empty the editor buffer.
    Clear,
}

impl Command {
    /// Every command, in toolbar order.
    pub const ALL: [Self; 6] = [
        Self::ShowDataModel,
        Self::Execute,
        Self::Check,
        Self::ShowSolution,
        Self::Reset,
        Self::Clear,
    ];

    /// Returns `true` if the toolbar lock disables this command.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlt_session::Command;
    ///
    /// assert!(Command::Execute.is_lockable());
    /// assert!(!Command::ShowDataModel.is_lockable());
    /// ```
    #[must_use]
    pub const fn is_lockable(self) -> bool {
        !matches!(self, Self::ShowDataModel)
    }

    /// Returns `true` if the command sends the buffer and so refuses to run
    /// while it is shorter than the minimum query length.
    ///
    /// A reset only saves the buffer on the side, so an empty editor can
    /// still reset the sandbox.
    #[must_use]
    pub const fn needs_query(self) -> bool {
        matches!(self, Self::Execute | Self::Check | Self::ShowSolution)
    }

    /// Returns the command's name as used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShowDataModel => "showDataModel",
            Self::Execute => "execute",
            Self::Check => "check",
            Self::ShowSolution => "showSolution",
            Self::Reset => "reset",
            Self::Clear => "clear",
        }
    }

    /// Looks a command up by name, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Platform & chords
// ============================================================================

/// Modifier family of the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Apple platforms; accelerators use Control.
    Mac,
    /// Everything else; accelerators use Alt.
    Other,
}

impl Platform {
    /// Detects the platform from a user agent string.
    #[must_use]
    pub fn from_user_agent(user_agent: &str) -> Self {
        if user_agent.contains("Mac") {
            Self::Mac
        } else {
            Self::Other
        }
    }

    /// Name of the modifier that qualifies an accelerator.
    #[must_use]
    pub const fn modifier_name(self) -> &'static str {
        match self {
            Self::Mac => "ctrl",
            Self::Other => "alt",
        }
    }

    const fn modifier_bit(self) -> u8 {
        match self {
            Self::Mac => MOD_CONTROL,
            Self::Other => MOD_ALT,
        }
    }
}

/// A single key press with its held modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyChord {
    key: char,
    modifiers: u8,
}

impl KeyChord {
    /// Creates a chord for `key` with no modifiers held.
    #[must_use]
    pub fn plain(key: char) -> Self {
        Self {
            key: key.to_ascii_lowercase(),
            modifiers: 0,
        }
    }

    /// Returns the chord with Control held.
    #[must_use]
    pub const fn ctrl(mut self) -> Self {
        self.modifiers |= MOD_CONTROL;
        self
    }

    /// Returns the chord with Alt held.
    #[must_use]
    pub const fn alt(mut self) -> Self {
        self.modifiers |= MOD_ALT;
        self
    }

    /// Returns the chord with Shift held.
    #[must_use]
    pub const fn shift(mut self) -> Self {
        self.modifiers |= MOD_SHIFT;
        self
    }

    /// The pressed key, lowercased.
    #[must_use]
    pub const fn key(&self) -> char {
        self.key
    }

    /// Returns `true` if the platform's accelerator modifier is held.
    #[must_use]
    pub const fn qualifies_on(&self, platform: Platform) -> bool {
        self.modifiers & platform.modifier_bit() != 0
    }

    /// Parses a chord such as `alt+x`, `ctrl+shift+z` or `a`.
    ///
    /// # Errors
    ///
    /// Returns `KeymapError::InvalidChord` for empty input, unknown modifier
    /// names, or a key that is not a single character.
    ///
    /// # Examples
    ///
    /// ```
    /// use sqlt_session::{KeyChord, Platform};
    ///
    /// let chord = KeyChord::parse("Alt+X").unwrap();
    /// assert_eq!(chord.key(), 'x');
    /// assert!(chord.qualifies_on(Platform::Other));
    /// assert!(!chord.qualifies_on(Platform::Mac));
    /// ```
    pub fn parse(input: &str) -> Result<Self, KeymapError> {
        let invalid = |message: &str| KeymapError::InvalidChord {
            chord: input.to_string(),
            message: message.to_string(),
        };

        let mut parts: Vec<&str> = input.trim().split('+').map(str::trim).collect();
        let key_part = parts.pop().filter(|k| !k.is_empty()).ok_or_else(|| invalid("missing key"))?;

        let mut chars = key_part.chars();
        let key = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => return Err(invalid("key must be a single character")),
        };

        let mut chord = Self::plain(key);
        for modifier in parts {
            chord.modifiers |= match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" => MOD_CONTROL,
                "alt" | "option" => MOD_ALT,
                "shift" => MOD_SHIFT,
                "meta" | "cmd" | "super" => MOD_META,
                _ => return Err(invalid(&format!("unknown modifier '{modifier}'"))),
            };
        }
        Ok(chord)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.modifiers & MOD_CONTROL != 0 {
            parts.push("ctrl".to_owned());
        }
        if self.modifiers & MOD_ALT != 0 {
            parts.push("alt".to_owned());
        }
        if self.modifiers & MOD_SHIFT != 0 {
            parts.push("shift".to_owned());
        }
        if self.modifiers & MOD_META != 0 {
            parts.push("meta".to_owned());
        }
        parts.push(self.key.to_string());
        write!(f, "{}", parts.join("+"))
    }
}

// ============================================================================
// Keymap
// ============================================================================

/// Errors raised while building a keymap or parsing a chord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeymapError {
    /// Two commands claim the same accelerator key.
    DuplicateBinding {
        /// The contested key.
        key: char,
        /// Command that bound the key first.
        existing: Command,
        /// Command that tried to bind it again.
        conflicting: Command,
    },
    /// A lockable command has no accelerator.
    UnboundCommand {
        /// The command without a key.
        command: Command,
    },
    /// The data-model toggle was given an accelerator.
    UnlockableBinding {
        /// The offending key.
        key: char,
    },
    /// Accelerator keys must be lowercase ASCII letters.
    InvalidKey {
        /// The offending key.
        key: char,
    },
    /// A chord string could not be parsed.
    InvalidChord {
        /// The raw chord text.
        chord: String,
        /// What was wrong with it.
        message: String,
    },
}

impl fmt::Display for KeymapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateBinding {
                key,
                existing,
                conflicting,
            } => write!(
                f,
                "key '{key}' bound to both '{existing}' and '{conflicting}'"
            ),
            Self::UnboundCommand { command } => {
                write!(f, "command '{command}' has no accelerator key")
            }
            Self::UnlockableBinding { key } => write!(
                f,
                "key '{key}' bound to 'showDataModel', which has no accelerator"
            ),
            Self::InvalidKey { key } => {
                write!(f, "accelerator key '{key}' is not a lowercase ASCII letter")
            }
            Self::InvalidChord { chord, message } => {
                write!(f, "invalid chord '{chord}': {message}")
            }
        }
    }
}

impl std::error::Error for KeymapError {}

/// Validated mapping from accelerator keys to commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymap {
    by_key: BTreeMap<char, Command>,
}

impl Keymap {
    /// The standard toolbar bindings.
    pub const STANDARD: [(Command, &'static [char]); 5] = [
        (Command::Execute, &['x']),
        (Command::Check, &['c']),
        (Command::ShowSolution, &['s']),
        (Command::Reset, &['y', 'z']),
        (Command::Clear, &['a']),
    ];

    /// Builds the standard keymap.
    ///
    /// # Errors
    ///
    /// Fails only if the standard table itself is inconsistent.
    pub fn standard() -> Result<Self, KeymapError> {
        Self::compile(&Self::STANDARD)
    }

    /// Builds and validates a keymap from a binding table.
    ///
    /// Every lockable command must have at least one key, no key may be
    /// bound twice, and `showDataModel` must stay unbound.
    ///
    /// # Errors
    ///
    /// Returns the first `KeymapError` found.
    pub fn compile(bindings: &[(Command, &[char])]) -> Result<Self, KeymapError> {
        let mut by_key = BTreeMap::new();

        for (command, keys) in bindings {
            for &key in *keys {
                if !key.is_ascii_lowercase() {
                    return Err(KeymapError::InvalidKey { key });
                }
                if !command.is_lockable() {
                    return Err(KeymapError::UnlockableBinding { key });
                }
                if let Some(existing) = by_key.insert(key, *command) {
                    return Err(KeymapError::DuplicateBinding {
                        key,
                        existing,
                        conflicting: *command,
                    });
                }
            }
        }

        for command in Command::ALL.into_iter().filter(|c| c.is_lockable()) {
            if !by_key.values().any(|bound| *bound == command) {
                return Err(KeymapError::UnboundCommand { command });
            }
        }

        Ok(Self { by_key })
    }

    /// Returns the command bound to `key`, if any.
    #[must_use]
    pub fn command_for(&self, key: char) -> Option<Command> {
        self.by_key.get(&key.to_ascii_lowercase()).copied()
    }

    /// Returns every key bound to `command`, in order.
    #[must_use]
    pub fn keys_for(&self, command: Command) -> Vec<char> {
        self.by_key
            .iter()
            .filter(|(_, bound)| **bound == command)
            .map(|(key, _)| *key)
            .collect()
    }
}

// ============================================================================
// Toolbar
// ============================================================================

/// Maps key chords to commands for one platform.
#[derive(Debug, Clone)]
pub struct Toolbar {
    platform: Platform,
    keymap: Keymap,
}

impl Toolbar {
    /// Creates a toolbar for the given platform and keymap.
    #[must_use]
    pub const fn new(platform: Platform, keymap: Keymap) -> Self {
        Self { platform, keymap }
    }

    /// The platform this toolbar interprets chords for.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// The toolbar's keymap.
    #[must_use]
    pub const fn keymap(&self) -> &Keymap {
        &self.keymap
    }

    /// Returns `true` if `command` can be dispatched in the given lock state.
    #[must_use]
    pub const fn is_enabled(command: Command, locked: bool) -> bool {
        !(locked && command.is_lockable())
    }

    /// Resolves a chord to a command.
    ///
    /// Returns `None` while `locked`, when the platform modifier is not held,
    /// or when the key is unbound.
    #[must_use]
    pub fn handle_key(&self, chord: KeyChord, locked: bool) -> Option<Command> {
        if locked || !chord.qualifies_on(self.platform) {
            return None;
        }
        self.keymap.command_for(chord.key())
    }

    /// Human-readable accelerator for a command, e.g. `alt+x`.
    #[must_use]
    pub fn accelerator_label(&self, command: Command) -> Option<String> {
        self.keymap
            .keys_for(command)
            .first()
            .map(|key| format!("{}+{key}", self.platform.modifier_name()))
    }
}

// ============================================================================
// KeyboardHub
// ============================================================================

type ListenerMap = HashMap<u64, mpsc::UnboundedSender<KeyChord>>;

#[derive(Debug, Default)]
struct HubInner {
    next_id: u64,
    listeners: ListenerMap,
}

/// Process-wide source of key presses.
///
/// Hosts feed chords in with [`KeyboardHub::press`]; each registered
/// [`KeyListener`] receives every chord until it is dropped.
#[derive(Debug, Clone, Default)]
pub struct KeyboardHub {
    inner: Arc<Mutex<HubInner>>,
}

impl KeyboardHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new listener.
    ///
    /// The listener is removed from the hub when the returned handle drops.
    #[must_use]
    pub fn register(&self) -> KeyListener {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, tx);
        tracing::debug!(listener = id, total = inner.listeners.len(), "Key listener registered");
        KeyListener {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Delivers a chord to every listener. Returns how many received it.
    pub fn press(&self, chord: KeyChord) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .listeners
            .values()
            .filter(|tx| tx.send(chord).is_ok())
            .count()
    }

    /// Number of currently registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }
}

/// A registered keyboard listener. Deregisters itself on drop.
#[derive(Debug)]
pub struct KeyListener {
    id: u64,
    rx: mpsc::UnboundedReceiver<KeyChord>,
    hub: Weak<Mutex<HubInner>>,
}

impl KeyListener {
    /// Returns the next queued chord without waiting.
    pub fn try_next(&mut self) -> Option<KeyChord> {
        self.rx.try_recv().ok()
    }

    /// Waits for the next chord. Returns `None` once the hub is gone.
    pub async fn next(&mut self) -> Option<KeyChord> {
        self.rx.recv().await
    }
}

impl Drop for KeyListener {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut inner = hub.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.remove(&self.id);
            tracing::debug!(listener = self.id, total = inner.listeners.len(), "Key listener removed");
        }
    }
}

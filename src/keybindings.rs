//! Customizable keybindings for the editor.
//!
//! Bindings are stored as chord strings (`"d"`, `"ArrowRight"`, `"Ctrl+Shift+Z"`)
//! so they can live in the JSON config.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ClassId;

/// A physical key as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// Printable character, stored lowercase
    Char(char),
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Delete,
    Backspace,
    Escape,
    Enter,
    Tab,
}

impl KeyCode {
    /// Build a character key, folding case.
    pub fn char(c: char) -> Self {
        KeyCode::Char(c.to_ascii_lowercase())
    }

    /// Parse a DOM-style key name (`"a"`, `"A"`, `"ArrowLeft"`, `"Delete"`...).
    pub fn from_name(name: &str) -> Option<Self> {
        let key = match name {
            "ArrowLeft" | "Left" => KeyCode::ArrowLeft,
            "ArrowRight" | "Right" => KeyCode::ArrowRight,
            "ArrowUp" | "Up" => KeyCode::ArrowUp,
            "ArrowDown" | "Down" => KeyCode::ArrowDown,
            "Delete" | "Del" => KeyCode::Delete,
            "Backspace" => KeyCode::Backspace,
            "Escape" | "Esc" => KeyCode::Escape,
            "Enter" => KeyCode::Enter,
            "Tab" => KeyCode::Tab,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyCode::char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCode::Char(c) => write!(f, "{}", c.to_ascii_uppercase()),
            KeyCode::ArrowLeft => f.write_str("ArrowLeft"),
            KeyCode::ArrowRight => f.write_str("ArrowRight"),
            KeyCode::ArrowUp => f.write_str("ArrowUp"),
            KeyCode::ArrowDown => f.write_str("ArrowDown"),
            KeyCode::Delete => f.write_str("Delete"),
            KeyCode::Backspace => f.write_str("Backspace"),
            KeyCode::Escape => f.write_str("Escape"),
            KeyCode::Enter => f.write_str("Enter"),
            KeyCode::Tab => f.write_str("Tab"),
        }
    }
}

/// Modifier keys held during an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        shift: false,
        alt: false,
    };
    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        shift: false,
        alt: false,
    };
    pub const CTRL_SHIFT: Modifiers = Modifiers {
        ctrl: true,
        shift: true,
        alt: false,
    };
}

/// What had keyboard focus when a key was pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusTarget {
    /// Canvas or page body
    #[default]
    Canvas,
    /// Text input or textarea; editor shortcuts are suppressed
    TextInput,
    /// Checkbox; shortcuts still apply
    Checkbox,
}

/// A key press delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: KeyCode,
    pub modifiers: Modifiers,
    pub focus: FocusTarget,
}

impl KeyEvent {
    pub fn new(key: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            key,
            modifiers,
            focus: FocusTarget::Canvas,
        }
    }

    pub fn with_focus(mut self, focus: FocusTarget) -> Self {
        self.focus = focus;
        self
    }
}

/// A key plus the modifiers that must accompany it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyChord {
    pub key: KeyCode,
    pub ctrl: bool,
    pub shift: bool,
}

impl KeyChord {
    pub const fn plain(key: KeyCode) -> Self {
        Self {
            key,
            ctrl: false,
            shift: false,
        }
    }

    pub const fn ctrl(key: KeyCode) -> Self {
        Self {
            key,
            ctrl: true,
            shift: false,
        }
    }

    pub const fn ctrl_shift(key: KeyCode) -> Self {
        Self {
            key,
            ctrl: true,
            shift: true,
        }
    }

    /// Check whether an event triggers this chord.
    ///
    /// Plain chords ignore Shift so caps lock does not matter; Ctrl chords
    /// need an exact Shift match so `Ctrl+Z` and `Ctrl+Shift+Z` stay distinct.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        if self.key != event.key || self.ctrl != event.modifiers.ctrl {
            return false;
        }
        !self.ctrl || self.shift == event.modifiers.shift
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            f.write_str("Ctrl+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        write!(f, "{}", self.key)
    }
}

impl From<KeyChord> for String {
    fn from(chord: KeyChord) -> Self {
        chord.to_string()
    }
}

impl TryFrom<String> for KeyChord {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut chord = KeyChord::plain(KeyCode::Escape);
        let mut parts: Vec<&str> = value.split('+').collect();
        // "Ctrl++" binds the plus key
        if value.ends_with("++") {
            parts.truncate(parts.len().saturating_sub(2));
            parts.push("+");
        }
        let key_name = parts.pop().ok_or_else(|| format!("empty key binding '{value}'"))?;
        for modifier in parts {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "cmd" => chord.ctrl = true,
                "shift" => chord.shift = true,
                other => return Err(format!("unknown modifier '{other}' in '{value}'")),
            }
        }
        chord.key =
            KeyCode::from_name(key_name).ok_or_else(|| format!("unknown key '{key_name}'"))?;
        Ok(chord)
    }
}

/// Editor actions reachable from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorCommand {
    PreviousImage,
    NextImage,
    /// Delete the selected box, or the current image if nothing is selected
    Delete,
    SelectClass(ClassId),
    Save,
    Undo,
    Redo,
    CancelDrawing,
    ToggleLabels,
    FitToScreen,
}

/// Keybinding configuration for the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub previous_image: Vec<KeyChord>,
    pub next_image: Vec<KeyChord>,
    pub delete: Vec<KeyChord>,
    pub class_normal: Vec<KeyChord>,
    pub class_defect: Vec<KeyChord>,
    pub save: Vec<KeyChord>,
    pub undo: Vec<KeyChord>,
    pub redo: Vec<KeyChord>,
    pub cancel: Vec<KeyChord>,
    pub toggle_labels: Vec<KeyChord>,
    pub fit_to_screen: Vec<KeyChord>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            previous_image: vec![
                KeyChord::plain(KeyCode::Char('a')),
                KeyChord::plain(KeyCode::ArrowLeft),
            ],
            next_image: vec![
                KeyChord::plain(KeyCode::Char('d')),
                KeyChord::plain(KeyCode::ArrowRight),
            ],
            delete: vec![
                KeyChord::plain(KeyCode::Delete),
                KeyChord::plain(KeyCode::Backspace),
            ],
            class_normal: vec![KeyChord::plain(KeyCode::Char('1'))],
            class_defect: vec![KeyChord::plain(KeyCode::Char('2'))],
            save: vec![KeyChord::ctrl(KeyCode::Char('s'))],
            undo: vec![KeyChord::ctrl(KeyCode::Char('z'))],
            redo: vec![
                KeyChord::ctrl(KeyCode::Char('y')),
                KeyChord::ctrl_shift(KeyCode::Char('z')),
            ],
            cancel: vec![KeyChord::plain(KeyCode::Escape)],
            toggle_labels: vec![KeyChord::plain(KeyCode::Char('l'))],
            fit_to_screen: vec![KeyChord::plain(KeyCode::Char('f'))],
        }
    }
}

impl KeyBindings {
    /// Create new keybindings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a key press to an editor command.
    ///
    /// Returns `None` while a text field has focus.
    pub fn command_for(&self, event: &KeyEvent) -> Option<EditorCommand> {
        if event.focus == FocusTarget::TextInput {
            return None;
        }

        let hit = |chords: &[KeyChord]| chords.iter().any(|c| c.matches(event));
        let command = if hit(&self.save) {
            EditorCommand::Save
        } else if hit(&self.undo) {
            EditorCommand::Undo
        } else if hit(&self.redo) {
            EditorCommand::Redo
        } else if hit(&self.cancel) {
            EditorCommand::CancelDrawing
        } else if hit(&self.delete) {
            EditorCommand::Delete
        } else if hit(&self.next_image) {
            EditorCommand::NextImage
        } else if hit(&self.previous_image) {
            EditorCommand::PreviousImage
        } else if hit(&self.class_normal) {
            EditorCommand::SelectClass(ClassId::Normal)
        } else if hit(&self.class_defect) {
            EditorCommand::SelectClass(ClassId::Defect)
        } else if hit(&self.toggle_labels) {
            EditorCommand::ToggleLabels
        } else if hit(&self.fit_to_screen) {
            EditorCommand::FitToScreen
        } else {
            return None;
        };
        log::trace!("Key {:?} -> {:?}", event.key, command);
        Some(command)
    }

    /// All bindings with a human-readable label, for help overlays.
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let join = |chords: &[KeyChord]| {
            chords
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" / ")
        };
        vec![
            ("Previous image", join(&self.previous_image)),
            ("Next image", join(&self.next_image)),
            ("Delete box / image", join(&self.delete)),
            ("Class: Normal", join(&self.class_normal)),
            ("Class: Defect", join(&self.class_defect)),
            ("Save", join(&self.save)),
            ("Undo", join(&self.undo)),
            ("Redo", join(&self.redo)),
            ("Cancel drawing", join(&self.cancel)),
            ("Toggle labels", join(&self.toggle_labels)),
            ("Fit to screen", join(&self.fit_to_screen)),
        ]
    }
}

//! Key Translation Table.
//!
//! Key names reach the daemon from two directions: portable symbols sent by
//! remote input sources (`ctrl`, `Enter`, `ArrowLeft`, `Numpad5`) and native
//! X keysym names used internally (`Control_L`, `Return`, `KP_5`). Both
//! namespaces are merged once at startup into an exact-name table and a
//! lowercase table. Lookup tries the exact name first, then its lowercase
//! form, and never guesses beyond that.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use thiserror::Error;

/// X keysym name understood by the automation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformKey(&'static str);

impl PlatformKey {
    pub const fn new(keysym: &'static str) -> Self {
        Self(keysym)
    }

    pub fn keysym(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub const SHIFT: PlatformKey = PlatformKey::new("Shift_L");
pub const CONTROL: PlatformKey = PlatformKey::new("Control_L");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown key name '{name}'")]
pub struct KeyResolutionError {
    pub name: String,
}

/// Native keysyms, resolvable under their own name.
const NATIVE_KEYSYMS: &[&str] = &[
    // letters and digits
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r",
    "s", "t", "u", "v", "w", "x", "y", "z", "0", "1", "2", "3", "4", "5", "6", "7", "8", "9",
    // editing and whitespace
    "space", "Return", "Tab", "ISO_Left_Tab", "BackSpace", "Escape", "Delete", "Insert",
    "Linefeed", "Clear",
    // navigation
    "Home", "End", "Page_Up", "Page_Down", "Prior", "Next", "Left", "Right", "Up", "Down",
    "Begin",
    // punctuation
    "exclam", "at", "numbersign", "dollar", "percent", "asciicircum", "ampersand", "asterisk",
    "parenleft", "parenright", "minus", "underscore", "equal", "plus", "bracketleft",
    "bracketright", "braceleft", "braceright", "backslash", "bar", "semicolon", "colon",
    "apostrophe", "quotedbl", "comma", "less", "period", "greater", "slash", "question",
    "grave", "asciitilde",
    // modifiers and locks
    "Shift_L", "Shift_R", "Control_L", "Control_R", "Alt_L", "Alt_R", "Meta_L", "Meta_R",
    "Super_L", "Super_R", "Hyper_L", "Hyper_R", "ISO_Level3_Shift", "Mode_switch",
    "Caps_Lock", "Num_Lock", "Scroll_Lock", "Shift_Lock",
    // system
    "Print", "Sys_Req", "Pause", "Break", "Menu", "Cancel", "Help", "Find", "Execute", "Undo",
    "Redo",
    // function keys
    "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10", "F11", "F12", "F13", "F14",
    "F15", "F16", "F17", "F18", "F19", "F20", "F21", "F22", "F23", "F24",
    // keypad
    "KP_0", "KP_1", "KP_2", "KP_3", "KP_4", "KP_5", "KP_6", "KP_7", "KP_8", "KP_9", "KP_Add",
    "KP_Subtract", "KP_Multiply", "KP_Divide", "KP_Decimal", "KP_Separator", "KP_Enter",
    "KP_Equal", "KP_Home", "KP_End", "KP_Up", "KP_Down", "KP_Left", "KP_Right", "KP_Prior",
    "KP_Next", "KP_Begin", "KP_Insert", "KP_Delete",
    // multimedia
    "XF86AudioPlay", "XF86AudioPause", "XF86AudioStop", "XF86AudioPrev", "XF86AudioNext",
    "XF86AudioRecord", "XF86AudioRewind", "XF86AudioForward", "XF86AudioMute",
    "XF86AudioRaiseVolume", "XF86AudioLowerVolume", "XF86AudioMicMute",
    "XF86MonBrightnessUp", "XF86MonBrightnessDown", "XF86Calculator", "XF86Mail",
    "XF86HomePage", "XF86Search", "XF86Eject", "XF86Back", "XF86Forward", "XF86Refresh",
    "XF86Favorites", "XF86Sleep", "XF86PowerOff",
];

/// Portable symbols and aliases, each pointing at a native keysym.
const PORTABLE_SYMBOLS: &[(&str, &str)] = &[
    // modifiers
    ("shift", "Shift_L"),
    ("ShiftLeft", "Shift_L"),
    ("ShiftRight", "Shift_R"),
    ("ctrl", "Control_L"),
    ("control", "Control_L"),
    ("Control", "Control_L"),
    ("ControlLeft", "Control_L"),
    ("ControlRight", "Control_R"),
    ("Ctrl_L", "Control_L"),
    ("Ctrl_R", "Control_R"),
    ("alt", "Alt_L"),
    ("AltLeft", "Alt_L"),
    ("AltRight", "Alt_R"),
    ("AltGr", "ISO_Level3_Shift"),
    ("option", "Alt_L"),
    ("Super", "Super_L"),
    ("super", "Super_L"),
    ("win", "Super_L"),
    ("cmd", "Super_L"),
    ("command", "Super_L"),
    ("meta", "Meta_L"),
    ("MetaLeft", "Super_L"),
    ("MetaRight", "Super_R"),
    // locks
    ("CapsLock", "Caps_Lock"),
    ("NumLock", "Num_Lock"),
    ("ScrollLock", "Scroll_Lock"),
    // editing
    ("Enter", "Return"),
    ("Esc", "Escape"),
    ("Backspace", "BackSpace"),
    ("Del", "Delete"),
    ("Ins", "Insert"),
    ("Space", "space"),
    ("PrintScreen", "Print"),
    ("ContextMenu", "Menu"),
    // navigation
    ("PageUp", "Page_Up"),
    ("PageDown", "Page_Down"),
    ("ArrowLeft", "Left"),
    ("ArrowRight", "Right"),
    ("ArrowUp", "Up"),
    ("ArrowDown", "Down"),
    // literal punctuation
    ("!", "exclam"),
    ("@", "at"),
    ("#", "numbersign"),
    ("$", "dollar"),
    ("%", "percent"),
    ("^", "asciicircum"),
    ("&", "ampersand"),
    ("*", "asterisk"),
    ("(", "parenleft"),
    (")", "parenright"),
    ("-", "minus"),
    ("_", "underscore"),
    ("=", "equal"),
    ("+", "plus"),
    ("[", "bracketleft"),
    ("]", "bracketright"),
    ("{", "braceleft"),
    ("}", "braceright"),
    ("\\", "backslash"),
    ("|", "bar"),
    (";", "semicolon"),
    (":", "colon"),
    ("'", "apostrophe"),
    ("\"", "quotedbl"),
    (",", "comma"),
    ("<", "less"),
    (".", "period"),
    (">", "greater"),
    ("/", "slash"),
    ("?", "question"),
    ("`", "grave"),
    ("~", "asciitilde"),
    (" ", "space"),
    // keypad
    ("Numpad0", "KP_0"),
    ("Numpad1", "KP_1"),
    ("Numpad2", "KP_2"),
    ("Numpad3", "KP_3"),
    ("Numpad4", "KP_4"),
    ("Numpad5", "KP_5"),
    ("Numpad6", "KP_6"),
    ("Numpad7", "KP_7"),
    ("Numpad8", "KP_8"),
    ("Numpad9", "KP_9"),
    ("NumpadAdd", "KP_Add"),
    ("NumpadSubtract", "KP_Subtract"),
    ("NumpadMultiply", "KP_Multiply"),
    ("NumpadDivide", "KP_Divide"),
    ("NumpadDecimal", "KP_Decimal"),
    ("NumpadEnter", "KP_Enter"),
    ("NumpadEqual", "KP_Equal"),
    // multimedia
    ("MediaPlayPause", "XF86AudioPlay"),
    ("MediaStop", "XF86AudioStop"),
    ("MediaTrackPrevious", "XF86AudioPrev"),
    ("MediaTrackNext", "XF86AudioNext"),
    ("AudioVolumeMute", "XF86AudioMute"),
    ("AudioVolumeUp", "XF86AudioRaiseVolume"),
    ("AudioVolumeDown", "XF86AudioLowerVolume"),
    ("VolumeMute", "XF86AudioMute"),
    ("VolumeUp", "XF86AudioRaiseVolume"),
    ("VolumeDown", "XF86AudioLowerVolume"),
    ("BrightnessUp", "XF86MonBrightnessUp"),
    ("BrightnessDown", "XF86MonBrightnessDown"),
];

pub struct KeyTable {
    exact: HashMap<&'static str, PlatformKey>,
    lower: HashMap<String, PlatformKey>,
}

impl KeyTable {
    fn build() -> Self {
        let native = NATIVE_KEYSYMS.iter().map(|sym| (*sym, PlatformKey::new(sym)));
        let portable = PORTABLE_SYMBOLS
            .iter()
            .map(|(name, sym)| (*name, PlatformKey::new(sym)));
        let ordered: Vec<(&'static str, PlatformKey)> = native.chain(portable).collect();

        let mut exact = HashMap::with_capacity(ordered.len());
        let mut lower = HashMap::with_capacity(ordered.len());
        for (name, key) in ordered {
            exact.entry(name).or_insert(key);
            lower.entry(name.to_lowercase()).or_insert(key);
        }
        Self { exact, lower }
    }

    /// Exact name, then lowercase name, then failure.
    pub fn resolve(&self, name: &str) -> Result<PlatformKey, KeyResolutionError> {
        if let Some(key) = self.exact.get(name) {
            return Ok(*key);
        }
        if let Some(key) = self.lower.get(&name.to_lowercase()) {
            return Ok(*key);
        }
        Err(KeyResolutionError {
            name: name.to_string(),
        })
    }

    /// Resolves every name or none of them.
    pub fn resolve_all<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<PlatformKey>, KeyResolutionError> {
        names.iter().map(|name| self.resolve(name.as_ref())).collect()
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}

static KEY_TABLE: Lazy<KeyTable> = Lazy::new(KeyTable::build);

/// Process-wide table, built on first use.
pub fn key_table() -> &'static KeyTable {
    &KEY_TABLE
}

pub fn resolve(name: &str) -> Result<PlatformKey, KeyResolutionError> {
    key_table().resolve(name)
}

//! Character-to-keystroke mapping for text typing on a US layout.

use thiserror::Error;

use crate::keymap::PlatformKey;

/// One physical key press, optionally with shift held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacterKeystroke {
    pub key: PlatformKey,
    pub with_shift: bool,
}

impl CharacterKeystroke {
    const fn plain(keysym: &'static str) -> Self {
        Self {
            key: PlatformKey::new(keysym),
            with_shift: false,
        }
    }

    const fn shifted(keysym: &'static str) -> Self {
        Self {
            key: PlatformKey::new(keysym),
            with_shift: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("character {ch:?} has no keystroke on this layout")]
pub struct CharacterMappingError {
    pub ch: char,
}

const LETTERS: [&str; 26] = [
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s",
    "t", "u", "v", "w", "x", "y", "z",
];

const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// Printable ASCII that is not a letter or digit.
const PUNCTUATION: &[(char, CharacterKeystroke)] = &[
    (' ', CharacterKeystroke::plain("space")),
    ('\t', CharacterKeystroke::plain("Tab")),
    ('`', CharacterKeystroke::plain("grave")),
    ('-', CharacterKeystroke::plain("minus")),
    ('=', CharacterKeystroke::plain("equal")),
    ('[', CharacterKeystroke::plain("bracketleft")),
    (']', CharacterKeystroke::plain("bracketright")),
    ('\\', CharacterKeystroke::plain("backslash")),
    (';', CharacterKeystroke::plain("semicolon")),
    ('\'', CharacterKeystroke::plain("apostrophe")),
    (',', CharacterKeystroke::plain("comma")),
    ('.', CharacterKeystroke::plain("period")),
    ('/', CharacterKeystroke::plain("slash")),
    ('~', CharacterKeystroke::shifted("grave")),
    ('!', CharacterKeystroke::shifted("1")),
    ('@', CharacterKeystroke::shifted("2")),
    ('#', CharacterKeystroke::shifted("3")),
    ('$', CharacterKeystroke::shifted("4")),
    ('%', CharacterKeystroke::shifted("5")),
    ('^', CharacterKeystroke::shifted("6")),
    ('&', CharacterKeystroke::shifted("7")),
    ('*', CharacterKeystroke::shifted("8")),
    ('(', CharacterKeystroke::shifted("9")),
    (')', CharacterKeystroke::shifted("0")),
    ('_', CharacterKeystroke::shifted("minus")),
    ('+', CharacterKeystroke::shifted("equal")),
    ('{', CharacterKeystroke::shifted("bracketleft")),
    ('}', CharacterKeystroke::shifted("bracketright")),
    ('|', CharacterKeystroke::shifted("backslash")),
    (':', CharacterKeystroke::shifted("semicolon")),
    ('"', CharacterKeystroke::shifted("apostrophe")),
    ('<', CharacterKeystroke::shifted("comma")),
    ('>', CharacterKeystroke::shifted("period")),
    ('?', CharacterKeystroke::shifted("slash")),
];

pub fn char_to_keystroke(ch: char) -> Result<CharacterKeystroke, CharacterMappingError> {
    if ch.is_ascii_lowercase() {
        return Ok(CharacterKeystroke::plain(LETTERS[(ch as u8 - b'a') as usize]));
    }
    if ch.is_ascii_uppercase() {
        return Ok(CharacterKeystroke::shifted(LETTERS[(ch as u8 - b'A') as usize]));
    }
    if ch.is_ascii_digit() {
        return Ok(CharacterKeystroke::plain(DIGITS[(ch as u8 - b'0') as usize]));
    }
    if ch == '\n' {
        return Ok(CharacterKeystroke::plain("Return"));
    }
    PUNCTUATION
        .iter()
        .find(|(c, _)| *c == ch)
        .map(|(_, stroke)| *stroke)
        .ok_or(CharacterMappingError { ch })
}

/// Maps the whole text before anything is typed.
pub fn text_to_keystrokes(text: &str) -> Result<Vec<CharacterKeystroke>, CharacterMappingError> {
    text.chars().map(char_to_keystroke).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(text: &str) -> Vec<(&'static str, bool)> {
        text_to_keystrokes(text)
            .unwrap()
            .into_iter()
            .map(|s| (s.key.keysym(), s.with_shift))
            .collect()
    }

    #[test]
    fn mixed_case_digits_and_symbols() {
        assert_eq!(
            pairs("Ab1!"),
            vec![("a", true), ("b", false), ("1", false), ("1", true)]
        );
    }

    #[test]
    fn whitespace_and_newline() {
        assert_eq!(
            pairs("a b\tc\n"),
            vec![
                ("a", false),
                ("space", false),
                ("b", false),
                ("Tab", false),
                ("c", false),
                ("Return", false),
            ]
        );
    }

    /// Expected key and shift state for every printable ASCII character.
    const US_ORACLE: [(char, &str, bool); 95] = [
        (' ', "space", false),
        ('!', "1", true),
        ('"', "apostrophe", true),
        ('#', "3", true),
        ('$', "4", true),
        ('%', "5", true),
        ('&', "7", true),
        ('\'', "apostrophe", false),
        ('(', "9", true),
        (')', "0", true),
        ('*', "8", true),
        ('+', "equal", true),
        (',', "comma", false),
        ('-', "minus", false),
        ('.', "period", false),
        ('/', "slash", false),
        ('0', "0", false),
        ('1', "1", false),
        ('2', "2", false),
        ('3', "3", false),
        ('4', "4", false),
        ('5', "5", false),
        ('6', "6", false),
        ('7', "7", false),
        ('8', "8", false),
        ('9', "9", false),
        (':', "semicolon", true),
        (';', "semicolon", false),
        ('<', "comma", true),
        ('=', "equal", false),
        ('>', "period", true),
        ('?', "slash", true),
        ('@', "2", true),
        ('A', "a", true),
        ('B', "b", true),
        ('C', "c", true),
        ('D', "d", true),
        ('E', "e", true),
        ('F', "f", true),
        ('G', "g", true),
        ('H', "h", true),
        ('I', "i", true),
        ('J', "j", true),
        ('K', "k", true),
        ('L', "l", true),
        ('M', "m", true),
        ('N', "n", true),
        ('O', "o", true),
        ('P', "p", true),
        ('Q', "q", true),
        ('R', "r", true),
        ('S', "s", true),
        ('T', "t", true),
        ('U', "u", true),
        ('V', "v", true),
        ('W', "w", true),
        ('X', "x", true),
        ('Y', "y", true),
        ('Z', "z", true),
        ('[', "bracketleft", false),
        ('\\', "backslash", false),
        (']', "bracketright", false),
        ('^', "6", true),
        ('_', "minus", true),
        ('`', "grave", false),
        ('a', "a", false),
        ('b', "b", false),
        ('c', "c", false),
        ('d', "d", false),
        ('e', "e", false),
        ('f', "f", false),
        ('g', "g", false),
        ('h', "h", false),
        ('i', "i", false),
        ('j', "j", false),
        ('k', "k", false),
        ('l', "l", false),
        ('m', "m", false),
        ('n', "n", false),
        ('o', "o", false),
        ('p', "p", false),
        ('q', "q", false),
        ('r', "r", false),
        ('s', "s", false),
        ('t', "t", false),
        ('u', "u", false),
        ('v', "v", false),
        ('w', "w", false),
        ('x', "x", false),
        ('y', "y", false),
        ('z', "z", false),
        ('{', "bracketleft", true),
        ('|', "backslash", true),
        ('}', "bracketright", true),
        ('~', "grave", true),
    ];

    #[test]
    fn every_printable_ascii_matches_oracle() {
        let covered: Vec<char> = US_ORACLE.iter().map(|(ch, _, _)| *ch).collect();
        let printable: Vec<char> = (0x20u8..0x7f).map(char::from).collect();
        assert_eq!(covered, printable);

        for (ch, keysym, with_shift) in US_ORACLE {
            let stroke = char_to_keystroke(ch).unwrap_or_else(|e| panic!("{e}"));
            assert_eq!(
                (stroke.key.keysym(), stroke.with_shift),
                (keysym, with_shift),
                "wrong keystroke for {ch:?}"
            );
        }
    }

    #[test]
    fn shifted_punctuation_uses_base_key() {
        assert_eq!(
            char_to_keystroke('?').unwrap(),
            CharacterKeystroke::shifted("slash")
        );
        assert_eq!(
            char_to_keystroke('"').unwrap(),
            CharacterKeystroke::shifted("apostrophe")
        );
    }

    #[test]
    fn unmappable_characters_fail() {
        assert_eq!(
            char_to_keystroke('é').unwrap_err(),
            CharacterMappingError { ch: 'é' }
        );
        assert!(text_to_keystrokes("ok 😀").is_err());
        assert!(char_to_keystroke('\r').is_err());
    }

    #[test]
    fn empty_text_maps_to_nothing() {
        assert!(text_to_keystrokes("").unwrap().is_empty());
    }
}

//! Key identifiers and their resolution from raw OS keys
//!
//! A `KeyId` is the stable token callbacks are registered against. Printable
//! keys resolve to their unshifted character, everything else to a
//! `Key.<name>` form, so the same physical key yields the same identifier on
//! press and release regardless of modifier state.

use serde::{Deserialize, Serialize};

/// Stable identifier for one physical key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Build an identifier from a user-supplied binding name.
    ///
    /// Single characters are lowercased so "W" and "w" name the same key;
    /// named keys are accepted with or without the `Key.` prefix.
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self(c.to_lowercase().collect()),
            _ => match name.strip_prefix("Key.") {
                Some(rest) => Self(format!("Key.{}", rest.to_lowercase())),
                None => Self(format!("Key.{}", name.to_lowercase())),
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for identifiers of non-printable keys
    pub fn is_named(&self) -> bool {
        self.0.starts_with("Key.")
    }
}

impl From<&str> for KeyId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for KeyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve a raw rdev key into its identifier. Total: every key maps to
/// something, unknown scan codes included.
pub fn resolve(key: &rdev::Key) -> KeyId {
    use rdev::Key;

    let printable = match key {
        Key::KeyA => 'a',
        Key::KeyB => 'b',
        Key::KeyC => 'c',
        Key::KeyD => 'd',
        Key::KeyE => 'e',
        Key::KeyF => 'f',
        Key::KeyG => 'g',
        Key::KeyH => 'h',
        Key::KeyI => 'i',
        Key::KeyJ => 'j',
        Key::KeyK => 'k',
        Key::KeyL => 'l',
        Key::KeyM => 'm',
        Key::KeyN => 'n',
        Key::KeyO => 'o',
        Key::KeyP => 'p',
        Key::KeyQ => 'q',
        Key::KeyR => 'r',
        Key::KeyS => 's',
        Key::KeyT => 't',
        Key::KeyU => 'u',
        Key::KeyV => 'v',
        Key::KeyW => 'w',
        Key::KeyX => 'x',
        Key::KeyY => 'y',
        Key::KeyZ => 'z',
        Key::Num0 => '0',
        Key::Num1 => '1',
        Key::Num2 => '2',
        Key::Num3 => '3',
        Key::Num4 => '4',
        Key::Num5 => '5',
        Key::Num6 => '6',
        Key::Num7 => '7',
        Key::Num8 => '8',
        Key::Num9 => '9',
        Key::Minus => '-',
        Key::Equal => '=',
        Key::LeftBracket => '[',
        Key::RightBracket => ']',
        Key::SemiColon => ';',
        Key::Quote => '\'',
        Key::BackSlash => '\\',
        Key::Comma => ',',
        Key::Dot => '.',
        Key::Slash => '/',
        Key::BackQuote => '`',
        _ => return KeyId(format!("Key.{}", named(key))),
    };

    KeyId(printable.to_string())
}

/// Name of a non-printable key, without the `Key.` prefix
fn named(key: &rdev::Key) -> String {
    use rdev::Key;

    let name = match key {
        Key::Space => "space",
        Key::Return => "enter",
        Key::KpReturn => "kp_enter",
        Key::Escape => "esc",
        Key::Tab => "tab",
        Key::Backspace => "backspace",
        Key::Delete => "delete",
        Key::Insert => "insert",
        Key::Home => "home",
        Key::End => "end",
        Key::PageUp => "page_up",
        Key::PageDown => "page_down",
        Key::UpArrow => "up",
        Key::DownArrow => "down",
        Key::LeftArrow => "left",
        Key::RightArrow => "right",
        Key::ShiftLeft => "shift",
        Key::ShiftRight => "shift_r",
        Key::ControlLeft => "ctrl_l",
        Key::ControlRight => "ctrl_r",
        Key::Alt => "alt",
        Key::AltGr => "alt_gr",
        Key::MetaLeft => "cmd",
        Key::MetaRight => "cmd_r",
        Key::CapsLock => "caps_lock",
        Key::NumLock => "num_lock",
        Key::ScrollLock => "scroll_lock",
        Key::PrintScreen => "print_screen",
        Key::Pause => "pause",
        Key::F1 => "f1",
        Key::F2 => "f2",
        Key::F3 => "f3",
        Key::F4 => "f4",
        Key::F5 => "f5",
        Key::F6 => "f6",
        Key::F7 => "f7",
        Key::F8 => "f8",
        Key::F9 => "f9",
        Key::F10 => "f10",
        Key::F11 => "f11",
        Key::F12 => "f12",
        Key::Unknown(code) => return format!("unknown_{code}"),
        other => return snake_case(&format!("{other:?}")),
    };

    name.to_string()
}

/// `KpMinus` -> `kp_minus`
fn snake_case(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for (i, c) in camel.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdev::Key;

    #[test]
    fn test_printable_keys() {
        assert_eq!(resolve(&Key::KeyW), KeyId::from("w"));
        assert_eq!(resolve(&Key::Num7), KeyId::from("7"));
        assert_eq!(resolve(&Key::Slash), KeyId::from("/"));
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(resolve(&Key::Space), KeyId::from("Key.space"));
        assert_eq!(resolve(&Key::ShiftRight), KeyId::from("Key.shift_r"));
        assert_eq!(resolve(&Key::F11), KeyId::from("Key.f11"));
        assert!(resolve(&Key::Escape).is_named());
    }

    #[test]
    fn test_unknown_key_is_resolved() {
        assert_eq!(resolve(&Key::Unknown(172)), KeyId::from("Key.unknown_172"));
    }

    #[test]
    fn test_fallback_names_are_snake_case() {
        assert_eq!(resolve(&Key::KpMinus), KeyId::from("Key.kp_minus"));
    }

    #[test]
    fn test_resolution_is_stable() {
        assert_eq!(resolve(&Key::KeyA), resolve(&Key::KeyA));
        assert_ne!(resolve(&Key::KeyA), resolve(&Key::KeyB));
    }

    #[test]
    fn test_parse_binding_names() {
        assert_eq!(KeyId::parse("W"), KeyId::from("w"));
        assert_eq!(KeyId::parse(" a "), KeyId::from("a"));
        assert_eq!(KeyId::parse("space"), KeyId::from("Key.space"));
        assert_eq!(KeyId::parse("Key.Space"), KeyId::from("Key.space"));
        assert_eq!(KeyId::parse("Key.space"), resolve(&Key::Space));
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("KpMultiply"), "kp_multiply");
        assert_eq!(snake_case("Function"), "function");
    }
}

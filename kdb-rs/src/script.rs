//! Keystroke scripts: plain characters plus `<Name>` tokens for keys that
//! have no printable form. Line breaks are ignored and lines starting with
//! `#` are comments, so `<Ret>` has to be spelled out.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use lazy_static::lazy_static;
/////////////////////////////////////////
use libkdb::Key;
/////////////////////////////////////////

lazy_static! {
    static ref KEY_NAMES: HashMap<&'static str, Key> = {
        let mut names = HashMap::new();
        names.insert("Ret", Key::Return);
        names.insert("Esc", Key::Escape);
        names.insert("Bs", Key::Backspace);
        names.insert("Tab", Key::Tab);
        names.insert("Up", Key::Up);
        names.insert("Down", Key::Down);
        names.insert("Left", Key::Left);
        names.insert("Right", Key::Right);
        names.insert("PgUp", Key::PageUp);
        names.insert("PgDn", Key::PageDown);
        names.insert("Home", Key::Home);
        names.insert("End", Key::End);
        names.insert("F1", Key::F1);
        names.insert("Space", Key::Char(' '));
        names.insert("Lt", Key::Char('<'));
        names
    };
}

fn named_key(name: &str) -> Option<Key> {
    if let Some(&key) = KEY_NAMES.get(name) {
        return Some(key);
    }
    // <C-u> and friends
    let letter = name.strip_prefix("C-")?;
    let mut chars = letter.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_lowercase() => Some(Key::Ctrl(c)),
        _ => None,
    }
}

pub fn parse_script(text: &str) -> Result<Vec<Key>> {
    let mut keys = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.starts_with('#') {
            continue;
        }
        let mut rest = line;
        while let Some(c) = rest.chars().next() {
            if c != '<' {
                keys.push(Key::Char(c));
                rest = &rest[c.len_utf8()..];
                continue;
            }
            let end = rest
                .find('>')
                .ok_or_else(|| anyhow!("line {}: unterminated key name in {:?}", number + 1, line))?;
            let name = &rest[1..end];
            let key = named_key(name).ok_or_else(|| anyhow!("line {}: unknown key <{}>", number + 1, name))?;
            keys.push(key);
            rest = &rest[end + 1..];
        }
    }
    Ok(keys)
}

pub fn load_script(path: &Path) -> Result<Vec<Key>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&text).with_context(|| format!("Invalid script {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let keys = parse_script("# dump the current stack\nd<Ret><PgDn>\n<Lt><C-u>x <Esc>\n").expect("valid script");
        assert_eq!(
            keys,
            vec![
                Key::Char('d'),
                Key::Return,
                Key::PageDown,
                Key::Char('<'),
                Key::Ctrl('u'),
                Key::Char('x'),
                Key::Char(' '),
                Key::Escape,
            ]
        );
    }

    #[test]
    fn test_bad_scripts() {
        assert!(parse_script("t<Ret").is_err());
        assert!(parse_script("<Nope>").is_err());
        assert!(parse_script("<C-UU>").is_err());
    }
}

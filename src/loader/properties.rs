//! Java `.properties` parsing (e.g. `local.properties`).
//!
//! Keys are kept flat: `flutter.sdk=/opt/flutter` becomes the single key
//! `flutter.sdk`, which `${flutter.sdk}` references can still reach.

use serde_json::{Map, Value};

/// Parse properties text into a flat table of string values.
pub fn parse_properties(content: &str) -> Map<String, Value> {
    let mut entries = Map::new();
    let mut logical = String::new();

    for raw in content.lines() {
        let line = raw.trim_start();
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }
        if ends_with_continuation(line) {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);
        insert_entry(&mut entries, &logical);
        logical.clear();
    }
    if !logical.is_empty() {
        insert_entry(&mut entries, &logical);
    }
    entries
}

fn insert_entry(entries: &mut Map<String, Value>, line: &str) {
    let (key, value) = split_entry(line);
    entries.insert(unescape(key), Value::String(unescape(value)));
}

/// An odd number of trailing backslashes continues the line.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// The key ends at the first unescaped `=`, `:` or whitespace.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix(|c| c == '=' || c == ':')
                    .unwrap_or(rest)
                    .trim_start();
                return (&line[..i], rest);
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => out.push(decoded),
                    _ => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_properties() {
        let content = "\
## This file must *NOT* be checked into Version Control Systems,
# as it contains information specific to your local configuration.
sdk.dir=/home/dev/Android/Sdk
flutter.sdk=/home/dev/flutter
flutter.buildMode=debug
flutter.versionName=1.0.0
flutter.versionCode=1
";
        let entries = parse_properties(content);
        assert_eq!(entries.len(), 5);
        assert_eq!(entries["flutter.sdk"], "/home/dev/flutter");
        assert_eq!(entries["sdk.dir"], "/home/dev/Android/Sdk");
        assert_eq!(entries["flutter.versionCode"], "1");
    }

    #[test]
    fn test_separators() {
        let entries = parse_properties("a=1\nb: 2\nc 3\nd = 4\ne\n");
        assert_eq!(entries["a"], "1");
        assert_eq!(entries["b"], "2");
        assert_eq!(entries["c"], "3");
        assert_eq!(entries["d"], "4");
        assert_eq!(entries["e"], "");
    }

    #[test]
    fn test_windows_path_escapes() {
        let entries = parse_properties(r"flutter.sdk=C:\\src\\flutter");
        assert_eq!(entries["flutter.sdk"], r"C:\src\flutter");

        let entries = parse_properties(r"sdk.dir=C\:\\Android\\sdk");
        assert_eq!(entries["sdk.dir"], r"C:\Android\sdk");
    }

    #[test]
    fn test_line_continuation() {
        let entries = parse_properties("list=a,\\\n    b,\\\n    c\nnext=1");
        assert_eq!(entries["list"], "a,b,c");
        assert_eq!(entries["next"], "1");
    }

    #[test]
    fn test_escaped_trailing_backslash_is_not_continuation() {
        let entries = parse_properties("path=C:\\\\\nnext=1");
        assert_eq!(entries["path"], "C:\\");
        assert_eq!(entries["next"], "1");
    }

    #[test]
    fn test_unicode_escape() {
        let entries = parse_properties(r"name=caf\u00e9");
        assert_eq!(entries["name"], "café");
    }

    #[test]
    fn test_escaped_separator_in_key() {
        let entries = parse_properties(r"a\=b=c");
        assert_eq!(entries["a=b"], "c");
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let entries = parse_properties("# comment\n! also comment\n\n   \nkey=value\n");
        assert_eq!(entries.len(), 1);
    }
}

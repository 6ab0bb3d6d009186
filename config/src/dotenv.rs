//! Minimal `.env` parsing into a key-value map. Application order (never
//! overwriting existing env) is decided in the crate root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn locate(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = match override_dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().ok()?,
    };
    let candidate = dir.join(".env");
    candidate.is_file().then_some(candidate)
}

/// Parses `KEY=VALUE` lines. Blank lines and `#` comments are skipped; keys
/// and values are trimmed. Double-quoted values understand `\"`;
/// single-quoted values are taken verbatim. No multi-line values.
fn parse(content: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = line_value(value.trim());
        out.insert(key.to_string(), value);
    }
    out
}

fn line_value(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return raw[1..raw.len() - 1].replace("\\\"", "\"");
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].to_string();
    }
    raw.to_string()
}

/// Loads `.env` from `override_dir` (or the current directory). A missing
/// file yields an empty map.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    match locate(override_dir) {
        Some(path) => Ok(parse(&std::fs::read_to_string(path)?)),
        None => Ok(HashMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_pairs_parse() {
        let m = parse("A=1\nB=two\n");
        assert_eq!(m.get("A").map(String::as_str), Some("1"));
        assert_eq!(m.get("B").map(String::as_str), Some("two"));
    }

    #[test]
    fn comments_blanks_and_junk_lines_are_skipped() {
        let m = parse("# note\n\nKEY=val\nnot-a-pair\n=orphan\n");
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("KEY").map(String::as_str), Some("val"));
    }

    #[test]
    fn quoting_rules() {
        let m = parse("A=\"hello world\"\nB='literal \\n'\nC=\"say \\\"hi\\\"\"\nD=\"\"\n");
        assert_eq!(m.get("A").map(String::as_str), Some("hello world"));
        assert_eq!(m.get("B").map(String::as_str), Some("literal \\n"));
        assert_eq!(m.get("C").map(String::as_str), Some("say \"hi\""));
        assert_eq!(m.get("D").map(String::as_str), Some(""));
    }

    #[test]
    fn empty_value_is_kept() {
        let m = parse("KEY=\n");
        assert_eq!(m.get("KEY").map(String::as_str), Some(""));
    }

    #[test]
    fn missing_file_is_an_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_map(Some(dir.path())).unwrap().is_empty());
    }

    #[test]
    fn file_is_read_from_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "X=1\n").unwrap();
        let m = load_env_map(Some(dir.path())).unwrap();
        assert_eq!(m.get("X").map(String::as_str), Some("1"));
    }
}

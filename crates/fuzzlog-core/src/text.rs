//! Bracket-balancing helpers shared by the log grammars.
//!
//! Fuzzer output nests freely (`f(Concat(a, Extract(0x9f, 0x00, b)))`,
//! tuple arguments, quoted strings containing commas), so splitting is done
//! by scanning with a depth counter instead of regex alone. Quotes suspend
//! depth tracking.

use std::sync::OnceLock;

use regex::Regex;

/// Compile `pattern` once into `cell`. Returns `None` if the pattern does
/// not compile; callers treat that as "no match".
pub fn cached_regex(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            log::error!("compile regex {pattern:?}: {err}");
            None
        }
    })
    .as_ref()
}

/// Index of the bracket closing the one opened at `open`. Supports `()`,
/// `[]` and `{}`; brackets inside double quotes are ignored.
#[must_use]
pub fn matching_close(input: &str, open: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let (opener, closer) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'[' => (b'[', b']'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    for (idx, &byte) in bytes.iter().enumerate().skip(open) {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_quotes = false;
            }
            continue;
        }
        if byte == b'"' {
            in_quotes = true;
        } else if byte == opener {
            depth += 1;
        } else if byte == closer {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

/// Split on commas that sit at bracket depth zero and outside quotes.
/// Pieces are trimmed; an all-whitespace input yields no pieces.
#[must_use]
pub fn split_top_level(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in input.chars() {
        if in_quotes {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_quotes = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_quotes = true;
                current.push(ch);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// True when every `(` has a matching `)`, ignoring quoted text.
#[must_use]
pub fn parens_balanced(input: &str) -> bool {
    let mut depth = 0i64;
    let mut in_quotes = false;
    for ch in input.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}

/// Replace every non-word character with `_`, as Solidity identifiers need.
#[must_use]
pub fn sanitize_identifier(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

/// Remove ANSI SGR colour sequences.
#[must_use]
pub fn strip_ansi(line: &str) -> String {
    static ANSI: OnceLock<Option<Regex>> = OnceLock::new();
    match cached_regex(&ANSI, r"\x1b\[[0-9;]*[A-Za-z]") {
        Some(re) => re.replace_all(line, "").into_owned(),
        None => line.to_string(),
    }
}

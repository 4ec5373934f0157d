//! Locate a named function inside a dispatch source file.
//!
//! Both the literal extractor and the patcher work on the same two regions of
//! a function: the attribute/doc block directly above its declaration, and
//! its body. Lookup is first-match: later functions with the same name are
//! never touched.
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static ANY_FN_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bfn\s+([A-Za-z_][A-Za-z0-9_]*)\s*[<(]")
        .expect("ANY_FN_DECL regex should compile")
});

/// Byte ranges of one function within its source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionScope {
    /// Attribute and doc lines directly above the declaration.
    pub leading: Range<usize>,
    /// Declaration line through the closing brace of the body.
    pub body: Range<usize>,
    /// Zero-based line index of the declaration.
    pub decl_line: usize,
}

impl FunctionScope {
    /// Regions in the order literals are searched: attribute block first,
    /// then the body expression.
    pub fn regions(&self) -> [Range<usize>; 2] {
        [self.leading.clone(), self.body.clone()]
    }
}

/// Regex matching the declaration of `name`, e.g. `pub fn register(`.
pub fn decl_pattern(name: &str) -> Regex {
    let pattern = format!(r"\bfn\s+{}\s*[<(]", regex::escape(name));
    Regex::new(&pattern).expect("escaped function name always compiles")
}

/// Find the first function declared as `name` and compute its regions.
pub fn locate(source: &str, name: &str) -> Option<FunctionScope> {
    let decl = decl_pattern(name);
    let lines = line_offsets(source);
    let decl_line = lines.iter().position(|(_, line)| decl.is_match(line))?;

    // Walking upward, `unclosed` counts brackets closed below but not yet
    // opened; while positive the line sits inside a multi-line attribute
    // such as `#[pallet::weight({ ... })]`.
    let mut leading_start = decl_line;
    let mut unclosed = 0isize;
    while leading_start > 0 {
        let (_, line) = lines[leading_start - 1];
        if unclosed <= 0 && !belongs_to_leading_block(line) {
            break;
        }
        unclosed += bracket_balance(line);
        leading_start -= 1;
    }

    let decl_offset = lines[decl_line].0;
    let leading = lines[leading_start].0..decl_offset;
    let body_end = body_end(source, decl_offset);
    Some(FunctionScope {
        leading,
        body: decl_offset..body_end,
        decl_line,
    })
}

/// Names of every function declared in `source`, in textual order.
pub fn declared_names(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| ANY_FN_DECL.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

fn line_offsets(source: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    let mut lines = Vec::new();
    for chunk in source.split_inclusive('\n') {
        lines.push((offset, chunk));
        offset += chunk.len();
    }
    lines
}

fn belongs_to_leading_block(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    if trimmed.starts_with("//") {
        return true;
    }
    if ANY_FN_DECL.is_match(trimmed) {
        return false;
    }
    !trimmed.ends_with(['}', ';', '{'])
}

/// Closing minus opening brackets on one line, ignoring string contents and
/// a trailing line comment.
fn bracket_balance(line: &str) -> isize {
    let mut balance = 0;
    let mut in_string = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_string {
            match ch {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '/' if chars.peek() == Some(&'/') => break,
            '"' => in_string = true,
            '(' | '[' | '{' => balance -= 1,
            ')' | ']' | '}' => balance += 1,
            _ => {}
        }
    }
    balance
}

/// Offset just past the brace that closes the body starting at `start`.
///
/// Braces inside comments, string literals (plain, byte and raw) and char
/// literals are skipped. A declaration without a body ends at its
/// terminating `;`.
fn body_end(source: &str, start: usize) -> usize {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut opened = false;
    let mut idx = start;
    while idx < bytes.len() {
        match bytes[idx] {
            b'/' if bytes.get(idx + 1) == Some(&b'/') => {
                idx = line_comment_end(bytes, idx);
                continue;
            }
            b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                idx = block_comment_end(bytes, idx);
                continue;
            }
            b'"' => {
                idx = string_end(bytes, idx + 1);
                continue;
            }
            b'r' if starts_literal_prefix(bytes, idx) => {
                if let Some(end) = raw_string_end(bytes, idx) {
                    idx = end;
                    continue;
                }
            }
            b'\'' => {
                idx = char_literal_end(source, idx);
                continue;
            }
            b'{' => {
                depth += 1;
                opened = true;
            }
            b'}' if opened => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return idx + 1;
                }
            }
            b';' if !opened => return idx + 1,
            _ => {}
        }
        idx += 1;
    }
    bytes.len()
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Whether the `r` at `idx` can open a raw string: it starts a token, or
/// follows a `b` that does.
fn starts_literal_prefix(bytes: &[u8], idx: usize) -> bool {
    match idx.checked_sub(1).map(|prev| bytes[prev]) {
        None => true,
        Some(b'b') => idx < 2 || !is_ident_byte(bytes[idx - 2]),
        Some(prev) => !is_ident_byte(prev),
    }
}

fn line_comment_end(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx] != b'\n' {
        idx += 1;
    }
    idx
}

/// Block comments nest in Rust.
fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut idx = start;
    while idx < bytes.len() {
        if bytes[idx] == b'/' && bytes.get(idx + 1) == Some(&b'*') {
            depth += 1;
            idx += 2;
        } else if bytes[idx] == b'*' && bytes.get(idx + 1) == Some(&b'/') {
            depth -= 1;
            idx += 2;
            if depth == 0 {
                return idx;
            }
        } else {
            idx += 1;
        }
    }
    bytes.len()
}

/// `idx` is just past the opening quote.
fn string_end(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'"' => return idx + 1,
            _ => idx += 1,
        }
    }
    bytes.len()
}

/// End of `r"..."` or `r#"..."#` starting at the `r`, or `None` when the `r`
/// is an ordinary identifier character.
fn raw_string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut idx = start + 1;
    let mut hashes = 0;
    while bytes.get(idx) == Some(&b'#') {
        hashes += 1;
        idx += 1;
    }
    if bytes.get(idx) != Some(&b'"') {
        return None;
    }
    idx += 1;
    while idx < bytes.len() {
        if bytes[idx] == b'"'
            && bytes.len() - idx > hashes
            && bytes[idx + 1..=idx + hashes].iter().all(|byte| *byte == b'#')
        {
            return Some(idx + 1 + hashes);
        }
        idx += 1;
    }
    Some(bytes.len())
}

/// Skip a char literal such as `'"'` or `'\''`. Lifetimes and loop labels
/// only advance past the quote.
fn char_literal_end(source: &str, start: usize) -> usize {
    let rest = &source[start + 1..];
    let mut chars = rest.char_indices();
    match chars.next() {
        Some((_, '\\')) => {
            // Escapes: `\n`, `\'`, `\x7f`, `\u{7b}`. The escaped char itself
            // is never the closing quote.
            for (offset, ch) in chars.skip(1) {
                if ch == '\'' {
                    return start + 1 + offset + 1;
                }
                if ch == '\n' {
                    break;
                }
            }
            start + 1
        }
        Some((_, ch)) => match chars.next() {
            Some((offset, '\'')) if ch != '\'' => start + 1 + offset + 1,
            _ => start + 1,
        },
        None => start + 1,
    }
}

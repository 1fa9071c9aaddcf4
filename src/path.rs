//! Field paths.
//!
//! A path is a dot separated list of member names with `[n]` array indexes,
//! e.g. `actors[2].name`. Member names containing `.`, `[`, `]` or `\` are
//! escaped with a backslash.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

const SPECIAL: [char; 4] = ['.', '[', ']', '\\'];

pub fn escape_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn unescape_field_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Appends `added` to `current`.
pub fn full_path(current: &str, added: &str) -> String {
    let added = added.strip_prefix('.').unwrap_or(added);
    if added.is_empty() {
        current.to_string()
    } else if current.is_empty() {
        added.to_string()
    } else if added.starts_with('[') {
        format!("{}{}", current, added)
    } else {
        format!("{}.{}", current, added)
    }
}

/// Splits a path into segments, unescaping member names.
///
/// Returns `None` when a bracket does not hold an array index.
pub fn split_path(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '.' => {
                if !current.is_empty() {
                    segments.push(Segment::Field(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(Segment::Field(std::mem::take(&mut current)));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) => digits.push(d),
                        None => return None,
                    }
                }
                segments.push(Segment::Index(digits.trim().parse().ok()?));
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(Segment::Field(current));
    }
    Some(segments)
}

/// Path without its last segment.
pub fn parent_path(path: &str) -> String {
    let chars: Vec<char> = path.chars().collect();
    let mut cut = 0;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '.' | '[' => cut = i,
            _ => {}
        }
        i += 1;
    }
    chars[..cut].iter().collect()
}

/// The last `[n]` of a path, if the path ends in one.
pub fn last_index(path: &str) -> Option<usize> {
    match split_path(path)?.pop()? {
        Segment::Index(i) => Some(i),
        Segment::Field(_) => None,
    }
}

/// The last member name of a path, skipping trailing indexes.
pub fn last_key(path: &str) -> Option<String> {
    split_path(path)?.into_iter().rev().find_map(|s| match s {
        Segment::Field(name) => Some(name),
        Segment::Index(_) => None,
    })
}

/// Path of the value enclosing the one at `path`. Array indexes are
/// skipped, so the parent of `items[2]` is the object holding `items`.
pub fn up_path(path: &str) -> String {
    let mut path = path.to_string();
    while last_index(&path).is_some() {
        path = parent_path(&path);
    }
    parent_path(&path)
}

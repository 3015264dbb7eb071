//! Materialized-path helpers.
//!
//! Folder and file paths are stored as `/`-separated strings. Everything that
//! writes a path goes through [`normalize`] first so prefix comparisons during
//! a rename cascade stay well-defined.

/// Separator used inside every stored path.
pub const SEPARATOR: char = '/';

/// Normalize a path string: backslashes become `/`, repeated separators
/// collapse, `.` segments are dropped and a trailing separator is removed
/// (a bare root such as `/` or `C:/` keeps its separator).
pub fn normalize(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let absolute = unified.starts_with('/');

    let segments: Vec<&str> = unified
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    let mut out = String::with_capacity(unified.len());
    if absolute {
        out.push(SEPARATOR);
    }
    out.push_str(&segments.join("/"));

    if is_drive(&out) {
        out.push(SEPARATOR);
    }
    out
}

/// Join a folder path and a child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        return name.to_string();
    }
    if parent.ends_with(SEPARATOR) {
        format!("{parent}{name}")
    } else {
        format!("{parent}{SEPARATOR}{name}")
    }
}

/// Last segment of a normalized path.
pub fn last_segment(path: &str) -> &str {
    path.trim_end_matches(SEPARATOR)
        .rsplit(SEPARATOR)
        .next()
        .unwrap_or("")
}

/// Parent of a normalized path, or `None` when the path is top-level, i.e.
/// its parent would be empty or a bare filesystem root.
pub fn parent(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches(SEPARATOR);
    let idx = trimmed.rfind(SEPARATOR)?;
    let up = &trimmed[..idx];
    if up.is_empty() || is_bare_root(up) {
        None
    } else {
        Some(up.to_string())
    }
}

/// True for `/`, an empty string, or a drive root like `C:` / `C:/`.
pub fn is_bare_root(path: &str) -> bool {
    let trimmed = path.trim_end_matches(SEPARATOR);
    trimmed.is_empty() || is_drive(trimmed)
}

fn is_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Detect path-traversal markers (`..` segments or a `~` home reference).
pub fn contains_traversal(path: &str) -> bool {
    path.contains('~')
        || path
            .split(['/', '\\'])
            .any(|segment| segment.trim() == "..")
}

/// True when `path` is `prefix` itself or lies underneath it.
pub fn is_within(path: &str, prefix: &str) -> bool {
    path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path[prefix.len()..].starts_with(SEPARATOR))
}

/// Replace the `old_prefix` of `path` with `new_prefix`. Returns `None` when
/// `path` does not lie under `old_prefix`.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if !is_within(path, old_prefix) {
        return None;
    }
    Some(format!("{new_prefix}{}", &path[old_prefix.len()..]))
}

/// Directory under the storage root that holds recycled artifacts.
pub const RECYCLE_BIN_DIR: &str = ".trash";

/// Validate a single name segment (folder name or display filename).
pub fn validate_name(name: &str) -> Result<&str, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if trimmed == "." || trimmed == ".." {
        return Err(format!("'{trimmed}' is not a valid name"));
    }
    if trimmed.eq_ignore_ascii_case(RECYCLE_BIN_DIR) {
        return Err(format!("'{trimmed}' is reserved for the recycle bin"));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(format!("name '{trimmed}' must not contain path separators"));
    }
    if trimmed.chars().any(|c| c.is_control() || matches!(c, '<' | '>' | '"' | '|' | '?' | '*')) {
        return Err(format!("name '{trimmed}' contains invalid characters"));
    }
    Ok(trimmed)
}

//! Path Resolver (spec §4.6): normalizes filesystem paths into index-relative
//! POSIX paths, turns glob-ish user patterns into segment-bounded matchers,
//! and enforces the `.ddb/**` protected prefix.
//!
//! The redesign note in spec §9 calls for patterns to carry both the query
//! expression and its escape character as a bound value rather than being
//! string-interpolated into SQL. [`Pattern`] is that value; `dronedb-store`
//! binds it as a parameter, never concatenates it into a query string.

use crate::error::{DdbError, Result};
use globset::{Glob, GlobMatcher};
use std::path::{Component, Path};

/// Directories/files under this prefix can never be removed or moved by
/// resolver-driven operations.
pub const PROTECTED_PREFIX: &str = ".ddb";

/// Normalize an absolute or relative filesystem path into a POSIX-style,
/// root-relative path: forward slashes, no leading `./`, `.` and `..`
/// segments lexically reduced. Refuses to produce a path that would escape
/// `root`.
pub fn normalize(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<String> {
    let root = root.as_ref();
    let path = path.as_ref();

    let relative = if path.is_absolute() {
        path.strip_prefix(root)
            .map_err(|_| DdbError::invalid_args(format!("{:?} is not under root {:?}", path, root)))?
    } else {
        path
    };

    let mut stack: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                stack.push(part.to_string_lossy().replace('\\', "/"));
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(DdbError::invalid_args(format!(
                        "path {:?} escapes index root via '..'",
                        path
                    )));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(DdbError::invalid_args(format!(
                    "path {:?} must be relative to index root",
                    path
                )));
            }
        }
    }

    Ok(stack.join("/"))
}

/// Refuses a path under the protected `.ddb/` prefix.
pub fn check_not_protected(path: &str) -> Result<()> {
    if path == PROTECTED_PREFIX || path.starts_with(&format!("{}/", PROTECTED_PREFIX)) {
        Err(DdbError::invalid_args(format!("{:?} is under the protected {:?} prefix", path, PROTECTED_PREFIX)))
    } else {
        Ok(())
    }
}

/// A compiled pattern ready to be bound into a query or matched in memory.
/// `like_expr`/`escape_char` are the SQL-side representation (spec §9
/// redesign note: bound, never interpolated); `matcher` is the in-memory
/// segment-bounded matcher used to enforce "does not pierce beyond the
/// first segment unless recursion is requested".
pub struct Pattern {
    pub like_expr: String,
    pub escape_char: char,
    matcher: GlobMatcher,
}

impl Pattern {
    /// Compile a user-supplied pattern (`*` -> any run of non-separator
    /// characters, `?` -> single character) into a [`Pattern`].
    pub fn compile(raw: &str) -> Result<Self> {
        let like_expr = to_like_expression(raw);
        let glob = Glob::new(raw)
            .map_err(|e| DdbError::invalid_args(format!("invalid pattern {:?}: {}", raw, e)))?;
        Ok(Self { like_expr, escape_char: '\\', matcher: glob.compile_matcher() })
    }

    /// Does `path` match this pattern within its own path segment (i.e.
    /// without considering recursion into subdirectories)?
    pub fn matches_segment(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

/// Translates a glob-ish user pattern (`*`, `?`) into a SQL `LIKE`
/// expression with `\` as the escape character, escaping any literal `%`
/// or `_` the user's pattern happened to contain.
fn to_like_expression(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for ch in raw.chars() {
        match ch {
            '*' => out.push('%'),
            '?' => out.push('_'),
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            other => out.push(other),
        }
    }
    out
}

/// Given a set of (path, depth) index entries, a compiled pattern, and a
/// recursion request, returns the matching paths following spec §4.6:
/// without recursion only direct descendants (one level below a matched
/// directory) are included; with recursion + `max_depth`, descendants with
/// `depth <= source_depth + max_depth` are included. Output is sorted by
/// path for determinism.
pub fn resolve_listing<'a>(
    entries: &'a [(String, i32)],
    pattern: &Pattern,
    recursive: bool,
    max_recursion_depth: Option<u32>,
) -> Vec<&'a str> {
    let mut roots: Vec<(&str, i32)> = Vec::new();
    for (path, depth) in entries {
        if pattern.matches_segment(path) {
            roots.push((path.as_str(), *depth));
        }
    }

    let mut out: Vec<&str> = Vec::new();
    for (path, depth) in entries {
        let path_str = path.as_str();
        if roots.iter().any(|(r, _)| *r == path_str) {
            out.push(path_str);
            continue;
        }
        for (root, root_depth) in &roots {
            let prefix = format!("{}/", root);
            if let Some(_rest) = path_str.strip_prefix(prefix.as_str()) {
                let relative_depth = depth - root_depth;
                let allowed = if recursive {
                    relative_depth <= max_recursion_depth.unwrap_or(u32::MAX) as i32
                } else {
                    relative_depth <= 1
                };
                if allowed {
                    out.push(path_str);
                    break;
                }
            }
        }
    }

    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_reduces_dot_segments() {
        let p = normalize("/data/root", "/data/root/./a/../b/c.txt").unwrap();
        assert_eq!(p, "b/c.txt");
        assert!(!p.contains(".."));
        assert!(!p.contains("./"));
        assert!(!p.contains('\\'));
    }

    #[test]
    fn normalize_refuses_escape() {
        let err = normalize("/data/root", "/data/root/../../etc/passwd").unwrap_err();
        assert!(matches!(err, DdbError::InvalidArgs(_)));
    }

    #[test]
    fn normalize_accepts_relative_paths() {
        let p = normalize("/data/root", "a/b/c.txt").unwrap();
        assert_eq!(p, "a/b/c.txt");
    }

    #[test]
    fn protected_prefix_is_rejected() {
        assert!(check_not_protected(".ddb/dbase.sqlite").is_err());
        assert!(check_not_protected(".ddb").is_err());
        assert!(check_not_protected("images/ddb.jpg").is_ok());
    }

    #[test]
    fn like_expression_escapes_reserved_chars() {
        assert_eq!(to_like_expression("pics*"), "pics%");
        assert_eq!(to_like_expression("im?g.jpg"), "im_g.jpg");
        assert_eq!(to_like_expression("100%_done*"), "100\\%\\_done%");
    }

    #[test]
    fn wildcard_does_not_pierce_segments_without_matching_root() {
        let pattern = Pattern::compile("pics*").unwrap();
        assert!(pattern.matches_segment("pics"));
        assert!(pattern.matches_segment("pics.JPG"));
        assert!(!pattern.matches_segment("pics/IMG_001.jpg"));
        assert!(!pattern.matches_segment("other/pics2/x.jpg"));
    }

    #[test]
    fn resolve_listing_includes_direct_children_without_recursion() {
        let entries = vec![
            ("pics".to_string(), 0),
            ("pics.JPG".to_string(), 0),
            ("pics/IMG_001.jpg".to_string(), 1),
            ("pics/sub".to_string(), 1),
            ("pics/sub/IMG_002.jpg".to_string(), 2),
            ("other.txt".to_string(), 0),
        ];
        let pattern = Pattern::compile("pics*").unwrap();
        let matched = resolve_listing(&entries, &pattern, false, None);
        assert_eq!(matched, vec!["pics", "pics.JPG", "pics/IMG_001.jpg", "pics/sub"]);
    }

    #[test]
    fn resolve_listing_honors_recursion_depth() {
        let entries = vec![
            ("pics".to_string(), 0),
            ("pics/IMG_001.jpg".to_string(), 1),
            ("pics/sub".to_string(), 1),
            ("pics/sub/IMG_002.jpg".to_string(), 2),
        ];
        let pattern = Pattern::compile("pics").unwrap();
        let matched = resolve_listing(&entries, &pattern, true, Some(1));
        assert_eq!(matched, vec!["pics", "pics/IMG_001.jpg", "pics/sub"]);

        let matched_deep = resolve_listing(&entries, &pattern, true, Some(2));
        assert_eq!(matched_deep, vec!["pics", "pics/IMG_001.jpg", "pics/sub", "pics/sub/IMG_002.jpg"]);
    }
}

//! Delta Engine (spec §4.7): diffs two entry trees identified by
//! `(path, hash, type)` triples and produces an `adds`/`removes`/`copies`
//! operation list a sync driver can apply without re-transferring bytes
//! that already exist somewhere in the destination tree.

use dronedb_core::entry::EntryType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A minimal view of an entry: everything the Delta Engine needs and
/// nothing else, so callers can build it straight from a `query_all()`
/// result without re-touching the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeEntry {
    pub path: String,
    pub hash: String,
    pub r#type: EntryType,
}

impl TreeEntry {
    pub fn new(path: impl Into<String>, hash: impl Into<String>, r#type: EntryType) -> Self {
        Self { path: path.into(), hash: hash.into(), r#type }
    }
}

/// A local-copy instruction: bytes already at `source` (an existing
/// destination path) should be duplicated to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Copy {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub adds: Vec<String>,
    pub removes: Vec<String>,
    pub copies: Vec<Copy>,
}

/// Computes the delta that turns `destination` into `source`.
pub fn compute(source: &[TreeEntry], destination: &[TreeEntry]) -> Delta {
    let dest_by_path: HashMap<&str, &TreeEntry> = destination.iter().map(|e| (e.path.as_str(), e)).collect();
    let source_by_path: HashMap<&str, &TreeEntry> = source.iter().map(|e| (e.path.as_str(), e)).collect();

    let mut dest_by_hash: HashMap<&str, Vec<&str>> = HashMap::new();
    for e in destination {
        if e.r#type != EntryType::Directory && !e.hash.is_empty() {
            dest_by_hash.entry(e.hash.as_str()).or_default().push(e.path.as_str());
        }
    }
    let mut source_hashes: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for e in source {
        if e.r#type != EntryType::Directory && !e.hash.is_empty() {
            source_hashes.insert(e.hash.as_str());
        }
    }

    let mut adds = Vec::new();
    let mut copies = Vec::new();

    for e in source {
        if e.r#type == EntryType::Directory {
            if !dest_by_path.contains_key(e.path.as_str()) {
                adds.push(e.path.clone());
            }
            continue;
        }

        if let Some(d) = dest_by_path.get(e.path.as_str()) {
            if d.hash == e.hash {
                continue; // already in sync
            }
        }

        match dest_by_hash.get(e.hash.as_str()) {
            Some(candidates) if !candidates.is_empty() => {
                let best = pick_copy_source(candidates);
                copies.push(Copy { source: best.to_string(), destination: e.path.clone() });
            }
            _ => adds.push(e.path.clone()),
        }
    }

    let mut removes = Vec::new();
    for e in destination {
        if source_by_path.contains_key(e.path.as_str()) {
            continue;
        }
        if e.r#type == EntryType::Directory {
            removes.push(e.path.clone());
            continue;
        }
        if !source_hashes.contains(e.hash.as_str()) {
            removes.push(e.path.clone());
        }
    }

    adds.sort();
    removes.sort();
    copies.sort_by(|a, b| a.destination.cmp(&b.destination));
    Delta { adds, removes, copies }
}

/// Shortest path wins; ties broken lexicographically (spec §4.7).
fn pick_copy_source<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
        .expect("candidates is non-empty")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use EntryType::{Directory, Generic};

    #[test]
    fn s1_delta_simple_add() {
        let dest = vec![
            TreeEntry::new("a", "", Directory),
            TreeEntry::new("a/.ddb", "", Directory),
            TreeEntry::new("a/.ddb/dbase.sqlite", "BBB", Generic),
            TreeEntry::new("a/a.txt", "AAA", Generic),
            TreeEntry::new("a/b", "", Directory),
            TreeEntry::new("a/b/c.txt", "AAA", Generic),
        ];
        let source = vec![
            TreeEntry::new("1.txt", "AAA", Generic),
            TreeEntry::new("2.txt", "BBB", Generic),
            TreeEntry::new("3.txt", "CCC", Generic),
            TreeEntry::new("4.txt", "DDD", Generic),
        ];
        let delta = compute(&source, &dest);
        assert_eq!(delta.adds, vec!["3.txt", "4.txt"]);
        assert!(delta.copies.iter().any(|c| c.destination == "1.txt" && c.source == "a/a.txt"));
        assert!(delta.copies.iter().any(|c| c.destination == "2.txt" && c.source == "a/.ddb/dbase.sqlite"));
        assert!(delta.removes.contains(&"a".to_string()));
    }

    #[test]
    fn s2_rename_yields_copy_not_add() {
        let dest = vec![
            TreeEntry::new("1.jpg", "AAA", Generic),
            TreeEntry::new("2.jpg", "BBB", Generic),
            TreeEntry::new("3.jpg", "CCC", Generic),
        ];
        let source = vec![
            TreeEntry::new("1.jpg", "AAA", Generic),
            TreeEntry::new("2.jpg", "BBB", Generic),
            TreeEntry::new("3-new.jpg", "CCC", Generic),
        ];
        let delta = compute(&source, &dest);
        assert_eq!(delta.adds, Vec::<String>::new());
        assert_eq!(delta.copies, vec![Copy { source: "3.jpg".to_string(), destination: "3-new.jpg".to_string() }]);
        assert_eq!(delta.removes, vec!["3.jpg".to_string()]);
    }

    #[test]
    fn tie_break_prefers_shortest_then_lexicographic_path() {
        let dest = vec![
            TreeEntry::new("zz/original.jpg", "AAA", Generic),
            TreeEntry::new("b.jpg", "AAA", Generic),
            TreeEntry::new("a.jpg", "AAA", Generic),
        ];
        let source = vec![TreeEntry::new("new.jpg", "AAA", Generic)];
        let delta = compute(&source, &dest);
        assert_eq!(delta.copies[0].source, "a.jpg");
    }

    #[test]
    fn output_order_is_deterministic() {
        let dest = vec![TreeEntry::new("z.txt", "Z", Generic), TreeEntry::new("a.txt", "A", Generic)];
        let source =
            vec![TreeEntry::new("m.txt", "M", Generic), TreeEntry::new("b.txt", "B", Generic)];
        let delta = compute(&source, &dest);
        assert_eq!(delta.adds, vec!["b.txt", "m.txt"]);
        assert_eq!(delta.removes, vec!["a.txt", "z.txt"]);
    }

    /// Applies a delta against an in-memory `path -> hash` tree (no
    /// filesystem involved) to check the spec §8 symmetry property:
    /// `apply(delta(A, B), B) == A`. `fetch` stands in for the real add
    /// transport, which downloads bytes with the hash the source expects.
    fn simulate_apply(
        delta: &Delta,
        dest: &[TreeEntry],
        fetch: impl Fn(&str) -> Option<String>,
    ) -> HashMap<String, String> {
        let mut tree: HashMap<String, String> =
            dest.iter().map(|e| (e.path.clone(), e.hash.clone())).collect();
        for path in &delta.removes {
            tree.remove(path);
        }
        for copy in &delta.copies {
            if let Some(hash) = tree.get(&copy.source).cloned() {
                tree.insert(copy.destination.clone(), hash);
            }
        }
        for path in &delta.adds {
            if let Some(hash) = fetch(path) {
                tree.insert(path.to_string(), hash);
            }
        }
        tree
    }

    proptest! {
        #[test]
        fn delta_apply_reconstructs_source(
            seed_a in prop::collection::vec("[a-d]\\.txt", 1..5),
            seed_b in prop::collection::vec("[a-d]\\.txt", 1..5),
        ) {
            // Build two small trees that share some paths/hashes so that
            // adds, removes AND copies all get exercised.
            let source: Vec<TreeEntry> = seed_a
                .iter()
                .enumerate()
                .map(|(i, p)| TreeEntry::new(p.clone(), format!("h{}", i % 3), Generic))
                .collect();
            let dest: Vec<TreeEntry> = seed_b
                .iter()
                .enumerate()
                .map(|(i, p)| TreeEntry::new(p.clone(), format!("h{}", i % 3), Generic))
                .collect();

            let delta = compute(&source, &dest);
            let expected: HashMap<String, String> =
                source.iter().map(|e| (e.path.clone(), e.hash.clone())).collect();

            let tree = simulate_apply(&delta, &dest, |path| expected.get(path).cloned());

            prop_assert_eq!(tree, expected);
        }
    }
}

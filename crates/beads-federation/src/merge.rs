//! Union merge driver for federation files.
//!
//! Because lines are content-addressed, a three-way merge reduces to the
//! union of both sides deduplicated by content hash. The base version only
//! matters for lines deleted on both sides, which never happens to
//! append-only files; it is accepted and ignored.

use crate::export::line_content_hash;

/// Merges two federation files: union of lines, deduplicated by content
/// hash, sorted for determinism, trailing newline.
pub fn union_merge(ours: &str, theirs: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut lines: Vec<&str> = Vec::new();

    for line in ours.lines().chain(theirs.lines()) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(line_content_hash(trimmed)) {
            lines.push(trimmed);
        }
    }

    lines.sort_unstable();

    let mut out = lines.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// The `bd merge-file %A %O %B` entry point: merges `theirs` into `ours` in
/// place, leaving the result where git expects it.
pub fn merge_files(
    ours_path: &std::path::Path,
    _base_path: &std::path::Path,
    theirs_path: &std::path::Path,
) -> crate::Result<()> {
    let ours = std::fs::read_to_string(ours_path).unwrap_or_default();
    let theirs = std::fs::read_to_string(theirs_path).unwrap_or_default();
    let merged = union_merge(&ours, &theirs);
    std::fs::write(ours_path, merged).map_err(|e| crate::io_err(ours_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::issue_export_line;
    use beads_core::content_hash::compute_content_hash;
    use beads_core::issue::IssueBuilder;

    fn line(id: &str, title: &str) -> String {
        let mut issue = IssueBuilder::new(title).id(id).build();
        issue.content_hash = compute_content_hash(&issue);
        issue_export_line(&issue).unwrap()
    }

    #[test]
    fn union_contains_both_sides() {
        let l1 = line("bd-1", "from repo one");
        let l2 = line("bd-2", "from repo two");
        let merged = union_merge(&format!("{l1}\n"), &format!("{l2}\n"));

        assert!(merged.contains(&l1));
        assert!(merged.contains(&l2));
        assert_eq!(merged.lines().count(), 2);
        assert!(merged.ends_with('\n'));
    }

    #[test]
    fn shared_lines_dedup() {
        let shared = line("bd-1", "same record");
        let only_ours = line("bd-2", "ours");
        let ours = format!("{shared}\n{only_ours}\n");
        let theirs = format!("{shared}\n");

        let merged = union_merge(&ours, &theirs);
        assert_eq!(merged.lines().count(), 2);
    }

    #[test]
    fn merge_is_commutative_up_to_line_set() {
        let a = format!("{}\n{}\n", line("bd-1", "one"), line("bd-2", "two"));
        let b = format!("{}\n{}\n", line("bd-2", "two"), line("bd-3", "three"));

        let ab = union_merge(&a, &b);
        let ba = union_merge(&b, &a);
        assert_eq!(ab, ba);
        assert_eq!(ab.lines().count(), 3);
    }

    #[test]
    fn empty_sides() {
        assert_eq!(union_merge("", ""), "");
        let l = line("bd-1", "solo");
        let merged = union_merge(&format!("{l}\n"), "");
        assert_eq!(merged.lines().count(), 1);
    }

    #[test]
    fn merge_files_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let ours_path = dir.path().join("ours.jsonl");
        let base_path = dir.path().join("base.jsonl");
        let theirs_path = dir.path().join("theirs.jsonl");
        std::fs::write(&ours_path, format!("{}\n", line("bd-1", "ours"))).unwrap();
        std::fs::write(&base_path, "").unwrap();
        std::fs::write(&theirs_path, format!("{}\n", line("bd-2", "theirs"))).unwrap();

        merge_files(&ours_path, &base_path, &theirs_path).unwrap();
        let merged = std::fs::read_to_string(&ours_path).unwrap();
        assert_eq!(merged.lines().count(), 2);
    }
}

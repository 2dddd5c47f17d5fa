//! Unified diffs between two versions of a text file.

use similar::TextDiff;

/// Lines of context around each change.
pub const CONTEXT_LINES: usize = 3;

/// Render a unified diff of `old` against `new`.
///
/// Headers are `--- a/<filename>` and `+++ b/<filename>`. Identical inputs
/// produce an empty string.
pub fn unified_diff(old: &str, new: &str, filename: &str) -> String {
    if old == new {
        return String::new();
    }

    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_LINES)
        .header(&format!("a/{filename}"), &format!("b/{filename}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_inputs() {
        assert_eq!(unified_diff("a\nb\n", "a\nb\n", "f.txt"), "");
        assert_eq!(unified_diff("", "", "f.txt"), "");
    }

    #[test]
    fn test_single_line_change() {
        let diff = unified_diff("one\ntwo\nthree\n", "one\n2\nthree\n", "n.txt");
        assert_eq!(
            diff,
            "--- a/n.txt\n+++ b/n.txt\n@@ -1,3 +1,3 @@\n one\n-two\n+2\n three\n"
        );
    }

    #[test]
    fn test_new_file() {
        let diff = unified_diff("", "hello\nworld\n", "new.md");
        assert_eq!(diff, "--- a/new.md\n+++ b/new.md\n@@ -0,0 +1,2 @@\n+hello\n+world\n");
    }

    #[test]
    fn test_deleted_everything() {
        let diff = unified_diff("x\n", "", "gone");
        assert_eq!(diff, "--- a/gone\n+++ b/gone\n@@ -1 +0,0 @@\n-x\n");
    }

    #[test]
    fn test_context_is_three_lines() {
        let old: String = (1..=10).map(|i| format!("{i}\n")).collect();
        let new = old.replace("5\n", "five\n");
        let diff = unified_diff(&old, &new, "c");
        assert_eq!(
            diff,
            "--- a/c\n+++ b/c\n@@ -2,7 +2,7 @@\n 2\n 3\n 4\n-5\n+five\n 6\n 7\n 8\n"
        );
    }

    #[test]
    fn test_distant_changes_make_two_hunks() {
        let old: String = (1..=20).map(|i| format!("{i}\n")).collect();
        let new: String = (1..=20)
            .map(|i| match i {
                2 => "two\n".to_string(),
                18 => "eighteen\n".to_string(),
                _ => format!("{i}\n"),
            })
            .collect();
        let diff = unified_diff(&old, &new, "c");
        assert_eq!(diff.matches("@@ -").count(), 2);
        assert!(diff.contains("@@ -1,5 +1,5 @@"));
        assert!(diff.contains("@@ -15,6 +15,6 @@"));
    }

    #[test]
    fn test_nearby_changes_share_a_hunk() {
        let old: String = (1..=12).map(|i| format!("{i}\n")).collect();
        let new = old.replace("3\n", "c\n").replace("9\n", "i\n");
        let diff = unified_diff(&old, &new, "c");
        assert_eq!(diff.matches("@@ -").count(), 1);
    }

    #[test]
    fn test_missing_trailing_newline() {
        let diff = unified_diff("a\nb", "a\nc", "f");
        assert!(diff.ends_with("-b\n\\ No newline at end of file\n+c\n\\ No newline at end of file\n"));
    }

    #[test]
    fn test_only_trailing_newline_differs() {
        let diff = unified_diff("a\n", "a", "f");
        assert_eq!(
            diff,
            "--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+a\n\\ No newline at end of file\n"
        );
    }
}

//! Dual-context extraction against real repositories.

mod common;

use common::TestRepo;
use dual_context_core::diff::{NO_FURTHER_CHANGES, TRUNCATION_MARKER};
use dual_context_core::{CommitSelector, DiffExtractor, IgnorePolicy, Selection};

fn select_all(repo: &TestRepo) -> Selection {
    CommitSelector::new(50).select(&repo.reader(), None).unwrap()
}

fn find<'a>(selection: &'a Selection, message: &str) -> &'a dual_context_core::Commit {
    selection
        .commits
        .iter()
        .find(|c| c.summary(80) == message)
        .unwrap()
}

#[test]
fn test_root_commit_diffs_against_empty_tree() {
    let mut repo = TestRepo::new();
    repo.commit("init", &[("src/main.rs", Some("fn main() {}\n"))]);

    let selection = select_all(&repo);
    let ctx = DiffExtractor::default()
        .extract(&repo.reader(), &selection.commits[0], &selection.tip)
        .unwrap();

    assert!(!ctx.skipped);
    assert_eq!(ctx.touched_files, vec!["src/main.rs"]);
    assert_eq!(ctx.standard_diff, "--- src/main.rs\n+fn main() {}\n");
    assert_eq!(ctx.full_diff, NO_FURTHER_CHANGES);
}

#[test]
fn test_full_diff_is_scoped_to_touched_files() {
    let mut repo = TestRepo::new();
    repo.commit(
        "introduce",
        &[
            ("src/a.rs", Some("let x = 1;\n")),
            ("src/b.rs", Some("let y = 1;\n")),
        ],
    );
    repo.commit(
        "later",
        &[
            ("src/a.rs", Some("let x = 2;\n")),
            ("src/other.rs", Some("unrelated\n")),
        ],
    );

    let selection = select_all(&repo);
    let target = find(&selection, "introduce");
    let ctx = DiffExtractor::default()
        .extract(&repo.reader(), target, &selection.tip)
        .unwrap();

    assert_eq!(ctx.touched_files, vec!["src/a.rs", "src/b.rs"]);
    assert!(ctx.full_diff.contains("--- src/a.rs (evolution to tip)\n"));
    assert!(ctx.full_diff.contains("-let x = 1;\n+let x = 2;\n"));
    assert!(!ctx.full_diff.contains("src/b.rs"));
    assert!(!ctx.full_diff.contains("other.rs"));
    assert!(!ctx.full_diff.contains("unrelated"));
}

#[test]
fn test_commit_touching_only_ignored_files_is_skipped() {
    let mut repo = TestRepo::new();
    repo.commit("code", &[("src/lib.rs", Some("pub fn f() {}\n"))]);
    repo.commit(
        "bump deps",
        &[
            ("Cargo.lock", Some("# lock\n")),
            ("vendor/dep/lib.rs", Some("vendored\n")),
            ("src/parser_test.go", Some("package x\n")),
        ],
    );

    let selection = select_all(&repo);
    let ctx = DiffExtractor::default()
        .extract(&repo.reader(), find(&selection, "bump deps"), &selection.tip)
        .unwrap();

    assert!(ctx.skipped);
    assert!(ctx.touched_files.is_empty());
    assert!(ctx.standard_diff.is_empty());
}

#[test]
fn test_mixed_commit_keeps_only_relevant_files() {
    let mut repo = TestRepo::new();
    repo.commit(
        "feature",
        &[
            ("package-lock.json", Some("{}\n")),
            ("src/cache.rs", Some("struct Cache;\n")),
            (".github/workflows/ci.yml", Some("on: push\n")),
        ],
    );

    let selection = select_all(&repo);
    let ctx = DiffExtractor::default()
        .extract(&repo.reader(), &selection.commits[0], &selection.tip)
        .unwrap();

    assert_eq!(ctx.touched_files, vec!["src/cache.rs"]);
    assert!(!ctx.standard_diff.contains("package-lock.json"));
    assert!(!ctx.standard_diff.contains("ci.yml"));
}

#[test]
fn test_empty_policy_keeps_everything_textual() {
    let mut repo = TestRepo::new();
    repo.commit("lock", &[("Cargo.lock", Some("# lock\n"))]);

    let selection = select_all(&repo);
    let ctx = DiffExtractor::new(IgnorePolicy::none(), 10_000)
        .extract(&repo.reader(), &selection.commits[0], &selection.tip)
        .unwrap();

    assert!(!ctx.skipped);
    assert_eq!(ctx.touched_files, vec!["Cargo.lock"]);
}

#[test]
fn test_binary_files_are_dropped() {
    let mut repo = TestRepo::new();
    repo.commit_bytes("logo", "assets/logo.png", &[0x89, b'P', b'N', b'G', 0, 0, 1, 2, 0, 3]);

    let selection = select_all(&repo);
    let ctx = DiffExtractor::default()
        .extract(&repo.reader(), &selection.commits[0], &selection.tip)
        .unwrap();

    assert!(ctx.skipped);
}

#[test]
fn test_large_diffs_are_truncated() {
    let mut repo = TestRepo::new();
    let body: String = (0..200).map(|i| format!("line number {i}\n")).collect();
    repo.commit("big", &[("src/big.rs", Some(&body))]);

    let selection = select_all(&repo);
    let ctx = DiffExtractor::new(IgnorePolicy::default(), 300)
        .extract(&repo.reader(), &selection.commits[0], &selection.tip)
        .unwrap();

    assert!(ctx.standard_diff.len() <= 300);
    assert!(ctx.standard_diff.ends_with(TRUNCATION_MARKER));
    assert!(ctx.standard_diff.starts_with("--- src/big.rs\n+line number 0\n"));
    assert_eq!(ctx.full_diff, NO_FURTHER_CHANGES);
}

#[test]
fn test_deleted_lines_are_prefixed() {
    let mut repo = TestRepo::new();
    repo.commit("add", &[("src/old.rs", Some("fn gone() {}\n"))]);
    repo.commit("remove", &[("src/old.rs", None)]);

    let selection = select_all(&repo);
    let ctx = DiffExtractor::default()
        .extract(&repo.reader(), find(&selection, "remove"), &selection.tip)
        .unwrap();

    assert_eq!(ctx.standard_diff, "--- src/old.rs\n-fn gone() {}\n");

    let added = find(&selection, "add");
    let ctx = DiffExtractor::default()
        .extract(&repo.reader(), added, &selection.tip)
        .unwrap();
    assert!(ctx.full_diff.contains("--- src/old.rs (evolution to tip)\n-fn gone() {}\n"));
}

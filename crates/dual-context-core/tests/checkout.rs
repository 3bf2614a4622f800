//! Opening local checkouts and cloning remote sources.

mod common;

use common::TestRepo;
use dual_context_core::{Checkout, CommitSelector, RepoSource};

#[test]
fn test_local_source_opens_in_place() {
    let mut repo = TestRepo::new();
    repo.commit("c1", &[("a.txt", Some("1\n"))]);

    let checkout = Checkout::open(&RepoSource::Local(repo.dir.path().to_path_buf())).unwrap();
    assert!(checkout.clone_dir().is_none());

    let selection = CommitSelector::new(5)
        .select(checkout.repository(), None)
        .unwrap();
    assert_eq!(selection.commits.len(), 1);
}

#[test]
fn test_remote_source_is_cloned_and_removed_on_drop() {
    let mut origin = TestRepo::new();
    origin.commit("c1", &[("a.txt", Some("1\n"))]);
    origin.commit("c2", &[("a.txt", Some("2\n"))]);
    let url = origin.dir.path().to_string_lossy().into_owned();

    let checkout = Checkout::open(&RepoSource::Remote(url)).unwrap();
    let clone_dir = checkout.clone_dir().unwrap().to_path_buf();
    assert!(clone_dir.join(".git").exists());
    assert_ne!(clone_dir, origin.dir.path());

    let selection = CommitSelector::new(5)
        .select(checkout.repository(), None)
        .unwrap();
    let messages: Vec<String> = selection.commits.iter().map(|c| c.summary(80)).collect();
    assert_eq!(messages, vec!["c2", "c1"]);

    drop(checkout);
    assert!(!clone_dir.exists());
}

#[test]
fn test_unreachable_remote_fails_to_clone() {
    let missing = tempfile::tempdir().unwrap();
    let url = missing.path().join("nope.git").to_string_lossy().into_owned();
    assert!(Checkout::open(&RepoSource::Remote(url)).is_err());
}

//! Throw-away git repositories for integration tests.

#![allow(dead_code)]

use std::path::Path;

use git2::{Oid, Repository, Signature, Time};
use tempfile::TempDir;

use dual_context_core::GitRepository;

pub struct TestRepo {
    pub dir: TempDir,
    pub repo: Repository,
    clock: i64,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Repository::init(dir.path()).expect("git init");
        Self {
            dir,
            repo,
            clock: 1_700_000_000,
        }
    }

    fn signature(&mut self) -> Signature<'static> {
        // strictly increasing commit times keep time-sorted walks deterministic
        self.clock += 60;
        Signature::new("Test", "test@example.com", &Time::new(self.clock, 0)).expect("signature")
    }

    fn stage(&self, path: &str, content: Option<&[u8]>) {
        let full = self.dir.path().join(path);
        let mut index = self.repo.index().expect("index");
        match content {
            Some(bytes) => {
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent).expect("mkdir");
                }
                std::fs::write(&full, bytes).expect("write file");
                index.add_path(Path::new(path)).expect("add path");
            }
            None => {
                let _ = std::fs::remove_file(&full);
                index.remove_path(Path::new(path)).expect("remove path");
            }
        }
        index.write().expect("write index");
    }

    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo.head().ok().and_then(|h| h.peel_to_commit().ok())
    }

    /// Commit text changes on HEAD. `None` deletes the path.
    pub fn commit(&mut self, message: &str, changes: &[(&str, Option<&str>)]) -> Oid {
        for (path, content) in changes {
            self.stage(path, content.map(str::as_bytes));
        }
        self.commit_index(message)
    }

    /// Commit raw bytes at `path` on HEAD.
    pub fn commit_bytes(&mut self, message: &str, path: &str, bytes: &[u8]) -> Oid {
        self.stage(path, Some(bytes));
        self.commit_index(message)
    }

    fn commit_index(&mut self, message: &str) -> Oid {
        let sig = self.signature();
        let tree_id = self.repo.index().expect("index").write_tree().expect("write tree");
        let tree = self.repo.find_tree(tree_id).expect("tree");
        let parent = self.head_commit();
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("commit")
    }

    /// Commit on a detached line of history starting at `base`, leaving HEAD alone.
    pub fn side_commit(&mut self, base: Oid, message: &str) -> Oid {
        let sig = self.signature();
        let base = self.repo.find_commit(base).expect("base commit");
        let tree = base.tree().expect("tree");
        self.repo
            .commit(None, &sig, &sig, message, &tree, &[&base])
            .expect("side commit")
    }

    /// Merge commit on HEAD with `other` as second parent.
    pub fn merge_commit(&mut self, message: &str, other: Oid) -> Oid {
        let sig = self.signature();
        let head = self.head_commit().expect("HEAD commit");
        let other = self.repo.find_commit(other).expect("other commit");
        let tree = head.tree().expect("tree");
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&head, &other])
            .expect("merge commit")
    }

    pub fn branch(&self, name: &str, at: Oid) {
        let commit = self.repo.find_commit(at).expect("commit");
        self.repo.branch(name, &commit, false).expect("branch");
    }

    pub fn reader(&self) -> GitRepository {
        GitRepository::open(self.dir.path()).expect("open repository")
    }
}

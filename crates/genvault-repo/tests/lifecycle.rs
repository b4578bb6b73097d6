//! End-to-end run against a repository on the local disk.

use std::fs;
use std::sync::Arc;

use genvault_repo::{
    CancelToken, Compression, Config, FsckOutcome, GenerationSpec, ProblemKind, RepoResult,
    Repository, WalkEntry,
};
use genvault_store::layout::object_path;
use genvault_vfs::{LocalFs, Vfs};

fn config(compression: Compression) -> Config {
    Config {
        client_name: "laptop".into(),
        compression,
        files_per_group: 2,
        ..Config::default()
    }
}

fn source_tree(root: &std::path::Path) {
    fs::create_dir_all(root.join("docs/notes")).unwrap();
    fs::create_dir_all(root.join("music")).unwrap();
    fs::write(root.join("readme.txt"), b"hello").unwrap();
    fs::write(root.join("docs/a.txt"), b"a").unwrap();
    fs::write(root.join("docs/b.txt"), b"bb").unwrap();
    fs::write(root.join("docs/c.txt"), b"ccc").unwrap();
    fs::write(root.join("docs/notes/todo.txt"), b"").unwrap();
}

fn run_lifecycle(compression: Compression) {
    let repo_dir = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    source_tree(source.path());

    let vfs = Arc::new(LocalFs::create(repo_dir.path().join("repo")));
    let repo = Repository::open(vfs.clone(), config(compression)).unwrap();
    repo.init().unwrap();

    // backup
    let cancel = CancelToken::new();
    let (first, stats) = repo.backup_path(source.path(), &cancel).unwrap();
    assert_eq!(stats.dirs, 4);
    assert_eq!(stats.files, 5);
    // docs has three files, split into groups of two
    assert_eq!(stats.file_groups, 4);
    assert!(first.ended.is_some());
    assert_eq!(repo.hosts().unwrap(), vec!["laptop"]);

    // walk
    let entries: Vec<WalkEntry> = repo.walk(&first).collect::<RepoResult<_>>().unwrap();
    let paths: Vec<String> = entries
        .iter()
        .map(|e| e.path.trim_start_matches(&source.path().display().to_string()).to_string())
        .collect();
    assert_eq!(paths, vec!["", "/docs", "/docs/notes", "/music"]);
    let docs: Vec<(&str, u64)> = entries[1]
        .files
        .iter()
        .map(|f| (f.name.as_str(), f.size))
        .collect();
    assert_eq!(docs, vec![("a.txt", 1), ("b.txt", 2), ("c.txt", 3)]);
    assert_eq!(entries[0].subdirs, vec!["docs", "music"]);

    // fsck
    assert_eq!(repo.fsck(|_| {}).unwrap().outcome(), FsckOutcome::Clean);

    // a second generation, then forget the first
    fs::write(source.path().join("music/song.ogg"), b"la").unwrap();
    let (second, _) = repo.backup_path(source.path(), &cancel).unwrap();
    assert_eq!(
        repo.generation("laptop", &GenerationSpec::Latest).unwrap().id,
        second.id
    );
    let forgotten = repo
        .forget("laptop", &GenerationSpec::Id(first.id.clone()))
        .unwrap();
    assert_eq!(forgotten, first.id);
    let remaining: Vec<_> = repo
        .generations("laptop")
        .unwrap()
        .into_iter()
        .map(|g| g.id)
        .collect();
    assert_eq!(remaining, vec![second.id.clone()]);
    assert!(repo.fsck(|_| {}).unwrap().is_clean());

    // damage: drop the root directory of the remaining generation
    vfs.remove(&object_path(&second.root)).unwrap();
    let report = repo.fsck(|_| {}).unwrap();
    assert_eq!(report.problems.len(), 1);
    assert_eq!(report.problems[0].id, second.root.as_str());
    assert_eq!(report.problems[0].kind, ProblemKind::Missing);

    assert!(vfs.bytes_written() > 0);
    assert!(vfs.bytes_read() > 0);
    repo.close().unwrap();
}

#[test]
fn lifecycle_uncompressed() {
    run_lifecycle(Compression::None);
}

#[test]
fn lifecycle_zstd() {
    run_lifecycle(Compression::Zstd);
}

#[test]
fn reopening_sees_previous_state() {
    let repo_dir = tempfile::tempdir().unwrap();
    let source = tempfile::tempdir().unwrap();
    source_tree(source.path());
    let root = repo_dir.path().join("repo");

    let first = {
        let repo =
            Repository::open(Arc::new(LocalFs::create(&root)), config(Compression::None)).unwrap();
        repo.init().unwrap();
        let (generation, _) = repo.backup_path(source.path(), &CancelToken::new()).unwrap();
        repo.close().unwrap();
        generation
    };

    let repo = Repository::open(Arc::new(LocalFs::new(&root)), config(Compression::None)).unwrap();
    let latest = repo.generation("laptop", &GenerationSpec::Latest).unwrap();
    assert_eq!(latest, first);
    assert!(!root.join("lock").exists());
}

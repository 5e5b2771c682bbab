//! Worker behaviour across the local/VFS matrix.

mod common;

use std::fs;
use std::path::Path;
use std::time::Duration;

use common::{MemoryProvider, drain};
use ferryfile_core::{FileEntry, TransferConfig};
use ferryfile_ops::{
    CANCELLED_MESSAGE, ErrorKind, OverwriteDecision, RenamePair, Source, TransferOperation,
    TransferRequest, start_transfer,
};
use ferryfile_vfs::ProviderHandle;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn s(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn run_local(operation: TransferOperation) -> tokio::sync::mpsc::Receiver<ferryfile_ops::TransferEvent> {
    start_transfer(
        TransferRequest::new(operation),
        TransferConfig::default(),
        CancellationToken::new(),
    )
}

/// `src/` with the given files and an empty `dst/`.
fn local_fixture(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("src")).unwrap();
    fs::create_dir(temp.path().join("dst")).unwrap();
    for (name, contents) in files {
        fs::write(temp.path().join("src").join(name), contents).unwrap();
    }
    temp
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_copy_new_file() {
    let temp = local_fixture(&[("a.txt", "hello")]);
    let src = temp.path().join("src/a.txt");
    let dst = temp.path().join("dst");

    let run = drain(
        run_local(TransferOperation::copy(vec![Source::from(s(&src))], s(&dst))),
        None,
    )
    .await;

    let outcome = run.outcome();
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.message, "Copied 1 item");
    assert_eq!(run.conflicts, 0);
    assert_eq!(run.percents, [100]);
    assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "hello");
    assert!(src.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_conflict_skip_leaves_target() {
    let temp = local_fixture(&[("a.txt", "new"), ("b.txt", "bee")]);
    let dst = temp.path().join("dst");
    fs::write(dst.join("a.txt"), "old").unwrap();

    let sources = vec![
        Source::from(s(&temp.path().join("src/a.txt"))),
        Source::from(s(&temp.path().join("src/b.txt"))),
    ];
    let run = drain(
        run_local(TransferOperation::copy(sources, s(&dst))),
        Some(OverwriteDecision::Skip),
    )
    .await;

    let outcome = run.outcome();
    assert!(outcome.success);
    assert_eq!(outcome.message, "Copied 1 item, skipped 1");
    assert_eq!(run.conflicts, 1);
    assert_eq!(run.percents, [50, 100]);
    assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "old");
    assert_eq!(fs::read_to_string(dst.join("b.txt")).unwrap(), "bee");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_conflict_overwrite_replaces_target() {
    let temp = local_fixture(&[("a.txt", "new")]);
    let dst = temp.path().join("dst");
    fs::write(dst.join("a.txt"), "old").unwrap();

    let run = drain(
        run_local(TransferOperation::copy(
            vec![Source::from(s(&temp.path().join("src/a.txt")))],
            s(&dst),
        )),
        Some(OverwriteDecision::Overwrite),
    )
    .await;

    assert!(run.outcome().success);
    assert_eq!(run.conflicts, 1);
    assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "new");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_conflict_cancel_stops_batch() {
    let temp = local_fixture(&[("a.txt", "1"), ("b.txt", "2")]);
    let dst = temp.path().join("dst");
    fs::write(dst.join("a.txt"), "old").unwrap();

    let sources = vec![
        Source::from(s(&temp.path().join("src/a.txt"))),
        Source::from(s(&temp.path().join("src/b.txt"))),
    ];
    let run = drain(
        run_local(TransferOperation::copy(sources, s(&dst))),
        Some(OverwriteDecision::Cancel),
    )
    .await;

    let outcome = run.outcome();
    assert!(outcome.success);
    assert!(outcome.cancelled);
    assert_eq!(outcome.message, CANCELLED_MESSAGE);
    assert!(!dst.join("b.txt").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unanswered_conflict_times_out() {
    let temp = local_fixture(&[("a.txt", "new")]);
    let dst = temp.path().join("dst");
    fs::write(dst.join("a.txt"), "old").unwrap();

    let config = TransferConfig::builder()
        .conflict_timeout_override(Duration::from_millis(50))
        .build()
        .unwrap();
    let events = start_transfer(
        TransferRequest::new(TransferOperation::copy(
            vec![Source::from(s(&temp.path().join("src/a.txt")))],
            s(&dst),
        )),
        config,
        CancellationToken::new(),
    );
    let run = drain(events, None).await;

    let outcome = run.outcome();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
    assert_eq!(outcome.message, "Overwrite query timed out");
    assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "old");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_token_before_start() {
    let temp = local_fixture(&[("a.txt", "1")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let events = start_transfer(
        TransferRequest::new(TransferOperation::copy(
            vec![Source::from(s(&temp.path().join("src/a.txt")))],
            s(&temp.path().join("dst")),
        )),
        TransferConfig::default(),
        cancel,
    );
    let run = drain(events, None).await;

    assert!(run.outcome().cancelled);
    assert!(!temp.path().join("dst/a.txt").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_move() {
    let temp = local_fixture(&[("a.txt", "moving")]);
    let src = temp.path().join("src/a.txt");
    let dst = temp.path().join("dst");

    let run = drain(
        run_local(TransferOperation::move_to(vec![Source::from(s(&src))], s(&dst))),
        None,
    )
    .await;

    assert_eq!(run.outcome().message, "Moved 1 item");
    assert!(!src.exists());
    assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "moving");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_copy_directory_into_itself_is_rejected() {
    let temp = local_fixture(&[("a.txt", "1")]);
    let src = temp.path().join("src");

    let run = drain(
        run_local(TransferOperation::copy(vec![Source::from(s(&src))], s(&src))),
        None,
    )
    .await;

    let outcome = run.outcome();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Validation));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_source_aborts_batch() {
    let temp = local_fixture(&[("b.txt", "2")]);
    let sources = vec![
        Source::from(s(&temp.path().join("src/missing.txt"))),
        Source::from(s(&temp.path().join("src/b.txt"))),
    ];

    let run = drain(
        run_local(TransferOperation::copy(sources, s(&temp.path().join("dst")))),
        None,
    )
    .await;

    let outcome = run.outcome();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::NotFound));
    assert!(!temp.path().join("dst/b.txt").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vfs_to_local_copies_tree() {
    let remote = MemoryProvider::new();
    remote.add_file("/pub/docs/a.txt", b"alpha");
    remote.add_file("/pub/docs/sub/b.txt", b"beta");
    let temp = TempDir::new().unwrap();

    let request = TransferRequest::new(TransferOperation::copy(
        vec![Source::from("/pub/docs")],
        s(temp.path()),
    ))
    .with_source(remote.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    assert!(run.outcome().success, "{}", run.outcome().message);
    assert_eq!(fs::read(temp.path().join("docs/a.txt")).unwrap(), b"alpha");
    assert_eq!(fs::read(temp.path().join("docs/sub/b.txt")).unwrap(), b"beta");
    assert!(remote.exists("/pub/docs/a.txt"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_to_vfs_move_deletes_local_source() {
    let temp = TempDir::new().unwrap();
    let upload = temp.path().join("up");
    fs::create_dir(&upload).unwrap();
    fs::write(upload.join("x.txt"), "ex").unwrap();

    let remote = MemoryProvider::new();
    remote.add_dir("/incoming");

    let request = TransferRequest::new(TransferOperation::move_to(
        vec![Source::from(s(&upload))],
        "/incoming",
    ))
    .with_target(remote.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    assert!(run.outcome().success, "{}", run.outcome().message);
    assert_eq!(remote.read("/incoming/up/x.txt").unwrap(), b"ex");
    assert!(!upload.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vfs_to_vfs_move_stages_through_disk() {
    let source = MemoryProvider::new();
    source.add_file("/a/f.txt", b"payload");
    let target = MemoryProvider::new();
    target.add_dir("/b");

    let request = TransferRequest::new(TransferOperation::move_to(vec![Source::from("/a/f.txt")], "/b"))
        .with_source(source.handle())
        .with_target(target.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    assert!(run.outcome().success, "{}", run.outcome().message);
    assert_eq!(target.read("/b/f.txt").unwrap(), b"payload");
    assert!(!source.exists("/a/f.txt"));
    assert!(source.calls().contains(&"rm /a/f.txt".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vfs_overwrite_conflict_on_remote_target() {
    let source = MemoryProvider::new();
    source.add_file("/a/f.txt", b"fresh");
    let target = MemoryProvider::new();
    target.add_file("/b/f.txt", b"stale");

    let request = TransferRequest::new(TransferOperation::copy(vec![Source::from("/a/f.txt")], "/b"))
        .with_source(source.handle())
        .with_target(target.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        Some(OverwriteDecision::Overwrite),
    )
    .await;

    assert!(run.outcome().success);
    assert_eq!(run.conflicts, 1);
    assert_eq!(target.read("/b/f.txt").unwrap(), b"fresh");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_move_within_one_provider_uses_native_rename() {
    let remote = MemoryProvider::new().with_rename();
    remote.add_file("/a/f.txt", b"data");
    remote.add_dir("/b");
    let handle = remote.handle();

    let request = TransferRequest::new(TransferOperation::move_to(vec![Source::from("/a/f.txt")], "/b"))
        .with_source(handle.clone())
        .with_target(handle);
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    assert!(run.outcome().success);
    assert_eq!(remote.calls(), ["rename /a/f.txt /b/f.txt"]);
    assert_eq!(remote.read("/b/f.txt").unwrap(), b"data");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_native_move_overwrite_clears_destination_first() {
    let remote = MemoryProvider::new().with_rename();
    remote.add_file("/a/f.txt", b"fresh");
    remote.add_file("/b/f.txt", b"stale");
    let handle = remote.handle();

    let request = TransferRequest::new(TransferOperation::move_to(vec![Source::from("/a/f.txt")], "/b"))
        .with_source(handle.clone())
        .with_target(handle);
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        Some(OverwriteDecision::Overwrite),
    )
    .await;

    let outcome = run.outcome();
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(run.conflicts, 1);
    assert_eq!(remote.calls(), ["rm /b/f.txt", "rename /a/f.txt /b/f.txt"]);
    assert_eq!(remote.read("/b/f.txt").unwrap(), b"fresh");
    assert!(!remote.exists("/a/f.txt"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_move_onto_itself_within_one_provider_is_rejected() {
    let remote = MemoryProvider::new().with_rename();
    remote.add_file("/a/f.txt", b"keep");
    let handle = remote.handle();

    let request = TransferRequest::new(TransferOperation::move_to(vec![Source::from("/a/f.txt")], "/a"))
        .with_source(handle.clone())
        .with_target(handle);
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        Some(OverwriteDecision::Overwrite),
    )
    .await;

    assert_eq!(run.outcome().error_kind, Some(ErrorKind::Validation));
    assert_eq!(run.conflicts, 0);
    assert_eq!(remote.read("/a/f.txt").unwrap(), b"keep");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_directory_is_deepest_first() {
    let remote = MemoryProvider::new();
    remote.add_file("/d/a", b"1");
    remote.add_file("/d/sub/c", b"3");
    remote.add_file("/d/b", b"2");

    let entry = FileEntry::directory("d", "/d", 0);
    let request = TransferRequest::new(TransferOperation::delete(vec![Source::from(entry)]))
        .with_source(remote.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    assert_eq!(run.outcome().message, "Deleted 1 item");
    assert_eq!(
        remote.calls(),
        ["rm /d/a", "rm /d/b", "rm /d/sub/c", "rmdir /d/sub", "rmdir /d"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_stops_at_first_error() {
    let remote = MemoryProvider::new();
    remote.add_file("/x", b"1");
    remote.add_file("/y", b"2");
    remote.add_file("/z", b"3");
    remote.fail_delete_of("/y");

    let sources = vec![Source::from("/x"), Source::from("/y"), Source::from("/z")];
    let request = TransferRequest::new(TransferOperation::delete(sources)).with_source(remote.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    let outcome = run.outcome();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Permission));
    assert_eq!(outcome.succeeded, 1);
    assert!(!remote.exists("/x"));
    assert!(remote.exists("/y"));
    assert!(remote.exists("/z"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mkdir_prefers_target_provider() {
    let source = MemoryProvider::new();
    let target = MemoryProvider::new();

    let request = TransferRequest::new(TransferOperation::mkdir("/new"))
        .with_source(source.handle())
        .with_target(target.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    assert_eq!(run.outcome().message, "Folder created: new");
    assert!(run.percents.is_empty());
    assert!(target.exists("/new"));
    assert!(!source.exists("/new"));

    let request = TransferRequest::new(TransferOperation::mkdir("/other")).with_source(source.handle());
    drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;
    assert!(source.exists("/other"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_mkdir_local_fallback() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("made/deep");

    let run = drain(run_local(TransferOperation::mkdir(s(&dir))), None).await;

    assert!(run.outcome().success);
    assert_eq!(run.outcome().message, "Folder created: deep");
    assert!(dir.is_dir());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rename_is_emulated_without_native_support() {
    let remote = MemoryProvider::new();
    remote.add_file("/r/a.txt", b"content");

    let request = TransferRequest::new(TransferOperation::rename(vec![RenamePair::new(
        "/r/a.txt", "b.txt",
    )]))
    .with_source(remote.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    assert_eq!(run.outcome().message, "Multi-Rename completed for 1 files.");
    assert_eq!(run.percents, [0]);
    assert_eq!(remote.read("/r/b.txt").unwrap(), b"content");
    assert!(!remote.exists("/r/a.txt"));
    let calls = remote.calls();
    assert!(calls.contains(&"push /r/b.txt".to_string()));
    assert!(calls.contains(&"rm /r/a.txt".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_swap_restores_original_names() {
    let remote = MemoryProvider::new();
    remote.add_file("/d/a", b"A");
    remote.add_file("/d/b", b"B");
    // The parked copy of `a` cannot be removed once it reaches `b`.
    remote.fail_delete_of("/d/.ferry-rename-0-a");

    let pairs = vec![RenamePair::new("/d/a", "b"), RenamePair::new("/d/b", "a")];
    let request = TransferRequest::new(TransferOperation::rename(pairs)).with_source(remote.handle());
    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    let outcome = run.outcome();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Permission));
    assert_eq!(remote.read("/d/a").unwrap(), b"A");
    assert_eq!(remote.read("/d/b").unwrap(), b"B");
    assert!(!remote.exists("/d/.ferry-rename-1-b"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_rename_progress_and_swap() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "A").unwrap();
    fs::write(temp.path().join("b.txt"), "B").unwrap();
    fs::write(temp.path().join("c.txt"), "C").unwrap();

    let pairs = vec![
        RenamePair::new(s(&temp.path().join("a.txt")), "b.txt"),
        RenamePair::new(s(&temp.path().join("b.txt")), "a.txt"),
        RenamePair::new(s(&temp.path().join("c.txt")), "d.txt"),
    ];
    let run = drain(run_local(TransferOperation::rename(pairs)), None).await;

    assert!(run.outcome().success, "{}", run.outcome().message);
    assert_eq!(run.percents, [0, 33, 66]);
    assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "B");
    assert_eq!(fs::read_to_string(temp.path().join("b.txt")).unwrap(), "A");
    assert_eq!(fs::read_to_string(temp.path().join("d.txt")).unwrap(), "C");
    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rename_onto_existing_sibling_is_rejected() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.txt"), "A").unwrap();
    fs::write(temp.path().join("c.txt"), "C").unwrap();

    let pairs = vec![RenamePair::new(s(&temp.path().join("a.txt")), "c.txt")];
    let run = drain(run_local(TransferOperation::rename(pairs)), None).await;

    let outcome = run.outcome();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Validation));
    assert!(temp.path().join("a.txt").exists());
    assert_eq!(fs::read_to_string(temp.path().join("c.txt")).unwrap(), "C");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_local_handle_matches_default() {
    let temp = local_fixture(&[("a.txt", "explicit")]);
    let request = TransferRequest::new(TransferOperation::copy(
        vec![Source::from(s(&temp.path().join("src/a.txt")))],
        s(&temp.path().join("dst")),
    ))
    .with_source(ProviderHandle::local())
    .with_target(ProviderHandle::local());

    let run = drain(
        start_transfer(request, TransferConfig::default(), CancellationToken::new()),
        None,
    )
    .await;

    assert!(run.outcome().success);
    assert!(temp.path().join("dst/a.txt").exists());
}

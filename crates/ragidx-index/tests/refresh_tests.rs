mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{Fixture, FlakyLoader, TestEmbedder};
use ragidx_core::{CancelFlag, Error, HybridWeights, QueryRequest};
use ragidx_index::IndexManager;

fn assert_counts_agree(manager: &IndexManager, name: &str) {
    let info = manager.info(name).expect("info");
    assert_eq!(info.chunk_count, info.vector_count, "chunks vs vectors");
    assert_eq!(info.chunk_count, info.lexical_count, "chunks vs lexical entries");
}

fn chunk_ids(manager: &IndexManager, name: &str) -> Vec<String> {
    let guard = manager.acquire(name).expect("acquire");
    let mut ids: Vec<String> = guard.chunks().keys().cloned().collect();
    ids.sort();
    ids
}

#[test]
fn two_file_index_ranks_keyword_match_first() {
    let fixture = Fixture::new(&[("a.txt", "the quick brown fox"), ("b.txt", "jumps over the lazy dog")]);
    let manager = fixture.manager(TestEmbedder::new());
    manager.create(fixture.config("docs")).expect("create");

    let report = manager.refresh("docs").expect("refresh");
    assert_eq!((report.added, report.updated, report.removed, report.failed), (2, 0, 0, 0));
    assert_eq!(report.total, 2);
    assert_eq!(report.chunks, 2);
    assert!(report.swapped);
    assert_counts_agree(&manager, "docs");

    let request = QueryRequest::new("fox").top_k(5).weights(HybridWeights::keyword_only());
    let response = manager.query("docs", &request).expect("query");
    assert!(!response.degraded);
    assert_eq!(response.results[0].file_path, "a.txt");
    assert_eq!(response.results[0].text, "the quick brown fox");
    assert_eq!((response.results[0].start, response.results[0].end), (0, 19));
    if let Some(pos) = response.results.iter().position(|r| r.file_path == "b.txt") {
        assert!(pos > 0);
    }
}

#[test]
fn modified_file_is_updated_and_others_keep_their_ids() {
    let fixture = Fixture::new(&[("a.txt", "the quick brown fox"), ("b.txt", "jumps over the lazy dog")]);
    let manager = fixture.manager(TestEmbedder::new());
    manager.create(fixture.config("docs")).expect("create");
    manager.refresh("docs").expect("refresh");
    let b_before = manager.acquire("docs").expect("acquire").document("b.txt").expect("b").chunk_ids.clone();

    fixture.write("a.txt", "a slow grey wolf howls at night");
    let report = manager.refresh("docs").expect("refresh");
    assert_eq!((report.added, report.updated, report.removed), (0, 1, 0));
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.version, 2);
    assert_counts_agree(&manager, "docs");

    let guard = manager.acquire("docs").expect("acquire");
    assert_eq!(guard.document("b.txt").expect("b").chunk_ids, b_before);
    drop(guard);
    let request = QueryRequest::new("wolf").weights(HybridWeights::keyword_only());
    assert_eq!(manager.query("docs", &request).expect("query").results[0].file_path, "a.txt");
    let stale = QueryRequest::new("fox").weights(HybridWeights::keyword_only());
    assert!(manager.query("docs", &stale).expect("query").results.is_empty());
}

#[test]
fn second_refresh_without_changes_is_a_no_op() {
    let fixture = Fixture::new(&[("a.txt", "alpha beta"), ("sub/b.md", "gamma delta"), ("c.txt", "")]);
    let embedder = TestEmbedder::new();
    let manager = fixture.manager(Arc::clone(&embedder));
    manager.create(fixture.config("docs")).expect("create");
    let first = manager.refresh("docs").expect("refresh");
    assert_eq!(first.added, 3);
    let ids = chunk_ids(&manager, "docs");
    let calls = embedder.calls();

    let second = manager.refresh("docs").expect("refresh");
    assert_eq!((second.added, second.updated, second.removed), (0, 0, 0));
    assert_eq!(second.unchanged, 3);
    assert!(!second.swapped);
    assert_eq!(second.version, first.version);
    assert_eq!(chunk_ids(&manager, "docs"), ids);
    assert_eq!(embedder.calls(), calls, "no embedding for unchanged files");
}

#[test]
fn touched_file_with_same_content_is_not_reembedded() {
    let fixture = Fixture::new(&[("a.txt", "alpha beta")]);
    let embedder = TestEmbedder::new();
    let manager = fixture.manager(Arc::clone(&embedder));
    manager.create(fixture.config("docs")).expect("create");
    manager.refresh("docs").expect("refresh");
    let calls = embedder.calls();

    // Rewrite with identical bytes; the mtime may move but the hash does not.
    fixture.write("a.txt", "alpha beta");
    let report = manager.refresh("docs").expect("refresh");
    assert_eq!((report.added, report.updated, report.removed), (0, 0, 0));
    assert_eq!(embedder.calls(), calls);
}

#[test]
fn same_size_edit_with_restored_mtime_is_detected() {
    let fixture = Fixture::new(&[("a.txt", "alpha bravo")]);
    let manager = fixture.manager(TestEmbedder::new());
    manager.create(fixture.config("docs")).expect("create");
    manager.refresh("docs").expect("refresh");

    let path = fixture.root.join("a.txt");
    let modified = fs::metadata(&path).expect("metadata").modified().expect("mtime");
    fixture.write("a.txt", "delta zulus");
    fs::File::options().write(true).open(&path).expect("open").set_modified(modified).expect("set mtime");

    let report = manager.refresh("docs").expect("refresh");
    assert_eq!((report.added, report.updated, report.removed), (0, 1, 0));
    let request = QueryRequest::new("zulus").weights(HybridWeights::keyword_only());
    assert_eq!(manager.query("docs", &request).expect("query").results[0].file_path, "a.txt");
    assert_counts_agree(&manager, "docs");
}

#[test]
fn remove_does_not_wait_for_embedding() {
    let fixture = Fixture::new(&[("a.txt", "alpha")]);
    let embedder = TestEmbedder::new();
    let manager = Arc::new(fixture.manager(Arc::clone(&embedder)));
    manager.create(fixture.config("docs")).expect("create");
    manager.refresh("docs").expect("refresh");

    fixture.write("b.txt", "beta");
    embedder.set_delay(Duration::from_millis(1500));
    let refresher = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.refresh("docs"))
    };
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    manager.remove("docs").expect("remove");
    assert!(started.elapsed() < Duration::from_secs(1), "remove blocked for {:?}", started.elapsed());
    assert!(!fixture.storage.join("docs").exists());
    assert!(matches!(refresher.join().expect("join"), Err(Error::NotFound(_))));
}

#[test]
fn overlapping_refreshes_publish_once() {
    let fixture = Fixture::new(&[("a.txt", "alpha")]);
    let embedder = TestEmbedder::new();
    let manager = Arc::new(fixture.manager(Arc::clone(&embedder)));
    manager.create(fixture.config("docs")).expect("create");

    fixture.write("b.txt", "beta");
    embedder.set_delay(Duration::from_millis(500));
    let spawn = || {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.refresh("docs"))
    };
    let first = spawn();
    thread::sleep(Duration::from_millis(200));
    let second = spawn();

    let reports = [first.join().expect("join").expect("refresh"), second.join().expect("join").expect("refresh")];
    assert_eq!(reports.iter().map(|r| r.added).sum::<usize>(), 2);
    assert_eq!(reports.iter().filter(|r| r.swapped).count(), 1);
    assert_eq!(manager.info("docs").expect("info").version, 1);
    assert_eq!(manager.list_files("docs").expect("files"), vec!["a.txt", "b.txt"]);
    assert_counts_agree(&manager, "docs");
}

#[test]
fn deleted_and_excluded_files_leave_the_index() {
    let fixture = Fixture::new(&[("a.txt", "alpha"), ("b.txt", "beta"), ("skip.bin", "binary")]);
    let manager = fixture.manager(TestEmbedder::new());
    let config = fixture.config("docs").exclude(["drafts/"]);
    manager.create(config).expect("create");
    fixture.write("drafts/c.txt", "draft");
    manager.refresh("docs").expect("refresh");
    assert_eq!(manager.list_files("docs").expect("files"), vec!["a.txt", "b.txt"]);

    fixture.delete("b.txt");
    let report = manager.refresh("docs").expect("refresh");
    assert_eq!(report.removed, 1);
    assert_eq!(report.total, 1);
    assert_eq!(manager.list_files("docs").expect("files"), vec!["a.txt"]);
    assert_counts_agree(&manager, "docs");
}

#[test]
fn provider_failure_marks_only_the_changed_file_failed() {
    let fixture = Fixture::new(&[("a.txt", "apples and pears"), ("b.txt", "bananas"), ("c.txt", "cherries")]);
    let embedder = TestEmbedder::new();
    let manager = fixture.manager(Arc::clone(&embedder));
    manager.create(fixture.config("docs")).expect("create");
    manager.refresh("docs").expect("refresh");

    embedder.poison("POISON");
    fixture.write("c.txt", "cherries POISON edition");
    let report = manager.refresh("docs").expect("refresh");
    assert_eq!(report.failed, 1);
    assert_eq!(report.failed_files, vec!["c.txt".to_string()]);
    assert_eq!((report.added, report.updated, report.removed), (0, 0, 0));
    assert_eq!(report.total, 3);
    assert_counts_agree(&manager, "docs");

    let keyword = |text: &str| QueryRequest::new(text).weights(HybridWeights::keyword_only());
    let hits = manager.query("docs", &keyword("apples")).expect("query").results;
    assert_eq!(hits[0].file_path, "a.txt");
    let hits = manager.query("docs", &keyword("bananas")).expect("query").results;
    assert_eq!(hits[0].file_path, "b.txt");
    // The failed file keeps serving its previous content.
    let hits = manager.query("docs", &keyword("cherries")).expect("query").results;
    assert_eq!(hits[0].text, "cherries");

    // A new file whose batch fails is not indexed at all.
    fixture.write("d.txt", "POISON dates");
    let report = manager.refresh("docs").expect("refresh");
    assert_eq!(report.failed, 2);
    assert!(!manager.list_files("docs").expect("files").contains(&"d.txt".to_string()));

    // Once the provider recovers the retry picks both up.
    embedder.clear_poison();
    let report = manager.refresh("docs").expect("refresh");
    assert_eq!((report.added, report.updated, report.failed), (1, 1, 0));
}

#[test]
fn unreadable_file_is_treated_as_removed() {
    let fixture = Fixture::new(&[("a.txt", "alpha"), ("b.txt", "beta")]);
    let loader = FlakyLoader::new();
    let manager = IndexManager::new(fixture.settings(), loader.clone(), TestEmbedder::new());
    manager.create(fixture.config("docs")).expect("create");
    manager.refresh("docs").expect("refresh");

    *loader.unreadable.lock().expect("lock") = Some("b.txt".to_string());
    fixture.write("b.txt", "beta changed");
    let report = manager.refresh("docs").expect("refresh");
    assert_eq!(report.removed, 1);
    assert_eq!(manager.list_files("docs").expect("files"), vec!["a.txt"]);
    assert_counts_agree(&manager, "docs");
}

#[test]
fn cancelled_refresh_keeps_the_current_snapshot() {
    let fixture = Fixture::new(&[("a.txt", "alpha")]);
    let manager = fixture.manager(TestEmbedder::new());
    manager.create(fixture.config("docs")).expect("create");
    manager.refresh("docs").expect("refresh");

    fixture.write("b.txt", "beta");
    let cancel = CancelFlag::new();
    cancel.cancel();
    assert!(matches!(manager.refresh_with_cancel("docs", &cancel), Err(Error::Cancelled)));
    let info = manager.info("docs").expect("info");
    assert_eq!((info.version, info.file_count), (1, 1));

    let report = manager.refresh("docs").expect("refresh");
    assert_eq!(report.added, 1);
}

#[test]
fn dimension_change_is_surfaced_and_state_kept() {
    let fixture = Fixture::new(&[("a.txt", "alpha")]);
    let embedder = TestEmbedder::new();
    let manager = fixture.manager(Arc::clone(&embedder));
    manager.create(fixture.config("docs")).expect("create");
    manager.refresh("docs").expect("refresh");

    embedder.use_large.store(true, Ordering::SeqCst);
    fixture.write("b.txt", "beta");
    let err = manager.refresh("docs").expect_err("mismatch");
    assert!(matches!(err, Error::DimensionMismatch { expected: 32, actual: 48 }));
    let info = manager.info("docs").expect("info");
    assert_eq!((info.version, info.file_count), (1, 1));
    assert_counts_agree(&manager, "docs");
}

#[test]
fn restart_reuses_persisted_state_without_embedding() {
    let fixture = Fixture::new(&[("a.txt", "the quick brown fox"), ("b.txt", "jumps over the lazy dog")]);
    {
        let manager = fixture.manager(TestEmbedder::new());
        manager.create(fixture.config("docs")).expect("create");
        manager.refresh("docs").expect("refresh");
    }

    let embedder = TestEmbedder::new();
    let manager = fixture.manager(Arc::clone(&embedder));
    assert_eq!(manager.restore().expect("restore"), vec!["docs".to_string()]);
    let info = manager.info("docs").expect("info");
    assert_eq!((info.version, info.file_count, info.chunk_count), (1, 2, 2));
    assert!(info.disk_size_bytes > 0);

    let report = manager.refresh("docs").expect("refresh");
    assert_eq!((report.added, report.updated, report.removed), (0, 0, 0));
    assert_eq!(embedder.calls(), 0);
    let request = QueryRequest::new("fox").weights(HybridWeights::keyword_only());
    assert_eq!(manager.query("docs", &request).expect("query").results[0].file_path, "a.txt");
}

#[test]
fn corrupt_vectors_are_discarded_and_rebuilt() {
    let fixture = Fixture::new(&[("a.txt", "alpha"), ("b.txt", "beta")]);
    {
        let manager = fixture.manager(TestEmbedder::new());
        manager.create(fixture.config("docs")).expect("create");
        manager.refresh("docs").expect("refresh");
    }
    fs::write(fixture.storage.join("docs/vectors.json"), b"{ not json").expect("corrupt");

    let embedder = TestEmbedder::new();
    let manager = fixture.manager(Arc::clone(&embedder));
    let info = manager.create(fixture.config("docs")).expect("create");
    assert_eq!((info.version, info.file_count), (0, 0));

    let report = manager.refresh("docs").expect("refresh");
    assert_eq!(report.added, 2);
    assert!(embedder.calls() > 0);
    assert_counts_agree(&manager, "docs");
}

#[test]
fn changed_config_rebuilds_from_source() {
    let fixture = Fixture::new(&[("a.txt", "alpha beta gamma delta")]);
    {
        let manager = fixture.manager(TestEmbedder::new());
        manager.create(fixture.config("docs")).expect("create");
        manager.refresh("docs").expect("refresh");
    }
    let manager = fixture.manager(TestEmbedder::new());
    let info = manager.create(fixture.config("docs").chunking(5, 1)).expect("create");
    assert_eq!(info.file_count, 0);
    let report = manager.refresh("docs").expect("refresh");
    assert_eq!(report.added, 1);
    assert!(report.chunks > 1);
}

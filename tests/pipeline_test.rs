use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use mailsieve::db::Database;
use mailsieve::nlp::Normalizer;
use mailsieve::pipeline::Pipeline;
use mailsieve::store::ContentStore;

fn sample_eml(body_line: &str) -> Vec<u8> {
    format!(
        "From: Alice <alice@example.com>\r\n\
         To: bob+work@Example.COM\r\n\
         Subject: Budget forecast\r\n\
         \r\n\
         {body_line}\r\n"
    )
    .into_bytes()
}

fn setup(root: &Path) -> (Arc<Database>, Arc<ContentStore>, Pipeline) {
    let db = Arc::new(
        Database::new(root.join("index.db").to_str().expect("utf8 path"), 5).expect("open db"),
    );
    let store = Arc::new(ContentStore::open(root.join("storage")).expect("open store"));
    let normalizer = Arc::new(Normalizer::new().expect("normalizer"));
    let pipeline = Pipeline::new(Arc::clone(&db), Arc::clone(&store), normalizer);
    (db, store, pipeline)
}

#[test]
fn test_end_to_end_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dirty = dir.path().join("dirty");
    fs::create_dir_all(&dirty).expect("dirty dir");

    let raw = sample_eml("The budget forecast looks solid. Budget numbers attached.");
    fs::write(dirty.join("msg1.eml"), &raw).expect("write artifact");

    let (db, _store, pipeline) = setup(dir.path());
    let (ingest, index) = pipeline.run(&dirty, 2).expect("run");
    assert_eq!(ingest.processed, 1);
    assert_eq!(ingest.failed, 0);
    assert_eq!(index.processed, 1);
    assert_eq!(index.failed, 0);

    // The captured artifact is removed from the dirty directory
    assert_eq!(fs::read_dir(&dirty).expect("read dir").count(), 0);

    let digest = ContentStore::digest(&raw);
    let message = db
        .get_message_by_digest(&digest)
        .expect("get")
        .expect("indexed");
    let view = db
        .fetch_message_view(message.id)
        .expect("view")
        .expect("exists");

    assert_eq!(
        view.participants,
        vec!["alice@example.com".to_string(), "bob@example.com".to_string()]
    );

    let body_budget = view
        .body_words
        .iter()
        .find(|w| w.token == "budget")
        .expect("budget in body");
    assert_eq!(body_budget.count, 2);

    let subject_budget = view
        .subject_words
        .iter()
        .find(|w| w.token == "budget")
        .expect("budget in subject");
    assert_eq!(subject_budget.count, 1);
    assert!(view.subject_words.iter().any(|w| w.token == "forecast"));
}

#[test]
fn test_reingestion_is_additive() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dirty = dir.path().join("dirty");
    fs::create_dir_all(&dirty).expect("dirty dir");

    let raw = sample_eml("Budget budget.");
    fs::write(dirty.join("msg.eml"), &raw).expect("write artifact");

    let (db, _store, pipeline) = setup(dir.path());
    pipeline.run(&dirty, 2).expect("first run");

    // Same content arrives again: one message row, doubled counts
    fs::write(dirty.join("msg.eml"), &raw).expect("rewrite artifact");
    pipeline.run(&dirty, 2).expect("second run");

    let stats = db.index_stats().expect("stats");
    assert_eq!(stats.messages, 1);

    let digest = ContentStore::digest(&raw);
    let message = db
        .get_message_by_digest(&digest)
        .expect("get")
        .expect("indexed");
    let view = db
        .fetch_message_view(message.id)
        .expect("view")
        .expect("exists");
    let budget = view
        .body_words
        .iter()
        .find(|w| w.token == "budget")
        .expect("budget");
    assert_eq!(budget.count, 4);
}

#[test]
fn test_failed_artifact_does_not_stop_the_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dirty = dir.path().join("dirty");
    fs::create_dir_all(&dirty).expect("dirty dir");

    for i in 0..3 {
        fs::write(
            dirty.join(format!("msg{i}.eml")),
            sample_eml(&format!("Budget revision {i} attached.")),
        )
        .expect("write artifact");
    }
    // A directory with an artifact extension is unreadable as a file
    fs::create_dir(dirty.join("bad.eml")).expect("bad artifact");

    let (db, _store, pipeline) = setup(dir.path());
    let (ingest, index) = pipeline.run(&dirty, 2).expect("run");
    assert_eq!(ingest.processed, 3);
    assert_eq!(ingest.failed, 1);
    assert_eq!(index.processed, 3);
    assert_eq!(index.failed, 0);

    let stats = db.index_stats().expect("stats");
    assert_eq!(stats.messages, 3);
}

#[test]
fn test_mbox_artifact_yields_one_message_per_entry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let dirty = dir.path().join("dirty");
    fs::create_dir_all(&dirty).expect("dirty dir");

    let mbox = "From alice@example.com Mon Jan  6 10:00:00 2025\n\
                From: alice@example.com\n\
                Subject: Budget\n\
                \n\
                First budget draft.\n\
                \n\
                From carol@example.com Mon Jan  6 11:00:00 2025\n\
                From: carol@example.com\n\
                Subject: Forecast\n\
                \n\
                Second forecast draft.\n";
    fs::write(dirty.join("archive.mbox"), mbox).expect("write mbox");

    let (db, store, pipeline) = setup(dir.path());
    let (ingest, index) = pipeline.run(&dirty, 2).expect("run");
    assert_eq!(ingest.processed, 1);
    assert_eq!(ingest.failed, 0);
    assert_eq!(index.processed, 2);

    assert_eq!(store.list().expect("list").len(), 2);
    let stats = db.index_stats().expect("stats");
    assert_eq!(stats.messages, 2);
    assert!(!dirty.join("archive.mbox").exists());
}

#[test]
fn test_worker_count_does_not_change_results() {
    let raws: Vec<Vec<u8>> = (0..8)
        .map(|i| sample_eml(&format!("Budget forecast revision {i}. Budget notes inline.")))
        .collect();

    let run_with = |workers: usize| {
        let dir = tempfile::tempdir().expect("tempdir");
        let dirty = dir.path().join("dirty");
        fs::create_dir_all(&dirty).expect("dirty dir");
        for (i, raw) in raws.iter().enumerate() {
            fs::write(dirty.join(format!("m{i}.eml")), raw).expect("write artifact");
        }
        let (db, _store, pipeline) = setup(dir.path());
        pipeline.run(&dirty, workers).expect("run");

        let stats = db.index_stats().expect("stats");
        let digest = ContentStore::digest(&raws[0]);
        let message = db
            .get_message_by_digest(&digest)
            .expect("get")
            .expect("indexed");
        let view = db
            .fetch_message_view(message.id)
            .expect("view")
            .expect("exists");
        (dir, stats, view)
    };

    let (_d1, serial_stats, serial_view) = run_with(1);
    let (_d2, parallel_stats, parallel_view) = run_with(4);

    assert_eq!(serial_stats, parallel_stats);
    assert_eq!(serial_view.participants, parallel_view.participants);
    assert_eq!(serial_view.subject_words, parallel_view.subject_words);
    assert_eq!(serial_view.body_words, parallel_view.body_words);
}

#[test]
fn test_concurrent_stores_of_identical_content_dedup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(ContentStore::open(dir.path().join("storage")).expect("open store"));
    let raw = sample_eml("Shared budget copy.");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let raw = raw.clone();
        handles.push(thread::spawn(move || store.store(&raw).expect("store")));
    }
    let digests: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().expect("thread"))
        .collect();

    assert!(digests.iter().all(|d| d == &digests[0]));
    assert_eq!(store.list().expect("list").len(), 1);
}

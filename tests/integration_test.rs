use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use pipeset::{map, task, Entry, EntryStreamExt, ErrorKind, PipesetError, Sink, Source, SrcOptions};
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a temporary directory tree for testing.
///
/// Structure:
/// ```text
/// tmp/
///   src/
///     invoice_jan.txt
///     invoice_feb.txt
///     report.txt
///     notes.md
///     subdir/
///       invoice_mar.txt
///       other.rs
/// ```
fn setup_test_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("src");
    fs::create_dir(&root).unwrap();

    fs::write(root.join("invoice_jan.txt"), "january invoice").unwrap();
    fs::write(root.join("invoice_feb.txt"), "february invoice").unwrap();
    fs::write(root.join("report.txt"), "quarterly report").unwrap();
    fs::write(root.join("notes.md"), "some notes").unwrap();

    let sub = root.join("subdir");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("invoice_mar.txt"), "march invoice").unwrap();
    fs::write(sub.join("other.rs"), "fn main() {}").unwrap();

    dir
}

fn options(cwd: &Path) -> SrcOptions {
    SrcOptions {
        cwd: Some(cwd.to_path_buf()),
        ..SrcOptions::default()
    }
}

/// Every regular file under `dir`, relative to it.
fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(dir).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

/// A caller-owned sink that remembers what reached it.
#[derive(Default)]
struct CollectSink {
    relative: Vec<PathBuf>,
    finished: bool,
}

#[async_trait]
impl Sink for CollectSink {
    async fn write(&mut self, entry: Entry) -> Result<(), PipesetError> {
        self.relative.push(entry.relative());
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), PipesetError> {
        self.finished = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn missing_build_is_rejected_before_running() {
    let err = task().src(["src/**"]).dest("dist").into_task().err().unwrap();
    assert!(matches!(err, PipesetError::MissingField("build")));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn missing_src_is_rejected_before_running() {
    let err = task().build(|input| input).into_task().err().unwrap();
    assert!(matches!(err, PipesetError::MissingField("src")));
}

#[test]
fn src_base_prefixes_globs_and_keeps_negation() {
    let copy = task()
        .name("copy")
        .src_base("base")
        .src(["x/y", "!x/z"])
        .build(|input| input)
        .into_task()
        .unwrap();

    assert_eq!(copy.name(), Some("copy"));
    assert_eq!(copy.globs(), ["base/x/y", "!base/x/z"]);
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

#[tokio::test]
async fn copies_matches_to_dest() {
    let dir = setup_test_dir();
    let copy = task()
        .src_base("src")
        .src(["**/*.txt", "!**/report.txt"])
        .src_options(options(dir.path()))
        .build(|input| input)
        .dest("dist")
        .into_task()
        .unwrap();

    let report = copy.run().await.unwrap();
    assert_eq!(report.entries, 3, "three invoices should be written");
    assert_eq!(
        files_under(&dir.path().join("dist")),
        vec![
            PathBuf::from("invoice_feb.txt"),
            PathBuf::from("invoice_jan.txt"),
            PathBuf::from("subdir/invoice_mar.txt"),
        ]
    );
}

#[tokio::test]
async fn build_rewrites_what_reaches_dest() {
    let dir = setup_test_dir();
    let shout = task()
        .src(["src/*.txt"])
        .src_options(options(dir.path()))
        .build(|input| {
            input.through(map(|mut entry: Entry| {
                if let Some(bytes) = entry.contents.as_mut() {
                    bytes.make_ascii_uppercase();
                }
                entry.path.set_extension("TXT");
                Ok(entry)
            }))
        })
        .dest("dist")
        .into_task()
        .unwrap();

    shout.run().await.unwrap();
    let written = fs::read_to_string(dir.path().join("dist/report.TXT")).unwrap();
    assert_eq!(written, "QUARTERLY REPORT");
    assert!(!dir.path().join("dist/subdir").exists(), "`*` must not cross directories");
}

#[tokio::test]
async fn writable_sink_receives_every_entry_and_is_finished() {
    let dir = setup_test_dir();
    let sink = Arc::new(Mutex::new(CollectSink::default()));

    let collect = task()
        .src(["src/**/invoice_*"])
        .src_options(options(dir.path()))
        .build(|input| input)
        .writable(Arc::clone(&sink))
        .into_task()
        .unwrap();

    let report = collect.run().await.unwrap();
    assert_eq!(report.entries, 3);

    let sink = sink.lock().await;
    assert!(sink.finished);
    let mut seen = sink.relative.clone();
    seen.sort();
    assert_eq!(
        seen,
        vec![
            PathBuf::from("invoice_feb.txt"),
            PathBuf::from("invoice_jan.txt"),
            PathBuf::from("subdir/invoice_mar.txt"),
        ]
    );
}

#[tokio::test]
async fn task_without_sink_is_drained_and_reusable() {
    let dir = setup_test_dir();
    let count = task()
        .src(["src/**"])
        .src_options(options(dir.path()))
        .build(|input| input)
        .into_task()
        .unwrap();

    // 6 files + 1 subdir
    assert_eq!(count.run().await.unwrap().entries, 7);
    assert_eq!(count.run().await.unwrap().entries, 7, "a task can run more than once");
}

#[tokio::test]
async fn nested_error_fails_the_run() {
    let dir = setup_test_dir();
    let failing = task()
        .src(["src/*.md"])
        .src_options(options(dir.path()))
        .build(|input| {
            input.through(map(|entry: Entry| {
                Err(PipesetError::Engine {
                    plugin: "test",
                    path:   entry.path,
                    source: anyhow::anyhow!("cannot handle markdown"),
                })
            }))
        })
        .dest("dist")
        .into_task()
        .unwrap();

    let err = failing.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Engine);
    assert!(err.path().unwrap().ends_with("notes.md"));
    assert!(!dir.path().join("dist/notes.md").exists());
}

// ---------------------------------------------------------------------------
// Glob source
// ---------------------------------------------------------------------------

#[tokio::test]
async fn source_entries_carry_cwd_base_and_contents() {
    let dir = setup_test_dir();
    let entries: Vec<Entry> = pipeset::src(["src/subdir/*.rs"])
        .cwd(dir.path())
        .open()
        .map(|item| item.unwrap())
        .collect()
        .await;

    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.cwd, dir.path());
    assert_eq!(entry.base, dir.path().join("src/subdir"));
    assert_eq!(entry.relative(), PathBuf::from("other.rs"));
    assert_eq!(entry.contents.as_deref(), Some(&b"fn main() {}"[..]));
}

#[tokio::test]
async fn read_false_leaves_contents_empty_and_dest_copies_from_disk() {
    let dir = setup_test_dir();
    let entries: Vec<_> = pipeset::src(["src/notes.md"])
        .cwd(dir.path())
        .read(false)
        .open()
        .collect()
        .await;
    assert!(entries[0].as_ref().unwrap().is_null());

    let mut sink = pipeset::dest("dist");
    let stream = pipeset::src(["src/notes.md"]).cwd(dir.path()).read(false).open();
    pipeset::drain(stream, &mut sink).await.unwrap();
    assert_eq!(
        fs::read_to_string(dir.path().join("dist/notes.md")).unwrap(),
        "some notes"
    );
}

#[tokio::test]
async fn singular_glob_without_match_fails_unless_allowed() {
    let dir = setup_test_dir();

    let items: Vec<_> = pipeset::src(["src/missing.txt"]).cwd(dir.path()).open().collect().await;
    assert!(matches!(items.last(), Some(Err(PipesetError::NoMatch(g))) if g == "src/missing.txt"));

    let items: Vec<_> = pipeset::src(["src/missing.txt"])
        .cwd(dir.path())
        .allow_empty(true)
        .open()
        .collect()
        .await;
    assert!(items.is_empty());

    // Globs that match nothing are never an error.
    let items: Vec<_> = pipeset::src(["src/*.none"]).cwd(dir.path()).open().collect().await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn overlapping_globs_yield_each_entry_once() {
    let dir = setup_test_dir();
    let items: Vec<_> = pipeset::src(["src/invoice_*.txt", "src/*.txt"])
        .cwd(dir.path())
        .open()
        .collect()
        .await;

    let mut names: Vec<_> = items
        .into_iter()
        .map(|i| i.unwrap().relative())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            PathBuf::from("invoice_feb.txt"),
            PathBuf::from("invoice_jan.txt"),
            PathBuf::from("report.txt"),
        ]
    );
}

#[tokio::test]
async fn source_yields_before_the_walk_is_done() {
    let dir = tempfile::tempdir().unwrap();
    let early = dir.path().join("tree/a");
    fs::create_dir_all(&early).unwrap();
    fs::create_dir_all(dir.path().join("tree/z")).unwrap();
    for i in 0..pipeset::SOURCE_BUFFER * 4 {
        fs::write(early.join(format!("{i:04}.txt")), "x").unwrap();
    }

    let mut stream = pipeset::src(["tree/**"]).cwd(dir.path()).open();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.relative(), PathBuf::from("a"));

    // The walker is held back by the reader, so `z` is not listed yet.
    fs::write(dir.path().join("tree/z/late.txt"), "late").unwrap();

    let rest: Vec<_> = stream.map(|i| i.unwrap().relative()).collect().await;
    assert_eq!(rest.len(), pipeset::SOURCE_BUFFER * 4 + 2);
    assert_eq!(rest.last(), Some(&PathBuf::from("z/late.txt")));
}

#[tokio::test]
async fn invalid_glob_is_a_configuration_error() {
    let items: Vec<_> = pipeset::src(["src/[.txt"]).open().collect().await;
    let err = items.into_iter().last().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn spliced_stream_without_sink_is_exposed() {
    let dir = setup_test_dir();
    let md = task()
        .src(["src/**/*.md"])
        .src_options(options(dir.path()))
        .build(|input| input.splice(|inner| inner))
        .into_task()
        .unwrap();

    let paths: Vec<_> = md.stream().map(|i| i.unwrap().relative()).collect().await;
    assert_eq!(paths, vec![PathBuf::from("notes.md")]);
}

use super::*;
use crate::config::RetryConfig;
use crate::transfer::MemoryTransferClient;
use crate::types::Category;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const CATEGORIES: [&str; 4] = ["shutterstock", "depositphoto", "fotolia", "dreamstime"];

/// Default configuration with every path inside `dir` and no retry delays
fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage = CATEGORIES
        .iter()
        .map(|c| (c.to_string(), dir.join("downloads").join(c)))
        .collect();
    config.ledger.categories = CATEGORIES
        .iter()
        .map(|c| (c.to_string(), dir.join("ledger").join(format!("{c}.txt"))))
        .collect();
    config.ledger.default = dir.join("ledger").join("run.log");
    config.retry = RetryConfig {
        max_attempts: 0,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        jitter: false,
    };
    config
}

fn engine(config: Config, client: &MemoryTransferClient) -> ReconciliationEngine {
    ReconciliationEngine::new(config, Arc::new(client.clone())).unwrap()
}

fn ledger_file(dir: &Path, category: &str) -> PathBuf {
    dir.join("ledger").join(format!("{category}.txt"))
}

fn download_path(dir: &Path, category: &str, name: &str) -> PathBuf {
    dir.join("downloads").join(category).join(name)
}

fn outcome_of<'a>(summary: &'a RunSummary, name: &str) -> &'a DownloadOutcome {
    summary
        .outcomes
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, o)| o)
        .unwrap_or_else(|| panic!("no outcome for {name}"))
}

fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut writer = ::zip::ZipWriter::new(&mut buf);
        let options = ::zip::write::FileOptions::default()
            .compression_method(::zip::CompressionMethod::Stored);
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
        writer.finish().unwrap();
    }
    buf.into_inner()
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Downloads and the ledger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_records_exactly_one_ledger_line() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new().with_file("depositphoto_abc.rar", "rar bytes");

    let summary = engine(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(
        outcome_of(&summary, "depositphoto_abc.rar"),
        &DownloadOutcome::Downloaded
    );
    assert_eq!(
        std::fs::read_to_string(ledger_file(dir.path(), "depositphoto")).unwrap(),
        "depositphoto_abc.rar\n"
    );
    assert_eq!(
        std::fs::read(download_path(dir.path(), "depositphoto", "depositphoto_abc.rar")).unwrap(),
        b"rar bytes"
    );
    assert!(
        !download_path(dir.path(), "depositphoto", "depositphoto_abc.rar.part").exists(),
        "temporary file must be renamed"
    );
}

#[tokio::test]
async fn second_run_skips_what_the_first_downloaded() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new().with_file("depositphoto_abc.rar", "rar bytes");

    engine(test_config(dir.path()), &client).run().await.unwrap();
    let second = engine(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(
        outcome_of(&second, "depositphoto_abc.rar"),
        &DownloadOutcome::SkippedAlreadyDownloaded
    );
    assert_eq!(client.fetched(), vec!["depositphoto_abc.rar"]);
    assert_eq!(
        std::fs::read_to_string(ledger_file(dir.path(), "depositphoto")).unwrap(),
        "depositphoto_abc.rar\n"
    );
}

#[tokio::test]
async fn ledger_hits_never_fetch() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("ledger")).unwrap();
    std::fs::write(ledger_file(dir.path(), "shutterstock"), "shutterstock_1.zip\n").unwrap();
    let client = MemoryTransferClient::new()
        .with_file("shutterstock_1.zip", "one")
        .with_file("shutterstock_2.zip", "two");

    let summary = engine(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(client.fetched(), vec!["shutterstock_2.zip"]);
    assert_eq!(summary.statistics.skipped_already_downloaded, 1);
    assert_eq!(summary.statistics.downloaded, 1);
}

#[tokio::test]
async fn deleted_files_are_not_fetched_again() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new().with_file("fotolia_1.jpg", "jpg");

    engine(test_config(dir.path()), &client).run().await.unwrap();
    std::fs::remove_file(download_path(dir.path(), "fotolia", "fotolia_1.jpg")).unwrap();
    let second = engine(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(
        outcome_of(&second, "fotolia_1.jpg"),
        &DownloadOutcome::SkippedAlreadyDownloaded
    );
}

#[tokio::test]
async fn alias_lands_in_canonical_category() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new().with_file("AdobeStock_7.zip", "adobe");

    let summary = engine(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(
        outcome_of(&summary, "AdobeStock_7.zip"),
        &DownloadOutcome::Downloaded
    );
    assert!(download_path(dir.path(), "fotolia", "AdobeStock_7.zip").exists());
    assert_eq!(
        std::fs::read_to_string(ledger_file(dir.path(), "fotolia")).unwrap(),
        "AdobeStock_7.zip\n"
    );
}

// ---------------------------------------------------------------------------
// Skips and failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn every_skip_reason_is_counted() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new()
        .with_directory("shutterstock_folder")
        .with_listed_directory("archive")
        .with_file("pond5_1.mov", "x")
        .with_file("readme.txt", "x")
        .with_file("shutterstock_123 (2).zip", "x")
        .with_file("shutterstock_123.zip", "x");

    let summary = engine(test_config(dir.path()), &client).run().await.unwrap();
    let stats = summary.statistics;

    assert_eq!(stats.skipped_directory, 2);
    assert_eq!(stats.skipped_unrecognized_prefix, 2);
    assert_eq!(stats.skipped_duplicate_suffix, 1);
    assert_eq!(stats.downloaded, 1);
    assert_eq!(stats.skipped, 5);
    assert_eq!(stats.total(), 6);
    assert_eq!(client.fetched(), vec!["shutterstock_123.zip"]);
}

#[tokio::test]
async fn failed_fetch_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new()
        .with_file("dreamstime_9.zip", "x")
        .with_failing_fetch("dreamstime_9.zip");

    let summary = engine(test_config(dir.path()), &client).run().await.unwrap();

    match outcome_of(&summary, "dreamstime_9.zip") {
        DownloadOutcome::Failed(reason) => assert!(reason.contains("451")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!download_path(dir.path(), "dreamstime", "dreamstime_9.zip").exists());
    assert!(!download_path(dir.path(), "dreamstime", "dreamstime_9.zip.part").exists());
    assert!(!ledger_file(dir.path(), "dreamstime").exists());
}

#[tokio::test]
async fn panicking_task_fails_alone() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new()
        .with_file("fotolia_1.zip", "a")
        .with_file("fotolia_2.zip", "b")
        .with_file("fotolia_3.zip", "c")
        .with_panicking_fetch("fotolia_2.zip");

    let summary = engine(test_config(dir.path()), &client).run().await.unwrap();

    match outcome_of(&summary, "fotolia_2.zip") {
        DownloadOutcome::Failed(reason) => {
            assert!(reason.contains("simulated transfer panic"), "{reason}")
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(summary.statistics.downloaded, 2);
    assert_eq!(summary.statistics.failed, 1);
    assert_eq!(client.open_sessions(), 0);

    assert!(!download_path(dir.path(), "fotolia", "fotolia_2.zip").exists());
    assert!(!download_path(dir.path(), "fotolia", "fotolia_2.zip.part").exists());
    let ledger = std::fs::read_to_string(ledger_file(dir.path(), "fotolia")).unwrap();
    assert!(!ledger.contains("fotolia_2.zip"));
}

#[tokio::test]
async fn listing_failure_aborts_before_dispatch() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new()
        .with_file("fotolia_1.zip", "a")
        .fail_listing();

    let result = engine(test_config(dir.path()), &client).run().await;

    assert!(matches!(result, Err(Error::Transfer(_))));
    assert!(client.fetched().is_empty());
    assert!(!dir.path().join("ledger").exists());
}

#[tokio::test]
async fn refused_connection_is_a_run_error() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new().refuse_connections();

    let result = engine(test_config(dir.path()), &client).run().await;

    assert!(matches!(
        result,
        Err(Error::Transfer(TransferError::Connection { .. }))
    ));
}

// ---------------------------------------------------------------------------
// Auto-extract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auto_extract_unpacks_and_removes_archive() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.categories.auto_extract = vec!["depositphoto".into()];
    let archive = zip_bytes(&[("photo.jpg", b"jpeg"), ("photo.eps", b"eps")]);
    let client = MemoryTransferClient::new().with_file("depositphoto_5.ZIP", archive);

    let summary = engine(config, &client).run().await.unwrap();

    assert_eq!(
        outcome_of(&summary, "depositphoto_5.ZIP"),
        &DownloadOutcome::Downloaded
    );
    assert_eq!(
        std::fs::read(download_path(dir.path(), "depositphoto", "photo.jpg")).unwrap(),
        b"jpeg"
    );
    assert!(download_path(dir.path(), "depositphoto", "photo.eps").exists());
    assert!(!download_path(dir.path(), "depositphoto", "depositphoto_5.ZIP").exists());
    assert_eq!(
        std::fs::read_to_string(ledger_file(dir.path(), "depositphoto")).unwrap(),
        "depositphoto_5.ZIP\n"
    );
}

#[tokio::test]
async fn extraction_failure_keeps_ledger_entry() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.categories.auto_extract = vec!["depositphoto".into()];
    let client = MemoryTransferClient::new().with_file("depositphoto_6.zip", "not a zip");
    let engine = engine(config, &client);
    let mut rx = engine.subscribe();

    let summary = engine.run().await.unwrap();

    assert_eq!(
        outcome_of(&summary, "depositphoto_6.zip"),
        &DownloadOutcome::Downloaded
    );
    assert_eq!(
        std::fs::read_to_string(ledger_file(dir.path(), "depositphoto")).unwrap(),
        "depositphoto_6.zip\n"
    );
    assert!(download_path(dir.path(), "depositphoto", "depositphoto_6.zip").exists());
    let events = drain(&mut rx);
    assert!(events.iter().any(
        |e| matches!(e, Event::ExtractionFailed { name, .. } if name == "depositphoto_6.zip")
    ));
}

#[tokio::test]
async fn other_categories_are_not_extracted() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.categories.auto_extract = vec!["depositphoto".into()];
    let archive = zip_bytes(&[("inner.jpg", b"jpeg")]);
    let client = MemoryTransferClient::new().with_file("shutterstock_5.zip", archive);

    engine(config, &client).run().await.unwrap();

    assert!(download_path(dir.path(), "shutterstock", "shutterstock_5.zip").exists());
    assert!(!download_path(dir.path(), "shutterstock", "inner.jpg").exists());
}

// ---------------------------------------------------------------------------
// Pool, statistics and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn counters_sum_to_listing_size_at_any_width() {
    let names: Vec<String> = (0..20).map(|i| format!("shutterstock_{i:02}.zip")).collect();
    let seeded: String = names.iter().take(7).map(|n| format!("{n}\n")).collect();

    for width in [1, 2, 3, 4, 16, names.len() + 5] {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.download.concurrency = width;
        std::fs::create_dir_all(dir.path().join("ledger")).unwrap();
        std::fs::write(ledger_file(dir.path(), "shutterstock"), &seeded).unwrap();

        let client = names
            .iter()
            .fold(MemoryTransferClient::new(), |c, n| c.with_file(n.clone(), "x"));

        let summary = engine(config, &client).run().await.unwrap();

        assert_eq!(summary.statistics.skipped_already_downloaded, 7, "width {width}");
        assert_eq!(summary.statistics.downloaded, 13, "width {width}");
        assert_eq!(summary.statistics.total(), 20, "width {width}");
        assert_eq!(summary.outcomes.len(), 20, "width {width}");
        assert_eq!(client.fetched().len(), 13, "width {width}");
        assert_eq!(client.open_sessions(), 0, "width {width}");
    }
}

#[tokio::test]
async fn cancellation_before_dispatch_downloads_nothing() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new()
        .with_file("fotolia_1.zip", "a")
        .with_file("fotolia_2.zip", "b");
    let engine = engine(test_config(dir.path()), &client);
    let mut rx = engine.subscribe();

    engine.cancel();
    let summary = engine.run().await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.statistics.downloaded, 0);
    assert_eq!(summary.statistics.cancelled, 2);
    assert_eq!(summary.statistics.skipped, 2);
    assert!(client.fetched().is_empty());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::PhaseChanged {
            phase: RunPhase::Cancelled
        }
    )));
    assert!(matches!(
        events.last(),
        Some(Event::RunFinished {
            cancelled: true,
            ..
        })
    ));
}

#[tokio::test]
async fn cancellation_lets_in_flight_tasks_finish() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.download.concurrency = 1;
    let client = (1..=5)
        .fold(MemoryTransferClient::new(), |c, i| {
            c.with_file(format!("dreamstime_{i}.jpg"), "x")
        })
        .with_fetch_delay(Duration::from_millis(50));
    let engine = Arc::new(engine(config, &client));
    let mut rx = engine.subscribe();

    let runner = Arc::clone(&engine);
    let handle = tokio::spawn(async move { runner.run().await });
    loop {
        if let Ok(Event::EntryFinished { .. }) = rx.recv().await {
            break;
        }
    }
    engine.cancel();
    let summary = handle.await.unwrap().unwrap();

    assert!(summary.cancelled);
    assert!((1..=2).contains(&summary.statistics.downloaded));
    assert_eq!(
        summary.statistics.downloaded + summary.statistics.cancelled,
        5
    );
    assert_eq!(summary.statistics.failed, 0);
}

#[tokio::test]
async fn phases_run_in_order() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new().with_file("fotolia_1.zip", "a");
    let engine = engine(test_config(dir.path()), &client);
    let mut rx = engine.subscribe();

    engine.run().await.unwrap();

    let phases: Vec<RunPhase> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            Event::PhaseChanged { phase } => Some(phase),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            RunPhase::Listing,
            RunPhase::Dispatching,
            RunPhase::Collecting,
            RunPhase::Reporting,
            RunPhase::Done,
        ]
    );
}

#[tokio::test]
async fn run_log_gets_header_lines_and_summary() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new()
        .with_file("fotolia_1.zip", "a")
        .with_file("unknown.bin", "b");

    let summary = engine(test_config(dir.path()), &client).run().await.unwrap();

    assert_eq!(summary.run_log, dir.path().join("ledger").join("run.log"));
    let text = std::fs::read_to_string(&summary.run_log).unwrap();
    assert!(text.contains("(2 entries)"));
    assert!(text.contains("fotolia_1.zip [fotolia]"));
    assert!(text.contains("unknown.bin"));
    assert!(text.contains("stockfetch run finished: 1 downloaded, 1 skipped, 0 failed"));
}

#[tokio::test]
async fn entry_events_carry_category() {
    let dir = TempDir::new().unwrap();
    let client = MemoryTransferClient::new().with_file("Shutterstock_1.zip", "a");
    let engine = engine(test_config(dir.path()), &client);
    let mut rx = engine.subscribe();

    engine.run().await.unwrap();

    let finished = drain(&mut rx)
        .into_iter()
        .find_map(|e| match e {
            Event::EntryFinished { category, .. } => Some(category),
            _ => None,
        })
        .unwrap();
    assert_eq!(finished, Some(Category::new("shutterstock")));
}

#[tokio::test]
async fn join_failure_reports_panic_message() {
    let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
    assert_eq!(join_failure(err), "task panicked: boom");

    let err = tokio::spawn(async { std::panic::panic_any(format!("code {}", 7)) })
        .await
        .unwrap_err();
    assert_eq!(join_failure(err), "task panicked: code 7");
}

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use unlocode_loader::test_support::MemoryStore;
use unlocode_loader::{Pipeline, PipelineConfig, PipelineError};

const HEADER: &str = "Change,Country,Location,Name,NameWoDiacritics,Subdivision,Status,Function,Date,IATA,Coordinates,Remarks";

fn location_line(index: usize) -> String {
    format!(
        ",XX,A{:02},Place {},Place {},,AI,1-3-----,0101,,4230N 00131E,",
        index, index, index
    )
}

fn input_file(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "{}", HEADER).expect("write header");
    for line in lines {
        writeln!(file, "{}", line).expect("write line");
    }
    file.flush().expect("flush");
    file
}

fn locations(count: usize) -> Vec<String> {
    (0..count).map(location_line).collect()
}

fn config(batch_size: usize, workers: usize) -> PipelineConfig {
    PipelineConfig {
        batch_size,
        queue_capacity: 2,
        workers,
        connect_attempts: 1,
        connect_retry_delay: Duration::from_millis(1),
        skip_header: true,
    }
}

#[tokio::test]
async fn multi_batch_run_loads_every_record() {
    let file = input_file(&locations(10));
    let store = MemoryStore::new();

    let pipeline = Pipeline::new(store.clone(), config(3, 2));
    let report = pipeline.run(file.path()).await.expect("run succeeds");

    assert_eq!(report.stats.records_read, 10);
    assert_eq!(report.stats.records_processed, 10);
    assert_eq!(report.stats.records_inserted, 10);
    assert_eq!(report.stats.batches_written, 4);
    assert_eq!(report.stats.batches_failed, 0);
    assert_eq!(store.row_count(), 10);
    assert!(store.contains("XXA07", "Place 7"));
    assert_eq!(store.schema_calls(), 1);
    assert_eq!(store.open_writers(), 0);
}

#[tokio::test]
async fn header_only_input_processes_nothing() {
    let file = input_file(&[]);
    let store = MemoryStore::new();

    let report = Pipeline::new(store.clone(), config(5, 3))
        .run(file.path())
        .await
        .expect("run succeeds");

    assert_eq!(report.stats.records_processed, 0);
    assert_eq!(report.stats.batches_written, 0);
    assert_eq!(report.stats.batches_failed, 0);
    assert_eq!(store.connect_calls(), 3);
    assert_eq!(store.open_writers(), 0);
    assert!(report.to_string().contains("Total records processed: 0"));
}

#[tokio::test]
async fn empty_file_is_a_zero_record_run() {
    let file = NamedTempFile::new().expect("temp file");
    let store = MemoryStore::new();

    let report = Pipeline::new(store.clone(), config(5, 1))
        .run(file.path())
        .await
        .expect("run succeeds");

    assert_eq!(report.stats.records_read, 0);
    assert_eq!(report.stats.records_processed, 0);
    assert_eq!(store.row_count(), 0);
}

#[tokio::test]
async fn failed_batch_is_dropped_and_run_completes() {
    let file = input_file(&locations(7));
    let store = MemoryStore::new().fail_batches([1]);

    let report = Pipeline::new(store.clone(), config(3, 2))
        .run(file.path())
        .await
        .expect("write failures are not fatal");

    assert_eq!(report.stats.records_read, 7);
    assert_eq!(report.stats.records_processed, 4);
    assert_eq!(report.stats.records_dropped, 3);
    assert_eq!(report.stats.batches_written, 2);
    assert_eq!(report.stats.batches_failed, 1);
    assert_eq!(store.row_count(), 4);
    assert!(!store.contains("XXA03", "Place 3"));
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let mut lines = locations(3);
    lines.insert(1, "garbage".to_string());
    lines.insert(2, ",XX,,.COUNTRY HEADER,,,,,,,,".to_string());
    lines.push(",X1,ABC,Bad Country,,,,,,,,".to_string());
    let file = input_file(&lines);
    let store = MemoryStore::new();

    let report = Pipeline::new(store.clone(), config(10, 1))
        .run(file.path())
        .await
        .expect("decode errors are not fatal");

    assert_eq!(report.stats.records_read, 3);
    assert_eq!(report.stats.lines_skipped, 3);
    assert_eq!(report.stats.records_processed, 3);
}

#[tokio::test]
async fn unbalanced_quote_only_skips_its_own_line() {
    let mut lines = vec![location_line(0)];
    lines.push(",XX,BAD,\"Broken name,Broken,,AI,1-------,0101,,4230N 00131E,".to_string());
    lines.extend((1..6).map(location_line));
    let file = input_file(&lines);
    let store = MemoryStore::new();

    let report = Pipeline::new(store.clone(), config(10, 1))
        .run(file.path())
        .await
        .expect("decode errors are not fatal");

    assert_eq!(report.stats.records_read, 6);
    assert_eq!(report.stats.lines_skipped, 1);
    assert_eq!(report.stats.records_processed, 6);
    assert_eq!(store.row_count(), 6);
    assert!(store.contains("XXA05", "Place 5"));
    assert!(!store.contains("XXBAD", "Broken name"));
}

#[tokio::test]
async fn real_origin_coordinates_are_not_counted_as_fallback() {
    let lines = vec![
        ",XX,NUL,Null Island,Null Island,,AI,1-------,0101,,0000N 00000E,".to_string(),
        ",XX,NOC,No Coordinates,No Coordinates,,AI,1-------,0101,,,".to_string(),
    ];
    let file = input_file(&lines);

    let report = Pipeline::new(MemoryStore::new(), config(5, 1))
        .run(file.path())
        .await
        .expect("run succeeds");

    assert_eq!(report.stats.records_read, 2);
    assert_eq!(report.stats.coordinate_fallbacks, 1);
}

#[tokio::test]
async fn out_of_range_longitude_falls_back_to_origin() {
    let lines = vec![
        location_line(1),
        ",XX,B01,Far East,Far East,,AI,1-------,0101,,4230N 20000E,".to_string(),
        location_line(2),
    ];
    let file = input_file(&lines);
    let store = MemoryStore::new();

    let report = Pipeline::new(store.clone(), config(3, 1))
        .run(file.path())
        .await
        .expect("run succeeds");

    assert_eq!(report.stats.coordinate_fallbacks, 1);
    assert_eq!(report.stats.records_processed, 3);
    assert_eq!(report.stats.records_rejected, 0);
    assert!(store.contains("XXB01", "Far East"));
}

#[tokio::test]
async fn empty_names_are_rejected_by_the_writer() {
    let lines = vec![
        location_line(1),
        ",XX,B02,,,,AI,1-------,0101,,4230N 00131E,".to_string(),
    ];
    let file = input_file(&lines);

    let report = Pipeline::new(MemoryStore::new(), config(5, 1))
        .run(file.path())
        .await
        .expect("run succeeds");

    assert_eq!(report.stats.records_read, 2);
    assert_eq!(report.stats.records_processed, 1);
    assert_eq!(report.stats.records_rejected, 1);
}

#[tokio::test]
async fn reloading_the_same_file_inserts_nothing_new() {
    let file = input_file(&locations(6));
    let store = MemoryStore::new();
    let pipeline = Pipeline::new(store.clone(), config(4, 2));

    let first = pipeline.run(file.path()).await.expect("first run");
    let second = pipeline.run(file.path()).await.expect("second run");

    assert_eq!(first.stats.records_inserted, 6);
    assert_eq!(second.stats.records_processed, 6);
    assert_eq!(second.stats.records_inserted, 0);
    assert_eq!(store.row_count(), 6);
    assert_eq!(store.schema_calls(), 2);
}

#[tokio::test]
async fn slow_writers_apply_backpressure_without_losing_batches() {
    let file = input_file(&locations(40));
    let store = MemoryStore::new().with_write_latency(Duration::from_millis(5));

    let config = PipelineConfig {
        queue_capacity: 1,
        ..config(1, 3)
    };
    let report = Pipeline::new(store.clone(), config)
        .run(file.path())
        .await
        .expect("run succeeds");

    assert_eq!(report.stats.batches_written, 40);
    assert_eq!(report.stats.records_processed, 40);
    assert_eq!(store.row_count(), 40);
}

#[tokio::test]
async fn worker_connect_failure_is_fatal_before_reading() {
    let file = input_file(&locations(5));
    let store = MemoryStore::new().fail_connects_for_worker(1);

    let err = Pipeline::new(store.clone(), config(2, 3))
        .run(file.path())
        .await
        .expect_err("connect failure must abort the run");

    assert!(matches!(
        err,
        PipelineError::WorkerConnect { worker_id: 1, .. }
    ));
    assert_eq!(store.row_count(), 0);
    assert_eq!(store.open_writers(), 0);
}

#[tokio::test]
async fn schema_failure_is_fatal_before_connecting_workers() {
    let file = input_file(&locations(5));
    let store = MemoryStore::new().fail_schema();

    let err = Pipeline::new(store.clone(), config(2, 3))
        .run(file.path())
        .await
        .expect_err("schema failure must abort the run");

    assert!(matches!(err, PipelineError::Schema(_)));
    assert_eq!(store.connect_calls(), 0);
}

#[tokio::test]
async fn missing_input_fails_before_touching_the_store() {
    let store = MemoryStore::new();

    let err = Pipeline::new(store.clone(), config(2, 1))
        .run(std::path::Path::new("/nonexistent/unlocode.csv"))
        .await
        .expect_err("missing file must fail");

    assert!(matches!(err, PipelineError::OpenInput { .. }));
    assert_eq!(store.schema_calls(), 0);
}

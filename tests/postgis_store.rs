use std::io::Write;

use tempfile::NamedTempFile;
use unlocode_loader::ingest::Batch;
use unlocode_loader::locode::NormalizedRecord;
use unlocode_loader::store::{BulkWriter, Store};
use unlocode_loader::test_support::TestDatabase;
use unlocode_loader::{Pipeline, PipelineConfig};

async fn test_database(test: &str) -> Option<TestDatabase> {
    match TestDatabase::new().await {
        Ok(db) => Some(db),
        Err(err) => {
            eprintln!("skipping {test}: no PostGIS container available ({err})");
            None
        }
    }
}

fn record(code: &str, name: &str, latitude: f64, longitude: f64) -> NormalizedRecord {
    NormalizedRecord {
        unlocode: code.to_string(),
        name: name.to_string(),
        country_code: code[..2].to_string(),
        latitude,
        longitude,
        is_airport: false,
        is_port: true,
        is_train_station: false,
    }
}

#[tokio::test]
async fn ensure_schema_is_idempotent() {
    let Some(test_db) = test_database("ensure_schema_is_idempotent").await else {
        return;
    };
    let store = test_db.store();

    store.ensure_schema().await.expect("first schema setup");
    store.ensure_schema().await.expect("second schema setup");

    let mut conn = test_db.connect().await.expect("connect");
    let indexes: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pg_indexes WHERE tablename = 'locations' AND indexname = 'locations_unlocode_name_idx'",
    )
    .fetch_one(&mut conn)
    .await
    .expect("index lookup");
    assert_eq!(indexes, 1);

    drop(conn);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn batch_write_skips_duplicates_and_invalid_rows() {
    let Some(test_db) = test_database("batch_write_skips_duplicates_and_invalid_rows").await else {
        return;
    };
    let store = test_db.store();
    store.ensure_schema().await.expect("schema setup");

    let mut batch = Batch::with_capacity(0, 4);
    batch.push(record("SEMMA", "Malmö", 55.6, 13.0));
    batch.push(record("SEMMA", "Malmö", 55.6, 13.0));
    batch.push(record("SESTO", "Stockholm", 59.33, 18.05));
    batch.push(record("SEXXX", "", 10.0, 10.0));

    let mut writer = store.connect_writer(0).await.expect("writer connects");
    let outcome = writer.write(&batch).await.expect("batch writes");
    assert_eq!(outcome.accepted, 3);
    assert_eq!(outcome.inserted, 2);
    assert_eq!(outcome.rejected, 1);

    let again = writer.write(&batch).await.expect("rewrite succeeds");
    assert_eq!(again.inserted, 0);
    writer.close().await;

    let mut conn = test_db.connect().await.expect("connect");
    let (longitude, latitude): (f64, f64) = sqlx::query_as(
        "SELECT ST_X(location::geometry), ST_Y(location::geometry) FROM locations WHERE unlocode = 'SESTO'",
    )
    .fetch_one(&mut conn)
    .await
    .expect("location lookup");
    assert!((longitude - 18.05).abs() < 1e-9);
    assert!((latitude - 59.33).abs() < 1e-9);

    drop(conn);
    test_db.close().await.expect("failed to drop test database");
}

#[tokio::test]
async fn pipeline_loads_file_into_postgis() {
    let Some(test_db) = test_database("pipeline_loads_file_into_postgis").await else {
        return;
    };

    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        "Change,Country,Location,Name,NameWoDiacritics,Subdivision,Status,Function,Date,IATA,Coordinates,Remarks"
    )
    .expect("write");
    writeln!(file, ",SE,,.SWEDEN,,,,,,,,").expect("write");
    writeln!(file, ",SE,MMA,Malmö,Malmo,M,AI,1234----,0401,MMX,5536N 01300E,").expect("write");
    writeln!(file, ",SE,STO,Stockholm,Stockholm,AB,AI,12345---,0401,STO,5920N 01803E,").expect("write");
    writeln!(file, ",SE,ZZZ,Nowhere,Nowhere,,RL,--------,0401,,,").expect("write");
    file.flush().expect("flush");

    let config = PipelineConfig {
        batch_size: 2,
        workers: 2,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(test_db.store(), config);
    let report = pipeline.run(file.path()).await.expect("run succeeds");

    assert_eq!(report.stats.records_read, 3);
    assert_eq!(report.stats.lines_skipped, 1);
    assert_eq!(report.stats.records_processed, 3);
    assert_eq!(report.stats.records_inserted, 3);

    pipeline.store().analyze().await.expect("analyze");

    let mut conn = test_db.connect().await.expect("connect");
    let airports: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM locations WHERE is_airport")
            .fetch_one(&mut conn)
            .await
            .expect("count");
    assert_eq!(airports, 2);

    drop(conn);
    test_db.close().await.expect("failed to drop test database");
}

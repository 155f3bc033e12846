pub mod config;
pub mod error;
pub mod ingest;
pub mod locode;
pub mod store;

pub use config::{DatabaseConfig, PipelineConfig};
pub use error::PipelineError;
pub use ingest::{Pipeline, StatsReport};

use env_logger::Env;
use std::sync::Once;

static LOGGER: Once = Once::new();

/// Install the `env_logger` backend once; `RUST_LOG` overrides the default filter.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info,sqlx=warn")).init();
    });
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    pub use database::{TestDatabase, TestDatabaseError};
    pub use memory::MemoryStore;

    pub mod memory {
        use parking_lot::Mutex;
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        use crate::ingest::Batch;
        use crate::store::columns::LocationColumns;
        use crate::store::{BulkWriter, Store, StoreError, WriteError, WriteOutcome};

        #[derive(Debug, Default)]
        struct Counters {
            schema_calls: AtomicUsize,
            connect_calls: AtomicUsize,
            open_writers: AtomicUsize,
            failed_connects_left: AtomicUsize,
        }

        /// In-process store with the same acceptance rules as PostGIS.
        ///
        /// Rows are keyed by `(unlocode, name)` so duplicates are skipped the
        /// way the unique index skips them. Failures can be injected per batch
        /// sequence, per worker or for the first N connects.
        #[derive(Debug, Clone, Default)]
        pub struct MemoryStore {
            rows: Arc<Mutex<HashSet<(String, String)>>>,
            counters: Arc<Counters>,
            failing_batches: Arc<HashSet<u64>>,
            failing_worker: Option<usize>,
            fail_schema: bool,
            write_latency: Duration,
        }

        impl MemoryStore {
            pub fn new() -> Self {
                Self::default()
            }

            /// Reject every batch whose sequence is listed.
            pub fn fail_batches(mut self, sequences: impl IntoIterator<Item = u64>) -> Self {
                self.failing_batches = Arc::new(sequences.into_iter().collect());
                self
            }

            /// Fail the first `count` connect attempts, whichever worker makes them.
            pub fn fail_connects(self, count: usize) -> Self {
                self.counters
                    .failed_connects_left
                    .store(count, Ordering::SeqCst);
                self
            }

            /// Fail every connect attempt made for `worker_id`.
            pub fn fail_connects_for_worker(mut self, worker_id: usize) -> Self {
                self.failing_worker = Some(worker_id);
                self
            }

            pub fn fail_schema(mut self) -> Self {
                self.fail_schema = true;
                self
            }

            pub fn with_write_latency(mut self, latency: Duration) -> Self {
                self.write_latency = latency;
                self
            }

            pub fn row_count(&self) -> usize {
                self.rows.lock().len()
            }

            pub fn contains(&self, unlocode: &str, name: &str) -> bool {
                self.rows
                    .lock()
                    .contains(&(unlocode.to_string(), name.to_string()))
            }

            pub fn schema_calls(&self) -> usize {
                self.counters.schema_calls.load(Ordering::SeqCst)
            }

            pub fn connect_calls(&self) -> usize {
                self.counters.connect_calls.load(Ordering::SeqCst)
            }

            /// Writers connected and not yet closed.
            pub fn open_writers(&self) -> usize {
                self.counters.open_writers.load(Ordering::SeqCst)
            }

            fn take_connect_failure(&self) -> bool {
                self.counters
                    .failed_connects_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                        left.checked_sub(1)
                    })
                    .is_ok()
            }
        }

        impl Store for MemoryStore {
            type Writer = MemoryWriter;

            async fn ensure_schema(&self) -> Result<(), StoreError> {
                self.counters.schema_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_schema {
                    return Err(StoreError::Unavailable(
                        "schema setup refused".to_string(),
                    ));
                }
                Ok(())
            }

            async fn connect_writer(&self, worker_id: usize) -> Result<MemoryWriter, StoreError> {
                self.counters.connect_calls.fetch_add(1, Ordering::SeqCst);

                if self.failing_worker == Some(worker_id) || self.take_connect_failure() {
                    return Err(StoreError::Unavailable(format!(
                        "worker {} refused",
                        worker_id
                    )));
                }

                self.counters.open_writers.fetch_add(1, Ordering::SeqCst);
                Ok(MemoryWriter {
                    store: self.clone(),
                })
            }
        }

        pub struct MemoryWriter {
            store: MemoryStore,
        }

        impl BulkWriter for MemoryWriter {
            async fn write(&mut self, batch: &Batch) -> Result<WriteOutcome, WriteError> {
                if !self.store.write_latency.is_zero() {
                    tokio::time::sleep(self.store.write_latency).await;
                }

                if self.store.failing_batches.contains(&batch.sequence()) {
                    return Err(WriteError::Rejected(format!(
                        "injected failure for batch {}",
                        batch.sequence()
                    )));
                }

                let columns = LocationColumns::from_records(batch.records());
                let accepted = columns.len() as u64;
                let rejected = columns.rejected as u64;

                let mut rows = self.store.rows.lock();
                let inserted = columns
                    .unlocodes
                    .into_iter()
                    .zip(columns.names)
                    .filter(|key| rows.insert(key.clone()))
                    .count() as u64;

                Ok(WriteOutcome {
                    accepted,
                    inserted,
                    rejected,
                })
            }

            async fn close(self) {
                self.store
                    .counters
                    .open_writers
                    .fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    pub mod database {
        use log::LevelFilter;
        use sqlx::postgres::PgConnectOptions;
        use sqlx::{ConnectOptions, Connection, PgConnection};
        use std::time::Duration;
        use testcontainers::{GenericImage, ImageExt, core::WaitFor};
        use testcontainers_modules::testcontainers::{
            ContainerAsync, core::error::TestcontainersError, runners::AsyncRunner,
        };
        use thiserror::Error;
        use uuid::Uuid;

        use crate::store::PostgresStore;

        const READY_ATTEMPTS: u32 = 30;

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("container error: {0}")]
            Container(#[from] TestcontainersError),
        }

        /// Disposable PostGIS database for integration tests.
        pub struct TestDatabase {
            options: PgConnectOptions,
            admin_options: PgConnectOptions,
            database_name: String,
            container: Option<ContainerAsync<GenericImage>>,
        }

        impl TestDatabase {
            /// Launch a PostGIS container and create a uniquely named database in it.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let image = GenericImage::new("postgis/postgis", "16-3.4")
                    .with_wait_for(WaitFor::message_on_stderr(
                        "database system is ready to accept connections",
                    ));

                let container = image
                    .with_env_var("POSTGRES_DB", "postgres")
                    .with_env_var("POSTGRES_USER", "postgres")
                    .with_env_var("POSTGRES_PASSWORD", "postgres")
                    .start()
                    .await?;

                let host = container.get_host().await?.to_string();
                let port = container.get_host_port_ipv4(5432).await?;
                let admin_url = format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

                let admin_options: PgConnectOptions = admin_url.parse()?;
                let admin_options = admin_options.log_statements(LevelFilter::Off);

                // The image restarts the server once after running its init scripts
                let mut admin = connect_when_ready(&admin_options).await?;

                let database_name = format!("unlocode_{}", Uuid::new_v4().simple());
                let create_sql = format!("CREATE DATABASE \"{}\" TEMPLATE template0", database_name);
                sqlx::query(&create_sql).execute(&mut admin).await?;
                admin.close().await?;

                Ok(Self {
                    options: admin_options.clone().database(&database_name),
                    admin_options,
                    database_name,
                    container: Some(container),
                })
            }

            /// Store pointed at the test database.
            pub fn store(&self) -> PostgresStore {
                PostgresStore::new(self.options.clone(), false)
            }

            pub async fn connect(&self) -> Result<PgConnection, TestDatabaseError> {
                Ok(PgConnection::connect_with(&self.options).await?)
            }

            /// Drop the database and stop the container.
            pub async fn close(mut self) -> Result<(), TestDatabaseError> {
                let mut admin = PgConnection::connect_with(&self.admin_options).await?;
                let drop_sql = format!("DROP DATABASE \"{}\" WITH (FORCE)", self.database_name);
                sqlx::query(&drop_sql).execute(&mut admin).await?;
                admin.close().await?;

                if let Some(container) = self.container.take() {
                    drop(container);
                }
                Ok(())
            }
        }

        async fn connect_when_ready(
            options: &PgConnectOptions,
        ) -> Result<PgConnection, TestDatabaseError> {
            let mut attempt = 1;
            loop {
                match PgConnection::connect_with(options).await {
                    Ok(conn) => return Ok(conn),
                    Err(_) if attempt < READY_ATTEMPTS => {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }
}

//! PostGIS-backed [`Store`].
//!
//! Each worker gets its own `PgConnection` (no pool), and every batch is a
//! single columnar `INSERT ... SELECT FROM UNNEST(...)` inside its own
//! transaction. Rows that collide with the `(unlocode, MD5(name))` unique
//! index are skipped with `ON CONFLICT DO NOTHING`, so re-loading the same
//! file is harmless.

use log::LevelFilter;
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection, PgConnection};

use super::columns::LocationColumns;
use super::pg_config::{ConfigSnapshot, PgConfig};
use super::schema::{self, LOCATIONS_TABLE};
use super::{BulkWriter, Store, StoreError, WriteError, WriteOutcome};
use crate::config::DatabaseConfig;
use crate::ingest::Batch;

const INSERT_LOCATIONS: &str = r#"INSERT INTO locations (
        unlocode, name, country_code, location,
        is_airport, is_port, is_train_station
    )
    SELECT
        unlocode,
        name,
        country_code,
        ST_SetSRID(ST_MakePoint(longitude, latitude), 4326)::geography,
        is_airport,
        is_port,
        is_train_station
    FROM UNNEST(
        $1::text[],
        $2::text[],
        $3::text[],
        $4::float8[],
        $5::float8[],
        $6::bool[],
        $7::bool[],
        $8::bool[]
    ) AS t (
        unlocode,
        name,
        country_code,
        latitude,
        longitude,
        is_airport,
        is_port,
        is_train_station
    )
    ON CONFLICT (unlocode, MD5(name)) WHERE name IS NOT NULL DO NOTHING"#;

/// Connection settings shared by the schema connection and every writer.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    options: PgConnectOptions,
    async_commit: bool,
}

impl PostgresStore {
    pub fn new(options: PgConnectOptions, async_commit: bool) -> Self {
        Self {
            options: options.log_statements(LevelFilter::Trace),
            async_commit,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options: PgConnectOptions = config
            .url
            .parse()
            .map_err(|e: sqlx::Error| StoreError::InvalidOptions(e.to_string()))?;
        Ok(Self::new(options, config.async_commit))
    }

    async fn connect(&self) -> Result<PgConnection, StoreError> {
        PgConnection::connect_with(&self.options)
            .await
            .map_err(StoreError::Connect)
    }

    /// Read the server settings that bound a parallel load.
    pub async fn check_config(&self) -> Result<ConfigSnapshot, StoreError> {
        let mut conn = self.connect().await?;
        let snapshot = PgConfig::check_config(&mut conn).await?;
        conn.close().await?;
        Ok(snapshot)
    }

    /// Refresh planner statistics for the locations table.
    pub async fn analyze(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        PgConfig::analyze_table(&mut conn, LOCATIONS_TABLE).await?;
        conn.close().await?;
        Ok(())
    }
}

impl Store for PostgresStore {
    type Writer = PostgresWriter;

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.connect().await?;
        schema::ensure_schema(&mut conn).await?;
        conn.close().await?;
        Ok(())
    }

    async fn connect_writer(&self, worker_id: usize) -> Result<PostgresWriter, StoreError> {
        let conn = self.connect().await?;
        log::debug!("worker {}: connected", worker_id);
        Ok(PostgresWriter {
            worker_id,
            conn,
            async_commit: self.async_commit,
        })
    }
}

/// A worker's dedicated connection.
pub struct PostgresWriter {
    worker_id: usize,
    conn: PgConnection,
    async_commit: bool,
}

impl BulkWriter for PostgresWriter {
    async fn write(&mut self, batch: &Batch) -> Result<WriteOutcome, WriteError> {
        let columns = LocationColumns::from_records(batch.records());
        let rejected = columns.rejected as u64;

        if columns.is_empty() {
            return Ok(WriteOutcome {
                accepted: 0,
                inserted: 0,
                rejected,
            });
        }

        // Dropping the transaction on any error below rolls the batch back
        let mut transaction = self.conn.begin().await?;
        PgConfig::apply_bulk_write_settings(&mut transaction, self.async_commit).await?;

        let result = sqlx::query(INSERT_LOCATIONS)
            .bind(&columns.unlocodes)
            .bind(&columns.names)
            .bind(&columns.country_codes)
            .bind(&columns.latitudes)
            .bind(&columns.longitudes)
            .bind(&columns.is_airport)
            .bind(&columns.is_port)
            .bind(&columns.is_train_station)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;

        let accepted = columns.len() as u64;
        let inserted = result.rows_affected();
        if inserted < accepted {
            log::debug!(
                "worker {}: batch {} inserted {} of {} rows ({} duplicates skipped)",
                self.worker_id,
                batch.sequence(),
                inserted,
                accepted,
                accepted - inserted
            );
        }

        Ok(WriteOutcome {
            accepted,
            inserted,
            rejected,
        })
    }

    async fn close(self) {
        if let Err(e) = self.conn.close().await {
            log::warn!("worker {}: error closing connection: {}", self.worker_id, e);
        }
    }
}

use sqlx::{PgConnection, Postgres, Transaction};

/// PostgreSQL session settings for bulk loading
pub struct PgConfig;

impl PgConfig {
    /// Apply per-batch settings inside the write transaction
    pub async fn apply_bulk_write_settings(
        tx: &mut Transaction<'_, Postgres>,
        async_commit: bool,
    ) -> Result<(), sqlx::Error> {
        if async_commit {
            // Still atomic; only the flush to disk is deferred
            sqlx::query("SET LOCAL synchronous_commit = 'off'")
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    /// Refresh planner statistics after a bulk load
    pub async fn analyze_table(conn: &mut PgConnection, table: &str) -> Result<(), sqlx::Error> {
        log::info!("running ANALYZE on table: {}", table);
        let query = format!("ANALYZE {}", table);
        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    /// Check server settings relevant to a parallel load
    pub async fn check_config(conn: &mut PgConnection) -> Result<ConfigSnapshot, sqlx::Error> {
        let max_connections: (String,) = sqlx::query_as("SHOW max_connections")
            .fetch_one(&mut *conn)
            .await?;

        let synchronous_commit: (String,) = sqlx::query_as("SHOW synchronous_commit")
            .fetch_one(&mut *conn)
            .await?;

        let postgis_version: Option<(String,)> =
            sqlx::query_as("SELECT extversion FROM pg_extension WHERE extname = 'postgis'")
                .fetch_optional(&mut *conn)
                .await?;

        Ok(ConfigSnapshot {
            max_connections: max_connections.0,
            synchronous_commit: synchronous_commit.0,
            postgis_version: postgis_version.map(|(version,)| version),
        })
    }
}

/// Snapshot of the destination server configuration
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub max_connections: String,
    pub synchronous_commit: String,
    pub postgis_version: Option<String>,
}

impl ConfigSnapshot {
    /// Whether the server can accept `wanted` more connections, if known
    pub fn allows_connections(&self, wanted: usize) -> Option<bool> {
        self.max_connections
            .trim()
            .parse::<usize>()
            .ok()
            .map(|max| wanted <= max)
    }
}

impl std::fmt::Display for ConfigSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "PostgreSQL Configuration:")?;
        writeln!(f, "  max_connections: {}", self.max_connections)?;
        writeln!(f, "  synchronous_commit: {}", self.synchronous_commit)?;
        writeln!(
            f,
            "  postgis: {}",
            self.postgis_version.as_deref().unwrap_or("not installed")
        )?;
        Ok(())
    }
}

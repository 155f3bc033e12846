//! Destination schema for location records.
//!
//! Every statement is guarded with `IF NOT EXISTS`, so running the setup
//! against an initialised database is a no-op.

use sqlx::{Connection, PgConnection};

pub const LOCATIONS_TABLE: &str = "locations";

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS postgis",
    r#"CREATE TABLE IF NOT EXISTS locations (
        id SERIAL PRIMARY KEY,
        unlocode VARCHAR(10) NOT NULL,
        name TEXT NOT NULL,
        country_code CHAR(2) NOT NULL,
        location GEOGRAPHY(POINT, 4326),
        is_airport BOOLEAN DEFAULT FALSE,
        is_port BOOLEAN DEFAULT FALSE,
        is_train_station BOOLEAN DEFAULT FALSE,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS locations_unlocode_name_idx
       ON locations (unlocode, MD5(name))
       WHERE name IS NOT NULL"#,
];

/// Create the PostGIS extension, the locations table and its unique index.
pub async fn ensure_schema(conn: &mut PgConnection) -> Result<(), sqlx::Error> {
    log::debug!("ensuring {} schema", LOCATIONS_TABLE);

    let mut transaction = conn.begin().await?;
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(&mut *transaction).await?;
    }
    transaction.commit().await?;

    log::info!("{} schema ready", LOCATIONS_TABLE);
    Ok(())
}

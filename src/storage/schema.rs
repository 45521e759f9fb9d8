//! Schema initialization.
//!
//! Every statement is `IF NOT EXISTS`, so running the schema on each new
//! connection is idempotent and safe from concurrent threads.

use rusqlite::{Connection, OptionalExtension};

use super::error::StoreError;

/// Record table name.
pub const RECORD_TABLE: &str = "biographies";

/// Air-quality reading table name.
pub const READING_TABLE: &str = "air_quality_readings";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS biographies (
    name        TEXT NOT NULL UNIQUE,
    birth_year  INTEGER,
    birth_place TEXT,
    death_year  INTEGER,
    death_place TEXT,
    occupation  TEXT,
    achievement TEXT,
    education   TEXT,
    nationality TEXT,
    known_for   TEXT
);

CREATE INDEX IF NOT EXISTS idx_biographies_name ON biographies(name);

CREATE TABLE IF NOT EXISTS air_quality_readings (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT NOT NULL,
    location    TEXT NOT NULL CHECK (length(location) > 0),
    pm25        REAL NOT NULL CHECK (pm25 >= 0),
    temperature REAL NOT NULL,
    humidity    REAL NOT NULL CHECK (humidity >= 0 AND humidity <= 100)
);

CREATE INDEX IF NOT EXISTS idx_readings_timestamp ON air_quality_readings(timestamp);
CREATE INDEX IF NOT EXISTS idx_readings_location ON air_quality_readings(location);
"#;

/// Create the record and reading tables with their indexes.
pub fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Whether the record table exists.
pub fn schema_exists(conn: &Connection) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [RECORD_TABLE],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!schema_exists(&conn).unwrap());

        ensure_schema(&conn).unwrap();
        assert!(schema_exists(&conn).unwrap());

        let expected: Vec<String> = crate::storage::Field::ALL
            .iter()
            .map(|field| field.column().to_string())
            .collect();
        assert_eq!(columns(&conn, RECORD_TABLE), expected);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        conn.execute("INSERT INTO biographies (name) VALUES ('Alan Turing')", [])
            .unwrap();

        ensure_schema(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM biographies", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_indexes_exist() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%' ORDER BY name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            names,
            vec![
                "idx_biographies_name",
                "idx_readings_location",
                "idx_readings_timestamp"
            ]
        );
    }

    #[test]
    fn test_reading_constraints_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let err = conn
            .execute(
                "INSERT INTO air_quality_readings (timestamp, location, pm25, temperature, humidity)
                 VALUES ('2024-01-01 00:00:00', 'Beijing', -1.0, 20.0, 50.0)",
                [],
            )
            .unwrap_err();
        assert!(matches!(
            StoreError::from(err),
            StoreError::IntegrityViolation(_)
        ));
    }
}

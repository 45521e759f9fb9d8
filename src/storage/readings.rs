//! Air-quality reading log.
//!
//! Readings are append-only rows guarded by CHECK constraints in the
//! schema; the engine, not this module, decides what is valid, and
//! rejections surface as [`StoreError::IntegrityViolation`].

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::error::StoreError;

/// One sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Row id, assigned on insert.
    #[serde(default)]
    pub id: Option<i64>,
    /// Observation time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub location: String,
    pub pm25: f64,
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
}

impl Reading {
    pub fn new(
        timestamp: impl Into<String>,
        location: impl Into<String>,
        pm25: f64,
        temperature: f64,
        humidity: f64,
    ) -> Self {
        Self {
            id: None,
            timestamp: timestamp.into(),
            location: location.into(),
            pm25,
            temperature,
            humidity,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            timestamp: row.get(1)?,
            location: row.get(2)?,
            pm25: row.get(3)?,
            temperature: row.get(4)?,
            humidity: row.get(5)?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, timestamp, location, pm25, temperature, humidity";

/// Insert a reading, returning its row id.
pub fn insert_reading(conn: &Connection, reading: &Reading) -> Result<i64, StoreError> {
    conn.execute(
        "INSERT INTO air_quality_readings (timestamp, location, pm25, temperature, humidity)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            reading.timestamp,
            reading.location,
            reading.pm25,
            reading.temperature,
            reading.humidity
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Readings with `start <= timestamp <= end`, either bound optional.
pub fn readings_between(
    conn: &Connection,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Vec<Reading>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {SELECT_COLUMNS} FROM air_quality_readings
         WHERE (?1 IS NULL OR timestamp >= ?1) AND (?2 IS NULL OR timestamp <= ?2)
         ORDER BY timestamp ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map(params![start, end], Reading::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Most recent reading for a location.
pub fn latest_reading(conn: &Connection, location: &str) -> Result<Option<Reading>, StoreError> {
    let reading = conn
        .query_row(
            &format!(
                "SELECT {SELECT_COLUMNS} FROM air_quality_readings
                 WHERE location = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1"
            ),
            [location],
            Reading::from_row,
        )
        .optional()?;
    Ok(reading)
}

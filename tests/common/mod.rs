//! Test utilities shared by the integration suites.
//!
//! Provides:
//! - Temporary database and history file fixtures
//! - Sample biography records

#![allow(dead_code)]

use memstore::{Field, FieldMap, Record, Store, StoreOptions, StoreTarget};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Test fixture that manages a temporary database directory.
///
/// The directory is automatically cleaned up when the fixture is dropped.
pub struct TestFixture {
    /// Temporary directory for test database
    pub temp_dir: TempDir,
    /// Path to the database file
    pub db_path: PathBuf,
}

impl TestFixture {
    /// Create a new test fixture with a temporary database directory.
    pub fn new() -> Self {
        memstore::observability::tracing::init_test_tracing();
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        Self { temp_dir, db_path }
    }

    /// Open a store on the fixture database.
    pub fn open_store(&self) -> Store {
        Store::open(&self.db_path).expect("failed to open store")
    }

    /// Open a store with a short busy timeout.
    pub fn open_store_with_timeout(&self, busy_timeout: Duration) -> Store {
        let options = StoreOptions {
            busy_timeout,
            ..StoreOptions::default()
        };
        Store::open_with_options(StoreTarget::File(self.db_path.clone()), options)
            .expect("failed to open store")
    }

    /// A path inside the fixture directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields for the Ada Lovelace record.
pub fn ada_fields() -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(Field::Occupation, "Mathematician".into());
    fields.insert(Field::BirthYear, 1815.into());
    fields.insert(Field::BirthPlace, "London".into());
    fields.insert(Field::KnownFor, "First computer program".into());
    fields
}

/// A small set of well-known computing pioneers.
pub fn pioneers() -> Vec<Record> {
    vec![
        Record::new("Alan Turing")
            .with(Field::BirthYear, 1912)
            .with(Field::DeathYear, 1954)
            .with(Field::Occupation, "Computer Scientist")
            .with(Field::Nationality, "British"),
        Record::new("Grace Hopper")
            .with(Field::BirthYear, 1906)
            .with(Field::DeathYear, 1992)
            .with(Field::Occupation, "Computer Scientist")
            .with(Field::Achievement, "COBOL"),
        Record::new("John von Neumann")
            .with(Field::BirthYear, 1903)
            .with(Field::BirthPlace, "Budapest")
            .with(Field::Nationality, "Hungarian"),
    ]
}

/// `count` distinct generated records named `{prefix}-{i}`.
pub fn generated(prefix: &str, count: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::new(format!("{prefix}-{i}"))
                .with(Field::BirthYear, 1900 + i as i64)
                .with(Field::Occupation, "Engineer")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.temp_dir.path().exists());
        assert!(fixture.db_path.ends_with("test.db"));
    }
}

//! SQLite adapter: Implementation of VisitStore.
//!
//! Provides local persistence for scored visits so a patient's history can
//! be re-analyzed without the source dataset.
//!
//! # Mutex Behavior
//!
//! The connection is protected by `Mutex`. A poisoned mutex (from a panic in
//! another thread) will cause a panic rather than serving possibly
//! half-written history.
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::domain::{LabPanel, ScoredVisit};
use crate::ports::{RecordPage, RiskRecord, VisitStore};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// SQLite storage adapter.
pub struct SqliteVisitStore {
    conn: Mutex<Connection>,
}

impl SqliteVisitStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("Lock failed");

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS risk_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_id INTEGER,
                visit_date TEXT,
                gender REAL NOT NULL,
                hemoglobin REAL NOT NULL,
                mch REAL NOT NULL,
                mchc REAL NOT NULL,
                mcv REAL NOT NULL,
                probability REAL,
                prediction INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_risk_records_patient
                ON risk_records(patient_id, visit_date);
            ",
        )?;

        Ok(())
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<RiskRecord> {
        let visit_date: Option<String> = row.get(2)?;
        let visit_date = visit_date
            .map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

        let prediction: Option<i64> = row.get(9)?;
        let created_at_str: String = row.get(10)?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now());

        Ok(RiskRecord {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            visit_date,
            panel: LabPanel {
                gender: row.get(3)?,
                hemoglobin: row.get(4)?,
                mch: row.get(5)?,
                mchc: row.get(6)?,
                mcv: row.get(7)?,
            },
            probability: row.get(8)?,
            prediction: prediction.map(|p| p != 0),
            created_at,
        })
    }
}

const SELECT_COLUMNS: &str = r"
    SELECT id, patient_id, visit_date, gender, hemoglobin, mch, mchc, mcv,
           probability, prediction, created_at
    FROM risk_records
";

impl VisitStore for SqliteVisitStore {
    type Error = StorageError;

    fn save(&self, visit: &ScoredVisit) -> Result<i64, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let now = chrono::Utc::now().to_rfc3339();
        let p = &visit.panel;

        conn.execute(
            r"
            INSERT INTO risk_records (
                patient_id, visit_date, gender, hemoglobin, mch, mchc, mcv,
                probability, prediction, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
            params![
                visit.patient_id,
                visit.visit_date.map(|d| d.format(DATE_FORMAT).to_string()),
                p.gender,
                p.hemoglobin,
                p.mch,
                p.mchc,
                p.mcv,
                visit.risk_probability,
                visit.prediction().map(i64::from),
                now,
            ],
        )?;

        let id = conn.last_insert_rowid();
        tracing::debug!("Saved risk record {} to storage", id);
        Ok(id)
    }

    fn history(&self, patient_id: i64) -> Result<Vec<RiskRecord>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE patient_id = ?1 ORDER BY visit_date IS NULL, visit_date, id"
        ))?;

        let records = stmt
            .query_map(params![patient_id], Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn history_paginated(
        &self,
        patient_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<RecordPage, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let total_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM risk_records WHERE patient_id = ?1",
            params![patient_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE patient_id = ?1 \
             ORDER BY visit_date IS NULL, visit_date, id LIMIT ?2 OFFSET ?3"
        ))?;

        let records = stmt
            .query_map(
                params![patient_id, limit as i64, offset as i64],
                Self::row_to_record,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecordPage::new(records, total_count as usize, offset, limit))
    }

    fn count(&self) -> Result<usize, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM risk_records", [], |row| row.get(0))?;

        Ok(count as usize)
    }

    fn delete(&self, id: i64) -> Result<(), Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let affected = conn.execute("DELETE FROM risk_records WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("risk record {id}")));
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<(), Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        conn.execute("DELETE FROM risk_records", [])?;
        tracing::warn!("Cleared all risk records from storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(patient_id: i64, date: Option<&str>, probability: Option<f64>) -> ScoredVisit {
        ScoredVisit {
            patient_id: Some(patient_id),
            visit_date: date.map(|d| d.parse().expect("valid date")),
            panel: LabPanel {
                gender: 1.0,
                hemoglobin: 11.2,
                mch: 23.0,
                mchc: 30.5,
                mcv: 81.0,
            },
            risk_probability: probability,
        }
    }

    #[test]
    fn test_record_crud() {
        let storage = SqliteVisitStore::in_memory().expect("Should create db");
        assert_eq!(storage.count().expect("Should count"), 0);

        let visit = scored(7, Some("2024-02-01"), Some(62.5));
        let id = storage.save(&visit).expect("Should save");
        assert_eq!(storage.count().expect("Should count"), 1);

        let history = storage.history(7).expect("Should load");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, id);
        assert_eq!(history[0].prediction, Some(true));
        assert_eq!(history[0].to_scored_visit(), visit);

        storage.delete(id).expect("Should delete");
        assert_eq!(storage.count().expect("Should count"), 0);
        assert!(matches!(storage.delete(id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_null_probability_round_trips() {
        let storage = SqliteVisitStore::in_memory().expect("Should create db");
        storage
            .save(&scored(3, Some("2024-01-01"), None))
            .expect("Should save");

        let record = &storage.history(3).expect("Should load")[0];
        assert_eq!(record.probability, None);
        assert_eq!(record.prediction, None);
    }

    #[test]
    fn test_history_ordered_by_date_then_insertion() {
        let storage = SqliteVisitStore::in_memory().expect("Should create db");
        storage.save(&scored(1, None, Some(1.0))).expect("Should save");
        storage
            .save(&scored(1, Some("2024-03-01"), Some(2.0)))
            .expect("Should save");
        storage
            .save(&scored(1, Some("2024-01-01"), Some(3.0)))
            .expect("Should save");
        storage
            .save(&scored(1, Some("2024-03-01"), Some(4.0)))
            .expect("Should save");
        storage
            .save(&scored(2, Some("2024-01-01"), Some(5.0)))
            .expect("Should save");

        let probabilities: Vec<_> = storage
            .history(1)
            .expect("Should load")
            .iter()
            .map(|r| r.probability)
            .collect();
        assert_eq!(
            probabilities,
            vec![Some(3.0), Some(2.0), Some(4.0), Some(1.0)]
        );
    }

    #[test]
    fn test_pagination() {
        let storage = SqliteVisitStore::in_memory().expect("Should create db");
        for day in 1..=5 {
            let date = format!("2024-01-0{day}");
            storage
                .save(&scored(9, Some(&date), Some(f64::from(day))))
                .expect("Should save");
        }

        let first = storage.history_paginated(9, 0, 2).expect("Should load");
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.total_count, 5);
        assert_eq!(first.next_offset(), Some(2));

        let last = storage.history_paginated(9, 4, 2).expect("Should load");
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);
        assert_eq!(last.next_offset(), None);
    }

    #[test]
    fn test_clear_all() {
        let storage = SqliteVisitStore::in_memory().expect("Should create db");
        storage
            .save(&scored(1, Some("2024-01-01"), Some(10.0)))
            .expect("Should save");
        storage.clear_all().expect("Should clear");
        assert_eq!(storage.count().expect("Should count"), 0);
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.db");

        {
            let storage = SqliteVisitStore::new(&path).expect("Should open");
            storage
                .save(&scored(4, Some("2024-06-01"), Some(33.3)))
                .expect("Should save");
        }

        let reopened = SqliteVisitStore::new(&path).expect("Should reopen");
        assert_eq!(reopened.history(4).expect("Should load").len(), 1);
    }
}

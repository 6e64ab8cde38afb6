use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_record, project, MeasurementStore, QueryOutput, Selection, StoreError};
use crate::MeasureRecord;

/// In-process store. Tables are append-only vectors in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<MeasureRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one table, oldest first.
    #[cfg(test)]
    pub async fn records(&self, table: &str) -> Vec<MeasureRecord> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn write(&self, table: &str, record: &MeasureRecord) -> Result<(), StoreError> {
        // ---
        check_record(record)?;
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn query(&self, selection: &Selection) -> Result<QueryOutput, StoreError> {
        // ---
        let tables = self.tables.read().await;
        let Some(records) = tables.get(&selection.table) else {
            return Ok(project(&[], selection.columns.as_deref()));
        };

        // Reverse insertion order first so the stable sort keeps later writes
        // ahead of earlier ones that share a timestamp.
        let mut newest: Vec<&MeasureRecord> = records
            .iter()
            .rev()
            .filter(|r| selection.before_ms.map_or(true, |t| r.time_ms < t))
            .collect();
        newest.sort_by(|a, b| b.time_ms.cmp(&a.time_ms));
        newest.truncate(selection.limit);

        Ok(project(&newest, selection.columns.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{MeasureValue, ScalarType};

    fn reading(time_ms: i64, velocity: &str) -> MeasureRecord {
        MeasureRecord::new(
            "vibration_sensor",
            vec![MeasureValue::new("velocity", velocity, ScalarType::Double)],
            time_ms,
        )
    }

    #[tokio::test]
    async fn test_query_is_newest_first_and_limited() {
        // ---
        let store = MemoryStore::new();
        for (t, v) in [(100, "1.0"), (300, "3.0"), (200, "2.0"), (300, "3.5")] {
            store.write("vib", &reading(t, v)).await.unwrap();
        }

        let out = store
            .query(&Selection::latest("vib", 3).columns(&["velocity"]))
            .await
            .unwrap();

        assert_eq!(
            out.column("velocity").unwrap(),
            vec![Some("3.5"), Some("3.0"), Some("2.0")]
        );
    }

    #[tokio::test]
    async fn test_query_before_excludes_later_records() {
        // ---
        let store = MemoryStore::new();
        for (t, v) in [(100, "1.0"), (200, "2.0"), (300, "3.0")] {
            store.write("vib", &reading(t, v)).await.unwrap();
        }

        let out = store
            .query(&Selection::latest("vib", 5).columns(&["velocity"]).before(300))
            .await
            .unwrap();

        assert_eq!(out.column("velocity").unwrap(), vec![Some("2.0"), Some("1.0")]);
    }

    #[tokio::test]
    async fn test_rejected_write_is_not_stored() {
        // ---
        let store = MemoryStore::new();
        let err = store.write("vib", &reading(1, "loud")).await.unwrap_err();

        assert!(matches!(err, StoreError::Rejected(ref d) if d.len() == 1));
        assert!(store.records("vib").await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_is_empty() {
        // ---
        let store = MemoryStore::new();
        let out = store.query(&Selection::latest("nothing", 10)).await.unwrap();
        assert!(out.rows.is_empty());
        assert_eq!(out.columns.len(), 3);
    }
}

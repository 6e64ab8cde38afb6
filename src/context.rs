//! Process-wide application context.
//!
//! Built once in `main` and handed to the router as axum state; every
//! handler reaches the store and the table map through it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::store::MeasurementStore;
use crate::SensorKind;

/// Table name per sensor kind; kinds without an entry use their slug.
#[derive(Debug, Clone, Default)]
pub struct TableMap(HashMap<SensorKind, String>);

impl TableMap {
    pub fn new(tables: HashMap<SensorKind, String>) -> Self {
        Self(tables)
    }

    pub fn table(&self, kind: SensorKind) -> &str {
        self.0.get(&kind).map(String::as_str).unwrap_or(kind.slug())
    }
}

#[derive(Clone)]
pub struct AppContext {
    store: Arc<dyn MeasurementStore>,
    tables: Arc<TableMap>,
}

impl AppContext {
    pub fn new(store: Arc<dyn MeasurementStore>, tables: TableMap) -> Self {
        Self {
            store,
            tables: Arc::new(tables),
        }
    }

    pub fn store(&self) -> &dyn MeasurementStore {
        self.store.as_ref()
    }

    pub fn table(&self, kind: SensorKind) -> &str {
        self.tables.table(kind)
    }

    pub fn log_table(&self) -> &str {
        self.table(SensorKind::LogData)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_table_map_falls_back_to_slug() {
        // ---
        let tables = TableMap::new(HashMap::from([(
            SensorKind::VibrationSensor,
            "VibrationData".to_string(),
        )]));

        assert_eq!(tables.table(SensorKind::VibrationSensor), "VibrationData");
        assert_eq!(tables.table(SensorKind::SpaceCo2), "space_co2");
    }
}

//! Read-only catalog of available data.
//!
//! The verification engine resolves every data requirement against this
//! registry for the full requested history window. The core never acquires
//! data; a miss blocks the record until the registry satisfies it.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use research_models::{DataRequirement, DataTier};

use crate::GateError;

/// One dataset in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub tier: DataTier,
    pub start: NaiveDate,
    /// Open-ended when absent (still maintained).
    pub end: Option<NaiveDate>,
    pub fields: Vec<String>,
}

/// The data registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataRegistry {
    pub entries: BTreeMap<String, RegistryEntry>,
}

impl DataRegistry {
    /// Registry with the native datasets every workspace starts from.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        let native = |id: &str, year: i32, fields: &[&str]| RegistryEntry {
            id: id.to_string(),
            tier: DataTier::Native,
            start: NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN),
            end: None,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        };
        for entry in [
            native("us-equity-daily", 1998, &["open", "high", "low", "close", "volume"]),
            native("us-equity-minute", 2007, &["open", "high", "low", "close", "volume"]),
            native("sector-etfs-daily", 1999, &["open", "high", "low", "close", "volume"]),
            native("vol-index", 1990, &["close"]),
            native("treasury-10y", 1962, &["yield"]),
            native("dividend-calendar", 1998, &["ex_date", "amount"]),
            native("earnings-calendar", 2006, &["report_date", "eps"]),
        ] {
            registry.entries.insert(entry.id.clone(), entry);
        }
        registry
    }

    /// Load a registry overlay from YAML, merged over the builtin catalog.
    pub fn load(path: &Path) -> Result<Self, GateError> {
        let text = std::fs::read_to_string(path)?;
        let overlay: DataRegistry = serde_yaml::from_str(&text)
            .map_err(|e| GateError::Registry(format!("invalid registry {path:?}: {e}")))?;
        let mut registry = Self::builtin();
        registry.entries.extend(overlay.entries);
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    /// Resolve a requirement over a date range. Every requested field must
    /// exist and the registry range must cover the whole window.
    pub fn resolve(
        &self,
        requirement: &DataRequirement,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(), String> {
        let Some(entry) = self.get(&requirement.id) else {
            return Err(format!("dataset '{}' not in registry", requirement.id));
        };
        if entry.start > start {
            return Err(format!(
                "dataset '{}' starts {} but window starts {}",
                requirement.id, entry.start, start
            ));
        }
        if let Some(entry_end) = entry.end {
            if entry_end < end {
                return Err(format!(
                    "dataset '{}' ends {} but window ends {}",
                    requirement.id, entry_end, end
                ));
            }
        }
        for field in &requirement.fields {
            if !entry.fields.iter().any(|f| f == field) {
                return Err(format!(
                    "dataset '{}' has no field '{}'",
                    requirement.id, field
                ));
            }
        }
        Ok(())
    }
}

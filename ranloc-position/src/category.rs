//! Categorical id mapping
//!
//! Sequence models are trained on label-encoded categorical columns, so
//! live ids must translate through the same tables. Tables load from a
//! YAML file keyed by category name. A value missing from a present
//! table maps to 0; a category with no table passes values through.

use std::collections::HashMap;
use std::path::Path;

use ranloc_common::Error;

/// Category names used by the full feature layout.
pub const CATEGORY_ENTITY: &str = "entity_id";
pub const CATEGORY_SERVING: &str = "serving_cell_id";
pub const CATEGORY_NEIGHBOR1: &str = "neighbor1_id";
pub const CATEGORY_NEIGHBOR2: &str = "neighbor2_id";
pub const CATEGORY_NEIGHBOR3: &str = "neighbor3_id";

/// Translates categorical wire values into training-consistent codes.
#[derive(Debug, Clone, Default)]
pub struct CategoryMapper {
    tables: HashMap<String, HashMap<i64, i64>>,
}

impl CategoryMapper {
    /// Mapper with no tables; every category passes through.
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Loads mapping tables from a YAML file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::CategoryMapper(format!("cannot read {}: {e}", path.display()))
        })?;
        let tables: HashMap<String, HashMap<i64, i64>> = serde_yaml::from_str(&raw)?;
        Ok(Self { tables })
    }

    /// Translates one categorical value.
    pub fn map(&self, category: &str, value: i64) -> i64 {
        match self.tables.get(category) {
            Some(table) => table.get(&value).copied().unwrap_or(0),
            None => value,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.tables.is_empty()
    }
}

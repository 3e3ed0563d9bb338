//! Panel Catalog: reference data mapping each diagnostic panel to its
//! required measurement items.
//!
//! Loaded from the store once at startup and passed by reference to the
//! pipeline, so panel lookups and completeness checks never go back to the
//! database.

use std::collections::{HashMap, HashSet};

use crate::db::repository::{get_all_panels, get_panel_items};
use crate::db::DatabaseError;
use crate::models::{MeasurementItem, Panel};

/// Canonical name of the demographic measurement item.
pub const GENDER_ITEM_NAME: &str = "Gender";

/// One panel with its required items, in catalog order.
#[derive(Debug, Clone)]
pub struct PanelEntry {
    pub panel: Panel,
    pub items: Vec<MeasurementItem>,
}

impl PanelEntry {
    pub fn required_item_ids(&self) -> Vec<i64> {
        self.items.iter().map(|i| i.id).collect()
    }

    /// Id of the Gender item if this panel requires it.
    pub fn gender_item(&self) -> Option<&MeasurementItem> {
        self.items.iter().find(|i| i.name == GENDER_ITEM_NAME)
    }
}

/// In-memory view of the panel reference data.
pub struct PanelCatalog {
    panels: HashMap<i64, PanelEntry>,
    items_by_name: HashMap<String, MeasurementItem>,
}

impl PanelCatalog {
    pub fn load(conn: &rusqlite::Connection) -> Result<Self, DatabaseError> {
        let mut panels = HashMap::new();
        let mut items_by_name = HashMap::new();

        for panel in get_all_panels(conn)? {
            let items = get_panel_items(conn, panel.id)?;
            for item in &items {
                items_by_name
                    .entry(item.name.clone())
                    .or_insert_with(|| item.clone());
            }
            panels.insert(panel.id, PanelEntry { panel, items });
        }

        tracing::info!(panels = panels.len(), "Panel catalog loaded");
        Ok(Self {
            panels,
            items_by_name,
        })
    }

    pub fn panel(&self, panel_id: i64) -> Option<&PanelEntry> {
        self.panels.get(&panel_id)
    }

    pub fn contains_panel(&self, panel_id: i64) -> bool {
        self.panels.contains_key(&panel_id)
    }

    /// Resolve an uploaded column header to a measurement item. Headers
    /// that don't name a catalog item are not measurements.
    pub fn item_by_name(&self, name: &str) -> Option<&MeasurementItem> {
        self.items_by_name.get(name)
    }

    pub fn panels_iter(&self) -> impl Iterator<Item = &PanelEntry> {
        self.panels.values()
    }
}

/// Completeness as a pure function: a test instance is complete iff every
/// required item id has a stored value. Shared by every ingestion path so
/// the comparison logic exists exactly once.
pub fn is_complete(required: &[i64], stored: &HashSet<i64>) -> bool {
    required.iter().all(|id| stored.contains(id))
}

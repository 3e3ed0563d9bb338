use serde::{Deserialize, Serialize};

/// A named group of required measurements ordered together
/// (e.g. lipid profile).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panel {
    pub id: i64,
    pub name: String,
}

/// A single named quantity within a panel (e.g. cholesterol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementItem {
    pub id: i64,
    pub name: String,
    pub unit: Option<String>,
}

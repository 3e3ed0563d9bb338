//! Row Grouper: parses an uploaded CSV and groups rows into
//! per-(patient, date, doctor) batches.
//!
//! Each row carries the fixed columns plus one column per measurement
//! item; cells are sparse. Malformed rows are dropped with a per-row
//! warning and never abort the rest of the file.

use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Serialize;

use crate::catalog::{PanelCatalog, GENDER_ITEM_NAME};
use crate::models::Gender;

const HN_COLUMN: &str = "hn_number";
const PANEL_COLUMN: &str = "panel_id";
const DATE_COLUMN: &str = "test_date";
const DOCTOR_COLUMN: &str = "doctor_id";

/// All rows sharing one (patient number, test date, doctor) key, with the
/// measurement values collected per panel. Panel order follows first
/// appearance in the file.
#[derive(Debug, Clone)]
pub struct Batch {
    pub hn_number: String,
    pub test_date: NaiveDate,
    pub doctor_id: i64,
    pub panels: Vec<PanelValues>,
}

#[derive(Debug, Clone)]
pub struct PanelValues {
    pub panel_id: i64,
    pub values: Vec<(i64, f64)>,
}

impl Batch {
    fn panel_values_mut(&mut self, panel_id: i64) -> &mut PanelValues {
        let pos = match self.panels.iter().position(|p| p.panel_id == panel_id) {
            Some(pos) => pos,
            None => {
                self.panels.push(PanelValues {
                    panel_id,
                    values: Vec::new(),
                });
                self.panels.len() - 1
            }
        };
        &mut self.panels[pos]
    }
}

/// Per-row validation warning surfaced in the upload response.
#[derive(Debug, Clone, Serialize)]
pub struct RowWarning {
    pub row: usize,
    pub message: String,
}

#[derive(Debug)]
pub struct GroupedUpload {
    pub batches: Vec<Batch>,
    pub warnings: Vec<RowWarning>,
}

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("No data found in CSV")]
    NoData,

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("CSV read failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Parse and group an uploaded file. Column headers that are neither fixed
/// columns nor catalog item names are ignored. Returns the batches in file
/// order plus the per-row warnings; `GroupError::NoData` when the file has
/// zero data rows.
pub fn group_rows<R: Read>(
    reader: R,
    catalog: &PanelCatalog,
) -> Result<GroupedUpload, GroupError> {
    let mut csv_reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let fixed = resolve_fixed_columns(&headers)?;

    // Column index → measurement item, for every recognized item header
    let item_columns: Vec<Option<(i64, bool)>> = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            if fixed.contains(&idx) {
                return None;
            }
            catalog
                .item_by_name(name)
                .map(|item| (item.id, item.name == GENDER_ITEM_NAME))
        })
        .collect();

    let mut batches: Vec<Batch> = Vec::new();
    let mut batch_index: HashMap<(String, NaiveDate, i64), usize> = HashMap::new();
    let mut warnings = Vec::new();
    let mut data_rows = 0usize;

    for (i, record) in csv_reader.records().enumerate() {
        let row_num = i + 2; // header is row 1
        let record = record?;
        data_rows += 1;

        let parsed = match parse_row(&record, &fixed, &item_columns, row_num) {
            Ok(parsed) => parsed,
            Err(warning) => {
                tracing::warn!(row = row_num, "{}", warning.message);
                warnings.push(warning);
                continue;
            }
        };

        let key = (
            parsed.hn_number.clone(),
            parsed.test_date,
            parsed.doctor_id,
        );
        let idx = *batch_index.entry(key).or_insert_with(|| {
            batches.push(Batch {
                hn_number: parsed.hn_number.clone(),
                test_date: parsed.test_date,
                doctor_id: parsed.doctor_id,
                panels: Vec::new(),
            });
            batches.len() - 1
        });

        let panel = batches[idx].panel_values_mut(parsed.panel_id);
        for (item_id, value) in parsed.values {
            if panel.values.iter().any(|(id, _)| *id == item_id) {
                warnings.push(RowWarning {
                    row: row_num,
                    message: format!(
                        "duplicate value for item {item_id} in panel {}; keeping the first",
                        parsed.panel_id
                    ),
                });
                continue;
            }
            panel.values.push((item_id, value));
        }
    }

    if data_rows == 0 {
        return Err(GroupError::NoData);
    }

    Ok(GroupedUpload { batches, warnings })
}

struct FixedColumns {
    hn: usize,
    panel: usize,
    date: usize,
    doctor: usize,
}

impl FixedColumns {
    fn contains(&self, idx: &usize) -> bool {
        [self.hn, self.panel, self.date, self.doctor].contains(idx)
    }
}

fn resolve_fixed_columns(headers: &csv::StringRecord) -> Result<FixedColumns, GroupError> {
    let position = |name: &str| headers.iter().position(|h| h == name);

    match (
        position(HN_COLUMN),
        position(PANEL_COLUMN),
        position(DATE_COLUMN),
        position(DOCTOR_COLUMN),
    ) {
        (Some(hn), Some(panel), Some(date), Some(doctor)) => Ok(FixedColumns {
            hn,
            panel,
            date,
            doctor,
        }),
        (hn, panel, date, doctor) => {
            let missing: Vec<&str> = [
                (hn, HN_COLUMN),
                (panel, PANEL_COLUMN),
                (date, DATE_COLUMN),
                (doctor, DOCTOR_COLUMN),
            ]
            .into_iter()
            .filter_map(|(col, name)| col.is_none().then_some(name))
            .collect();
            Err(GroupError::MissingColumns(missing.join(", ")))
        }
    }
}

struct ParsedRow {
    hn_number: String,
    panel_id: i64,
    test_date: NaiveDate,
    doctor_id: i64,
    values: Vec<(i64, f64)>,
}

fn parse_row(
    record: &csv::StringRecord,
    fixed: &FixedColumns,
    item_columns: &[Option<(i64, bool)>],
    row_num: usize,
) -> Result<ParsedRow, RowWarning> {
    let warn = |message: String| RowWarning {
        row: row_num,
        message,
    };

    let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

    let hn_number = cell(fixed.hn);
    if hn_number.is_empty() {
        return Err(warn(format!("missing {HN_COLUMN}")));
    }

    let panel_raw = cell(fixed.panel);
    let panel_id: i64 = panel_raw
        .parse()
        .map_err(|_| warn(format!("invalid {PANEL_COLUMN}: {panel_raw:?}")))?;

    let date_raw = cell(fixed.date);
    let test_date = NaiveDate::parse_from_str(date_raw, "%Y-%m-%d").map_err(|_| {
        warn(format!(
            "invalid {DATE_COLUMN}: expected YYYY-MM-DD, got {date_raw:?}"
        ))
    })?;

    let doctor_raw = cell(fixed.doctor);
    let doctor_id: i64 = doctor_raw
        .parse()
        .map_err(|_| warn(format!("invalid {DOCTOR_COLUMN}: {doctor_raw:?}")))?;

    let mut values = Vec::new();
    for (idx, column) in item_columns.iter().enumerate() {
        let Some((item_id, is_gender)) = column else {
            continue;
        };
        let raw = cell(idx);
        if raw.is_empty() {
            // Sparse cell: absent value, never stored as zero
            continue;
        }
        let value = if *is_gender {
            Gender::parse_cell(raw)
                .ok_or_else(|| warn(format!("unknown gender value: {raw:?}")))?
                .code()
        } else {
            raw.parse::<f64>()
                .map_err(|_| warn(format!("non-numeric value for item {item_id}: {raw:?}")))?
        };
        values.push((*item_id, value));
    }

    Ok(ParsedRow {
        hn_number: hn_number.to_string(),
        panel_id,
        test_date,
        doctor_id,
        values,
    })
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// One period of a project's cashflow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashflowRow {
    /// Sort key. Rows with a non-finite year are ignored by the simulation.
    pub year: f64,
    pub project_benefit: f64,
    pub cost: f64,
    pub discount_rate: Option<f64>,
}

impl CashflowRow {
    pub fn new(year: f64, project_benefit: f64, cost: f64) -> Self {
        Self { year, project_benefit, cost, discount_rate: None }
    }

    pub fn with_discount_rate(mut self, rate: f64) -> Self {
        self.discount_rate = Some(rate);
        self
    }

    /// Build a row from an arbitrary JSON object, reading the fields named
    /// in `keys`. Missing or non-numeric benefit and cost become 0; a
    /// missing year becomes NaN so the row is later filtered out.
    pub fn from_record(record: &Map<String, Value>, keys: &FieldKeys) -> Self {
        let field = |k: &str| record.get(k).and_then(coerce_number);
        Self {
            year: field(keys.year.as_str()).unwrap_or(f64::NAN),
            project_benefit: field(keys.benefit.as_str()).unwrap_or(0.0),
            cost: field(keys.cost.as_str()).unwrap_or(0.0),
            discount_rate: field("discount_rate"),
        }
    }

    pub fn net(&self) -> f64 {
        self.project_benefit - self.cost
    }
}

/// Field names used to read year, benefit and cost out of loose records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKeys {
    pub year: String,
    pub benefit: String,
    pub cost: String,
}

impl Default for FieldKeys {
    fn default() -> Self {
        Self {
            year: "year".to_string(),
            benefit: "project_benefit".to_string(),
            cost: "cost".to_string(),
        }
    }
}

/// Finite numbers and numeric strings; anything else is absent.
fn coerce_number(v: &Value) -> Option<f64> {
    let x = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    x.filter(|x| x.is_finite())
}

/// Convert a JSON array of objects into rows. A non-array yields no rows;
/// non-object elements are skipped.
pub fn rows_from_records(records: &Value, keys: &FieldKeys) -> Vec<CashflowRow> {
    let Some(items) = records.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match item.as_object() {
            Some(obj) => Some(CashflowRow::from_record(obj, keys)),
            None => {
                warn!(index = i, "skipping non-object cashflow record");
                None
            }
        })
        .collect()
}

/// Rows with a finite year, sorted ascending by year. Ties keep input order.
pub fn prepare_rows(rows: &[CashflowRow]) -> Vec<CashflowRow> {
    let mut out: Vec<CashflowRow> = rows.iter().filter(|r| r.year.is_finite()).copied().collect();
    out.sort_by(|a, b| a.year.total_cmp(&b.year));
    out
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid cashflow JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse cashflow records from either a JSON array or NDJSON text
/// (one object per line, blank lines ignored).
pub fn parse_records(text: &str) -> Result<Value, InputError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    let mut items = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let v: Value = serde_json::from_str(line)
            .map_err(|source| InputError::Line { line: line_no + 1, source })?;
        items.push(v);
    }
    Ok(Value::Array(items))
}

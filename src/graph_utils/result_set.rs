use std::fmt;

use anyhow::{anyhow, Result};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// A single cell of a query result. Lists and maps returned by the store are kept
/// as `Composite` and only ever shown through their JSON text.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Composite(JsonValue),
}

impl CellValue {
    /// Null cells and cells whose text is only whitespace carry nothing to show.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => self.to_string().trim().is_empty(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            CellValue::Null => JsonValue::Null,
            CellValue::Bool(b) => JsonValue::Bool(*b),
            CellValue::Int(i) => JsonValue::from(*i),
            CellValue::Float(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
            CellValue::Text(s) => JsonValue::String(s.clone()),
            CellValue::Composite(v) => v.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(x) => write!(f, "{}", x),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Composite(v) => write!(f, "{}", v),
        }
    }
}

impl From<JsonValue> for CellValue {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => CellValue::Null,
            JsonValue::Bool(b) => CellValue::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => CellValue::Int(i),
                None => n.as_f64().map(CellValue::Float).unwrap_or_else(|| CellValue::Text(n.to_string())),
            },
            JsonValue::String(s) => CellValue::Text(s),
            other => CellValue::Composite(other),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self { CellValue::Text(s.to_string()) }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self { CellValue::Text(s) }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self { CellValue::Int(i) }
}

impl From<f64> for CellValue {
    fn from(x: f64) -> Self { CellValue::Float(x) }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self { CellValue::Bool(b) }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Rows produced by one query execution. Every row has exactly one cell per column,
/// in column order; the set is never mutated after construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

/// Borrowed view of one row together with the column schema of its set.
#[derive(Clone, Copy, Debug)]
pub struct ResultRow<'a> {
    columns: &'a [String],
    cells: &'a [CellValue],
}

impl<'a> ResultRow<'a> {
    pub fn get(&self, column: &str) -> Option<&'a CellValue> {
        self.columns.iter().position(|c| c == column).map(|i| &self.cells[i])
    }

    pub fn cells(&self) -> &'a [CellValue] { self.cells }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a CellValue)> + 'a {
        self.columns.iter().map(String::as_str).zip(self.cells.iter())
    }
}

impl ResultSet {
    pub fn empty() -> Self { Self::default() }

    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(anyhow!("row {} has {} cells but the result has {} columns", i, row.len(), columns.len()));
            }
        }
        Ok(Self { columns, rows })
    }

    /// Build from keyed records. The first record fixes the column order and every
    /// other record must carry the same keys in the same order.
    pub fn from_records<K, I>(records: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = Vec<(K, CellValue)>>,
    {
        let mut columns: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        for (i, record) in records.into_iter().enumerate() {
            let (keys, cells): (Vec<String>, Vec<CellValue>) = record.into_iter().map(|(k, v)| (k.into(), v)).unzip();
            match &columns {
                None => columns = Some(keys),
                Some(cols) if *cols != keys => {
                    return Err(anyhow!("record {} has columns {:?}, expected {:?}", i, keys, cols));
                }
                Some(_) => {}
            }
            rows.push(cells);
        }
        Ok(Self { columns: columns.unwrap_or_default(), rows })
    }

    pub fn columns(&self) -> &[String] { &self.columns }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn row(&self, idx: usize) -> Option<ResultRow<'_>> {
        self.rows.get(idx).map(|cells| ResultRow { columns: &self.columns, cells })
    }

    pub fn rows(&self) -> impl Iterator<Item = ResultRow<'_>> + '_ {
        self.rows.iter().map(move |cells| ResultRow { columns: &self.columns, cells })
    }

    /// Copy of the first `limit` rows, same schema.
    pub fn truncated(&self, limit: usize) -> ResultSet {
        ResultSet {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(limit).cloned().collect(),
        }
    }

    /// Rows as a JSON array of objects, the shape handed to the answer prompt and JSON export.
    pub fn to_json_records(&self) -> JsonValue {
        let records = self
            .rows()
            .map(|row| {
                let obj: serde_json::Map<String, JsonValue> = row.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect();
                JsonValue::Object(obj)
            })
            .collect();
        JsonValue::Array(records)
    }
}

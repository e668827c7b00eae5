//! Pipeline output table

use crate::error::{PipelineError, Result};
use crate::pipeline::value::Value;
use crate::types::{AssetId, SessionDate};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// One (date, asset) row, values in column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub date: SessionDate,
    pub asset: AssetId,
    pub values: Vec<Value>,
}

/// Immutable result of a pipeline run, sorted by date then asset id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Rows must already be sorted by (date, asset)
    pub(crate) fn new(columns: Vec<String>, rows: Vec<ResultRow>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Distinct dates with at least one row
    pub fn dates(&self) -> Vec<SessionDate> {
        let mut dates: Vec<SessionDate> = self.rows.iter().map(|r| r.date).collect();
        dates.dedup();
        dates
    }

    /// Assets with a row on `date`, ascending
    pub fn assets_on(&self, date: SessionDate) -> Vec<AssetId> {
        self.rows
            .iter()
            .filter(|r| r.date == date)
            .map(|r| r.asset)
            .collect()
    }

    pub fn row(&self, date: SessionDate, asset: AssetId) -> Option<&ResultRow> {
        self.rows
            .binary_search_by(|r| (r.date, r.asset).cmp(&(date, asset)))
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn get(&self, date: SessionDate, asset: AssetId, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.row(date, asset).map(|r| &r.values[index])
    }

    /// All cells of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<(SessionDate, AssetId, &Value)>> {
        let index = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|r| (r.date, r.asset, &r.values[index]))
                .collect(),
        )
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Append the rows of a table over a later date range
    pub fn extend(&mut self, other: ResultTable) -> Result<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.columns != self.columns {
            return Err(PipelineError::ExportError(format!(
                "cannot concatenate tables with columns {:?} and {:?}",
                self.columns, other.columns
            )));
        }
        if let (Some(last), Some(first)) = (self.rows.last(), other.rows.first()) {
            if (first.date, first.asset) <= (last.date, last.asset) {
                return Err(PipelineError::ExportError(
                    "tables must cover consecutive, non-overlapping date ranges".to_string(),
                ));
            }
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Concatenate tables in order
    pub fn concat(tables: impl IntoIterator<Item = ResultTable>) -> Result<ResultTable> {
        let mut out = ResultTable::default();
        for table in tables {
            out.extend(table)?;
        }
        Ok(out)
    }

    /// Write as CSV with a `date,asset,<columns>` header; missing cells are empty
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["date".to_string(), "asset".to_string()];
        header.extend(self.columns.iter().cloned());
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = Vec::with_capacity(row.values.len() + 2);
            record.push(row.date.format("%Y-%m-%d").to_string());
            record.push(row.asset.to_string());
            record.extend(row.values.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| PipelineError::ExportError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Convert to a polars DataFrame (dates as ISO strings)
    #[cfg(feature = "dataframe")]
    pub fn to_dataframe(&self) -> Result<polars::prelude::DataFrame> {
        use polars::prelude::{DataFrame, NamedFrom, Series};

        let dates: Vec<String> = self
            .rows
            .iter()
            .map(|r| r.date.format("%Y-%m-%d").to_string())
            .collect();
        let assets: Vec<u64> = self.rows.iter().map(|r| r.asset).collect();
        let mut series = vec![Series::new("date", dates), Series::new("asset", assets)];

        for (index, name) in self.columns.iter().enumerate() {
            let cells: Vec<&Value> = self.rows.iter().map(|r| &r.values[index]).collect();
            let column = if cells.iter().any(|v| matches!(v, Value::Number(_))) {
                Series::new(name, cells.iter().map(|v| v.as_f64()).collect::<Vec<_>>())
            } else if cells.iter().any(|v| matches!(v, Value::Bool(_))) {
                Series::new(name, cells.iter().map(|v| v.as_bool()).collect::<Vec<_>>())
            } else {
                Series::new(
                    name,
                    cells
                        .iter()
                        .map(|v| v.as_label().map(|l| l.to_string()))
                        .collect::<Vec<_>>(),
                )
            };
            series.push(column);
        }

        DataFrame::new(series).map_err(|e| PipelineError::ExportError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Label;
    use chrono::NaiveDate;

    fn d(day: u32) -> SessionDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn table() -> ResultTable {
        ResultTable::new(
            vec!["sma".to_string(), "sector".to_string()],
            vec![
                ResultRow {
                    date: d(2),
                    asset: 1,
                    values: vec![Value::Number(10.5), Value::Label(Label::from("tech"))],
                },
                ResultRow {
                    date: d(2),
                    asset: 3,
                    values: vec![Value::Missing, Value::Label(Label::from("energy"))],
                },
                ResultRow {
                    date: d(3),
                    asset: 1,
                    values: vec![Value::Number(11.0), Value::Missing],
                },
            ],
        )
    }

    #[test]
    fn test_lookup() {
        let t = table();
        assert_eq!(t.len(), 3);
        assert_eq!(t.dates(), vec![d(2), d(3)]);
        assert_eq!(t.assets_on(d(2)), vec![1, 3]);
        assert_eq!(t.get(d(3), 1, "sma"), Some(&Value::Number(11.0)));
        assert_eq!(t.get(d(3), 3, "sma"), None);
        assert_eq!(t.get(d(2), 1, "unknown"), None);
        assert_eq!(t.column("sector").unwrap().len(), 3);
    }

    #[test]
    fn test_csv_export() {
        let csv = table().to_csv_string().unwrap();
        let expected = "date,asset,sma,sector\n\
                        2024-01-02,1,10.5,tech\n\
                        2024-01-02,3,,energy\n\
                        2024-01-03,1,11,\n";
        assert_eq!(csv, expected);
    }

    #[test]
    fn test_json_export() {
        let json = table().to_json().unwrap();
        assert!(json.starts_with(r#"{"columns":["sma","sector"],"rows":[{"date":"2024-01-02","asset":1,"values":[10.5,"tech"]}"#));
    }

    #[test]
    fn test_extend_requires_order() {
        let mut a = table();
        let b = table();
        assert!(a.extend(b).is_err());

        let later = ResultTable::new(
            vec!["sma".to_string(), "sector".to_string()],
            vec![ResultRow {
                date: d(4),
                asset: 1,
                values: vec![Value::Missing, Value::Missing],
            }],
        );
        let merged = ResultTable::concat(vec![table(), later]).unwrap();
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.dates(), vec![d(2), d(3), d(4)]);
    }
}

//! In-memory view of an uploaded CSV statement.

use crate::normalize::Scalar;
use std::fmt;

/// Failures while reading or reducing a table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableError {
    /// The file could not be parsed as CSV.
    Malformed(String),
    /// Required columns are absent from the header row.
    MissingColumns(Vec<String>),
    /// A column that must be numeric holds something else.
    NonNumeric { column: String, row: usize, value: String },
    /// The table has no data rows.
    Empty,
    /// A column total is too large to represent.
    Overflow(String),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::Malformed(msg) => write!(f, "could not parse CSV: {}", msg),
            TableError::MissingColumns(columns) => {
                write!(f, "missing columns: {}", columns.join(", "))
            }
            TableError::NonNumeric { column, row, value } => write!(
                f,
                "column '{}' has non-numeric value '{}' in row {}",
                column, value, row
            ),
            TableError::Empty => write!(f, "no data rows"),
            TableError::Overflow(column) => write!(f, "total of column '{}' overflows", column),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl Table {
    /// Parses CSV bytes with a header row. Short rows are padded with nulls.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| TableError::Malformed(e.to_string()))?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| TableError::Malformed(e.to_string()))?;
            let mut row: Vec<Scalar> = record.iter().map(Scalar::parse).collect();
            row.resize(headers.len(), Scalar::Null);
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Required columns that do not appear in the header, in the order requested.
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.headers.iter().any(|h| h == *name))
            .map(|name| name.to_string())
            .collect()
    }

    pub fn require(&self, required: &[&str]) -> Result<(), TableError> {
        let missing = self.missing_columns(required);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TableError::MissingColumns(missing))
        }
    }

    fn index_of(&self, column: &str) -> Result<usize, TableError> {
        self.headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| TableError::MissingColumns(vec![column.to_string()]))
    }

    /// All cells of one column, top to bottom.
    pub fn column(&self, column: &str) -> Result<Vec<&Scalar>, TableError> {
        let idx = self.index_of(column)?;
        Ok(self.rows.iter().map(|row| &row[idx]).collect())
    }

    /// Numeric value of `column` in the first data row.
    pub fn first_number(&self, column: &str) -> Result<f64, TableError> {
        let idx = self.index_of(column)?;
        let row = self.rows.first().ok_or(TableError::Empty)?;
        row[idx].as_f64().ok_or_else(|| TableError::NonNumeric {
            column: column.to_string(),
            row: 1,
            value: row[idx].to_string(),
        })
    }

    /// Column total, skipping empty cells. Text cells are an error.
    ///
    /// Integer cells are added exactly; the total stays an `Int` unless a float cell is
    /// present or it no longer fits in an `i64`.
    pub fn sum(&self, column: &str) -> Result<Scalar, TableError> {
        let idx = self.index_of(column)?;
        let mut ints: i128 = 0;
        let mut floats: Option<f64> = None;
        for (i, row) in self.rows.iter().enumerate() {
            let int = match &row[idx] {
                Scalar::Null => continue,
                Scalar::Int(v) => *v,
                Scalar::Bool(v) => i64::from(*v),
                Scalar::Float(v) => {
                    *floats.get_or_insert(0.0) += v;
                    continue;
                }
                Scalar::Text(text) => {
                    return Err(TableError::NonNumeric {
                        column: column.to_string(),
                        row: i + 1,
                        value: text.clone(),
                    })
                }
            };
            ints = ints
                .checked_add(i128::from(int))
                .ok_or_else(|| TableError::Overflow(column.to_string()))?;
        }

        let total = match floats {
            None => match i64::try_from(ints) {
                Ok(exact) => return Ok(Scalar::Int(exact)),
                Err(_) => ints as f64,
            },
            Some(floats) => floats + ints as f64,
        };
        if !total.is_finite() {
            return Err(TableError::Overflow(column.to_string()));
        }
        Ok(Scalar::Float(total))
    }
}

pub use crate::config::*;

/// A builder for survey and population tables.
///
/// The readers of the command line use it to turn files into tables. It is also the
/// easiest way to write small datasets by hand.
///
/// ```
/// pub use nps_engine::builder::Builder;
/// pub use nps_engine::{analyze, AnalysisRequest};
/// # use nps_engine::AnalysisErrors;
///
/// let mut builder = Builder::new(&["gender", "Q1_1"]);
///
/// builder.add_row(&["Male", "10"])?;
/// builder.add_row(&["Female", "6"])?;
/// builder.add_row(&["Female", ""])?;
///
/// let result = analyze(&builder.dataset(), &AnalysisRequest::new("Q1_1"))?;
/// assert_eq!(result.nps.score(), Some(0.0));
///
/// # Ok::<(), AnalysisErrors>(())
/// ```
pub struct Builder {
    pub(crate) _columns: Vec<String>,
    pub(crate) _records: Vec<Record>,
}

impl Builder {
    pub fn new(columns: &[&str]) -> Builder {
        Builder::with_columns(columns.iter().map(|c| c.to_string()).collect())
    }

    pub fn with_columns(columns: Vec<String>) -> Builder {
        Builder {
            _columns: columns,
            _records: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self._columns
    }

    /// Adds a row of text cells, in the order of the columns.
    ///
    /// Empty cells are left out of the record. Numbers stay as text: they are parsed
    /// when a number is expected.
    pub fn add_row(&mut self, cells: &[&str]) -> Result<(), AnalysisErrors> {
        let values: Vec<Option<Value>> = cells
            .iter()
            .map(|c| {
                if c.trim().is_empty() {
                    None
                } else {
                    Some(Value::Text(c.to_string()))
                }
            })
            .collect();
        self.add_values(values)
    }

    /// Adds a row of typed cells, in the order of the columns.
    pub fn add_values(&mut self, values: Vec<Option<Value>>) -> Result<(), AnalysisErrors> {
        if values.len() != self._columns.len() {
            return Err(AnalysisErrors::RowLength {
                expected: self._columns.len(),
                found: values.len(),
            });
        }
        let mut record = Record::new();
        for (col, v) in self._columns.iter().zip(values.into_iter()) {
            if let Some(v) = v {
                record.insert(col, v);
            }
        }
        self.add_record(record);
        Ok(())
    }

    pub fn add_record(&mut self, record: Record) {
        self._records.push(record);
    }

    pub fn len(&self) -> usize {
        self._records.len()
    }

    pub fn is_empty(&self) -> bool {
        self._records.is_empty()
    }

    pub fn build(self) -> Table {
        Table::new(self._columns, self._records)
    }

    /// A dataset with this table as the survey and no population.
    pub fn dataset(self) -> Dataset {
        Dataset::new(self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_must_match_the_header() {
        let mut b = Builder::new(&["a", "b"]);
        assert_eq!(
            b.add_row(&["1"]),
            Err(AnalysisErrors::RowLength {
                expected: 2,
                found: 1
            })
        );
        b.add_row(&["1", " "]).unwrap();
        b.add_values(vec![None, Some(Value::Number(2.0))]).unwrap();
        assert_eq!(b.len(), 2);
        let t = b.build();
        assert_eq!(t.records[0].get("a"), Some(&Value::Text("1".to_string())));
        assert_eq!(t.records[0].columns().count(), 1);
        assert_eq!(t.records[1].get("b").and_then(|v| v.as_number()), Some(2.0));
    }
}

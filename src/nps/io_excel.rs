use crate::nps::*;

use calamine::DataType;

fn header_name(cell: &DataType, idx: usize) -> String {
    match cell {
        DataType::String(s) => s.trim().to_string(),
        DataType::Float(f) => format!("{}", f),
        DataType::Int(i) => format!("{}", i),
        _ => format!("column_{}", idx + 1),
    }
}

fn read_cell(cell: &DataType, lineno: usize) -> NpsResult<Option<Value>> {
    match cell {
        DataType::String(s) if s.trim().is_empty() => Ok(None),
        DataType::String(s) => Ok(Some(Value::Text(s.clone()))),
        DataType::Float(f) => Ok(Some(Value::Number(*f))),
        DataType::Int(i) => Ok(Some(Value::Number(*i as f64))),
        DataType::Bool(b) => Ok(Some(Value::Text(b.to_string()))),
        DataType::DateTime(f) => Ok(Some(Value::Number(*f))),
        DataType::Empty => Ok(None),
        _ => ExcelWrongCellTypeSnafu {
            lineno,
            content: format!("{:?}", cell),
        }
        .fail(),
    }
}

/// Reads a worksheet whose first row holds the column names.
pub fn read_excel_table(path: &str, worksheet: Option<&str>) -> NpsResult<Table> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    let wrange = match worksheet {
        Some(name) => workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name })?,
        None => workbook
            .worksheet_range_at(0)
            .context(EmptyExcelSnafu { path })?,
    }
    .context(OpeningExcelSnafu { path })?;

    let mut rows = wrange.rows();
    let header = rows.next().context(EmptyExcelSnafu { path })?;
    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(idx, c)| header_name(c, idx))
        .collect();
    debug!("read_excel_table: header: {:?}", columns);

    let mut builder = Builder::with_columns(columns);
    for (idx, row) in rows.enumerate() {
        let lineno = idx + 2;
        let values = row
            .iter()
            .map(|c| read_cell(c, lineno))
            .collect::<NpsResult<Vec<Option<Value>>>>()?;
        builder
            .add_values(values)
            .context(InvalidRowSnafu { path, lineno })?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_cells() {
        assert_eq!(
            read_cell(&DataType::Float(9.0), 2).unwrap(),
            Some(Value::Number(9.0))
        );
        assert_eq!(
            read_cell(&DataType::Int(3), 2).unwrap(),
            Some(Value::Number(3.0))
        );
        assert_eq!(read_cell(&DataType::String("  ".to_string()), 2).unwrap(), None);
        assert_eq!(read_cell(&DataType::Empty, 2).unwrap(), None);
        assert_eq!(header_name(&DataType::Empty, 4), "column_5");
    }

    #[test]
    fn missing_workbook() {
        assert!(matches!(
            read_excel_table("does/not/exist.xlsx", None),
            Err(NpsError::OpeningExcel { .. })
        ));
    }
}

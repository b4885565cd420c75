// Primitives for reading CSV files.

use crate::nps::*;

const BOM: char = '\u{feff}';

/// Reads a CSV file with a header row. Excel adds a byte order mark to UTF-8
/// exports, it is removed from the first column name.
pub fn read_csv_table(path: &str) -> NpsResult<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    let columns: Vec<String> = rdr
        .headers()
        .context(CsvLineParseSnafu { lineno: 1usize })?
        .iter()
        .map(|h| h.trim_start_matches(BOM).trim().to_string())
        .collect();
    debug!("read_csv_table: header: {:?}", columns);

    let num_columns = columns.len();
    let mut builder = Builder::with_columns(columns);
    for (idx, line_r) in rdr.records().enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let mut cells: Vec<&str> = line.iter().collect();
        // Trailing empty cells are often cut by spreadsheet exports.
        if cells.len() < num_columns {
            cells.resize(num_columns, "");
        }
        builder
            .add_row(&cells)
            .context(InvalidRowSnafu { path, lineno })?;
    }
    Ok(builder.build())
}

use crate::nps::*;

use std::collections::{BTreeMap, BTreeSet};

use crate::nps::io_csv::read_csv_table;
use crate::nps::io_excel::read_excel_table;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Reads a table, choosing the reader from the extension of the file.
pub fn read_table(path: &str, worksheet: Option<&str>) -> NpsResult<Table> {
    let extension = Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    let table = match extension.as_deref() {
        Some("csv") | Some("txt") => read_csv_table(path)?,
        Some("xlsx") | Some("xlsm") => read_excel_table(path, worksheet)?,
        _ => return UnsupportedFileSnafu { path }.fail(),
    };
    info!(
        "read_table: {}: {} rows, {} columns",
        simplify_file_name(path),
        table.len(),
        table.columns.len()
    );
    Ok(table)
}

fn is_qualtrics_metadata(record: &Record) -> bool {
    record.columns().any(|c| match record.get(c) {
        Some(Value::Text(s)) => s.contains("ImportId"),
        _ => false,
    })
}

/// Qualtrics exports carry two extra rows under the header: the question texts and
/// the import ids. They are dropped when one of them mentions `ImportId`.
pub fn strip_qualtrics_metadata(table: Table) -> Table {
    let is_export = table.records.iter().take(2).any(is_qualtrics_metadata);
    if !is_export {
        return table;
    }
    debug!("strip_qualtrics_metadata: dropping the two metadata rows");
    Table::new(
        table.columns,
        table.records.into_iter().skip(2).collect(),
    )
}

/// Attaches the categories of a coding table to the survey respondents.
///
/// The coding table has one row per (respondent, category) pair. Every column other
/// than the key becomes a set-valued column of the survey. Columns the survey already
/// has are left alone.
pub fn merge_coding(survey: Table, coding: &Table, key: &str) -> NpsResult<Table> {
    let survey_key = survey
        .find_column(key)
        .cloned()
        .context(MissingColumnSnafu {
            column: key,
            table: "survey",
        })?;
    let coding_key = coding
        .find_column(key)
        .cloned()
        .context(MissingColumnSnafu {
            column: key,
            table: "coding",
        })?;
    let merged_columns: Vec<String> = coding
        .columns
        .iter()
        .filter(|c| **c != coding_key && !survey.has_column(c))
        .cloned()
        .collect();
    if merged_columns.is_empty() {
        warn!("merge_coding: no new column in the coding table");
        return Ok(survey);
    }

    // respondent -> column -> categories
    let mut codes: BTreeMap<String, BTreeMap<String, BTreeSet<String>>> = BTreeMap::new();
    for r in coding.records.iter() {
        let id = match r.get(&coding_key).and_then(|v| v.label()) {
            Some(id) => id,
            None => continue,
        };
        let entry = codes.entry(id).or_default();
        for c in merged_columns.iter() {
            if let Some(v) = r.get(c) {
                entry.entry(c.clone()).or_default().extend(v.categories());
            }
        }
    }

    let mut matched = 0;
    let mut columns = survey.columns;
    columns.extend(merged_columns.iter().cloned());
    let mut records = survey.records;
    for r in records.iter_mut() {
        let id = match r.get(&survey_key).and_then(|v| v.label()) {
            Some(id) => id,
            None => continue,
        };
        if let Some(per_column) = codes.remove(&id) {
            matched += 1;
            for (c, tags) in per_column.into_iter() {
                r.insert(&c, Value::Tags(tags));
            }
        }
    }
    if !codes.is_empty() {
        warn!(
            "merge_coding: {} coded respondents are not in the survey",
            codes.len()
        );
    }
    info!(
        "merge_coding: merged {:?} for {} respondents",
        merged_columns, matched
    );
    Ok(Table::new(columns, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualtrics_rows_are_dropped() {
        let mut b = Builder::new(&["ResponseId", "Q1_1"]);
        b.add_row(&["Response ID", "How likely are you to recommend us?"]).unwrap();
        b.add_row(&[r#"{"ImportId":"_recordId"}"#, r#"{"ImportId":"QID1_1"}"#])
            .unwrap();
        b.add_row(&["R_1", "9"]).unwrap();
        let t = strip_qualtrics_metadata(b.build());
        assert_eq!(t.len(), 1);
        assert_eq!(t.records[0].get("Q1_1"), Some(&Value::Text("9".to_string())));

        let mut plain = Builder::new(&["Q1_1"]);
        plain.add_row(&["9"]).unwrap();
        plain.add_row(&["10"]).unwrap();
        assert_eq!(strip_qualtrics_metadata(plain.build()).len(), 2);
    }

    #[test]
    fn coding_becomes_category_sets() {
        let mut s = Builder::new(&["ResponseId", "Q1_1"]);
        s.add_row(&["R_1", "9"]).unwrap();
        s.add_row(&["R_2", "3"]).unwrap();
        let mut c = Builder::new(&["responseid", "category", "Q1_1"]);
        c.add_row(&["R_1", "Price", "0"]).unwrap();
        c.add_row(&["R_1", "Delivery", ""]).unwrap();
        c.add_row(&["R_1", "Price", ""]).unwrap();
        c.add_row(&["R_9", "Menu", ""]).unwrap();
        let t = merge_coding(s.build(), &c.build(), "ResponseId").unwrap();
        assert_eq!(t.columns, vec!["ResponseId", "Q1_1", "category"]);
        let cats = t.records[0].get("category").unwrap().categories();
        assert_eq!(cats.into_iter().collect::<Vec<String>>(), vec!["Delivery", "Price"]);
        assert_eq!(t.records[0].get("Q1_1"), Some(&Value::Text("9".to_string())));
        assert_eq!(t.records[1].get("category"), None);
    }

    #[test]
    fn coding_needs_the_key() {
        let s = Builder::new(&["ResponseId"]).build();
        let c = Builder::new(&["id", "category"]).build();
        assert!(merge_coding(s, &c, "ResponseId").is_err());
    }

    #[test]
    fn file_names() {
        assert_eq!(simplify_file_name("/data/survey.csv"), "survey.csv");
        assert!(matches!(
            read_table("survey.sav", None),
            Err(NpsError::UnsupportedFile { .. })
        ));
    }
}

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;

/// The demographic segment of a record: the values of the chosen columns, in order.
///
/// The label (the values joined with `_`) is used both as a lookup key and as
/// user-facing text, so it only depends on the values.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Ord, PartialOrd)]
pub struct SegmentKey {
    parts: Vec<(String, String)>,
}

impl SegmentKey {
    pub(crate) fn from_parts(parts: Vec<(String, String)>) -> SegmentKey {
        SegmentKey { parts }
    }

    pub fn parts(&self) -> &[(String, String)] {
        &self.parts
    }

    pub fn label(&self) -> String {
        self.parts
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<&str>>()
            .join("_")
    }

    /// Restricts the key to some of its columns, in the order given.
    /// Returns None if one of the columns is not part of this key.
    pub fn project(&self, columns: &[String]) -> Option<SegmentKey> {
        let mut parts: Vec<(String, String)> = Vec::new();
        for c in columns.iter() {
            let (col, v) = self.parts.iter().find(|(col, _)| col == c)?;
            parts.push((col.clone(), v.clone()));
        }
        Some(SegmentKey { parts })
    }
}

/// The segment of a record. None if any of the columns is missing on the record.
pub fn resolve(record: &Record, columns: &[String]) -> Option<SegmentKey> {
    let mut parts: Vec<(String, String)> = Vec::with_capacity(columns.len());
    for c in columns.iter() {
        let v = record.get(c)?.label()?;
        parts.push((c.clone(), v));
    }
    Some(SegmentKey { parts })
}

pub fn resolve_label(record: &Record, columns: &[String]) -> Option<String> {
    resolve(record, columns).map(|k| k.label())
}

pub(crate) fn check_columns<'a>(
    table: &Table,
    kind: TableKind,
    columns: impl IntoIterator<Item = &'a String>,
) -> Result<(), AnalysisErrors> {
    for c in columns {
        if !table.has_column(c) {
            return Err(AnalysisErrors::UnknownColumn {
                column: c.clone(),
                table: kind,
            });
        }
    }
    Ok(())
}

/// Target proportions derived from the population table.
///
/// Each population row adds the value of `target_column` to its segment (or 1 if no
/// column is given). The result is sorted by label. Column names are matched without
/// regard to case. If the population table does not have all the segment columns,
/// no target can be derived and the result is empty.
pub fn population_targets(
    population: &Table,
    columns: &[String],
    target_column: Option<&str>,
) -> Result<Vec<(String, f64)>, AnalysisErrors> {
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let mut pop_columns: Vec<String> = Vec::new();
    for c in columns.iter() {
        match population.find_column(c) {
            Some(pc) => pop_columns.push(pc.clone()),
            None => {
                warn!(
                    "population_targets: column {:?} missing in the population data, available: {:?}",
                    c, population.columns
                );
                return Ok(Vec::new());
            }
        }
    }
    let weight_column: Option<&String> = match target_column {
        Some(tc) => Some(population.find_column(tc).ok_or_else(|| {
            AnalysisErrors::UnknownColumn {
                column: tc.to_string(),
                table: TableKind::Population,
            }
        })?),
        None => None,
    };
    debug!(
        "population_targets: columns: {:?} weight column: {:?}",
        pop_columns, weight_column
    );

    let mut sums: BTreeMap<String, f64> = BTreeMap::new();
    for (idx, r) in population.records.iter().enumerate() {
        let label = match resolve_label(r, &pop_columns) {
            Some(l) => l,
            None => {
                debug!("population_targets: row {} has no segment, skipping", idx + 1);
                continue;
            }
        };
        let amount = match weight_column {
            // Non-numeric weights count for nothing.
            Some(wc) => r.get(wc).and_then(|v| v.as_number()).unwrap_or(0.0),
            None => 1.0,
        };
        *sums.entry(label).or_insert(0.0) += amount;
    }

    let total: f64 = sums.values().sum();
    if total <= 0.0 {
        warn!("population_targets: total population weight is {}", total);
        return Ok(Vec::new());
    }
    Ok(sums.into_iter().map(|(l, s)| (l, s / total)).collect())
}

/// The segments present in the survey for the given columns, with the targets
/// suggested by the population table if there is one.
pub fn preview_segments(
    dataset: &Dataset,
    segment_columns: &[String],
    target_column: Option<&str>,
) -> Result<SegmentPreview, AnalysisErrors> {
    check_columns(&dataset.survey, TableKind::Survey, segment_columns)?;
    if segment_columns.is_empty() {
        return Ok(SegmentPreview::default());
    }

    let segments: BTreeSet<String> = dataset
        .survey
        .records
        .iter()
        .filter_map(|r| resolve_label(r, segment_columns))
        .collect();

    let suggested_targets = match &dataset.population {
        Some(pop) => population_targets(pop, segment_columns, target_column)?,
        None => Vec::new(),
    };
    info!(
        "preview_segments: {} segments, {} suggested targets for {:?}",
        segments.len(),
        suggested_targets.len(),
        segment_columns
    );

    Ok(SegmentPreview {
        segments: segments.into_iter().collect(),
        suggested_targets,
    })
}

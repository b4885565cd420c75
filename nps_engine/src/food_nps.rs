use log::{debug, info, warn};
use std::collections::BTreeMap;

use crate::config::*;
use crate::metrics::{nps_outcome, parse_score};
use crate::response_rates::tally_segment;
use crate::segments::{check_columns, resolve, SegmentKey};

/// One canonical segment of the population table.
struct PopulationSegment {
    key: SegmentKey,
    weight: f64,
}

/// A respondent that has a valid score and a matching population segment.
struct Matched<'a> {
    record: &'a Record,
    score: u8,
    label: String,
}

/// The population column for each key column of the survey.
fn population_columns(
    population: &Table,
    columns: &[String],
) -> Result<Vec<String>, AnalysisErrors> {
    columns
        .iter()
        .map(|c| {
            population
                .find_column(c)
                .cloned()
                .ok_or_else(|| AnalysisErrors::UnknownColumn {
                    column: c.clone(),
                    table: TableKind::Population,
                })
        })
        .collect()
}

/// Reads the population weights, keyed by segment label. The keys use the survey
/// column names so that they can be compared with the survey segments.
fn read_population(
    population: &Table,
    key_columns: &[String],
    pop_columns: &[String],
    weight_column: &str,
) -> Result<BTreeMap<String, PopulationSegment>, AnalysisErrors> {
    let mut res: BTreeMap<String, PopulationSegment> = BTreeMap::new();
    for (idx, r) in population.records.iter().enumerate() {
        let weight = r
            .get(weight_column)
            .and_then(|v| v.as_number())
            .ok_or_else(|| AnalysisErrors::InvalidPopulationWeight {
                row: idx + 1,
                column: weight_column.to_string(),
            })?;
        let key = match resolve(r, pop_columns) {
            Some(k) => k,
            None => {
                debug!("read_population: row {} has no segment, skipping", idx + 1);
                continue;
            }
        };
        let label = key.label();
        match res.get_mut(&label) {
            Some(seg) => {
                warn!(
                    "read_population: duplicate segment {:?} at row {}, summing the weights",
                    label,
                    idx + 1
                );
                seg.weight += weight;
            }
            None => {
                // Same values, survey column names.
                let renamed = key.parts().iter().map(|(_, v)| v.clone());
                let parts: Vec<(String, String)> =
                    key_columns.iter().cloned().zip(renamed).collect();
                let key = SegmentKey::from_parts(parts);
                res.insert(label, PopulationSegment { key, weight });
            }
        }
    }
    Ok(res)
}

fn rank_categories(rows: &[(&Record, f64)], column: &str) -> Vec<RankedCategory> {
    let tally = tally_segment(rows, column);
    let mut res: Vec<RankedCategory> = tally
        .category_stats
        .into_iter()
        .map(|c| RankedCategory {
            category: c.category,
            respondents: c.respondents,
            weight: c.count,
            response_rate: if tally.total_count > 0.0 {
                c.count / tally.total_count * 100.0
            } else {
                0.0
            },
        })
        .collect();
    res.sort_by(|a, b| {
        b.response_rate
            .partial_cmp(&a.response_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });
    res
}

/// Weighted NPS against a table of canonical population segments.
///
/// Every respondent gets the weight of its population segment. Respondents
/// without a valid score, or whose segment is not in the population table, are
/// counted and left out.
pub fn food_nps_analyze(
    dataset: &Dataset,
    config: &FoodNpsConfig,
) -> Result<FoodNpsResult, AnalysisErrors> {
    let population = dataset
        .population
        .as_ref()
        .ok_or(AnalysisErrors::MissingPopulation)?;
    let survey = &dataset.survey;
    check_columns(survey, TableKind::Survey, [&config.nps_column])?;
    check_columns(survey, TableKind::Survey, config.segment_columns.iter())?;

    let mut key_columns = config.segment_columns.clone();
    for c in config.optional_segment_columns.iter() {
        if survey.has_column(c) && population.find_column(c).is_some() {
            key_columns.push(c.clone());
        }
    }
    let pop_columns = population_columns(population, &key_columns)?;
    let weight_column = population
        .find_column(&config.weight_column)
        .ok_or_else(|| AnalysisErrors::UnknownColumn {
            column: config.weight_column.clone(),
            table: TableKind::Population,
        })?;
    info!(
        "food_nps_analyze: {} records, {} population rows, key columns: {:?}",
        survey.len(),
        population.len(),
        key_columns
    );

    let segments = read_population(population, &key_columns, &pop_columns, weight_column)?;
    debug!("food_nps_analyze: {} population segments", segments.len());

    let mut invalid_score_count = 0;
    let mut unmatched_count = 0;
    let mut matched: Vec<Matched> = Vec::new();
    for r in survey.records.iter() {
        let score = match r.get(&config.nps_column).and_then(parse_score) {
            Some(s) => s,
            None => {
                invalid_score_count += 1;
                continue;
            }
        };
        match resolve(r, &key_columns).map(|k| k.label()) {
            Some(label) if segments.contains_key(&label) => matched.push(Matched {
                record: r,
                score,
                label,
            }),
            _ => unmatched_count += 1,
        }
    }
    if unmatched_count > 0 {
        warn!(
            "food_nps_analyze: {} respondents have no population segment",
            unmatched_count
        );
    }

    let mut respondents: BTreeMap<&str, usize> = BTreeMap::new();
    for m in matched.iter() {
        *respondents.entry(m.label.as_str()).or_insert(0) += 1;
    }
    let segment_weight = |label: &str| -> f64 {
        segments.get(label).map(|s| s.weight).unwrap_or(0.0)
    };
    let record_weight = |label: &str| -> f64 {
        let w = segment_weight(label);
        match respondents.get(label) {
            Some(n) if config.split_across_respondents => w / (*n as f64),
            _ => w,
        }
    };

    let samples: Vec<(u8, f64)> = matched
        .iter()
        .map(|m| (m.score, record_weight(m.label.as_str())))
        .collect();
    let nps = nps_outcome(&samples);

    let total_responses = matched.len();
    let matched_weight: f64 = respondents.keys().map(|l| segment_weight(*l)).sum();
    let scale_factor = if total_responses > 0 {
        Some(matched_weight / (total_responses as f64))
    } else {
        None
    };

    let mut demographic_breakdown: Vec<FoodSegmentRow> = respondents
        .iter()
        .filter_map(|(label, count)| {
            let seg = segments.get(*label)?;
            let seg_samples: Vec<(u8, f64)> = matched
                .iter()
                .filter(|m| m.label == *label)
                .map(|m| (m.score, record_weight(m.label.as_str())))
                .collect();
            Some(FoodSegmentRow {
                dimensions: seg.key.parts().to_vec(),
                label: label.to_string(),
                nps: nps_outcome(&seg_samples),
                respondents: *count,
                weight: seg.weight,
            })
        })
        .collect();
    demographic_breakdown.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.label.cmp(&b.label))
    });

    let category_analysis = match &config.category_column {
        Some(c) if survey.has_column(c) => NpsBucket::ALL
            .iter()
            .map(|bucket| {
                let rows: Vec<(&Record, f64)> = matched
                    .iter()
                    .filter(|m| NpsBucket::from_score(m.score) == *bucket)
                    .map(|m| (m.record, record_weight(m.label.as_str())))
                    .collect();
                (*bucket, rank_categories(&rows, c))
            })
            .collect(),
        Some(c) => {
            debug!("food_nps_analyze: no category column {:?} in the survey", c);
            Vec::new()
        }
        None => Vec::new(),
    };

    info!(
        "food_nps_analyze: {} matched, {} unmatched, {} invalid scores, score: {:?}",
        total_responses,
        unmatched_count,
        invalid_score_count,
        nps.score()
    );
    Ok(FoodNpsResult {
        nps,
        total_responses,
        scale_factor,
        demographic_breakdown,
        category_analysis,
        unmatched_count,
        invalid_score_count,
    })
}

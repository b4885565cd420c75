use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::*;
use crate::metrics::parse_score;
use crate::segments::check_columns;
use crate::weights::apply_weighting;

pub const MAX_OPEN_END_COLUMNS: usize = 3;

pub const OVERALL: &str = "Overall";
pub const PROMOTERS: &str = "Promoters (9-10)";
pub const PASSIVES: &str = "Passives (7-8)";
pub const DETRACTORS: &str = "Detractors (0-6)";
pub const AT_RISK: &str = "At-Risk (0-3)";

/// The segments a respondent belongs to, besides `Overall`.
fn score_segments(score: u8) -> Vec<&'static str> {
    let mut res = vec![match NpsBucket::from_score(score) {
        NpsBucket::Promoter => PROMOTERS,
        NpsBucket::Passive => PASSIVES,
        NpsBucket::Detractor => DETRACTORS,
    }];
    if score <= 3 {
        res.push(AT_RISK);
    }
    res
}

#[derive(Default)]
struct CategoryTally {
    respondents: usize,
    count: f64,
}

/// Response rate and category distribution of one column over a set of records.
///
/// The category percentages are computed over the responders (the records with at
/// least one category), not over the whole segment. A record with several
/// categories counts once in each of them.
pub fn tally_segment(rows: &[(&Record, f64)], column: &str) -> SegmentResponse {
    let mut total_count = 0.0;
    let mut responders = 0.0;
    let mut tallies: BTreeMap<String, CategoryTally> = BTreeMap::new();
    for (r, w) in rows.iter() {
        total_count += *w;
        let categories: BTreeSet<String> =
            r.get(column).map(|v| v.categories()).unwrap_or_default();
        if categories.is_empty() {
            continue;
        }
        responders += *w;
        for c in categories.into_iter() {
            let t = tallies.entry(c).or_default();
            t.respondents += 1;
            t.count += *w;
        }
    }

    let mut category_stats: Vec<CategoryStat> = tallies
        .into_iter()
        .map(|(category, t)| CategoryStat {
            category,
            respondents: t.respondents,
            count: t.count,
            percentage: if responders > 0.0 {
                t.count / responders * 100.0
            } else {
                0.0
            },
        })
        .collect();
    category_stats.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });

    SegmentResponse {
        total_count,
        respondents: rows.len(),
        responders,
        response_rate: if total_count > 0.0 {
            responders / total_count * 100.0
        } else {
            0.0
        },
        category_stats,
    }
}

/// Response rates of the open-ended columns, overall and per NPS segment.
///
/// Without a NPS column, only the `Overall` segment is reported. Records without a
/// valid score only count in `Overall`.
pub fn analyze_response_rates(
    dataset: &Dataset,
    request: &ResponseRateRequest,
) -> Result<ResponseRateResult, AnalysisErrors> {
    let open_ends: Vec<&String> = request
        .open_end_columns
        .iter()
        .filter(|c| !c.trim().is_empty())
        .collect();
    if open_ends.len() > MAX_OPEN_END_COLUMNS {
        return Err(AnalysisErrors::TooManyOpenEndColumns(open_ends.len()));
    }
    let survey = &dataset.survey;
    check_columns(survey, TableKind::Survey, open_ends.iter().cloned())?;
    check_columns(survey, TableKind::Survey, request.nps_column.iter())?;
    if let Some(w) = &request.weighting {
        check_columns(survey, TableKind::Survey, w.segment_columns.iter())?;
    }
    info!(
        "analyze_response_rates: {} records, columns: {:?}, nps column: {:?}",
        survey.len(),
        open_ends,
        request.nps_column
    );

    let records: Vec<&Record> = survey.records.iter().collect();
    let weights = apply_weighting(&records, request.weighting.as_ref())?;
    let rows = weights.apply(&records);

    let mut segments: Vec<(&'static str, Vec<(&Record, f64)>)> = vec![(OVERALL, rows.clone())];
    if let Some(nps_column) = &request.nps_column {
        for name in [PROMOTERS, PASSIVES, DETRACTORS, AT_RISK] {
            segments.push((name, Vec::new()));
        }
        for (r, w) in rows.iter() {
            if let Some(score) = r.get(nps_column).and_then(parse_score) {
                for name in score_segments(score) {
                    if let Some((_, members)) = segments.iter_mut().find(|(n, _)| *n == name) {
                        members.push((*r, *w));
                    }
                }
            }
        }
    }
    debug!(
        "analyze_response_rates: segment sizes: {:?}",
        segments
            .iter()
            .map(|(n, m)| (*n, m.len()))
            .collect::<Vec<(&str, usize)>>()
    );

    let response_rates = open_ends
        .iter()
        .map(|col| {
            let per_segment = segments
                .iter()
                .map(|(name, members)| (name.to_string(), tally_segment(members, col)))
                .collect();
            (col.to_string(), per_segment)
        })
        .collect();

    Ok(ResponseRateResult {
        response_rates,
        excluded_count: weights.excluded_count,
    })
}

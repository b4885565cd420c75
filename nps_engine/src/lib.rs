mod config;
mod food_nps;
mod metrics;
mod response_rates;
mod segments;
mod weights;

pub mod builder;
pub mod manual;
pub mod quick_start;

use log::{debug, info};
use std::collections::BTreeMap;

pub use crate::config::*;
pub use crate::food_nps::food_nps_analyze;
pub use crate::metrics::{nps_outcome, parse_score, scale_point, top_box_percent};
pub use crate::response_rates::{
    analyze_response_rates, AT_RISK, DETRACTORS, MAX_OPEN_END_COLUMNS, OVERALL, PASSIVES,
    PROMOTERS,
};
pub use crate::segments::{population_targets, preview_segments, resolve, SegmentKey};
pub use crate::weights::{default_group_weighting_columns, segment_multipliers};

use crate::metrics::{score_samples, top_box_all};
use crate::segments::check_columns;
use crate::weights::{apply_weighting, compute_weights, group_targets, RecordWeights};

fn check_request(survey: &Table, request: &AnalysisRequest) -> Result<(), AnalysisErrors> {
    check_columns(survey, TableKind::Survey, [&request.nps_column])?;
    check_columns(survey, TableKind::Survey, request.top_box_columns.iter())?;
    check_columns(survey, TableKind::Survey, request.group_by_columns.iter())?;
    if let Some(w) = &request.weighting {
        check_columns(survey, TableKind::Survey, w.segment_columns.iter())?;
    }
    if let Some(cols) = &request.group_weighting_columns {
        check_columns(survey, TableKind::Survey, cols.iter())?;
    }
    Ok(())
}

/// Computes the weighted NPS and the top-box percentages of a survey, overall and
/// for each value of the group-by columns.
///
/// Arguments:
/// * `dataset` the survey data, and optionally the population data. The population
/// table is only used to find the targets of the weighting inside the groups.
/// * `request` the columns to analyze and the weighting to apply
///
/// All the columns of the request must exist in the survey, otherwise the request
/// is rejected before any computation.
pub fn analyze(
    dataset: &Dataset,
    request: &AnalysisRequest,
) -> Result<AnalysisResult, AnalysisErrors> {
    let survey = &dataset.survey;
    check_request(survey, request)?;
    info!(
        "analyze: Processing {} records, nps column: {:?}, group by: {:?}",
        survey.len(),
        request.nps_column,
        request.group_by_columns
    );

    let records: Vec<&Record> = survey.records.iter().collect();
    let weights = apply_weighting(&records, request.weighting.as_ref())?;
    let rows = weights.apply(&records);
    let nps = nps_outcome(&score_samples(&rows, &request.nps_column));
    let top_box_3_percent = top_box_all(&rows, &request.top_box_columns, request.top_box_scale);
    info!(
        "analyze: {} included, {} excluded, score: {:?}",
        rows.len(),
        weights.excluded_count,
        nps.score()
    );

    let segmented_results = if request.group_by_columns.is_empty() {
        Vec::new()
    } else {
        let included: Vec<&Record> = rows.iter().map(|(r, _)| *r).collect();
        segmented(dataset, request, &included)?
    };

    Ok(AnalysisResult {
        nps,
        top_box_3_percent,
        segmented_results,
        excluded_count: weights.excluded_count,
        weighted: weights.weighted,
        weights: weights.segments,
    })
}

// The groups only contain the records kept by the overall weighting. Records dropped
// by the weighting of a group are not counted as excluded.
fn segmented(
    dataset: &Dataset,
    request: &AnalysisRequest,
    included: &[&Record],
) -> Result<Vec<(String, Vec<(String, GroupResult)>)>, AnalysisErrors> {
    let weighting = request.weighting.as_ref();
    let group_columns: Vec<String> = match &request.group_weighting_columns {
        Some(cols) => cols.clone(),
        None => default_group_weighting_columns(
            weighting
                .map(|w| w.segment_columns.as_slice())
                .unwrap_or_default(),
            &request.group_by_columns,
        ),
    };
    let targets = if group_columns.is_empty() {
        None
    } else {
        group_targets(&group_columns, weighting, dataset.population.as_ref(), included)?
    };
    let normalize = weighting.map(|w| w.normalize).unwrap_or(false);
    match &targets {
        Some(t) => debug!(
            "segmented: weighting groups by {:?} with {} targets",
            group_columns,
            t.len()
        ),
        None => debug!("segmented: groups are not weighted"),
    }

    let mut res = Vec::new();
    for group_by in request.group_by_columns.iter() {
        let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
        for r in included.iter() {
            if let Some(label) = r.get(group_by).and_then(|v| v.label()) {
                groups.entry(label).or_default().push(*r);
            }
        }
        let mut group_results: Vec<(String, GroupResult)> = Vec::new();
        for (label, members) in groups.into_iter() {
            let gw = match &targets {
                Some(t) => compute_weights(&members, &group_columns, t, normalize)?,
                None => RecordWeights::uniform(members.len()),
            };
            let rows = gw.apply(&members);
            let nps = nps_outcome(&score_samples(&rows, &request.nps_column));
            debug!(
                "segmented: {}={:?}: {} records, score: {:?}",
                group_by,
                label,
                rows.len(),
                nps.score()
            );
            let top_box_3_percent =
                top_box_all(&rows, &request.top_box_columns, request.top_box_scale);
            group_results.push((
                label,
                GroupResult {
                    nps,
                    top_box_3_percent,
                },
            ));
        }
        res.push((group_by.clone(), group_results));
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn survey(rows: &[(&str, &str, &str)]) -> Dataset {
        let mut b = Builder::new(&["gender", "age", "nps"]);
        for &(g, a, s) in rows.iter() {
            b.add_row(&[g, a, s]).unwrap();
        }
        b.dataset()
    }

    #[test]
    fn unweighted_analysis() {
        init();
        let ds = survey(&[("M", "y", "10"), ("F", "y", "6"), ("F", "o", "x"), ("M", "o", "")]);
        let res = analyze(&ds, &AnalysisRequest::new("nps")).unwrap();
        assert!(!res.weighted);
        assert_eq!(res.excluded_count, 0);
        assert_eq!(res.nps.respondents(), 2);
        assert_eq!(res.nps.score(), Some(0.0));
        assert!(res.weights.is_empty());

        let empty_weighting = AnalysisRequest {
            weighting: Some(WeightingConfig::new(&[], &[])),
            ..AnalysisRequest::new("nps")
        };
        assert!(!analyze(&ds, &empty_weighting).unwrap().weighted);
    }

    #[test]
    fn segments_without_target_are_excluded() {
        init();
        let mut rows = vec![("M", "y", "10"), ("M", "y", "10"), ("F", "y", "0"), ("F", "y", "0")];
        let request = AnalysisRequest {
            group_by_columns: vec!["gender".to_string()],
            weighting: Some(WeightingConfig::new(&["gender"], &[("M", 0.5), ("F", 0.5)])),
            ..AnalysisRequest::new("nps")
        };
        let base = analyze(&survey(&rows), &request).unwrap();
        assert_eq!(base.excluded_count, 0);

        rows.extend([("X", "y", "10"), ("X", "o", "10"), ("X", "o", "9")]);
        let res = analyze(&survey(&rows), &request).unwrap();
        assert!(res.weighted);
        assert_eq!(res.excluded_count, base.excluded_count + 3);
        let s = res.nps.summary().unwrap();
        assert_eq!(s.respondents, 4);
        assert!(s.score.abs() < 1e-9);
        let groups: Vec<&str> = res.segmented_results[0]
            .1
            .iter()
            .map(|(l, _)| l.as_str())
            .collect();
        assert_eq!(groups, vec!["F", "M"]);
        let x = res.weights.iter().find(|w| w.label == "X").unwrap();
        assert_eq!(x.weight, None);
    }

    #[test]
    fn raising_a_target_moves_the_score_towards_the_segment() {
        init();
        let ds = survey(&[("A", "y", "10"), ("A", "y", "10"), ("A", "y", "10"), ("B", "y", "0")]);
        let mut last = -100.0;
        for t in [0.2, 0.4, 0.6, 0.8] {
            let request = AnalysisRequest {
                weighting: Some(WeightingConfig::new(&["gender"], &[("A", t), ("B", 1.0 - t)])),
                ..AnalysisRequest::new("nps")
            };
            let score = analyze(&ds, &request).unwrap().nps.score().unwrap();
            assert!(score > last);
            assert!(score <= 100.0);
            last = score;
        }
    }

    fn two_by_two() -> Dataset {
        survey(&[
            ("M", "young", "10"),
            ("M", "old", "0"),
            ("M", "old", "0"),
            ("M", "old", "0"),
            ("F", "young", "0"),
            ("F", "young", "0"),
            ("F", "old", "10"),
            ("F", "old", "10"),
        ])
    }

    fn quarter_targets() -> WeightingConfig {
        WeightingConfig::new(
            &["gender", "age"],
            &[
                ("M_young", 0.25),
                ("M_old", 0.25),
                ("F_young", 0.25),
                ("F_old", 0.25),
            ],
        )
    }

    #[test]
    fn groups_are_weighted_on_the_other_columns_by_default() {
        init();
        let request = AnalysisRequest {
            group_by_columns: vec!["gender".to_string()],
            weighting: Some(quarter_targets()),
            ..AnalysisRequest::new("nps")
        };
        let res = analyze(&two_by_two(), &request).unwrap();
        assert!(res.nps.score().unwrap().abs() < 1e-9);
        let (col, groups) = &res.segmented_results[0];
        assert_eq!(col, "gender");
        let (label, male) = &groups[1];
        assert_eq!(label, "M");
        // young and old both weigh half of the group.
        assert!(male.nps.score().unwrap().abs() < 1e-9);
        assert_eq!(male.nps.respondents(), 4);
    }

    #[test]
    fn explicit_empty_group_weighting_means_unweighted_groups() {
        init();
        let request = AnalysisRequest {
            group_by_columns: vec!["gender".to_string()],
            group_weighting_columns: Some(vec![]),
            weighting: Some(quarter_targets()),
            ..AnalysisRequest::new("nps")
        };
        let res = analyze(&two_by_two(), &request).unwrap();
        let male = &res.segmented_results[0].1[1].1;
        assert_eq!(male.nps.score(), Some(-50.0));
    }

    #[test]
    fn group_targets_come_from_the_population() {
        init();
        let mut pop = Builder::new(&["Age", "count"]);
        pop.add_row(&["young", "3"]).unwrap();
        pop.add_row(&["old", "1"]).unwrap();
        let ds = two_by_two().with_population(pop.build());
        let request = AnalysisRequest {
            group_by_columns: vec!["gender".to_string()],
            weighting: Some(WeightingConfig {
                target_column: Some("count".to_string()),
                ..quarter_targets()
            }),
            ..AnalysisRequest::new("nps")
        };
        let res = analyze(&ds, &request).unwrap();
        let male = &res.segmented_results[0].1[1].1;
        // young: 0.75 of the weight, all promoters.
        assert!((male.nps.score().unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn top_box_per_group() {
        init();
        let mut b = Builder::new(&["nps", "store", "q11"]);
        b.add_row(&["9", "A", "7 - Extremely satisfied"]).unwrap();
        b.add_row(&["9", "A", "2"]).unwrap();
        b.add_row(&["3", "B", ""]).unwrap();
        let request = AnalysisRequest {
            top_box_columns: vec!["q11".to_string()],
            group_by_columns: vec!["store".to_string()],
            ..AnalysisRequest::new("nps")
        };
        let res = analyze(&b.dataset(), &request).unwrap();
        assert_eq!(res.top_box_3_percent, vec![("q11".to_string(), Some(50.0))]);
        let groups = &res.segmented_results[0].1;
        assert_eq!(groups[0].1.top_box_3_percent[0].1, Some(50.0));
        assert_eq!(groups[1].1.top_box_3_percent[0].1, None);
        assert_eq!(groups[1].1.nps.score(), Some(-100.0));
    }

    #[test]
    fn unknown_columns_are_rejected() {
        init();
        let request = AnalysisRequest {
            group_by_columns: vec!["region".to_string()],
            ..AnalysisRequest::new("nps")
        };
        assert_eq!(
            analyze(&two_by_two(), &request),
            Err(AnalysisErrors::UnknownColumn {
                column: "region".to_string(),
                table: TableKind::Survey
            })
        );
        assert!(analyze(&two_by_two(), &AnalysisRequest::new("Q1_1")).is_err());
    }
}

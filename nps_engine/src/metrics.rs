use log::debug;
use regex::Regex;
use std::sync::OnceLock;

use crate::config::*;

/// A NPS answer: an integer between 0 and 10. Anything else is not a score.
pub fn parse_score(value: &Value) -> Option<u8> {
    let x = value.as_number()?;
    if x.fract() == 0.0 && (0.0..=10.0).contains(&x) {
        Some(x as u8)
    } else {
        None
    }
}

/// The valid scores of a column, with the weight of their record.
pub(crate) fn score_samples(rows: &[(&Record, f64)], column: &str) -> Vec<(u8, f64)> {
    rows.iter()
        .filter_map(|(r, w)| r.get(column).and_then(parse_score).map(|s| (s, *w)))
        .collect()
}

/// Weighted NPS of a set of scores.
///
/// The score is computed from the breakdown, so that it is always exactly
/// `promoters - detractors`.
pub fn nps_outcome(samples: &[(u8, f64)]) -> NpsOutcome {
    if samples.is_empty() {
        return NpsOutcome::NoRespondents;
    }
    let mut counts = [0usize; 11];
    let mut weights = [0.0f64; 11];
    for (score, w) in samples.iter() {
        let idx = (*score).min(10) as usize;
        counts[idx] += 1;
        weights[idx] += *w;
    }
    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        return NpsOutcome::ZeroWeight {
            respondents: samples.len(),
        };
    }

    let bucket_weight = |bucket: NpsBucket| -> f64 {
        weights
            .iter()
            .enumerate()
            .filter(|(score, _)| NpsBucket::from_score(*score as u8) == bucket)
            .map(|(_, w)| *w)
            .sum()
    };
    let breakdown = Breakdown {
        promoters: bucket_weight(NpsBucket::Promoter) / total_weight * 100.0,
        passives: bucket_weight(NpsBucket::Passive) / total_weight * 100.0,
        detractors: bucket_weight(NpsBucket::Detractor) / total_weight * 100.0,
    };
    let distribution: Vec<ScoreCount> = (0..=10u8)
        .map(|score| ScoreCount {
            score,
            respondents: counts[score as usize],
            count: weights[score as usize],
            percent: weights[score as usize] / total_weight * 100.0,
        })
        .collect();
    debug!(
        "nps_outcome: {} respondents, total weight {}, breakdown {:?}",
        samples.len(),
        total_weight,
        breakdown
    );

    NpsOutcome::Scored(NpsSummary {
        score: breakdown.promoters - breakdown.detractors,
        breakdown,
        distribution,
        respondents: samples.len(),
        total_weight,
    })
}

fn first_integer(s: &str) -> Option<f64> {
    static FIRST_INTEGER: OnceLock<Regex> = OnceLock::new();
    let re = FIRST_INTEGER.get_or_init(|| Regex::new(r"\d+").expect("static regex"));
    re.find(s)?.as_str().parse::<f64>().ok()
}

/// The position on a Likert scale. Labelled answers such as
/// `"7 - Extremely satisfied"` are read through their first integer.
pub fn scale_point(value: &Value) -> Option<f64> {
    match value {
        Value::Text(s) => value.as_number().or_else(|| first_integer(s)),
        _ => value.as_number(),
    }
}

/// Weighted percentage of the records in the top boxes of the scale.
///
/// Only the records with a usable value in this column count in the denominator.
/// None if there is no such record, or if they all have a zero weight.
pub fn top_box_percent(rows: &[(&Record, f64)], column: &str, scale: TopBoxScale) -> Option<f64> {
    let threshold = scale.threshold();
    let mut total = 0.0;
    let mut top = 0.0;
    let mut seen = false;
    for (r, w) in rows.iter() {
        if let Some(x) = r.get(column).and_then(scale_point) {
            seen = true;
            total += *w;
            if x >= threshold {
                top += *w;
            }
        }
    }
    if !seen || total <= 0.0 {
        debug!("top_box_percent: no usable value in column {:?}", column);
        return None;
    }
    Some(top / total * 100.0)
}

pub(crate) fn top_box_all(
    rows: &[(&Record, f64)],
    columns: &[String],
    scale: TopBoxScale,
) -> Vec<(String, Option<f64>)> {
    columns
        .iter()
        .map(|c| (c.clone(), top_box_percent(rows, c, scale)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unweighted(scores: &[u8]) -> Vec<(u8, f64)> {
        scores.iter().map(|s| (*s, 1.0)).collect()
    }

    #[test]
    fn reference_example() {
        let outcome = nps_outcome(&unweighted(&[10, 9, 8, 7, 6, 5, 0, 0, 10, 9]));
        let s = outcome.summary().unwrap();
        assert_eq!(s.breakdown.promoters, 40.0);
        assert_eq!(s.breakdown.passives, 20.0);
        assert_eq!(s.breakdown.detractors, 40.0);
        assert_eq!(s.score, 0.0);
        assert_eq!(s.respondents, 10);
        assert_eq!(s.distribution[0].respondents, 2);
        assert_eq!(s.distribution[0].percent, 20.0);
        assert_eq!(s.distribution[1].respondents, 0);
    }

    #[test]
    fn unweighted_score_formula() {
        let scores = [10, 10, 9, 3, 7, 8, 6, 10, 2, 9, 9, 1, 4];
        let s = nps_outcome(&unweighted(&scores));
        let p = scores.iter().filter(|s| **s >= 9).count() as f64;
        let d = scores.iter().filter(|s| **s <= 6).count() as f64;
        let expected = 100.0 * (p - d) / (scores.len() as f64);
        assert!((s.score().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn breakdown_and_distribution_are_consistent() {
        let samples: Vec<(u8, f64)> = (0..57u32)
            .map(|i| ((i * 7 % 11) as u8, 0.3 + (i % 5) as f64 * 0.7))
            .collect();
        let s = nps_outcome(&samples);
        let s = s.summary().unwrap();
        let b = s.breakdown;
        assert!((b.promoters + b.passives + b.detractors - 100.0).abs() < 0.1);
        assert_eq!(s.score, b.promoters - b.detractors);
        let percents: f64 = s.distribution.iter().map(|d| d.percent).sum();
        assert!((percents - 100.0).abs() < 0.1);
        let respondents: usize = s.distribution.iter().map(|d| d.respondents).sum();
        assert_eq!(respondents, 57);
        assert!(s.score >= -100.0 && s.score <= 100.0);
    }

    #[test]
    fn empty_and_zero_weight_outcomes() {
        assert_eq!(nps_outcome(&[]), NpsOutcome::NoRespondents);
        assert_eq!(
            nps_outcome(&[(10, 0.0), (3, 0.0)]),
            NpsOutcome::ZeroWeight { respondents: 2 }
        );
        assert_eq!(NpsOutcome::NoRespondents.score(), None);
    }

    #[test]
    fn scores_outside_the_scale_are_ignored() {
        assert_eq!(parse_score(&Value::Number(10.0)), Some(10));
        assert_eq!(parse_score(&Value::Text(" 0 ".to_string())), Some(0));
        assert_eq!(parse_score(&Value::Number(11.0)), None);
        assert_eq!(parse_score(&Value::Number(-1.0)), None);
        assert_eq!(parse_score(&Value::Number(8.5)), None);
        assert_eq!(parse_score(&Value::Text("Very likely".to_string())), None);
    }

    #[test]
    fn likert_labels() {
        assert_eq!(scale_point(&Value::Text("7 - Extremely satisfied".to_string())), Some(7.0));
        assert_eq!(scale_point(&Value::Text("5".to_string())), Some(5.0));
        assert_eq!(scale_point(&Value::Number(2.0)), Some(2.0));
        assert_eq!(scale_point(&Value::Text("Don't know".to_string())), None);
    }

    #[test]
    fn top_box_uses_its_own_denominator() {
        let rs = vec![
            Record::new()
                .with("q", Value::Text("7 - Extremely satisfied".to_string()))
                .with("r", Value::Number(1.0)),
            Record::new().with("q", Value::Number(5.0)),
            Record::new().with("q", Value::Number(4.0)),
            Record::new().with("q", Value::Text("n/a".to_string())),
        ];
        let rows: Vec<(&Record, f64)> = rs.iter().map(|r| (r, 1.0)).collect();
        let q = top_box_percent(&rows, "q", TopBoxScale::default()).unwrap();
        assert!((q - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(top_box_percent(&rows, "r", TopBoxScale::default()), Some(0.0));
        assert_eq!(top_box_percent(&rows, "s", TopBoxScale::default()), None);

        let weighted: Vec<(&Record, f64)> = rs.iter().zip([1.0, 1.0, 2.0, 5.0]).collect();
        assert_eq!(top_box_percent(&weighted, "q", TopBoxScale::default()), Some(50.0));
    }
}

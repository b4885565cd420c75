use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};

use crate::config::*;
use crate::segments::{population_targets, resolve, resolve_label};

/// The weighting columns used inside the groups of a segmented analysis, when the
/// caller did not choose them: all the weighting columns except the ones being
/// grouped on. Weighting a group by the attribute that defines it would make every
/// group a single segment.
pub fn default_group_weighting_columns(
    weighting_columns: &[String],
    group_by_columns: &[String],
) -> Vec<String> {
    weighting_columns
        .iter()
        .filter(|c| !group_by_columns.contains(c))
        .cloned()
        .collect()
}

/// Computes the multiplier of each segment of the sample:
/// `target / (sample count / total sample count)`.
///
/// Segments without a target get no weight. The output is sorted by label.
pub fn segment_multipliers(
    sample_counts: &BTreeMap<String, usize>,
    targets: &HashMap<String, f64>,
) -> Vec<SegmentWeight> {
    let total: usize = sample_counts.values().sum();
    sample_counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(label, count)| {
            let sample_proportion = (*count as f64) / (total as f64);
            let target = targets.get(label).cloned();
            let weight = target.map(|t| t / sample_proportion);
            SegmentWeight {
                label: label.clone(),
                sample_count: *count,
                sample_proportion,
                target,
                weight,
                risk: weight.map(WeightRisk::from_weight),
            }
        })
        .collect()
}

/// The weights of a set of records, in the same order as the records.
/// A record with no weight is excluded.
#[derive(PartialEq, Debug, Clone)]
pub(crate) struct RecordWeights {
    pub weights: Vec<Option<f64>>,
    pub excluded_count: usize,
    pub weighted: bool,
    pub segments: Vec<SegmentWeight>,
}

impl RecordWeights {
    pub fn uniform(num_records: usize) -> RecordWeights {
        RecordWeights {
            weights: vec![Some(1.0); num_records],
            excluded_count: 0,
            weighted: false,
            segments: Vec::new(),
        }
    }

    /// The included records, paired with their weight.
    pub fn apply<'a>(&self, records: &[&'a Record]) -> Vec<(&'a Record, f64)> {
        records
            .iter()
            .zip(self.weights.iter())
            .filter_map(|(r, w)| w.map(|w| (*r, w)))
            .collect()
    }
}

fn check_targets(targets: &HashMap<String, f64>) -> Result<(), AnalysisErrors> {
    for (segment, target) in targets.iter() {
        if !target.is_finite() || *target < 0.0 {
            return Err(AnalysisErrors::InvalidTarget {
                segment: segment.clone(),
                target: *target,
            });
        }
    }
    Ok(())
}

/// Post-stratification weights of the records.
///
/// The sample proportions are computed over the records that have a segment.
/// Records with a missing segment value, or whose segment has no target, are
/// excluded and counted.
pub(crate) fn compute_weights(
    records: &[&Record],
    segment_columns: &[String],
    targets: &HashMap<String, f64>,
    normalize: bool,
) -> Result<RecordWeights, AnalysisErrors> {
    if segment_columns.is_empty() {
        return Ok(RecordWeights::uniform(records.len()));
    }
    check_targets(targets)?;

    let labels: Vec<Option<String>> = records
        .iter()
        .map(|r| resolve_label(r, segment_columns))
        .collect();
    let mut sample_counts: BTreeMap<String, usize> = BTreeMap::new();
    for l in labels.iter().flatten() {
        *sample_counts.entry(l.clone()).or_insert(0) += 1;
    }
    let unresolved = labels.iter().filter(|l| l.is_none()).count();
    debug!(
        "compute_weights: columns: {:?} sample segments: {:?} unresolved: {}",
        segment_columns, sample_counts, unresolved
    );

    let mut segments = segment_multipliers(&sample_counts, targets);
    let lookup: HashMap<String, Option<f64>> = segments
        .iter()
        .map(|s| (s.label.clone(), s.weight))
        .collect();

    let mut weights: Vec<Option<f64>> = labels
        .iter()
        .map(|l| l.as_ref().and_then(|l| lookup.get(l).cloned().flatten()))
        .collect();

    if normalize {
        let included: Vec<f64> = weights.iter().flatten().cloned().collect();
        let mean = included.iter().sum::<f64>() / (included.len().max(1) as f64);
        if mean > 0.0 {
            debug!("compute_weights: normalizing by mean weight {}", mean);
            for w in weights.iter_mut().flatten() {
                *w /= mean;
            }
            for s in segments.iter_mut() {
                s.weight = s.weight.map(|w| w / mean);
                s.risk = s.weight.map(WeightRisk::from_weight);
            }
        }
    }

    for s in segments.iter() {
        match (s.weight, s.risk) {
            (None, _) => {
                warn!(
                    "compute_weights: segment {:?} has no target, excluding {} records",
                    s.label, s.sample_count
                );
            }
            (Some(w), Some(risk)) if risk >= WeightRisk::Risk => {
                warn!(
                    "compute_weights: segment {:?} has a large weight {:.3} ({})",
                    s.label, w, risk
                );
            }
            _ => {}
        }
    }

    let excluded_count = weights.iter().filter(|w| w.is_none()).count();
    info!(
        "compute_weights: {} records, {} segments, {} excluded",
        records.len(),
        segments.len(),
        excluded_count
    );
    Ok(RecordWeights {
        weights,
        excluded_count,
        weighted: true,
        segments,
    })
}

/// Weights of the records for an optional weighting configuration.
pub(crate) fn apply_weighting(
    records: &[&Record],
    config: Option<&WeightingConfig>,
) -> Result<RecordWeights, AnalysisErrors> {
    match config {
        Some(c) if !c.is_unweighted() => {
            compute_weights(records, &c.segment_columns, &c.targets, c.normalize)
        }
        _ => Ok(RecordWeights::uniform(records.len())),
    }
}

/// The targets to use when weighting inside groups by `group_columns`.
///
/// In order of preference: the configured targets if the columns are the same, the
/// targets derived from the population table, and finally the configured targets
/// summed over the segments of the sample that share the same group columns.
/// None if no target can be found, in which case the groups are not weighted.
pub(crate) fn group_targets(
    group_columns: &[String],
    config: Option<&WeightingConfig>,
    population: Option<&Table>,
    sample: &[&Record],
) -> Result<Option<HashMap<String, f64>>, AnalysisErrors> {
    if let Some(c) = config {
        if c.segment_columns.as_slice() == group_columns {
            return Ok(Some(c.targets.clone()));
        }
    }
    if let Some(pop) = population {
        let targets =
            population_targets(pop, group_columns, config.and_then(|c| c.target_column.as_deref()))?;
        if !targets.is_empty() {
            return Ok(Some(targets.into_iter().collect()));
        }
    }
    let c = match config {
        Some(c) if !c.is_unweighted() => c,
        _ => return Ok(None),
    };
    // Marginalize through the segments seen in the sample.
    let mut projections: BTreeMap<String, String> = BTreeMap::new();
    for r in sample.iter() {
        if let Some(key) = resolve(r, &c.segment_columns) {
            match key.project(group_columns) {
                Some(sub) => {
                    projections.insert(key.label(), sub.label());
                }
                None => return Ok(None),
            }
        }
    }
    let mut targets: HashMap<String, f64> = HashMap::new();
    for (full, sub) in projections.iter() {
        if let Some(t) = c.targets.get(full) {
            *targets.entry(sub.clone()).or_insert(0.0) += *t;
        }
    }
    debug!("group_targets: marginal targets for {:?}: {:?}", group_columns, targets);
    if targets.is_empty() {
        Ok(None)
    } else {
        Ok(Some(targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn person(gender: &str) -> Record {
        Record::new().with("gender", Value::Text(gender.to_string()))
    }

    fn targets(ts: &[(&str, f64)]) -> HashMap<String, f64> {
        ts.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn group_policy_removes_grouped_columns() {
        let w = cols(&["gender", "age", "region"]);
        assert_eq!(
            default_group_weighting_columns(&w, &cols(&["age"])),
            cols(&["gender", "region"])
        );
        assert_eq!(default_group_weighting_columns(&w, &[]), w);
        assert!(default_group_weighting_columns(&cols(&["age"]), &cols(&["age", "x"])).is_empty());
    }

    #[test]
    fn multipliers_are_target_over_sample_proportion() {
        let counts: BTreeMap<String, usize> =
            [("A".to_string(), 3), ("B".to_string(), 1)].into_iter().collect();
        let m = segment_multipliers(&counts, &targets(&[("A", 0.5), ("B", 0.5)]));
        assert_eq!(m.len(), 2);
        assert!((m[0].weight.unwrap() - 0.5 / 0.75).abs() < 1e-12);
        assert!((m[1].weight.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(m[1].risk, Some(WeightRisk::Acceptable));
    }

    #[test]
    fn risk_grades() {
        assert_eq!(WeightRisk::from_weight(0.0), WeightRisk::Best);
        assert_eq!(WeightRisk::from_weight(1.49), WeightRisk::Best);
        assert_eq!(WeightRisk::from_weight(1.5), WeightRisk::Good);
        assert_eq!(WeightRisk::from_weight(2.5), WeightRisk::Acceptable);
        assert_eq!(WeightRisk::from_weight(4.99), WeightRisk::Risk);
        assert_eq!(WeightRisk::from_weight(5.0), WeightRisk::Critical);
    }

    #[test]
    fn empty_columns_mean_unweighted() {
        let rs = vec![person("Male"), person("Female")];
        let refs: Vec<&Record> = rs.iter().collect();
        let w = compute_weights(&refs, &[], &HashMap::new(), false).unwrap();
        assert_eq!(w, RecordWeights::uniform(2));
        assert!(!w.weighted);
    }

    #[test]
    fn unmatched_and_unresolved_records_are_excluded() {
        let rs = vec![
            person("Male"),
            person("Male"),
            person("Female"),
            person("Other"),
            Record::new(),
        ];
        let refs: Vec<&Record> = rs.iter().collect();
        let w = compute_weights(
            &refs,
            &cols(&["gender"]),
            &targets(&[("Male", 0.5), ("Female", 0.5)]),
            false,
        )
        .unwrap();
        assert!(w.weighted);
        assert_eq!(w.excluded_count, 2);
        // 4 resolvable records: Male is 50% of the sample, Female 25%.
        assert_eq!(w.weights, vec![Some(1.0), Some(1.0), Some(2.0), None, None]);
        let other = w.segments.iter().find(|s| s.label == "Other").unwrap();
        assert_eq!(other.target, None);
        assert_eq!(other.weight, None);
    }

    #[test]
    fn zero_target_gives_zero_weight() {
        let rs = vec![person("Male"), person("Female")];
        let refs: Vec<&Record> = rs.iter().collect();
        let w = compute_weights(
            &refs,
            &cols(&["gender"]),
            &targets(&[("Male", 0.0), ("Female", 1.0)]),
            false,
        )
        .unwrap();
        assert_eq!(w.excluded_count, 0);
        assert_eq!(w.weights, vec![Some(0.0), Some(2.0)]);
    }

    #[test]
    fn negative_target_is_rejected() {
        let rs = vec![person("Male")];
        let refs: Vec<&Record> = rs.iter().collect();
        let err = compute_weights(&refs, &cols(&["gender"]), &targets(&[("Male", -0.1)]), false)
            .unwrap_err();
        assert!(matches!(err, AnalysisErrors::InvalidTarget { .. }));
    }

    #[test]
    fn normalization_is_explicit() {
        let rs = vec![person("Male"), person("Male"), person("Male"), person("Female")];
        let refs: Vec<&Record> = rs.iter().collect();
        let t = targets(&[("Male", 1.5), ("Female", 1.5)]);
        let raw = compute_weights(&refs, &cols(&["gender"]), &t, false).unwrap();
        assert_eq!(raw.weights, vec![Some(2.0), Some(2.0), Some(2.0), Some(6.0)]);

        let norm = compute_weights(&refs, &cols(&["gender"]), &t, true).unwrap();
        let ws: Vec<f64> = norm.weights.iter().flatten().cloned().collect();
        assert!((ws.iter().sum::<f64>() - 4.0).abs() < 1e-12);
        assert!((ws[3] / ws[0] - 3.0).abs() < 1e-12);
        // Female, 6 / 3
        assert_eq!(norm.segments[0].risk, Some(WeightRisk::Acceptable));
        assert_eq!(norm.segments[1].risk, Some(WeightRisk::Best));
    }

    #[test]
    fn group_targets_are_marginalized_without_population() {
        let rs = vec![
            person("Male").with("age", Value::Text("young".to_string())),
            person("Male").with("age", Value::Text("old".to_string())),
            person("Female").with("age", Value::Text("old".to_string())),
        ];
        let refs: Vec<&Record> = rs.iter().collect();
        let config = WeightingConfig::new(
            &["gender", "age"],
            &[("Male_young", 0.2), ("Male_old", 0.3), ("Female_old", 0.4), ("Female_young", 0.1)],
        );
        let t = group_targets(&cols(&["gender"]), Some(&config), None, &refs)
            .unwrap()
            .unwrap();
        assert!((t["Male"] - 0.5).abs() < 1e-12);
        // Female_young is not in the sample.
        assert!((t["Female"] - 0.4).abs() < 1e-12);

        let same = group_targets(&cols(&["gender", "age"]), Some(&config), None, &refs)
            .unwrap()
            .unwrap();
        assert_eq!(same, config.targets);
        assert_eq!(group_targets(&cols(&["region"]), Some(&config), None, &refs).unwrap(), None);
        assert_eq!(group_targets(&cols(&["gender"]), None, None, &refs).unwrap(), None);
    }
}

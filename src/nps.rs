use log::{debug, info, warn};

use nps_engine::builder::Builder;
use nps_engine::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use calamine::{open_workbook, Reader, Xlsx};

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::nps::config_reader::*;
use crate::nps::io_common::{read_table, strip_qualtrics_metadata};
use crate::nps::store::DataStore;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_excel;
mod store;

pub const DEFAULT_CODING_KEY: &str = "ResponseId";

#[derive(Debug, Snafu)]
pub enum NpsError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}: {source}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("No worksheet or no header row in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Worksheet {name:?} not found in {path}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("Line {lineno}: could not understand cell {content}"))]
    ExcelWrongCellType { lineno: usize, content: String },
    #[snafu(display("Error opening file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("{path}, line {lineno}: {source}"))]
    InvalidRow {
        source: AnalysisErrors,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Unsupported file type for {path} (expected .csv or .xlsx)"))]
    UnsupportedFile { path: String },
    #[snafu(display("No {kind} file was provided"))]
    MissingSource { kind: String },
    #[snafu(display("Column {column:?} not found in the {table} data"))]
    MissingColumn { column: String, table: String },
    #[snafu(display("{source}"))]
    Analysis { source: AnalysisErrors },
    #[snafu(display("The data store was left in an inconsistent state"))]
    StorePoisoned {},
    #[snafu(display("Cannot find the directory of the configuration file"))]
    MissingParentDir {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

type NpsResult<T> = Result<T, NpsError>;

enum Mode {
    Analyze,
    ResponseRates,
    PreviewSegments,
    FoodNps,
}

fn read_mode(mode: &str) -> NpsResult<Mode> {
    match mode {
        "analyze" => Ok(Mode::Analyze),
        "responseRates" => Ok(Mode::ResponseRates),
        "previewSegments" => Ok(Mode::PreviewSegments),
        "foodNps" => Ok(Mode::FoodNps),
        x => whatever!(
            "Unknown mode {:?} (expected analyze, responseRates, previewSegments or foodNps)",
            x
        ),
    }
}

fn required<T: Clone>(x: &Option<T>, name: &str) -> NpsResult<T> {
    match x {
        Some(v) => Ok(v.clone()),
        None => whatever!("The option {:?} is required in this mode", name),
    }
}

// ******** Summaries *********

// Display rounding. The engine itself never rounds.
fn round_to(x: f64, digits: i32) -> f64 {
    let f = 10f64.powi(digits);
    let y = (x * f).round() / f;
    // No -0.0 in the summaries.
    if y == 0.0 {
        0.0
    } else {
        y
    }
}

fn nps_outcome_to_json(outcome: &NpsOutcome, digits: i32) -> JSValue {
    let r = |x: f64| round_to(x, digits);
    match outcome {
        NpsOutcome::NoRespondents => json!({"status": "noRespondents", "respondents": 0}),
        NpsOutcome::ZeroWeight { respondents } => {
            json!({"status": "zeroWeight", "respondents": respondents})
        }
        NpsOutcome::Scored(s) => {
            let promoters = r(s.breakdown.promoters);
            let detractors = r(s.breakdown.detractors);
            let distribution: Vec<JSValue> = s
                .distribution
                .iter()
                .map(|d| {
                    json!({
                        "score": d.score,
                        "respondents": d.respondents,
                        "count": r(d.count),
                        "percent": r(d.percent)
                    })
                })
                .collect();
            // The displayed score is consistent with the displayed breakdown.
            json!({
                "status": "scored",
                "score": r(promoters - detractors),
                "promoters": promoters,
                "passives": r(s.breakdown.passives),
                "detractors": detractors,
                "respondents": s.respondents,
                "totalWeight": r(s.total_weight),
                "distribution": distribution
            })
        }
    }
}

fn top_box_to_json(top_box: &[(String, Option<f64>)]) -> JSMap<String, JSValue> {
    let mut res: JSMap<String, JSValue> = JSMap::new();
    for (col, pct) in top_box.iter() {
        res.insert(col.clone(), json!(pct.map(|x| round_to(x, 1))));
    }
    res
}

fn analysis_to_json(res: &AnalysisResult) -> JSValue {
    let mut segmented: JSMap<String, JSValue> = JSMap::new();
    for (col, groups) in res.segmented_results.iter() {
        let mut per_value: JSMap<String, JSValue> = JSMap::new();
        for (value, group) in groups.iter() {
            per_value.insert(
                value.clone(),
                json!({
                    "nps": nps_outcome_to_json(&group.nps, 1),
                    "topBox3Percent": top_box_to_json(&group.top_box_3_percent)
                }),
            );
        }
        segmented.insert(col.clone(), JSValue::Object(per_value));
    }
    let weights: Vec<JSValue> = res
        .weights
        .iter()
        .map(|w| {
            json!({
                "segment": w.label,
                "sampleCount": w.sample_count,
                "sampleProportion": round_to(w.sample_proportion, 4),
                "target": w.target,
                "weight": w.weight.map(|x| round_to(x, 3)),
                "risk": w.risk.map(|r| r.to_string())
            })
        })
        .collect();
    json!({
        "nps": nps_outcome_to_json(&res.nps, 1),
        "topBox3Percent": top_box_to_json(&res.top_box_3_percent),
        "segmentedResults": segmented,
        "excludedCount": res.excluded_count,
        "weighted": res.weighted,
        "weights": weights
    })
}

fn response_rates_to_json(res: &ResponseRateResult) -> JSValue {
    let mut per_column: JSMap<String, JSValue> = JSMap::new();
    for (col, segments) in res.response_rates.iter() {
        let mut per_segment: JSMap<String, JSValue> = JSMap::new();
        for (name, s) in segments.iter() {
            let categories: Vec<JSValue> = s
                .category_stats
                .iter()
                .map(|c| {
                    json!({
                        "category": c.category,
                        "respondents": c.respondents,
                        "count": round_to(c.count, 1),
                        "percentage": round_to(c.percentage, 1)
                    })
                })
                .collect();
            per_segment.insert(
                name.clone(),
                json!({
                    "totalCount": round_to(s.total_count, 1),
                    "respondents": s.respondents,
                    "responseRate": round_to(s.response_rate, 1),
                    "categories": categories
                }),
            );
        }
        per_column.insert(col.clone(), JSValue::Object(per_segment));
    }
    json!({
        "responseRates": per_column,
        "excludedCount": res.excluded_count
    })
}

fn preview_to_json(res: &SegmentPreview) -> JSValue {
    let mut targets: JSMap<String, JSValue> = JSMap::new();
    for (label, t) in res.suggested_targets.iter() {
        targets.insert(label.clone(), json!(round_to(*t, 4)));
    }
    json!({
        "segments": res.segments,
        "suggestedTargets": targets
    })
}

fn food_nps_to_json(res: &FoodNpsResult) -> JSValue {
    let r = |x: f64| round_to(x, 2);
    let summary = res.nps.summary();
    let breakdown: Vec<JSValue> = res
        .demographic_breakdown
        .iter()
        .map(|row| {
            let mut js: JSMap<String, JSValue> = JSMap::new();
            for (col, v) in row.dimensions.iter() {
                js.insert(col.clone(), json!(v));
            }
            js.insert("segment".to_string(), json!(row.label));
            js.insert(
                "nps".to_string(),
                json!(row.nps.summary().map(|s| r(r(s.breakdown.promoters) - r(s.breakdown.detractors)))),
            );
            js.insert("count".to_string(), json!(row.respondents));
            js.insert("weight".to_string(), json!(round_to(row.weight, 4)));
            JSValue::Object(js)
        })
        .collect();
    let mut categories: JSMap<String, JSValue> = JSMap::new();
    for (bucket, ranked) in res.category_analysis.iter() {
        let l: Vec<JSValue> = ranked
            .iter()
            .map(|c| {
                json!({
                    "category": c.category,
                    "count": c.respondents,
                    "weight": r(c.weight),
                    "response_rate": r(c.response_rate)
                })
            })
            .collect();
        categories.insert(bucket.name().to_string(), json!(l));
    }
    json!({
        "nps_score": summary.map(|s| r(r(s.breakdown.promoters) - r(s.breakdown.detractors))),
        "promoters_pct": summary.map(|s| r(s.breakdown.promoters)),
        "passives_pct": summary.map(|s| r(s.breakdown.passives)),
        "detractors_pct": summary.map(|s| r(s.breakdown.detractors)),
        "total_responses": res.total_responses,
        "scale_factor": res.scale_factor.map(|x| round_to(x, 4)),
        "unmatched_count": res.unmatched_count,
        "invalid_score_count": res.invalid_score_count,
        "demographic_breakdown": breakdown,
        "category_analysis": categories
    })
}

// ******** Running *********

fn analysis_request(config: &NpsConfig, dataset: &Dataset) -> NpsResult<AnalysisRequest> {
    let weighting = match &config.weighting {
        Some(w) => Some(w.to_config(dataset.population.as_ref())?),
        None => None,
    };
    Ok(AnalysisRequest {
        nps_column: required(&config.nps_column, "npsColumn")?,
        top_box_columns: config.top_box_columns.clone().unwrap_or_default(),
        group_by_columns: config.group_by_columns.clone().unwrap_or_default(),
        group_weighting_columns: config.group_weighting_columns.clone(),
        weighting,
        top_box_scale: match &config.top_box_scale {
            Some(s) => TopBoxScale {
                max_point: s.max_point,
                boxes: s.boxes,
            },
            None => TopBoxScale::default(),
        },
    })
}

/// Runs the analysis described by the configuration on a dataset.
pub fn compute_summary(config: &NpsConfig, dataset: &Dataset) -> NpsResult<JSValue> {
    let js = match read_mode(&config.mode)? {
        Mode::Analyze => {
            let request = analysis_request(config, dataset)?;
            let res = analyze(dataset, &request).context(AnalysisSnafu {})?;
            analysis_to_json(&res)
        }
        Mode::ResponseRates => {
            let request = ResponseRateRequest {
                nps_column: config.nps_column.clone(),
                open_end_columns: required(&config.open_end_columns, "openEndColumns")?,
                weighting: match &config.weighting {
                    Some(w) => Some(w.to_config(dataset.population.as_ref())?),
                    None => None,
                },
            };
            let res = analyze_response_rates(dataset, &request).context(AnalysisSnafu {})?;
            response_rates_to_json(&res)
        }
        Mode::PreviewSegments => {
            let columns = required(&config.segment_columns, "segmentColumns")?;
            let res = preview_segments(dataset, &columns, config.target_column.as_deref())
                .context(AnalysisSnafu {})?;
            preview_to_json(&res)
        }
        Mode::FoodNps => {
            let food = config.food.clone().unwrap_or_default().to_config();
            let res = food_nps_analyze(dataset, &food).context(AnalysisSnafu {})?;
            food_nps_to_json(&res)
        }
    };
    Ok(js)
}

/// The data files to read. The files of the configuration are relative to its
/// directory, the files given on the command line are taken as they are.
struct Inputs {
    survey: Option<String>,
    population: Option<String>,
    coding: Option<String>,
    worksheet: Option<String>,
}

fn resolve_inputs(config: &NpsConfig, root_p: &Path, args: Option<&Args>) -> Inputs {
    let from_config =
        |p: &Option<String>| p.as_ref().map(|p| root_p.join(p).display().to_string());
    let ds = &config.data_sources;
    Inputs {
        survey: args
            .and_then(|a| a.survey.clone())
            .or_else(|| from_config(&ds.survey)),
        population: args
            .and_then(|a| a.population.clone())
            .or_else(|| from_config(&ds.population)),
        coding: args
            .and_then(|a| a.coding.clone())
            .or_else(|| from_config(&ds.coding)),
        worksheet: args
            .and_then(|a| a.excel_worksheet_name.clone())
            .or_else(|| ds.excel_worksheet_name.clone()),
    }
}

fn load_inputs(store: &DataStore, inputs: &Inputs, strip_qualtrics: bool) -> NpsResult<()> {
    let worksheet = inputs.worksheet.as_deref();
    let survey_p = inputs
        .survey
        .as_ref()
        .context(MissingSourceSnafu { kind: "survey" })?;
    info!("Attempting to read survey file {:?}", survey_p);
    let survey = read_table(survey_p, worksheet)?;
    let survey = if strip_qualtrics {
        strip_qualtrics_metadata(survey)
    } else {
        survey
    };
    store.load_survey(survey)?;
    if let Some(p) = &inputs.population {
        info!("Attempting to read population file {:?}", p);
        store.load_population(read_table(p, worksheet)?)?;
    }
    if let Some(p) = &inputs.coding {
        info!("Attempting to read coding file {:?}", p);
        store.load_coding(read_table(p, worksheet)?)?;
    }
    Ok(())
}

/// Reads the configuration and the data files, and computes the summary.
pub fn summarize(config_path: &str, args: Option<&Args>) -> NpsResult<JSValue> {
    let config = read_config(config_path)?;
    let root_p = Path::new(config_path)
        .parent()
        .context(MissingParentDirSnafu {})?;
    let inputs = resolve_inputs(&config, root_p, args);
    let store = DataStore::new(&config.data_sources.coding_key());
    load_inputs(
        &store,
        &inputs,
        config.data_sources.strip_qualtrics_rows.unwrap_or(true),
    )?;
    let dataset = store.snapshot()?;
    compute_summary(&config, &dataset)
}

fn check_reference(pretty_js_stats: &str, reference_path: &str) -> NpsResult<()> {
    let summary_ref = read_summary(reference_path)?;
    debug!("reference summary: {:?}", summary_ref);
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference summary");
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        whatever!("Difference detected between calculated summary and reference summary")
    }
    Ok(())
}

pub fn run_analysis(args: &Args) -> NpsResult<()> {
    let config_path = match &args.config {
        Some(p) => p.clone(),
        None => whatever!("A configuration file must be provided with --config"),
    };
    let summary = summarize(&config_path, Some(args))?;
    let pretty_js_stats = serde_json::to_string_pretty(&summary).context(WritingJsonSnafu {})?;
    match args.out.as_deref() {
        None | Some("") | Some("stdout") => println!("{}", pretty_js_stats),
        Some(path) => {
            info!("Writing summary to {:?}", path);
            fs::write(path, &pretty_js_stats).context(WritingFileSnafu { path })?
        }
    }

    // The reference summary, if provided for comparison
    if let Some(reference_p) = &args.reference {
        check_reference(&pretty_js_stats, reference_p)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;

    fn test_dir() -> String {
        format!("{}/tests/data", env!("CARGO_MANIFEST_DIR"))
    }

    fn test_wrapper(test_name: &str) {
        let dir = test_dir();
        let config_p = format!("{}/{}/{}_config.json", dir, test_name, test_name);
        let summary_p = format!("{}/{}/{}_expected_summary.json", dir, test_name, test_name);
        info!("Running test {}", test_name);
        let res = summarize(&config_p, None).and_then(|js| {
            let pretty = serde_json::to_string_pretty(&js).context(WritingJsonSnafu {})?;
            check_reference(&pretty, &summary_p)
        });
        if let Err(e) = &res {
            eprintln!("An error occured {}", e);
        }
        assert!(res.is_ok(), "test {} failed: {:?}", test_name, res);
    }

    fn summary_of(test_name: &str) -> JSValue {
        let config_p = format!("{}/{}/{}_config.json", test_dir(), test_name, test_name);
        summarize(&config_p, None).unwrap()
    }

    #[test]
    fn analyze_reference_scores() {
        test_wrapper("analyze_reference_scores");
    }

    #[test]
    fn response_rates_coded() {
        test_wrapper("response_rates_coded");
    }

    #[test]
    fn food_nps_segments() {
        test_wrapper("food_nps_segments");
    }

    #[test]
    fn preview_segments_population() {
        test_wrapper("preview_segments_population");
    }

    #[test]
    fn weighted_groups() {
        let js = summary_of("weighted_groups");
        assert_eq!(js["weighted"], json!(true));
        assert_eq!(js["excludedCount"], json!(1));
        assert_eq!(js["nps"]["score"], json!(12.5));
        assert_eq!(js["nps"]["respondents"], json!(8));
        // Inside the groups, the age targets come from the population table.
        assert_eq!(js["segmentedResults"]["gender"]["F"]["nps"]["score"], json!(0.0));
        assert_eq!(js["segmentedResults"]["gender"]["M"]["nps"]["promoters"], json!(83.3));
        assert_eq!(js["segmentedResults"]["gender"]["M"]["nps"]["score"], json!(66.6));
        assert_eq!(js["weights"][0]["segment"], json!("F_old"));
        assert_eq!(js["weights"][0]["weight"], json!(1.125));
        assert_eq!(js["weights"][4]["target"], JSValue::Null);
    }

    #[test]
    fn qualtrics_export_is_cleaned() {
        let js = summary_of("qualtrics_export");
        assert_eq!(js["nps"]["respondents"], json!(4));
        assert_eq!(js["nps"]["score"], json!(25.0));
        assert_eq!(js["nps"]["passives"], json!(25.0));
    }

    #[test]
    fn unknown_columns_are_reported() {
        let dataset = Dataset::new(Table::new(vec!["Q1_1".to_string()], vec![]));
        let config: NpsConfig = serde_json::from_str(
            r#"{"mode": "analyze", "dataSources": {}, "npsColumn": "Q1_1", "groupByColumns": ["region"]}"#,
        )
        .unwrap();
        let err = compute_summary(&config, &dataset).unwrap_err();
        assert!(matches!(
            err,
            NpsError::Analysis {
                source: AnalysisErrors::UnknownColumn { .. }
            }
        ));
        assert_eq!(
            err.to_string(),
            "column \"region\" not found in the survey data"
        );
    }

    #[test]
    fn unknown_mode() {
        let config: NpsConfig =
            serde_json::from_str(r#"{"mode": "raking", "dataSources": {}}"#).unwrap();
        let dataset = Dataset::default();
        assert!(compute_summary(&config, &dataset).is_err());
    }

    #[test]
    fn display_rounding() {
        assert_eq!(round_to(33.33333, 1), 33.3);
        assert_eq!(round_to(66.66666, 2), 66.67);
        assert_eq!(round_to(-0.04, 1).to_string(), "0");
        assert_eq!(round_to(0.25, 1), 0.3);
    }

    #[test]
    fn empty_outcomes_in_summaries() {
        assert_eq!(
            nps_outcome_to_json(&NpsOutcome::ZeroWeight { respondents: 2 }, 1),
            json!({"status": "zeroWeight", "respondents": 2})
        );
    }
}

// ********* Input data structures ***********

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::fmt::Display;

/// The content of one cell of a respondent record.
///
/// Missing cells are simply absent from the record. A text cell that only holds
/// whitespace is treated as missing as well.
#[derive(PartialEq, Debug, Clone)]
pub enum Value {
    Number(f64),
    Text(String),
    /// The categories assigned to an open-ended answer by an external coder.
    /// A single answer may carry several categories.
    Tags(BTreeSet<String>),
}

impl Value {
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Number(x) => !x.is_finite(),
            Value::Text(s) => s.trim().is_empty(),
            Value::Tags(tags) => tags.iter().all(|t| t.trim().is_empty()),
        }
    }

    /// The numeric content of the cell, if any. Text cells are parsed after trimming.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(x) if x.is_finite() => Some(*x),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
            _ => None,
        }
    }

    /// The canonical label of the cell: all the whitespace removed, and integral numbers
    /// printed without a decimal part. Blank cells have no label.
    pub fn label(&self) -> Option<String> {
        let s: String = match self {
            Value::Number(x) if x.is_finite() => format!("{}", x),
            Value::Number(_) => return None,
            Value::Text(s) => s.chars().filter(|c| !c.is_whitespace()).collect(),
            Value::Tags(tags) => tags
                .iter()
                .map(|t| t.chars().filter(|c| !c.is_whitespace()).collect::<String>())
                .filter(|t| !t.is_empty())
                .collect::<Vec<String>>()
                .join("|"),
        };
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    /// The non-blank categories carried by this cell.
    pub fn categories(&self) -> BTreeSet<String> {
        match self {
            Value::Tags(tags) => tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(|t| t.to_string())
                .collect(),
            Value::Text(s) if !s.trim().is_empty() => {
                let mut res = BTreeSet::new();
                res.insert(s.trim().to_string());
                res
            }
            Value::Number(_) => self.label().into_iter().collect(),
            Value::Text(_) => BTreeSet::new(),
        }
    }
}

/// A survey respondent, or a row of a population table.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Record {
        Record::default()
    }

    /// Builder-style insertion, mostly useful in tests.
    pub fn with(mut self, column: &str, value: Value) -> Record {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: Value) {
        self.values.insert(column.to_string(), value);
    }

    /// The value of a column. Absent and blank cells both return None.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column).filter(|v| !v.is_blank())
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}

/// Which table of a dataset a column was looked up in.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum TableKind {
    Survey,
    Population,
}

impl Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::Survey => write!(f, "survey"),
            TableKind::Population => write!(f, "population"),
        }
    }
}

/// A parsed table: the schema (the ordered column names) and the rows.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Table {
        Table { columns, records }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Looks up a column name, ignoring case and surrounding whitespace.
    /// An exact match is always preferred.
    pub fn find_column(&self, column: &str) -> Option<&String> {
        if let Some(c) = self.columns.iter().find(|c| *c == column) {
            return Some(c);
        }
        let normalized = column.trim().to_lowercase();
        self.columns
            .iter()
            .find(|c| c.trim().to_lowercase() == normalized)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A read-only snapshot of the uploaded data: the survey answers and, if it was
/// provided, the population table.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct Dataset {
    pub survey: Table,
    pub population: Option<Table>,
}

impl Dataset {
    pub fn new(survey: Table) -> Dataset {
        Dataset {
            survey,
            population: None,
        }
    }

    pub fn with_population(self, population: Table) -> Dataset {
        Dataset {
            survey: self.survey,
            population: Some(population),
        }
    }
}

// ********* Configuration **********

/// Post-stratification settings.
///
/// The targets are keyed by segment label (see `SegmentKey::label`), for example
/// `"Male_18-24"` when the segment columns are `["gender", "age"]`.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct WeightingConfig {
    pub segment_columns: Vec<String>,
    pub targets: HashMap<String, f64>,
    /// The numeric column of the population table used to derive targets, instead
    /// of counting population rows.
    pub target_column: Option<String>,
    /// Rescale the weights of the included records so that their mean is 1.
    /// Off by default: the targets are used as given.
    pub normalize: bool,
}

impl WeightingConfig {
    pub fn new(segment_columns: &[&str], targets: &[(&str, f64)]) -> WeightingConfig {
        WeightingConfig {
            segment_columns: segment_columns.iter().map(|s| s.to_string()).collect(),
            targets: targets.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            target_column: None,
            normalize: false,
        }
    }

    pub fn is_unweighted(&self) -> bool {
        self.segment_columns.is_empty()
    }
}

/// The Likert scale used for the top-box statistics.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct TopBoxScale {
    /// The highest point of the scale.
    pub max_point: u32,
    /// How many points at the top of the scale are counted.
    pub boxes: u32,
}

impl TopBoxScale {
    pub const SEVEN_POINT_TOP_3: TopBoxScale = TopBoxScale {
        max_point: 7,
        boxes: 3,
    };

    /// The lowest value that is counted in the top boxes.
    pub fn threshold(&self) -> f64 {
        (self.max_point as f64) - (self.boxes as f64) + 1.0
    }
}

impl Default for TopBoxScale {
    fn default() -> Self {
        TopBoxScale::SEVEN_POINT_TOP_3
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub nps_column: String,
    pub top_box_columns: Vec<String>,
    pub group_by_columns: Vec<String>,
    /// The weighting columns used inside each group. When not provided, the
    /// policy `default_group_weighting_columns` applies.
    pub group_weighting_columns: Option<Vec<String>>,
    pub weighting: Option<WeightingConfig>,
    pub top_box_scale: TopBoxScale,
}

impl AnalysisRequest {
    pub fn new(nps_column: &str) -> AnalysisRequest {
        AnalysisRequest {
            nps_column: nps_column.to_string(),
            ..Default::default()
        }
    }
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct ResponseRateRequest {
    pub nps_column: Option<String>,
    /// At most three open-ended columns, each processed independently.
    pub open_end_columns: Vec<String>,
    pub weighting: Option<WeightingConfig>,
}

/// Settings of the food-NPS pipeline. The defaults follow the layout of the
/// production survey export.
#[derive(PartialEq, Debug, Clone)]
pub struct FoodNpsConfig {
    pub nps_column: String,
    /// The columns that always form the segment key.
    pub segment_columns: Vec<String>,
    /// Columns that join the segment key when both tables have them.
    pub optional_segment_columns: Vec<String>,
    /// The population column holding the absolute weight of each segment.
    pub weight_column: String,
    pub category_column: Option<String>,
    /// Divide the weight of a segment among its respondents, so that the total
    /// weight of a segment equals its population weight.
    pub split_across_respondents: bool,
}

impl Default for FoodNpsConfig {
    fn default() -> Self {
        FoodNpsConfig {
            nps_column: "Q1_1".to_string(),
            segment_columns: ["gender", "age_group", "rgn_nm", "bmclub"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            optional_segment_columns: vec!["division".to_string(), "is_mfo".to_string()],
            weight_column: "mem_rate".to_string(),
            category_column: Some("category".to_string()),
            split_across_respondents: false,
        }
    }
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum NpsBucket {
    Promoter,
    Passive,
    Detractor,
}

impl NpsBucket {
    pub const ALL: [NpsBucket; 3] = [NpsBucket::Promoter, NpsBucket::Passive, NpsBucket::Detractor];

    pub fn from_score(score: u8) -> NpsBucket {
        match score {
            9..=10 => NpsBucket::Promoter,
            7..=8 => NpsBucket::Passive,
            _ => NpsBucket::Detractor,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NpsBucket::Promoter => "Promoter",
            NpsBucket::Passive => "Passive",
            NpsBucket::Detractor => "Detractor",
        }
    }
}

/// Percentages of the total included weight.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Breakdown {
    pub promoters: f64,
    pub passives: f64,
    pub detractors: f64,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ScoreCount {
    pub score: u8,
    /// The number of respondents who gave this score.
    pub respondents: usize,
    /// The weighted count.
    pub count: f64,
    pub percent: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct NpsSummary {
    /// Always `breakdown.promoters - breakdown.detractors`.
    pub score: f64,
    pub breakdown: Breakdown,
    /// One entry per score, from 0 to 10.
    pub distribution: Vec<ScoreCount>,
    pub respondents: usize,
    pub total_weight: f64,
}

/// The result of a NPS computation. Having nobody to compute a score on is an
/// explicit outcome, not an error.
#[derive(PartialEq, Debug, Clone)]
pub enum NpsOutcome {
    /// No record had a valid score.
    NoRespondents,
    /// Some records had a valid score, but all their weights are zero.
    ZeroWeight { respondents: usize },
    Scored(NpsSummary),
}

impl NpsOutcome {
    pub fn summary(&self) -> Option<&NpsSummary> {
        match self {
            NpsOutcome::Scored(s) => Some(s),
            _ => None,
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.summary().map(|s| s.score)
    }

    pub fn respondents(&self) -> usize {
        match self {
            NpsOutcome::NoRespondents => 0,
            NpsOutcome::ZeroWeight { respondents } => *respondents,
            NpsOutcome::Scored(s) => s.respondents,
        }
    }
}

/// A qualitative grade of how much a segment had to be inflated.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum WeightRisk {
    Best,
    Good,
    Acceptable,
    Risk,
    Critical,
}

impl WeightRisk {
    pub fn from_weight(weight: f64) -> WeightRisk {
        if weight < 1.5 {
            WeightRisk::Best
        } else if weight < 2.0 {
            WeightRisk::Good
        } else if weight < 3.0 {
            WeightRisk::Acceptable
        } else if weight < 5.0 {
            WeightRisk::Risk
        } else {
            WeightRisk::Critical
        }
    }
}

impl Display for WeightRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WeightRisk::Best => "Best",
            WeightRisk::Good => "Good",
            WeightRisk::Acceptable => "Acceptable",
            WeightRisk::Risk => "Risk",
            WeightRisk::Critical => "Critical",
        };
        write!(f, "{}", s)
    }
}

/// The multiplier of one segment of the sample.
#[derive(PartialEq, Debug, Clone)]
pub struct SegmentWeight {
    pub label: String,
    pub sample_count: usize,
    pub sample_proportion: f64,
    /// None if the segment has no target: its records are then excluded.
    pub target: Option<f64>,
    pub weight: Option<f64>,
    pub risk: Option<WeightRisk>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct GroupResult {
    pub nps: NpsOutcome,
    pub top_box_3_percent: Vec<(String, Option<f64>)>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AnalysisResult {
    pub nps: NpsOutcome,
    /// For each requested column, the top-box percentage, or None if the column
    /// had no usable value.
    pub top_box_3_percent: Vec<(String, Option<f64>)>,
    /// group-by column -> (group value -> result), values sorted by label.
    pub segmented_results: Vec<(String, Vec<(String, GroupResult)>)>,
    pub excluded_count: usize,
    pub weighted: bool,
    /// The multipliers of the overall weighting, empty when unweighted.
    pub weights: Vec<SegmentWeight>,
}

#[derive(PartialEq, Debug, Clone, Default)]
pub struct SegmentPreview {
    /// The distinct labels present in the survey, sorted.
    pub segments: Vec<String>,
    /// Proportions derived from the population table, sorted by label.
    pub suggested_targets: Vec<(String, f64)>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct CategoryStat {
    pub category: String,
    pub respondents: usize,
    /// Weighted count.
    pub count: f64,
    /// Percentage of the weighted responders.
    pub percentage: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SegmentResponse {
    /// Weighted size of the segment.
    pub total_count: f64,
    pub respondents: usize,
    /// Weighted count of the records with at least one category.
    pub responders: f64,
    pub response_rate: f64,
    /// Sorted by decreasing percentage.
    pub category_stats: Vec<CategoryStat>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ResponseRateResult {
    /// open-end column -> (segment name -> statistics)
    pub response_rates: Vec<(String, Vec<(String, SegmentResponse)>)>,
    pub excluded_count: usize,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FoodSegmentRow {
    pub dimensions: Vec<(String, String)>,
    pub label: String,
    pub nps: NpsOutcome,
    pub respondents: usize,
    /// The population weight of the segment.
    pub weight: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct RankedCategory {
    pub category: String,
    pub respondents: usize,
    pub weight: f64,
    pub response_rate: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct FoodNpsResult {
    pub nps: NpsOutcome,
    /// Respondents with a valid score and a matching population segment.
    pub total_responses: usize,
    /// None when nobody matched.
    pub scale_factor: Option<f64>,
    /// Sorted by decreasing weight.
    pub demographic_breakdown: Vec<FoodSegmentRow>,
    /// Empty when there is no category column.
    pub category_analysis: Vec<(NpsBucket, Vec<RankedCategory>)>,
    pub unmatched_count: usize,
    pub invalid_score_count: usize,
}

/// Errors that reject a request before any computation.
///
/// Data anomalies (missing scores, unmatched segments, blank answers) are never
/// errors: they are counted and excluded.
#[derive(PartialEq, Debug, Clone)]
pub enum AnalysisErrors {
    UnknownColumn { column: String, table: TableKind },
    TooManyOpenEndColumns(usize),
    InvalidTarget { segment: String, target: f64 },
    MissingPopulation,
    InvalidPopulationWeight { row: usize, column: String },
    RowLength { expected: usize, found: usize },
}

impl Error for AnalysisErrors {}

impl Display for AnalysisErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisErrors::UnknownColumn { column, table } => {
                write!(f, "column {:?} not found in the {} data", column, table)
            }
            AnalysisErrors::TooManyOpenEndColumns(n) => {
                write!(f, "at most 3 open-ended columns are supported, got {}", n)
            }
            AnalysisErrors::InvalidTarget { segment, target } => {
                write!(f, "invalid target {} for segment {:?}", target, segment)
            }
            AnalysisErrors::MissingPopulation => write!(f, "no population data was provided"),
            AnalysisErrors::InvalidPopulationWeight { row, column } => {
                write!(f, "population row {}: invalid value in column {:?}", row, column)
            }
            AnalysisErrors::RowLength { expected, found } => {
                write!(f, "expected {} cells in the row, found {}", expected, found)
            }
        }
    }
}

use crate::nps::*;

use std::collections::{BTreeMap, HashMap};

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSources {
    pub survey: Option<String>,
    pub population: Option<String>,
    pub coding: Option<String>,
    /// The column that links the coding rows to the survey respondents.
    #[serde(rename = "codingKey")]
    pub coding_key: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    /// Remove the two header rows that Qualtrics adds below the column names.
    #[serde(rename = "stripQualtricsRows")]
    pub strip_qualtrics_rows: Option<bool>,
}

impl DataSources {
    pub fn coding_key(&self) -> String {
        self.coding_key
            .clone()
            .unwrap_or_else(|| DEFAULT_CODING_KEY.to_string())
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct WeightingSettings {
    #[serde(rename = "segmentColumns")]
    pub segment_columns: Vec<String>,
    pub targets: Option<BTreeMap<String, f64>>,
    #[serde(rename = "targetColumn")]
    pub target_column: Option<String>,
    pub normalize: Option<bool>,
    /// Fill the targets from the population table. Explicit targets take precedence.
    #[serde(rename = "useSuggestedTargets")]
    pub use_suggested_targets: Option<bool>,
}

impl WeightingSettings {
    pub fn to_config(&self, population: Option<&Table>) -> NpsResult<WeightingConfig> {
        let mut targets: HashMap<String, f64> = HashMap::new();
        if self.use_suggested_targets.unwrap_or(false) {
            let pop = population.context(MissingSourceSnafu { kind: "population" })?;
            let suggested = population_targets(
                pop,
                &self.segment_columns,
                self.target_column.as_deref(),
            )
            .context(AnalysisSnafu {})?;
            debug!("to_config: suggested targets: {:?}", suggested);
            targets.extend(suggested);
        }
        if let Some(ts) = &self.targets {
            targets.extend(ts.iter().map(|(k, v)| (k.clone(), *v)));
        }
        Ok(WeightingConfig {
            segment_columns: self.segment_columns.clone(),
            targets,
            target_column: self.target_column.clone(),
            normalize: self.normalize.unwrap_or(false),
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TopBoxSettings {
    #[serde(rename = "maxPoint")]
    pub max_point: u32,
    pub boxes: u32,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FoodSettings {
    #[serde(rename = "npsColumn")]
    pub nps_column: Option<String>,
    #[serde(rename = "segmentColumns")]
    pub segment_columns: Option<Vec<String>>,
    #[serde(rename = "optionalSegmentColumns")]
    pub optional_segment_columns: Option<Vec<String>>,
    #[serde(rename = "weightColumn")]
    pub weight_column: Option<String>,
    #[serde(rename = "categoryColumn")]
    pub category_column: Option<String>,
    #[serde(rename = "splitAcrossRespondents")]
    pub split_across_respondents: Option<bool>,
}

impl FoodSettings {
    pub fn to_config(&self) -> FoodNpsConfig {
        let default = FoodNpsConfig::default();
        FoodNpsConfig {
            nps_column: self.nps_column.clone().unwrap_or(default.nps_column),
            segment_columns: self
                .segment_columns
                .clone()
                .unwrap_or(default.segment_columns),
            optional_segment_columns: self
                .optional_segment_columns
                .clone()
                .unwrap_or(default.optional_segment_columns),
            weight_column: self.weight_column.clone().unwrap_or(default.weight_column),
            category_column: match &self.category_column {
                Some(c) if c.is_empty() => None,
                Some(c) => Some(c.clone()),
                None => default.category_column,
            },
            split_across_respondents: self.split_across_respondents.unwrap_or(false),
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct NpsConfig {
    /// One of `analyze`, `responseRates`, `previewSegments`, `foodNps`.
    pub mode: String,
    #[serde(rename = "dataSources")]
    pub data_sources: DataSources,
    #[serde(rename = "npsColumn")]
    pub nps_column: Option<String>,
    #[serde(rename = "topBoxColumns")]
    pub top_box_columns: Option<Vec<String>>,
    #[serde(rename = "topBoxScale")]
    pub top_box_scale: Option<TopBoxSettings>,
    #[serde(rename = "groupByColumns")]
    pub group_by_columns: Option<Vec<String>>,
    #[serde(rename = "groupWeightingColumns")]
    pub group_weighting_columns: Option<Vec<String>>,
    pub weighting: Option<WeightingSettings>,
    #[serde(rename = "openEndColumns")]
    pub open_end_columns: Option<Vec<String>>,
    /// The columns of the segments to preview.
    #[serde(rename = "segmentColumns")]
    pub segment_columns: Option<Vec<String>>,
    #[serde(rename = "targetColumn")]
    pub target_column: Option<String>,
    pub food: Option<FoodSettings>,
}

pub fn read_config(path: &str) -> NpsResult<NpsConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: NpsConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> NpsResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let js: JSValue =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config() {
        let js = r#"{"mode": "analyze", "dataSources": {"survey": "survey.csv"}, "npsColumn": "Q1_1"}"#;
        let config: NpsConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.mode, "analyze");
        assert_eq!(config.data_sources.survey, Some("survey.csv".to_string()));
        assert_eq!(config.data_sources.coding_key(), "ResponseId");
        assert_eq!(config.weighting, None);
    }

    #[test]
    fn explicit_targets_override_suggested_ones() {
        let mut pop = Builder::new(&["gender", "mem_rate"]);
        pop.add_row(&["M", "3"]).unwrap();
        pop.add_row(&["F", "1"]).unwrap();
        let pop = pop.build();
        let settings: WeightingSettings = serde_json::from_str(
            r#"{"segmentColumns": ["gender"], "targets": {"F": 0.5},
                "targetColumn": "mem_rate", "useSuggestedTargets": true}"#,
        )
        .unwrap();
        let config = settings.to_config(Some(&pop)).unwrap();
        assert_eq!(config.targets["M"], 0.75);
        assert_eq!(config.targets["F"], 0.5);
        assert!(!config.normalize);
        assert!(settings.to_config(None).is_err());
    }

    #[test]
    fn food_defaults() {
        let settings: FoodSettings =
            serde_json::from_str(r#"{"categoryColumn": "", "splitAcrossRespondents": true}"#)
                .unwrap();
        let config = settings.to_config();
        assert_eq!(config.nps_column, "Q1_1");
        assert_eq!(config.weight_column, "mem_rate");
        assert_eq!(config.category_column, None);
        assert!(config.split_across_respondents);
    }
}

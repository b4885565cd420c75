use clap::Parser;

/// This is a weighted NPS tabulation program for survey exports.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the analysis to run: the mode, the data files and the
    /// columns to analyze. For more information about the file format, read the manual of the
    /// nps_engine crate.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, npscalc will check that the
    /// computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format to the
    /// given location. By default, it is printed on the standard output.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path, .csv or .xlsx) The survey answers. Setting this option overrides the survey file
    /// that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub survey: Option<String>,

    /// (file path, .csv or .xlsx) The population table, used for weighting targets and for the
    /// food NPS mode. Overrides the population file of the configuration.
    #[clap(short, long, value_parser)]
    pub population: Option<String>,

    /// (file path, .csv or .xlsx) The coding of the open-ended answers: one row per respondent
    /// and category. Overrides the coding file of the configuration.
    #[clap(long, value_parser)]
    pub coding: Option<String>,

    /// (default: first sheet) When using Excel files, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}

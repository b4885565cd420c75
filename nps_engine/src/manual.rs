/*!

This is the long-form manual for `nps_engine` and `npscalc`.

## Input data

`npscalc` reads tables in two formats:
* `.csv` (or `.txt`) comma separated values, UTF-8, with a header row. The byte order mark
  that Excel writes in front of UTF-8 exports is removed.
* `.xlsx` Excel workbooks. The first worksheet is used unless `excelWorksheetName` is given.

The first row always holds the column names. Blank cells are treated as missing.

Three tables can be provided:
* the **survey**: one row per respondent. The NPS question holds integers from 0 to 10,
  anything else (blank, text, `11`, `9.5`) is not a score.
* the **population**: one row per demographic segment, with the same segment columns as the
  survey (the case of the column names does not matter) and optionally a numeric column
  with the size of the segment.
* the **coding**: the categories assigned to the open-ended answers, one row per
  (respondent, category) pair. The rows are linked to the survey by the `codingKey` column
  (`ResponseId` by default). Every other column becomes a set-valued column of the survey.

### Qualtrics exports

Qualtrics adds two rows below the column names: the full text of the questions and the
import ids. When one of the first two rows contains the text `ImportId`, both rows are
dropped. This can be turned off with `"stripQualtricsRows": false`.

## Segments

A segment is the combination of the values of a list of columns, for example
`["gender", "age"]`. Its label joins the values with `_`, after removing all the whitespace:
`Male` and ` 18-24` give `Male_18-24`, and `20대 이하` gives `20대이하`. A respondent with a
blank value in one of the columns has no segment.

## Weighting

The weighting is a post-stratification on one set of segment columns. Each segment of the
sample with a target `t` gets the weight:

```text
weight = t / (sample count of the segment / sample count of all the segments)
```

The sample count only includes the respondents that have a segment. Respondents without a
segment, or whose segment has no target, are excluded from the analysis and counted in
`excludedCount`. A target of 0 gives a weight of 0. Negative targets are rejected.

The targets are the proportions of each segment in the population, and are expected to sum
to 1. They can be written in the configuration, or derived from the population table with
`"useSuggestedTargets": true`: each segment gets the share of the rows of the population
table (or the share of `targetColumn` if it is given). Explicit targets take precedence.

With `"normalize": true`, the weights are divided by their mean so that they average to 1.
This does not change the scores, only the reported weights.

Each weight is given a grade to flag the segments that had to be inflated:

| weight      | grade        |
|-------------|--------------|
| < 1.5       | `Best`       |
| 1.5 - 2     | `Good`       |
| 2 - 3       | `Acceptable` |
| 3 - 5       | `Risk`       |
| >= 5        | `Critical`   |

### Weighting inside groups

When the results are broken down by `groupByColumns`, each group is weighted again on its
own. By default the weighting columns of the groups are the weighting columns without the
group-by columns: weighting the group `gender=Male` by gender would be a no-op. The columns
can be chosen with `groupWeightingColumns`, and an empty list turns off the weighting of the
groups.

The targets of the groups are, in order:
1. the configured targets, if the group columns are the weighting columns;
2. the targets derived from the population table, if there is one;
3. the configured targets summed by group columns, for example `Male_18-24` and
   `Female_18-24` both add to `18-24`.

If none of these apply, the groups are not weighted. Only the respondents kept by the overall
weighting are included in the groups.

## Metrics

The **Net Promoter Score** is `% promoters - % detractors` where promoters answered 9 or 10,
passives 7 or 8 and detractors 0 to 6. All the percentages are weighted. A set of respondents
without any valid score has no score (`noRespondents`), and a set whose weights are all 0 has
no score either (`zeroWeight`).

The **top-box percentage** of a Likert question is the weighted share of the answers at or
above `maxPoint - boxes + 1`. By default the scale has 7 points and the top 3 boxes are
counted (answers of 5, 6 or 7). Labelled answers such as `7 - Extremely satisfied` are read
through their first number. Each question only counts the respondents that answered it.

The **response rate** of an open-ended question is the weighted share of the respondents with
at least one category. The category percentages are relative to the respondents that
answered, so that they add up to 100% for single-category answers. They add up to more when
an answer has several categories.

## Configuration file

The configuration is a JSON file. The data files are relative to the directory of the
configuration file.

```json
{
  "mode": "analyze",
  "dataSources": {
    "survey": "survey.csv",
    "population": "population.csv"
  },
  "npsColumn": "Q_NPS",
  "topBoxColumns": ["Q_SAT", "Q_EASE"],
  "groupByColumns": ["region"],
  "weighting": {
    "segmentColumns": ["gender"],
    "targets": {"Male": 0.5, "Female": 0.5}
  }
}
```

The `mode` field selects the analysis:
* `analyze` the NPS and top-box percentages, overall and by group. Needs `npsColumn`.
  Optional: `topBoxColumns`, `topBoxScale` (`{"maxPoint": 7, "boxes": 3}`),
  `groupByColumns`, `groupWeightingColumns`, `weighting`.
* `responseRates` the response rates of up to 3 `openEndColumns`, overall and for each NPS
  segment if `npsColumn` is given: `Promoters (9-10)`, `Passives (7-8)`, `Detractors (0-6)`
  and `At-Risk (0-3)`. Optional: `weighting`.
* `previewSegments` the segments of `segmentColumns` found in the survey, with the targets
  suggested by the population table (using `targetColumn` if given).
* `foodNps` the NPS weighted by a table of canonical population segments (see below).

### `dataSources`

* `survey`, `population`, `coding` the data files
* `codingKey` (default `ResponseId`) the column linking the coding to the survey
* `excelWorksheetName` the worksheet to read in Excel files
* `stripQualtricsRows` (default `true`)

## Food NPS

In this mode, the population table lists the canonical segments of the customer base, with
their absolute weight in the `weightColumn` (default `mem_rate`). The segment columns are
`gender`, `age_group`, `rgn_nm` and `bmclub`, plus `division` and `is_mfo` when both tables
have them. Every respondent with a valid score on `npsColumn` (default `Q1_1`) and a matching
segment gets the weight of its segment. With `"splitAcrossRespondents": true`, that weight is
divided by the number of respondents of the segment.

Duplicate segments in the population table have their weights summed. A population row with a
missing or non-numeric weight is an error.

The `scale_factor` is the sum of the weights of the matched segments divided by the number of
matched respondents. The categories of `categoryColumn` (default `category`) are ranked within
each NPS bucket by their share of the weight of the bucket.

```json
{
  "mode": "foodNps",
  "dataSources": {"survey": "survey.csv", "population": "population.csv"},
  "food": {
    "npsColumn": "Q1_1",
    "weightColumn": "mem_rate",
    "splitAcrossRespondents": false
  }
}
```

## Outputs

The summary is a JSON document. The percentages are rounded to one decimal (two in the
`foodNps` mode), and the displayed score is the difference of the displayed percentages.
The computations are done without rounding.

## Command line

```bash
npscalc --config config.json [--out summary.json] [--reference expected.json]
```

* `--survey`, `--population`, `--coding` override the files of the configuration
* `--excel-worksheet-name` selects the worksheet of Excel files
* `--reference` compares the summary with a reference summary and fails on differences
* `--verbose` turns on debug logging. The `RUST_LOG` environment variable is also honored.

*/

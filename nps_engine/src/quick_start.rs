/*!

# Quick start with a Qualtrics export

This example goes from a survey collected with Qualtrics to a weighted NPS broken down by
region. Other survey tools work the same way as long as they can export a CSV or Excel file
with one row per respondent.

**The survey** The NPS question must be a 0-10 scale, here with the id `Q1_1`. Add the
demographic questions that will be used for the weighting (for example gender and age) and
any question to break the results down by.

**Getting the results** In the `Data & Analysis` tab, use `Export & Import > Export data`,
choose `CSV` and select `Use choice text`. The export has two extra rows below the column
names (the text of the questions and the import ids): `npscalc` recognizes them and drops them.

The export should look like the following:

| ResponseId | Q1_1 | gender | age   | region |
|------------|------|--------|-------|--------|
| R_1        | 9    | Male   | 18-34 | North  |
| R_2        | 3    | Female | 35+   | South  |
| ...        |      |        |       |        |

**Choosing the segments** Before setting the targets, list the segments present in the sample
with a configuration file `preview.json` placed next to the export:

```json
{
  "mode": "previewSegments",
  "dataSources": {"survey": "export.csv", "population": "population.csv"},
  "segmentColumns": ["gender", "age"],
  "targetColumn": "population"
}
```

```bash
npscalc --config preview.json
```

The output lists the segment labels (`Female_18-34`, `Male_35+`, ...) and, if a population
table was given, the share of each segment in the population. A segment of the sample that
has no target will be excluded from the weighted results.

**Running the analysis** Write the targets in `config.json`:

```json
{
  "mode": "analyze",
  "dataSources": {"survey": "export.csv"},
  "npsColumn": "Q1_1",
  "groupByColumns": ["region"],
  "weighting": {
    "segmentColumns": ["gender", "age"],
    "targets": {
      "Female_18-34": 0.21,
      "Female_35+": 0.32,
      "Male_18-34": 0.18,
      "Male_35+": 0.29
    }
  }
}
```

```bash
npscalc --config config.json --out summary.json
```

The summary has the overall score, the score for each region, and the weight given to each
segment with a grade. Segments graded `Risk` or `Critical` were inflated a lot: their few
respondents weigh heavily in the result.

**Checking the results over time** A summary can be kept as a reference. Running again with
`--reference summary.json` checks that the new data gives the same results, and prints the
differences otherwise.

For the formulas and all the options, see the [manual](crate::manual).

*/

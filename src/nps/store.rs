use crate::nps::*;

use std::sync::{Arc, RwLock};

use crate::nps::io_common::merge_coding;

#[derive(Default)]
struct StoreState {
    survey: Option<Table>,
    population: Option<Table>,
    coding: Option<Table>,
    snapshot: Option<Arc<Dataset>>,
}

/// The uploaded tables. Loading a table replaces the previous one of the same kind,
/// and analyses work on snapshots: a later load never changes a snapshot that was
/// already handed out.
pub struct DataStore {
    coding_key: String,
    state: RwLock<StoreState>,
}

impl DataStore {
    pub fn new(coding_key: &str) -> DataStore {
        DataStore {
            coding_key: coding_key.to_string(),
            state: RwLock::new(StoreState::default()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut StoreState)) -> NpsResult<()> {
        let mut state = self.state.write().map_err(|_| NpsError::StorePoisoned {})?;
        f(&mut *state);
        state.snapshot = None;
        Ok(())
    }

    pub fn load_survey(&self, table: Table) -> NpsResult<()> {
        debug!("load_survey: {} rows", table.len());
        self.update(|s| s.survey = Some(table))
    }

    pub fn load_population(&self, table: Table) -> NpsResult<()> {
        debug!("load_population: {} rows", table.len());
        self.update(|s| s.population = Some(table))
    }

    pub fn load_coding(&self, table: Table) -> NpsResult<()> {
        debug!("load_coding: {} rows", table.len());
        self.update(|s| s.coding = Some(table))
    }

    pub fn reset(&self) -> NpsResult<()> {
        info!("reset: clearing all the tables");
        self.update(|s| {
            s.survey = None;
            s.population = None;
            s.coding = None;
        })
    }

    /// The current dataset, with the coding merged into the survey.
    pub fn snapshot(&self) -> NpsResult<Arc<Dataset>> {
        {
            let state = self.state.read().map_err(|_| NpsError::StorePoisoned {})?;
            if let Some(s) = &state.snapshot {
                return Ok(s.clone());
            }
        }
        let mut state = self.state.write().map_err(|_| NpsError::StorePoisoned {})?;
        if let Some(s) = &state.snapshot {
            return Ok(s.clone());
        }
        let survey = state
            .survey
            .clone()
            .context(MissingSourceSnafu { kind: "survey" })?;
        let survey = match &state.coding {
            Some(coding) => merge_coding(survey, coding, &self.coding_key)?,
            None => survey,
        };
        let dataset = Arc::new(Dataset {
            survey,
            population: state.population.clone(),
        });
        state.snapshot = Some(dataset.clone());
        Ok(dataset)
    }
}

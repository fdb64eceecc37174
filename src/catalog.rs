use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;

use crate::constraint::Dimension;

/// Pseudo-dataset ERDDAP lists first in `allDatasets`.
pub(crate) const ALL_DATASETS: &str = "allDatasets";

/// Bio-ORACLE variable prefixes.
pub const KNOWN_VARIABLES: [&str; 17] = [
    "po4", "o2", "si", "ph", "sws", "phyc", "so", "thetao", "dfe", "no3", "sithick", "tas",
    "siconc", "chl", "mlotst", "clt", "terrain",
];

/// Bio-ORACLE scenario tags.
pub const KNOWN_SCENARIOS: [&str; 7] = [
    "ssp119", "ssp126", "ssp370", "ssp585", "ssp460", "ssp245", "baseline",
];

/// ERDDAP `.json` table response: `{"table": {"columnNames": [...], "rows": [[...]]}}`.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct TableResponse {
    table: Table,
}

#[derive(Debug, serde::Deserialize)]
struct Table {
    #[serde(rename = "columnNames")]
    column_names: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

impl Table {
    fn column(&self, name: &str) -> Result<usize> {
        self.column_names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| anyhow!("missing column `{}` in ERDDAP table", name))
    }
}

fn cell_str(row: &[Value], idx: usize) -> &str {
    row.get(idx).and_then(Value::as_str).unwrap_or("")
}

/// Parses an `allDatasets.json?datasetID` body into layer ids in server order.
pub(crate) fn parse_layer_ids(body: &str) -> Result<Vec<String>> {
    let resp: TableResponse =
        serde_json::from_str(body).context("failed to parse catalog JSON")?;
    let idx = resp.table.column("datasetID")?;

    Ok(resp
        .table
        .rows
        .iter()
        .map(|row| cell_str(row, idx))
        .filter(|id| !id.is_empty() && *id != ALL_DATASETS)
        .map(str::to_string)
        .collect())
}

/// Grid description of one layer, from `info/<id>/index.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub id: String,
    /// Axes in the order the server declares them.
    pub dimensions: Vec<Dimension>,
    /// Data variables (axis variables excluded).
    pub variables: Vec<String>,
}

impl LayerInfo {
    pub fn new(id: impl Into<String>, dimensions: Vec<Dimension>, variables: Vec<String>) -> Self {
        Self {
            id: id.into(),
            dimensions,
            variables,
        }
    }

    pub fn has_dimension(&self, dimension: Dimension) -> bool {
        self.dimensions.contains(&dimension)
    }
}

pub(crate) fn parse_layer_info(id: &str, body: &str) -> Result<LayerInfo> {
    let resp: TableResponse =
        serde_json::from_str(body).context("failed to parse layer info JSON")?;
    let row_type = resp.table.column("Row Type")?;
    let name = resp.table.column("Variable Name")?;

    let mut dimensions = Vec::new();
    let mut variables = Vec::new();
    for row in &resp.table.rows {
        match cell_str(row, row_type) {
            "dimension" => {
                let dim = cell_str(row, name);
                let dim = dim
                    .parse::<Dimension>()
                    .map_err(|_| anyhow!("layer `{}` has unsupported dimension `{}`", id, dim))?;
                dimensions.push(dim);
            }
            "variable" => variables.push(cell_str(row, name).to_string()),
            _ => {}
        }
    }

    if dimensions.is_empty() {
        bail!("layer `{}` declares no dimensions (not a griddap dataset?)", id);
    }

    Ok(LayerInfo {
        id: id.to_string(),
        dimensions,
        variables,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePeriod {
    /// Baseline layers, starting in 2000.
    Present,
    /// Projection layers, starting in 2020.
    Future,
}

impl TimePeriod {
    fn start_decade(&self) -> &'static str {
        match self {
            TimePeriod::Present => "2000",
            TimePeriod::Future => "2020",
        }
    }
}

/// Narrows the catalog by variable, scenario and time period.
///
/// Layer ids look like `thetao_ssp585_2020_2100_depthsurf`.
#[derive(Debug, Clone, Default)]
pub struct LayerFilter {
    pub variables: Vec<String>,
    pub scenarios: Vec<String>,
    pub time_period: Option<TimePeriod>,
}

impl LayerFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn variable(mut self, v: impl Into<String>) -> Self {
        self.variables.push(v.into());
        self
    }

    pub fn scenario(mut self, s: impl Into<String>) -> Self {
        self.scenarios.push(s.into());
        self
    }

    pub fn time_period(mut self, p: TimePeriod) -> Self {
        self.time_period = Some(p);
        self
    }

    /// Logs values outside the Bio-ORACLE vocabularies; they still filter.
    pub(crate) fn warn_unknown(&self) {
        for v in &self.variables {
            if !KNOWN_VARIABLES.contains(&v.to_lowercase().as_str()) {
                log::warn!(
                    "variable `{}` is not a known Bio-ORACLE variable; valid values: {:?}",
                    v,
                    KNOWN_VARIABLES
                );
            }
        }
        for s in &self.scenarios {
            if !KNOWN_SCENARIOS.contains(&s.to_lowercase().as_str()) {
                log::warn!(
                    "scenario `{}` is not a known Bio-ORACLE scenario; valid values: {:?}",
                    s,
                    KNOWN_SCENARIOS
                );
            }
        }
    }

    pub fn matches(&self, id: &str) -> bool {
        let lower = id.to_lowercase();

        if !self.variables.is_empty()
            && !self
                .variables
                .iter()
                .any(|v| lower.starts_with(&v.to_lowercase()))
        {
            return false;
        }

        if !self.scenarios.is_empty()
            && !self
                .scenarios
                .iter()
                .any(|s| lower.contains(&s.to_lowercase()))
        {
            return false;
        }

        if let Some(period) = self.time_period {
            if id.split('_').nth(2) != Some(period.start_decade()) {
                return false;
            }
        }

        true
    }

    pub fn apply(&self, ids: Vec<String>) -> Vec<String> {
        ids.into_iter().filter(|id| self.matches(id)).collect()
    }
}

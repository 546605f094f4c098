//! The draft analysis configuration.
//!
//! The draft is assembled step by step (landscape, analysis type,
//! resolution and variable, periods, geometry). Each step owns everything
//! after it: changing a step resets the steps downstream of it.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::area::{AreaSelection, toggle_selection};
use crate::indicator::{Indicator, variable_options};

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    Baseline,
    Temporal,
    Spatial,
    Baci,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 4] = [
        AnalysisType::Baseline,
        AnalysisType::Temporal,
        AnalysisType::Spatial,
        AnalysisType::Baci,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisType::Baseline => "baseline",
            AnalysisType::Temporal => "temporal",
            AnalysisType::Spatial => "spatial",
            AnalysisType::Baci => "baci",
        }
    }

    /// Temporal and BACI compare a period against comparison periods.
    pub fn uses_periods(self) -> bool {
        matches!(self, AnalysisType::Temporal | AnalysisType::Baci)
    }

    pub fn uses_variable(self) -> bool {
        !matches!(self, AnalysisType::Baseline)
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for AnalysisType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant {
                kind: "analysis type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalResolution {
    Annual,
    Quarterly,
    Monthly,
}

impl TemporalResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            TemporalResolution::Annual => "annual",
            TemporalResolution::Quarterly => "quarterly",
            TemporalResolution::Monthly => "monthly",
        }
    }
}

impl fmt::Display for TemporalResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemporalResolution {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            TemporalResolution::Annual,
            TemporalResolution::Quarterly,
            TemporalResolution::Monthly,
        ]
        .into_iter()
        .find(|r| r.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| UnknownVariant {
            kind: "temporal resolution",
            value: s.to_string(),
        })
    }
}

/// The analysed period: a year, refined by a quarter or a month depending on
/// the resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Period {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
}

impl Period {
    pub fn annual(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn quarterly(year: i32, quarter: u8) -> Self {
        Self {
            year: Some(year),
            quarter: Some(quarter),
            month: None,
        }
    }

    pub fn monthly(year: i32, month: u8) -> Self {
        Self {
            year: Some(year),
            quarter: None,
            month: Some(month),
        }
    }
}

/// Comparison periods as parallel arrays: entry `i` of `quarter` (or
/// `month`) refines entry `i` of `year`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComparisonPeriod {
    #[serde(default)]
    pub year: Vec<i32>,
    #[serde(default)]
    pub quarter: Vec<u8>,
    #[serde(default)]
    pub month: Vec<u8>,
}

impl ComparisonPeriod {
    pub fn annual(years: impl IntoIterator<Item = i32>) -> Self {
        Self {
            year: years.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn quarterly(pairs: impl IntoIterator<Item = (i32, u8)>) -> Self {
        let (year, quarter) = pairs.into_iter().unzip();
        Self {
            year,
            quarter,
            month: Vec::new(),
        }
    }

    pub fn monthly(pairs: impl IntoIterator<Item = (i32, u8)>) -> Self {
        let (year, month) = pairs.into_iter().unzip();
        Self {
            year,
            quarter: Vec::new(),
            month,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.year.is_empty() && self.quarter.is_empty() && self.month.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default)]
    pub analysis_type: AnalysisType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landscape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_resolution: Option<TemporalResolution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub comparison_period: ComparisonPeriod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_layer: Option<geojson::Geometry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_layer_id: Option<String>,
    #[serde(default)]
    pub locations: Vec<AreaSelection>,
    /// BACI control areas.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub control_locations: Vec<AreaSelection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_geom: Option<geojson::Geometry>,
}

/// A partial update. Absent fields are left alone.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    pub landscape: Option<String>,
    pub analysis_type: Option<AnalysisType>,
    pub temporal_resolution: Option<TemporalResolution>,
    pub variable: Option<String>,
    pub period: Option<Period>,
    pub comparison_period: Option<ComparisonPeriod>,
    pub baseline_start_date: Option<NaiveDate>,
    pub baseline_end_date: Option<NaiveDate>,
    pub reference_layer_id: Option<String>,
    pub reference_layer: Option<geojson::Geometry>,
    pub custom_geom: Option<geojson::Geometry>,
}

impl ConfigPatch {
    pub fn landscape(mut self, landscape: impl Into<String>) -> Self {
        self.landscape = Some(landscape.into());
        self
    }

    pub fn analysis_type(mut self, analysis_type: AnalysisType) -> Self {
        self.analysis_type = Some(analysis_type);
        self
    }

    pub fn resolution(mut self, resolution: TemporalResolution) -> Self {
        self.temporal_resolution = Some(resolution);
        self
    }

    pub fn variable(mut self, variable: impl Into<String>) -> Self {
        self.variable = Some(variable.into());
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn comparison_period(mut self, comparison: ComparisonPeriod) -> Self {
        self.comparison_period = Some(comparison);
        self
    }

    pub fn baseline_dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.baseline_start_date = Some(start);
        self.baseline_end_date = Some(end);
        self
    }

    pub fn reference_layer(mut self, id: impl Into<String>, geometry: geojson::Geometry) -> Self {
        self.reference_layer_id = Some(id.into());
        self.reference_layer = Some(geometry);
        self
    }

    pub fn custom_geom(mut self, geometry: geojson::Geometry) -> Self {
        self.custom_geom = Some(geometry);
        self
    }
}

/// Which cascades an update triggered.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PatchOutcome {
    pub changed: bool,
    pub landscape_changed: bool,
    pub analysis_type_changed: bool,
    pub resolution_changed: bool,
    /// A different reference area was set.
    pub reference_changed: bool,
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `patch`, resetting the fields downstream of every step that
    /// changed value. Steps are applied in order, so a patch may set a new
    /// landscape and the fields after it in one go.
    pub fn update(&mut self, patch: ConfigPatch) -> PatchOutcome {
        let mut out = PatchOutcome {
            changed: patch != ConfigPatch::default(),
            ..PatchOutcome::default()
        };

        if let Some(landscape) = patch.landscape
            && self.landscape.as_deref() != Some(landscape.as_str())
        {
            debug!(%landscape, "landscape changed, resetting draft");
            *self = AnalysisConfig {
                landscape: Some(landscape),
                ..AnalysisConfig::default()
            };
            out.landscape_changed = true;
        }

        if let Some(analysis_type) = patch.analysis_type
            && analysis_type != self.analysis_type
        {
            debug!(%analysis_type, "analysis type changed, resetting downstream fields");
            *self = AnalysisConfig {
                landscape: self.landscape.take(),
                analysis_type,
                ..AnalysisConfig::default()
            };
            out.analysis_type_changed = true;
        }

        if let Some(resolution) = patch.temporal_resolution
            && self.temporal_resolution != Some(resolution)
        {
            self.temporal_resolution = Some(resolution);
            self.period = Period::default();
            self.comparison_period = ComparisonPeriod::default();
            out.resolution_changed = true;
        }

        if let Some(variable) = patch.variable {
            self.variable = Some(variable);
        }
        if let Some(period) = patch.period {
            self.period = period;
        }
        if let Some(comparison) = patch.comparison_period {
            self.comparison_period = comparison;
        }
        if let Some(start) = patch.baseline_start_date {
            self.baseline_start_date = Some(start);
        }
        if let Some(end) = patch.baseline_end_date {
            self.baseline_end_date = Some(end);
        }
        if let Some(id) = patch.reference_layer_id
            && self.reference_layer_id.as_deref() != Some(id.as_str())
        {
            self.reference_layer_id = Some(id);
            out.reference_changed = true;
        }
        if let Some(reference) = patch.reference_layer
            && self.reference_layer.as_ref() != Some(&reference)
        {
            self.reference_layer = Some(reference);
            out.reference_changed = true;
        }
        if let Some(geometry) = patch.custom_geom {
            self.set_custom_geom(geometry);
        }
        out
    }

    /// "Reset Form".
    pub fn reset(&mut self) {
        *self = AnalysisConfig::default();
    }

    /// Toggles a picked area in `locations`; any drawn geometry is dropped.
    /// Returns true when the area was added.
    pub fn toggle_location(&mut self, selection: AreaSelection) -> bool {
        self.custom_geom = None;
        toggle_selection(&mut self.locations, selection)
    }

    /// Toggles a BACI control area.
    pub fn toggle_control_location(&mut self, selection: AreaSelection) -> bool {
        toggle_selection(&mut self.control_locations, selection)
    }

    /// Uses a drawn geometry as the area; picked locations are dropped.
    pub fn set_custom_geom(&mut self, geometry: geojson::Geometry) {
        self.locations.clear();
        self.custom_geom = Some(geometry);
    }

    pub fn clear_custom_geom(&mut self) {
        self.custom_geom = None;
    }

    pub fn clear_reference_layer(&mut self) {
        self.reference_layer = None;
        self.reference_layer_id = None;
    }

    /// Clears `variable` when it is not among the indicators offered for the
    /// current analysis type and resolution. Returns true if it was cleared.
    pub fn retain_offered_variable(&mut self, indicators: &[Indicator]) -> bool {
        let Some(variable) = self.variable.as_deref() else {
            return false;
        };
        let offered = variable_options(indicators, self.analysis_type, self.temporal_resolution);
        if offered.iter().any(|i| i.variable == variable) {
            return false;
        }
        debug!(variable, "variable no longer offered, clearing");
        self.variable = None;
        true
    }

    pub fn has_area(&self) -> bool {
        !self.locations.is_empty() || self.custom_geom.is_some()
    }

    /// Period and comparison period carry every part the resolution needs.
    pub fn periods_complete(&self) -> bool {
        let Some(resolution) = self.temporal_resolution else {
            return false;
        };
        let p = &self.period;
        let c = &self.comparison_period;
        if p.year.is_none() || c.year.is_empty() {
            return false;
        }
        match resolution {
            TemporalResolution::Annual => true,
            TemporalResolution::Quarterly => p.quarter.is_some() && !c.quarter.is_empty(),
            TemporalResolution::Monthly => p.month.is_some() && !c.month.is_empty(),
        }
    }

    /// Whether enough is configured for the map to accept area picks.
    ///
    /// For Spatial, picking opens while no reference geometry exists, and
    /// again once the reference-only result has been published.
    pub fn pick_mode_ready(&self, reference_published: bool) -> bool {
        if self.landscape.is_none() {
            return false;
        }
        match self.analysis_type {
            AnalysisType::Baseline => true,
            AnalysisType::Temporal | AnalysisType::Baci => self.periods_complete(),
            AnalysisType::Spatial => self.reference_layer.is_none() || reference_published,
        }
    }
}
